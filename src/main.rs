use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use car_permutations::{
    generate_unique_cars_with, load_properties, price_cars, write_csv, Clock, FixedClock,
    GeneratorConfig, InvalidCombination, SystemClock,
};
use chrono::NaiveDate;
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "car-permutations")]
#[command(about = "Enumerate and price every valid car configuration of a property table.")]
struct CommandLine {
    /// Property table with Property_Name, Possible_Values and Condition columns.
    /// Q5-ModelData values must be JSON objects ({"year": 1964}); Python-style
    /// literals with single quotes ({'year': 1964}) are rejected
    #[arg(short, long)]
    properties: PathBuf,
    /// Local currency units per USD
    #[arg(short, long)]
    exchange_rate: f64,
    /// Output file; prints to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Price as of midnight on this date (YYYY-MM-DD) instead of now
    #[arg(long)]
    reference_date: Option<NaiveDate>,
    /// Drop electric cars with an engine size instead of failing
    #[arg(long)]
    skip_invalid: bool,
    /// Log more (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse();
    init_logging(commands.verbose);

    match commands.reference_date {
        Some(date) => run(&commands, &FixedClock::at_midnight(date)),
        None => run(&commands, &SystemClock),
    }
}

fn run(commands: &CommandLine, clock: &impl Clock) -> anyhow::Result<()> {
    let spec = load_properties(&commands.properties)
        .with_context(|| format!("loading {}", commands.properties.display()))?;

    let config = GeneratorConfig {
        on_invalid: if commands.skip_invalid {
            InvalidCombination::Skip
        } else {
            InvalidCombination::Abort
        },
    };
    let cars = generate_unique_cars_with(&spec, &config).context("generating cars")?;
    let priced = price_cars(cars, Some(commands.exchange_rate), clock).context("pricing cars")?;

    match &commands.output {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            write_csv(&priced, BufWriter::new(file))?;
            info!(cars = priced.len(), path = %path.display(), "wrote priced cars");
        }
        None => write_csv(&priced, io::stdout().lock())?,
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
