use std::io::Write;

use itertools::Itertools;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{CarError, OutputError};
use crate::generator::{COLOR, ENGINE_SIZE, IS_ELECTRIC, KM, MODEL_DATA, TRUE_TOKEN};
use crate::model::car::Car;

pub const PRICE: &str = "Price";

#[derive(Debug, Clone, PartialEq)]
pub struct PricedCar {
    pub car: Car,
    pub price: f64,
}

pub fn price_cars(
    cars: impl IntoIterator<Item = Car>,
    exchange_rate: Option<f64>,
    clock: &impl Clock,
) -> Result<Vec<PricedCar>, CarError> {
    cars.into_iter()
        .map(|car| {
            let price = car.calculate_price(exchange_rate, clock)?;
            Ok(PricedCar { car, price })
        })
        .collect()
}

// rows are sorted so the same set always produces the same file
pub fn write_csv(priced: &[PricedCar], mut writer: impl Write) -> Result<(), OutputError> {
    let header = [IS_ELECTRIC, KM, ENGINE_SIZE, COLOR, MODEL_DATA, PRICE];
    writeln!(writer, "{}", header.join(","))?;

    let rows = priced.iter().map(render_row).sorted().collect_vec();
    for row in &rows {
        writeln!(writer, "{row}")?;
    }
    writer.flush()?;
    debug!(rows = rows.len(), "wrote priced cars");
    Ok(())
}

fn render_row(priced: &PricedCar) -> String {
    let car = &priced.car;
    let is_electric = if car.is_electric() { TRUE_TOKEN } else { "False" };
    [
        is_electric.to_owned(),
        car.km().map(|km| km.to_string()).unwrap_or_default(),
        car.engine_size().map(|size| size.to_string()).unwrap_or_default(),
        car.color().unwrap_or_default().to_owned(),
        car.model_data().map(|data| data.to_string()).unwrap_or_default(),
        format!("{:.2}", priced.price),
    ]
    .iter()
    .map(|cell| escape(cell))
    .join(",")
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_owned()
    }
}
