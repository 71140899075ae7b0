pub mod clock;
pub mod error;
pub mod generator;
pub mod loader;
pub mod model;
pub mod output;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CarError, GenerateError, LoadError, OutputError};
pub use generator::{generate_unique_cars, generate_unique_cars_with, GeneratorConfig, InvalidCombination};
pub use loader::{load_properties, parse_properties, read_properties};
pub use model::car::Car;
pub use model::metadata::ModelData;
pub use model::spec::{Condition, Property, PropertySpec, RawValue};
pub use output::{price_cars, write_csv, PricedCar};
