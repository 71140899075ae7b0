use std::collections::HashSet;
use std::iter;

use itertools::{Either, Itertools};
use tracing::{debug, info};

use crate::error::{CarError, GenerateError};
use crate::model::car::Car;
use crate::model::metadata::ModelData;
use crate::model::spec::{PropertySpec, RawValue};

pub const IS_ELECTRIC: &str = "Q1-IsElectric";
pub const KM: &str = "Q2-KM";
pub const ENGINE_SIZE: &str = "Q3-EngineSize";
pub const COLOR: &str = "Q4-Color";
pub const MODEL_DATA: &str = "Q5-ModelData";

pub const TRUE_TOKEN: &str = "True";

/// What to do with a combination that cannot be built into a car.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidCombination {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    pub on_invalid: InvalidCombination,
}

/// Expands `spec` into every distinct car it describes, aborting on the first
/// combination that violates the car invariant.
pub fn generate_unique_cars(spec: &PropertySpec) -> Result<HashSet<Car>, GenerateError> {
    generate_unique_cars_with(spec, &GeneratorConfig::default())
}

pub fn generate_unique_cars_with(
    spec: &PropertySpec,
    config: &GeneratorConfig,
) -> Result<HashSet<Car>, GenerateError> {
    check_references(spec)?;

    let candidates = spec
        .iter()
        .try_fold(1usize, |acc, p| acc.checked_mul(p.possible_values.len()));
    debug!(properties = spec.len(), ?candidates, "expanding property table");

    let mut cars = HashSet::new();
    let mut skipped = 0usize;
    for values in value_tuples(spec) {
        let mut combination = Combination::new(spec, values);
        combination.resolve_conditions(spec);
        match combination.project()?.build() {
            Ok(car) => {
                cars.insert(car);
            }
            Err(err) if config.on_invalid == InvalidCombination::Skip => {
                debug!(%err, "skipping invalid combination");
                skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(unique = cars.len(), skipped, "generated unique cars");
    Ok(cars)
}

fn check_references(spec: &PropertySpec) -> Result<(), GenerateError> {
    spec.iter()
        .filter_map(|p| p.condition.as_ref().map(|c| (p, c)))
        .find(|(_, condition)| !spec.contains(&condition.reference))
        .map_or(Ok(()), |(property, condition)| {
            Err(GenerateError::UnknownReference {
                property: property.name.clone(),
                reference: condition.reference.clone(),
            })
        })
}

// an empty table still describes one (all-absent) car
fn value_tuples(spec: &PropertySpec) -> impl Iterator<Item = Vec<&RawValue>> + '_ {
    if spec.is_empty() {
        Either::Left(iter::once(Vec::new()))
    } else {
        Either::Right(
            spec.iter()
                .map(|p| p.possible_values.iter())
                .multi_cartesian_product(),
        )
    }
}

struct Combination<'a> {
    slots: Vec<(&'a str, Option<&'a RawValue>)>,
}

impl<'a> Combination<'a> {
    fn new(spec: &'a PropertySpec, values: Vec<&'a RawValue>) -> Combination<'a> {
        let slots = spec
            .iter()
            .map(|p| p.name.as_str())
            .zip(values.into_iter().map(Some))
            .collect();
        Combination { slots }
    }

    fn get(&self, name: &str) -> Option<&'a RawValue> {
        self.slots
            .iter()
            .find(|(slot, _)| *slot == name)
            .and_then(|(_, value)| *value)
    }

    // conditions see the drawn values, never a sibling's suppression
    fn resolve_conditions(&mut self, spec: &PropertySpec) {
        let suppressed = spec
            .iter()
            .positions(|p| {
                p.condition
                    .as_ref()
                    .is_some_and(|c| !c.is_met(self.get(&c.reference)))
            })
            .collect_vec();
        for index in suppressed {
            self.slots[index].1 = None;
        }
    }

    fn project(&self) -> Result<CarFields, GenerateError> {
        let is_electric = matches!(
            self.get(IS_ELECTRIC),
            Some(RawValue::Token(token)) if token == TRUE_TOKEN
        );
        let km = self
            .number_token(KM, "a non-negative integer")?
            .map(|token| {
                token
                    .parse::<u64>()
                    .map_err(|_| parse_failure(KM, token, "a non-negative integer"))
            })
            .transpose()?;
        let engine_size = self
            .number_token(ENGINE_SIZE, "a non-negative real number")?
            .map(|token| {
                token
                    .parse::<f64>()
                    .ok()
                    .filter(|size| size.is_finite() && *size >= 0.0)
                    .ok_or_else(|| parse_failure(ENGINE_SIZE, token, "a non-negative real number"))
            })
            .transpose()?;
        let color = match self.get(COLOR) {
            None => None,
            Some(RawValue::Token(token)) => Some(token.clone()),
            Some(RawValue::Record(record)) => {
                return Err(parse_failure(COLOR, &record.to_string(), "text"))
            }
        };
        let model_data = match self.get(MODEL_DATA) {
            None => None,
            Some(RawValue::Token(token)) if token.is_empty() => None,
            Some(RawValue::Token(token)) => {
                return Err(parse_failure(MODEL_DATA, token, "a structured record"))
            }
            Some(RawValue::Record(record)) => Some(record.clone()),
        };

        Ok(CarFields {
            is_electric,
            km,
            engine_size,
            color,
            model_data,
        })
    }

    // empty tokens mean "absent", not zero
    fn number_token(
        &self,
        name: &str,
        expected: &'static str,
    ) -> Result<Option<&'a str>, GenerateError> {
        match self.get(name) {
            None => Ok(None),
            Some(RawValue::Token(token)) if token.is_empty() => Ok(None),
            Some(RawValue::Token(token)) => Ok(Some(token.as_str())),
            Some(RawValue::Record(record)) => Err(parse_failure(name, &record.to_string(), expected)),
        }
    }
}

struct CarFields {
    is_electric: bool,
    km: Option<u64>,
    engine_size: Option<f64>,
    color: Option<String>,
    model_data: Option<ModelData>,
}

impl CarFields {
    fn build(self) -> Result<Car, CarError> {
        Car::new(
            self.is_electric,
            self.km,
            self.engine_size,
            self.color,
            self.model_data,
        )
    }
}

fn parse_failure(property: &str, value: &str, expected: &'static str) -> GenerateError {
    GenerateError::ParseFailure {
        property: property.to_owned(),
        value: value.to_owned(),
        expected,
    }
}
