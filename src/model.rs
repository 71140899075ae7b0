pub mod metadata {
    use std::collections::hash_map::DefaultHasher;
    use std::fmt;
    use std::hash::{Hash, Hasher};

    use serde_json::{Map, Value};

    /// Manufacturing record of a car. Equality and hashing ignore entry order.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct ModelData(Map<String, Value>);

    impl ModelData {
        pub fn new() -> ModelData {
            ModelData(Map::new())
        }

        pub fn parse(text: &str) -> Result<ModelData, serde_json::Error> {
            serde_json::from_str::<Map<String, Value>>(text).map(ModelData)
        }

        pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> ModelData {
            self.0.insert(key.into(), value.into());
            self
        }

        pub fn year(&self) -> Option<i32> {
            self.0
                .get("year")?
                .as_i64()
                .filter(|year| *year > 0)
                .and_then(|year| i32::try_from(year).ok())
        }
    }

    impl fmt::Display for ModelData {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let mut first = true;
            f.write_str("{")?;
            for (key, value) in &self.0 {
                if !first {
                    f.write_str(",")?;
                }
                first = false;
                write!(f, "{}:{}", Value::String(key.clone()), value)?;
            }
            f.write_str("}")
        }
    }

    impl Hash for ModelData {
        fn hash<H: Hasher>(&self, state: &mut H) {
            hash_entries(&self.0, state);
        }
    }

    // entries are folded with a commutative sum so iteration order never matters
    fn hash_entries<H: Hasher>(entries: &Map<String, Value>, state: &mut H) {
        let combined = entries
            .iter()
            .map(|(key, value)| {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                hash_value(value, &mut hasher);
                hasher.finish()
            })
            .fold(0u64, u64::wrapping_add);
        state.write_usize(entries.len());
        state.write_u64(combined);
    }

    fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
        match value {
            Value::Null => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Number(n) => {
                state.write_u8(2);
                if let Some(i) = n.as_i64() {
                    state.write_i64(i);
                } else if let Some(u) = n.as_u64() {
                    state.write_u64(u);
                } else if let Some(f) = n.as_f64() {
                    // 0.0 and -0.0 compare equal
                    let f = if f == 0.0 { 0.0 } else { f };
                    state.write_u64(f.to_bits());
                }
            }
            Value::String(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            Value::Array(items) => {
                state.write_u8(4);
                state.write_usize(items.len());
                items.iter().for_each(|item| hash_value(item, state));
            }
            Value::Object(entries) => {
                state.write_u8(5);
                hash_entries(entries, state);
            }
        }
    }
}

pub mod car {
    use std::hash::{Hash, Hasher};

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

    use super::metadata::ModelData;
    use crate::clock::Clock;
    use crate::error::CarError;

    #[derive(Debug, Clone)]
    pub struct Car {
        is_electric: bool,
        km: Option<u64>,
        engine_size: Option<f64>,
        color: Option<String>,
        model_data: Option<ModelData>,
    }

    impl Car {
        pub fn new(
            is_electric: bool,
            km: Option<u64>,
            engine_size: Option<f64>,
            color: Option<String>,
            model_data: Option<ModelData>,
        ) -> Result<Car, CarError> {
            if let (true, Some(engine_size)) = (is_electric, engine_size) {
                return Err(CarError::InvalidConfiguration { engine_size });
            }
            Ok(Car {
                is_electric,
                km,
                engine_size: engine_size.map(canonical),
                color,
                model_data,
            })
        }

        pub fn is_electric(&self) -> bool {
            self.is_electric
        }

        pub fn km(&self) -> Option<u64> {
            self.km
        }

        pub fn engine_size(&self) -> Option<f64> {
            self.engine_size
        }

        pub fn color(&self) -> Option<&str> {
            self.color.as_deref()
        }

        pub fn model_data(&self) -> Option<&ModelData> {
            self.model_data.as_ref()
        }

        /// `km * days since Jan 1 of the manufacturing year * exchange_rate`, with
        /// the day count taken against `clock.now()` on every call.
        pub fn calculate_price(
            &self,
            exchange_rate: Option<f64>,
            clock: &impl Clock,
        ) -> Result<f64, CarError> {
            let exchange_rate = exchange_rate.ok_or_else(|| CarError::InvalidArgument {
                name: "exchange_rate",
                reason: "exchange rate cannot be absent".to_owned(),
            })?;
            if !exchange_rate.is_finite() || exchange_rate < 0.0 {
                return Err(CarError::InvalidArgument {
                    name: "exchange_rate",
                    reason: format!("expected a non-negative finite rate, got {exchange_rate}"),
                });
            }
            let year = self
                .model_data
                .as_ref()
                .and_then(ModelData::year)
                .ok_or(CarError::MissingData { field: "year" })?;
            let km = self.km.ok_or(CarError::MissingData { field: "km" })?;

            let start = NaiveDate::from_ymd_opt(year, 1, 1)
                .ok_or(CarError::MissingData { field: "year" })?
                .and_time(NaiveTime::MIN);
            let days_passed = whole_days_between(start, clock.now());

            Ok(km as f64 * days_passed as f64 * exchange_rate)
        }
    }

    impl PartialEq for Car {
        fn eq(&self, other: &Self) -> bool {
            self.is_electric == other.is_electric
                && self.km == other.km
                && self.engine_size.map(f64::to_bits) == other.engine_size.map(f64::to_bits)
                && self.color == other.color
                && self.model_data == other.model_data
        }
    }

    impl Eq for Car {}

    impl Hash for Car {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.is_electric.hash(state);
            self.km.hash(state);
            self.engine_size.map(f64::to_bits).hash(state);
            self.color.hash(state);
            self.model_data.hash(state);
        }
    }

    // -0.0 collapses onto 0.0 and every NaN onto one payload so bitwise Eq/Hash agree
    fn canonical(value: f64) -> f64 {
        if value.is_nan() {
            f64::NAN
        } else if value == 0.0 {
            0.0
        } else {
            value
        }
    }

    // floored, not truncated
    pub(crate) fn whole_days_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
        let elapsed = end - start;
        let days = elapsed.num_days();
        if elapsed < TimeDelta::days(days) {
            days - 1
        } else {
            days
        }
    }
}

pub mod spec {
    use std::borrow::Cow;

    use super::metadata::ModelData;
    use crate::error::GenerateError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RawValue {
        Token(String),
        Record(ModelData),
    }

    impl RawValue {
        // records compare by their compact JSON rendering
        pub fn as_text(&self) -> Cow<'_, str> {
            match self {
                RawValue::Token(token) => Cow::Borrowed(token),
                RawValue::Record(record) => Cow::Owned(record.to_string()),
            }
        }
    }

    impl From<&str> for RawValue {
        fn from(token: &str) -> Self {
            RawValue::Token(token.to_owned())
        }
    }

    impl From<String> for RawValue {
        fn from(token: String) -> Self {
            RawValue::Token(token)
        }
    }

    impl From<ModelData> for RawValue {
        fn from(record: ModelData) -> Self {
            RawValue::Record(record)
        }
    }

    /// `<reference> == <expected>`: the owning property keeps its value only when
    /// the referenced property currently holds `expected`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Condition {
        pub reference: String,
        pub expected: String,
    }

    impl Condition {
        pub fn parse(property: &str, text: &str) -> Result<Condition, GenerateError> {
            let invalid = || GenerateError::InvalidCondition {
                property: property.to_owned(),
                condition: text.to_owned(),
            };
            let (reference, expected) = text.split_once("==").ok_or_else(invalid)?;
            let (reference, expected) = (reference.trim(), expected.trim());
            if reference.is_empty() || expected.contains("==") {
                return Err(invalid());
            }
            Ok(Condition {
                reference: reference.to_owned(),
                expected: expected.to_owned(),
            })
        }

        pub fn is_met(&self, value: Option<&RawValue>) -> bool {
            value.is_some_and(|value| value.as_text() == self.expected)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Property {
        pub name: String,
        pub possible_values: Vec<RawValue>,
        pub condition: Option<Condition>,
    }

    impl Property {
        pub fn new<V: Into<RawValue>>(
            name: impl Into<String>,
            possible_values: impl IntoIterator<Item = V>,
        ) -> Property {
            Property {
                name: name.into(),
                possible_values: possible_values.into_iter().map(Into::into).collect(),
                condition: None,
            }
        }

        pub fn with_condition(mut self, condition: Condition) -> Property {
            self.condition = Some(condition);
            self
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct PropertySpec {
        properties: Vec<Property>,
    }

    impl PropertySpec {
        pub fn new() -> PropertySpec {
            PropertySpec::default()
        }

        pub fn insert(&mut self, property: Property) {
            match self.properties.iter_mut().find(|p| p.name == property.name) {
                Some(existing) => *existing = property,
                None => self.properties.push(property),
            }
        }

        pub fn with(mut self, property: Property) -> PropertySpec {
            self.insert(property);
            self
        }

        pub fn get(&self, name: &str) -> Option<&Property> {
            self.properties.iter().find(|p| p.name == name)
        }

        pub fn contains(&self, name: &str) -> bool {
            self.get(name).is_some()
        }

        pub fn iter(&self) -> std::slice::Iter<'_, Property> {
            self.properties.iter()
        }

        pub fn len(&self) -> usize {
            self.properties.len()
        }

        pub fn is_empty(&self) -> bool {
            self.properties.is_empty()
        }
    }

    impl FromIterator<Property> for PropertySpec {
        fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
            let mut spec = PropertySpec::new();
            iter.into_iter().for_each(|property| spec.insert(property));
            spec
        }
    }

    impl<'a> IntoIterator for &'a PropertySpec {
        type Item = &'a Property;
        type IntoIter = std::slice::Iter<'a, Property>;

        fn into_iter(self) -> Self::IntoIter {
            self.properties.iter()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;
    use std::hash::{Hash, Hasher};

    use chrono::NaiveDate;
    use serde_json::json;

    use super::car::{whole_days_between, Car};
    use super::metadata::ModelData;
    use super::spec::{Condition, Property, PropertySpec, RawValue};
    use crate::clock::FixedClock;
    use crate::error::{CarError, GenerateError};

    fn mustang() -> ModelData {
        ModelData::new()
            .with("brand", "Ford")
            .with("model", "Mustang")
            .with("year", 1964)
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn clock(y: i32, m: u32, d: u32) -> FixedClock {
        FixedClock::at_midnight(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn electric_car_with_engine_size_is_rejected() {
        let err = Car::new(true, Some(1000), Some(3.0), Some("Red".into()), Some(mustang()))
            .unwrap_err();
        assert_eq!(err, CarError::InvalidConfiguration { engine_size: 3.0 });
        assert_eq!(err.to_string(), "electric cars should not have an engine size (got 3)");
    }

    #[test]
    fn partial_cars_are_accepted() {
        let car = Car::new(false, None, None, None, None).unwrap();
        assert!(!car.is_electric());
        assert_eq!(car.km(), None);
        assert_eq!(car.engine_size(), None);
        assert_eq!(car.color(), None);
        assert!(car.model_data().is_none());

        let electric = Car::new(true, Some(5), None, Some("Blue".into()), None).unwrap();
        assert!(electric.is_electric());
        assert_eq!(electric.km(), Some(5));
    }

    #[test]
    fn equal_cars_collapse_in_a_set() {
        let a = Car::new(false, Some(1000), Some(3.0), Some("Red".into()), Some(mustang())).unwrap();
        let reordered = ModelData::new()
            .with("year", 1964)
            .with("model", "Mustang")
            .with("brand", "Ford");
        let b = Car::new(false, Some(1000), Some(3.0), Some("Red".into()), Some(reordered)).unwrap();

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        let cars: HashSet<Car> = [a, b].into_iter().collect();
        assert_eq!(cars.len(), 1);
    }

    #[test]
    fn cars_differing_in_one_field_are_distinct() {
        let base = Car::new(false, Some(1000), None, Some("Red".into()), Some(mustang())).unwrap();
        let other_km = Car::new(false, Some(10000), None, Some("Red".into()), Some(mustang())).unwrap();
        let no_data = Car::new(false, Some(1000), None, Some("Red".into()), None).unwrap();
        let other_year = Car::new(
            false,
            Some(1000),
            None,
            Some("Red".into()),
            Some(mustang().with("year", 1965)),
        )
        .unwrap();

        assert_ne!(base, other_km);
        assert_ne!(base, no_data);
        assert_ne!(base, other_year);
    }

    #[test]
    fn negative_zero_engine_size_equals_zero() {
        let a = Car::new(false, None, Some(0.0), None, None).unwrap();
        let b = Car::new(false, None, Some(-0.0), None, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn model_data_hash_ignores_nested_key_order() {
        let a = ModelData::parse(r#"{"year": 1964, "trim": {"seats": 4, "roof": "soft"}}"#).unwrap();
        let b = ModelData::parse(r#"{"trim": {"roof": "soft", "seats": 4}, "year": 1964}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn model_data_rejects_non_objects() {
        assert!(ModelData::parse("[1, 2]").is_err());
        assert!(ModelData::parse("1964").is_err());
        assert!(ModelData::parse("{'year': 1964}").is_err());
    }

    #[test]
    fn model_data_year_must_be_a_positive_integer() {
        assert_eq!(mustang().year(), Some(1964));
        assert_eq!(ModelData::new().with("year", 0).year(), None);
        assert_eq!(ModelData::new().with("year", "1964").year(), None);
        assert_eq!(ModelData::new().with("year", 1964.5).year(), None);
        assert_eq!(ModelData::new().year(), None);
    }

    #[test]
    fn price_is_linear_in_km() {
        let clock = clock(2024, 3, 1);
        let car1 = Car::new(false, Some(1000), Some(3.0), Some("Red".into()), Some(mustang())).unwrap();
        let car2 = Car::new(false, Some(10000), Some(3.0), Some("Red".into()), Some(mustang())).unwrap();

        let price1 = car1.calculate_price(Some(800.0), &clock).unwrap();
        let price2 = car2.calculate_price(Some(800.0), &clock).unwrap();

        assert!((price1 - price2 * 0.1).abs() <= price2 * 1e-12);
        assert!(price2 > price1);
    }

    #[test]
    fn price_uses_days_since_first_of_january() {
        let car = Car::new(false, Some(2), None, None, Some(ModelData::new().with("year", 2024))).unwrap();
        // 2024 is a leap year: Jan (31) + Feb (29)
        let price = car.calculate_price(Some(10.0), &clock(2024, 3, 1)).unwrap();
        assert_eq!(price, 2.0 * 60.0 * 10.0);
    }

    #[test]
    fn price_requires_exchange_rate() {
        let car = Car::new(false, Some(1000), None, None, Some(mustang())).unwrap();
        let err = car.calculate_price(None, &clock(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, CarError::InvalidArgument { name: "exchange_rate", .. }));

        let err = car.calculate_price(Some(f64::NAN), &clock(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, CarError::InvalidArgument { .. }));
        let err = car.calculate_price(Some(-1.0), &clock(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, CarError::InvalidArgument { .. }));
    }

    #[test]
    fn price_requires_year_and_km() {
        let clock = clock(2024, 1, 1);
        let no_data = Car::new(false, Some(1000), None, None, None).unwrap();
        assert_eq!(
            no_data.calculate_price(Some(800.0), &clock),
            Err(CarError::MissingData { field: "year" })
        );

        let no_year = Car::new(false, Some(1000), None, None, Some(ModelData::new().with("brand", "Ford"))).unwrap();
        assert_eq!(
            no_year.calculate_price(Some(800.0), &clock),
            Err(CarError::MissingData { field: "year" })
        );

        let no_km = Car::new(true, None, None, None, Some(mustang())).unwrap();
        assert_eq!(
            no_km.calculate_price(Some(800.0), &clock),
            Err(CarError::MissingData { field: "km" })
        );
    }

    #[test]
    fn whole_days_round_down() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let later = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap().and_hms_opt(23, 59, 0).unwrap();
        let earlier = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap().and_hms_opt(12, 0, 0).unwrap();

        assert_eq!(whole_days_between(start, start), 0);
        assert_eq!(whole_days_between(start, later), 2);
        assert_eq!(whole_days_between(start, earlier), -1);
    }

    #[test]
    fn condition_parsing_trims_operands() {
        let condition = Condition::parse("Q2-KM", "  Q1-IsElectric ==  False ").unwrap();
        assert_eq!(condition.reference, "Q1-IsElectric");
        assert_eq!(condition.expected, "False");
    }

    #[test]
    fn malformed_conditions_are_rejected() {
        for text in ["Q1-IsElectric = False", "== False", "a == b == c"] {
            assert_eq!(
                Condition::parse("Q2-KM", text),
                Err(GenerateError::InvalidCondition {
                    property: "Q2-KM".into(),
                    condition: text.into(),
                })
            );
        }
    }

    #[test]
    fn condition_compares_text_forms() {
        let condition = Condition::parse("x", "Q1 == True").unwrap();
        assert!(condition.is_met(Some(&RawValue::from("True"))));
        assert!(!condition.is_met(Some(&RawValue::from("False"))));
        assert!(!condition.is_met(None));

        let record = Condition::parse("x", r#"Q5 == {"year":1964}"#).unwrap();
        assert!(record.is_met(Some(&RawValue::Record(ModelData::new().with("year", json!(1964))))));
    }

    #[test]
    fn insert_replaces_in_place() {
        let spec = PropertySpec::new()
            .with(Property::new("a", ["1"]))
            .with(Property::new("b", ["2"]))
            .with(Property::new("a", ["3", "4"]));

        let names: Vec<&str> = spec.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(spec.get("a").unwrap().possible_values.len(), 2);
        assert!(!spec.contains("c"));
    }
}
