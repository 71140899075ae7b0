use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CarError {
    #[error("electric cars should not have an engine size (got {engine_size})")]
    InvalidConfiguration { engine_size: f64 },
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("car is missing `{field}`")]
    MissingData { field: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerateError {
    #[error("cannot read `{value}` of property `{property}` as {expected}")]
    ParseFailure {
        property: String,
        value: String,
        expected: &'static str,
    },
    #[error("condition `{condition}` of property `{property}` is not of the form `name == value`")]
    InvalidCondition { property: String, condition: String },
    #[error("condition of property `{property}` refers to unknown property `{reference}`")]
    UnknownReference { property: String, reference: String },
    #[error(transparent)]
    Car(#[from] CarError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read property table: {0}")]
    Io(#[from] io::Error),
    #[error("property table has no `{0}` column")]
    MissingColumn(&'static str),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("line {line}: model data must be a JSON object (Python-style single quotes are not accepted): {source}")]
    ModelData {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: {source}")]
    Condition {
        line: usize,
        #[source]
        source: GenerateError,
    },
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("cannot write results: {0}")]
    Io(#[from] io::Error),
}
