use std::fs::File;
use std::io::{BufReader, Read};
use std::mem;
use std::path::Path;

use tracing::debug;

use crate::error::LoadError;
use crate::generator::MODEL_DATA;
use crate::model::metadata::ModelData;
use crate::model::spec::{Condition, Property, PropertySpec, RawValue};

pub const PROPERTY_NAME: &str = "Property_Name";
pub const POSSIBLE_VALUES: &str = "Possible_Values";
pub const CONDITION: &str = "Condition";

const VALUE_SEPARATOR: char = ';';

pub fn load_properties(path: impl AsRef<Path>) -> Result<PropertySpec, LoadError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading property table");
    read_properties(BufReader::new(File::open(path)?))
}

pub fn read_properties(mut reader: impl Read) -> Result<PropertySpec, LoadError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_properties(&text)
}

pub fn parse_properties(text: &str) -> Result<PropertySpec, LoadError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = split_records(text)?.into_iter();
    let Some((_, header)) = records.next() else {
        return Err(LoadError::MissingColumn(PROPERTY_NAME));
    };
    let columns = Columns::locate(&header)?;

    let mut spec = PropertySpec::new();
    for (line, record) in records {
        spec.insert(columns.property(line, &record)?);
    }
    debug!(properties = spec.len(), "loaded property table");
    Ok(spec)
}

struct Columns {
    name: usize,
    values: usize,
    condition: usize,
}

impl Columns {
    fn locate(header: &[String]) -> Result<Columns, LoadError> {
        let find = |column: &'static str| {
            header
                .iter()
                .position(|cell| cell.trim() == column)
                .ok_or(LoadError::MissingColumn(column))
        };
        Ok(Columns {
            name: find(PROPERTY_NAME)?,
            values: find(POSSIBLE_VALUES)?,
            condition: find(CONDITION)?,
        })
    }

    fn property(&self, line: usize, record: &[String]) -> Result<Property, LoadError> {
        let cell = |index: usize| record.get(index).map_or("", |cell| cell.trim());

        let name = cell(self.name);
        if name.is_empty() {
            return Err(LoadError::Malformed {
                line,
                reason: format!("empty {PROPERTY_NAME}"),
            });
        }

        let tokens = cell(self.values).split(VALUE_SEPARATOR).map(str::trim);
        let possible_values = if name == MODEL_DATA {
            tokens
                .map(|token| {
                    ModelData::parse(token)
                        .map(RawValue::Record)
                        .map_err(|source| LoadError::ModelData { line, source })
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            tokens.map(RawValue::from).collect()
        };

        let condition = match cell(self.condition) {
            "" => None,
            text => Some(
                Condition::parse(name, text)
                    .map_err(|source| LoadError::Condition { line, source })?,
            ),
        };

        Ok(Property {
            name: name.to_owned(),
            possible_values,
            condition,
        })
    }
}

// records are tagged with the line they start on; blank lines are dropped
fn split_records(text: &str) -> Result<Vec<(usize, Vec<String>)>, LoadError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut line = 1;
    let mut start = 1;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if field.is_empty() => quoted = true,
            ',' if !quoted => fields.push(mem::take(&mut field)),
            '\r' if !quoted => {}
            '\n' if !quoted => {
                fields.push(mem::take(&mut field));
                push_record(&mut records, start, mem::take(&mut fields));
                line += 1;
                start = line;
            }
            '\n' => {
                field.push(c);
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if quoted {
        return Err(LoadError::Malformed {
            line: start,
            reason: "unterminated quoted field".to_owned(),
        });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        push_record(&mut records, start, fields);
    }
    Ok(records)
}

fn push_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    if fields.iter().any(|field| !field.trim().is_empty()) {
        records.push((line, fields));
    }
}
