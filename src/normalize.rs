use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::RegistrationError;

pub const DEFAULT_JSON_FIELD: &str = "user_defined_json_data";

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeOptions {
    pub separator: String,
    pub use_parent_key: bool,
    pub initial_parent_key: String,
    pub missing_value: Value,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            use_parent_key: true,
            initial_parent_key: String::new(),
            missing_value: Value::Null,
        }
    }
}

pub type Table = BTreeMap<String, Vec<Value>>;

pub fn denormalize_one(
    record: &Map<String, Value>,
    field: &str,
) -> Result<Vec<Map<String, Value>>, RegistrationError> {
    let values = match record.get(field) {
        Some(Value::Array(values)) => values,
        Some(_) => {
            return Err(RegistrationError::malformed(
                field,
                "only list-valued fields can be denormalized",
            ));
        }
        None => return Err(RegistrationError::MissingField(field.to_string())),
    };
    Ok(values
        .iter()
        .map(|value| {
            let mut copy = record.clone();
            copy.insert(field.to_string(), value.clone());
            copy
        })
        .collect())
}

pub fn denormalize_all<S: AsRef<str>>(
    records: &[Map<String, Value>],
    fields: &[S],
) -> Result<Vec<Map<String, Value>>, RegistrationError> {
    let mut output = Vec::new();
    for record in records {
        let mut working = vec![record.clone()];
        for field in fields {
            let mut next = Vec::with_capacity(working.len());
            for row in &working {
                next.extend(denormalize_one(row, field.as_ref())?);
            }
            working = next;
        }
        output.extend(working);
    }
    Ok(output)
}

/// Collapses nested maps into one level. Lists are leaves. Without parent keys two
/// paths may end on the same key: the one visited last wins.
pub fn flatten(
    record: &Map<String, Value>,
    separator: &str,
    use_parent_key: bool,
) -> Map<String, Value> {
    flatten_with_prefix(record, "", separator, use_parent_key)
}

pub fn flatten_with_prefix(
    record: &Map<String, Value>,
    parent_key: &str,
    separator: &str,
    use_parent_key: bool,
) -> Map<String, Value> {
    let mut flat = Map::new();
    collect_leaves(record, parent_key, separator, use_parent_key, &mut flat);
    flat
}

fn collect_leaves(
    record: &Map<String, Value>,
    parent_key: &str,
    separator: &str,
    use_parent_key: bool,
    flat: &mut Map<String, Value>,
) {
    for (key, value) in record {
        let new_key = if use_parent_key && !parent_key.is_empty() {
            format!("{parent_key}{separator}{key}")
        } else {
            key.clone()
        };
        match value {
            Value::Object(nested) => {
                collect_leaves(nested, &new_key, separator, use_parent_key, flat)
            }
            leaf => {
                flat.insert(new_key, leaf.clone());
            }
        }
    }
}

pub fn denormalized_rows<S: AsRef<str>>(
    records: &[Map<String, Value>],
    fields: &[S],
    options: &NormalizeOptions,
) -> Result<Vec<Map<String, Value>>, RegistrationError> {
    Ok(denormalize_all(records, fields)?
        .iter()
        .map(|row| {
            flatten_with_prefix(
                row,
                &options.initial_parent_key,
                &options.separator,
                options.use_parent_key,
            )
        })
        .collect())
}

pub fn denormalized_table<S: AsRef<str>>(
    records: &[Map<String, Value>],
    fields: &[S],
    options: &NormalizeOptions,
) -> Result<Table, RegistrationError> {
    let rows = denormalized_rows(records, fields, options)?;
    let keys: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();
    Ok(keys
        .into_iter()
        .map(|key| {
            let column = rows
                .iter()
                .map(|row| {
                    row.get(key)
                        .cloned()
                        .unwrap_or_else(|| options.missing_value.clone())
                })
                .collect();
            (key.clone(), column)
        })
        .collect())
}

/// Replaces JSON-encoded string fields by their keys, merged into the enclosing map
/// without overwriting keys already there. Fields that do not hold a JSON object are
/// left as they are.
pub fn expand_embedded_json<S: AsRef<str>>(
    record: &Map<String, Value>,
    json_field_names: &[S],
) -> Map<String, Value> {
    let mut expanded: Map<String, Value> = record
        .iter()
        .map(|(key, value)| (key.clone(), expand_value(value, json_field_names)))
        .collect();

    for name in json_field_names {
        let name = name.as_ref();
        let Some(Value::String(text)) = expanded.get(name) else {
            continue;
        };
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(embedded)) => {
                expanded.shift_remove(name);
                for (key, value) in embedded {
                    expanded.entry(key).or_insert(value);
                }
            }
            Ok(_) => warn!(field = name, "embedded JSON is not an object, field kept"),
            Err(err) => warn!(field = name, error = %err, "embedded JSON does not parse, field kept"),
        }
    }
    expanded
}

fn expand_value<S: AsRef<str>>(value: &Value, json_field_names: &[S]) -> Value {
    match value {
        Value::Object(map) => Value::Object(expand_embedded_json(map, json_field_names)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(expand_embedded_json(map, json_field_names)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
