use std::collections::HashMap;
use std::io;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RegistrationError;
use crate::normalize::DEFAULT_JSON_FIELD;
use crate::reconcile::{IdentifierSource, UuidSource};
use crate::steps::{IDENTIFIER_FIELD, StepDescriptor, StepKind};
use crate::validation::{FieldValidator, check_entity};

static MULTI_VALUE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[;,]").expect("valid separator pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTable {
    pub prop_names: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StepTable {
    pub fn new(prop_names: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { prop_names, rows }
    }
}

#[derive(Debug, Default)]
pub struct SampleWizard<S: IdentifierSource = UuidSource> {
    entities: HashMap<StepKind, Map<String, Value>>,
    known_identifiers: HashMap<StepKind, HashMap<String, String>>,
    source: S,
}

impl SampleWizard<UuidSource> {
    pub fn new() -> Self {
        Self::with_source(UuidSource)
    }
}

impl<S: IdentifierSource> SampleWizard<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            entities: HashMap::new(),
            known_identifiers: HashMap::new(),
            source,
        }
    }

    pub fn with_known_identifiers(mut self, step: StepKind, ids: HashMap<String, String>) -> Self {
        self.known_identifiers.insert(step, ids);
        self
    }

    pub fn entities(&self, step: StepKind) -> Option<&Map<String, Value>> {
        self.entities.get(&step)
    }

    pub fn entity(&self, step: StepKind, tmp_id: &str) -> Option<&Map<String, Value>> {
        self.entities
            .get(&step)
            .and_then(|entities| entities.get(tmp_id))
            .and_then(Value::as_object)
    }

    pub fn load_rows<F: AsRef<str>>(
        &mut self,
        step: StepKind,
        table: &StepTable,
        form_fields: &[F],
    ) -> Result<&Map<String, Value>, RegistrationError> {
        let descriptor = step.descriptor();
        let mut loaded = Map::new();

        for row in &table.rows {
            let mut entity = Map::new();
            let mut user_json = Map::new();

            for (prop_name, cell) in table.prop_names.iter().zip(row) {
                let nested = descriptor
                    .nested()
                    .find(|nested| nested.name == prop_name.as_str());
                if let Some(nested) = nested {
                    self.nest_reference(descriptor, nested, cell.trim(), &mut entity)?;
                    continue;
                }
                if descriptor.is_multiple(prop_name) {
                    let values: Vec<Value> = MULTI_VALUE_SEPARATOR
                        .split(cell)
                        .map(str::trim)
                        .filter(|piece| !piece.is_empty())
                        .map(|piece| Value::String(piece.to_string()))
                        .collect();
                    if !values.is_empty() {
                        entity.insert(prop_name.clone(), Value::Array(values));
                    }
                    continue;
                }
                if cell.is_empty() {
                    continue;
                }
                let value = Value::String(cell.clone());
                if form_fields.iter().any(|field| field.as_ref() == prop_name.as_str()) {
                    entity.insert(prop_name.clone(), value);
                } else {
                    user_json.insert(prop_name.clone(), value);
                }
            }

            if !user_json.is_empty() {
                entity.insert(
                    DEFAULT_JSON_FIELD.to_string(),
                    Value::String(user_json_text(&user_json)?),
                );
            }

            let tmp_id = tmp_id(descriptor, &entity)?;
            let identifier = self
                .known_identifiers
                .get(&step)
                .and_then(|known| known.get(&tmp_id))
                .cloned()
                .unwrap_or_else(|| self.source.mint());
            entity.insert(IDENTIFIER_FIELD.to_string(), Value::String(identifier));
            loaded.insert(tmp_id, Value::Object(entity));
        }

        debug!(step = descriptor.name, entities = loaded.len(), "loaded step rows");
        self.entities.insert(step, loaded);
        Ok(&self.entities[&step])
    }

    fn nest_reference(
        &self,
        descriptor: &StepDescriptor,
        nested: &StepDescriptor,
        token: &str,
        entity: &mut Map<String, Value>,
    ) -> Result<(), RegistrationError> {
        match self.entity(nested.kind, token) {
            Some(referenced) => {
                entity.insert(
                    nested.prop_name_in_db.to_string(),
                    Value::Object(referenced.clone()),
                );
                Ok(())
            }
            None if nested.optional => Ok(()),
            None => Err(RegistrationError::MissingReference {
                property: nested.name.to_string(),
                step: descriptor.name.to_string(),
            }),
        }
    }

    pub fn load_form_format(
        &mut self,
        step: StepKind,
        entities: &[Map<String, Value>],
    ) -> Result<(), RegistrationError> {
        let descriptor = step.descriptor();
        let mut loaded = Map::new();
        for entity in entities {
            loaded.insert(tmp_id(descriptor, entity)?, Value::Object(entity.clone()));
        }
        self.entities.insert(step, loaded);
        Ok(())
    }

    pub fn set_default_individual(&mut self) -> Result<StepTable, RegistrationError> {
        let mut individual = Map::new();
        individual.insert("individual_id".to_string(), Value::from("no_individual"));
        individual.insert("sex".to_string(), Value::from("na"));
        individual.insert("organism".to_string(), Value::from("not_applicable"));
        individual.insert(
            IDENTIFIER_FIELD.to_string(),
            Value::String(self.source.mint()),
        );

        let table = StepTable::new(
            individual.keys().cloned().collect(),
            vec![
                individual
                    .values()
                    .map(|value| value.as_str().unwrap_or_default().to_string())
                    .collect(),
            ],
        );
        self.load_form_format(StepKind::Individual, &[individual])?;
        Ok(table)
    }

    pub fn reset(&mut self, step: StepKind) {
        self.entities.remove(&step);
    }

    pub fn validate_step<F: FieldValidator>(
        &mut self,
        step: StepKind,
        fields: &[F],
    ) -> Result<(), RegistrationError> {
        let descriptor = step.descriptor();
        let mut messages = Vec::new();
        if let Some(entities) = self.entities.get_mut(&step) {
            for (tmp_id, entity) in entities.iter_mut() {
                let Some(entity) = entity.as_object_mut() else {
                    continue;
                };
                let errors = check_entity(entity, fields);
                if !errors.is_empty() {
                    messages.push(format!(
                        "{tmp_id} did not validate against form '{}': {}",
                        descriptor.form_name,
                        errors.join(" / ")
                    ));
                }
            }
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(RegistrationError::ValidationFailed {
                subject: format!("Step '{}'", descriptor.name),
                messages,
            })
        }
    }

    pub fn samples(&self) -> Vec<Value> {
        self.entities
            .get(&StepKind::Sample)
            .map(|entities| entities.values().cloned().collect())
            .unwrap_or_default()
    }
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            return Ok(());
        }
        writer.write_all(b", ")
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            return Ok(());
        }
        writer.write_all(b", ")
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

fn user_json_text(user_json: &Map<String, Value>) -> Result<String, RegistrationError> {
    let malformed = |reason: String| RegistrationError::MalformedValue {
        property: DEFAULT_JSON_FIELD.to_string(),
        reason,
    };
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedFormatter);
    user_json
        .serialize(&mut serializer)
        .map_err(|err| malformed(err.to_string()))?;
    String::from_utf8(buffer).map_err(|err| malformed(err.to_string()))
}

fn tmp_id(
    descriptor: &StepDescriptor,
    entity: &Map<String, Value>,
) -> Result<String, RegistrationError> {
    let missing = || RegistrationError::MissingReference {
        property: descriptor.prop_name_for_tmp_id.to_string(),
        step: descriptor.name.to_string(),
    };
    match entity.get(descriptor.prop_name_for_tmp_id) {
        Some(Value::String(text)) if !text.is_empty() => Ok(text.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        _ => Err(missing()),
    }
}
