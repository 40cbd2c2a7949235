use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RegistrationError;
use crate::steps::{IDENTIFIER_FIELD, StepKind, steps};

const REQUIRED_MESSAGE: &str = "This field is required.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Boolean,
    Text,
    Number,
    Choice(Vec<String>),
    List,
}

pub trait FieldValidator {
    fn name(&self) -> &str;
    fn required(&self) -> bool;
    fn kind(&self) -> &FieldKind;
    fn validate(&self, entity: &Map<String, Value>) -> Result<(), Vec<String>>;
}

pub trait FormRegistry {
    type Field: FieldValidator;

    fn fields(&self, step: StepKind) -> Option<&[Self::Field]>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.required = true;
        self
    }
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Bool(flag)) => !flag,
        _ => false,
    }
}

impl FieldValidator for FieldRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    fn kind(&self) -> &FieldKind {
        &self.kind
    }

    fn validate(&self, entity: &Map<String, Value>) -> Result<(), Vec<String>> {
        let value = entity.get(&self.name);
        if is_empty_value(value) {
            return if self.required {
                Err(vec![REQUIRED_MESSAGE.to_string()])
            } else {
                Ok(())
            };
        }
        let Some(value) = value else {
            return Ok(());
        };

        let error = match (&self.kind, value) {
            (FieldKind::Boolean, Value::Bool(_)) => None,
            (FieldKind::Boolean, _) => Some("Not a valid boolean value.".to_string()),
            (FieldKind::Text, Value::String(_)) => None,
            (FieldKind::Text, _) => Some("Not a valid string value.".to_string()),
            (FieldKind::Number, Value::Number(_)) => None,
            (FieldKind::Number, Value::String(text)) if text.trim().parse::<f64>().is_ok() => None,
            (FieldKind::Number, _) => Some("Not a valid number value.".to_string()),
            (FieldKind::Choice(choices), Value::String(text)) if choices.contains(text) => None,
            (FieldKind::Choice(_), _) => Some("Not a valid choice.".to_string()),
            (FieldKind::List, Value::Array(items))
                if items.iter().all(|item| !item.is_object() && !item.is_array()) =>
            {
                None
            }
            (FieldKind::List, _) => Some("Not a valid list of values.".to_string()),
        };
        match error {
            Some(message) => Err(vec![message]),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormSet {
    forms: HashMap<StepKind, Vec<FieldRule>>,
}

impl FormSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form(mut self, step: StepKind, fields: Vec<FieldRule>) -> Self {
        self.forms.insert(step, fields);
        self
    }
}

impl FormRegistry for FormSet {
    type Field = FieldRule;

    fn fields(&self, step: StepKind) -> Option<&[FieldRule]> {
        self.forms.get(&step).map(Vec::as_slice)
    }
}

pub fn str_to_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "y" | "yes" | "on" | "t"
    )
}

pub fn check_entity<F: FieldValidator>(
    entity: &mut Map<String, Value>,
    fields: &[F],
) -> Vec<String> {
    for field in fields {
        if *field.kind() != FieldKind::Boolean {
            continue;
        }
        if let Some(Value::String(text)) = entity.get(field.name()) {
            let flag = str_to_bool(text);
            entity.insert(field.name().to_string(), Value::Bool(flag));
        }
    }

    let entity = &*entity;
    fields
        .iter()
        .filter(|field| field.required() || entity.contains_key(field.name()))
        .filter_map(|field| {
            field.validate(entity).err().map(|errors| {
                format!("Field '{}' did not validate: {errors:?}", field.name())
            })
        })
        .collect()
}

pub fn validate_record<R: FormRegistry>(
    record: &Value,
    steps_to_validate: &[StepKind],
    forms: &R,
) -> Result<(), RegistrationError> {
    let mut messages = Vec::new();

    for step in steps() {
        if !steps_to_validate.contains(&step.kind) {
            continue;
        }
        let Some(mut entity) = step.bare_entity(record) else {
            continue;
        };
        let fields = forms.fields(step.kind).ok_or_else(|| {
            RegistrationError::Configuration(format!("no form for step {}", step.name))
        })?;
        let errors = check_entity(&mut entity, fields);
        if !errors.is_empty() {
            debug!(step = step.name, failures = errors.len(), "step did not validate");
            messages.push(format!(
                "Step '{}' did not validate: {}",
                step.name,
                errors.join(" / ")
            ));
        }
    }

    if messages.is_empty() {
        return Ok(());
    }
    let identifier = record
        .get(IDENTIFIER_FIELD)
        .and_then(Value::as_str)
        .unwrap_or("without uuid");
    Err(RegistrationError::ValidationFailed {
        subject: format!("Sample {identifier}"),
        messages,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entity(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn str_to_bool_accepts_usual_spellings() {
        for text in ["true", "TRUE", "1", "y", "Yes", "on", "t"] {
            assert!(str_to_bool(text), "{text}");
        }
        for text in ["false", "0", "no", "", "maybe"] {
            assert!(!str_to_bool(text), "{text}");
        }
    }

    #[test]
    fn optional_absent_fields_are_not_checked() {
        let fields = vec![FieldRule::new("age", FieldKind::Number)];
        let mut sample = entity(json!({"sample_id": "S1"}));
        assert!(check_entity(&mut sample, &fields).is_empty());
    }

    #[test]
    fn boolean_text_is_coerced_before_checking() {
        let fields = vec![FieldRule::new("is_control", FieldKind::Boolean)];
        let mut sample = entity(json!({"is_control": "Yes"}));
        assert!(check_entity(&mut sample, &fields).is_empty());
        assert_eq!(sample["is_control"], json!(true));
    }

    #[test]
    fn failures_are_collected_in_form_order() {
        let fields = vec![
            FieldRule::new("sample_id", FieldKind::Text).mandatory(),
            FieldRule::new("tissue", FieldKind::Choice(vec!["blood".to_string()])),
            FieldRule::new("age", FieldKind::Number),
        ];
        let mut sample = entity(json!({"tissue": "liver", "age": "12.5"}));
        let errors = check_entity(&mut sample, &fields);
        assert_eq!(
            errors,
            vec![
                "Field 'sample_id' did not validate: [\"This field is required.\"]".to_string(),
                "Field 'tissue' did not validate: [\"Not a valid choice.\"]".to_string(),
            ]
        );
    }

    #[test]
    fn form_set_reads_step_names() {
        let forms: FormSet = serde_json::from_value(json!({
            "sample": [{"name": "sample_id", "required": true, "kind": "text"}],
            "treatment_ind": [{"name": "dose", "kind": {"choice": ["low", "high"]}}]
        }))
        .unwrap();
        assert_eq!(forms.fields(StepKind::Sample).unwrap().len(), 1);
        assert_eq!(
            forms.fields(StepKind::TreatmentIndividual).unwrap()[0].kind,
            FieldKind::Choice(vec!["low".to_string(), "high".to_string()])
        );
        assert!(forms.fields(StepKind::Individual).is_none());
    }
}
