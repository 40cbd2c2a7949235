use std::collections::HashMap;

use serde_json::Value;

use crate::error::RegistrationError;

pub trait Mapper {
    fn name_for(&self, property_id: &str) -> Result<&str, RegistrationError>;

    fn id_for(&self, property_name: &str) -> Result<&str, RegistrationError>;
}

impl<M: Mapper + ?Sized> Mapper for &M {
    fn name_for(&self, property_id: &str) -> Result<&str, RegistrationError> {
        (**self).name_for(property_id)
    }

    fn id_for(&self, property_name: &str) -> Result<&str, RegistrationError> {
        (**self).id_for(property_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMapper {
    id_to_name: HashMap<String, String>,
    name_to_id: HashMap<String, String>,
}

impl PropertyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut mapper = Self::new();
        for (id, name) in pairs {
            mapper.insert(id, name);
        }
        mapper
    }

    pub fn from_property_list(
        records: &[Value],
        id_field: &str,
        name_field: &str,
    ) -> Result<Self, RegistrationError> {
        let pairs = map_key_value(records, id_field, name_field)?;
        Ok(Self::from_pairs(pairs))
    }

    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        let name = name.into();
        if let Some(previous) = self.id_to_name.insert(id.clone(), name.clone()) {
            if previous != name && self.name_to_id.get(&previous) == Some(&id) {
                self.name_to_id.remove(&previous);
            }
        }
        self.name_to_id.insert(name, id);
    }

    pub fn len(&self) -> usize {
        self.id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_name.is_empty()
    }
}

impl Mapper for PropertyMapper {
    fn name_for(&self, property_id: &str) -> Result<&str, RegistrationError> {
        self.id_to_name
            .get(property_id)
            .map(String::as_str)
            .ok_or_else(|| RegistrationError::UnknownProperty(property_id.to_string()))
    }

    fn id_for(&self, property_name: &str) -> Result<&str, RegistrationError> {
        self.name_to_id
            .get(property_name)
            .map(String::as_str)
            .ok_or_else(|| RegistrationError::UnknownProperty(property_name.to_string()))
    }
}

/// Maps `key` to `value` over a list of top-level records. Identical keys keep the
/// last value. Non-string scalars are rendered with their JSON text.
pub fn map_key_value(
    records: &[Value],
    key: &str,
    value: &str,
) -> Result<Vec<(String, String)>, RegistrationError> {
    let mut order: Vec<String> = Vec::new();
    let mut mapping: HashMap<String, String> = HashMap::new();
    for record in records {
        let k = scalar_field(record, key)?;
        let v = scalar_field(record, value)?;
        if mapping.insert(k.clone(), v).is_none() {
            order.push(k);
        }
    }
    Ok(order
        .into_iter()
        .filter_map(|k| mapping.remove(&k).map(|v| (k, v)))
        .collect())
}

fn scalar_field(record: &Value, field: &str) -> Result<String, RegistrationError> {
    match record.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(Value::Bool(flag)) => Ok(flag.to_string()),
        Some(_) => Err(RegistrationError::malformed(field, "expected a scalar value")),
        None => Err(RegistrationError::MissingField(field.to_string())),
    }
}
