use serde_json::{Map, Value};
use tracing::debug;

use crate::error::RegistrationError;
use crate::mapper::Mapper;
pub use crate::tree::ApiLayout;
use crate::tree::{Entry, EntrySelector, Record};

#[derive(Debug, Clone)]
pub struct FormatConverter<M: Mapper> {
    mapper: M,
    layout: ApiLayout,
    root: Record,
}

impl<M: Mapper> FormatConverter<M> {
    pub fn new(mapper: M) -> Self {
        Self::with_layout(mapper, ApiLayout::default())
    }

    pub fn with_layout(mapper: M, layout: ApiLayout) -> Self {
        Self {
            mapper,
            layout,
            root: Record::default(),
        }
    }

    pub fn from_api(mapper: M, layout: ApiLayout, data: &Value) -> Result<Self, RegistrationError> {
        let mut converter = Self::with_layout(mapper, layout);
        converter.add_api_format(data)?;
        Ok(converter)
    }

    pub fn from_form(
        mapper: M,
        layout: ApiLayout,
        data: &Value,
    ) -> Result<Self, RegistrationError> {
        let mut converter = Self::with_layout(mapper, layout);
        converter.add_form_format(data)?;
        Ok(converter)
    }

    pub fn add_api_format(&mut self, data: &Value) -> Result<&mut Self, RegistrationError> {
        let items = data.as_array().ok_or_else(|| {
            RegistrationError::malformed("records", "API format data must be a list")
        })?;
        self.root = Record::from_api(items, &self.mapper, &self.layout)?;
        debug!(entries = self.root.len(), "loaded API format");
        Ok(self)
    }

    pub fn add_form_format(&mut self, data: &Value) -> Result<&mut Self, RegistrationError> {
        let map = data.as_object().ok_or_else(|| {
            RegistrationError::malformed("records", "form format data must be a map")
        })?;
        self.root = Record::from_form(map, &self.mapper)?;
        debug!(entries = self.root.len(), "loaded form format");
        Ok(self)
    }

    pub fn to_api(&self) -> Value {
        self.root.to_api(&self.layout)
    }

    pub fn to_form(&self) -> Value {
        Value::Object(self.root.to_form_map())
    }

    pub fn to_form_map(&self) -> Map<String, Value> {
        self.root.to_form_map()
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn layout(&self) -> &ApiLayout {
        &self.layout
    }

    pub fn entries(&self) -> &[Entry] {
        self.root.entries()
    }

    pub fn root(&self) -> &Record {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Record {
        &mut self.root
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.root.into_entries()
    }

    pub fn clean_data(&mut self) -> Vec<Entry> {
        let discarded = self.root.clean();
        debug!(discarded = discarded.len(), "cleaned entries");
        discarded
    }

    pub fn get_entry_by_name(&self, name: &str) -> Option<&Entry> {
        self.root.get_entry_by_name(name)
    }

    pub fn get_entry_by_name_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.root.get_entry_by_name_mut(name)
    }

    pub fn add_or_update_entries<I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = Entry>,
    {
        self.root.add_or_update_entries(entries);
        self
    }

    pub fn remove_entries(
        &mut self,
        selector: &EntrySelector,
    ) -> Result<Vec<Entry>, RegistrationError> {
        self.root.remove_entries(selector)
    }

    pub fn sort_from<S: AsRef<str>>(&mut self, schema_field_names: &[S]) -> &mut Self {
        self.root.sort_from(schema_field_names);
        self
    }

    pub fn sort_with_reserved<R: AsRef<str>, S: AsRef<str>>(
        &mut self,
        reserved: &[R],
        schema_field_names: &[S],
    ) -> &mut Self {
        self.root.sort_with_reserved(reserved, schema_field_names);
        self
    }
}

pub fn collapse_property_objects(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let collapsed = match value {
                        Value::Object(inner) if key == "property" => {
                            match inner.get("id").cloned() {
                                Some(id) => id,
                                None => collapse_property_objects(Value::Object(inner)),
                            }
                        }
                        other => collapse_property_objects(other),
                    };
                    (key, collapsed)
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(collapse_property_objects).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mapper::PropertyMapper;

    #[test]
    fn failed_load_keeps_previous_entries() {
        let mapper = PropertyMapper::from_pairs([("1", "username")]);
        let mut converter = FormatConverter::new(mapper);
        converter
            .add_form_format(&json!({"username": "Edward"}))
            .unwrap();
        assert!(converter.add_form_format(&json!({"unknown": 1})).is_err());
        assert_eq!(converter.to_form(), json!({"username": "Edward"}));
    }

    #[test]
    fn collapse_property_objects_replaces_nested_properties() {
        let input = json!({
            "key_1": "value_1",
            "key_3": [{
                "key_2": 123,
                "property": {"id": "5e59341a08a7b2ec0319cda1", "name": "xxxxx"}
            }]
        });
        let expected = json!({
            "key_1": "value_1",
            "key_3": [{"key_2": 123, "property": "5e59341a08a7b2ec0319cda1"}]
        });
        assert_eq!(collapse_property_objects(input), expected);
    }
}
