use std::mem;

use serde_json::{Map, Number, Value};

use crate::error::RegistrationError;
use crate::mapper::Mapper;
use crate::normalize::flatten;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLayout {
    pub key_field: String,
    pub value_field: String,
}

impl ApiLayout {
    pub fn new(key_field: impl Into<String>, value_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            value_field: value_field.into(),
        }
    }
}

impl Default for ApiLayout {
    fn default() -> Self {
        Self::new("property", "value")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl Primitive {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Primitive::Null),
            Value::Bool(flag) => Some(Primitive::Bool(*flag)),
            Value::Number(number) => Some(Primitive::Number(number.clone())),
            Value::String(text) => Some(Primitive::Text(text.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Primitive::Null => Value::Null,
            Primitive::Bool(flag) => Value::Bool(*flag),
            Primitive::Number(number) => Value::Number(number.clone()),
            Primitive::Text(text) => Value::String(text.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Primitive::Null => true,
            Primitive::Text(text) => text.is_empty(),
            Primitive::Bool(_) | Primitive::Number(_) => false,
        }
    }

    fn trim(&mut self) {
        if let Primitive::Text(text) = self {
            let trimmed = text.trim();
            if trimmed.len() != text.len() {
                *text = trimmed.to_string();
            }
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::Text(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Primitive::Text(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Bool(value)
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Primitive::Number(value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Primitive(Primitive),
    PrimitiveList(Vec<Primitive>),
    Record(Record),
    RecordList(RecordList),
}

impl PropertyValue {
    fn from_api<M: Mapper + ?Sized>(
        property: &str,
        raw: &Value,
        mapper: &M,
        layout: &ApiLayout,
    ) -> Result<Self, RegistrationError> {
        match raw {
            Value::Array(items) => {
                if let Some(list) = primitive_list(items) {
                    return Ok(PropertyValue::PrimitiveList(list));
                }
                if items.iter().all(Value::is_object) {
                    return Ok(PropertyValue::Record(Record::from_api(items, mapper, layout)?));
                }
                if items.iter().all(Value::is_array) {
                    let records = items
                        .iter()
                        .filter_map(Value::as_array)
                        .map(|inner| Record::from_api(inner, mapper, layout))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(PropertyValue::RecordList(RecordList::new(records)));
                }
                Err(RegistrationError::malformed(
                    property,
                    "list mixes primitives, records and record lists",
                ))
            }
            Value::Object(_) => Err(RegistrationError::malformed(
                property,
                "nested records must be lists of property/value records in API format",
            )),
            other => Ok(PropertyValue::Primitive(scalar(other))),
        }
    }

    fn from_form<M: Mapper + ?Sized>(
        property: &str,
        raw: &Value,
        mapper: &M,
    ) -> Result<Self, RegistrationError> {
        match raw {
            Value::Object(map) => Ok(PropertyValue::Record(Record::from_form(map, mapper)?)),
            Value::Array(items) => {
                if let Some(list) = primitive_list(items) {
                    return Ok(PropertyValue::PrimitiveList(list));
                }
                if items.iter().all(Value::is_object) {
                    let records = items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|map| Record::from_form(map, mapper))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(PropertyValue::RecordList(RecordList::new(records)));
                }
                Err(RegistrationError::malformed(
                    property,
                    "list must hold only primitives or only records in form format",
                ))
            }
            other => Ok(PropertyValue::Primitive(scalar(other))),
        }
    }

    pub fn to_api(&self, layout: &ApiLayout) -> Value {
        match self {
            PropertyValue::Primitive(primitive) => primitive.to_json(),
            PropertyValue::PrimitiveList(items) => {
                Value::Array(items.iter().map(Primitive::to_json).collect())
            }
            PropertyValue::Record(record) => record.to_api(layout),
            PropertyValue::RecordList(list) => list.to_api(layout),
        }
    }

    pub fn to_form(&self) -> Value {
        match self {
            PropertyValue::Primitive(primitive) => primitive.to_json(),
            PropertyValue::PrimitiveList(items) => {
                Value::Array(items.iter().map(Primitive::to_json).collect())
            }
            PropertyValue::Record(record) => Value::Object(record.to_form_map()),
            PropertyValue::RecordList(list) => list.to_form(),
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            PropertyValue::Primitive(primitive) => Some(primitive),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            PropertyValue::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            PropertyValue::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_record_list(&self) -> Option<&RecordList> {
        match self {
            PropertyValue::RecordList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_record_list_mut(&mut self) -> Option<&mut RecordList> {
        match self {
            PropertyValue::RecordList(list) => Some(list),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, PropertyValue::Primitive(primitive) if primitive.is_blank())
    }

    fn clean_into(&mut self, discarded: &mut Vec<Entry>) {
        match self {
            PropertyValue::Primitive(primitive) => primitive.trim(),
            PropertyValue::PrimitiveList(items) => {
                items.iter_mut().for_each(Primitive::trim);
                items.retain(|item| !item.is_blank());
            }
            PropertyValue::Record(record) => discarded.extend(record.clean()),
            PropertyValue::RecordList(list) => {
                for record in list.records_mut() {
                    discarded.extend(record.clean());
                }
            }
        }
    }
}

impl From<Primitive> for PropertyValue {
    fn from(value: Primitive) -> Self {
        PropertyValue::Primitive(value)
    }
}

/// An empty list is a primitive list: nothing in it says otherwise.
fn primitive_list(items: &[Value]) -> Option<Vec<Primitive>> {
    items.iter().map(Primitive::from_json).collect()
}

fn scalar(value: &Value) -> Primitive {
    Primitive::from_json(value).unwrap_or(Primitive::Null)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub property_id: String,
    pub property_name: String,
    pub value: PropertyValue,
}

impl Entry {
    pub fn new(
        property_id: impl Into<String>,
        property_name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self {
            property_id: property_id.into(),
            property_name: property_name.into(),
            value: value.into(),
        }
    }

    pub fn from_api<M: Mapper + ?Sized>(
        item: &Value,
        mapper: &M,
        layout: &ApiLayout,
    ) -> Result<Self, RegistrationError> {
        let object = item.as_object().ok_or_else(|| {
            RegistrationError::malformed(&layout.key_field, "API record must be an object")
        })?;
        let property_id = match object.get(&layout.key_field) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Object(expanded)) => expanded
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    RegistrationError::malformed(
                        &layout.key_field,
                        "expanded property carries no string id",
                    )
                })?,
            Some(_) => {
                return Err(RegistrationError::malformed(
                    &layout.key_field,
                    "property id must be a string",
                ));
            }
            None => {
                return Err(RegistrationError::malformed(
                    &layout.key_field,
                    "API record has no property field",
                ));
            }
        };
        let property_name = mapper.name_for(&property_id)?.to_string();
        let raw = object.get(&layout.value_field).ok_or_else(|| {
            RegistrationError::malformed(&property_id, "API record has no value field")
        })?;
        let value = PropertyValue::from_api(&property_id, raw, mapper, layout)?;
        Ok(Self {
            property_id,
            property_name,
            value,
        })
    }

    pub fn from_form<M: Mapper + ?Sized>(
        property_name: &str,
        raw: &Value,
        mapper: &M,
    ) -> Result<Self, RegistrationError> {
        let property_id = mapper.id_for(property_name)?.to_string();
        let value = PropertyValue::from_form(property_name, raw, mapper)?;
        Ok(Self {
            property_id,
            property_name: property_name.to_string(),
            value,
        })
    }

    pub fn to_api(&self, layout: &ApiLayout) -> Value {
        let mut object = Map::new();
        object.insert(
            layout.key_field.clone(),
            Value::String(self.property_id.clone()),
        );
        object.insert(layout.value_field.clone(), self.value.to_api(layout));
        Value::Object(object)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntrySelector {
    pub entries: Option<Vec<Entry>>,
    pub names: Option<Vec<String>>,
    pub ids: Option<Vec<String>>,
}

impl EntrySelector {
    pub fn by_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Some(entries),
            ..Self::default()
        }
    }

    pub fn by_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    fn criterion(&self) -> Result<Criterion<'_>, RegistrationError> {
        match (&self.entries, &self.names, &self.ids) {
            (Some(entries), None, None) => Ok(Criterion::Entries(entries)),
            (None, Some(names), None) => Ok(Criterion::Names(names)),
            (None, None, Some(ids)) => Ok(Criterion::Ids(ids)),
            (None, None, None) => Err(RegistrationError::Configuration(
                "entry removal needs one of entries, names or ids".to_string(),
            )),
            _ => Err(RegistrationError::Configuration(
                "entry removal accepts only one of entries, names or ids".to_string(),
            )),
        }
    }
}

enum Criterion<'a> {
    Entries(&'a [Entry]),
    Names(&'a [String]),
    Ids(&'a [String]),
}

impl Criterion<'_> {
    fn matches(&self, entry: &Entry) -> bool {
        match self {
            Criterion::Entries(entries) => entries
                .iter()
                .any(|candidate| candidate.property_id == entry.property_id),
            Criterion::Names(names) => names.iter().any(|name| *name == entry.property_name),
            Criterion::Ids(ids) => ids.iter().any(|id| *id == entry.property_id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<Entry>,
}

impl Record {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn from_api<M: Mapper + ?Sized>(
        items: &[Value],
        mapper: &M,
        layout: &ApiLayout,
    ) -> Result<Self, RegistrationError> {
        let entries = items
            .iter()
            .map(|item| Entry::from_api(item, mapper, layout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn from_form<M: Mapper + ?Sized>(
        map: &Map<String, Value>,
        mapper: &M,
    ) -> Result<Self, RegistrationError> {
        let entries = map
            .iter()
            .map(|(name, raw)| Entry::from_form(name, raw, mapper))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn to_api(&self, layout: &ApiLayout) -> Value {
        Value::Array(self.entries.iter().map(|entry| entry.to_api(layout)).collect())
    }

    pub fn to_form_map(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.property_name.clone(), entry.value.to_form()))
            .collect()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<Entry> {
        &mut self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_entry_by_name(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.property_name == name)
    }

    pub fn get_entry_by_name_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.property_name == name)
    }

    pub fn add_or_update_entries<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = Entry>,
    {
        for incoming in entries {
            match self
                .entries
                .iter_mut()
                .find(|entry| entry.property_id == incoming.property_id)
            {
                Some(existing) => existing.value = incoming.value,
                None => self.entries.push(incoming),
            }
        }
    }

    pub fn remove_entries(
        &mut self,
        selector: &EntrySelector,
    ) -> Result<Vec<Entry>, RegistrationError> {
        let criterion = selector.criterion()?;
        let (removed, kept): (Vec<Entry>, Vec<Entry>) = mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| criterion.matches(entry));
        self.entries = kept;
        Ok(removed)
    }

    /// Trims strings and drops entries left holding an empty string or null.
    /// Containers are kept even when they end up empty. Returns every dropped
    /// entry, nested ones included, in traversal order.
    pub fn clean(&mut self) -> Vec<Entry> {
        let mut discarded = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for mut entry in mem::take(&mut self.entries) {
            entry.value.clean_into(&mut discarded);
            if entry.value.is_blank() {
                discarded.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        discarded
    }

    pub fn sort_from<S: AsRef<str>>(&mut self, schema_field_names: &[S]) {
        self.sort_with_reserved::<&str, S>(&[], schema_field_names);
    }

    pub fn sort_with_reserved<R: AsRef<str>, S: AsRef<str>>(
        &mut self,
        reserved: &[R],
        schema_field_names: &[S],
    ) {
        let mut remaining: Vec<Option<Entry>> =
            mem::take(&mut self.entries).into_iter().map(Some).collect();
        let mut sorted = Vec::with_capacity(remaining.len());
        let names = reserved
            .iter()
            .map(|name| name.as_ref())
            .chain(schema_field_names.iter().map(|name| name.as_ref()));
        for name in names {
            for slot in remaining.iter_mut() {
                if slot
                    .as_ref()
                    .is_some_and(|entry| entry.property_name == name)
                {
                    sorted.extend(slot.take());
                }
            }
        }
        sorted.extend(remaining.into_iter().flatten());
        self.entries = sorted;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordList {
    records: Vec<Record>,
}

impl RecordList {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_api(&self, layout: &ApiLayout) -> Value {
        Value::Array(
            self.records
                .iter()
                .map(|record| record.to_api(layout))
                .collect(),
        )
    }

    pub fn to_form(&self) -> Value {
        Value::Array(
            self.records
                .iter()
                .map(|record| Value::Object(record.to_form_map()))
                .collect(),
        )
    }

    pub fn find(&self, name: &str, value: &Value) -> Result<(&Record, usize), RegistrationError> {
        let index = self
            .position(name, value)
            .ok_or_else(|| not_found(name, value))?;
        Ok((&self.records[index], index))
    }

    pub fn delete(&mut self, name: &str, value: &Value) -> Result<usize, RegistrationError> {
        let index = self
            .position(name, value)
            .ok_or_else(|| not_found(name, value))?;
        self.records.remove(index);
        Ok(index)
    }

    fn position(&self, name: &str, value: &Value) -> Option<usize> {
        self.records
            .iter()
            .position(|record| flatten(&record.to_form_map(), ".", false).get(name) == Some(value))
    }
}

fn not_found(name: &str, value: &Value) -> RegistrationError {
    RegistrationError::NotFound {
        name: name.to_string(),
        value: value.to_string(),
    }
}
