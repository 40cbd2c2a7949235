use std::fs;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::converter::ApiLayout;
use crate::error::RegistrationError;
use crate::mapper::PropertyMapper;
use crate::normalize::{DEFAULT_JSON_FIELD, NormalizeOptions};

pub const DEFAULT_CONFIG_FILE: &str = "mreg.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub key_field: Option<String>,
    #[serde(default)]
    pub value_field: Option<String>,
    #[serde(default)]
    pub normalize: Option<NormalizeSection>,
    #[serde(default)]
    pub json_fields: Option<Vec<String>>,
    #[serde(default)]
    pub property_endpoint: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NormalizeSection {
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub use_parent_key: Option<bool>,
    #[serde(default)]
    pub missing_value: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PropertyEntry {
    Pair(String, String),
    Detailed(PropertyEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PropertyEntryObject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub layout: ApiLayout,
    pub normalize: NormalizeOptions,
    pub json_fields: Vec<String>,
    pub mapper: PropertyMapper,
    pub property_endpoint: Option<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            layout: ApiLayout::default(),
            normalize: NormalizeOptions::default(),
            json_fields: default_json_fields(),
            mapper: PropertyMapper::new(),
            property_endpoint: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RegistrationError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(RegistrationError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RegistrationError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RegistrationError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, RegistrationError> {
        match Self::resolve(path) {
            Err(RegistrationError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RegistrationError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let defaults = ApiLayout::default();
        let key_field = config.key_field.unwrap_or(defaults.key_field);
        let value_field = config.value_field.unwrap_or(defaults.value_field);
        if key_field.trim().is_empty() || value_field.trim().is_empty() {
            return Err(RegistrationError::Configuration(
                "key_field and value_field must not be empty".to_string(),
            ));
        }
        if key_field == value_field {
            return Err(RegistrationError::Configuration(format!(
                "key_field and value_field must differ, both are {key_field:?}"
            )));
        }

        let mut normalize = NormalizeOptions::default();
        if let Some(section) = config.normalize {
            if let Some(separator) = section.separator {
                normalize.separator = separator;
            }
            if let Some(use_parent_key) = section.use_parent_key {
                normalize.use_parent_key = use_parent_key;
            }
            if let Some(missing_value) = section.missing_value {
                normalize.missing_value = missing_value;
            }
        }

        let mapper = PropertyMapper::from_pairs(config.properties.into_iter().map(|entry| {
            match entry {
                PropertyEntry::Pair(id, name) => (id, name),
                PropertyEntry::Detailed(obj) => (obj.id, obj.name),
            }
        }));

        Ok(ResolvedConfig {
            schema_version,
            layout: ApiLayout::new(key_field, value_field),
            normalize,
            json_fields: config.json_fields.unwrap_or_else(default_json_fields),
            mapper,
            property_endpoint: config.property_endpoint,
        })
    }
}

pub fn default_json_fields() -> Vec<String> {
    vec![DEFAULT_JSON_FIELD.to_string()]
}
