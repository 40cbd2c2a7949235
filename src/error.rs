use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistrationError {
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("malformed value for {property}: {reason}")]
    MalformedValue { property: String, reason: String },

    #[error("missing field in record: {0}")]
    MissingField(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no record with {name} = {value}")]
    NotFound { name: String, value: String },

    #[error("{subject} did not validate: ERR: {}", .messages.join(" ERR: "))]
    ValidationFailed {
        subject: String,
        messages: Vec<String>,
    },

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("{property} is required for each {step}")]
    MissingReference { property: String, step: String },

    #[error("missing config file mreg.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("property list request failed: {0}")]
    PropertyHttp(String),

    #[error("property list endpoint returned status {status}: {message}")]
    PropertyStatus { status: u16, message: String },
}

impl RegistrationError {
    pub(crate) fn malformed(property: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistrationError::MalformedValue {
            property: property.into(),
            reason: reason.into(),
        }
    }
}
