use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::error::RegistrationError;
use crate::mapper::PropertyMapper;

pub const FIELDS_HEADER: &str = "X-Fields";

pub trait PropertyClient {
    fn fetch_properties(&self, key: &str, value: &str) -> Result<Vec<Value>, RegistrationError>;
}

#[derive(Clone)]
pub struct PropertyHttpClient {
    client: Client,
    endpoint: String,
}

impl PropertyHttpClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RegistrationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mreg/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RegistrationError::PropertyHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| RegistrationError::PropertyHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, RegistrationError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, attempt, "retrying property list request");
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(error = %err, attempt, "retrying property list request");
                        std::thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(RegistrationError::PropertyHttp(err.to_string()));
                }
            }
        }
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, RegistrationError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "property list request failed".to_string());
        Err(RegistrationError::PropertyStatus { status, message })
    }
}

impl PropertyClient for PropertyHttpClient {
    fn fetch_properties(&self, key: &str, value: &str) -> Result<Vec<Value>, RegistrationError> {
        let fields = fields_header(key, value);
        let response =
            self.send_with_retries(|| self.client.get(&self.endpoint).header(FIELDS_HEADER, &fields))?;
        let response = Self::handle_status(response)?;
        let body: Value = response
            .json()
            .map_err(|err| RegistrationError::PropertyHttp(err.to_string()))?;
        match body {
            Value::Array(records) => {
                debug!(count = records.len(), endpoint = %self.endpoint, "fetched property list");
                Ok(records)
            }
            _ => Err(RegistrationError::PropertyHttp(
                "property list response is not a JSON list".to_string(),
            )),
        }
    }
}

pub fn load_mapper<C: PropertyClient + ?Sized>(
    client: &C,
) -> Result<PropertyMapper, RegistrationError> {
    let records = client.fetch_properties("id", "name")?;
    PropertyMapper::from_property_list(&records, "id", "name")
}

fn fields_header(key: &str, value: &str) -> String {
    format!("{key}, {value}")
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::mapper::Mapper;

    struct FixedClient {
        records: Vec<Value>,
        requested: RefCell<Vec<String>>,
    }

    impl PropertyClient for FixedClient {
        fn fetch_properties(
            &self,
            key: &str,
            value: &str,
        ) -> Result<Vec<Value>, RegistrationError> {
            self.requested.borrow_mut().push(fields_header(key, value));
            Ok(self.records.clone())
        }
    }

    #[test]
    fn load_mapper_keeps_last_duplicate() {
        let client = FixedClient {
            records: vec![
                json!({"id": "p1", "name": "sample_id"}),
                json!({"id": "p2", "name": "organism"}),
                json!({"id": "p1", "name": "sample_name"}),
            ],
            requested: RefCell::new(Vec::new()),
        };
        let mapper = load_mapper(&client).unwrap();
        assert_eq!(mapper.len(), 2);
        assert_eq!(mapper.name_for("p1").unwrap(), "sample_name");
        assert_eq!(mapper.id_for("organism").unwrap(), "p2");
        assert_eq!(client.requested.borrow().as_slice(), ["id, name"]);
    }

    #[test]
    fn load_mapper_rejects_records_without_name() {
        let client = FixedClient {
            records: vec![json!({"id": "p1"})],
            requested: RefCell::new(Vec::new()),
        };
        assert_matches!(
            load_mapper(&client),
            Err(RegistrationError::MissingField(field)) if field == "name"
        );
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
