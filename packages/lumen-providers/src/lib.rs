pub mod embedding;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key:?} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

#[cfg(test)]
mod tests {
	use serde_json::{Map, Value};

	use crate::auth_headers;

	#[test]
	fn rejects_non_string_default_headers() {
		let mut defaults = Map::new();

		defaults.insert("x-retries".to_string(), Value::from(3));

		assert!(auth_headers("key", &defaults).is_err());
	}

	#[test]
	fn carries_bearer_token_and_defaults() {
		let mut defaults = Map::new();

		defaults.insert("x-tenant".to_string(), Value::from("docs"));

		let headers = auth_headers("key", &defaults).expect("Headers should build.");

		assert_eq!(headers.get("authorization").and_then(|v| v.to_str().ok()), Some("Bearer key"));
		assert_eq!(headers.get("x-tenant").and_then(|v| v.to_str().ok()), Some("docs"));
	}
}
