//! Registrar response envelope.
//!
//! Every command answers with a single-key JSON document named after the
//! command, e.g. `{"SearchResponse": {"ResponseCode": "0", ...}}`.
//! `ResponseCode` `"0"` is the only success value.

use serde_json::{Map, Value};

/// `ResponseCode` value for a successful command.
pub const RESPONSE_OK: &str = "0";

/// Parsed result of one registrar command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub success: bool,
    /// Body inside the `<Command>Response` wrapper.
    pub parsed: Option<Map<String, Value>>,
    /// Raw response text, kept for diagnostics.
    pub raw: String,
    /// Why the command did not succeed.
    pub error: Option<String>,
}

impl CommandResponse {
    /// A failed command that never produced a usable body.
    #[must_use]
    pub fn failed(error: impl Into<String>, raw: String) -> Self {
        Self {
            success: false,
            parsed: None,
            raw,
            error: Some(error.into()),
        }
    }

    /// Parse a raw response body.
    #[must_use]
    pub fn parse(raw: String) -> Self {
        let document: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => return Self::failed(format!("unparseable response: {e}"), raw),
        };

        let Some(body) = unwrap_envelope(document) else {
            return Self::failed("response has no <Command>Response body", raw);
        };

        let code = body.get("ResponseCode").and_then(response_code);
        match code.as_deref() {
            Some(RESPONSE_OK) => Self {
                success: true,
                parsed: Some(body),
                raw,
                error: None,
            },
            other => {
                let message = body
                    .get("Error")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("response code {}", other.unwrap_or("missing")));
                Self {
                    success: false,
                    parsed: Some(body),
                    raw,
                    error: Some(message),
                }
            }
        }
    }

    /// A string field from the response body.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.parsed.as_ref()?.get(key)?.as_str()
    }

    /// An array field from the response body.
    #[must_use]
    pub fn list(&self, key: &str) -> &[Value] {
        self.parsed
            .as_ref()
            .and_then(|body| body.get(key))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Take the body out of the single `*Response` key.
fn unwrap_envelope(document: Value) -> Option<Map<String, Value>> {
    let Value::Object(envelope) = document else {
        return None;
    };
    envelope.into_iter().find_map(|(key, value)| match value {
        Value::Object(body) if key.ends_with("Response") => Some(body),
        _ => None,
    })
}

/// Registrars send the code as either a string or a number.
fn response_code(value: &Value) -> Option<String> {
    match value {
        Value::String(code) => Some(code.trim().to_owned()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let response = CommandResponse::parse(
            r#"{"RegisterResponse":{"ResponseCode":"0","DomainName":"example.io"}}"#.to_owned(),
        );
        assert!(response.success);
        assert_eq!(response.field("DomainName"), Some("example.io"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_numeric_code() {
        let response =
            CommandResponse::parse(r#"{"SetNsResponse":{"ResponseCode":0}}"#.to_owned());
        assert!(response.success);
    }

    #[test]
    fn test_non_ok_code_carries_error() {
        let response = CommandResponse::parse(
            r#"{"RegisterResponse":{"ResponseCode":"-1","Error":"not available"}}"#.to_owned(),
        );
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("not available"));
        assert!(response.parsed.is_some());
    }

    #[test]
    fn test_missing_code() {
        let response = CommandResponse::parse(r#"{"SearchResponse":{}}"#.to_owned());
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("response code missing"));
    }

    #[test]
    fn test_garbage_body() {
        let response = CommandResponse::parse("<html>502</html>".to_owned());
        assert!(!response.success);
        assert!(response.parsed.is_none());
        assert_eq!(response.raw, "<html>502</html>");
    }

    #[test]
    fn test_wrong_envelope() {
        let response = CommandResponse::parse(r#"{"ResponseCode":"0"}"#.to_owned());
        assert!(!response.success);
    }

    #[test]
    fn test_list_field() {
        let response = CommandResponse::parse(
            r#"{"SearchResponse":{"ResponseCode":"0","SearchResults":[{"DomainName":"a.com"}]}}"#
                .to_owned(),
        );
        assert_eq!(response.list("SearchResults").len(), 1);
        assert!(response.list("Missing").is_empty());
    }
}
