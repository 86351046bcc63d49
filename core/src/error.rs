//! Error types for the GitLab API client.
//!
//! # Design
//! Status-derived variants carry an [`ErrorPayload`] with the status code and
//! the raw response body exactly as the server sent it, so nothing the remote
//! said is lost when an error crosses the crate boundary. Validation failures
//! additionally expose the field-level messages GitLab nests under
//! `"message"`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::http::{HttpResponse, TransportError};

/// Status code and raw body of a failed API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub status: u16,
    pub message: String,
}

impl ErrorPayload {
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            status: response.status,
            message: response.body.clone(),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

/// Field name to the list of messages the server reported for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors returned by every client operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resource not found ({0})")]
    NotFound(ErrorPayload),

    #[error("access denied ({0})")]
    AccessDenied(ErrorPayload),

    #[error("validation failed ({payload})")]
    Validation {
        payload: ErrorPayload,
        fields: FieldErrors,
    },

    #[error("conflict ({0})")]
    Conflict(ErrorPayload),

    /// 5xx; the caller may retry.
    #[error("server error ({0})")]
    Server(ErrorPayload),

    /// Any other status the operation does not expect.
    #[error("unexpected response ({0})")]
    Http(ErrorPayload),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(#[source] TransportError),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// Classify a non-success response by status code.
    pub fn from_response(response: &HttpResponse) -> Self {
        let payload = ErrorPayload::from_response(response);
        match response.status {
            400 | 422 => ApiError::Validation {
                fields: field_errors(&response.body),
                payload,
            },
            401 | 403 => ApiError::AccessDenied(payload),
            404 => ApiError::NotFound(payload),
            409 => ApiError::Conflict(payload),
            500..=599 => ApiError::Server(payload),
            _ => ApiError::Http(payload),
        }
    }

    /// The remote payload, when the error came from an HTTP response.
    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            ApiError::NotFound(p)
            | ApiError::AccessDenied(p)
            | ApiError::Conflict(p)
            | ApiError::Server(p)
            | ApiError::Http(p) => Some(p),
            ApiError::Validation { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.payload().map(|p| p.status)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Server faults and transport failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Server(_) | ApiError::Transport(_) | ApiError::Timeout(_)
        )
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::TimedOut(after) => ApiError::Timeout(after),
            other => ApiError::Transport(other),
        }
    }
}

/// Extract GitLab's field-level validation messages.
///
/// GitLab answers with `{"message": {"field": ["msg", ...]}}` for model
/// validation, `{"message": "text"}` for generic failures and
/// `{"error": "field is missing"}` for parameter validation. Only the first
/// shape carries per-field data; the others yield an empty map.
fn field_errors(body: &str) -> FieldErrors {
    let mut fields = FieldErrors::new();
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return fields;
    };
    let Some(message) = value.get("message").and_then(|m| m.as_object()) else {
        return fields;
    };
    for (field, messages) in message {
        let list = match messages {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|m| match m.as_str() {
                    Some(s) => s.to_string(),
                    None => m.to_string(),
                })
                .collect(),
            serde_json::Value::String(s) => vec![s.clone()],
            other => vec![other.to_string()],
        };
        fields.insert(field.clone(), list);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn maps_status_codes_to_variants() {
        assert!(matches!(
            ApiError::from_response(&response(404, "")),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_response(&response(401, "")),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            ApiError::from_response(&response(403, "")),
            ApiError::AccessDenied(_)
        ));
        assert!(matches!(
            ApiError::from_response(&response(409, "")),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_response(&response(503, "")),
            ApiError::Server(_)
        ));
        assert!(matches!(
            ApiError::from_response(&response(418, "")),
            ApiError::Http(_)
        ));
    }

    #[test]
    fn preserves_remote_payload() {
        let err = ApiError::from_response(&response(403, r#"{"message":"403 Forbidden"}"#));
        let payload = err.payload().unwrap();
        assert_eq!(payload.status, 403);
        assert_eq!(payload.message, r#"{"message":"403 Forbidden"}"#);
        assert!(err.to_string().contains("403 Forbidden"));
    }

    #[test]
    fn validation_collects_field_messages() {
        let body = r#"{"message":{"path":["has already been taken","is reserved"],"name":["can't be blank"]}}"#;
        let err = ApiError::from_response(&response(400, body));
        match err {
            ApiError::Validation { payload, fields } => {
                assert_eq!(payload.status, 400);
                assert_eq!(fields["path"], vec!["has already been taken", "is reserved"]);
                assert_eq!(fields["name"], vec!["can't be blank"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn validation_without_field_map_keeps_raw_body() {
        let err = ApiError::from_response(&response(400, r#"{"error":"name is missing"}"#));
        match err {
            ApiError::Validation { payload, fields } => {
                assert!(fields.is_empty());
                assert_eq!(payload.message, r#"{"error":"name is missing"}"#);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn transport_timeout_becomes_timeout() {
        let err: ApiError = TransportError::TimedOut(Duration::from_secs(3)).into();
        assert!(matches!(err, ApiError::Timeout(d) if d == Duration::from_secs(3)));
        let err: ApiError = TransportError::Connection("refused".into()).into();
        assert!(matches!(err, ApiError::Transport(_)));
        assert!(err.is_retryable());
    }
}
