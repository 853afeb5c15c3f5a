//! Error types for the Cloud Foundry client.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// A single error entry reported by the platform.
///
/// The controller reports one or more of these per failed request; jobs carry
/// them in their terminal `failed` state as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. `CF-ResourceNotFound` or `10010`).
    pub code: Option<String>,
    /// Short human-readable title.
    pub title: Option<String>,
    /// Detailed description of what went wrong.
    pub detail: String,
}

impl ErrorDetail {
    /// Creates a detail entry carrying only a description.
    pub fn from_detail(detail: impl Into<String>) -> Self {
        Self {
            code: None,
            title: None,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.title) {
            (Some(code), Some(title)) => write!(f, "{} ({}): {}", title, code, self.detail),
            (Some(code), None) => write!(f, "{}: {}", code, self.detail),
            (None, Some(title)) => write!(f, "{}: {}", title, self.detail),
            (None, None) => write!(f, "{}", self.detail),
        }
    }
}

/// A well-formed non-2xx response from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code of the response.
    pub status: u16,
    /// One or more error entries parsed from the response body.
    pub errors: Vec<ErrorDetail>,
}

impl ApiError {
    /// Creates an API error with a single generic detail entry.
    pub fn with_status(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            errors: vec![ErrorDetail::from_detail(detail)],
        }
    }

    /// Parses a platform error document into the common shape.
    ///
    /// Accepts the v3 `errors` array, the legacy v2 single-error document and
    /// the identity service's `error`/`error_description` pair. Anything else
    /// falls back to an error carrying only the status and a generic detail.
    pub fn from_response_body(status: u16, body: &[u8]) -> Self {
        if let Ok(document) = serde_json::from_slice::<ErrorDocument>(body) {
            if let Some(errors) = document.into_details() {
                return Self { status, errors };
            }
        }

        Self::with_status(status, format!("HTTP {} error", status))
    }

    /// Returns true if the response was a 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns true if the response was a 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Returns true if the response was a 422.
    pub fn is_validation_failed(&self) -> bool {
        self.status == 422
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        for error in &self.errors {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

/// Error taxonomy for all client operations.
///
/// Every failure surfaced by the client is one of these variants; none are
/// retried internally except the bounded poll loop of the job waiter and the
/// single 401 re-authentication pass of the request operator.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Connection, TLS or timeout failure before a response was interpreted.
    /// Never carries a parsed server payload.
    #[error("transport error: {message}")]
    Transport {
        /// What failed at the transport level.
        message: String,
        /// Whether the failure was a request timeout.
        timed_out: bool,
    },

    /// A token grant or refresh exchange failed.
    #[error("authentication failed ({status}): {description}")]
    Authentication {
        /// HTTP status of the token endpoint response.
        status: u16,
        /// Server-reported description, or a generic one.
        description: String,
    },

    /// The platform returned a well-formed non-2xx response.
    #[error("{0}")]
    Api(ApiError),

    /// The server response violated an assumed invariant, e.g. a paginated
    /// collection without a total-page count or a multipart response without
    /// a boundary parameter.
    #[error("protocol error: {message}")]
    Protocol {
        /// The violated invariant.
        message: String,
    },

    /// An accepted asynchronous operation terminated in a failure state.
    #[error("job failed: {}", format_job_errors(.errors))]
    JobFailed {
        /// Error entries reported with the job's terminal state.
        errors: Vec<ErrorDetail>,
    },

    /// A bounded wait exceeded its budget without reaching a terminal state.
    #[error("timed out after {elapsed:?}")]
    Timeout {
        /// Time spent waiting before giving up.
        elapsed: Duration,
    },

    /// Invalid configuration or construction input.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was invalid.
        message: String,
    },
}

impl ClientError {
    /// Creates a transport error from a reqwest failure, preserving the
    /// timeout/connect distinction.
    pub fn transport(source: &reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            format!("request timed out: {}", source)
        } else if source.is_connect() {
            format!("connection failed: {}", source)
        } else {
            format!("request failed: {}", source)
        };

        Self::Transport {
            message,
            timed_out: source.is_timeout(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the API error if this is a well-formed platform error.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(error) => Some(error),
            _ => None,
        }
    }

    /// Returns true for a 404 platform response.
    pub fn is_not_found(&self) -> bool {
        self.as_api_error().is_some_and(ApiError::is_not_found)
    }
}

fn format_job_errors(errors: &[ErrorDetail]) -> String {
    if errors.is_empty() {
        return "no detail reported".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Union of the error document shapes the platform's services produce.
#[derive(Debug, Deserialize)]
struct ErrorDocument {
    // v3 controller: {"errors": [{"code": 10010, "title": ..., "detail": ...}]}
    errors: Option<Vec<V3Error>>,
    // legacy v2 controller: {"code": 100004, "description": ..., "error_code": "CF-AppNotFound"}
    description: Option<String>,
    error_code: Option<String>,
    code: Option<serde_json::Value>,
    // identity service: {"error": "invalid_token", "error_description": ...}
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V3Error {
    code: Option<serde_json::Value>,
    title: Option<String>,
    detail: Option<String>,
}

impl ErrorDocument {
    fn into_details(self) -> Option<Vec<ErrorDetail>> {
        if let Some(errors) = self.errors {
            let details: Vec<ErrorDetail> = errors
                .into_iter()
                .map(|e| ErrorDetail {
                    code: e.code.map(|c| scalar_to_string(&c)),
                    title: e.title,
                    detail: e.detail.unwrap_or_default(),
                })
                .collect();
            if !details.is_empty() {
                return Some(details);
            }
        }

        if let Some(description) = self.description {
            return Some(vec![ErrorDetail {
                code: self.code.as_ref().map(scalar_to_string),
                title: self.error_code,
                detail: description,
            }]);
        }

        if let Some(error) = self.error {
            return Some(vec![ErrorDetail {
                code: Some(error),
                title: None,
                detail: self.error_description.unwrap_or_default(),
            }]);
        }

        None
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_v3_errors_array() {
        let body = br#"{"errors":[{"code":10010,"title":"CF-ResourceNotFound","detail":"App not found"}]}"#;
        let error = ApiError::from_response_body(404, body);

        assert_eq!(error.status, 404);
        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors[0].code.as_deref(), Some("10010"));
        assert_eq!(error.errors[0].title.as_deref(), Some("CF-ResourceNotFound"));
        assert_eq!(error.errors[0].detail, "App not found");
        assert!(error.is_not_found());
    }

    #[test]
    fn parses_legacy_v2_document() {
        let body =
            br#"{"code":100004,"description":"The app could not be found","error_code":"CF-AppNotFound"}"#;
        let error = ApiError::from_response_body(404, body);

        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors[0].code.as_deref(), Some("100004"));
        assert_eq!(error.errors[0].title.as_deref(), Some("CF-AppNotFound"));
        assert_eq!(error.errors[0].detail, "The app could not be found");
    }

    #[test]
    fn parses_identity_service_document() {
        let body = br#"{"error":"invalid_token","error_description":"The token expired"}"#;
        let error = ApiError::from_response_body(401, body);

        assert_eq!(error.errors[0].code.as_deref(), Some("invalid_token"));
        assert_eq!(error.errors[0].detail, "The token expired");
        assert!(error.is_unauthorized());
    }

    #[test]
    fn unparseable_body_falls_back_to_status_only() {
        let error = ApiError::from_response_body(502, b"<html>Bad Gateway</html>");

        assert_eq!(error.status, 502);
        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors[0].detail, "HTTP 502 error");
    }

    #[test]
    fn timeout_and_job_failure_are_distinct() {
        let timeout = ClientError::Timeout {
            elapsed: Duration::from_secs(5),
        };
        let failed = ClientError::JobFailed {
            errors: vec![ErrorDetail::from_detail("staging failed")],
        };

        assert!(matches!(timeout, ClientError::Timeout { .. }));
        assert!(matches!(failed, ClientError::JobFailed { .. }));
        assert!(failed.to_string().contains("staging failed"));
    }
}
