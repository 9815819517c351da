//! Error types for block invocations.
//!
//! Two layers:
//!
//! * [`AwsError`] is a flat, serializable record of a single failure reported
//!   by an AWS endpoint (or by the HTTP layer underneath it). It follows the
//!   error model of the official `aws-sdk-*` crates: code, message, HTTP
//!   status, request id, service and action.
//! * [`BlockError`] tags a failure with the pipeline stage that produced it,
//!   so the hosting platform can tell a rejected role assumption apart from a
//!   genuine service-side error.

use crate::xml::{self, XmlShape};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A failure returned by an AWS service or the transport below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsError {
    /// The AWS error code (e.g., "ValidationError", "AccessDenied").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// The HTTP status code returned by the AWS API (0 when no response arrived).
    pub status_code: u16,
    /// AWS request ID for tracing (returned in response headers or body).
    pub request_id: Option<String>,
    /// The AWS service that returned the error (e.g., "sts", "s3").
    pub service: String,
    /// The specific API action that failed.
    pub action: Option<String>,
    /// Whether the SDK retry policy would consider this transient.
    /// Informational only: invocations are never retried.
    pub retryable: bool,
}

impl fmt::Display for AwsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AWS {} error [{}]: {} (HTTP {})",
            self.service, self.code, self.message, self.status_code
        )?;
        if let Some(ref req_id) = self.request_id {
            write!(f, " [RequestId: {}]", req_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for AwsError {}

impl AwsError {
    /// Create a new AWS error.
    pub fn new(service: &str, code: &str, message: &str, status_code: u16) -> Self {
        let retryable = Self::is_retryable_code(code, status_code);
        Self {
            code: code.to_string(),
            message: message.to_string(),
            status_code,
            request_id: None,
            service: service.to_string(),
            action: None,
            retryable,
        }
    }

    /// A response that arrived but could not be decoded.
    pub fn parse(service: &str, message: &str) -> Self {
        Self {
            code: "ParseError".to_string(),
            message: message.to_string(),
            status_code: 200,
            request_id: None,
            service: service.to_string(),
            action: None,
            retryable: false,
        }
    }

    /// A failure below HTTP (connect, TLS, timeout, reset).
    pub fn transport(service: &str, message: &str, retryable: bool) -> Self {
        Self {
            code: "HttpError".to_string(),
            message: message.to_string(),
            status_code: 0,
            request_id: None,
            service: service.to_string(),
            action: None,
            retryable,
        }
    }

    /// With request ID.
    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    /// With action.
    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    /// Determine if an error code/status is transient per AWS SDK retry policy.
    fn is_retryable_code(code: &str, status_code: u16) -> bool {
        if matches!(status_code, 429 | 502 | 503 | 504) {
            return true;
        }
        matches!(
            code,
            "Throttling"
                | "ThrottlingException"
                | "ThrottledException"
                | "RequestThrottledException"
                | "TooManyRequestsException"
                | "ProvisionedThroughputExceededException"
                | "RequestLimitExceeded"
                | "BandwidthLimitExceeded"
                | "RequestThrottled"
                | "SlowDown"
                | "EC2ThrottledException"
                | "InternalError"
                | "InternalFailure"
                | "ServiceUnavailable"
                | "RequestTimeout"
                | "RequestTimeoutException"
                | "IDPCommunicationError"
        )
    }

    /// Decode an error body, picking the XML or JSON decoder by its first
    /// significant character.
    ///
    /// REST-JSON services put the error code in the `x-amzn-errortype`
    /// header instead of the body; pass it as `error_type_header`.
    pub fn from_response(
        service: &str,
        status_code: u16,
        body: &str,
        error_type_header: Option<&str>,
    ) -> Self {
        let trimmed = body.trim_start();
        let mut err = if trimmed.starts_with('<') {
            Self::parse_xml_error(service, status_code, trimmed)
        } else if trimmed.is_empty() {
            Self::new(
                service,
                &default_code_for_status(status_code),
                &format!("HTTP {} from {} with empty body", status_code, service),
                status_code,
            )
        } else {
            Self::parse_json_error(service, status_code, trimmed)
        };
        if let Some(header) = error_type_header {
            // "ResourceNotFoundException:http://internal.amazon.com/..."
            let code = header.split(':').next().unwrap_or(header);
            if !code.is_empty() && (err.code == "UnknownError" || err.code == "ParseError") {
                err = Self {
                    code: code.to_string(),
                    retryable: Self::is_retryable_code(code, status_code),
                    ..err
                };
            }
        }
        err
    }

    /// Parse an AWS XML error response.
    ///
    /// Query services wrap the error in `<ErrorResponse><Error>…`, EC2 in
    /// `<Response><Errors><Error>…`, S3 returns a bare `<Error>`.
    /// ```xml
    /// <ErrorResponse>
    ///   <Error>
    ///     <Code>AccessDenied</Code>
    ///     <Message>User is not authorized to perform: sts:AssumeRole</Message>
    ///   </Error>
    ///   <RequestId>abc-123</RequestId>
    /// </ErrorResponse>
    /// ```
    pub fn parse_xml_error(service: &str, status_code: u16, body: &str) -> Self {
        let root = xml::xml_to_value(body, &XmlShape::default())
            .map(|(_, v)| v)
            .unwrap_or(serde_json::Value::Null);
        let error = find_error_element(&root);
        let text = |value: Option<&serde_json::Value>, name: &str| {
            value
                .and_then(|v| v.get(name))
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let code = text(error, "Code").unwrap_or_else(|| "UnknownError".to_string());
        let message = text(error, "Message")
            .unwrap_or_else(|| format!("HTTP {} from {}", status_code, service));
        let request_id = ["RequestId", "RequestID"]
            .iter()
            .find_map(|&name| text(Some(&root), name).or_else(|| text(error, name)));

        let mut err = Self::new(service, &code, &message, status_code);
        err.request_id = request_id;
        err
    }

    /// Parse an AWS JSON error response.
    ///
    /// ```json
    /// {
    ///   "__type": "com.amazonaws.kms#NotFoundException",
    ///   "message": "Key 'alias/missing' does not exist"
    /// }
    /// ```
    pub fn parse_json_error(service: &str, status_code: u16, body: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(val) => {
                let code = val
                    .get("__type")
                    .or_else(|| val.get("code"))
                    .or_else(|| val.get("Code"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.rsplit('#').next().unwrap_or(s).to_string())
                    .unwrap_or_else(|| "UnknownError".to_string());
                let message = val
                    .get("message")
                    .or_else(|| val.get("Message"))
                    .or_else(|| val.get("errorMessage"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown error")
                    .to_string();
                Self::new(service, &code, &message, status_code)
            }
            Err(_) => {
                let preview: String = body.chars().take(200).collect();
                Self::new(
                    service,
                    "ParseError",
                    &format!("Failed to parse error response: {}", preview),
                    status_code,
                )
            }
        }
    }
}

fn default_code_for_status(status_code: u16) -> String {
    match status_code {
        400 => "BadRequest",
        401 | 403 => "AccessDenied",
        404 => "NotFound",
        409 => "Conflict",
        429 => "TooManyRequestsException",
        500 => "InternalError",
        503 => "ServiceUnavailable",
        _ => "UnknownError",
    }
    .to_string()
}

/// The element carrying `<Code>`: the root itself (S3), or one reached
/// through `Error` / `Errors` children. Repeated errors yield the first.
fn find_error_element(value: &serde_json::Value) -> Option<&serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.first().and_then(find_error_element),
        serde_json::Value::Object(map) if map.contains_key("Code") => Some(value),
        serde_json::Value::Object(map) => ["Error", "Errors"]
            .iter()
            .filter_map(|name| map.get(*name))
            .find_map(find_error_element),
        _ => None,
    }
}

/// Convenience result type for AWS calls.
pub type AwsResult<T> = Result<T, AwsError>;

// ── Invocation-level errors ─────────────────────────────────────────────

/// The pipeline stage at which an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Config,
    Credential,
    Operation,
    Serialization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::Credential => "credential",
            Stage::Operation => "operation",
            Stage::Serialization => "serialization",
        };
        f.write_str(s)
    }
}

/// Failure of a single block invocation, tagged with the stage that failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlockError {
    /// Invalid input detected before any network call.
    #[error("invalid configuration for '{field}': {message}")]
    Config {
        /// The offending input field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// STS role assumption failed; the target operation was not attempted.
    #[error("failed to assume role '{role_arn}': {source}")]
    Credential {
        /// The role that could not be assumed.
        role_arn: String,
        /// The STS failure.
        source: AwsError,
    },

    /// The target operation failed (service fault or transport error).
    #[error("{service}:{operation} failed: {source}")]
    Operation {
        service: String,
        operation: String,
        source: AwsError,
    },

    /// The operation succeeded but its result could not be materialized
    /// for emission.
    #[error("{service}:{operation} response could not be serialized: {message}")]
    Serialization {
        service: String,
        operation: String,
        message: String,
    },
}

impl BlockError {
    /// Create a configuration error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a credential-resolution error.
    pub fn credential(role_arn: impl Into<String>, source: AwsError) -> Self {
        Self::Credential {
            role_arn: role_arn.into(),
            source,
        }
    }

    /// Create an operation error.
    pub fn operation(service: &str, operation: &str, source: AwsError) -> Self {
        Self::Operation {
            service: service.to_string(),
            operation: operation.to_string(),
            source: source.with_action(operation),
        }
    }

    /// Create a serialization error.
    pub fn serialization(service: &str, operation: &str, message: impl Into<String>) -> Self {
        Self::Serialization {
            service: service.to_string(),
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config { .. } => Stage::Config,
            Self::Credential { .. } => Stage::Credential,
            Self::Operation { .. } => Stage::Operation,
            Self::Serialization { .. } => Stage::Serialization,
        }
    }

    /// The underlying AWS failure, if the error came from a network call.
    pub fn aws_error(&self) -> Option<&AwsError> {
        match self {
            Self::Credential { source, .. } | Self::Operation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience result type for block invocations.
pub type BlockResult<T> = Result<T, BlockError>;
