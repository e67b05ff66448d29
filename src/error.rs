//! Error types for target database API calls.
//!
//! Errors fall into five groups: local input errors raised before any I/O
//! (missing, unknown or invalid parameters, malformed path templates),
//! transport errors, protocol errors carrying the parsed error payload,
//! serialization errors, and cancellation. Every variant that relates to a
//! received response keeps enough context (service name, status, raw body) to
//! act on it.

use http::{Method, StatusCode};

use crate::types::ErrorResponse;

/// The main error type for target database API calls.
///
/// # Examples
///
/// ```no_run
/// use vws_client::{AccessKeys, Error, TargetService};
///
/// # async fn example() -> Result<(), Error> {
/// let service = TargetService::builder().build()?;
/// let keys = AccessKeys::new("access", "secret");
///
/// match service.target_list().get(&keys, "missing").execute().await {
///     Ok(target) => println!("Found {:?}", target.target_record),
///     Err(Error::ServiceApi { status, error, .. }) => {
///         eprintln!("API error {}: {:?}", status, error.result_code);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required path or query parameter was not supplied.
    #[error("Path \"{path}\" misses a \"{name}\" parameter")]
    MissingParameter {
        /// The REST path template of the request
        path: String,
        /// The name of the missing parameter
        name: String,
    },

    /// A parameter was supplied that the request does not declare.
    #[error("Invalid parameter \"{name}\" was specified for service {service}")]
    UnknownParameter {
        /// The service name
        service: String,
        /// The undeclared parameter name
        name: String,
    },

    /// A parameter value failed its declared validation pattern.
    #[error("Parameter validation failed for \"{name}\" (service {service})")]
    ParameterValidation {
        /// The service name
        service: String,
        /// The parameter that failed validation
        name: String,
    },

    /// The `:N` truncation modifier of a path template group is not a number.
    #[error("Can't parse number after ':' in path \"{path}\". Parameter is \"{parameter}\"")]
    MalformedPathTemplate {
        /// The REST path template
        path: String,
        /// The offending variable specification
        parameter: String,
    },

    /// The HTTP method is not one of GET, POST, PUT or DELETE.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(Method),

    /// A query string could not be split into key/value pairs.
    #[error("Invalid query string [{query}]. Invalid part [{part}]")]
    InvalidQueryString {
        /// The full query string
        query: String,
        /// The part without exactly one `=`
        part: String,
    },

    /// The request URL exceeds the configured maximum length.
    #[error("Request URL is {length} characters long, the maximum is {max}")]
    UrlTooLong {
        /// The length of the rejected URL
        length: usize,
        /// The configured maximum
        max: usize,
    },

    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The call was cancelled through its cancellation token.
    ///
    /// Cancellation is never retried and never wrapped as another error.
    #[error("Request was cancelled")]
    Cancelled,

    /// The service answered with a non-2xx status that was not resolved by a
    /// retry or a redirect.
    ///
    /// # Fields
    ///
    /// * `service` - The name of the service that raised the error
    /// * `status` - The HTTP status code of the final response
    /// * `error` - The parsed error payload
    #[error("The service {service} has thrown an exception (HTTP {status}): {:?}", .error.result_code)]
    ServiceApi {
        /// The service name
        service: String,
        /// The HTTP status code
        status: StatusCode,
        /// The parsed error body
        error: ErrorResponse,
    },

    /// A 2xx response body could not be parsed into the expected type.
    #[error("Failed to parse response from server as {service} json [{raw_response}]: {reason}")]
    ResponseParse {
        /// The service name
        service: String,
        /// The raw response body
        raw_response: String,
        /// The parser error message
        reason: String,
    },

    /// An error response body could not be parsed, or parsed to nothing.
    #[error("An error occurred in service {service}, but the error response could not be deserialized: {reason}")]
    ErrorResponseParse {
        /// The service name
        service: String,
        /// The raw response body
        raw_response: String,
        /// The parser error message
        reason: String,
    },

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An invalid URL was provided or produced.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns `true` if this error is potentially retryable.
    ///
    /// Network errors, timeouts, and 5xx service errors are considered
    /// retryable. Local input errors, parse errors and cancellation are not.
    ///
    /// # Examples
    ///
    /// ```
    /// use vws_client::Error;
    ///
    /// assert!(Error::Timeout.is_retryable());
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Timeout => true,
            Error::ServiceApi { status, .. } => status.is_server_error(),
            Error::MissingParameter { .. }
            | Error::UnknownParameter { .. }
            | Error::ParameterValidation { .. }
            | Error::MalformedPathTemplate { .. }
            | Error::UnsupportedMethod(_)
            | Error::InvalidQueryString { .. }
            | Error::UrlTooLong { .. }
            | Error::Cancelled
            | Error::ResponseParse { .. }
            | Error::ErrorResponseParse { .. }
            | Error::SerializationFailed(_)
            | Error::ConfigurationError(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns `true` if the call ended because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::ServiceApi { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::ResponseParse { raw_response, .. } => Some(raw_response),
            Error::ErrorResponseParse { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the parsed error payload of a [`Error::ServiceApi`].
    pub fn api_error(&self) -> Option<&ErrorResponse> {
        match self {
            Error::ServiceApi { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Maps a `reqwest` failure, keeping timeouts distinguishable.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(error)
        }
    }
}

/// A specialized `Result` type for target database API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseResponse, ResultCode};

    #[test]
    fn service_api_error_exposes_status_and_payload() {
        let err = Error::ServiceApi {
            service: "target".to_string(),
            status: StatusCode::NOT_FOUND,
            error: BaseResponse {
                result_code: ResultCode::UnknownTarget,
                transaction_id: "T2".to_string(),
            },
        };

        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            err.api_error().map(|e| e.result_code),
            Some(ResultCode::UnknownTarget)
        );
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("UnknownTarget"));
    }

    #[test]
    fn local_errors_are_not_retryable() {
        let err = Error::MissingParameter {
            path: "/targets/{targetId}".to_string(),
            name: "targetId".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Path \"/targets/{targetId}\" misses a \"targetId\" parameter"
        );
        assert!(Error::Cancelled.is_cancelled());
    }
}
