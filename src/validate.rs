//! Response validation shared by endpoint methods.
//!
//! An endpoint method calls the transport, decodes the payload for the expected status, and
//! hands the outcome to [`validate`] (or [`validate_no_content`] for endpoints that return no
//! body). The helpers turn it into either the payload or an [`Error`] annotated with the
//! endpoint's operation name.
//!
//! ```rust
//! use http::StatusCode;
//! use restline::validate::{validate, ApiResponse};
//!
//! let ok = validate("get_site", Ok(ApiResponse::new(StatusCode::OK, Some(7))), StatusCode::OK);
//! assert_eq!(ok.unwrap(), 7);
//!
//! let missing = validate::<u32>("get_site", Ok(ApiResponse::new(StatusCode::NOT_FOUND, None)), StatusCode::OK);
//! assert_eq!(missing.unwrap_err().status(), Some(StatusCode::NOT_FOUND));
//! ```

use crate::error::Error;
use http::StatusCode;

/// Status code plus the payload decoded for it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    pub payload: Option<T>,
    /// Attempts the retry interceptor spent before giving up on `status`.
    pub attempts: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn new(status: StatusCode, payload: Option<T>) -> Self {
        Self { status, payload, attempts: None }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: Option<usize>) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Classify a status that differs from the expected one.
pub fn status_error(
    operation: &'static str,
    expected: StatusCode,
    actual: StatusCode,
    attempts: Option<usize>,
) -> Error {
    if actual == StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited { operation, attempts }
    } else if actual.is_server_error() {
        Error::Server { operation, status: actual, attempts }
    } else {
        Error::ApiStatus { operation, expected, actual }
    }
}

fn wrap(operation: &'static str, err: Error) -> Error {
    Error::Operation { operation, source: Box::new(err) }
}

/// Check transport outcome, status, and payload presence, in that order.
pub fn validate<T>(
    operation: &'static str,
    result: Result<ApiResponse<T>, Error>,
    expected: StatusCode,
) -> Result<T, Error> {
    let response = result.map_err(|err| wrap(operation, err))?;
    if response.status != expected {
        return Err(status_error(operation, expected, response.status, response.attempts));
    }
    response.payload.ok_or(Error::EmptyResponse { operation })
}

/// Like [`validate`] for endpoints without a payload.
pub fn validate_no_content(
    operation: &'static str,
    result: Result<StatusCode, Error>,
    expected: StatusCode,
) -> Result<(), Error> {
    let status = result.map_err(|err| wrap(operation, err))?;
    if status != expected {
        return Err(status_error(operation, expected, status, None));
    }
    Ok(())
}
