//! Error types for the VSC API client
//!
//! This module defines:
//! - `VscError`: every failure a client call can surface
//! - `RawHttpError`: an HTTP error response kept verbatim
//! - `decode_error_response`: the status/error-class table mapping
//!   error responses onto `VscError`

use std::fmt::{Display, Formatter};

use reqwest::{
    StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap},
};
use serde::Deserialize;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during VSC API client operations
#[derive(Debug, thiserror::Error)]
pub enum VscError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("object not found")]
    NotFound,

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("not implemented")]
    NotImplemented,

    #[error("internal server error")]
    InternalServerError,

    #[error("no alive servers: {reason}")]
    NoAliveServers {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{0}")]
    Unclassified(RawHttpError),

    #[error("invalid response body: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, VscError>;

impl VscError {
    pub(crate) fn no_alive_servers(
        reason: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        VscError::NoAliveServers {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn bad_argument(message: impl Into<String>) -> Self {
        VscError::BadArgument(message.into())
    }

    /// HTTP status behind the error, if it came from a server response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            VscError::NotAuthenticated => Some(StatusCode::UNAUTHORIZED),
            VscError::NotAuthorized(_) => Some(StatusCode::FORBIDDEN),
            VscError::NotFound => Some(StatusCode::NOT_FOUND),
            VscError::NotImplemented => Some(StatusCode::NOT_IMPLEMENTED),
            VscError::InternalServerError => Some(StatusCode::INTERNAL_SERVER_ERROR),
            VscError::Unclassified(raw) => Some(raw.status),
            _ => None,
        }
    }
}

/// An HTTP error response that could not be mapped to a specific error.
///
/// Status, headers and body are kept exactly as received so callers can
/// inspect them.
#[derive(Clone, Debug)]
pub struct RawHttpError {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RawHttpError {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Display for RawHttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.body.is_empty() {
            write!(f, "HTTP error {}", self.status)
        } else {
            write!(f, "HTTP error {}: {}", self.status, self.body_text())
        }
    }
}

impl std::error::Error for RawHttpError {}

/// Structured error entity sent by the server along with 403 responses
#[derive(Debug, Deserialize)]
struct ErrorEntity {
    error_class: String,
    error_message: String,
}

/// Map an HTTP error response onto the most specific `VscError` the
/// evidence supports. Anything not confidently recognised comes back as
/// `VscError::Unclassified` carrying the original response.
pub fn decode_error_response(raw: RawHttpError) -> VscError {
    match raw.status {
        StatusCode::UNAUTHORIZED => return VscError::NotAuthenticated,
        StatusCode::INTERNAL_SERVER_ERROR => return VscError::InternalServerError,
        StatusCode::NOT_IMPLEMENTED => return VscError::NotImplemented,
        StatusCode::NOT_FOUND => return VscError::NotFound,
        StatusCode::FORBIDDEN => {}
        _ => return VscError::Unclassified(raw),
    }

    let Some(entity) = decode_error_entity(&raw) else {
        return VscError::Unclassified(raw);
    };
    match entity.error_class.as_str() {
        "access_denied" => VscError::NotAuthorized(entity.error_message),
        "bad_argument" => VscError::BadArgument(entity.error_message),
        _ => VscError::Unclassified(raw),
    }
}

fn decode_error_entity(raw: &RawHttpError) -> Option<ErrorEntity> {
    let content_type = raw.headers.get(CONTENT_TYPE)?.to_str().ok()?;
    if !is_json_media_type(content_type) {
        return None;
    }
    let content_length: usize = raw
        .headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    if content_length == 0 || content_length != raw.body.len() {
        return None;
    }
    serde_json::from_slice(&raw.body).ok()
}

fn is_json_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
