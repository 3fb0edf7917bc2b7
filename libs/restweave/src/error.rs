use http::StatusCode;
use thiserror::Error;

use crate::response::Response;

/// The domain error returned by synthesized methods.
///
/// Either the server answered with a non-success status, or (when the woven
/// module enables transport translation) the request never produced a
/// response at all.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("{} - {reason}", status.as_u16())]
    Status {
        status: StatusCode,
        reason: String,
        response: Box<Response>,
    },
    #[error("{message}")]
    Transport { message: String },
}

impl RestError {
    pub fn from_response(response: Response) -> Self {
        RestError::Status {
            status: response.status,
            reason: response.reason.clone(),
            response: Box::new(response),
        }
    }

    pub fn from_transport(err: &TransportError) -> Self {
        RestError::Transport {
            message: err.to_string(),
        }
    }

    /// Status code of the failed response; `None` for translated transport failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RestError::Status { status, .. } => Some(*status),
            RestError::Transport { .. } => None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            RestError::Status { response, .. } => Some(response),
            RestError::Transport { .. } => None,
        }
    }

    /// True when no response was received (the call failed below HTTP).
    pub fn is_error(&self) -> bool {
        matches!(self, RestError::Transport { .. })
    }
}

/// Failures below the HTTP layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request was cancelled")]
    Cancelled,
    #[error("invalid request uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("network error: {0}")]
    Network(String),
}

/// Failures while compiling a [`crate::RequestBuilder`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("not all URI parameters were given: {}", names.join(", "))]
    UnresolvedPlaceholder { names: Vec<String> },
    #[error("URI parameter '{name}' cannot be null")]
    NullPathArg { name: String },
}
