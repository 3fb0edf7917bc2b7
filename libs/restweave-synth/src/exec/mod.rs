//! Executes woven modules against the `restweave` run-time.
//!
//! Synthesized bodies run as-is; user code (constructors, serializers,
//! deserializers) is supplied as native closures keyed by `Type::method`.

mod interpreter;
mod native;
mod value;

use restweave::{BuildError, RestError, TransportError};
use thiserror::Error;

pub use interpreter::{ClientFactory, Interpreter, Outcome};
pub use native::{NativeCall, NativeFn, NativeTable};
pub use value::{Instance, Value};

#[derive(Debug, Error)]
pub enum ExecError {
    /// Non-success status, or a translated transport failure.
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("request could not be built: {0}")]
    Build(#[from] BuildError),
    #[error("user code {call} failed: {message}")]
    Native { call: String, message: String },
    /// The module cannot be executed as written.
    #[error("{0}")]
    Fault(String),
}

impl ExecError {
    pub(crate) fn fault(msg: impl Into<String>) -> Self {
        ExecError::Fault(msg.into())
    }

    pub fn rest(&self) -> Option<&RestError> {
        match self {
            ExecError::Rest(e) => Some(e),
            _ => None,
        }
    }
}
