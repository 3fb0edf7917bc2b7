use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Why a synthesis unit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Reason {
    // configuration
    InvalidAddress,
    NoClientNorAddress,
    InvalidClientSource,
    MalformedHeader,
    // shape
    InvalidSerializerShape,
    InvalidDeserializerShape,
    ExpectStubMethod,
    InvalidHttpMethod,
    UnsupportedReturnShape,
    InvalidHeadersParameterType,
    ObservableAdapterUnavailable,
    MisplacedMarker,
    // binding
    AttrValuesCannotBeNull,
    AttrValuesOutOfRange,
    DuplicateCancellationSignal,
    NoSerializerConfigured,
    UnresolvedPathPlaceholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Configuration,
    Shape,
    Binding,
}

impl Reason {
    pub fn category(self) -> Category {
        use Reason::*;
        match self {
            InvalidAddress | NoClientNorAddress | InvalidClientSource | MalformedHeader => {
                Category::Configuration
            }
            InvalidSerializerShape
            | InvalidDeserializerShape
            | ExpectStubMethod
            | InvalidHttpMethod
            | UnsupportedReturnShape
            | InvalidHeadersParameterType
            | ObservableAdapterUnavailable
            | MisplacedMarker => Category::Shape,
            AttrValuesCannotBeNull
            | AttrValuesOutOfRange
            | DuplicateCancellationSignal
            | NoSerializerConfigured
            | UnresolvedPathPlaceholder => Category::Binding,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A synthesis-time failure, with the step trail that was active when it
/// was raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} in {subject}: {message}")]
pub struct WeaveError {
    pub reason: Reason,
    /// `Type` or `Type::method`.
    pub subject: String,
    pub message: String,
    pub trail: Vec<String>,
    /// Set when the failure aborted the whole containing type.
    pub structural: bool,
}

impl WeaveError {
    pub fn new(reason: Reason, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason,
            subject: subject.into(),
            message: message.into(),
            trail: Vec::new(),
            structural: false,
        }
    }

    pub fn with_trail(mut self, trail: Vec<String>) -> Self {
        self.trail = trail;
        self
    }

    /// Marks a failure raised while resolving the type itself.
    pub fn into_structural(mut self) -> Self {
        self.structural = true;
        self
    }

    pub fn is_structural(&self) -> bool {
        self.structural
    }
}
