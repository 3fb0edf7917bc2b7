//! The closed table of return shapes.

use crate::error::Reason;
use crate::ir::{Format, ResponseRead, TypeRef};

/// What the response is turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeContent {
    RawResponse,
    StatusCode,
    Text,
    Binary,
    Stream,
    /// Success is checked, the content is discarded.
    Unit,
    Deserialized(TypeRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    Future,
    Observable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnShape {
    /// Return the compiled request without dispatching it.
    RawRequest,
    Dispatch {
        wrapper: Wrapper,
        content: ShapeContent,
    },
}

impl ReturnShape {
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            ReturnShape::Dispatch {
                wrapper: Wrapper::Observable,
                ..
            }
        )
    }
}

impl ShapeContent {
    /// How the response is read before any deserialization.
    pub fn read(&self, deserialize_from: Option<Format>) -> ResponseRead {
        match self {
            ShapeContent::RawResponse => ResponseRead::Response,
            ShapeContent::StatusCode => ResponseRead::Status,
            ShapeContent::Text => ResponseRead::Text,
            ShapeContent::Binary => ResponseRead::Bytes,
            ShapeContent::Stream => ResponseRead::Stream,
            ShapeContent::Unit => ResponseRead::Unit,
            ShapeContent::Deserialized(_) => match deserialize_from {
                Some(Format::Binary) => ResponseRead::Bytes,
                _ => ResponseRead::Text,
            },
        }
    }
}

/// Classify a declared return type. `adapter_available` tells whether the
/// observable adapter library can be used by the module.
pub fn classify(ret: &TypeRef, adapter_available: bool) -> Result<ReturnShape, (Reason, String)> {
    match ret {
        TypeRef::Named(p) if p == TypeRef::REQUEST => Ok(ReturnShape::RawRequest),
        TypeRef::Future(inner) => Ok(ReturnShape::Dispatch {
            wrapper: Wrapper::Future,
            content: content(inner)?,
        }),
        TypeRef::Observable(inner) => {
            if !adapter_available {
                return Err((
                    Reason::ObservableAdapterUnavailable,
                    "observable return types need the observable adapter library".to_owned(),
                ));
            }
            Ok(ReturnShape::Dispatch {
                wrapper: Wrapper::Observable,
                content: content(inner)?,
            })
        }
        other => Err(unsupported(other)),
    }
}

fn content(inner: &TypeRef) -> Result<ShapeContent, (Reason, String)> {
    Ok(match inner {
        TypeRef::Unit => ShapeContent::Unit,
        TypeRef::String => ShapeContent::Text,
        TypeRef::Bytes => ShapeContent::Binary,
        TypeRef::Named(p) if p == TypeRef::RESPONSE => ShapeContent::RawResponse,
        TypeRef::Named(p) if p == TypeRef::STATUS_CODE => ShapeContent::StatusCode,
        TypeRef::Named(p) if p == TypeRef::BYTE_STREAM => ShapeContent::Stream,
        TypeRef::Named(p)
            if p == TypeRef::REQUEST || p == TypeRef::CLIENT || p == TypeRef::CANCELLATION =>
        {
            return Err(unsupported(inner))
        }
        TypeRef::Future(_) | TypeRef::Observable(_) | TypeRef::Generic(_) => {
            return Err(unsupported(inner))
        }
        TypeRef::Bool
        | TypeRef::Int
        | TypeRef::Float
        | TypeRef::Object
        | TypeRef::Map(..)
        | TypeRef::List(_)
        | TypeRef::Named(_) => ShapeContent::Deserialized(inner.clone()),
    })
}

fn unsupported(ty: &TypeRef) -> (Reason, String) {
    (
        Reason::UnsupportedReturnShape,
        format!(
            "return type must be {}, a future or an observable of a supported content type; found {ty:?}",
            TypeRef::REQUEST
        ),
    )
}
