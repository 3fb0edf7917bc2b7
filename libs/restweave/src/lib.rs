//! Run-time primitives for synthesized REST client methods.
//!
//! A synthesized method body only ever talks to the types exported here:
//! it builds a [`Request`] with a [`RequestBuilder`], dispatches it through a
//! shared [`HttpClient`], and turns the [`Response`] into the declared result
//! with the helpers on [`Response`]. Non-success responses and (optionally)
//! transport failures surface as [`RestError`].

pub mod client;
pub mod content;
pub mod error;
#[cfg(feature = "observable")]
pub mod observable;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{ClientConfig, HttpClient};
pub use content::Content;
pub use error::{BuildError, RestError, TransportError};
pub use request::{Request, RequestBuilder};
pub use response::{ByteStream, Response};
pub use transport::{PreparedRequest, Transport};

#[cfg(feature = "reqwest-transport")]
pub use transport::reqwest::ReqwestTransport;

pub use http::{Method, StatusCode};
pub use tokio_util::sync::CancellationToken;

/// Name under which this library is referenced from woven modules.
pub const LIBRARY_NAME: &str = "restweave";
