use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use http::StatusCode;

use crate::error::RestError;

/// Response body exposed as a stream of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// A fully received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    /// Response with the canonical reason phrase and no headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Pass the response through if its status is 2xx, otherwise wrap it in [`RestError`].
    pub fn ensure_success(self) -> Result<Self, RestError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(RestError::from_response(self))
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    pub fn into_stream(self) -> ByteStream {
        let body = self.body;
        if body.is_empty() {
            return stream::empty().boxed();
        }
        stream::once(async move { Ok(body) }).boxed()
    }

    // Success-checked readers used by synthesized bodies.

    pub fn read_text(self) -> Result<String, RestError> {
        self.ensure_success().map(|r| r.text())
    }

    pub fn read_bytes(self) -> Result<Bytes, RestError> {
        self.ensure_success().map(Response::into_bytes)
    }

    pub fn read_stream(self) -> Result<ByteStream, RestError> {
        self.ensure_success().map(Response::into_stream)
    }
}
