//! The seam between [`crate::HttpClient`] and the actual network stack.

use async_trait::async_trait;
use http::Method;
use url::Url;

use crate::content::Content;
use crate::error::TransportError;
use crate::response::Response;

#[cfg(feature = "reqwest-transport")]
pub mod reqwest;

/// A request with its URI resolved against the base address and the
/// client's default headers merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub content: Content,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Executes prepared requests. Implementations must be safe to share
/// between concurrent in-flight calls.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: PreparedRequest) -> Result<Response, TransportError>;
}
