use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use url::Url;

use crate::error::TransportError;
use crate::request::Request;
use crate::response::Response;
use crate::transport::{PreparedRequest, Transport};

/// Mutable per-client settings. Written during construction of the owning
/// service, read by every call afterwards.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_address: Option<Url>,
    pub default_headers: Vec<(String, String)>,
}

/// Shared HTTP client held by a service instance.
///
/// Cloning is cheap and every clone observes the same configuration; the
/// client is safe for concurrent use by many in-flight calls.
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<RwLock<ClientConfig>>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &*self.config.read())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "reqwest-transport")]
impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    #[cfg(feature = "reqwest-transport")]
    pub fn new() -> Self {
        Self::with_transport(Arc::new(crate::transport::reqwest::ReqwestTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(RwLock::new(ClientConfig::default())),
            transport,
        }
    }

    pub fn set_base_address(&self, address: &str) -> Result<(), url::ParseError> {
        let url = Url::parse(address)?;
        self.config.write().base_address = Some(url);
        Ok(())
    }

    pub fn base_address(&self) -> Option<Url> {
        self.config.read().base_address.clone()
    }

    pub fn add_default_header(&self, name: &str, value: &str) {
        self.config
            .write()
            .default_headers
            .push((name.to_owned(), value.to_owned()));
    }

    pub fn default_headers(&self) -> Vec<(String, String)> {
        self.config.read().default_headers.clone()
    }

    /// Resolve the request URI, merge headers, and attach the payload.
    ///
    /// Request headers replace default headers of the same name
    /// (case-insensitive); defaults keep their declaration order.
    pub fn prepare(&self, request: Request) -> Result<PreparedRequest, TransportError> {
        let config = self.config.read();
        let url = resolve_uri(config.base_address.as_ref(), &request.uri)?;

        let mut headers: Vec<(String, String)> = config
            .default_headers
            .iter()
            .filter(|(name, _)| {
                !request
                    .headers
                    .iter()
                    .any(|(n, _)| n.eq_ignore_ascii_case(name))
            })
            .cloned()
            .collect();
        headers.extend(request.headers);

        if let Some(ct) = request.content.default_content_type() {
            if !headers
                .iter()
                .any(|(n, _)| n.eq_ignore_ascii_case("content-type"))
            {
                headers.push(("Content-Type".to_owned(), ct.to_owned()));
            }
        }

        Ok(PreparedRequest {
            method: request.method,
            url,
            headers,
            content: request.content,
        })
    }

    /// Dispatch a request. A cancelled token aborts the in-flight call.
    pub async fn send(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<Response, TransportError> {
        let prepared = self.prepare(request)?;
        trace!(method = %prepared.method, url = %prepared.url, "dispatching");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            res = self.transport.execute(prepared) => res,
        }
    }
}

fn resolve_uri(base: Option<&Url>, uri: &str) -> Result<Url, TransportError> {
    if let Ok(absolute) = Url::parse(uri) {
        return Ok(absolute);
    }
    let invalid = |reason: String| TransportError::InvalidUri {
        uri: uri.to_owned(),
        reason,
    };
    let base = base.ok_or_else(|| invalid("relative uri without a base address".to_owned()))?;

    // join() drops the last segment unless the base ends with '/'
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(uri).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::request::RequestBuilder;
    use async_trait::async_trait;
    use http::{Method, StatusCode};

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn execute(&self, request: PreparedRequest) -> Result<Response, TransportError> {
            Ok(Response::new(StatusCode::OK, request.url.to_string()))
        }
    }

    struct Never;

    #[async_trait]
    impl Transport for Never {
        async fn execute(&self, _request: PreparedRequest) -> Result<Response, TransportError> {
            futures::future::pending().await
        }
    }

    fn client(base: &str) -> HttpClient {
        let c = HttpClient::with_transport(Arc::new(Echo));
        c.set_base_address(base).unwrap();
        c
    }

    #[test]
    fn relative_uri_is_joined_under_base_path() {
        let c = client("http://h.test/api");
        let req = RequestBuilder::new(Method::GET, "/items/{id}")
            .add_path_arg("id", 42)
            .compile()
            .unwrap();
        let prepared = c.prepare(req).unwrap();
        assert_eq!(prepared.url.as_str(), "http://h.test/api/items/42");
    }

    #[test]
    fn absolute_uri_overrides_base() {
        let c = client("http://h.test/api");
        let req = RequestBuilder::new(Method::GET, "http://other.test/x")
            .compile()
            .unwrap();
        assert_eq!(c.prepare(req).unwrap().url.as_str(), "http://other.test/x");
    }

    #[test]
    fn relative_uri_without_base_is_rejected() {
        let c = HttpClient::with_transport(Arc::new(Echo));
        let req = RequestBuilder::new(Method::GET, "x").compile().unwrap();
        assert!(matches!(
            c.prepare(req),
            Err(TransportError::InvalidUri { .. })
        ));
    }

    #[test]
    fn request_headers_replace_defaults_by_name() {
        let c = client("http://h.test/");
        c.add_default_header("Authorization", "Bearer default");
        c.add_default_header("X-Trace", "1");
        let req = RequestBuilder::new(Method::GET, "x")
            .add_header("authorization", "Bearer method")
            .compile()
            .unwrap();
        let prepared = c.prepare(req).unwrap();
        assert_eq!(
            prepared.headers,
            vec![
                ("X-Trace".to_owned(), "1".to_owned()),
                ("authorization".to_owned(), "Bearer method".to_owned()),
            ]
        );
    }

    #[test]
    fn text_body_gets_content_type() {
        let c = client("http://h.test/");
        let req = RequestBuilder::new(Method::POST, "x")
            .body_text("hi")
            .compile()
            .unwrap();
        let prepared = c.prepare(req).unwrap();
        assert_eq!(
            prepared.header("content-type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(prepared.content, Content::Text("hi".into()));
    }

    #[tokio::test]
    async fn send_goes_through_transport() {
        let c = client("http://h.test/api");
        let req = RequestBuilder::new(Method::GET, "hello").compile().unwrap();
        let resp = c.send(req, CancellationToken::new()).await.unwrap();
        assert_eq!(resp.text(), "http://h.test/api/hello");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_send() {
        let c = HttpClient::with_transport(Arc::new(Never));
        c.set_base_address("http://h.test/").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let req = RequestBuilder::new(Method::GET, "x").compile().unwrap();
        assert_eq!(c.send(req, token).await, Err(TransportError::Cancelled));
    }
}
