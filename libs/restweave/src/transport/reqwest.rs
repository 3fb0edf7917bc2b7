use async_trait::async_trait;
use tracing::debug;

use super::{PreparedRequest, Transport};
use crate::content::Content;
use crate::error::TransportError;
use crate::response::Response;

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<Response, TransportError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self.client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.content {
            Content::Empty => builder,
            Content::Text(s) => builder.body(s),
            Content::Binary(b) => builder.body(b),
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned())))
            .collect::<Vec<_>>();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        debug!(status = status.as_u16(), len = body.len(), "response received");
        Ok(Response {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            body,
        })
    }
}
