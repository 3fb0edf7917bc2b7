use std::fmt::Display;
use std::sync::LazyLock;

use bytes::Bytes;
use http::Method;
use regex::Regex;

use crate::content::Content;
use crate::error::BuildError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder regex is valid"));

/// A compiled request, ready to be dispatched by an [`crate::HttpClient`].
///
/// `uri` is either absolute (overrides the client's base address) or
/// relative to it. It never starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub content: Content,
}

impl Request {
    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Incrementally builds a [`Request`] from a verb and a path template.
///
/// Synthesized method bodies drive this type: one call per bound parameter,
/// then [`RequestBuilder::compile`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    content: Content,
}

impl RequestBuilder {
    pub fn new(method: Method, template: &str) -> Self {
        Self {
            method,
            path: template.trim_start_matches('/').to_owned(),
            query: Vec::new(),
            headers: Vec::new(),
            content: Content::Empty,
        }
    }

    /// Replace every `{name}` token with the percent-encoded `value`.
    pub fn add_path_arg(&mut self, name: &str, value: impl Display) -> &mut Self {
        let token = format!("{{{name}}}");
        let value = value.to_string();
        self.path = self.path.replace(&token, &urlencoding::encode(&value));
        self
    }

    pub fn add_query(&mut self, name: &str, value: impl Display) -> &mut Self {
        self.query.push((name.to_owned(), value.to_string()));
        self
    }

    /// One query pair per entry.
    pub fn add_query_map<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        for (k, v) in entries {
            self.add_query(k.as_ref(), v);
        }
        self
    }

    pub fn add_header(&mut self, name: &str, value: impl Display) -> &mut Self {
        self.headers.push((name.to_owned(), value.to_string()));
        self
    }

    pub fn add_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        for (k, v) in headers {
            self.add_header(k.as_ref(), v);
        }
        self
    }

    pub fn body_text(&mut self, body: impl Into<String>) -> &mut Self {
        self.content = Content::Text(body.into());
        self
    }

    pub fn body_bytes(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.content = Content::Binary(body.into());
        self
    }

    /// Finish the request. Fails if any `{name}` token is still present.
    pub fn compile(&self) -> Result<Request, BuildError> {
        let names: Vec<String> = PLACEHOLDER
            .captures_iter(&self.path)
            .map(|c| c[1].to_owned())
            .collect();
        if !names.is_empty() {
            return Err(BuildError::UnresolvedPlaceholder { names });
        }

        let mut uri = self.path.clone();
        // a template may already carry its own query string
        let mut first = !self.path.contains('?');
        for (k, v) in &self.query {
            uri.push(if first { '?' } else { '&' });
            uri.push_str(&urlencoding::encode(k));
            uri.push('=');
            uri.push_str(&urlencoding::encode(v));
            first = false;
        }

        Ok(Request {
            method: self.method.clone(),
            uri,
            headers: self.headers.clone(),
            content: self.content.clone(),
        })
    }
}
