use bytes::Bytes;

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Content {
    #[default]
    Empty,
    /// UTF-8 text, sent as `text/plain; charset=utf-8` unless a content type is set.
    Text(String),
    /// Raw octets, sent without a default content type.
    Binary(Bytes),
}

impl Content {
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    pub fn len(&self) -> usize {
        match self {
            Content::Empty => 0,
            Content::Text(s) => s.len(),
            Content::Binary(b) => b.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Empty => &[],
            Content::Text(s) => s.as_bytes(),
            Content::Binary(b) => b,
        }
    }

    /// Content type implied by the payload kind, if any.
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Content::Text(_) => Some("text/plain; charset=utf-8"),
            Content::Empty | Content::Binary(_) => None,
        }
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Content::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for Content {
    fn from(value: Bytes) -> Self {
        Content::Binary(value)
    }
}
