use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Options passed in by the host build pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeavingOptions {
    /// Apply service-level headers even when the service supplies its own client.
    pub add_headers_to_already_existing_http_client: bool,
    /// Turn transport failures into `RestError::Transport` instead of propagating them raw.
    pub throw_rest_exception_on_internet_error: bool,
    /// Fail the whole run on the first synthesis error.
    pub strict: bool,
    /// Size of the worker pool; 0 means one per available core.
    pub workers: usize,
}

impl Default for WeavingOptions {
    fn default() -> Self {
        Self {
            add_headers_to_already_existing_http_client: false,
            throw_rest_exception_on_internet_error: false,
            strict: true,
            workers: 0,
        }
    }
}

impl WeavingOptions {
    pub const ADD_HEADERS: &'static str = "AddHeadersToAlreadyExistingHttpClient";
    pub const THROW_ON_INTERNET_ERROR: &'static str = "ThrowRestExceptionOnInternetError";
    pub const STRICT: &'static str = "Strict";

    /// Parse the host's textual attributes. Values compare case-insensitively
    /// to `true`; anything else is `false`. Unknown names are ignored.
    pub fn from_attributes<I, K, V>(attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut opts = Self::default();
        for (k, v) in attrs {
            opts.apply_attribute(k.as_ref(), v.as_ref());
        }
        opts
    }

    /// Returns `false` if the attribute name is not recognized.
    pub fn apply_attribute(&mut self, name: &str, value: &str) -> bool {
        let flag = value.trim().eq_ignore_ascii_case("true");
        match name {
            Self::ADD_HEADERS => self.add_headers_to_already_existing_http_client = flag,
            Self::THROW_ON_INTERNET_ERROR => self.throw_rest_exception_on_internet_error = flag,
            Self::STRICT => self.strict = flag,
            _ => {
                debug!(attribute = name, "ignoring unknown weaving attribute");
                return false;
            }
        }
        true
    }

    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

impl fmt::Display for WeavingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SETTINGS:")?;
        writeln!(
            f,
            "  {}: {}",
            Self::ADD_HEADERS,
            self.add_headers_to_already_existing_http_client
        )?;
        writeln!(
            f,
            "  {}: {}",
            Self::THROW_ON_INTERNET_ERROR,
            self.throw_rest_exception_on_internet_error
        )?;
        writeln!(f, "  {}: {}", Self::STRICT, self.strict)?;
        write!(f, "  Workers: {}", self.effective_workers())
    }
}
