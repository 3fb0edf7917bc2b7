//! The fixed vocabulary of declarative markers and where each may appear.

use restweave::Method;
use serde::{Deserialize, Serialize};

use crate::error::{Reason, WeaveError};
use crate::ir::TypeDef;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    #[serde(untagged)]
    Custom(String),
}

impl HttpVerb {
    pub fn token(&self) -> &str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Head => "HEAD",
            HttpVerb::Custom(name) => name,
        }
    }

    /// `None` when a custom verb is not a valid HTTP token.
    pub fn to_method(&self) -> Option<Method> {
        Method::from_bytes(self.token().as_bytes()).ok()
    }

    /// Verbs that conventionally carry a body. Custom verbs are assumed to.
    pub fn permits_body(&self) -> bool {
        !matches!(self, HttpVerb::Get | HttpVerb::Head | HttpVerb::Delete)
    }
}

/// A parsed declarative marker. Marker arguments are kept as written,
/// including nulls, so arity and null checks can be reported precisely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Marker {
    /// Service that supplies its own client through a [`Marker::RestClient`] member.
    Service,
    /// Service with an optional base address.
    ServiceFor {
        #[serde(default)]
        address: Option<String>,
    },
    RestClient,
    Header {
        #[serde(default)]
        args: Vec<Option<String>>,
    },
    Headers,
    Body,
    Query {
        #[serde(default)]
        args: Vec<Option<String>>,
    },
    Alias {
        #[serde(default)]
        args: Vec<Option<String>>,
    },
    Serializer,
    Deserializer,
    Http {
        verb: HttpVerb,
        #[serde(default)]
        path: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Type,
    Field,
    Property,
    Method,
    Parameter,
}

impl Marker {
    pub fn name(&self) -> &'static str {
        match self {
            Marker::Service => "Service",
            Marker::ServiceFor { .. } => "ServiceFor",
            Marker::RestClient => "RestClient",
            Marker::Header { .. } => "Header",
            Marker::Headers => "Headers",
            Marker::Body => "Body",
            Marker::Query { .. } => "Query",
            Marker::Alias { .. } => "Alias",
            Marker::Serializer => "Serializer",
            Marker::Deserializer => "Deserializer",
            Marker::Http { .. } => "Http",
        }
    }

    pub fn allowed_on(&self, site: Site) -> bool {
        match self {
            Marker::Service | Marker::ServiceFor { .. } => site == Site::Type,
            Marker::RestClient => matches!(site, Site::Field | Site::Property),
            Marker::Header { .. } => matches!(site, Site::Type | Site::Method | Site::Parameter),
            Marker::Headers | Marker::Body | Marker::Query { .. } | Marker::Alias { .. } => {
                site == Site::Parameter
            }
            Marker::Serializer | Marker::Deserializer | Marker::Http { .. } => {
                site == Site::Method
            }
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Marker::Service | Marker::ServiceFor { .. })
    }
}

/// Require exactly `n` arguments, none of them null.
pub fn exact_args<'a>(
    args: &'a [Option<String>],
    n: usize,
) -> Result<Vec<&'a str>, (Reason, String)> {
    if args.len() != n {
        return Err((
            Reason::AttrValuesOutOfRange,
            format!("expected {n} argument(s), got {}", args.len()),
        ));
    }
    args.iter()
        .map(|a| {
            a.as_deref().ok_or((
                Reason::AttrValuesCannotBeNull,
                "marker arguments cannot be null".to_owned(),
            ))
        })
        .collect()
}

/// Reject any marker attached to a member kind that cannot carry it.
pub fn check_placements(ty: &TypeDef) -> Result<(), WeaveError> {
    let misplaced = |subject: String, m: &Marker, site: Site| {
        WeaveError::new(
            Reason::MisplacedMarker,
            subject,
            format!("marker {} is not allowed on {site:?}", m.name()),
        )
    };

    for m in &ty.markers {
        if !m.allowed_on(Site::Type) {
            return Err(misplaced(ty.name.clone(), m, Site::Type));
        }
    }
    for f in &ty.fields {
        if let Some(m) = f.markers.iter().find(|m| !m.allowed_on(Site::Field)) {
            return Err(misplaced(format!("{}::{}", ty.name, f.name), m, Site::Field));
        }
    }
    for p in &ty.properties {
        if let Some(m) = p.markers.iter().find(|m| !m.allowed_on(Site::Property)) {
            return Err(misplaced(format!("{}::{}", ty.name, p.name), m, Site::Property));
        }
    }
    for method in &ty.methods {
        let subject = format!("{}::{}", ty.name, method.name);
        if let Some(m) = method.markers.iter().find(|m| !m.allowed_on(Site::Method)) {
            return Err(misplaced(subject, m, Site::Method));
        }
        for param in &method.params {
            if let Some(m) = param.markers.iter().find(|m| !m.allowed_on(Site::Parameter)) {
                return Err(misplaced(
                    format!("{subject}({})", param.name),
                    m,
                    Site::Parameter,
                ));
            }
        }
    }
    Ok(())
}
