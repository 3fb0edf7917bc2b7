//! Decides whether a type is a service description and resolves its client
//! source and default headers.

use url::Url;

use crate::diagnostics::StepLog;
use crate::error::{Reason, WeaveError};
use crate::ir::{ClientAccess, FieldDef, Op, TypeDef, TypeRef};
use crate::markers::{self, exact_args, Marker};
use crate::options::WeavingOptions;

/// Name of the field that holds a generated client.
pub const CLIENT_FIELD: &str = "__restweave_client";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSource {
    /// A member marked as the client source.
    Explicit(ClientAccess),
    /// A private field created and initialized in every constructor.
    Generated { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub type_name: String,
    pub address: Option<String>,
    pub client: ClientSource,
    /// Service-level headers in declaration order.
    pub headers: Vec<(String, String)>,
}

impl ServiceDescriptor {
    pub fn client_access(&self) -> ClientAccess {
        match &self.client {
            ClientSource::Explicit(access) => access.clone(),
            ClientSource::Generated { field } => ClientAccess::Field(field.clone()),
        }
    }

    /// The field to add for a generated client.
    pub fn generated_field(&self) -> Option<FieldDef> {
        match &self.client {
            ClientSource::Generated { field } => Some(FieldDef {
                name: field.clone(),
                ty: TypeRef::client(),
                is_static: false,
                markers: Vec::new(),
            }),
            ClientSource::Explicit(_) => None,
        }
    }

    /// Operations inserted at the start of every constructor.
    pub fn constructor_prologue(&self) -> Vec<Op> {
        let ClientSource::Generated { field } = &self.client else {
            return Vec::new();
        };
        let mut ops = vec![Op::NewClient];
        if let Some(address) = &self.address {
            ops.push(Op::SetBaseAddress {
                address: address.clone(),
            });
        }
        ops.extend(self.header_ops());
        ops.push(Op::StoreField {
            field: field.clone(),
        });
        ops
    }

    /// Operations appended to the end of every constructor.
    pub fn constructor_epilogue(&self, options: &WeavingOptions) -> Vec<Op> {
        match &self.client {
            ClientSource::Explicit(access)
                if options.add_headers_to_already_existing_http_client
                    && !self.headers.is_empty() =>
            {
                let mut ops = vec![Op::LoadClient {
                    access: access.clone(),
                }];
                ops.extend(self.header_ops());
                ops.push(Op::Pop);
                ops
            }
            _ => Vec::new(),
        }
    }

    fn header_ops(&self) -> impl Iterator<Item = Op> + '_ {
        self.headers.iter().map(|(name, value)| Op::AddDefaultHeader {
            name: name.clone(),
            value: value.clone(),
        })
    }
}

/// Resolve `ty` into a [`ServiceDescriptor`], or `None` if it is not a service.
pub fn resolve(ty: &TypeDef, log: &mut StepLog) -> Result<Option<ServiceDescriptor>, WeaveError> {
    let Some(service) = ty.markers.iter().find(|m| m.is_service()) else {
        return Ok(None);
    };
    log.log("Reading service markers");
    markers::check_placements(ty).map_err(|e| {
        let e = e.with_trail(log.trail());
        log.report(&e);
        e
    })?;

    let address = match service {
        Marker::ServiceFor {
            address: Some(address),
        } => {
            log.log(format!("Validating address {address}"));
            let url = Url::parse(address).map_err(|e| {
                log.fail(
                    Reason::InvalidAddress,
                    &ty.name,
                    format!("'{address}' is not an absolute URI: {e}"),
                )
            })?;
            if url.cannot_be_a_base() {
                return Err(log.fail(
                    Reason::InvalidAddress,
                    &ty.name,
                    format!("'{address}' cannot be used as a base address"),
                ));
            }
            Some(address.clone())
        }
        _ => None,
    };

    log.log("Reading headers");
    let mut headers = Vec::new();
    for m in &ty.markers {
        if let Marker::Header { args } = m {
            match exact_args(args, 2) {
                Ok(v) => headers.push((v[0].to_owned(), v[1].to_owned())),
                Err((_, why)) => {
                    return Err(log.fail(
                        Reason::MalformedHeader,
                        &ty.name,
                        format!("service header needs a name and a value: {why}"),
                    ))
                }
            }
        }
    }

    log.log("Searching client source");
    let explicit = find_client_source(ty, log)?;

    let client = match (explicit, &address) {
        (Some(access), Some(address)) => {
            log.warn(format!(
                "{} declares both a client member '{}' and the address {address}; using the member",
                ty.name,
                access.name()
            ));
            ClientSource::Explicit(access)
        }
        (Some(access), None) => ClientSource::Explicit(access),
        (None, Some(_)) => {
            if ty.fields.iter().any(|f| f.name == CLIENT_FIELD) {
                return Err(log.fail(
                    Reason::InvalidClientSource,
                    &ty.name,
                    format!("member '{CLIENT_FIELD}' is reserved for the generated client"),
                ));
            }
            ClientSource::Generated {
                field: CLIENT_FIELD.to_owned(),
            }
        }
        (None, None) => {
            return Err(log.fail(
                Reason::NoClientNorAddress,
                &ty.name,
                "a service needs either a client member or a base address",
            ))
        }
    };

    log.log(format!("Resolved client source: {client:?}"));
    Ok(Some(ServiceDescriptor {
        type_name: ty.name.clone(),
        address,
        client,
        headers,
    }))
}

fn find_client_source(
    ty: &TypeDef,
    log: &mut StepLog,
) -> Result<Option<ClientAccess>, WeaveError> {
    let marked = |markers: &[Marker]| markers.iter().any(|m| *m == Marker::RestClient);

    let mut candidates = Vec::new();
    for f in ty.fields.iter().filter(|f| marked(&f.markers)) {
        candidates.push((ClientAccess::Field(f.name.clone()), &f.ty, f.is_static));
    }
    for p in ty.properties.iter().filter(|p| marked(&p.markers)) {
        candidates.push((ClientAccess::Property(p.name.clone()), &p.ty, p.is_static));
    }

    let subject = |access: &ClientAccess| format!("{}::{}", ty.name, access.name());
    match candidates.as_slice() {
        [] => Ok(None),
        [(access, member_ty, is_static)] => {
            if *is_static {
                return Err(log.fail(
                    Reason::InvalidClientSource,
                    subject(access),
                    "the client source must be an instance member",
                ));
            }
            if **member_ty != TypeRef::client() {
                return Err(log.fail(
                    Reason::InvalidClientSource,
                    subject(access),
                    format!("expected type {}, found {member_ty:?}", TypeRef::CLIENT),
                ));
            }
            Ok(Some(access.clone()))
        }
        [_, (second, ..), ..] => Err(log.fail(
            Reason::InvalidClientSource,
            subject(second),
            "only one member may be marked as the client source",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, MemorySink, Priority};
    use crate::ir::{MethodDef, PropertyDef};

    fn service_for(address: &str) -> TypeDef {
        let mut ty = TypeDef::new("Api");
        ty.markers.push(Marker::ServiceFor {
            address: Some(address.to_owned()),
        });
        ty
    }

    fn header(name: Option<&str>, value: Option<&str>) -> Marker {
        Marker::Header {
            args: vec![name.map(str::to_owned), value.map(str::to_owned)],
        }
    }

    fn client_property(ty: TypeRef) -> PropertyDef {
        PropertyDef {
            name: "Client".into(),
            ty,
            is_static: false,
            markers: vec![Marker::RestClient],
        }
    }

    fn run(ty: &TypeDef) -> Result<Option<ServiceDescriptor>, WeaveError> {
        resolve(ty, &mut Diagnostics::default().unit())
    }

    #[test]
    fn unmarked_type_is_not_a_service() {
        assert_eq!(run(&TypeDef::new("Plain")).unwrap(), None);
    }

    #[test]
    fn address_only_generates_client() {
        let desc = run(&service_for("http://h.test/api")).unwrap().unwrap();
        assert_eq!(desc.address.as_deref(), Some("http://h.test/api"));
        assert_eq!(
            desc.client,
            ClientSource::Generated {
                field: CLIENT_FIELD.into()
            }
        );
        assert_eq!(
            desc.constructor_prologue(),
            vec![
                Op::NewClient,
                Op::SetBaseAddress {
                    address: "http://h.test/api".into()
                },
                Op::StoreField {
                    field: CLIENT_FIELD.into()
                },
            ]
        );
    }

    #[test]
    fn headers_keep_declaration_order() {
        let mut ty = service_for("http://h.test/");
        ty.markers.push(header(Some("Authorization"), Some("Bearer x")));
        ty.markers.push(header(Some("Accept"), Some("text/plain")));
        ty.markers.push(header(Some("Accept"), Some("application/json")));
        let desc = run(&ty).unwrap().unwrap();
        assert_eq!(
            desc.headers,
            vec![
                ("Authorization".to_owned(), "Bearer x".to_owned()),
                ("Accept".to_owned(), "text/plain".to_owned()),
                ("Accept".to_owned(), "application/json".to_owned()),
            ]
        );
    }

    #[test]
    fn relative_address_is_invalid() {
        let err = run(&service_for("/api/v1")).unwrap_err();
        assert_eq!(err.reason, Reason::InvalidAddress);
        assert_eq!(err.subject, "Api");
    }

    #[test]
    fn malformed_headers_are_fatal() {
        for bad in [header(Some("X"), None), Marker::Header { args: vec![Some("X".into())] }] {
            let mut ty = service_for("http://h.test/");
            ty.markers.push(bad);
            assert_eq!(run(&ty).unwrap_err().reason, Reason::MalformedHeader);
        }
    }

    #[test]
    fn plain_service_without_client_fails() {
        let mut ty = TypeDef::new("Api");
        ty.markers.push(Marker::Service);
        assert_eq!(run(&ty).unwrap_err().reason, Reason::NoClientNorAddress);

        let mut ty = TypeDef::new("Api");
        ty.markers.push(Marker::ServiceFor { address: None });
        assert_eq!(run(&ty).unwrap_err().reason, Reason::NoClientNorAddress);
    }

    #[test]
    fn explicit_client_must_have_client_type() {
        let mut ty = TypeDef::new("Api");
        ty.markers.push(Marker::Service);
        ty.properties.push(client_property(TypeRef::named("other::Client")));
        let err = run(&ty).unwrap_err();
        assert_eq!(err.reason, Reason::InvalidClientSource);
        assert_eq!(err.subject, "Api::Client");
    }

    #[test]
    fn explicit_client_wins_over_address_with_advisory() {
        let sink = MemorySink::new();
        let diag = Diagnostics::new(sink.clone());
        let mut ty = service_for("http://h.test/");
        ty.properties.push(client_property(TypeRef::client()));

        let desc = resolve(&ty, &mut diag.unit()).unwrap().unwrap();
        assert_eq!(
            desc.client,
            ClientSource::Explicit(ClientAccess::Property("Client".into()))
        );
        assert!(desc.constructor_prologue().is_empty());
        assert!(sink.contains(Priority::Warning, "using the member"));
    }

    #[test]
    fn epilogue_only_with_option() {
        let mut ty = TypeDef::new("Api");
        ty.markers.push(Marker::Service);
        ty.markers.push(header(Some("X-Key"), Some("k")));
        ty.properties.push(client_property(TypeRef::client()));
        let desc = run(&ty).unwrap().unwrap();

        assert!(desc.constructor_epilogue(&WeavingOptions::default()).is_empty());
        let opts = WeavingOptions {
            add_headers_to_already_existing_http_client: true,
            ..Default::default()
        };
        assert_eq!(
            desc.constructor_epilogue(&opts),
            vec![
                Op::LoadClient {
                    access: ClientAccess::Property("Client".into())
                },
                Op::AddDefaultHeader {
                    name: "X-Key".into(),
                    value: "k".into()
                },
                Op::Pop,
            ]
        );
    }

    #[test]
    fn misplaced_marker_is_fatal() {
        let mut ty = service_for("http://h.test/");
        let mut m = MethodDef::stub("get", TypeRef::future(TypeRef::String));
        m.markers.push(Marker::Body);
        ty.methods.push(m);
        assert_eq!(run(&ty).unwrap_err().reason, Reason::MisplacedMarker);
    }
}
