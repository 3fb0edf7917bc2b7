//! Classifies every parameter of a stub into exactly one binding kind.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostics::StepLog;
use crate::error::{Reason, WeaveError};
use crate::ir::{BodyEncoding, MethodDef, Op, ParamDef, TypeRef};
use crate::markers::{exact_args, Marker};
use crate::members::{Codecs, StubMethod};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Cancel { arg: usize },
    Body { arg: usize, encoding: BodyEncoding },
    Headers { arg: usize },
    Header { arg: usize, name: String },
    Query { arg: usize, name: String },
    QueryMap { arg: usize },
    PathArg { arg: usize, name: String },
}

impl Binding {
    /// The builder operation for this binding; cancellation has none.
    pub fn op(&self) -> Option<Op> {
        Some(match self {
            Binding::Cancel { .. } => return None,
            Binding::Body { arg, encoding } => Op::SetBody {
                arg: *arg,
                encoding: encoding.clone(),
            },
            Binding::Headers { arg } => Op::AddHeaders { arg: *arg },
            Binding::Header { arg, name } => Op::AddHeaderArg {
                name: name.clone(),
                arg: *arg,
            },
            Binding::Query { arg, name } => Op::AddQuery {
                name: name.clone(),
                arg: *arg,
            },
            Binding::QueryMap { arg } => Op::AddQueryMap { arg: *arg },
            Binding::PathArg { arg, name } => Op::AddPathArg {
                name: name.clone(),
                arg: *arg,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundMethod {
    /// Method-level headers in declaration order.
    pub headers: Vec<(String, String)>,
    /// One binding per parameter, in declaration order.
    pub bindings: Vec<Binding>,
    pub cancel: Option<usize>,
}

/// Placeholder names of a path template, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_owned())
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

/// Identifier with a leading raw-identifier or verbatim prefix removed.
pub fn strip_prefix(ident: &str) -> &str {
    ident
        .strip_prefix("r#")
        .or_else(|| ident.strip_prefix('@'))
        .unwrap_or(ident)
}

pub fn bind(
    service: &str,
    method: &MethodDef,
    stub: &StubMethod,
    codecs: &Codecs,
    log: &mut StepLog,
) -> Result<BoundMethod, WeaveError> {
    let subject = format!("{service}::{}", method.name);

    log.log("Reading method headers");
    let mut headers = Vec::new();
    for m in &method.markers {
        if let Marker::Header { args } = m {
            let v = exact_args(args, 2).map_err(|(_, why)| {
                log.fail(
                    Reason::MalformedHeader,
                    &subject,
                    format!("method header needs a name and a value: {why}"),
                )
            })?;
            headers.push((v[0].to_owned(), v[1].to_owned()));
        }
    }

    let mut bindings = Vec::with_capacity(method.params.len());
    let mut cancel = None;
    let mut has_body = false;
    for (arg, p) in method.params.iter().enumerate() {
        log.log(format!("Binding parameter {}", p.name));
        let binding = classify(arg, p, codecs).map_err(|(reason, why)| {
            log.fail(reason, format!("{subject}({})", p.name), why)
        })?;

        match &binding {
            Binding::Cancel { .. } if cancel.is_some() => {
                return Err(log.fail(
                    Reason::DuplicateCancellationSignal,
                    format!("{subject}({})", p.name),
                    "only one cancellation token per method",
                ))
            }
            Binding::Cancel { arg } => cancel = Some(*arg),
            Binding::Body { .. } => {
                if has_body {
                    log.warn(format!(
                        "{subject}: body parameter {} replaces an earlier body",
                        p.name
                    ));
                }
                if !stub.verb.permits_body() {
                    log.warn(format!(
                        "{subject}: {} requests do not usually carry a body",
                        stub.verb.token()
                    ));
                }
                has_body = true;
            }
            _ => {}
        }
        bindings.push(binding);
    }

    log.log("Checking path placeholders");
    let bound: BTreeSet<&str> = bindings
        .iter()
        .filter_map(|b| match b {
            Binding::PathArg { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    let wanted = placeholders(&stub.path);
    let missing: Vec<&str> = wanted
        .iter()
        .map(String::as_str)
        .filter(|n| !bound.contains(n))
        .collect();
    if !missing.is_empty() {
        return Err(log.fail(
            Reason::UnresolvedPathPlaceholder,
            &subject,
            format!(
                "no parameter binds {} in '{}'",
                missing
                    .iter()
                    .map(|n| format!("{{{n}}}"))
                    .collect::<Vec<_>>()
                    .join(", "),
                stub.path
            ),
        ));
    }
    for name in bound.iter().filter(|n| !wanted.iter().any(|w| w.as_str() == **n)) {
        log.warn(format!(
            "{subject}: path argument '{name}' has no placeholder in '{}'",
            stub.path
        ));
    }

    Ok(BoundMethod {
        headers,
        bindings,
        cancel,
    })
}

/// Priority: cancellation, body, header map, single header, query, path.
fn classify(arg: usize, p: &ParamDef, codecs: &Codecs) -> Result<Binding, (Reason, String)> {
    if p.ty.is_named(TypeRef::CANCELLATION) {
        return Ok(Binding::Cancel { arg });
    }

    if p.markers.contains(&Marker::Body) {
        let encoding = match &p.ty {
            TypeRef::String => BodyEncoding::Text,
            TypeRef::Bytes => BodyEncoding::Binary,
            _ => match codecs.serializer.preferred() {
                Some((call, format)) => BodyEncoding::Serialized {
                    call: call.clone(),
                    format,
                },
                None => {
                    return Err((
                        Reason::NoSerializerConfigured,
                        "body of a non-text type needs a serializer".to_owned(),
                    ))
                }
            },
        };
        return Ok(Binding::Body { arg, encoding });
    }

    if p.markers.contains(&Marker::Headers) {
        if !p.ty.is_string_keyed_map() {
            return Err((
                Reason::InvalidHeadersParameterType,
                format!("header map must be keyed by strings, found {:?}", p.ty),
            ));
        }
        return Ok(Binding::Headers { arg });
    }

    if let Some(args) = p.markers.iter().find_map(|m| match m {
        Marker::Header { args } => Some(args),
        _ => None,
    }) {
        let v = exact_args(args, 1)?;
        return Ok(Binding::Header {
            arg,
            name: v[0].to_owned(),
        });
    }

    if let Some(args) = p.markers.iter().find_map(|m| match m {
        Marker::Query { args } => Some(args),
        _ => None,
    }) {
        if p.ty.is_string_keyed_map() {
            return Ok(Binding::QueryMap { arg });
        }
        let name = match args.len() {
            0 => strip_prefix(&p.name).to_owned(),
            _ => exact_args(args, 1)?[0].to_owned(),
        };
        return Ok(Binding::Query { arg, name });
    }

    let name = match p.markers.iter().find_map(|m| match m {
        Marker::Alias { args } => Some(args),
        _ => None,
    }) {
        Some(args) => exact_args(args, 1)?[0].to_owned(),
        None => strip_prefix(&p.name).to_owned(),
    };
    Ok(Binding::PathArg { arg, name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, MemorySink, Priority};
    use crate::ir::{CallTarget, Format, Receiver};
    use crate::markers::HttpVerb;

    fn stub(verb: HttpVerb, path: &str) -> StubMethod {
        StubMethod {
            index: 0,
            name: "m".into(),
            verb,
            path: path.into(),
        }
    }

    fn method(params: Vec<ParamDef>) -> MethodDef {
        let mut m = MethodDef::stub("m", TypeRef::future(TypeRef::String));
        m.params = params;
        m
    }

    fn text_serializer() -> Codecs {
        Codecs {
            serializer: crate::members::Codec {
                text: Some(CallTarget {
                    owner: "Api".into(),
                    method: "ser".into(),
                    receiver: Receiver::This,
                }),
                binary: None,
            },
            ..Default::default()
        }
    }

    fn run(m: &MethodDef, s: &StubMethod, c: &Codecs) -> Result<BoundMethod, WeaveError> {
        bind("Api", m, s, c, &mut Diagnostics::default().unit())
    }

    fn args(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_owned)).collect()
    }

    #[test]
    fn unadorned_parameter_is_a_path_arg() {
        let m = method(vec![ParamDef::new("id", TypeRef::Int)]);
        let b = run(&m, &stub(HttpVerb::Get, "/items/{id}"), &Codecs::default()).unwrap();
        assert_eq!(
            b.bindings,
            vec![Binding::PathArg {
                arg: 0,
                name: "id".into()
            }]
        );
    }

    #[test]
    fn classification_priority() {
        let m = method(vec![
            ParamDef::new("token", TypeRef::named(TypeRef::CANCELLATION))
                .marked(Marker::Body),
            ParamDef::new("payload", TypeRef::String).marked(Marker::Body),
            ParamDef::new("extra", TypeRef::map(TypeRef::String, TypeRef::Object))
                .marked(Marker::Headers),
            ParamDef::new("key", TypeRef::String).marked(Marker::Header {
                args: args(&[Some("X-Key")]),
            }),
            ParamDef::new("r#type", TypeRef::String).marked(Marker::Query { args: vec![] }),
            ParamDef::new("page", TypeRef::Int).marked(Marker::Query {
                args: args(&[Some("p")]),
            }),
            ParamDef::new("filters", TypeRef::map(TypeRef::String, TypeRef::String))
                .marked(Marker::Query { args: vec![] }),
            ParamDef::new("user", TypeRef::String).marked(Marker::Alias {
                args: args(&[Some("uid")]),
            }),
            ParamDef::new("@class", TypeRef::String),
        ]);
        let b = run(
            &m,
            &stub(HttpVerb::Post, "/u/{uid}/{class}"),
            &Codecs::default(),
        )
        .unwrap();

        assert_eq!(b.cancel, Some(0));
        assert_eq!(
            b.bindings,
            vec![
                Binding::Cancel { arg: 0 },
                Binding::Body {
                    arg: 1,
                    encoding: BodyEncoding::Text
                },
                Binding::Headers { arg: 2 },
                Binding::Header {
                    arg: 3,
                    name: "X-Key".into()
                },
                Binding::Query {
                    arg: 4,
                    name: "type".into()
                },
                Binding::Query {
                    arg: 5,
                    name: "p".into()
                },
                Binding::QueryMap { arg: 6 },
                Binding::PathArg {
                    arg: 7,
                    name: "uid".into()
                },
                Binding::PathArg {
                    arg: 8,
                    name: "class".into()
                },
            ]
        );
        assert_eq!(b.bindings[0].op(), None);
    }

    #[test]
    fn object_body_needs_serializer() {
        let m = method(vec![ParamDef::new("item", TypeRef::named("Item")).marked(Marker::Body)]);
        let s = stub(HttpVerb::Post, "/items");

        let err = run(&m, &s, &Codecs::default()).unwrap_err();
        assert_eq!(err.reason, Reason::NoSerializerConfigured);
        assert_eq!(err.subject, "Api::m(item)");

        let b = run(&m, &s, &text_serializer()).unwrap();
        match &b.bindings[0] {
            Binding::Body {
                encoding: BodyEncoding::Serialized { call, format },
                ..
            } => {
                assert_eq!(call.key(), "Api::ser");
                assert_eq!(*format, Format::Text);
            }
            other => panic!("unexpected binding: {other:?}"),
        }
    }

    #[test]
    fn binary_body_passes_through() {
        let m = method(vec![ParamDef::new("raw", TypeRef::Bytes).marked(Marker::Body)]);
        let b = run(&m, &stub(HttpVerb::Put, "/blob"), &Codecs::default()).unwrap();
        assert_eq!(
            b.bindings[0],
            Binding::Body {
                arg: 0,
                encoding: BodyEncoding::Binary
            }
        );
    }

    #[test]
    fn headers_map_must_be_string_keyed() {
        let m = method(vec![ParamDef::new("h", TypeRef::map(TypeRef::Int, TypeRef::String))
            .marked(Marker::Headers)]);
        let err = run(&m, &stub(HttpVerb::Get, "/"), &Codecs::default()).unwrap_err();
        assert_eq!(err.reason, Reason::InvalidHeadersParameterType);
    }

    #[test]
    fn marker_argument_checks() {
        let null_header = method(vec![ParamDef::new("k", TypeRef::String)
            .marked(Marker::Header { args: args(&[None]) })]);
        assert_eq!(
            run(&null_header, &stub(HttpVerb::Get, "/"), &Codecs::default())
                .unwrap_err()
                .reason,
            Reason::AttrValuesCannotBeNull
        );

        let two_aliases = method(vec![ParamDef::new("k", TypeRef::String).marked(
            Marker::Alias {
                args: args(&[Some("a"), Some("b")]),
            },
        )]);
        assert_eq!(
            run(&two_aliases, &stub(HttpVerb::Get, "/{a}"), &Codecs::default())
                .unwrap_err()
                .reason,
            Reason::AttrValuesOutOfRange
        );
    }

    #[test]
    fn second_cancellation_token_is_fatal() {
        let m = method(vec![
            ParamDef::new("a", TypeRef::named(TypeRef::CANCELLATION)),
            ParamDef::new("b", TypeRef::named(TypeRef::CANCELLATION)),
        ]);
        let err = run(&m, &stub(HttpVerb::Get, "/"), &Codecs::default()).unwrap_err();
        assert_eq!(err.reason, Reason::DuplicateCancellationSignal);
    }

    #[test]
    fn unresolved_placeholder_is_fatal() {
        let m = method(vec![ParamDef::new("id", TypeRef::Int)]);
        let err = run(&m, &stub(HttpVerb::Get, "/users/{id}/posts/{post}"), &Codecs::default())
            .unwrap_err();
        assert_eq!(err.reason, Reason::UnresolvedPathPlaceholder);
        assert!(err.message.contains("{post}"));
    }

    #[test]
    fn method_headers_need_two_values() {
        let mut m = method(vec![]);
        m.markers.push(Marker::Header {
            args: args(&[Some("X-A"), Some("1")]),
        });
        let b = run(&m, &stub(HttpVerb::Get, "/"), &Codecs::default()).unwrap();
        assert_eq!(b.headers, vec![("X-A".to_owned(), "1".to_owned())]);

        m.markers.push(Marker::Header {
            args: args(&[Some("X-B"), None]),
        });
        let err = run(&m, &stub(HttpVerb::Get, "/"), &Codecs::default()).unwrap_err();
        assert_eq!(err.reason, Reason::MalformedHeader);
    }

    #[test]
    fn advisories_for_suspicious_bindings() {
        let sink = MemorySink::new();
        let mut log = Diagnostics::new(sink.clone()).unit();
        let m = method(vec![
            ParamDef::new("body", TypeRef::String).marked(Marker::Body),
            ParamDef::new("unused", TypeRef::Int),
        ]);
        bind("Api", &m, &stub(HttpVerb::Get, "/"), &Codecs::default(), &mut log).unwrap();
        assert!(sink.contains(Priority::Warning, "GET requests do not usually carry a body"));
        assert!(sink.contains(Priority::Warning, "path argument 'unused'"));
    }

    #[test]
    fn placeholder_names_are_unique_and_ordered() {
        assert_eq!(placeholders("/{b}/{a}/{b}"), vec!["b", "a"]);
        assert_eq!(strip_prefix("@event"), "event");
        assert_eq!(strip_prefix("r#type"), "type");
        assert_eq!(strip_prefix("plain"), "plain");
    }
}
