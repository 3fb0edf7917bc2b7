//! Serializer / deserializer discovery and stub enumeration.

use crate::diagnostics::StepLog;
use crate::error::{Reason, WeaveError};
use crate::ir::{CallTarget, Format, MethodDef, MethodKind, Receiver, TypeDef, TypeRef};
use crate::markers::{HttpVerb, Marker};

/// At most one text-based and one binary-based implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codec {
    pub text: Option<CallTarget>,
    pub binary: Option<CallTarget>,
}

impl Codec {
    /// Text preferred over binary.
    pub fn preferred(&self) -> Option<(&CallTarget, Format)> {
        self.text
            .as_ref()
            .map(|c| (c, Format::Text))
            .or_else(|| self.binary.as_ref().map(|c| (c, Format::Binary)))
    }

    /// `self` slot by slot, falling back to `shared`.
    pub fn over(&self, shared: &Codec) -> Codec {
        Codec {
            text: self.text.clone().or_else(|| shared.text.clone()),
            binary: self.binary.clone().or_else(|| shared.binary.clone()),
        }
    }

    fn slot(&mut self, format: Format) -> &mut Option<CallTarget> {
        match format {
            Format::Text => &mut self.text,
            Format::Binary => &mut self.binary,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codecs {
    pub serializer: Codec,
    pub deserializer: Codec,
}

impl Codecs {
    pub fn over(&self, shared: &Codecs) -> Codecs {
        Codecs {
            serializer: self.serializer.over(&shared.serializer),
            deserializer: self.deserializer.over(&shared.deserializer),
        }
    }
}

/// Module-wide codecs: static marked methods on non-service types, first in
/// declaration order wins.
pub fn shared_codecs(types: &[TypeDef], log: &mut StepLog) -> Result<Codecs, WeaveError> {
    log.scope("Shared codecs", |log| {
        let mut codecs = Codecs::default();
        for ty in types.iter().filter(|t| !t.markers.iter().any(Marker::is_service)) {
            for m in ty.methods.iter().filter(|m| m.is_static) {
                collect(ty, m, &mut codecs, log)?;
            }
        }
        Ok(codecs)
    })
}

/// Codecs declared on the service type itself, static or instance.
pub fn local_codecs(ty: &TypeDef, log: &mut StepLog) -> Result<Codecs, WeaveError> {
    let mut codecs = Codecs::default();
    for m in &ty.methods {
        collect(ty, m, &mut codecs, log)?;
    }
    Ok(codecs)
}

fn collect(
    ty: &TypeDef,
    m: &MethodDef,
    codecs: &mut Codecs,
    log: &mut StepLog,
) -> Result<(), WeaveError> {
    let receiver = if m.is_static {
        Receiver::Static
    } else {
        Receiver::This
    };
    let target = || CallTarget {
        owner: ty.name.clone(),
        method: m.name.clone(),
        receiver,
    };
    let subject = format!("{}::{}", ty.name, m.name);

    if m.markers.contains(&Marker::Serializer) {
        let format = serializer_format(m).ok_or_else(|| {
            log.fail(
                Reason::InvalidSerializerShape,
                &subject,
                "a serializer takes one object parameter and returns text or bytes",
            )
        })?;
        place(codecs.serializer.slot(format), target(), "serializer", log);
    }
    if m.markers.contains(&Marker::Deserializer) {
        let format = deserializer_format(m).ok_or_else(|| {
            log.fail(
                Reason::InvalidDeserializerShape,
                &subject,
                "a deserializer is generic over one unconstrained T, takes text or bytes and returns T",
            )
        })?;
        place(codecs.deserializer.slot(format), target(), "deserializer", log);
    }
    Ok(())
}

fn place(slot: &mut Option<CallTarget>, target: CallTarget, what: &str, log: &mut StepLog) {
    match slot {
        Some(existing) => log.warn(format!(
            "ignoring {what} {}, {} is already registered",
            target.key(),
            existing.key()
        )),
        None => {
            log.log(format!("Found {what} {}", target.key()));
            *slot = Some(target);
        }
    }
}

fn serializer_format(m: &MethodDef) -> Option<Format> {
    if !m.generic_params.is_empty() || m.params.len() != 1 || m.params[0].ty != TypeRef::Object {
        return None;
    }
    format_of(&m.return_type)
}

fn deserializer_format(m: &MethodDef) -> Option<Format> {
    let [t] = m.generic_params.as_slice() else {
        return None;
    };
    if !t.constraints.is_empty() || m.return_type != TypeRef::Generic(t.name.clone()) {
        return None;
    }
    let [input] = m.params.as_slice() else {
        return None;
    };
    format_of(&input.ty)
}

fn format_of(ty: &TypeRef) -> Option<Format> {
    match ty {
        TypeRef::String => Some(Format::Text),
        TypeRef::Bytes => Some(Format::Binary),
        _ => None,
    }
}

/// A method carrying an HTTP verb marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubMethod {
    pub index: usize,
    pub name: String,
    pub verb: HttpVerb,
    pub path: String,
}

/// Every method with a verb marker, in declaration order. Each entry fails
/// on its own so one bad stub does not hide the others.
pub fn stub_methods(ty: &TypeDef, log: &mut StepLog) -> Vec<Result<StubMethod, WeaveError>> {
    ty.methods
        .iter()
        .enumerate()
        .filter_map(|(index, m)| {
            let verbs: Vec<_> = m
                .markers
                .iter()
                .filter_map(|mk| match mk {
                    Marker::Http { verb, path } => Some((verb, path)),
                    _ => None,
                })
                .collect();
            if verbs.is_empty() {
                return None;
            }
            Some(stub(ty, index, m, &verbs, log))
        })
        .collect()
}

fn stub(
    ty: &TypeDef,
    index: usize,
    m: &MethodDef,
    verbs: &[(&HttpVerb, &Option<String>)],
    log: &mut StepLog,
) -> Result<StubMethod, WeaveError> {
    let subject = format!("{}::{}", ty.name, m.name);
    let [(verb, path)] = verbs else {
        return Err(log.fail(
            Reason::InvalidHttpMethod,
            subject,
            format!("expected one HTTP verb marker, found {}", verbs.len()),
        ));
    };
    if m.kind == MethodKind::Constructor || m.is_static {
        return Err(log.fail(
            Reason::MisplacedMarker,
            subject,
            "HTTP verb markers belong on instance methods",
        ));
    }
    if m.has_body() {
        return Err(log.fail(
            Reason::ExpectStubMethod,
            subject,
            "a method with an HTTP verb marker must not have a body",
        ));
    }
    let Some(path) = path else {
        return Err(log.fail(Reason::InvalidHttpMethod, subject, "path template is null"));
    };
    if verb.to_method().is_none() {
        return Err(log.fail(
            Reason::InvalidHttpMethod,
            subject,
            format!("'{}' is not a valid HTTP method", verb.token()),
        ));
    }
    Ok(StubMethod {
        index,
        name: m.name.clone(),
        verb: (*verb).clone(),
        path: path.clone(),
    })
}
