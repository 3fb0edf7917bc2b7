//! Emits method bodies and constructor edits for one service type.

use std::sync::Arc;

use crate::binder::{self, BoundMethod};
use crate::diagnostics::StepLog;
use crate::error::{Reason, WeaveError};
use crate::ir::{FieldDef, MethodDef, Op, TypeDef};
use crate::members::{self, Codecs, StubMethod};
use crate::options::WeavingOptions;
use crate::service::{self, ServiceDescriptor};
use crate::shape::{self, ReturnShape, ShapeContent};

/// Per-method synthesis state. `Registered` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodState {
    Discovered,
    Bound,
    BodySynthesized,
    Registered,
    Failed(Reason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    pub type_name: String,
    pub method: String,
    pub index: usize,
    pub state: MethodState,
}

/// Edits produced for one type; applied by the weaver after the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TypePlan {
    pub type_name: String,
    pub new_field: Option<FieldDef>,
    /// Added when the type has no constructor to hold the client initializer.
    pub new_constructor: Option<MethodDef>,
    pub constructor_prologue: Vec<Op>,
    pub constructor_epilogue: Vec<Op>,
    /// Constructors present before synthesis.
    pub constructors: Vec<usize>,
    /// Method index and its synthesized body.
    pub bodies: Vec<(usize, Vec<Op>)>,
    pub records: Vec<MethodRecord>,
    pub failures: Vec<WeaveError>,
}

impl TypePlan {
    pub fn is_empty(&self) -> bool {
        self.new_field.is_none()
            && self.new_constructor.is_none()
            && self.constructor_epilogue.is_empty()
            && self.bodies.is_empty()
    }
}

/// Shared, read-only inputs for synthesizing any type of a module.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    options: Arc<WeavingOptions>,
    shared: Arc<Codecs>,
    adapter_available: bool,
}

impl Synthesizer {
    pub fn new(options: Arc<WeavingOptions>, shared: Arc<Codecs>, adapter_available: bool) -> Self {
        Self {
            options,
            shared,
            adapter_available,
        }
    }

    /// `Ok(None)` when the type is not a service. `Err` for failures that
    /// abort the whole type, which are marked structural; method failures
    /// are listed in the plan.
    pub fn synthesize_type(
        &self,
        ty: &TypeDef,
        log: &mut StepLog,
    ) -> Result<Option<TypePlan>, WeaveError> {
        log.scope(ty.name.clone(), |log| {
            let Some(desc) = service::resolve(ty, log)? else {
                return Ok(None);
            };
            log.important(format!("Processing service {}", ty.name));

            log.log("Resolving serializer and deserializer");
            let codecs = members::local_codecs(ty, log)?.over(&self.shared);

            let mut plan = self.client_plan(ty, &desc);
            if plan.constructors.is_empty() && !plan.constructor_epilogue.is_empty() {
                log.warn(format!(
                    "{} has no constructor to add the service headers to",
                    ty.name
                ));
            }
            for stub in members::stub_methods(ty, log) {
                let stub = match stub {
                    Ok(stub) => stub,
                    Err(e) => {
                        plan.records.push(failed_record(ty, &e));
                        plan.failures.push(e);
                        continue;
                    }
                };
                let method = &ty.methods[stub.index];
                let mut rec = MethodRecord {
                    type_name: ty.name.clone(),
                    method: stub.name.clone(),
                    index: stub.index,
                    state: MethodState::Discovered,
                };
                let out = log.scope(stub.name.clone(), |log| {
                    self.synthesize_method(&desc, method, &stub, &codecs, &mut rec, log)
                });
                match out {
                    Ok(body) => {
                        plan.bodies.push((stub.index, body));
                        rec.state = MethodState::Registered;
                    }
                    Err(e) => {
                        rec.state = MethodState::Failed(e.reason);
                        plan.failures.push(e);
                    }
                }
                plan.records.push(rec);
            }

            log.important(format!(
                "{}: {} method(s) synthesized, {} failed",
                ty.name,
                plan.bodies.len(),
                plan.failures.len()
            ));
            Ok(Some(plan))
        })
        .map_err(WeaveError::into_structural)
    }

    fn client_plan(&self, ty: &TypeDef, desc: &ServiceDescriptor) -> TypePlan {
        let constructors: Vec<usize> = ty.constructors().map(|(i, _)| i).collect();
        let new_field = desc.generated_field();
        let new_constructor = (new_field.is_some() && constructors.is_empty())
            .then(MethodDef::constructor);
        TypePlan {
            type_name: ty.name.clone(),
            new_field,
            new_constructor,
            constructor_prologue: desc.constructor_prologue(),
            constructor_epilogue: desc.constructor_epilogue(&self.options),
            constructors,
            bodies: Vec::new(),
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn synthesize_method(
        &self,
        desc: &ServiceDescriptor,
        method: &MethodDef,
        stub: &StubMethod,
        codecs: &Codecs,
        rec: &mut MethodRecord,
        log: &mut StepLog,
    ) -> Result<Vec<Op>, WeaveError> {
        let subject = format!("{}::{}", desc.type_name, method.name);

        log.log("Classifying return type");
        let shape = shape::classify(&method.return_type, self.adapter_available)
            .map_err(|(reason, why)| log.fail(reason, &subject, why))?;

        let bound = binder::bind(&desc.type_name, method, stub, codecs, log)?;
        rec.state = MethodState::Bound;

        if let ReturnShape::Dispatch {
            content: ShapeContent::Deserialized(_),
            ..
        } = &shape
        {
            if codecs.deserializer.preferred().is_none() {
                return Err(log.fail(
                    Reason::NoSerializerConfigured,
                    &subject,
                    "a custom return type needs a deserializer",
                ));
            }
        }

        log.log("Emitting body");
        let body = emit(desc, stub, &bound, &shape, codecs, &self.options);
        rec.state = MethodState::BodySynthesized;
        log.log(format!("Emitted {} operations", body.len()));
        Ok(body)
    }
}

fn failed_record(ty: &TypeDef, e: &WeaveError) -> MethodRecord {
    let method = e
        .subject
        .rsplit_once("::")
        .map(|(_, m)| m.to_owned())
        .unwrap_or_default();
    let index = ty
        .methods
        .iter()
        .position(|m| m.name == method)
        .unwrap_or(usize::MAX);
    MethodRecord {
        type_name: ty.name.clone(),
        method,
        index,
        state: MethodState::Failed(e.reason),
    }
}

/// Build, dispatch, transform.
pub fn emit(
    desc: &ServiceDescriptor,
    stub: &StubMethod,
    bound: &BoundMethod,
    shape: &ReturnShape,
    codecs: &Codecs,
    options: &WeavingOptions,
) -> Vec<Op> {
    let mut ops = vec![Op::NewRequest {
        verb: stub.verb.clone(),
        path: stub.path.clone(),
    }];
    ops.extend(bound.headers.iter().map(|(name, value)| Op::AddHeader {
        name: name.clone(),
        value: value.clone(),
    }));
    ops.extend(bound.bindings.iter().filter_map(|b| b.op()));
    ops.push(Op::Compile);

    let ReturnShape::Dispatch { content, .. } = shape else {
        ops.push(Op::Return);
        return ops;
    };

    ops.push(Op::LoadClient {
        access: desc.client_access(),
    });
    ops.push(Op::Send {
        cancel: bound.cancel,
        translate_transport_errors: options.throw_rest_exception_on_internet_error,
    });

    let deserializer = codecs.deserializer.preferred();
    ops.push(Op::ReadResponse {
        read: content.read(deserializer.map(|(_, f)| f)),
    });
    if let (ShapeContent::Deserialized(target), Some((call, input))) = (content, deserializer) {
        ops.push(Op::Deserialize {
            call: call.clone(),
            input,
            target: target.clone(),
        });
    }
    if shape.is_observable() {
        ops.push(Op::ToObservable);
    }
    ops.push(Op::Return);
    ops
}
