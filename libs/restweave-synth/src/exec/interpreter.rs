use std::fmt;
use std::sync::Arc;

use restweave::observable::{self, Observable};
use restweave::{
    BuildError, ByteStream, CancellationToken, HttpClient, Request, RequestBuilder, Response, RestError,
    StatusCode, Transport,
};
use tracing::{debug, instrument, trace};

use super::native::{NativeCall, NativeTable};
use super::value::{Instance, Value};
use super::ExecError;
use crate::ir::{
    BodyEncoding, CallTarget, Format, MethodDef, MethodKind, ModuleDef, Op, Receiver,
    ResponseRead, TypeDef, TypeRef,
};

/// Produces the client stored by a `NewClient` operation.
pub type ClientFactory = Arc<dyn Fn() -> HttpClient + Send + Sync>;

/// Result of invoking a woven method.
pub enum Outcome {
    Request(Request),
    Response(Response),
    Status(StatusCode),
    Text(String),
    Bytes(bytes::Bytes),
    Stream(ByteStream),
    /// Produced by user code or a deserializer.
    Value(Value),
    Unit,
    Observable(Observable<Outcome, ExecError>),
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Request(r) => f.debug_tuple("Request").field(r).finish(),
            Outcome::Response(r) => f.debug_tuple("Response").field(r).finish(),
            Outcome::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Outcome::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Outcome::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Outcome::Stream(_) => f.write_str("Stream(..)"),
            Outcome::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Outcome::Unit => f.write_str("Unit"),
            Outcome::Observable(_) => f.write_str("Observable(..)"),
        }
    }
}

impl Outcome {
    pub fn into_text(self) -> Option<String> {
        match self {
            Outcome::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Operand stack of a running body.
enum Slot {
    Builder(RequestBuilder),
    Request(Request),
    Client(HttpClient),
    Response(Response),
    Out(Outcome),
}

#[derive(Clone)]
pub struct Interpreter {
    module: Arc<ModuleDef>,
    natives: NativeTable,
    client_factory: ClientFactory,
}

impl Interpreter {
    /// Generated clients use the default transport.
    pub fn new(module: ModuleDef) -> Self {
        Self {
            module: Arc::new(module),
            natives: NativeTable::default(),
            client_factory: Arc::new(HttpClient::default),
        }
    }

    pub fn with_natives(mut self, natives: NativeTable) -> Self {
        self.natives = natives;
        self
    }

    pub fn with_client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> HttpClient + Send + Sync + 'static,
    {
        self.client_factory = Arc::new(factory);
        self
    }

    /// Generated clients share `transport`.
    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        self.with_client_factory(move || HttpClient::with_transport(transport.clone()))
    }

    pub fn module(&self) -> &ModuleDef {
        &self.module
    }

    /// Run the constructor of `type_name` whose arity matches `args`.
    #[instrument(skip(self, args), fields(args = args.len()))]
    pub fn construct(&self, type_name: &str, args: Vec<Value>) -> Result<Instance, ExecError> {
        let ty = self.type_def(type_name)?;
        let this = Instance::new(type_name);

        let mut ctors = ty.constructors().peekable();
        if ctors.peek().is_none() && args.is_empty() {
            return Ok(this);
        }
        let (_, ctor) = ctors
            .find(|(_, m)| m.params.len() == args.len())
            .ok_or_else(|| {
                ExecError::fault(format!(
                    "{type_name} has no constructor taking {} argument(s)",
                    args.len()
                ))
            })?;

        let mut stack: Vec<HttpClient> = Vec::new();
        for op in &ctor.body {
            match op {
                Op::UserCode { native: Some(key) } => {
                    self.call_native(key, Some(&this), &args, None)?;
                }
                Op::UserCode { native: None } => trace!("skipping opaque constructor code"),
                Op::NewClient => stack.push((self.client_factory)()),
                Op::SetBaseAddress { address } => top(&stack)?
                    .set_base_address(address)
                    .map_err(|e| ExecError::fault(format!("bad base address {address}: {e}")))?,
                Op::AddDefaultHeader { name, value } => top(&stack)?.add_default_header(name, value),
                Op::StoreField { field } => {
                    let client = stack
                        .pop()
                        .ok_or_else(|| ExecError::fault("no client to store"))?;
                    this.set(field.clone(), Value::Client(client));
                }
                Op::LoadClient { access } => stack.push(load_client(&this, access.name())?),
                Op::Pop => {
                    stack.pop();
                }
                other => {
                    return Err(ExecError::fault(format!(
                        "{other:?} is not valid in a constructor"
                    )))
                }
            }
        }
        debug!(type_name, "constructed");
        Ok(this)
    }

    /// Invoke the method `name` whose arity matches `args`.
    pub async fn invoke(
        &self,
        this: &Instance,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Outcome, ExecError> {
        let ty = self.type_def(this.type_name())?;
        let method = ty
            .methods
            .iter()
            .find(|m| m.kind == MethodKind::Method && m.name == name && m.params.len() == args.len())
            .ok_or_else(|| {
                ExecError::fault(format!(
                    "{}::{name} taking {} argument(s) not found",
                    ty.name,
                    args.len()
                ))
            })?;
        self.invoke_method(ty, method, this, args).await
    }

    async fn invoke_method(
        &self,
        ty: &TypeDef,
        method: &MethodDef,
        this: &Instance,
        args: Vec<Value>,
    ) -> Result<Outcome, ExecError> {
        let subject = format!("{}::{}", ty.name, method.name);
        if method.is_extern || method.body.is_empty() {
            return Err(ExecError::fault(format!("{subject} has no body")));
        }
        if let [Op::UserCode { native }] = method.body.as_slice() {
            let key = native
                .as_deref()
                .ok_or_else(|| ExecError::fault(format!("{subject} has no native implementation")))?;
            let receiver = (!method.is_static).then_some(this);
            return self
                .call_native(key, receiver, &args, None)
                .map(Outcome::Value);
        }

        trace!(method = %subject, ops = method.body.len(), "running body");
        if method.body.contains(&Op::ToObservable) {
            let interp = self.clone();
            let this = this.clone();
            let ops = method.body.clone();
            return Ok(Outcome::Observable(observable::from_future(async move {
                interp.run(&this, &ops, &args).await
            })));
        }
        self.run(this, &method.body, &args).await
    }

    async fn run(&self, this: &Instance, ops: &[Op], args: &[Value]) -> Result<Outcome, ExecError> {
        let mut stack: Vec<Slot> = Vec::new();
        for op in ops {
            match op {
                Op::NewRequest { verb, path } => {
                    let method = verb.to_method().ok_or_else(|| {
                        ExecError::fault(format!("'{}' is not a valid HTTP method", verb.token()))
                    })?;
                    stack.push(Slot::Builder(RequestBuilder::new(method, path)));
                }
                Op::AddHeader { name, value } => {
                    builder(&mut stack)?.add_header(name, value);
                }
                Op::AddHeaderArg { name, arg } => {
                    let v = arg_at(args, *arg)?;
                    if !matches!(v, Value::Unit) {
                        builder(&mut stack)?.add_header(name, v);
                    }
                }
                Op::AddHeaders { arg } => {
                    let entries = entries(arg_at(args, *arg)?)?;
                    builder(&mut stack)?.add_headers(entries);
                }
                Op::AddQuery { name, arg } => {
                    let v = arg_at(args, *arg)?;
                    if !matches!(v, Value::Unit) {
                        builder(&mut stack)?.add_query(name, v);
                    }
                }
                Op::AddQueryMap { arg } => {
                    let entries = entries(arg_at(args, *arg)?)?;
                    builder(&mut stack)?.add_query_map(entries);
                }
                Op::AddPathArg { name, arg } => {
                    let v = arg_at(args, *arg)?;
                    if matches!(v, Value::Unit) {
                        return Err(BuildError::NullPathArg { name: name.clone() }.into());
                    }
                    builder(&mut stack)?.add_path_arg(name, v);
                }
                Op::SetBody { arg, encoding } => {
                    let v = arg_at(args, *arg)?;
                    if !matches!(v, Value::Unit) {
                        let body = self.encode_body(this, v, encoding)?;
                        let b = builder(&mut stack)?;
                        match body {
                            Value::Bytes(bytes) => b.body_bytes(bytes),
                            other => b.body_text(other.to_string()),
                        };
                    }
                }
                Op::Compile => {
                    let Some(Slot::Builder(b)) = stack.pop() else {
                        return Err(underflow("request builder"));
                    };
                    stack.push(Slot::Request(b.compile()?));
                }
                Op::LoadClient { access } => {
                    stack.push(Slot::Client(load_client(this, access.name())?));
                }
                Op::Send {
                    cancel,
                    translate_transport_errors,
                } => {
                    let Some(Slot::Client(client)) = stack.pop() else {
                        return Err(underflow("client"));
                    };
                    let Some(Slot::Request(request)) = stack.pop() else {
                        return Err(underflow("request"));
                    };
                    let token = match cancel {
                        Some(i) => match arg_at(args, *i)? {
                            Value::Cancel(t) => t.clone(),
                            Value::Unit => CancellationToken::new(),
                            other => {
                                return Err(ExecError::fault(format!(
                                    "expected a cancellation token, found {}",
                                    other.kind()
                                )))
                            }
                        },
                        None => CancellationToken::new(),
                    };
                    let response = client.send(request, token).await.map_err(|e| {
                        if *translate_transport_errors {
                            ExecError::Rest(RestError::from_transport(&e))
                        } else {
                            ExecError::Transport(e)
                        }
                    })?;
                    stack.push(Slot::Response(response));
                }
                Op::ReadResponse { read } => {
                    let Some(Slot::Response(r)) = stack.pop() else {
                        return Err(underflow("response"));
                    };
                    let out = match read {
                        ResponseRead::Response => Outcome::Response(r),
                        ResponseRead::Status => Outcome::Status(r.status),
                        ResponseRead::Text => Outcome::Text(r.read_text()?),
                        ResponseRead::Bytes => Outcome::Bytes(r.read_bytes()?),
                        ResponseRead::Stream => Outcome::Stream(r.read_stream()?),
                        ResponseRead::Unit => {
                            r.ensure_success()?;
                            Outcome::Unit
                        }
                    };
                    stack.push(Slot::Out(out));
                }
                Op::Deserialize {
                    call,
                    input,
                    target,
                } => {
                    let raw = match (stack.pop(), input) {
                        (Some(Slot::Out(Outcome::Text(s))), Format::Text) => Value::Str(s),
                        (Some(Slot::Out(Outcome::Bytes(b))), Format::Binary) => Value::Bytes(b),
                        _ => return Err(underflow("response content")),
                    };
                    let v = self.call_target(call, this, &[raw], Some(target))?;
                    stack.push(Slot::Out(Outcome::Value(v)));
                }
                Op::ToObservable => {}
                Op::Pop => {
                    stack.pop();
                }
                Op::Return => {
                    return match stack.pop() {
                        Some(Slot::Request(r)) => Ok(Outcome::Request(r)),
                        Some(Slot::Response(r)) => Ok(Outcome::Response(r)),
                        Some(Slot::Out(o)) => Ok(o),
                        _ => Err(underflow("return value")),
                    }
                }
                other => {
                    return Err(ExecError::fault(format!(
                        "{other:?} is not valid in a method body"
                    )))
                }
            }
        }
        Err(ExecError::fault("body ended without returning"))
    }

    fn encode_body(
        &self,
        this: &Instance,
        v: &Value,
        encoding: &BodyEncoding,
    ) -> Result<Value, ExecError> {
        match encoding {
            BodyEncoding::Text => Ok(Value::Str(v.to_string())),
            BodyEncoding::Binary => match v {
                Value::Bytes(_) => Ok(v.clone()),
                other => Err(ExecError::fault(format!(
                    "expected bytes for a binary body, found {}",
                    other.kind()
                ))),
            },
            BodyEncoding::Serialized { call, format } => {
                let out = self.call_target(call, this, std::slice::from_ref(v), None)?;
                match (format, out) {
                    (Format::Text, Value::Str(s)) => Ok(Value::Str(s)),
                    (Format::Binary, Value::Bytes(b)) => Ok(Value::Bytes(b)),
                    (_, other) => Err(ExecError::Native {
                        call: call.key(),
                        message: format!("serializer returned {}", other.kind()),
                    }),
                }
            }
        }
    }

    fn call_target(
        &self,
        call: &CallTarget,
        this: &Instance,
        args: &[Value],
        type_arg: Option<&TypeRef>,
    ) -> Result<Value, ExecError> {
        let receiver = match call.receiver {
            Receiver::This => Some(this),
            Receiver::Static => None,
        };
        self.call_native(&call.key(), receiver, args, type_arg)
    }

    fn call_native(
        &self,
        key: &str,
        this: Option<&Instance>,
        args: &[Value],
        type_arg: Option<&TypeRef>,
    ) -> Result<Value, ExecError> {
        let f = self
            .natives
            .get(key)
            .ok_or_else(|| ExecError::fault(format!("no native implementation for {key}")))?;
        f(NativeCall {
            this,
            args,
            type_arg,
        })
        .map_err(|message| ExecError::Native {
            call: key.to_owned(),
            message,
        })
    }

    fn type_def(&self, name: &str) -> Result<&TypeDef, ExecError> {
        self.module
            .types
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ExecError::fault(format!("type {name} not found")))
    }
}

fn top(stack: &[HttpClient]) -> Result<&HttpClient, ExecError> {
    stack.last().ok_or_else(|| underflow("client"))
}

fn builder(stack: &mut [Slot]) -> Result<&mut RequestBuilder, ExecError> {
    match stack.last_mut() {
        Some(Slot::Builder(b)) => Ok(b),
        _ => Err(underflow("request builder")),
    }
}

fn load_client(this: &Instance, member: &str) -> Result<HttpClient, ExecError> {
    this.client(member)
        .ok_or_else(|| ExecError::fault(format!("client member '{member}' is not set")))
}

fn arg_at(args: &[Value], index: usize) -> Result<&Value, ExecError> {
    args.get(index)
        .ok_or_else(|| ExecError::fault(format!("missing argument #{index}")))
}

/// Entries of a string-keyed map argument, skipping unit values.
fn entries(v: &Value) -> Result<Vec<(String, Value)>, ExecError> {
    let all = match v {
        Value::Unit => Vec::new(),
        Value::Map(entries) => entries.clone(),
        Value::Json(serde_json::Value::Object(obj)) => obj
            .iter()
            .map(|(k, v)| (k.clone(), Value::Json(v.clone())))
            .collect(),
        other => {
            return Err(ExecError::fault(format!(
                "expected a string-keyed map, found {}",
                other.kind()
            )))
        }
    };
    Ok(all
        .into_iter()
        .filter(|(_, v)| !matches!(v, Value::Unit | Value::Json(serde_json::Value::Null)))
        .collect())
}

fn underflow(what: &str) -> ExecError {
    ExecError::fault(format!("expected a {what} on the operand stack"))
}
