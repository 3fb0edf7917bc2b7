#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use restweave::{PreparedRequest, Response, StatusCode, Transport, TransportError};
use restweave_synth::{
    Interpreter, LibrarySet, MemoryModule, MemorySink, ModuleWeaver, NativeTable, Value,
    WeaveReport, WeavingOptions,
};

pub const ITEMS: &str = include_str!("../fixtures/items.json");

/// In-process transport: records every request and answers from a queue,
/// `200 OK` with an empty body once the queue is drained.
#[derive(Default)]
pub struct Scripted {
    seen: Mutex<Vec<PreparedRequest>>,
    replies: Mutex<VecDeque<Result<Response, TransportError>>>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap();
        self.replies
            .lock()
            .push_back(Ok(Response::new(status, body.to_owned())));
    }

    pub fn fail(&self, err: TransportError) {
        self.replies.lock().push_back(Err(err));
    }

    pub fn seen(&self) -> Vec<PreparedRequest> {
        self.seen.lock().clone()
    }

    pub fn last(&self) -> PreparedRequest {
        self.seen.lock().last().cloned().expect("no request was sent")
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn execute(&self, request: PreparedRequest) -> Result<Response, TransportError> {
        self.seen.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Response::new(StatusCode::OK, "")))
    }
}

pub fn load(json: &str) -> MemoryModule {
    MemoryModule::from_json(json).unwrap()
}

pub async fn weave(
    mut module: MemoryModule,
    options: WeavingOptions,
) -> (MemoryModule, WeaveReport, Arc<MemorySink>) {
    let sink = MemorySink::new();
    let weaver = ModuleWeaver::new(options, Arc::new(LibrarySet::builtin()), sink.clone());
    let report = weaver.execute(&mut module).await.unwrap();
    (module, report, sink)
}

/// JSON codecs for the `Json` type of the fixture module.
pub fn json_natives() -> NativeTable {
    NativeTable::new()
        .register("Json::to_json", NativeTable::json_to_text())
        .register("Json::from_json", NativeTable::json_parse())
}

pub fn interpreter(module: MemoryModule, transport: Arc<Scripted>) -> Interpreter {
    Interpreter::new(module.into_inner())
        .with_natives(json_natives())
        .with_transport(transport)
}

pub fn header<'a>(req: &'a PreparedRequest, name: &str) -> Vec<&'a str> {
    req.headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .collect()
}

pub fn json(v: serde_json::Value) -> Value {
    Value::Json(v)
}
