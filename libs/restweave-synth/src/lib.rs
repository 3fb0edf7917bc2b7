//! Declarative-to-implementation synthesis for REST service descriptions.
//!
//! A service description is a type whose methods are bodyless stubs carrying
//! HTTP markers. [`ModuleWeaver`] scans a module through the [`ModuleEditor`]
//! boundary, resolves every service (client source, default headers,
//! serializer and deserializer), binds each stub's parameters and emits a
//! body that builds the request, dispatches it, and converts the response
//! into the declared return shape.
//!
//! Pipeline per type: [`service`] -> [`members`] -> [`binder`] + [`shape`]
//! -> [`synth`]. [`diagnostics`] wraps every stage.

pub mod binder;
pub mod diagnostics;
pub mod editor;
pub mod error;
pub mod exec;
pub mod ir;
pub mod markers;
pub mod members;
pub mod options;
pub mod references;
pub mod service;
pub mod shape;
pub mod synth;
pub mod weaver;

pub use diagnostics::{Diagnostics, LogSink, MemorySink, Priority, StepLog, TracingSink};
pub use editor::{EditorError, LibraryInfo, LibrarySet, MemoryModule, ModuleEditor, ModuleResolver};
pub use error::{Category, Reason, WeaveError};
pub use exec::{ExecError, Instance, Interpreter, NativeTable, Outcome, Value};
pub use ir::{ModuleDef, Op, TypeDef, TypeRef};
pub use markers::{HttpVerb, Marker};
pub use options::WeavingOptions;
pub use synth::{MethodRecord, MethodState};
pub use weaver::{ModuleWeaver, RunError, WeaveReport};
