//! In-memory model of a compiled module: types, members, signatures and
//! method bodies as sequences of [`Op`]s.

use serde::{Deserialize, Serialize};

use crate::markers::{HttpVerb, Marker};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    /// Libraries this module references by name.
    #[serde(default)]
    pub references: Vec<String>,
    /// External members imported into the module.
    #[serde(default)]
    pub imports: Vec<MemberRef>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub library: String,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn constructors(&self) -> impl Iterator<Item = (usize, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == MethodKind::Constructor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    #[default]
    Method,
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub kind: MethodKind,
    #[serde(default)]
    pub is_static: bool,
    /// Declared without an implementation.
    #[serde(default)]
    pub is_extern: bool,
    #[serde(default)]
    pub generic_params: Vec<GenericParam>,
    #[serde(default)]
    pub params: Vec<ParamDef>,
    #[serde(default = "TypeRef::unit")]
    pub return_type: TypeRef,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub body: Vec<Op>,
}

impl MethodDef {
    pub fn stub(name: impl Into<String>, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Method,
            is_static: false,
            is_extern: true,
            generic_params: Vec::new(),
            params: Vec::new(),
            return_type,
            markers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn constructor() -> Self {
        Self {
            kind: MethodKind::Constructor,
            is_extern: false,
            ..Self::stub(".ctor", TypeRef::Unit)
        }
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericParam {
    pub name: String,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            markers: Vec::new(),
        }
    }

    pub fn marked(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }
}

/// Declared types as far as synthesis needs to distinguish them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum TypeRef {
    Unit,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    /// Any object.
    Object,
    Generic(String),
    Map(Box<TypeRef>, Box<TypeRef>),
    List(Box<TypeRef>),
    Future(Box<TypeRef>),
    Observable(Box<TypeRef>),
    /// A named type, runtime primitives use their `restweave::` path.
    Named(String),
}

impl TypeRef {
    pub const CLIENT: &'static str = "restweave::HttpClient";
    pub const REQUEST: &'static str = "restweave::Request";
    pub const RESPONSE: &'static str = "restweave::Response";
    pub const STATUS_CODE: &'static str = "restweave::StatusCode";
    pub const BYTE_STREAM: &'static str = "restweave::ByteStream";
    pub const CANCELLATION: &'static str = "restweave::CancellationToken";

    pub fn unit() -> Self {
        TypeRef::Unit
    }

    pub fn named(path: impl Into<String>) -> Self {
        TypeRef::Named(path.into())
    }

    pub fn client() -> Self {
        TypeRef::named(Self::CLIENT)
    }

    pub fn future(inner: TypeRef) -> Self {
        TypeRef::Future(Box::new(inner))
    }

    pub fn observable(inner: TypeRef) -> Self {
        TypeRef::Observable(Box::new(inner))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map(Box::new(key), Box::new(value))
    }

    pub fn is_named(&self, path: &str) -> bool {
        matches!(self, TypeRef::Named(p) if p == path)
    }

    /// A map keyed by strings, whatever the value type.
    pub fn is_string_keyed_map(&self) -> bool {
        matches!(self, TypeRef::Map(k, _) if **k == TypeRef::String)
    }
}

/// How a generated body reaches the service's client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "member", content = "name", rename_all = "snake_case")]
pub enum ClientAccess {
    Field(String),
    Property(String),
}

impl ClientAccess {
    pub fn name(&self) -> &str {
        match self {
            ClientAccess::Field(n) | ClientAccess::Property(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    This,
    Static,
}

/// A user-defined method invoked from a generated body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTarget {
    pub owner: String,
    pub method: String,
    pub receiver: Receiver,
}

impl CallTarget {
    pub fn key(&self) -> String {
        format!("{}::{}", self.owner, self.method)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "as", rename_all = "snake_case")]
pub enum BodyEncoding {
    Text,
    Binary,
    Serialized { call: CallTarget, format: Format },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseRead {
    Response,
    Status,
    Text,
    Bytes,
    Stream,
    /// Check success and discard the content.
    Unit,
}

/// One low-level operation of a method body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Code written by the user; `native` names its implementation when executable.
    UserCode {
        #[serde(default)]
        native: Option<String>,
    },

    // client initialization
    NewClient,
    SetBaseAddress { address: String },
    AddDefaultHeader { name: String, value: String },
    StoreField { field: String },
    LoadClient { access: ClientAccess },
    Pop,

    // request building
    NewRequest { verb: HttpVerb, path: String },
    AddHeader { name: String, value: String },
    AddHeaderArg { name: String, arg: usize },
    AddHeaders { arg: usize },
    AddQuery { name: String, arg: usize },
    AddQueryMap { arg: usize },
    AddPathArg { name: String, arg: usize },
    SetBody { arg: usize, encoding: BodyEncoding },
    Compile,

    // dispatch and transform
    Send {
        cancel: Option<usize>,
        translate_transport_errors: bool,
    },
    ReadResponse { read: ResponseRead },
    Deserialize { call: CallTarget, input: Format, target: TypeRef },
    ToObservable,
    Return,
}
