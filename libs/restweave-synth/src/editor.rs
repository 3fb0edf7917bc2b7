//! The narrow boundary to the module being rewritten, and to the libraries
//! it references.

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use crate::ir::{FieldDef, MemberRef, MethodDef, ModuleDef, Op, TypeDef};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("type '{0}' not found")]
    TypeNotFound(String),
    #[error("method #{index} not found on '{ty}'")]
    MethodNotFound { ty: String, index: usize },
    #[error("member '{member}' already exists on '{ty}'")]
    DuplicateMember { ty: String, member: String },
    #[error("library '{0}' is not referenced by the module")]
    UnknownLibrary(String),
}

/// Editing capability over a compiled module.
///
/// Methods are addressed by their index in [`TypeDef::methods`]; adding
/// methods only appends, so indices stay valid for the whole run.
pub trait ModuleEditor {
    fn module_name(&self) -> &str;

    /// Where the module was read from, when it came from disk.
    fn module_path(&self) -> Option<&Path> {
        None
    }

    /// Names of the libraries the module references.
    fn references(&self) -> Vec<String>;

    /// Snapshot of every type with its members.
    fn types(&self) -> Vec<TypeDef>;

    /// Import an external member into the module. Importing twice is a no-op.
    fn import(&mut self, library: &str, member: &str) -> Result<MemberRef, EditorError>;

    /// Append operations to a body. A method with a body is no longer extern.
    fn append_ops(&mut self, ty: &str, method: usize, ops: Vec<Op>) -> Result<(), EditorError>;

    fn insert_ops_at_start(
        &mut self,
        ty: &str,
        method: usize,
        ops: Vec<Op>,
    ) -> Result<(), EditorError>;

    fn add_field(&mut self, ty: &str, field: FieldDef) -> Result<(), EditorError>;

    /// Returns the index of the new method.
    fn add_method(&mut self, ty: &str, method: MethodDef) -> Result<usize, EditorError>;
}

/// [`ModuleEditor`] over an in-memory [`ModuleDef`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryModule {
    def: ModuleDef,
    path: Option<PathBuf>,
}

impl MemoryModule {
    pub fn new(def: ModuleDef) -> Self {
        Self { def, path: None }
    }

    pub fn from_json(src: &str) -> anyhow::Result<Self> {
        let def = serde_json::from_str(src).context("invalid module description")?;
        Ok(Self::new(def))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read module {}", path.display()))?;
        let mut module = Self::from_json(&src)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        module.path = Some(path.to_path_buf());
        Ok(module)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(&self.def).context("failed to serialize module")
    }

    pub fn def(&self) -> &ModuleDef {
        &self.def
    }

    pub fn into_inner(self) -> ModuleDef {
        self.def
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.def.types.iter().find(|t| t.name == name)
    }

    fn type_mut(&mut self, name: &str) -> Result<&mut TypeDef, EditorError> {
        self.def
            .types
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| EditorError::TypeNotFound(name.to_owned()))
    }

    fn method_mut(&mut self, ty: &str, index: usize) -> Result<&mut MethodDef, EditorError> {
        let t = self.type_mut(ty)?;
        let ty = t.name.clone();
        t.methods
            .get_mut(index)
            .ok_or(EditorError::MethodNotFound { ty, index })
    }
}

impl ModuleEditor for MemoryModule {
    fn module_name(&self) -> &str {
        &self.def.name
    }

    fn module_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn references(&self) -> Vec<String> {
        self.def.references.clone()
    }

    fn types(&self) -> Vec<TypeDef> {
        self.def.types.clone()
    }

    fn import(&mut self, library: &str, member: &str) -> Result<MemberRef, EditorError> {
        if !self.def.references.iter().any(|r| r == library) {
            return Err(EditorError::UnknownLibrary(library.to_owned()));
        }
        let r = MemberRef {
            library: library.to_owned(),
            member: member.to_owned(),
        };
        if !self.def.imports.contains(&r) {
            self.def.imports.push(r.clone());
        }
        Ok(r)
    }

    fn append_ops(&mut self, ty: &str, method: usize, ops: Vec<Op>) -> Result<(), EditorError> {
        let m = self.method_mut(ty, method)?;
        m.body.extend(ops);
        m.is_extern = false;
        Ok(())
    }

    fn insert_ops_at_start(
        &mut self,
        ty: &str,
        method: usize,
        ops: Vec<Op>,
    ) -> Result<(), EditorError> {
        let m = self.method_mut(ty, method)?;
        m.body.splice(0..0, ops);
        m.is_extern = false;
        Ok(())
    }

    fn add_field(&mut self, ty: &str, field: FieldDef) -> Result<(), EditorError> {
        let t = self.type_mut(ty)?;
        if t.fields.iter().any(|f| f.name == field.name)
            || t.properties.iter().any(|p| p.name == field.name)
        {
            return Err(EditorError::DuplicateMember {
                ty: ty.to_owned(),
                member: field.name,
            });
        }
        t.fields.push(field);
        Ok(())
    }

    fn add_method(&mut self, ty: &str, method: MethodDef) -> Result<usize, EditorError> {
        let t = self.type_mut(ty)?;
        t.methods.push(method);
        Ok(t.methods.len() - 1)
    }
}

/// A referenced library and the runtime members it exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryInfo {
    pub name: String,
    pub exports: Vec<String>,
}

impl LibraryInfo {
    pub fn exports_member(&self, member: &str) -> bool {
        self.exports.iter().any(|e| e == member)
    }
}

/// Locates libraries referenced by the module being processed.
pub trait ModuleResolver: Send + Sync {
    fn resolve(&self, library: &str) -> Option<LibraryInfo>;
}

/// Resolver over a fixed set of known libraries.
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    libs: Vec<LibraryInfo>,
}

impl LibrarySet {
    /// The run-time library only.
    pub fn runtime_only() -> Self {
        Self {
            libs: vec![crate::references::runtime_library()],
        }
    }

    /// The run-time library and the observable adapter.
    pub fn builtin() -> Self {
        let mut set = Self::runtime_only();
        set.libs.push(crate::references::observable_library());
        set
    }

    /// Built-in libraries selected by name; the run-time library is always present.
    /// Returns the names that are not known.
    pub fn from_names<I, S>(names: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = Self::builtin();
        let mut set = Self::runtime_only();
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            match known.resolve(name) {
                Some(lib) if set.resolve(name).is_none() => set.libs.push(lib),
                Some(_) => {}
                None => unknown.push(name.to_owned()),
            }
        }
        (set, unknown)
    }

    pub fn with(mut self, lib: LibraryInfo) -> Self {
        self.libs.push(lib);
        self
    }
}

impl ModuleResolver for LibrarySet {
    fn resolve(&self, library: &str) -> Option<LibraryInfo> {
        self.libs.iter().find(|l| l.name == library).cloned()
    }
}
