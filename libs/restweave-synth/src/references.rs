//! Run-time members that synthesized bodies call into, and the libraries
//! that provide them.

use tracing::debug;

use crate::editor::{EditorError, LibraryInfo, ModuleEditor, ModuleResolver};

pub const RUNTIME_LIBRARY: &str = restweave::LIBRARY_NAME;
pub const OBSERVABLE_LIBRARY: &str = restweave::observable::ADAPTER_LIBRARY;

pub const FROM_FUTURE: &str = "observable::from_future";

/// Members every woven module imports from the run-time library.
pub const RUNTIME_MEMBERS: &[&str] = &[
    "HttpClient::new",
    "HttpClient::set_base_address",
    "HttpClient::add_default_header",
    "HttpClient::send",
    "RequestBuilder::new",
    "RequestBuilder::add_header",
    "RequestBuilder::add_headers",
    "RequestBuilder::add_query",
    "RequestBuilder::add_query_map",
    "RequestBuilder::add_path_arg",
    "RequestBuilder::body_text",
    "RequestBuilder::body_bytes",
    "RequestBuilder::compile",
    "Response::ensure_success",
    "Response::read_text",
    "Response::read_bytes",
    "Response::read_stream",
    "RestError::from_transport",
    "CancellationToken::new",
];

pub fn runtime_library() -> LibraryInfo {
    LibraryInfo {
        name: RUNTIME_LIBRARY.to_owned(),
        exports: RUNTIME_MEMBERS.iter().map(|m| (*m).to_owned()).collect(),
    }
}

pub fn observable_library() -> LibraryInfo {
    LibraryInfo {
        name: OBSERVABLE_LIBRARY.to_owned(),
        exports: vec![FROM_FUTURE.to_owned()],
    }
}

/// The observable adapter can be used when the module references its
/// library and the resolver can locate it.
pub fn observable_adapter_available(
    editor: &dyn ModuleEditor,
    resolver: &dyn ModuleResolver,
) -> bool {
    let referenced = editor.references().iter().any(|r| r == OBSERVABLE_LIBRARY);
    let resolved = resolver
        .resolve(OBSERVABLE_LIBRARY)
        .is_some_and(|lib| lib.exports_member(FROM_FUTURE));
    debug!(referenced, resolved, "observable adapter lookup");
    referenced && resolved
}

/// Import the run-time members, plus the adapter when it is used.
pub fn import_members(
    editor: &mut dyn ModuleEditor,
    with_observable: bool,
) -> Result<(), EditorError> {
    for member in RUNTIME_MEMBERS {
        editor.import(RUNTIME_LIBRARY, member)?;
    }
    if with_observable {
        editor.import(OBSERVABLE_LIBRARY, FROM_FUTURE)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{LibrarySet, MemoryModule};
    use crate::ir::ModuleDef;

    fn module(refs: &[&str]) -> MemoryModule {
        MemoryModule::new(ModuleDef {
            name: "m".into(),
            references: refs.iter().map(|r| (*r).to_owned()).collect(),
            imports: vec![],
            types: vec![],
        })
    }

    #[test]
    fn adapter_needs_reference_and_resolution() {
        let both = module(&[RUNTIME_LIBRARY, OBSERVABLE_LIBRARY]);
        assert!(observable_adapter_available(&both, &LibrarySet::builtin()));
        assert!(!observable_adapter_available(&both, &LibrarySet::runtime_only()));

        let unreferenced = module(&[RUNTIME_LIBRARY]);
        assert!(!observable_adapter_available(&unreferenced, &LibrarySet::builtin()));
    }

    #[test]
    fn imports_runtime_members() {
        let mut m = module(&[RUNTIME_LIBRARY]);
        import_members(&mut m, false).unwrap();
        assert_eq!(m.def().imports.len(), RUNTIME_MEMBERS.len());
    }
}
