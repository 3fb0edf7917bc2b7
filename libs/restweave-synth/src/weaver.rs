//! Batch driver: synthesizes every candidate type on a bounded worker pool,
//! then applies the edits through the module editor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::diagnostics::{Diagnostics, LogLine, LogSink};
use crate::editor::{EditorError, ModuleEditor, ModuleResolver};
use crate::error::WeaveError;
use crate::ir::{Op, TypeDef};
use crate::members;
use crate::options::WeavingOptions;
use crate::references;
use crate::synth::{MethodRecord, Synthesizer, TypePlan};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Weave(#[from] WeaveError),
    #[error(transparent)]
    Editor(#[from] EditorError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeaveReport {
    pub modified_types: usize,
    pub created_methods: usize,
    /// Every stub that was looked at, in type then declaration order.
    pub methods: Vec<MethodRecord>,
    /// Empty unless the run was not strict.
    pub failures: Vec<WeaveError>,
    /// Lines logged by this run only.
    pub log: Vec<LogLine>,
}

impl WeaveReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
struct Counters {
    modified_types: AtomicUsize,
    created_methods: AtomicUsize,
}

type UnitResult = (usize, Result<Option<TypePlan>, WeaveError>);

pub struct ModuleWeaver {
    options: Arc<WeavingOptions>,
    resolver: Arc<dyn ModuleResolver>,
    sink: Arc<dyn LogSink>,
}

impl ModuleWeaver {
    pub fn new(
        options: WeavingOptions,
        resolver: Arc<dyn ModuleResolver>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            options: Arc::new(options),
            resolver,
            sink,
        }
    }

    pub fn options(&self) -> &WeavingOptions {
        &self.options
    }

    #[instrument(skip_all, fields(
        module = %editor.module_name(),
        path = %editor.module_path().map(|p| p.display().to_string()).unwrap_or_default()
    ))]
    pub async fn execute<E: ModuleEditor>(&self, editor: &mut E) -> Result<WeaveReport, RunError> {
        let diag = Diagnostics::new(self.sink.clone());
        let mut log = diag.unit();
        let source = match editor.module_path() {
            Some(path) => format!("{} ({})", editor.module_name(), path.display()),
            None => editor.module_name().to_owned(),
        };
        log.log(format!("Weaving {source}"));
        for line in self.options.to_string().lines() {
            log.log(line);
        }

        let adapter = references::observable_adapter_available(&*editor, self.resolver.as_ref());
        log.log(format!("Observable adapter available: {adapter}"));

        let types = editor.types();
        let shared = members::shared_codecs(&types, &mut log)?;
        let synth = Synthesizer::new(self.options.clone(), Arc::new(shared), adapter);

        let counters = Arc::new(Counters::default());
        let results = self
            .synthesize_all(&diag, synth, types, counters.clone())
            .await;

        let mut report = WeaveReport::default();
        let mut plans = Vec::new();
        for (_, result) in results {
            match result {
                Ok(Some(plan)) => {
                    report.methods.extend(plan.records.iter().cloned());
                    report.failures.extend(plan.failures.iter().cloned());
                    plans.push(plan);
                }
                Ok(None) => {}
                Err(e) => report.failures.push(e),
            }
        }

        if self.options.strict {
            if let Some(first) = report.failures.first().cloned() {
                log.important(format!("Weaving {source} failed: {first}"));
                return Err(first.into());
            }
        }

        report.modified_types = counters.modified_types.load(Ordering::Relaxed);
        report.created_methods = counters.created_methods.load(Ordering::Relaxed);

        if report.modified_types > 0 {
            let observable = plans
                .iter()
                .flat_map(|p| &p.bodies)
                .any(|(_, ops)| ops.contains(&Op::ToObservable));
            log.log("Importing run-time members");
            references::import_members(editor, observable)?;
        }
        for plan in plans.into_iter().filter(|p| !p.is_empty()) {
            log.log(format!("Rewriting {}", plan.type_name));
            apply(editor, plan)?;
        }

        if report.is_clean() {
            log.important("Weaving successful!");
        } else {
            for e in &report.failures {
                warn!(reason = %e.reason, subject = %e.subject, "skipped");
            }
            log.important(format!(
                "Weaving finished with {} skipped item(s)",
                report.failures.len()
            ));
        }
        log.important(format!(
            "Changed {} classes, and created {} methods.",
            report.modified_types, report.created_methods
        ));
        info!(
            modified_types = report.modified_types,
            created_methods = report.created_methods,
            "weave complete"
        );
        report.log = diag.lines();
        Ok(report)
    }

    /// Runs one unit per type and waits for all of them. A panicking unit
    /// is re-raised after the others have finished.
    async fn synthesize_all(
        &self,
        diag: &Diagnostics,
        synth: Synthesizer,
        types: Vec<TypeDef>,
        counters: Arc<Counters>,
    ) -> Vec<UnitResult> {
        let permits = Arc::new(Semaphore::new(self.options.effective_workers()));
        let mut set = JoinSet::new();

        for (index, ty) in types.into_iter().enumerate() {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let synth = synth.clone();
            let counters = counters.clone();
            let mut log = diag.unit();
            set.spawn_blocking(move || {
                let _permit = permit;
                let result = synth.synthesize_type(&ty, &mut log);
                if let Ok(Some(plan)) = &result {
                    if !plan.is_empty() {
                        counters.modified_types.fetch_add(1, Ordering::Relaxed);
                    }
                    counters
                        .created_methods
                        .fetch_add(plan.bodies.len(), Ordering::Relaxed);
                }
                (index, result)
            });
        }

        let mut results = Vec::new();
        let mut panic = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(r) => results.push(r),
                Err(e) if e.is_panic() => {
                    panic.get_or_insert(e.into_panic());
                }
                Err(e) => warn!(error = %e, "synthesis unit did not complete"),
            }
        }
        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }

        results.sort_by_key(|(index, _)| *index);
        results
    }
}

fn apply<E: ModuleEditor>(editor: &mut E, plan: TypePlan) -> Result<(), EditorError> {
    let ty = plan.type_name.as_str();
    if let Some(field) = plan.new_field {
        editor.add_field(ty, field)?;
    }
    let mut constructors = plan.constructors;
    if let Some(ctor) = plan.new_constructor {
        constructors.push(editor.add_method(ty, ctor)?);
    }
    for &ctor in &constructors {
        if !plan.constructor_prologue.is_empty() {
            editor.insert_ops_at_start(ty, ctor, plan.constructor_prologue.clone())?;
        }
        if !plan.constructor_epilogue.is_empty() {
            editor.append_ops(ty, ctor, plan.constructor_epilogue.clone())?;
        }
    }
    for (index, body) in plan.bodies {
        editor.append_ops(ty, index, body)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{MemorySink, Priority};
    use crate::editor::{LibrarySet, MemoryModule};
    use crate::error::Reason;
    use crate::ir::{MethodDef, ModuleDef, TypeRef};
    use crate::markers::{HttpVerb, Marker};
    use crate::references::RUNTIME_LIBRARY;
    use crate::service::CLIENT_FIELD;
    use crate::synth::MethodState;

    fn api(name: &str, address: Option<&str>) -> TypeDef {
        let mut ty = TypeDef::new(name);
        ty.markers.push(match address {
            Some(a) => Marker::ServiceFor {
                address: Some(a.to_owned()),
            },
            None => Marker::Service,
        });
        let mut m = MethodDef::stub("ping", TypeRef::future(TypeRef::String));
        m.markers.push(Marker::Http {
            verb: HttpVerb::Get,
            path: Some("/ping".into()),
        });
        ty.methods.push(m);
        ty
    }

    fn module(types: Vec<TypeDef>) -> MemoryModule {
        MemoryModule::new(ModuleDef {
            name: "demo".into(),
            references: vec![RUNTIME_LIBRARY.into()],
            imports: vec![],
            types,
        })
    }

    fn weaver(options: WeavingOptions) -> (ModuleWeaver, Arc<MemorySink>) {
        let sink = MemorySink::new();
        let w = ModuleWeaver::new(options, Arc::new(LibrarySet::builtin()), sink.clone());
        (w, sink)
    }

    #[tokio::test]
    async fn rewrites_services_and_reports_counts() {
        let mut m = module(vec![
            api("A", Some("http://a.test/")),
            TypeDef::new("Plain"),
            api("B", Some("http://b.test/")),
        ]);
        let (w, sink) = weaver(WeavingOptions::default());
        let report = w.execute(&mut m).await.unwrap();

        assert_eq!(report.modified_types, 2);
        assert_eq!(report.created_methods, 2);
        assert!(report.methods.iter().all(|r| r.state == MethodState::Registered));

        let a = m.type_def("A").unwrap();
        assert_eq!(a.fields[0].name, CLIENT_FIELD);
        let (_, ctor) = a.constructors().next().unwrap();
        assert_eq!(ctor.body.first(), Some(&Op::NewClient));
        assert!(!a.methods[0].is_extern);
        assert_eq!(m.type_def("Plain").unwrap(), &TypeDef::new("Plain"));
        assert!(!m.def().imports.is_empty());

        assert!(sink.contains(Priority::Info, "Weaving successful!"));
        assert!(sink.contains(
            Priority::Info,
            "Changed 2 classes, and created 2 methods."
        ));
    }

    #[tokio::test]
    async fn strict_run_leaves_module_untouched() {
        let original = module(vec![api("A", Some("http://a.test/")), api("Bad", None)]);
        let mut m = original.clone();
        let (w, _) = weaver(WeavingOptions::default());

        let err = w.execute(&mut m).await.unwrap_err();
        let RunError::Weave(e) = err else {
            panic!("expected a weave error");
        };
        assert_eq!(e.reason, Reason::NoClientNorAddress);
        assert_eq!(e.subject, "Bad");
        assert_eq!(e.trail[0], "Bad");
        assert_eq!(m, original);
    }

    #[tokio::test]
    async fn lenient_run_skips_failed_types() {
        let mut m = module(vec![api("Bad", None), api("A", Some("http://a.test/"))]);
        let (w, sink) = weaver(WeavingOptions {
            strict: false,
            workers: 1,
            ..Default::default()
        });

        let report = w.execute(&mut m).await.unwrap();
        assert_eq!(report.modified_types, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(m.type_def("Bad").unwrap().methods[0].is_extern);
        assert!(!m.type_def("A").unwrap().methods[0].is_extern);
        assert!(sink.contains(Priority::Error, "NoClientNorAddress in Bad"));
        assert!(report.failures[0].is_structural());
    }

    #[tokio::test]
    async fn bad_method_header_skips_only_that_method() {
        let mut ty = api("A", Some("http://a.test/"));
        let mut bad = ty.methods[0].clone();
        bad.name = "bad".into();
        bad.markers.push(Marker::Header {
            args: vec![Some("X-Only-Name".into())],
        });
        ty.methods.push(bad);
        let mut m = module(vec![ty]);
        let (w, _) = weaver(WeavingOptions {
            strict: false,
            ..Default::default()
        });

        let report = w.execute(&mut m).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].reason, Reason::MalformedHeader);
        assert!(!report.failures[0].is_structural());
        assert_eq!(report.modified_types, 1);
        assert_eq!(report.created_methods, 1);
        let a = m.type_def("A").unwrap();
        assert!(!a.methods[0].is_extern);
        assert!(a.methods[1].is_extern);
    }

    #[tokio::test]
    async fn strict_failure_names_the_module_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        let source = module(vec![api("Bad", None)]);
        std::fs::write(&path, source.to_json().unwrap()).unwrap();
        let mut m = MemoryModule::load(&path).unwrap();
        let (w, sink) = weaver(WeavingOptions::default());

        w.execute(&mut m).await.unwrap_err();
        let shown = path.display().to_string();
        assert!(sink.contains(Priority::Info, &format!("Weaving demo ({shown}) failed")));
    }

    #[tokio::test]
    async fn each_run_keeps_its_own_log() {
        let input = module(vec![api("A", Some("http://a.test/"))]);
        let (w, _) = weaver(WeavingOptions::default());
        let first = w.execute(&mut input.clone()).await.unwrap();
        let second = w.execute(&mut input.clone()).await.unwrap();
        assert!(!first.log.is_empty());
        assert_eq!(first.log, second.log);
    }

    #[tokio::test]
    async fn repeated_runs_on_fresh_copies_match() {
        let input = module(vec![api("A", Some("http://a.test/")), api("B", Some("http://b.test/"))]);
        let (w, _) = weaver(WeavingOptions {
            workers: 4,
            ..Default::default()
        });
        let mut first = input.clone();
        let mut second = input.clone();
        w.execute(&mut first).await.unwrap();
        w.execute(&mut second).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn no_service_means_no_imports() {
        let mut m = module(vec![TypeDef::new("Plain")]);
        let (w, _) = weaver(WeavingOptions::default());
        let report = w.execute(&mut m).await.unwrap();
        assert_eq!(report.modified_types, 0);
        assert!(m.def().imports.is_empty());
    }
}
