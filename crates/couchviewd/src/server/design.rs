//! Compiled function sets registered per design document.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};
use tracing::warn;

use couchview_sandbox::{
    CompileError, Compiler, FilterFunction, LogSink, MapFunction, ReduceFunction,
    RewriteFunction, TypedFunction, UpdateFunction, ValidateFunction,
};

use super::REGISTRY_TARGET;

/// The map function of a view and its optional reduce.
#[derive(Debug, Clone)]
pub struct ViewFunctions {
    /// Map function run over documents.
    pub map: MapFunction,
    /// Reduce function applied to the map rows, if the view has one.
    pub reduce: Option<ReduceFunction>,
}

/// Every function compiled from one design document.
///
/// Entries that fail to compile are logged and left out, so a bundle may be
/// partial.
#[derive(Debug, Clone, Default)]
pub struct DesignDocumentBundle {
    views: BTreeMap<String, ViewFunctions>,
    filters: BTreeMap<String, FilterFunction>,
    updates: BTreeMap<String, UpdateFunction>,
    validate: Option<ValidateFunction>,
    rewrite: Option<RewriteFunction>,
}

impl DesignDocumentBundle {
    /// Compiles the function sections of `document`.
    pub fn compile(
        compiler: &Compiler,
        id: &str,
        document: &Map<String, Json>,
        logs: &mut dyn LogSink,
    ) -> Self {
        let mut reporter = FailureReporter { id, logs };
        let mut bundle = Self::default();

        for (name, view) in sections(document, "views") {
            let Some(map_source) = view.get("map").and_then(Json::as_str) else {
                continue;
            };
            let Some(map) = reporter.compile::<MapFunction>(compiler, "map", name, map_source)
            else {
                continue;
            };
            let reduce = view
                .get("reduce")
                .and_then(Json::as_str)
                .and_then(|source| {
                    reporter.compile::<ReduceFunction>(compiler, "reduce", name, source)
                });
            bundle
                .views
                .insert(name.clone(), ViewFunctions { map, reduce });
        }

        for (name, source) in sources(document, "filters") {
            if let Some(filter) = reporter.compile(compiler, "filter", name, source) {
                bundle.filters.insert(name.clone(), filter);
            }
        }

        for (name, source) in sources(document, "updates") {
            if let Some(update) = reporter.compile(compiler, "update", name, source) {
                bundle.updates.insert(name.clone(), update);
            }
        }

        if let Some(source) = document.get("validate_doc_update").and_then(Json::as_str) {
            bundle.validate = reporter.compile(compiler, "validate", "validate_doc_update", source);
        }

        if let Some(source) = document.get("rewrites").and_then(Json::as_str) {
            bundle.rewrite = reporter.compile(compiler, "rewrite", "rewrites", source);
        }

        bundle
    }

    /// Looks up a view by name.
    #[must_use]
    pub fn view(&self, name: &str) -> Option<&ViewFunctions> {
        self.views.get(name)
    }

    /// Looks up a filter by name.
    #[must_use]
    pub fn filter(&self, name: &str) -> Option<&FilterFunction> {
        self.filters.get(name)
    }

    /// Looks up an update handler by name.
    #[must_use]
    pub fn update(&self, name: &str) -> Option<&UpdateFunction> {
        self.updates.get(name)
    }

    /// The validate function, if one compiled.
    #[must_use]
    pub const fn validate(&self) -> Option<&ValidateFunction> {
        self.validate.as_ref()
    }

    /// The rewrite function, if one compiled.
    #[must_use]
    pub const fn rewrite(&self) -> Option<&RewriteFunction> {
        self.rewrite.as_ref()
    }

    /// Names of the compiled views, in order.
    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }
}

struct FailureReporter<'a> {
    id: &'a str,
    logs: &'a mut dyn LogSink,
}

impl FailureReporter<'_> {
    fn compile<F: TypedFunction>(
        &mut self,
        compiler: &Compiler,
        section: &str,
        name: &str,
        source: &str,
    ) -> Option<F> {
        compiler
            .compile_as::<F>(source)
            .map_err(|error| self.report(section, name, &error))
            .ok()
    }

    fn report(&mut self, section: &str, name: &str, error: &CompileError) {
        warn!(
            target: REGISTRY_TARGET,
            design = self.id,
            section,
            name,
            %error,
            "failed to compile design document function"
        );
        self.logs
            .log(&format!("Failed to compile {section} function: {name}"));
    }
}

/// Object-valued entries of `document[section]`.
fn sections<'a>(
    document: &'a Map<String, Json>,
    section: &str,
) -> impl Iterator<Item = (&'a String, &'a Map<String, Json>)> {
    document
        .get(section)
        .and_then(Json::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(name, entry)| entry.as_object().map(|object| (name, object)))
}

/// String-valued entries of `document[section]`.
fn sources<'a>(
    document: &'a Map<String, Json>,
    section: &str,
) -> impl Iterator<Item = (&'a String, &'a str)> {
    document
        .get(section)
        .and_then(Json::as_object)
        .into_iter()
        .flatten()
        .filter_map(|(name, entry)| entry.as_str().map(|source| (name, source)))
}
