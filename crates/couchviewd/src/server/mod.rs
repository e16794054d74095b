//! Registry of compiled functions and the handlers that run them.
//!
//! [`QueryServer`] owns all session state: the ad hoc map functions added
//! with `add_fun`, the reduce sources kept alongside them, the compiled design
//! documents and the configuration from the last `reset`. Commands run one at
//! a time, so nothing here is shared.

mod design;
mod errors;
mod log;

use std::collections::HashMap;

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use couchview_sandbox::{
    Compiler, FunctionKind, LogSink, MapFunction, ReduceFunction, Request, SecurityObject,
    TypedFunction, UserContext, ValidationOutcome,
};

use crate::protocol::{Command, ResetConfig, Response};

pub use self::design::{DesignDocumentBundle, ViewFunctions};
pub use self::errors::HandlerError;
pub use self::log::SessionLog;

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Encoded reduce output at or below this size never trips `reduce_limit`.
const REDUCE_LIMIT_FLOOR: usize = 200;

/// Session state and command handlers.
#[derive(Debug, Default)]
pub struct QueryServer {
    compiler: Compiler,
    maps: Vec<MapFunction>,
    reduces: Vec<String>,
    designs: HashMap<String, DesignDocumentBundle>,
    config: ResetConfig,
}

impl QueryServer {
    /// Creates an empty server using the default compiler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty server that compiles with `compiler`.
    #[must_use]
    pub fn with_compiler(compiler: Compiler) -> Self {
        Self {
            compiler,
            ..Self::default()
        }
    }

    /// Configuration stored by the last `reset`.
    #[must_use]
    pub const fn config(&self) -> &ResetConfig {
        &self.config
    }

    /// Number of ad hoc map functions registered.
    #[must_use]
    pub const fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Ad hoc reduce sources registered with `add_fun`.
    #[must_use]
    pub const fn reduce_sources(&self) -> &[String] {
        self.reduces.as_slice()
    }

    /// Looks up a compiled design document.
    #[must_use]
    pub fn design(&self, id: &str) -> Option<&DesignDocumentBundle> {
        self.designs.get(id)
    }

    /// Runs one command against the session state.
    ///
    /// `line_bytes` is the size of the input line, used by the reduce limit.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] describing the `["error", ...]` reply the
    /// command produces.
    pub fn execute(
        &mut self,
        command: Command,
        line_bytes: usize,
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        match command {
            Command::Reset { config } => Ok(self.reset(config)),
            Command::AddFunction { source } => self.add_function(source),
            Command::AddLibrary { libraries } => Ok(Self::add_library(&libraries, logs)),
            Command::MapDocument { document } => self.map_document(&document, logs),
            Command::Reduce {
                sources,
                keys,
                values,
            } => self.reduce(&sources, Some(&keys), &values, line_bytes, logs),
            Command::Rereduce { sources, values } => {
                self.reduce(&sources, None, &values, line_bytes, logs)
            }
            Command::NewDesignDocument { id, document } => {
                Ok(self.new_design_document(id, &document, logs))
            }
            Command::View {
                id,
                name,
                documents,
            } => self.view(&id, &name, &documents, logs),
            Command::ViewReduce {
                id,
                name,
                keys,
                values,
            } => self.view_reduce(&id, &name, &keys, &values, line_bytes, logs),
            Command::Filter {
                id,
                name,
                documents,
                request,
            } => self.filter(&id, &name, &documents, &request, logs),
            Command::Update {
                id,
                name,
                document,
                request,
            } => self.update(&id, &name, document, &request, logs),
            Command::Validate {
                id,
                new_doc,
                old_doc,
                user_ctx,
                sec_obj,
            } => self.validate(&id, &new_doc, &old_doc, &user_ctx, &sec_obj, logs),
            Command::Rewrite { id, request } => self.rewrite(&id, &request, logs),
        }
    }

    fn reset(&mut self, config: ResetConfig) -> Response {
        self.maps.clear();
        self.reduces.clear();
        self.config = config;
        Response::Ok
    }

    fn add_function(&mut self, source: String) -> Result<Response, HandlerError> {
        let compiled = self
            .compiler
            .compile(&source, None)
            .map_err(|error| HandlerError::invalid_function(error.to_string()))?;
        match compiled.kind() {
            FunctionKind::Map => {
                let map = MapFunction::from_compiled(compiled)
                    .map_err(|error| HandlerError::invalid_function(error.to_string()))?;
                self.maps.push(map);
            }
            FunctionKind::Reduce => self.reduces.push(source),
            other => {
                return Err(HandlerError::invalid_function(format!(
                    "expected a Map or Reduce function, found a {other} function"
                )));
            }
        }
        Ok(Response::Ok)
    }

    fn add_library(libraries: &Map<String, Json>, logs: &mut dyn LogSink) -> Response {
        debug!(
            target: REGISTRY_TARGET,
            libraries = libraries.len(),
            "ignoring shared libraries"
        );
        logs.log("Libraries are not supported");
        Response::Ok
    }

    fn map_document(&self, document: &Json, logs: &mut dyn LogSink) -> Result<Response, HandlerError> {
        let rows = self
            .maps
            .iter()
            .map(|map| map.call(document, logs))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Response::Mapped(rows))
    }

    fn reduce(
        &self,
        sources: &[String],
        keys: Option<&[Json]>,
        values: &[Json],
        line_bytes: usize,
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            match self.compiler.compile_as::<ReduceFunction>(source) {
                Ok(reduce) => results.push(reduce.call(keys, values, keys.is_none(), logs)?),
                Err(error) => {
                    warn!(target: REGISTRY_TARGET, %error, "failed to compile reduce function");
                    results.push(Json::Null);
                }
            }
        }
        self.check_reduce_limit(&results, line_bytes)?;
        Ok(Response::Results(results))
    }

    fn new_design_document(
        &mut self,
        id: String,
        document: &Map<String, Json>,
        logs: &mut dyn LogSink,
    ) -> Response {
        let bundle = DesignDocumentBundle::compile(&self.compiler, &id, document, logs);
        debug!(
            target: REGISTRY_TARGET,
            design = %id,
            views = bundle.view_names().count(),
            "registered design document"
        );
        self.designs.insert(id, bundle);
        Response::Ok
    }

    fn view(
        &self,
        id: &str,
        name: &str,
        documents: &[Json],
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        let view = self.lookup_view(id, name)?;
        let results = documents
            .iter()
            .map(|document| {
                view.map
                    .call(document, logs)
                    .map(|emitted| Json::Bool(!emitted.is_empty()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Response::Results(results))
    }

    fn view_reduce(
        &self,
        id: &str,
        name: &str,
        keys: &[Json],
        values: &[Json],
        line_bytes: usize,
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        let Some(reduce) = &self.lookup_view(id, name)?.reduce else {
            return Err(HandlerError::not_found(format!(
                "reduce function for view `{name}` in `{id}`"
            )));
        };
        let results = vec![reduce.call(Some(keys), values, false, logs)?];
        self.check_reduce_limit(&results, line_bytes)?;
        Ok(Response::Results(results))
    }

    fn filter(
        &self,
        id: &str,
        name: &str,
        documents: &[Json],
        request: &Request,
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        let filter = self
            .lookup_design(id)?
            .filter(name)
            .ok_or_else(|| HandlerError::not_found(format!("filter `{name}` in `{id}`")))?;
        let results = documents
            .iter()
            .map(|document| filter.call(document, request, logs).map(Json::Bool))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Response::Results(results))
    }

    fn update(
        &self,
        id: &str,
        name: &str,
        document: Json,
        request: &Request,
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        let update = self
            .lookup_design(id)?
            .update(name)
            .ok_or_else(|| HandlerError::not_found(format!("update handler `{name}` in `{id}`")))?;
        let target = if document.is_null() {
            minted_document(request)
        } else {
            document
        };
        let result = update.call(&target, request, logs)?;
        Ok(Response::Updated {
            document: result.document,
            response: result.response,
        })
    }

    fn validate(
        &self,
        id: &str,
        new_doc: &Json,
        old_doc: &Json,
        user_ctx: &UserContext,
        sec_obj: &SecurityObject,
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        let validate = self
            .lookup_design(id)?
            .validate()
            .ok_or_else(|| HandlerError::not_found(format!("validate_doc_update in `{id}`")))?;
        match validate.call(new_doc, old_doc, user_ctx, sec_obj, logs)? {
            ValidationOutcome::Accepted => Ok(Response::Accepted),
            ValidationOutcome::Forbidden(message) => Err(HandlerError::Forbidden(message)),
            ValidationOutcome::Unauthorized(message) => Err(HandlerError::Unauthorized(message)),
            ValidationOutcome::Rejected(Json::String(message)) => {
                Err(HandlerError::ValidationFailed(message))
            }
            ValidationOutcome::Rejected(other) => {
                Err(HandlerError::ValidationFailed(other.to_string()))
            }
        }
    }

    fn rewrite(
        &self,
        id: &str,
        request: &Request,
        logs: &mut dyn LogSink,
    ) -> Result<Response, HandlerError> {
        let rewrite = self
            .lookup_design(id)?
            .rewrite()
            .ok_or_else(|| HandlerError::not_found(format!("rewrites in `{id}`")))?;
        Ok(Response::Rewritten(rewrite.call(request, logs)?))
    }

    fn lookup_design(&self, id: &str) -> Result<&DesignDocumentBundle, HandlerError> {
        self.designs
            .get(id)
            .ok_or_else(|| HandlerError::not_found(format!("design document `{id}`")))
    }

    fn lookup_view(&self, id: &str, name: &str) -> Result<&ViewFunctions, HandlerError> {
        self.lookup_design(id)?
            .view(name)
            .ok_or_else(|| HandlerError::not_found(format!("view `{name}` in `{id}`")))
    }

    fn check_reduce_limit(&self, results: &[Json], line_bytes: usize) -> Result<(), HandlerError> {
        if !self.config.reduce_limit {
            return Ok(());
        }
        let output_bytes = serde_json::to_string(results).map_or(0, |encoded| encoded.len());
        if output_bytes > REDUCE_LIMIT_FLOOR && output_bytes.saturating_mul(2) > line_bytes {
            return Err(HandlerError::ReduceOverflow {
                output_bytes,
                input_bytes: line_bytes,
            });
        }
        Ok(())
    }
}

/// Stand-in for a missing document: `{"_id": request.id ?? request.uuid}`.
fn minted_document(request: &Request) -> Json {
    let id = request
        .id
        .as_ref()
        .or(request.uuid.as_ref())
        .map_or(Json::Null, |id| Json::String(id.clone()));
    let mut document = Map::new();
    document.insert("_id".to_owned(), id);
    Json::Object(document)
}
