//! Shared state for behavioural snippet tests.

use serde_json::{Value as Json, json};

use crate::{
    CompileError, Compiler, FilterFunction, FunctionKind, InvocationError, MapFunction,
    ReduceFunction, Request, SecurityObject, TypedFunction, UpdateFunction, UpdateResult,
    UserContext, ValidateFunction, ValidationOutcome,
};

/// Outcome of the most recent invocation in a scenario.
#[derive(Debug)]
pub enum Invocation {
    Emitted(Vec<(Json, Json)>),
    Reduced(Json),
    Filtered(bool),
    Updated(UpdateResult),
    Validated(ValidationOutcome),
}

/// Scenario state shared between behavioural steps.
pub struct TestWorld {
    pub compiler: Compiler,
    pub source: String,
    pub compile_error: Option<CompileError>,
    pub invocation: Option<Result<Invocation, InvocationError>>,
    pub logs: Vec<String>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            compiler: Compiler::new(),
            source: String::new(),
            compile_error: None,
            invocation: None,
            logs: Vec::new(),
        }
    }

    /// Compiles the current source as `F`, recording any compile error.
    pub fn compile<F: TypedFunction>(&mut self) -> Option<F> {
        match self.compiler.compile_as::<F>(&self.source) {
            Ok(function) => Some(function),
            Err(error) => {
                self.compile_error = Some(error);
                None
            }
        }
    }

    pub fn check(&mut self, expected: Option<FunctionKind>) {
        self.compile_error = self.compiler.compile(&self.source, expected).err();
    }

    pub fn run_map(&mut self, doc: &Json) {
        let Some(map) = self.compile::<MapFunction>() else {
            return;
        };
        self.invocation = Some(
            map.call(doc, &mut self.logs)
                .map(|emitted| Invocation::Emitted(emitted.into_pairs())),
        );
    }

    pub fn run_reduce(&mut self, values: &[Json], rereduce: bool) {
        let Some(reduce) = self.compile::<ReduceFunction>() else {
            return;
        };
        let keys: Vec<Json> = values.iter().map(|_| Json::Null).collect();
        let key_list = (!rereduce).then_some(keys.as_slice());
        self.invocation = Some(
            reduce
                .call(key_list, values, rereduce, &mut self.logs)
                .map(Invocation::Reduced),
        );
    }

    pub fn run_filter(&mut self, doc: &Json) {
        let Some(filter) = self.compile::<FilterFunction>() else {
            return;
        };
        let request = Request::default();
        self.invocation = Some(
            filter
                .call(doc, &request, &mut self.logs)
                .map(Invocation::Filtered),
        );
    }

    pub fn run_update(&mut self, doc: &Json) {
        let Some(update) = self.compile::<UpdateFunction>() else {
            return;
        };
        let request = Request {
            uuid: Some("minted".to_owned()),
            ..Request::default()
        };
        self.invocation = Some(
            update
                .call(doc, &request, &mut self.logs)
                .map(Invocation::Updated),
        );
    }

    pub fn run_validate(&mut self, new_doc: &Json, roles: &[&str]) {
        let Some(validate) = self.compile::<ValidateFunction>() else {
            return;
        };
        let user = UserContext {
            name: Some("tester".to_owned()),
            roles: roles.iter().map(|role| (*role).to_owned()).collect(),
            ..UserContext::default()
        };
        self.invocation = Some(
            validate
                .call(
                    new_doc,
                    &json!(null),
                    &user,
                    &SecurityObject::default(),
                    &mut self.logs,
                )
                .map(Invocation::Validated),
        );
    }

    pub fn outcome(&self) -> &Invocation {
        match self.invocation.as_ref() {
            Some(Ok(outcome)) => outcome,
            Some(Err(error)) => panic!("invocation failed: {error}"),
            None => panic!(
                "nothing was invoked; compile error: {:?}",
                self.compile_error
            ),
        }
    }

    pub fn invocation_error(&self) -> &InvocationError {
        match self.invocation.as_ref() {
            Some(Err(error)) => error,
            other => panic!("expected an invocation error, got {other:?}"),
        }
    }
}

/// Strips surrounding double quotes from a step argument.
pub fn strip_quotes(text: &str) -> &str {
    text.trim_matches('"')
}

/// Parses a JSON step argument.
pub fn json_arg(text: &str) -> Json {
    serde_json::from_str(text.trim()).expect("step argument is JSON")
}
