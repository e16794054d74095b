//! Compiled functions and their per-kind invocation wrappers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::error::{CompileError, InvocationError};
use crate::host::{Document, LogSink, Request, SecurityObject, UserContext};
use crate::interpreter::{self, Effects};
use crate::kind::FunctionKind;
use crate::resolve::Module;
use crate::value::{FailureKind, Value};

/// A snippet that compiled successfully, tagged with its kind.
///
/// Cloning is cheap; the resolved program is shared.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    module: Arc<Module>,
    max_call_depth: usize,
}

impl CompiledFunction {
    pub(crate) fn new(module: Module, max_call_depth: usize) -> Self {
        Self {
            module: Arc::new(module),
            max_call_depth,
        }
    }

    /// Kind declared by the source.
    #[must_use]
    pub fn kind(&self) -> FunctionKind {
        self.module.kind()
    }

    fn invoke(
        &self,
        arguments: Vec<Value>,
        logs: &mut dyn LogSink,
    ) -> Result<(Value, Vec<(Json, Json)>), InvocationError> {
        let mut effects = Effects::new(logs);
        let result = interpreter::run(&self.module, arguments, self.max_call_depth, &mut effects)
            .map_err(|diagnostic| InvocationError::Runtime {
                kind: self.kind(),
                diagnostic,
            })?;
        Ok((result, effects.emitted))
    }

    fn invalid_result(&self, message: impl Into<String>) -> InvocationError {
        InvocationError::InvalidResult {
            kind: self.kind(),
            message: message.into(),
        }
    }

    fn host_value<T: Serialize>(&self, what: &'static str, record: &T) -> Result<Value, InvocationError> {
        serde_json::to_value(record)
            .map(|json| Value::from(&json))
            .map_err(|error| InvocationError::HostValue {
                kind: self.kind(),
                what,
                message: error.to_string(),
            })
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A compiled function narrowed to one kind.
pub trait TypedFunction: sealed::Sealed + Sized {
    /// Kind the wrapper accepts.
    const KIND: FunctionKind;

    #[doc(hidden)]
    fn wrap(function: CompiledFunction) -> Self;

    /// Narrows `function`, failing when its kind differs from [`Self::KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::SignatureMismatch`] on a kind mismatch.
    fn from_compiled(function: CompiledFunction) -> Result<Self, CompileError> {
        let found = function.kind();
        if found == Self::KIND {
            Ok(Self::wrap(function))
        } else {
            Err(CompileError::SignatureMismatch {
                expected: Self::KIND,
                found,
            })
        }
    }
}

macro_rules! typed_function {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            function: CompiledFunction,
        }

        impl sealed::Sealed for $name {}

        impl TypedFunction for $name {
            const KIND: FunctionKind = FunctionKind::$kind;

            fn wrap(function: CompiledFunction) -> Self {
                Self { function }
            }
        }
    };
}

typed_function!(
    /// `func Map(doc)`: emits key/value pairs for a document.
    MapFunction => Map
);
typed_function!(
    /// `func Reduce(keys, values, rereduce)`: folds values into one result.
    ReduceFunction => Reduce
);
typed_function!(
    /// `func Filter(doc, req)`: selects documents by truthiness.
    FilterFunction => Filter
);
typed_function!(
    /// `func Update(doc, req)`: returns the document to save and a response.
    UpdateFunction => Update
);
typed_function!(
    /// `func Validate(newDoc, oldDoc, userCtx, secObj)`: approves or rejects a write.
    ValidateFunction => Validate
);
typed_function!(
    /// `func Rewrite(req)`: maps a request onto another path.
    RewriteFunction => Rewrite
);

/// Key/value pairs emitted by one map invocation, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmitAccumulator {
    pairs: Vec<(Json, Json)>,
}

impl EmitAccumulator {
    /// Emitted pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(Json, Json)] {
        &self.pairs
    }

    /// Reports whether nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Consumes the accumulator, returning its pairs.
    #[must_use]
    pub fn into_pairs(self) -> Vec<(Json, Json)> {
        self.pairs
    }
}

impl MapFunction {
    /// Runs the function over `doc` with a fresh accumulator.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Runtime`] when the snippet fails.
    pub fn call(&self, doc: &Document, logs: &mut dyn LogSink) -> Result<EmitAccumulator, InvocationError> {
        let (_, pairs) = self.function.invoke(vec![Value::from(doc)], logs)?;
        Ok(EmitAccumulator { pairs })
    }
}

impl ReduceFunction {
    /// Folds `values`; `keys` is `None` on rereduce.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Runtime`] when the snippet fails.
    pub fn call(
        &self,
        keys: Option<&[Json]>,
        values: &[Json],
        rereduce: bool,
        logs: &mut dyn LogSink,
    ) -> Result<Json, InvocationError> {
        let keys_value = keys.map_or(Value::Null, |items| {
            Value::Array(items.iter().map(Value::from).collect())
        });
        let values_value = Value::Array(values.iter().map(Value::from).collect());
        let (result, _) = self
            .function
            .invoke(vec![keys_value, values_value, Value::Bool(rereduce)], logs)?;
        Ok(result.to_json())
    }
}

impl FilterFunction {
    /// Reports whether `doc` passes the filter.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] when the request cannot be exposed or
    /// the snippet fails.
    pub fn call(&self, doc: &Document, request: &Request, logs: &mut dyn LogSink) -> Result<bool, InvocationError> {
        let req = self.function.host_value("request", request)?;
        let (result, _) = self.function.invoke(vec![Value::from(doc), req], logs)?;
        Ok(result.is_truthy())
    }
}

/// What an update function asked the server to do.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Document to save, or `null` to save nothing.
    pub document: Json,
    /// HTTP response description; bare strings are wrapped as `{"body": ...}`.
    pub response: Json,
}

impl UpdateFunction {
    /// Runs the update handler.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::InvalidResult`] unless the snippet returns
    /// a `[doc, response]` pair whose response is a string or an object.
    pub fn call(
        &self,
        doc: &Document,
        request: &Request,
        logs: &mut dyn LogSink,
    ) -> Result<UpdateResult, InvocationError> {
        let req = self.function.host_value("request", request)?;
        let (result, _) = self.function.invoke(vec![Value::from(doc), req], logs)?;
        let Value::Array(items) = result else {
            return Err(self
                .function
                .invalid_result("expected a [doc, response] array"));
        };
        let mut parts = items.into_iter();
        let (Some(document), Some(raw_response), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(self
                .function
                .invalid_result("expected exactly two elements: [doc, response]"));
        };
        let response = match raw_response {
            Value::String(body) => {
                let mut wrapped = Map::new();
                wrapped.insert("body".to_owned(), Json::String(body));
                Json::Object(wrapped)
            }
            object @ Value::Object(_) => object.to_json(),
            other => {
                return Err(self.function.invalid_result(format!(
                    "response must be a string or an object, got a {}",
                    other.type_name()
                )));
            }
        };
        Ok(UpdateResult {
            document: document.to_json(),
            response,
        })
    }
}

/// Decision reached by a validate function.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The function returned nothing or `null`.
    Accepted,
    /// The function returned `Forbidden(message)`.
    Forbidden(String),
    /// The function returned `Unauthorized(message)`.
    Unauthorized(String),
    /// The function returned some other value.
    Rejected(Json),
}

impl ValidateFunction {
    /// Checks a proposed write.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] when a host record cannot be exposed or
    /// the snippet fails.
    pub fn call(
        &self,
        new_doc: &Document,
        old_doc: &Document,
        user_ctx: &UserContext,
        sec_obj: &SecurityObject,
        logs: &mut dyn LogSink,
    ) -> Result<ValidationOutcome, InvocationError> {
        let arguments = vec![
            Value::from(new_doc),
            Value::from(old_doc),
            self.function.host_value("user context", user_ctx)?,
            self.function.host_value("security object", sec_obj)?,
        ];
        let (result, _) = self.function.invoke(arguments, logs)?;
        Ok(match result {
            Value::Null => ValidationOutcome::Accepted,
            Value::Failure {
                kind: FailureKind::Forbidden,
                message,
            } => ValidationOutcome::Forbidden(message),
            Value::Failure {
                kind: FailureKind::Unauthorized,
                message,
            } => ValidationOutcome::Unauthorized(message),
            other => ValidationOutcome::Rejected(other.to_json()),
        })
    }
}

impl RewriteFunction {
    /// Maps `request` onto a rewritten request description.
    ///
    /// A bare string result is shorthand for `{"path": ...}`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::InvalidResult`] unless the snippet returns
    /// an object or a string.
    pub fn call(&self, request: &Request, logs: &mut dyn LogSink) -> Result<Json, InvocationError> {
        let req = self.function.host_value("request", request)?;
        let (result, _) = self.function.invoke(vec![req], logs)?;
        match result {
            Value::String(path) => {
                let mut rewritten = Map::new();
                rewritten.insert("path".to_owned(), Json::String(path));
                Ok(Json::Object(rewritten))
            }
            object @ Value::Object(_) => Ok(object.to_json()),
            other => Err(self.function.invalid_result(format!(
                "expected an object or a path string, got a {}",
                other.type_name()
            ))),
        }
    }
}
