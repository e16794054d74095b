//! Compiler and runtime for couchview function snippets.
//!
//! Design documents carry their logic as small text snippets written in a
//! purpose-built language. This crate turns a snippet into a
//! [`CompiledFunction`] bound to a restricted set of host symbols:
//!
//! - functions declared in the same snippet;
//! - pure intrinsics (`len`, `append`, `keys`, `values`, `has`, `string`,
//!   `type_of`);
//! - the host functions a kind's [`HostProfile`] grants (`emit`, `log`,
//!   `Forbidden`, `Unauthorized`).
//!
//! Nothing else resolves. There is no filesystem, network, process or
//! reflection access, and a snippet naming anything outside the whitelist
//! fails to compile rather than failing at run time.
//!
//! ```
//! use couchview_sandbox::{Compiler, MapFunction};
//! use serde_json::json;
//!
//! let map: MapFunction = Compiler::new()
//!     .compile_as("func Map(doc) { if doc.type == \"post\" { emit(doc._id, 1) } }")
//!     .expect("map compiles");
//! let mut logs: Vec<String> = Vec::new();
//! let emitted = map
//!     .call(&json!({"_id": "p1", "type": "post"}), &mut logs)
//!     .expect("map runs");
//! assert_eq!(emitted.pairs(), [(json!("p1"), json!(1))]);
//! ```

mod builtins;
mod compiler;
mod error;
mod function;
mod host;
mod interpreter;
mod kind;
mod ops;
mod profile;
mod resolve;
mod syntax;
mod value;

pub use compiler::Compiler;
pub use error::{CompileError, Diagnostic, InvocationError};
pub use function::{
    CompiledFunction, EmitAccumulator, FilterFunction, MapFunction, ReduceFunction,
    RewriteFunction, TypedFunction, UpdateFunction, UpdateResult, ValidateFunction,
    ValidationOutcome,
};
pub use host::{
    DatabaseInfo, Document, LogSink, Request, SecurityMembers, SecurityObject, UserContext,
};
pub use kind::FunctionKind;
pub use profile::{HostFunction, HostProfile, HostType};
pub use syntax::Position;

#[cfg(test)]
mod tests;
