//! Query server for a document database.
//!
//! The database starts `couchviewd` as a child process and talks to it over
//! standard input and output, one JSON array per line. Each line is a command
//! (`reset`, `add_fun`, `map_doc`, `reduce`, `ddoc`, ...). The server answers
//! with any number of `["log", message]` lines followed by exactly one
//! response.
//!
//! Functions arrive as source text in a small sandboxed language compiled by
//! [`couchview_sandbox`]. Ad hoc map functions registered with `add_fun` live
//! until the next `reset`; design documents registered with `ddoc new` are
//! compiled once and kept for the life of the process.
//!
//! The crate splits into three layers:
//!
//! - [`protocol`] frames lines, classifies and parses commands, and encodes
//!   replies.
//! - [`server`] holds the session state and the command handlers.
//! - bootstrap wiring loads configuration through [`couchview_config`],
//!   installs `tracing` on standard error and reports lifecycle events through
//!   a [`HealthReporter`].
//!
//! ```rust
//! use std::io::Cursor;
//!
//! use couchviewd::protocol::serve;
//! use couchviewd::server::QueryServer;
//!
//! let input = concat!(
//!     r#"["add_fun","func Map(doc) { emit(doc._id, 1) }"]"#, "\n",
//!     r#"["map_doc",{"_id":"a"}]"#, "\n",
//! );
//! let mut server = QueryServer::new();
//! let mut output = Vec::new();
//! serve(Cursor::new(input), &mut output, &mut server, 1024).expect("serve");
//! assert_eq!(String::from_utf8(output).expect("utf-8"), "true\n[[[\"a\",1]]]\n");
//! ```

mod bootstrap;
mod health;
mod process;
pub mod protocol;
pub mod server;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{RunError, run};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
