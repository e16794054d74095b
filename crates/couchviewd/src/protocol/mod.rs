//! Query protocol: command model, framing loop and reply encoding.

mod command;
mod errors;
mod handler;
mod response;

pub use self::command::{Command, CommandKind, ResetConfig};
pub use self::errors::{ProtocolError, ServeError};
pub use self::handler::{SessionSummary, serve};
pub use self::response::{Message, Response, ResponseWriter};
