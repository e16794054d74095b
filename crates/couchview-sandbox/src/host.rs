//! Host records exposed to snippets and the sink that receives their logs.
//!
//! The records are typed views of the JSON the query server receives. They
//! keep unknown members in a flattened `extra` map so nothing the database
//! sends is lost on the way into a snippet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Receives the messages snippets pass to `log`.
pub trait LogSink {
    /// Records one rendered message.
    fn log(&mut self, message: &str);
}

impl LogSink for Vec<String> {
    fn log(&mut self, message: &str) {
        self.push(message.to_owned());
    }
}

/// Documents are arbitrary JSON objects.
pub type Document = Json;

/// An HTTP request as described by the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    /// Raw request body, or `"undefined"` when absent.
    pub body: Json,
    /// Parsed cookies.
    pub cookie: Map<String, Json>,
    /// Parsed form fields.
    pub form: Map<String, Json>,
    /// Request headers.
    pub headers: Map<String, Json>,
    /// Document id addressed by the request, if any.
    pub id: Option<String>,
    /// Information about the target database.
    pub info: Option<DatabaseInfo>,
    /// HTTP method, either a string or an array for unusual verbs.
    pub method: Json,
    /// Path segments after the database name.
    pub path: Vec<String>,
    /// Address of the requesting client.
    pub peer: Option<String>,
    /// Parsed query string.
    pub query: Map<String, Json>,
    /// Path exactly as requested, before rewriting.
    pub raw_path: Option<String>,
    /// Requested path segments.
    pub requested_path: Vec<String>,
    /// Security object of the database.
    #[serde(rename = "secObj")]
    pub sec_obj: Option<SecurityObject>,
    /// Authenticated user.
    #[serde(rename = "userCtx")]
    pub user_ctx: Option<UserContext>,
    /// Server generated id the update handler may use for new documents.
    pub uuid: Option<String>,
    /// Members not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// Database metadata attached to requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseInfo {
    /// Database name.
    pub db_name: String,
    /// Number of live documents.
    pub doc_count: u64,
    /// Number of deleted documents.
    pub doc_del_count: u64,
    /// Update sequence, opaque to the query server.
    pub update_seq: Json,
    /// Purge sequence, opaque to the query server.
    pub purge_seq: Json,
    /// Whether compaction is running.
    pub compact_running: bool,
    /// Members not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// The authenticated user a request or validation runs on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserContext {
    /// Database the context was issued for.
    pub db: Option<String>,
    /// User name, `None` for anonymous requests.
    pub name: Option<String>,
    /// Roles granted to the user.
    pub roles: Vec<String>,
    /// Members not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl UserContext {
    /// Reports whether the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held == role)
    }
}

/// A database security object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityObject {
    /// Users and roles with administrative access.
    pub admins: SecurityMembers,
    /// Users and roles with read access.
    pub members: SecurityMembers,
    /// Members not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// Names and roles listed in one section of a security object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityMembers {
    /// User names.
    pub names: Vec<String>,
    /// Role names.
    pub roles: Vec<String>,
}
