//! Command model: classification and positional parsing of input lines.
//!
//! Classification runs in two stages because `ddoc` is polymorphic. The
//! command name at position 0 selects most kinds directly; for `ddoc` the
//! literal `"new"` at position 1 or the operation path at position 2 decides.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use couchview_sandbox::{Request, SecurityObject, UserContext};

use super::errors::ProtocolError;

/// Closed set of commands the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `["reset", config?]`
    Reset,
    /// `["add_fun", source]`
    AddFunction,
    /// `["add_lib", libraries]`
    AddLibrary,
    /// `["map_doc", doc]`
    MapDocument,
    /// `["reduce", sources, pairs]`
    Reduce,
    /// `["rereduce", sources, values]`
    Rereduce,
    /// `["ddoc", "new", id, doc]`
    NewDesignDocument,
    /// `["ddoc", id, ["views", name, "map"], docs]`
    ViewDesignOperation,
    /// `["ddoc", id, ["views", name, "reduce"], pairs]`
    ViewReduceDesignOperation,
    /// `["ddoc", id, ["filters", name], docs, request]`
    FilterDesignOperation,
    /// `["ddoc", id, ["updates", name], [doc, request]]`
    UpdateDesignOperation,
    /// `["ddoc", id, ["validate_doc_update"], [new, old, userCtx, secObj]]`
    ValidateDesignOperation,
    /// `["ddoc", id, ["rewrites"], [request]]`
    RewriteDesignOperation,
}

impl CommandKind {
    /// Returns the canonical name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::AddFunction => "add_fun",
            Self::AddLibrary => "add_lib",
            Self::MapDocument => "map_doc",
            Self::Reduce => "reduce",
            Self::Rereduce => "rereduce",
            Self::NewDesignDocument => "ddoc new",
            Self::ViewDesignOperation => "ddoc views map",
            Self::ViewReduceDesignOperation => "ddoc views reduce",
            Self::FilterDesignOperation => "ddoc filters",
            Self::UpdateDesignOperation => "ddoc updates",
            Self::ValidateDesignOperation => "ddoc validate_doc_update",
            Self::RewriteDesignOperation => "ddoc rewrites",
        }
    }

    /// Classifies a decoded line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedCommand`] when position 0 is not a
    /// string, [`ProtocolError::UnknownCommand`] for names outside the
    /// protocol and [`ProtocolError::UnknownDesignOperation`] for `ddoc`
    /// paths the server does not implement.
    pub fn classify(line: &[Json]) -> Result<Self, ProtocolError> {
        let Some(Json::String(name)) = line.first() else {
            return Err(ProtocolError::malformed_command(
                "unnamed",
                0,
                "a command name string",
            ));
        };
        match name.as_str() {
            "reset" => Ok(Self::Reset),
            "add_fun" => Ok(Self::AddFunction),
            "add_lib" => Ok(Self::AddLibrary),
            "map_doc" => Ok(Self::MapDocument),
            "reduce" => Ok(Self::Reduce),
            "rereduce" => Ok(Self::Rereduce),
            "ddoc" => Self::classify_design(line),
            other => Err(ProtocolError::unknown_command(other)),
        }
    }

    fn classify_design(line: &[Json]) -> Result<Self, ProtocolError> {
        if line.get(1).and_then(Json::as_str) == Some("new") {
            return Ok(Self::NewDesignDocument);
        }
        let Some(Json::Array(path)) = line.get(2) else {
            return Err(ProtocolError::malformed_command(
                "ddoc",
                2,
                "an operation path array",
            ));
        };
        let operation = path.first().and_then(Json::as_str);
        let kind = match operation {
            Some("views") => match path.get(2).and_then(Json::as_str) {
                Some("reduce") => Some(Self::ViewReduceDesignOperation),
                Some("map") | None => Some(Self::ViewDesignOperation),
                Some(_) => None,
            },
            Some("filters") => Some(Self::FilterDesignOperation),
            Some("updates") => Some(Self::UpdateDesignOperation),
            Some("validate_doc_update") => Some(Self::ValidateDesignOperation),
            Some("rewrites") => Some(Self::RewriteDesignOperation),
            _ => None,
        };
        kind.ok_or_else(|| ProtocolError::unknown_design_operation(Json::Array(path.clone()).to_string()))
    }
}

/// Configuration carried by `reset`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    /// Reject reduce output that grows faster than its input.
    pub reduce_limit: bool,
    /// Per-command timeout in milliseconds. Recorded, not enforced.
    pub timeout: Option<u64>,
    /// Members not covered above.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// A fully parsed command, ready for the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Clear the ad hoc functions and store a new configuration.
    Reset {
        /// Configuration to store.
        config: ResetConfig,
    },
    /// Register an ad hoc map or reduce function.
    AddFunction {
        /// Snippet source.
        source: String,
    },
    /// Register shared library code.
    AddLibrary {
        /// Library sources by name.
        libraries: Map<String, Json>,
    },
    /// Run every ad hoc map function over a document.
    MapDocument {
        /// The document to map.
        document: Json,
    },
    /// Reduce mapped rows with each source in turn.
    Reduce {
        /// Reduce function sources.
        sources: Vec<String>,
        /// Row keys, in row order.
        keys: Vec<Json>,
        /// Row values, in row order.
        values: Vec<Json>,
    },
    /// Combine previous reduce results.
    Rereduce {
        /// Reduce function sources.
        sources: Vec<String>,
        /// Partial results to combine.
        values: Vec<Json>,
    },
    /// Compile and register a design document.
    NewDesignDocument {
        /// Design document id.
        id: String,
        /// The design document body.
        document: Map<String, Json>,
    },
    /// Report which documents a view's map function emits for.
    View {
        /// Design document id.
        id: String,
        /// View name.
        name: String,
        /// Documents to test.
        documents: Vec<Json>,
    },
    /// Reduce rows with a view's reduce function.
    ViewReduce {
        /// Design document id.
        id: String,
        /// View name.
        name: String,
        /// Row keys, in row order.
        keys: Vec<Json>,
        /// Row values, in row order.
        values: Vec<Json>,
    },
    /// Run a filter over documents.
    Filter {
        /// Design document id.
        id: String,
        /// Filter name.
        name: String,
        /// Documents to filter.
        documents: Vec<Json>,
        /// The replication or changes request.
        request: Box<Request>,
    },
    /// Run an update handler.
    Update {
        /// Design document id.
        id: String,
        /// Update handler name.
        name: String,
        /// Existing document, or `null` when none exists.
        document: Json,
        /// The HTTP request.
        request: Box<Request>,
    },
    /// Validate a proposed write.
    Validate {
        /// Design document id.
        id: String,
        /// Proposed document.
        new_doc: Json,
        /// Current document, or `null`.
        old_doc: Json,
        /// The user performing the write.
        user_ctx: UserContext,
        /// The database security object.
        sec_obj: SecurityObject,
    },
    /// Rewrite an HTTP request.
    Rewrite {
        /// Design document id.
        id: String,
        /// The HTTP request.
        request: Box<Request>,
    },
}

impl Command {
    /// Decodes an input line into its JSON elements.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedLine`] unless the line is a JSON
    /// array.
    pub fn decode_line(line: &[u8]) -> Result<Vec<Json>, ProtocolError> {
        match serde_json::from_slice::<Json>(line).map_err(ProtocolError::from_json_error)? {
            Json::Array(items) => Ok(items),
            other => Err(ProtocolError::malformed_line(format!(
                "expected a JSON array, found {}",
                json_type(&other)
            ))),
        }
    }

    /// Parses `line` using the positional layout of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedCommand`] naming the first element
    /// that is missing or has the wrong type.
    pub fn parse(kind: CommandKind, line: &[Json]) -> Result<Self, ProtocolError> {
        let fields = Fields {
            command: kind.as_str(),
            items: line,
        };
        match kind {
            CommandKind::Reset => Ok(Self::Reset {
                config: match line.get(1) {
                    None | Some(Json::Null) => ResetConfig::default(),
                    Some(_) => fields.typed(1, "a configuration object")?,
                },
            }),
            CommandKind::AddFunction => Ok(Self::AddFunction {
                source: fields.string(1, "a function source string")?,
            }),
            CommandKind::AddLibrary => Ok(Self::AddLibrary {
                libraries: fields.object(1, "a library object")?,
            }),
            CommandKind::MapDocument => Ok(Self::MapDocument {
                document: Json::Object(fields.object(1, "a document object")?),
            }),
            CommandKind::Reduce => {
                let sources = fields.strings(1, "an array of function sources")?;
                let (keys, values) = fields.rows(2)?;
                Ok(Self::Reduce {
                    sources,
                    keys,
                    values,
                })
            }
            CommandKind::Rereduce => Ok(Self::Rereduce {
                sources: fields.strings(1, "an array of function sources")?,
                values: fields.array(2, "an array of values")?.to_vec(),
            }),
            CommandKind::NewDesignDocument => Ok(Self::NewDesignDocument {
                id: fields.string(2, "a design document id")?,
                document: fields.object(3, "a design document object")?,
            }),
            CommandKind::ViewDesignOperation => Ok(Self::View {
                id: fields.string(1, "a design document id")?,
                name: fields.path_name()?,
                documents: fields.documents(3)?,
            }),
            CommandKind::ViewReduceDesignOperation => {
                let (keys, values) = fields.rows(3)?;
                Ok(Self::ViewReduce {
                    id: fields.string(1, "a design document id")?,
                    name: fields.path_name()?,
                    keys,
                    values,
                })
            }
            CommandKind::FilterDesignOperation => {
                let (documents, request) = fields.filter_arguments()?;
                Ok(Self::Filter {
                    id: fields.string(1, "a design document id")?,
                    name: fields.path_name()?,
                    documents,
                    request: Box::new(request),
                })
            }
            CommandKind::UpdateDesignOperation => {
                let arguments = fields.arguments(3, "a [doc, request] array")?;
                Ok(Self::Update {
                    id: fields.string(1, "a design document id")?,
                    name: fields.path_name()?,
                    document: match arguments.first() {
                        None | Some(Json::Null) => Json::Null,
                        Some(doc @ Json::Object(_)) => doc.clone(),
                        Some(_) => {
                            return Err(fields.malformed(3, "a document object or null"));
                        }
                    },
                    request: Box::new(arguments.typed(1, "a request object")?),
                })
            }
            CommandKind::ValidateDesignOperation => {
                let arguments =
                    fields.arguments(3, "a [newDoc, oldDoc, userCtx, secObj] array")?;
                Ok(Self::Validate {
                    id: fields.string(1, "a design document id")?,
                    new_doc: arguments.first().cloned().unwrap_or(Json::Null),
                    old_doc: arguments.get(1).cloned().unwrap_or(Json::Null),
                    user_ctx: arguments.typed(2, "a user context object")?,
                    sec_obj: arguments.typed(3, "a security object")?,
                })
            }
            CommandKind::RewriteDesignOperation => {
                let arguments = fields.arguments(3, "a [request] array")?;
                Ok(Self::Rewrite {
                    id: fields.string(1, "a design document id")?,
                    request: Box::new(arguments.typed(0, "a request object")?),
                })
            }
        }
    }
}

/// Positional accessor that reports failures against the outer line.
struct Fields<'a> {
    command: &'static str,
    items: &'a [Json],
}

/// Elements of a nested argument array, reported at the array's position.
struct Arguments<'a> {
    command: &'static str,
    position: usize,
    items: &'a [Json],
}

impl<'a> Fields<'a> {
    const fn malformed(&self, position: usize, expected: &'static str) -> ProtocolError {
        ProtocolError::malformed_command(self.command, position, expected)
    }

    fn string(&self, position: usize, expected: &'static str) -> Result<String, ProtocolError> {
        match self.items.get(position) {
            Some(Json::String(text)) => Ok(text.clone()),
            _ => Err(self.malformed(position, expected)),
        }
    }

    fn object(
        &self,
        position: usize,
        expected: &'static str,
    ) -> Result<Map<String, Json>, ProtocolError> {
        match self.items.get(position) {
            Some(Json::Object(entries)) => Ok(entries.clone()),
            _ => Err(self.malformed(position, expected)),
        }
    }

    fn array(&self, position: usize, expected: &'static str) -> Result<&'a [Json], ProtocolError> {
        match self.items.get(position) {
            Some(Json::Array(items)) => Ok(items.as_slice()),
            _ => Err(self.malformed(position, expected)),
        }
    }

    fn strings(&self, position: usize, expected: &'static str) -> Result<Vec<String>, ProtocolError> {
        self.array(position, expected)?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| self.malformed(position, expected))
            })
            .collect()
    }

    fn typed<T: DeserializeOwned>(
        &self,
        position: usize,
        expected: &'static str,
    ) -> Result<T, ProtocolError> {
        let value = self
            .items
            .get(position)
            .ok_or_else(|| self.malformed(position, expected))?;
        serde_json::from_value(value.clone()).map_err(|_| self.malformed(position, expected))
    }

    /// Name at position 1 of the operation path.
    fn path_name(&self) -> Result<String, ProtocolError> {
        self.array(2, "an operation path array")?
            .get(1)
            .and_then(Json::as_str)
            .map(str::to_owned)
            .ok_or_else(|| self.malformed(2, "a function name in the operation path"))
    }

    fn arguments(
        &self,
        position: usize,
        expected: &'static str,
    ) -> Result<Arguments<'a>, ProtocolError> {
        Ok(Arguments {
            command: self.command,
            position,
            items: self.array(position, expected)?,
        })
    }

    /// Documents given either flat or wrapped in a single inner array.
    fn documents(&self, position: usize) -> Result<Vec<Json>, ProtocolError> {
        let items = self.array(position, "an array of documents")?;
        match items {
            [Json::Array(inner)] => Ok(inner.clone()),
            flat => Ok(flat.to_vec()),
        }
    }

    /// Splits `[[key, value], ...]` rows into keys and values.
    fn rows(&self, position: usize) -> Result<(Vec<Json>, Vec<Json>), ProtocolError> {
        const EXPECTED: &str = "an array of [key, value] rows";
        let rows = self.array(position, EXPECTED)?;
        let mut keys = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let Some([key, value]) = row.as_array().map(Vec::as_slice) else {
                return Err(self.malformed(position, EXPECTED));
            };
            keys.push(key.clone());
            values.push(value.clone());
        }
        Ok((keys, values))
    }

    /// Filter arguments: `docs, request` flat, or `[docs, request]` nested.
    fn filter_arguments(&self) -> Result<(Vec<Json>, Request), ProtocolError> {
        const EXPECTED: &str = "an array of documents";
        if self.items.len() > 4 {
            let documents = self.array(3, EXPECTED)?.to_vec();
            return Ok((documents, self.typed(4, "a request object")?));
        }
        let arguments = self.arguments(3, "a [docs, request] array")?;
        let documents = match arguments.items.first() {
            Some(Json::Array(docs)) => docs.clone(),
            _ => return Err(self.malformed(3, EXPECTED)),
        };
        Ok((documents, arguments.typed(1, "a request object")?))
    }
}

impl Arguments<'_> {
    fn first(&self) -> Option<&Json> {
        self.items.first()
    }

    fn get(&self, index: usize) -> Option<&Json> {
        self.items.get(index)
    }

    /// Deserializes element `index`, treating absence and `null` as default.
    fn typed<T: DeserializeOwned + Default>(
        &self,
        index: usize,
        expected: &'static str,
    ) -> Result<T, ProtocolError> {
        match self.items.get(index) {
            None | Some(Json::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|_| ProtocolError::malformed_command(self.command, self.position, expected)),
        }
    }
}

const fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
