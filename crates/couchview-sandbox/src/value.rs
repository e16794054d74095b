//! Runtime values manipulated by the interpreter.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Number, Value as Json};

/// Tag carried by the failure values that validate functions return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
    Forbidden,
    Unauthorized,
}

impl FailureKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
        }
    }
}

/// A dynamically typed snippet value.
///
/// Values mirror JSON one to one, except that integers and floats are kept
/// apart so that integer documents round-trip unchanged, and a `Failure`
/// variant exists for the validate constructors.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Self>),
    Object(BTreeMap<String, Self>),
    Failure { kind: FailureKind, message: String },
}

impl Value {
    pub(crate) const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Failure { .. } => "failure",
        }
    }

    /// `null`, `false`, zero and the empty string are falsy.
    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(flag) => *flag,
            Self::Int(number) => *number != 0,
            Self::Float(number) => *number != 0.0 && !number.is_nan(),
            Self::String(text) => !text.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Failure { .. } => true,
        }
    }

    /// Converts the value into JSON. Non-finite floats become `null`.
    pub(crate) fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(flag) => Json::Bool(*flag),
            Self::Int(number) => Json::Number(Number::from(*number)),
            Self::Float(number) => Number::from_f64(*number).map_or(Json::Null, Json::Number),
            Self::String(text) => Json::String(text.clone()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<JsonMap<String, Json>>(),
            ),
            Self::Failure { kind, message } => {
                let mut entry = JsonMap::new();
                entry.insert(kind.as_str().to_owned(), Json::String(message.clone()));
                Json::Object(entry)
            }
        }
    }

    /// Text form used by string concatenation, `string()` and `log()`.
    ///
    /// Strings render without quotes; everything else renders as JSON.
    pub(crate) fn render(&self) -> String {
        match self {
            Self::String(text) => text.clone(),
            other => other.to_json().to_string(),
        }
    }
}

impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(flag) => Self::Bool(*flag),
            Json::Number(number) => number
                .as_i64()
                .map_or_else(|| Self::Float(number.as_f64().unwrap_or(f64::NAN)), Self::Int),
            Json::String(text) => Self::String(text.clone()),
            Json::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            Json::Object(entries) => Self::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Self::String(left), Self::String(right)) => left == right,
            (Self::Array(left), Self::Array(right)) => left == right,
            (Self::Object(left), Self::Object(right)) => left == right,
            (
                Self::Failure {
                    kind: left_kind,
                    message: left_message,
                },
                Self::Failure {
                    kind: right_kind,
                    message: right_message,
                },
            ) => left_kind == right_kind && left_message == right_message,
            _ => false,
        }
    }
}

impl Value {
    #[expect(
        clippy::cast_precision_loss,
        reason = "snippet numbers follow JSON double semantics"
    )]
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(number) => Some(*number as f64),
            Self::Float(number) => Some(*number),
            _ => None,
        }
    }
}
