//! Pure language intrinsics and the resolution table shared with host calls.

use crate::profile::HostFunction;
use crate::value::Value;

/// Side-effect free functions available to every snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intrinsic {
    Len,
    Append,
    Keys,
    Values,
    Has,
    String,
    TypeOf,
}

impl Intrinsic {
    const ALL: [Self; 7] = [
        Self::Len,
        Self::Append,
        Self::Keys,
        Self::Values,
        Self::Has,
        Self::String,
        Self::TypeOf,
    ];

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Append => "append",
            Self::Keys => "keys",
            Self::Values => "values",
            Self::Has => "has",
            Self::String => "string",
            Self::TypeOf => "type_of",
        }
    }

    /// Inclusive bounds on the argument count; `None` means unbounded.
    const fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Append => (1, None),
            Self::Has => (2, Some(2)),
            Self::Len | Self::Keys | Self::Values | Self::String | Self::TypeOf => (1, Some(1)),
        }
    }

    pub(crate) fn call(self, arguments: Vec<Value>) -> Result<Value, String> {
        let mut rest = arguments.into_iter();
        let first = rest.next().unwrap_or(Value::Null);
        match self {
            Self::Len => match &first {
                Value::String(text) => Ok(count(text.chars().count())),
                Value::Array(items) => Ok(count(items.len())),
                Value::Object(entries) => Ok(count(entries.len())),
                Value::Null => Ok(Value::Int(0)),
                other => Err(format!("len() does not accept a {}", other.type_name())),
            },
            Self::Append => match first {
                Value::Array(mut items) => {
                    items.extend(rest);
                    Ok(Value::Array(items))
                }
                Value::Null => Ok(Value::Array(rest.collect())),
                other => Err(format!(
                    "append() expects an array, got a {}",
                    other.type_name()
                )),
            },
            Self::Keys => match first {
                Value::Object(entries) => Ok(Value::Array(
                    entries.into_keys().map(Value::String).collect(),
                )),
                other => Err(format!("keys() expects an object, got a {}", other.type_name())),
            },
            Self::Values => match first {
                Value::Object(entries) => Ok(Value::Array(entries.into_values().collect())),
                other => Err(format!(
                    "values() expects an object, got a {}",
                    other.type_name()
                )),
            },
            Self::Has => {
                let needle = rest.next().unwrap_or(Value::Null);
                match (&first, &needle) {
                    (Value::Object(entries), Value::String(key)) => {
                        Ok(Value::Bool(entries.contains_key(key)))
                    }
                    (Value::Array(items), _) => Ok(Value::Bool(items.contains(&needle))),
                    (Value::String(text), Value::String(part)) => {
                        Ok(Value::Bool(text.contains(part.as_str())))
                    }
                    (Value::Null, _) => Ok(Value::Bool(false)),
                    (container, _) => Err(format!(
                        "has() cannot search a {} for a {}",
                        container.type_name(),
                        needle.type_name()
                    )),
                }
            }
            Self::String => Ok(Value::String(first.render())),
            Self::TypeOf => Ok(Value::String(first.type_name().to_owned())),
        }
    }
}

fn count(length: usize) -> Value {
    i64::try_from(length).map_or(Value::Null, Value::Int)
}

/// Anything a call expression may resolve to besides a snippet function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Intrinsic(Intrinsic),
    Host(HostFunction),
}

impl Builtin {
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        Intrinsic::ALL
            .into_iter()
            .find(|intrinsic| intrinsic.name() == name)
            .map(Self::Intrinsic)
            .or_else(|| HostFunction::from_name(name).map(Self::Host))
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Intrinsic(intrinsic) => intrinsic.name(),
            Self::Host(function) => function.name(),
        }
    }

    /// Checks an argument count, describing the expectation on mismatch.
    pub(crate) fn check_arity(self, supplied: usize) -> Result<(), String> {
        let (min, max) = match self {
            Self::Intrinsic(intrinsic) => intrinsic.arity(),
            Self::Host(function) => (function.arity(), Some(function.arity())),
        };
        let within = supplied >= min && max.is_none_or(|upper| supplied <= upper);
        if within {
            return Ok(());
        }
        let expected = match max {
            Some(upper) if upper == min => format!("{min}"),
            Some(upper) => format!("{min} to {upper}"),
            None => format!("at least {min}"),
        };
        Err(format!(
            "`{}` takes {expected} argument(s) but {supplied} were supplied",
            self.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::*;

    fn strings(items: &[&str]) -> Value {
        Value::Array(
            items
                .iter()
                .map(|item| Value::String((*item).to_owned()))
                .collect(),
        )
    }

    #[test]
    fn append_returns_extended_copy() {
        let result = Intrinsic::Append
            .call(vec![strings(&["a"]), Value::String("b".to_owned())])
            .expect("append succeeds");
        assert_eq!(result, strings(&["a", "b"]));
    }

    #[test]
    fn keys_are_sorted() {
        let mut entries = BTreeMap::new();
        entries.insert("b".to_owned(), Value::Int(1));
        entries.insert("a".to_owned(), Value::Int(2));
        let result = Intrinsic::Keys
            .call(vec![Value::Object(entries)])
            .expect("keys succeeds");
        assert_eq!(result, strings(&["a", "b"]));
    }

    #[rstest]
    #[case(Value::String("héllo".to_owned()), 5)]
    #[case(Value::Array(vec![Value::Null, Value::Null]), 2)]
    #[case(Value::Null, 0)]
    fn len_counts_elements(#[case] input: Value, #[case] expected: i64) {
        assert_eq!(Intrinsic::Len.call(vec![input]), Ok(Value::Int(expected)));
    }

    #[test]
    fn has_checks_membership() {
        let tags = strings(&["a", "b"]);
        assert_eq!(
            Intrinsic::Has.call(vec![tags, Value::String("b".to_owned())]),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn len_rejects_numbers() {
        let error = Intrinsic::Len
            .call(vec![Value::Int(3)])
            .expect_err("numbers have no length");
        assert!(error.contains("len()"));
    }

    #[test]
    fn lookup_covers_host_functions() {
        assert_eq!(
            Builtin::lookup("emit"),
            Some(Builtin::Host(HostFunction::Emit))
        );
        assert_eq!(Builtin::lookup("open"), None);
    }

    #[rstest]
    #[case("emit", 1, false)]
    #[case("emit", 2, true)]
    #[case("append", 5, true)]
    #[case("append", 0, false)]
    #[case("has", 3, false)]
    fn arity_is_enforced(#[case] name: &str, #[case] supplied: usize, #[case] ok: bool) {
        let builtin = Builtin::lookup(name).expect("builtin exists");
        assert_eq!(builtin.check_arity(supplied).is_ok(), ok);
    }
}
