//! Function kinds and the signature prefix that selects them.

use strum::{Display, EnumString, IntoStaticStr};

/// The six kinds of function a snippet may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum FunctionKind {
    /// Emits key/value rows for a document.
    Map,
    /// Folds emitted values, or previously reduced values, into one value.
    Reduce,
    /// Produces a new document revision and a response for an update request.
    Update,
    /// Decides whether a document passes a change-feed or replication filter.
    Filter,
    /// Accepts or rejects a document write.
    Validate,
    /// Rewrites an incoming request to a different path.
    Rewrite,
}

impl FunctionKind {
    /// Every kind, in the order the signature prefixes are tried.
    pub const ALL: [Self; 6] = [
        Self::Map,
        Self::Reduce,
        Self::Update,
        Self::Filter,
        Self::Validate,
        Self::Rewrite,
    ];

    /// Name of the entry-point function that the source must declare first.
    #[must_use]
    pub fn entry_name(self) -> &'static str {
        self.into()
    }

    /// Positional arguments supplied to the entry point, by conventional name.
    #[must_use]
    pub const fn parameters(self) -> &'static [&'static str] {
        match self {
            Self::Map => &["doc"],
            Self::Reduce => &["keys", "values", "rereduce"],
            Self::Update | Self::Filter => &["doc", "req"],
            Self::Validate => &["newDoc", "oldDoc", "userCtx", "secObj"],
            Self::Rewrite => &["req"],
        }
    }

    /// Detects the kind from the required `func <Kind>` signature prefix.
    ///
    /// Leading whitespace is ignored and the kind name must end at a word
    /// boundary, so `func Mapper` is not a map function.
    ///
    /// ```
    /// use couchview_sandbox::FunctionKind;
    ///
    /// assert_eq!(
    ///     FunctionKind::detect("  func Reduce(keys, values, rereduce) {}"),
    ///     Some(FunctionKind::Reduce)
    /// );
    /// assert_eq!(FunctionKind::detect("function(doc) {}"), None);
    /// ```
    #[must_use]
    pub fn detect(source: &str) -> Option<Self> {
        let after_keyword = source.trim_start().strip_prefix("func")?;
        if !after_keyword.starts_with(char::is_whitespace) {
            return None;
        }
        let name = after_keyword.trim_start();
        Self::ALL.into_iter().find(|kind| {
            name.strip_prefix(kind.entry_name())
                .is_some_and(|after| !after.starts_with(|ch: char| ch.is_alphanumeric() || ch == '_'))
        })
    }
}
