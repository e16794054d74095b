//! Host symbol whitelist applied to compiled snippets.

use std::collections::BTreeSet;

use crate::kind::FunctionKind;

/// Host functions a snippet may be allowed to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostFunction {
    /// `emit(key, value)`: appends a row to the current map invocation.
    Emit,
    /// `log(message)`: writes a diagnostic line to the database.
    Log,
    /// `Forbidden(message)`: builds a forbidden validation failure.
    Forbidden,
    /// `Unauthorized(message)`: builds an unauthorized validation failure.
    Unauthorized,
}

impl HostFunction {
    /// Every host function known to the sandbox.
    pub const ALL: [Self; 4] = [Self::Emit, Self::Log, Self::Forbidden, Self::Unauthorized];

    /// Name by which snippets call the function.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Emit => "emit",
            Self::Log => "log",
            Self::Forbidden => "Forbidden",
            Self::Unauthorized => "Unauthorized",
        }
    }

    /// Looks up a host function by the name snippets use.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|function| function.name() == name)
    }

    pub(crate) const fn arity(self) -> usize {
        match self {
            Self::Emit => 2,
            Self::Log | Self::Forbidden | Self::Unauthorized => 1,
        }
    }
}

/// Host record types that parameter annotations may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostType {
    /// A database document.
    Document,
    /// The HTTP-like request record.
    Request,
    /// The authenticated user's context.
    UserContext,
    /// The database security object.
    SecurityObject,
    /// Database information attached to a request.
    DatabaseInfo,
}

impl HostType {
    /// Every host type known to the sandbox.
    pub const ALL: [Self; 5] = [
        Self::Document,
        Self::Request,
        Self::UserContext,
        Self::SecurityObject,
        Self::DatabaseInfo,
    ];

    /// Name used in parameter annotations.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Request => "Request",
            Self::UserContext => "UserContext",
            Self::SecurityObject => "SecurityObject",
            Self::DatabaseInfo => "DatabaseInfo",
        }
    }

    /// Looks up a host type by its annotation name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|host_type| host_type.name() == name)
    }
}

/// Declarative description of the host symbols a snippet may reference.
///
/// A new profile denies everything. [`HostProfile::for_kind`] builds the
/// profile applied by the compiler: every kind may call `log`, map functions
/// may also `emit`, and validate functions may also build `Forbidden` and
/// `Unauthorized` failures. All host types are visible to every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostProfile {
    functions: BTreeSet<HostFunction>,
    types: BTreeSet<HostType>,
}

impl HostProfile {
    /// Creates a profile that exposes no host symbols.
    ///
    /// ```
    /// use couchview_sandbox::{HostFunction, HostProfile};
    ///
    /// let profile = HostProfile::new().allow_function(HostFunction::Log);
    /// assert!(profile.allows_function(HostFunction::Log));
    /// assert!(!profile.allows_function(HostFunction::Emit));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile the compiler applies to functions of `kind`.
    #[must_use]
    pub fn for_kind(kind: FunctionKind) -> Self {
        let profile = Self::new().allow_all_types().allow_function(HostFunction::Log);
        match kind {
            FunctionKind::Map => profile.allow_function(HostFunction::Emit),
            FunctionKind::Validate => profile
                .allow_function(HostFunction::Forbidden)
                .allow_function(HostFunction::Unauthorized),
            FunctionKind::Reduce
            | FunctionKind::Update
            | FunctionKind::Filter
            | FunctionKind::Rewrite => profile,
        }
    }

    /// Grants access to a host function.
    #[must_use]
    pub fn allow_function(mut self, function: HostFunction) -> Self {
        self.functions.insert(function);
        self
    }

    /// Grants access to a host type in parameter annotations.
    #[must_use]
    pub fn allow_type(mut self, host_type: HostType) -> Self {
        self.types.insert(host_type);
        self
    }

    /// Grants access to every host type.
    #[must_use]
    pub fn allow_all_types(mut self) -> Self {
        self.types.extend(HostType::ALL);
        self
    }

    /// Reports whether `function` may be called.
    #[must_use]
    pub fn allows_function(&self, function: HostFunction) -> bool {
        self.functions.contains(&function)
    }

    /// Reports whether `host_type` may appear in annotations.
    #[must_use]
    pub fn allows_type(&self, host_type: HostType) -> bool {
        self.types.contains(&host_type)
    }

    /// Host functions exposed by this profile, in a stable order.
    pub fn functions(&self) -> impl Iterator<Item = HostFunction> + '_ {
        self.functions.iter().copied()
    }
}
