//! Static symbol resolution against the host whitelist.
//!
//! Every name a snippet mentions must resolve before the snippet is accepted:
//! variables to an enclosing declaration, calls to a function declared in the
//! same snippet, a language intrinsic, or a host function the kind's
//! [`HostProfile`] allows. Anything else is a compilation error, which keeps
//! the runtime free of "unknown symbol" surprises.

use std::collections::{HashMap, HashSet};

use crate::builtins::Builtin;
use crate::error::Diagnostic;
use crate::kind::FunctionKind;
use crate::profile::{HostFunction, HostProfile, HostType};
use crate::syntax::ast::{Block, Expr, ExprKind, FunctionDecl, PathSegment, Program, Stmt};
use crate::value::Value;

/// Parameter annotation resolved to a checkable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Annotation {
    Host(HostType),
    Any,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl Annotation {
    pub(crate) fn parse(name: &str) -> Option<Self> {
        let primitive = match name {
            "any" => Self::Any,
            "bool" => Self::Bool,
            "number" => Self::Number,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            other => return HostType::from_name(other).map(Self::Host),
        };
        Some(primitive)
    }

    /// Host records may be absent, so they also accept `null`.
    pub(crate) const fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Host(_) => matches!(value, Value::Object(_) | Value::Null),
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            Self::String => matches!(value, Value::String(_)),
            Self::Array => matches!(value, Value::Array(_)),
            Self::Object => matches!(value, Value::Object(_)),
        }
    }
}

/// A resolved snippet ready for invocation.
#[derive(Debug, Clone)]
pub(crate) struct Module {
    kind: FunctionKind,
    functions: HashMap<String, FunctionDecl>,
}

impl Module {
    pub(crate) const fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub(crate) fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }

    pub(crate) fn entry(&self) -> Option<&FunctionDecl> {
        self.function(self.kind.entry_name())
    }
}

/// Resolves every symbol in `program` for a function of `kind`.
pub(crate) fn resolve(
    program: Program,
    kind: FunctionKind,
    profile: &HostProfile,
) -> Result<Module, Diagnostic> {
    let entry_name = kind.entry_name();
    let Some(entry) = program.functions.first() else {
        return Err(Diagnostic::new(format!(
            "missing `func {entry_name}` declaration"
        )));
    };
    if entry.name != entry_name {
        return Err(Diagnostic::at(
            format!("the first declaration must be `func {entry_name}`"),
            entry.position,
        ));
    }
    let supplied = kind.parameters();
    if entry.params.len() > supplied.len() {
        return Err(Diagnostic::at(
            format!(
                "a {kind} function takes at most {} parameter(s): {}",
                supplied.len(),
                supplied.join(", ")
            ),
            entry.position,
        ));
    }

    let mut arities = HashMap::new();
    for decl in &program.functions {
        if Builtin::lookup(&decl.name).is_some() {
            return Err(Diagnostic::at(
                format!("`{}` is a reserved name", decl.name),
                decl.position,
            ));
        }
        if arities
            .insert(decl.name.clone(), decl.params.len())
            .is_some()
        {
            return Err(Diagnostic::at(
                format!("function `{}` is declared more than once", decl.name),
                decl.position,
            ));
        }
    }

    let mut resolver = Resolver {
        kind,
        profile,
        arities: &arities,
        scopes: Vec::new(),
        loop_depth: 0,
    };
    for decl in &program.functions {
        resolver.check_function(decl)?;
    }

    Ok(Module {
        kind,
        functions: program
            .functions
            .into_iter()
            .map(|decl| (decl.name.clone(), decl))
            .collect(),
    })
}

struct Resolver<'a> {
    kind: FunctionKind,
    profile: &'a HostProfile,
    arities: &'a HashMap<String, usize>,
    scopes: Vec<HashSet<String>>,
    loop_depth: usize,
}

impl Resolver<'_> {
    fn check_function(&mut self, decl: &FunctionDecl) -> Result<(), Diagnostic> {
        self.scopes = vec![HashSet::new()];
        self.loop_depth = 0;
        for param in &decl.params {
            if let Some(annotation) = &param.annotation {
                match Annotation::parse(&annotation.name) {
                    None => {
                        return Err(Diagnostic::at(
                            format!("unknown type `{}`", annotation.name),
                            annotation.position,
                        ));
                    }
                    Some(Annotation::Host(host_type)) if !self.profile.allows_type(host_type) => {
                        return Err(Diagnostic::at(
                            format!(
                                "type `{}` is not available to {} functions",
                                annotation.name, self.kind
                            ),
                            annotation.position,
                        ));
                    }
                    Some(_) => {}
                }
            }
            if !self.declare(&param.name) {
                return Err(Diagnostic::at(
                    format!("parameter `{}` is declared more than once", param.name),
                    param.position,
                ));
            }
        }
        self.check_block(&decl.body)
    }

    /// Declares `name` in the innermost scope, reporting whether it was new.
    fn declare(&mut self, name: &str) -> bool {
        self.scopes
            .last_mut()
            .is_some_and(|scope| scope.insert(name.to_owned()))
    }

    fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn check_block(&mut self, block: &Block) -> Result<(), Diagnostic> {
        self.scopes.push(HashSet::new());
        let result = block.iter().try_for_each(|stmt| self.check_stmt(stmt));
        self.scopes.pop();
        result
    }

    fn check_loop_body(&mut self, body: &Block) -> Result<(), Diagnostic> {
        self.loop_depth += 1;
        let result = self.check_block(body);
        self.loop_depth -= 1;
        result
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), Diagnostic> {
        match stmt {
            Stmt::Let { name, value, .. } => {
                self.check_expr(value)?;
                self.declare(name);
                Ok(())
            }
            Stmt::Assign { target, value, .. } => {
                if !self.is_declared(&target.root) {
                    return Err(Diagnostic::at(
                        format!("assignment to undeclared variable `{}`", target.root),
                        target.position,
                    ));
                }
                for segment in &target.path {
                    if let PathSegment::Index(index) = segment {
                        self.check_expr(index)?;
                    }
                }
                self.check_expr(value)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_expr(condition)?;
                self.check_block(then_branch)?;
                else_branch
                    .as_ref()
                    .map_or(Ok(()), |branch| self.check_block(branch))
            }
            Stmt::ForIn {
                first,
                second,
                iterable,
                body,
                ..
            } => {
                self.check_expr(iterable)?;
                self.scopes.push(HashSet::new());
                self.declare(first);
                if let Some(name) = second {
                    self.declare(name);
                }
                let result = self.check_loop_body(body);
                self.scopes.pop();
                result
            }
            Stmt::While { condition, body } => {
                self.check_expr(condition)?;
                self.check_loop_body(body)
            }
            Stmt::Break(position) | Stmt::Continue(position) => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(stmt, Stmt::Break(_)) {
                        "break"
                    } else {
                        "continue"
                    };
                    return Err(Diagnostic::at(
                        format!("`{keyword}` outside of a loop"),
                        *position,
                    ));
                }
                Ok(())
            }
            Stmt::Return { value } => value.as_ref().map_or(Ok(()), |expr| self.check_expr(expr)),
            Stmt::Expr(expr) => self.check_expr(expr),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<(), Diagnostic> {
        match &expr.kind {
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_) => Ok(()),
            ExprKind::Array(items) => items.iter().try_for_each(|item| self.check_expr(item)),
            ExprKind::Object(entries) => entries
                .iter()
                .try_for_each(|(_, value)| self.check_expr(value)),
            ExprKind::Variable(name) => {
                if self.is_declared(name) {
                    Ok(())
                } else {
                    Err(Diagnostic::at(
                        format!("undefined variable `{name}`"),
                        expr.position,
                    ))
                }
            }
            ExprKind::Member { object, .. } => self.check_expr(object),
            ExprKind::Index { object, index } => {
                self.check_expr(object)?;
                self.check_expr(index)
            }
            ExprKind::Call { callee, arguments } => {
                self.check_call(callee, arguments.len(), expr)?;
                arguments
                    .iter()
                    .try_for_each(|argument| self.check_expr(argument))
            }
            ExprKind::Unary { operand, .. } => self.check_expr(operand),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
        }
    }

    fn check_call(&self, callee: &str, supplied: usize, expr: &Expr) -> Result<(), Diagnostic> {
        if let Some(expected) = self.arities.get(callee) {
            if *expected != supplied {
                return Err(Diagnostic::at(
                    format!(
                        "function `{callee}` takes {expected} argument(s) but {supplied} were supplied"
                    ),
                    expr.position,
                ));
            }
            return Ok(());
        }

        let Some(builtin) = Builtin::lookup(callee) else {
            return Err(Diagnostic::at(
                format!("undefined function `{callee}`"),
                expr.position,
            ));
        };
        if let Builtin::Host(function) = builtin {
            self.check_host_access(function, expr)?;
        }
        builtin
            .check_arity(supplied)
            .map_err(|message| Diagnostic::at(message, expr.position))
    }

    fn check_host_access(&self, function: HostFunction, expr: &Expr) -> Result<(), Diagnostic> {
        if self.profile.allows_function(function) {
            return Ok(());
        }
        Err(Diagnostic::at(
            format!(
                "`{}` is not available to {} functions",
                function.name(),
                self.kind
            ),
            expr.position,
        ))
    }
}
