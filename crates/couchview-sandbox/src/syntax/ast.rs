//! Syntax tree for snippet programs.

use super::token::Position;

/// A parsed snippet: one or more `func` declarations.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Program {
    pub(crate) functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FunctionDecl {
    pub(crate) name: String,
    pub(crate) params: Vec<Param>,
    pub(crate) body: Block,
    pub(crate) position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Param {
    pub(crate) name: String,
    pub(crate) annotation: Option<TypeAnnotation>,
    pub(crate) position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TypeAnnotation {
    pub(crate) name: String,
    pub(crate) position: Position,
}

pub(crate) type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Let {
        name: String,
        value: Expr,
        position: Position,
    },
    Assign {
        target: Place,
        op: AssignOp,
        value: Expr,
    },
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    ForIn {
        first: String,
        second: Option<String>,
        iterable: Expr,
        body: Block,
        position: Position,
    },
    While {
        condition: Expr,
        body: Block,
    },
    Break(Position),
    Continue(Position),
    Return {
        value: Option<Expr>,
    },
    Expr(Expr),
}

/// Assignable location: a variable followed by member and index steps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Place {
    pub(crate) root: String,
    pub(crate) path: Vec<PathSegment>,
    pub(crate) position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathSegment {
    Field(String),
    Index(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Subtract,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expr {
    pub(crate) kind: ExprKind,
    pub(crate) position: Position,
}

impl Expr {
    pub(crate) const fn new(kind: ExprKind, position: Position) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Variable(String),
    Member {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: String,
        arguments: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}
