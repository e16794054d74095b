//! Tokens produced by the snippet lexer.

use std::fmt;

/// Location of a token in the snippet source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Character offset from the start of the source.
    pub offset: usize,
    /// One-based line number.
    pub line: usize,
    /// One-based column number, counted in characters.
    pub column: usize,
}

impl Position {
    /// Creates a position from its components.
    #[must_use]
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    Func,
    Let,
    If,
    Else,
    For,
    In,
    Return,
    Break,
    Continue,
    True,
    False,
    Null,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,

    Assign,
    Declare,
    PlusAssign,
    MinusAssign,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,

    Eof,
}

impl TokenKind {
    pub(crate) fn keyword(ident: &str) -> Option<Self> {
        let keyword = match ident {
            "func" => Self::Func,
            "let" => Self::Let,
            "if" => Self::If,
            "else" => Self::Else,
            "for" => Self::For,
            "in" => Self::In,
            "return" => Self::Return,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "true" => Self::True,
            "false" => Self::False,
            "null" | "nil" => Self::Null,
            _ => return None,
        };
        Some(keyword)
    }

    /// Human-readable rendering used in diagnostics.
    pub(crate) fn describe(&self) -> String {
        let text = match self {
            Self::Ident(name) => return format!("identifier `{name}`"),
            Self::Int(value) => return format!("number `{value}`"),
            Self::Float(value) => return format!("number `{value}`"),
            Self::Str(_) => "string literal",
            Self::Func => "`func`",
            Self::Let => "`let`",
            Self::If => "`if`",
            Self::Else => "`else`",
            Self::For => "`for`",
            Self::In => "`in`",
            Self::Return => "`return`",
            Self::Break => "`break`",
            Self::Continue => "`continue`",
            Self::True => "`true`",
            Self::False => "`false`",
            Self::Null => "`null`",
            Self::LParen => "`(`",
            Self::RParen => "`)`",
            Self::LBrace => "`{`",
            Self::RBrace => "`}`",
            Self::LBracket => "`[`",
            Self::RBracket => "`]`",
            Self::Comma => "`,`",
            Self::Colon => "`:`",
            Self::Semicolon => "`;`",
            Self::Dot => "`.`",
            Self::Assign => "`=`",
            Self::Declare => "`:=`",
            Self::PlusAssign => "`+=`",
            Self::MinusAssign => "`-=`",
            Self::Plus => "`+`",
            Self::Minus => "`-`",
            Self::Star => "`*`",
            Self::Slash => "`/`",
            Self::Percent => "`%`",
            Self::Bang => "`!`",
            Self::Eq => "`==`",
            Self::NotEq => "`!=`",
            Self::Lt => "`<`",
            Self::LtEq => "`<=`",
            Self::Gt => "`>`",
            Self::GtEq => "`>=`",
            Self::AndAnd => "`&&`",
            Self::OrOr => "`||`",
            Self::Eof => "end of input",
        };
        text.to_owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) position: Position,
}

impl Token {
    pub(crate) const fn new(kind: TokenKind, position: Position) -> Self {
        Self { kind, position }
    }
}
