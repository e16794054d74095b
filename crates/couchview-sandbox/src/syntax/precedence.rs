//! Binding power of infix and postfix operators.

use super::ast::{BinaryOp, LogicalOp};
use super::token::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Precedence {
    Lowest,
    Or,
    And,
    Equality,
    Comparison,
    Sum,
    Product,
    Prefix,
    Postfix,
}

impl Precedence {
    /// Precedence of `kind` when it appears after an operand.
    pub(crate) fn of(kind: &TokenKind) -> Self {
        match kind {
            TokenKind::OrOr => Self::Or,
            TokenKind::AndAnd => Self::And,
            TokenKind::Eq | TokenKind::NotEq => Self::Equality,
            TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => Self::Comparison,
            TokenKind::Plus | TokenKind::Minus => Self::Sum,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Self::Product,
            TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen => Self::Postfix,
            _ => Self::Lowest,
        }
    }
}

pub(crate) enum InfixOperator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

pub(crate) fn infix_operator(kind: &TokenKind) -> Option<InfixOperator> {
    let op = match kind {
        TokenKind::OrOr => InfixOperator::Logical(LogicalOp::Or),
        TokenKind::AndAnd => InfixOperator::Logical(LogicalOp::And),
        TokenKind::Eq => InfixOperator::Binary(BinaryOp::Equal),
        TokenKind::NotEq => InfixOperator::Binary(BinaryOp::NotEqual),
        TokenKind::Lt => InfixOperator::Binary(BinaryOp::Less),
        TokenKind::LtEq => InfixOperator::Binary(BinaryOp::LessEqual),
        TokenKind::Gt => InfixOperator::Binary(BinaryOp::Greater),
        TokenKind::GtEq => InfixOperator::Binary(BinaryOp::GreaterEqual),
        TokenKind::Plus => InfixOperator::Binary(BinaryOp::Add),
        TokenKind::Minus => InfixOperator::Binary(BinaryOp::Subtract),
        TokenKind::Star => InfixOperator::Binary(BinaryOp::Multiply),
        TokenKind::Slash => InfixOperator::Binary(BinaryOp::Divide),
        TokenKind::Percent => InfixOperator::Binary(BinaryOp::Remainder),
        _ => return None,
    };
    Some(op)
}
