//! Pratt parser producing [`Program`] values from snippet source.

use std::mem;

use crate::error::Diagnostic;

use super::ast::{
    AssignOp, Block, Expr, ExprKind, FunctionDecl, Param, PathSegment, Place, Program, Stmt,
    TypeAnnotation, UnaryOp,
};
use super::lexer::Lexer;
use super::precedence::{InfixOperator, Precedence, infix_operator};
use super::token::{Position, Token, TokenKind};

/// Deepest nesting of expressions, blocks and `else if` chains a snippet may use.
///
/// Chained infix and postfix operators count one level each because they
/// deepen the tree just as parentheses do.
pub(crate) const MAX_NESTING_DEPTH: usize = 128;

/// Recursive-descent parser with Pratt-style expression handling.
///
/// `current` is always the next unconsumed token and `peek` the one after it.
/// Parsing stops at the first error.
pub(crate) struct Parser {
    lexer: Lexer,
    current: Token,
    peek: Token,
    depth: usize,
}

impl Parser {
    pub(crate) fn new(source: &str) -> Result<Self, Diagnostic> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        let peek = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            peek,
            depth: 0,
        })
    }

    /// Parses the whole source as a sequence of `func` declarations.
    pub(crate) fn parse_program(mut self) -> Result<Program, Diagnostic> {
        let mut functions = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Eof => break,
                TokenKind::Semicolon => {
                    self.bump()?;
                }
                TokenKind::Func => functions.push(self.parse_function()?),
                _ => return Err(self.unexpected("a `func` declaration")),
            }
        }
        Ok(Program { functions })
    }

    fn bump(&mut self) -> Result<Token, Diagnostic> {
        let next = self.lexer.next_token()?;
        let upcoming = mem::replace(&mut self.peek, next);
        Ok(mem::replace(&mut self.current, upcoming))
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.current.kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool, Diagnostic> {
        if self.at(kind) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, Diagnostic> {
        if self.at(kind) {
            self.bump()
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Position), Diagnostic> {
        if matches!(self.current.kind, TokenKind::Ident(_)) {
            let token = self.bump()?;
            if let TokenKind::Ident(name) = token.kind {
                return Ok((name, token.position));
            }
        }
        Err(self.unexpected(what))
    }

    fn descend(&mut self) -> Result<(), Diagnostic> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(Diagnostic::at(
                format!("nesting exceeds the limit of {MAX_NESTING_DEPTH} levels"),
                self.current.position,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        Diagnostic::at(
            format!(
                "expected {expected}, found {}",
                self.current.kind.describe()
            ),
            self.current.position,
        )
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, Diagnostic> {
        let func = self.expect(&TokenKind::Func)?;
        let (name, _) = self.expect_ident("a function name")?;
        self.expect(&TokenKind::LParen)?;

        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let (param, position) = self.expect_ident("a parameter name")?;
            let annotation = if self.eat(&TokenKind::Colon)? {
                let (type_name, type_position) = self.expect_ident("a type name")?;
                Some(TypeAnnotation {
                    name: type_name,
                    position: type_position,
                })
            } else {
                None
            };
            params.push(Param {
                name: param,
                annotation,
                position,
            });
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let body = self.parse_block()?;
        Ok(FunctionDecl {
            name,
            params,
            body,
            position: func.position,
        })
    }

    fn parse_block(&mut self) -> Result<Block, Diagnostic> {
        let entry = self.depth;
        self.descend()?;
        self.expect(&TokenKind::LBrace)?;
        let mut statements = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(self.unexpected("`}`")),
                TokenKind::Semicolon => {
                    self.bump()?;
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
        self.bump()?;
        self.depth = entry;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        match self.current.kind {
            TokenKind::Let => {
                self.bump()?;
                let (name, position) = self.expect_ident("a variable name")?;
                self.expect(&TokenKind::Assign)?;
                let value = self.parse_expression(Precedence::Lowest)?;
                Ok(Stmt::Let {
                    name,
                    value,
                    position,
                })
            }
            TokenKind::Ident(_) if self.peek.kind == TokenKind::Declare => {
                let (name, position) = self.expect_ident("a variable name")?;
                self.bump()?;
                let value = self.parse_expression(Precedence::Lowest)?;
                Ok(Stmt::Let {
                    name,
                    value,
                    position,
                })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.bump()?;
                let ends_statement = matches!(
                    self.current.kind,
                    TokenKind::RBrace | TokenKind::Semicolon | TokenKind::Eof
                );
                let value = if ends_statement {
                    None
                } else {
                    Some(self.parse_expression(Precedence::Lowest)?)
                };
                Ok(Stmt::Return { value })
            }
            TokenKind::Break => Ok(Stmt::Break(self.bump()?.position)),
            TokenKind::Continue => Ok(Stmt::Continue(self.bump()?.position)),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        let op = match self.current.kind {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Subtract,
            _ => return Ok(Stmt::Expr(expr)),
        };
        self.bump()?;
        let target = place_from(expr)?;
        let value = self.parse_expression(Precedence::Lowest)?;
        Ok(Stmt::Assign { target, op, value })
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let entry = self.depth;
        self.descend()?;
        self.expect(&TokenKind::If)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&TokenKind::Else)? {
            if self.at(&TokenKind::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        self.depth = entry;
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let keyword = self.expect(&TokenKind::For)?;
        let binds_names = matches!(self.current.kind, TokenKind::Ident(_))
            && matches!(self.peek.kind, TokenKind::In | TokenKind::Comma);
        if !binds_names {
            let condition = self.parse_expression(Precedence::Lowest)?;
            let body = self.parse_block()?;
            return Ok(Stmt::While { condition, body });
        }

        let (first, _) = self.expect_ident("a loop variable")?;
        let second = if self.eat(&TokenKind::Comma)? {
            Some(self.expect_ident("a loop variable")?.0)
        } else {
            None
        };
        self.expect(&TokenKind::In)?;
        let iterable = self.parse_expression(Precedence::Lowest)?;
        let body = self.parse_block()?;
        Ok(Stmt::ForIn {
            first,
            second,
            iterable,
            body,
            position: keyword.position,
        })
    }

    pub(crate) fn parse_expression(&mut self, precedence: Precedence) -> Result<Expr, Diagnostic> {
        let entry = self.depth;
        self.descend()?;
        let mut left = self.parse_prefix()?;
        while precedence < Precedence::of(&self.current.kind) {
            self.descend()?;
            left = self.parse_infix(left)?;
        }
        self.depth = entry;
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.bump()?;
        let position = token.position;
        let kind = match token.kind {
            TokenKind::Int(value) => ExprKind::Int(value),
            TokenKind::Float(value) => ExprKind::Float(value),
            TokenKind::Str(value) => ExprKind::Str(value),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen)? {
                    let arguments = self.parse_list(&TokenKind::RParen)?;
                    ExprKind::Call {
                        callee: name,
                        arguments,
                    }
                } else {
                    ExprKind::Variable(name)
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => ExprKind::Array(self.parse_list(&TokenKind::RBracket)?),
            TokenKind::LBrace => ExprKind::Object(self.parse_object()?),
            TokenKind::Bang => ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.parse_expression(Precedence::Prefix)?),
            },
            TokenKind::Minus => ExprKind::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(self.parse_expression(Precedence::Prefix)?),
            },
            other => {
                return Err(Diagnostic::at(
                    format!("expected an expression, found {}", other.describe()),
                    position,
                ));
            }
        };
        Ok(Expr::new(kind, position))
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, Diagnostic> {
        let token = self.bump()?;
        let position = token.position;
        let kind = match token.kind {
            TokenKind::Dot => match self.bump()? {
                Token {
                    kind: TokenKind::Ident(field),
                    ..
                } => ExprKind::Member {
                    object: Box::new(left),
                    field,
                },
                Token {
                    kind: TokenKind::Int(index),
                    position: index_position,
                } => ExprKind::Index {
                    object: Box::new(left),
                    index: Box::new(Expr::new(ExprKind::Int(index), index_position)),
                },
                other => {
                    return Err(Diagnostic::at(
                        format!("expected a field name, found {}", other.kind.describe()),
                        other.position,
                    ));
                }
            },
            TokenKind::LBracket => {
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(&TokenKind::RBracket)?;
                ExprKind::Index {
                    object: Box::new(left),
                    index: Box::new(index),
                }
            }
            TokenKind::LParen => {
                return Err(Diagnostic::at(
                    "only functions named directly can be called",
                    position,
                ));
            }
            other => {
                let precedence = Precedence::of(&other);
                let Some(operator) = infix_operator(&other) else {
                    return Err(Diagnostic::at(
                        format!("unexpected {}", other.describe()),
                        position,
                    ));
                };
                let right = Box::new(self.parse_expression(precedence)?);
                let boxed = Box::new(left);
                match operator {
                    InfixOperator::Binary(op) => ExprKind::Binary {
                        op,
                        left: boxed,
                        right,
                    },
                    InfixOperator::Logical(op) => ExprKind::Logical {
                        op,
                        left: boxed,
                        right,
                    },
                }
            }
        };
        Ok(Expr::new(kind, position))
    }

    fn parse_list(&mut self, close: &TokenKind) -> Result<Vec<Expr>, Diagnostic> {
        let mut items = Vec::new();
        while !self.at(close) {
            items.push(self.parse_expression(Precedence::Lowest)?);
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn parse_object(&mut self) -> Result<Vec<(String, Expr)>, Diagnostic> {
        let mut entries = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let key = match self.bump()? {
                Token {
                    kind: TokenKind::Ident(key) | TokenKind::Str(key),
                    ..
                } => key,
                other => {
                    return Err(Diagnostic::at(
                        format!("expected an object key, found {}", other.kind.describe()),
                        other.position,
                    ));
                }
            };
            self.expect(&TokenKind::Colon)?;
            entries.push((key, self.parse_expression(Precedence::Lowest)?));
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(entries)
    }
}

/// Reinterprets a parsed expression as the left-hand side of an assignment.
fn place_from(expr: Expr) -> Result<Place, Diagnostic> {
    let mut path = Vec::new();
    let mut current = expr;
    loop {
        match current.kind {
            ExprKind::Variable(root) => {
                path.reverse();
                return Ok(Place {
                    root,
                    path,
                    position: current.position,
                });
            }
            ExprKind::Member { object, field } => {
                path.push(PathSegment::Field(field));
                current = *object;
            }
            ExprKind::Index { object, index } => {
                path.push(PathSegment::Index(*index));
                current = *object;
            }
            _ => return Err(Diagnostic::at("invalid assignment target", current.position)),
        }
    }
}
