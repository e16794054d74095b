//! Lexing and parsing for the snippet language.

pub(crate) mod ast;
mod lexer;
mod parser;
mod precedence;
mod token;

pub(crate) use parser::Parser;
pub use token::Position;
