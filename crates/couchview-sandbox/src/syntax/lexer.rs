//! Lexer for snippet source text.

use crate::error::Diagnostic;

use super::token::{Position, Token, TokenKind};

/// Converts snippet source into a stream of tokens on demand.
pub(crate) struct Lexer {
    input: Vec<char>,
    index: usize,
    pos: Position,
}

impl Lexer {
    pub(crate) fn new(source: &str) -> Self {
        Self {
            input: source.chars().collect(),
            index: 0,
            pos: Position::new(0, 1, 1),
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.index).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.index + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.index += 1;
        self.pos.offset = self.index;
        if ch == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        loop {
            match (self.current(), self.peek()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.advance();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.advance() {
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), Diagnostic> {
        let start = self.pos;
        self.advance();
        self.advance();
        loop {
            match (self.current(), self.peek()) {
                (Some('*'), Some('/')) => {
                    self.advance();
                    self.advance();
                    return Ok(());
                }
                (Some(_), _) => {
                    self.advance();
                }
                (None, _) => return Err(Diagnostic::at("unterminated block comment", start)),
            }
        }
    }

    /// Produces the next token, or [`TokenKind::Eof`] once input is exhausted.
    pub(crate) fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(ch) = self.current() else {
            return Ok(Token::new(TokenKind::Eof, start));
        };

        let kind = match ch {
            '"' => TokenKind::Str(self.read_string(start)?),
            '`' => TokenKind::Str(self.read_raw_string(start)?),
            c if c.is_ascii_digit() => self.read_number(start)?,
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                TokenKind::keyword(&ident).unwrap_or(TokenKind::Ident(ident))
            }
            _ => self.read_operator(start)?,
        };
        Ok(Token::new(kind, start))
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self, start: Position) -> Result<TokenKind, Diagnostic> {
        let mut text = String::new();
        let mut is_float = false;
        self.read_digits(&mut text);

        if self.current() == Some('.') && self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }

        if matches!(self.current(), Some('e' | 'E')) {
            let signed = matches!(self.peek(), Some('+' | '-'));
            let digit_follows = if signed {
                self.input
                    .get(self.index + 2)
                    .is_some_and(char::is_ascii_digit)
            } else {
                self.peek().is_some_and(|ch| ch.is_ascii_digit())
            };
            if digit_follows {
                is_float = true;
                text.push('e');
                self.advance();
                if signed {
                    if let Some(sign) = self.advance() {
                        text.push(sign);
                    }
                }
                self.read_digits(&mut text);
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| Diagnostic::at(format!("invalid number literal `{text}`"), start))
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| {
                Diagnostic::at(format!("integer literal `{text}` is out of range"), start)
            })
        }
    }

    fn read_string(&mut self, start: Position) -> Result<String, Diagnostic> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(text),
                Some('\\') => text.push(self.read_escape(start)?),
                Some('\n') | None => {
                    return Err(Diagnostic::at("unterminated string literal", start));
                }
                Some(ch) => text.push(ch),
            }
        }
    }

    fn read_escape(&mut self, start: Position) -> Result<char, Diagnostic> {
        let escaped = match self.advance() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('"') => '"',
            Some('\\') => '\\',
            Some('/') => '/',
            Some('u') => return self.read_unicode_escape(start),
            Some(other) => {
                return Err(Diagnostic::at(
                    format!("unknown escape sequence `\\{other}`"),
                    self.pos,
                ));
            }
            None => return Err(Diagnostic::at("unterminated string literal", start)),
        };
        Ok(escaped)
    }

    fn read_unicode_escape(&mut self, start: Position) -> Result<char, Diagnostic> {
        let escape_at = self.pos;
        let mut digits = String::with_capacity(4);
        for _ in 0..4 {
            match self.advance() {
                Some(ch) if ch.is_ascii_hexdigit() => digits.push(ch),
                Some(_) => {
                    return Err(Diagnostic::at(
                        "`\\u` escapes need four hexadecimal digits",
                        escape_at,
                    ));
                }
                None => return Err(Diagnostic::at("unterminated string literal", start)),
            }
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| {
                Diagnostic::at(format!("`\\u{digits}` is not a valid character"), escape_at)
            })
    }

    fn read_raw_string(&mut self, start: Position) -> Result<String, Diagnostic> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('`') => return Ok(text),
                Some(ch) => text.push(ch),
                None => return Err(Diagnostic::at("unterminated raw string literal", start)),
            }
        }
    }

    fn read_operator(&mut self, start: Position) -> Result<TokenKind, Diagnostic> {
        let Some(ch) = self.advance() else {
            return Ok(TokenKind::Eof);
        };
        let next = self.current();
        let (kind, doubled) = match (ch, next) {
            (':', Some('=')) => (TokenKind::Declare, true),
            ('+', Some('=')) => (TokenKind::PlusAssign, true),
            ('-', Some('=')) => (TokenKind::MinusAssign, true),
            ('=', Some('=')) => (TokenKind::Eq, true),
            ('!', Some('=')) => (TokenKind::NotEq, true),
            ('<', Some('=')) => (TokenKind::LtEq, true),
            ('>', Some('=')) => (TokenKind::GtEq, true),
            ('&', Some('&')) => (TokenKind::AndAnd, true),
            ('|', Some('|')) => (TokenKind::OrOr, true),
            ('(', _) => (TokenKind::LParen, false),
            (')', _) => (TokenKind::RParen, false),
            ('{', _) => (TokenKind::LBrace, false),
            ('}', _) => (TokenKind::RBrace, false),
            ('[', _) => (TokenKind::LBracket, false),
            (']', _) => (TokenKind::RBracket, false),
            (',', _) => (TokenKind::Comma, false),
            (':', _) => (TokenKind::Colon, false),
            (';', _) => (TokenKind::Semicolon, false),
            ('.', _) => (TokenKind::Dot, false),
            ('=', _) => (TokenKind::Assign, false),
            ('+', _) => (TokenKind::Plus, false),
            ('-', _) => (TokenKind::Minus, false),
            ('*', _) => (TokenKind::Star, false),
            ('/', _) => (TokenKind::Slash, false),
            ('%', _) => (TokenKind::Percent, false),
            ('!', _) => (TokenKind::Bang, false),
            ('<', _) => (TokenKind::Lt, false),
            ('>', _) => (TokenKind::Gt, false),
            (other, _) => {
                return Err(Diagnostic::at(
                    format!("unexpected character `{other}`"),
                    start,
                ));
            }
        };
        if doubled {
            self.advance();
        }
        Ok(kind)
    }
}
