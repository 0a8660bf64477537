//! Recursive-descent parser for rule expressions.
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := primary ( "&&" primary )*
//! primary := "(" expr ")" | operand ( "=" | "!=" ) operand
//! ```

use crate::collections::Collection;
use crate::error::ExprError;

use super::ast::{CompareOp, Expr, Operand, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Macro(String),
    Str(String),
    Number(f64),
    Eq,
    Ne,
    And,
    Or,
    LParen,
    RParen,
}

struct Lexer<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn err(&self, offset: usize, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            offset,
            message: message.into(),
        }
    }

    fn tokens(mut self) -> Result<Vec<(Token, usize)>, ExprError> {
        let mut out = Vec::new();
        while let Some(c) = self.peek_char() {
            let start = self.pos;
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            let token = match c {
                '(' => {
                    self.bump();
                    Token::LParen
                }
                ')' => {
                    self.bump();
                    Token::RParen
                }
                '=' => {
                    self.bump();
                    Token::Eq
                }
                '!' => {
                    self.bump();
                    if self.bump() != Some('=') {
                        return Err(self.err(start, "expected `!=`"));
                    }
                    Token::Ne
                }
                '&' | '|' => {
                    self.bump();
                    if self.bump() != Some(c) {
                        return Err(self.err(start, format!("expected `{c}{c}`")));
                    }
                    if c == '&' {
                        Token::And
                    } else {
                        Token::Or
                    }
                }
                '"' | '\'' => Token::Str(self.string(c)?),
                '@' => {
                    self.bump();
                    Token::Macro(self.word())
                }
                c if c.is_ascii_digit() || c == '-' => {
                    let word = self.number_text();
                    let n = word
                        .parse::<f64>()
                        .map_err(|_| self.err(start, format!("invalid number `{word}`")))?;
                    Token::Number(n)
                }
                c if c.is_ascii_alphabetic() || c == '_' => Token::Ident(self.word()),
                other => return Err(self.err(start, format!("unexpected character `{other}`"))),
            };
            out.push((token, start));
        }
        Ok(out)
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn number_text(&mut self) -> String {
        let start = self.pos;
        self.bump();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn string(&mut self, quote: char) -> Result<String, ExprError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err(start, "unterminated string literal")),
                Some('\\') => match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(self.err(start, "unterminated string literal")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    collection: Collection,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, o)| *o)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn syntax(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut items = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            items.push(self.and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut items = vec![self.primary()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            items.push(self.primary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.or()?;
            if self.next() != Some(Token::RParen) {
                return Err(self.syntax("expected `)`"));
            }
            return Ok(inner);
        }

        let left = self.operand()?;
        let op = match self.next() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            _ => return Err(self.syntax("expected `=` or `!=`")),
        };
        let right = self.operand()?;

        if let (Some(l), Some(r)) = (left.kind(), right.kind()) {
            if l != r {
                return Err(ExprError::TypeMismatch {
                    left: l.name(),
                    right: r.name(),
                });
            }
        }

        Ok(Expr::Compare { left, op, right })
    }

    fn operand(&mut self) -> Result<Operand, ExprError> {
        match self.next() {
            Some(Token::Macro(name)) => match name.as_str() {
                "request.auth.id" => Ok(Operand::AuthId),
                "request.auth.role" => Ok(Operand::AuthRole),
                _ => Err(ExprError::UnknownMacro(format!("@{name}"))),
            },
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::Text(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(Value::Number(n))),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Operand::Literal(Value::Bool(true))),
                "false" => Ok(Operand::Literal(Value::Bool(false))),
                "null" => Ok(Operand::Literal(Value::Null)),
                _ => {
                    let def = self
                        .collection
                        .field(&word)
                        .ok_or(ExprError::UnknownField(word.clone()))?;
                    Ok(Operand::Field {
                        name: def.name.to_string(),
                        kind: def.kind,
                    })
                }
            },
            Some(_) => {
                self.pos -= 1;
                Err(self.syntax("expected an operand"))
            }
            None => Err(self.syntax("unexpected end of expression")),
        }
    }
}

/// Parse a non-empty rule expression for `collection`.
pub fn parse(source: &str, collection: Collection) -> Result<Expr, ExprError> {
    let tokens = Lexer::new(source).tokens()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        collection,
    };
    let expr = parser.or()?;
    if parser.peek().is_some() {
        return Err(parser.syntax("unexpected trailing input"));
    }
    Ok(expr)
}
