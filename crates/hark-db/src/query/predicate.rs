//! Predicate templates.
//!
//! A template is a conjunction of comparisons:
//!
//! ```text
//! username == $0 AND age >= 21 && name BEGINSWITH 'A'
//! ```
//!
//! The left side is always a property name. The right side is a positional
//! placeholder (`$0`, `$1`, ...) bound from the argument slice, or a literal:
//! a number, a single- or double-quoted string, `true`, `false` or `null`.
//! Keywords are case-insensitive. `OR` and `NOT` are not supported.

use serde_json::Value;

use crate::error::QueryError;

use super::types::{CompareOp, Comparison};

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Op(CompareOp),
    Placeholder(usize),
    Literal(Value),
    And,
}

struct Lexer<'t> {
    template: &'t str,
    chars: std::iter::Peekable<std::str::CharIndices<'t>>,
}

impl<'t> Lexer<'t> {
    fn new(template: &'t str) -> Self {
        Self {
            template,
            chars: template.char_indices().peekable(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> QueryError {
        QueryError::InvalidPredicate {
            predicate: self.template.to_string(),
            reason: reason.into(),
        }
    }

    /// Consume characters matching `pred` and return `template[start..]` up to
    /// the last one. `end` is where the already-consumed prefix stops.
    fn take_while(&mut self, start: usize, mut end: usize, pred: impl Fn(char) -> bool) -> &'t str {
        while let Some(&(i, c)) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        &self.template[start..end]
    }

    fn next_is(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn string_literal(&mut self, quote: char) -> Result<Token, QueryError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.invalid("unterminated string literal")),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) => out.push(c),
                    None => return Err(self.invalid("unterminated string literal")),
                },
                Some((_, c)) if c == quote => return Ok(Token::Literal(Value::String(out))),
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn number_literal(&mut self, start: usize) -> Result<Token, QueryError> {
        let text = self.take_while(start, start + 1, |c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'));
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Token::Literal(Value::from(i)));
        }
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| Token::Literal(Value::Number(n)))
            .ok_or_else(|| self.invalid(format!("invalid number literal {text:?}")))
    }

    fn word(&mut self, start: usize) -> Result<Token, QueryError> {
        let word = self.take_while(start, start + 1, |c| c.is_ascii_alphanumeric() || c == '_');
        let token = match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "BEGINSWITH" => Token::Op(CompareOp::BeginsWith),
            "ENDSWITH" => Token::Op(CompareOp::EndsWith),
            "CONTAINS" => Token::Op(CompareOp::Contains),
            "TRUE" => Token::Literal(Value::Bool(true)),
            "FALSE" => Token::Literal(Value::Bool(false)),
            "NULL" | "NIL" => Token::Literal(Value::Null),
            "OR" | "NOT" => {
                return Err(self.invalid(format!("{word} is not supported; only AND conjunctions are")))
            }
            _ => Token::Ident(word.to_string()),
        };
        Ok(token)
    }

    fn tokens(mut self) -> Result<Vec<Token>, QueryError> {
        let mut tokens = Vec::new();
        while let Some((i, c)) = self.chars.next() {
            let token = match c {
                c if c.is_whitespace() => continue,
                '$' => {
                    let digits = match self.chars.peek() {
                        Some(&(j, d)) if d.is_ascii_digit() => self.take_while(j, j, |c| c.is_ascii_digit()),
                        _ => return Err(self.invalid("expected a digit after '$'")),
                    };
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| self.invalid(format!("placeholder ${digits} is out of range")))?;
                    Token::Placeholder(index)
                }
                '\'' | '"' => self.string_literal(c)?,
                '=' => {
                    self.next_is('=');
                    Token::Op(CompareOp::Eq)
                }
                '!' if self.next_is('=') => Token::Op(CompareOp::Ne),
                '<' if self.next_is('=') => Token::Op(CompareOp::Le),
                '<' if self.next_is('>') => Token::Op(CompareOp::Ne),
                '<' => Token::Op(CompareOp::Lt),
                '>' if self.next_is('=') => Token::Op(CompareOp::Ge),
                '>' => Token::Op(CompareOp::Gt),
                '&' if self.next_is('&') => Token::And,
                c if c.is_ascii_digit() || c == '-' => self.number_literal(i)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.word(i)?,
                other => return Err(self.invalid(format!("unexpected character {other:?}"))),
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parse `template`, binding `$N` placeholders from `args`.
///
/// Returns the conjunction of comparisons in template order. Property names
/// are not checked here; `Results::filtered` checks them against the schema.
pub fn parse_predicate(template: &str, args: &[Value]) -> Result<Vec<Comparison>, QueryError> {
    let invalid = |reason: String| QueryError::InvalidPredicate {
        predicate: template.to_string(),
        reason,
    };

    let tokens = Lexer::new(template).tokens()?;
    if tokens.is_empty() {
        return Err(invalid("predicate is empty".to_string()));
    }

    let mut comparisons = Vec::new();
    let mut iter = tokens.into_iter();
    loop {
        let field = match iter.next() {
            Some(Token::Ident(name)) => name,
            Some(other) => return Err(invalid(format!("expected a property name, found {other:?}"))),
            None => return Err(invalid("expected a comparison after AND".to_string())),
        };
        let op = match iter.next() {
            Some(Token::Op(op)) => op,
            Some(other) => {
                return Err(invalid(format!("expected an operator after \"{field}\", found {other:?}")))
            }
            None => return Err(invalid(format!("expected an operator after \"{field}\""))),
        };
        let value = match iter.next() {
            Some(Token::Placeholder(index)) => {
                args.get(index)
                    .cloned()
                    .ok_or_else(|| QueryError::MissingArgument {
                        predicate: template.to_string(),
                        index,
                        provided: args.len(),
                    })?
            }
            Some(Token::Literal(v)) => v,
            Some(other) => return Err(invalid(format!("expected a value, found {other:?}"))),
            None => return Err(invalid(format!("expected a value after \"{field} {}\"", op.symbol()))),
        };

        if op.is_string_op() && !value.is_string() {
            return Err(invalid(format!("{} requires a string operand", op.symbol())));
        }
        if value.is_null() && !matches!(op, CompareOp::Eq | CompareOp::Ne) {
            return Err(invalid(format!("null can only be compared with == or !=, not {}", op.symbol())));
        }
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(invalid(format!("\"{field}\" cannot be compared with an array or object")));
        }

        comparisons.push(Comparison { field, op, value });

        match iter.next() {
            None => break,
            Some(Token::And) => continue,
            Some(other) => return Err(invalid(format!("expected AND, found {other:?}"))),
        }
    }
    Ok(comparisons)
}
