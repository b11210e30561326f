//! Generic parenthesized values.
//!
//! ENVELOPE and BODYSTRUCTURE are both nested lists of strings, numbers and
//! NIL. They are read into a [`Value`] tree first and interpreted afterwards,
//! so a field we do not understand never derails the rest of the response.

use std::borrow::Cow;

use super::lexer::{Lexer, Token};
use crate::Result;

/// Maximum list nesting accepted from the server.
const MAX_DEPTH: usize = 64;

/// A parsed IMAP data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `NIL`.
    Nil,
    /// A number.
    Number(u32),
    /// A bare atom.
    Atom(String),
    /// A quoted string or literal.
    Bytes(Vec<u8>),
    /// A parenthesized list.
    List(Vec<Value>),
}

impl Value {
    /// Returns string content for atoms, strings and numbers.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Atom(s) => Some(Cow::Borrowed(s)),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b)),
            Self::Number(n) => Some(Cow::Owned(n.to_string())),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Returns the string content, or an empty string.
    #[must_use]
    pub fn text_or_empty(&self) -> String {
        self.as_text().map(Cow::into_owned).unwrap_or_default()
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the number, accepting numeric strings.
    #[must_use]
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Atom(s) => s.parse().ok(),
            Self::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            Self::Nil | Self::List(_) => None,
        }
    }

    /// Returns true for lists.
    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

/// Parses one value at the lexer's position, skipping leading spaces.
pub fn parse_value(lexer: &mut Lexer<'_>) -> Result<Value> {
    parse_nested(lexer, 0)
}

fn parse_nested(lexer: &mut Lexer<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(lexer.error("value nested too deeply"));
    }
    lexer.skip_spaces();

    match lexer.next_token()? {
        Token::Nil => Ok(Value::Nil),
        Token::Number(n) => Ok(Value::Number(n)),
        Token::Atom(s) => Ok(Value::Atom(s.to_string())),
        Token::QuotedString(s) => Ok(Value::Bytes(s.into_bytes())),
        Token::Literal(data) => Ok(Value::Bytes(data.to_vec())),
        Token::LParen => {
            let mut items = Vec::new();
            loop {
                lexer.skip_spaces();
                if lexer.peek() == Some(b')') {
                    lexer.advance();
                    return Ok(Value::List(items));
                }
                items.push(parse_nested(lexer, depth + 1)?);
            }
        }
        token => Err(lexer.error(&format!("Unexpected token in value: {token:?}"))),
    }
}
