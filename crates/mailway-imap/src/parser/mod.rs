//! Response tokeniser.
//!
//! A single pass over a reply line produces a tree of tokens: atoms,
//! numbers, quoted strings, `[...]` bracketed codes, `{n}` literal
//! markers and nested `(...)` lists. The raw bytes a literal marker
//! refers to live on the reply record, not in the token tree.

use crate::{Error, Result};

/// One parsed response token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An unsigned number.
    Number(u32),
    /// A bare atom, or any numeric run too large for [`Token::Number`].
    Text(String),
    /// A double-quoted string, unescaped.
    Quoted(String),
    /// The contents of a `[...]` run (no nesting inside brackets).
    Bracketed(String),
    /// A `{n}` literal marker carrying only the size.
    Literal(u32),
    /// A parenthesised list of nested tokens.
    List(Vec<Token>),
}

impl Token {
    /// Returns the numeric value for [`Token::Number`] and
    /// [`Token::Literal`] tokens.
    #[must_use]
    pub const fn number(&self) -> Option<u32> {
        match self {
            Self::Number(n) | Self::Literal(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the textual content of the token.
    ///
    /// Lists join their children's text with single spaces; this never
    /// fails, unlike [`Token::quoted_text`].
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Number(n) | Self::Literal(n) => n.to_string(),
            Self::Text(s) | Self::Quoted(s) | Self::Bracketed(s) => s.clone(),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(Token::text).collect();
                parts.join(" ")
            }
        }
    }

    /// Returns the inner string for quoted tokens only.
    ///
    /// This distinguishes the atom `NIL` from the quoted empty string.
    #[must_use]
    pub fn quoted_text(&self) -> Option<&str> {
        match self {
            Self::Quoted(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the child tokens for list tokens only.
    #[must_use]
    pub fn list(&self) -> Option<&[Token]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true if this token is the atom `NIL`.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Text(s) if s.eq_ignore_ascii_case("NIL"))
    }
}

impl std::fmt::Display for Token {
    /// Round-trips by re-adding braces, brackets and quotes.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Quoted(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")
            }
            Self::Bracketed(s) => write!(f, "[{s}]"),
            Self::Literal(n) => write!(f, "{{{n}}}"),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Tokenises a reply line into a flat sequence of top-level tokens.
///
/// # Errors
///
/// Returns [`Error::UnexpectedData`] on unterminated quotes, brackets
/// or lists.
pub fn parse(input: &str) -> Result<Vec<Token>> {
    let mut cursor = Cursor {
        bytes: input.as_bytes(),
        pos: 0,
    };
    cursor.tokens(None)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, message: &str) -> Error {
        Error::UnexpectedData(format!("{message} at position {}", self.pos))
    }

    /// Reads tokens until `closer` (or end of input for the top level).
    fn tokens(&mut self, closer: Option<u8>) -> Result<Vec<Token>> {
        let mut out = Vec::new();

        loop {
            while self.peek() == Some(b' ') {
                self.pos += 1;
            }
            match self.peek() {
                None => {
                    if closer.is_some() {
                        return Err(self.error("unterminated list"));
                    }
                    return Ok(out);
                }
                Some(b) if Some(b) == closer => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b')' | b']') => {
                    // Stray closer outside any construct; skip it.
                    self.pos += 1;
                }
                Some(b'(') => {
                    self.pos += 1;
                    out.push(Token::List(self.tokens(Some(b')'))?));
                }
                Some(b'[') => {
                    self.pos += 1;
                    out.push(self.bracketed()?);
                }
                Some(b'"') => {
                    self.pos += 1;
                    out.push(self.quoted()?);
                }
                Some(_) => out.push(self.atom()?),
            }
        }
    }

    /// Consumes everything up to `]` with no nesting.
    fn bracketed(&mut self) -> Result<Token> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b']' {
                let text = self.text_slice(start, self.pos)?;
                self.pos += 1;
                return Ok(Token::Bracketed(text));
            }
            self.pos += 1;
        }
        Err(self.error("unterminated bracket"))
    }

    /// Consumes a quoted string; backslash escapes the next character.
    fn quoted(&mut self) -> Result<Token> {
        let mut content = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    let text = String::from_utf8(content)
                        .map_err(|_| self.error("invalid UTF-8 in quoted string"))?;
                    return Ok(Token::Quoted(text));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    content.push(escaped);
                    self.pos += 1;
                }
                Some(b) => {
                    content.push(b);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted string")),
            }
        }
    }

    /// Consumes an atom, a number, or a `{n}` literal marker.
    ///
    /// Digit runs speculatively build a number and demote to text on
    /// the first non-digit or on u32 overflow.
    fn atom(&mut self) -> Result<Token> {
        let start = self.pos;

        // A literal marker is only a marker when it is `{digits}`.
        if self.peek() == Some(b'{')
            && let Some(size) = self.literal_marker()
        {
            return Ok(Token::Literal(size));
        }

        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b')' | b']' | b'(' | b'[' | b'"') {
                break;
            }
            self.pos += 1;
        }

        let text = self.text_slice(start, self.pos)?;
        if text.bytes().all(|b| b.is_ascii_digit())
            && let Ok(n) = text.parse::<u32>()
        {
            return Ok(Token::Number(n));
        }
        Ok(Token::Text(text))
    }

    /// Tries to consume `{digits}` at the cursor; restores on mismatch.
    fn literal_marker(&mut self) -> Option<u32> {
        let saved = self.pos;
        self.pos += 1;
        let digit_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'}') && self.pos > digit_start {
            let size = std::str::from_utf8(&self.bytes[digit_start..self.pos])
                .ok()
                .and_then(|s| s.parse().ok());
            if let Some(size) = size {
                self.pos += 1;
                return Some(size);
            }
        }
        self.pos = saved;
        None
    }

    fn text_slice(&self, start: usize, end: usize) -> Result<String> {
        std::str::from_utf8(&self.bytes[start..end])
            .map(ToOwned::to_owned)
            .map_err(|_| self.error("invalid UTF-8 in token"))
    }
}
