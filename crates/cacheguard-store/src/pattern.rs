//! Store-style glob patterns for key namespaces
//!
//! Follows the matching rules of Redis `SCAN ... MATCH`:
//! `*` matches any run of bytes, `?` matches one byte,
//! `[abc]`, `[^abc]` and `[a-z]` match byte classes and `\` escapes
//! the next byte. Matching works on bytes, as the server does, so `?`
//! consumes one byte of a multi-byte UTF-8 character.

use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// A compiled key pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    source: String,
    tokens: Vec<Token>,
    /// Literal text before the first wildcard
    prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Exact byte
    Byte(u8),
    /// `?`
    AnyByte,
    /// `*`
    AnySequence,
    /// `[...]`
    Class {
        negated: bool,
        items: Vec<ClassItem>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Byte(u8),
    Range(u8, u8),
}

impl Token {
    fn matches(&self, b: u8) -> bool {
        match self {
            Token::Byte(c) => *c == b,
            Token::AnyByte => true,
            Token::AnySequence => false,
            Token::Class { negated, items } => {
                let hit = items.iter().any(|item| match item {
                    ClassItem::Byte(c) => *c == b,
                    ClassItem::Range(lo, hi) => *lo <= b && b <= *hi,
                });
                hit != *negated
            }
        }
    }
}

impl KeyPattern {
    /// Compile a glob pattern
    pub fn parse(pattern: &str) -> Result<Self, StoreError> {
        let bytes = pattern.as_bytes();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'*' => {
                    // Consecutive stars collapse into one
                    if tokens.last() != Some(&Token::AnySequence) {
                        tokens.push(Token::AnySequence);
                    }
                    i += 1;
                }
                b'?' => {
                    tokens.push(Token::AnyByte);
                    i += 1;
                }
                b'\\' => {
                    let escaped = bytes.get(i + 1).ok_or_else(|| {
                        StoreError::InvalidPattern(format!("dangling escape in '{}'", pattern))
                    })?;
                    tokens.push(Token::Byte(*escaped));
                    i += 2;
                }
                b'[' => {
                    let (token, next) = Self::parse_class(bytes, i + 1, pattern)?;
                    tokens.push(token);
                    i = next;
                }
                b => {
                    tokens.push(Token::Byte(b));
                    i += 1;
                }
            }
        }

        // Wildcards are ASCII, so the prefix ends on a character boundary
        let prefix: Vec<u8> = tokens
            .iter()
            .map_while(|t| match t {
                Token::Byte(b) => Some(*b),
                _ => None,
            })
            .collect();
        let prefix = String::from_utf8_lossy(&prefix).into_owned();

        Ok(Self {
            source: pattern.to_string(),
            tokens,
            prefix,
        })
    }

    /// Parse a class body starting just after `[`.
    /// Returns the token and the index just after the closing `]`.
    fn parse_class(bytes: &[u8], start: usize, pattern: &str) -> Result<(Token, usize), StoreError> {
        let mut i = start;
        let mut negated = false;
        let mut items = Vec::new();

        if bytes.get(i) == Some(&b'^') {
            negated = true;
            i += 1;
        }

        loop {
            let b = match bytes.get(i) {
                Some(b']') => return Ok((Token::Class { negated, items }, i + 1)),
                Some(b'\\') => {
                    i += 1;
                    *bytes.get(i).ok_or_else(|| {
                        StoreError::InvalidPattern(format!("dangling escape in '{}'", pattern))
                    })?
                }
                Some(c) => *c,
                None => {
                    return Err(StoreError::InvalidPattern(format!(
                        "unterminated character class in '{}'",
                        pattern
                    )));
                }
            };

            if bytes.get(i + 1) == Some(&b'-') && bytes.get(i + 2).is_some_and(|c| *c != b']') {
                let mut hi = bytes[i + 2];
                let mut lo = b;
                if lo > hi {
                    std::mem::swap(&mut lo, &mut hi);
                }
                items.push(ClassItem::Range(lo, hi));
                i += 3;
            } else {
                items.push(ClassItem::Byte(b));
                i += 1;
            }
        }
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Literal text every matching key starts with
    pub fn literal_prefix(&self) -> &str {
        &self.prefix
    }

    /// Check if the pattern contains no wildcards at all
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Byte(_)))
    }

    /// Check if a key matches this pattern
    pub fn is_match(&self, key: &str) -> bool {
        let key = key.as_bytes();
        let tokens = &self.tokens;

        let mut t = 0;
        let mut k = 0;
        // Position of the last `*` and the key index it is currently absorbing up to
        let mut backtrack: Option<(usize, usize)> = None;

        while k < key.len() {
            if t < tokens.len() {
                if tokens[t] == Token::AnySequence {
                    backtrack = Some((t, k));
                    t += 1;
                    continue;
                }
                if tokens[t].matches(key[k]) {
                    t += 1;
                    k += 1;
                    continue;
                }
            }

            match backtrack {
                Some((star, absorbed)) => {
                    t = star + 1;
                    k = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            }
        }

        tokens[t..].iter().all(|tok| *tok == Token::AnySequence)
    }
}

impl FromStr for KeyPattern {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
