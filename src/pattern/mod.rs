//! Path patterns: parsing, classification, and parameter extraction.
//!
//! A pattern is a `/`-separated template. A segment starting with `:` is a
//! named parameter matching exactly one path segment; a single `*` as the
//! final segment is a terminal wildcard consuming the remainder of the
//! path. A pattern ending in `*` is a *forward* pattern, everything else is
//! *exact*.
//!
//! ```text
//! /users/:id          exact,   params: id
//! /static/*           forward, catch-all tail
//! /health             exact,   literals only
//! ```

mod map;

pub use map::{PatternMap, PatternMapError};

use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// One segment of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    /// Matches the segment text literally (case per the pattern flag).
    Literal(String),
    /// Matches any single segment, binding it under the given name.
    Param(String),
    /// Matches the remainder of the path. Only legal as the final token.
    Wildcard,
}

/// Whether a pattern matches a fixed-depth path or an open-ended prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Exact,
    Forward,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("a wildcard segment may not open a pattern: {0:?}")]
    LeadingWildcard(String),
    #[error("'*' is only valid as the final segment: {0:?}")]
    NonTerminalWildcard(String),
    #[error("empty parameter name in pattern {0:?}")]
    EmptyParamName(String),
    #[error("duplicate parameter name {name:?} in pattern {pattern:?}")]
    DuplicateParamName { pattern: String, name: String },
}

/// A parsed path pattern.
///
/// Two patterns are equal iff their token sequences are pointwise equal;
/// literal comparison is case-insensitive unless both sides are
/// case-sensitive.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    case_sensitive: bool,
    tokens: Vec<PatternToken>,
}

/// A successful [`Pattern::extract`]: the matched literal segments, the
/// bound parameters, and the tail consumed by a terminal wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathMatch {
    /// Literal segments as they appeared in the request path, in order.
    pub first: Vec<String>,
    /// Parameter bindings, percent-decoded per segment.
    pub params: HashMap<String, String>,
    /// Trailing segments consumed by a terminal wildcard, undecoded.
    pub last: Vec<String>,
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Pattern {
    /// Parse a case-sensitive pattern.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        Self::parse_with_case(raw, true)
    }

    /// Parse a pattern with an explicit case-sensitivity flag for literal
    /// segments.
    pub fn parse_with_case(raw: &str, case_sensitive: bool) -> Result<Self, PatternError> {
        let mut tokens = Vec::new();
        let mut seen_params: Vec<&str> = Vec::new();
        let segments: Vec<&str> = split_segments(raw).collect();
        let count = segments.len();

        for (i, segment) in segments.into_iter().enumerate() {
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParamName(raw.to_string()));
                }
                if seen_params.contains(&name) {
                    return Err(PatternError::DuplicateParamName {
                        pattern: raw.to_string(),
                        name: name.to_string(),
                    });
                }
                seen_params.push(name);
                tokens.push(PatternToken::Param(name.to_string()));
            } else if segment == "*" {
                if i == 0 {
                    return Err(PatternError::LeadingWildcard(raw.to_string()));
                }
                if i + 1 != count {
                    return Err(PatternError::NonTerminalWildcard(raw.to_string()));
                }
                tokens.push(PatternToken::Wildcard);
            } else {
                tokens.push(PatternToken::Literal(segment.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            case_sensitive,
            tokens,
        })
    }

    /// Build a pattern whose tokens are literal copies of `path`'s segments.
    ///
    /// `:` and `*` lose their meaning, so a concrete request path can be
    /// used as a lookup key without re-interpretation.
    pub fn escape(path: &str) -> Self {
        let tokens = split_segments(path)
            .map(|s| PatternToken::Literal(s.to_string()))
            .collect();
        Self {
            raw: path.to_string(),
            case_sensitive: true,
            tokens,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn kind(&self) -> PatternKind {
        match self.tokens.last() {
            Some(PatternToken::Wildcard) => PatternKind::Forward,
            _ => PatternKind::Exact,
        }
    }

    fn literal_eq(&self, a: &str, b: &str, other_case_sensitive: bool) -> bool {
        if self.case_sensitive && other_case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    /// Match a concrete request path, extracting parameter bindings.
    ///
    /// Parameter segments are percent-decoded individually, so an encoded
    /// slash (`%2F`) inside a segment is never treated as a separator.
    /// Returns `None` on structural mismatch or undecodable percent-escapes.
    pub fn extract(&self, path: &str) -> Option<PathMatch> {
        let segments: Vec<&str> = split_segments(path).collect();
        let mut result = PathMatch::default();
        let mut pos = 0usize;

        for token in &self.tokens {
            match token {
                PatternToken::Literal(lit) => {
                    let seg = *segments.get(pos)?;
                    let matches = if self.case_sensitive {
                        seg == lit.as_str()
                    } else {
                        seg.eq_ignore_ascii_case(lit)
                    };
                    if !matches {
                        return None;
                    }
                    result.first.push(seg.to_string());
                    pos += 1;
                }
                PatternToken::Param(name) => {
                    let seg = *segments.get(pos)?;
                    let decoded = percent_decode_str(seg).decode_utf8().ok()?;
                    result.params.insert(name.clone(), decoded.into_owned());
                    pos += 1;
                }
                PatternToken::Wildcard => {
                    result.last = segments[pos..].iter().map(|s| (*s).to_string()).collect();
                    pos = segments.len();
                }
            }
        }

        if pos != segments.len() {
            return None;
        }
        Some(result)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        if self.tokens.len() != other.tokens.len() {
            return false;
        }
        self.tokens
            .iter()
            .zip(other.tokens.iter())
            .all(|(a, b)| match (a, b) {
                (PatternToken::Literal(x), PatternToken::Literal(y)) => {
                    self.literal_eq(x, y, other.case_sensitive)
                }
                (PatternToken::Param(x), PatternToken::Param(y)) => x == y,
                (PatternToken::Wildcard, PatternToken::Wildcard) => true,
                _ => false,
            })
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            match token {
                PatternToken::Literal(s) => write!(f, "/{s}")?,
                PatternToken::Param(name) => write!(f, "/:{name}")?,
                PatternToken::Wildcard => write!(f, "/*")?,
            }
        }
        if self.tokens.is_empty() {
            write!(f, "/")?;
        }
        Ok(())
    }
}
