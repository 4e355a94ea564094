//! Location addressing.
//!
//! A location names a position inside a [`TreeValue`](crate::models::TreeValue),
//! rooted at `$`:
//!
//! ```text
//! $                  the document root
//! $.user             key "user" of the root object
//! $.user.emails[0]   first item of the "emails" array
//! $.items[*].id      key "id" of every item of "items"
//! $["a.b"]           key "a.b" (bracket-quoted, since it contains a '.')
//! ```
//!
//! Whitelist rules are compiled once into a [`LocationPattern`]. During a tree
//! walk the engine keeps a [`LocationPath`] segment stack and asks each pattern
//! whether it covers the current position. Nothing is re-parsed per node.

use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};
use thiserror::Error;

/// One step of a concrete location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Object field access.
    Key(&'a str),
    /// Array index access.
    Index(usize),
}

/// Concrete position in a tree, built incrementally during traversal.
///
/// Keys are borrowed from the tree being walked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationPath<'a> {
    segments: Vec<Segment<'a>>,
}

impl<'a> LocationPath<'a> {
    /// Creates the root location `$`.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Descends into an object field.
    pub fn push_key(&mut self, key: &'a str) {
        self.segments.push(Segment::Key(key));
    }

    /// Descends into an array item.
    pub fn push_index(&mut self, index: usize) {
        self.segments.push(Segment::Index(index));
    }

    /// Returns to the parent location.
    pub fn pop(&mut self) -> Option<Segment<'a>> {
        self.segments.pop()
    }

    /// Segments below the root, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    /// Returns `true` at the document root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl<'a> FromIterator<Segment<'a>> for LocationPath<'a> {
    fn from_iter<I: IntoIterator<Item = Segment<'a>>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for LocationPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) if is_plain_key(key) => write!(f, ".{key}")?,
                Segment::Key(key) => write_quoted_key(f, key)?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Keys that can be written with the `.key` form.
fn is_plain_key(key: &str) -> bool {
    !key.is_empty() && !key.contains(['.', '[', ']', '"'])
}

fn write_quoted_key(f: &mut fmt::Formatter<'_>, key: &str) -> fmt::Result {
    f.write_str("[\"")?;
    for c in key.chars() {
        if matches!(c, '"' | '\\') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"]")
}

/// Reasons a whitelist pattern fails to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern does not begin with the root marker.
    #[error("pattern must start with '$'")]
    MissingRoot,

    /// A `.` is not followed by any key characters.
    #[error("empty key after '.' at offset {0} (use [\"\"] for an empty key)")]
    EmptyKey(usize),

    /// Bracket content is neither `*`, a canonical integer, nor a quoted key.
    #[error("invalid index '{text}' at offset {offset}")]
    InvalidIndex {
        /// Text found between the brackets.
        text: String,
        /// Offset of the opening bracket.
        offset: usize,
    },

    /// A `[` has no matching `]`.
    #[error("unterminated '[' at offset {0}")]
    UnterminatedBracket(usize),

    /// A quoted key has no closing quote.
    #[error("unterminated quoted key at offset {0}")]
    UnterminatedQuote(usize),

    /// A character that cannot appear at this position.
    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedChar {
        /// The offending character.
        found: char,
        /// Its byte offset in the pattern.
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Key(String),
    Index(usize),
    AnyIndex,
}

/// A compiled whitelist rule.
///
/// Matching is anchored at both ends: the pattern must describe the whole
/// location, never a prefix or a suffix of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPattern {
    source: String,
    segments: Vec<PatternSegment>,
}

impl LocationPattern {
    /// Compiles a pattern string.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] describing the first syntax problem found.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            source: pattern.to_string(),
            segments: parse_pattern(pattern)?,
        })
    }

    /// The pattern text as written in the configuration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the pattern contains a `[*]` segment.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, PatternSegment::AnyIndex))
    }

    /// Tests a concrete location against this pattern.
    #[must_use]
    pub fn matches(&self, location: &LocationPath<'_>) -> bool {
        let candidate = location.segments();
        self.segments.len() == candidate.len()
            && self
                .segments
                .iter()
                .zip(candidate)
                .all(|(expected, actual)| match (expected, actual) {
                    (PatternSegment::Key(want), Segment::Key(got)) => want == got,
                    (PatternSegment::Index(want), Segment::Index(got)) => want == got,
                    (PatternSegment::AnyIndex, Segment::Index(_)) => true,
                    _ => false,
                })
    }
}

impl FromStr for LocationPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for LocationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

type Chars<'s> = Peekable<CharIndices<'s>>;

fn parse_pattern(pattern: &str) -> Result<Vec<PatternSegment>, PatternError> {
    let mut chars = pattern.char_indices().peekable();
    if chars.next_if(|&(_, c)| c == '$').is_none() {
        return Err(PatternError::MissingRoot);
    }

    let mut segments = Vec::new();
    while let Some((offset, c)) = chars.next() {
        let segment = match c {
            '.' => parse_dotted_key(&mut chars, offset)?,
            '[' => parse_bracket(&mut chars, offset)?,
            found => return Err(PatternError::UnexpectedChar { found, offset }),
        };
        segments.push(segment);
    }

    Ok(segments)
}

fn parse_dotted_key(chars: &mut Chars<'_>, dot: usize) -> Result<PatternSegment, PatternError> {
    let mut key = String::new();
    while let Some(&(offset, c)) = chars.peek() {
        match c {
            '.' | '[' => break,
            ']' | '"' => return Err(PatternError::UnexpectedChar { found: c, offset }),
            _ => {
                key.push(c);
                chars.next();
            },
        }
    }

    if key.is_empty() {
        return Err(PatternError::EmptyKey(dot));
    }
    Ok(PatternSegment::Key(key))
}

fn parse_bracket(chars: &mut Chars<'_>, open: usize) -> Result<PatternSegment, PatternError> {
    if chars.next_if(|&(_, c)| c == '"').is_some() {
        let key = parse_quoted_key(chars, open)?;
        return match chars.next() {
            Some((_, ']')) => Ok(PatternSegment::Key(key)),
            Some((offset, found)) => Err(PatternError::UnexpectedChar { found, offset }),
            None => Err(PatternError::UnterminatedBracket(open)),
        };
    }

    let mut text = String::new();
    loop {
        match chars.next() {
            Some((_, ']')) => break,
            Some((_, c)) => text.push(c),
            None => return Err(PatternError::UnterminatedBracket(open)),
        }
    }

    if text == "*" {
        return Ok(PatternSegment::AnyIndex);
    }
    parse_index(&text)
        .map(PatternSegment::Index)
        .ok_or(PatternError::InvalidIndex { text, offset: open })
}

fn parse_quoted_key(chars: &mut Chars<'_>, open: usize) -> Result<String, PatternError> {
    let mut key = String::new();
    loop {
        match chars.next() {
            Some((_, '"')) => return Ok(key),
            Some((_, '\\')) => match chars.next() {
                Some((_, c @ ('"' | '\\'))) => key.push(c),
                Some((offset, found)) => {
                    return Err(PatternError::UnexpectedChar { found, offset });
                },
                None => return Err(PatternError::UnterminatedQuote(open)),
            },
            Some((_, c)) => key.push(c),
            None => return Err(PatternError::UnterminatedQuote(open)),
        }
    }
}

/// Only canonical decimal indices are accepted, since traversal never
/// produces `[007]`.
fn parse_index(text: &str) -> Option<usize> {
    let canonical = !text.is_empty()
        && text.bytes().all(|b| b.is_ascii_digit())
        && (text.len() == 1 || !text.starts_with('0'));
    if canonical { text.parse().ok() } else { None }
}
