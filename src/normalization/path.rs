//! Path resolver
//!
//! Field paths address a value inside a vendor payload. Segments are
//! separated by `.`; each segment is a mapping key optionally followed by one
//! or more bracketed array indices (`data[0].bid`, `levels[2]`, `a[0][1]`).
//! A segment may also be a bare index (`[0]`) for tuple-style messages.
//! A bare numeric key (`a.0`) addresses an object key or, on an array, the
//! element at that position.
//!
//! The empty path is the identity: it resolves to the whole payload.

use serde_json::Value;
use std::fmt;

/// One step of a parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Reason a path expression could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub expression: String,
    pub reason: String,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path '{}': {}", self.expression, self.reason)
    }
}

impl std::error::Error for PathError {}

/// A validated field path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a path expression
    pub fn parse(expression: &str) -> Result<Self, PathError> {
        let error = |reason: &str| PathError {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();

        if expression.is_empty() {
            return Ok(Self {
                raw: String::new(),
                segments,
            });
        }

        for part in expression.split('.') {
            if part.is_empty() {
                return Err(error("empty segment"));
            }

            let (key, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };

            if key.contains(']') {
                return Err(error("unmatched ']'"));
            }
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }

            while !rest.is_empty() {
                let inner = rest
                    .strip_prefix('[')
                    .ok_or_else(|| error("unexpected text after index"))?;
                let close = inner.find(']').ok_or_else(|| error("unclosed '['"))?;
                let digits = &inner[..close];

                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(error("array index must be a non-negative integer"));
                }
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| error("array index out of range"))?;

                segments.push(PathSegment::Index(index));
                rest = &inner[close + 1..];
            }
        }

        Ok(Self {
            raw: expression.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Whether this path maps the payload wholesale
    pub fn is_identity(&self) -> bool {
        self.segments.is_empty()
    }

    /// Locate the addressed value; `None` means absent
    pub fn resolve<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        let mut current = payload;

        for segment in &self.segments {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
                (PathSegment::Key(key), Value::Array(items)) => {
                    let index = key.parse::<usize>().ok()?;
                    items.get(index)?
                }
                (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolve a path expression against a payload.
///
/// Never fails: an unparsable expression, a missing key, an out-of-range
/// index or indexing into a non-array all yield `None`.
pub fn resolve<'a>(expression: &str, payload: &'a Value) -> Option<&'a Value> {
    FieldPath::parse(expression).ok()?.resolve(payload)
}
