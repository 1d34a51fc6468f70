//! Hierarchical path patterns.
//!
//! A pattern is a `/`-delimited list of segments:
//! - `*` on its own matches exactly one path segment
//! - `*` inside a segment matches any run of characters within that segment
//! - `**` as the last segment matches zero or more trailing segments
//!
//! Matching walks pattern and path segment by segment; inside a segment the
//! literal pieces between `*` are located with a leftmost search, so the cost
//! stays linear in the lengths of pattern and path.

use std::fmt;

use crate::storage::path;
use crate::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Exact segment name
    Literal(String),
    /// `*` alone
    Any,
    /// Segment containing `*`, kept as the literal pieces around the stars
    Wild(Vec<String>),
    /// Trailing `**`
    Rest,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw {
            "*" => Segment::Any,
            "**" => Segment::Rest,
            s if s.contains('*') => Segment::Wild(s.split('*').map(str::to_string).collect()),
            s => Segment::Literal(s.to_string()),
        }
    }

    /// Matches a single path segment. `Rest` is handled by the caller.
    pub(crate) fn matches(
        &self,
        name: &str,
    ) -> bool {
        match self {
            Segment::Literal(lit) => lit == name,
            Segment::Any | Segment::Rest => true,
            Segment::Wild(pieces) => match_pieces(pieces, name),
        }
    }
}

/// `pieces` comes from splitting on `*`, so it always has at least two entries.
fn match_pieces(
    pieces: &[String],
    name: &str,
) -> bool {
    let (first, rest) = match pieces.split_first() {
        Some(split) => split,
        None => return false,
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return name == first,
    };

    if name.len() < first.len() + last.len() || !name.starts_with(first.as_str()) || !name.ends_with(last.as_str()) {
        return false;
    }

    let mut window = &name[first.len()..name.len() - last.len()];
    for piece in middle {
        match window.find(piece.as_str()) {
            Some(at) => window = &window[at + piece.len()..],
            None => return false,
        }
    }
    true
}

/// A compiled path pattern
#[derive(Clone, PartialEq, Eq)]
pub struct Glob {
    source: String,
    segments: Vec<Segment>,
}

impl Glob {
    pub fn compile(pattern: &str) -> Result<Self, ClientError> {
        let invalid = |reason| ClientError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("empty pattern"));
        }
        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }
        if pattern == path::ROOT {
            return Ok(Self {
                source: pattern.to_string(),
                segments: Vec::new(),
            });
        }

        let raw: Vec<&str> = pattern[1..].split('/').collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, seg) in raw.iter().enumerate() {
            if seg.is_empty() {
                return Err(invalid("empty segment"));
            }
            if seg.contains("**") {
                if *seg != "**" {
                    return Err(invalid("'**' must be a whole segment"));
                }
                if i + 1 != raw.len() {
                    return Err(invalid("'**' is only allowed as the last segment"));
                }
            }
            segments.push(Segment::parse(seg));
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether a normalized path matches this pattern
    pub fn matches(
        &self,
        path: &str,
    ) -> bool {
        let mut names = path::segments(path);
        for seg in &self.segments {
            if *seg == Segment::Rest {
                return true;
            }
            match names.next() {
                Some(name) if seg.matches(name) => {}
                _ => return false,
            }
        }
        names.next().is_none()
    }
}

impl fmt::Debug for Glob {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Glob({})", self.source)
    }
}

impl fmt::Display for Glob {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.source)
    }
}
