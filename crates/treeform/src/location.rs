#![forbid(unsafe_code)]

//! Dotted-path locations into a nested model.
//!
//! A [`Location`] is a validated, dot-delimited path such as
//! `contact.emails.0.address`. Each segment is either a mapping key or, when it
//! is a canonical decimal integer, a sequence index. Index-looking segments
//! still act as plain keys when the value they land on is a mapping.
//!
//! Child locations are built by plain concatenation, which is how nested leaves
//! compose their locations from a parent's:
//!
//! ```rust
//! use treeform::Location;
//!
//! let emails = Location::parse("lists.emails").unwrap();
//! let second = emails.child(1).unwrap().child("email").unwrap();
//! assert_eq!(second.as_str(), "lists.emails.1.email");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;

/// Separator between location segments.
pub const SEPARATOR: char = '.';

/// A parsed, non-empty dotted path.
///
/// # Invariants
///
/// - The raw string is non-empty.
/// - Every segment between separators is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    raw: String,
}

impl Location {
    /// Parse a location, rejecting empty strings and empty segments.
    pub fn parse(raw: impl Into<String>) -> Result<Self, PathError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if let Some(position) = raw.split(SEPARATOR).position(str::is_empty) {
            return Err(PathError::EmptySegment {
                location: raw,
                position,
            });
        }
        Ok(Self { raw })
    }

    /// The location as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Iterate over the segments, left to right.
    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> + '_ {
        self.raw.split(SEPARATOR).map(Segment)
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Build the location of a child key or index below this one.
    pub fn child(&self, key: impl fmt::Display) -> Result<Self, PathError> {
        Self::parse(format!("{}{SEPARATOR}{key}", self.raw))
    }

    /// The enclosing location, or `None` for a single-segment location.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.raw.rsplit_once(SEPARATOR).map(|(parent, _)| Self {
            raw: parent.to_owned(),
        })
    }

    /// Whether this location equals `prefix` or lies below it.
    ///
    /// An empty prefix contains every location. Matching is segment-aware:
    /// `contact.emailAddress` is not within `contact.email`.
    #[must_use]
    pub fn is_within(&self, prefix: &str) -> bool {
        is_within(&self.raw, prefix)
    }
}

/// Segment-aware prefix test on raw location strings.
pub(crate) fn is_within(location: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match location.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// One segment of a [`Location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a>(&'a str);

impl<'a> Segment<'a> {
    /// The segment text, usable as a mapping key.
    #[must_use]
    pub fn key(self) -> &'a str {
        self.0
    }

    /// The sequence index this segment denotes, if it is a canonical integer.
    ///
    /// `"0"` and `"12"` are indices; `"07"`, `"+1"` and `"-1"` are not.
    #[must_use]
    pub fn index(self) -> Option<usize> {
        let text = self.0;
        let canonical = !text.is_empty()
            && text.bytes().all(|b| b.is_ascii_digit())
            && (text == "0" || !text.starts_with('0'));
        if canonical { text.parse().ok() } else { None }
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Location {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Location {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Location {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}
