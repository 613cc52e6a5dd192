//! Location paths into JSON documents.
//!
//! A [`Path`] is a sequence of segments, each either an object key or an
//! array index. Type errors carry the path of the offending sub-location,
//! and the model store addresses nested values with the same type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single path segment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Object key access.
    Key(String),
    /// Array index access.
    Index(usize),
}

impl Seg {
    /// Get the key if this is a key segment.
    #[inline]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Seg::Key(k) => Some(k),
            Seg::Index(_) => None,
        }
    }

    /// Get the index if this is an index segment.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Key(_) => None,
            Seg::Index(i) => Some(*i),
        }
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, ".{}", k),
            Seg::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A path into a JSON structure.
///
/// # Examples
///
/// ```
/// use mould_ty::Path;
///
/// let p = Path::root().key("users").index(0).key("name");
/// assert_eq!(p.to_string(), "$.users[0].name");
/// assert_eq!(Path::parse("users.0.name"), p);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// The empty (root) path.
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from a segment vector.
    #[inline]
    pub fn from_segments(segments: Vec<Seg>) -> Self {
        Self(segments)
    }

    /// Parse a dotted key path. All-digit segments become array indices.
    pub fn parse(spec: &str) -> Self {
        let mut path = Path::root();
        for part in spec.split('.') {
            if part.is_empty() {
                continue;
            }
            match part.parse::<usize>() {
                Ok(i) => path.0.push(Seg::Index(i)),
                Err(_) => path.0.push(Seg::Key(part.to_owned())),
            }
        }
        path
    }

    /// Append a key segment (builder).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment (builder).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment in place.
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Drop the last segment.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// The segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First segment, if any.
    #[inline]
    pub fn first(&self) -> Option<&Seg> {
        self.0.first()
    }

    /// Concatenate two paths.
    #[inline]
    pub fn join(&self, other: &Path) -> Path {
        let mut out = self.clone();
        out.0.extend(other.0.iter().cloned());
        out
    }

    /// Path without the last segment. `None` at the root.
    #[inline]
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// True if every segment of `self` matches the start of `other`.
    /// A path is a prefix of itself.
    #[inline]
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<&str> for Path {
    fn from(spec: &str) -> Self {
        Path::parse(spec)
    }
}

/// Construct a [`Path`] from a sequence of segments.
///
/// String literals become keys, integers become indices.
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}
