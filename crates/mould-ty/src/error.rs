//! Structured type errors.
//!
//! A root assertion failure produces exactly one [`TyError`] whose path
//! points at the offending sub-location. The rendered form is stable:
//! `"<kind>: value <repr> does not match <pattern> at <path>"`.

use crate::Path;
use serde_json::Value;
use std::fmt;

/// Classification tag of a type error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Value shape does not match the pattern.
    Mistaken,
    /// Strict-mode length or key mismatch.
    Dirty,
    /// Required presence predicate failed.
    Missing,
    /// Value present where it should not be.
    Overflow,
    /// A user predicate or validator rejected the value.
    Exception,
    /// Bounds or range violation.
    Unexcepted,
}

impl ErrorKind {
    /// Lowercase tag used in the rendered message.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Mistaken => "mistaken",
            ErrorKind::Dirty => "dirty",
            ErrorKind::Missing => "missing",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Exception => "exception",
            ErrorKind::Unexcepted => "unexcepted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured type error with kind, offending value, pattern description,
/// path context, and an optional nested cause.
#[derive(Clone, Debug)]
pub struct TyError {
    /// Classification tag.
    pub kind: ErrorKind,
    /// The offending value, cloned at the failure site.
    pub value: Value,
    /// Short description of the pattern that rejected the value.
    pub pattern: String,
    /// Location of the failure relative to the asserted root.
    pub path: Path,
    /// Message override from a rule or schema meta, if any.
    pub message: Option<String>,
    /// Nested error that caused this one, if any.
    pub cause: Option<Box<TyError>>,
}

impl TyError {
    /// Create an error at the root path.
    pub fn new(kind: ErrorKind, value: &Value, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.clone(),
            pattern: pattern.into(),
            path: Path::root(),
            message: None,
            cause: None,
        }
    }

    /// Prepend a segment to the error path, unwinding out of a nested check.
    pub fn at(mut self, seg: crate::Seg) -> Self {
        let mut path = Path::root();
        path.push(seg);
        self.path = path.join(&self.path);
        self
    }

    /// Replace the rendered message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a nested cause.
    pub fn with_cause(mut self, cause: TyError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Short single-line representation of the offending value.
    pub fn value_repr(&self) -> String {
        repr(&self.value)
    }
}

impl fmt::Display for TyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = &self.message {
            return f.write_str(message);
        }
        write!(
            f,
            "{}: value {} does not match {} at {}",
            self.kind,
            self.value_repr(),
            self.pattern,
            self.path
        )
    }
}

impl std::error::Error for TyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|e| e as _)
    }
}

const REPR_LIMIT: usize = 48;

/// Render a value for error messages, truncated to a fixed width.
pub fn repr(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= REPR_LIMIT {
        return text;
    }
    let head: String = text.chars().take(REPR_LIMIT).collect();
    format!("{head}…")
}
