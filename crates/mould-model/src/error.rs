//! Error types for the model runtime.
//!
//! Write refusals and meta-evaluation faults are *emitted* through the
//! model's error hook, never thrown; validation *collects* [`Issue`]
//! records and always returns a list.

use crate::store::StoreError;
use mould_ty::TyError;
use serde::Serialize;
use thiserror::Error;

/// A fault raised while evaluating a user-supplied meta closure.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct MetaError(pub String);

impl MetaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for MetaError {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for MetaError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Result alias for fallible meta closures.
pub type MetaResult<T> = Result<T, MetaError>;

/// Errors emitted by model operations.
///
/// Write refusals (`Locked`, `Readonly`, `Disabled`, `ComputeWrite`) leave
/// the prior value in place; they are routed to the model's error hook and
/// never propagate to the caller.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The model is locked; writes and restores are no-ops.
    #[error("model is locked; cannot write {key}")]
    Locked { key: String },

    /// The field rejects writes.
    #[error("field {key} is readonly")]
    Readonly { key: String },

    /// The field is disabled: writes rejected, validation empty, export
    /// dropped.
    #[error("field {key} is disabled")]
    Disabled { key: String },

    /// Direct write to a computed field.
    #[error("field {key} is computed and cannot be written")]
    ComputeWrite { key: String },

    /// The written or parsed value failed the field's type.
    #[error("field {key} type mismatch: {error}")]
    Type { key: String, error: TyError },

    /// A meta closure failed; normalized to `{key, meta, error}`.
    #[error("meta {meta} of field {key} failed: {error}")]
    Meta {
        key: String,
        meta: String,
        error: MetaError,
    },

    /// Write to a key that is neither a schema field nor a state entry.
    #[error("unknown field: {key}")]
    UnknownField { key: String },

    /// A `state()` entry collides with a schema field.
    #[error("state key {key} collides with a schema field")]
    StateCollision { key: String },

    /// `commit` was called with the reserved origin tag.
    #[error("reserved snapshot tag: {tag}")]
    ReservedTag { tag: String },

    /// `reset` was called with a tag that was never committed.
    #[error("unknown snapshot tag: {tag}")]
    UnknownTag { tag: String },

    /// A store-level addressing failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ModelError {
    /// The field this error concerns, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            ModelError::Locked { key }
            | ModelError::Readonly { key }
            | ModelError::Disabled { key }
            | ModelError::ComputeWrite { key }
            | ModelError::Type { key, .. }
            | ModelError::Meta { key, .. }
            | ModelError::UnknownField { key }
            | ModelError::StateCollision { key } => Some(key),
            _ => None,
        }
    }
}

/// Classification of a validation issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    /// `required` fired on an empty value.
    Required,
    /// The field's type rejected the value.
    Type,
    /// A validator rejected the value.
    Validator,
}

/// One collected validation issue.
#[derive(Clone, Debug, Serialize)]
pub struct Issue {
    /// The field the issue concerns.
    pub key: String,
    /// Index of the validator that produced it, if any.
    pub at: Option<usize>,
    /// Human-readable message.
    pub message: String,
    /// Classification.
    pub kind: IssueKind,
}

impl Issue {
    pub(crate) fn new(key: &str, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            key: key.to_owned(),
            at: None,
            message: message.into(),
            kind,
        }
    }

    pub(crate) fn at(mut self, index: usize) -> Self {
        self.at = Some(index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_render_with_key() {
        let err = ModelError::Readonly { key: "age".into() };
        assert_eq!(err.to_string(), "field age is readonly");
        assert_eq!(err.key(), Some("age"));
    }

    #[test]
    fn meta_fault_is_normalized() {
        let err = ModelError::Meta {
            key: "age".into(),
            meta: "getter".into(),
            error: MetaError::new("boom"),
        };
        assert_eq!(err.to_string(), "meta getter of field age failed: boom");
    }
}
