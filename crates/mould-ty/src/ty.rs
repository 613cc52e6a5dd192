//! The type family: structural types built on patterns.
//!
//! A [`Type`] wraps a pattern with a name and a strict/loose mode. The
//! structural constructors ([`dict`], [`list`], [`tuple`], [`enum_of`],
//! [`range`], [`self_ref`]) cover mappings, homogeneous and positional
//! sequences, alternatives, numeric bounds, and recursive shapes.

use crate::error::{ErrorKind, TyError};
use crate::pattern::{check, check_map, CheckCtx, Pattern};
use indexmap::IndexMap;
use serde_json::Value;

/// Structural checking mode, inherited by clones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Reject unknown keys and extra tuple positions.
    Strict,
    /// Ignore unknown keys and extra tuple positions.
    #[default]
    Loose,
}

/// The structural kind of a type.
#[derive(Clone, Debug)]
pub enum TypeKind {
    /// A single wrapped pattern.
    Simple(Pattern),
    /// Mapping with per-key patterns.
    Dict(IndexMap<String, Pattern>),
    /// Array whose every element matches one of the patterns.
    List(Vec<Pattern>),
    /// Array with positional patterns; strict mode requires exact length.
    Tuple(Vec<Pattern>),
    /// Any one of the alternatives.
    Enum(Vec<Pattern>),
    /// Numeric bounds with inclusive/exclusive edges.
    Range {
        min: f64,
        max: f64,
        min_bound: bool,
        max_bound: bool,
    },
    /// A recursive shape: `SelfRef` markers inside the pattern re-enter it.
    SelfRef(Box<Pattern>),
}

/// A named, moded type expression.
#[derive(Clone, Debug)]
pub struct Type {
    name: String,
    kind: TypeKind,
    mode: Mode,
}

impl Type {
    /// Wrap a bare pattern.
    pub fn new(pattern: impl Into<Pattern>) -> Self {
        let pattern = pattern.into();
        let name = pattern.describe();
        Self {
            name,
            kind: TypeKind::Simple(pattern),
            mode: Mode::Loose,
        }
    }

    fn with_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: Mode::Loose,
        }
    }

    /// Override the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The type's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type's mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// A strict-mode clone. Mode is per instance and inherited by clones.
    pub fn strict(&self) -> Self {
        let mut t = self.clone();
        t.mode = Mode::Strict;
        t
    }

    /// A loose-mode clone.
    pub fn loose(&self) -> Self {
        let mut t = self.clone();
        t.mode = Mode::Loose;
        t
    }

    /// Assert that the value matches; a mismatch yields exactly one
    /// [`TyError`] located at the offending sub-value.
    pub fn assert(&self, value: &Value) -> Result<(), TyError> {
        self.check(value, &CheckCtx::default())
    }

    /// Non-throwing assert: the error, or `None` on a match.
    pub fn catch(&self, value: &Value) -> Option<TyError> {
        self.assert(value).err()
    }

    /// Whether the value matches.
    pub fn test(&self, value: &Value) -> bool {
        self.assert(value).is_ok()
    }

    /// Deferred check handle; lazily resolved rule patterns stay
    /// unresolved (an unresolved pattern accepts any value).
    pub fn trace<'v>(&self, value: &'v Value) -> Deferral<'_, 'v> {
        Deferral {
            ty: self,
            value,
            resolve_deferred: false,
        }
    }

    /// Deferred check handle that forces resolution of lazily resolved
    /// rule patterns before checking.
    pub fn track<'v>(&self, value: &'v Value) -> Deferral<'_, 'v> {
        Deferral {
            ty: self,
            value,
            resolve_deferred: true,
        }
    }

    /// Engine entry: check with inherited context, switching to this
    /// type's mode.
    pub(crate) fn check(&self, value: &Value, cx: &CheckCtx) -> Result<(), TyError> {
        let cx = cx.with_mode(self.mode);
        match &self.kind {
            TypeKind::Simple(pattern) => check(value, pattern, &cx),
            TypeKind::Dict(entries) => check_map(value, entries, &cx),
            TypeKind::List(patterns) => self.check_list(value, patterns, &cx),
            TypeKind::Tuple(patterns) => self.check_tuple(value, patterns, &cx),
            TypeKind::Enum(patterns) => self.check_enum(value, patterns, &cx),
            TypeKind::Range {
                min,
                max,
                min_bound,
                max_bound,
            } => self.check_range(value, *min, *max, *min_bound, *max_bound),
            TypeKind::SelfRef(pattern) => {
                let cx = cx.with_root(pattern);
                check(value, pattern, &cx)
            }
        }
    }

    fn check_list(&self, value: &Value, patterns: &[Pattern], cx: &CheckCtx) -> Result<(), TyError> {
        let arr = value
            .as_array()
            .ok_or_else(|| TyError::new(ErrorKind::Mistaken, value, self.name()))?;
        for (i, item) in arr.iter().enumerate() {
            if patterns.len() == 1 {
                check(item, &patterns[0], cx).map_err(|e| e.at(crate::Seg::Index(i)))?;
            } else if !patterns.iter().any(|p| check(item, p, cx).is_ok()) {
                return Err(
                    TyError::new(ErrorKind::Mistaken, item, self.name()).at(crate::Seg::Index(i))
                );
            }
        }
        Ok(())
    }

    fn check_tuple(
        &self,
        value: &Value,
        patterns: &[Pattern],
        cx: &CheckCtx,
    ) -> Result<(), TyError> {
        let arr = value
            .as_array()
            .ok_or_else(|| TyError::new(ErrorKind::Mistaken, value, self.name()))?;
        if cx.mode == Mode::Strict && arr.len() != patterns.len() {
            return Err(TyError::new(ErrorKind::Dirty, value, self.name()));
        }
        for (i, pattern) in patterns.iter().enumerate() {
            match arr.get(i) {
                Some(item) => {
                    check(item, pattern, cx).map_err(|e| e.at(crate::Seg::Index(i)))?
                }
                None => {
                    if cx.mode == Mode::Strict {
                        return Err(TyError::new(ErrorKind::Dirty, value, self.name()));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_enum(&self, value: &Value, patterns: &[Pattern], cx: &CheckCtx) -> Result<(), TyError> {
        if patterns.iter().any(|p| check(value, p, cx).is_ok()) {
            Ok(())
        } else {
            Err(TyError::new(ErrorKind::Mistaken, value, self.name()))
        }
    }

    fn check_range(
        &self,
        value: &Value,
        min: f64,
        max: f64,
        min_bound: bool,
        max_bound: bool,
    ) -> Result<(), TyError> {
        let n = value
            .as_f64()
            .ok_or_else(|| TyError::new(ErrorKind::Mistaken, value, self.name()))?;
        let low_ok = if min_bound { n >= min } else { n > min };
        let high_ok = if max_bound { n <= max } else { n < max };
        if low_ok && high_ok {
            Ok(())
        } else {
            Err(TyError::new(ErrorKind::Unexcepted, value, self.name()))
        }
    }
}

impl From<Pattern> for Type {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Type(t) => *t,
            other => Type::new(other),
        }
    }
}

/// A deferred check over a value, usable with a continuation chain.
#[must_use = "a deferral does nothing until run with by()"]
pub struct Deferral<'t, 'v> {
    ty: &'t Type,
    value: &'v Value,
    resolve_deferred: bool,
}

impl Deferral<'_, '_> {
    /// Run the check against another type, returning the chainable result.
    pub fn by(self, ty: &Type) -> Checked {
        let cx = CheckCtx {
            resolve_deferred: self.resolve_deferred,
            ..CheckCtx::default()
        };
        Checked {
            error: ty.check(self.value, &cx).err(),
        }
    }

    /// Run against the handle's own type.
    pub fn run(self) -> Checked {
        let ty = self.ty;
        self.by(ty)
    }
}

/// Completed deferred check; continuation style over the optional error.
pub struct Checked {
    error: Option<TyError>,
}

impl Checked {
    /// Invoke the continuation with the error, if any.
    pub fn on_catch(self, f: impl FnOnce(&TyError)) -> Self {
        if let Some(err) = &self.error {
            f(err);
        }
        self
    }

    /// Whether the check passed.
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    /// Extract the error.
    pub fn into_error(self) -> Option<TyError> {
        self.error
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Mapping type from `(key, pattern)` pairs.
pub fn dict<K: Into<String>, P: Into<Pattern>>(entries: impl IntoIterator<Item = (K, P)>) -> Type {
    let entries: IndexMap<String, Pattern> = entries
        .into_iter()
        .map(|(k, p)| (k.into(), p.into()))
        .collect();
    Type::with_kind("Dict", TypeKind::Dict(entries))
}

/// Homogeneous-or-alternatives list type.
pub fn list<P: Into<Pattern>>(patterns: impl IntoIterator<Item = P>) -> Type {
    Type::with_kind(
        "List",
        TypeKind::List(patterns.into_iter().map(Into::into).collect()),
    )
}

/// Positional tuple type.
pub fn tuple<P: Into<Pattern>>(patterns: impl IntoIterator<Item = P>) -> Type {
    Type::with_kind(
        "Tuple",
        TypeKind::Tuple(patterns.into_iter().map(Into::into).collect()),
    )
}

/// Alternatives type: the value must match any one pattern.
pub fn enum_of<P: Into<Pattern>>(patterns: impl IntoIterator<Item = P>) -> Type {
    Type::with_kind(
        "Enum",
        TypeKind::Enum(patterns.into_iter().map(Into::into).collect()),
    )
}

/// Inclusive numeric range type.
pub fn range(min: f64, max: f64) -> Type {
    range_with(min, max, true, true)
}

/// Numeric range type with explicit bound inclusivity.
pub fn range_with(min: f64, max: f64, min_bound: bool, max_bound: bool) -> Type {
    Type::with_kind(
        "Range",
        TypeKind::Range {
            min,
            max,
            min_bound,
            max_bound,
        },
    )
}

/// Recursive type: `Pattern::SelfRef` markers inside the pattern re-enter
/// the whole pattern. The cycle is resolved lazily during checking, never
/// materialized.
pub fn self_ref(pattern: impl Into<Pattern>) -> Type {
    Type::with_kind("SelfRef", TypeKind::SelfRef(Box::new(pattern.into())))
}
