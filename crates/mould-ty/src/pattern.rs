//! The pattern union and the recursive checking engine.
//!
//! A [`Pattern`] is the language of type expressions: prototype tokens,
//! literal equality, structural literals (mappings and sequences), nested
//! [`Type`]s, [`Rule`]s, and the self-reference marker. The engine walks
//! value × pattern and produces at most one [`TyError`] per assertion,
//! carrying the path of the offending sub-location.

use crate::error::{repr, ErrorKind, TyError};
use crate::prototype::{is, Proto};
use crate::rule::Rule;
use crate::ty::{Mode, Type};
use crate::Seg;
use indexmap::IndexMap;
use serde_json::Value;

/// A composable type expression.
#[derive(Clone, Debug)]
pub enum Pattern {
    /// A prototype token.
    Proto(Proto),
    /// Literal equality.
    Equal(Value),
    /// Structural mapping literal: every declared key must be present and
    /// match; strict mode rejects undeclared keys.
    Map(IndexMap<String, Pattern>),
    /// Sequence literal: the value must be an array whose every element
    /// matches one of the listed patterns. A one-element literal therefore
    /// describes a homogeneous list.
    Items(Vec<Pattern>),
    /// A nested type (carries its own mode).
    Type(Box<Type>),
    /// A conditional or transformational rule.
    Rule(Rule),
    /// Marker resolved against the innermost self-referential type.
    SelfRef,
}

impl Pattern {
    /// Build a mapping literal from `(key, pattern)` pairs.
    pub fn map<K: Into<String>, P: Into<Pattern>>(entries: impl IntoIterator<Item = (K, P)>) -> Self {
        Pattern::Map(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }

    /// Build a sequence literal.
    pub fn items<P: Into<Pattern>>(patterns: impl IntoIterator<Item = P>) -> Self {
        Pattern::Items(patterns.into_iter().map(Into::into).collect())
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Pattern::Proto(p) => p.name(),
            Pattern::Equal(v) => format!("= {}", repr(v)),
            Pattern::Map(entries) => {
                let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
                format!("{{{}}}", keys.join(", "))
            }
            Pattern::Items(ps) => {
                let inner: Vec<String> = ps.iter().map(Pattern::describe).collect();
                format!("[{}]", inner.join(" | "))
            }
            Pattern::Type(t) => t.name().to_owned(),
            Pattern::Rule(r) => r.name().to_owned(),
            Pattern::SelfRef => "SelfRef".into(),
        }
    }

    /// Pure check against a value with default context (loose, no
    /// self-reference anchor). Used by rule hooks and schema internals.
    pub fn check_value(&self, value: &Value) -> Result<(), TyError> {
        check(value, self, &CheckCtx::default())
    }

    /// Whether the value matches this pattern (pure, default context).
    pub fn matches(&self, value: &Value) -> bool {
        self.check_value(value).is_ok()
    }
}

impl From<Proto> for Pattern {
    fn from(p: Proto) -> Self {
        Pattern::Proto(p)
    }
}

impl From<Value> for Pattern {
    fn from(v: Value) -> Self {
        Pattern::Equal(v)
    }
}

impl From<Type> for Pattern {
    fn from(t: Type) -> Self {
        Pattern::Type(Box::new(t))
    }
}

impl From<Rule> for Pattern {
    fn from(r: Rule) -> Self {
        Pattern::Rule(r)
    }
}

/// Context threaded through a recursive check.
#[derive(Clone, Default)]
pub(crate) struct CheckCtx<'a> {
    /// Mode of the innermost enclosing type; literals inherit it.
    pub mode: Mode,
    /// Anchor pattern for [`Pattern::SelfRef`].
    pub root: Option<&'a Pattern>,
    /// Force resolution of deferred rule patterns (`track` semantics).
    pub resolve_deferred: bool,
}

impl<'a> CheckCtx<'a> {
    pub(crate) fn with_mode(&self, mode: Mode) -> CheckCtx<'a> {
        CheckCtx {
            mode,
            root: self.root,
            resolve_deferred: self.resolve_deferred,
        }
    }

    pub(crate) fn with_root<'b>(&self, root: &'b Pattern) -> CheckCtx<'b>
    where
        'a: 'b,
    {
        CheckCtx {
            mode: self.mode,
            root: Some(root),
            resolve_deferred: self.resolve_deferred,
        }
    }
}

/// Check a value against a pattern. Errors carry the relative path of the
/// offending sub-location.
pub(crate) fn check(value: &Value, pattern: &Pattern, cx: &CheckCtx) -> Result<(), TyError> {
    match pattern {
        Pattern::Proto(proto) => {
            if is(proto.clone()).matches(value) {
                Ok(())
            } else {
                Err(TyError::new(ErrorKind::Mistaken, value, proto.name()))
            }
        }
        Pattern::Equal(expected) => {
            if value == expected {
                Ok(())
            } else {
                Err(TyError::new(
                    ErrorKind::Mistaken,
                    value,
                    format!("= {}", repr(expected)),
                ))
            }
        }
        Pattern::Map(entries) => check_map(value, entries, cx),
        Pattern::Items(patterns) => check_items(value, patterns, cx),
        Pattern::Type(t) => t.check(value, cx),
        Pattern::Rule(rule) => rule.check_value(value, cx).map(|_| ()),
        Pattern::SelfRef => match cx.root {
            Some(root) => check(value, root, cx),
            None => Ok(()),
        },
    }
}

/// Check a mapping literal: declared keys must be present (unless gated by
/// a rule) and match; strict mode rejects undeclared keys.
pub(crate) fn check_map(
    value: &Value,
    entries: &IndexMap<String, Pattern>,
    cx: &CheckCtx,
) -> Result<(), TyError> {
    let obj = value
        .as_object()
        .ok_or_else(|| TyError::new(ErrorKind::Mistaken, value, "Object"))?;

    for (key, sub) in entries {
        match sub {
            Pattern::Rule(rule) => {
                rule.check_entry(value, key, cx)?;
            }
            _ => match obj.get(key) {
                None => {
                    return Err(TyError::new(ErrorKind::Missing, &Value::Null, sub.describe())
                        .at(Seg::Key(key.clone())));
                }
                Some(v) => check(v, sub, cx).map_err(|e| e.at(Seg::Key(key.clone())))?,
            },
        }
    }

    if cx.mode == Mode::Strict {
        for key in obj.keys() {
            if !entries.contains_key(key) {
                let described = Pattern::Map(entries.clone()).describe();
                return Err(
                    TyError::new(ErrorKind::Dirty, &obj[key], described).at(Seg::Key(key.clone()))
                );
            }
        }
    }

    Ok(())
}

/// Check a sequence literal: every element matches one of the patterns.
fn check_items(value: &Value, patterns: &[Pattern], cx: &CheckCtx) -> Result<(), TyError> {
    let arr = value
        .as_array()
        .ok_or_else(|| TyError::new(ErrorKind::Mistaken, value, "Array"))?;

    for (i, item) in arr.iter().enumerate() {
        if patterns.len() == 1 {
            check(item, &patterns[0], cx).map_err(|e| e.at(Seg::Index(i)))?;
        } else if !patterns.iter().any(|p| check(item, p, cx).is_ok()) {
            let described = Pattern::items(patterns.to_vec()).describe();
            return Err(TyError::new(ErrorKind::Mistaken, item, described).at(Seg::Index(i)));
        }
    }

    Ok(())
}
