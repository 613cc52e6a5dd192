//! Field descriptors: the meta bag, decoded once at schema construction.
//!
//! Each meta's runtime variance (boolean | string | closure |
//! `{determine, message}`) is decoded into a tagged variant when the
//! [`FieldDef`] is built, never re-parsed per access.

use crate::error::{Issue, MetaResult, ModelError};
use crate::model::Model;
use crate::store::Change;
use indexmap::IndexMap;
use mould_ty::Pattern;
use serde_json::{Map, Value};
use std::rc::Rc;

pub(crate) type ComputeFn = Rc<dyn Fn(&Model) -> MetaResult<Value>>;
pub(crate) type TransformFn = Rc<dyn Fn(&Value, &Model) -> MetaResult<Value>>;
pub(crate) type CreateFn = Rc<dyn Fn(&Value, &str, &Value) -> MetaResult<Option<Value>>>;
pub(crate) type MapFn = Rc<dyn Fn(&Value, &str, &Value) -> MetaResult<Value>>;
pub(crate) type FlatFn = Rc<dyn Fn(&Value, &str, &Value) -> MetaResult<Map<String, Value>>>;
pub(crate) type DropFn = Rc<dyn Fn(&Value, &str, &Value) -> MetaResult<bool>>;
pub(crate) type GuardFn = Rc<dyn Fn(&Model) -> MetaResult<bool>>;
pub(crate) type WatchFn = Rc<dyn Fn(&Model, &Change)>;
pub(crate) type CatchFn = Rc<dyn Fn(&ModelError) -> Option<Value>>;
pub(crate) type DefaultFn = Rc<dyn Fn() -> Value>;
pub(crate) type MetaValueFn = Rc<dyn Fn(&Model) -> Value>;

/// A tri-form boolean meta: `required`, `readonly`, `disabled`, `hidden`.
///
/// A string in the meta position is truthy-with-message; a closure decides
/// per access; `when` pairs a determine closure with a message.
#[derive(Clone, Default)]
pub enum Guard {
    /// Absent or false.
    #[default]
    Off,
    /// Unconditionally on.
    On,
    /// On, with a message.
    Message(String),
    /// Decided per access against the owning model.
    By(GuardFn),
    /// Decided per access, with a message when it holds.
    When { determine: GuardFn, message: String },
}

impl Guard {
    /// Build a `By` guard from an infallible closure.
    pub fn by(f: impl Fn(&Model) -> bool + 'static) -> Self {
        Guard::By(Rc::new(move |m| Ok(f(m))))
    }

    /// Build a `When` guard from an infallible closure and a message.
    pub fn when(f: impl Fn(&Model) -> bool + 'static, message: impl Into<String>) -> Self {
        Guard::When {
            determine: Rc::new(move |m| Ok(f(m))),
            message: message.into(),
        }
    }

    /// Build a `By` guard from a fallible closure; evaluation faults are
    /// routed and fall back to false.
    pub fn try_by(f: impl Fn(&Model) -> MetaResult<bool> + 'static) -> Self {
        Guard::By(Rc::new(f))
    }

    pub(crate) fn is_off(&self) -> bool {
        matches!(self, Guard::Off)
    }

    /// The message carried by the guard, if any.
    pub(crate) fn message(&self) -> Option<&str> {
        match self {
            Guard::Message(m) => Some(m),
            Guard::When { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Raw evaluation without routing. The schema wraps this in its guard
    /// helper so faults reach `catch` and the error hook.
    pub(crate) fn evaluate(&self, model: &Model) -> MetaResult<bool> {
        match self {
            Guard::Off => Ok(false),
            Guard::On | Guard::Message(_) => Ok(true),
            Guard::By(f) => f(model),
            Guard::When { determine, .. } => determine(model),
        }
    }
}

impl From<bool> for Guard {
    fn from(on: bool) -> Self {
        if on {
            Guard::On
        } else {
            Guard::Off
        }
    }
}

impl From<&str> for Guard {
    fn from(message: &str) -> Self {
        Guard::Message(message.to_owned())
    }
}

impl From<String> for Guard {
    fn from(message: String) -> Self {
        Guard::Message(message)
    }
}

/// The `default` meta: a value or a zero-argument producer.
#[derive(Clone)]
pub(crate) enum DefaultMeta {
    Value(Value),
    Producer(DefaultFn),
}

impl DefaultMeta {
    /// Produce a fresh default. Object and array values are cloned so
    /// instances never share mutable defaults.
    pub(crate) fn produce(&self) -> Value {
        match self {
            DefaultMeta::Value(v) => v.clone(),
            DefaultMeta::Producer(f) => f(),
        }
    }
}

/// The `drop` meta: a flag or a `(value, key, data)` predicate.
#[derive(Clone)]
pub(crate) enum DropMeta {
    Flag(bool),
    Fn(DropFn),
}

/// An extra meta surfaced on views: a literal or computed per access.
#[derive(Clone)]
pub enum MetaValue {
    Value(Value),
    Fn(MetaValueFn),
}

impl MetaValue {
    pub(crate) fn resolve(&self, model: &Model) -> Value {
        match self {
            MetaValue::Value(v) => v.clone(),
            MetaValue::Fn(f) => f(model),
        }
    }
}

/// Message of a validator: static text or computed from `(value, key)`.
#[derive(Clone)]
pub enum ValidatorMessage {
    Text(String),
    Fn(Rc<dyn Fn(&Value, &str) -> String>),
}

/// Outcome of one validator run.
pub enum Verdict {
    /// The value is acceptable.
    Pass,
    /// Rejected; the validator's message applies.
    Fail,
    /// Rejected with a specific message.
    FailWith(String),
    /// A nested submodel produced its own issues; they are spliced in.
    Nested(Vec<Issue>),
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

/// One entry of the `validators` meta.
#[derive(Clone)]
pub struct Validator {
    pub(crate) determine: Option<Rc<dyn Fn(&Value, &Model) -> bool>>,
    pub(crate) validate: Rc<dyn Fn(&Value, &Model) -> Verdict>,
    pub(crate) message: Option<ValidatorMessage>,
}

impl Validator {
    /// Build a validator from a check returning a [`Verdict`] (or bool).
    pub fn new<V: Into<Verdict>>(check: impl Fn(&Value, &Model) -> V + 'static) -> Self {
        Self {
            determine: None,
            validate: Rc::new(move |v, m| check(v, m).into()),
            message: None,
        }
    }

    /// Gate the validator: it runs only when `determine` returns true.
    pub fn determine(mut self, f: impl Fn(&Value, &Model) -> bool + 'static) -> Self {
        self.determine = Some(Rc::new(f));
        self
    }

    /// Static failure message.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(ValidatorMessage::Text(text.into()));
        self
    }

    /// Computed failure message from `(value, key)`.
    pub fn message_with(mut self, f: impl Fn(&Value, &str) -> String + 'static) -> Self {
        self.message = Some(ValidatorMessage::Fn(Rc::new(f)));
        self
    }
}

/// Which extra metas are exposed on views.
#[derive(Clone, Default)]
pub enum MetasFilter {
    /// No extra metas are exposed.
    #[default]
    None,
    /// Only the named metas, when present.
    Names(Vec<String>),
    /// Named metas with fallback defaults; a `Null` default means
    /// "only if present".
    Defaults(IndexMap<String, Value>),
}

impl MetasFilter {
    /// Build a name-list filter.
    pub fn names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        MetasFilter::Names(names.into_iter().map(Into::into).collect())
    }

    /// Build a defaults-map filter.
    pub fn defaults<S: Into<String>>(entries: impl IntoIterator<Item = (S, Value)>) -> Self {
        MetasFilter::Defaults(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub(crate) fn allowed(&self) -> Vec<(&str, Option<&Value>)> {
        match self {
            MetasFilter::None => Vec::new(),
            MetasFilter::Names(names) => names.iter().map(|n| (n.as_str(), None)).collect(),
            MetasFilter::Defaults(map) => {
                map.iter().map(|(n, d)| (n.as_str(), Some(d))).collect()
            }
        }
    }
}

/// A field descriptor: the decoded meta bag of one schema field.
#[derive(Clone, Default)]
pub struct FieldDef {
    pub(crate) default: Option<DefaultMeta>,
    pub(crate) ty: Option<Pattern>,
    pub(crate) message: Option<String>,
    pub(crate) compute: Option<ComputeFn>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) create: Option<CreateFn>,
    pub(crate) drop: Option<DropMeta>,
    pub(crate) map: Option<MapFn>,
    pub(crate) flat: Option<FlatFn>,
    pub(crate) getter: Option<TransformFn>,
    pub(crate) setter: Option<TransformFn>,
    pub(crate) required: Guard,
    pub(crate) readonly: Guard,
    pub(crate) disabled: Guard,
    pub(crate) hidden: Guard,
    pub(crate) watch: Option<WatchFn>,
    pub(crate) catch: Option<CatchFn>,
    pub(crate) extra: IndexMap<String, MetaValue>,
}

impl FieldDef {
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    /// Default value; objects and arrays are cloned per instantiation.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultMeta::Value(value.into()));
        self
    }

    /// Default produced by a zero-argument closure at init and restore.
    pub fn default_with(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(DefaultMeta::Producer(Rc::new(f)));
        self
    }

    /// Pattern enforced on writes and validation.
    pub fn ty(mut self, pattern: impl Into<Pattern>) -> Self {
        self.ty = Some(pattern.into());
        self
    }

    /// Default message for a type failure.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }

    /// Derived value; the field becomes read-only and is recomputed when a
    /// dependency changes.
    pub fn compute(mut self, f: impl Fn(&Model) -> Value + 'static) -> Self {
        self.compute = Some(Rc::new(move |m| Ok(f(m))));
        self
    }

    /// Fallible variant of [`FieldDef::compute`]; faults route through the
    /// field's `catch` and the model's error hook.
    pub fn try_compute(mut self, f: impl Fn(&Model) -> MetaResult<Value> + 'static) -> Self {
        self.compute = Some(Rc::new(f));
        self
    }

    /// Append a validator.
    pub fn validator(mut self, v: Validator) -> Self {
        self.validators.push(v);
        self
    }

    /// Append several validators.
    pub fn validators(mut self, vs: impl IntoIterator<Item = Validator>) -> Self {
        self.validators.extend(vs);
        self
    }

    /// Deserialization transform, `(json, key, value)`; `None` falls back
    /// to the default.
    pub fn create(
        mut self,
        f: impl Fn(&Value, &str, &Value) -> Option<Value> + 'static,
    ) -> Self {
        self.create = Some(Rc::new(move |j, k, v| Ok(f(j, k, v))));
        self
    }

    /// Unconditionally drop the field from exports.
    pub fn drop_on_export(mut self, flag: bool) -> Self {
        self.drop = Some(DropMeta::Flag(flag));
        self
    }

    /// Drop the field from exports when the predicate holds.
    pub fn drop_when(mut self, f: impl Fn(&Value, &str, &Value) -> bool + 'static) -> Self {
        self.drop = Some(DropMeta::Fn(Rc::new(move |v, k, d| Ok(f(v, k, d)))));
        self
    }

    /// Serialization transform applied to the exported value.
    pub fn map(mut self, f: impl Fn(&Value, &str, &Value) -> Value + 'static) -> Self {
        self.map = Some(Rc::new(move |v, k, d| Ok(f(v, k, d))));
        self
    }

    /// Serialization expansion: the returned entries are merged over the
    /// exported object (they win over per-field output).
    pub fn flat(
        mut self,
        f: impl Fn(&Value, &str, &Value) -> Map<String, Value> + 'static,
    ) -> Self {
        self.flat = Some(Rc::new(move |v, k, d| Ok(f(v, k, d))));
        self
    }

    /// Read transform between store and caller.
    pub fn getter(mut self, f: impl Fn(&Value, &Model) -> Value + 'static) -> Self {
        self.getter = Some(Rc::new(move |v, m| Ok(f(v, m))));
        self
    }

    /// Fallible read transform.
    pub fn try_getter(mut self, f: impl Fn(&Value, &Model) -> MetaResult<Value> + 'static) -> Self {
        self.getter = Some(Rc::new(f));
        self
    }

    /// Write transform between caller and store.
    pub fn setter(mut self, f: impl Fn(&Value, &Model) -> Value + 'static) -> Self {
        self.setter = Some(Rc::new(move |v, m| Ok(f(v, m))));
        self
    }

    /// Fallible write transform.
    pub fn try_setter(mut self, f: impl Fn(&Value, &Model) -> MetaResult<Value> + 'static) -> Self {
        self.setter = Some(Rc::new(f));
        self
    }

    /// `required` tri-form: empty value yields one validation error.
    pub fn required(mut self, guard: impl Into<Guard>) -> Self {
        self.required = guard.into();
        self
    }

    /// `readonly` tri-form: reads, validation and export work, writes are
    /// rejected.
    pub fn readonly(mut self, guard: impl Into<Guard>) -> Self {
        self.readonly = guard.into();
        self
    }

    /// `disabled` tri-form: writes rejected, validation empty, export
    /// drops the field.
    pub fn disabled(mut self, guard: impl Into<Guard>) -> Self {
        self.disabled = guard.into();
        self
    }

    /// `hidden` tri-form, surfaced only on views.
    pub fn hidden(mut self, guard: impl Into<Guard>) -> Self {
        self.hidden = guard.into();
        self
    }

    /// Field-scoped reaction to writes.
    pub fn watch(mut self, f: impl Fn(&Model, &Change) + 'static) -> Self {
        self.watch = Some(Rc::new(f));
        self
    }

    /// Per-field error sink; may supply a fallback value for the failed
    /// meta.
    pub fn catch(mut self, f: impl Fn(&ModelError) -> Option<Value> + 'static) -> Self {
        self.catch = Some(Rc::new(f));
        self
    }

    /// Attach an arbitrary extra meta (exposed on views when allowed).
    pub fn meta(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), MetaValue::Value(value.into()));
        self
    }

    /// Attach a computed extra meta.
    pub fn meta_with(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Model) -> Value + 'static,
    ) -> Self {
        self.extra.insert(name.into(), MetaValue::Fn(Rc::new(f)));
        self
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.compute.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guard_forms_decode() {
        assert!(Guard::from(false).is_off());
        assert!(!Guard::from(true).is_off());
        let g = Guard::from("must fill");
        assert_eq!(g.message(), Some("must fill"));
    }

    #[test]
    fn default_meta_produces_fresh_values() {
        let d = DefaultMeta::Value(json!({"tags": []}));
        let a = d.produce();
        let b = d.produce();
        assert_eq!(a, b);

        let d = DefaultMeta::Producer(Rc::new(|| json!([1, 2])));
        assert_eq!(d.produce(), json!([1, 2]));
    }

    #[test]
    fn metas_filter_shapes() {
        let f = MetasFilter::names(["placeholder"]);
        assert_eq!(f.allowed().len(), 1);

        let f = MetasFilter::defaults([("placeholder", json!("...")), ("unit", json!(null))]);
        let allowed = f.allowed();
        assert_eq!(allowed[0], ("placeholder", Some(&json!("..."))));
        assert_eq!(allowed[1], ("unit", Some(&json!(null))));
    }
}
