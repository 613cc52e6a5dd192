//! Field projections consumed by UI layers.
//!
//! A [`FieldView`] is a live, borrowed projection of one field: it observes
//! the model and computes everything on access, owning nothing. The
//! [`Views`] mapping adds the `errors` aggregate concatenating every
//! field's validator issues in schema order.

use crate::error::Issue;
use crate::meta::MetasFilter;
use crate::model::Model;
use indexmap::IndexMap;
use serde_json::Value;

/// A live projection of one field.
pub struct FieldView<'m> {
    model: &'m Model,
    key: String,
}

impl<'m> FieldView<'m> {
    pub(crate) fn new(model: &'m Model, key: &str) -> Self {
        Self {
            model,
            key: key.to_owned(),
        }
    }

    /// The field name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The user-facing value (compute or getter applied).
    pub fn value(&self) -> Value {
        self.model.get(&self.key)
    }

    /// Write through the schema, with the usual refusal semantics.
    pub fn set(&self, value: impl Into<Value>) {
        self.model.set(&self.key, value);
    }

    pub fn required(&self) -> bool {
        self.model.schema().required(&self.key, self.model).0
    }

    pub fn readonly(&self) -> bool {
        self.model.schema().readonly(&self.key, self.model)
    }

    pub fn disabled(&self) -> bool {
        self.model.schema().disabled(&self.key, self.model)
    }

    pub fn hidden(&self) -> bool {
        self.model.schema().hidden(&self.key, self.model)
    }

    /// Whether the field was written since the last restore or commit.
    pub fn changed(&self) -> bool {
        self.model.was_changed(&self.key)
    }

    /// Validator-only issues: excludes the required and type checks.
    pub fn errors(&self) -> Vec<Issue> {
        let value = self.model.stored_or_computed(&self.key);
        self.model
            .schema()
            .validators_only(&self.key, &value, self.model)
    }

    /// One extra meta, when the model's metas filter allows it. A filter
    /// default of `Null` means "only if present on the field".
    pub fn meta(&self, name: &str) -> Option<Value> {
        let field = self.model.schema().field_def(&self.key)?;
        for (allowed, fallback) in self.model.metas_filter().allowed() {
            if allowed != name {
                continue;
            }
            if let Some(meta) = field.extra.get(name) {
                return Some(meta.resolve(self.model));
            }
            return match fallback {
                Some(Value::Null) | None => None,
                Some(default) => Some(default.clone()),
            };
        }
        None
    }

    /// Every allowed extra meta that resolves for this field.
    pub fn metas(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        if matches!(self.model.metas_filter(), MetasFilter::None) {
            return out;
        }
        for (name, _) in self.model.metas_filter().allowed() {
            if let Some(value) = self.meta(name) {
                out.insert(name.to_owned(), value);
            }
        }
        out
    }
}

/// The field-name → view mapping plus the aggregate error list.
pub struct Views<'m> {
    model: &'m Model,
}

impl<'m> Views<'m> {
    pub(crate) fn new(model: &'m Model) -> Self {
        Self { model }
    }

    /// The view of one field.
    pub fn view(&self, key: &str) -> Option<FieldView<'m>> {
        self.model.view(key)
    }

    /// Field names in schema order.
    pub fn keys(&self) -> Vec<String> {
        self.model.schema().keys().map(str::to_owned).collect()
    }

    /// Concatenation of every field's validator issues, in schema order.
    pub fn errors(&self) -> Vec<Issue> {
        self.keys()
            .iter()
            .filter_map(|k| self.view(k))
            .flat_map(|v| v.errors())
            .collect()
    }
}
