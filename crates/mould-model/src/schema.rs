//! The schema engine: per-field meta evaluation.
//!
//! Every meta invocation is wrapped in one guard helper that enforces the
//! "collect, never throw from a meta" policy: a fault is normalized to
//! `{key, meta, error}`, routed through the model's error hook and the
//! field's `catch` sink, and the operation proceeds with its documented
//! fallback.

use crate::error::{Issue, IssueKind, MetaResult, ModelError};
use crate::meta::{DropMeta, FieldDef, Guard, Validator, ValidatorMessage, Verdict};
use crate::model::Model;
use indexmap::IndexMap;
use mould_ty::Pattern;
use serde_json::{Map, Value};

/// Which validators a scoped validation run executes.
pub enum ValidatorSelection {
    /// Ad-hoc validators supplied by the caller.
    Adhoc(Vec<Validator>),
    /// The `[start, end)` index span of the field's validators.
    Span(usize, usize),
    /// Specific indices of the field's validators.
    Indices(Vec<usize>),
}

/// An ordered mapping from field name to its decoded descriptor.
#[derive(Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field (builder).
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    /// Field names in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn field_def(&self, key: &str) -> Option<&FieldDef> {
        self.fields.get(key)
    }

    pub(crate) fn is_computed(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(FieldDef::is_computed)
    }

    pub(crate) fn computed_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, f)| f.is_computed())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Produce the field's default value; producers run fresh, literal
    /// objects and arrays clone, so instances never share mutable defaults.
    pub fn default_of(&self, key: &str) -> Value {
        self.fields
            .get(key)
            .and_then(|f| f.default.as_ref())
            .map(|d| d.produce())
            .unwrap_or(Value::Null)
    }

    /// The single meta-fault routing helper. Runs `run`; on a fault the
    /// normalized error goes through the model's error hook, then the
    /// field's `catch` sink may supply a fallback value handed to
    /// `recover`.
    pub(crate) fn guard<T>(
        &self,
        model: &Model,
        key: &str,
        meta: &str,
        run: impl FnOnce() -> MetaResult<T>,
        recover: impl FnOnce(Option<Value>) -> T,
    ) -> T {
        match run() {
            Ok(v) => v,
            Err(error) => {
                let err = ModelError::Meta {
                    key: key.to_owned(),
                    meta: meta.to_owned(),
                    error,
                };
                let err = model.intercept(err);
                let fallback = self
                    .fields
                    .get(key)
                    .and_then(|f| f.catch.as_ref())
                    .and_then(|catch| catch(&err));
                recover(fallback)
            }
        }
    }

    fn resolve_guard(&self, model: &Model, key: &str, meta: &str, guard: &Guard) -> bool {
        if guard.is_off() {
            return false;
        }
        self.guard(
            model,
            key,
            meta,
            || guard.evaluate(model),
            |fb| fb.and_then(|v| v.as_bool()).unwrap_or(false),
        )
    }

    /// Resolve the `required` tri-form to `(state, message)`.
    pub(crate) fn required(&self, key: &str, model: &Model) -> (bool, Option<String>) {
        let Some(field) = self.fields.get(key) else {
            return (false, None);
        };
        let on = self.resolve_guard(model, key, "required", &field.required);
        (on, field.required.message().map(str::to_owned))
    }

    pub(crate) fn readonly(&self, key: &str, model: &Model) -> bool {
        self.fields
            .get(key)
            .is_some_and(|f| self.resolve_guard(model, key, "readonly", &f.readonly))
    }

    pub(crate) fn disabled(&self, key: &str, model: &Model) -> bool {
        self.fields
            .get(key)
            .is_some_and(|f| self.resolve_guard(model, key, "disabled", &f.disabled))
    }

    pub(crate) fn hidden(&self, key: &str, model: &Model) -> bool {
        self.fields
            .get(key)
            .is_some_and(|f| self.resolve_guard(model, key, "hidden", &f.hidden))
    }

    /// Evaluate the `compute` meta, if the field has one.
    pub(crate) fn compute_value(&self, key: &str, model: &Model) -> Option<Value> {
        let field = self.fields.get(key)?;
        let compute = field.compute.clone()?;
        Some(self.guard(
            model,
            key,
            "compute",
            || compute(model),
            |fb| fb.unwrap_or(Value::Null),
        ))
    }

    /// Read path: compute ignores the stored value; otherwise the getter
    /// transforms it.
    pub(crate) fn get(&self, key: &str, stored: &Value, model: &Model) -> Value {
        let Some(field) = self.fields.get(key) else {
            return stored.clone();
        };
        if field.is_computed() {
            return self.compute_value(key, model).unwrap_or(Value::Null);
        }
        match field.getter.clone() {
            Some(getter) => self.guard(
                model,
                key,
                "getter",
                || getter(stored, model),
                |fb| fb.unwrap_or_else(|| stored.clone()),
            ),
            None => stored.clone(),
        }
    }

    /// Raw write path: apply the setter, then enforce the type. A rule
    /// type checks against the parent data view (and may coerce); a plain
    /// type checks the bare value. Type failures are routed and the value
    /// passes through.
    pub(crate) fn set_raw(&self, key: &str, value: Value, model: &Model) -> Value {
        let Some(field) = self.fields.get(key) else {
            return value;
        };
        if field.is_computed() {
            model.emit_error(ModelError::ComputeWrite { key: key.to_owned() });
            return self.compute_value(key, model).unwrap_or(Value::Null);
        }

        let mut next = match field.setter.clone() {
            Some(setter) => self.guard(
                model,
                key,
                "setter",
                || setter(&value, model),
                |fb| fb.unwrap_or_else(|| value.clone()),
            ),
            None => value,
        };

        if let Some(pattern) = &field.ty {
            match pattern {
                Pattern::Rule(rule) => {
                    let mut data = model.data();
                    data[key] = next.clone();
                    match rule.check_field(&data, key) {
                        Ok(outcome) => {
                            if let Some(replacement) = outcome.replacement {
                                next = replacement;
                            }
                        }
                        Err(err) => self.route_type_error(model, key, field, err),
                    }
                }
                _ => {
                    if let Err(err) = pattern.check_value(&next) {
                        self.route_type_error(model, key, field, err);
                    }
                }
            }
        }

        next
    }

    /// Guarded write path: `disabled` then `readonly` refuse the write
    /// (emitting an error and returning `prev` unchanged); otherwise the
    /// raw path runs.
    pub(crate) fn set(&self, key: &str, next: Value, prev: &Value, model: &Model) -> Value {
        if self.disabled(key, model) {
            model.emit_error(ModelError::Disabled { key: key.to_owned() });
            return prev.clone();
        }
        if self.readonly(key, model) {
            model.emit_error(ModelError::Readonly { key: key.to_owned() });
            return prev.clone();
        }
        self.set_raw(key, next, model)
    }

    fn route_type_error(&self, model: &Model, key: &str, field: &FieldDef, err: mould_ty::TyError) {
        let err = match &field.message {
            Some(message) => err.with_message(message.clone()),
            None => err,
        };
        model.emit_error(ModelError::Type {
            key: key.to_owned(),
            error: err,
        });
    }

    /// Full validation of one field value: disabled short-circuits;
    /// `required` fires once on an empty value; then the type; then each
    /// validator in order.
    pub(crate) fn validate_value(&self, key: &str, value: &Value, model: &Model) -> Vec<Issue> {
        let Some(field) = self.fields.get(key) else {
            return Vec::new();
        };
        if self.disabled(key, model) {
            return Vec::new();
        }

        let mut issues = Vec::new();

        let (required, message) = self.required(key, model);
        if required && is_empty(value) {
            let message = message.unwrap_or_else(|| format!("{key} is required"));
            issues.push(Issue::new(key, IssueKind::Required, message));
            return issues;
        }

        if let Some(pattern) = &field.ty {
            let failed = match pattern {
                Pattern::Rule(rule) => {
                    let mut data = model.data();
                    data[key] = value.clone();
                    rule.check_field(&data, key).err()
                }
                _ => pattern.check_value(value).err(),
            };
            if let Some(err) = failed {
                let message = field
                    .message
                    .clone()
                    .unwrap_or_else(|| err.to_string());
                issues.push(Issue::new(key, IssueKind::Type, message));
            }
        }

        issues.extend(self.run_validators(
            key,
            value,
            model,
            field.validators.iter().enumerate(),
        ));
        issues
    }

    /// Validators-only run (the view `errors` projection: excludes the
    /// required and type checks).
    pub(crate) fn validators_only(&self, key: &str, value: &Value, model: &Model) -> Vec<Issue> {
        let Some(field) = self.fields.get(key) else {
            return Vec::new();
        };
        if self.disabled(key, model) {
            return Vec::new();
        }
        self.run_validators(key, value, model, field.validators.iter().enumerate())
    }

    /// Scoped validation: ad-hoc validators, an index span, or an index
    /// list.
    pub(crate) fn validate_selected(
        &self,
        key: &str,
        value: &Value,
        model: &Model,
        selection: &ValidatorSelection,
    ) -> Vec<Issue> {
        let Some(field) = self.fields.get(key) else {
            return Vec::new();
        };
        if self.disabled(key, model) {
            return Vec::new();
        }
        match selection {
            ValidatorSelection::Adhoc(validators) => {
                self.run_validators(key, value, model, validators.iter().enumerate())
            }
            ValidatorSelection::Span(start, end) => {
                let end = (*end).min(field.validators.len());
                if *start >= end {
                    return Vec::new();
                }
                self.run_validators(
                    key,
                    value,
                    model,
                    field.validators[*start..end]
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (i + start, v)),
                )
            }
            ValidatorSelection::Indices(indices) => self.run_validators(
                key,
                value,
                model,
                indices
                    .iter()
                    .filter_map(|&i| field.validators.get(i).map(|v| (i, v))),
            ),
        }
    }

    fn run_validators<'v>(
        &self,
        key: &str,
        value: &Value,
        model: &Model,
        validators: impl IntoIterator<Item = (usize, &'v Validator)>,
    ) -> Vec<Issue> {
        let mut issues = Vec::new();
        for (index, validator) in validators {
            if let Some(determine) = &validator.determine {
                if !determine(value, model) {
                    continue;
                }
            }
            match (validator.validate)(value, model) {
                Verdict::Pass => {}
                Verdict::Fail => {
                    let message = resolve_message(validator, value, key, index, None);
                    issues.push(Issue::new(key, IssueKind::Validator, message).at(index));
                }
                Verdict::FailWith(text) => {
                    let message = resolve_message(validator, value, key, index, Some(text));
                    issues.push(Issue::new(key, IssueKind::Validator, message).at(index));
                }
                Verdict::Nested(nested) => issues.extend(nested),
            }
        }
        issues
    }

    /// Deserialization: per field, `create` else the raw value; a missing
    /// result falls back to the default; the result then runs through the
    /// raw write path, so the stored form is post-setter and the type is
    /// checked with errors routed and the value passing through. Computed
    /// fields are not stored and are skipped.
    pub(crate) fn parse(&self, data: &Value, model: &Model) -> Value {
        let mut out = Map::new();
        for (key, field) in &self.fields {
            if field.is_computed() {
                continue;
            }
            let raw = data.get(key.as_str());
            let value = match field.create.clone() {
                Some(create) => self.guard(
                    model,
                    key,
                    "create",
                    || create(data, key, raw.unwrap_or(&Value::Null)),
                    |fb| fb,
                ),
                None => raw.cloned(),
            };
            let value = value.unwrap_or_else(|| self.default_of(key));
            out.insert(key.clone(), self.set_raw(key, value, model));
        }
        Value::Object(out)
    }

    /// Serialization: `flat` merges into a patch map; disabled or dropped
    /// fields are skipped; `map` transforms the emitted value. The final
    /// output is the per-field base merged with the patch, patch winning.
    pub(crate) fn export(&self, data: &Value, model: &Model) -> Value {
        let mut output = Map::new();
        let mut patch = Map::new();

        for (key, field) in &self.fields {
            let value = data.get(key.as_str()).cloned().unwrap_or(Value::Null);

            if let Some(flat) = field.flat.clone() {
                let entries = self.guard(
                    model,
                    key,
                    "flat",
                    || flat(&value, key, data),
                    |_| Map::new(),
                );
                patch.extend(entries);
            }

            if self.disabled(key, model) {
                continue;
            }
            let dropped = match field.drop.clone() {
                Some(DropMeta::Flag(flag)) => flag,
                Some(DropMeta::Fn(f)) => self.guard(
                    model,
                    key,
                    "drop",
                    || f(&value, key, data),
                    |fb| fb.and_then(|v| v.as_bool()).unwrap_or(false),
                ),
                None => false,
            };
            if dropped {
                continue;
            }

            let emitted = match field.map.clone() {
                Some(map) => self.guard(
                    model,
                    key,
                    "map",
                    || map(&value, key, data),
                    |fb| fb.unwrap_or_else(|| value.clone()),
                ),
                None => value,
            };
            output.insert(key.clone(), emitted);
        }

        for (k, v) in patch {
            output.insert(k, v);
        }
        Value::Object(output)
    }
}

/// Message resolution: the validator's message meta wins (closures are
/// called with `(value, key)`); a `FailWith` text comes next; the fallback
/// is templated.
fn resolve_message(
    validator: &Validator,
    value: &Value,
    key: &str,
    index: usize,
    verdict_text: Option<String>,
) -> String {
    match &validator.message {
        Some(ValidatorMessage::Text(text)) => text.clone(),
        Some(ValidatorMessage::Fn(f)) => f(value, key),
        None => verdict_text.unwrap_or_else(|| format!("{key} did not pass validator {index}")),
    }
}

/// Empty per the `required` semantics: null, empty string, empty array,
/// empty object.
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_values() {
        assert!(is_empty(&json!(null)));
        assert!(is_empty(&json!("")));
        assert!(is_empty(&json!([])));
        assert!(is_empty(&json!({})));
        assert!(!is_empty(&json!(0)));
        assert!(!is_empty(&json!(false)));
        assert!(!is_empty(&json!("x")));
    }

    #[test]
    fn schema_declares_ordered_fields() {
        let schema = Schema::new()
            .field("b", FieldDef::new())
            .field("a", FieldDef::new());
        let keys: Vec<&str> = schema.keys().collect();
        assert_eq!(keys, ["b", "a"]);
        assert!(schema.has("a"));
        assert!(!schema.has("c"));
    }

    #[test]
    fn default_of_missing_field_is_null() {
        let schema = Schema::new().field("a", FieldDef::new().default(json!(1)));
        assert_eq!(schema.default_of("a"), json!(1));
        assert_eq!(schema.default_of("zzz"), json!(null));
    }
}
