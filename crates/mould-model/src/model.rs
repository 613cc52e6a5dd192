//! The model orchestrator: one schema, one exclusively-owned store.
//!
//! Reads go through `Schema::get`, writes through `Schema::set`, both
//! evaluated against this model. Computed fields are dependency-tracked
//! through the store and refreshed once per write batch, firing their
//! watchers only when the derived value actually changed.

use crate::error::ModelError;
use crate::meta::MetasFilter;
use crate::schema::{Schema, ValidatorSelection};
use crate::store::{Change, Store, WatchSpec, WatcherId};
use crate::view::{FieldView, Views};
use crate::Issue;
use indexmap::IndexMap;
use mould_ty::Path;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

type ErrorHook = Rc<dyn Fn(&ModelError) -> Option<ModelError>>;
type SwitchHook = Rc<dyn Fn(&mut Value)>;
type ParseHook = Rc<dyn Fn(&Value) -> Value>;
type ExportHook = Rc<dyn Fn(Value) -> Value>;

#[derive(Clone)]
struct ComputedSlot {
    value: Value,
    deps: HashSet<Path>,
}

/// A reactive, schema-governed data container.
pub struct Model {
    schema: Rc<Schema>,
    store: Store,
    state_keys: Vec<String>,
    initial_state: IndexMap<String, Value>,
    metas_filter: MetasFilter,
    on_error: Option<ErrorHook>,
    on_switch: Option<SwitchHook>,
    on_parse: Option<ParseHook>,
    on_export: Option<ExportHook>,
    locked: Cell<bool>,
    changed: RefCell<HashSet<String>>,
    computed: RefCell<HashMap<String, ComputedSlot>>,
    computing: RefCell<HashSet<String>>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("state_keys", &self.state_keys)
            .field("initial_state", &self.initial_state)
            .field("locked", &self.locked)
            .field("changed", &self.changed)
            .field("computing", &self.computing)
            .finish()
    }
}

/// Builder for a [`Model`]: non-schema state entries, the view metas
/// filter, and the overridable hooks.
pub struct ModelBuilder {
    schema: Schema,
    state: IndexMap<String, Value>,
    metas: MetasFilter,
    on_error: Option<ErrorHook>,
    on_switch: Option<SwitchHook>,
    on_parse: Option<ParseHook>,
    on_export: Option<ExportHook>,
}

impl ModelBuilder {
    /// Add a non-schema mutable state entry. Colliding with a schema field
    /// is a construction error.
    pub fn state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Set the view metas filter.
    pub fn metas(mut self, filter: MetasFilter) -> Self {
        self.metas = filter;
        self
    }

    /// Observe emitted errors. The default logs through `tracing`.
    pub fn on_error(mut self, f: impl Fn(&ModelError) + 'static) -> Self {
        self.on_error = Some(Rc::new(move |e| {
            f(e);
            None
        }));
        self
    }

    /// Observe emitted errors with the option to substitute them before
    /// they reach the field `catch` sinks.
    pub fn on_error_map(mut self, f: impl Fn(&ModelError) -> Option<ModelError> + 'static) -> Self {
        self.on_error = Some(Rc::new(f));
        self
    }

    /// Pre-hook of `restore`; may rewrite the incoming data in place.
    pub fn on_switch(mut self, f: impl Fn(&mut Value) + 'static) -> Self {
        self.on_switch = Some(Rc::new(f));
        self
    }

    /// Transform raw JSON before `from_json` parses it.
    pub fn on_parse(mut self, f: impl Fn(&Value) -> Value + 'static) -> Self {
        self.on_parse = Some(Rc::new(f));
        self
    }

    /// Transform the exported document of `to_json`.
    pub fn on_export(mut self, f: impl Fn(Value) -> Value + 'static) -> Self {
        self.on_export = Some(Rc::new(f));
        self
    }

    /// Build with schema defaults.
    pub fn build(self) -> Result<Model, ModelError> {
        self.build_from(&Value::Object(Map::new()))
    }

    /// Build, seeding the store from `input` through `Schema::parse`.
    pub fn build_from(self, input: &Value) -> Result<Model, ModelError> {
        for key in self.state.keys() {
            if self.schema.has(key) {
                return Err(ModelError::StateCollision { key: key.clone() });
            }
        }

        let model = Model {
            schema: Rc::new(self.schema),
            store: Store::new(Value::Object(Map::new())),
            state_keys: self.state.keys().cloned().collect(),
            initial_state: self.state.clone(),
            metas_filter: self.metas,
            on_error: self.on_error,
            on_switch: self.on_switch,
            on_parse: self.on_parse,
            on_export: self.on_export,
            locked: Cell::new(false),
            changed: RefCell::new(HashSet::new()),
            computed: RefCell::new(HashMap::new()),
            computing: RefCell::new(HashSet::new()),
        };

        let parsed = model.schema.parse(input, &model);
        let mut doc = parsed.as_object().cloned().unwrap_or_default();
        for (key, value) in &self.state {
            doc.insert(key.clone(), value.clone());
        }
        model.store.replace(Value::Object(doc));
        model.prime_computed();
        Ok(model)
    }
}

impl Model {
    /// Start building a model over a schema.
    pub fn builder(schema: Schema) -> ModelBuilder {
        ModelBuilder {
            schema,
            state: IndexMap::new(),
            metas: MetasFilter::default(),
            on_error: None,
            on_switch: None,
            on_parse: None,
            on_export: None,
        }
    }

    /// Model with schema defaults and no extra configuration.
    pub fn new(schema: Schema) -> Result<Self, ModelError> {
        Self::builder(schema).build()
    }

    /// Model seeded from input data.
    pub fn with_data(schema: Schema, input: &Value) -> Result<Self, ModelError> {
        Self::builder(schema).build_from(input)
    }

    pub(crate) fn schema_rc(&self) -> Rc<Schema> {
        Rc::clone(&self.schema)
    }

    pub(crate) fn store_handle(&self) -> Store {
        self.store.clone()
    }

    /// The schema governing this model.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // -- error routing -----------------------------------------------------

    /// Route an error through the hook; the hook may substitute it. The
    /// default logs a warning.
    pub(crate) fn intercept(&self, err: ModelError) -> ModelError {
        match &self.on_error {
            Some(hook) => hook(&err).unwrap_or(err),
            None => {
                tracing::warn!(error = %err, "model error");
                err
            }
        }
    }

    pub(crate) fn emit_error(&self, err: ModelError) {
        let _ = self.intercept(err);
    }

    // -- access ------------------------------------------------------------

    /// Raw store document (storage representation, post-setter).
    pub fn data(&self) -> Value {
        self.store.snapshot()
    }

    /// User-facing state: getters applied, computed fields materialized,
    /// non-schema state entries included.
    pub fn state(&self) -> Value {
        let mut out = Map::new();
        for key in self.schema.keys().map(str::to_owned).collect::<Vec<_>>() {
            out.insert(key.clone(), self.get(&key));
        }
        for key in &self.state_keys {
            out.insert(
                key.clone(),
                self.store.get(&field_path(key)).unwrap_or(Value::Null),
            );
        }
        Value::Object(out)
    }

    /// Read one field through the schema (compute or getter applied).
    pub fn get(&self, key: &str) -> Value {
        if self.schema.is_computed(key) {
            return self.computed_value(key);
        }
        let stored = self.store.get(&field_path(key)).unwrap_or(Value::Null);
        if self.schema.has(key) {
            self.schema.get(key, &stored, self)
        } else {
            stored
        }
    }

    /// Write one field through the schema. Refusals (locked, readonly,
    /// disabled, computed) keep the prior value and emit an error.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if let Some(change) = self.write_one(key, value.into(), false) {
            self.after_write(vec![change]);
        }
    }

    /// Write bypassing `readonly` and `disabled` (not the lock).
    pub fn set_force(&self, key: &str, value: impl Into<Value>) {
        if let Some(change) = self.write_one(key, value.into(), true) {
            self.after_write(vec![change]);
        }
    }

    /// Batched write: all writes are applied before any watcher fires.
    pub fn update(&self, patch: impl IntoIterator<Item = (String, Value)>) {
        if self.locked.get() {
            self.emit_error(ModelError::Locked { key: "*".into() });
            return;
        }
        self.store.begin_batch();
        let mut changes = Vec::new();
        for (key, value) in patch {
            if let Some(change) = self.write_one(&key, value, false) {
                changes.push(change);
            }
        }
        self.store.end_batch();
        if !changes.is_empty() {
            self.after_write(changes);
        }
    }

    fn write_one(&self, key: &str, value: Value, force: bool) -> Option<Change> {
        if self.locked.get() {
            self.emit_error(ModelError::Locked { key: key.to_owned() });
            return None;
        }
        if !self.schema.has(key) {
            return self.write_state_entry(key, value);
        }
        if self.schema.is_computed(key) {
            self.emit_error(ModelError::ComputeWrite { key: key.to_owned() });
            return None;
        }

        let path = field_path(key);
        let prev = self.store.get(&path).unwrap_or(Value::Null);
        let next = if force {
            self.schema.set_raw(key, value, self)
        } else {
            self.schema.set(key, value, &prev, self)
        };
        if next == prev {
            return None;
        }
        match self.store.set(path.clone(), next.clone()) {
            Ok(_) => Some(Change {
                key: key.to_owned(),
                path,
                value: next,
                prev,
            }),
            Err(e) => {
                self.emit_error(e.into());
                None
            }
        }
    }

    fn write_state_entry(&self, key: &str, value: Value) -> Option<Change> {
        if !self.state_keys.iter().any(|k| k == key) {
            self.emit_error(ModelError::UnknownField { key: key.to_owned() });
            return None;
        }
        let path = field_path(key);
        let prev = self.store.get(&path).unwrap_or(Value::Null);
        if prev == value {
            return None;
        }
        match self.store.set(path.clone(), value.clone()) {
            Ok(_) => Some(Change {
                key: key.to_owned(),
                path,
                value,
                prev,
            }),
            Err(e) => {
                self.emit_error(e.into());
                None
            }
        }
    }

    /// Post-write bookkeeping: mark fields changed, refresh computed
    /// fields once for the whole batch, run field-scoped watch metas.
    fn after_write(&self, changes: Vec<Change>) {
        for change in &changes {
            if self.schema.has(&change.key) {
                self.changed.borrow_mut().insert(change.key.clone());
            }
        }
        let paths: Vec<Path> = changes.iter().map(|c| c.path.clone()).collect();
        let computed_changes = self.refresh_computed(&paths);

        for change in changes.iter().chain(computed_changes.iter()) {
            let watch = self
                .schema
                .field_def(&change.key)
                .and_then(|f| f.watch.clone());
            if let Some(watch) = watch {
                watch(self, change);
            }
        }
    }

    // -- computed fields ---------------------------------------------------

    /// Evaluate every computed field once so dependencies are captured
    /// before the first write.
    fn prime_computed(&self) {
        for key in self.schema.computed_keys() {
            self.evaluate_computed(&key);
        }
    }

    fn computed_value(&self, key: &str) -> Value {
        if let Some(slot) = self.computed.borrow().get(key) {
            // Propagate the cached dependency set to any tracker above us,
            // so a computed field reading this one inherits its deps.
            self.store.record(slot.deps.iter().cloned());
            return slot.value.clone();
        }
        self.evaluate_computed(key)
    }

    fn evaluate_computed(&self, key: &str) -> Value {
        if self.computing.borrow().contains(key) {
            // Cycle: fall back to the cached value.
            return self
                .computed
                .borrow()
                .get(key)
                .map(|s| s.value.clone())
                .unwrap_or(Value::Null);
        }
        self.computing.borrow_mut().insert(key.to_owned());
        let (value, deps) = self
            .store
            .track(|| self.schema.compute_value(key, self).unwrap_or(Value::Null));
        self.computing.borrow_mut().remove(key);
        self.computed.borrow_mut().insert(
            key.to_owned(),
            ComputedSlot {
                value: value.clone(),
                deps: deps.clone(),
            },
        );
        self.store.record(deps);
        value
    }

    /// Recompute fields whose dependencies intersect the written paths.
    /// Each recomputes at most once per batch and emits a change only when
    /// its value differs.
    fn refresh_computed(&self, written: &[Path]) -> Vec<Change> {
        let mut changes = Vec::new();
        for key in self.schema.computed_keys() {
            let slot = self.computed.borrow().get(&key).cloned();
            let Some(slot) = slot else {
                self.evaluate_computed(&key);
                continue;
            };
            let hit = written.iter().any(|w| {
                slot.deps
                    .iter()
                    .any(|d| d.is_prefix_of(w) || w.is_prefix_of(d))
            });
            if !hit {
                continue;
            }
            let value = self.evaluate_computed(&key);
            if value != slot.value {
                let change = Change {
                    key: key.clone(),
                    path: field_path(&key),
                    value,
                    prev: slot.value,
                };
                self.store.emit(change.clone());
                changes.push(change);
            }
        }
        changes
    }

    // -- validation --------------------------------------------------------

    /// Validate the whole model, aggregating issues in schema order.
    pub fn validate(&self) -> Vec<Issue> {
        self.schema
            .keys()
            .map(str::to_owned)
            .collect::<Vec<_>>()
            .iter()
            .flat_map(|k| self.validate_key(k))
            .collect()
    }

    /// Validate one field.
    pub fn validate_key(&self, key: &str) -> Vec<Issue> {
        if !self.schema.has(key) {
            return Vec::new();
        }
        let value = self.stored_or_computed(key);
        self.schema.validate_value(key, &value, self)
    }

    /// Validate a list of fields.
    pub fn validate_keys(&self, keys: &[&str]) -> Vec<Issue> {
        keys.iter().flat_map(|k| self.validate_key(k)).collect()
    }

    /// Run a selected subset of one field's validators.
    pub fn validate_selected(&self, key: &str, selection: ValidatorSelection) -> Vec<Issue> {
        if !self.schema.has(key) {
            return Vec::new();
        }
        let value = self.stored_or_computed(key);
        self.schema
            .validate_selected(key, &value, self, &selection)
    }

    pub(crate) fn stored_or_computed(&self, key: &str) -> Value {
        if self.schema.is_computed(key) {
            self.computed_value(key)
        } else {
            self.store.get(&field_path(key)).unwrap_or(Value::Null)
        }
    }

    // -- lifecycle ---------------------------------------------------------

    /// Replace the store wholesale without firing watchers. The `on_switch`
    /// hook may rewrite the (deep-copied) input first; missing schema
    /// fields fall back to their defaults, missing state entries to their
    /// initial values. Clears the per-field changed marks.
    pub fn restore(&self, data: &Value) {
        if self.locked.get() {
            self.emit_error(ModelError::Locked { key: "*".into() });
            return;
        }
        let mut copy = data.clone();
        if let Some(hook) = &self.on_switch {
            hook(&mut copy);
        }
        let src = copy.as_object().cloned().unwrap_or_default();

        let mut doc = Map::new();
        for key in self.schema.keys().map(str::to_owned).collect::<Vec<_>>() {
            if self.schema.is_computed(&key) {
                continue;
            }
            let value = src
                .get(&key)
                .cloned()
                .unwrap_or_else(|| self.schema.default_of(&key));
            doc.insert(key, value);
        }
        for key in &self.state_keys {
            let value = src.get(key).cloned().unwrap_or_else(|| {
                self.initial_state.get(key).cloned().unwrap_or(Value::Null)
            });
            doc.insert(key.clone(), value);
        }

        self.store.replace(Value::Object(doc));
        self.changed.borrow_mut().clear();
        self.computed.borrow_mut().clear();
        self.prime_computed();
    }

    /// `on_parse` → `Schema::parse` → `restore`.
    pub fn from_json(&self, json: &Value) {
        if self.locked.get() {
            self.emit_error(ModelError::Locked { key: "*".into() });
            return;
        }
        let input = match &self.on_parse {
            Some(hook) => hook(json),
            None => json.clone(),
        };
        let parsed = self.schema.parse(&input, self);
        self.restore(&parsed);
    }

    /// `Schema::export` (over data with computed fields materialized) →
    /// `on_export`.
    pub fn to_json(&self) -> Value {
        let mut data = self.store.snapshot();
        for key in self.schema.computed_keys() {
            data[key.as_str()] = self.computed_value(&key);
        }
        let exported = self.schema.export(&data, self);
        match &self.on_export {
            Some(hook) => hook(exported),
            None => exported,
        }
    }

    /// Freeze the model: `set`, `update`, and `restore` become no-ops that
    /// emit a `Locked` error.
    pub fn lock(&self) {
        self.locked.set(true);
    }

    pub fn unlock(&self) {
        self.locked.set(false);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    // -- watchers ----------------------------------------------------------

    /// Watch a key path (`"*"` for any change).
    pub fn watch(&self, spec: &str, handler: impl Fn(&Change) + 'static) -> WatcherId {
        self.store.watch(WatchSpec::parse(spec), false, handler)
    }

    /// Watch a key path including descendant writes.
    pub fn watch_deep(&self, spec: &str, handler: impl Fn(&Change) + 'static) -> WatcherId {
        self.store.watch(WatchSpec::parse(spec), true, handler)
    }

    /// Watch and immediately invoke the handler with the current value.
    pub fn watch_immediate(&self, spec: &str, handler: impl Fn(&Change) + 'static) -> WatcherId {
        if spec != "*" {
            let path = Path::parse(spec);
            let current = self.store.get(&path).unwrap_or(Value::Null);
            handler(&Change {
                key: spec.split('.').next().unwrap_or(spec).to_owned(),
                path,
                value: current,
                prev: Value::Null,
            });
        }
        self.watch(spec, handler)
    }

    pub fn unwatch(&self, id: WatcherId) -> bool {
        self.store.unwatch(id)
    }

    // -- editing session ---------------------------------------------------

    /// Defer watcher dispatch until [`Model::end_edit`].
    pub fn begin_edit(&self) {
        self.store.begin_batch();
    }

    /// Flush deferred notifications as one batch.
    pub fn end_edit(&self) {
        self.store.end_batch();
    }

    // -- views -------------------------------------------------------------

    /// Live projection of one field for UI layers.
    pub fn view(&self, key: &str) -> Option<FieldView<'_>> {
        if self.schema.has(key) {
            Some(FieldView::new(self, key))
        } else {
            None
        }
    }

    /// The full view mapping, with the `$errors` aggregate.
    pub fn views(&self) -> Views<'_> {
        Views::new(self)
    }

    pub(crate) fn metas_filter(&self) -> &MetasFilter {
        &self.metas_filter
    }

    pub(crate) fn was_changed(&self, key: &str) -> bool {
        self.changed.borrow().contains(key)
    }

    pub(crate) fn clear_changed(&self) {
        self.changed.borrow_mut().clear();
    }

    /// Silent single-path restore used by the history layer.
    pub(crate) fn restore_path(&self, path: &Path, value: Value) {
        let _ = self.store.set_silent(path.clone(), value);
        self.computed.borrow_mut().clear();
        self.prime_computed();
    }
}

pub(crate) fn field_path(key: &str) -> Path {
    Path::root().key(key)
}
