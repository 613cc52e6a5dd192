//! Reactive observable store.
//!
//! The store holds one JSON document and notifies watchers of writes.
//! Dispatch is synchronous and two-phase: all writes of a batch are applied
//! first, then specific-path watchers fire in registration order, then
//! wildcard watchers. Re-entrant writes from handlers are queued and drained
//! in the same turn; identical `(path, value)` re-emissions are deduped so
//! chained writes terminate.
//!
//! Reads made during [`Store::track`] record their paths, which is how
//! computed fields discover their dependencies.

use mould_ty::{Path, Seg};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use thiserror::Error;

/// Store-level addressing failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Array index beyond the current length.
    #[error("index {index} out of bounds (len: {len}) at {path}")]
    IndexOutOfBounds {
        path: Path,
        index: usize,
        len: usize,
    },

    /// A path segment descends into a non-container value.
    #[error("cannot descend into non-container at {path}")]
    NotAContainer { path: Path },
}

/// A change notification delivered to watchers.
#[derive(Clone, Debug)]
pub struct Change {
    /// Top-level key of the written path.
    pub key: String,
    /// Full path of the write.
    pub path: Path,
    /// The new value.
    pub value: Value,
    /// The previous value (`Null` when absent).
    pub prev: Value,
}

/// Handle returned by `watch`, used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

/// What a watcher listens to.
#[derive(Clone, Debug)]
pub enum WatchSpec {
    /// Every change.
    Any,
    /// A specific path (optionally including descendants).
    At(Path),
}

impl WatchSpec {
    /// Parse a watch spec: `"*"` listens to everything, otherwise a dotted
    /// key path.
    pub fn parse(spec: &str) -> Self {
        if spec == "*" {
            WatchSpec::Any
        } else {
            WatchSpec::At(Path::parse(spec))
        }
    }
}

impl From<&str> for WatchSpec {
    fn from(spec: &str) -> Self {
        WatchSpec::parse(spec)
    }
}

impl From<Path> for WatchSpec {
    fn from(path: Path) -> Self {
        WatchSpec::At(path)
    }
}

type Handler = Rc<dyn Fn(&Change)>;

struct Watcher {
    id: u64,
    spec: WatchSpec,
    deep: bool,
    handler: Handler,
}

struct Inner {
    data: Value,
    watchers: Vec<Watcher>,
    next_watcher: u64,
    trackers: Vec<HashSet<Path>>,
    silent: bool,
    batch_depth: u32,
    buffer: Vec<Change>,
    dispatching: bool,
    queue: VecDeque<Vec<Change>>,
}

/// A single-threaded reactive store over one JSON document.
///
/// Cloning the handle shares the underlying document and watcher registry.
#[derive(Clone)]
pub struct Store {
    inner: Rc<RefCell<Inner>>,
}

impl Store {
    /// Create a store around an initial document (an object).
    pub fn new(initial: Value) -> Self {
        let data = if initial.is_object() {
            initial
        } else {
            Value::Object(Map::new())
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                data,
                watchers: Vec::new(),
                next_watcher: 1,
                trackers: Vec::new(),
                silent: false,
                batch_depth: 0,
                buffer: Vec::new(),
                dispatching: false,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Clone the current document.
    pub fn snapshot(&self) -> Value {
        self.inner.borrow().data.clone()
    }

    /// Replace the document wholesale without notifying watchers.
    pub fn replace(&self, data: Value) {
        self.inner.borrow_mut().data = data;
    }

    /// Read the value at a path, recording it into active tracker frames.
    pub fn get(&self, path: &Path) -> Option<Value> {
        let mut inner = self.inner.borrow_mut();
        for frame in inner.trackers.iter_mut() {
            frame.insert(path.clone());
        }
        read_at(&inner.data, path).cloned()
    }

    /// Whether a value exists at the path.
    pub fn contains(&self, path: &Path) -> bool {
        read_at(&self.inner.borrow().data, path).is_some()
    }

    /// Write a value. Returns the previous value. Watchers are notified
    /// only when the value actually changed.
    pub fn set(&self, path: Path, value: Value) -> Result<Value, StoreError> {
        self.write(path, value, false)
    }

    /// Write without notifying watchers.
    pub fn set_silent(&self, path: Path, value: Value) -> Result<Value, StoreError> {
        self.write(path, value, true)
    }

    fn write(&self, path: Path, value: Value, silent: bool) -> Result<Value, StoreError> {
        let change = {
            let mut inner = self.inner.borrow_mut();
            let prev = read_at(&inner.data, &path).cloned().unwrap_or(Value::Null);
            if prev == value {
                return Ok(prev);
            }
            write_at(&mut inner.data, &path, value.clone())?;
            Change {
                key: top_key(&path),
                path,
                value,
                prev: prev.clone(),
            }
        };
        if !silent {
            self.notify(vec![change.clone()]);
        }
        Ok(change.prev)
    }

    /// Delete the value at a path. A missing path is a no-op.
    pub fn del(&self, path: Path) -> Result<(), StoreError> {
        let change = {
            let mut inner = self.inner.borrow_mut();
            let prev = match read_at(&inner.data, &path) {
                Some(v) => v.clone(),
                None => return Ok(()),
            };
            delete_at(&mut inner.data, &path);
            Change {
                key: top_key(&path),
                path,
                value: Value::Null,
                prev,
            }
        };
        self.notify(vec![change]);
        Ok(())
    }

    /// Apply a batch of writes: all are applied first, then watchers fire.
    pub fn update(
        &self,
        entries: impl IntoIterator<Item = (Path, Value)>,
    ) -> Result<(), StoreError> {
        self.begin_batch();
        let mut result = Ok(());
        for (path, value) in entries {
            if let Err(e) = self.set(path, value) {
                result = Err(e);
                break;
            }
        }
        self.end_batch();
        result
    }

    /// Start buffering notifications. Nestable.
    pub fn begin_batch(&self) {
        self.inner.borrow_mut().batch_depth += 1;
    }

    /// Flush buffered notifications as one two-phase dispatch.
    pub fn end_batch(&self) {
        let batch = {
            let mut inner = self.inner.borrow_mut();
            inner.batch_depth = inner.batch_depth.saturating_sub(1);
            if inner.batch_depth > 0 {
                return;
            }
            std::mem::take(&mut inner.buffer)
        };
        if !batch.is_empty() {
            self.notify(batch);
        }
    }

    /// Toggle the session-wide silent flag; while set, every notification
    /// is dropped.
    pub fn silent(&self, on: bool) {
        self.inner.borrow_mut().silent = on;
    }

    /// Register a watcher. `deep` also fires for descendant writes.
    pub fn watch(
        &self,
        spec: impl Into<WatchSpec>,
        deep: bool,
        handler: impl Fn(&Change) + 'static,
    ) -> WatcherId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_watcher;
        inner.next_watcher += 1;
        inner.watchers.push(Watcher {
            id,
            spec: spec.into(),
            deep,
            handler: Rc::new(handler),
        });
        WatcherId(id)
    }

    /// Unregister a watcher. Returns true if it existed.
    pub fn unwatch(&self, id: WatcherId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.watchers.len();
        inner.watchers.retain(|w| w.id != id.0);
        inner.watchers.len() != before
    }

    /// Record paths into every active tracker frame without reading them.
    /// Used when a cached derivation short-circuits its reads.
    pub(crate) fn record(&self, paths: impl IntoIterator<Item = Path>) {
        let mut inner = self.inner.borrow_mut();
        if inner.trackers.is_empty() {
            return;
        }
        for path in paths {
            for frame in inner.trackers.iter_mut() {
                frame.insert(path.clone());
            }
        }
    }

    /// Run `f` under a tracker frame, returning its result and the set of
    /// paths it read.
    pub fn track<T>(&self, f: impl FnOnce() -> T) -> (T, HashSet<Path>) {
        self.inner.borrow_mut().trackers.push(HashSet::new());
        let result = f();
        let frame = self
            .inner
            .borrow_mut()
            .trackers
            .pop()
            .unwrap_or_default();
        (result, frame)
    }

    /// Dispatch a change that did not come from a document write (computed
    /// field updates).
    pub(crate) fn emit(&self, change: Change) {
        self.notify(vec![change]);
    }

    /// Queue a batch and drain the queue unless a dispatch is already
    /// running higher up the stack.
    fn notify(&self, changes: Vec<Change>) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.silent {
                return;
            }
            if inner.batch_depth > 0 {
                inner.buffer.extend(changes);
                return;
            }
            inner.queue.push_back(changes);
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }
        self.drain();
        self.inner.borrow_mut().dispatching = false;
    }

    fn drain(&self) {
        // Dedupe identical (path, value) re-emissions within this turn so
        // mutually-triggering watchers terminate.
        let mut seen: Vec<(Path, Value)> = Vec::new();
        loop {
            let batch = match self.inner.borrow_mut().queue.pop_front() {
                Some(batch) => batch,
                None => break,
            };
            let batch: Vec<Change> = batch
                .into_iter()
                .filter(|ch| {
                    let mark = (ch.path.clone(), ch.value.clone());
                    if seen.contains(&mark) {
                        false
                    } else {
                        seen.push(mark);
                        true
                    }
                })
                .collect();

            // Phase one: specific-path watchers, registration order.
            for change in &batch {
                for handler in self.matching(change, false) {
                    handler(change);
                }
            }
            // Phase two: wildcard watchers.
            for change in &batch {
                for handler in self.matching(change, true) {
                    handler(change);
                }
            }
        }
    }

    /// Collect handlers for a change: `wildcard` selects the `Any` phase.
    fn matching(&self, change: &Change, wildcard: bool) -> Vec<Handler> {
        let inner = self.inner.borrow();
        inner
            .watchers
            .iter()
            .filter(|w| match (&w.spec, wildcard) {
                (WatchSpec::Any, true) => true,
                (WatchSpec::At(p), false) => {
                    *p == change.path || (w.deep && p.is_prefix_of(&change.path))
                }
                _ => false,
            })
            .map(|w| Rc::clone(&w.handler))
            .collect()
    }
}

fn top_key(path: &Path) -> String {
    match path.first() {
        Some(Seg::Key(k)) => k.clone(),
        Some(Seg::Index(i)) => i.to_string(),
        None => String::new(),
    }
}

/// Read a nested value.
pub(crate) fn read_at<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = doc;
    for seg in path.segments() {
        match seg {
            Seg::Key(k) => current = current.get(k)?,
            Seg::Index(i) => current = current.get(i)?,
        }
    }
    Some(current)
}

/// Write a nested value, creating intermediate objects for key segments.
fn write_at(doc: &mut Value, path: &Path, value: Value) -> Result<(), StoreError> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }
    descend(doc, path.segments(), value, path)
}

fn descend(
    current: &mut Value,
    segments: &[Seg],
    value: Value,
    full_path: &Path,
) -> Result<(), StoreError> {
    match segments {
        [] => {
            *current = value;
            Ok(())
        }
        [Seg::Key(key), rest @ ..] => {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let obj = current.as_object_mut().expect("just made object");
            if rest.is_empty() {
                obj.insert(key.clone(), value);
                Ok(())
            } else {
                let entry = obj.entry(key.clone()).or_insert(Value::Null);
                descend(entry, rest, value, full_path)
            }
        }
        [Seg::Index(idx), rest @ ..] => {
            let arr = current
                .as_array_mut()
                .ok_or_else(|| StoreError::NotAContainer {
                    path: full_path.clone(),
                })?;
            if *idx >= arr.len() {
                return Err(StoreError::IndexOutOfBounds {
                    path: full_path.clone(),
                    index: *idx,
                    len: arr.len(),
                });
            }
            if rest.is_empty() {
                arr[*idx] = value;
                Ok(())
            } else {
                descend(&mut arr[*idx], rest, value, full_path)
            }
        }
    }
}

fn delete_at(doc: &mut Value, path: &Path) {
    let Some(parent_path) = path.parent() else {
        *doc = Value::Object(Map::new());
        return;
    };
    let Some(parent) = read_at_mut(doc, &parent_path) else {
        return;
    };
    match path.segments().last() {
        Some(Seg::Key(k)) => {
            if let Some(obj) = parent.as_object_mut() {
                obj.remove(k);
            }
        }
        Some(Seg::Index(i)) => {
            if let Some(arr) = parent.as_array_mut() {
                if *i < arr.len() {
                    arr.remove(*i);
                }
            }
        }
        None => {}
    }
}

fn read_at_mut<'a>(doc: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut current = doc;
    for seg in path.segments() {
        match seg {
            Seg::Key(k) => current = current.get_mut(k)?,
            Seg::Index(i) => current = current.get_mut(i)?,
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mould_ty::path;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn set_and_get() {
        let store = Store::new(json!({"a": 1}));
        assert_eq!(store.get(&path!("a")), Some(json!(1)));

        store.set(path!("a"), json!(2)).unwrap();
        assert_eq!(store.get(&path!("a")), Some(json!(2)));

        store.set(path!("b", "c"), json!(3)).unwrap();
        assert_eq!(store.get(&path!("b", "c")), Some(json!(3)));
    }

    #[test]
    fn watchers_fire_on_change_only() {
        let store = Store::new(json!({"a": 1}));
        let seen = log();
        let seen2 = seen.clone();
        store.watch("a", false, move |ch| {
            seen2.borrow_mut().push(format!("{}->{}", ch.prev, ch.value));
        });

        store.set(path!("a"), json!(1)).unwrap(); // unchanged, no event
        store.set(path!("a"), json!(2)).unwrap();
        assert_eq!(seen.borrow().as_slice(), ["1->2"]);
    }

    #[test]
    fn silent_writes_skip_watchers() {
        let store = Store::new(json!({"a": 1}));
        let seen = log();
        let seen2 = seen.clone();
        store.watch("a", false, move |_| seen2.borrow_mut().push("hit".into()));

        store.set_silent(path!("a"), json!(2)).unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(store.get(&path!("a")), Some(json!(2)));
    }

    #[test]
    fn wildcard_fires_after_specific() {
        let store = Store::new(json!({"a": 1, "b": 2}));
        let order = log();
        let o1 = order.clone();
        let o2 = order.clone();
        store.watch("*", false, move |ch| o1.borrow_mut().push(format!("any:{}", ch.key)));
        store.watch("a", false, move |_| o2.borrow_mut().push("a".into()));

        store.set(path!("a"), json!(9)).unwrap();
        assert_eq!(order.borrow().as_slice(), ["a", "any:a"]);
    }

    #[test]
    fn update_applies_all_writes_before_dispatch() {
        let store = Store::new(json!({"a": 1, "b": 2}));
        let snapshot = log();
        let s2 = snapshot.clone();
        let store2 = store.clone();
        store.watch("a", false, move |_| {
            // By the time any watcher runs, both writes are visible.
            s2.borrow_mut()
                .push(store2.get(&path!("b")).unwrap().to_string());
        });

        store
            .update([(path!("a"), json!(10)), (path!("b"), json!(20))])
            .unwrap();
        assert_eq!(snapshot.borrow().as_slice(), ["20"]);
    }

    #[test]
    fn deep_watch_sees_descendant_writes() {
        let store = Store::new(json!({"user": {"name": "a"}}));
        let seen = log();
        let s2 = seen.clone();
        store.watch("user", true, move |ch| {
            s2.borrow_mut().push(ch.path.to_string());
        });

        store.set(path!("user", "name"), json!("b")).unwrap();
        assert_eq!(seen.borrow().as_slice(), ["$.user.name"]);
    }

    #[test]
    fn reentrant_writes_terminate() {
        let store = Store::new(json!({"a": 0, "b": 0}));
        let store2 = store.clone();
        // A watcher on `a` that writes `b`, and one on `b` that rewrites the
        // same (path, value): dedupe breaks the cycle.
        store.watch("a", false, move |ch| {
            store2.set(path!("b"), ch.value.clone()).unwrap();
        });
        let store3 = store.clone();
        store.watch("b", false, move |ch| {
            store3.set(path!("b"), ch.value.clone()).unwrap();
        });

        store.set(path!("a"), json!(5)).unwrap();
        assert_eq!(store.get(&path!("b")), Some(json!(5)));
    }

    #[test]
    fn unwatch_stops_delivery() {
        let store = Store::new(json!({"a": 1}));
        let seen = log();
        let s2 = seen.clone();
        let id = store.watch("a", false, move |_| s2.borrow_mut().push("hit".into()));

        assert!(store.unwatch(id));
        store.set(path!("a"), json!(2)).unwrap();
        assert!(seen.borrow().is_empty());
        assert!(!store.unwatch(id));
    }

    #[test]
    fn track_records_reads() {
        let store = Store::new(json!({"a": 1, "b": {"c": 2}}));
        let store2 = store.clone();
        let ((), reads) = store.track(|| {
            store2.get(&path!("a"));
            store2.get(&path!("b", "c"));
        });
        assert!(reads.contains(&path!("a")));
        assert!(reads.contains(&path!("b", "c")));
        assert_eq!(reads.len(), 2);
    }

    #[test]
    fn del_removes_and_notifies() {
        let store = Store::new(json!({"a": 1}));
        let seen = log();
        let s2 = seen.clone();
        store.watch("a", false, move |ch| {
            s2.borrow_mut().push(format!("{}->{}", ch.prev, ch.value));
        });

        store.del(path!("a")).unwrap();
        assert_eq!(store.get(&path!("a")), None);
        assert_eq!(seen.borrow().as_slice(), ["1->null"]);

        // Deleting a missing path is a no-op.
        store.del(path!("zzz")).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn array_index_out_of_bounds() {
        let store = Store::new(json!({"items": [1, 2]}));
        let err = store.set(path!("items", 5), json!(9)).unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfBounds { index: 5, .. }));
    }

    #[test]
    fn session_silent_flag() {
        let store = Store::new(json!({"a": 1}));
        let seen = log();
        let s2 = seen.clone();
        store.watch("a", false, move |_| s2.borrow_mut().push("hit".into()));

        store.silent(true);
        store.set(path!("a"), json!(2)).unwrap();
        store.silent(false);
        store.set(path!("a"), json!(3)).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }
}
