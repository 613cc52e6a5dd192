//! History extension: named snapshots plus linear undo/redo.
//!
//! `TraceModel` wraps a [`Model`] and records every mutation that reaches
//! the store into a bounded ring of `(path, before, after)` entries. Named
//! commits are independent deep snapshots of the document; the reserved
//! origin tag always points at the construction-time state.

use crate::error::ModelError;
use crate::model::Model;
use crate::store::Change;
use mould_ty::Path;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::ops::Deref;
use std::rc::Rc;

/// Tag under which the construction-time document is always available.
pub const ORIGIN_TAG: &str = "$origin";

const DEFAULT_CAPACITY: usize = 128;

#[derive(Clone, Debug)]
struct HistoryEntry {
    path: Path,
    before: Value,
    after: Value,
}

struct History {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    capacity: usize,
}

impl History {
    fn record(&mut self, entry: HistoryEntry) {
        // A write after undo truncates the redo tail.
        self.entries.truncate(self.cursor);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.cursor = self.entries.len();
    }
}

/// A model with snapshot and undo/redo capability.
pub struct TraceModel {
    model: Model,
    commits: RefCell<HashMap<String, Value>>,
    history: Rc<RefCell<History>>,
}

impl Deref for TraceModel {
    type Target = Model;

    fn deref(&self) -> &Model {
        &self.model
    }
}

impl TraceModel {
    /// Wrap a model with the default history capacity.
    pub fn new(model: Model) -> Self {
        Self::with_capacity(model, DEFAULT_CAPACITY)
    }

    /// Wrap a model with a bounded history ring.
    pub fn with_capacity(model: Model, capacity: usize) -> Self {
        let history = Rc::new(RefCell::new(History {
            entries: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }));

        let schema = model.schema_rc();
        let recorder = Rc::clone(&history);
        let store = model.store_handle();
        store.watch("*", false, move |change: &Change| {
            // Synthetic computed-field emissions are derived state, not
            // history.
            if schema.is_computed(&change.key) {
                return;
            }
            recorder.borrow_mut().record(HistoryEntry {
                path: change.path.clone(),
                before: change.prev.clone(),
                after: change.value.clone(),
            });
        });

        let mut commits = HashMap::new();
        commits.insert(ORIGIN_TAG.to_owned(), model.data());

        Self {
            model,
            commits: RefCell::new(commits),
            history,
        }
    }

    /// The wrapped model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Store a deep snapshot of the current document under `tag`.
    /// Re-committing a tag replaces its snapshot; the origin tag is
    /// reserved. Clears the per-field changed marks.
    pub fn commit(&self, tag: &str) -> Result<(), ModelError> {
        if tag == ORIGIN_TAG {
            return Err(ModelError::ReservedTag {
                tag: tag.to_owned(),
            });
        }
        self.commits
            .borrow_mut()
            .insert(tag.to_owned(), self.model.data());
        self.model.clear_changed();
        Ok(())
    }

    /// Restore the snapshot committed under `tag` (watcher-silent, like
    /// `restore`).
    pub fn reset(&self, tag: &str) -> Result<(), ModelError> {
        let snapshot = self
            .commits
            .borrow()
            .get(tag)
            .cloned()
            .ok_or_else(|| ModelError::UnknownTag {
                tag: tag.to_owned(),
            })?;
        self.model.restore(&snapshot);
        Ok(())
    }

    /// Whether a snapshot exists under `tag`.
    pub fn has_commit(&self, tag: &str) -> bool {
        self.commits.borrow().contains_key(tag)
    }

    /// Step one mutation back. Returns false when at the oldest point.
    pub fn undo(&self) -> bool {
        let entry = {
            let mut history = self.history.borrow_mut();
            if history.cursor == 0 {
                return false;
            }
            history.cursor -= 1;
            history.entries[history.cursor].clone()
        };
        self.model.restore_path(&entry.path, entry.before);
        true
    }

    /// Step one undone mutation forward. Returns false when nothing was
    /// undone.
    pub fn redo(&self) -> bool {
        let entry = {
            let mut history = self.history.borrow_mut();
            if history.cursor >= history.entries.len() {
                return false;
            }
            let entry = history.entries[history.cursor].clone();
            history.cursor += 1;
            entry
        };
        self.model.restore_path(&entry.path, entry.after);
        true
    }

    /// Steps currently available to undo.
    pub fn undo_depth(&self) -> usize {
        self.history.borrow().cursor
    }

    /// Steps currently available to redo.
    pub fn redo_depth(&self) -> usize {
        let history = self.history.borrow();
        history.entries.len() - history.cursor
    }

    /// Drop the undo/redo history. Named commits are retained.
    pub fn clear(&self) {
        let mut history = self.history.borrow_mut();
        history.entries.clear();
        history.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FieldDef;
    use crate::schema::Schema;
    use mould_ty::Proto;
    use serde_json::json;

    fn trace() -> TraceModel {
        let schema = Schema::new()
            .field("name", FieldDef::new().default(json!("")).ty(Proto::String))
            .field("count", FieldDef::new().default(json!(0)));
        TraceModel::new(Model::new(schema).unwrap())
    }

    #[test]
    fn commit_and_reset_round_trip() {
        let t = trace();
        t.set("name", json!("before"));
        t.commit("edit").unwrap();

        t.set("name", json!("after"));
        assert_eq!(t.get("name"), json!("after"));

        t.reset("edit").unwrap();
        assert_eq!(t.get("name"), json!("before"));
    }

    #[test]
    fn origin_tag_is_reserved_but_resettable() {
        let t = trace();
        assert!(matches!(
            t.commit(ORIGIN_TAG),
            Err(ModelError::ReservedTag { .. })
        ));

        t.set("count", json!(5));
        t.reset(ORIGIN_TAG).unwrap();
        assert_eq!(t.get("count"), json!(0));
    }

    #[test]
    fn recommit_replaces_snapshot() {
        let t = trace();
        t.set("count", json!(1));
        t.commit("x").unwrap();
        t.set("count", json!(2));
        t.commit("x").unwrap();
        t.set("count", json!(3));
        t.reset("x").unwrap();
        assert_eq!(t.get("count"), json!(2));
    }

    #[test]
    fn unknown_tag_errors() {
        let t = trace();
        assert!(matches!(
            t.reset("nope"),
            Err(ModelError::UnknownTag { .. })
        ));
    }

    #[test]
    fn undo_and_redo_walk_history() {
        let t = trace();
        t.set("count", json!(1));
        t.set("count", json!(2));

        assert!(t.undo());
        assert_eq!(t.get("count"), json!(1));
        assert!(t.undo());
        assert_eq!(t.get("count"), json!(0));
        assert!(!t.undo());

        assert!(t.redo());
        assert_eq!(t.get("count"), json!(1));
        assert!(t.redo());
        assert_eq!(t.get("count"), json!(2));
        assert!(!t.redo());
    }

    #[test]
    fn write_after_undo_clears_redo() {
        let t = trace();
        t.set("count", json!(1));
        t.set("count", json!(2));
        assert!(t.undo());
        assert_eq!(t.redo_depth(), 1);

        t.set("count", json!(9));
        assert_eq!(t.redo_depth(), 0);
        assert!(!t.redo());

        // Undo still walks back through the new write.
        assert!(t.undo());
        assert_eq!(t.get("count"), json!(1));
    }

    #[test]
    fn clear_drops_history_keeps_commits() {
        let t = trace();
        t.set("count", json!(1));
        t.commit("keep").unwrap();
        t.set("count", json!(2));

        t.clear();
        assert!(!t.undo());
        assert!(t.has_commit("keep"));
        t.reset("keep").unwrap();
        assert_eq!(t.get("count"), json!(1));
    }

    #[test]
    fn capacity_bounds_history() {
        let schema = Schema::new().field("n", FieldDef::new().default(json!(0)));
        let t = TraceModel::with_capacity(Model::new(schema).unwrap(), 2);
        t.set("n", json!(1));
        t.set("n", json!(2));
        t.set("n", json!(3));
        assert_eq!(t.undo_depth(), 2);

        assert!(t.undo());
        assert!(t.undo());
        assert!(!t.undo());
        // The oldest write fell out of the ring.
        assert_eq!(t.get("n"), json!(1));
    }
}
