//! Reactive, schema-governed, observable data models.
//!
//! `mould-model` turns per-field descriptors into live instances with
//! typed reads and writes, dependency-tracked computed fields, deep change
//! notification, validation, (de)serialization, history, and per-field
//! view projections for UI layers.
//!
//! # Core concepts
//!
//! - **FieldDef / Schema**: decoded per-field meta bags (`default`,
//!   `type`, `required`, validators, `getter`/`setter`, `compute`,
//!   `drop`/`map`/`flat`, `readonly`/`disabled`, …)
//! - **Store**: a reactive observable document with dependency tracking
//! - **Model**: the orchestrator composing one schema with one store
//! - **FieldView / Views**: live projections consumed by UI layers
//! - **TraceModel**: named snapshots plus linear undo/redo
//!
//! # Quick start
//!
//! ```
//! use mould_model::{FieldDef, Model, Schema};
//! use mould_ty::Proto;
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .field("name", FieldDef::new().default(json!("")).ty(Proto::String))
//!     .field("age", FieldDef::new()
//!         .default(json!(0))
//!         .ty(Proto::Number)
//!         .setter(|v, _| v.as_str()
//!             .and_then(|s| s.parse::<i64>().ok())
//!             .map(Into::into)
//!             .unwrap_or_else(|| v.clone())));
//!
//! let model = Model::with_data(schema, &json!({"age": "14"})).unwrap();
//! assert_eq!(model.data()["age"], json!(14));
//! assert!(model.validate().is_empty());
//! ```

mod error;
mod meta;
mod model;
mod schema;
mod store;
mod trace;
mod view;

pub use error::{Issue, IssueKind, MetaError, MetaResult, ModelError};
pub use meta::{FieldDef, Guard, MetaValue, MetasFilter, Validator, ValidatorMessage, Verdict};
pub use model::{Model, ModelBuilder};
pub use schema::{Schema, ValidatorSelection};
pub use store::{Change, Store, StoreError, WatchSpec, WatcherId};
pub use trace::{TraceModel, ORIGIN_TAG};
pub use view::{FieldView, Views};

// The type system is part of the public surface: schemas carry patterns.
pub use mould_ty as ty;
