//! Composable runtime type expressions over JSON values.
//!
//! `mould-ty` is the type system underneath the `mould` model runtime: a
//! language of patterns (prototype tokens, literals, structural mappings
//! and sequences, conditional rules) wrapped into named, moded types with
//! structured errors.
//!
//! # Core concepts
//!
//! - **Pattern**: the union of type expressions ([`Pattern`])
//! - **Proto**: prototype tokens plus the process-wide predicate registry
//! - **Type**: a named pattern with strict/loose mode, `assert`/`catch`,
//!   and deferred `trace`/`track` handles
//! - **Rule**: conditional patterns with `(data, key)` hooks
//! - **TyError**: structured error with kind, value, pattern, and path
//!
//! # Quick start
//!
//! ```
//! use mould_ty::{dict, Proto, Ty};
//! use serde_json::json;
//!
//! let person = dict([
//!     ("name", Proto::String),
//!     ("age", Proto::Number),
//! ]);
//!
//! assert!(Ty::expect(&json!({"name": "ann", "age": 30})).to_match(&person).is_ok());
//!
//! let err = Ty::catch(&json!({"name": "ann", "age": "x"})).by(&person).unwrap();
//! assert_eq!(err.to_string(), r#"mistaken: value "x" does not match Number at $.age"#);
//! ```

mod error;
mod facade;
mod path;
mod pattern;
mod prototype;
mod rule;
mod ty;

pub use error::{repr, ErrorKind, TyError};
pub use facade::Ty;
pub use path::{Path, Seg};
pub use pattern::Pattern;
pub use prototype::{find, is, register, unregister, Is, Predicate, Proto};
pub use rule::{
    asynch, determine, equal, ifexist, ifmatch, ifnotmatch, instance, lambda, match_all, nullable,
    shouldexist, shouldmatch, shouldnotexist, shouldnotmatch, Message, Rule, RuleCheck,
    RuleOutcome,
};
pub use ty::{
    dict, enum_of, list, range, range_with, self_ref, tuple, Checked, Deferral, Mode, Type,
    TypeKind,
};
