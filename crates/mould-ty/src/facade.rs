//! Entry points for one-shot checks.
//!
//! ```
//! use mould_ty::{Ty, Type, Proto};
//! use serde_json::json;
//!
//! let t = Type::new(Proto::String);
//! assert!(Ty::expect(&json!("a")).to_match(&t).is_ok());
//! assert!(Ty::catch(&json!(1)).by(&t).is_some());
//! assert!(Ty::is_type(&t).matches(&json!("a")));
//! ```

use crate::error::TyError;
use crate::ty::{Checked, Type};
use serde_json::Value;

/// Namespace for one-shot checks over values.
pub struct Ty;

impl Ty {
    /// Assertion entry: `Ty::expect(&v).to_match(&t)` errs on mismatch.
    pub fn expect(value: &Value) -> Expect<'_> {
        Expect { value }
    }

    /// Non-throwing entry: `Ty::catch(&v).by(&t)` yields the error or `None`.
    pub fn catch(value: &Value) -> CatchBy<'_> {
        CatchBy { value }
    }

    /// Boolean entry: `Ty::is_type(&t).matches(&v)`.
    pub fn is_type(ty: &Type) -> IsType<'_> {
        IsType { ty }
    }

    /// Deferred check without forcing lazily resolved patterns.
    pub fn trace(value: &Value) -> TraceBy<'_> {
        TraceBy { value, force: false }
    }

    /// Deferred check that forces lazily resolved patterns first.
    pub fn track(value: &Value) -> TraceBy<'_> {
        TraceBy { value, force: true }
    }
}

/// See [`Ty::expect`].
pub struct Expect<'v> {
    value: &'v Value,
}

impl Expect<'_> {
    /// Assert the value matches the type.
    pub fn to_match(&self, ty: &Type) -> Result<(), TyError> {
        ty.assert(self.value)
    }
}

/// See [`Ty::catch`].
pub struct CatchBy<'v> {
    value: &'v Value,
}

impl CatchBy<'_> {
    /// The error produced by the type, or `None` on a match.
    pub fn by(&self, ty: &Type) -> Option<TyError> {
        ty.catch(self.value)
    }
}

/// See [`Ty::is_type`].
pub struct IsType<'t> {
    ty: &'t Type,
}

impl IsType<'_> {
    /// Whether the value matches the type.
    pub fn matches(&self, value: &Value) -> bool {
        self.ty.test(value)
    }
}

/// See [`Ty::trace`] and [`Ty::track`].
pub struct TraceBy<'v> {
    value: &'v Value,
    force: bool,
}

impl TraceBy<'_> {
    /// Run the deferred check against the type.
    pub fn by(&self, ty: &Type) -> Checked {
        if self.force {
            ty.track(self.value).by(ty)
        } else {
            ty.trace(self.value).by(ty)
        }
    }
}
