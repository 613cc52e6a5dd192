//! Prototype tokens and the process-wide predicate registry.
//!
//! A [`Proto`] names a class of JSON values. Built-in tokens cover the JSON
//! kinds plus a few numeric refinements; regex tokens match strings; custom
//! tokens resolve through a registry of named predicates shared by the whole
//! process.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A predicate over a JSON value.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

static CUSTOM: Lazy<RwLock<HashMap<String, Predicate>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a named prototype token.
///
/// Re-registering a name replaces its predicate. Callers must not mutate the
/// registry while type assertions are running on other threads.
pub fn register(name: impl Into<String>, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) {
    CUSTOM
        .write()
        .expect("prototype registry poisoned")
        .insert(name.into(), Arc::new(predicate));
}

/// Remove a named prototype token. Returns true if it was registered.
pub fn unregister(name: &str) -> bool {
    CUSTOM
        .write()
        .expect("prototype registry poisoned")
        .remove(name)
        .is_some()
}

/// Look up the predicate for a named token.
pub fn find(name: &str) -> Option<Predicate> {
    CUSTOM
        .read()
        .expect("prototype registry poisoned")
        .get(name)
        .cloned()
}

/// A prototype token: a named class of values.
#[derive(Clone)]
pub enum Proto {
    /// Matches every value.
    Any,
    /// JSON null.
    Null,
    /// Any JSON number.
    Number,
    /// A number with integer representation.
    Int,
    /// A number with floating representation.
    Float,
    /// A JSON string.
    String,
    /// A JSON boolean.
    Boolean,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
    /// A number strictly greater than zero.
    Positive,
    /// A number strictly less than zero.
    Negative,
    /// The number zero.
    Zero,
    /// An integer greater than or equal to zero.
    Natural,
    /// A compiled regex; matches only strings.
    Regex(Arc<Regex>),
    /// A registry-resolved token.
    Custom(String),
}

impl Proto {
    /// Build a regex token. Panics on an invalid pattern, like `Regex::new`
    /// usage at declaration sites.
    pub fn regex(pattern: &str) -> Self {
        Proto::Regex(Arc::new(
            Regex::new(pattern).expect("invalid prototype regex"),
        ))
    }

    /// Stable token name used in error messages.
    pub fn name(&self) -> String {
        match self {
            Proto::Any => "Any".into(),
            Proto::Null => "Null".into(),
            Proto::Number => "Number".into(),
            Proto::Int => "Int".into(),
            Proto::Float => "Float".into(),
            Proto::String => "String".into(),
            Proto::Boolean => "Boolean".into(),
            Proto::Object => "Object".into(),
            Proto::Array => "Array".into(),
            Proto::Positive => "Positive".into(),
            Proto::Negative => "Negative".into(),
            Proto::Zero => "Zero".into(),
            Proto::Natural => "Natural".into(),
            Proto::Regex(re) => format!("/{}/", re.as_str()),
            Proto::Custom(name) => name.clone(),
        }
    }
}

impl fmt::Debug for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proto({})", self.name())
    }
}

impl PartialEq for Proto {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

/// Start a triadic check on a token: `is(token).existing()`,
/// `is(token).matches(&value)`, or `is(token).equals(&value)`.
pub fn is(token: Proto) -> Is {
    Is { token }
}

/// The triadic helper returned by [`is`].
pub struct Is {
    token: Proto,
}

impl Is {
    /// Whether the token resolves: built-ins always do, custom tokens only
    /// when registered.
    pub fn existing(&self) -> bool {
        match &self.token {
            Proto::Custom(name) => find(name).is_some(),
            _ => true,
        }
    }

    /// Whether the value belongs to the token's class. Regex tokens match
    /// only strings; custom tokens that are not registered match nothing.
    pub fn matches(&self, value: &Value) -> bool {
        match &self.token {
            Proto::Any => true,
            Proto::Null => value.is_null(),
            Proto::Number => value.is_number(),
            Proto::Int => value.is_i64() || value.is_u64(),
            Proto::Float => value.is_f64(),
            Proto::String => value.is_string(),
            Proto::Boolean => value.is_boolean(),
            Proto::Object => value.is_object(),
            Proto::Array => value.is_array(),
            Proto::Positive => value.as_f64().is_some_and(|n| n > 0.0),
            Proto::Negative => value.as_f64().is_some_and(|n| n < 0.0),
            Proto::Zero => value.as_f64().is_some_and(|n| n == 0.0),
            Proto::Natural => value.as_i64().is_some_and(|n| n >= 0) || value.is_u64(),
            Proto::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
            Proto::Custom(name) => find(name).is_some_and(|p| p(value)),
        }
    }

    /// Literal equality against the value.
    pub fn equals(&self, value: &Value) -> bool {
        match &self.token {
            Proto::Custom(name) => Value::String(name.clone()) == *value,
            token => match value.as_str() {
                Some(s) => token.name() == s,
                None => false,
            },
        }
    }
}
