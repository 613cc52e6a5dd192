//! Conditional and transformational patterns.
//!
//! A [`Rule`] is a pattern with optional hooks evaluated in a `(data, key)`
//! idiom, because rules frequently depend on sibling fields: `shouldcheck`
//! gates the check, `use` picks the pattern dynamically, `validate` runs a
//! custom check, `override`/`decorate` supply replacement values on
//! mismatch/match, and `message` rewrites the error text.

use crate::error::{ErrorKind, TyError};
use crate::pattern::{check, CheckCtx, Pattern};
use crate::prototype::Proto;
use crate::Seg;
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

type ShouldCheckFn = Arc<dyn Fn(&Value, &str) -> bool + Send + Sync>;
type UseFn = Arc<dyn Fn(&Value, &str) -> Pattern + Send + Sync>;
type ValidateFn = Arc<dyn Fn(&Value, &str, &Pattern) -> RuleCheck + Send + Sync>;
type MutateFn = Arc<dyn Fn(&Value, &str) -> Value + Send + Sync>;
type MessageFn = Arc<dyn Fn(&Value, &str) -> String + Send + Sync>;
type ResolveFn = Arc<dyn Fn() -> Pattern + Send + Sync>;

/// Outcome of a rule's custom `validate` hook.
pub enum RuleCheck {
    /// The value is accepted; no further checks run.
    Pass,
    /// The value is rejected with this error.
    Fail(TyError),
    /// The hook abstains; the rule's pattern check proceeds.
    Fallthrough,
}

/// Result of checking one mapping entry through a rule.
///
/// `replacement` carries the value produced by an `override` hook (on
/// mismatch) or a `decorate` hook (on match); callers that own the data may
/// store it, pure checks discard it.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub replacement: Option<Value>,
}

impl RuleOutcome {
    fn clean() -> Self {
        Self { replacement: None }
    }

    fn replaced(value: Value) -> Self {
        Self {
            replacement: Some(value),
        }
    }
}

/// Message override carried by a rule.
#[derive(Clone)]
pub enum Message {
    Text(String),
    Fn(MessageFn),
}

impl Message {
    fn render(&self, data: &Value, key: &str) -> String {
        match self {
            Message::Text(t) => t.clone(),
            Message::Fn(f) => f(data, key),
        }
    }
}

/// Lazily resolved pattern: the thunk runs at most once; unresolved checks
/// accept any value.
#[derive(Clone)]
struct Deferred {
    resolve: ResolveFn,
    cell: Arc<OnceCell<Pattern>>,
}

impl Deferred {
    fn get(&self, force: bool) -> Option<&Pattern> {
        if force {
            Some(self.cell.get_or_init(|| (self.resolve)()))
        } else {
            self.cell.get()
        }
    }
}

/// A first-class conditional pattern.
#[derive(Clone)]
pub struct Rule {
    name: String,
    pattern: Option<Box<Pattern>>,
    shouldcheck: Option<ShouldCheckFn>,
    use_pattern: Option<UseFn>,
    validate: Option<ValidateFn>,
    override_on_mismatch: Option<MutateFn>,
    decorate_on_match: Option<MutateFn>,
    message: Option<Message>,
    deferred: Option<Deferred>,
    /// Presence is handled by the hooks; a missing key is not an error.
    allow_missing: bool,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

impl Rule {
    /// Create a bare rule around a pattern.
    pub fn new(name: impl Into<String>, pattern: impl Into<Pattern>) -> Self {
        Self {
            name: name.into(),
            pattern: Some(Box::new(pattern.into())),
            shouldcheck: None,
            use_pattern: None,
            validate: None,
            override_on_mismatch: None,
            decorate_on_match: None,
            message: None,
            deferred: None,
            allow_missing: false,
        }
    }

    fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: None,
            shouldcheck: None,
            use_pattern: None,
            validate: None,
            override_on_mismatch: None,
            decorate_on_match: None,
            message: None,
            deferred: None,
            allow_missing: false,
        }
    }

    /// Rule name, used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install a `shouldcheck` gate.
    pub fn shouldcheck(mut self, f: impl Fn(&Value, &str) -> bool + Send + Sync + 'static) -> Self {
        self.shouldcheck = Some(Arc::new(f));
        self
    }

    /// Install a dynamic-pattern hook.
    pub fn use_pattern(
        mut self,
        f: impl Fn(&Value, &str) -> Pattern + Send + Sync + 'static,
    ) -> Self {
        self.use_pattern = Some(Arc::new(f));
        self
    }

    /// Install a custom validation hook.
    pub fn validate(
        mut self,
        f: impl Fn(&Value, &str, &Pattern) -> RuleCheck + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(f));
        self
    }

    /// Install a replacement hook applied when the pattern mismatches.
    pub fn override_on_mismatch(
        mut self,
        f: impl Fn(&Value, &str) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.override_on_mismatch = Some(Arc::new(f));
        self
    }

    /// Install a replacement hook applied when the pattern matches.
    pub fn decorate_on_match(
        mut self,
        f: impl Fn(&Value, &str) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.decorate_on_match = Some(Arc::new(f));
        self
    }

    /// Install a static message override.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(Message::Text(text.into()));
        self
    }

    /// Install a computed message override.
    pub fn message_with(
        mut self,
        f: impl Fn(&Value, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.message = Some(Message::Fn(Arc::new(f)));
        self
    }

    /// The effective pattern for one evaluation.
    fn effective_pattern(&self, data: &Value, key: &str, cx: &CheckCtx) -> Pattern {
        if let Some(deferred) = &self.deferred {
            return deferred
                .get(cx.resolve_deferred)
                .cloned()
                .unwrap_or(Pattern::Proto(Proto::Any));
        }
        if let Some(use_pattern) = &self.use_pattern {
            return use_pattern(data, key);
        }
        self.pattern
            .as_deref()
            .cloned()
            .unwrap_or(Pattern::Proto(Proto::Any))
    }

    fn apply_message(&self, mut err: TyError, data: &Value, key: &str) -> TyError {
        if let Some(message) = &self.message {
            err = err.with_message(message.render(data, key));
        }
        err
    }

    /// Locate an error at `key`; the empty key marks a synthetic value
    /// position and adds no segment.
    fn locate(err: TyError, key: &str) -> TyError {
        if key.is_empty() {
            err
        } else {
            err.at(Seg::Key(key.to_owned()))
        }
    }

    /// Check one mapping entry with a fresh default context. `data` is the
    /// parent mapping, `key` the entry under examination. The returned
    /// error is already located at `key` relative to `data`.
    pub fn check_field(&self, data: &Value, key: &str) -> Result<RuleOutcome, TyError> {
        self.check_entry(data, key, &CheckCtx::default())
    }

    /// Check a bare value (no enclosing mapping) with a fresh default
    /// context.
    pub fn check(&self, value: &Value) -> Result<RuleOutcome, TyError> {
        self.check_value(value, &CheckCtx::default())
    }

    /// Check one mapping entry within a running recursive check.
    pub(crate) fn check_entry(
        &self,
        data: &Value,
        key: &str,
        cx: &CheckCtx,
    ) -> Result<RuleOutcome, TyError> {
        if let Some(gate) = &self.shouldcheck {
            if !gate(data, key) {
                return Ok(RuleOutcome::clean());
            }
        }

        let pattern = self.effective_pattern(data, key, cx);
        let value = data.get(key);

        if let Some(validate) = &self.validate {
            match validate(data, key, &pattern) {
                RuleCheck::Pass => return Ok(RuleOutcome::clean()),
                RuleCheck::Fail(err) => {
                    let err = self.apply_message(err, data, key);
                    return Err(Self::locate(err, key));
                }
                RuleCheck::Fallthrough => {}
            }
        }

        let value = match value {
            Some(v) => v,
            None => {
                if self.allow_missing {
                    return Ok(RuleOutcome::clean());
                }
                let err = TyError::new(ErrorKind::Missing, &Value::Null, pattern.describe());
                let err = self.apply_message(err, data, key);
                return Err(Self::locate(err, key));
            }
        };

        match check(value, &pattern, cx) {
            Ok(()) => {
                if let Some(decorate) = &self.decorate_on_match {
                    return Ok(RuleOutcome::replaced(decorate(data, key)));
                }
                Ok(RuleOutcome::clean())
            }
            Err(err) => {
                if let Some(override_hook) = &self.override_on_mismatch {
                    let replacement = override_hook(data, key);
                    if check(&replacement, &pattern, cx).is_ok() {
                        return Ok(RuleOutcome::replaced(replacement));
                    }
                }
                let err = self.apply_message(err, data, key);
                Err(Self::locate(err, key))
            }
        }
    }

    /// Check a bare value (no enclosing mapping). Hooks observe a synthetic
    /// single-entry mapping under the empty key.
    pub(crate) fn check_value(&self, value: &Value, cx: &CheckCtx) -> Result<RuleOutcome, TyError> {
        let data = json!({ "": value });
        self.check_entry(&data, "", cx)
    }
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Check only when the key exists; absence is fine.
pub fn ifexist(pattern: impl Into<Pattern>) -> Rule {
    Rule::new("ifexist", pattern).shouldcheck(|data, key| data.get(key).is_some())
}

/// On mismatch, substitute `fallback` (which must itself match).
pub fn ifnotmatch(pattern: impl Into<Pattern>, fallback: Value) -> Rule {
    Rule::new("ifnotmatch", pattern).override_on_mismatch(move |_, _| fallback.clone())
}

/// On match, replace the value with `then(value)`.
pub fn ifmatch(
    pattern: impl Into<Pattern>,
    then: impl Fn(&Value) -> Value + Send + Sync + 'static,
) -> Rule {
    Rule::new("ifmatch", pattern)
        .decorate_on_match(move |data, key| then(data.get(key).unwrap_or(&Value::Null)))
}

/// When `determine(data)` holds the key must exist and match; otherwise the
/// key is checked only if present.
pub fn shouldexist(
    determine: impl Fn(&Value) -> bool + Send + Sync + 'static,
    pattern: impl Into<Pattern>,
) -> Rule {
    Rule::new("shouldexist", pattern)
        .shouldcheck(move |data, key| determine(data) || data.get(key).is_some())
}

/// When `determine(data)` holds the key must be absent.
pub fn shouldnotexist(determine: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Rule {
    let mut rule = Rule::bare("shouldnotexist").validate(move |data, key, _pattern| {
        if determine(data) && data.get(key).is_some() {
            RuleCheck::Fail(TyError::new(
                ErrorKind::Overflow,
                data.get(key).unwrap_or(&Value::Null),
                "shouldnotexist",
            ))
        } else {
            RuleCheck::Pass
        }
    });
    rule.allow_missing = true;
    rule
}

/// Null or a match of the pattern.
pub fn nullable(pattern: impl Into<Pattern>) -> Rule {
    Rule::new("nullable", pattern).validate(|data, key, _pattern| {
        match data.get(key) {
            Some(Value::Null) => RuleCheck::Pass,
            _ => RuleCheck::Fallthrough,
        }
    })
}

/// The value must match every listed pattern.
pub fn match_all<P: Into<Pattern>>(patterns: impl IntoIterator<Item = P>) -> Rule {
    let patterns: Vec<Pattern> = patterns.into_iter().map(Into::into).collect();
    Rule::bare("match").validate(move |data, key, _pattern| {
        let value = data.get(key).cloned().unwrap_or(Value::Null);
        for pattern in &patterns {
            if let Err(err) = pattern.check_value(&value) {
                return RuleCheck::Fail(err);
            }
        }
        RuleCheck::Pass
    })
}

/// Pick the pattern from the sibling data at check time.
pub fn determine(decide: impl Fn(&Value) -> Pattern + Send + Sync + 'static) -> Rule {
    let mut rule = Rule::bare("determine");
    rule.use_pattern = Some(Arc::new(move |data, _key| decide(data)));
    rule
}

/// Pattern with a custom failure message.
pub fn shouldmatch(pattern: impl Into<Pattern>, message: impl Into<String>) -> Rule {
    Rule::new("shouldmatch", pattern).message(message)
}

/// The value must not match the pattern.
pub fn shouldnotmatch(pattern: impl Into<Pattern>, message: impl Into<String>) -> Rule {
    let pattern: Pattern = pattern.into();
    let message = message.into();
    Rule::bare("shouldnotmatch").validate(move |data, key, _| {
        let value = data.get(key).cloned().unwrap_or(Value::Null);
        if pattern.matches(&value) {
            RuleCheck::Fail(
                TyError::new(ErrorKind::Exception, &value, pattern.describe())
                    .with_message(message.clone()),
            )
        } else {
            RuleCheck::Pass
        }
    })
}

/// The value belongs to the prototype token's class.
pub fn instance(token: Proto) -> Rule {
    Rule::new("instance", token)
}

/// Literal equality.
pub fn equal(value: Value) -> Rule {
    Rule::new("equal", Pattern::Equal(value))
}

/// A pattern defined by an arbitrary predicate closure.
pub fn lambda(
    predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    message: impl Into<String>,
) -> Rule {
    let message = message.into();
    Rule::bare("lambda").validate(move |data, key, _| {
        let value = data.get(key).cloned().unwrap_or(Value::Null);
        if predicate(&value) {
            RuleCheck::Pass
        } else {
            RuleCheck::Fail(
                TyError::new(ErrorKind::Exception, &value, "lambda").with_message(message.clone()),
            )
        }
    })
}

/// A pattern resolved lazily on first use. Checks that run before the
/// resolution accept any value; `track` forces resolution.
pub fn asynch(resolve: impl Fn() -> Pattern + Send + Sync + 'static) -> Rule {
    let mut rule = Rule::bare("asynch");
    rule.deferred = Some(Deferred {
        resolve: Arc::new(resolve),
        cell: Arc::new(OnceCell::new()),
    });
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cx() -> CheckCtx<'static> {
        CheckCtx::default()
    }

    #[test]
    fn ifexist_skips_absent_keys() {
        let rule = ifexist(Proto::String);
        let data = json!({});
        assert!(rule.check_entry(&data, "nick", &cx()).is_ok());

        let data = json!({"nick": 5});
        assert!(rule.check_entry(&data, "nick", &cx()).is_err());
    }

    #[test]
    fn ifnotmatch_substitutes_fallback() {
        let rule = ifnotmatch(Proto::Number, json!(0));
        let data = json!({"count": "x"});
        let outcome = rule.check_entry(&data, "count", &cx()).unwrap();
        assert_eq!(outcome.replacement, Some(json!(0)));

        let data = json!({"count": 3});
        let outcome = rule.check_entry(&data, "count", &cx()).unwrap();
        assert_eq!(outcome.replacement, None);
    }

    #[test]
    fn ifmatch_decorates() {
        let rule = ifmatch(Proto::String, |v| {
            json!(v.as_str().unwrap_or_default().to_uppercase())
        });
        let data = json!({"code": "ab"});
        let outcome = rule.check_entry(&data, "code", &cx()).unwrap();
        assert_eq!(outcome.replacement, Some(json!("AB")));
    }

    #[test]
    fn nullable_accepts_null() {
        let rule = nullable(Proto::Boolean);
        assert!(rule.check_value(&json!(null), &cx()).is_ok());
        assert!(rule.check_value(&json!(true), &cx()).is_ok());
        assert!(rule.check_value(&json!("x"), &cx()).is_err());
    }

    #[test]
    fn shouldexist_depends_on_sibling() {
        let rule = shouldexist(|data| data["kind"] == json!("person"), Proto::String);
        let data = json!({"kind": "person"});
        assert!(rule.check_entry(&data, "name", &cx()).is_err());

        let data = json!({"kind": "robot"});
        assert!(rule.check_entry(&data, "name", &cx()).is_ok());
    }

    #[test]
    fn shouldnotexist_rejects_presence() {
        let rule = shouldnotexist(|data| data["anonymous"] == json!(true));
        let data = json!({"anonymous": true, "name": "x"});
        let err = rule.check_entry(&data, "name", &cx()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Overflow);

        let data = json!({"anonymous": false, "name": "x"});
        assert!(rule.check_entry(&data, "name", &cx()).is_ok());
    }

    #[test]
    fn match_all_requires_every_pattern() {
        let rule = match_all([
            Pattern::from(Proto::String),
            Pattern::from(Proto::regex("^a")),
        ]);
        assert!(rule.check_value(&json!("abc"), &cx()).is_ok());
        assert!(rule.check_value(&json!("xbc"), &cx()).is_err());
    }

    #[test]
    fn determine_picks_pattern_from_siblings() {
        let rule = determine(|data| {
            if data["strict_age"] == json!(true) {
                Pattern::from(Proto::Int)
            } else {
                Pattern::from(Proto::Number)
            }
        });
        let data = json!({"strict_age": true, "age": 1.5});
        assert!(rule.check_entry(&data, "age", &cx()).is_err());

        let data = json!({"strict_age": false, "age": 1.5});
        assert!(rule.check_entry(&data, "age", &cx()).is_ok());
    }

    #[test]
    fn shouldmatch_overrides_message() {
        let rule = shouldmatch(Proto::String, "name must be text");
        let err = rule.check_value(&json!(1), &cx()).unwrap_err();
        assert_eq!(err.to_string(), "name must be text");
    }

    #[test]
    fn shouldnotmatch_inverts() {
        let rule = shouldnotmatch(Proto::Null, "must not be empty");
        assert!(rule.check_value(&json!(1), &cx()).is_ok());
        let err = rule.check_value(&json!(null), &cx()).unwrap_err();
        assert_eq!(err.to_string(), "must not be empty");
    }

    #[test]
    fn lambda_uses_predicate() {
        let rule = lambda(
            |v| v.as_str().is_some_and(|s| s.len() < 4),
            "too long",
        );
        assert!(rule.check_value(&json!("abc"), &cx()).is_ok());
        assert!(rule.check_value(&json!("abcdef"), &cx()).is_err());
    }

    #[test]
    fn asynch_accepts_until_resolved() {
        let rule = asynch(|| Pattern::from(Proto::Number));
        // Unresolved: anything passes.
        assert!(rule.check_value(&json!("text"), &cx()).is_ok());

        // Forced resolution (track semantics): the real pattern applies.
        let force = CheckCtx {
            resolve_deferred: true,
            ..CheckCtx::default()
        };
        assert!(rule.check_value(&json!("text"), &force).is_err());
        assert!(rule.check_value(&json!(5), &force).is_ok());

        // Once resolved, even non-forcing checks see it.
        assert!(rule.check_value(&json!("text"), &cx()).is_err());
    }
}
