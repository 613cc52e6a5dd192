//! The three refusal metas have distinct semantics, and meta faults are
//! collected through the routing contract, never thrown.

use mould_model::{
    FieldDef, Guard, Model, ModelError, Schema, Validator, ValidatorSelection, Verdict,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

type ErrorLog = Rc<RefCell<Vec<ModelError>>>;

fn with_errors(schema: Schema) -> (Model, ErrorLog) {
    let errors: ErrorLog = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    let model = Model::builder(schema)
        .on_error(move |e| sink.borrow_mut().push(e.clone()))
        .build()
        .unwrap();
    (model, errors)
}

#[test]
fn readonly_rejects_writes_but_validates_and_exports() {
    let schema = Schema::new().field(
        "id",
        FieldDef::new().default(json!("fixed")).readonly(true),
    );
    let (model, errors) = with_errors(schema);

    model.set("id", json!("changed"));
    assert_eq!(model.get("id"), json!("fixed"));
    assert!(matches!(
        errors.borrow().last(),
        Some(ModelError::Readonly { .. })
    ));

    assert!(model.validate_key("id").is_empty());
    assert_eq!(model.to_json()["id"], json!("fixed"));
}

#[test]
fn disabled_rejects_writes_validates_empty_and_drops_from_export() {
    let schema = Schema::new().field(
        "ghost",
        FieldDef::new()
            .default(json!("x"))
            .disabled(true)
            .required(true)
            .validator(Validator::new(|_, _| false).message("never passes")),
    );
    let (model, errors) = with_errors(schema);

    model.set("ghost", json!("y"));
    assert_eq!(model.data()["ghost"], json!("x"));
    assert!(matches!(
        errors.borrow().last(),
        Some(ModelError::Disabled { .. })
    ));

    // Disabled short-circuits validation entirely.
    assert!(model.validate_key("ghost").is_empty());
    assert!(model.to_json().get("ghost").is_none());
}

#[test]
fn required_only_affects_validation() {
    let schema = Schema::new().field(
        "email",
        FieldDef::new().default(json!("")).required("email missing"),
    );
    let (model, errors) = with_errors(schema);

    // Writes are not blocked by required.
    model.set("email", json!(""));
    assert!(errors.borrow().is_empty());

    let issues = model.validate_key("email");
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].message, "email missing");

    model.set("email", json!("a@b.c"));
    assert!(model.validate_key("email").is_empty());
}

#[test]
fn force_write_bypasses_readonly_and_disabled() {
    let schema = Schema::new()
        .field("a", FieldDef::new().default(json!(0)).readonly(true))
        .field("b", FieldDef::new().default(json!(0)).disabled(true));
    let model = Model::new(schema).unwrap();

    model.set_force("a", json!(1));
    model.set_force("b", json!(2));
    assert_eq!(model.data()["a"], json!(1));
    assert_eq!(model.data()["b"], json!(2));

    // The lock is not bypassed by force.
    model.lock();
    model.set_force("a", json!(9));
    assert_eq!(model.data()["a"], json!(1));
}

#[test]
fn guard_closures_see_the_model() {
    let schema = Schema::new()
        .field("role", FieldDef::new().default(json!("viewer")))
        .field(
            "quota",
            FieldDef::new()
                .default(json!(10))
                .readonly(Guard::by(|m| m.get("role") != json!("admin"))),
        );
    let model = Model::new(schema).unwrap();

    model.set("quota", json!(50));
    assert_eq!(model.get("quota"), json!(10));

    model.set("role", json!("admin"));
    model.set("quota", json!(50));
    assert_eq!(model.get("quota"), json!(50));
}

#[test]
fn meta_fault_routes_to_catch_then_hook() {
    let schema = Schema::new().field(
        "tricky",
        FieldDef::new()
            .default(json!(1))
            .try_getter(|_, _| Err("getter exploded".into()))
            .catch(|err| {
                assert!(matches!(err, ModelError::Meta { meta, .. } if meta == "getter"));
                Some(json!("fallback"))
            }),
    );
    let (model, errors) = with_errors(schema);

    // The catch sink supplies the read fallback; the hook still saw the
    // normalized fault.
    assert_eq!(model.get("tricky"), json!("fallback"));
    assert!(matches!(
        errors.borrow().last(),
        Some(ModelError::Meta { key, .. }) if key == "tricky"
    ));
}

#[test]
fn meta_fault_without_catch_falls_back_to_stored() {
    let schema = Schema::new().field(
        "plain",
        FieldDef::new()
            .default(json!(7))
            .try_getter(|_, _| Err("nope".into())),
    );
    let (model, errors) = with_errors(schema);

    assert_eq!(model.get("plain"), json!(7));
    assert_eq!(errors.borrow().len(), 1);
}

#[test]
fn validator_selection_spans_and_indices() {
    let schema = Schema::new().field(
        "n",
        FieldDef::new().default(json!(0)).validators([
            Validator::new(|v: &Value, _| v.as_i64().unwrap_or(0) > 0).message("not positive"),
            Validator::new(|v: &Value, _| v.as_i64().unwrap_or(0) % 2 == 0).message("not even"),
            Validator::new(|v: &Value, _| v.as_i64().unwrap_or(0) < 100).message("too big"),
        ]),
    );
    let model = Model::new(schema).unwrap();
    model.set("n", json!(-3));

    // All three: two fail.
    assert_eq!(model.validate_key("n").len(), 2);

    // Span [0, 1): only the positivity check.
    let issues = model.validate_selected("n", ValidatorSelection::Span(0, 1));
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].at, Some(0));

    // Indices [2]: passes.
    assert!(model
        .validate_selected("n", ValidatorSelection::Indices(vec![2]))
        .is_empty());

    // Ad-hoc validators run with index origin zero.
    let adhoc = vec![Validator::new(|_, _| Verdict::FailWith("adhoc".into()))];
    let issues = model.validate_selected("n", ValidatorSelection::Adhoc(adhoc));
    assert_eq!(issues[0].message, "adhoc");
}

#[test]
fn determine_gates_validators() {
    let schema = Schema::new()
        .field("strict", FieldDef::new().default(json!(false)))
        .field(
            "word",
            FieldDef::new().default(json!("")).validator(
                Validator::new(|v: &Value, _| v.as_str().is_some_and(|s| s.len() >= 3))
                    .determine(|_, m| m.get("strict") == json!(true))
                    .message("too short"),
            ),
        );
    let model = Model::new(schema).unwrap();
    model.set("word", json!("ab"));

    assert!(model.validate_key("word").is_empty());
    model.set("strict", json!(true));
    assert_eq!(model.validate_key("word").len(), 1);
}

#[test]
fn nested_validator_issues_are_spliced() {
    let schema = Schema::new().field(
        "inner",
        FieldDef::new().default(json!({})).validator(Validator::new(|_, _| {
            Verdict::Nested(vec![])
        })),
    );
    let model = Model::new(schema).unwrap();
    assert!(model.validate_key("inner").is_empty());
}

#[test]
fn field_watch_meta_fires_with_value_and_prev() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let l2 = log.clone();
    let schema = Schema::new().field(
        "n",
        FieldDef::new().default(json!(0)).watch(move |_, change| {
            l2.borrow_mut()
                .push(format!("{}->{}", change.prev, change.value));
        }),
    );
    let model = Model::new(schema).unwrap();

    model.set("n", json!(1));
    model.set("n", json!(2));
    assert_eq!(log.borrow().as_slice(), ["0->1", "1->2"]);
}

#[test]
fn editing_session_defers_notifications() {
    let schema = Schema::new()
        .field("a", FieldDef::new().default(json!(0)))
        .field("b", FieldDef::new().default(json!(0)));
    let model = Model::new(schema).unwrap();
    let hits = Rc::new(RefCell::new(Vec::new()));
    let h2 = hits.clone();
    model.watch("*", move |ch| h2.borrow_mut().push(ch.key.clone()));

    model.begin_edit();
    model.set("a", json!(1));
    model.set("b", json!(2));
    assert!(hits.borrow().is_empty());
    model.end_edit();
    assert_eq!(hits.borrow().as_slice(), ["a", "b"]);
}
