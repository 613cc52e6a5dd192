//! A realistic form model: coercing setter/getter, range-typed field,
//! nullable field with conditional visibility, length validation.

use mould_model::{FieldDef, Guard, IssueKind, Model, Schema, Validator};
use mould_ty::{nullable, range, Pattern, Proto};
use serde_json::{json, Value};

fn form_schema() -> Schema {
    Schema::new()
        .field(
            "name",
            FieldDef::new()
                .default(json!(""))
                .ty(Proto::String)
                .validator(
                    Validator::new(|v: &Value, _| v.as_str().is_some_and(|s| s.len() < 12))
                        .message("too long"),
                ),
        )
        .field(
            "age",
            FieldDef::new()
                .default(json!(0))
                .ty(Proto::Number)
                .setter(|v, _| match v {
                    Value::String(s) => s
                        .parse::<i64>()
                        .map(Value::from)
                        .unwrap_or_else(|_| v.clone()),
                    _ => v.clone(),
                })
                .getter(|v, _| match v.as_i64() {
                    Some(n) if n != 0 => json!(n.to_string()),
                    _ => json!(""),
                }),
        )
        .field("sex", FieldDef::new().default(json!(1)).ty(range(1.0, 2.0)))
        .field(
            "married",
            FieldDef::new()
                .default(json!(null))
                .ty(Pattern::from(nullable(Proto::Boolean)))
                .hidden(Guard::by(|m| m.data()["age"].as_i64().unwrap_or(0) < 20)),
        )
}

#[test]
fn input_is_coerced_into_storage_form() {
    let model = Model::with_data(form_schema(), &json!({"name": "", "age": "14"})).unwrap();

    // Storage representation is post-setter; the user-facing state goes
    // back through the getter.
    assert_eq!(model.data()["age"], json!(14));
    assert_eq!(model.state()["age"], json!("14"));
    assert_eq!(model.get("age"), json!("14"));

    // A minor sees the marital field hidden.
    assert!(model.view("married").unwrap().hidden());
}

#[test]
fn hidden_follows_its_dependency() {
    let model = Model::with_data(form_schema(), &json!({"age": "25"})).unwrap();
    assert!(!model.view("married").unwrap().hidden());

    let model = Model::new(form_schema()).unwrap();
    assert!(model.view("married").unwrap().hidden());
}

#[test]
fn defaults_satisfy_declared_types() {
    let model = Model::new(form_schema()).unwrap();
    assert!(model.validate().is_empty());
}

#[test]
fn validator_aggregation_reports_key_index_message() {
    let model = Model::new(form_schema()).unwrap();
    model.set("name", json!("abcdefghijklmn"));

    let issues = model.validate_key("name");
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].key, "name");
    assert_eq!(issues[0].at, Some(0));
    assert_eq!(issues[0].message, "too long");
    assert_eq!(issues[0].kind, IssueKind::Validator);
}

#[test]
fn nullable_field_accepts_null_and_bool() {
    let model = Model::new(form_schema()).unwrap();
    assert!(model.validate_key("married").is_empty());

    model.set("married", json!(true));
    assert!(model.validate_key("married").is_empty());
    assert_eq!(model.get("married"), json!(true));
}

#[test]
fn range_type_rejects_out_of_bounds_writes() {
    let errors = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = errors.clone();
    let model = Model::builder(form_schema())
        .on_error(move |e| sink.borrow_mut().push(e.to_string()))
        .build()
        .unwrap();

    model.set("sex", json!(2));
    assert!(errors.borrow().is_empty());

    // Out of range: the write still lands (type failures are routed, not
    // thrown) but an error is emitted and validation reports it.
    model.set("sex", json!(3));
    assert_eq!(errors.borrow().len(), 1);
    assert_eq!(model.validate_key("sex").len(), 1);
}

#[test]
fn setter_getter_idempotence() {
    let model = Model::with_data(form_schema(), &json!({"age": "14"})).unwrap();
    let before = model.data();

    // Writing back what get() returns must not change the stored form.
    let echoed = model.get("age");
    model.set("age", echoed);
    assert_eq!(model.data(), before);
}
