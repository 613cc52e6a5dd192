//! Property tests: `catch` and `expect` are two views of one check, and
//! structural checks agree with hand-rolled membership.

use mould_ty::{dict, list, range, Pattern, Proto, Ty, Type};
use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(|n| Value::from(n as i64)),
        "[a-z]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| { json!(m) }),
        ]
    })
}

fn arb_type() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::new(Proto::Any)),
        Just(Type::new(Proto::Null)),
        Just(Type::new(Proto::Number)),
        Just(Type::new(Proto::String)),
        Just(Type::new(Proto::Boolean)),
        Just(Type::new(Proto::Array)),
        Just(Type::new(Proto::Object)),
        Just(list([Proto::Number])),
        Just(list([Proto::String])),
        Just(dict([("a", Proto::Number)])),
        Just(dict([("a", Proto::Number), ("b", Proto::String)]).strict()),
        Just(range(-100.0, 100.0)),
        (any::<i32>()).prop_map(|n| Type::new(Pattern::Equal(json!(n as i64)))),
    ]
}

proptest! {
    /// catch(v).by(t) == None  ⇔  expect(v).to_match(t) is Ok.
    #[test]
    fn catch_agrees_with_expect(value in arb_value(), ty in arb_type()) {
        let caught = Ty::catch(&value).by(&ty);
        let asserted = Ty::expect(&value).to_match(&ty);
        prop_assert_eq!(caught.is_none(), asserted.is_ok());
        if let (Some(err), Err(thrown)) = (caught, asserted) {
            prop_assert_eq!(err.kind, thrown.kind);
        }
    }

    /// Boolean membership agrees with the error channel.
    #[test]
    fn test_agrees_with_catch(value in arb_value(), ty in arb_type()) {
        prop_assert_eq!(ty.test(&value), ty.catch(&value).is_none());
    }

    /// A homogeneous list accepts exactly the arrays whose every element
    /// is accepted.
    #[test]
    fn list_membership_is_elementwise(values in prop::collection::vec(arb_value(), 0..6)) {
        let numbers = list([Proto::Number]);
        let expectation = values.iter().all(|v| v.is_number());
        let actual = numbers.test(&Value::Array(values));
        prop_assert_eq!(actual, expectation);
    }

    /// Loose mode accepts whatever strict mode accepts.
    #[test]
    fn strict_is_no_weaker_than_loose(value in arb_value()) {
        let shape = dict([("a", Proto::Number), ("b", Proto::String)]);
        if shape.strict().test(&value) {
            prop_assert!(shape.test(&value));
        }
    }

    /// Range membership matches plain comparison.
    #[test]
    fn range_matches_comparison(n in -200i64..200) {
        let bounds = range(-100.0, 100.0);
        let expectation = (-100..=100).contains(&n);
        prop_assert_eq!(bounds.test(&json!(n)), expectation);
    }
}
