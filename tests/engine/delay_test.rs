//! Tests for `src/engine/delay.rs`: delayed binding across a pass.

use serde_json::json;

use mba_policy::engine::{DelayToFields, SlotState, Slots, Test, TestErrorKind};
use mba_policy::ErrorKind;

fn group() -> DelayToFields {
    DelayToFields::new(
        Test::fields([("seen", Test::Tuple(vec![Test::IntEqual(1), Test::IntEqual(2)]))]),
        ["seen"],
    )
}

#[test]
fn getter_before_setter_is_unbound() {
    let delay = group();
    let test = Test::And(vec![
        delay.initializer(),
        delay.get("seen", Test::AcceptAll),
        delay.setter("seen"),
    ]);
    let err = test.validate(&json!(1)).expect_err("read before write");
    assert_eq!(
        err.kind(),
        &TestErrorKind::UnboundSlot {
            slot: "seen".to_owned(),
            state: SlotState::Unset
        }
    );
    assert_eq!(err.kind().class(), ErrorKind::UnboundSlot);
}

#[test]
fn getter_without_initializer_is_unbound() {
    let delay = group();
    let err = delay
        .get("seen", Test::AcceptAll)
        .validate(&json!(null))
        .expect_err("no initializer");
    assert!(matches!(
        err.kind(),
        TestErrorKind::UnboundSlot {
            state: SlotState::Uninitialized,
            ..
        }
    ));
}

#[test]
fn setter_without_initializer_is_unbound() {
    let err = group()
        .setter("seen")
        .validate(&json!(1))
        .expect_err("no initializer");
    assert!(matches!(err.kind(), TestErrorKind::UnboundSlot { .. }));
}

#[test]
fn getter_observes_what_setter_wrote() {
    let delay = group();
    let test = Test::And(vec![
        delay.initializer(),
        delay.setter("seen"),
        delay.get("seen", Test::Tuple(vec![Test::StringEqual("v".to_owned())])),
    ]);
    assert!(test.validate(&json!("v")).is_ok());
}

#[test]
fn finalizer_checks_values_gathered_across_a_walk() {
    let delay = group();
    let walk = Test::Iterate {
        element: Box::new(delay.setter("seen")),
        show_elt: false,
    };
    let test = Test::And(vec![delay.initializer(), walk, delay.finalizer()]);

    assert!(test.validate(&json!([1, 2])).is_ok());

    let err = test.validate(&json!([1, 3])).expect_err("second differs");
    assert_eq!(err.path_string(), ".seen[1]");
}

#[test]
fn each_validation_starts_with_fresh_slots() {
    let delay = group();
    let walk = Test::Iterate {
        element: Box::new(delay.setter("seen")),
        show_elt: false,
    };
    let test = Test::And(vec![delay.initializer(), walk, delay.finalizer()]);
    for _ in 0..3 {
        assert!(test.validate(&json!([1, 2])).is_ok());
    }
}

#[test]
fn caller_owned_slots_persist_between_checks() {
    let delay = group();
    let mut slots = Slots::new();
    delay
        .initializer()
        .check(&json!(null), &mut slots)
        .expect("initializes");
    delay.setter("seen").check(&json!(1), &mut slots).expect("binds");
    delay.setter("seen").check(&json!(2), &mut slots).expect("binds");
    delay
        .finalizer()
        .check(&json!(null), &mut slots)
        .expect("1 then 2");
    assert_eq!(slots.read("seen").map(<[_]>::len), Ok(2));
}
