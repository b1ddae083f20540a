//! The test algebra: composable validation rules over parsed log values.
//!
//! A [`Test`] is built once per verification from reference state and then
//! applied to the event log. Every test either accepts its input silently or
//! returns a [`TestError`] naming where and why it failed; the first failure
//! aborts the whole validation.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::digest::{prefixed_hex, Digest};
use crate::event::{event_digest, DIGESTS_FIELD};

pub mod delay;
pub mod dispatch;
pub mod error;

pub use delay::{DelayToFields, SlotState, Slots};
pub use dispatch::{DispatchKey, Dispatcher, KeyPart};
pub use error::{PathSegment, TestError, TestErrorKind};

use error::render_value;

/// A validation rule.
#[derive(Debug, Clone)]
pub enum Test {
    /// Accepts anything.
    AcceptAll,
    /// Rejects anything with a fixed reason.
    RejectAll(String),
    /// Every sub-test must accept the input; stops at the first failure.
    And(Vec<Test>),
    /// Some sub-test must accept the input; tried in order.
    Or(Vec<Test>),
    /// Input is a sequence of exactly this many elements, tested positionally.
    Tuple(Vec<Test>),
    /// Input is an object with field `name`, whose value `test` accepts.
    Field {
        /// Field name.
        name: String,
        /// Test for the field value.
        test: Box<Test>,
        /// Whether the field name appears in failure paths.
        show_name: bool,
    },
    /// Input is an object carrying every listed field, each passing its test.
    Fields(Vec<(String, Test)>),
    /// Input is a sequence; `element` must accept every item.
    Iterate {
        /// Per-element test.
        element: Box<Test>,
        /// Whether a failing element is echoed in the error.
        show_elt: bool,
    },
    /// Selects the test for one element by its key fields.
    Dispatch(Arc<Dispatcher>),
    /// Input's digests must equal these for every algorithm listed here.
    Digest(Digest),
    /// Input is this integer.
    IntEqual(i64),
    /// Input is this string.
    StringEqual(String),
    /// Input is a string matching this anchored pattern.
    RegExp(Regex),
    /// Clears delayed-binding slots for the current pass.
    DelayInit {
        /// Slots to clear.
        slots: Vec<String>,
    },
    /// Accepts its input and appends it to a slot.
    DelaySet {
        /// Slot written.
        slot: String,
    },
    /// Runs `test` over the values recorded in a slot.
    DelayGet {
        /// Slot read.
        slot: String,
        /// Test applied to the slot's values.
        test: Box<Test>,
    },
    /// Runs `test` over an object gathering every named slot.
    DelayFinal {
        /// Slots gathered.
        slots: Vec<String>,
        /// Test applied to `{slot: [values…]}`.
        test: Box<Test>,
    },
}

impl Test {
    /// Field test that shows the field name in failure paths.
    pub fn field(name: impl Into<String>, test: Test) -> Self {
        Self::Field {
            name: name.into(),
            test: Box::new(test),
            show_name: true,
        }
    }

    /// Field test for a synthetic wrapper field left out of failure paths.
    pub fn hidden_field(name: impl Into<String>, test: Test) -> Self {
        Self::Field {
            name: name.into(),
            test: Box::new(test),
            show_name: false,
        }
    }

    /// Object test over several fields.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Test)>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(|(n, t)| (n.into(), t)).collect())
    }

    /// Iterate a sequence, dispatching every element through `dispatcher`.
    pub fn iterate(dispatcher: Dispatcher, show_elt: bool) -> Self {
        Self::Iterate {
            element: Box::new(Self::Dispatch(Arc::new(dispatcher))),
            show_elt,
        }
    }

    /// Pattern test; the pattern must match the whole string.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid pattern.
    pub fn regexp(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::RegExp(Regex::new(&format!("^(?:{pattern})$"))?))
    }

    /// Run this test over `input` with fresh slot storage.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn validate(&self, input: &Value) -> Result<(), TestError> {
        let mut slots = Slots::new();
        self.check(input, &mut slots)
    }

    /// Run this test over `input` using caller-owned slot storage.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn check(&self, input: &Value, slots: &mut Slots) -> Result<(), TestError> {
        match self {
            Self::AcceptAll => Ok(()),
            Self::RejectAll(reason) => Err(TestErrorKind::Rejected {
                reason: reason.clone(),
            }
            .into()),
            Self::And(tests) => tests.iter().try_for_each(|t| t.check(input, slots)),
            Self::Or(tests) => check_any(tests, input, slots),
            Self::Tuple(tests) => check_tuple(tests, input, slots),
            Self::Field {
                name,
                test,
                show_name,
            } => {
                let value = field_of(input, name)?;
                test.check(value, slots).map_err(|e| {
                    if *show_name {
                        e.within(PathSegment::Field(name.clone()))
                    } else {
                        e
                    }
                })
            }
            Self::Fields(fields) => fields.iter().try_for_each(|(name, test)| {
                let value = field_of(input, name)?;
                test.check(value, slots)
                    .map_err(|e| e.within(PathSegment::Field(name.clone())))
            }),
            Self::Iterate { element, show_elt } => {
                let items = sequence_of(input)?;
                for (i, item) in items.iter().enumerate() {
                    element.check(item, slots).map_err(|e| {
                        let e = e.within(PathSegment::Index(i));
                        if *show_elt {
                            e.with_element(item)
                        } else {
                            e
                        }
                    })?;
                }
                Ok(())
            }
            Self::Dispatch(dispatcher) => {
                let key = dispatcher.key_of(input)?;
                let test = dispatcher.get(&key)?;
                test.check(input, slots)
                    .map_err(|e| e.within(PathSegment::Key(key)))
            }
            Self::Digest(expected) => check_digest(expected, input),
            Self::IntEqual(expected) => {
                let actual = input.as_i64().ok_or_else(|| wrong_shape("an integer", input))?;
                if actual == *expected {
                    Ok(())
                } else {
                    Err(mismatch("integer", expected.to_string(), actual.to_string()))
                }
            }
            Self::StringEqual(expected) => {
                let actual = input.as_str().ok_or_else(|| wrong_shape("a string", input))?;
                if actual == expected {
                    Ok(())
                } else {
                    Err(mismatch("string", format!("{expected:?}"), format!("{actual:?}")))
                }
            }
            Self::RegExp(pattern) => {
                let actual = input.as_str().ok_or_else(|| wrong_shape("a string", input))?;
                if pattern.is_match(actual) {
                    Ok(())
                } else {
                    Err(TestErrorKind::NoMatch {
                        pattern: pattern.as_str().to_owned(),
                        value: format!("{actual:?}"),
                    }
                    .into())
                }
            }
            Self::DelayInit { slots: names } => {
                slots.initialize(names);
                Ok(())
            }
            Self::DelaySet { slot } => delay::set(slot, input, slots),
            Self::DelayGet { slot, test } => {
                let values = delay::get(slot, slots)?;
                test.check(&values, slots)
                    .map_err(|e| e.within(PathSegment::Slot(slot.clone())))
            }
            Self::DelayFinal { slots: names, test } => {
                let gathered = delay::gather(names, slots)?;
                test.check(&gathered, slots)
            }
        }
    }
}

fn wrong_shape(expected: &'static str, found: &Value) -> TestError {
    TestErrorKind::WrongShape {
        expected,
        found: render_value(found),
    }
    .into()
}

fn mismatch(what: impl Into<String>, expected: String, actual: String) -> TestError {
    TestErrorKind::FieldMismatch {
        what: what.into(),
        expected,
        actual,
    }
    .into()
}

fn field_of<'v>(input: &'v Value, name: &str) -> Result<&'v Value, TestError> {
    let obj = input
        .as_object()
        .ok_or_else(|| wrong_shape("an object", input))?;
    obj.get(name).ok_or_else(|| {
        TestErrorKind::MissingField {
            field: name.to_owned(),
        }
        .into()
    })
}

fn sequence_of(input: &Value) -> Result<&Vec<Value>, TestError> {
    input
        .as_array()
        .ok_or_else(|| wrong_shape("a sequence", input))
}

fn check_tuple(tests: &[Test], input: &Value, slots: &mut Slots) -> Result<(), TestError> {
    let items = sequence_of(input)?;
    if items.len() != tests.len() {
        return Err(TestErrorKind::LengthMismatch {
            expected: tests.len(),
            actual: items.len(),
        }
        .into());
    }
    for (i, (test, item)) in tests.iter().zip(items).enumerate() {
        test.check(item, slots)
            .map_err(|e| e.within(PathSegment::Index(i)))?;
    }
    Ok(())
}

fn check_any(tests: &[Test], input: &Value, slots: &mut Slots) -> Result<(), TestError> {
    let mut reasons = Vec::with_capacity(tests.len());
    for test in tests {
        match test.check(input, slots) {
            Ok(()) => return Ok(()),
            Err(e) => reasons.push(e.to_string()),
        }
    }
    Err(TestErrorKind::NoAlternative { reasons }.into())
}

fn check_digest(expected: &Digest, input: &Value) -> Result<(), TestError> {
    let within_digests = |e: TestError| e.within(PathSegment::Field(DIGESTS_FIELD.to_owned()));
    for (alg, want) in expected.iter() {
        let got = event_digest(input, alg.name())
            .map_err(TestErrorKind::from)?
            .ok_or_else(|| {
                within_digests(
                    TestErrorKind::MissingDigest {
                        alg: alg.name().to_owned(),
                    }
                    .into(),
                )
            })?;
        if got.as_slice() != want {
            return Err(within_digests(mismatch(
                format!("{alg} digest"),
                prefixed_hex(want),
                prefixed_hex(&got),
            )));
        }
    }
    Ok(())
}
