//! Delayed binding: values seen at one point of the event stream, checked at
//! another.
//!
//! A [`DelayToFields`] owns a group of named slots and a test over them.
//! Within one validation pass its initializer clears the slots, setters
//! reached during the walk append the value they are applied to, and the
//! finalizer presents the slots as `{name: [values…]}` to the group's test.
//! Getters read one slot mid-pass.
//!
//! Slot storage lives in [`Slots`], allocated per pass by
//! [`Test::validate`], so compiled tests stay immutable and shareable.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use super::error::{TestError, TestErrorKind};
use super::Test;

/// Why a slot could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No initializer for the slot ran in this pass.
    Uninitialized,
    /// Initialized, but no setter has written it yet.
    Unset,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("not initialized in this pass"),
            Self::Unset => f.write_str("not yet bound"),
        }
    }
}

/// Per-pass slot storage.
#[derive(Debug, Default)]
pub struct Slots {
    table: HashMap<String, Vec<Value>>,
}

impl Slots {
    /// Fresh, empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear `names`, making them writable and unbound.
    pub fn initialize<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            self.table.insert(name.clone(), Vec::new());
        }
    }

    /// Append a value to an initialized slot.
    ///
    /// # Errors
    ///
    /// Returns [`SlotState::Uninitialized`] when no initializer ran.
    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), SlotState> {
        let slot = self.table.get_mut(name).ok_or(SlotState::Uninitialized)?;
        slot.push(value);
        Ok(())
    }

    /// Values written to a slot so far.
    ///
    /// # Errors
    ///
    /// Returns the slot's state when it is uninitialized or has never been
    /// written in this pass.
    pub fn read(&self, name: &str) -> Result<&[Value], SlotState> {
        match self.table.get(name) {
            None => Err(SlotState::Uninitialized),
            Some(values) if values.is_empty() => Err(SlotState::Unset),
            Some(values) => Ok(values),
        }
    }
}

fn unbound(slot: &str, state: SlotState) -> TestError {
    TestErrorKind::UnboundSlot {
        slot: slot.to_owned(),
        state,
    }
    .into()
}

/// Apply a setter: record `input` in `slot`.
pub(super) fn set(slot: &str, input: &Value, slots: &mut Slots) -> Result<(), TestError> {
    slots
        .bind(slot, input.clone())
        .map_err(|state| unbound(slot, state))
}

/// Current values of `slot` as a sequence.
pub(super) fn get(slot: &str, slots: &Slots) -> Result<Value, TestError> {
    slots
        .read(slot)
        .map(|values| Value::Array(values.to_vec()))
        .map_err(|state| unbound(slot, state))
}

/// Object view of a whole slot group, for the finalizer.
pub(super) fn gather(names: &[String], slots: &Slots) -> Result<Value, TestError> {
    let mut fields = Map::new();
    for name in names {
        fields.insert(name.clone(), get(name, slots)?);
    }
    Ok(Value::Object(fields))
}

/// A group of slots and the test run over them once the stream is walked.
#[derive(Debug, Clone)]
pub struct DelayToFields {
    fields_test: Test,
    names: Vec<String>,
}

impl DelayToFields {
    /// Group `names` whose gathered values `fields_test` will validate.
    pub fn new<I, S>(fields_test: Test, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields_test,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Test that clears every slot of the group. Must run before setters.
    pub fn initializer(&self) -> Test {
        Test::DelayInit {
            slots: self.names.clone(),
        }
    }

    /// Test that accepts its input and records it in `name`.
    pub fn setter(&self, name: &str) -> Test {
        Test::DelaySet {
            slot: name.to_owned(),
        }
    }

    /// Test that runs `test` over the values recorded in `name` so far.
    pub fn get(&self, name: &str, test: Test) -> Test {
        Test::DelayGet {
            slot: name.to_owned(),
            test: Box::new(test),
        }
    }

    /// Test that validates the gathered group; its own input is ignored.
    pub fn finalizer(&self) -> Test {
        Test::DelayFinal {
            slots: self.names.clone(),
            test: Box::new(self.fields_test.clone()),
        }
    }
}
