//! Key-based selection of the test that validates one event.
//!
//! A [`Dispatcher`] reads its key fields off an element and looks the
//! resulting key up in its table. The table is an allow-list: an element
//! whose key is not registered is rejected.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tracing::debug;

use super::error::{render_value, TestError, TestErrorKind};
use super::Test;

/// One component of a dispatch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    /// Integer field, e.g. a PCR index.
    Int(i64),
    /// String field, e.g. an event type.
    Str(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Values of the key fields of one element, in key-field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchKey(pub Vec<KeyPart>);

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str(")")
    }
}

impl From<(u32, &str)> for DispatchKey {
    fn from((pcr, event_type): (u32, &str)) -> Self {
        Self(vec![
            KeyPart::Int(i64::from(pcr)),
            KeyPart::Str(event_type.to_owned()),
        ])
    }
}

impl From<Vec<KeyPart>> for DispatchKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

/// Table from key to test, plus the names of the fields forming the key.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    key_fields: Vec<String>,
    table: HashMap<DispatchKey, Test>,
}

impl Dispatcher {
    /// Empty dispatcher keyed on the given fields.
    pub fn new<I, S>(key_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_fields: key_fields.into_iter().map(Into::into).collect(),
            table: HashMap::new(),
        }
    }

    /// Register `test` for `key`. A later registration for the same key replaces
    /// the earlier one.
    pub fn set(&mut self, key: impl Into<DispatchKey>, test: Test) {
        let key = key.into();
        if self.table.insert(key.clone(), test).is_some() {
            debug!(%key, "dispatch entry overwritten");
        }
    }

    /// Test registered for `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`TestErrorKind::Dispatch`] failure when nothing is registered.
    pub fn get(&self, key: &DispatchKey) -> Result<&Test, TestError> {
        self.table
            .get(key)
            .ok_or_else(|| TestErrorKind::Dispatch { key: key.clone() }.into())
    }

    /// Extract the key of `element`.
    ///
    /// # Errors
    ///
    /// Fails when the element is not an object, lacks a key field, or a key
    /// field is neither an integer nor a string.
    pub fn key_of(&self, element: &Value) -> Result<DispatchKey, TestError> {
        let obj = element.as_object().ok_or_else(|| TestErrorKind::WrongShape {
            expected: "an object",
            found: render_value(element),
        })?;
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let value = obj.get(field).ok_or_else(|| TestErrorKind::MissingField {
                field: field.clone(),
            })?;
            let part = match value {
                Value::String(s) => KeyPart::Str(s.clone()),
                other => match other.as_i64() {
                    Some(n) => KeyPart::Int(n),
                    None => {
                        return Err(TestErrorKind::WrongShape {
                            expected: "an integer or string key field",
                            found: render_value(other),
                        }
                        .into())
                    }
                },
            };
            parts.push(part);
        }
        Ok(DispatchKey(parts))
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no key is registered.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&DispatchKey> {
        let mut keys: Vec<_> = self.table.keys().collect();
        keys.sort();
        keys
    }
}
