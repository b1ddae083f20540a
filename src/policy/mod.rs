//! Policies and the registry that names them.
//!
//! A [`Policy`] turns reference state into a root [`Test`] over the whole
//! event log. The [`PolicyRegistry`] is assembled once at startup through a
//! [`RegistryBuilder`] and is read-only afterwards, so it can be shared across
//! concurrent verifications without locking.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::Test;
use crate::error::{Error, Result};
use crate::schema::SchemaError;

pub mod example;

pub use example::Example;

/// A reference policy for measured-boot logs.
pub trait Policy: Send + Sync {
    /// PCR indices whose events this policy inspects.
    fn relevant_pcrs(&self) -> &BTreeSet<u32>;

    /// Build the root test for `refstate`. Implementations validate the
    /// reference state themselves before reading any field.
    ///
    /// # Errors
    ///
    /// Returns the schema violation when `refstate` is malformed.
    fn compile(&self, refstate: &Value) -> std::result::Result<Test, SchemaError>;
}

/// Collects policies during startup.
#[derive(Default)]
pub struct RegistryBuilder {
    policies: BTreeMap<String, Arc<dyn Policy>>,
}

impl RegistryBuilder {
    /// Register `policy` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePolicy`] when `name` is taken.
    pub fn register(&mut self, name: &str, policy: Arc<dyn Policy>) -> Result<&mut Self> {
        if self.policies.contains_key(name) {
            return Err(Error::DuplicatePolicy {
                name: name.to_owned(),
            });
        }
        debug!(policy = name, "policy registered");
        self.policies.insert(name.to_owned(), policy);
        Ok(self)
    }

    /// Freeze the collected policies.
    pub fn build(self) -> PolicyRegistry {
        info!(count = self.policies.len(), "policy registry built");
        PolicyRegistry {
            policies: self.policies,
        }
    }
}

/// Immutable mapping from policy name to policy.
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<dyn Policy>>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicyRegistry {
    /// Start collecting policies.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry of the built-in policies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePolicy`] if two built-ins share a name.
    pub fn builtin() -> Result<Self> {
        let mut builder = Self::builder();
        builder.register(example::NAME, Arc::new(Example::new()))?;
        Ok(builder.build())
    }

    /// Policy registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPolicy`] when nothing is registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Policy>> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownPolicy {
                name: name.to_owned(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Compile `refstate` with the named policy and validate `log` against it.
    ///
    /// `log` is the generic form of an event log: `{"events": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns the lookup, schema, or validation failure.
    pub fn verify(&self, name: &str, refstate: &Value, log: &Value) -> Result<()> {
        let policy = self.get(name)?;
        let test = policy.compile(refstate).inspect_err(|e| {
            warn!(policy = name, error = %e, "reference state rejected");
        })?;
        debug!(policy = name, "policy compiled");
        match test.validate(log) {
            Ok(()) => {
                info!(policy = name, "boot log accepted");
                Ok(())
            }
            Err(e) => {
                warn!(policy = name, error = %e, "boot log rejected");
                Err(e.into())
            }
        }
    }
}
