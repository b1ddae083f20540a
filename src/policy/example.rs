//! Reference secure-boot policy.
//!
//! Accepts the routine firmware, separator and configuration events at the
//! PCRs where a UEFI shim/grub/Linux boot emits them, rejects every other
//! (PCR, event type) combination, and checks that the three boot-services
//! applications loaded at PCR 4 (shim, bootloader, kernel) carry the
//! authenticode digests of an allowed `kernels` entry.
//!
//! The three applications are separate events, so each is collected into the
//! `bsas` slot as the log is walked and the triple is checked once at the end.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use crate::digest::{Digest, HashAlg};
use crate::engine::{DelayToFields, Dispatcher, Test};
use crate::event::{EVENT_TYPE_FIELD, PCR_INDEX_FIELD};
use crate::refstate::{refstate_schema, KernelRef};
use crate::schema::{SchemaError, ValueType};

use super::Policy;

/// Registry name of this policy.
pub const NAME: &str = "example";

/// Slot collecting boot-services-application events.
const BSAS: &str = "bsas";

/// Event types accepted without inspection, by PCR.
const BENIGN_EVENTS: &[(u32, &str)] = &[
    (0, "EV_NO_ACTION"),
    (0, "EV_S_CRTM_CONTENTS"),
    (0, "EV_S_CRTM_VERSION"),
    (0, "EV_EFI_PLATFORM_FIRMWARE_BLOB"),
    (0, "EV_POST_CODE"),
    (0, "EV_NONHOST_INFO"),
    (0, "EV_SEPARATOR"),
    (1, "EV_NONHOST_CONFIG"),
    (1, "EV_EFI_VARIABLE_BOOT"),
    (1, "EV_EFI_VARIABLE_DRIVER_CONFIG"),
    (1, "EV_EFI_HANDOFF_TABLES"),
    (1, "EV_PLATFORM_CONFIG_FLAGS"),
    (1, "EV_SEPARATOR"),
    (2, "EV_NONHOST_INFO"),
    (2, "EV_SEPARATOR"),
    (3, "EV_SEPARATOR"),
    (4, "EV_EFI_ACTION"),
    (4, "EV_SEPARATOR"),
    (5, "EV_EFI_GPT_EVENT"),
    (5, "EV_EFI_ACTION"),
    (5, "EV_SEPARATOR"),
    (6, "EV_COMPACT_HASH"),
    (6, "EV_SEPARATOR"),
    (7, "EV_EFI_VARIABLE_DRIVER_CONFIG"),
    (7, "EV_EFI_VARIABLE_AUTHORITY"),
    (7, "EV_SEPARATOR"),
    (8, "EV_IPL"),
    (9, "EV_IPL"),
    (14, "EV_IPL"),
];

/// Boot-services-application event type.
pub const EV_EFI_BOOT_SERVICES_APPLICATION: &str = "EV_EFI_BOOT_SERVICES_APPLICATION";

/// The reference secure-boot policy.
#[derive(Debug, Clone)]
pub struct Example {
    relevant_pcrs: BTreeSet<u32>,
}

impl Default for Example {
    fn default() -> Self {
        Self::new()
    }
}

impl Example {
    /// Policy over PCRs 0–9 and 14.
    pub fn new() -> Self {
        Self {
            relevant_pcrs: (0..10).chain([14]).collect(),
        }
    }
}

/// Digest test matching one sha256 value.
fn sha256_test(bytes: &[u8]) -> Test {
    Test::Digest(Digest::new().with(HashAlg::Sha256, bytes))
}

/// Shim, bootloader and kernel, in load order.
fn bsa_test(kernel: &KernelRef) -> Test {
    Test::Tuple(vec![
        sha256_test(&kernel.shim_authcode_sha256),
        sha256_test(&kernel.grub_authcode_sha256),
        sha256_test(&kernel.kernel_authcode_sha256),
    ])
}

fn allowed_kernels(refstate: &Value) -> Result<Vec<KernelRef>, SchemaError> {
    let entries = refstate
        .get("kernels")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::invalid("reference state has no kernels list"))?;
    if entries.is_empty() {
        return Err(SchemaError::invalid("kernels list is empty").within_field("kernels"));
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            KernelRef::from_value(entry).map_err(|e| {
                e.within(crate::engine::PathSegment::Index(i))
                    .within_field("kernels")
            })
        })
        .collect()
}

impl Policy for Example {
    fn relevant_pcrs(&self) -> &BTreeSet<u32> {
        &self.relevant_pcrs
    }

    fn compile(&self, refstate: &Value) -> Result<Test, SchemaError> {
        if !ValueType::Mapping.matches(refstate) {
            return Err(SchemaError::invalid(format!(
                "expected reference state to be a mapping, got {refstate}"
            )));
        }
        refstate_schema().check(refstate)?;
        let kernels = allowed_kernels(refstate)?;

        // One allowed kernel is checked directly so a mismatch names the
        // tuple position; several are tried in turn.
        let bsas = match kernels.as_slice() {
            [only] => bsa_test(only),
            many => Test::Or(many.iter().map(bsa_test).collect()),
        };
        let delay = DelayToFields::new(Test::fields([(BSAS, bsas)]), [BSAS]);

        let mut dispatcher = Dispatcher::new([PCR_INDEX_FIELD, EVENT_TYPE_FIELD]);
        for &(pcr, event_type) in BENIGN_EVENTS {
            dispatcher.set((pcr, event_type), Test::AcceptAll);
        }
        dispatcher.set((4, EV_EFI_BOOT_SERVICES_APPLICATION), delay.setter(BSAS));
        debug!(
            entries = dispatcher.len(),
            kernels = kernels.len(),
            "example policy compiled"
        );

        Ok(Test::hidden_field(
            "events",
            Test::And(vec![
                delay.initializer(),
                Test::iterate(dispatcher, true),
                delay.finalizer(),
            ]),
        ))
    }
}
