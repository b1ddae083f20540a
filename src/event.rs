//! Parsed measured-boot events.
//!
//! Events arrive already parsed from the raw TPM log. The engine walks them as
//! generic [`serde_json::Value`]s; the typed [`Event`] and [`EventLog`] exist so
//! callers get a shape check on load and a convenient way to build logs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest::{decode_hex, DigestError, HashAlg};

/// Field holding the PCR index of an event.
pub const PCR_INDEX_FIELD: &str = "PCRIndex";
/// Field holding the TCG event type name.
pub const EVENT_TYPE_FIELD: &str = "EventType";
/// Field holding the event's digests.
pub const DIGESTS_FIELD: &str = "Digests";

/// One digest in the TCG list form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgDigest {
    /// Algorithm name, e.g. `sha256`.
    #[serde(rename = "AlgorithmId")]
    pub algorithm_id: String,
    /// Hex digest, with or without `0x`.
    #[serde(rename = "Digest")]
    pub digest: String,
}

/// The digests of an event in either of the forms log parsers emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventDigests {
    /// `{"sha256": "…"}`
    Map(BTreeMap<String, String>),
    /// `[{"AlgorithmId": "sha256", "Digest": "…"}]`
    List(Vec<AlgDigest>),
}

impl Default for EventDigests {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

/// One measured-boot log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the log, when the parser records it.
    #[serde(rename = "EventNum", default, skip_serializing_if = "Option::is_none")]
    pub event_num: Option<u64>,
    /// PCR the event was extended into.
    #[serde(rename = "PCRIndex")]
    pub pcr_index: u32,
    /// TCG event type, e.g. `EV_SEPARATOR`.
    #[serde(rename = "EventType")]
    pub event_type: String,
    /// Digests extended into the PCR.
    #[serde(rename = "Digests", default)]
    pub digests: EventDigests,
    /// Type-dependent payload.
    #[serde(rename = "Event", default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}

impl Event {
    /// Event with no digests and no payload.
    pub fn new(pcr_index: u32, event_type: impl Into<String>) -> Self {
        Self {
            event_num: None,
            pcr_index,
            event_type: event_type.into(),
            digests: EventDigests::default(),
            event_data: None,
        }
    }

    /// Add a digest given as hex text.
    pub fn with_digest(mut self, alg: HashAlg, hex_text: impl Into<String>) -> Self {
        let hex_text = hex_text.into();
        match &mut self.digests {
            EventDigests::Map(map) => {
                map.insert(alg.name().to_owned(), hex_text);
            }
            EventDigests::List(list) => list.push(AlgDigest {
                algorithm_id: alg.name().to_owned(),
                digest: hex_text,
            }),
        }
        self
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.event_data = Some(data);
        self
    }
}

/// An ordered event sequence, as the policies' root tests expect it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    /// Events in log order.
    pub events: Vec<Event>,
}

impl EventLog {
    /// Wrap events.
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Generic value form walked by the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload cannot be represented as JSON.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Why an event's digests could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestsShapeError {
    /// The value is not an object.
    #[error("event is not an object")]
    NotAnObject,
    /// The event lacks a `Digests` field.
    #[error("event has no Digests field")]
    Missing,
    /// `Digests` is neither a mapping nor a TCG list.
    #[error("Digests is neither an algorithm mapping nor a list of {{AlgorithmId, Digest}}")]
    Malformed,
    /// A digest value is not decodable hex.
    #[error(transparent)]
    Hex(#[from] DigestError),
}

/// Read one algorithm's digest from a generic event value.
///
/// Both the mapping and the TCG list forms are accepted. Hex may carry a `0x`
/// prefix and use either case. Only the entry for `alg` is decoded; digests
/// under other algorithms are left unread. Returns `None` when the event
/// carries no digest for `alg`.
///
/// # Errors
///
/// Returns a [`DigestsShapeError`] when the event has no readable `Digests`
/// or the entry for `alg` is not decodable hex.
pub fn event_digest(event: &Value, alg: &str) -> Result<Option<Vec<u8>>, DigestsShapeError> {
    let obj = event.as_object().ok_or(DigestsShapeError::NotAnObject)?;
    let digests = obj.get(DIGESTS_FIELD).ok_or(DigestsShapeError::Missing)?;
    let text = match digests {
        Value::Object(map) => map.get(alg),
        Value::Array(list) => list
            .iter()
            .find(|entry| entry.get("AlgorithmId").and_then(Value::as_str) == Some(alg))
            .map(|entry| entry.get("Digest").unwrap_or(&Value::Null)),
        _ => return Err(DigestsShapeError::Malformed),
    };
    match text {
        None => Ok(None),
        Some(text) => {
            let text = text.as_str().ok_or(DigestsShapeError::Malformed)?;
            Ok(Some(decode_event_hex(text)?))
        }
    }
}

fn decode_event_hex(text: &str) -> Result<Vec<u8>, DigestError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    decode_hex(digits)
}

/// Keep only events extended into one of `pcrs`.
pub fn retain_pcrs(log: &mut EventLog, pcrs: &BTreeSet<u32>) {
    log.events.retain(|event| pcrs.contains(&event.pcr_index));
}
