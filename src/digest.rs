//! Hash algorithms and digest values.
//!
//! Reference state writes digests as `0x` followed by lowercase hex. Internally
//! a [`Digest`] holds raw bytes per algorithm so comparison is byte-exact.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hash algorithms that may appear in a measured-boot log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlg {
    /// SHA-1 (20 bytes).
    Sha1,
    /// SHA-256 (32 bytes).
    Sha256,
    /// SHA-384 (48 bytes).
    Sha384,
    /// SHA-512 (64 bytes).
    Sha512,
    /// SM3-256 (32 bytes).
    Sm3_256,
}

impl HashAlg {
    /// Every supported algorithm.
    pub const ALL: [HashAlg; 5] = [
        HashAlg::Sha1,
        HashAlg::Sha256,
        HashAlg::Sha384,
        HashAlg::Sha512,
        HashAlg::Sm3_256,
    ];

    /// Name as written in logs and reference state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Sm3_256 => "sm3_256",
        }
    }

    /// Output size of the algorithm in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 | Self::Sm3_256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when an algorithm name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hash algorithm {0:?}")]
pub struct UnknownAlg(pub String);

impl FromStr for HashAlg {
    type Err = UnknownAlg;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashAlg::ALL
            .into_iter()
            .find(|alg| alg.name() == s)
            .ok_or_else(|| UnknownAlg(s.to_owned()))
    }
}

/// Failure to turn hex text into digest bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// The algorithm name is not one of [`HashAlg::ALL`].
    #[error(transparent)]
    UnknownAlg(#[from] UnknownAlg),
    /// The hex text could not be decoded.
    #[error("{value:?} is not valid hex: {reason}")]
    BadHex {
        /// The rejected text.
        value: String,
        /// Decoder message.
        reason: String,
    },
}

/// Decode hex digits (no prefix) into bytes.
///
/// # Errors
///
/// Returns [`DigestError::BadHex`] for odd lengths or non-hex characters.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, DigestError> {
    hex::decode(text).map_err(|e| DigestError::BadHex {
        value: text.to_owned(),
        reason: e.to_string(),
    })
}

/// Expected digest values, keyed by algorithm.
///
/// Matching is scoped to the algorithms present here: an observed digest set
/// matches when it carries every one of these algorithms with equal bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    values: BTreeMap<HashAlg, Vec<u8>>,
}

impl Digest {
    /// Empty digest (matches anything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the value for one algorithm.
    pub fn with(mut self, alg: HashAlg, bytes: impl Into<Vec<u8>>) -> Self {
        self.values.insert(alg, bytes.into());
        self
    }

    /// Build from a mapping of algorithm name to unprefixed hex, as produced by
    /// [`crate::refstate::digest_strip0x`].
    ///
    /// # Errors
    ///
    /// Returns a [`DigestError`] for unknown algorithms or undecodable hex.
    pub fn from_hex_map<'a, I>(entries: I) -> Result<Self, DigestError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut values = BTreeMap::new();
        for (alg, text) in entries {
            values.insert(alg.parse::<HashAlg>()?, decode_hex(text)?);
        }
        Ok(Self { values })
    }

    /// Bytes expected for `alg`, if any.
    pub fn get(&self, alg: HashAlg) -> Option<&[u8]> {
        self.values.get(&alg).map(Vec::as_slice)
    }

    /// Iterate algorithms and expected bytes in algorithm order.
    pub fn iter(&self) -> impl Iterator<Item = (HashAlg, &[u8])> {
        self.values.iter().map(|(alg, bytes)| (*alg, bytes.as_slice()))
    }

    /// External form: algorithm name to `0x`-prefixed lowercase hex.
    pub fn to_prefixed(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(alg, bytes)| (alg.name().to_owned(), prefixed_hex(bytes)))
            .collect()
    }
}

/// Render bytes as `0x` followed by lowercase hex.
pub fn prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
