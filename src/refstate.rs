//! Reference-state document: schemas for its recognised keys and helpers
//! that turn its `0x`-prefixed values into the forms tests are built from.
//!
//! Recognised top-level keys, all optional at the schema level:
//!
//! - `scrtm_and_bios`: list of `{scrtm: digest, platform_firmware: [digest]}`
//! - `pk`, `kek`, `db`, `dbx`: lists of `{SignatureOwner: UUID, SignatureData: 0xhex}`
//! - `mokdig`, `mokxdig`: lists of 0xhex
//! - `kernels`: list of `{shim_authcode_sha256, grub_authcode_sha256,
//!   kernel_authcode_sha256, initrd_plain_sha256: 0xhex; kernel_cmdline: string}`
//!
//! A digest is a mapping from hash algorithm name to 0xhex of the algorithm's
//! full output width. Kernel fields are plain 0xhex of any width.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::digest::{decode_hex, Digest, DigestError};
use crate::engine::PathSegment;
use crate::schema::{
    digest_test, hex_test, list_test, obj_test, type_test, Schema, SchemaError, SchemaErrorKind,
    ValueType,
};

/// Keys naming secure-boot signature lists.
pub const KEY_LISTS: [&str; 4] = ["pk", "kek", "db", "dbx"];

/// Digest: algorithm name to full-width 0xhex.
pub fn digest_schema() -> Schema {
    digest_test()
}

/// One allowed SCRTM and firmware combination.
pub fn scrtm_and_bios_schema() -> Schema {
    obj_test([
        ("scrtm", digest_schema()),
        ("platform_firmware", list_test(digest_schema())),
    ])
}

/// Secure-boot signature entry.
pub fn key_schema() -> Schema {
    obj_test([("SignatureOwner", Schema::Uuid), ("SignatureData", hex_test())])
}

/// One allowed shim, bootloader, kernel, initrd and command line.
pub fn kernel_schema() -> Schema {
    obj_test([
        ("shim_authcode_sha256", hex_test()),
        ("grub_authcode_sha256", hex_test()),
        ("kernel_authcode_sha256", hex_test()),
        ("initrd_plain_sha256", hex_test()),
        ("kernel_cmdline", type_test(ValueType::String)),
    ])
}

/// Whole reference-state document.
pub fn refstate_schema() -> Schema {
    let mut schema = obj_test(Vec::<(String, Schema)>::new())
        .optional("scrtm_and_bios", list_test(scrtm_and_bios_schema()));
    for name in KEY_LISTS {
        schema = schema.optional(name, list_test(key_schema()));
    }
    schema
        .optional("mokdig", list_test(hex_test()))
        .optional("mokxdig", list_test(hex_test()))
        .optional("kernels", list_test(kernel_schema()))
}

/// Remove the `0x` prefix.
///
/// # Errors
///
/// Returns a format violation when the prefix is absent.
pub fn string_strip0x(text: &str) -> Result<&str, SchemaError> {
    text.strip_prefix("0x").ok_or_else(|| {
        SchemaErrorKind::BadHex {
            value: format!("{text:?}"),
        }
        .into()
    })
}

/// Validate a digest mapping and strip the prefix from each value.
///
/// # Errors
///
/// Returns the schema violation when `digest` is not a valid digest.
pub fn digest_strip0x(digest: &Value) -> Result<BTreeMap<String, String>, SchemaError> {
    digest_schema().check(digest)?;
    let mut out = BTreeMap::new();
    if let Some(map) = digest.as_object() {
        for (alg, text) in map {
            let text = text.as_str().unwrap_or_default();
            out.insert(alg.clone(), string_strip0x(text)?.to_owned());
        }
    }
    Ok(out)
}

/// [`digest_strip0x`] over a list of digests.
///
/// # Errors
///
/// Returns the first violation, located by list index.
pub fn digests_strip0x(digests: &Value) -> Result<Vec<BTreeMap<String, String>>, SchemaError> {
    type_test(ValueType::Sequence).check(digests)?;
    digests
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, d)| digest_strip0x(d).map_err(|e| e.within(PathSegment::Index(i))))
        .collect()
}

/// Validate a digest mapping and decode it to bytes.
///
/// # Errors
///
/// Returns a schema violation, or a format violation when the hex does not
/// decode to whole bytes.
pub fn digest_from_value(digest: &Value) -> Result<Digest, SchemaError> {
    let stripped = digest_strip0x(digest)?;
    Digest::from_hex_map(stripped.iter().map(|(a, h)| (a.as_str(), h.as_str())))
        .map_err(digest_error)
}

/// Decode one 0xhex value to bytes.
///
/// # Errors
///
/// Returns a format violation for a bad prefix or undecodable digits.
pub fn hex_bytes(value: &Value) -> Result<Vec<u8>, SchemaError> {
    hex_test().check(value)?;
    let text = value.as_str().unwrap_or_default();
    decode_hex(string_strip0x(text)?).map_err(digest_error)
}

fn digest_error(err: DigestError) -> SchemaError {
    match err {
        DigestError::BadHex { value, .. } => SchemaErrorKind::BadHex { value }.into(),
        DigestError::UnknownAlg(alg) => SchemaErrorKind::UnknownAlg { value: alg.0 }.into(),
    }
}

/// Secure-boot signature with the data prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Owner GUID.
    pub owner: String,
    /// Signature data as unprefixed hex.
    pub data: String,
}

/// Validate a signature entry and strip its data prefix.
///
/// # Errors
///
/// Returns the schema violation when `sig` is malformed.
pub fn sig_strip0x(sig: &Value) -> Result<Signature, SchemaError> {
    key_schema().check(sig)?;
    let field = |name: &str| sig.get(name).and_then(Value::as_str).unwrap_or_default();
    Ok(Signature {
        owner: field("SignatureOwner").to_owned(),
        data: string_strip0x(field("SignatureData"))?.to_owned(),
    })
}

/// [`sig_strip0x`] over a list.
///
/// # Errors
///
/// Returns the first violation, located by list index.
pub fn sigs_strip0x(sigs: &Value) -> Result<Vec<Signature>, SchemaError> {
    type_test(ValueType::Sequence).check(sigs)?;
    sigs.as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, s)| sig_strip0x(s).map_err(|e| e.within(PathSegment::Index(i))))
        .collect()
}

/// The boot-application digests of a `kernels` entry, decoded.
///
/// `initrd_plain_sha256` and `kernel_cmdline` are validated by
/// [`kernel_schema`] but not decoded: the initrd and command-line events
/// (PCR 9 and PCR 8 `EV_IPL`) are accepted without comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelRef {
    /// Authenticode SHA-256 of the shim.
    pub shim_authcode_sha256: Vec<u8>,
    /// Authenticode SHA-256 of the bootloader.
    pub grub_authcode_sha256: Vec<u8>,
    /// Authenticode SHA-256 of the kernel image.
    pub kernel_authcode_sha256: Vec<u8>,
}

impl KernelRef {
    /// Validate and decode one `kernels` entry.
    ///
    /// # Errors
    ///
    /// Returns the schema or format violation, located by field.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        kernel_schema().check(value)?;
        let bytes = |name: &str| {
            hex_bytes(value.get(name).unwrap_or(&Value::Null)).map_err(|e| e.within_field(name))
        };
        Ok(Self {
            shim_authcode_sha256: bytes("shim_authcode_sha256")?,
            grub_authcode_sha256: bytes("grub_authcode_sha256")?,
            kernel_authcode_sha256: bytes("kernel_authcode_sha256")?,
        })
    }
}
