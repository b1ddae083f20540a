//! Tests for `src/refstate.rs`.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use mba_policy::digest::HashAlg;
use mba_policy::schema::SchemaErrorKind;
use mba_policy::refstate::{
    digest_from_value, digest_strip0x, digests_strip0x, refstate_schema, sigs_strip0x,
    string_strip0x,
};

fn full_refstate() -> Value {
    json!({
        "scrtm_and_bios": [{
            "scrtm": {"sha1": "0x1b5a2e30ec2e8f1b5c4cf7de0be6d1f6b9ab8ea1"},
            "platform_firmware": [
                {"sha256": "0x00000000000000000000000000000000000000000000000000000000000000ff"},
                {"sha1": "0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a"}
            ]
        }],
        "pk": [{"SignatureOwner": "55555555-0000-0000-0000-000000000000", "SignatureData": "0x3082"}],
        "kek": [],
        "db": [],
        "dbx": [{"SignatureOwner": "77fa9abd-0359-4d32-bd60-28f4e78f784b", "SignatureData": "0x00"}],
        "mokdig": ["0xab"],
        "mokxdig": [],
        "kernels": [{
            "shim_authcode_sha256": "0xaa",
            "grub_authcode_sha256": "0xbb",
            "kernel_authcode_sha256": "0xcc",
            "initrd_plain_sha256": "0xdd",
            "kernel_cmdline": "quiet"
        }]
    })
}

#[test]
fn full_document_passes_schema() {
    assert!(refstate_schema().check(&full_refstate()).is_ok());
}

#[test]
fn unknown_top_level_keys_are_tolerated() {
    let mut doc = full_refstate();
    doc["comment"] = json!("generated");
    assert!(refstate_schema().check(&doc).is_ok());
}

#[test]
fn kernel_entry_missing_cmdline_is_located() {
    let mut doc = full_refstate();
    doc["kernels"][0]
        .as_object_mut()
        .expect("kernel entry")
        .remove("kernel_cmdline");
    let err = refstate_schema().check(&doc).expect_err("missing cmdline");
    assert_eq!(err.path_string(), ".kernels[0]");
    assert!(err.to_string().contains("kernel_cmdline"));
}

#[test]
fn strip_then_reprefix_round_trips() {
    let original = json!({
        "sha1": "0x000102030405060708090a0b0c0d0e0f10111213",
        "sha256": "0x00000000000000000000000000000000000000000000000000000000000000ff"
    });
    let stripped = digest_strip0x(&original).expect("valid digest");
    assert!(stripped.values().all(|v| !v.starts_with("0x")));

    let reprefixed: BTreeMap<String, String> = stripped
        .into_iter()
        .map(|(alg, hex)| (alg, format!("0x{hex}")))
        .collect();
    assert_eq!(serde_json::to_value(reprefixed).expect("serialize"), original);
}

#[test]
fn digest_from_value_keeps_leading_zeros() {
    let hex = format!("0x{}01", "00".repeat(31));
    let digest = digest_from_value(&json!({ "sha256": hex })).expect("valid");
    let bytes = digest.get(HashAlg::Sha256).expect("sha256 present");
    assert_eq!(bytes.len(), 32);
    assert_eq!(bytes.first(), Some(&0x00));
    assert_eq!(bytes.last(), Some(&0x01));
    assert_eq!(digest.to_prefixed()["sha256"], hex);
}

#[test]
fn short_scrtm_digest_is_rejected_with_location() {
    let mut doc = full_refstate();
    doc["scrtm_and_bios"][0]["scrtm"] = json!({"sha256": "0x01"});
    let err = refstate_schema().check(&doc).expect_err("one-byte sha256");
    assert!(err.is_format());
    assert_eq!(err.path_string(), ".scrtm_and_bios[0].scrtm.sha256");
    assert!(matches!(
        err.kind(),
        SchemaErrorKind::BadWidth {
            expected: 64,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn kernel_fields_have_no_width_requirement() {
    let mut doc = full_refstate();
    doc["kernels"][0]["initrd_plain_sha256"] = json!("0x0d");
    assert!(refstate_schema().check(&doc).is_ok());
}

#[test]
fn digests_strip0x_requires_list() {
    let sha1 = format!("0x{}", "00".repeat(20));
    let sha256 = format!("0x{}", "01".repeat(32));
    assert!(digests_strip0x(&json!({ "sha1": sha1 })).is_err());
    let stripped =
        digests_strip0x(&json!([{ "sha1": sha1 }, { "sha256": sha256 }])).expect("list");
    assert_eq!(stripped.len(), 2);
    assert_eq!(stripped[1]["sha256"], "01".repeat(32));
}

#[test]
fn sigs_strip0x_strips_data() {
    let sigs = sigs_strip0x(&full_refstate()["pk"]).expect("valid keys");
    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0].data, "3082");
    assert_eq!(sigs[0].owner, "55555555-0000-0000-0000-000000000000");
}

#[test]
fn string_strip0x_rejects_bare_hex() {
    assert_eq!(string_strip0x("0x"), Ok(""));
    assert!(string_strip0x("deadbeef").is_err());
}
