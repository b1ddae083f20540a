//! End-to-end tests for `src/policy/example.rs`.

use serde_json::json;

use mba_policy::engine::{PathSegment, TestErrorKind};
use mba_policy::event::{Event, EventLog};
use mba_policy::policy::{Example, Policy};
use mba_policy::ErrorKind;

use super::fixtures::{bsa, good_log, log_with, refstate, value};

#[test]
fn matching_log_passes() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    test.validate(&value(&good_log())).expect("log accepted");
}

#[test]
fn flipped_application_digest_names_tuple_position() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    let cases = [
        (log_with("ab", "bb", "cc"), 0),
        (log_with("aa", "bc", "cc"), 1),
        (log_with("aa", "bb", "cd"), 2),
    ];
    for (log, position) in cases {
        let err = test.validate(&value(&log)).expect_err("digest flipped");
        assert_eq!(err.kind().class(), ErrorKind::FieldMismatch);
        let path: Vec<_> = err.path().cloned().collect();
        assert_eq!(
            path,
            vec![
                PathSegment::Field("bsas".to_owned()),
                PathSegment::Index(position),
                PathSegment::Field("Digests".to_owned()),
            ]
        );
        assert!(err.to_string().contains("sha256"));
    }
}

#[test]
fn event_at_unlisted_pcr_is_a_dispatch_error_anywhere() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    let base = good_log();
    for at in [0, base.events.len() / 2, base.events.len()] {
        let mut log = base.clone();
        log.events.insert(at, Event::new(10, "EV_IMA"));
        let err = test.validate(&value(&log)).expect_err("PCR 10 rejected");
        assert_eq!(err.kind().class(), ErrorKind::Dispatch);
        assert_eq!(err.path().next(), Some(&PathSegment::Index(at)));
        assert!(err.element().is_some_and(|e| e.contains("EV_IMA")));
    }
}

#[test]
fn unknown_event_type_at_known_pcr_is_rejected() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    let mut log = good_log();
    log.events.push(Event::new(4, "EV_EFI_BOOT_SERVICES_DRIVER"));
    let err = test.validate(&value(&log)).expect_err("unlisted type");
    assert!(matches!(err.kind(), TestErrorKind::Dispatch { .. }));
}

#[test]
fn missing_application_load_is_a_length_mismatch() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    let mut log = good_log();
    log.events.retain(|e| {
        !(e.event_type == "EV_EFI_BOOT_SERVICES_APPLICATION" && e.digests == bsa("bb").digests)
    });
    let err = test.validate(&value(&log)).expect_err("only two loads");
    assert_eq!(
        err.kind(),
        &TestErrorKind::LengthMismatch {
            expected: 3,
            actual: 2
        }
    );
}

#[test]
fn log_without_application_loads_leaves_slot_unbound() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    let mut log = good_log();
    log.events
        .retain(|e| e.event_type != "EV_EFI_BOOT_SERVICES_APPLICATION");
    let err = test.validate(&value(&log)).expect_err("nothing collected");
    assert_eq!(err.kind().class(), ErrorKind::UnboundSlot);
}

#[test]
fn tcg_list_digests_are_accepted() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    let mut log = value(&good_log());
    for event in log["events"].as_array_mut().expect("events") {
        if event["EventType"] == "EV_EFI_BOOT_SERVICES_APPLICATION" {
            let sha256 = event["Digests"]["sha256"].clone();
            event["Digests"] = json!([{"AlgorithmId": "sha256", "Digest": sha256}]);
        }
    }
    test.validate(&log).expect("list form accepted");
}

#[test]
fn any_allowed_kernel_may_match() {
    let mut doc = refstate();
    doc["kernels"]
        .as_array_mut()
        .expect("kernels")
        .insert(
            0,
            json!({
                "shim_authcode_sha256": "0x01",
                "grub_authcode_sha256": "0x02",
                "kernel_authcode_sha256": "0x03",
                "initrd_plain_sha256": "0x04",
                "kernel_cmdline": "ro"
            }),
        );
    let test = Example::new().compile(&doc).expect("refstate compiles");
    test.validate(&value(&good_log())).expect("second kernel matches");
    let err = test
        .validate(&value(&log_with("aa", "bb", "ff")))
        .expect_err("neither kernel matches");
    assert!(matches!(err.kind(), TestErrorKind::NoAlternative { reasons } if reasons.len() == 2));
}

#[test]
fn log_must_expose_events_field() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    let err = test
        .validate(&json!({"entries": []}))
        .expect_err("no events");
    assert!(matches!(err.kind(), TestErrorKind::MissingField { field } if field == "events"));
}

#[test]
fn empty_log_fails_closed() {
    let test = Example::new().compile(&refstate()).expect("refstate compiles");
    assert!(test.validate(&value(&EventLog::default())).is_err());
}

#[test]
fn kernel_with_uppercase_hex_is_a_format_error() {
    let mut doc = refstate();
    doc["kernels"][0]["grub_authcode_sha256"] = json!("0xBB");
    let err = Example::new().compile(&doc).expect_err("uppercase hex");
    assert!(err.is_format());
    assert_eq!(err.path_string(), ".kernels[0].grub_authcode_sha256");
}

#[test]
fn kernel_with_odd_hex_is_rejected_at_compile() {
    let mut doc = refstate();
    doc["kernels"][0]["shim_authcode_sha256"] = json!("0xabc");
    let err = Example::new().compile(&doc).expect_err("odd digits");
    assert!(err.is_format());
}

#[test]
fn short_scrtm_digest_fails_compilation() {
    let mut doc = refstate();
    doc["scrtm_and_bios"] = json!([{"scrtm": {"sha256": "0x01"}, "platform_firmware": []}]);
    let err = Example::new().compile(&doc).expect_err("one-byte sha256");
    assert!(err.is_format());
    assert_eq!(err.path_string(), ".scrtm_and_bios[0].scrtm.sha256");
}
