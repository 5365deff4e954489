use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use unbanner_tcf::{
    ConsentHost, FrameInfo, MemoryWindow, TcData, TcfCallback, TcfResponse, TcfShim, decode_core, encode_reject_all,
    encode_reject_all_at, layout,
};

fn recorder() -> (TcfCallback, Arc<Mutex<Vec<(Value, bool)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb: TcfCallback = Arc::new(move |response: TcfResponse, ok: bool| {
        sink.lock().unwrap().push((response.to_json(), ok));
    });
    (cb, seen)
}

#[test]
fn encoded_string_decodes_as_reject_all() {
    let core = decode_core(&encode_reject_all()).unwrap();
    assert_eq!(core.version, 2);
    assert_eq!(core.policy_version, 4);
    assert_eq!(core.cmp_version, 1);
    assert_eq!(core.consent_screen, 1);
    assert!(core.is_service_specific);
    assert!(core.purpose_consents.is_empty());
    assert!(core.purpose_legitimate_interests.is_empty());
    assert!(core.vendor_consents.vendors.is_empty());
    assert!(core.vendor_legitimate_interests.vendors.is_empty());
    assert_eq!(core.vendor_consents.max_vendor_id, 0xFFFF);
    assert!(core.vendor_consents.is_range_encoding);
    assert_eq!(core.created, core.last_updated);
    assert!(core.is_reject_all());
}

#[test]
fn payload_string_decodes_with_gdpr_applies() {
    let data = TcData::reject_all();
    assert!(data.gdpr_applies);
    let core = decode_core(&data.tc_string).unwrap();
    assert!(core.is_reject_all());
}

#[test]
fn strings_a_decisecond_apart_differ_only_in_timestamp_chars() {
    let base = 17_283_456_789;
    let a = encode_reject_all_at(base);
    let b = encode_reject_all_at(base + 1);
    assert_ne!(a, b);
    assert_eq!(a.len(), b.len());
    for (i, (ca, cb)) in a.chars().zip(b.chars()).enumerate() {
        if ca != cb {
            assert!((layout::TIMESTAMP_START..layout::TIMESTAMP_END).contains(&i), "char {} changed", i);
        }
    }
    assert_eq!(a, "CQGLJ8VQGLJ8VAAABBAACWEgAAAAAAAAAAAH__wAP__gAAAA");
    assert_eq!(&a[layout::TIMESTAMP_END..], layout::suffix());
}

#[test]
fn install_drains_queue_and_signals_success() {
    let window = Arc::new(MemoryWindow::with_native_cmp());
    let (cb, seen) = recorder();
    window.call_tcf("getTCData", 2, Some(cb.clone()), json!([4]));
    window.call_tcf("ping", 2, Some(cb.clone()), Value::Null);
    assert!(seen.lock().unwrap().is_empty());

    let shim = TcfShim::new(window.clone());
    let outcome = shim.install().expect("first install");
    assert!(outcome.marker.success);
    assert!(outcome.marker.had_existing_implementation);
    assert!(outcome.tcf_detected());
    assert_eq!(window.queued_calls(), 0);

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0["vendor"]["consents"], json!({"4": false}));
        assert_eq!(seen[1].0["cmpStatus"], json!("loaded"));
    }

    let messages = window.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0],
        json!({"type": "UNBANNER_TCF_OVERRIDE", "success": true, "hadExistingImplementation": true})
    );

    // One-time guard: a second install is a no-op.
    assert!(shim.install().is_none());
    assert_eq!(window.messages().len(), 1);
}

#[test]
fn installed_entrypoint_cannot_be_replaced() {
    let window = Arc::new(MemoryWindow::new());
    let shim = TcfShim::new(window.clone());
    let outcome = shim.install().unwrap();
    assert!(!outcome.marker.had_existing_implementation);
    assert!(!outcome.tcf_detected());
    assert!(window.assign_tcf_api().is_err());
    assert!(window.has_tcf_api());

    let (cb, seen) = recorder();
    window.call_tcf("addEventListener", 2, Some(cb), Value::Null);
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].0["listenerId"], json!(1));
    assert_eq!(seen[0].0["purpose"]["consents"]["1"], json!(false));
}

#[test]
fn data_layer_grants_are_dropped() {
    let window = Arc::new(MemoryWindow::new());
    window.data_layer_push(json!({"event": "gtm.js"}));
    TcfShim::new(window.clone()).install();

    assert!(!window.data_layer_push(json!(["consent", "update", {"ad_storage": "granted"}])));
    assert!(window.data_layer_push(json!(["event", "page_view"])));

    let layer = window.data_layer();
    assert_eq!(layer.len(), 3);
    assert_eq!(layer[1][1], json!("default"));
    assert_eq!(layer[1][2]["ad_storage"], json!("denied"));
    assert_eq!(layer[1][2]["security_storage"], json!("granted"));
}

#[test]
fn locator_frame_marks_tcf_detected() {
    let window = Arc::new(MemoryWindow::new());
    window.add_frame(FrameInfo::new("__tcfapiLocator", ""));
    let outcome = TcfShim::new(window).install().unwrap();
    assert!(outcome.locator_detected);
    assert!(outcome.tcf_detected());
}
