//! The page-context consent override.
//!
//! Built from the same constants and payload types the in-process shim uses, so
//! the page sees byte-identical answers. Only the 12 timestamp characters are
//! computed in the page; the rest of the TC string is fixed.

use serde::Serialize;
use serde_json::Value;
use unbanner_tcf::bits::ALPHABET;
use unbanner_tcf::locator::LOCATOR_FRAME_NAME;
use unbanner_tcf::shim::OVERRIDE_MESSAGE_TYPE;
use unbanner_tcf::{DataLayerGuard, PingResponse, TcData, VendorList, layout};

const OVERRIDE_TEMPLATE: &str = r#"
(() => {
    if (window.__unbannerConsent) return false;
    const ALPHABET = __ALPHABET__;
    const PREFIX = __PREFIX__;
    const SUFFIX = __SUFFIX__;
    const TEMPLATE = __TCDATA__;
    const PING = __PING__;
    const VENDOR_LIST = __VENDOR_LIST__;
    const DEFAULT_DENY = __DEFAULT_DENY__;
    const MESSAGE_TYPE = __MESSAGE_TYPE__;

    const copy = value => JSON.parse(JSON.stringify(value));
    const stamp = () => {
        const bits = Math.floor(Date.now() / 100).toString(2).padStart(36, '0').slice(-36).repeat(2);
        let out = PREFIX;
        for (let i = 0; i < bits.length; i += 6) out += ALPHABET[parseInt(bits.slice(i, i + 6), 2)];
        return out + SUFFIX;
    };
    const tcData = () => Object.assign(copy(TEMPLATE), { tcString: stamp() });

    const listeners = new Map();
    let nextListener = 0;

    function tcfapi(command, version, callback, parameter) {
        if (typeof callback !== 'function') callback = () => {};
        switch (command) {
            case 'getTCData': {
                const data = tcData();
                if (Array.isArray(parameter)) {
                    for (const id of parameter) {
                        data.vendor.consents[id] = false;
                        data.vendor.legitimateInterests[id] = false;
                    }
                }
                callback(data, true);
                break;
            }
            case 'getInAppTCData':
                callback(tcData(), true);
                break;
            case 'ping':
                callback(copy(PING), true);
                break;
            case 'addEventListener': {
                const id = ++nextListener;
                listeners.set(id, callback);
                callback(Object.assign(tcData(), { listenerId: id }), true);
                break;
            }
            case 'removeEventListener': {
                const removed = listeners.delete(parameter);
                callback(removed, removed);
                break;
            }
            case 'getVendorList':
                callback(copy(VENDOR_LIST), true);
                break;
            default:
                callback(null, true);
        }
    }

    const hadExisting = typeof window.__tcfapi !== 'undefined';
    let success = true;
    try {
        Object.defineProperty(window, '__tcfapi', { value: tcfapi, writable: false, configurable: false });
    } catch (e) {
        success = false;
    }
    if (success && Array.isArray(window.__tcfapiQueue)) {
        for (const args of window.__tcfapiQueue.splice(0)) {
            try { tcfapi.apply(null, args); } catch (e) {}
        }
    }

    const grants = entry => {
        if (!entry || entry[0] !== 'consent' || entry[1] !== 'update') return false;
        const settings = entry[2];
        return !!settings && typeof settings === 'object' && Object.values(settings).some(v => v === 'granted');
    };
    const dataLayer = window.dataLayer = window.dataLayer || [];
    dataLayer.push(DEFAULT_DENY);
    const push = dataLayer.push;
    dataLayer.push = function (...entries) {
        const entry = typeof entries[0] === 'string' ? entries : entries[0];
        if (grants(entry)) return this.length;
        return push.apply(this, entries);
    };

    const marker = { type: MESSAGE_TYPE, success, hadExistingImplementation: hadExisting };
    window.__unbannerConsent = marker;
    window.postMessage(marker, '*');
    return true;
})()
"#;

/// Hands the install result to the caller exactly once, together with the
/// frames present at that moment.
pub const CLAIM_OUTCOME: &str = r#"
() => {
    const marker = window.__unbannerConsent;
    if (!marker || window.__unbannerConsentClaimed) return null;
    window.__unbannerConsentClaimed = true;
    const frames = Array.from(document.querySelectorAll('iframe'), f => ({
        name: f.getAttribute('name') || '',
        src: f.getAttribute('src') || ''
    }));
    try {
        if (window.frames[__LOCATOR__] && !frames.some(f => f.name === __LOCATOR__)) {
            frames.push({ name: __LOCATOR__, src: '' });
        }
    } catch (e) {}
    return { marker, frames };
}
"#;

fn literal<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// The install script. Safe to run more than once per document.
pub fn override_script() -> String {
    let alphabet = String::from_utf8_lossy(ALPHABET);
    let template = TcData::with_tc_string(String::new());
    OVERRIDE_TEMPLATE
        .replace("__ALPHABET__", &literal(alphabet.as_ref()))
        .replace("__PREFIX__", &literal(&layout::prefix().to_string()))
        .replace("__SUFFIX__", &literal(&layout::suffix()))
        .replace("__TCDATA__", &literal(&template))
        .replace("__PING__", &literal(&PingResponse::default()))
        .replace("__VENDOR_LIST__", &literal(&VendorList::default()))
        .replace("__DEFAULT_DENY__", &literal::<Value>(&DataLayerGuard::default_deny()))
        .replace("__MESSAGE_TYPE__", &literal(OVERRIDE_MESSAGE_TYPE))
}

pub fn claim_outcome_script() -> String {
    CLAIM_OUTCOME.replace("__LOCATOR__", &literal(LOCATOR_FRAME_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use unbanner_tcf::{decode_core, encode_reject_all_at};

    #[test]
    fn every_placeholder_is_filled() {
        let script = override_script();
        assert!(!script.contains("__ALPHABET__"));
        assert!(!script.contains("__TCDATA__"));
        assert!(!script.contains("__MESSAGE_TYPE__"));
        assert!(script.contains(&format!("\"{}\"", OVERRIDE_MESSAGE_TYPE)));
        assert!(script.contains(&layout::suffix()));
        assert!(!claim_outcome_script().contains("__LOCATOR__"));
        assert!(claim_outcome_script().contains("\"__tcfapiLocator\""));
    }

    #[test]
    fn embedded_payload_is_fully_rejected() {
        let script = override_script();
        let start = script.find("const TEMPLATE = ").unwrap() + "const TEMPLATE = ".len();
        let end = start + script[start..].find(";\n").unwrap();
        let template: Value = serde_json::from_str(&script[start..end]).unwrap();
        assert_eq!(template["gdprApplies"], Value::Bool(true));
        assert_eq!(template["purpose"]["consents"]["1"], Value::Bool(false));
        assert_eq!(template["publisherCC"], "AA");
    }

    // Mirrors the page-side `stamp()` so a drift in the bit layout shows up here.
    fn page_stamp(deciseconds: u64) -> String {
        let bits = format!("{:036b}", deciseconds).repeat(2);
        let mut out = layout::prefix().to_string();
        for chunk in bits.as_bytes().chunks(6) {
            let index = usize::from_str_radix(std::str::from_utf8(chunk).unwrap(), 2).unwrap();
            out.push(char::from(ALPHABET[index]));
        }
        out + &layout::suffix()
    }

    #[test]
    fn page_stamping_matches_the_encoder() {
        let deciseconds = 17_280_000_000;
        let stamped = page_stamp(deciseconds);
        assert_eq!(stamped, encode_reject_all_at(deciseconds));
        let core = decode_core(&stamped).unwrap();
        assert_eq!(core.created, deciseconds);
    }
}
