//! Builds the TCF v2.2 core segment for "reject everything".

use std::time::{SystemTime, UNIX_EPOCH};

use crate::bits::BitWriter;

pub const TCF_VERSION: u64 = 2;
pub const CMP_ID: u64 = 0;
pub const CMP_VERSION: u64 = 1;
pub const CONSENT_SCREEN: u64 = 1;
pub const VENDOR_LIST_VERSION: u64 = 150;
pub const TCF_POLICY_VERSION: u64 = 4;
/// Highest id a 16-bit vendor section can name.
pub const MAX_VENDOR_ID: u64 = 0xFFFF;

/// Bits in the unpadded core segment.
pub const CORE_BITS: usize = 283;
/// Characters in the encoded core segment.
pub const CORE_CHARS: usize = CORE_BITS.div_ceil(6);

/// Wall-clock time in deciseconds since the Unix epoch, truncated.
pub fn now_deciseconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_millis() / 100) as u64)
        .unwrap_or(0)
}

fn push_timestamps(w: &mut BitWriter, deciseconds: u64) {
    // created, last updated
    w.push(deciseconds, 36).push(deciseconds, 36);
}

/// An empty vendor section: maximal id, range encoding, no entries.
fn push_empty_vendor_section(w: &mut BitWriter) {
    w.push(MAX_VENDOR_ID, 16).push_bool(true).push(0, 12);
}

/// Core segment stamped with `deciseconds` as both created and last-updated.
pub fn encode_reject_all_at(deciseconds: u64) -> String {
    let mut w = BitWriter::new();
    w.push(TCF_VERSION, 6);
    push_timestamps(&mut w, deciseconds);
    w.push(CMP_ID, 12)
        .push(CMP_VERSION, 12)
        .push(CONSENT_SCREEN, 6)
        .push(0, 12) // consent language
        .push(VENDOR_LIST_VERSION, 12)
        .push(TCF_POLICY_VERSION, 6)
        .push_bool(true) // service specific
        .push_bool(false) // non-standard stacks
        .push(0, 12) // special feature opt-ins
        .push(0, 24) // purpose consents
        .push(0, 24) // purpose legitimate interests
        .push_bool(false) // purpose one treatment
        .push(0, 12); // publisher country code
    push_empty_vendor_section(&mut w); // vendor consents
    push_empty_vendor_section(&mut w); // vendor legitimate interests
    w.push(0, 12); // publisher restrictions
    debug_assert_eq!(w.len(), CORE_BITS);
    w.to_text()
}

/// Fresh core segment for the current instant. Never cache the result.
pub fn encode_reject_all() -> String {
    encode_reject_all_at(now_deciseconds())
}

/// Where the timestamps sit in the encoded text.
///
/// The version sextet is followed by 72 timestamp bits, exactly 12 characters,
/// so everything from [`TIMESTAMP_END`] onwards is constant. A page-context script
/// can rebuild a fresh string from [`timestamp_chars`] and [`suffix`] alone.
pub mod layout {
    use super::*;

    pub const TIMESTAMP_START: usize = 1;
    pub const TIMESTAMP_END: usize = 13;

    /// The first character, encoding the version.
    pub fn prefix() -> char {
        char::from(crate::bits::ALPHABET[TCF_VERSION as usize])
    }

    /// The 12 characters carrying created and last-updated.
    pub fn timestamp_chars(deciseconds: u64) -> String {
        let mut w = BitWriter::new();
        push_timestamps(&mut w, deciseconds);
        w.to_text()
    }

    /// Everything after the timestamps; identical for every call.
    pub fn suffix() -> String {
        encode_reject_all_at(0)[TIMESTAMP_END..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_length_and_alphabet() {
        let s = encode_reject_all_at(17_000_000_000);
        assert_eq!(s.len(), CORE_CHARS);
        assert_eq!(CORE_CHARS, 48);
        assert!(s.starts_with('C'));
        assert!(s.bytes().all(|b| crate::bits::ALPHABET.contains(&b)));
    }

    #[test]
    fn layout_reassembles_encoder_output() {
        let ds = 17_283_456_789;
        let rebuilt = format!("{}{}{}", layout::prefix(), layout::timestamp_chars(ds), layout::suffix());
        assert_eq!(rebuilt, encode_reject_all_at(ds));
    }

    #[test]
    fn clock_is_after_2020() {
        // 2020-01-01 in deciseconds
        assert!(now_deciseconds() > 15_778_368_000);
    }
}
