//! Core-segment decoder, for inspecting strings a page already carries and for
//! checking our own output.

use serde::Serialize;

use crate::bits::BitReader;
use crate::error::TcfError;

/// A vendor consent or legitimate-interest section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSection {
    pub max_vendor_id: u32,
    pub is_range_encoding: bool,
    /// Vendors with the bit set, ascending
    pub vendors: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreSegment {
    pub version: u8,
    /// Deciseconds since the epoch
    pub created: u64,
    pub last_updated: u64,
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_screen: u8,
    pub consent_language: String,
    pub vendor_list_version: u16,
    pub policy_version: u8,
    pub is_service_specific: bool,
    pub use_non_standard_stacks: bool,
    pub special_feature_opt_ins: Vec<u32>,
    pub purpose_consents: Vec<u32>,
    pub purpose_legitimate_interests: Vec<u32>,
    pub purpose_one_treatment: bool,
    pub publisher_cc: String,
    pub vendor_consents: VendorSection,
    pub vendor_legitimate_interests: VendorSection,
    pub pub_restrictions: u16,
}

impl CoreSegment {
    /// Nothing consented and no legitimate interest claimed.
    pub fn is_reject_all(&self) -> bool {
        self.special_feature_opt_ins.is_empty()
            && self.purpose_consents.is_empty()
            && self.purpose_legitimate_interests.is_empty()
            && self.vendor_consents.vendors.is_empty()
            && self.vendor_legitimate_interests.vendors.is_empty()
    }
}

fn read_letters(r: &mut BitReader, field: &'static str) -> Result<String, TcfError> {
    let mut out = String::with_capacity(2);
    for _ in 0..2 {
        let index = r.read(6, field)? as u8;
        out.push(char::from(b'A' + index.min(25)));
    }
    Ok(out)
}

/// Sorted, de-duplicated ids covered by inclusive ranges. Overlaps are merged
/// first so each id is produced once.
fn expand_ranges(mut ranges: Vec<(u32, u32)>) -> Vec<u32> {
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some((_, last_end)) if start <= last_end.saturating_add(1) => *last_end = (*last_end).max(end),
            _ => merged.push((start, end)),
        }
    }
    merged.into_iter().flat_map(|(start, end)| start..=end).collect()
}

fn read_vendor_section(r: &mut BitReader, field: &'static str) -> Result<VendorSection, TcfError> {
    let max_vendor_id = r.read(16, field)? as u32;
    let is_range_encoding = r.read_bool(field)?;
    let vendors = if is_range_encoding {
        let entries = r.read(12, field)?;
        let mut ranges = Vec::with_capacity(entries as usize);
        for _ in 0..entries {
            let is_range = r.read_bool(field)?;
            let start = r.read(16, field)? as u32;
            let end = if is_range { r.read(16, field)? as u32 } else { start };
            // ids past maxVendorId cannot be set
            let end = end.min(max_vendor_id);
            if start <= end {
                ranges.push((start, end));
            }
        }
        expand_ranges(ranges)
    } else {
        r.read_bitfield(max_vendor_id as usize, field)?
    };
    Ok(VendorSection { max_vendor_id, is_range_encoding, vendors })
}

/// Decodes the core segment of a TC string. Optional segments after the first
/// `.` are ignored.
pub fn decode_core(tc_string: &str) -> Result<CoreSegment, TcfError> {
    let core = tc_string.split('.').next().unwrap_or_default();
    let mut r = BitReader::from_text(core)?;

    let version = r.read(6, "version")?;
    if version != 2 {
        return Err(TcfError::UnsupportedVersion(version));
    }

    Ok(CoreSegment {
        version: version as u8,
        created: r.read(36, "created")?,
        last_updated: r.read(36, "lastUpdated")?,
        cmp_id: r.read(12, "cmpId")? as u16,
        cmp_version: r.read(12, "cmpVersion")? as u16,
        consent_screen: r.read(6, "consentScreen")? as u8,
        consent_language: read_letters(&mut r, "consentLanguage")?,
        vendor_list_version: r.read(12, "vendorListVersion")? as u16,
        policy_version: r.read(6, "policyVersion")? as u8,
        is_service_specific: r.read_bool("isServiceSpecific")?,
        use_non_standard_stacks: r.read_bool("useNonStandardStacks")?,
        special_feature_opt_ins: r.read_bitfield(12, "specialFeatureOptIns")?,
        purpose_consents: r.read_bitfield(24, "purposeConsents")?,
        purpose_legitimate_interests: r.read_bitfield(24, "purposeLegitimateInterests")?,
        purpose_one_treatment: r.read_bool("purposeOneTreatment")?,
        publisher_cc: read_letters(&mut r, "publisherCC")?,
        vendor_consents: read_vendor_section(&mut r, "vendorConsents")?,
        vendor_legitimate_interests: read_vendor_section(&mut r, "vendorLegitimateInterests")?,
        pub_restrictions: r.read(12, "pubRestrictions")? as u16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bitfield_vendor_sections() {
        use crate::bits::BitWriter;

        let mut w = BitWriter::new();
        w.push(2, 6).push(5, 36).push(5, 36).push(7, 12).push(3, 12).push(1, 6);
        w.push(4, 6).push(13, 6); // "EN"
        w.push(10, 12).push(4, 6).push_bool(false).push_bool(false);
        w.push(0, 12).push(0b1010 << 20, 24).push(0, 24).push_bool(false).push(0, 12);
        // bitfield: max 4, vendors 2 and 4
        w.push(4, 16).push_bool(false).push(0b0101, 4);
        // range: one single entry, vendor 9
        w.push(9, 16).push_bool(true).push(1, 12).push_bool(false).push(9, 16);
        w.push(0, 12);

        let core = decode_core(&w.to_text()).unwrap();
        assert_eq!(core.consent_language, "EN");
        assert_eq!(core.purpose_consents, vec![1, 3]);
        assert_eq!(core.vendor_consents.vendors, vec![2, 4]);
        assert_eq!(core.vendor_legitimate_interests.vendors, vec![9]);
        assert!(!core.is_reject_all());
    }

    #[test]
    fn overlapping_ranges_expand_once_within_max_vendor_id() {
        use crate::bits::BitWriter;

        let mut w = BitWriter::new();
        w.push(2, 6).push(5, 36).push(5, 36).push(7, 12).push(3, 12).push(1, 6);
        w.push(4, 6).push(13, 6);
        w.push(10, 12).push(4, 6).push_bool(false).push_bool(false);
        w.push(0, 12).push(0, 24).push(0, 24).push_bool(false).push(0, 12);
        // range: max 10, many full-width ranges plus an overlap and a stray id
        w.push(10, 16).push_bool(true).push(42, 12);
        for _ in 0..40 {
            w.push_bool(true).push(1, 16).push(u16::MAX as u64, 16);
        }
        w.push_bool(true).push(3, 16).push(5, 16);
        w.push_bool(false).push(60, 16);
        w.push(0, 16).push_bool(false);
        w.push(0, 12);

        let core = decode_core(&w.to_text()).unwrap();
        assert_eq!(core.vendor_consents.vendors, (1..=10).collect::<Vec<_>>());
        assert!(core.vendor_legitimate_interests.vendors.is_empty());
    }

    #[test]
    fn rejects_other_versions() {
        // version 1
        assert!(matches!(decode_core("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA"), Err(TcfError::UnsupportedVersion(1))));
    }
}
