//! Responses handed to `__tcfapi` callers.
//!
//! Consent and legitimate-interest maps are [`DeniedMap`]s: they can only record
//! ids as `false`, so no response built here can grant anything.

use std::collections::BTreeSet;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::encoder::{self, CMP_ID, CMP_VERSION, TCF_POLICY_VERSION, VENDOR_LIST_VERSION};

/// Purposes defined by TCF v2.2.
pub const PURPOSE_COUNT: u32 = 11;
/// Publisher country code matching the all-zero bits in the string.
pub const PUBLISHER_CC: &str = "AA";

/// Ids explicitly marked as not consented, serialized as `{"id": false, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeniedMap(BTreeSet<u32>);

impl DeniedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&mut self, id: u32) {
        self.0.insert(id);
    }

    pub fn with_range(ids: impl IntoIterator<Item = u32>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Always false: the map cannot hold a grant.
    pub fn get(&self, id: u32) -> Option<bool> {
        self.0.contains(&id).then_some(false)
    }
}

impl Serialize for DeniedMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for id in &self.0 {
            map.serialize_entry(&id.to_string(), &false)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentMaps {
    pub consents: DeniedMap,
    pub legitimate_interests: DeniedMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherSection {
    pub consents: DeniedMap,
    pub legitimate_interests: DeniedMap,
    pub custom_purpose: ConsentMaps,
    pub restrictions: DeniedMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Tcloaded,
    Cmpuishown,
    Useractioncomplete,
}

/// The `TCData` object of the CMP API, always fully rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcData {
    pub tc_string: String,
    pub tcf_policy_version: u8,
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub gdpr_applies: bool,
    pub event_status: EventStatus,
    pub cmp_status: &'static str,
    pub listener_id: Option<u32>,
    pub is_service_specific: bool,
    pub use_non_standard_stacks: bool,
    #[serde(rename = "publisherCC")]
    pub publisher_cc: &'static str,
    pub purpose_one_treatment: bool,
    pub purpose: ConsentMaps,
    pub vendor: ConsentMaps,
    pub special_feature_optins: DeniedMap,
    pub publisher: PublisherSection,
}

impl TcData {
    /// Freshly stamped payload. Every call builds a new string.
    pub fn reject_all() -> Self {
        Self::with_tc_string(encoder::encode_reject_all())
    }

    pub fn with_tc_string(tc_string: String) -> Self {
        let purposes = || DeniedMap::with_range(1..=PURPOSE_COUNT);
        Self {
            tc_string,
            tcf_policy_version: TCF_POLICY_VERSION as u8,
            cmp_id: CMP_ID as u16,
            cmp_version: CMP_VERSION as u16,
            gdpr_applies: true,
            event_status: EventStatus::Tcloaded,
            cmp_status: "loaded",
            listener_id: None,
            is_service_specific: true,
            use_non_standard_stacks: false,
            publisher_cc: PUBLISHER_CC,
            purpose_one_treatment: false,
            purpose: ConsentMaps { consents: purposes(), legitimate_interests: purposes() },
            vendor: ConsentMaps::default(),
            special_feature_optins: DeniedMap::new(),
            publisher: PublisherSection::default(),
        }
    }

    /// Marks each requested vendor as denied on both legal bases.
    pub fn deny_vendors(mut self, vendor_ids: &[u32]) -> Self {
        for id in vendor_ids {
            self.vendor.consents.deny(*id);
            self.vendor.legitimate_interests.deny(*id);
        }
        self
    }

    pub fn for_listener(mut self, listener_id: u32) -> Self {
        self.listener_id = Some(listener_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub gdpr_applies: bool,
    pub cmp_loaded: bool,
    pub cmp_status: &'static str,
    pub display_status: &'static str,
    pub api_version: &'static str,
    pub cmp_version: u16,
    pub cmp_id: u16,
    pub gvl_version: u16,
    pub tcf_policy_version: u8,
}

impl Default for PingResponse {
    fn default() -> Self {
        Self {
            gdpr_applies: true,
            cmp_loaded: true,
            cmp_status: "loaded",
            display_status: "hidden",
            api_version: "2.2",
            cmp_version: CMP_VERSION as u16,
            cmp_id: CMP_ID as u16,
            gvl_version: VENDOR_LIST_VERSION as u16,
            tcf_policy_version: TCF_POLICY_VERSION as u8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VendorList {
    pub vendors: DeniedMap,
    pub purposes: DeniedMap,
}

/// First argument of a `__tcfapi` callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TcfResponse {
    TcData(Box<TcData>),
    Ping(PingResponse),
    VendorList(VendorList),
    /// `removeEventListener` answers with a bare boolean
    Flag(bool),
    Null,
}

impl TcfResponse {
    pub fn tc_data(&self) -> Option<&TcData> {
        match self {
            TcfResponse::TcData(data) => Some(data),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn denied_maps_serialize_as_false() {
        let data = TcData::with_tc_string("C".into()).deny_vendors(&[755, 42]);
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["vendor"]["consents"], json!({"42": false, "755": false}));
        assert_eq!(value["purpose"]["legitimateInterests"]["11"], json!(false));
        assert_eq!(value["publisherCC"], json!("AA"));
        assert_eq!(value["listenerId"], json!(null));
        assert_eq!(value["eventStatus"], json!("tcloaded"));
    }

    #[test]
    fn untagged_responses() {
        assert_eq!(TcfResponse::Null.to_json(), json!(null));
        assert_eq!(TcfResponse::Flag(true).to_json(), json!(true));
        assert_eq!(
            TcfResponse::VendorList(VendorList::default()).to_json(),
            json!({"vendors": {}, "purposes": {}})
        );
        let ping = TcfResponse::Ping(PingResponse::default()).to_json();
        assert_eq!(ping["displayStatus"], json!("hidden"));
        assert_eq!(ping["cmpLoaded"], json!(true));
    }

    #[test]
    fn denied_map_never_reports_a_grant() {
        let map = DeniedMap::with_range([1, 2]);
        assert_eq!(map.get(1), Some(false));
        assert_eq!(map.get(3), None);
    }
}
