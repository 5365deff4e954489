//! The replacement `__tcfapi` and its installation into a page.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::TcfError;
use crate::locator::{FrameInfo, has_locator_frame};
use crate::payload::{PingResponse, TcData, TcfResponse, VendorList};

pub const OVERRIDE_MESSAGE_TYPE: &str = "UNBANNER_TCF_OVERRIDE";

/// `__tcfapi` callback: `(response, success)`.
pub type TcfCallback = Arc<dyn Fn(TcfResponse, bool) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcfCommand {
    GetTcData,
    GetInAppTcData,
    Ping,
    AddEventListener,
    RemoveEventListener,
    GetVendorList,
    Other(String),
}

impl TcfCommand {
    pub fn parse(command: &str) -> Self {
        match command {
            "getTCData" => Self::GetTcData,
            "getInAppTCData" => Self::GetInAppTcData,
            "ping" => Self::Ping,
            "addEventListener" => Self::AddEventListener,
            "removeEventListener" => Self::RemoveEventListener,
            "getVendorList" => Self::GetVendorList,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A call the page made before the interceptor existed.
#[derive(Clone)]
pub struct QueuedCall {
    pub command: String,
    pub version: u32,
    pub callback: Option<TcfCallback>,
    pub parameter: Value,
}

impl std::fmt::Debug for QueuedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedCall")
            .field("command", &self.command)
            .field("version", &self.version)
            .field("parameter", &self.parameter)
            .finish_non_exhaustive()
    }
}

/// Completion message posted to the page after installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideMarker {
    #[serde(rename = "type")]
    pub message_type: String,
    pub success: bool,
    pub had_existing_implementation: bool,
}

impl OverrideMarker {
    pub fn new(success: bool, had_existing_implementation: bool) -> Self {
        Self { message_type: OVERRIDE_MESSAGE_TYPE.to_string(), success, had_existing_implementation }
    }

    /// Parses a posted message, ignoring everything that is not ours.
    pub fn from_message(message: &Value) -> Option<Self> {
        let marker: Self = serde_json::from_value(message.clone()).ok()?;
        (marker.message_type == OVERRIDE_MESSAGE_TYPE).then_some(marker)
    }
}

/// The interceptor: answers every command with a rejected payload.
#[derive(Default)]
pub struct ConsentApi {
    listeners: Mutex<BTreeMap<u32, TcfCallback>>,
    next_listener: AtomicU32,
}

impl ConsentApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// `__tcfapi(command, version, callback, parameter)`. The callback runs
    /// synchronously, before this returns.
    pub fn call(&self, command: &str, version: u32, callback: Option<TcfCallback>, parameter: &Value) {
        let callback = callback.unwrap_or_else(|| -> TcfCallback { Arc::new(|_: TcfResponse, _: bool| {}) });
        debug!(command, version, "__tcfapi call");

        match TcfCommand::parse(command) {
            TcfCommand::GetTcData => {
                let data = TcData::reject_all().deny_vendors(&vendor_ids(parameter));
                callback(TcfResponse::TcData(Box::new(data)), true);
            }
            TcfCommand::GetInAppTcData => callback(TcfResponse::TcData(Box::new(TcData::reject_all())), true),
            TcfCommand::Ping => callback(TcfResponse::Ping(PingResponse::default()), true),
            TcfCommand::AddEventListener => {
                let id = self.next_listener.fetch_add(1, Ordering::SeqCst) + 1;
                self.listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id, callback.clone());
                callback(TcfResponse::TcData(Box::new(TcData::reject_all().for_listener(id))), true);
            }
            TcfCommand::RemoveEventListener => {
                let removed = parameter
                    .as_u64()
                    .and_then(|id| u32::try_from(id).ok())
                    .is_some_and(|id| self.listeners.lock().unwrap_or_else(PoisonError::into_inner).remove(&id).is_some());
                callback(TcfResponse::Flag(removed), removed);
            }
            TcfCommand::GetVendorList => callback(TcfResponse::VendorList(VendorList::default()), true),
            TcfCommand::Other(name) => {
                debug!(command = %name, "unknown __tcfapi command");
                callback(TcfResponse::Null, true)
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn vendor_ids(parameter: &Value) -> Vec<u32> {
    parameter
        .as_array()
        .map(|ids| ids.iter().filter_map(|v| v.as_u64()).filter_map(|v| u32::try_from(v).ok()).collect())
        .unwrap_or_default()
}

/// Filter on the consent-mode data layer: drops any consent update that grants
/// something and lets everything else through.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataLayerGuard;

impl DataLayerGuard {
    /// `["consent", "default", {...}]` denying every storage type except security.
    pub fn default_deny() -> Value {
        json!([
            "consent",
            "default",
            {
                "ad_storage": "denied",
                "ad_user_data": "denied",
                "ad_personalization": "denied",
                "analytics_storage": "denied",
                "functionality_storage": "denied",
                "personalization_storage": "denied",
                "security_storage": "granted"
            }
        ])
    }

    /// Accepts both array entries and `arguments`-style `{"0": .., "1": ..}` objects.
    pub fn allows(&self, entry: &Value) -> bool {
        let arg = |i: usize| match entry {
            Value::Array(items) => items.get(i),
            Value::Object(map) => map.get(&i.to_string()),
            _ => None,
        };
        let is_update = arg(0).and_then(Value::as_str) == Some("consent") && arg(1).and_then(Value::as_str) == Some("update");
        if !is_update {
            return true;
        }
        let grants = arg(2)
            .and_then(Value::as_object)
            .is_some_and(|settings| settings.values().any(|v| v.as_str() == Some("granted")));
        !grants
    }
}

/// The page global scope as the shim sees it.
pub trait ConsentHost: Send + Sync {
    /// Whether `__tcfapi` is already defined.
    fn has_tcf_api(&self) -> bool;
    /// Defines `__tcfapi` as non-writable and non-configurable.
    fn define_tcf_api(&self, api: Arc<ConsentApi>) -> Result<(), TcfError>;
    /// Takes the `__tcfapiQueue` contents.
    fn take_tcf_queue(&self) -> Vec<QueuedCall>;
    fn push_data_layer(&self, entry: Value);
    fn guard_data_layer(&self, guard: DataLayerGuard);
    fn post_message(&self, message: Value);
    fn frames(&self) -> Vec<FrameInfo>;
}

/// Result of bringing the consent override up in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimOutcome {
    pub marker: OverrideMarker,
    /// A locator frame or CMP iframe was seen
    pub locator_detected: bool,
}

impl ShimOutcome {
    /// A CMP was present before we got there.
    pub fn tcf_detected(&self) -> bool {
        self.marker.had_existing_implementation || self.locator_detected
    }
}

/// Anything the page guard can install the override into.
#[async_trait]
pub trait ShimTarget: Send + Sync {
    /// `None` when the override was already installed earlier.
    async fn install_override(&self) -> Result<Option<ShimOutcome>, TcfError>;
}

/// Installs a [`ConsentApi`] into a [`ConsentHost`] exactly once.
pub struct TcfShim<H: ConsentHost> {
    host: Arc<H>,
    api: Arc<ConsentApi>,
    installed: AtomicBool,
}

impl<H: ConsentHost> TcfShim<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self { host, api: Arc::new(ConsentApi::new()), installed: AtomicBool::new(false) }
    }

    pub fn api(&self) -> Arc<ConsentApi> {
        self.api.clone()
    }

    pub fn install(&self) -> Option<ShimOutcome> {
        if self.installed.swap(true, Ordering::SeqCst) {
            debug!("consent override already installed");
            return None;
        }

        let had_existing = self.host.has_tcf_api();
        let success = match self.host.define_tcf_api(self.api.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "could not take over __tcfapi");
                false
            }
        };

        if success {
            let queued = self.host.take_tcf_queue();
            if !queued.is_empty() {
                debug!(count = queued.len(), "answering queued __tcfapi calls");
            }
            for call in queued {
                self.api.call(&call.command, call.version, call.callback, &call.parameter);
            }
        }

        self.host.push_data_layer(DataLayerGuard::default_deny());
        self.host.guard_data_layer(DataLayerGuard);

        let marker = OverrideMarker::new(success, had_existing);
        self.host.post_message(serde_json::to_value(&marker).unwrap_or(Value::Null));

        let locator_detected = has_locator_frame(&self.host.frames());
        info!(success, had_existing, locator_detected, "consent override installed");
        Some(ShimOutcome { marker, locator_detected })
    }
}

#[async_trait]
impl<H: ConsentHost> ShimTarget for TcfShim<H> {
    async fn install_override(&self) -> Result<Option<ShimOutcome>, TcfError> {
        Ok(self.install())
    }
}
