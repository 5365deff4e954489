//! An in-memory page global scope for exercising the shim.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::TcfError;
use crate::locator::FrameInfo;
use crate::shim::{ConsentApi, ConsentHost, DataLayerGuard, QueuedCall, TcfCallback};

#[derive(Clone)]
enum Entrypoint {
    /// A CMP's own stub, which only queues
    Native,
    Locked(Arc<ConsentApi>),
}

#[derive(Default)]
struct WindowState {
    entrypoint: Option<Entrypoint>,
    queue: Vec<QueuedCall>,
    data_layer: Vec<Value>,
    guard: Option<DataLayerGuard>,
    messages: Vec<Value>,
    frames: Vec<FrameInfo>,
}

#[derive(Default)]
pub struct MemoryWindow {
    state: Mutex<WindowState>,
}

impl MemoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page whose CMP already defined its queuing `__tcfapi` stub.
    pub fn with_native_cmp() -> Self {
        let window = Self::new();
        window.lock().entrypoint = Some(Entrypoint::Native);
        window
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calls `window.__tcfapi`. Before our override exists the call is queued,
    /// the way CMP stubs buffer calls until their real implementation loads.
    pub fn call_tcf(&self, command: &str, version: u32, callback: Option<TcfCallback>, parameter: Value) {
        let entrypoint = self.lock().entrypoint.clone();
        match entrypoint {
            Some(Entrypoint::Locked(api)) => api.call(command, version, callback, &parameter),
            _ => self.lock().queue.push(QueuedCall { command: command.to_string(), version, callback, parameter }),
        }
    }

    /// A later script trying to replace `__tcfapi`.
    pub fn assign_tcf_api(&self) -> Result<(), TcfError> {
        let mut state = self.lock();
        match state.entrypoint {
            Some(Entrypoint::Locked(_)) => Err(TcfError::EntrypointLocked),
            _ => {
                state.entrypoint = Some(Entrypoint::Native);
                Ok(())
            }
        }
    }

    /// `dataLayer.push(entry)`; returns whether the entry was kept.
    pub fn data_layer_push(&self, entry: Value) -> bool {
        let mut state = self.lock();
        if state.guard.is_some_and(|guard| !guard.allows(&entry)) {
            return false;
        }
        state.data_layer.push(entry);
        true
    }

    pub fn data_layer(&self) -> Vec<Value> {
        self.lock().data_layer.clone()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.lock().messages.clone()
    }

    pub fn queued_calls(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn add_frame(&self, frame: FrameInfo) {
        self.lock().frames.push(frame);
    }
}

impl ConsentHost for MemoryWindow {
    fn has_tcf_api(&self) -> bool {
        self.lock().entrypoint.is_some()
    }

    fn define_tcf_api(&self, api: Arc<ConsentApi>) -> Result<(), TcfError> {
        let mut state = self.lock();
        if matches!(state.entrypoint, Some(Entrypoint::Locked(_))) {
            return Err(TcfError::EntrypointLocked);
        }
        state.entrypoint = Some(Entrypoint::Locked(api));
        Ok(())
    }

    fn take_tcf_queue(&self) -> Vec<QueuedCall> {
        std::mem::take(&mut self.lock().queue)
    }

    fn push_data_layer(&self, entry: Value) {
        self.data_layer_push(entry);
    }

    fn guard_data_layer(&self, guard: DataLayerGuard) {
        self.lock().guard = Some(guard);
    }

    fn post_message(&self, message: Value) {
        self.lock().messages.push(message);
    }

    fn frames(&self) -> Vec<FrameInfo> {
        self.lock().frames.clone()
    }
}
