//! Bridge: demultiplexes slot-outbound traffic into the host's handler
//! table.
//!
//! All slots share one channel; each message is framed with the slot
//! index and generation so pongs can be attributed (the wire protocol's
//! pong carries no script id). The pump is a plain thread — handlers run
//! on it, so they must be quick and must not block on the slots.

use crate::SlotEnvelope;
use core_protocol::worker::{LogLevel, SlotToHost};
use core_protocol::{CallId, ScriptId};
use serde_json::Value as Json;
use tracing::{debug, trace};

/// Main-thread handler table keyed by message kind.
pub struct BridgeHandlers {
    pub on_api_call: Box<dyn Fn(ScriptId, CallId, String, Vec<Json>) + Send>,
    pub on_ready: Box<dyn Fn(ScriptId) + Send>,
    pub on_error: Box<dyn Fn(ScriptId, String, Option<String>) + Send>,
    pub on_log: Box<dyn Fn(ScriptId, LogLevel, String) + Send>,
    /// `(slot, generation, timestamp)`.
    pub on_pong: Box<dyn Fn(usize, u64, u64) + Send>,
}

/// Spawn the pump thread. It exits when every slot sender is gone.
pub fn spawn_pump(
    rx: crossbeam_channel::Receiver<SlotEnvelope>,
    handlers: BridgeHandlers,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("relic-bridge".to_string())
        .spawn(move || {
            debug!(target: "runtime.worker", "bridge pump online");
            while let Ok(envelope) = rx.recv() {
                dispatch(envelope, &handlers);
            }
            debug!(target: "runtime.worker", "bridge pump offline");
        })
        .expect("bridge thread spawn")
}

fn dispatch(envelope: SlotEnvelope, handlers: &BridgeHandlers) {
    trace!(
        target: "runtime.worker",
        slot = envelope.slot,
        message = ?envelope.message,
        "slot message"
    );
    match envelope.message {
        SlotToHost::ApiCall {
            script_id,
            call_id,
            method,
            args,
        } => (handlers.on_api_call)(script_id, call_id, method, args),
        SlotToHost::Ready { script_id } => (handlers.on_ready)(script_id),
        SlotToHost::Error {
            script_id,
            message,
            code,
        } => (handlers.on_error)(script_id, message, code),
        SlotToHost::Log {
            script_id,
            level,
            message,
        } => (handlers.on_log)(script_id, level, message),
        SlotToHost::Pong { timestamp } => {
            (handlers.on_pong)(envelope.slot, envelope.generation, timestamp)
        }
    }
}
