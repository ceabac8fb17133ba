//! Wire protocol between the host and an execution slot.
//!
//! Every message carries the script id except ping/pong, which address the
//! slot itself. Payloads are JSON-serializable; handler arguments travel
//! as raw JSON values and are coerced by the VM on arrival.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::DetectedInfo;
use crate::{CallId, ScriptId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Host → slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostToSlot {
    /// Load a hardened program into the slot.
    Init {
        script_id: ScriptId,
        /// Canonical intermediate text (post sandbox transform).
        code: String,
        /// Per-script quota overrides.
        max_loop_iterations: u64,
        max_call_depth: u32,
    },
    /// Invoke one event handler.
    Event {
        script_id: ScriptId,
        event: String,
        args: Vec<Value>,
        #[serde(default)]
        detected: Vec<DetectedInfo>,
    },
    /// Resolution of an earlier api-call.
    ApiResponse {
        script_id: ScriptId,
        call_id: CallId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        error: Option<String>,
    },
    Terminate {
        script_id: ScriptId,
    },
    Ping {
        timestamp: u64,
    },
}

/// Slot → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SlotToHost {
    /// A script invoked a host-mediated builtin.
    ApiCall {
        script_id: ScriptId,
        call_id: CallId,
        method: String,
        args: Vec<Value>,
    },
    /// Program loaded and its entry state is active.
    Ready {
        script_id: ScriptId,
    },
    Error {
        script_id: ScriptId,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        code: Option<String>,
    },
    Log {
        script_id: ScriptId,
        level: LogLevel,
        message: String,
    },
    Pong {
        timestamp: u64,
    },
}

impl SlotToHost {
    /// Routing key for the bridge demultiplexer; ping/pong address the
    /// slot, not a script.
    pub fn script_id(&self) -> Option<&ScriptId> {
        match self {
            SlotToHost::ApiCall { script_id, .. }
            | SlotToHost::Ready { script_id }
            | SlotToHost::Error { script_id, .. }
            | SlotToHost::Log { script_id, .. } => Some(script_id),
            SlotToHost::Pong { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stable_field_names() {
        let msg = SlotToHost::ApiCall {
            script_id: "s1".into(),
            call_id: 7,
            method: "world.say".into(),
            args: vec![Value::from(0), Value::from("hi")],
        };
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "apiCall");
        assert_eq!(json["scriptId"], "s1");
        assert_eq!(json["callId"], 7);
        assert_eq!(json["method"], "world.say");
    }

    #[test]
    fn ping_pong_carry_no_script_id() {
        let ping = HostToSlot::Ping { timestamp: 42 };
        let json: Value = serde_json::to_value(&ping).unwrap();
        assert!(json.get("scriptId").is_none());
        assert_eq!(
            SlotToHost::Pong { timestamp: 42 }.script_id(),
            None
        );
    }

    #[test]
    fn api_response_round_trip() {
        let msg = HostToSlot::ApiResponse {
            script_id: "s1".into(),
            call_id: 3,
            result: Some(Value::from(128)),
            error: None,
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: HostToSlot = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, back);
    }
}
