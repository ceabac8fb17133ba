//! core-protocol: the typed, serializable contract between scripts and
//! the host.
//!
//! Everything here is value-typed and JSON-round-trippable: command and
//! event envelopes, link messages, the worker wire protocol, and the
//! bundle manifest boundary. No module in this crate holds references to
//! runtime state — routing happens by id lookup, never by pointer.

pub mod bundle;
pub mod commands;
pub mod events;
pub mod masks;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use commands::ScriptCommand;
pub use events::{AgentRef, DetectedInfo, WorldEvent};
pub use masks::{ChangeMask, DetectedTypeMask, PermissionMask};

pub type ScriptId = String;
pub type ContainerId = String;
pub type CallId = u64;
pub type LinkNumber = i32;

/// Link-message target selectors (mirroring the legacy constants).
pub const LINK_ROOT: i32 = 1;
pub const LINK_SET: i32 = -1;
pub const LINK_ALL_OTHERS: i32 = -2;
pub const LINK_ALL_CHILDREN: i32 = -3;
pub const LINK_THIS: i32 = -4;

/// Lifecycle state of a script instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptState {
    Loading,
    Running,
    Paused,
    Terminated,
    Error,
}

/// Routing envelope for one script command. Immutable after construction:
/// build it with [`ScriptCommandEnvelope::new`] and read the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCommandEnvelope {
    pub script_id: ScriptId,
    pub container_id: ContainerId,
    pub call_id: CallId,
    pub command: ScriptCommand,
}

impl ScriptCommandEnvelope {
    pub fn new(
        script_id: ScriptId,
        container_id: ContainerId,
        call_id: CallId,
        command: ScriptCommand,
    ) -> Self {
        Self {
            script_id,
            container_id,
            call_id,
            command,
        }
    }
}

/// Routing envelope for one world event. Omitting `target_script_id`
/// broadcasts to every script in the container, subject to per-event
/// semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldEventEnvelope {
    pub target_object_id: ContainerId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_script_id: Option<ScriptId>,
    pub event: WorldEvent,
}

/// One link-bus message. `sender_link` is computed from the sender's
/// registration, never taken from user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMessage {
    pub sender_script_id: ScriptId,
    pub sender_link: LinkNumber,
    pub num: i32,
    pub str: String,
    pub id: String,
}

/// Message names of the editor ⇄ preview-frame channel. The engine never
/// speaks this channel itself; the names are shared so envelope payloads
/// stay identical on both sides of the boundary.
pub mod preview {
    pub const SCRIPTER_COMMAND: &str = "scripter_command";
    pub const SCRIPTER_RESET: &str = "scripter_reset";
    pub const SCRIPTER_CREATE_PRIM: &str = "scripter_create_prim";
    pub const SCRIPTER_LOAD: &str = "scripter_load";
    pub const SCRIPTER_EVENT: &str = "scripter_event";
    pub const SCRIPTER_CONSOLE: &str = "scripter_console";
    pub const GLITCH_READY: &str = "glitch_ready";
    pub const GLITCH_ERROR: &str = "glitch_error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_envelope_round_trip() {
        let envelope = ScriptCommandEnvelope::new(
            "s1".into(),
            "c1".into(),
            9,
            ScriptCommand::OwnerSay {
                message: "hi".into(),
            },
        );
        let text = serde_json::to_string(&envelope).unwrap();
        let back: ScriptCommandEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope, back);
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["scriptId"], "s1");
        assert_eq!(json["containerId"], "c1");
        assert_eq!(json["callId"], 9);
    }

    #[test]
    fn event_envelope_broadcast_shape() {
        let envelope = WorldEventEnvelope {
            target_object_id: "door-1".into(),
            target_script_id: None,
            event: WorldEvent::NoSensor,
        };
        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("targetScriptId").is_none());
        let back: WorldEventEnvelope =
            serde_json::from_value(json).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn link_message_round_trip() {
        let msg = LinkMessage {
            sender_script_id: "s1".into(),
            sender_link: 0,
            num: 500,
            str: "AUTH_REQUEST".into(),
            id: "uuid-agent".into(),
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: LinkMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, back);
    }
}
