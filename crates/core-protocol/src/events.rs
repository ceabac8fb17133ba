//! World events the host injects into the engine.
//!
//! Tagged the same way as commands. The dispatcher owns the mapping from
//! these variants to per-script handler invocations; unknown event JSON
//! fails deserialization and is logged and dropped at the boundary.

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::masks::{ChangeMask, DetectedTypeMask, PermissionMask};

pub type Vec3 = Vector3<f64>;
pub type Quat = Quaternion<f64>;

/// Minimal agent reference carried by interaction events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRef {
    pub id: String,
    pub name: String,
}

fn default_quat() -> Quat {
    Quaternion::new(1.0, 0.0, 0.0, 0.0)
}

/// One entry of the detected-info array populated for touch, collision,
/// and sensor handlers. All fields beyond `id`/`name` are optional on the
/// wire and default to inert values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default = "default_quat")]
    pub rotation: Quat,
    #[serde(default)]
    pub velocity: Vec3,
    #[serde(rename = "type", default)]
    pub type_mask: DetectedTypeMask,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub group: i32,
    #[serde(default)]
    pub link_number: i32,
    #[serde(default = "DetectedInfo::invalid_face")]
    pub touch_face: i32,
    #[serde(default)]
    pub touch_position: Vec3,
    #[serde(default)]
    pub touch_normal: Vec3,
    #[serde(default)]
    pub touch_binormal: Vec3,
    #[serde(default)]
    pub touch_st: Vec3,
    #[serde(default)]
    pub touch_uv: Vec3,
}

impl DetectedInfo {
    fn invalid_face() -> i32 {
        -1
    }

    pub fn agent(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: Vec3::zeros(),
            rotation: default_quat(),
            velocity: Vec3::zeros(),
            type_mask: DetectedTypeMask::AGENT,
            owner: String::new(),
            group: 0,
            link_number: 0,
            touch_face: -1,
            touch_position: Vec3::zeros(),
            touch_normal: Vec3::zeros(),
            touch_binormal: Vec3::zeros(),
            touch_st: Vec3::zeros(),
            touch_uv: Vec3::zeros(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorldEvent {
    TouchStart { agent: AgentRef, face: i32 },
    Touch { agent: AgentRef, face: i32 },
    TouchEnd { agent: AgentRef, face: i32 },
    CollisionStart { other: DetectedInfo },
    Collision { other: DetectedInfo },
    CollisionEnd { other: DetectedInfo },
    LandCollisionStart { position: Vec3 },
    LandCollision { position: Vec3 },
    LandCollisionEnd { position: Vec3 },
    /// Chat heard on a channel; the dispatcher filters against each
    /// script's active listens before delivery.
    Listen {
        channel: i32,
        name: String,
        id: String,
        message: String,
    },
    Timer {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        timer_id: Option<String>,
    },
    Sensor { detected: Vec<DetectedInfo> },
    NoSensor,
    Changed { change: ChangeMask },
    Attach { id: String },
    OnRez { start_param: i32 },
    ObjectRez { id: String },
    Money { id: String, amount: i32 },
    RunTimePermissions { permissions: PermissionMask },
    Control { id: String, level: i32, edge: i32 },
    Dataserver { query_id: String, data: String },
    HttpResponse {
        request_id: String,
        status: i32,
        metadata: Vec<Value>,
        body: String,
    },
    LinkMessage {
        sender_link: i32,
        num: i32,
        message: String,
        id: String,
    },
    StateEntry,
    StateExit,
    AtTarget { handle: i32, target_pos: Vec3, current_pos: Vec3 },
    NotAtTarget,
    MovingStart,
    MovingEnd,
    Email {
        time: String,
        address: String,
        subject: String,
        message: String,
        remaining: i32,
    },
}

impl WorldEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            WorldEvent::TouchStart { .. } => "touchStart",
            WorldEvent::Touch { .. } => "touch",
            WorldEvent::TouchEnd { .. } => "touchEnd",
            WorldEvent::CollisionStart { .. } => "collisionStart",
            WorldEvent::Collision { .. } => "collision",
            WorldEvent::CollisionEnd { .. } => "collisionEnd",
            WorldEvent::LandCollisionStart { .. } => "landCollisionStart",
            WorldEvent::LandCollision { .. } => "landCollision",
            WorldEvent::LandCollisionEnd { .. } => "landCollisionEnd",
            WorldEvent::Listen { .. } => "listen",
            WorldEvent::Timer { .. } => "timer",
            WorldEvent::Sensor { .. } => "sensor",
            WorldEvent::NoSensor => "noSensor",
            WorldEvent::Changed { .. } => "changed",
            WorldEvent::Attach { .. } => "attach",
            WorldEvent::OnRez { .. } => "onRez",
            WorldEvent::ObjectRez { .. } => "objectRez",
            WorldEvent::Money { .. } => "money",
            WorldEvent::RunTimePermissions { .. } => "runTimePermissions",
            WorldEvent::Control { .. } => "control",
            WorldEvent::Dataserver { .. } => "dataserver",
            WorldEvent::HttpResponse { .. } => "httpResponse",
            WorldEvent::LinkMessage { .. } => "linkMessage",
            WorldEvent::StateEntry => "stateEntry",
            WorldEvent::StateExit => "stateExit",
            WorldEvent::AtTarget { .. } => "atTarget",
            WorldEvent::NotAtTarget => "notAtTarget",
            WorldEvent::MovingStart => "movingStart",
            WorldEvent::MovingEnd => "movingEnd",
            WorldEvent::Email { .. } => "email",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn touch_event_wire_shape() {
        let event = WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "Alice".into(),
            },
            face: 2,
        };
        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "touchStart");
        assert_eq!(json["agent"]["name"], "Alice");
        assert_eq!(json["face"], 2);
    }

    #[test]
    fn round_trip_equality() {
        let events = vec![
            WorldEvent::Listen {
                channel: 500,
                name: "collar".into(),
                id: "uuid".into(),
                message: "AUTH_REQUEST".into(),
            },
            WorldEvent::Timer {
                timer_id: Some("blink".into()),
            },
            WorldEvent::Changed {
                change: ChangeMask::OWNER | ChangeMask::INVENTORY,
            },
            WorldEvent::Sensor {
                detected: vec![DetectedInfo::agent("a", "Alice")],
            },
            WorldEvent::NoSensor,
        ];
        for event in events {
            let text = serde_json::to_string(&event).unwrap();
            let back: WorldEvent = serde_json::from_str(&text).unwrap();
            assert_eq!(event, back);
        }
    }

    #[test]
    fn detected_info_defaults_fill_missing_fields() {
        let info: DetectedInfo =
            serde_json::from_str(r#"{"id":"x","name":"thing"}"#).unwrap();
        assert_eq!(info.touch_face, -1);
        assert_eq!(info.position, Vec3::zeros());
        assert_eq!(info.rotation, Quaternion::new(1.0, 0.0, 0.0, 0.0));
    }
}
