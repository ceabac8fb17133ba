//! Event dispatcher: world events → per-script handler invocations.
//!
//! The event-name to handler-name mapping is table-driven through
//! [`plan`]; the manager combines a plan with the bus's container index
//! to pick targets. The dispatcher also owns listen-handle registration
//! (with the legacy channel/name/key/message filters), granted-permission
//! tracking, and sensor request liveness, all cleaned up on termination.

use core_protocol::{DetectedInfo, PermissionMask, ScriptId, WorldEvent};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use tracing::trace;

/// One planned handler invocation, before target selection.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPlan {
    pub handler: &'static str,
    pub args: Vec<Json>,
    pub detected: Vec<DetectedInfo>,
}

fn vec3(v: &nalgebra::Vector3<f64>) -> Json {
    json!({"x": v.x, "y": v.y, "z": v.z})
}

/// Table-driven translation of an event into handler name + fixed
/// argument tuple. The handler names match the emitter's templates; the
/// agreement is pinned by a test against `core-transpile`.
pub fn plan(event: &WorldEvent) -> EventPlan {
    match event {
        WorldEvent::TouchStart { agent, face } => touch_plan("onTouchStart", agent, *face),
        WorldEvent::Touch { agent, face } => touch_plan("onTouch", agent, *face),
        WorldEvent::TouchEnd { agent, face } => touch_plan("onTouchEnd", agent, *face),
        WorldEvent::CollisionStart { other } => collision_plan("onCollisionStart", other),
        WorldEvent::Collision { other } => collision_plan("onCollision", other),
        WorldEvent::CollisionEnd { other } => collision_plan("onCollisionEnd", other),
        WorldEvent::LandCollisionStart { position } => EventPlan {
            handler: "onLandCollisionStart",
            args: vec![vec3(position)],
            detected: vec![],
        },
        WorldEvent::LandCollision { position } => EventPlan {
            handler: "onLandCollision",
            args: vec![vec3(position)],
            detected: vec![],
        },
        WorldEvent::LandCollisionEnd { position } => EventPlan {
            handler: "onLandCollisionEnd",
            args: vec![vec3(position)],
            detected: vec![],
        },
        WorldEvent::Listen {
            channel,
            name,
            id,
            message,
        } => EventPlan {
            handler: "onListen",
            args: vec![json!(channel), json!(name), json!(id), json!(message)],
            detected: vec![],
        },
        WorldEvent::Timer { timer_id } => EventPlan {
            handler: "onTimer",
            args: vec![json!(timer_id.clone().unwrap_or_else(|| "default".into()))],
            detected: vec![],
        },
        WorldEvent::Sensor { detected } => EventPlan {
            handler: "onSensor",
            args: vec![],
            detected: detected.clone(),
        },
        WorldEvent::NoSensor => empty_plan("onNoSensor"),
        WorldEvent::Changed { change } => EventPlan {
            handler: "onChanged",
            args: vec![json!(change.bits())],
            detected: vec![],
        },
        WorldEvent::Attach { id } => EventPlan {
            handler: "onAttach",
            args: vec![json!(id)],
            detected: vec![],
        },
        WorldEvent::OnRez { start_param } => EventPlan {
            handler: "onRez",
            args: vec![json!(start_param)],
            detected: vec![],
        },
        WorldEvent::ObjectRez { id } => EventPlan {
            handler: "onObjectRez",
            args: vec![json!(id)],
            detected: vec![],
        },
        WorldEvent::Money { id, amount } => EventPlan {
            handler: "onMoney",
            args: vec![json!(id), json!(amount)],
            detected: vec![],
        },
        WorldEvent::RunTimePermissions { permissions } => EventPlan {
            handler: "onRunTimePermissions",
            args: vec![json!(permissions.bits())],
            detected: vec![],
        },
        WorldEvent::Control { id, level, edge } => EventPlan {
            handler: "onControl",
            args: vec![json!(id), json!(level), json!(edge)],
            detected: vec![],
        },
        WorldEvent::Dataserver { query_id, data } => EventPlan {
            handler: "onDataserver",
            args: vec![json!(query_id), json!(data)],
            detected: vec![],
        },
        WorldEvent::HttpResponse {
            request_id,
            status,
            metadata,
            body,
        } => EventPlan {
            handler: "onHttpResponse",
            args: vec![json!(request_id), json!(status), json!(metadata), json!(body)],
            detected: vec![],
        },
        WorldEvent::LinkMessage {
            sender_link,
            num,
            message,
            id,
        } => EventPlan {
            handler: "onLinkMessage",
            args: vec![json!(sender_link), json!(num), json!(message), json!(id)],
            detected: vec![],
        },
        WorldEvent::StateEntry => empty_plan("onStateEntry"),
        WorldEvent::StateExit => empty_plan("onStateExit"),
        WorldEvent::AtTarget {
            handle,
            target_pos,
            current_pos,
        } => EventPlan {
            handler: "onAtTarget",
            args: vec![json!(handle), vec3(target_pos), vec3(current_pos)],
            detected: vec![],
        },
        WorldEvent::NotAtTarget => empty_plan("onNotAtTarget"),
        WorldEvent::MovingStart => empty_plan("onMovingStart"),
        WorldEvent::MovingEnd => empty_plan("onMovingEnd"),
        WorldEvent::Email {
            time,
            address,
            subject,
            message,
            remaining,
        } => EventPlan {
            handler: "onEmail",
            args: vec![
                json!(time),
                json!(address),
                json!(subject),
                json!(message),
                json!(remaining),
            ],
            detected: vec![],
        },
    }
}

fn empty_plan(handler: &'static str) -> EventPlan {
    EventPlan {
        handler,
        args: vec![],
        detected: vec![],
    }
}

fn touch_plan(handler: &'static str, agent: &core_protocol::AgentRef, face: i32) -> EventPlan {
    let mut info = DetectedInfo::agent(agent.id.clone(), agent.name.clone());
    info.touch_face = face;
    EventPlan {
        handler,
        args: vec![json!(agent.id), json!(face)],
        detected: vec![info],
    }
}

fn collision_plan(handler: &'static str, other: &DetectedInfo) -> EventPlan {
    EventPlan {
        handler,
        args: vec![json!(other.id)],
        detected: vec![other.clone()],
    }
}

// ---------------------------------------------------------------------
// Per-script subscriptions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ListenEntry {
    pub handle: i32,
    pub channel: i32,
    pub name: String,
    pub key: String,
    pub message: String,
    pub active: bool,
}

impl ListenEntry {
    /// Legacy listen filter: channel must match, every non-empty field
    /// must match exactly.
    fn matches(&self, channel: i32, name: &str, id: &str, message: &str) -> bool {
        self.active
            && self.channel == channel
            && (self.name.is_empty() || self.name == name)
            && (self.key.is_empty() || self.key == id)
            && (self.message.is_empty() || self.message == message)
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    listens: HashMap<ScriptId, Vec<ListenEntry>>,
    next_listen_handle: i32,
    /// Last granted permission set per script, keyed for
    /// `script.permissions` reads.
    permissions: HashMap<ScriptId, (PermissionMask, String)>,
    /// Scripts with an outstanding sensor request.
    active_sensors: HashMap<ScriptId, bool>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listen(
        &mut self,
        script_id: &ScriptId,
        channel: i32,
        name: String,
        key: String,
        message: String,
    ) -> i32 {
        // The null key as an id filter means "anyone", same as empty.
        let key = if key == "00000000-0000-0000-0000-000000000000" {
            String::new()
        } else {
            key
        };
        self.next_listen_handle += 1;
        let handle = self.next_listen_handle;
        trace!(
            target: "runtime.dispatch",
            script_id = %script_id,
            channel,
            handle,
            "listen registered"
        );
        self.listens
            .entry(script_id.clone())
            .or_default()
            .push(ListenEntry {
                handle,
                channel,
                name,
                key,
                message,
                active: true,
            });
        handle
    }

    pub fn remove_listen(&mut self, script_id: &ScriptId, handle: i32) {
        if let Some(entries) = self.listens.get_mut(script_id) {
            entries.retain(|e| e.handle != handle);
        }
    }

    pub fn control_listen(&mut self, script_id: &ScriptId, handle: i32, active: bool) {
        if let Some(entries) = self.listens.get_mut(script_id)
            && let Some(entry) = entries.iter_mut().find(|e| e.handle == handle)
        {
            entry.active = active;
        }
    }

    pub fn hears(
        &self,
        script_id: &ScriptId,
        channel: i32,
        name: &str,
        id: &str,
        message: &str,
    ) -> bool {
        self.listens
            .get(script_id)
            .is_some_and(|entries| entries.iter().any(|e| e.matches(channel, name, id, message)))
    }

    pub fn grant_permissions(
        &mut self,
        script_id: &ScriptId,
        permissions: PermissionMask,
        agent: String,
    ) {
        self.permissions
            .insert(script_id.clone(), (permissions, agent));
    }

    pub fn permissions(&self, script_id: &ScriptId) -> (PermissionMask, String) {
        self.permissions
            .get(script_id)
            .cloned()
            .unwrap_or((PermissionMask::empty(), String::new()))
    }

    pub fn sensor_started(&mut self, script_id: &ScriptId, repeating: bool) {
        self.active_sensors.insert(script_id.clone(), repeating);
    }

    pub fn sensor_removed(&mut self, script_id: &ScriptId) {
        self.active_sensors.remove(script_id);
    }

    /// A result arrived; one-shot requests end here, repeating ones
    /// stay armed.
    pub fn sensor_fired(&mut self, script_id: &ScriptId) {
        if self.active_sensors.get(script_id) == Some(&false) {
            self.active_sensors.remove(script_id);
        }
    }

    pub fn has_active_sensor(&self, script_id: &ScriptId) -> bool {
        self.active_sensors.contains_key(script_id)
    }

    /// Drop every subscription of a terminated script.
    pub fn remove_script(&mut self, script_id: &ScriptId) {
        self.listens.remove(script_id);
        self.permissions.remove(script_id);
        self.active_sensors.remove(script_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_protocol::AgentRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn touch_plan_shape() {
        let plan = plan(&WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "Alice".into(),
            },
            face: 2,
        });
        assert_eq!(plan.handler, "onTouchStart");
        assert_eq!(plan.args, vec![json!("a"), json!(2)]);
        assert_eq!(plan.detected.len(), 1);
        assert_eq!(plan.detected[0].touch_face, 2);
    }

    #[test]
    fn handler_names_agree_with_emitter_templates() {
        // The dispatcher table and the code generator's handler templates
        // must never drift apart.
        let cases: Vec<(&str, WorldEvent)> = vec![
            (
                "touch_start",
                WorldEvent::TouchStart {
                    agent: AgentRef {
                        id: "a".into(),
                        name: "A".into(),
                    },
                    face: 0,
                },
            ),
            (
                "listen",
                WorldEvent::Listen {
                    channel: 0,
                    name: String::new(),
                    id: String::new(),
                    message: String::new(),
                },
            ),
            ("timer", WorldEvent::Timer { timer_id: None }),
            ("sensor", WorldEvent::Sensor { detected: vec![] }),
            ("no_sensor", WorldEvent::NoSensor),
            (
                "changed",
                WorldEvent::Changed {
                    change: core_protocol::ChangeMask::OWNER,
                },
            ),
            ("state_entry", WorldEvent::StateEntry),
            ("moving_end", WorldEvent::MovingEnd),
            (
                "http_response",
                WorldEvent::HttpResponse {
                    request_id: String::new(),
                    status: 200,
                    metadata: vec![],
                    body: String::new(),
                },
            ),
            (
                "link_message",
                WorldEvent::LinkMessage {
                    sender_link: 0,
                    num: 0,
                    message: String::new(),
                    id: String::new(),
                },
            ),
        ];
        for (source_event, event) in cases {
            let expected = core_transpile::handler_method_name(source_event)
                .unwrap_or_else(|| panic!("{source_event} must have a template"));
            assert_eq!(plan(&event).handler, expected, "event {source_event}");
        }
    }

    #[test]
    fn listen_filters() {
        let mut d = Dispatcher::new();
        let s = "s1".to_string();
        let h = d.add_listen(&s, 5, String::new(), String::new(), String::new());
        assert!(d.hears(&s, 5, "any", "key", "msg"));
        assert!(!d.hears(&s, 6, "any", "key", "msg"));

        d.control_listen(&s, h, false);
        assert!(!d.hears(&s, 5, "any", "key", "msg"));
        d.control_listen(&s, h, true);

        let h2 = d.add_listen(&s, 7, "Alice".into(), String::new(), "ping".into());
        assert!(d.hears(&s, 7, "Alice", "k", "ping"));
        assert!(!d.hears(&s, 7, "Bob", "k", "ping"));
        assert!(!d.hears(&s, 7, "Alice", "k", "pong"));

        d.remove_listen(&s, h2);
        assert!(!d.hears(&s, 7, "Alice", "k", "ping"));
    }

    #[test]
    fn listen_handles_are_unique_and_increasing() {
        let mut d = Dispatcher::new();
        let s = "s1".to_string();
        let a = d.add_listen(&s, 0, String::new(), String::new(), String::new());
        let b = d.add_listen(&s, 0, String::new(), String::new(), String::new());
        assert!(b > a);
    }

    #[test]
    fn subscription_cleanup_on_removal() {
        let mut d = Dispatcher::new();
        let s = "s1".to_string();
        d.add_listen(&s, 1, String::new(), String::new(), String::new());
        d.grant_permissions(&s, PermissionMask::TAKE_CONTROLS, "agent".into());
        d.sensor_started(&s, true);
        d.remove_script(&s);
        assert!(!d.hears(&s, 1, "", "", ""));
        assert_eq!(d.permissions(&s).0, PermissionMask::empty());
        assert!(!d.has_active_sensor(&s));
    }
}
