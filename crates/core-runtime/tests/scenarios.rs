//! End-to-end scenarios through the host adapter: broadcast patterns,
//! queue bounds, loop quotas, command routing, event fan-out, and
//! lifecycle idempotence.

use core_config::{EngineConfig, ScriptOverrides};
use core_protocol::{
    AgentRef, ScriptCommand, ScriptCommandEnvelope, ScriptId, ScriptState, WorldEvent,
    WorldEventEnvelope,
};
use core_runtime::{HostReply, LoadOptions, ScriptHost};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct TestWorld {
    host: ScriptHost,
    commands: Arc<Mutex<Vec<ScriptCommandEnvelope>>>,
    errors: Arc<Mutex<Vec<(ScriptId, String)>>>,
}

fn world() -> TestWorld {
    let host = ScriptHost::new(EngineConfig::default());
    let commands = Arc::new(Mutex::new(Vec::new()));
    let sink = commands.clone();
    host.on_script_command(move |envelope| {
        sink.lock().unwrap().push(envelope);
        HostReply::nothing()
    });
    let errors = Arc::new(Mutex::new(Vec::new()));
    let error_sink = errors.clone();
    host.manager()
        .set_error_handler(Arc::new(move |script_id, message, _code| {
            error_sink
                .lock()
                .unwrap()
                .push((script_id.clone(), message.to_string()));
        }));
    TestWorld {
        host,
        commands,
        errors,
    }
}

fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}

fn load_running(world: &TestWorld, source: &str, container: &str, link: i32) -> ScriptId {
    let result = world.host.load_script(
        source,
        LoadOptions {
            container_id: container.to_string(),
            link_number: link,
            name: None,
            overrides: ScriptOverrides::default(),
        },
    );
    let id = result
        .script_id
        .unwrap_or_else(|| panic!("load failed: {:?}", result.diagnostics));
    assert!(
        wait_until(Duration::from_secs(5), || {
            world.host.get_script_status(&id) == Some(ScriptState::Running)
        }),
        "script {id} never reached running: {:?}",
        world.host.get_script_status(&id)
    );
    id
}

fn owner_say_texts(world: &TestWorld) -> Vec<(ScriptId, String)> {
    world
        .commands
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match &e.command {
            ScriptCommand::OwnerSay { message } => Some((e.script_id.clone(), message.clone())),
            _ => None,
        })
        .collect()
}

const RELAY: &str = r#"
default {
    link_message(integer sender, integer num, string str, key id) {
        llOwnerSay((string)sender + "|" + (string)num + "|" + str + "|" + (string)id);
    }
    touch_start(integer n) {
        llMessageLinked(LINK_SET, 500, "AUTH_REQUEST", "uuid-agent");
    }
}
"#;

#[test]
fn s1_link_set_broadcast_reaches_all_five() {
    let world = world();
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(load_running(&world, RELAY, "collar", 0));
    }
    // Touch the first script; it broadcasts to the whole container.
    world.host.dispatch_world_event(WorldEventEnvelope {
        target_object_id: "collar".into(),
        target_script_id: Some(ids[0].clone()),
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "uuid-agent".into(),
                name: "Agent".into(),
            },
            face: 0,
        },
    });
    assert!(
        wait_until(Duration::from_secs(5), || owner_say_texts(&world).len() >= 5),
        "expected 5 deliveries, got {:?}",
        owner_say_texts(&world)
    );
    let texts = owner_say_texts(&world);
    assert_eq!(texts.len(), 5, "exactly one delivery per script");
    let mut seen: Vec<ScriptId> = texts.iter().map(|(id, _)| id.clone()).collect();
    seen.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(seen, expected);
    for (_, text) in texts {
        assert_eq!(text, "0|500|AUTH_REQUEST|uuid-agent");
    }
}

const CHILD_SENDER: &str = r#"
default {
    touch_start(integer n) {
        llMessageLinked(LINK_ALL_CHILDREN, 7, "down", "");
    }
    link_message(integer sender, integer num, string str, key id) {
        llOwnerSay("heard " + (string)num);
    }
}
"#;

#[test]
fn s2_link_all_children_targets_links_above_one() {
    let world = world();
    let root = load_running(&world, CHILD_SENDER, "obj", 0);
    let _one = load_running(&world, CHILD_SENDER, "obj", 1);
    let two = load_running(&world, CHILD_SENDER, "obj", 2);
    let three = load_running(&world, CHILD_SENDER, "obj", 3);
    world.host.dispatch_world_event(WorldEventEnvelope {
        target_object_id: "obj".into(),
        target_script_id: Some(root.clone()),
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "A".into(),
            },
            face: 0,
        },
    });
    assert!(wait_until(Duration::from_secs(5), || {
        owner_say_texts(&world).len() >= 2
    }));
    std::thread::sleep(Duration::from_millis(200));
    let texts = owner_say_texts(&world);
    let mut heard: Vec<ScriptId> = texts.iter().map(|(id, _)| id.clone()).collect();
    heard.sort();
    let mut expected = vec![two, three];
    expected.sort();
    assert_eq!(heard, expected, "only links 2 and 3 hear the message");
}

#[test]
fn s3_queue_bound_drops_oldest_without_handler() {
    // Pre-handler accumulation is bus-level behavior; exercised directly.
    let mut bus = core_bus::LinkMessageBus::new(64);
    bus.register("rx".into(), "obj".into(), 0);
    bus.register("tx".into(), "obj".into(), 2);
    for n in 0..70 {
        bus.send(&"tx".to_string(), 0, n, String::new(), String::new());
    }
    assert!(bus.queue_len(&"rx".to_string()) <= 64);
    let nums: Vec<i32> = bus
        .queued(&"rx".to_string())
        .iter()
        .map(|m| m.num)
        .collect();
    assert_eq!(nums.first(), Some(&6), "oldest six messages are gone");
    assert_eq!(nums.last(), Some(&69));
}

#[test]
fn s4_loop_quota_moves_script_to_error() {
    let world = world();
    let result = world.host.load_script(
        "default { touch_start(integer n) { integer i; while (1) { i++; } } }",
        LoadOptions {
            container_id: "c1".into(),
            link_number: 0,
            name: None,
            overrides: ScriptOverrides {
                max_loop_iterations: Some(1000),
                max_call_depth: None,
            },
        },
    );
    let id = result.script_id.expect("load");
    assert!(wait_until(Duration::from_secs(5), || {
        world.host.get_script_status(&id) == Some(ScriptState::Running)
    }));
    world.host.dispatch_world_event(WorldEventEnvelope {
        target_object_id: "c1".into(),
        target_script_id: Some(id.clone()),
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "A".into(),
            },
            face: 0,
        },
    });
    assert!(
        wait_until(Duration::from_secs(5), || {
            world.host.get_script_status(&id) == Some(ScriptState::Error)
        }),
        "script should move to error"
    );
    let errors = world.errors.lock().unwrap();
    assert!(
        errors
            .iter()
            .any(|(sid, msg)| sid == &id && msg.contains("maximum iterations")),
        "error sink should name the quota: {errors:?}"
    );
}

#[test]
fn s5_loop_sound_routes_as_play_sound_envelope() {
    let world = world();
    let id = load_running(
        &world,
        r#"default { touch_start(integer n) { llLoopSound("a.ogg", 0.5); } }"#,
        "c1",
        0,
    );
    world.host.dispatch_world_event(WorldEventEnvelope {
        target_object_id: "c1".into(),
        target_script_id: Some(id.clone()),
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "A".into(),
            },
            face: 0,
        },
    });
    assert!(wait_until(Duration::from_secs(5), || {
        !world.commands.lock().unwrap().is_empty()
    }));
    let commands = world.commands.lock().unwrap();
    assert_eq!(commands.len(), 1, "exactly one envelope");
    let envelope = &commands[0];
    assert_eq!(envelope.script_id, id);
    assert_eq!(envelope.container_id, "c1");
    assert_eq!(
        envelope.command,
        ScriptCommand::PlaySound {
            sound: "a.ogg".into(),
            volume: 0.5,
            looped: true,
        }
    );
}

#[test]
fn s6_touch_fan_out_to_container() {
    let world = world();
    let speak = r#"default { touch_start(integer n) { llOwnerSay((string)llDetectedKey(0)); } }"#;
    let a = load_running(&world, speak, "door-1", 0);
    let b = load_running(&world, speak, "door-1", 1);
    world.host.dispatch_world_event(WorldEventEnvelope {
        target_object_id: "door-1".into(),
        target_script_id: None,
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "Alice".into(),
            },
            face: 2,
        },
    });
    assert!(wait_until(Duration::from_secs(5), || {
        owner_say_texts(&world).len() >= 2
    }));
    let texts = owner_say_texts(&world);
    let mut ids: Vec<ScriptId> = texts.iter().map(|(id, _)| id.clone()).collect();
    ids.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(ids, expected, "both scripts on the container fire");
    for (_, text) in texts {
        assert_eq!(text, "a", "detected info carries the toucher");
    }
}

#[test]
fn r2_terminate_is_idempotent_and_final() {
    let world = world();
    let id = load_running(
        &world,
        r#"default { touch_start(integer n) { llOwnerSay("hi"); } }"#,
        "c1",
        0,
    );
    world.host.manager().terminate_script(&id);
    assert_eq!(
        world.host.get_script_status(&id),
        Some(ScriptState::Terminated)
    );
    // Second terminate: no-op.
    world.host.manager().terminate_script(&id);
    assert_eq!(
        world.host.get_script_status(&id),
        Some(ScriptState::Terminated)
    );
    // A terminated script never hears events again.
    world.host.dispatch_world_event(WorldEventEnvelope {
        target_object_id: "c1".into(),
        target_script_id: Some(id.clone()),
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "A".into(),
            },
            face: 0,
        },
    });
    std::thread::sleep(Duration::from_millis(300));
    assert!(owner_say_texts(&world).is_empty());
}

#[test]
fn reset_creates_replacement_inheriting_container() {
    let world = world();
    let id = load_running(
        &world,
        r#"default { state_entry() { } touch_start(integer n) { llResetScript(); } }"#,
        "c9",
        3,
    );
    let replacement = world.host.manager().reset_script(&id).expect("reset");
    assert_ne!(replacement, id);
    assert_eq!(
        world.host.get_script_status(&id),
        Some(ScriptState::Terminated)
    );
    assert!(wait_until(Duration::from_secs(5), || {
        world.host.get_script_status(&replacement) == Some(ScriptState::Running)
    }));
    let record = world.host.manager().script_record(&replacement).unwrap();
    assert_eq!(record.container_id, "c9");
    assert_eq!(record.link_number, 3);
}

#[test]
fn timer_builtin_drives_timer_events() {
    let world = world();
    let id = load_running(
        &world,
        r#"
integer ticks = 0;
default {
    state_entry() { llSetTimerEvent(0.1); }
    timer() {
        ticks += 1;
        if (ticks == 3) {
            llSetTimerEvent(0.0);
            llOwnerSay("done");
        }
    }
}
"#,
        "c1",
        0,
    );
    assert!(
        wait_until(Duration::from_secs(10), || {
            owner_say_texts(&world).iter().any(|(sid, t)| sid == &id && t == "done")
        }),
        "timer should fire three times then clear"
    );
    // The timer was cleared; no further fires accumulate.
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(owner_say_texts(&world).len(), 1);
}

#[test]
fn listen_filtering_gates_chat_delivery() {
    let world = world();
    let id = load_running(
        &world,
        r#"
default {
    state_entry() { llListen(5, "", NULL_KEY, ""); }
    listen(integer channel, string name, key id, string message) {
        llOwnerSay(message);
    }
}
"#,
        "c1",
        0,
    );
    let chat = |channel: i32, message: &str| WorldEventEnvelope {
        target_object_id: "c1".into(),
        target_script_id: None,
        event: WorldEvent::Listen {
            channel,
            name: "Speaker".into(),
            id: "speaker-key".into(),
            message: message.into(),
        },
    };
    world.host.dispatch_world_event(chat(4, "wrong channel"));
    world.host.dispatch_world_event(chat(5, "right channel"));
    assert!(wait_until(Duration::from_secs(5), || {
        !owner_say_texts(&world).is_empty()
    }));
    std::thread::sleep(Duration::from_millis(200));
    let texts = owner_say_texts(&world);
    assert_eq!(texts, vec![(id, "right channel".to_string())]);
}

#[test]
fn bundle_pipeline_loads_scripts_onto_containers() {
    let world = world();
    let manifest = r#"{
        "format_version": 1,
        "scene_name": "plaza",
        "region": "sandbox",
        "objects": [{
            "id": "door-1",
            "name": "Door",
            "inventory": [
                {"name": "greeter", "type": "script", "asset_uuid": "u-1"},
                {"name": "texture", "type": "texture", "asset_uuid": "u-2"}
            ]
        }],
        "assets": {
            "u-1": {"type": "script", "path": "assets/greeter.lsl"},
            "u-2": {"type": "texture", "path": "assets/wood.png"}
        }
    }"#;
    let mut sources = HashMap::new();
    sources.insert(
        "assets/greeter.lsl".to_string(),
        r#"{"source": "default { state_entry() { llOwnerSay(\"bundle alive\"); } }"}"#.to_string(),
    );
    let report = world.host.load_bundle(manifest, &sources).expect("manifest");
    assert_eq!(report.loaded.len(), 1);
    let (container, script_id) = report.loaded[0].clone();
    assert_eq!(container, "door-1");
    assert!(wait_until(Duration::from_secs(5), || {
        owner_say_texts(&world)
            .iter()
            .any(|(sid, t)| sid == &script_id && t == "bundle alive")
    }));
}

#[test]
fn pause_suspends_delivery_and_resume_restores_it() {
    let world = world();
    let id = load_running(
        &world,
        r#"default { touch_start(integer n) { llOwnerSay("hi"); } }"#,
        "c1",
        0,
    );
    let touch = || WorldEventEnvelope {
        target_object_id: "c1".into(),
        target_script_id: Some(id.clone()),
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "a".into(),
                name: "A".into(),
            },
            face: 0,
        },
    };
    world.host.manager().pause_script(&id);
    assert_eq!(world.host.get_script_status(&id), Some(ScriptState::Paused));
    world.host.dispatch_world_event(touch());
    std::thread::sleep(Duration::from_millis(300));
    assert!(owner_say_texts(&world).is_empty(), "paused scripts hear nothing");

    world.host.manager().resume_script(&id);
    world.host.dispatch_world_event(touch());
    assert!(wait_until(Duration::from_secs(5), || {
        owner_say_texts(&world).len() == 1
    }));
}

#[test]
fn link_queue_bound_is_configurable() {
    let mut config = EngineConfig::default();
    config.bus.queue_bound = 8;
    let host = ScriptHost::new(config);
    drop(host);
}
