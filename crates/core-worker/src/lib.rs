//! core-worker: isolated execution slots with liveness guarantees.
//!
//! A slot is an OS thread running a single-threaded async runtime; the
//! host talks to it only through typed messages. This crate owns the
//! pool (placement, watchdog, respawn) and the bridge that fans
//! slot-outbound messages into the host's handler table. Lifecycle
//! policy — what an orphaned or errored script *means* — belongs to the
//! script manager, not here.

mod bridge;
mod host;
mod slot;

use core_protocol::worker::SlotToHost;

pub use bridge::{spawn_pump, BridgeHandlers};
pub use host::{PlacementError, WorkerHost, WorkerHostConfig};

/// In-process framing for slot-outbound messages: the wire message plus
/// the slot identity the protocol itself does not carry.
#[derive(Debug, Clone)]
pub struct SlotEnvelope {
    pub slot: usize,
    pub generation: u64,
    pub message: SlotToHost,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_sandbox::transform_program;
    use core_transpile::{transpile, TranspileOptions};
    use std::time::Duration;

    fn hardened(source: &str) -> String {
        let out = transpile(source, &TranspileOptions::default()).expect("transpile");
        assert!(!out.has_errors(), "{:?}", out.diagnostics);
        let (program, _) = transform_program(out.program);
        program.to_canonical()
    }

    fn recv_for_script(
        rx: &crossbeam_channel::Receiver<SlotEnvelope>,
        script_id: &str,
    ) -> SlotToHost {
        loop {
            let envelope = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("slot should answer");
            match &envelope.message {
                SlotToHost::Pong { .. } => continue,
                message => {
                    assert_eq!(message.script_id().map(String::as_str), Some(script_id));
                    return envelope.message;
                }
            }
        }
    }

    #[test]
    fn slot_runs_script_end_to_end() {
        let mut host = WorkerHost::new(WorkerHostConfig {
            pool_size: 1,
            max_scripts_per_slot: 8,
            watchdog_timeout: Duration::from_secs(10),
        });
        let rx = host.receiver();
        let code = hardened(
            r#"
default {
    state_entry() { llSay(0, "alive"); }
    touch_start(integer n) { llOwnerSay("touched"); }
}
"#,
        );
        host.load(&"s1".to_string(), code, 1_000_000, 256).unwrap();

        // state_entry runs on init: one api-call, then ready.
        let first = recv_for_script(&rx, "s1");
        let SlotToHost::ApiCall {
            call_id, method, ..
        } = first
        else {
            panic!("expected api call, got {first:?}");
        };
        assert_eq!(method, "world.say");
        host.send_api_response(&"s1".to_string(), call_id, None, None);
        let ready = recv_for_script(&rx, "s1");
        assert!(matches!(ready, SlotToHost::Ready { .. }));

        // Then a touch event round-trips.
        host.send_event(
            &"s1".to_string(),
            "onTouchStart".to_string(),
            vec![serde_json::json!("agent"), serde_json::json!(0)],
            vec![],
        );
        let touched = recv_for_script(&rx, "s1");
        let SlotToHost::ApiCall {
            call_id, method, ..
        } = touched
        else {
            panic!("expected api call, got {touched:?}");
        };
        assert_eq!(method, "world.ownerSay");
        host.send_api_response(&"s1".to_string(), call_id, None, None);
        host.stop();
    }

    #[test]
    fn loop_quota_error_reaches_host() {
        let mut host = WorkerHost::new(WorkerHostConfig {
            pool_size: 1,
            max_scripts_per_slot: 8,
            watchdog_timeout: Duration::from_secs(10),
        });
        let rx = host.receiver();
        let code = hardened("default { state_entry() { integer i; while (1) { i++; } } }");
        host.load(&"s1".to_string(), code, 1_000, 256).unwrap();
        let message = recv_for_script(&rx, "s1");
        let SlotToHost::Error { message, code, .. } = message else {
            panic!("expected error, got {message:?}");
        };
        assert!(message.contains("maximum iterations"));
        assert_eq!(code.as_deref(), Some("loop-quota"));
        host.stop();
    }

    #[test]
    fn ping_pong_round_trip() {
        let host = WorkerHost::new(WorkerHostConfig {
            pool_size: 2,
            max_scripts_per_slot: 8,
            watchdog_timeout: Duration::from_secs(10),
        });
        let rx = host.receiver();
        host.ping_all(42);
        let mut pongs = 0;
        while pongs < 2 {
            let envelope = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("pong expected");
            if let SlotToHost::Pong { timestamp } = envelope.message {
                assert_eq!(timestamp, 42);
                pongs += 1;
            }
        }
    }
}
