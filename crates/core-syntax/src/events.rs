//! Closed table of event handlers the source language defines.
//!
//! The parser validates handler names and arities against this table.
//! Unknown names still parse (extension events) but are flagged so the
//! caller can warn. The `detected` bit marks events whose handlers may use
//! the `llDetected*` accessors.

use crate::token::LslType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSig {
    pub name: &'static str,
    pub params: &'static [LslType],
    pub detected: bool,
}

use LslType::{Integer, Key, List, String as Str, Vector};

pub const EVENTS: &[EventSig] = &[
    EventSig {
        name: "state_entry",
        params: &[],
        detected: false,
    },
    EventSig {
        name: "state_exit",
        params: &[],
        detected: false,
    },
    EventSig {
        name: "touch_start",
        params: &[Integer],
        detected: true,
    },
    EventSig {
        name: "touch",
        params: &[Integer],
        detected: true,
    },
    EventSig {
        name: "touch_end",
        params: &[Integer],
        detected: true,
    },
    EventSig {
        name: "collision_start",
        params: &[Integer],
        detected: true,
    },
    EventSig {
        name: "collision",
        params: &[Integer],
        detected: true,
    },
    EventSig {
        name: "collision_end",
        params: &[Integer],
        detected: true,
    },
    EventSig {
        name: "land_collision_start",
        params: &[Vector],
        detected: false,
    },
    EventSig {
        name: "land_collision",
        params: &[Vector],
        detected: false,
    },
    EventSig {
        name: "land_collision_end",
        params: &[Vector],
        detected: false,
    },
    EventSig {
        name: "timer",
        params: &[],
        detected: false,
    },
    EventSig {
        name: "listen",
        params: &[Integer, Str, Key, Str],
        detected: false,
    },
    EventSig {
        name: "sensor",
        params: &[Integer],
        detected: true,
    },
    EventSig {
        name: "no_sensor",
        params: &[],
        detected: false,
    },
    EventSig {
        name: "changed",
        params: &[Integer],
        detected: false,
    },
    EventSig {
        name: "attach",
        params: &[Key],
        detected: false,
    },
    EventSig {
        name: "on_rez",
        params: &[Integer],
        detected: false,
    },
    EventSig {
        name: "object_rez",
        params: &[Key],
        detected: false,
    },
    EventSig {
        name: "money",
        params: &[Key, Integer],
        detected: false,
    },
    EventSig {
        name: "run_time_permissions",
        params: &[Integer],
        detected: false,
    },
    EventSig {
        name: "control",
        params: &[Key, Integer, Integer],
        detected: false,
    },
    EventSig {
        name: "dataserver",
        params: &[Key, Str],
        detected: false,
    },
    EventSig {
        name: "http_response",
        params: &[Key, Integer, List, Str],
        detected: false,
    },
    EventSig {
        name: "link_message",
        params: &[Integer, Integer, Str, Key],
        detected: false,
    },
    EventSig {
        name: "email",
        params: &[Str, Str, Str, Str, Integer],
        detected: false,
    },
    EventSig {
        name: "at_target",
        params: &[Integer, Vector, Vector],
        detected: false,
    },
    EventSig {
        name: "not_at_target",
        params: &[],
        detected: false,
    },
    EventSig {
        name: "moving_start",
        params: &[],
        detected: false,
    },
    EventSig {
        name: "moving_end",
        params: &[],
        detected: false,
    },
];

pub fn lookup(name: &str) -> Option<&'static EventSig> {
    EVENTS.iter().find(|sig| sig.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_events_resolve_with_arity() {
        let listen = lookup("listen").expect("listen is a known event");
        assert_eq!(listen.params.len(), 4);
        assert!(!listen.detected);

        let touch = lookup("touch_start").expect("touch_start is a known event");
        assert_eq!(touch.params.len(), 1);
        assert!(touch.detected);
    }

    #[test]
    fn unknown_event_is_none() {
        assert!(lookup("on_quantum_flux").is_none());
    }

    #[test]
    fn names_are_unique() {
        for (i, a) in EVENTS.iter().enumerate() {
            for b in &EVENTS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
