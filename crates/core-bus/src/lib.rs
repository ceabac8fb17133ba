//! Link-message bus: intra-container pub/sub between scripts.
//!
//! Registrations map script → container + link number, with a container
//! index for fast broadcast. Six target modes select recipients; the
//! sender's link number always comes from its registration, never from
//! user input, and delivery never crosses a container boundary.
//!
//! Each recipient has a FIFO queue bounded by `queue_bound`; overflow
//! drops the oldest entry. Before a delivery handler is installed,
//! messages accumulate up to the bound, then flush in order once the
//! handler arrives.

use core_protocol::{
    ContainerId, LinkMessage, LinkNumber, ScriptId, LINK_ALL_CHILDREN, LINK_ALL_OTHERS,
    LINK_SET, LINK_THIS,
};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace, warn};

/// Callback invoked for each delivered message.
pub type DeliveryHandler = Box<dyn Fn(&ScriptId, &LinkMessage) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    container_id: ContainerId,
    link_number: LinkNumber,
}

pub struct LinkMessageBus {
    queue_bound: usize,
    registrations: HashMap<ScriptId, Registration>,
    /// Container → member scripts, for broadcast without a full scan.
    containers: HashMap<ContainerId, HashSet<ScriptId>>,
    queues: HashMap<ScriptId, VecDeque<LinkMessage>>,
    handler: Option<DeliveryHandler>,
    dropped_total: u64,
}

impl LinkMessageBus {
    pub fn new(queue_bound: usize) -> Self {
        Self {
            queue_bound: queue_bound.max(1),
            registrations: HashMap::new(),
            containers: HashMap::new(),
            queues: HashMap::new(),
            handler: None,
            dropped_total: 0,
        }
    }

    pub fn register(
        &mut self,
        script_id: ScriptId,
        container_id: ContainerId,
        link_number: LinkNumber,
    ) {
        trace!(
            target: "runtime.bus",
            script_id = %script_id,
            container_id = %container_id,
            link_number,
            "register"
        );
        self.containers
            .entry(container_id.clone())
            .or_default()
            .insert(script_id.clone());
        self.registrations.insert(
            script_id,
            Registration {
                container_id,
                link_number,
            },
        );
    }

    pub fn unregister(&mut self, script_id: &ScriptId) {
        if let Some(reg) = self.registrations.remove(script_id) {
            if let Some(members) = self.containers.get_mut(&reg.container_id) {
                members.remove(script_id);
                if members.is_empty() {
                    self.containers.remove(&reg.container_id);
                }
            }
            self.queues.remove(script_id);
        }
    }

    /// Drop every registration of a container (host removed the object).
    pub fn remove_container(&mut self, container_id: &ContainerId) -> Vec<ScriptId> {
        let members: Vec<ScriptId> = self
            .containers
            .remove(container_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for script_id in &members {
            self.registrations.remove(script_id);
            self.queues.remove(script_id);
        }
        members
    }

    pub fn registration(&self, script_id: &ScriptId) -> Option<(ContainerId, LinkNumber)> {
        self.registrations
            .get(script_id)
            .map(|r| (r.container_id.clone(), r.link_number))
    }

    pub fn container_scripts(&self, container_id: &ContainerId) -> Vec<ScriptId> {
        self.containers
            .get(container_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Install the delivery handler and flush everything queued so far.
    pub fn set_delivery_handler(&mut self, handler: DeliveryHandler) {
        self.handler = Some(handler);
        let queued: Vec<(ScriptId, Vec<LinkMessage>)> = self
            .queues
            .iter_mut()
            .map(|(id, q)| (id.clone(), q.drain(..).collect()))
            .collect();
        let handler = self.handler.as_ref().expect("just installed");
        for (script_id, messages) in queued {
            for message in messages {
                handler(&script_id, &message);
            }
        }
        self.queues.clear();
    }

    /// Route a message. Unregistered senders are a silent no-op.
    pub fn send(
        &mut self,
        sender_script_id: &ScriptId,
        link: i32,
        num: i32,
        str_value: String,
        id_value: String,
    ) {
        let Some(sender) = self.registrations.get(sender_script_id).cloned() else {
            trace!(target: "runtime.bus", sender = %sender_script_id, "send from unregistered sender ignored");
            return;
        };
        let message = LinkMessage {
            sender_script_id: sender_script_id.clone(),
            sender_link: sender.link_number,
            num,
            str: str_value,
            id: id_value,
        };
        let recipients = self.recipients(&sender, link);
        debug!(
            target: "runtime.bus",
            sender = %sender_script_id,
            link,
            num,
            recipients = recipients.len(),
            "link message"
        );
        for script_id in recipients {
            self.deliver(&script_id, message.clone());
        }
    }

    /// Recipient selection for the six target modes. Recipients are
    /// always members of the sender's container. A mode may select the
    /// sender itself; a script can message itself.
    fn recipients(&self, sender: &Registration, link: i32) -> SmallVec<[ScriptId; 8]> {
        let Some(members) = self.containers.get(&sender.container_id) else {
            return SmallVec::new();
        };
        let mut out: SmallVec<[ScriptId; 8]> = SmallVec::new();
        for script_id in members {
            let Some(reg) = self.registrations.get(script_id) else {
                continue;
            };
            let selected = match link {
                LINK_SET => true,
                LINK_THIS => reg.link_number == sender.link_number,
                LINK_ALL_OTHERS => reg.link_number != sender.link_number,
                LINK_ALL_CHILDREN => reg.link_number > 1,
                n if n == 0 || n == 1 => {
                    // Link 1 addresses the root; registrations use 0 for
                    // the root slot, so both spellings match it.
                    reg.link_number == 0
                }
                n => reg.link_number == n,
            };
            if selected {
                out.push(script_id.clone());
            }
        }
        out
    }

    fn deliver(&mut self, script_id: &ScriptId, message: LinkMessage) {
        if let Some(handler) = &self.handler {
            handler(script_id, &message);
            return;
        }
        let queue = self.queues.entry(script_id.clone()).or_default();
        if queue.len() >= self.queue_bound {
            queue.pop_front();
            self.dropped_total += 1;
            warn!(
                target: "runtime.bus",
                script_id = %script_id,
                bound = self.queue_bound,
                "link queue overflow, oldest dropped"
            );
        }
        queue.push_back(message);
    }

    pub fn queue_len(&self, script_id: &ScriptId) -> usize {
        self.queues.get(script_id).map(VecDeque::len).unwrap_or(0)
    }

    pub fn queued(&self, script_id: &ScriptId) -> Vec<LinkMessage> {
        self.queues
            .get(script_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn bus_with(registrations: &[(&str, &str, i32)]) -> LinkMessageBus {
        let mut bus = LinkMessageBus::new(64);
        for (script, container, link) in registrations {
            bus.register(script.to_string(), container.to_string(), *link);
        }
        bus
    }

    #[test]
    fn link_set_broadcasts_to_whole_container() {
        // Five collar scripts all at link 0, OpenCollar style.
        let mut bus = bus_with(&[
            ("A", "collar", 0),
            ("B", "collar", 0),
            ("C", "collar", 0),
            ("D", "collar", 0),
            ("E", "collar", 0),
        ]);
        bus.send(
            &"A".to_string(),
            LINK_SET,
            500,
            "AUTH_REQUEST".into(),
            "uuid-agent".into(),
        );
        for script in ["A", "B", "C", "D", "E"] {
            let queued = bus.queued(&script.to_string());
            assert_eq!(queued.len(), 1, "{script} should hear the broadcast");
            assert_eq!(queued[0].sender_link, 0);
            assert_eq!(queued[0].num, 500);
            assert_eq!(queued[0].str, "AUTH_REQUEST");
            assert_eq!(queued[0].id, "uuid-agent");
        }
    }

    #[test]
    fn cross_container_delivery_is_impossible() {
        let mut bus = bus_with(&[("A", "collar", 0), ("X", "door", 0)]);
        bus.send(&"A".to_string(), LINK_SET, 1, "hello".into(), String::new());
        assert_eq!(bus.queue_len(&"A".to_string()), 1);
        assert_eq!(bus.queue_len(&"X".to_string()), 0);
    }

    #[test]
    fn link_all_children_excludes_root_and_link_one() {
        let mut bus = bus_with(&[
            ("root", "obj", 0),
            ("one", "obj", 1),
            ("two", "obj", 2),
            ("three", "obj", 3),
        ]);
        bus.send(
            &"root".to_string(),
            LINK_ALL_CHILDREN,
            1,
            String::new(),
            String::new(),
        );
        assert_eq!(bus.queue_len(&"root".to_string()), 0);
        assert_eq!(bus.queue_len(&"one".to_string()), 0);
        assert_eq!(bus.queue_len(&"two".to_string()), 1);
        assert_eq!(bus.queue_len(&"three".to_string()), 1);
    }

    #[test]
    fn link_all_others_never_hits_sender_link() {
        let mut bus = bus_with(&[
            ("a0", "obj", 0),
            ("b0", "obj", 0),
            ("c2", "obj", 2),
        ]);
        bus.send(
            &"a0".to_string(),
            LINK_ALL_OTHERS,
            7,
            String::new(),
            String::new(),
        );
        // Link 0 peers share the sender's link number and are excluded.
        assert_eq!(bus.queue_len(&"a0".to_string()), 0);
        assert_eq!(bus.queue_len(&"b0".to_string()), 0);
        assert_eq!(bus.queue_len(&"c2".to_string()), 1);
    }

    #[test]
    fn link_this_targets_same_link_including_sender() {
        let mut bus = bus_with(&[
            ("a0", "obj", 0),
            ("b0", "obj", 0),
            ("c2", "obj", 2),
        ]);
        bus.send(&"a0".to_string(), LINK_THIS, 7, String::new(), String::new());
        assert_eq!(bus.queue_len(&"a0".to_string()), 1);
        assert_eq!(bus.queue_len(&"b0".to_string()), 1);
        assert_eq!(bus.queue_len(&"c2".to_string()), 0);
    }

    #[test]
    fn numeric_link_targets_specific_slot() {
        let mut bus = bus_with(&[("a", "obj", 0), ("b", "obj", 2), ("c", "obj", 3)]);
        bus.send(&"a".to_string(), 2, 7, String::new(), String::new());
        assert_eq!(bus.queue_len(&"b".to_string()), 1);
        assert_eq!(bus.queue_len(&"c".to_string()), 0);
        // Root answers to both 0 and 1.
        bus.send(&"b".to_string(), 1, 7, String::new(), String::new());
        assert_eq!(bus.queue_len(&"a".to_string()), 1);
    }

    #[test]
    fn sender_link_comes_from_registration() {
        let mut bus = bus_with(&[("a", "obj", 3), ("b", "obj", 0)]);
        bus.send(&"a".to_string(), LINK_SET, 7, String::new(), String::new());
        assert_eq!(bus.queued(&"b".to_string())[0].sender_link, 3);
    }

    #[test]
    fn queue_bound_drops_oldest_preserving_fifo() {
        let mut bus = LinkMessageBus::new(64);
        bus.register("rx".into(), "obj".into(), 0);
        bus.register("tx".into(), "obj".into(), 2);
        for n in 0..70 {
            bus.send(&"tx".to_string(), 0, n, String::new(), String::new());
        }
        let queued = bus.queued(&"rx".to_string());
        assert_eq!(queued.len(), 64);
        // Oldest six dropped; the retained window stays in order.
        assert_eq!(queued[0].num, 6);
        assert_eq!(queued[63].num, 69);
        assert_eq!(bus.dropped_total(), 6);
    }

    #[test]
    fn unregistered_sender_is_silent_noop() {
        let mut bus = bus_with(&[("a", "obj", 0)]);
        bus.send(&"ghost".to_string(), LINK_SET, 1, String::new(), String::new());
        assert_eq!(bus.queue_len(&"a".to_string()), 0);
    }

    #[test]
    fn handler_installation_flushes_queued_messages_in_order() {
        let mut bus = bus_with(&[("a", "obj", 0), ("b", "obj", 2)]);
        for n in 0..3 {
            bus.send(&"a".to_string(), 2, n, String::new(), String::new());
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.set_delivery_handler(Box::new(move |script_id, msg| {
            sink.lock().unwrap().push((script_id.clone(), msg.num));
        }));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("b".to_string(), 0), ("b".to_string(), 1), ("b".to_string(), 2)]
        );
        // Later sends go straight through.
        bus.send(&"a".to_string(), 2, 9, String::new(), String::new());
        assert_eq!(seen.lock().unwrap().last(), Some(&("b".to_string(), 9)));
        assert_eq!(bus.queue_len(&"b".to_string()), 0);
    }

    #[test]
    fn remove_container_unregisters_members() {
        let mut bus = bus_with(&[("a", "obj", 0), ("b", "obj", 1), ("x", "other", 0)]);
        let mut removed = bus.remove_container(&"obj".to_string());
        removed.sort();
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        assert!(bus.registration(&"a".to_string()).is_none());
        assert!(bus.registration(&"x".to_string()).is_some());
    }
}
