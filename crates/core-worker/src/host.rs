//! Worker host: the slot pool, placement policy, and watchdog state.
//!
//! Placement is round-robin with fall-through to the least-loaded slot,
//! skipping slots at their script cap; when everything is full the load
//! is refused. Respawning a dead slot empties its script set and hands
//! the orphans back to the caller — they are never silently reassigned.

use crate::slot::{spawn_slot, SlotHandle};
use crate::SlotEnvelope;
use core_protocol::worker::HostToSlot;
use core_protocol::ScriptId;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("all {slots} worker slots are at capacity ({cap} scripts each)")]
    PoolFull { slots: usize, cap: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerHostConfig {
    pub pool_size: usize,
    pub max_scripts_per_slot: usize,
    pub watchdog_timeout: Duration,
}

impl Default for WorkerHostConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            max_scripts_per_slot: 50,
            watchdog_timeout: Duration::from_secs(10),
        }
    }
}

struct SlotRecord {
    handle: SlotHandle,
    scripts: HashSet<ScriptId>,
    last_pong: Instant,
    generation: u64,
    alive: bool,
}

pub struct WorkerHost {
    config: WorkerHostConfig,
    slots: Vec<SlotRecord>,
    next_rr: usize,
    next_generation: u64,
    outbound_tx: crossbeam_channel::Sender<SlotEnvelope>,
    outbound_rx: crossbeam_channel::Receiver<SlotEnvelope>,
}

impl WorkerHost {
    pub fn new(config: WorkerHostConfig) -> Self {
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
        let mut host = Self {
            config,
            slots: Vec::new(),
            next_rr: 0,
            next_generation: 0,
            outbound_tx,
            outbound_rx,
        };
        for index in 0..config.pool_size.max(1) {
            let record = host.fresh_slot(index);
            host.slots.push(record);
        }
        host
    }

    fn fresh_slot(&mut self, index: usize) -> SlotRecord {
        let generation = self.next_generation;
        self.next_generation += 1;
        SlotRecord {
            handle: spawn_slot(index, generation, self.outbound_tx.clone()),
            scripts: HashSet::new(),
            last_pong: Instant::now(),
            generation,
            alive: true,
        }
    }

    /// The single slot-outbound stream, for the bridge pump.
    pub fn receiver(&self) -> crossbeam_channel::Receiver<SlotEnvelope> {
        self.outbound_rx.clone()
    }

    /// Round-robin placement falling through to the least-loaded slot.
    fn place(&mut self, script_id: &ScriptId) -> Result<usize, PlacementError> {
        let n = self.slots.len();
        let cap = self.config.max_scripts_per_slot;
        let start = self.next_rr;
        let mut choice: Option<usize> = None;
        for offset in 0..n {
            let index = (start + offset) % n;
            let record = &self.slots[index];
            if !record.alive || record.scripts.len() >= cap {
                continue;
            }
            match choice {
                None => choice = Some(index),
                Some(best) if record.scripts.len() < self.slots[best].scripts.len() => {
                    choice = Some(index)
                }
                Some(_) => {}
            }
        }
        let Some(index) = choice else {
            warn!(target: "runtime.worker", script_id = %script_id, "placement refused, pool full");
            return Err(PlacementError::PoolFull {
                slots: n,
                cap,
            });
        };
        self.next_rr = (index + 1) % n;
        self.slots[index].scripts.insert(script_id.clone());
        debug!(
            target: "runtime.worker",
            script_id = %script_id,
            slot = index,
            load = self.slots[index].scripts.len(),
            "script placed"
        );
        Ok(index)
    }

    /// Place a script and ship its hardened program to the slot.
    pub fn load(
        &mut self,
        script_id: &ScriptId,
        code: String,
        max_loop_iterations: u64,
        max_call_depth: u32,
    ) -> Result<usize, PlacementError> {
        let index = self.place(script_id)?;
        let _ = self.slots[index].handle.sender.send(HostToSlot::Init {
            script_id: script_id.clone(),
            code,
            max_loop_iterations,
            max_call_depth,
        });
        Ok(index)
    }

    pub fn script_slot(&self, script_id: &ScriptId) -> Option<usize> {
        self.slots
            .iter()
            .position(|record| record.scripts.contains(script_id))
    }

    pub fn slot_load(&self, index: usize) -> usize {
        self.slots[index].scripts.len()
    }

    /// Forward an event to whichever slot hosts the script. Unknown
    /// scripts are dropped.
    pub fn send_event(
        &self,
        script_id: &ScriptId,
        event: String,
        args: Vec<serde_json::Value>,
        detected: Vec<core_protocol::DetectedInfo>,
    ) -> bool {
        let Some(index) = self.script_slot(script_id) else {
            return false;
        };
        self.slots[index]
            .handle
            .sender
            .send(HostToSlot::Event {
                script_id: script_id.clone(),
                event,
                args,
                detected,
            })
            .is_ok()
    }

    pub fn send_api_response(
        &self,
        script_id: &ScriptId,
        call_id: core_protocol::CallId,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        let Some(index) = self.script_slot(script_id) else {
            return false;
        };
        self.slots[index]
            .handle
            .sender
            .send(HostToSlot::ApiResponse {
                script_id: script_id.clone(),
                call_id,
                result,
                error,
            })
            .is_ok()
    }

    /// Terminate a script on its slot. Idempotent: unknown scripts are a
    /// no-op.
    pub fn terminate(&mut self, script_id: &ScriptId) {
        let Some(index) = self.script_slot(script_id) else {
            return;
        };
        let _ = self.slots[index].handle.sender.send(HostToSlot::Terminate {
            script_id: script_id.clone(),
        });
        self.slots[index].scripts.remove(script_id);
    }

    /// Record a pong; stale generations (from a replaced slot's thread)
    /// are ignored.
    pub fn note_pong(&mut self, slot: usize, generation: u64) {
        if let Some(record) = self.slots.get_mut(slot)
            && record.generation == generation
        {
            record.last_pong = Instant::now();
        }
    }

    /// Broadcast a watchdog ping to every live slot.
    pub fn ping_all(&self, timestamp: u64) {
        for record in &self.slots {
            if record.alive {
                let _ = record.handle.sender.send(HostToSlot::Ping { timestamp });
            }
        }
    }

    /// Kill and respawn every slot whose `last_pong` lags beyond the
    /// timeout. Returns the orphaned scripts; the caller transitions them
    /// to `error` — they are never reassigned here.
    pub fn check_watchdog(&mut self, now: Instant) -> Vec<ScriptId> {
        let timeout = self.config.watchdog_timeout;
        let mut orphans = Vec::new();
        for index in 0..self.slots.len() {
            let stale = {
                let record = &self.slots[index];
                record.alive
                    && now.saturating_duration_since(record.last_pong) > timeout
            };
            if !stale {
                continue;
            }
            {
                let old = &mut self.slots[index];
                old.alive = false;
                warn!(
                    target: "runtime.worker",
                    slot = index,
                    generation = old.generation,
                    scripts = old.scripts.len(),
                    "watchdog timeout, respawning slot"
                );
                orphans.extend(old.scripts.drain());
            }
            let fresh = self.fresh_slot(index);
            let old = std::mem::replace(&mut self.slots[index], fresh);
            // The wedged thread cannot be force-killed; dropping the
            // sender lets it exit once (if ever) it yields, and the loop
            // quota reaps runaway scripts inside it. Joining here would
            // block the host, so the thread is detached.
            drop(old.handle.sender);
            drop(old.handle.join);
        }
        if !orphans.is_empty() {
            info!(
                target: "runtime.worker",
                orphans = orphans.len(),
                "scripts orphaned by watchdog"
            );
        }
        orphans
    }

    /// Drop every slot channel; threads exit as their inboxes close.
    pub fn stop(&mut self) {
        for record in self.slots.drain(..) {
            drop(record.handle.sender);
            if let Some(join) = record.handle.join {
                let _ = join.join();
            }
        }
    }

    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for WorkerHost {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_host(pool: usize, cap: usize) -> WorkerHost {
        WorkerHost::new(WorkerHostConfig {
            pool_size: pool,
            max_scripts_per_slot: cap,
            watchdog_timeout: Duration::from_secs(10),
        })
    }

    fn place_only(host: &mut WorkerHost, id: &str) -> Result<usize, PlacementError> {
        host.place(&id.to_string())
    }

    #[test]
    fn round_robin_spreads_scripts() {
        let mut host = tiny_host(3, 50);
        let a = place_only(&mut host, "a").unwrap();
        let b = place_only(&mut host, "b").unwrap();
        let c = place_only(&mut host, "c").unwrap();
        let mut slots = vec![a, b, c];
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn full_slots_are_skipped_and_pool_exhaustion_refused() {
        let mut host = tiny_host(2, 1);
        place_only(&mut host, "a").unwrap();
        place_only(&mut host, "b").unwrap();
        assert_eq!(
            place_only(&mut host, "c"),
            Err(PlacementError::PoolFull { slots: 2, cap: 1 })
        );
        // Terminating frees capacity.
        host.terminate(&"a".to_string());
        assert!(place_only(&mut host, "c").is_ok());
    }

    #[test]
    fn each_script_lives_on_exactly_one_slot() {
        let mut host = tiny_host(3, 50);
        for i in 0..9 {
            place_only(&mut host, &format!("s{i}")).unwrap();
        }
        for i in 0..9 {
            let id = format!("s{i}");
            let hits = (0..host.pool_size())
                .filter(|&slot| {
                    host.slots[slot].scripts.contains(&id)
                })
                .count();
            assert_eq!(hits, 1, "{id} must live on exactly one slot");
        }
    }

    #[test]
    fn terminate_is_idempotent() {
        let mut host = tiny_host(1, 50);
        place_only(&mut host, "a").unwrap();
        host.terminate(&"a".to_string());
        host.terminate(&"a".to_string());
        assert!(host.script_slot(&"a".to_string()).is_none());
    }

    #[test]
    fn watchdog_orphans_scripts_and_respawns_slot() {
        let mut host = tiny_host(1, 50);
        place_only(&mut host, "a").unwrap();
        place_only(&mut host, "b").unwrap();
        let old_generation = host.slots[0].generation;
        let later = Instant::now() + Duration::from_secs(60);
        let mut orphans = host.check_watchdog(later);
        orphans.sort();
        assert_eq!(orphans, vec!["a".to_string(), "b".to_string()]);
        // Fresh slot: alive, empty, new generation, accepts placements.
        assert!(host.slots[0].alive);
        assert!(host.slots[0].scripts.is_empty());
        assert_ne!(host.slots[0].generation, old_generation);
        assert!(place_only(&mut host, "c").is_ok());
    }

    #[test]
    fn healthy_slots_survive_watchdog() {
        let mut host = tiny_host(2, 50);
        place_only(&mut host, "a").unwrap();
        assert!(host.check_watchdog(Instant::now()).is_empty());
        assert!(host.script_slot(&"a".to_string()).is_some());
    }

    #[test]
    fn stale_generation_pong_is_ignored() {
        let mut host = tiny_host(1, 50);
        let live_generation = host.slots[0].generation;
        host.note_pong(0, live_generation + 99);
        host.note_pong(0, live_generation); // the real one still lands
        assert!(host.slots[0].alive);
    }
}
