//! Multi-timer manager.
//!
//! Pure bookkeeping, decoupled from wall-clock scheduling: the runtime's
//! tick loop calls [`TimerManager::due`] with its own notion of `now` and
//! dispatches the returned fires. Timers due at the same tick fire in
//! enqueue order. Multiple timers per script are keyed by timer id; the
//! legacy single-timer shape is the "default" id. Setting an interval of
//! zero (or negative) clears; clearing an unknown id is a no-op.

use core_protocol::ScriptId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub const DEFAULT_TIMER_ID: &str = "default";

/// Opaque handle returned by `set`. Cancelling is equivalent to clearing
/// the timer by id.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    pub script_id: ScriptId,
    pub timer_id: String,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct TimerEntry {
    script_id: ScriptId,
    timer_id: String,
    interval: Duration,
    repeating: bool,
    next_fire: Instant,
    cancelled: Arc<AtomicBool>,
}

/// One timer firing, to be translated into a timer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFire {
    pub script_id: ScriptId,
    pub timer_id: String,
}

#[derive(Debug, Default)]
pub struct TimerManager {
    /// Enqueue order is the fire order for simultaneous deadlines.
    entries: Vec<TimerEntry>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) a timer. `interval_secs <= 0` clears instead,
    /// preserving the legacy "zero means off" shape; the returned handle
    /// is then already cancelled.
    pub fn set(
        &mut self,
        script_id: ScriptId,
        timer_id: Option<String>,
        interval_secs: f64,
        repeating: bool,
        now: Instant,
    ) -> TimerHandle {
        let timer_id = timer_id.unwrap_or_else(|| DEFAULT_TIMER_ID.to_string());
        if interval_secs <= 0.0 {
            self.clear(&script_id, Some(&timer_id));
            return TimerHandle {
                script_id,
                timer_id,
                cancelled: Arc::new(AtomicBool::new(true)),
            };
        }
        self.clear(&script_id, Some(&timer_id));
        let interval = Duration::from_secs_f64(interval_secs);
        let cancelled = Arc::new(AtomicBool::new(false));
        debug!(
            target: "runtime.timer",
            script_id = %script_id,
            timer_id = %timer_id,
            interval_ms = interval.as_millis() as u64,
            repeating,
            "timer armed"
        );
        self.entries.push(TimerEntry {
            script_id: script_id.clone(),
            timer_id: timer_id.clone(),
            interval,
            repeating,
            next_fire: now + interval,
            cancelled: cancelled.clone(),
        });
        TimerHandle {
            script_id,
            timer_id,
            cancelled,
        }
    }

    /// Clear one timer (`None` means the default id). Unknown ids are a
    /// no-op.
    pub fn clear(&mut self, script_id: &ScriptId, timer_id: Option<&str>) {
        let timer_id = timer_id.unwrap_or(DEFAULT_TIMER_ID);
        self.entries
            .retain(|e| !(e.script_id == *script_id && e.timer_id == timer_id));
    }

    /// Drop every timer of a script (termination cleanup).
    pub fn clear_script(&mut self, script_id: &ScriptId) {
        self.entries.retain(|e| e.script_id != *script_id);
    }

    pub fn pending(&self, script_id: &ScriptId) -> usize {
        self.entries
            .iter()
            .filter(|e| e.script_id == *script_id && !e.cancelled.load(Ordering::SeqCst))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect every fire due at `now`, advancing repeating entries and
    /// removing one-shot and cancelled ones.
    pub fn due(&mut self, now: Instant) -> Vec<TimerFire> {
        let mut fires = Vec::new();
        self.entries.retain_mut(|entry| {
            if entry.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            if entry.next_fire > now {
                return true;
            }
            trace!(
                target: "runtime.timer",
                script_id = %entry.script_id,
                timer_id = %entry.timer_id,
                "timer fired"
            );
            fires.push(TimerFire {
                script_id: entry.script_id.clone(),
                timer_id: entry.timer_id.clone(),
            });
            if !entry.repeating {
                return false;
            }
            // Advance past `now` so a stalled tick loop does not replay
            // missed intervals as a burst.
            while entry.next_fire <= now {
                entry.next_fire += entry.interval;
            }
            true
        });
        fires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fire_ids(fires: &[TimerFire]) -> Vec<(String, String)> {
        fires
            .iter()
            .map(|f| (f.script_id.clone(), f.timer_id.clone()))
            .collect()
    }

    #[test]
    fn repeating_timer_fires_and_rearms() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("s1".into(), None, 1.0, true, t0);
        assert!(tm.due(t0 + Duration::from_millis(500)).is_empty());
        let fires = tm.due(t0 + Duration::from_millis(1100));
        assert_eq!(fire_ids(&fires), vec![("s1".into(), "default".into())]);
        // Re-armed for the next interval.
        assert!(tm.due(t0 + Duration::from_millis(1500)).is_empty());
        assert_eq!(tm.due(t0 + Duration::from_millis(2200)).len(), 1);
    }

    #[test]
    fn one_shot_timer_removes_itself() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("s1".into(), Some("once".into()), 0.5, false, t0);
        assert_eq!(tm.due(t0 + Duration::from_secs(1)).len(), 1);
        assert!(tm.is_empty());
    }

    #[test]
    fn simultaneous_fires_follow_enqueue_order() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("b".into(), Some("second".into()), 1.0, true, t0);
        tm.set("a".into(), Some("first".into()), 1.0, true, t0);
        let fires = tm.due(t0 + Duration::from_secs(2));
        assert_eq!(
            fire_ids(&fires),
            vec![
                ("b".into(), "second".into()),
                ("a".into(), "first".into())
            ]
        );
    }

    #[test]
    fn zero_interval_clears() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("s1".into(), None, 1.0, true, t0);
        let handle = tm.set("s1".into(), None, 0.0, true, t0);
        assert!(handle.is_cancelled());
        assert!(tm.is_empty());
        // Clearing an unknown id is a no-op.
        tm.clear(&"s1".to_string(), Some("ghost"));
    }

    #[test]
    fn rearming_replaces_existing_entry() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("s1".into(), None, 10.0, true, t0);
        tm.set("s1".into(), None, 0.5, true, t0);
        assert_eq!(tm.pending(&"s1".to_string()), 1);
        assert_eq!(tm.due(t0 + Duration::from_secs(1)).len(), 1);
    }

    #[test]
    fn multiple_timers_per_script() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("s1".into(), Some("blink".into()), 0.25, true, t0);
        tm.set("s1".into(), Some("poll".into()), 0.5, true, t0);
        assert_eq!(tm.pending(&"s1".to_string()), 2);
        let fires = tm.due(t0 + Duration::from_millis(300));
        assert_eq!(fire_ids(&fires), vec![("s1".into(), "blink".into())]);
    }

    #[test]
    fn handle_cancel_removes_on_next_tick() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        let handle = tm.set("s1".into(), Some("x".into()), 0.1, true, t0);
        handle.cancel();
        assert!(tm.due(t0 + Duration::from_secs(1)).is_empty());
        assert!(tm.is_empty());
    }

    #[test]
    fn stalled_loop_does_not_burst() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("s1".into(), None, 0.1, true, t0);
        // One very late tick: a single fire, re-armed in the future.
        assert_eq!(tm.due(t0 + Duration::from_secs(10)).len(), 1);
        assert!(tm.due(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn clear_script_drops_all_timers() {
        let mut tm = TimerManager::new();
        let t0 = Instant::now();
        tm.set("s1".into(), Some("a".into()), 1.0, true, t0);
        tm.set("s1".into(), Some("b".into()), 1.0, true, t0);
        tm.set("s2".into(), Some("c".into()), 1.0, true, t0);
        tm.clear_script(&"s1".to_string());
        assert_eq!(tm.pending(&"s1".to_string()), 0);
        assert_eq!(tm.pending(&"s2".to_string()), 1);
    }
}
