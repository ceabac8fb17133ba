//! Engine configuration loading and parsing.
//!
//! `relic.toml` is discovered in the working directory first, then the
//! platform config dir. Unknown fields are ignored so the file can evolve
//! without breaking older binaries; a parse error falls back to defaults
//! rather than refusing to start. Every knob has a serde default matching
//! the documented engine defaults.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of isolated execution slots.
    pub pool_size: usize,
    /// Per-slot script cap; placement refuses beyond it.
    pub max_scripts_per_slot: usize,
    /// Watchdog timeout; pings go out at half this period.
    pub watchdog_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            max_scripts_per_slot: 50,
            watchdog_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Loop iteration bound per single execution.
    pub max_loop_iterations: u64,
    pub max_call_depth: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1_000_000,
            max_call_depth: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Per-recipient link-message queue bound; overflow drops the oldest.
    pub queue_bound: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { queue_bound: 64 }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimerConfig {
    /// Tick loop period. Coarser than 16 ms is acceptable.
    pub tick_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { tick_ms: 50 }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub workers: WorkerConfig,
    pub sandbox: SandboxConfig,
    pub bus: BusConfig,
    pub timers: TimerConfig,
}

/// Per-script overrides accepted by `load_script`.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ScriptOverrides {
    pub max_loop_iterations: Option<u64>,
    pub max_call_depth: Option<u32>,
}

impl EngineConfig {
    /// Effective quota pair for one script.
    pub fn limits_with(&self, overrides: &ScriptOverrides) -> (u64, u32) {
        (
            overrides
                .max_loop_iterations
                .unwrap_or(self.sandbox.max_loop_iterations),
            overrides
                .max_call_depth
                .unwrap_or(self.sandbox.max_call_depth),
        )
    }
}

/// Best-effort config path following platform conventions: working
/// directory first, then the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("relic.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("relic").join("relic.toml");
    }
    PathBuf::from("relic.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<EngineConfig> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(EngineConfig::default());
    };
    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => {
            info!(
                target: "config",
                path = %path.display(),
                pool_size = config.workers.pool_size,
                queue_bound = config.bus.queue_bound,
                "config loaded"
            );
            Ok(config)
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config parse failed, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.workers.pool_size, 4);
        assert_eq!(c.workers.max_scripts_per_slot, 50);
        assert_eq!(c.workers.watchdog_timeout_ms, 10_000);
        assert_eq!(c.sandbox.max_loop_iterations, 1_000_000);
        assert_eq!(c.sandbox.max_call_depth, 256);
        assert_eq!(c.bus.queue_bound, 64);
        assert_eq!(c.timers.tick_ms, 50);
    }

    #[test]
    fn loads_partial_file_with_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[workers]
pool_size = 2
future_knob = "ignored"

[bus]
queue_bound = 16
"#
        )
        .unwrap();
        let config = load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.workers.pool_size, 2);
        assert_eq!(config.workers.max_scripts_per_slot, 50);
        assert_eq!(config.bus.queue_bound, 16);
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not [valid toml").unwrap();
        let config = load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_from(Some(PathBuf::from("/nonexistent/relic.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn script_overrides_apply() {
        let config = EngineConfig::default();
        let overrides = ScriptOverrides {
            max_loop_iterations: Some(1000),
            max_call_depth: None,
        };
        assert_eq!(config.limits_with(&overrides), (1000, 256));
        assert_eq!(
            config.limits_with(&ScriptOverrides::default()),
            (1_000_000, 256)
        );
    }
}
