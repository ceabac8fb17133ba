//! Relic entrypoint: transpile, check, or run legacy scripts headlessly.
//!
//! The run mode wires a stdout host adapter: every command envelope a
//! script emits is printed, and a synthetic touch is injected after load
//! so event-driven scripts have something to react to. Query commands
//! answer with inert defaults — enough to watch a script breathe without
//! a 3D engine behind it.

use anyhow::{Context, Result};
use clap::Parser;
use core_config::EngineConfig;
use core_protocol::{AgentRef, ScriptCommand, WorldEvent, WorldEventEnvelope};
use core_runtime::{HostReply, LoadOptions, ScriptHost};
use core_transpile::{transpile, TranspileOptions};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "relic", version, about = "Legacy virtual-world script engine")]
struct Args {
    /// Script source file to load (UTF-8 legacy script text).
    pub script: Option<PathBuf>,
    /// Load a bundle directory (expects manifest.json inside).
    #[arg(long)]
    pub bundle: Option<PathBuf>,
    /// Transpile only and print diagnostics.
    #[arg(long)]
    pub check: bool,
    /// Print the canonical intermediate after transpile + hardening.
    #[arg(long = "emit-ir")]
    pub emit_ir: bool,
    /// Optional configuration file path (overrides discovery of
    /// `relic.toml`).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// How long the run mode stays alive, in seconds.
    #[arg(long, default_value_t = 5)]
    pub duration: u64,
}

fn configure_logging() -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "relic.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging()?;
    info!(target: "runtime", "startup");

    if let Some(script) = &args.script
        && (args.check || args.emit_ir)
    {
        return check_script(script, args.emit_ir);
    }

    let config = core_config::load_from(args.config.clone())?;
    match (&args.script, &args.bundle) {
        (Some(script), None) => run_script(script, config, args.duration),
        (None, Some(dir)) => run_bundle(dir, config, args.duration),
        (Some(_), Some(_)) => anyhow::bail!("pass either a script or --bundle, not both"),
        (None, None) => anyhow::bail!("nothing to do: pass a script file or --bundle DIR"),
    }
}

fn check_script(path: &Path, emit_ir: bool) -> Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let output = transpile(
        &source,
        &TranspileOptions {
            file: file_name,
            class_name: None,
            mode: core_syntax::parser::ParseMode::Collect,
        },
    )?;
    for diagnostic in &output.diagnostics {
        eprintln!("{diagnostic}");
    }
    if output.has_errors() {
        anyhow::bail!("{} failed to transpile", path.display());
    }
    if emit_ir {
        let hardened = core_sandbox::transform(&output.program.to_canonical())?;
        let pretty: serde_json::Value = serde_json::from_str(&hardened.text)?;
        println!("{}", serde_json::to_string_pretty(&pretty)?);
    } else {
        println!(
            "{}: ok ({} warnings)",
            path.display(),
            output.diagnostics.len()
        );
    }
    Ok(())
}

/// Stdout host adapter: print every envelope, answer queries with inert
/// defaults.
fn attach_stdout_host(host: &ScriptHost) {
    host.on_script_command(|envelope| {
        println!(
            "[{}@{}] #{} {}",
            envelope.script_id,
            envelope.container_id,
            envelope.call_id,
            serde_json::to_string(&envelope.command).unwrap_or_else(|_| "<unprintable>".into())
        );
        let reply = match &envelope.command {
            ScriptCommand::GetPosition | ScriptCommand::GetLocalPosition => {
                json!({"x": 128.0, "y": 128.0, "z": 25.0})
            }
            ScriptCommand::GetRotation | ScriptCommand::GetLocalRotation => {
                json!({"x": 0.0, "y": 0.0, "z": 0.0, "s": 1.0})
            }
            ScriptCommand::GetScale => json!({"x": 1.0, "y": 1.0, "z": 1.0}),
            ScriptCommand::GetVelocity => json!({"x": 0.0, "y": 0.0, "z": 0.0}),
            ScriptCommand::GetOwner | ScriptCommand::GetKey | ScriptCommand::GetCreator => {
                json!("00000000-0000-0000-0000-000000000001")
            }
            ScriptCommand::GetName => json!("relic-object"),
            ScriptCommand::GetDescription => json!(""),
            ScriptCommand::GetRegionName => json!("Sandbox"),
            ScriptCommand::GetLinkNumber | ScriptCommand::GetAttachPoint => json!(0),
            ScriptCommand::GetPrimCount => json!(1),
            _ => serde_json::Value::Null,
        };
        HostReply::Value(reply)
    });
    host.manager().set_log_handler(Arc::new(|script_id, level, message| {
        println!("[{script_id}] {level:?}: {message}");
    }));
    host.manager()
        .set_error_handler(Arc::new(|script_id, message, code| {
            eprintln!(
                "[{script_id}] error{}: {message}",
                code.map(|c| format!(" ({c})")).unwrap_or_default()
            );
        }));
}

fn synthetic_touch(host: &ScriptHost, container: &str) {
    host.dispatch_world_event(WorldEventEnvelope {
        target_object_id: container.to_string(),
        target_script_id: None,
        event: WorldEvent::TouchStart {
            agent: AgentRef {
                id: "00000000-0000-0000-0000-0000000000a1".into(),
                name: "Console Agent".into(),
            },
            face: 0,
        },
    });
}

fn run_script(path: &Path, config: EngineConfig, duration: u64) -> Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut host = ScriptHost::new(config);
    attach_stdout_host(&host);
    let result = host.load_script(
        &source,
        LoadOptions {
            container_id: "console".into(),
            link_number: 0,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            overrides: Default::default(),
        },
    );
    for diagnostic in &result.diagnostics {
        eprintln!("{diagnostic}");
    }
    let Some(script_id) = result.script_id else {
        anyhow::bail!("{} failed to load", path.display());
    };
    info!(target: "runtime", script_id = %script_id, "script loaded");
    std::thread::sleep(Duration::from_millis(300));
    synthetic_touch(&host, "console");
    std::thread::sleep(Duration::from_secs(duration));
    host.stop();
    Ok(())
}

fn run_bundle(dir: &Path, config: EngineConfig, duration: u64) -> Result<()> {
    let manifest_path = dir.join("manifest.json");
    let manifest = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("reading {}", manifest_path.display()))?;
    let parsed: core_protocol::bundle::BundleManifest = serde_json::from_str(&manifest)?;
    let mut sources = HashMap::new();
    for entry in parsed.assets.values() {
        if entry.asset_type.eq_ignore_ascii_case("script") {
            let path = dir.join(&entry.path);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            sources.insert(entry.path.clone(), text);
        }
    }
    let mut host = ScriptHost::new(config);
    attach_stdout_host(&host);
    let report = host.load_bundle(&manifest, &sources)?;
    for diagnostic in &report.diagnostics {
        eprintln!("{diagnostic}");
    }
    println!("loaded {} script(s)", report.loaded.len());
    std::thread::sleep(Duration::from_millis(300));
    for (container, _) in &report.loaded {
        synthetic_touch(&host, container);
    }
    std::thread::sleep(Duration::from_secs(duration));
    host.stop();
    Ok(())
}
