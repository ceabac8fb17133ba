//! Script manager: the orchestrator tying transpiler, sandbox, workers,
//! bus, timers, and dispatcher into one loadable runtime.
//!
//! All singletons live behind one mutex. Handlers installed by the host
//! (api resolver, log sink, error sink) are always invoked *outside* that
//! lock so they may call back into the manager. Built-in api methods —
//! timer set/clear/one-shot, listen register/remove/control, link message
//! send, log, script reset — are intercepted here; the host never sees
//! them.

use crate::dispatcher::{self, Dispatcher};
use crate::router::HostReply;
use core_bus::LinkMessageBus;
use core_config::{EngineConfig, ScriptOverrides};
use core_protocol::worker::LogLevel;
use core_protocol::{
    ContainerId, ScriptId, ScriptState, WorldEvent, WorldEventEnvelope,
};
use core_syntax::diagnostics::Diagnostic;
use core_timers::TimerManager;
use core_transpile::{transpile, TranspileOptions};
use core_worker::{spawn_pump, BridgeHandlers, WorkerHost, WorkerHostConfig};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Host callback for api methods that are not manager built-ins.
pub type ApiResolver =
    Arc<dyn Fn(&ScriptId, &str, &[Json]) -> Result<HostReply, String> + Send + Sync>;
pub type LogHandler = Arc<dyn Fn(&ScriptId, LogLevel, &str) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ScriptId, &str, Option<&str>) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub container_id: ContainerId,
    pub link_number: i32,
    pub name: Option<String>,
    pub overrides: ScriptOverrides,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub script_id: Option<ScriptId>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub struct ScriptRecord {
    pub container_id: ContainerId,
    pub link_number: i32,
    pub name: String,
    pub state: ScriptState,
    /// Slot index, or -1 after a watchdog orphaned the script.
    pub slot: i64,
    source: String,
    overrides: ScriptOverrides,
}

pub(crate) struct Inner {
    config: EngineConfig,
    scripts: HashMap<ScriptId, ScriptRecord>,
    bus: LinkMessageBus,
    timers: TimerManager,
    host: Option<WorkerHost>,
    dispatcher: Dispatcher,
    resolver: Option<ApiResolver>,
    log_handler: Option<LogHandler>,
    error_handler: Option<ErrorHandler>,
    next_script: u64,
}

pub struct ScriptManager {
    inner: Arc<Mutex<Inner>>,
    runtime: Option<tokio::runtime::Runtime>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    started: bool,
}

impl ScriptManager {
    pub fn new(config: EngineConfig) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("relic-runtime")
            .enable_time()
            .build()
            .expect("manager runtime build");
        let inner = Inner {
            bus: LinkMessageBus::new(config.bus.queue_bound),
            timers: TimerManager::new(),
            host: None,
            dispatcher: Dispatcher::new(),
            scripts: HashMap::new(),
            resolver: None,
            log_handler: None,
            error_handler: None,
            next_script: 1,
            config,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            runtime: Some(runtime),
            tasks: Vec::new(),
            started: false,
        }
    }

    fn handle(&self) -> Handle {
        self.runtime
            .as_ref()
            .expect("manager runtime present")
            .handle()
            .clone()
    }

    /// Spawn workers, wire the bridge, start the timer and watchdog
    /// loops.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let handle = self.handle();
        let (tick_ms, watchdog_timeout, receiver) = {
            let mut g = self.inner.lock().expect("manager lock");
            let host = WorkerHost::new(WorkerHostConfig {
                pool_size: g.config.workers.pool_size,
                max_scripts_per_slot: g.config.workers.max_scripts_per_slot,
                watchdog_timeout: Duration::from_millis(g.config.workers.watchdog_timeout_ms),
            });
            let receiver = host.receiver();
            g.host = Some(host);
            (
                g.config.timers.tick_ms,
                Duration::from_millis(g.config.workers.watchdog_timeout_ms),
                receiver,
            )
        };

        spawn_pump(receiver, self.bridge_handlers(handle.clone()));
        self.install_link_delivery(&handle);

        // Timer tick loop.
        let inner = self.inner.clone();
        self.tasks.push(handle.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
            loop {
                interval.tick().await;
                let fires = {
                    let mut g = inner.lock().expect("manager lock");
                    g.timers.due(Instant::now())
                };
                let g = inner.lock().expect("manager lock");
                for fire in fires {
                    let running = g
                        .scripts
                        .get(&fire.script_id)
                        .is_some_and(|r| r.state == ScriptState::Running);
                    if !running {
                        continue;
                    }
                    if let Some(host) = &g.host {
                        host.send_event(
                            &fire.script_id,
                            "onTimer".to_string(),
                            vec![json!(fire.timer_id)],
                            vec![],
                        );
                    }
                }
            }
        }));

        // Watchdog loop: ping at half the timeout, respawn stale slots,
        // orphan their scripts to `error`.
        let inner = self.inner.clone();
        self.tasks.push(handle.spawn(async move {
            let mut interval = tokio::time::interval(watchdog_timeout / 2);
            loop {
                interval.tick().await;
                let (orphans, error_handler) = {
                    let mut g = inner.lock().expect("manager lock");
                    let Some(host) = &mut g.host else { continue };
                    let timestamp = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64;
                    host.ping_all(timestamp);
                    let orphans = host.check_watchdog(Instant::now());
                    for script_id in &orphans {
                        if let Some(record) = g.scripts.get_mut(script_id) {
                            record.state = ScriptState::Error;
                            record.slot = -1;
                        }
                        g.timers.clear_script(script_id);
                        g.dispatcher.remove_script(script_id);
                    }
                    (orphans, g.error_handler.clone())
                };
                if let Some(sink) = error_handler {
                    for script_id in &orphans {
                        sink(script_id, "worker watchdog timeout", Some("watchdog"));
                    }
                }
            }
        }));
        info!(target: "runtime.manager", "manager started");
    }

    /// Terminate workers, stop loops, drop all registrations.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let mut g = self.inner.lock().expect("manager lock");
        if let Some(mut host) = g.host.take() {
            host.stop();
        }
        let ids: Vec<ScriptId> = g.scripts.keys().cloned().collect();
        for id in ids {
            g.bus.unregister(&id);
            g.timers.clear_script(&id);
            g.dispatcher.remove_script(&id);
            if let Some(record) = g.scripts.get_mut(&id) {
                record.state = ScriptState::Terminated;
            }
        }
        info!(target: "runtime.manager", "manager stopped");
    }

    pub fn set_api_resolver(&self, resolver: ApiResolver) {
        self.inner.lock().expect("manager lock").resolver = Some(resolver);
    }

    pub fn set_log_handler(&self, handler: LogHandler) {
        self.inner.lock().expect("manager lock").log_handler = Some(handler);
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.inner.lock().expect("manager lock").error_handler = Some(handler);
    }

    /// Transform, register, and place one script. `None` script id means
    /// the load failed; the diagnostics say why and any partial
    /// registration has been released.
    pub fn load_script(&self, source: &str, options: LoadOptions) -> LoadResult {
        let mut g = self.inner.lock().expect("manager lock");
        load_locked(&mut g, source, options)
    }

    pub fn terminate_script(&self, script_id: &ScriptId) {
        let mut g = self.inner.lock().expect("manager lock");
        terminate_locked(&mut g, script_id);
    }

    /// Re-run the retained source as a fresh script instance inheriting
    /// container and link number. Returns the replacement id.
    pub fn reset_script(&self, script_id: &ScriptId) -> Option<ScriptId> {
        let mut g = self.inner.lock().expect("manager lock");
        reset_locked(&mut g, script_id)
    }

    /// Suspend event delivery to a running script. Identity is stable
    /// across pause/resume; timers keep ticking but fires are dropped
    /// while paused.
    pub fn pause_script(&self, script_id: &ScriptId) {
        let mut g = self.inner.lock().expect("manager lock");
        if let Some(record) = g.scripts.get_mut(script_id)
            && record.state == ScriptState::Running
        {
            record.state = ScriptState::Paused;
        }
    }

    pub fn resume_script(&self, script_id: &ScriptId) {
        let mut g = self.inner.lock().expect("manager lock");
        if let Some(record) = g.scripts.get_mut(script_id)
            && record.state == ScriptState::Paused
        {
            record.state = ScriptState::Running;
        }
    }

    pub fn script_status(&self, script_id: &ScriptId) -> Option<ScriptState> {
        self.inner
            .lock()
            .expect("manager lock")
            .scripts
            .get(script_id)
            .map(|r| r.state)
    }

    pub fn script_record(&self, script_id: &ScriptId) -> Option<ScriptRecord> {
        self.inner
            .lock()
            .expect("manager lock")
            .scripts
            .get(script_id)
            .cloned()
    }

    pub fn container_of(&self, script_id: &ScriptId) -> Option<ContainerId> {
        self.inner
            .lock()
            .expect("manager lock")
            .scripts
            .get(script_id)
            .map(|r| r.container_id.clone())
    }

    pub fn scripts_in(&self, container_id: &ContainerId) -> Vec<ScriptId> {
        self.inner
            .lock()
            .expect("manager lock")
            .bus
            .container_scripts(container_id)
    }

    /// Terminate every script of a container (the host removed the
    /// object).
    pub fn remove_container(&self, container_id: &ContainerId) -> Vec<ScriptId> {
        let mut g = self.inner.lock().expect("manager lock");
        let members = g.bus.container_scripts(container_id);
        for script_id in &members {
            terminate_locked(&mut g, script_id);
        }
        members
    }

    /// Container lookup closure for the command router.
    pub fn container_lookup(&self) -> Arc<dyn Fn(&ScriptId) -> Option<ContainerId> + Send + Sync> {
        let inner = self.inner.clone();
        Arc::new(move |script_id| {
            inner
                .lock()
                .expect("manager lock")
                .scripts
                .get(script_id)
                .map(|r| r.container_id.clone())
        })
    }

    /// Inject a world event. Broadcast vs. single-script dispatch follows
    /// the envelope shape.
    pub fn dispatch_world_event(&self, envelope: WorldEventEnvelope) {
        let mut guard = self.inner.lock().expect("manager lock");
        let g = &mut *guard;
        let plan = dispatcher::plan(&envelope.event);
        let targets: Vec<ScriptId> = match &envelope.target_script_id {
            Some(script_id) => vec![script_id.clone()],
            None => g.bus.container_scripts(&envelope.target_object_id),
        };
        debug!(
            target: "runtime.dispatch",
            container = %envelope.target_object_id,
            event = envelope.event.type_name(),
            targets = targets.len(),
            "world event"
        );
        for script_id in targets {
            let Some(record) = g.scripts.get(&script_id) else {
                continue;
            };
            if record.state != ScriptState::Running {
                continue;
            }
            if let WorldEvent::Listen {
                channel,
                name,
                id,
                message,
            } = &envelope.event
                && !g.dispatcher.hears(&script_id, *channel, name, id, message)
            {
                continue;
            }
            if let WorldEvent::RunTimePermissions { permissions } = &envelope.event {
                let (_, agent) = g.dispatcher.permissions(&script_id);
                g.dispatcher
                    .grant_permissions(&script_id, *permissions, agent);
            }
            // Sensor results for a script with no outstanding request are
            // dropped; a one-shot request ends on its first result.
            if matches!(&envelope.event, WorldEvent::Sensor { .. } | WorldEvent::NoSensor) {
                if !g.dispatcher.has_active_sensor(&script_id) {
                    continue;
                }
                g.dispatcher.sensor_fired(&script_id);
            }
            if let Some(host) = &g.host {
                host.send_event(
                    &script_id,
                    plan.handler.to_string(),
                    plan.args.clone(),
                    plan.detected.clone(),
                );
            }
        }
    }

    // -----------------------------------------------------------------
    // Bridge wiring
    // -----------------------------------------------------------------

    fn bridge_handlers(&self, handle: Handle) -> BridgeHandlers {
        let inner = self.inner.clone();
        let on_api_call = {
            let handle = handle.clone();
            let inner = inner.clone();
            Box::new(move |script_id: ScriptId, call_id, method: String, args: Vec<Json>| {
                handle_api_call(&inner, &handle, script_id, call_id, method, args);
            })
        };
        let on_ready = {
            let inner = inner.clone();
            Box::new(move |script_id: ScriptId| {
                let mut g = inner.lock().expect("manager lock");
                if let Some(record) = g.scripts.get_mut(&script_id)
                    && record.state == ScriptState::Loading
                {
                    record.state = ScriptState::Running;
                    debug!(target: "runtime.manager", script_id = %script_id, "script running");
                }
            })
        };
        let on_error = {
            let inner = inner.clone();
            Box::new(move |script_id: ScriptId, message: String, code: Option<String>| {
                let sink = {
                    let mut g = inner.lock().expect("manager lock");
                    if let Some(record) = g.scripts.get_mut(&script_id) {
                        record.state = ScriptState::Error;
                    }
                    g.timers.clear_script(&script_id);
                    g.error_handler.clone()
                };
                if let Some(sink) = sink {
                    sink(&script_id, &message, code.as_deref());
                }
            })
        };
        let on_log = {
            let inner = inner.clone();
            Box::new(move |script_id: ScriptId, level, message: String| {
                let sink = inner.lock().expect("manager lock").log_handler.clone();
                if let Some(sink) = sink {
                    sink(&script_id, level, &message);
                }
            })
        };
        let on_pong = {
            let inner = inner.clone();
            Box::new(move |slot: usize, generation: u64, _timestamp: u64| {
                let mut g = inner.lock().expect("manager lock");
                if let Some(host) = &mut g.host {
                    host.note_pong(slot, generation);
                }
            })
        };
        BridgeHandlers {
            on_api_call,
            on_ready,
            on_error,
            on_log,
            on_pong,
        }
    }

    /// Link messages flow through a channel so bus delivery (which runs
    /// under the manager lock) never re-enters the lock to reach the
    /// workers.
    fn install_link_delivery(&mut self, handle: &Handle) {
        let (tx, mut rx) =
            tokio::sync::mpsc::unbounded_channel::<(ScriptId, core_protocol::LinkMessage)>();
        {
            let mut g = self.inner.lock().expect("manager lock");
            g.bus.set_delivery_handler(Box::new(move |script_id, message| {
                let _ = tx.send((script_id.clone(), message.clone()));
            }));
        }
        let inner = self.inner.clone();
        self.tasks.push(handle.spawn(async move {
            while let Some((script_id, message)) = rx.recv().await {
                let g = inner.lock().expect("manager lock");
                let running = g
                    .scripts
                    .get(&script_id)
                    .is_some_and(|r| r.state == ScriptState::Running);
                if !running {
                    continue;
                }
                if let Some(host) = &g.host {
                    host.send_event(
                        &script_id,
                        "onLinkMessage".to_string(),
                        vec![
                            json!(message.sender_link),
                            json!(message.num),
                            json!(message.str),
                            json!(message.id),
                        ],
                        vec![],
                    );
                }
            }
        }));
    }
}

impl Drop for ScriptManager {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            // Works from both sync and async contexts.
            runtime.shutdown_background();
        }
    }
}

// ---------------------------------------------------------------------
// Lock-held operations (shared between public methods and bridge
// callbacks)
// ---------------------------------------------------------------------

fn allocate_script_id(g: &mut Inner) -> ScriptId {
    let id = format!("script-{}", g.next_script);
    g.next_script += 1;
    id
}

fn load_locked(g: &mut Inner, source: &str, options: LoadOptions) -> LoadResult {
    let transpiled = match transpile(
        source,
        &TranspileOptions {
            file: options.name.clone(),
            class_name: None,
            mode: core_syntax::parser::ParseMode::Collect,
        },
    ) {
        Ok(out) => out,
        Err(e) => {
            return LoadResult {
                script_id: None,
                diagnostics: vec![Diagnostic::error(e.to_string())],
            };
        }
    };
    let mut diagnostics = transpiled.diagnostics.clone();
    if transpiled.has_errors() {
        return LoadResult {
            script_id: None,
            diagnostics,
        };
    }
    let hardened = match core_sandbox::transform(&transpiled.program.to_canonical()) {
        Ok(output) => output,
        Err(e) => {
            diagnostics.push(Diagnostic::error(e.to_string()));
            return LoadResult {
                script_id: None,
                diagnostics,
            };
        }
    };
    diagnostics.extend(hardened.warnings.iter().cloned());

    let script_id = allocate_script_id(g);
    g.bus.register(
        script_id.clone(),
        options.container_id.clone(),
        options.link_number,
    );
    let (max_loops, max_depth) = g.config.limits_with(&options.overrides);
    let Some(host) = &mut g.host else {
        g.bus.unregister(&script_id);
        diagnostics.push(Diagnostic::error("manager is not started"));
        return LoadResult {
            script_id: None,
            diagnostics,
        };
    };
    let slot = match host.load(&script_id, hardened.text, max_loops, max_depth) {
        Ok(slot) => slot,
        Err(e) => {
            g.bus.unregister(&script_id);
            diagnostics.push(Diagnostic::error(e.to_string()));
            return LoadResult {
                script_id: None,
                diagnostics,
            };
        }
    };
    let name = options
        .name
        .unwrap_or_else(|| transpiled.program.class_name.clone());
    info!(
        target: "runtime.manager",
        script_id = %script_id,
        container = %options.container_id,
        link = options.link_number,
        slot,
        "script loaded"
    );
    g.scripts.insert(
        script_id.clone(),
        ScriptRecord {
            container_id: options.container_id,
            link_number: options.link_number,
            name,
            state: ScriptState::Loading,
            slot: slot as i64,
            source: source.to_string(),
            overrides: options.overrides,
        },
    );
    LoadResult {
        script_id: Some(script_id),
        diagnostics,
    }
}

fn terminate_locked(g: &mut Inner, script_id: &ScriptId) {
    let Some(record) = g.scripts.get_mut(script_id) else {
        return;
    };
    if record.state == ScriptState::Terminated {
        return; // idempotent
    }
    record.state = ScriptState::Terminated;
    g.dispatcher.remove_script(script_id);
    g.timers.clear_script(script_id);
    if let Some(host) = &mut g.host {
        host.terminate(script_id);
    }
    g.bus.unregister(script_id);
    info!(target: "runtime.manager", script_id = %script_id, "script terminated");
}

fn reset_locked(g: &mut Inner, script_id: &ScriptId) -> Option<ScriptId> {
    let record = g.scripts.get(script_id)?.clone();
    terminate_locked(g, script_id);
    let result = load_locked(
        g,
        &record.source,
        LoadOptions {
            container_id: record.container_id.clone(),
            link_number: record.link_number,
            name: Some(record.name.clone()),
            overrides: record.overrides.clone(),
        },
    );
    if result.script_id.is_none() {
        warn!(
            target: "runtime.manager",
            script_id = %script_id,
            "reset failed to reload source"
        );
    }
    result.script_id
}

// ---------------------------------------------------------------------
// API-call interception
// ---------------------------------------------------------------------

enum Builtin {
    /// Handled entirely inside the manager; respond with the value.
    Done(Result<Json, String>),
    /// Handled, and a log line must go to the sink after unlock.
    Logged(Option<LogHandler>, LogLevel, String),
    /// Handled; the script asked to reset itself.
    Reset,
    /// Not a built-in: forward to the resolver.
    Forward(Option<ApiResolver>),
}

fn handle_api_call(
    inner: &Arc<Mutex<Inner>>,
    handle: &Handle,
    script_id: ScriptId,
    call_id: core_protocol::CallId,
    method: String,
    args: Vec<Json>,
) {
    let builtin = {
        let mut g = inner.lock().expect("manager lock");
        try_builtin(&mut g, &script_id, &method, &args)
    };
    match builtin {
        Builtin::Done(result) => respond(inner, &script_id, call_id, result),
        Builtin::Logged(sink, level, message) => {
            if let Some(sink) = sink {
                sink(&script_id, level, &message);
            }
            respond(inner, &script_id, call_id, Ok(Json::Null));
        }
        Builtin::Reset => {
            respond(inner, &script_id, call_id, Ok(Json::Null));
            let mut g = inner.lock().expect("manager lock");
            reset_locked(&mut g, &script_id);
        }
        Builtin::Forward(resolver) => {
            let Some(resolver) = resolver else {
                respond(
                    inner,
                    &script_id,
                    call_id,
                    Err(format!("no api resolver installed for `{method}`")),
                );
                return;
            };
            // Resolver runs outside the lock; it may call back into the
            // manager.
            match resolver(&script_id, &method, &args) {
                Ok(HostReply::Value(value)) => {
                    respond(inner, &script_id, call_id, Ok(value));
                }
                Ok(HostReply::Future(future)) => {
                    let inner = inner.clone();
                    handle.spawn(async move {
                        let outcome = future.await;
                        respond(&inner, &script_id, call_id, outcome);
                    });
                }
                Err(message) => respond(inner, &script_id, call_id, Err(message)),
            }
        }
    }
}

/// Ship an api-response back to the script's slot — unless the script has
/// been terminated in the meantime, in which case the response is
/// discarded.
fn respond(
    inner: &Arc<Mutex<Inner>>,
    script_id: &ScriptId,
    call_id: core_protocol::CallId,
    outcome: Result<Json, String>,
) {
    let g = inner.lock().expect("manager lock");
    let terminated = g
        .scripts
        .get(script_id)
        .is_none_or(|r| r.state == ScriptState::Terminated);
    if terminated {
        debug!(
            target: "runtime.manager",
            script_id = %script_id,
            call_id,
            "api response discarded for terminated script"
        );
        return;
    }
    if let Some(host) = &g.host {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(message) => (None, Some(message)),
        };
        host.send_api_response(script_id, call_id, result, error);
    }
}

fn try_builtin(g: &mut Inner, script_id: &ScriptId, method: &str, args: &[Json]) -> Builtin {
    let f64_arg = |i: usize| args.get(i).and_then(Json::as_f64).unwrap_or(0.0);
    let i32_arg = |i: usize| args.get(i).and_then(Json::as_i64).unwrap_or(0) as i32;
    let str_arg = |i: usize| -> String {
        match args.get(i) {
            Some(Json::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    };
    let opt_str = |i: usize| args.get(i).and_then(Json::as_str).map(str::to_string);
    match method {
        "timer.set" => {
            g.timers
                .set(script_id.clone(), opt_str(1), f64_arg(0), true, Instant::now());
            Builtin::Done(Ok(Json::Null))
        }
        "timer.once" => {
            g.timers
                .set(script_id.clone(), opt_str(1), f64_arg(0), false, Instant::now());
            Builtin::Done(Ok(Json::Null))
        }
        "timer.clear" => {
            g.timers.clear(script_id, opt_str(0).as_deref());
            Builtin::Done(Ok(Json::Null))
        }
        "script.listen" => {
            let handle = g.dispatcher.add_listen(
                script_id,
                i32_arg(0),
                str_arg(1),
                str_arg(2),
                str_arg(3),
            );
            Builtin::Done(Ok(json!(handle)))
        }
        "script.listenRemove" => {
            g.dispatcher.remove_listen(script_id, i32_arg(0));
            Builtin::Done(Ok(Json::Null))
        }
        "script.listenControl" => {
            g.dispatcher
                .control_listen(script_id, i32_arg(0), i32_arg(1) != 0);
            Builtin::Done(Ok(Json::Null))
        }
        "script.linkMessage" => {
            g.bus
                .send(script_id, i32_arg(0), i32_arg(1), str_arg(2), str_arg(3));
            Builtin::Done(Ok(Json::Null))
        }
        "script.log" => Builtin::Logged(
            g.log_handler.clone(),
            LogLevel::Info,
            str_arg(0),
        ),
        "script.reset" => Builtin::Reset,
        "script.permissions" => {
            let (mask, _) = g.dispatcher.permissions(script_id);
            Builtin::Done(Ok(json!(mask.bits())))
        }
        "script.permissionsKey" => {
            let (_, agent) = g.dispatcher.permissions(script_id);
            Builtin::Done(Ok(json!(agent)))
        }
        // Sensor lifetime is tracked here, then the call still goes to
        // the host.
        "world.sensor" => {
            g.dispatcher.sensor_started(script_id, false);
            Builtin::Forward(g.resolver.clone())
        }
        "world.sensorRepeat" => {
            g.dispatcher.sensor_started(script_id, true);
            Builtin::Forward(g.resolver.clone())
        }
        "world.sensorRemove" => {
            g.dispatcher.sensor_removed(script_id);
            Builtin::Forward(g.resolver.clone())
        }
        "world.requestPermissions" => {
            g.dispatcher.grant_permissions(
                script_id,
                core_protocol::PermissionMask::empty(),
                str_arg(0),
            );
            Builtin::Forward(g.resolver.clone())
        }
        _ => Builtin::Forward(g.resolver.clone()),
    }
}
