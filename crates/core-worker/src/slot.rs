//! One execution slot: an OS thread owning a single-threaded async
//! runtime.
//!
//! Scripts on a slot share the thread but nothing else — each script is a
//! local task with its own job queue, so event handlers of one script are
//! serialized while peers interleave at await points. A CPU-bound script
//! (between loop checks) starves the slot's ping handling; that is the
//! signal the watchdog acts on.

use crate::SlotEnvelope;
use core_protocol::worker::{HostToSlot, SlotToHost};
use core_protocol::{CallId, DetectedInfo, ScriptId};
use core_vm::{ApiBridge, Limits, LocalBoxFuture, ScriptInstance, Value, VmError};
use serde_json::Value as Json;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tracing::{debug, error, info, warn};

pub(crate) struct SlotHandle {
    pub sender: mpsc::UnboundedSender<HostToSlot>,
    pub join: Option<std::thread::JoinHandle<()>>,
}

pub(crate) fn spawn_slot(
    index: usize,
    generation: u64,
    outbound: crossbeam_channel::Sender<SlotEnvelope>,
) -> SlotHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let join = std::thread::Builder::new()
        .name(format!("relic-slot-{index}"))
        .spawn(move || slot_main(index, generation, rx, outbound))
        .expect("slot thread spawn");
    SlotHandle {
        sender: tx,
        join: Some(join),
    }
}

fn slot_main(
    index: usize,
    generation: u64,
    inbox: mpsc::UnboundedReceiver<HostToSlot>,
    outbound: crossbeam_channel::Sender<SlotEnvelope>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(target: "runtime.worker", slot = index, error = %e, "slot runtime build failed");
            return;
        }
    };
    info!(target: "runtime.worker", slot = index, generation, "slot online");
    let local = LocalSet::new();
    local.block_on(
        &runtime,
        SlotRuntime {
            index,
            generation,
            outbound,
            scripts: Rc::new(RefCell::new(HashMap::new())),
            pending: Rc::new(RefCell::new(HashMap::new())),
            next_call: Rc::new(Cell::new(1)),
        }
        .run(inbox),
    );
    info!(target: "runtime.worker", slot = index, generation, "slot offline");
}

enum ScriptJob {
    Start,
    Event {
        handler: String,
        args: Vec<Json>,
        detected: Vec<DetectedInfo>,
    },
    Terminate,
}

type PendingMap = Rc<RefCell<HashMap<CallId, oneshot::Sender<Result<Json, String>>>>>;

struct SlotRuntime {
    index: usize,
    generation: u64,
    outbound: crossbeam_channel::Sender<SlotEnvelope>,
    scripts: Rc<RefCell<HashMap<ScriptId, mpsc::UnboundedSender<ScriptJob>>>>,
    pending: PendingMap,
    next_call: Rc<Cell<CallId>>,
}

impl SlotRuntime {
    async fn run(self, mut inbox: mpsc::UnboundedReceiver<HostToSlot>) {
        while let Some(message) = inbox.recv().await {
            match message {
                HostToSlot::Init {
                    script_id,
                    code,
                    max_loop_iterations,
                    max_call_depth,
                } => self.init_script(script_id, code, max_loop_iterations, max_call_depth),
                HostToSlot::Event {
                    script_id,
                    event,
                    args,
                    detected,
                } => {
                    let sent = self.scripts.borrow().get(&script_id).is_some_and(|tx| {
                        tx.send(ScriptJob::Event {
                            handler: event.clone(),
                            args: args.clone(),
                            detected: detected.clone(),
                        })
                        .is_ok()
                    });
                    if !sent {
                        debug!(
                            target: "runtime.worker",
                            slot = self.index,
                            script_id = %script_id,
                            "event for unknown script dropped"
                        );
                    }
                }
                HostToSlot::ApiResponse {
                    script_id: _,
                    call_id,
                    result,
                    error,
                } => {
                    if let Some(tx) = self.pending.borrow_mut().remove(&call_id) {
                        let outcome = match error {
                            Some(message) => Err(message),
                            None => Ok(result.unwrap_or(Json::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                }
                HostToSlot::Terminate { script_id } => {
                    if let Some(tx) = self.scripts.borrow_mut().remove(&script_id) {
                        let _ = tx.send(ScriptJob::Terminate);
                        debug!(
                            target: "runtime.worker",
                            slot = self.index,
                            script_id = %script_id,
                            "terminate delivered"
                        );
                    }
                }
                HostToSlot::Ping { timestamp } => {
                    let _ = self.outbound.send(SlotEnvelope {
                        slot: self.index,
                        generation: self.generation,
                        message: SlotToHost::Pong { timestamp },
                    });
                }
            }
        }
        // Host dropped the channel: the slot drains and exits.
    }

    fn init_script(&self, script_id: ScriptId, code: String, loops: u64, depth: u32) {
        let program = match core_ir::Program::parse_canonical(&code) {
            Ok(p) => p,
            Err(e) => {
                let _ = self.outbound.send(SlotEnvelope {
                    slot: self.index,
                    generation: self.generation,
                    message: SlotToHost::Error {
                        script_id,
                        message: format!("program did not parse: {e}"),
                        code: Some("init-parse".into()),
                    },
                });
                return;
            }
        };
        let limits = Limits {
            max_loop_iterations: loops,
            max_call_depth: depth,
        };
        let name = program.class_name.clone();
        let instance = ScriptInstance::new(program, script_id.clone(), name, limits);
        let (tx, jobs) = mpsc::unbounded_channel();
        let _ = tx.send(ScriptJob::Start);
        self.scripts.borrow_mut().insert(script_id.clone(), tx);
        let bridge = SlotApiBridge {
            outbound: self.outbound.clone(),
            pending: self.pending.clone(),
            next_call: self.next_call.clone(),
            slot: self.index,
            generation: self.generation,
        };
        let outbound = self.outbound.clone();
        let (slot, generation) = (self.index, self.generation);
        tokio::task::spawn_local(script_task(
            script_id, instance, jobs, bridge, outbound, slot, generation,
        ));
    }
}

async fn script_task(
    script_id: ScriptId,
    mut instance: ScriptInstance,
    mut jobs: mpsc::UnboundedReceiver<ScriptJob>,
    bridge: SlotApiBridge,
    outbound: crossbeam_channel::Sender<SlotEnvelope>,
    slot: usize,
    generation: u64,
) {
    let send = |message: SlotToHost| {
        let _ = outbound.send(SlotEnvelope {
            slot,
            generation,
            message,
        });
    };
    let mut failed = false;
    while let Some(job) = jobs.recv().await {
        match job {
            ScriptJob::Start => match instance.start(&bridge).await {
                Ok(()) => send(SlotToHost::Ready {
                    script_id: script_id.clone(),
                }),
                Err(e) => {
                    failed = true;
                    send(script_error(&script_id, &e));
                }
            },
            ScriptJob::Event { .. } if failed => {
                // A failed script stays loaded but inert until reset.
            }
            ScriptJob::Event {
                handler,
                args,
                detected,
            } => {
                let values: Vec<Value> = args.iter().map(Value::from_wire).collect();
                if let Err(e) = instance.dispatch(&handler, values, detected, &bridge).await {
                    warn!(
                        target: "runtime.worker",
                        slot,
                        script_id = %script_id,
                        error = %e,
                        "handler failed"
                    );
                    failed = true;
                    send(script_error(&script_id, &e));
                }
            }
            ScriptJob::Terminate => break,
        }
    }
}

fn script_error(script_id: &ScriptId, error: &VmError) -> SlotToHost {
    SlotToHost::Error {
        script_id: script_id.clone(),
        message: error.to_string(),
        code: Some(error.code().to_string()),
    }
}

/// VM-facing bridge: turns awaited api calls into slot-outbound messages
/// and parks the caller on a oneshot until the response arrives.
struct SlotApiBridge {
    outbound: crossbeam_channel::Sender<SlotEnvelope>,
    pending: PendingMap,
    next_call: Rc<Cell<CallId>>,
    slot: usize,
    generation: u64,
}

impl ApiBridge for SlotApiBridge {
    fn api_call(
        &self,
        script_id: &str,
        method: &str,
        args: Vec<Json>,
    ) -> LocalBoxFuture<'_, Result<Json, String>> {
        let call_id = self.next_call.get();
        self.next_call.set(call_id + 1);
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().insert(call_id, tx);
        let sent = self.outbound.send(SlotEnvelope {
            slot: self.slot,
            generation: self.generation,
            message: SlotToHost::ApiCall {
                script_id: script_id.to_string(),
                call_id,
                method: method.to_string(),
                args,
            },
        });
        Box::pin(async move {
            if sent.is_err() {
                return Err("host channel closed".to_string());
            }
            rx.await.map_err(|_| "api call abandoned".to_string())?
        })
    }
}
