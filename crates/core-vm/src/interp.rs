//! Async tree-walking interpreter over the hardened intermediate.
//!
//! One [`ScriptInstance`] is the runtime form of one emitted program:
//! globals, current state, per-script clock and RNG. Handler invocations
//! suspend at every host-mediated call — the bridge future resolves when
//! the api-response arrives — and at `script.sleep`, which parks only this
//! task. Loop and call-depth quotas are enforced here against the
//! instrumentation the sandbox transform injected; both counters are
//! per-invocation, not per-second.

use crate::error::VmError;
use crate::helpers::{self, HelperCtx, ScriptTimes};
use crate::value::Value;
use core_ir::{Expr, Program, Stmt, Target, VarScope};
use core_protocol::DetectedInfo;
use core_syntax::LslType;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, trace};

pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Host side of the suspension contract. Implemented by the slot runtime;
/// the returned future resolves when the host's api-response arrives.
pub trait ApiBridge {
    fn api_call(
        &self,
        script_id: &str,
        method: &str,
        args: Vec<Json>,
    ) -> LocalBoxFuture<'_, Result<Json, String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Per-invocation loop iteration bound.
    pub max_loop_iterations: u64,
    pub max_call_depth: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1_000_000,
            max_call_depth: 256,
        }
    }
}

/// Cap on chained state transitions within one dispatch.
const MAX_TRANSITIONS: u32 = 16;

pub struct ScriptInstance {
    program: Program,
    script_id: String,
    script_name: String,
    limits: Limits,
    globals: HashMap<String, Value>,
    state: String,
    times: ScriptTimes,
    rng: u64,
}

impl ScriptInstance {
    pub fn new(
        program: Program,
        script_id: impl Into<String>,
        script_name: impl Into<String>,
        limits: Limits,
    ) -> Self {
        let script_id = script_id.into();
        // Seed differs per script so peer scripts do not share random
        // streams.
        let rng = script_id
            .bytes()
            .fold(0x9e37_79b9_7f4a_7c15u64, |acc, b| {
                acc.rotate_left(7) ^ b as u64
            })
            | 1;
        Self {
            program,
            script_id,
            script_name: script_name.into(),
            limits,
            globals: HashMap::new(),
            state: "default".to_string(),
            times: ScriptTimes::new(),
            rng,
        }
    }

    pub fn current_state(&self) -> &str {
        &self.state
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Initialize globals and enter the default state.
    pub async fn start(&mut self, bridge: &dyn ApiBridge) -> Result<(), VmError> {
        let program = &self.program;
        let mut vm = Vm {
            program,
            bridge,
            script_id: &self.script_id,
            script_name: &self.script_name,
            limits: self.limits,
            globals: &mut self.globals,
            detected: &[],
            times: &mut self.times,
            rng: &mut self.rng,
            scopes: vec![HashMap::new()],
            loop_count: 0,
            call_depth: 0,
        };
        for slot in &program.globals {
            let value = match &slot.init {
                Some(init) => vm.eval_expr(init).await?,
                None => Value::default_for(slot.ty),
            };
            let value = coerce_declared(value, slot.ty);
            vm.globals.insert(slot.name.clone(), value);
        }
        drop(vm);

        if self.program.state("default").is_none()
            && let Some(first) = self.program.states.first()
        {
            self.state = first.name.clone();
        }
        debug!(
            target: "vm",
            script_id = %self.script_id,
            state = %self.state,
            "instance started"
        );
        self.dispatch("onStateEntry", vec![], vec![], bridge).await
    }

    /// Invoke one handler (by emitted method name) in the current state,
    /// following any state transitions it requests. Missing handlers are
    /// a no-op.
    pub async fn dispatch(
        &mut self,
        method: &str,
        args: Vec<Value>,
        detected: Vec<DetectedInfo>,
        bridge: &dyn ApiBridge,
    ) -> Result<(), VmError> {
        trace!(target: "vm", script_id = %self.script_id, method, "dispatch");
        let mut next = self.run_handler(method, &args, &detected, bridge).await?;
        let mut hops = 0u32;
        while let Some(target) = next {
            hops += 1;
            if hops > MAX_TRANSITIONS {
                return Err(VmError::TransitionLoop);
            }
            if self.program.state(&target).is_none() {
                return Err(VmError::UnknownState(target));
            }
            // Transition requests from state_exit are ignored, matching
            // the legacy engine.
            self.run_handler("onStateExit", &[], &[], bridge).await?;
            debug!(
                target: "vm",
                script_id = %self.script_id,
                from = %self.state,
                to = %target,
                "state transition"
            );
            self.state = target;
            next = self.run_handler("onStateEntry", &[], &[], bridge).await?;
        }
        Ok(())
    }

    async fn run_handler(
        &mut self,
        method: &str,
        args: &[Value],
        detected: &[DetectedInfo],
        bridge: &dyn ApiBridge,
    ) -> Result<Option<String>, VmError> {
        let program = &self.program;
        let Some(state_block) = program.state(&self.state) else {
            return Ok(None);
        };
        let Some(handler) = state_block.handlers.iter().find(|h| h.method == method) else {
            return Ok(None);
        };

        let mut params = HashMap::new();
        for (i, name) in handler.params.iter().enumerate() {
            params.insert(
                name.clone(),
                args.get(i).cloned().unwrap_or(Value::Integer(0)),
            );
        }
        let mut vm = Vm {
            program,
            bridge,
            script_id: &self.script_id,
            script_name: &self.script_name,
            limits: self.limits,
            globals: &mut self.globals,
            detected,
            times: &mut self.times,
            rng: &mut self.rng,
            scopes: vec![params],
            loop_count: 0,
            call_depth: u32::from(handler.depth_guarded),
        };
        match vm.eval_block(&handler.body).await? {
            Flow::Transition(state) => Ok(Some(state)),
            _ => Ok(None),
        }
    }
}

/// Declared-type coercion on `let` and global slots: an integer literal
/// initializing a float variable becomes a float, and so on.
fn coerce_declared(value: Value, ty: LslType) -> Value {
    if value.ty() == ty {
        return value;
    }
    value.cast(ty).unwrap_or(value)
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Transition(String),
}

struct Vm<'a> {
    program: &'a Program,
    bridge: &'a dyn ApiBridge,
    script_id: &'a str,
    script_name: &'a str,
    limits: Limits,
    globals: &'a mut HashMap<String, Value>,
    detected: &'a [DetectedInfo],
    times: &'a mut ScriptTimes,
    rng: &'a mut u64,
    scopes: Vec<HashMap<String, Value>>,
    loop_count: u64,
    call_depth: u32,
}

impl<'a> Vm<'a> {
    fn eval_block<'b>(
        &'b mut self,
        stmts: &'a [Stmt],
    ) -> LocalBoxFuture<'b, Result<Flow, VmError>> {
        Box::pin(async move {
            for stmt in stmts {
                match self.eval_stmt(stmt).await? {
                    Flow::Normal => {}
                    other => return Ok(other),
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn eval_stmt<'b>(&'b mut self, stmt: &'a Stmt) -> LocalBoxFuture<'b, Result<Flow, VmError>> {
        Box::pin(async move {
            match stmt {
                Stmt::CheckLoop => {
                    self.loop_count += 1;
                    if self.loop_count > self.limits.max_loop_iterations {
                        return Err(VmError::LoopQuota {
                            limit: self.limits.max_loop_iterations,
                        });
                    }
                    Ok(Flow::Normal)
                }
                Stmt::Let { name, ty, init } => {
                    let value = match init {
                        Some(e) => coerce_declared(self.eval_expr(e).await?, *ty),
                        None => Value::default_for(*ty),
                    };
                    self.scopes
                        .last_mut()
                        .expect("vm always has a scope")
                        .insert(name.clone(), value);
                    Ok(Flow::Normal)
                }
                Stmt::Expr { expr } => {
                    self.eval_expr(expr).await?;
                    Ok(Flow::Normal)
                }
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    if self.eval_expr(cond).await?.is_truthy() {
                        self.eval_scoped(then_body).await
                    } else {
                        self.eval_scoped(else_body).await
                    }
                }
                Stmt::While { cond, body } => {
                    loop {
                        if !self.eval_expr(cond).await?.is_truthy() {
                            break;
                        }
                        match self.eval_scoped(body).await? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                    }
                    Ok(Flow::Normal)
                }
                Stmt::DoWhile { body, cond } => {
                    loop {
                        match self.eval_scoped(body).await? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                        if !self.eval_expr(cond).await?.is_truthy() {
                            break;
                        }
                    }
                    Ok(Flow::Normal)
                }
                Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                } => {
                    for e in init {
                        self.eval_expr(e).await?;
                    }
                    loop {
                        if let Some(c) = cond
                            && !self.eval_expr(c).await?.is_truthy()
                        {
                            break;
                        }
                        match self.eval_scoped(body).await? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                        for e in update {
                            self.eval_expr(e).await?;
                        }
                    }
                    Ok(Flow::Normal)
                }
                Stmt::Return { value } => {
                    let v = match value {
                        Some(e) => self.eval_expr(e).await?,
                        None => Value::Integer(0),
                    };
                    Ok(Flow::Return(v))
                }
                Stmt::StateChange { state } => Ok(Flow::Transition(state.clone())),
                Stmt::Break => Ok(Flow::Break),
                Stmt::Block { body } => self.eval_scoped(body).await,
                Stmt::Empty => Ok(Flow::Normal),
            }
        })
    }

    async fn eval_scoped(&mut self, stmts: &'a [Stmt]) -> Result<Flow, VmError> {
        self.scopes.push(HashMap::new());
        let flow = self.eval_block(stmts).await;
        self.scopes.pop();
        flow
    }

    fn eval_expr<'b>(&'b mut self, expr: &'a Expr) -> LocalBoxFuture<'b, Result<Value, VmError>> {
        Box::pin(async move {
            match expr {
                Expr::Int { value } => Ok(Value::Integer(*value)),
                Expr::Float { value } => Ok(Value::Float(*value)),
                Expr::Str { value } => Ok(Value::Str(value.clone())),
                Expr::Key { value } => Ok(Value::Key(value.clone())),
                Expr::Vec3 { x, y, z } => {
                    let x = self.eval_expr(x).await?.as_float()?;
                    let y = self.eval_expr(y).await?.as_float()?;
                    let z = self.eval_expr(z).await?.as_float()?;
                    Ok(Value::Vector(nalgebra::Vector3::new(x, y, z)))
                }
                Expr::Quat { x, y, z, s } => {
                    let x = self.eval_expr(x).await?.as_float()?;
                    let y = self.eval_expr(y).await?.as_float()?;
                    let z = self.eval_expr(z).await?.as_float()?;
                    let s = self.eval_expr(s).await?.as_float()?;
                    Ok(Value::Rotation(nalgebra::Quaternion::new(s, x, y, z)))
                }
                Expr::ListLit { items } => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval_expr(item).await?);
                    }
                    Ok(Value::List(out))
                }
                Expr::Var { name, scope } => self.read_var(name, *scope),
                Expr::Member { recv, component } => {
                    self.eval_expr(recv).await?.component(*component)
                }
                Expr::Binary { op, lhs, rhs } => {
                    // Both operands always evaluate; the source language
                    // does not short-circuit logical operators.
                    let l = self.eval_expr(lhs).await?;
                    let r = self.eval_expr(rhs).await?;
                    Value::binary(*op, &l, &r)
                }
                Expr::Unary { op, operand } => {
                    let v = self.eval_expr(operand).await?;
                    Value::unary(*op, &v)
                }
                Expr::MethodCall { recv, method, args } => {
                    let recv = self.eval_expr(recv).await?;
                    let mut evaluated = Vec::with_capacity(args.len());
                    for arg in args {
                        evaluated.push(self.eval_expr(arg).await?);
                    }
                    recv.method_call(method, &evaluated)
                }
                Expr::ApiCall { method, args } => self.api_call(method, args).await,
                Expr::ApiProperty { path } => self.api_property(path).await,
                Expr::HelperCall { helper, args } => {
                    let mut evaluated = Vec::with_capacity(args.len());
                    for arg in args {
                        evaluated.push(self.eval_expr(arg).await?);
                    }
                    let memory_used = estimate_memory(self.globals);
                    let mut ctx = HelperCtx {
                        detected_len: self.detected.len(),
                        times: self.times,
                        rng: self.rng,
                        script_name: self.script_name,
                        memory_used,
                    };
                    helpers::call(helper, &evaluated, &mut ctx)
                }
                Expr::Detected { index, field } => {
                    let index = self.eval_expr(index).await?.as_int()?;
                    let info = if index < 0 {
                        None
                    } else {
                        self.detected.get(index as usize)
                    };
                    Ok(detected_field(info, field))
                }
                Expr::CallUser { name, args } => self.call_user(name, args).await,
                Expr::Await { inner } => self.eval_expr(inner).await,
                Expr::Assign { target, value } => {
                    let value = self.eval_expr(value).await?;
                    self.write_target(target, value.clone())?;
                    Ok(value)
                }
                Expr::IncDec { target, delta, pre } => {
                    let current = self.read_target(target)?;
                    let updated = Value::binary(
                        core_ir::BinOp::Add,
                        &current,
                        &Value::Integer(*delta),
                    )?;
                    self.write_target(target, updated.clone())?;
                    Ok(if *pre { updated } else { current })
                }
                Expr::Cast { ty, operand } => {
                    let v = self.eval_expr(operand).await?;
                    v.cast(*ty)
                }
                Expr::Todo { name } => Err(VmError::UnmappedBuiltin(name.clone())),
            }
        })
    }

    async fn api_call(&mut self, method: &str, args: &'a [Expr]) -> Result<Value, VmError> {
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.eval_expr(arg).await?);
        }
        // Sleep is the one host method handled inside the slot: it parks
        // only this task.
        if method == "script.sleep" {
            let seconds = evaluated
                .first()
                .map(|v| v.as_float())
                .transpose()?
                .unwrap_or(0.0)
                .max(0.0);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            return Ok(Value::Integer(0));
        }
        let wire: Vec<Json> = evaluated.iter().map(Value::to_wire).collect();
        let bridge = self.bridge;
        let result = bridge
            .api_call(self.script_id, method, wire)
            .await
            .map_err(VmError::Api)?;
        Ok(Value::from_wire(&result))
    }

    async fn api_property(&mut self, path: &str) -> Result<Value, VmError> {
        let bridge = self.bridge;
        let result = bridge
            .api_call(self.script_id, path, Vec::new())
            .await
            .map_err(VmError::Api)?;
        Ok(Value::from_wire(&result))
    }

    async fn call_user(&mut self, name: &str, args: &'a [Expr]) -> Result<Value, VmError> {
        let Some(func) = self.program.function(name) else {
            return Err(VmError::UndefinedFunction(name.to_string()));
        };
        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.eval_expr(arg).await?);
        }
        if func.depth_guarded {
            self.call_depth += 1;
            if self.call_depth > self.limits.max_call_depth {
                return Err(VmError::CallDepth {
                    limit: self.limits.max_call_depth,
                });
            }
        }
        let mut params = HashMap::new();
        for (i, param) in func.params.iter().enumerate() {
            params.insert(
                param.clone(),
                evaluated.get(i).cloned().unwrap_or(Value::Integer(0)),
            );
        }
        // Callee locals are isolated from the caller's scopes.
        let saved = std::mem::replace(&mut self.scopes, vec![params]);
        let flow = self.eval_block(&func.body).await;
        self.scopes = saved;
        if func.depth_guarded {
            self.call_depth -= 1;
        }
        match flow? {
            Flow::Return(v) => Ok(v),
            Flow::Transition(_) => Err(VmError::Runtime(
                "state change inside a user function is not supported".into(),
            )),
            _ => Ok(Value::Integer(0)),
        }
    }

    fn read_var(&self, name: &str, scope: VarScope) -> Result<Value, VmError> {
        match scope {
            VarScope::Local => {
                for frame in self.scopes.iter().rev() {
                    if let Some(v) = frame.get(name) {
                        return Ok(v.clone());
                    }
                }
                // Fall back to globals for identifiers the emitter could
                // not classify.
                self.globals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| VmError::UnboundVariable(name.to_string()))
            }
            VarScope::Global => self
                .globals
                .get(name)
                .cloned()
                .ok_or_else(|| VmError::UnboundVariable(name.to_string())),
        }
    }

    fn read_target(&self, target: &Target) -> Result<Value, VmError> {
        let base = self.read_var(&target.name, target.scope)?;
        match target.component {
            Some(component) => base.component(component),
            None => Ok(base),
        }
    }

    fn write_target(&mut self, target: &Target, value: Value) -> Result<(), VmError> {
        let slot_value = match target.component {
            None => value,
            Some(component) => {
                let base = self.read_var(&target.name, target.scope)?;
                base.with_component(component, value.as_float()?)?
            }
        };
        match target.scope {
            VarScope::Global => {
                self.globals.insert(target.name.clone(), slot_value);
            }
            VarScope::Local => {
                for frame in self.scopes.iter_mut().rev() {
                    if let Some(slot) = frame.get_mut(&target.name) {
                        *slot = slot_value;
                        return Ok(());
                    }
                }
                if let Some(slot) = self.globals.get_mut(&target.name) {
                    *slot = slot_value;
                    return Ok(());
                }
                // Assignment to a name the emitter could not resolve
                // creates it in the innermost scope.
                self.scopes
                    .last_mut()
                    .expect("vm always has a scope")
                    .insert(target.name.clone(), slot_value);
            }
        }
        Ok(())
    }
}

/// Read one field of a detected-info entry, with legacy defaults when the
/// index is out of range.
fn detected_field(info: Option<&DetectedInfo>, field: &str) -> Value {
    use crate::value::NULL_KEY;
    let Some(info) = info else {
        return match field {
            "id" | "owner" => Value::Key(NULL_KEY.into()),
            "name" => Value::Str(String::new()),
            "type" | "group" | "linkNumber" => Value::Integer(0),
            "touchFace" => Value::Integer(-1),
            _ => Value::Vector(nalgebra::Vector3::zeros()),
        };
    };
    match field {
        "id" => Value::Key(info.id.clone()),
        "name" => Value::Str(info.name.clone()),
        "position" => Value::Vector(info.position),
        "rotation" => Value::Rotation(info.rotation),
        "velocity" => Value::Vector(info.velocity),
        "type" => Value::Integer(info.type_mask.bits()),
        "owner" => Value::Key(info.owner.clone()),
        "group" => Value::Integer(info.group),
        "linkNumber" => Value::Integer(info.link_number),
        "touchFace" => Value::Integer(info.touch_face),
        "touchPosition" => Value::Vector(info.touch_position),
        "touchNormal" => Value::Vector(info.touch_normal),
        "touchBinormal" => Value::Vector(info.touch_binormal),
        "touchST" => Value::Vector(info.touch_st),
        "touchUV" => Value::Vector(info.touch_uv),
        _ => Value::Integer(0),
    }
}

fn estimate_memory(globals: &HashMap<String, Value>) -> usize {
    fn size_of_value(v: &Value) -> usize {
        match v {
            Value::Integer(_) => 4,
            Value::Float(_) => 8,
            Value::Str(s) | Value::Key(s) => 8 + s.len(),
            Value::Vector(_) => 24,
            Value::Rotation(_) => 32,
            Value::List(items) => 8 + items.iter().map(size_of_value).sum::<usize>(),
        }
    }
    globals
        .iter()
        .map(|(k, v)| k.len() + size_of_value(v))
        .sum()
}
