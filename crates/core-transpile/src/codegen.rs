//! Two-pass code generator: AST → intermediate program.
//!
//! Pass 1 scans the whole script: async propagation over the user call
//! graph (fixpoint), detected-array usage per handler, and the constant /
//! import walk. Pass 2 emits the program: one global slot per script
//! variable, one function per user function, one handler per event with
//! the fixed per-event signature template.
//!
//! Handler signatures follow the target templates, not the legacy ones.
//! Events whose legacy signature is a single detected count (`touch_start
//! (integer n)` and friends) bind that name in a prologue from the
//! detected array; events whose legacy tuple matches the template arity
//! adopt the legacy parameter names so the body lowers unchanged.

use crate::constants;
use crate::resolver::{self, Resolution, Special};
use crate::tracker::{self, BinaryLowering, TypeTracker};
use core_ir as ir;
use core_syntax::ast;
use core_syntax::diagnostics::{Diagnostic, SourceLoc};
use core_syntax::LslType;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Fixed emission template for one event.
struct HandlerTemplate {
    event: &'static str,
    method: &'static str,
    params: &'static [(&'static str, LslType)],
    /// Legacy signature is `(integer n)` where `n` is the detected count.
    binds_count: bool,
}

use LslType::{Integer, Key, List, String as Str, Vector};

const HANDLER_TEMPLATES: &[HandlerTemplate] = &[
    HandlerTemplate {
        event: "state_entry",
        method: "onStateEntry",
        params: &[],
        binds_count: false,
    },
    HandlerTemplate {
        event: "state_exit",
        method: "onStateExit",
        params: &[],
        binds_count: false,
    },
    HandlerTemplate {
        event: "touch_start",
        method: "onTouchStart",
        params: &[("agent", Key), ("face", Integer)],
        binds_count: true,
    },
    HandlerTemplate {
        event: "touch",
        method: "onTouch",
        params: &[("agent", Key), ("face", Integer)],
        binds_count: true,
    },
    HandlerTemplate {
        event: "touch_end",
        method: "onTouchEnd",
        params: &[("agent", Key), ("face", Integer)],
        binds_count: true,
    },
    HandlerTemplate {
        event: "collision_start",
        method: "onCollisionStart",
        params: &[("other", Key)],
        binds_count: true,
    },
    HandlerTemplate {
        event: "collision",
        method: "onCollision",
        params: &[("other", Key)],
        binds_count: true,
    },
    HandlerTemplate {
        event: "collision_end",
        method: "onCollisionEnd",
        params: &[("other", Key)],
        binds_count: true,
    },
    HandlerTemplate {
        event: "land_collision_start",
        method: "onLandCollisionStart",
        params: &[("position", Vector)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "land_collision",
        method: "onLandCollision",
        params: &[("position", Vector)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "land_collision_end",
        method: "onLandCollisionEnd",
        params: &[("position", Vector)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "timer",
        method: "onTimer",
        params: &[("timerId", Str)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "listen",
        method: "onListen",
        params: &[("channel", Integer), ("name", Str), ("id", Key), ("message", Str)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "sensor",
        method: "onSensor",
        params: &[],
        binds_count: true,
    },
    HandlerTemplate {
        event: "no_sensor",
        method: "onNoSensor",
        params: &[],
        binds_count: false,
    },
    HandlerTemplate {
        event: "changed",
        method: "onChanged",
        params: &[("change", Integer)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "attach",
        method: "onAttach",
        params: &[("id", Key)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "on_rez",
        method: "onRez",
        params: &[("startParam", Integer)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "object_rez",
        method: "onObjectRez",
        params: &[("id", Key)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "money",
        method: "onMoney",
        params: &[("id", Key), ("amount", Integer)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "run_time_permissions",
        method: "onRunTimePermissions",
        params: &[("permissions", Integer)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "control",
        method: "onControl",
        params: &[("id", Key), ("level", Integer), ("edge", Integer)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "dataserver",
        method: "onDataserver",
        params: &[("queryId", Key), ("data", Str)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "http_response",
        method: "onHttpResponse",
        params: &[
            ("requestId", Key),
            ("status", Integer),
            ("metadata", List),
            ("body", Str),
        ],
        binds_count: false,
    },
    HandlerTemplate {
        event: "link_message",
        method: "onLinkMessage",
        params: &[
            ("senderLink", Integer),
            ("num", Integer),
            ("message", Str),
            ("id", Key),
        ],
        binds_count: false,
    },
    HandlerTemplate {
        event: "email",
        method: "onEmail",
        params: &[
            ("time", Str),
            ("address", Str),
            ("subject", Str),
            ("message", Str),
            ("remaining", Integer),
        ],
        binds_count: false,
    },
    HandlerTemplate {
        event: "at_target",
        method: "onAtTarget",
        params: &[("handle", Integer), ("targetPos", Vector), ("currentPos", Vector)],
        binds_count: false,
    },
    HandlerTemplate {
        event: "not_at_target",
        method: "onNotAtTarget",
        params: &[],
        binds_count: false,
    },
    HandlerTemplate {
        event: "moving_start",
        method: "onMovingStart",
        params: &[],
        binds_count: false,
    },
    HandlerTemplate {
        event: "moving_end",
        method: "onMovingEnd",
        params: &[],
        binds_count: false,
    },
];

fn template_for(event: &str) -> Option<&'static HandlerTemplate> {
    HANDLER_TEMPLATES.iter().find(|t| t.event == event)
}

/// `warp_drive_engaged` → `onWarpDriveEngaged` for extension events.
fn extension_method_name(event: &str) -> String {
    let mut out = String::from("on");
    for part in event.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Emitted-method lookup used by the event dispatcher tables.
pub fn handler_method_name(event: &str) -> Option<&'static str> {
    template_for(event).map(|t| t.method)
}

pub struct CodeGen<'a> {
    script: &'a ast::Script,
    tracker: TypeTracker,
    async_fns: HashSet<String>,
    detected_handlers: HashSet<(String, String)>,
    imports: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    file: Option<String>,
    sleep_noted: bool,
}

impl<'a> CodeGen<'a> {
    pub fn new(script: &'a ast::Script, file: Option<String>) -> Self {
        Self {
            script,
            tracker: TypeTracker::new(),
            async_fns: HashSet::new(),
            detected_handlers: HashSet::new(),
            imports: Vec::new(),
            diagnostics: Vec::new(),
            file,
            sleep_noted: false,
        }
    }

    pub fn generate(mut self, class_name: &str) -> (ir::Program, Vec<Diagnostic>) {
        let script = self.script;
        self.scan();

        let mut program = ir::Program::new(class_name);
        program.imports = self.imports.clone();

        // All globals are visible to every body regardless of declaration
        // order; declare them before lowering any initializer.
        for global in &script.globals {
            self.tracker.declare_global(global.name.clone(), global.ty);
        }
        for global in &script.globals {
            let init = global.init.as_ref().map(|e| self.lower_expr(e));
            program.globals.push(ir::GlobalSlot {
                name: global.name.clone(),
                ty: global.ty,
                init,
            });
        }
        for func in &script.functions {
            program.functions.push(self.emit_function(func));
        }
        for state in &script.states {
            let handlers = state
                .handlers
                .iter()
                .map(|h| self.emit_handler(&state.name, h))
                .collect();
            program.states.push(ir::StateBlock {
                name: state.name.clone(),
                handlers,
            });
        }
        debug!(
            target: "transpile.emit",
            class = class_name,
            globals = program.globals.len(),
            functions = program.functions.len(),
            states = program.states.len(),
            async_functions = self.async_fns.len(),
            "program emitted"
        );
        (program, self.diagnostics)
    }

    // -----------------------------------------------------------------
    // Pass 1 — scan
    // -----------------------------------------------------------------

    fn scan(&mut self) {
        self.scan_async_fixpoint();
        self.scan_detected_usage();
        self.scan_imports();
    }

    /// Seed with functions that directly call an async builtin, then
    /// iterate until no new function is marked.
    fn scan_async_fixpoint(&mut self) {
        let script = self.script;
        let mut calls_of: HashMap<&str, HashSet<String>> = HashMap::new();
        for func in &script.functions {
            let mut called = HashSet::new();
            let mut direct_async = false;
            for_each_call(&func.body, &mut |name| {
                match resolver::resolve(name) {
                    Some(r) if r.needs_async => direct_async = true,
                    Some(_) => {}
                    None => {
                        called.insert(name.to_string());
                    }
                }
            });
            if direct_async {
                self.async_fns.insert(func.name.clone());
            }
            calls_of.insert(func.name.as_str(), called);
        }
        loop {
            let mut grew = false;
            for func in &script.functions {
                if self.async_fns.contains(&func.name) {
                    continue;
                }
                let calls_async = calls_of
                    .get(func.name.as_str())
                    .is_some_and(|called| called.iter().any(|c| self.async_fns.contains(c)));
                if calls_async {
                    self.async_fns.insert(func.name.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
    }

    fn scan_detected_usage(&mut self) {
        let script = self.script;
        for state in &script.states {
            for handler in &state.handlers {
                let capable = core_syntax::events::lookup(&handler.name)
                    .is_some_and(|sig| sig.detected);
                if !capable {
                    continue;
                }
                let mut uses = false;
                for_each_call(&handler.body, &mut |name| {
                    if matches!(
                        resolver::resolve(name).map(|r| r.kind),
                        Some(Resolution::Detected { .. })
                    ) {
                        uses = true;
                    }
                });
                if uses {
                    self.detected_handlers
                        .insert((state.name.clone(), handler.name.clone()));
                }
            }
        }
    }

    fn scan_imports(&mut self) {
        let mut need_vec = false;
        let mut need_quat = false;
        let mut helpers: Vec<&'static str> = Vec::new();
        let mut visit = |expr: &ast::Expr| match expr {
            ast::Expr::VectorLit { .. } => need_vec = true,
            ast::Expr::RotationLit { .. } => need_quat = true,
            ast::Expr::Cast { ty, .. } => match ty {
                LslType::Vector => need_vec = true,
                LslType::Rotation => need_quat = true,
                _ => {}
            },
            ast::Expr::Ident { name, .. } => match constants::lookup(name).map(|c| c.ty()) {
                Some(LslType::Vector) => need_vec = true,
                Some(LslType::Rotation) => need_quat = true,
                _ => {}
            },
            ast::Expr::Call { name, .. } => {
                let helper = match name.as_str() {
                    "llGetSubString" => Some("lslGetSubString"),
                    "llDeleteSubString" => Some("lslDeleteSubString"),
                    "llList2List" => Some("lslListSlice"),
                    "llDeleteSubList" => Some("lslDeleteSubList"),
                    _ => None,
                };
                if let Some(h) = helper
                    && !helpers.contains(&h)
                {
                    helpers.push(h);
                }
            }
            _ => {}
        };
        for global in &self.script.globals {
            if let Some(init) = &global.init {
                visit_ast_exprs(init, &mut visit);
            }
        }
        for func in &self.script.functions {
            for_each_expr(&func.body, &mut visit);
        }
        for state in &self.script.states {
            for handler in &state.handlers {
                for_each_expr(&handler.body, &mut visit);
            }
        }
        if need_vec {
            self.imports.push("Vec3".to_string());
        }
        if need_quat {
            self.imports.push("Quat".to_string());
        }
        self.imports.extend(helpers.into_iter().map(String::from));
    }

    // -----------------------------------------------------------------
    // Pass 2 — emit
    // -----------------------------------------------------------------

    fn emit_function(&mut self, func: &ast::FunctionDecl) -> ir::Function {
        self.tracker.push_scope();
        for param in &func.params {
            self.tracker.declare(param.name.clone(), param.ty);
        }
        let body = self.lower_stmts(&func.body);
        self.tracker.pop_scope();
        ir::Function {
            name: func.name.clone(),
            params: func.params.iter().map(|p| p.name.clone()).collect(),
            body,
            is_async: self.async_fns.contains(&func.name),
            depth_guarded: false,
        }
    }

    fn emit_handler(&mut self, state_name: &str, handler: &ast::HandlerDecl) -> ir::Handler {
        self.tracker.push_scope();
        let mut prologue: Vec<ir::Stmt> = Vec::new();
        let (method, params): (String, Vec<String>) = match template_for(&handler.name) {
            Some(template) => {
                let adopt_legacy = !template.binds_count
                    && handler.params.len() == template.params.len();
                let params: Vec<String> = if adopt_legacy {
                    for param in &handler.params {
                        self.tracker.declare(param.name.clone(), param.ty);
                    }
                    handler.params.iter().map(|p| p.name.clone()).collect()
                } else {
                    for (name, ty) in template.params {
                        self.tracker.declare(*name, *ty);
                    }
                    if template.binds_count
                        && let Some(count_param) = handler.params.first()
                    {
                        let shadows = template
                            .params
                            .iter()
                            .any(|(name, _)| *name == count_param.name);
                        if !shadows {
                            self.tracker
                                .declare(count_param.name.clone(), LslType::Integer);
                            prologue.push(ir::Stmt::Let {
                                name: count_param.name.clone(),
                                ty: LslType::Integer,
                                init: Some(ir::Expr::HelperCall {
                                    helper: "detected.count".to_string(),
                                    args: vec![],
                                }),
                            });
                        }
                    }
                    template.params.iter().map(|(n, _)| n.to_string()).collect()
                };
                (template.method.to_string(), params)
            }
            None => {
                // Extension event: keep the legacy parameter list as-is.
                for param in &handler.params {
                    self.tracker.declare(param.name.clone(), param.ty);
                }
                (
                    extension_method_name(&handler.name),
                    handler.params.iter().map(|p| p.name.clone()).collect(),
                )
            }
        };
        let mut body = prologue;
        body.extend(self.lower_stmts(&handler.body));
        self.tracker.pop_scope();
        ir::Handler {
            event: handler.name.clone(),
            method,
            params,
            body,
            uses_detected: self
                .detected_handlers
                .contains(&(state_name.to_string(), handler.name.clone())),
            depth_guarded: false,
        }
    }

    fn lower_stmts(&mut self, stmts: &[ast::Stmt]) -> Vec<ir::Stmt> {
        stmts.iter().map(|s| self.lower_stmt(s)).collect()
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> ir::Stmt {
        match stmt {
            ast::Stmt::Decl {
                ty, name, init, ..
            } => {
                let init = init.as_ref().map(|e| self.lower_expr(e));
                self.tracker.declare(name.clone(), *ty);
                ir::Stmt::Let {
                    name: name.clone(),
                    ty: *ty,
                    init,
                }
            }
            ast::Stmt::Expr(expr) => ir::Stmt::Expr {
                expr: self.lower_expr(expr),
            },
            ast::Stmt::Empty => ir::Stmt::Empty,
            ast::Stmt::Block(stmts) => {
                self.tracker.push_scope();
                let body = self.lower_stmts(stmts);
                self.tracker.pop_scope();
                ir::Stmt::Block { body }
            }
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => ir::Stmt::If {
                cond: self.lower_expr(cond),
                then_body: self.lower_branch(then_branch),
                else_body: else_branch
                    .as_ref()
                    .map(|b| self.lower_branch(b))
                    .unwrap_or_default(),
            },
            ast::Stmt::For {
                init,
                cond,
                update,
                body,
            } => ir::Stmt::For {
                init: init.iter().map(|e| self.lower_expr(e)).collect(),
                cond: cond.as_ref().map(|e| self.lower_expr(e)),
                update: update.iter().map(|e| self.lower_expr(e)).collect(),
                body: self.lower_branch(body),
            },
            ast::Stmt::While { cond, body } => ir::Stmt::While {
                cond: self.lower_expr(cond),
                body: self.lower_branch(body),
            },
            ast::Stmt::DoWhile { body, cond } => ir::Stmt::DoWhile {
                body: self.lower_branch(body),
                cond: self.lower_expr(cond),
            },
            ast::Stmt::Return { value, .. } => ir::Stmt::Return {
                value: value.as_ref().map(|e| self.lower_expr(e)),
            },
            ast::Stmt::Jump { label, loc } => {
                self.warn(
                    Diagnostic::warning(format!(
                        "`jump {label}` has no structured equivalent; lowered to a loop break"
                    ))
                    .with_loc(*loc),
                );
                ir::Stmt::Break
            }
            ast::Stmt::Label { name, loc } => {
                self.warn(
                    Diagnostic::warning(format!("label `@{name}` dropped during lowering"))
                        .with_loc(*loc),
                );
                ir::Stmt::Empty
            }
            ast::Stmt::StateChange { state, loc } => {
                if self.script.state(state).is_none() {
                    self.warn(
                        Diagnostic::warning(format!("transition to undeclared state `{state}`"))
                            .with_loc(*loc),
                    );
                }
                ir::Stmt::StateChange {
                    state: state.clone(),
                }
            }
        }
    }

    /// Lower a branch body into a statement list, flattening the common
    /// single-block case.
    fn lower_branch(&mut self, stmt: &ast::Stmt) -> Vec<ir::Stmt> {
        match stmt {
            ast::Stmt::Block(stmts) => {
                self.tracker.push_scope();
                let body = self.lower_stmts(stmts);
                self.tracker.pop_scope();
                body
            }
            other => vec![self.lower_stmt(other)],
        }
    }

    fn lower_expr(&mut self, expr: &ast::Expr) -> ir::Expr {
        match expr {
            ast::Expr::IntLit { value, .. } => ir::Expr::Int {
                value: *value as i32,
            },
            ast::Expr::FloatLit { value, .. } => ir::Expr::Float { value: *value },
            ast::Expr::StrLit { value, .. } => ir::Expr::Str {
                value: value.clone(),
            },
            ast::Expr::VectorLit { x, y, z, .. } => ir::Expr::Vec3 {
                x: Box::new(self.lower_expr(x)),
                y: Box::new(self.lower_expr(y)),
                z: Box::new(self.lower_expr(z)),
            },
            ast::Expr::RotationLit { x, y, z, s, .. } => ir::Expr::Quat {
                x: Box::new(self.lower_expr(x)),
                y: Box::new(self.lower_expr(y)),
                z: Box::new(self.lower_expr(z)),
                s: Box::new(self.lower_expr(s)),
            },
            ast::Expr::ListLit { items, .. } => ir::Expr::ListLit {
                items: items.iter().map(|e| self.lower_expr(e)).collect(),
            },
            ast::Expr::Ident { name, loc } => self.lower_ident(name, *loc),
            ast::Expr::Member { recv, field, loc } => {
                match ir::Component::from_name(field) {
                    Some(component) => ir::Expr::Member {
                        recv: Box::new(self.lower_expr(recv)),
                        component,
                    },
                    None => {
                        self.warn(
                            Diagnostic::warning(format!(
                                "unknown component `.{field}` — only x/y/z/s exist"
                            ))
                            .with_loc(*loc),
                        );
                        ir::Expr::Member {
                            recv: Box::new(self.lower_expr(recv)),
                            component: ir::Component::X,
                        }
                    }
                }
            }
            ast::Expr::Call { name, args, loc } => self.lower_call(name, args, *loc),
            ast::Expr::Binary { op, lhs, rhs, .. } => self.lower_binary(*op, lhs, rhs),
            ast::Expr::Unary { op, operand, loc } => self.lower_unary(*op, operand, *loc),
            ast::Expr::Assign {
                op,
                target,
                value,
                loc,
            } => self.lower_assign(*op, target, value, *loc),
            ast::Expr::Cast { ty, operand, .. } => ir::Expr::Cast {
                ty: *ty,
                operand: Box::new(self.lower_expr(operand)),
            },
        }
    }

    fn lower_ident(&mut self, name: &str, loc: SourceLoc) -> ir::Expr {
        if self.tracker.is_local(name) {
            return ir::Expr::Var {
                name: name.to_string(),
                scope: ir::VarScope::Local,
            };
        }
        if self.tracker.is_global(name) {
            return ir::Expr::Var {
                name: name.to_string(),
                scope: ir::VarScope::Global,
            };
        }
        if let Some(value) = constants::lookup(name) {
            return value.to_expr();
        }
        self.warn(Diagnostic::warning(format!("unknown identifier `{name}`")).with_loc(loc));
        ir::Expr::Var {
            name: name.to_string(),
            scope: ir::VarScope::Local,
        }
    }

    fn lower_call(&mut self, name: &str, args: &[ast::Expr], loc: SourceLoc) -> ir::Expr {
        let lowered: Vec<ir::Expr> = args.iter().map(|e| self.lower_expr(e)).collect();
        match resolver::resolve(name) {
            None => {
                if self.script.function(name).is_none() {
                    self.warn(
                        Diagnostic::warning(format!("call to undeclared function `{name}`"))
                            .with_loc(loc),
                    );
                }
                let call = ir::Expr::CallUser {
                    name: name.to_string(),
                    args: lowered,
                };
                if self.async_fns.contains(name) {
                    ir::Expr::Await {
                        inner: Box::new(call),
                    }
                } else {
                    call
                }
            }
            Some(resolved) => {
                if resolved.partial {
                    self.warn(
                        Diagnostic::warning(format!(
                            "`{name}` mapping is partial; behavior may differ"
                        ))
                        .with_loc(loc),
                    );
                }
                let inner = match resolved.kind {
                    Resolution::Method { path } => ir::Expr::ApiCall {
                        method: path.to_string(),
                        args: lowered,
                    },
                    Resolution::Property { path } => {
                        if !lowered.is_empty() {
                            self.warn(
                                Diagnostic::warning(format!(
                                    "`{name}` takes no arguments; extras dropped"
                                ))
                                .with_loc(loc),
                            );
                        }
                        ir::Expr::ApiProperty {
                            path: path.to_string(),
                        }
                    }
                    Resolution::Detected { field } => {
                        let index = lowered
                            .into_iter()
                            .next()
                            .unwrap_or(ir::Expr::Int { value: 0 });
                        ir::Expr::Detected {
                            index: Box::new(index),
                            field: field.to_string(),
                        }
                    }
                    Resolution::Static { helper } => ir::Expr::HelperCall {
                        helper: helper.to_string(),
                        args: lowered,
                    },
                    Resolution::Special(special) => self.lower_special(special, lowered, loc),
                    Resolution::Unmapped => {
                        self.warn(
                            Diagnostic::warning(format!(
                                "`{name}` is not mapped; a TODO marker was emitted"
                            ))
                            .with_loc(loc),
                        );
                        ir::Expr::Todo {
                            name: name.to_string(),
                        }
                    }
                };
                if resolved.needs_await {
                    ir::Expr::Await {
                        inner: Box::new(inner),
                    }
                } else {
                    inner
                }
            }
        }
    }

    fn lower_special(
        &mut self,
        special: Special,
        args: Vec<ir::Expr>,
        loc: SourceLoc,
    ) -> ir::Expr {
        match special {
            Special::GetSubString => ir::Expr::HelperCall {
                helper: "lslGetSubString".to_string(),
                args,
            },
            Special::DeleteSubString => ir::Expr::HelperCall {
                helper: "lslDeleteSubString".to_string(),
                args,
            },
            Special::ListSlice => ir::Expr::HelperCall {
                helper: "lslListSlice".to_string(),
                args,
            },
            Special::DeleteSubList => ir::Expr::HelperCall {
                helper: "lslDeleteSubList".to_string(),
                args,
            },
            Special::Sleep => {
                if !self.sleep_noted {
                    self.sleep_noted = true;
                    self.warn(
                        Diagnostic::note(
                            "sleep suspends only this script; peer scripts keep running",
                        )
                        .with_loc(loc),
                    );
                }
                ir::Expr::ApiCall {
                    method: "script.sleep".to_string(),
                    args,
                }
            }
            // Interval 0 clears; the manager implements that rule.
            Special::SetTimerEvent => ir::Expr::ApiCall {
                method: "timer.set".to_string(),
                args,
            },
        }
    }

    fn lower_binary(&mut self, op: ast::BinaryOp, lhs: &ast::Expr, rhs: &ast::Expr) -> ir::Expr {
        let lt = self.tracker.infer(lhs);
        let rt = self.tracker.infer(rhs);
        let l = self.lower_expr(lhs);
        let r = self.lower_expr(rhs);
        match tracker::lower_binary(op, lt, rt) {
            BinaryLowering::Raw => ir::Expr::Binary {
                op: map_binop(op),
                lhs: Box::new(l),
                rhs: Box::new(r),
            },
            BinaryLowering::Method { method } => ir::Expr::MethodCall {
                recv: Box::new(l),
                method: method.to_string(),
                args: vec![r],
            },
            BinaryLowering::MethodSwapped { method } => ir::Expr::MethodCall {
                recv: Box::new(r),
                method: method.to_string(),
                args: vec![l],
            },
            BinaryLowering::ScaleInverse => ir::Expr::MethodCall {
                recv: Box::new(l),
                method: "scale".to_string(),
                args: vec![ir::Expr::Binary {
                    op: ir::BinOp::Div,
                    lhs: Box::new(ir::Expr::Float { value: 1.0 }),
                    rhs: Box::new(r),
                }],
            },
        }
    }

    fn lower_unary(&mut self, op: ast::UnaryOp, operand: &ast::Expr, loc: SourceLoc) -> ir::Expr {
        match op {
            ast::UnaryOp::Neg => {
                let ty = self.tracker.infer(operand);
                let inner = self.lower_expr(operand);
                if tracker::negates_by_method(ty) {
                    ir::Expr::MethodCall {
                        recv: Box::new(inner),
                        method: "negate".to_string(),
                        args: vec![],
                    }
                } else {
                    ir::Expr::Unary {
                        op: ir::UnOp::Neg,
                        operand: Box::new(inner),
                    }
                }
            }
            ast::UnaryOp::Not => ir::Expr::Unary {
                op: ir::UnOp::Not,
                operand: Box::new(self.lower_expr(operand)),
            },
            ast::UnaryOp::BitNot => ir::Expr::Unary {
                op: ir::UnOp::BitNot,
                operand: Box::new(self.lower_expr(operand)),
            },
            ast::UnaryOp::PreIncr => self.lower_incdec(operand, 1, true, loc),
            ast::UnaryOp::PreDecr => self.lower_incdec(operand, -1, true, loc),
            ast::UnaryOp::PostIncr => self.lower_incdec(operand, 1, false, loc),
            ast::UnaryOp::PostDecr => self.lower_incdec(operand, -1, false, loc),
        }
    }

    fn lower_incdec(
        &mut self,
        operand: &ast::Expr,
        delta: i32,
        pre: bool,
        loc: SourceLoc,
    ) -> ir::Expr {
        match self.lower_target(operand) {
            Some(target) => ir::Expr::IncDec { target, delta, pre },
            None => {
                self.warn(
                    Diagnostic::warning("increment/decrement target must be a variable")
                        .with_loc(loc),
                );
                self.lower_expr(operand)
            }
        }
    }

    fn lower_target(&mut self, expr: &ast::Expr) -> Option<ir::Target> {
        match expr {
            ast::Expr::Ident { name, .. } => {
                let scope = if self.tracker.is_local(name) {
                    ir::VarScope::Local
                } else {
                    ir::VarScope::Global
                };
                Some(ir::Target {
                    name: name.clone(),
                    scope,
                    component: None,
                })
            }
            ast::Expr::Member { recv, field, .. } => {
                let ast::Expr::Ident { name, .. } = recv.as_ref() else {
                    return None;
                };
                let component = ir::Component::from_name(field)?;
                let scope = if self.tracker.is_local(name) {
                    ir::VarScope::Local
                } else {
                    ir::VarScope::Global
                };
                Some(ir::Target {
                    name: name.clone(),
                    scope,
                    component: Some(component),
                })
            }
            _ => None,
        }
    }

    fn lower_assign(
        &mut self,
        op: ast::AssignOp,
        target: &ast::Expr,
        value: &ast::Expr,
        loc: SourceLoc,
    ) -> ir::Expr {
        let Some(ir_target) = self.lower_target(target) else {
            self.warn(Diagnostic::warning("invalid assignment target").with_loc(loc));
            return self.lower_expr(value);
        };
        if op == ast::AssignOp::Assign {
            return ir::Expr::Assign {
                target: ir_target,
                value: Box::new(self.lower_expr(value)),
            };
        }
        // Compound assignment expands to `t = t <op> v`, with overload
        // dispatch deciding between the raw operator and a method call.
        let bin_op = match op {
            ast::AssignOp::Add => ast::BinaryOp::Add,
            ast::AssignOp::Sub => ast::BinaryOp::Sub,
            ast::AssignOp::Mul => ast::BinaryOp::Mul,
            ast::AssignOp::Div => ast::BinaryOp::Div,
            ast::AssignOp::Rem => ast::BinaryOp::Rem,
            ast::AssignOp::Shl => ast::BinaryOp::Shl,
            ast::AssignOp::Shr => ast::BinaryOp::Shr,
            ast::AssignOp::BitAnd => ast::BinaryOp::BitAnd,
            ast::AssignOp::BitOr => ast::BinaryOp::BitOr,
            ast::AssignOp::BitXor => ast::BinaryOp::BitXor,
            ast::AssignOp::Assign => unreachable!("handled above"),
        };
        let combined = self.lower_binary(bin_op, target, value);
        ir::Expr::Assign {
            target: ir_target,
            value: Box::new(combined),
        }
    }

    fn warn(&mut self, mut diag: Diagnostic) {
        if let Some(file) = &self.file {
            diag = diag.with_file(file.clone());
        }
        self.diagnostics.push(diag);
    }
}

fn map_binop(op: ast::BinaryOp) -> ir::BinOp {
    match op {
        ast::BinaryOp::Add => ir::BinOp::Add,
        ast::BinaryOp::Sub => ir::BinOp::Sub,
        ast::BinaryOp::Mul => ir::BinOp::Mul,
        ast::BinaryOp::Div => ir::BinOp::Div,
        ast::BinaryOp::Rem => ir::BinOp::Rem,
        ast::BinaryOp::Eq => ir::BinOp::Eq,
        ast::BinaryOp::Ne => ir::BinOp::Ne,
        ast::BinaryOp::Lt => ir::BinOp::Lt,
        ast::BinaryOp::Gt => ir::BinOp::Gt,
        ast::BinaryOp::Le => ir::BinOp::Le,
        ast::BinaryOp::Ge => ir::BinOp::Ge,
        ast::BinaryOp::And => ir::BinOp::And,
        ast::BinaryOp::Or => ir::BinOp::Or,
        ast::BinaryOp::BitAnd => ir::BinOp::BitAnd,
        ast::BinaryOp::BitOr => ir::BinOp::BitOr,
        ast::BinaryOp::BitXor => ir::BinOp::BitXor,
        ast::BinaryOp::Shl => ir::BinOp::Shl,
        ast::BinaryOp::Shr => ir::BinOp::Shr,
    }
}

// ---------------------------------------------------------------------
// AST walking helpers (scan pass)
// ---------------------------------------------------------------------

fn for_each_expr(stmts: &[ast::Stmt], f: &mut impl FnMut(&ast::Expr)) {
    for stmt in stmts {
        walk_stmt(stmt, f);
    }
}

fn walk_stmt(stmt: &ast::Stmt, f: &mut impl FnMut(&ast::Expr)) {
    match stmt {
        ast::Stmt::Decl { init, .. } => {
            if let Some(e) = init {
                visit_ast_exprs(e, f);
            }
        }
        ast::Stmt::Expr(e) => visit_ast_exprs(e, f),
        ast::Stmt::Block(stmts) => for_each_expr(stmts, f),
        ast::Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visit_ast_exprs(cond, f);
            walk_stmt(then_branch, f);
            if let Some(b) = else_branch {
                walk_stmt(b, f);
            }
        }
        ast::Stmt::For {
            init,
            cond,
            update,
            body,
        } => {
            for e in init {
                visit_ast_exprs(e, f);
            }
            if let Some(c) = cond {
                visit_ast_exprs(c, f);
            }
            for e in update {
                visit_ast_exprs(e, f);
            }
            walk_stmt(body, f);
        }
        ast::Stmt::While { cond, body } => {
            visit_ast_exprs(cond, f);
            walk_stmt(body, f);
        }
        ast::Stmt::DoWhile { body, cond } => {
            walk_stmt(body, f);
            visit_ast_exprs(cond, f);
        }
        ast::Stmt::Return { value, .. } => {
            if let Some(e) = value {
                visit_ast_exprs(e, f);
            }
        }
        ast::Stmt::Empty
        | ast::Stmt::Jump { .. }
        | ast::Stmt::Label { .. }
        | ast::Stmt::StateChange { .. } => {}
    }
}

fn visit_ast_exprs(expr: &ast::Expr, f: &mut impl FnMut(&ast::Expr)) {
    f(expr);
    match expr {
        ast::Expr::VectorLit { x, y, z, .. } => {
            visit_ast_exprs(x, f);
            visit_ast_exprs(y, f);
            visit_ast_exprs(z, f);
        }
        ast::Expr::RotationLit { x, y, z, s, .. } => {
            visit_ast_exprs(x, f);
            visit_ast_exprs(y, f);
            visit_ast_exprs(z, f);
            visit_ast_exprs(s, f);
        }
        ast::Expr::ListLit { items, .. } => {
            for item in items {
                visit_ast_exprs(item, f);
            }
        }
        ast::Expr::Call { args, .. } => {
            for arg in args {
                visit_ast_exprs(arg, f);
            }
        }
        ast::Expr::Binary { lhs, rhs, .. } => {
            visit_ast_exprs(lhs, f);
            visit_ast_exprs(rhs, f);
        }
        ast::Expr::Unary { operand, .. } => visit_ast_exprs(operand, f),
        ast::Expr::Assign { target, value, .. } => {
            visit_ast_exprs(target, f);
            visit_ast_exprs(value, f);
        }
        ast::Expr::Cast { operand, .. } => visit_ast_exprs(operand, f),
        ast::Expr::Member { recv, .. } => visit_ast_exprs(recv, f),
        ast::Expr::IntLit { .. }
        | ast::Expr::FloatLit { .. }
        | ast::Expr::StrLit { .. }
        | ast::Expr::Ident { .. } => {}
    }
}

fn for_each_call(stmts: &[ast::Stmt], f: &mut impl FnMut(&str)) {
    for_each_expr(stmts, &mut |expr| {
        if let ast::Expr::Call { name, .. } = expr {
            f(name);
        }
    });
}
