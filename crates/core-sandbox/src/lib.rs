//! core-sandbox: hardening passes over the emitted intermediate.
//!
//! The transform takes the canonical intermediate text, never the emitter's
//! in-memory tree — a parse failure here means the emitter produced an
//! invalid program and is reported as fatal. Pipeline:
//!
//! 1. parse the canonical text;
//! 2. loop protection — a `CheckLoop` statement is injected as the first
//!    statement of every loop body (bodies are statement lists, so the
//!    single-statement case needs no special casing);
//! 3. recursion protection — every function and handler is flagged for
//!    call-depth accounting at entry/exit;
//! 4. global blocklist — bare references to blocked identifiers are
//!    replaced with inert markers and reported;
//! 5. module lowering — imports become endowments and the entry class is
//!    recorded, because the execution realm evaluates programs as scripts,
//!    not modules.
//!
//! The iteration and depth *bounds* are runtime configuration; the
//! transform only plants the instrumentation points.

use core_ir::{CanonicalError, Expr, Program, Stmt};
use core_syntax::diagnostics::Diagnostic;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SandboxError {
    /// The emitted intermediate did not re-parse: a code generator bug.
    #[error("sandbox transform rejected emitted code: {0}")]
    Parse(#[from] CanonicalError),
}

/// Identifiers scripts must not reach, whatever the hosting runtime
/// endows: global-object handles, DOM accessors, networking, dynamic code
/// evaluation, reflection, and worker spawning.
pub const BLOCKED_GLOBALS: &[&str] = &[
    "globalThis",
    "window",
    "self",
    "global",
    "document",
    "navigator",
    "location",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "eval",
    "Function",
    "Reflect",
    "Proxy",
    "constructor",
    "Worker",
    "SharedWorker",
    "importScripts",
    "process",
    "require",
];

pub fn is_blocked(name: &str) -> bool {
    BLOCKED_GLOBALS.contains(&name)
}

#[derive(Debug, Clone)]
pub struct SandboxOutput {
    /// Canonical text of the hardened program.
    pub text: String,
    pub warnings: Vec<Diagnostic>,
}

/// Run the full hardening pipeline over canonical intermediate text.
pub fn transform(canonical: &str) -> Result<SandboxOutput, SandboxError> {
    let mut program = Program::parse_canonical(canonical)?;
    let mut warnings = Vec::new();

    inject_loop_checks(&mut program);
    guard_call_depth(&mut program);
    apply_blocklist(&mut program, &mut warnings);
    lower_module(&mut program, &mut warnings);

    debug!(
        target: "sandbox",
        class = %program.class_name,
        warnings = warnings.len(),
        "transform complete"
    );
    Ok(SandboxOutput {
        text: program.to_canonical(),
        warnings,
    })
}

/// Parse-free variant for callers that already hold the tree (tests, the
/// bundle pipeline's fast path).
pub fn transform_program(mut program: Program) -> (Program, Vec<Diagnostic>) {
    let mut warnings = Vec::new();
    inject_loop_checks(&mut program);
    guard_call_depth(&mut program);
    apply_blocklist(&mut program, &mut warnings);
    lower_module(&mut program, &mut warnings);
    (program, warnings)
}

// ---------------------------------------------------------------------
// Pass: loop protection
// ---------------------------------------------------------------------

fn inject_loop_checks(program: &mut Program) {
    program.for_each_body_mut(|body| inject_into_stmts(body));
}

fn inject_into_stmts(stmts: &mut [Stmt]) {
    for stmt in stmts {
        match stmt {
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::For { body, .. } => {
                if body.first() != Some(&Stmt::CheckLoop) {
                    body.insert(0, Stmt::CheckLoop);
                }
                inject_into_stmts(&mut body[1..]);
            }
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                inject_into_stmts(then_body);
                inject_into_stmts(else_body);
            }
            Stmt::Block { body } => inject_into_stmts(body),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------
// Pass: recursion protection
// ---------------------------------------------------------------------

fn guard_call_depth(program: &mut Program) {
    for func in &mut program.functions {
        func.depth_guarded = true;
    }
    for state in &mut program.states {
        for handler in &mut state.handlers {
            handler.depth_guarded = true;
        }
    }
}

// ---------------------------------------------------------------------
// Pass: global blocklist
// ---------------------------------------------------------------------

fn apply_blocklist(program: &mut Program, warnings: &mut Vec<Diagnostic>) {
    let mut blocked: Vec<String> = Vec::new();
    program.for_each_body_mut(|body| {
        for stmt in body.iter_mut() {
            rewrite_stmt_exprs(stmt, &mut |expr| {
                if let Expr::Var { name, .. } = expr
                    && is_blocked(name)
                {
                    blocked.push(name.clone());
                    *expr = Expr::Todo { name: name.clone() };
                }
            });
        }
    });
    for global in &mut program.globals {
        if let Some(init) = &mut global.init {
            rewrite_expr(init, &mut |expr| {
                if let Expr::Var { name, .. } = expr
                    && is_blocked(name)
                {
                    blocked.push(name.clone());
                    *expr = Expr::Todo { name: name.clone() };
                }
            });
        }
    }
    for name in blocked {
        warn!(target: "sandbox", identifier = %name, "blocked identifier neutralized");
        warnings.push(Diagnostic::warning(format!(
            "identifier `{name}` is blocked inside the sandbox"
        )));
    }
}

// ---------------------------------------------------------------------
// Pass: module lowering
// ---------------------------------------------------------------------

fn lower_module(program: &mut Program, warnings: &mut Vec<Diagnostic>) {
    for import in std::mem::take(&mut program.imports) {
        warnings.push(Diagnostic::note(format!(
            "import `{import}` stripped; provided as an endowment"
        )));
        if !program.endowments.contains(&import) {
            program.endowments.push(import);
        }
    }
    program.entry = Some(program.class_name.clone());
}

// ---------------------------------------------------------------------
// In-place expression rewriting
// ---------------------------------------------------------------------

fn rewrite_stmt_exprs(stmt: &mut Stmt, f: &mut impl FnMut(&mut Expr)) {
    match stmt {
        Stmt::Let { init, .. } => {
            if let Some(e) = init {
                rewrite_expr(e, f);
            }
        }
        Stmt::Expr { expr } => rewrite_expr(expr, f),
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            rewrite_expr(cond, f);
            for s in then_body {
                rewrite_stmt_exprs(s, f);
            }
            for s in else_body {
                rewrite_stmt_exprs(s, f);
            }
        }
        Stmt::While { cond, body } => {
            rewrite_expr(cond, f);
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        Stmt::DoWhile { body, cond } => {
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
            rewrite_expr(cond, f);
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
        } => {
            for e in init {
                rewrite_expr(e, f);
            }
            if let Some(c) = cond {
                rewrite_expr(c, f);
            }
            for e in update {
                rewrite_expr(e, f);
            }
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        Stmt::Return { value } => {
            if let Some(e) = value {
                rewrite_expr(e, f);
            }
        }
        Stmt::Block { body } => {
            for s in body {
                rewrite_stmt_exprs(s, f);
            }
        }
        Stmt::StateChange { .. } | Stmt::Break | Stmt::Empty | Stmt::CheckLoop => {}
    }
}

fn rewrite_expr(expr: &mut Expr, f: &mut impl FnMut(&mut Expr)) {
    f(expr);
    match expr {
        Expr::Vec3 { x, y, z } => {
            rewrite_expr(x, f);
            rewrite_expr(y, f);
            rewrite_expr(z, f);
        }
        Expr::Quat { x, y, z, s } => {
            rewrite_expr(x, f);
            rewrite_expr(y, f);
            rewrite_expr(z, f);
            rewrite_expr(s, f);
        }
        Expr::ListLit { items } => {
            for item in items {
                rewrite_expr(item, f);
            }
        }
        Expr::Member { recv, .. } => rewrite_expr(recv, f),
        Expr::Binary { lhs, rhs, .. } => {
            rewrite_expr(lhs, f);
            rewrite_expr(rhs, f);
        }
        Expr::Unary { operand, .. } => rewrite_expr(operand, f),
        Expr::MethodCall { recv, args, .. } => {
            rewrite_expr(recv, f);
            for a in args {
                rewrite_expr(a, f);
            }
        }
        Expr::ApiCall { args, .. }
        | Expr::HelperCall { args, .. }
        | Expr::CallUser { args, .. } => {
            for a in args {
                rewrite_expr(a, f);
            }
        }
        Expr::Detected { index, .. } => rewrite_expr(index, f),
        Expr::Await { inner } => rewrite_expr(inner, f),
        Expr::Assign { value, .. } => rewrite_expr(value, f),
        Expr::Cast { operand, .. } => rewrite_expr(operand, f),
        Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Key { .. }
        | Expr::Var { .. }
        | Expr::IncDec { .. }
        | Expr::ApiProperty { .. }
        | Expr::Todo { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ir::visit_exprs;
    use core_transpile::{transpile, TranspileOptions};
    use pretty_assertions::assert_eq;

    fn harden(source: &str) -> (Program, Vec<Diagnostic>) {
        let out = transpile(source, &TranspileOptions::default()).expect("transpile");
        assert!(!out.has_errors(), "{:?}", out.diagnostics);
        let result = transform(&out.program.to_canonical()).expect("transform");
        (
            Program::parse_canonical(&result.text).expect("hardened text parses"),
            result.warnings,
        )
    }

    #[test]
    fn rejects_invalid_intermediate() {
        assert!(matches!(
            transform("not json at all"),
            Err(SandboxError::Parse(_))
        ));
    }

    #[test]
    fn injects_check_loop_into_every_loop_body() {
        let (program, _) = harden(
            r#"
default {
    state_entry() {
        integer i;
        while (1) { i++; }
        do i--; while (i > 0);
        for (i = 0; i < 10; i++) llSay(0, "x");
    }
}
"#,
        );
        let body = &program.state("default").unwrap().handlers[0].body;
        let mut loop_bodies = 0;
        fn check(stmts: &[Stmt], loop_bodies: &mut usize) {
            for stmt in stmts {
                match stmt {
                    Stmt::While { body, .. }
                    | Stmt::DoWhile { body, .. }
                    | Stmt::For { body, .. } => {
                        assert_eq!(body.first(), Some(&Stmt::CheckLoop));
                        *loop_bodies += 1;
                        check(&body[1..], loop_bodies);
                    }
                    Stmt::If {
                        then_body,
                        else_body,
                        ..
                    } => {
                        check(then_body, loop_bodies);
                        check(else_body, loop_bodies);
                    }
                    Stmt::Block { body } => check(body, loop_bodies),
                    _ => {}
                }
            }
        }
        check(body, &mut loop_bodies);
        assert_eq!(loop_bodies, 3);
    }

    #[test]
    fn single_statement_loop_bodies_are_guarded() {
        // `while (1) i++;` has a one-statement body; the check still lands
        // in front of it.
        let (program, _) = harden(
            "default { state_entry() { integer i; while (1) i++; } }",
        );
        let body = &program.state("default").unwrap().handlers[0].body;
        match &body[1] {
            Stmt::While { body, .. } => {
                assert_eq!(body.len(), 2);
                assert_eq!(body[0], Stmt::CheckLoop);
            }
            other => panic!("expected while, got {other:?}"),
        }
    }

    #[test]
    fn nested_loops_each_get_a_check() {
        let (program, _) = harden(
            "default { state_entry() { integer i; integer j; while (i) { while (j) { j--; } i--; } } }",
        );
        let body = &program.state("default").unwrap().handlers[0].body;
        match &body[2] {
            Stmt::While { body: outer, .. } => {
                assert_eq!(outer[0], Stmt::CheckLoop);
                match &outer[1] {
                    Stmt::While { body: inner, .. } => assert_eq!(inner[0], Stmt::CheckLoop),
                    other => panic!("expected inner while, got {other:?}"),
                }
            }
            other => panic!("expected outer while, got {other:?}"),
        }
    }

    #[test]
    fn transform_is_idempotent() {
        let out = transpile(
            "default { state_entry() { integer i; while (1) i++; } }",
            &TranspileOptions::default(),
        )
        .unwrap();
        let once = transform(&out.program.to_canonical()).unwrap();
        let twice = transform(&once.text).unwrap();
        assert_eq!(once.text, twice.text);
    }

    #[test]
    fn functions_and_handlers_are_depth_guarded() {
        let (program, _) = harden(
            r#"
recurse() { recurse(); }
default { state_entry() { recurse(); } }
"#,
        );
        assert!(program.function("recurse").unwrap().depth_guarded);
        assert!(program.state("default").unwrap().handlers[0].depth_guarded);
    }

    #[test]
    fn blocked_identifiers_are_neutralized_and_reported() {
        // `eval` is not a declared variable, so the emitter lowers it to a
        // bare local reference — exactly the shape the blocklist hunts.
        let out = transpile(
            "default { state_entry() { llOwnerSay((string)eval); } }",
            &TranspileOptions::default(),
        )
        .unwrap();
        let result = transform(&out.program.to_canonical()).unwrap();
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.message.contains("`eval` is blocked"))
        );
        let hardened = Program::parse_canonical(&result.text).unwrap();
        let mut bare = 0;
        hardened.for_each_body(|body| {
            visit_exprs(body, &mut |e| {
                if let Expr::Var { name, .. } = e
                    && is_blocked(name)
                {
                    bare += 1;
                }
            });
        });
        assert_eq!(bare, 0, "no bare blocked identifiers may survive");
    }

    #[test]
    fn module_lowering_strips_imports_into_endowments() {
        let (program, warnings) = harden(
            "default { state_entry() { vector v = <1,2,3>; } }",
        );
        assert!(program.imports.is_empty());
        assert_eq!(program.endowments, vec!["Vec3".to_string()]);
        assert_eq!(program.entry.as_deref(), Some("Script"));
        assert!(
            warnings
                .iter()
                .any(|w| w.message.contains("import `Vec3` stripped"))
        );
    }
}
