//! core-transpile: legacy source → executable intermediate.
//!
//! The pipeline is parse (core-syntax) → resolve/track/emit (this crate)
//! → [`core_ir::Program`]. The transpiler is best-effort: it returns a
//! program plus a diagnostic list, and the caller decides whether
//! error-severity diagnostics reject the script.

pub mod codegen;
pub mod constants;
pub mod resolver;
pub mod tracker;

use core_ir::Program;
use core_syntax::diagnostics::Diagnostic;
use core_syntax::parser::{self, ParseMode};
use thiserror::Error;
use tracing::info;

pub use codegen::handler_method_name;
pub use resolver::{resolve, Resolution, Resolved, Special};

#[derive(Debug, Error)]
pub enum TranspileError {
    #[error(transparent)]
    Parse(#[from] core_syntax::parser::ParseError),
}

#[derive(Debug, Clone, Default)]
pub struct TranspileOptions {
    /// Source file name for diagnostics.
    pub file: Option<String>,
    /// Override the emitted class name (otherwise derived from `file`).
    pub class_name: Option<String>,
    pub mode: ParseMode,
}

#[derive(Debug, Clone)]
pub struct TranspileOutput {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

impl TranspileOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }
}

/// `door_lock.lsl` → `DoorLock`; anything unusable falls back to `Script`.
fn derive_class_name(file: Option<&str>) -> String {
    let Some(file) = file else {
        return "Script".to_string();
    };
    let stem = std::path::Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Script");
    let mut out = String::new();
    for part in stem.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() || out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return "Script".to_string();
    }
    out
}

/// Transpile one source file into an intermediate program.
///
/// Lex/parse errors in `Collect` mode surface as error diagnostics in the
/// output; only unrecoverable lexing failures (and any error at all in
/// `FailFast` mode) return `Err`.
pub fn transpile(source: &str, options: &TranspileOptions) -> Result<TranspileOutput, TranspileError> {
    let outcome = parser::parse_with(source, options.file.as_deref(), options.mode)?;
    let class_name = options
        .class_name
        .clone()
        .unwrap_or_else(|| derive_class_name(options.file.as_deref()));
    let generator = codegen::CodeGen::new(&outcome.script, options.file.clone());
    let (program, mut gen_diags) = generator.generate(&class_name);
    let mut diagnostics = outcome.diagnostics;
    diagnostics.append(&mut gen_diags);
    info!(
        target: "transpile",
        class = %program.class_name,
        diagnostics = diagnostics.len(),
        errors = diagnostics.iter().filter(|d| d.is_error()).count(),
        "transpile complete"
    );
    Ok(TranspileOutput {
        program,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ir::{visit_exprs, Expr, Stmt, VarScope};
    use pretty_assertions::assert_eq;

    fn transpile_ok(source: &str) -> TranspileOutput {
        let out = transpile(source, &TranspileOptions::default()).expect("transpile");
        assert!(!out.has_errors(), "diagnostics: {:?}", out.diagnostics);
        out
    }

    #[test]
    fn class_name_derivation() {
        assert_eq!(derive_class_name(Some("door_lock.lsl")), "DoorLock");
        assert_eq!(derive_class_name(Some("collar.lsl")), "Collar");
        assert_eq!(derive_class_name(Some("7seas.lsl")), "Script");
        assert_eq!(derive_class_name(None), "Script");
    }

    #[test]
    fn emits_state_and_handler_with_template_signature() {
        let out = transpile_ok(
            r#"
default {
    touch_start(integer total) {
        llSay(0, "touched");
    }
}
"#,
        );
        let state = out.program.state("default").unwrap();
        let handler = &state.handlers[0];
        assert_eq!(handler.method, "onTouchStart");
        assert_eq!(handler.params, vec!["agent".to_string(), "face".to_string()]);
        // Legacy count parameter is bound from the detected array.
        match &handler.body[0] {
            Stmt::Let { name, init, .. } => {
                assert_eq!(name, "total");
                assert!(matches!(
                    init,
                    Some(Expr::HelperCall { helper, .. }) if helper == "detected.count"
                ));
            }
            other => panic!("expected count binding, got {other:?}"),
        }
    }

    #[test]
    fn detected_usage_sets_handler_bit() {
        let out = transpile_ok(
            r#"
default {
    touch_start(integer total) {
        key who = llDetectedKey(0);
        llSay(0, (string)who);
    }
    touch_end(integer total) {
        llSay(0, "done");
    }
}
"#,
        );
        let state = out.program.state("default").unwrap();
        assert!(state.handlers[0].uses_detected);
        assert!(!state.handlers[1].uses_detected);
    }

    #[test]
    fn async_fixpoint_propagates_through_user_calls() {
        let out = transpile_ok(
            r#"
ping() {
    llOwnerSay("ping");
}
nap() {
    llSleep(1.0);
}
wrapper() {
    nap();
}
deep() {
    wrapper();
}
default {
    state_entry() {
        deep();
    }
}
"#,
        );
        let p = &out.program;
        assert!(!p.function("ping").unwrap().is_async);
        assert!(p.function("nap").unwrap().is_async);
        assert!(p.function("wrapper").unwrap().is_async);
        assert!(p.function("deep").unwrap().is_async);
        // The call site in the handler is awaited.
        let handler = &p.state("default").unwrap().handlers[0];
        assert!(matches!(
            &handler.body[0],
            Stmt::Expr {
                expr: Expr::Await { .. }
            }
        ));
    }

    #[test]
    fn constants_inline_and_mark_imports() {
        let out = transpile_ok(
            r#"
vector home = ZERO_VECTOR;
default {
    state_entry() {
        llSetPos(home + <0, 0, 1>);
    }
}
"#,
        );
        assert!(out.program.imports.contains(&"Vec3".to_string()));
        assert!(matches!(
            &out.program.globals[0].init,
            Some(Expr::Vec3 { .. })
        ));
    }

    #[test]
    fn vector_addition_lowers_to_method_call() {
        let out = transpile_ok(
            r#"
default {
    state_entry() {
        vector a = <1,0,0>;
        vector b = <0,1,0>;
        vector c = a + b;
        vector d = a * 2;
        vector e = 2 * a;
        vector f = a / 4;
    }
}
"#,
        );
        let body = &out.program.state("default").unwrap().handlers[0].body;
        let method_of = |stmt: &Stmt| -> String {
            match stmt {
                Stmt::Let {
                    init: Some(Expr::MethodCall { method, .. }),
                    ..
                } => method.clone(),
                other => panic!("expected method call init, got {other:?}"),
            }
        };
        assert_eq!(method_of(&body[2]), "add");
        assert_eq!(method_of(&body[3]), "scale");
        assert_eq!(method_of(&body[4]), "scale");
        assert_eq!(method_of(&body[5]), "scale"); // 1/x synthetic inverse
    }

    #[test]
    fn quaternion_multiply_keeps_operand_order() {
        let out = transpile_ok(
            r#"
default {
    state_entry() {
        rotation a = <0,0,0,1>;
        rotation b = <0,0,0,1>;
        rotation c = a * b;
    }
}
"#,
        );
        let body = &out.program.state("default").unwrap().handlers[0].body;
        match &body[2] {
            Stmt::Let {
                init: Some(Expr::MethodCall { recv, method, args }),
                ..
            } => {
                assert_eq!(method, "multiply");
                assert!(matches!(recv.as_ref(), Expr::Var { name, .. } if name == "a"));
                assert!(matches!(&args[0], Expr::Var { name, .. } if name == "b"));
            }
            other => panic!("expected multiply, got {other:?}"),
        }
    }

    #[test]
    fn globals_are_qualified_and_locals_are_not() {
        let out = transpile_ok(
            r#"
integer total = 0;
default {
    state_entry() {
        integer local = 1;
        total = total + local;
    }
}
"#,
        );
        let body = &out.program.state("default").unwrap().handlers[0].body;
        match &body[1] {
            Stmt::Expr {
                expr: Expr::Assign { target, value },
            } => {
                assert_eq!(target.scope, VarScope::Global);
                let mut scopes = Vec::new();
                core_ir::visit_expr(value, &mut |e| {
                    if let Expr::Var { name, scope } = e {
                        scopes.push((name.clone(), *scope));
                    }
                });
                assert_eq!(
                    scopes,
                    vec![
                        ("total".to_string(), VarScope::Global),
                        ("local".to_string(), VarScope::Local)
                    ]
                );
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn state_change_and_jump_lowering() {
        let out = transpile(
            r#"
default {
    touch_start(integer n) {
        jump skip;
        state running;
        @skip;
    }
}
state running {
    state_entry() { }
}
"#,
            &TranspileOptions::default(),
        )
        .unwrap();
        let body = &out.program.state("default").unwrap().handlers[0].body;
        assert!(matches!(&body[0], Stmt::Break));
        assert!(matches!(&body[1], Stmt::StateChange { state } if state == "running"));
        assert!(matches!(&body[2], Stmt::Empty));
        assert!(
            out.diagnostics
                .iter()
                .any(|d| d.message.contains("no structured equivalent"))
        );
    }

    #[test]
    fn unmapped_builtin_emits_todo_and_warns() {
        let out = transpile(
            "default { state_entry() { llCastRay(ZERO_VECTOR, ZERO_VECTOR, []); } }",
            &TranspileOptions::default(),
        )
        .unwrap();
        let body = &out.program.state("default").unwrap().handlers[0].body;
        let mut saw_todo = false;
        visit_exprs(body, &mut |e| {
            if matches!(e, Expr::Todo { name } if name == "llCastRay") {
                saw_todo = true;
            }
        });
        assert!(saw_todo);
        assert!(out.diagnostics.iter().any(|d| d.message.contains("not mapped")));
    }

    #[test]
    fn sleep_divergence_noted_once() {
        let out = transpile(
            r#"
default {
    state_entry() {
        llSleep(1.0);
        llSleep(2.0);
    }
}
"#,
            &TranspileOptions::default(),
        )
        .unwrap();
        let notes = out
            .diagnostics
            .iter()
            .filter(|d| d.message.contains("peer scripts keep running"))
            .count();
        assert_eq!(notes, 1);
    }

    #[test]
    fn inclusive_end_substring_uses_host_helper() {
        let out = transpile_ok(
            r#"
default {
    state_entry() {
        string s = llGetSubString("hello", 1, -2);
        string t = llDeleteSubString(s, 0, 1);
    }
}
"#,
        );
        assert!(out.program.imports.contains(&"lslGetSubString".to_string()));
        assert!(
            out.program
                .imports
                .contains(&"lslDeleteSubString".to_string())
        );
        let body = &out.program.state("default").unwrap().handlers[0].body;
        assert!(matches!(
            &body[0],
            Stmt::Let {
                init: Some(Expr::HelperCall { helper, .. }),
                ..
            } if helper == "lslGetSubString"
        ));
    }

    #[test]
    fn listen_parameters_adopt_legacy_names() {
        let out = transpile_ok(
            r#"
default {
    listen(integer ch, string who, key id, string msg) {
        llSay(ch, msg);
    }
}
"#,
        );
        let handler = &out.program.state("default").unwrap().handlers[0];
        assert_eq!(handler.method, "onListen");
        assert_eq!(
            handler.params,
            vec!["ch".to_string(), "who".into(), "id".into(), "msg".into()]
        );
    }

    #[test]
    fn reemitted_canonical_text_reparses() {
        let out = transpile_ok(
            r#"
integer n = 3;
default {
    state_entry() {
        while (n > 0) {
            n--;
        }
    }
}
"#,
        );
        let text = out.program.to_canonical();
        let back = core_ir::Program::parse_canonical(&text).expect("canonical reparse");
        assert_eq!(out.program, back);
    }

    #[test]
    fn parse_errors_surface_as_diagnostics() {
        let out = transpile(
            "integer broken = ;\ndefault { state_entry() { } }",
            &TranspileOptions::default(),
        )
        .unwrap();
        assert!(out.has_errors());
        assert_eq!(out.program.states.len(), 1);
    }
}
