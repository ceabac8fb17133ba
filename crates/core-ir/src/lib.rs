//! core-ir: the executable intermediate representation.
//!
//! The code generator lowers a parsed script into one [`Program`] — the
//! equivalent of a generated class: globals become fields, user functions
//! become methods, states become named handler groups. The program is a
//! plain serializable tree so it can cross the worker boundary and be
//! re-parsed by the sandbox transform.
//!
//! Canonical encoding contract:
//! - `Program::to_canonical()` is deterministic (stable field order, no
//!   maps with unordered keys);
//! - `Program::parse_canonical(to_canonical())` round-trips to an equal
//!   value for every program the emitter produces.
//!
//! Sandbox instrumentation (`CheckLoop`, call-depth accounting) is carried
//! as ordinary statement forms so the interpreter needs no side tables.

use core_syntax::LslType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("intermediate parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Scope of a variable reference. `Global` references are the lowered form
/// of field access on the script instance; `Local` covers parameters and
/// block-scoped declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarScope {
    Global,
    Local,
}

/// Vector/rotation component used by member reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    X,
    Y,
    Z,
    S,
}

impl Component {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "x" => Component::X,
            "y" => Component::Y,
            "z" => Component::Z,
            "s" => Component::S,
            _ => return None,
        })
    }
}

/// Raw binary operators that survive lowering (everything the type
/// tracker did not rewrite into a method call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// Assignment / member-write target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub scope: VarScope,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub component: Option<Component>,
}

impl Target {
    pub fn var(name: impl Into<String>, scope: VarScope) -> Self {
        Self {
            name: name.into(),
            scope,
            component: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Expr {
    Int {
        value: i32,
    },
    Float {
        value: f64,
    },
    Str {
        value: String,
    },
    Key {
        value: String,
    },
    Vec3 {
        x: Box<Expr>,
        y: Box<Expr>,
        z: Box<Expr>,
    },
    Quat {
        x: Box<Expr>,
        y: Box<Expr>,
        z: Box<Expr>,
        s: Box<Expr>,
    },
    ListLit {
        items: Vec<Expr>,
    },
    Var {
        name: String,
        scope: VarScope,
    },
    Member {
        recv: Box<Expr>,
        component: Component,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// Overload lowering from the type tracker: `add`, `sub`, `scale`,
    /// `multiply`, `rotateBy`, `negate` on vector/rotation operands.
    MethodCall {
        recv: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Host-mediated builtin: crosses the worker boundary as an api-call.
    ApiCall {
        method: String,
        args: Vec<Expr>,
    },
    /// Attribute-style builtin with no arguments (mirrored object state).
    ApiProperty {
        path: String,
    },
    /// Pure helper evaluated inside the VM (math, inclusive-end string
    /// ops, list utilities).
    HelperCall {
        helper: String,
        args: Vec<Expr>,
    },
    /// Indexed access into the per-event detected-info array.
    Detected {
        index: Box<Expr>,
        field: String,
    },
    /// Call to a user-defined global function (a method on the instance).
    CallUser {
        name: String,
        args: Vec<Expr>,
    },
    /// Suspension point: the wrapped call is asynchronous.
    Await {
        inner: Box<Expr>,
    },
    Assign {
        target: Target,
        value: Box<Expr>,
    },
    /// `++i` / `i--` — kept intact because pre/post value semantics
    /// differ in expression position.
    IncDec {
        target: Target,
        delta: i32,
        pre: bool,
    },
    Cast {
        ty: LslType,
        operand: Box<Expr>,
    },
    /// Unmapped builtin placeholder. Executing it raises a runtime error
    /// naming the original function.
    Todo {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Stmt {
    Let {
        name: String,
        ty: LslType,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        init: Option<Expr>,
    },
    Expr {
        expr: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
    },
    For {
        init: Vec<Expr>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        cond: Option<Expr>,
        update: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Return {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        value: Option<Expr>,
    },
    /// Transition to another state, then unwind the current handler.
    StateChange {
        state: String,
    },
    /// Best-effort lowering of `jump`: breaks the innermost loop.
    Break,
    Block {
        body: Vec<Stmt>,
    },
    Empty,
    /// Injected by the sandbox transform as the first statement of every
    /// loop body; bumps the per-invocation iteration counter.
    CheckLoop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSlot {
    pub name: String,
    pub ty: LslType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    /// True when this function (transitively) invokes an async builtin.
    pub is_async: bool,
    /// True once the sandbox transform wrapped the body in call-depth
    /// accounting.
    #[serde(default)]
    pub depth_guarded: bool,
}

/// One event handler inside a state. Handlers are unconditionally async.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    /// Source event name (`touch_start`, `listen`, ...).
    pub event: String,
    /// Emitted method name (`onTouchStart`, `onListen`, ...).
    pub method: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    /// Whether the emitted parameter list carries the detected array.
    pub uses_detected: bool,
    #[serde(default)]
    pub depth_guarded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBlock {
    pub name: String,
    pub handlers: Vec<Handler>,
}

/// The emitted unit: one program per source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub class_name: String,
    /// Runtime imports recorded by the emitter's scan pass. The sandbox
    /// transform strips these into `endowments`.
    pub imports: Vec<String>,
    /// Filled by the sandbox transform's module lowering.
    #[serde(default)]
    pub endowments: Vec<String>,
    /// Entry class after module lowering; `None` until lowered.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entry: Option<String>,
    pub globals: Vec<GlobalSlot>,
    pub functions: Vec<Function>,
    pub states: Vec<StateBlock>,
}

impl Program {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            imports: Vec::new(),
            endowments: Vec::new(),
            entry: None,
            globals: Vec::new(),
            functions: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Deterministic canonical text form — the "emitted intermediate"
    /// handed to the sandbox transform and shipped to workers.
    pub fn to_canonical(&self) -> String {
        serde_json::to_string(self).expect("IR trees contain no unserializable values")
    }

    pub fn parse_canonical(text: &str) -> Result<Program, CanonicalError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn state(&self, name: &str) -> Option<&StateBlock> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Visit every top-level body (each function and each handler) for
    /// in-place transformation.
    pub fn for_each_body_mut(&mut self, mut f: impl FnMut(&mut Vec<Stmt>)) {
        for func in &mut self.functions {
            f(&mut func.body);
        }
        for state in &mut self.states {
            for handler in &mut state.handlers {
                f(&mut handler.body);
            }
        }
    }

    /// Visit every body immutably (analysis passes, tests).
    pub fn for_each_body(&self, mut f: impl FnMut(&[Stmt])) {
        for func in &self.functions {
            f(&func.body);
        }
        for state in &self.states {
            for handler in &state.handlers {
                f(&handler.body);
            }
        }
    }
}

/// Walk all expressions in a statement list, depth-first.
pub fn visit_exprs(stmts: &[Stmt], f: &mut impl FnMut(&Expr)) {
    for stmt in stmts {
        visit_stmt_exprs(stmt, f);
    }
}

fn visit_stmt_exprs(stmt: &Stmt, f: &mut impl FnMut(&Expr)) {
    match stmt {
        Stmt::Let { init, .. } => {
            if let Some(e) = init {
                visit_expr(e, f);
            }
        }
        Stmt::Expr { expr } => visit_expr(expr, f),
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            visit_expr(cond, f);
            visit_exprs(then_body, f);
            visit_exprs(else_body, f);
        }
        Stmt::While { cond, body } => {
            visit_expr(cond, f);
            visit_exprs(body, f);
        }
        Stmt::DoWhile { body, cond } => {
            visit_exprs(body, f);
            visit_expr(cond, f);
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
        } => {
            for e in init {
                visit_expr(e, f);
            }
            if let Some(c) = cond {
                visit_expr(c, f);
            }
            for e in update {
                visit_expr(e, f);
            }
            visit_exprs(body, f);
        }
        Stmt::Return { value } => {
            if let Some(e) = value {
                visit_expr(e, f);
            }
        }
        Stmt::Block { body } => visit_exprs(body, f),
        Stmt::StateChange { .. } | Stmt::Break | Stmt::Empty | Stmt::CheckLoop => {}
    }
}

pub fn visit_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match expr {
        Expr::Vec3 { x, y, z } => {
            visit_expr(x, f);
            visit_expr(y, f);
            visit_expr(z, f);
        }
        Expr::Quat { x, y, z, s } => {
            visit_expr(x, f);
            visit_expr(y, f);
            visit_expr(z, f);
            visit_expr(s, f);
        }
        Expr::ListLit { items } => {
            for item in items {
                visit_expr(item, f);
            }
        }
        Expr::Member { recv, .. } => visit_expr(recv, f),
        Expr::Binary { lhs, rhs, .. } => {
            visit_expr(lhs, f);
            visit_expr(rhs, f);
        }
        Expr::Unary { operand, .. } => visit_expr(operand, f),
        Expr::MethodCall { recv, args, .. } => {
            visit_expr(recv, f);
            for a in args {
                visit_expr(a, f);
            }
        }
        Expr::ApiCall { args, .. }
        | Expr::HelperCall { args, .. }
        | Expr::CallUser { args, .. } => {
            for a in args {
                visit_expr(a, f);
            }
        }
        Expr::Detected { index, .. } => visit_expr(index, f),
        Expr::Await { inner } => visit_expr(inner, f),
        Expr::Assign { value, .. } => visit_expr(value, f),
        Expr::Cast { operand, .. } => visit_expr(operand, f),
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
    use pretty_assertions::assert_eq;

    fn sample_program() -> Program {
        let mut program = Program::new("DoorScript");
        program.imports = vec!["Vec3".into(), "lslSubstring".into()];
        program.globals.push(GlobalSlot {
            name: "count".into(),
            ty: LslType::Integer,
            init: Some(Expr::Int { value: 0 }),
        });
        program.functions.push(Function {
            name: "announce".into(),
            params: vec!["message".into()],
            body: vec![Stmt::Expr {
                expr: Expr::ApiCall {
                    method: "world.say".into(),
                    args: vec![
                        Expr::Int { value: 0 },
                        Expr::Var {
                            name: "message".into(),
                            scope: VarScope::Local,
                        },
                    ],
                },
            }],
            is_async: false,
            depth_guarded: false,
        });
        program.states.push(StateBlock {
            name: "default".into(),
            handlers: vec![Handler {
                event: "touch_start".into(),
                method: "onTouchStart".into(),
                params: vec!["agent".into(), "face".into()],
                body: vec![Stmt::While {
                    cond: Expr::Int { value: 1 },
                    body: vec![Stmt::Expr {
                        expr: Expr::IncDec {
                            target: Target::var("count", VarScope::Global),
                            delta: 1,
                            pre: false,
                        },
                    }],
                }],
                uses_detected: true,
                depth_guarded: false,
            }],
        });
        program
    }

    #[test]
    fn canonical_round_trip_is_identity() {
        let program = sample_program();
        let text = program.to_canonical();
        let reparsed = Program::parse_canonical(&text).expect("canonical text must re-parse");
        assert_eq!(program, reparsed);
    }

    #[test]
    fn canonical_is_deterministic() {
        let program = sample_program();
        assert_eq!(program.to_canonical(), program.to_canonical());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Program::parse_canonical("class Door {").is_err());
    }

    #[test]
    fn body_visitor_covers_functions_and_handlers() {
        let program = sample_program();
        let mut bodies = 0;
        program.for_each_body(|_| bodies += 1);
        assert_eq!(bodies, 2);
    }

    #[test]
    fn expr_visitor_reaches_nested_nodes() {
        let program = sample_program();
        let mut var_names = Vec::new();
        program.for_each_body(|body| {
            visit_exprs(body, &mut |e| {
                if let Expr::Var { name, .. } = e {
                    var_names.push(name.clone());
                }
            });
        });
        assert_eq!(var_names, vec!["message".to_string()]);
    }
}
