//! Type tracker: per-scope symbol table driving operator-overload
//! dispatch during code generation.
//!
//! Arithmetic on vectors and rotations lowers to method calls; everything
//! else keeps the raw operator. Dispatch only needs the operand types, so
//! the tracker does shallow structural inference — it never solves
//! constraints, and an unknown type simply falls back to the raw operator.

use crate::{constants, resolver};
use core_syntax::ast::{BinaryOp, Expr, UnaryOp};
use core_syntax::LslType;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TypeTracker {
    /// Innermost scope last. Globals live at the bottom.
    scopes: Vec<HashMap<String, LslType>>,
}

impl TypeTracker {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "global scope must stay");
        self.scopes.pop();
    }

    pub fn declare(&mut self, name: impl Into<String>, ty: LslType) {
        self.scopes
            .last_mut()
            .expect("tracker always has a scope")
            .insert(name.into(), ty);
    }

    pub fn declare_global(&mut self, name: impl Into<String>, ty: LslType) {
        self.scopes[0].insert(name.into(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<LslType> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// True when the name is bound anywhere above the global scope.
    pub fn is_local(&self, name: &str) -> bool {
        self.scopes[1..]
            .iter()
            .rev()
            .any(|scope| scope.contains_key(name))
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.scopes[0].contains_key(name)
    }

    /// Shallow structural inference over the source AST.
    pub fn infer(&self, expr: &Expr) -> Option<LslType> {
        match expr {
            Expr::IntLit { .. } => Some(LslType::Integer),
            Expr::FloatLit { .. } => Some(LslType::Float),
            Expr::StrLit { .. } => Some(LslType::String),
            Expr::VectorLit { .. } => Some(LslType::Vector),
            Expr::RotationLit { .. } => Some(LslType::Rotation),
            Expr::ListLit { .. } => Some(LslType::List),
            Expr::Ident { name, .. } => self
                .lookup(name)
                .or_else(|| constants::lookup(name).map(|c| c.ty())),
            Expr::Member { .. } => Some(LslType::Float),
            Expr::Cast { ty, .. } => Some(*ty),
            Expr::Assign { target, .. } => self.infer(target),
            Expr::Call { name, .. } => resolver::resolve(name).and_then(|r| r.returns),
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Not | UnaryOp::BitNot => Some(LslType::Integer),
                UnaryOp::Neg => self.infer(operand),
                UnaryOp::PreIncr | UnaryOp::PreDecr | UnaryOp::PostIncr | UnaryOp::PostDecr => {
                    self.infer(operand)
                }
            },
            Expr::Binary { op, lhs, rhs, .. } => self.infer_binary(*op, lhs, rhs),
        }
    }

    fn infer_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<LslType> {
        use BinaryOp::*;
        match op {
            Eq | Ne | Lt | Gt | Le | Ge | And | Or | BitAnd | BitOr | BitXor | Shl | Shr => {
                Some(LslType::Integer)
            }
            Add | Sub | Mul | Div | Rem => {
                let lt = self.infer(lhs);
                let rt = self.infer(rhs);
                match (lt, rt) {
                    (Some(LslType::Vector), Some(LslType::Vector)) => match op {
                        Mul => Some(LslType::Float), // dot product
                        _ => Some(LslType::Vector),
                    },
                    (Some(LslType::Vector), _) | (_, Some(LslType::Vector)) => {
                        Some(LslType::Vector)
                    }
                    (Some(LslType::Rotation), _) => Some(LslType::Rotation),
                    (Some(LslType::String), _) => Some(LslType::String),
                    (Some(LslType::List), _) | (_, Some(LslType::List)) => Some(LslType::List),
                    (Some(LslType::Float), _) | (_, Some(LslType::Float)) => Some(LslType::Float),
                    (Some(LslType::Integer), Some(LslType::Integer)) => Some(LslType::Integer),
                    _ => None,
                }
            }
        }
    }
}

/// How a binary expression lowers once operand types are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryLowering {
    /// Keep the raw operator.
    Raw,
    /// `lhs.method(rhs)`.
    Method { method: &'static str },
    /// `rhs.method(lhs)` — commutative dispatch for `scalar * vector`.
    MethodSwapped { method: &'static str },
    /// `lhs.scale(1 / rhs)` — synthetic inverse for `vector / scalar`.
    ScaleInverse,
}

fn is_scalar(ty: LslType) -> bool {
    matches!(ty, LslType::Integer | LslType::Float)
}

/// Decide the overload lowering for `lhs op rhs`.
pub fn lower_binary(
    op: BinaryOp,
    lhs_ty: Option<LslType>,
    rhs_ty: Option<LslType>,
) -> BinaryLowering {
    use BinaryOp::*;
    use LslType::{Rotation, Vector};
    let (Some(lt), Some(rt)) = (lhs_ty, rhs_ty) else {
        return BinaryLowering::Raw;
    };
    match (op, lt, rt) {
        (Add, Vector, Vector) => BinaryLowering::Method { method: "add" },
        (Sub, Vector, Vector) => BinaryLowering::Method { method: "sub" },
        (Mul, Vector, s) if is_scalar(s) => BinaryLowering::Method { method: "scale" },
        (Mul, s, Vector) if is_scalar(s) => BinaryLowering::MethodSwapped { method: "scale" },
        (Div, Vector, s) if is_scalar(s) => BinaryLowering::ScaleInverse,
        // Non-commutative; operand order must be preserved.
        (Mul, Rotation, Rotation) => BinaryLowering::Method { method: "multiply" },
        (Div, Rotation, Rotation) => BinaryLowering::Method { method: "divide" },
        (Mul, Vector, Rotation) => BinaryLowering::Method { method: "rotateBy" },
        (Div, Vector, Rotation) => BinaryLowering::Method { method: "rotateByInverse" },
        (Mul, Vector, Vector) => BinaryLowering::Method { method: "dot" },
        (Rem, Vector, Vector) => BinaryLowering::Method { method: "cross" },
        (Add, Rotation, Rotation) => BinaryLowering::Method { method: "addComponents" },
        (Sub, Rotation, Rotation) => BinaryLowering::Method { method: "subComponents" },
        _ => BinaryLowering::Raw,
    }
}

/// Whether unary `-` lowers to `.negate()` for the operand type.
pub fn negates_by_method(ty: Option<LslType>) -> bool {
    matches!(ty, Some(LslType::Vector) | Some(LslType::Rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_syntax::diagnostics::SourceLoc;

    fn ident(name: &str) -> Expr {
        Expr::Ident {
            name: name.into(),
            loc: SourceLoc::default(),
        }
    }

    fn tracker_with(vars: &[(&str, LslType)]) -> TypeTracker {
        let mut t = TypeTracker::new();
        t.push_scope();
        for (name, ty) in vars {
            t.declare(*name, *ty);
        }
        t
    }

    #[test]
    fn scope_stack_shadows_and_pops() {
        let mut t = TypeTracker::new();
        t.declare_global("x", LslType::Integer);
        t.push_scope();
        t.declare("x", LslType::Vector);
        assert_eq!(t.lookup("x"), Some(LslType::Vector));
        assert!(t.is_local("x"));
        t.pop_scope();
        assert_eq!(t.lookup("x"), Some(LslType::Integer));
        assert!(!t.is_local("x"));
        assert!(t.is_global("x"));
    }

    #[test]
    fn vector_addition_lowering() {
        let t = tracker_with(&[("a", LslType::Vector), ("b", LslType::Vector)]);
        let lt = t.infer(&ident("a"));
        let rt = t.infer(&ident("b"));
        assert_eq!(
            lower_binary(BinaryOp::Add, lt, rt),
            BinaryLowering::Method { method: "add" }
        );
    }

    #[test]
    fn commutative_scale_dispatch() {
        assert_eq!(
            lower_binary(
                BinaryOp::Mul,
                Some(LslType::Vector),
                Some(LslType::Float)
            ),
            BinaryLowering::Method { method: "scale" }
        );
        assert_eq!(
            lower_binary(
                BinaryOp::Mul,
                Some(LslType::Integer),
                Some(LslType::Vector)
            ),
            BinaryLowering::MethodSwapped { method: "scale" }
        );
    }

    #[test]
    fn vector_division_is_scale_inverse() {
        assert_eq!(
            lower_binary(BinaryOp::Div, Some(LslType::Vector), Some(LslType::Float)),
            BinaryLowering::ScaleInverse
        );
    }

    #[test]
    fn quaternion_multiply_preserves_order() {
        assert_eq!(
            lower_binary(
                BinaryOp::Mul,
                Some(LslType::Rotation),
                Some(LslType::Rotation)
            ),
            BinaryLowering::Method { method: "multiply" }
        );
    }

    #[test]
    fn vector_rotation_product_is_rotate_by() {
        assert_eq!(
            lower_binary(
                BinaryOp::Mul,
                Some(LslType::Vector),
                Some(LslType::Rotation)
            ),
            BinaryLowering::Method { method: "rotateBy" }
        );
    }

    #[test]
    fn scalar_arithmetic_stays_raw() {
        assert_eq!(
            lower_binary(BinaryOp::Add, Some(LslType::Integer), Some(LslType::Float)),
            BinaryLowering::Raw
        );
        assert_eq!(lower_binary(BinaryOp::Add, None, Some(LslType::Vector)), {
            BinaryLowering::Raw
        });
    }

    #[test]
    fn infers_builtin_return_types() {
        let t = TypeTracker::new();
        let call = Expr::Call {
            name: "llGetPos".into(),
            args: vec![],
            loc: SourceLoc::default(),
        };
        assert_eq!(t.infer(&call), Some(LslType::Vector));
    }

    #[test]
    fn negation_dispatch() {
        assert!(negates_by_method(Some(LslType::Vector)));
        assert!(negates_by_method(Some(LslType::Rotation)));
        assert!(!negates_by_method(Some(LslType::Integer)));
        assert!(!negates_by_method(None));
    }
}
