//! Runtime value model for the legacy type system.
//!
//! Seven value kinds with the legacy coercion rules: wrapping 32-bit
//! integer arithmetic, float contagion, string concatenation via the
//! legacy cast formats (6 decimals for floats, 5 for vector components),
//! list length equality for `==`, and truthiness for every type. Both
//! logical operands are always evaluated — the source language does not
//! short-circuit, and neither do we.

use crate::error::VmError;
use core_ir::{BinOp, Component, UnOp};
use core_syntax::LslType;
use nalgebra::{Quaternion, Vector3};
use serde_json::{json, Value as Json};
use std::fmt;

pub const NULL_KEY: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Float(f64),
    Str(String),
    Key(String),
    Vector(Vector3<f64>),
    Rotation(Quaternion<f64>),
    List(Vec<Value>),
}

impl Value {
    pub fn default_for(ty: LslType) -> Value {
        match ty {
            LslType::Integer => Value::Integer(0),
            LslType::Float => Value::Float(0.0),
            LslType::String => Value::Str(String::new()),
            LslType::Key => Value::Key(String::new()),
            LslType::Vector => Value::Vector(Vector3::zeros()),
            LslType::Rotation => Value::Rotation(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
            LslType::List => Value::List(Vec::new()),
        }
    }

    pub fn ty(&self) -> LslType {
        match self {
            Value::Integer(_) => LslType::Integer,
            Value::Float(_) => LslType::Float,
            Value::Str(_) => LslType::String,
            Value::Key(_) => LslType::Key,
            Value::Vector(_) => LslType::Vector,
            Value::Rotation(_) => LslType::Rotation,
            Value::List(_) => LslType::List,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            // A key is truthy only when it is a valid, non-null key.
            Value::Key(k) => !k.is_empty() && k != NULL_KEY,
            Value::Vector(v) => *v != Vector3::zeros(),
            Value::Rotation(q) => *q != Quaternion::new(1.0, 0.0, 0.0, 0.0),
            Value::List(items) => !items.is_empty(),
        }
    }

    pub fn as_float(&self) -> Result<f64, VmError> {
        match self {
            Value::Integer(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v),
            other => Err(VmError::type_mismatch("number", other.ty())),
        }
    }

    pub fn as_int(&self) -> Result<i32, VmError> {
        match self {
            Value::Integer(v) => Ok(*v),
            Value::Float(v) => Ok(*v as i32),
            other => Err(VmError::type_mismatch("integer", other.ty())),
        }
    }

    pub fn as_str(&self) -> Result<&str, VmError> {
        match self {
            Value::Str(s) | Value::Key(s) => Ok(s),
            other => Err(VmError::type_mismatch("string", other.ty())),
        }
    }

    pub fn as_vector(&self) -> Result<Vector3<f64>, VmError> {
        match self {
            Value::Vector(v) => Ok(*v),
            other => Err(VmError::type_mismatch("vector", other.ty())),
        }
    }

    pub fn as_rotation(&self) -> Result<Quaternion<f64>, VmError> {
        match self {
            Value::Rotation(q) => Ok(*q),
            other => Err(VmError::type_mismatch("rotation", other.ty())),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], VmError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(VmError::type_mismatch("list", other.ty())),
        }
    }

    pub fn component(&self, component: Component) -> Result<Value, VmError> {
        match (self, component) {
            (Value::Vector(v), Component::X) => Ok(Value::Float(v.x)),
            (Value::Vector(v), Component::Y) => Ok(Value::Float(v.y)),
            (Value::Vector(v), Component::Z) => Ok(Value::Float(v.z)),
            (Value::Rotation(q), Component::X) => Ok(Value::Float(q.i)),
            (Value::Rotation(q), Component::Y) => Ok(Value::Float(q.j)),
            (Value::Rotation(q), Component::Z) => Ok(Value::Float(q.k)),
            (Value::Rotation(q), Component::S) => Ok(Value::Float(q.w)),
            (other, _) => Err(VmError::type_mismatch("vector or rotation", other.ty())),
        }
    }

    pub fn with_component(&self, component: Component, value: f64) -> Result<Value, VmError> {
        match (self, component) {
            (Value::Vector(v), Component::X) => Ok(Value::Vector(Vector3::new(value, v.y, v.z))),
            (Value::Vector(v), Component::Y) => Ok(Value::Vector(Vector3::new(v.x, value, v.z))),
            (Value::Vector(v), Component::Z) => Ok(Value::Vector(Vector3::new(v.x, v.y, value))),
            (Value::Rotation(q), Component::X) => {
                Ok(Value::Rotation(Quaternion::new(q.w, value, q.j, q.k)))
            }
            (Value::Rotation(q), Component::Y) => {
                Ok(Value::Rotation(Quaternion::new(q.w, q.i, value, q.k)))
            }
            (Value::Rotation(q), Component::Z) => {
                Ok(Value::Rotation(Quaternion::new(q.w, q.i, q.j, value)))
            }
            (Value::Rotation(q), Component::S) => {
                Ok(Value::Rotation(Quaternion::new(value, q.i, q.j, q.k)))
            }
            (other, _) => Err(VmError::type_mismatch("vector or rotation", other.ty())),
        }
    }

    // -----------------------------------------------------------------
    // Legacy cast-to-string formats
    // -----------------------------------------------------------------

    /// Cast-to-string rendering (floats at 6 decimals, vector/rotation
    /// components at 5).
    pub fn to_lsl_string(&self) -> String {
        match self {
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => format!("{v:.6}"),
            Value::Str(s) | Value::Key(s) => s.clone(),
            Value::Vector(v) => {
                format!("<{:.5}, {:.5}, {:.5}>", v.x, v.y, v.z)
            }
            Value::Rotation(q) => {
                format!("<{:.5}, {:.5}, {:.5}, {:.5}>", q.i, q.j, q.k, q.w)
            }
            Value::List(items) => items.iter().map(|v| v.to_lsl_string()).collect(),
        }
    }

    pub fn cast(&self, ty: LslType) -> Result<Value, VmError> {
        Ok(match (self, ty) {
            (v, t) if v.ty() == t => v.clone(),
            (Value::Float(v), LslType::Integer) => Value::Integer(*v as i32),
            (Value::Integer(v), LslType::Float) => Value::Float(*v as f64),
            (Value::Str(s), LslType::Integer) | (Value::Key(s), LslType::Integer) => {
                Value::Integer(parse_integer_prefix(s))
            }
            (Value::Str(s), LslType::Float) | (Value::Key(s), LslType::Float) => {
                Value::Float(parse_float_prefix(s))
            }
            (Value::Str(s), LslType::Key) => Value::Key(s.clone()),
            (Value::Key(s), LslType::String) => Value::Str(s.clone()),
            (Value::Str(s), LslType::Vector) => {
                Value::Vector(parse_vector(s).unwrap_or_else(Vector3::zeros))
            }
            (Value::Str(s), LslType::Rotation) => Value::Rotation(
                parse_rotation(s).unwrap_or_else(|| Quaternion::new(1.0, 0.0, 0.0, 0.0)),
            ),
            (v, LslType::String) => Value::Str(v.to_lsl_string()),
            (v, LslType::List) => Value::List(vec![v.clone()]),
            (v, t) => return Err(VmError::bad_cast(v.ty(), t)),
        })
    }

    // -----------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------

    pub fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
        use BinOp::*;
        match op {
            Add => Self::add(lhs, rhs),
            Sub => Self::sub(lhs, rhs),
            Mul => Self::mul(lhs, rhs),
            Div => Self::div(lhs, rhs),
            Rem => Self::rem(lhs, rhs),
            Eq => Ok(Value::Integer(Self::loose_eq(lhs, rhs) as i32)),
            Ne => Ok(Value::Integer(!Self::loose_eq(lhs, rhs) as i32)),
            Lt => Self::compare(lhs, rhs, |o| o == std::cmp::Ordering::Less),
            Gt => Self::compare(lhs, rhs, |o| o == std::cmp::Ordering::Greater),
            Le => Self::compare(lhs, rhs, |o| o != std::cmp::Ordering::Greater),
            Ge => Self::compare(lhs, rhs, |o| o != std::cmp::Ordering::Less),
            And => Ok(Value::Integer(
                (lhs.is_truthy() && rhs.is_truthy()) as i32,
            )),
            Or => Ok(Value::Integer((lhs.is_truthy() || rhs.is_truthy()) as i32)),
            BitAnd => Ok(Value::Integer(lhs.as_int()? & rhs.as_int()?)),
            BitOr => Ok(Value::Integer(lhs.as_int()? | rhs.as_int()?)),
            BitXor => Ok(Value::Integer(lhs.as_int()? ^ rhs.as_int()?)),
            Shl => Ok(Value::Integer(
                lhs.as_int()?.wrapping_shl(rhs.as_int()? as u32 & 31),
            )),
            Shr => Ok(Value::Integer(
                lhs.as_int()?.wrapping_shr(rhs.as_int()? as u32 & 31),
            )),
        }
    }

    fn add(lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
        match (lhs, rhs) {
            (Value::List(a), Value::List(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::List(out))
            }
            (Value::List(a), b) => {
                let mut out = a.clone();
                out.push(b.clone());
                Ok(Value::List(out))
            }
            (a, Value::List(b)) => {
                let mut out = vec![a.clone()];
                out.extend(b.iter().cloned());
                Ok(Value::List(out))
            }
            (Value::Str(_), _) | (_, Value::Str(_)) | (Value::Key(_), Value::Key(_)) => {
                Ok(Value::Str(format!(
                    "{}{}",
                    lhs.to_lsl_string(),
                    rhs.to_lsl_string()
                )))
            }
            (Value::Vector(a), Value::Vector(b)) => Ok(Value::Vector(a + b)),
            (Value::Rotation(a), Value::Rotation(b)) => Ok(Value::Rotation(a + b)),
            _ => Self::arith(lhs, rhs, i32::wrapping_add, |a, b| a + b, "+"),
        }
    }

    fn sub(lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
        match (lhs, rhs) {
            (Value::Vector(a), Value::Vector(b)) => Ok(Value::Vector(a - b)),
            (Value::Rotation(a), Value::Rotation(b)) => Ok(Value::Rotation(a - b)),
            _ => Self::arith(lhs, rhs, i32::wrapping_sub, |a, b| a - b, "-"),
        }
    }

    fn mul(lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
        match (lhs, rhs) {
            (Value::Vector(a), Value::Vector(b)) => Ok(Value::Float(a.dot(b))),
            (Value::Vector(v), s @ (Value::Integer(_) | Value::Float(_))) => {
                Ok(Value::Vector(v * s.as_float()?))
            }
            (s @ (Value::Integer(_) | Value::Float(_)), Value::Vector(v)) => {
                Ok(Value::Vector(v * s.as_float()?))
            }
            (Value::Rotation(a), Value::Rotation(b)) => Ok(Value::Rotation(a * b)),
            (Value::Vector(v), Value::Rotation(q)) => Ok(Value::Vector(rotate_vector(v, q))),
            _ => Self::arith(lhs, rhs, i32::wrapping_mul, |a, b| a * b, "*"),
        }
    }

    fn div(lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
        match (lhs, rhs) {
            (Value::Vector(v), s @ (Value::Integer(_) | Value::Float(_))) => {
                let d = s.as_float()?;
                if d == 0.0 {
                    return Err(VmError::math("division by zero"));
                }
                Ok(Value::Vector(v / d))
            }
            (Value::Vector(v), Value::Rotation(q)) => {
                Ok(Value::Vector(rotate_vector(v, &quat_inverse(q))))
            }
            (Value::Rotation(a), Value::Rotation(b)) => {
                Ok(Value::Rotation(a * quat_inverse(b)))
            }
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    return Err(VmError::math("division by zero"));
                }
                Ok(Value::Integer(a.wrapping_div(*b)))
            }
            _ => {
                let d = rhs.as_float()?;
                if d == 0.0 {
                    return Err(VmError::math("division by zero"));
                }
                Ok(Value::Float(lhs.as_float()? / d))
            }
        }
    }

    fn rem(lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
        match (lhs, rhs) {
            (Value::Vector(a), Value::Vector(b)) => Ok(Value::Vector(a.cross(b))),
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    return Err(VmError::math("modulo by zero"));
                }
                Ok(Value::Integer(a.wrapping_rem(*b)))
            }
            _ => Ok(Value::Float(lhs.as_float()? % rhs.as_float()?)),
        }
    }

    fn arith(
        lhs: &Value,
        rhs: &Value,
        int_op: fn(i32, i32) -> i32,
        float_op: fn(f64, f64) -> f64,
        symbol: &str,
    ) -> Result<Value, VmError> {
        match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(int_op(*a, *b))),
            (a, b)
                if matches!(a, Value::Integer(_) | Value::Float(_))
                    && matches!(b, Value::Integer(_) | Value::Float(_)) =>
            {
                Ok(Value::Float(float_op(a.as_float()?, b.as_float()?)))
            }
            (a, b) => Err(VmError::math(format!(
                "operator `{symbol}` not defined for {} and {}",
                a.ty(),
                b.ty()
            ))),
        }
    }

    /// Legacy equality: numbers compare numerically, strings/keys by
    /// content, lists by length only.
    fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (Value::List(a), Value::List(b)) => a.len() == b.len(),
            (Value::Str(a) | Value::Key(a), Value::Str(b) | Value::Key(b)) => a == b,
            (a, b)
                if matches!(a, Value::Integer(_) | Value::Float(_))
                    && matches!(b, Value::Integer(_) | Value::Float(_)) =>
            {
                a.as_float().unwrap_or(f64::NAN) == b.as_float().unwrap_or(f64::NAN)
            }
            (a, b) => a == b,
        }
    }

    fn compare(
        lhs: &Value,
        rhs: &Value,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value, VmError> {
        let ordering = match (lhs, rhs) {
            (Value::Str(a) | Value::Key(a), Value::Str(b) | Value::Key(b)) => a.cmp(b),
            _ => lhs
                .as_float()?
                .partial_cmp(&rhs.as_float()?)
                .unwrap_or(std::cmp::Ordering::Equal),
        };
        Ok(Value::Integer(accept(ordering) as i32))
    }

    pub fn unary(op: UnOp, operand: &Value) -> Result<Value, VmError> {
        match op {
            UnOp::Neg => match operand {
                Value::Integer(v) => Ok(Value::Integer(v.wrapping_neg())),
                Value::Float(v) => Ok(Value::Float(-v)),
                Value::Vector(v) => Ok(Value::Vector(-v)),
                Value::Rotation(q) => Ok(Value::Rotation(-q)),
                other => Err(VmError::type_mismatch("number", other.ty())),
            },
            UnOp::Not => Ok(Value::Integer(!operand.is_truthy() as i32)),
            UnOp::BitNot => Ok(Value::Integer(!operand.as_int()?)),
        }
    }

    /// Overload lowering targets emitted by the type tracker.
    pub fn method_call(&self, method: &str, args: &[Value]) -> Result<Value, VmError> {
        let arg = |i: usize| -> Result<&Value, VmError> {
            args.get(i)
                .ok_or_else(|| VmError::math(format!("`{method}` missing argument {i}")))
        };
        match method {
            "add" => Self::binary(BinOp::Add, self, arg(0)?),
            "sub" => Self::binary(BinOp::Sub, self, arg(0)?),
            "scale" => {
                let factor = arg(0)?.as_float()?;
                Ok(Value::Vector(self.as_vector()? * factor))
            }
            "multiply" => Ok(Value::Rotation(self.as_rotation()? * arg(0)?.as_rotation()?)),
            "divide" => Ok(Value::Rotation(
                self.as_rotation()? * quat_inverse(&arg(0)?.as_rotation()?),
            )),
            "rotateBy" => Ok(Value::Vector(rotate_vector(
                &self.as_vector()?,
                &arg(0)?.as_rotation()?,
            ))),
            "rotateByInverse" => Ok(Value::Vector(rotate_vector(
                &self.as_vector()?,
                &quat_inverse(&arg(0)?.as_rotation()?),
            ))),
            "negate" => Self::unary(UnOp::Neg, self),
            "dot" => Ok(Value::Float(self.as_vector()?.dot(&arg(0)?.as_vector()?))),
            "cross" => Ok(Value::Vector(
                self.as_vector()?.cross(&arg(0)?.as_vector()?),
            )),
            "addComponents" => Ok(Value::Rotation(
                self.as_rotation()? + arg(0)?.as_rotation()?,
            )),
            "subComponents" => Ok(Value::Rotation(
                self.as_rotation()? - arg(0)?.as_rotation()?,
            )),
            other => Err(VmError::math(format!("unknown method `{other}`"))),
        }
    }

    // -----------------------------------------------------------------
    // Wire conversion
    // -----------------------------------------------------------------

    /// JSON wire form. Vectors and rotations travel as component objects
    /// so they survive the boundary unambiguously.
    pub fn to_wire(&self) -> Json {
        match self {
            Value::Integer(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::Str(s) => json!(s),
            Value::Key(k) => json!(k),
            Value::Vector(v) => json!({"x": v.x, "y": v.y, "z": v.z}),
            Value::Rotation(q) => json!({"x": q.i, "y": q.j, "z": q.k, "s": q.w}),
            Value::List(items) => Json::Array(items.iter().map(|v| v.to_wire()).collect()),
        }
    }

    pub fn from_wire(json: &Json) -> Value {
        match json {
            Json::Null => Value::Integer(0),
            Json::Bool(b) => Value::Integer(*b as i32),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i as i32)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_wire).collect()),
            Json::Object(map) => {
                let get = |k: &str| map.get(k).and_then(Json::as_f64);
                match (get("x"), get("y"), get("z"), get("s")) {
                    (Some(x), Some(y), Some(z), Some(s)) => {
                        Value::Rotation(Quaternion::new(s, x, y, z))
                    }
                    (Some(x), Some(y), Some(z), None) => {
                        Value::Vector(Vector3::new(x, y, z))
                    }
                    _ => Value::Str(json.to_string()),
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_lsl_string())
    }
}

/// Rotate `v` by `q` (normalizing `q` first, as the legacy engine does).
pub fn rotate_vector(v: &Vector3<f64>, q: &Quaternion<f64>) -> Vector3<f64> {
    let norm = q.norm();
    if norm == 0.0 {
        return *v;
    }
    let unit = nalgebra::UnitQuaternion::from_quaternion(*q / norm);
    unit.transform_vector(v)
}

pub fn quat_inverse(q: &Quaternion<f64>) -> Quaternion<f64> {
    let norm_sq = q.norm_squared();
    if norm_sq == 0.0 {
        return Quaternion::new(1.0, 0.0, 0.0, 0.0);
    }
    q.conjugate() / norm_sq
}

fn parse_integer_prefix(s: &str) -> i32 {
    let t = s.trim_start();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        let digits: String = hex.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
        return u32::from_str_radix(&digits, 16).map(|v| v as i32).unwrap_or(0);
    }
    let mut end = 0;
    for (i, c) in t.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    t[..end].parse::<i64>().map(|v| v as i32).unwrap_or(0)
}

fn parse_float_prefix(s: &str) -> f64 {
    let t = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    for (i, c) in t.char_indices() {
        let ok = match c {
            '0'..='9' => true,
            '-' | '+' => i == 0 || t[..i].ends_with(['e', 'E']),
            '.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                true
            }
            'e' | 'E' if !seen_exp && i > 0 => {
                seen_exp = true;
                true
            }
            _ => false,
        };
        if ok {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    t[..end].parse::<f64>().unwrap_or(0.0)
}

fn parse_components(s: &str, n: usize) -> Option<Vec<f64>> {
    let t = s.trim();
    let inner = t.strip_prefix('<')?.strip_suffix('>')?;
    let parts: Vec<&str> = inner.split(',').collect();
    if parts.len() != n {
        return None;
    }
    parts
        .iter()
        .map(|p| p.trim().parse::<f64>().ok())
        .collect()
}

pub fn parse_vector(s: &str) -> Option<Vector3<f64>> {
    let c = parse_components(s, 3)?;
    Some(Vector3::new(c[0], c[1], c[2]))
}

pub fn parse_rotation(s: &str) -> Option<Quaternion<f64>> {
    let c = parse_components(s, 4)?;
    Some(Quaternion::new(c[3], c[0], c[1], c[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn integer_arithmetic_wraps() {
        let v = Value::binary(BinOp::Add, &Value::Integer(i32::MAX), &Value::Integer(1)).unwrap();
        assert_eq!(v, Value::Integer(i32::MIN));
    }

    #[test]
    fn float_contagion() {
        let v = Value::binary(BinOp::Mul, &Value::Integer(2), &Value::Float(1.5)).unwrap();
        assert_eq!(v, Value::Float(3.0));
    }

    #[test]
    fn string_concat_uses_cast_format() {
        let v = Value::binary(
            BinOp::Add,
            &Value::Str("n=".into()),
            &Value::Float(1.5),
        )
        .unwrap();
        assert_eq!(v, Value::Str("n=1.500000".into()));
    }

    #[test]
    fn list_equality_compares_length_only() {
        let a = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::List(vec![Value::Str("x".into()), Value::Str("y".into())]);
        assert_eq!(Value::binary(BinOp::Eq, &a, &b).unwrap(), Value::Integer(1));
    }

    #[test]
    fn division_by_zero_is_math_error() {
        assert!(Value::binary(BinOp::Div, &Value::Integer(1), &Value::Integer(0)).is_err());
    }

    #[test]
    fn vector_cast_formats() {
        let v = Value::Vector(Vector3::new(1.5, 0.0, -2.0));
        assert_eq!(v.to_lsl_string(), "<1.50000, 0.00000, -2.00000>");
        let back = Value::Str(v.to_lsl_string()).cast(LslType::Vector).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn string_to_integer_parses_prefix() {
        assert_eq!(
            Value::Str("42abc".into()).cast(LslType::Integer).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            Value::Str("0x1A".into()).cast(LslType::Integer).unwrap(),
            Value::Integer(26)
        );
        assert_eq!(
            Value::Str("none".into()).cast(LslType::Integer).unwrap(),
            Value::Integer(0)
        );
    }

    #[test]
    fn rotation_multiply_and_rotate() {
        // 90° about Z.
        let half = std::f64::consts::FRAC_PI_4;
        let q = Quaternion::new(half.cos(), 0.0, 0.0, half.sin());
        let v = rotate_vector(&Vector3::new(1.0, 0.0, 0.0), &q);
        assert!((v.x - 0.0).abs() < 1e-9);
        assert!((v.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn method_dispatch_matches_operators() {
        let a = Value::Vector(Vector3::new(1.0, 2.0, 3.0));
        let b = Value::Vector(Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(
            a.method_call("add", &[b.clone()]).unwrap(),
            Value::binary(BinOp::Add, &a, &b).unwrap()
        );
        assert_eq!(
            a.method_call("scale", &[Value::Integer(2)]).unwrap(),
            Value::Vector(Vector3::new(2.0, 4.0, 6.0))
        );
    }

    #[test]
    fn wire_round_trip_preserves_structure() {
        let values = vec![
            Value::Integer(7),
            Value::Float(1.25),
            Value::Str("hello".into()),
            Value::Vector(Vector3::new(1.0, 2.0, 3.0)),
            Value::Rotation(Quaternion::new(1.0, 0.0, 0.0, 0.0)),
            Value::List(vec![Value::Integer(1), Value::Str("two".into())]),
        ];
        for v in values {
            let back = Value::from_wire(&v.to_wire());
            match (&v, &back) {
                // Keys flatten to strings on the wire.
                (Value::Key(a), Value::Str(b)) => assert_eq!(a, b),
                _ => assert_eq!(v, back),
            }
        }
    }

    #[test]
    fn truthiness_rules() {
        assert!(Value::Integer(2).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Str("".into()).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(!Value::Key(NULL_KEY.into()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }
}
