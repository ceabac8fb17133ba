//! Closed table of source-language constants.
//!
//! The emitter inlines the table value at every use site; there is no
//! runtime constant lookup. Vector/rotation constants pull in the runtime
//! type imports the same way literals do.

use core_ir::Expr;
use core_syntax::LslType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Float(f64),
    Str(&'static str),
    Key(&'static str),
    ZeroVector,
    ZeroRotation,
}

impl ConstValue {
    pub fn ty(&self) -> LslType {
        match self {
            ConstValue::Int(_) => LslType::Integer,
            ConstValue::Float(_) => LslType::Float,
            ConstValue::Str(_) => LslType::String,
            ConstValue::Key(_) => LslType::Key,
            ConstValue::ZeroVector => LslType::Vector,
            ConstValue::ZeroRotation => LslType::Rotation,
        }
    }

    pub fn to_expr(&self) -> Expr {
        match self {
            ConstValue::Int(v) => Expr::Int { value: *v },
            ConstValue::Float(v) => Expr::Float { value: *v },
            ConstValue::Str(v) => Expr::Str {
                value: (*v).to_string(),
            },
            ConstValue::Key(v) => Expr::Key {
                value: (*v).to_string(),
            },
            ConstValue::ZeroVector => Expr::Vec3 {
                x: Box::new(Expr::Float { value: 0.0 }),
                y: Box::new(Expr::Float { value: 0.0 }),
                z: Box::new(Expr::Float { value: 0.0 }),
            },
            ConstValue::ZeroRotation => Expr::Quat {
                x: Box::new(Expr::Float { value: 0.0 }),
                y: Box::new(Expr::Float { value: 0.0 }),
                z: Box::new(Expr::Float { value: 0.0 }),
                s: Box::new(Expr::Float { value: 1.0 }),
            },
        }
    }
}

use ConstValue::{Float, Int, Key, Str, ZeroRotation, ZeroVector};

pub const CONSTANTS: &[(&str, ConstValue)] = &[
    ("TRUE", Int(1)),
    ("FALSE", Int(0)),
    ("PI", Float(std::f64::consts::PI)),
    ("TWO_PI", Float(std::f64::consts::TAU)),
    ("PI_BY_TWO", Float(std::f64::consts::FRAC_PI_2)),
    ("DEG_TO_RAD", Float(std::f64::consts::PI / 180.0)),
    ("RAD_TO_DEG", Float(180.0 / std::f64::consts::PI)),
    ("SQRT2", Float(std::f64::consts::SQRT_2)),
    ("ZERO_VECTOR", ZeroVector),
    ("ZERO_ROTATION", ZeroRotation),
    ("NULL_KEY", Key("00000000-0000-0000-0000-000000000000")),
    ("EOF", Str("\n\n\n")),
    ("PUBLIC_CHANNEL", Int(0)),
    ("DEBUG_CHANNEL", Int(0x7FFFFFFF)),
    // Link targets.
    ("LINK_ROOT", Int(1)),
    ("LINK_SET", Int(-1)),
    ("LINK_ALL_OTHERS", Int(-2)),
    ("LINK_ALL_CHILDREN", Int(-3)),
    ("LINK_THIS", Int(-4)),
    // `changed` event masks.
    ("CHANGED_INVENTORY", Int(0x1)),
    ("CHANGED_COLOR", Int(0x2)),
    ("CHANGED_SHAPE", Int(0x4)),
    ("CHANGED_SCALE", Int(0x8)),
    ("CHANGED_TEXTURE", Int(0x10)),
    ("CHANGED_LINK", Int(0x20)),
    ("CHANGED_ALLOWED_DROP", Int(0x40)),
    ("CHANGED_OWNER", Int(0x80)),
    ("CHANGED_REGION", Int(0x100)),
    ("CHANGED_TELEPORT", Int(0x200)),
    ("CHANGED_REGION_START", Int(0x400)),
    ("CHANGED_MEDIA", Int(0x800)),
    // Permission masks.
    ("PERMISSION_DEBIT", Int(0x2)),
    ("PERMISSION_TAKE_CONTROLS", Int(0x4)),
    ("PERMISSION_TRIGGER_ANIMATION", Int(0x10)),
    ("PERMISSION_ATTACH", Int(0x20)),
    ("PERMISSION_CHANGE_LINKS", Int(0x80)),
    ("PERMISSION_TRACK_CAMERA", Int(0x400)),
    ("PERMISSION_CONTROL_CAMERA", Int(0x800)),
    ("PERMISSION_TELEPORT", Int(0x1000)),
    // Sensor / detected type masks.
    ("AGENT", Int(0x1)),
    ("AGENT_BY_LEGACY_NAME", Int(0x1)),
    ("AGENT_BY_USERNAME", Int(0x10)),
    ("ACTIVE", Int(0x2)),
    ("PASSIVE", Int(0x4)),
    ("SCRIPTED", Int(0x8)),
    // Inventory types.
    ("INVENTORY_ALL", Int(-1)),
    ("INVENTORY_NONE", Int(-1)),
    ("INVENTORY_TEXTURE", Int(0)),
    ("INVENTORY_SOUND", Int(1)),
    ("INVENTORY_LANDMARK", Int(3)),
    ("INVENTORY_CLOTHING", Int(5)),
    ("INVENTORY_OBJECT", Int(6)),
    ("INVENTORY_NOTECARD", Int(7)),
    ("INVENTORY_SCRIPT", Int(10)),
    ("INVENTORY_BODYPART", Int(13)),
    ("INVENTORY_ANIMATION", Int(20)),
    ("INVENTORY_GESTURE", Int(21)),
    // Object status masks.
    ("STATUS_PHYSICS", Int(0x1)),
    ("STATUS_ROTATE_X", Int(0x2)),
    ("STATUS_ROTATE_Y", Int(0x4)),
    ("STATUS_ROTATE_Z", Int(0x8)),
    ("STATUS_PHANTOM", Int(0x10)),
    ("STATUS_SANDBOX", Int(0x20)),
    ("STATUS_BLOCK_GRAB", Int(0x40)),
    ("STATUS_DIE_AT_EDGE", Int(0x80)),
    ("STATUS_RETURN_AT_EDGE", Int(0x100)),
    ("STATUS_CAST_SHADOWS", Int(0x200)),
    // HTTP request options.
    ("HTTP_METHOD", Int(0)),
    ("HTTP_MIMETYPE", Int(1)),
    ("HTTP_BODY_MAXLENGTH", Int(2)),
    ("HTTP_VERIFY_CERT", Int(3)),
    ("HTTP_BODY_TRUNCATED", Int(0)),
    // Control bitfield.
    ("CONTROL_FWD", Int(0x1)),
    ("CONTROL_BACK", Int(0x2)),
    ("CONTROL_LEFT", Int(0x4)),
    ("CONTROL_RIGHT", Int(0x8)),
    ("CONTROL_UP", Int(0x10)),
    ("CONTROL_DOWN", Int(0x20)),
    ("CONTROL_ROT_LEFT", Int(0x100)),
    ("CONTROL_ROT_RIGHT", Int(0x200)),
    ("CONTROL_LBUTTON", Int(0x1000_0000)),
    ("CONTROL_ML_LBUTTON", Int(0x4000_0000)),
    // `llGetObjectDetails` selectors.
    ("OBJECT_NAME", Int(1)),
    ("OBJECT_DESC", Int(2)),
    ("OBJECT_POS", Int(3)),
    ("OBJECT_ROT", Int(4)),
    ("OBJECT_VELOCITY", Int(5)),
    ("OBJECT_OWNER", Int(6)),
    ("OBJECT_GROUP", Int(7)),
    ("OBJECT_CREATOR", Int(8)),
    // String trim modes.
    ("STRING_TRIM_HEAD", Int(1)),
    ("STRING_TRIM_TAIL", Int(2)),
    ("STRING_TRIM", Int(3)),
    // List entry types.
    ("TYPE_INVALID", Int(0)),
    ("TYPE_INTEGER", Int(1)),
    ("TYPE_FLOAT", Int(2)),
    ("TYPE_STRING", Int(3)),
    ("TYPE_KEY", Int(4)),
    ("TYPE_VECTOR", Int(5)),
    ("TYPE_ROTATION", Int(6)),
    // Touch fallbacks.
    ("TOUCH_INVALID_FACE", Int(-1)),
    // Attach points (the commonly scripted subset).
    ("ATTACH_CHEST", Int(1)),
    ("ATTACH_HEAD", Int(2)),
    ("ATTACH_LSHOULDER", Int(3)),
    ("ATTACH_RSHOULDER", Int(4)),
    ("ATTACH_LHAND", Int(5)),
    ("ATTACH_RHAND", Int(6)),
    ("ATTACH_BELLY", Int(28)),
    ("ATTACH_HUD_CENTER_2", Int(31)),
    ("ATTACH_HUD_TOP_RIGHT", Int(32)),
    ("ATTACH_HUD_TOP_CENTER", Int(33)),
    ("ATTACH_HUD_TOP_LEFT", Int(34)),
    ("ATTACH_HUD_CENTER_1", Int(35)),
    ("ATTACH_HUD_BOTTOM_LEFT", Int(36)),
    ("ATTACH_HUD_BOTTOM", Int(37)),
    ("ATTACH_HUD_BOTTOM_RIGHT", Int(38)),
];

pub fn lookup(name: &str) -> Option<&'static ConstValue> {
    CONSTANTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_and_link_constants() {
        assert_eq!(lookup("TRUE"), Some(&Int(1)));
        assert_eq!(lookup("LINK_SET"), Some(&Int(-1)));
        assert_eq!(lookup("LINK_THIS"), Some(&Int(-4)));
        assert!(lookup("LINK_IMAGINARY").is_none());
    }

    #[test]
    fn zero_vector_expands_to_literal() {
        let expr = lookup("ZERO_VECTOR").unwrap().to_expr();
        assert!(matches!(expr, Expr::Vec3 { .. }));
        assert_eq!(lookup("ZERO_VECTOR").unwrap().ty(), LslType::Vector);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = CONSTANTS.iter().map(|(n, _)| *n).collect();
        let len = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(len, names.len());
    }
}
