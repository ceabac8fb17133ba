//! VM error taxonomy.
//!
//! Quota hits carry stable message prefixes ("maximum iterations",
//! "maximum call depth") because the error sink and tests match on them.

use core_syntax::LslType;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    #[error("maximum iterations exceeded ({limit}) in a single execution")]
    LoopQuota { limit: u64 },

    #[error("maximum call depth exceeded ({limit})")]
    CallDepth { limit: u32 },

    #[error("math error: {0}")]
    Math(String),

    #[error("type error: expected {expected}, found {found}")]
    Type { expected: String, found: LslType },

    #[error("cannot cast {from} to {to}")]
    Cast { from: LslType, to: LslType },

    #[error("unbound variable `{0}`")]
    UnboundVariable(String),

    #[error("call to undefined function `{0}`")]
    UndefinedFunction(String),

    #[error("`{0}` is not implemented (unmapped builtin)")]
    UnmappedBuiltin(String),

    #[error("unknown state `{0}`")]
    UnknownState(String),

    #[error("state transitions did not settle (possible transition loop)")]
    TransitionLoop,

    #[error("api error: {0}")]
    Api(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl VmError {
    pub fn math(message: impl Into<String>) -> Self {
        VmError::Math(message.into())
    }

    pub fn type_mismatch(expected: impl Into<String>, found: LslType) -> Self {
        VmError::Type {
            expected: expected.into(),
            found,
        }
    }

    pub fn bad_cast(from: LslType, to: LslType) -> Self {
        VmError::Cast { from, to }
    }

    /// Stable machine-readable code surfaced through the error sink.
    pub fn code(&self) -> &'static str {
        match self {
            VmError::LoopQuota { .. } => "loop-quota",
            VmError::CallDepth { .. } => "call-depth",
            VmError::Math(_) => "math",
            VmError::Type { .. } => "type",
            VmError::Cast { .. } => "cast",
            VmError::UnboundVariable(_) => "unbound-variable",
            VmError::UndefinedFunction(_) => "undefined-function",
            VmError::UnmappedBuiltin(_) => "unmapped-builtin",
            VmError::UnknownState(_) => "unknown-state",
            VmError::TransitionLoop => "transition-loop",
            VmError::Api(_) => "api",
            VmError::Runtime(_) => "runtime",
        }
    }
}
