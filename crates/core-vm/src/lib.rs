//! core-vm: the execution substrate for hardened intermediate programs.
//!
//! The slot runtime owns [`ScriptInstance`]s and drives them through the
//! [`ApiBridge`] trait; everything else in this crate is the legacy value
//! model and its helper library.

pub mod error;
pub mod helpers;
pub mod interp;
pub mod value;

pub use error::VmError;
pub use helpers::{ScriptTimes, MEMORY_LIMIT};
pub use interp::{ApiBridge, Limits, LocalBoxFuture, ScriptInstance};
pub use value::Value;
