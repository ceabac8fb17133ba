//! core-syntax: lexer, parser, and AST for the legacy scripting language.
//!
//! This crate is the front half of the transpiler. It knows nothing about
//! the intermediate representation or the runtime; it turns source text
//! into a typed [`ast::Script`] plus location-bearing diagnostics. The
//! closed event table lives here because the parser validates handler
//! arities against it.

pub mod ast;
pub mod diagnostics;
pub mod events;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    AssignOp, BinaryOp, Expr, FunctionDecl, GlobalVar, HandlerDecl, Param, Script, StateDecl,
    Stmt, UnaryOp,
};
pub use diagnostics::{Diagnostic, Severity, SourceLoc};
pub use events::{EventSig, EVENTS};
pub use lexer::{Lexer, LexError};
pub use parser::{parse, parse_strict, parse_with, ParseError, ParseMode, ParseOutcome, Parser};
pub use token::{LslType, Token, TokenKind};
