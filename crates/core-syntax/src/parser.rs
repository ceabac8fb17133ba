//! Recursive-descent parser with precedence climbing.
//!
//! Grammar quirks preserved from the source language:
//! - assignment is right-associative;
//! - `&&` and `||` share a single precedence level;
//! - `<a,b,c[,d]>` vector/rotation literals are parsed speculatively: when
//!   `<` opens a primary expression we attempt 3 or 4 shift-level elements
//!   separated by commas and terminated by `>`, rewinding on failure;
//! - casts `(type)expr` are detected by a two-token lookahead.
//!
//! Errors are recoverable per top-level declaration. `ParseMode::Collect`
//! records the error, resynchronizes, and keeps going; `ParseMode::FailFast`
//! returns on the first error.

use crate::ast::*;
use crate::diagnostics::{Diagnostic, SourceLoc};
use crate::events;
use crate::lexer::{LexError, Lexer};
use crate::token::{LslType, Token, TokenKind};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("parse error at {loc}: {message}")]
    Syntax { message: String, loc: SourceLoc },
}

impl ParseError {
    fn syntax(message: impl Into<String>, loc: SourceLoc) -> Self {
        ParseError::Syntax {
            message: message.into(),
            loc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Stop at the first error.
    FailFast,
    /// Record errors, resynchronize at declaration boundaries, keep going.
    #[default]
    Collect,
}

/// Parse result: the (possibly partial) script plus accumulated
/// diagnostics. In `Collect` mode syntax errors appear here as
/// error-severity diagnostics and the affected declaration is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub script: Script,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutcome {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }
}

/// Lex + parse in diagnostic-collecting mode.
pub fn parse(source: &str) -> Result<ParseOutcome, ParseError> {
    parse_with(source, None, ParseMode::Collect)
}

/// Lex + parse, stopping at the first syntax error.
pub fn parse_strict(source: &str) -> Result<ParseOutcome, ParseError> {
    parse_with(source, None, ParseMode::FailFast)
}

pub fn parse_with(
    source: &str,
    file: Option<&str>,
    mode: ParseMode,
) -> Result<ParseOutcome, ParseError> {
    let mut lexer = Lexer::new(source);
    if let Some(f) = file {
        lexer = lexer.with_file(f);
    }
    let tokens = lexer.tokenize()?;
    let mut diagnostics = lexer.take_warnings();
    let mut parser = Parser::new(tokens, mode, file.map(str::to_string));
    let script = parser.parse_script()?;
    diagnostics.append(&mut parser.diagnostics);
    Ok(ParseOutcome {
        script,
        diagnostics,
    })
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    mode: ParseMode,
    file: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>, mode: ParseMode, file: Option<String>) -> Self {
        Self {
            tokens,
            pos: 0,
            mode,
            file,
            diagnostics: Vec::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Token plumbing
    // ---------------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn loc(&self) -> SourceLoc {
        self.tokens[self.pos.min(self.tokens.len() - 1)].loc
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn checkpoint(&self) -> usize {
        self.pos
    }

    fn rewind(&mut self, checkpoint: usize) {
        self.pos = checkpoint;
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(ParseError::syntax(
                format!("expected {}, found {}", kind.describe(), self.peek().describe()),
                self.loc(),
            ))
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, SourceLoc)> {
        let loc = self.loc();
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok((name, loc))
            }
            other => Err(ParseError::syntax(
                format!("expected identifier, found {}", other.describe()),
                loc,
            )),
        }
    }

    fn record(&mut self, err: &ParseError) {
        let (message, loc) = match err {
            ParseError::Lex(e) => (e.message.clone(), Some(e.loc)),
            ParseError::Syntax { message, loc } => (message.clone(), Some(*loc)),
        };
        let mut diag = Diagnostic::error(message);
        if let Some(loc) = loc {
            diag = diag.with_loc(loc);
        }
        if let Some(file) = &self.file {
            diag = diag.with_file(file.clone());
        }
        debug!(target: "transpile.parse", diagnostic = %diag, "recovered");
        self.diagnostics.push(diag);
    }

    fn warn(&mut self, mut diag: Diagnostic) {
        if let Some(file) = &self.file {
            diag = diag.with_file(file.clone());
        }
        self.diagnostics.push(diag);
    }

    /// Skip forward to a plausible top-level boundary: a balanced closing
    /// brace, a `;` at depth zero, or a `state`/`default` keyword.
    fn synchronize(&mut self) {
        let mut depth: i32 = 0;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace => {
                    self.bump();
                    depth -= 1;
                    if depth <= 0 {
                        return;
                    }
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.bump();
                    return;
                }
                TokenKind::State | TokenKind::Default if depth == 0 => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Top level
    // ---------------------------------------------------------------------

    pub fn parse_script(&mut self) -> PResult<Script> {
        let mut script = Script::default();
        loop {
            match self.peek().clone() {
                TokenKind::Eof => break,
                TokenKind::Default => match self.parse_state(true) {
                    Ok(state) => script.states.push(state),
                    Err(e) => self.recover(e)?,
                },
                TokenKind::State => match self.parse_state(false) {
                    Ok(state) => script.states.push(state),
                    Err(e) => self.recover(e)?,
                },
                TokenKind::Type(ty) => match self.parse_typed_decl(ty) {
                    Ok(TypedDecl::Global(g)) => script.globals.push(g),
                    Ok(TypedDecl::Function(f)) => script.functions.push(f),
                    Err(e) => self.recover(e)?,
                },
                TokenKind::Ident(_) => match self.parse_void_function() {
                    Ok(f) => script.functions.push(f),
                    Err(e) => self.recover(e)?,
                },
                other => {
                    let err = ParseError::syntax(
                        format!("expected declaration, found {}", other.describe()),
                        self.loc(),
                    );
                    self.recover(err)?;
                }
            }
        }
        Ok(script)
    }

    fn recover(&mut self, err: ParseError) -> PResult<()> {
        match self.mode {
            ParseMode::FailFast => Err(err),
            ParseMode::Collect => {
                self.record(&err);
                self.synchronize();
                Ok(())
            }
        }
    }

    fn parse_typed_decl(&mut self, ty: LslType) -> PResult<TypedDecl> {
        let start = self.loc();
        self.bump(); // type keyword
        let (name, _) = self.expect_ident()?;
        if self.at(&TokenKind::LParen) {
            let params = self.parse_params()?;
            let body = self.parse_block_stmts()?;
            return Ok(TypedDecl::Function(FunctionDecl {
                name,
                ret: Some(ty),
                params,
                body,
                loc: start,
            }));
        }
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(TypedDecl::Global(GlobalVar {
            name,
            ty,
            init,
            loc: start,
        }))
    }

    fn parse_void_function(&mut self) -> PResult<FunctionDecl> {
        let start = self.loc();
        let (name, _) = self.expect_ident()?;
        if !self.at(&TokenKind::LParen) {
            return Err(ParseError::syntax(
                format!("expected `(` after `{name}` (only functions and states may appear at top level)"),
                self.loc(),
            ));
        }
        let params = self.parse_params()?;
        let body = self.parse_block_stmts()?;
        Ok(FunctionDecl {
            name,
            ret: None,
            params,
            body,
            loc: start,
        })
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let ty = match self.peek().clone() {
                    TokenKind::Type(ty) => {
                        self.bump();
                        ty
                    }
                    other => {
                        return Err(ParseError::syntax(
                            format!("expected parameter type, found {}", other.describe()),
                            self.loc(),
                        ));
                    }
                };
                let (name, _) = self.expect_ident()?;
                params.push(Param { name, ty });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_state(&mut self, is_default: bool) -> PResult<StateDecl> {
        let start = self.loc();
        let name = if is_default {
            self.expect(&TokenKind::Default)?;
            "default".to_string()
        } else {
            self.expect(&TokenKind::State)?;
            let (name, _) = self.expect_ident()?;
            name
        };
        self.expect(&TokenKind::LBrace)?;
        let mut handlers = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            match self.parse_handler() {
                Ok(handler) => handlers.push(handler),
                Err(e) => match self.mode {
                    ParseMode::FailFast => return Err(e),
                    ParseMode::Collect => {
                        self.record(&e);
                        self.synchronize_in_state();
                    }
                },
            }
        }
        self.expect(&TokenKind::RBrace)?;
        debug!(target: "transpile.parse", state = %name, handlers = handlers.len(), "state parsed");
        Ok(StateDecl {
            name,
            handlers,
            loc: start,
        })
    }

    /// Recovery inside a state body: stop before the state's closing brace
    /// or after a balanced handler block.
    fn synchronize_in_state(&mut self) {
        let mut depth: i32 = 0;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace => {
                    if depth == 0 {
                        return; // the state's own closing brace
                    }
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_handler(&mut self) -> PResult<HandlerDecl> {
        let start = self.loc();
        let (name, name_loc) = self.expect_ident()?;
        let params = self.parse_params()?;
        let known = match events::lookup(&name) {
            Some(sig) => {
                if sig.params.len() != params.len() {
                    return Err(ParseError::syntax(
                        format!(
                            "event `{name}` takes {} parameter(s), found {}",
                            sig.params.len(),
                            params.len()
                        ),
                        name_loc,
                    ));
                }
                true
            }
            None => {
                self.warn(
                    Diagnostic::warning(format!(
                        "unknown event `{name}` accepted as extension event"
                    ))
                    .with_loc(name_loc),
                );
                false
            }
        };
        let body = self.parse_block_stmts()?;
        Ok(HandlerDecl {
            name,
            params,
            body,
            known,
            loc: start,
        })
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn parse_block_stmts(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.peek().clone() {
            TokenKind::Semicolon => {
                self.bump();
                Ok(Stmt::Empty)
            }
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block_stmts()?)),
            TokenKind::Type(ty) => {
                let loc = self.loc();
                self.bump();
                let (name, _) = self.expect_ident()?;
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Decl {
                    ty,
                    name,
                    init,
                    loc,
                })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::Return => {
                let loc = self.loc();
                self.bump();
                let value = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Return { value, loc })
            }
            TokenKind::Jump => {
                let loc = self.loc();
                self.bump();
                let (label, _) = self.expect_ident()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Jump { label, loc })
            }
            TokenKind::At => {
                let loc = self.loc();
                self.bump();
                let (name, _) = self.expect_ident()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Label { name, loc })
            }
            TokenKind::State => {
                let loc = self.loc();
                self.bump();
                let state = if self.eat(&TokenKind::Default) {
                    "default".to_string()
                } else {
                    self.expect_ident()?.0
                };
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::StateChange { state, loc })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;
        let init = self.parse_expr_list_until(&TokenKind::Semicolon)?;
        self.expect(&TokenKind::Semicolon)?;
        let cond = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = self.parse_expr_list_until(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_expr_list_until(&mut self, terminator: &TokenKind) -> PResult<Vec<Expr>> {
        let mut exprs = Vec::new();
        if self.at(terminator) {
            return Ok(exprs);
        }
        loop {
            exprs.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(exprs)
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        self.expect(&TokenKind::Do)?;
        let body = Box::new(self.parse_stmt()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::DoWhile { body, cond })
    }

    // ---------------------------------------------------------------------
    // Expressions (precedence climbing)
    // ---------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_logical()?;
        let op = match self.peek() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            TokenKind::PercentAssign => AssignOp::Rem,
            TokenKind::ShlAssign => AssignOp::Shl,
            TokenKind::ShrAssign => AssignOp::Shr,
            TokenKind::AmpAssign => AssignOp::BitAnd,
            TokenKind::PipeAssign => AssignOp::BitOr,
            TokenKind::CaretAssign => AssignOp::BitXor,
            _ => return Ok(lhs),
        };
        let loc = self.loc();
        if !matches!(lhs, Expr::Ident { .. } | Expr::Member { .. }) {
            return Err(ParseError::syntax("invalid assignment target", lhs.loc()));
        }
        self.bump();
        // Right-associative: recurse at the same level.
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(lhs),
            value: Box::new(value),
            loc,
        })
    }

    /// `&&` and `||` share one precedence level (source-language quirk).
    fn parse_logical(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bitor()?;
        loop {
            let op = match self.peek() {
                TokenKind::AndAnd => BinaryOp::And,
                TokenKind::OrOr => BinaryOp::Or,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
    }

    fn parse_bitor(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bitxor()?;
        while self.at(&TokenKind::Pipe) {
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary {
                op: BinaryOp::BitOr,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.at(&TokenKind::Caret) {
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary {
                op: BinaryOp::BitXor,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.at(&TokenKind::Amp) {
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary {
                op: BinaryOp::BitAnd,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        // Cast detection: `(` followed by a type keyword and `)`.
        if self.at(&TokenKind::LParen)
            && matches!(self.peek_at(1), TokenKind::Type(_))
            && self.peek_at(2) == &TokenKind::RParen
        {
            self.bump();
            let ty = match self.bump().kind {
                TokenKind::Type(ty) => ty,
                _ => unreachable!("lookahead checked type keyword"),
            };
            self.bump(); // `)`
            let operand = self.parse_unary()?;
            return Ok(Expr::Cast {
                ty,
                operand: Box::new(operand),
                loc,
            });
        }
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Incr => Some(UnaryOp::PreIncr),
            TokenKind::Decr => Some(UnaryOp::PreDecr),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                loc,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    let loc = self.loc();
                    self.bump();
                    let (field, _) = self.expect_ident()?;
                    expr = Expr::Member {
                        recv: Box::new(expr),
                        field,
                        loc,
                    };
                }
                TokenKind::Incr => {
                    let loc = self.loc();
                    self.bump();
                    expr = Expr::Unary {
                        op: UnaryOp::PostIncr,
                        operand: Box::new(expr),
                        loc,
                    };
                }
                TokenKind::Decr => {
                    let loc = self.loc();
                    self.bump();
                    expr = Expr::Unary {
                        op: UnaryOp::PostDecr,
                        operand: Box::new(expr),
                        loc,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        match self.peek().clone() {
            TokenKind::IntLit(value) => {
                self.bump();
                Ok(Expr::IntLit { value, loc })
            }
            TokenKind::FloatLit(value) => {
                self.bump();
                Ok(Expr::FloatLit { value, loc })
            }
            TokenKind::StrLit(value) => {
                self.bump();
                Ok(Expr::StrLit { value, loc })
            }
            TokenKind::Ident(name) => {
                self.bump();
                if self.at(&TokenKind::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    Ok(Expr::Call { name, args, loc })
                } else {
                    Ok(Expr::Ident { name, loc })
                }
            }
            TokenKind::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                if !self.at(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr::ListLit { items, loc })
            }
            TokenKind::Lt => self.parse_angle_literal(loc),
            other => Err(ParseError::syntax(
                format!("expected expression, found {}", other.describe()),
                loc,
            )),
        }
    }

    /// Speculative `<a,b,c[,d]>` parse. Elements are shift-level
    /// expressions so a closing `>` is never swallowed as a comparison.
    /// On failure the cursor is rewound and the `<` reported as a stray
    /// comparison operator.
    fn parse_angle_literal(&mut self, loc: SourceLoc) -> PResult<Expr> {
        let checkpoint = self.checkpoint();
        self.bump(); // `<`
        let attempt = (|| -> PResult<Expr> {
            let x = self.parse_shift()?;
            self.expect(&TokenKind::Comma)?;
            let y = self.parse_shift()?;
            self.expect(&TokenKind::Comma)?;
            let z = self.parse_shift()?;
            if self.eat(&TokenKind::Comma) {
                let s = self.parse_shift()?;
                self.expect(&TokenKind::Gt)?;
                return Ok(Expr::RotationLit {
                    x: Box::new(x),
                    y: Box::new(y),
                    z: Box::new(z),
                    s: Box::new(s),
                    loc,
                });
            }
            self.expect(&TokenKind::Gt)?;
            Ok(Expr::VectorLit {
                x: Box::new(x),
                y: Box::new(y),
                z: Box::new(z),
                loc,
            })
        })();
        match attempt {
            Ok(expr) => Ok(expr),
            Err(_) => {
                self.rewind(checkpoint);
                Err(ParseError::syntax(
                    "`<` here is neither a vector/rotation literal nor a valid comparison",
                    loc,
                ))
            }
        }
    }
}

enum TypedDecl {
    Global(GlobalVar),
    Function(FunctionDecl),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(src: &str) -> Script {
        let outcome = parse(src).expect("lexing should succeed");
        assert!(
            !outcome.has_errors(),
            "unexpected errors: {:?}",
            outcome.diagnostics
        );
        outcome.script
    }

    const MINIMAL: &str = r#"
default {
    state_entry() {
        llSay(0, "ready");
    }
}
"#;

    #[test]
    fn minimal_script() {
        let script = parse_ok(MINIMAL);
        assert_eq!(script.states.len(), 1);
        assert_eq!(script.states[0].name, "default");
        assert_eq!(script.states[0].handlers[0].name, "state_entry");
    }

    #[test]
    fn globals_functions_and_states() {
        let script = parse_ok(
            r#"
integer counter = 0;
vector home = <128.0, 128.0, 25.0>;

integer bump(integer amount) {
    counter += amount;
    return counter;
}

default {
    touch_start(integer total) {
        bump(1);
        state armed;
    }
}

state armed {
    timer() { }
}
"#,
        );
        assert_eq!(script.globals.len(), 2);
        assert_eq!(script.functions.len(), 1);
        assert_eq!(script.states.len(), 2);
        assert_eq!(script.functions[0].ret, Some(LslType::Integer));
    }

    #[test]
    fn vector_literal_vs_comparison() {
        let script = parse_ok("default { state_entry() { integer b = 1 < 2; vector v = <1,2,3>; } }");
        let body = &script.states[0].handlers[0].body;
        match &body[0] {
            Stmt::Decl {
                init: Some(Expr::Binary { op, .. }),
                ..
            } => assert_eq!(*op, BinaryOp::Lt),
            other => panic!("expected comparison decl, got {other:?}"),
        }
        match &body[1] {
            Stmt::Decl {
                init: Some(Expr::VectorLit { .. }),
                ..
            } => {}
            other => panic!("expected vector literal decl, got {other:?}"),
        }
    }

    #[test]
    fn rotation_literal_four_elements() {
        let script = parse_ok("default { state_entry() { rotation r = <0,0,0,1>; } }");
        match &script.states[0].handlers[0].body[0] {
            Stmt::Decl {
                init: Some(Expr::RotationLit { .. }),
                ..
            } => {}
            other => panic!("expected rotation literal, got {other:?}"),
        }
    }

    #[test]
    fn nested_vector_literal_elements() {
        // Elements themselves may contain comparisons inside parens and
        // arithmetic at shift level.
        parse_ok("default { state_entry() { vector v = <1 + 2, x * 3, (a > b)>; } }");
    }

    #[test]
    fn logical_operators_share_level() {
        // `a || b && c` must associate left-to-right: (a || b) && c.
        let script = parse_ok("default { state_entry() { integer x = a || b && c; } }");
        match &script.states[0].handlers[0].body[0] {
            Stmt::Decl {
                init: Some(Expr::Binary { op, lhs, .. }),
                ..
            } => {
                assert_eq!(*op, BinaryOp::And);
                match lhs.as_ref() {
                    Expr::Binary { op, .. } => assert_eq!(*op, BinaryOp::Or),
                    other => panic!("expected `||` on the left, got {other:?}"),
                }
            }
            other => panic!("expected binary decl, got {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let script = parse_ok("default { state_entry() { a = b = 3; } }");
        match &script.states[0].handlers[0].body[0] {
            Stmt::Expr(Expr::Assign { value, .. }) => {
                assert!(matches!(value.as_ref(), Expr::Assign { .. }));
            }
            other => panic!("expected nested assignment, got {other:?}"),
        }
    }

    #[test]
    fn cast_two_token_lookahead() {
        let script = parse_ok("default { state_entry() { string s = (string)42; } }");
        match &script.states[0].handlers[0].body[0] {
            Stmt::Decl {
                init: Some(Expr::Cast { ty, .. }),
                ..
            } => assert_eq!(*ty, LslType::String),
            other => panic!("expected cast, got {other:?}"),
        }
        // A parenthesized expression must not be mistaken for a cast.
        parse_ok("default { state_entry() { integer x = (y); } }");
    }

    #[test]
    fn jump_and_label_statements() {
        let script = parse_ok(
            "default { state_entry() { @top; jump top; } }",
        );
        let body = &script.states[0].handlers[0].body;
        assert!(matches!(&body[0], Stmt::Label { name, .. } if name == "top"));
        assert!(matches!(&body[1], Stmt::Jump { label, .. } if label == "top"));
    }

    #[test]
    fn for_with_comma_clauses() {
        let script = parse_ok("default { state_entry() { integer i; for (i = 0, j = 9; i < 9; i++, j--) llSay(0, \"x\"); } }");
        match &script.states[0].handlers[0].body[1] {
            Stmt::For { init, update, .. } => {
                assert_eq!(init.len(), 2);
                assert_eq!(update.len(), 2);
            }
            other => panic!("expected for loop, got {other:?}"),
        }
    }

    #[test]
    fn member_access_on_vector() {
        let script = parse_ok("default { state_entry() { float x = pos.x; } }");
        match &script.states[0].handlers[0].body[0] {
            Stmt::Decl {
                init: Some(Expr::Member { field, .. }),
                ..
            } => assert_eq!(field, "x"),
            other => panic!("expected member access, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_warns_but_parses() {
        let outcome = parse("default { warp_drive_engaged() { } }").unwrap();
        assert!(!outcome.has_errors());
        assert!(
            outcome
                .diagnostics
                .iter()
                .any(|d| d.message.contains("unknown event"))
        );
        assert!(!outcome.script.states[0].handlers[0].known);
    }

    #[test]
    fn event_arity_mismatch_is_error() {
        let outcome = parse("default { listen(integer channel) { } }").unwrap();
        assert!(outcome.has_errors());
    }

    #[test]
    fn collect_mode_recovers_per_declaration() {
        let outcome = parse(
            r#"
integer ok = 1;
integer broken = ;
default { state_entry() { llSay(0, "alive"); } }
"#,
        )
        .unwrap();
        assert!(outcome.has_errors());
        assert_eq!(outcome.script.globals.len(), 1);
        assert_eq!(outcome.script.states.len(), 1);
    }

    #[test]
    fn fail_fast_stops_at_first_error() {
        let err = parse_strict("integer broken = ;").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn deterministic_ast() {
        let a = parse_ok(MINIMAL);
        let b = parse_ok(MINIMAL);
        assert_eq!(a, b);
    }

    #[test]
    fn do_while_statement() {
        let script = parse_ok("default { state_entry() { integer i; do { i++; } while (i < 3); } }");
        assert!(matches!(
            &script.states[0].handlers[0].body[1],
            Stmt::DoWhile { .. }
        ));
    }

    #[test]
    fn state_change_statement() {
        let script = parse_ok("default { touch_start(integer n) { state default; } }");
        assert!(matches!(
            &script.states[0].handlers[0].body[0],
            Stmt::StateChange { state, .. } if state == "default"
        ));
    }
}
