//! Lexer for the legacy scripting language.
//!
//! Whitespace and both comment forms are stripped. The lexer tolerates a
//! UTF-8 BOM and embedded NUL bytes (bundle-exported sources contain them);
//! NULs are skipped with a note-level diagnostic. String literals may span
//! physical lines. Every token and every error carries a
//! `{line, column, offset}` location.

use crate::diagnostics::{Diagnostic, SourceLoc};
use crate::token::{LslType, Token, TokenKind};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("lex error at {loc}: {message}")]
pub struct LexError {
    pub message: String,
    pub loc: SourceLoc,
}

impl LexError {
    fn new(message: impl Into<String>, loc: SourceLoc) -> Self {
        Self {
            message: message.into(),
            loc,
        }
    }
}

pub struct Lexer<'a> {
    /// Byte offset + char pairs, BOM already stripped.
    chars: Vec<(usize, char)>,
    cursor: usize,
    line: u32,
    column: u32,
    file: Option<String>,
    warnings: Vec<Diagnostic>,
    source_len: usize,
    _marker: std::marker::PhantomData<&'a str>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let stripped = source.strip_prefix('\u{feff}').unwrap_or(source);
        let bom_len = source.len() - stripped.len();
        let chars = stripped
            .char_indices()
            .map(|(off, ch)| (off + bom_len, ch))
            .collect();
        Self {
            chars,
            cursor: 0,
            line: 1,
            column: 1,
            file: None,
            warnings: Vec::new(),
            source_len: source.len(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Non-fatal notes accumulated while lexing (NUL bytes, odd escapes).
    pub fn take_warnings(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.warnings)
    }

    fn loc(&self) -> SourceLoc {
        let offset = self
            .chars
            .get(self.cursor)
            .map(|(off, _)| *off)
            .unwrap_or(self.source_len) as u32;
        SourceLoc::new(self.line, self.column, offset)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.cursor).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.cursor + ahead).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, ch) = *self.chars.get(self.cursor)?;
        self.cursor += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn warn(&mut self, diag: Diagnostic) {
        let diag = match &self.file {
            Some(f) => diag.with_file(f.clone()),
            None => diag,
        };
        self.warnings.push(diag);
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let loc = self.loc();
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, loc));
                break;
            };
            let kind = match ch {
                '"' => self.lex_string(loc)?,
                c if c.is_ascii_digit() => self.lex_number(loc)?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(loc)?
                }
                c if c.is_ascii_alphabetic() || c == '_' => self.lex_word(),
                _ => self.lex_operator(loc)?,
            };
            trace!(target: "transpile.lex", line = loc.line, column = loc.column, token = ?kind, "token");
            tokens.push(Token::new(kind, loc));
        }
        Ok(tokens)
    }

    /// Skip whitespace, comments, and embedded NUL bytes.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some('\0') => {
                    let loc = self.loc();
                    self.bump();
                    self.warn(Diagnostic::note("embedded NUL byte skipped").with_loc(loc));
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.loc();
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some(c) = self.bump() {
                        if c == '*' && self.peek() == Some('/') {
                            self.bump();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(LexError::new("unterminated block comment", start));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_string(&mut self, start: SourceLoc) -> Result<TokenKind, LexError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(LexError::new("unterminated string literal", start)),
                Some('"') => break,
                Some('\\') => match self.bump() {
                    None => return Err(LexError::new("unterminated string literal", start)),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(other) => {
                        // Unknown escapes pass the character through, the
                        // way the legacy compiler treats them.
                        text.push(other);
                    }
                },
                // Literal newlines are allowed inside strings.
                Some(c) => text.push(c),
            }
        }
        Ok(TokenKind::StrLit(text))
    }

    fn lex_number(&mut self, start: SourceLoc) -> Result<TokenKind, LexError> {
        // Hex integer.
        if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x') | Some('X'))
            && self.peek_at(2).is_some_and(|c| c.is_ascii_hexdigit())
        {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            // Overflow wraps into the 32-bit integer domain downstream.
            let value = u64::from_str_radix(&digits, 16)
                .map(|v| v as i64)
                .unwrap_or_else(|_| {
                    self.warnings.push(
                        Diagnostic::warning("hex literal out of range, clamped").with_loc(start),
                    );
                    i64::MAX
                });
            return Ok(TokenKind::IntLit(value));
        }

        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
            // Member access never follows a bare integer literal in this
            // language, so a dot here always begins a fraction.
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E'))
            && (self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek_at(1), Some('+') | Some('-'))
                    && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())))
        {
            is_float = true;
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(TokenKind::FloatLit)
                .map_err(|_| LexError::new(format!("malformed float literal `{text}`"), start))
        } else {
            match text.parse::<i64>() {
                Ok(v) => Ok(TokenKind::IntLit(v)),
                Err(_) => {
                    self.warnings.push(
                        Diagnostic::warning("integer literal out of range, clamped")
                            .with_loc(start),
                    );
                    Ok(TokenKind::IntLit(i64::MAX))
                }
            }
        }
    }

    fn lex_word(&mut self) -> TokenKind {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if let Some(kind) = TokenKind::keyword(&word) {
            return kind;
        }
        if let Some(ty) = LslType::from_keyword(&word) {
            return TokenKind::Type(ty);
        }
        TokenKind::Ident(word)
    }

    fn lex_operator(&mut self, loc: SourceLoc) -> Result<TokenKind, LexError> {
        let ch = self.bump().expect("caller checked peek");
        let kind = match ch {
            '@' => TokenKind::At,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '+' => {
                if self.eat('+') {
                    TokenKind::Incr
                } else if self.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::Decr
                } else if self.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '%' => {
                if self.eat('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::Ne
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.eat('<') {
                    if self.eat('=') {
                        TokenKind::ShlAssign
                    } else {
                        TokenKind::Shl
                    }
                } else if self.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('>') {
                    if self.eat('=') {
                        TokenKind::ShrAssign
                    } else {
                        TokenKind::Shr
                    }
                } else if self.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AndAnd
                } else if self.eat('=') {
                    TokenKind::AmpAssign
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::OrOr
                } else if self.eat('=') {
                    TokenKind::PipeAssign
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => {
                if self.eat('=') {
                    TokenKind::CaretAssign
                } else {
                    TokenKind::Caret
                }
            }
            '~' => TokenKind::Tilde,
            other => {
                return Err(LexError::new(
                    format!("unexpected character `{other}`"),
                    loc,
                ));
            }
        };
        Ok(kind)
    }
}

/// Convenience wrapper: lex a full source string in one call.
pub fn tokenize(source: &str) -> Result<(Vec<Token>, Vec<Diagnostic>), LexError> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize()?;
    Ok((tokens, lexer.take_warnings()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = tokenize(source).expect("lex should succeed");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("integer count = 42;"),
            vec![
                TokenKind::Type(LslType::Integer),
                TokenKind::Ident("count".into()),
                TokenKind::Assign,
                TokenKind::IntLit(42),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn float_forms() {
        assert_eq!(
            kinds("1.5 .25 2e3 1.5e-2"),
            vec![
                TokenKind::FloatLit(1.5),
                TokenKind::FloatLit(0.25),
                TokenKind::FloatLit(2000.0),
                TokenKind::FloatLit(0.015),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hex_integer() {
        assert_eq!(
            kinds("0xFF 0x10"),
            vec![TokenKind::IntLit(255), TokenKind::IntLit(16), TokenKind::Eof]
        );
    }

    #[test]
    fn string_escapes_and_newlines() {
        let (tokens, _) = tokenize("\"a\\nb\nliteral\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StrLit("a\nb\nliteral".into()));
    }

    #[test]
    fn comments_stripped() {
        assert_eq!(
            kinds("x // line\n/* block\nstill block */ y"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Ident("y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bom_and_nul_tolerated() {
        let (tokens, warnings) = tokenize("\u{feff}integer\0 x;").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Type(LslType::Integer));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("NUL"));
    }

    #[test]
    fn compound_shift_assignments() {
        assert_eq!(
            kinds("a <<= 1; b >>= 2;"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::ShlAssign,
                TokenKind::IntLit(1),
                TokenKind::Semicolon,
                TokenKind::Ident("b".into()),
                TokenKind::ShrAssign,
                TokenKind::IntLit(2),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn locations_track_lines_and_columns() {
        let (tokens, _) = tokenize("x\n  y").unwrap();
        assert_eq!(tokens[0].loc, SourceLoc::new(1, 1, 0));
        assert_eq!(tokens[1].loc, SourceLoc::new(2, 3, 4));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn deterministic_token_stream() {
        let src = "default { state_entry() { llSay(0, \"hi\"); } }";
        assert_eq!(kinds(src), kinds(src));
    }
}
