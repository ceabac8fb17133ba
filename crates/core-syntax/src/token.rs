//! Token vocabulary of the legacy scripting language.
//!
//! The lexer produces a flat `Vec<Token>`; the parser walks it by index so
//! it can checkpoint and rewind for the speculative `<a,b,c>` vector-literal
//! parse. Angle brackets therefore stay plain `Lt`/`Gt` tokens here; their
//! dual role (comparison vs. vector literal) is resolved by the parser.

use crate::diagnostics::SourceLoc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven value types of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LslType {
    Integer,
    Float,
    String,
    Key,
    Vector,
    Rotation,
    List,
}

impl LslType {
    /// Keyword spelling in source text. `rotation` also accepts the
    /// historical `quaternion` alias.
    pub fn keyword(&self) -> &'static str {
        match self {
            LslType::Integer => "integer",
            LslType::Float => "float",
            LslType::String => "string",
            LslType::Key => "key",
            LslType::Vector => "vector",
            LslType::Rotation => "rotation",
            LslType::List => "list",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "integer" => LslType::Integer,
            "float" => LslType::Float,
            "string" => LslType::String,
            "key" => LslType::Key,
            "vector" => LslType::Vector,
            "rotation" | "quaternion" => LslType::Rotation,
            "list" => LslType::List,
            _ => return None,
        })
    }
}

impl fmt::Display for LslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    Ident(String),
    Type(LslType),

    // Control keywords.
    If,
    Else,
    For,
    While,
    Do,
    Return,
    State,
    Default,
    Jump,

    // Punctuation.
    At,
    Semicolon,
    Comma,
    Dot,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,

    // Assignment family (right-associative).
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    ShlAssign,
    ShrAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,

    // Arithmetic.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Incr,
    Decr,

    // Comparison. `Lt`/`Gt` double as vector-literal delimiters.
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical (single shared precedence level in this language).
    AndAnd,
    OrOr,
    Not,

    // Bitwise.
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    Eof,
}

impl TokenKind {
    /// Short human label used in "expected X, found Y" diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::IntLit(v) => format!("integer literal `{v}`"),
            TokenKind::FloatLit(v) => format!("float literal `{v}`"),
            TokenKind::StrLit(_) => "string literal".to_string(),
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Type(t) => format!("type `{t}`"),
            TokenKind::If => "`if`".to_string(),
            TokenKind::Else => "`else`".to_string(),
            TokenKind::For => "`for`".to_string(),
            TokenKind::While => "`while`".to_string(),
            TokenKind::Do => "`do`".to_string(),
            TokenKind::Return => "`return`".to_string(),
            TokenKind::State => "`state`".to_string(),
            TokenKind::Default => "`default`".to_string(),
            TokenKind::Jump => "`jump`".to_string(),
            TokenKind::At => "`@`".to_string(),
            TokenKind::Semicolon => "`;`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::LBrace => "`{`".to_string(),
            TokenKind::RBrace => "`}`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::LBracket => "`[`".to_string(),
            TokenKind::RBracket => "`]`".to_string(),
            TokenKind::Assign => "`=`".to_string(),
            TokenKind::PlusAssign => "`+=`".to_string(),
            TokenKind::MinusAssign => "`-=`".to_string(),
            TokenKind::StarAssign => "`*=`".to_string(),
            TokenKind::SlashAssign => "`/=`".to_string(),
            TokenKind::PercentAssign => "`%=`".to_string(),
            TokenKind::ShlAssign => "`<<=`".to_string(),
            TokenKind::ShrAssign => "`>>=`".to_string(),
            TokenKind::AmpAssign => "`&=`".to_string(),
            TokenKind::PipeAssign => "`|=`".to_string(),
            TokenKind::CaretAssign => "`^=`".to_string(),
            TokenKind::Plus => "`+`".to_string(),
            TokenKind::Minus => "`-`".to_string(),
            TokenKind::Star => "`*`".to_string(),
            TokenKind::Slash => "`/`".to_string(),
            TokenKind::Percent => "`%`".to_string(),
            TokenKind::Incr => "`++`".to_string(),
            TokenKind::Decr => "`--`".to_string(),
            TokenKind::Eq => "`==`".to_string(),
            TokenKind::Ne => "`!=`".to_string(),
            TokenKind::Lt => "`<`".to_string(),
            TokenKind::Gt => "`>`".to_string(),
            TokenKind::Le => "`<=`".to_string(),
            TokenKind::Ge => "`>=`".to_string(),
            TokenKind::AndAnd => "`&&`".to_string(),
            TokenKind::OrOr => "`||`".to_string(),
            TokenKind::Not => "`!`".to_string(),
            TokenKind::Amp => "`&`".to_string(),
            TokenKind::Pipe => "`|`".to_string(),
            TokenKind::Caret => "`^`".to_string(),
            TokenKind::Tilde => "`~`".to_string(),
            TokenKind::Shl => "`<<`".to_string(),
            TokenKind::Shr => "`>>`".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }

    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "return" => TokenKind::Return,
            "state" => TokenKind::State,
            "default" => TokenKind::Default,
            "jump" => TokenKind::Jump,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLoc,
}

impl Token {
    pub fn new(kind: TokenKind, loc: SourceLoc) -> Self {
        Self { kind, loc }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_keyword_round_trip() {
        for ty in [
            LslType::Integer,
            LslType::Float,
            LslType::String,
            LslType::Key,
            LslType::Vector,
            LslType::Rotation,
            LslType::List,
        ] {
            assert_eq!(LslType::from_keyword(ty.keyword()), Some(ty));
        }
        assert_eq!(LslType::from_keyword("quaternion"), Some(LslType::Rotation));
        assert_eq!(LslType::from_keyword("int"), None);
    }

    #[test]
    fn control_keywords_resolve() {
        assert_eq!(TokenKind::keyword("state"), Some(TokenKind::State));
        assert_eq!(TokenKind::keyword("jump"), Some(TokenKind::Jump));
        assert_eq!(TokenKind::keyword("llSay"), None);
    }
}
