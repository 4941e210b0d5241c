//! Token taxonomy for the Quartz language.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display as StrumDisplay, EnumString};

/// Source span: 1-based line, byte offset of the start on that line, and
/// length in bytes. This is the shape parse errors report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub offset: usize,
    pub length: usize,
}

impl Span {
    pub fn new(line: u32, offset: usize, length: usize) -> Self {
        Span {
            line,
            offset,
            length,
        }
    }

    pub fn dummy() -> Self {
        Span {
            line: 0,
            offset: 0,
            length: 0,
        }
    }
}

/// Reserved words. The `__`-prefixed ones are operator keywords that would
/// otherwise collide with user identifiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Var,
    Const,
    Func,
    If,
    Else,
    Switch,
    Case,
    Default,
    Do,
    While,
    For,
    Each,
    Try,
    Catch,
    Defer,
    Break,
    Continue,
    Throw,
    Return,
    Assert,
    Null,
    True,
    False,
    Nan,
    Infinity,
    This,
    Unset,
    Lengthof,
    Typeof,
    And,
    Or,
    Not,
    #[strum(serialize = "__abs")]
    Abs,
    #[strum(serialize = "__sqrt")]
    Sqrt,
    #[strum(serialize = "__signb")]
    Signb,
    #[strum(serialize = "__isnan")]
    Isnan,
    #[strum(serialize = "__isinf")]
    Isinf,
    #[strum(serialize = "__round")]
    Round,
    #[strum(serialize = "__floor")]
    Floor,
    #[strum(serialize = "__ceil")]
    Ceil,
    #[strum(serialize = "__trunc")]
    Trunc,
    #[strum(serialize = "__iround")]
    Iround,
    #[strum(serialize = "__ifloor")]
    Ifloor,
    #[strum(serialize = "__iceil")]
    Iceil,
    #[strum(serialize = "__itrunc")]
    Itrunc,
    #[strum(serialize = "__fma")]
    Fma,
    #[strum(serialize = "__file")]
    File,
    #[strum(serialize = "__line")]
    Line,
}

/// Punctuators, including every compound-assignment form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Punct {
    Add,
    AddEq,
    Sub,
    SubEq,
    Mul,
    MulEq,
    Div,
    DivEq,
    Mod,
    ModEq,
    Inc,
    Dec,
    Sll,
    SllEq,
    Srl,
    SrlEq,
    Sla,
    SlaEq,
    Sra,
    SraEq,
    AndB,
    AndBEq,
    AndL,
    AndLEq,
    OrB,
    OrBEq,
    OrL,
    OrLEq,
    XorB,
    XorBEq,
    NotB,
    NotL,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
    CmpLte,
    CmpGte,
    Cmp3Way,
    Quest,
    QuestEq,
    Coales,
    CoalesEq,
    Assign,
    Dot,
    Comma,
    Colon,
    Semicolon,
    ParenOp,
    ParenCl,
    BracketOp,
    BracketCl,
    BraceOp,
    BraceCl,
}

impl fmt::Display for Punct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Punct::Add => "+",
            Punct::AddEq => "+=",
            Punct::Sub => "-",
            Punct::SubEq => "-=",
            Punct::Mul => "*",
            Punct::MulEq => "*=",
            Punct::Div => "/",
            Punct::DivEq => "/=",
            Punct::Mod => "%",
            Punct::ModEq => "%=",
            Punct::Inc => "++",
            Punct::Dec => "--",
            Punct::Sll => "<<<",
            Punct::SllEq => "<<<=",
            Punct::Srl => ">>>",
            Punct::SrlEq => ">>>=",
            Punct::Sla => "<<",
            Punct::SlaEq => "<<=",
            Punct::Sra => ">>",
            Punct::SraEq => ">>=",
            Punct::AndB => "&",
            Punct::AndBEq => "&=",
            Punct::AndL => "&&",
            Punct::AndLEq => "&&=",
            Punct::OrB => "|",
            Punct::OrBEq => "|=",
            Punct::OrL => "||",
            Punct::OrLEq => "||=",
            Punct::XorB => "^",
            Punct::XorBEq => "^=",
            Punct::NotB => "~",
            Punct::NotL => "!",
            Punct::CmpEq => "==",
            Punct::CmpNe => "!=",
            Punct::CmpLt => "<",
            Punct::CmpGt => ">",
            Punct::CmpLte => "<=",
            Punct::CmpGte => ">=",
            Punct::Cmp3Way => "<=>",
            Punct::Quest => "?",
            Punct::QuestEq => "?=",
            Punct::Coales => "??",
            Punct::CoalesEq => "??=",
            Punct::Assign => "=",
            Punct::Dot => ".",
            Punct::Comma => ",",
            Punct::Colon => ":",
            Punct::Semicolon => ";",
            Punct::ParenOp => "(",
            Punct::ParenCl => ")",
            Punct::BracketOp => "[",
            Punct::BracketCl => "]",
            Punct::BraceOp => "{",
            Punct::BraceCl => "}",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Keyword(Keyword),
    Punct(Punct),
    Ident(String),
    IntLit(i64),
    RealLit(f64),
    StrLit(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(kw) => write!(f, "{}", kw),
            TokenKind::Punct(p) => write!(f, "{}", p),
            TokenKind::Ident(name) => write!(f, "{}", name),
            TokenKind::IntLit(n) => write!(f, "{}", n),
            TokenKind::RealLit(r) => write!(f, "{}", r),
            TokenKind::StrLit(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}
