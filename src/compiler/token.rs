//! Lexical token types shared by the lexer and parser.

use std::fmt;

/// Reserved words, matched case-insensitively. Matching is greedy but never
/// across a longer identifier prefix: `tools` lexes as an identifier, never
/// as `tool` followed by a stray `s` (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Version,
    Tool,
    Bridge,
    Define,
    Const,
    With,
    As,
    From,
    Input,
    Output,
    Context,
    On,
    Error,
}

impl Keyword {
    /// All reserved words, for the "cannot name user entities" check.
    pub const ALL: &'static [(&'static str, Keyword)] = &[
        ("version", Keyword::Version),
        ("tool", Keyword::Tool),
        ("bridge", Keyword::Bridge),
        ("define", Keyword::Define),
        ("const", Keyword::Const),
        ("with", Keyword::With),
        ("as", Keyword::As),
        ("from", Keyword::From),
        ("input", Keyword::Input),
        ("output", Keyword::Output),
        ("context", Keyword::Context),
        ("on", Keyword::On),
        ("error", Keyword::Error),
    ];

    pub fn lookup(word: &str) -> Option<Keyword> {
        let lower = word.to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|(text, _)| *text == lower)
            .map(|(_, kw)| *kw)
    }

    /// Whether this keyword may still name a user tool/define/const/bridge
    /// field. Grammar uses `input`/`output`/`context`/`const`/`with`/`as`
    /// as handle roles inside bridge bodies, but those words can never be
    /// declared as the *name* of a tool, define, or const (§4.1).
    pub fn is_reserved_identifier(word: &str) -> bool {
        matches!(
            Self::lookup(word),
            Some(
                Keyword::Bridge
                    | Keyword::With
                    | Keyword::As
                    | Keyword::From
                    | Keyword::Const
                    | Keyword::Tool
                    | Keyword::Version
                    | Keyword::Define
                    | Keyword::Input
                    | Keyword::Output
                    | Keyword::Context
            )
        )
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (text, _) = Keyword::ALL
            .iter()
            .find(|(_, kw)| kw == self)
            .expect("every Keyword variant is listed in ALL");
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident(String),
    String(String),
    Number(String),
    Bool(bool),
    Null,
    /// A slash-prefixed path literal, e.g. `/users/{id}`.
    Path(String),

    Arrow,       // <-
    ForceArrow,  // <-!
    OrOr,        // ||
    QuestionQuestion, // ??
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Dot,
    Colon,
    Comma,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize) -> Self {
        Self { kind, line }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(k) => write!(f, "keyword `{k}`"),
            TokenKind::Ident(s) => write!(f, "identifier `{s}`"),
            TokenKind::String(s) => write!(f, "string {s:?}"),
            TokenKind::Number(s) => write!(f, "number {s}"),
            TokenKind::Bool(b) => write!(f, "bool {b}"),
            TokenKind::Null => write!(f, "null"),
            TokenKind::Path(s) => write!(f, "path {s}"),
            TokenKind::Arrow => write!(f, "`<-`"),
            TokenKind::ForceArrow => write!(f, "`<-!`"),
            TokenKind::OrOr => write!(f, "`||`"),
            TokenKind::QuestionQuestion => write!(f, "`??`"),
            TokenKind::LBrace => write!(f, "`{{`"),
            TokenKind::RBrace => write!(f, "`}}`"),
            TokenKind::LBracket => write!(f, "`[`"),
            TokenKind::RBracket => write!(f, "`]`"),
            TokenKind::Equals => write!(f, "`=`"),
            TokenKind::Dot => write!(f, "`.`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}
