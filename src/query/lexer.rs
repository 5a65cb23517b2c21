//! Lexer for the query language.
//!
//! Produces span-based tokens; text is sliced from the source only when the
//! parser needs it. Operator names (`and`, `or`, `div`, `mod`) and `*` are
//! lexed as plain names/stars; the parser disambiguates them by position.

use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token("[")]
    BracketOpen,

    #[token("]")]
    BracketClose,

    #[token(",")]
    Comma,

    /// `::` after an axis name
    #[token("::")]
    DoubleColon,

    #[token("//")]
    DoubleSlash,

    #[token("/")]
    Slash,

    #[token("|")]
    Pipe,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("=")]
    Equals,

    #[token("!=")]
    NotEquals,

    #[token("<")]
    Less,

    #[token("<=")]
    LessEquals,

    #[token(">")]
    Greater,

    #[token(">=")]
    GreaterEquals,

    #[token("*")]
    Star,

    #[token("..")]
    DotDot,

    #[token(".")]
    Dot,

    #[token("@")]
    At,

    #[regex(r"[0-9]+(\.[0-9]*)?")]
    #[regex(r"\.[0-9]+")]
    Number,

    #[regex(r#""[^"]*""#)]
    #[regex(r"'[^']*'")]
    Literal,

    /// NCName. Hyphens and dots are name characters, as in `following-sibling`.
    #[regex(r"[A-Za-z_][A-Za-z0-9_.\-]*")]
    Name,

    #[regex(r"[ \t\r\n]+")]
    Whitespace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

/// A character sequence no token accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub span: Range<usize>,
}

/// Tokenizes `source`, dropping whitespace.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        match result {
            Ok(TokenKind::Whitespace) => {}
            Ok(kind) => tokens.push(Token {
                kind,
                span: lexer.span(),
            }),
            Err(()) => return Err(LexError { span: lexer.span() }),
        }
    }

    Ok(tokens)
}

/// Text slice for a token
#[inline]
pub fn token_text<'q>(source: &'q str, token: &Token) -> &'q str {
    &source[token.span.clone()]
}
