//! Lexical analysis and parser state for Basalt source

pub mod lexer;

pub use lexer::{NumberKind, Scanner, Token, TokenKind};

/// One token of lookahead plus two of lookbehind, with the error flags
/// shared by every compilation scope.
///
/// `panic_mode` suppresses cascading error reports until the compiler
/// resynchronizes at a statement boundary.
#[derive(Debug)]
pub struct ParserState {
    pub current: Token,
    pub previous: Token,
    pub before_previous: Token,
    pub had_error: bool,
    pub panic_mode: bool,
}

impl ParserState {
    pub fn new() -> Self {
        Self {
            current: Token::eof(0),
            previous: Token::eof(0),
            before_previous: Token::eof(0),
            had_error: false,
            panic_mode: false,
        }
    }
}

impl Default for ParserState {
    fn default() -> Self {
        Self::new()
    }
}
