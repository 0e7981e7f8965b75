//! Lexical analysis for Rill
//!
//! Converts source text into a stream of tokens. String interpolation bodies
//! are captured verbatim and re-lexed by the parser.

mod scanner;
mod token;

pub use scanner::{tokenize, Lexer};
pub use token::{SourceLocation, SourceSpan, StringPart, Token, TokenKind};
