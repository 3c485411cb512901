//! twine-lexer - Scanner for the twine language
//!
//! Converts a character stream into typed tokens with byte offsets. The
//! scanner is a deterministic finite-state machine with exactly one
//! character of pushback; reserved words are recognized by dedicated
//! per-prefix states with maximal-munch fallback to identifiers.

pub mod lexer;
pub mod token;

pub use lexer::{tokenize, Lexer};
pub use token::{Token, TokenKind};
