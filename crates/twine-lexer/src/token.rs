//! Tokens for the twine language
//!
//! Defines all token types the scanner can produce.

use std::fmt;

/// All token types for the twine language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `(`
    LeftBracket,
    /// `)`
    RightBracket,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `+` - string concatenation
    OpConcat,
    /// `*` - string repetition
    OpRepeat,
    /// `<`
    OpLess,
    /// `<>`
    OpNotEqual,
    /// `<=`
    OpLessEqual,
    /// `>`
    OpGreater,
    /// `>=`
    OpGreaterEqual,
    /// `=`
    OpAssignment,
    /// `==`
    OpEqual,
    /// `string` - the only declarable type
    KeywordString,
    /// `start` - opens a compound statement
    KeywordStart,
    /// `else`
    KeywordElse,
    /// `end` - closes a compound statement
    KeywordEnd,
    /// `while`
    KeywordWhile,
    /// `if`
    KeywordIf,
    /// `do`
    KeywordDo,
    /// Identifier: lowercase letters and digits, e.g. `abc1`
    Identifier,
    /// Unsigned integer literal: `42`
    Number,
    /// String literal including its quotes: `"abc"`
    Str,
    /// End of input; repeats on further scans
    EndOfFile,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::LeftBracket => "LEFT_BRACKET",
            TokenKind::RightBracket => "RIGHT_BRACKET",
            TokenKind::Semicolon => "SEMICOLON",
            TokenKind::Comma => "COMMA",
            TokenKind::OpConcat => "OP_CONCAT",
            TokenKind::OpRepeat => "OP_REPEAT",
            TokenKind::OpLess => "OP_LESS",
            TokenKind::OpNotEqual => "OP_NOT_EQUAL",
            TokenKind::OpLessEqual => "OP_LESS_EQUAL",
            TokenKind::OpGreater => "OP_GREATER",
            TokenKind::OpGreaterEqual => "OP_GREATER_EQUAL",
            TokenKind::OpAssignment => "OP_ASSIGNMENT",
            TokenKind::OpEqual => "OP_EQUAL",
            TokenKind::KeywordString => "KEYWORD_STRING",
            TokenKind::KeywordStart => "KEYWORD_START",
            TokenKind::KeywordElse => "KEYWORD_ELSE",
            TokenKind::KeywordEnd => "KEYWORD_END",
            TokenKind::KeywordWhile => "KEYWORD_WHILE",
            TokenKind::KeywordIf => "KEYWORD_IF",
            TokenKind::KeywordDo => "KEYWORD_DO",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::Number => "NUMBER",
            TokenKind::Str => "STRING",
            TokenKind::EndOfFile => "END_OF_FILE",
        };
        f.write_str(name)
    }
}

/// A token with its literal text and location in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token type
    pub kind: TokenKind,
    /// Literal text as it appeared in the source (quotes included for
    /// string literals)
    pub text: String,
    /// Byte offset of the token's first character
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    /// Checks if it is end of input
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::EndOfFile)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}` at {}", self.kind, self.text, self.position)
    }
}
