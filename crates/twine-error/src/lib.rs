//! twine-error - Diagnostics system for the twine compiler
//!
//! Compilation fails fast: the first lexical, syntax or semantic error
//! aborts the whole pipeline and any partial output is discarded. This
//! crate defines the two fatal error kinds, the byte-offset spans they
//! carry, and a renderer that turns them into rustc-style messages with
//! source snippets.
//!
//! # Example
//!
//! ```rust
//! use twine_error::{CompileError, Diagnostic, DiagnosticRenderer, Error, SourceFile};
//!
//! let file = SourceFile::new("example.tw", "string a;\nb=\"x\";");
//! let error: Error = CompileError::new(10, "Undefined variable: b").into();
//!
//! let renderer = DiagnosticRenderer::new(&file).without_colors();
//! println!("{}", renderer.render(&Diagnostic::from(&error)));
//! ```

pub mod diagnostic;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticRenderer, ErrorCode, SourceFile};
pub use span::{Span, Spanned};

use thiserror::Error;

/// Error raised by the scanner for input it cannot tokenize
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("At position {position}: {message}")]
pub struct LexicalError {
    /// Byte offset of the offending character
    pub position: usize,
    /// Human-readable description
    pub message: String,
    /// Structured code for rendered diagnostics
    pub code: Option<ErrorCode>,
}

impl LexicalError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }
}

/// Error raised past the scanner: syntax errors, the static type check,
/// undefined or duplicate variables, negative repeat counts, unsupported
/// declared types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("At position {position}: {message}")]
pub struct CompileError {
    /// Byte offset of the offending token or node
    pub position: usize,
    /// Human-readable description
    pub message: String,
    /// Structured code for rendered diagnostics
    pub code: Option<ErrorCode>,
}

impl CompileError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }
}

/// Any fatal compilation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl Error {
    /// Byte offset the diagnostic is anchored at
    pub fn position(&self) -> usize {
        match self {
            Error::Lexical(e) => e.position,
            Error::Compile(e) => e.position,
        }
    }

    /// The bare message, without the position prefix
    pub fn message(&self) -> &str {
        match self {
            Error::Lexical(e) => &e.message,
            Error::Compile(e) => &e.message,
        }
    }

    /// Structured code, if the error site attached one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Lexical(e) => e.code,
            Error::Compile(e) => e.code,
        }
    }
}

/// Default Result type for operations that may fail with a fatal error
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CompileError::new(17, "Expect SEMICOLON, got END_OF_FILE");
        assert_eq!(
            error.to_string(),
            "At position 17: Expect SEMICOLON, got END_OF_FILE"
        );
    }

    #[test]
    fn test_error_position() {
        let error: Error = LexicalError::new(3, "Unrecognized character").into();
        assert_eq!(error.position(), 3);
        assert_eq!(error.message(), "Unrecognized character");
    }
}
