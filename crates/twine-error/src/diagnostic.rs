//! Diagnostic - rustc-style error message rendering
//!
//! Turns a fatal error into a detailed message with:
//! - Error code (EL001, EP001, etc.)
//! - Precise location
//! - Source code snippet with a caret underline

use crate::span::Span;
use crate::Error;
use std::fmt;

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    /// Category (L = Lexer, P = Parser, T = Type, G = Codegen)
    pub category: char,
    /// Error number
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Lexer errors
    pub const UNRECOGNIZED_CHAR: Self = Self::new('L', 1);
    pub const BAD_STRING_CHAR: Self = Self::new('L', 2);

    // Parser errors
    pub const UNEXPECTED_TOKEN: Self = Self::new('P', 1);
    pub const INVALID_NUMBER: Self = Self::new('P', 2);

    // Type errors (raised during TAC generation)
    pub const TYPE_MISMATCH: Self = Self::new('T', 1);
    pub const UNKNOWN_IDENTIFIER: Self = Self::new('T', 2);
    pub const CONDITION_NOT_BOOL: Self = Self::new('T', 3);

    // Codegen errors
    pub const UNDEFINED_VARIABLE: Self = Self::new('G', 1);
    pub const DUPLICATE_VARIABLE: Self = Self::new('G', 2);
    pub const NEGATIVE_REPEAT: Self = Self::new('G', 3);
    pub const UNSUPPORTED_TYPE: Self = Self::new('G', 4);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A complete diagnostic, ready for rendering
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Error code (optional)
    pub code: Option<ErrorCode>,
    /// Main message
    pub message: String,
    /// Region of the source the diagnostic points at
    pub span: Span,
    /// Label printed under the caret (optional)
    pub label: Option<String>,
    /// Fix suggestion (optional)
    pub help: Option<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            code: None,
            message: message.into(),
            span,
            label: None,
            help: None,
        }
    }

    /// Sets the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a label under the caret
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Adds a fix suggestion
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl From<&Error> for Diagnostic {
    fn from(error: &Error) -> Self {
        Diagnostic {
            code: error.code(),
            message: error.message().to_string(),
            span: Span::point(error.position()),
            label: None,
            help: None,
        }
    }
}

/// Stores one compiled source file for rendering diagnostics
#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Byte offset of each line start (for fast lookup)
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Maps a byte offset to a (line, column) pair, both 1-indexed
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let line_idx = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let column = offset - self.line_starts[line_idx] + 1;
        (line_idx as u32 + 1, column as u32)
    }

    /// Returns the text of a line (1-indexed), without the newline
    pub fn get_line(&self, line: u32) -> Option<&str> {
        let line_idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(line_idx)?;
        let end = self
            .line_starts
            .get(line_idx + 1)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(self.source.len());

        Some(&self.source[start..end])
    }
}

/// Renders a diagnostic for display
pub struct DiagnosticRenderer<'a> {
    file: &'a SourceFile,
    use_colors: bool,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(file: &'a SourceFile) -> Self {
        Self {
            file,
            use_colors: true,
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    /// Renders the diagnostic as a string
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let mut output = String::new();

        let reset = if self.use_colors { "\x1b[0m" } else { "" };
        let red = if self.use_colors { "\x1b[1;31m" } else { "" };
        let bold = if self.use_colors { "\x1b[1m" } else { "" };
        let blue = if self.use_colors { "\x1b[1;34m" } else { "" };

        // Line 1: error[EP001]: message
        output.push_str(red);
        output.push_str("error");
        if let Some(code) = &diagnostic.code {
            output.push('[');
            output.push_str(&code.to_string());
            output.push(']');
        }
        output.push_str(reset);
        output.push_str(bold);
        output.push_str(": ");
        output.push_str(&diagnostic.message);
        output.push_str(reset);
        output.push('\n');

        // --> file:line:column
        let offset = diagnostic.span.begin.min(self.file.source.len());
        let (line, column) = self.file.line_col(offset);
        output.push_str(&format!(
            " {}-->{} {}:{}:{}\n",
            blue, reset, self.file.name, line, column
        ));

        // Snippet with caret underline
        if let Some(line_content) = self.file.get_line(line) {
            let line_num_width = line.to_string().len();
            let padding = " ".repeat(line_num_width);

            output.push_str(&format!(" {} {}|{}\n", padding, blue, reset));
            output.push_str(&format!(
                " {}{}{} {}|{} {}\n",
                blue, line, reset, blue, reset, line_content
            ));

            let col_start = column as usize;
            let underline_len = diagnostic.span.len().clamp(1, line_content.len().max(1));
            let spaces = " ".repeat(col_start.saturating_sub(1));
            let underline = "^".repeat(underline_len);
            let label = diagnostic.label.as_deref().unwrap_or("");

            output.push_str(&format!(
                " {} {}|{} {}{}{}{} {}\n",
                padding, blue, reset, spaces, red, underline, reset, label
            ));
        }

        // Suggestion
        if let Some(help) = &diagnostic.help {
            let green = if self.use_colors { "\x1b[1;32m" } else { "" };
            output.push_str(&format!("   = {}help{}: {}\n", green, reset, help));
        }

        output
    }
}
