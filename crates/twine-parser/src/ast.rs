//! AST - Abstract syntax tree for the twine language
//!
//! Every node carries the byte-offset span of the source region it was
//! parsed from. The tree is exclusively owned parent-to-child and is
//! never mutated after parsing; both generators walk it read-only.
//!
//! The `Serialize` impls reproduce the compiler's debug JSON dump:
//! statements and factors are tagged objects (`{"type": "assign", ...}`),
//! expressions and statement lists are plain arrays.

use serde::Serialize;
use twine_error::{Span, Spanned};

/// Complete program: one leading declaration, then statements
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub variables: VariableDeclaration,
    pub statements: Statements,
    #[serde(skip)]
    pub span: Span,
}

/// `string a, b, c` - the single declaration a program starts with
#[derive(Debug, Clone, Serialize)]
pub struct VariableDeclaration {
    /// Declared type name as written. Only `string` exists today; the
    /// field is the hook for future types and is validated downstream.
    #[serde(rename = "type")]
    pub ty: String,
    /// Declared names, in declaration order
    pub identifiers: Vec<String>,
    #[serde(skip)]
    pub span: Span,
}

/// Ordered statement list
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Statements {
    pub statements: Vec<Statement>,
    #[serde(skip)]
    pub span: Span,
}

/// A single statement
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    Assign(AssignStatement),
    If(IfStatement),
    DoWhile(DoWhileStatement),
}

/// `x = expression`
#[derive(Debug, Clone, Serialize)]
pub struct AssignStatement {
    pub variable: String,
    pub expression: Expression,
    #[serde(skip)]
    pub span: Span,
}

/// `if (condition) ... else ...`
#[derive(Debug, Clone, Serialize)]
pub struct IfStatement {
    pub condition: Condition,
    pub true_action: Statements,
    pub false_action: Statements,
    #[serde(skip)]
    pub span: Span,
}

/// `do ... while (condition)`
#[derive(Debug, Clone, Serialize)]
pub struct DoWhileStatement {
    pub condition: Condition,
    pub loop_action: Statements,
    #[serde(skip)]
    pub span: Span,
}

/// Items combined left-to-right by concatenation
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Expression {
    pub items: Vec<Item>,
    #[serde(skip)]
    pub span: Span,
}

/// One factor with its trailing `* n` repeat counts, applied in order
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub factor: Factor,
    pub repeat_times: Vec<i64>,
    #[serde(skip)]
    pub span: Span,
}

/// The atoms of an expression
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Factor {
    /// String literal, quotes already stripped
    #[serde(rename = "string")]
    Str {
        value: String,
        #[serde(skip)]
        span: Span,
    },
    /// Variable reference
    #[serde(rename = "variable")]
    Var {
        identifier: String,
        #[serde(skip)]
        span: Span,
    },
    /// Parenthesized subexpression
    #[serde(rename = "expression")]
    Paren {
        expression: Expression,
        #[serde(skip)]
        span: Span,
    },
}

/// `lhs relop rhs`
#[derive(Debug, Clone, Serialize)]
pub struct Condition {
    pub op: RelOp,
    pub lhs: Expression,
    pub rhs: Expression,
    #[serde(skip)]
    pub span: Span,
}

/// Relational operators. Ordering operators compare string lengths only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelOp {
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    NotEqual,
    Equal,
}

impl std::fmt::Display for RelOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            RelOp::Less => "<",
            RelOp::Greater => ">",
            RelOp::LessEqual => "<=",
            RelOp::GreaterEqual => ">=",
            RelOp::NotEqual => "<>",
            RelOp::Equal => "==",
        };
        f.write_str(symbol)
    }
}

impl Spanned for Program {
    fn span(&self) -> Span {
        self.span
    }
}

impl Spanned for Statements {
    fn span(&self) -> Span {
        self.span
    }
}

impl Spanned for Statement {
    fn span(&self) -> Span {
        match self {
            Statement::Assign(s) => s.span,
            Statement::If(s) => s.span,
            Statement::DoWhile(s) => s.span,
        }
    }
}

impl Spanned for Expression {
    fn span(&self) -> Span {
        self.span
    }
}

impl Spanned for Item {
    fn span(&self) -> Span {
        self.span
    }
}

impl Spanned for Factor {
    fn span(&self) -> Span {
        match self {
            Factor::Str { span, .. } | Factor::Var { span, .. } | Factor::Paren { span, .. } => {
                *span
            }
        }
    }
}

impl Spanned for Condition {
    fn span(&self) -> Span {
        self.span
    }
}
