//! Parser for the twine language
//!
//! Predictive recursive descent with a single token of lookahead: every
//! production is selected from the current token type alone, and the
//! first mismatch aborts parsing of the whole program. Node spans are
//! stamped on entry to each production; the end offset is the offset
//! just past the last token the production consumed.

use crate::ast::*;
use twine_error::{CompileError, ErrorCode, Span};
use twine_lexer::{tokenize, Token, TokenKind};

/// The twine language parser
pub struct Parser {
    /// Tokens to be parsed, terminated by an end-of-file token
    tokens: Vec<Token>,
    /// Current position
    pos: usize,
}

impl Parser {
    /// Creates a new parser over a scanned token stream
    pub fn new(tokens: Vec<Token>) -> Self {
        assert!(
            tokens.last().is_some_and(|t| t.is_eof()),
            "token stream must be terminated by an end-of-file token"
        );
        Self { tokens, pos: 0 }
    }

    // =========================================
    // Helpers
    // =========================================

    /// Returns the current token without advancing
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    /// Byte offset of the current token, used as a production's begin
    fn begin(&self) -> usize {
        self.peek().position
    }

    /// Offset just past the most recently consumed token
    fn prev_end(&self) -> usize {
        let prev = &self.tokens[self.pos.saturating_sub(1)];
        prev.position + prev.text.chars().count()
    }

    /// Advances to the next token; the end-of-file token is sticky
    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Requires a token of the given type and consumes it
    fn expect(&mut self, kind: TokenKind) -> Result<Token, CompileError> {
        if self.peek().kind == kind {
            let token = self.tokens[self.pos].clone();
            self.advance();
            Ok(token)
        } else {
            Err(self.error_expecting(&kind.to_string()))
        }
    }

    /// Syntax error at the current token
    fn error_expecting(&self, expected: &str) -> CompileError {
        CompileError::new(
            self.peek().position,
            format!("Expect {}, got {}", expected, self.peek().kind),
        )
        .with_code(ErrorCode::UNEXPECTED_TOKEN)
    }

    // =========================================
    // Productions
    // =========================================

    /// Program := VarDecl ';' Statements
    fn parse_program(&mut self) -> Result<Program, CompileError> {
        let begin = self.begin();
        let variables = self.parse_var_declaration()?;
        self.expect(TokenKind::Semicolon)?;
        let statements = self.parse_statements()?;
        Ok(Program {
            variables,
            statements,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// VarDecl := 'string' Ident (',' Ident)*
    fn parse_var_declaration(&mut self) -> Result<VariableDeclaration, CompileError> {
        let begin = self.begin();
        let ty = self.expect(TokenKind::KeywordString)?.text;
        let mut identifiers = vec![self.expect(TokenKind::Identifier)?.text];

        loop {
            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                    identifiers.push(self.expect(TokenKind::Identifier)?.text);
                }
                TokenKind::Semicolon => break,
                _ => return Err(self.error_expecting("COMMA or SEMICOLON")),
            }
        }

        Ok(VariableDeclaration {
            ty,
            identifiers,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// Statements := Statement ';' (Statement ';')*
    fn parse_statements(&mut self) -> Result<Statements, CompileError> {
        let begin = self.begin();
        let mut statements = vec![self.parse_statement()?];
        self.expect(TokenKind::Semicolon)?;

        loop {
            match self.peek().kind {
                TokenKind::Identifier | TokenKind::KeywordIf | TokenKind::KeywordDo => {
                    statements.push(self.parse_statement()?);
                    self.expect(TokenKind::Semicolon)?;
                }
                TokenKind::EndOfFile | TokenKind::KeywordEnd => break,
                _ => {
                    return Err(self.error_expecting(
                        "IDENTIFIER, KEYWORD_IF, KEYWORD_DO, END_OF_FILE or KEYWORD_END",
                    ))
                }
            }
        }

        Ok(Statements {
            statements,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// Statement := Assign | If | DoWhile
    fn parse_statement(&mut self) -> Result<Statement, CompileError> {
        match self.peek().kind {
            TokenKind::Identifier => Ok(Statement::Assign(self.parse_assign_statement()?)),
            TokenKind::KeywordIf => Ok(Statement::If(self.parse_if_statement()?)),
            TokenKind::KeywordDo => Ok(Statement::DoWhile(self.parse_do_while_statement()?)),
            _ => Err(self.error_expecting("IDENTIFIER, KEYWORD_IF or KEYWORD_DO")),
        }
    }

    /// Assign := Ident '=' Expression
    fn parse_assign_statement(&mut self) -> Result<AssignStatement, CompileError> {
        let begin = self.begin();
        let variable = self.expect(TokenKind::Identifier)?.text;
        self.expect(TokenKind::OpAssignment)?;
        let expression = self.parse_expression()?;
        Ok(AssignStatement {
            variable,
            expression,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// If := 'if' '(' Condition ')' Nested 'else' Nested
    fn parse_if_statement(&mut self) -> Result<IfStatement, CompileError> {
        let begin = self.begin();
        self.expect(TokenKind::KeywordIf)?;
        self.expect(TokenKind::LeftBracket)?;
        let condition = self.parse_condition()?;
        self.expect(TokenKind::RightBracket)?;
        let true_action = self.parse_nested_statement()?;
        self.expect(TokenKind::KeywordElse)?;
        let false_action = self.parse_nested_statement()?;
        Ok(IfStatement {
            condition,
            true_action,
            false_action,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// DoWhile := 'do' Nested 'while' '(' Condition ')'
    fn parse_do_while_statement(&mut self) -> Result<DoWhileStatement, CompileError> {
        let begin = self.begin();
        self.expect(TokenKind::KeywordDo)?;
        let loop_action = self.parse_nested_statement()?;
        self.expect(TokenKind::KeywordWhile)?;
        self.expect(TokenKind::LeftBracket)?;
        let condition = self.parse_condition()?;
        self.expect(TokenKind::RightBracket)?;
        Ok(DoWhileStatement {
            condition,
            loop_action,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// Nested := Statement | 'start' Statements 'end'
    fn parse_nested_statement(&mut self) -> Result<Statements, CompileError> {
        let begin = self.begin();
        match self.peek().kind {
            TokenKind::Identifier | TokenKind::KeywordIf | TokenKind::KeywordDo => {
                let statement = self.parse_statement()?;
                Ok(Statements {
                    statements: vec![statement],
                    span: Span::new(begin, self.prev_end()),
                })
            }
            TokenKind::KeywordStart => {
                self.expect(TokenKind::KeywordStart)?;
                let mut statements = self.parse_statements()?;
                self.expect(TokenKind::KeywordEnd)?;
                statements.span = Span::new(begin, self.prev_end());
                Ok(statements)
            }
            _ => Err(self.error_expecting("IDENTIFIER, KEYWORD_IF, KEYWORD_DO or KEYWORD_START")),
        }
    }

    /// Expression := Item ('+' Item)*
    fn parse_expression(&mut self) -> Result<Expression, CompileError> {
        let begin = self.begin();
        let mut items = vec![self.parse_item()?];

        loop {
            match self.peek().kind {
                TokenKind::OpConcat => {
                    self.advance();
                    items.push(self.parse_item()?);
                }
                TokenKind::Semicolon
                | TokenKind::KeywordElse
                | TokenKind::KeywordWhile
                | TokenKind::RightBracket
                | TokenKind::OpLess
                | TokenKind::OpGreater
                | TokenKind::OpNotEqual
                | TokenKind::OpGreaterEqual
                | TokenKind::OpLessEqual
                | TokenKind::OpEqual => break,
                _ => {
                    return Err(self.error_expecting(
                        "OP_CONCAT, SEMICOLON, KEYWORD_ELSE, KEYWORD_WHILE, RIGHT_BRACKET, \
                         OP_LESS, OP_GREATER, OP_NOT_EQUAL, OP_GREATER_EQUAL, OP_LESS_EQUAL \
                         or OP_EQUAL",
                    ))
                }
            }
        }

        Ok(Expression {
            items,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// Item := Factor ('*' Number)*
    fn parse_item(&mut self) -> Result<Item, CompileError> {
        let begin = self.begin();
        let factor = self.parse_factor()?;
        let mut repeat_times = Vec::new();

        loop {
            match self.peek().kind {
                TokenKind::OpRepeat => {
                    self.advance();
                    let number = self.expect(TokenKind::Number)?;
                    let value = number.text.parse::<i64>().map_err(|_| {
                        CompileError::new(
                            number.position,
                            format!("Invalid number: {}", number.text),
                        )
                        .with_code(ErrorCode::INVALID_NUMBER)
                    })?;
                    repeat_times.push(value);
                }
                TokenKind::OpConcat
                | TokenKind::Semicolon
                | TokenKind::KeywordElse
                | TokenKind::KeywordWhile
                | TokenKind::RightBracket
                | TokenKind::OpLess
                | TokenKind::OpGreater
                | TokenKind::OpNotEqual
                | TokenKind::OpGreaterEqual
                | TokenKind::OpLessEqual
                | TokenKind::OpEqual => break,
                _ => {
                    return Err(self.error_expecting(
                        "OP_REPEAT, OP_CONCAT, SEMICOLON, KEYWORD_ELSE, KEYWORD_WHILE, \
                         RIGHT_BRACKET, OP_LESS, OP_GREATER, OP_NOT_EQUAL, OP_GREATER_EQUAL, \
                         OP_LESS_EQUAL or OP_EQUAL",
                    ))
                }
            }
        }

        Ok(Item {
            factor,
            repeat_times,
            span: Span::new(begin, self.prev_end()),
        })
    }

    /// Factor := Ident | String | '(' Expression ')'
    fn parse_factor(&mut self) -> Result<Factor, CompileError> {
        let begin = self.begin();
        match self.peek().kind {
            TokenKind::Identifier => {
                let identifier = self.expect(TokenKind::Identifier)?.text;
                Ok(Factor::Var {
                    identifier,
                    span: Span::new(begin, self.prev_end()),
                })
            }
            TokenKind::Str => {
                let raw = self.expect(TokenKind::Str)?.text;
                // cut the surrounding quotes
                let value = raw[1..raw.len() - 1].to_string();
                Ok(Factor::Str {
                    value,
                    span: Span::new(begin, self.prev_end()),
                })
            }
            TokenKind::LeftBracket => {
                self.expect(TokenKind::LeftBracket)?;
                let expression = self.parse_expression()?;
                self.expect(TokenKind::RightBracket)?;
                Ok(Factor::Paren {
                    expression,
                    span: Span::new(begin, self.prev_end()),
                })
            }
            _ => Err(self.error_expecting("IDENTIFIER, STRING or LEFT_BRACKET")),
        }
    }

    /// RelOp := '<' | '>' | '<=' | '>=' | '<>' | '=='
    fn parse_relation_op(&mut self) -> Result<RelOp, CompileError> {
        let op = match self.peek().kind {
            TokenKind::OpLess => RelOp::Less,
            TokenKind::OpGreater => RelOp::Greater,
            TokenKind::OpLessEqual => RelOp::LessEqual,
            TokenKind::OpGreaterEqual => RelOp::GreaterEqual,
            TokenKind::OpNotEqual => RelOp::NotEqual,
            TokenKind::OpEqual => RelOp::Equal,
            _ => {
                return Err(self.error_expecting(
                    "OP_LESS, OP_GREATER, OP_NOT_EQUAL, OP_GREATER_EQUAL, OP_LESS_EQUAL \
                     or OP_EQUAL",
                ))
            }
        };
        self.advance();
        Ok(op)
    }

    /// Condition := Expression RelOp Expression
    fn parse_condition(&mut self) -> Result<Condition, CompileError> {
        let begin = self.begin();
        let lhs = self.parse_expression()?;
        let op = self.parse_relation_op()?;
        let rhs = self.parse_expression()?;
        Ok(Condition {
            op,
            lhs,
            rhs,
            span: Span::new(begin, self.prev_end()),
        })
    }
}

/// Parses a token stream into a program, requiring that nothing follows it
pub fn parse(tokens: Vec<Token>) -> Result<Program, CompileError> {
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program()?;
    parser.expect(TokenKind::EndOfFile)?;
    Ok(program)
}

/// Scans and parses source text in one step
pub fn parse_source(source: &str) -> twine_error::Result<Program> {
    let tokens = tokenize(source)?;
    Ok(parse(tokens)?)
}
