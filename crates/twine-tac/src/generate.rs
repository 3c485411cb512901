//! TAC generation
//!
//! A single pass over the syntax tree that emits the flat instruction
//! list and performs the language's one static check: every expression
//! resolves to `string` or `bool`, and operand types must match exactly.
//! The first mismatch aborts generation.
//!
//! Forward jumps use a two-pass backpatch scheme: the jump is emitted
//! with an unresolved label and patched once its destination index is
//! known. Generation is deterministic: the same tree always yields the
//! same temporary and label numbering.

use crate::instruction::{Dest, Instruction, Label, Literal, Opcode, Ty, Value, Variable};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use twine_error::{CompileError, ErrorCode, Spanned};
use twine_parser::{
    AssignStatement, Condition, DoWhileStatement, Expression, Factor, IfStatement, Item, Program,
    RelOp, Statement, Statements, VariableDeclaration,
};

/// The linear IR of one program
#[derive(Debug)]
pub struct Tac {
    pub instructions: Vec<Instruction>,
    /// Declared variables and generated temporaries, keyed by name
    pub variable_table: BTreeMap<String, Variable>,
    /// Interned literals, deduplicated by (type, value)
    pub literal_table: BTreeSet<Literal>,
    /// Temporaries minted so far; names are `T{count}`
    temp_count: usize,
}

impl Tac {
    /// Generates the linear IR for a parsed program. One `Tac` is built
    /// per program and never reused.
    pub fn generate(program: &Program) -> Result<Tac, CompileError> {
        let mut tac = Tac {
            instructions: Vec::new(),
            variable_table: BTreeMap::new(),
            literal_table: BTreeSet::new(),
            temp_count: 0,
        };
        tac.translate_variable_declaration(&program.variables)?;
        tac.translate_statements(&program.statements)?;

        debug_assert!(
            tac.instructions.iter().all(|inst| match &inst.result {
                Dest::Label(label) => label.is_resolved(),
                Dest::Variable(_) => true,
            }),
            "unresolved jump target after generation"
        );

        Ok(tac)
    }

    /// Index the next emitted instruction will occupy
    fn next_q(&self) -> usize {
        self.instructions.len()
    }

    /// Mints a fresh temporary and registers it in the symbol table
    fn temp_var(&mut self, ty: Ty) -> Variable {
        self.temp_count += 1;
        let var = Variable {
            name: format!("T{}", self.temp_count),
            ty,
            temporary: true,
        };
        self.variable_table.insert(var.name.clone(), var.clone());
        var
    }

    fn lookup_var(&self, name: &str, position: usize) -> Result<Variable, CompileError> {
        self.variable_table.get(name).cloned().ok_or_else(|| {
            CompileError::new(position, format!("Unknown identifier: {}", name))
                .with_code(ErrorCode::UNKNOWN_IDENTIFIER)
        })
    }

    fn emit(&mut self, op: Opcode, arg1: Option<Value>, arg2: Option<Value>, result: Dest) {
        self.instructions.push(Instruction {
            op,
            arg1,
            arg2,
            result,
        });
    }

    fn make_literal(&mut self, value: impl Into<String>, ty: Ty) -> Literal {
        let literal = Literal {
            ty,
            value: value.into(),
        };
        self.literal_table.insert(literal.clone());
        literal
    }

    /// Backpatches the jump at `index`. Each placeholder is patched
    /// exactly once.
    fn patch(&mut self, index: usize, target: usize) {
        match &mut self.instructions[index].result {
            Dest::Label(label) => {
                debug_assert!(!label.is_resolved(), "jump target patched twice");
                label.num = target;
            }
            Dest::Variable(_) => unreachable!("patched instruction is not a jump"),
        }
    }

    fn translate_variable_declaration(
        &mut self,
        node: &VariableDeclaration,
    ) -> Result<(), CompileError> {
        let ty = Ty::from_declared(&node.ty).ok_or_else(|| {
            CompileError::new(
                node.span.begin,
                format!("Unsupported variable type: {}", node.ty),
            )
            .with_code(ErrorCode::UNSUPPORTED_TYPE)
        })?;
        for identifier in &node.identifiers {
            self.variable_table.insert(
                identifier.clone(),
                Variable {
                    name: identifier.clone(),
                    ty,
                    temporary: false,
                },
            );
        }
        Ok(())
    }

    fn translate_statements(&mut self, node: &Statements) -> Result<(), CompileError> {
        for statement in &node.statements {
            self.translate_statement(statement)?;
        }
        Ok(())
    }

    fn translate_statement(&mut self, node: &Statement) -> Result<(), CompileError> {
        match node {
            Statement::Assign(assign) => self.translate_assign_statement(assign),
            Statement::If(if_stmt) => self.translate_if_statement(if_stmt),
            Statement::DoWhile(do_while) => self.translate_do_while_statement(do_while),
        }
    }

    fn translate_assign_statement(&mut self, node: &AssignStatement) -> Result<(), CompileError> {
        let variable = self.lookup_var(&node.variable, node.span.begin)?;
        let expression = self.translate_expression(&node.expression)?;
        if variable.ty != expression.ty() {
            return Err(CompileError::new(
                node.span.begin,
                format!(
                    "Type mismatch in assignment: {} vs {}",
                    variable.ty,
                    expression.ty()
                ),
            )
            .with_code(ErrorCode::TYPE_MISMATCH));
        }
        self.emit(Opcode::Assign, Some(expression), None, Dest::Variable(variable));
        Ok(())
    }

    fn translate_if_statement(&mut self, node: &IfStatement) -> Result<(), CompileError> {
        let condition = self.translate_condition(&node.condition)?;
        if condition.ty() != Ty::Bool {
            return Err(CompileError::new(
                node.condition.span.begin,
                format!("If condition is not bool, actual: {}", condition.ty()),
            )
            .with_code(ErrorCode::CONDITION_NOT_BOOL));
        }

        // jnz skips the unconditional jump that follows it
        let true_exit = Label::new(self.next_q() + 2);
        self.emit(Opcode::JumpIfTrue, Some(condition), None, Dest::Label(true_exit));

        let false_exit_at = self.next_q();
        self.emit(Opcode::Jump, None, None, Dest::Label(Label::UNRESOLVED));

        self.translate_statements(&node.true_action)?;

        let if_exit_at = self.next_q();
        self.emit(Opcode::Jump, None, None, Dest::Label(Label::UNRESOLVED));

        self.patch(false_exit_at, self.next_q());
        self.translate_statements(&node.false_action)?;
        self.patch(if_exit_at, self.next_q());
        Ok(())
    }

    fn translate_do_while_statement(
        &mut self,
        node: &DoWhileStatement,
    ) -> Result<(), CompileError> {
        let loop_label = Label::new(self.next_q());
        self.translate_statements(&node.loop_action)?;
        let condition = self.translate_condition(&node.condition)?;
        if condition.ty() != Ty::Bool {
            return Err(CompileError::new(
                node.condition.span.begin,
                format!("Do-while condition is not bool, actual: {}", condition.ty()),
            )
            .with_code(ErrorCode::CONDITION_NOT_BOOL));
        }
        self.emit(Opcode::JumpIfTrue, Some(condition), None, Dest::Label(loop_label));
        Ok(())
    }

    fn translate_expression(&mut self, node: &Expression) -> Result<Value, CompileError> {
        let mut x = self.translate_item(&node.items[0])?;
        for item in &node.items[1..] {
            let y = self.translate_item(item)?;
            if x.ty() != Ty::Str {
                return Err(CompileError::new(
                    node.items[0].span.begin,
                    "Concat operation requires string operands",
                )
                .with_code(ErrorCode::TYPE_MISMATCH));
            }
            if y.ty() != Ty::Str {
                return Err(CompileError::new(
                    item.span.begin,
                    "Concat operation requires string operands",
                )
                .with_code(ErrorCode::TYPE_MISMATCH));
            }
            let tmp = self.temp_var(Ty::Str);
            self.emit(Opcode::Concat, Some(x), Some(y), Dest::Variable(tmp.clone()));
            x = Value::Variable(tmp);
        }
        Ok(x)
    }

    fn translate_condition(&mut self, node: &Condition) -> Result<Value, CompileError> {
        let x = self.translate_expression(&node.lhs)?;
        let y = self.translate_expression(&node.rhs)?;
        if x.ty() != Ty::Str {
            return Err(CompileError::new(
                node.lhs.span.begin,
                "Relation operator requires string operands",
            )
            .with_code(ErrorCode::TYPE_MISMATCH));
        }
        if y.ty() != Ty::Str {
            return Err(CompileError::new(
                node.rhs.span.begin,
                "Relation operator requires string operands",
            )
            .with_code(ErrorCode::TYPE_MISMATCH));
        }
        let op = match node.op {
            RelOp::Less => Opcode::Less,
            RelOp::Greater => Opcode::Greater,
            RelOp::LessEqual => Opcode::LessEqual,
            RelOp::GreaterEqual => Opcode::GreaterEqual,
            RelOp::NotEqual => Opcode::NotEqual,
            RelOp::Equal => Opcode::Equal,
        };
        let tmp = self.temp_var(Ty::Bool);
        self.emit(op, Some(x), Some(y), Dest::Variable(tmp.clone()));
        Ok(Value::Variable(tmp))
    }

    fn translate_item(&mut self, node: &Item) -> Result<Value, CompileError> {
        let mut x = self.translate_factor(&node.factor)?;
        for &repeat_time in &node.repeat_times {
            if x.ty() != Ty::Str {
                return Err(CompileError::new(
                    node.factor.span().begin,
                    "Repeat operator requires string operands",
                )
                .with_code(ErrorCode::TYPE_MISMATCH));
            }
            let tmp = self.temp_var(Ty::Str);
            let arg2 = self.make_literal(repeat_time.to_string(), Ty::Int);
            self.emit(
                Opcode::Repeat,
                Some(x),
                Some(Value::Literal(arg2)),
                Dest::Variable(tmp.clone()),
            );
            x = Value::Variable(tmp);
        }
        Ok(x)
    }

    fn translate_factor(&mut self, node: &Factor) -> Result<Value, CompileError> {
        match node {
            Factor::Str { value, .. } => {
                Ok(Value::Literal(self.make_literal(value.clone(), Ty::Str)))
            }
            Factor::Var { identifier, span } => {
                Ok(Value::Variable(self.lookup_var(identifier, span.begin)?))
            }
            Factor::Paren { expression, .. } => self.translate_expression(expression),
        }
    }
}

impl fmt::Display for Tac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Variables:")?;
        for variable in self.variable_table.values() {
            write!(f, "{} {}", variable.ty, variable.name)?;
            if variable.temporary {
                write!(f, " (temporary)")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\nLiterals:")?;
        for literal in &self.literal_table {
            writeln!(f, "{} {}", literal.ty, literal.value)?;
        }

        writeln!(f, "\nInstructions:")?;
        for (idx, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "({}) {}", idx, instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use twine_parser::parse_source;

    fn tac_for(source: &str) -> Tac {
        let program = parse_source(source).expect("source should parse");
        Tac::generate(&program).expect("program should generate")
    }

    fn tac_err(source: &str) -> CompileError {
        let program = parse_source(source).expect("source should parse");
        Tac::generate(&program).expect_err("generation should fail")
    }

    #[test]
    fn test_assignment_listing() {
        let tac = tac_for("string a; a=\"ab\"+\"cd\";");
        assert_eq!(
            tac.to_string(),
            "Variables:\n\
             string T1 (temporary)\n\
             string a\n\
             \n\
             Literals:\n\
             string ab\n\
             string cd\n\
             \n\
             Instructions:\n\
             (0) (+, ab, cd, T1)\n\
             (1) (=, T1, null, a)\n"
        );
    }

    #[test]
    fn test_if_backpatching() {
        let tac = tac_for("string a; if (a == \"x\") a=\"y\" else a=\"z\";");
        let rendered: Vec<String> = tac.instructions.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "(==, a, x, T1)",
                "(jnz, T1, null, 3)",
                "(j, null, null, 5)",
                "(=, y, null, a)",
                "(j, null, null, 6)",
                "(=, z, null, a)",
            ]
        );
    }

    #[test]
    fn test_do_while_back_edge() {
        let tac = tac_for("string a; do a=a+\"x\" while (a < \"yy\");");
        let rendered: Vec<String> = tac.instructions.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "(+, a, x, T1)",
                "(=, T1, null, a)",
                "(<, a, yy, T2)",
                "(jnz, T2, null, 0)",
            ]
        );
    }

    #[test]
    fn test_repeat_counts_become_int_literals() {
        let tac = tac_for("string a; a=\"x\"*2*3;");
        let rendered: Vec<String> = tac.instructions.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["(*, x, 2, T1)", "(*, T1, 3, T2)", "(=, T2, null, a)"]
        );
        assert!(tac.literal_table.contains(&Literal {
            ty: Ty::Int,
            value: "2".to_string()
        }));
    }

    #[test]
    fn test_literals_are_deduplicated() {
        let tac = tac_for("string a; a=\"x\"+\"x\"+\"x\";");
        let strings: Vec<&Literal> = tac
            .literal_table
            .iter()
            .filter(|l| l.ty == Ty::Str)
            .collect();
        assert_eq!(strings.len(), 1);
    }

    #[test]
    fn test_all_labels_resolved_in_nested_control_flow() {
        let tac = tac_for(
            "string a, b; \
             do start \
               if (a == b) a=a+\"x\" else start b=b+\"y\"; a=b; end; \
             end while (a <= \"zzz\");",
        );
        for instruction in &tac.instructions {
            if let Dest::Label(label) = &instruction.result {
                assert!(label.is_resolved());
                assert!(label.num <= tac.instructions.len());
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let program =
            parse_source("string a, b; if (a < b) a=b*2 else b=a+\"x\"; do a=a while (a==b);")
                .expect("source should parse");
        let first = Tac::generate(&program).expect("program should generate");
        let second = Tac::generate(&program).expect("program should generate");
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_unknown_identifier() {
        let err = tac_err("string a; b=\"x\";");
        assert_eq!(err.message, "Unknown identifier: b");
        assert_eq!(err.position, 10);
    }

    #[test]
    fn test_unknown_identifier_in_expression() {
        let err = tac_err("string a; a=a+c;");
        assert_eq!(err.message, "Unknown identifier: c");
        assert_eq!(err.position, 14);
    }
}
