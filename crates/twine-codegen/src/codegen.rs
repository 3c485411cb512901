//! Lowering code generator
//!
//! Walks the syntax tree and lowers it into the low-level IR,
//! synthesizing the runtime string semantics as explicit control flow:
//! length scans, heap allocation, repetition and concatenation copy
//! loops, short-circuiting equality, and the length-only ordering
//! comparison. No pre-existing string routine is assumed; the only
//! external calls are `malloc`/`free` (modeled as typed instructions)
//! and `printf` for the final variable dump.
//!
//! Ownership discipline: every value flowing through an expression is
//! either owned (freshly heap-allocated, released exactly once when a
//! combining operation consumes it or when it moves into a variable
//! slot) or borrowed (a variable load or a literal's static buffer,
//! never implicitly freed). Variable slots hold null or an exclusively
//! owned buffer; freeing null is a no-op.

use crate::ir::{Function, IcmpOp, IrType, Module, SlotId, Value};
use twine_error::{CompileError, ErrorCode};
use twine_parser::{
    AssignStatement, Condition, DoWhileStatement, Expression, Factor, IfStatement, Item, Program,
    RelOp, Statement, Statements, VariableDeclaration,
};

/// A string value produced while lowering an expression
enum StrVal {
    /// Freshly heap-allocated by the current expression; the expression
    /// walker owns it until it is consumed or stored
    Owned { ptr: Value, len: Value },
    /// View of a variable slot's buffer or a literal's static buffer.
    /// The length is known up front for literals and cached once scanned.
    Borrowed { ptr: Value, len: Option<Value> },
}

impl StrVal {
    fn ptr(&self) -> Value {
        match self {
            StrVal::Owned { ptr, .. } | StrVal::Borrowed { ptr, .. } => *ptr,
        }
    }

    fn is_owned(&self) -> bool {
        matches!(self, StrVal::Owned { .. })
    }

    fn known_len(&self) -> Option<Value> {
        match self {
            StrVal::Owned { len, .. } => Some(*len),
            StrVal::Borrowed { len, .. } => *len,
        }
    }
}

/// Lowers one program. An instance is private to a single compilation
/// and is not reused.
pub struct CodeGen {
    module: Module,
    func: Function,
    /// Declared variables in declaration order; the final dump and the
    /// epilogue frees walk this order
    variables: Vec<(String, SlotId)>,
}

impl CodeGen {
    /// Lowers a parsed program into a low-level module
    pub fn generate(program: &Program) -> Result<Module, CompileError> {
        tracing::debug!(
            variables = program.variables.identifiers.len(),
            statements = program.statements.statements.len(),
            "lowering program"
        );

        let mut codegen = CodeGen {
            module: Module::new("program"),
            func: Function::new("main"),
            variables: Vec::new(),
        };
        codegen.visit_program(program)?;

        let CodeGen { mut module, func, .. } = codegen;
        tracing::debug!(blocks = func.blocks.len(), "lowering complete");
        module.add_function(func);
        Ok(module)
    }

    fn lookup_slot(&self, name: &str) -> Option<SlotId> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| *slot)
    }

    // =========================================
    // Runtime string operations
    // =========================================

    /// Emits a byte-counting scan: walk forward from `ptr` until the
    /// zero terminator. Returns the length.
    fn emit_strlen(&mut self, ptr: Value) -> Value {
        let f = &mut self.func;
        let idx_slot = f.add_slot("_strlen_idx", IrType::I64);
        let loop_block = f.add_block("_strlen_loop");
        let cont = f.add_block("_strlen_cont");

        f.store(IrType::I64, Value::Const(0), Value::Slot(idx_slot));
        f.branch(loop_block);

        f.set_insert_point(loop_block);
        let idx = f.load(IrType::I64, Value::Slot(idx_slot));
        let addr = f.gep(ptr, idx);
        let val = f.load(IrType::I8, addr);
        let is_zero = f.icmp(IcmpOp::Eq, val, Value::Const(0));
        let next = f.add(idx, Value::Const(1));
        f.store(IrType::I64, next, Value::Slot(idx_slot));
        f.cond_branch(is_zero, cont, loop_block);

        f.set_insert_point(cont);
        idx
    }

    /// Reserves `len + 1` heap bytes, leaving room for the terminator
    fn emit_alloc(&mut self, len: Value) -> Value {
        let size = self.func.add(len, Value::Const(1));
        self.func.malloc(size)
    }

    /// Consumes a value. Owned buffers get their free emitted here,
    /// exactly once; borrowed values are left alone.
    fn release(&mut self, val: StrVal) {
        if let StrVal::Owned { ptr, .. } = val {
            self.func.free(ptr);
        }
    }

    /// The value's length: reuses a statically known length, otherwise
    /// emits a strlen scan and caches the result
    fn length_of(&mut self, val: &mut StrVal) -> Value {
        if let Some(len) = val.known_len() {
            return len;
        }
        let len = self.emit_strlen(val.ptr());
        if let StrVal::Borrowed { len: cached, .. } = val {
            *cached = Some(len);
        }
        len
    }

    /// Emits the string equality CFG: false on length mismatch, true
    /// when both are empty, a first-byte check, then a short-circuiting
    /// loop over the remaining bytes. Returns the boolean result.
    fn emit_equals(&mut self, a: Value, len_a: Value, b: Value, len_b: Value) -> Value {
        let f = &mut self.func;
        let res_slot = f.add_slot("_streq_res", IrType::Bool);
        let idx_slot = f.add_slot("_streq_idx", IrType::I64);

        let check_empty = f.add_block("_streq_check_empty");
        let on_empty = f.add_block("_streq_on_empty");
        let check_first = f.add_block("_streq_check_first");
        let loop_inc = f.add_block("_streq_loop_increment");
        let loop_body = f.add_block("_streq_loop_body");
        let loop_end = f.add_block("_streq_loop_end");
        let cont = f.add_block("_streq_cont");

        f.store(IrType::Bool, Value::Bool(false), Value::Slot(res_slot));
        let same_len = f.icmp(IcmpOp::Eq, len_a, len_b);
        f.cond_branch(same_len, check_empty, cont);

        f.set_insert_point(check_empty);
        let empty = f.icmp(IcmpOp::Eq, len_a, Value::Const(0));
        f.cond_branch(empty, on_empty, check_first);

        f.set_insert_point(on_empty);
        f.store(IrType::Bool, Value::Bool(true), Value::Slot(res_slot));
        f.branch(cont);

        f.set_insert_point(check_first);
        let first_a = f.load(IrType::I8, a);
        let first_b = f.load(IrType::I8, b);
        let same_first = f.icmp(IcmpOp::Eq, first_a, first_b);
        f.store(IrType::I64, Value::Const(0), Value::Slot(idx_slot));
        f.cond_branch(same_first, loop_inc, cont);

        f.set_insert_point(loop_inc);
        let old_idx = f.load(IrType::I64, Value::Slot(idx_slot));
        let idx = f.add(old_idx, Value::Const(1));
        f.store(IrType::I64, idx, Value::Slot(idx_slot));
        let finished = f.icmp(IcmpOp::Eq, idx, len_a);
        f.cond_branch(finished, loop_end, loop_body);

        f.set_insert_point(loop_body);
        let addr_a = f.gep(a, idx);
        let val_a = f.load(IrType::I8, addr_a);
        let addr_b = f.gep(b, idx);
        let val_b = f.load(IrType::I8, addr_b);
        let same_val = f.icmp(IcmpOp::Eq, val_a, val_b);
        f.cond_branch(same_val, loop_inc, loop_end);

        f.set_insert_point(loop_end);
        // the loop completed iff the index reached the length
        let streq = f.icmp(IcmpOp::Eq, idx, len_a);
        f.store(IrType::Bool, streq, Value::Slot(res_slot));
        f.branch(cont);

        f.set_insert_point(cont);
        f.load(IrType::Bool, Value::Slot(res_slot))
    }

    // =========================================
    // Tree walk
    // =========================================

    fn visit_program(&mut self, node: &Program) -> Result<(), CompileError> {
        self.visit_variable_declaration(&node.variables)?;
        self.visit_statements(&node.statements)?;
        self.emit_print_variables();

        // every slot's buffer dies exactly once, in declaration order
        for (_, slot) in self.variables.clone() {
            let var = self.func.load(IrType::Ptr, Value::Slot(slot));
            self.func.free(var);
        }
        self.func.ret(Value::Const(0));
        Ok(())
    }

    fn visit_variable_declaration(
        &mut self,
        node: &VariableDeclaration,
    ) -> Result<(), CompileError> {
        if node.ty != "string" {
            return Err(CompileError::new(
                node.span.begin,
                format!("Unsupported variable type: {}", node.ty),
            )
            .with_code(ErrorCode::UNSUPPORTED_TYPE));
        }
        for name in &node.identifiers {
            if self.lookup_slot(name).is_some() {
                return Err(CompileError::new(
                    node.span.begin,
                    format!("Variable is already defined: {}", name),
                )
                .with_code(ErrorCode::DUPLICATE_VARIABLE));
            }
            let slot = self.func.add_slot(name.clone(), IrType::Ptr);
            self.func.store(IrType::Ptr, Value::Null, Value::Slot(slot));
            self.variables.push((name.clone(), slot));
        }
        Ok(())
    }

    fn visit_statements(&mut self, node: &Statements) -> Result<(), CompileError> {
        for statement in &node.statements {
            self.visit_statement(statement)?;
        }
        Ok(())
    }

    fn visit_statement(&mut self, node: &Statement) -> Result<(), CompileError> {
        match node {
            Statement::Assign(assign) => self.visit_assign_statement(assign),
            Statement::If(if_stmt) => self.visit_if_statement(if_stmt),
            Statement::DoWhile(do_while) => self.visit_do_while_statement(do_while),
        }
    }

    fn visit_assign_statement(&mut self, node: &AssignStatement) -> Result<(), CompileError> {
        let slot = self.lookup_slot(&node.variable).ok_or_else(|| {
            CompileError::new(
                node.span.begin,
                format!("Undefined variable: {}", node.variable),
            )
            .with_code(ErrorCode::UNDEFINED_VARIABLE)
        })?;
        let mut expr = self.visit_expression(&node.expression)?;

        if expr.is_owned() {
            // the slot's previous buffer dies (free is null-safe), then
            // ownership moves straight in
            let old = self.func.load(IrType::Ptr, Value::Slot(slot));
            self.func.free(old);
            self.func.store(IrType::Ptr, expr.ptr(), Value::Slot(slot));
        } else {
            // defensive copy so the slot ends up exclusively owning its
            // buffer. The copy happens before the old buffer dies: the
            // right-hand side may be the slot's own buffer (a = a).
            let len = self.length_of(&mut expr);
            let size = self.func.add(len, Value::Const(1));
            let dst = self.func.malloc(size);
            self.func.memcpy(dst, expr.ptr(), size);
            let old = self.func.load(IrType::Ptr, Value::Slot(slot));
            self.func.free(old);
            self.func.store(IrType::Ptr, dst, Value::Slot(slot));
        }
        Ok(())
    }

    fn visit_if_statement(&mut self, node: &IfStatement) -> Result<(), CompileError> {
        let true_block = self.func.add_block("if_true");
        let false_block = self.func.add_block("if_false");
        let cont_block = self.func.add_block("if_cont");

        let cond = self.visit_condition(&node.condition)?;
        self.func.cond_branch(cond, true_block, false_block);

        self.func.set_insert_point(true_block);
        self.visit_statements(&node.true_action)?;
        self.func.branch(cont_block);

        self.func.set_insert_point(false_block);
        self.visit_statements(&node.false_action)?;
        self.func.branch(cont_block);

        self.func.set_insert_point(cont_block);
        Ok(())
    }

    fn visit_do_while_statement(&mut self, node: &DoWhileStatement) -> Result<(), CompileError> {
        let loop_block = self.func.add_block("dowhile_loop");
        let cont_block = self.func.add_block("dowhile_cont");
        self.func.branch(loop_block);

        self.func.set_insert_point(loop_block);
        self.visit_statements(&node.loop_action)?;
        let cond = self.visit_condition(&node.condition)?;
        self.func.cond_branch(cond, loop_block, cont_block);

        self.func.set_insert_point(cont_block);
        Ok(())
    }

    fn visit_condition(&mut self, node: &Condition) -> Result<Value, CompileError> {
        let mut lhs = self.visit_expression(&node.lhs)?;
        let lhs_len = self.length_of(&mut lhs);

        match node.op {
            RelOp::Equal | RelOp::NotEqual => {
                let mut rhs = self.visit_expression(&node.rhs)?;
                let rhs_len = self.length_of(&mut rhs);
                let result = self.emit_equals(lhs.ptr(), lhs_len, rhs.ptr(), rhs_len);
                self.release(lhs);
                self.release(rhs);
                if node.op == RelOp::NotEqual {
                    Ok(self.func.not(result))
                } else {
                    Ok(result)
                }
            }
            RelOp::Less | RelOp::Greater | RelOp::LessEqual | RelOp::GreaterEqual => {
                // ordering compares lengths only, never bytes; the left
                // operand is spent before the right one is evaluated
                self.release(lhs);
                let mut rhs = self.visit_expression(&node.rhs)?;
                let rhs_len = self.length_of(&mut rhs);
                self.release(rhs);

                let op = match node.op {
                    RelOp::Less => IcmpOp::Ult,
                    RelOp::Greater => IcmpOp::Ugt,
                    RelOp::LessEqual => IcmpOp::Ule,
                    RelOp::GreaterEqual => IcmpOp::Uge,
                    RelOp::Equal | RelOp::NotEqual => unreachable!(),
                };
                Ok(self.func.icmp(op, lhs_len, rhs_len))
            }
        }
    }

    fn visit_expression(&mut self, node: &Expression) -> Result<StrVal, CompileError> {
        if node.items.len() == 1 {
            return self.visit_item(&node.items[0]);
        }

        // materialize every part and its length first, left to right
        let mut total: Option<Value> = None;
        let mut parts: Vec<(StrVal, Value)> = Vec::new();
        for item in &node.items {
            let mut part = self.visit_item(item)?;
            let len = self.length_of(&mut part);
            total = Some(match total {
                None => len,
                Some(acc) => self.func.add(acc, len),
            });
            parts.push((part, len));
        }
        let total = total.expect("expression has at least one item");

        let result = self.emit_alloc(total);
        let offset_slot = self.func.add_slot("_concat_off", IrType::I64);
        self.func
            .store(IrType::I64, Value::Const(0), Value::Slot(offset_slot));

        for (part, len) in parts {
            let src = part.ptr();
            let idx_slot = self.func.add_slot("_concat_idx", IrType::I64);
            let loop_block = self.func.add_block("_concat_loop");
            let cont = self.func.add_block("_concat_cont");

            self.func
                .store(IrType::I64, Value::Const(0), Value::Slot(idx_slot));
            let len_is_zero = self.func.icmp(IcmpOp::Eq, len, Value::Const(0));
            self.func.cond_branch(len_is_zero, cont, loop_block);

            self.func.set_insert_point(loop_block);
            let idx = self.func.load(IrType::I64, Value::Slot(idx_slot));
            let src_addr = self.func.gep(src, idx);
            let byte = self.func.load(IrType::I8, src_addr);
            let off = self.func.load(IrType::I64, Value::Slot(offset_slot));
            let dst_addr = self.func.gep(result, off);
            self.func.store(IrType::I8, byte, dst_addr);
            let next_off = self.func.add(off, Value::Const(1));
            self.func
                .store(IrType::I64, next_off, Value::Slot(offset_slot));
            let next_idx = self.func.add(idx, Value::Const(1));
            self.func
                .store(IrType::I64, next_idx, Value::Slot(idx_slot));
            let done = self.func.icmp(IcmpOp::Eq, next_idx, len);
            self.func.cond_branch(done, cont, loop_block);

            self.func.set_insert_point(cont);
            // transient parts die right after their bytes are copied
            self.release(part);
        }

        let last_addr = self.func.gep(result, total);
        self.func.store(IrType::I8, Value::Const(0), last_addr);

        Ok(StrVal::Owned {
            ptr: result,
            len: total,
        })
    }

    fn visit_item(&mut self, node: &Item) -> Result<StrVal, CompileError> {
        let mut value = self.visit_factor(&node.factor)?;
        if node.repeat_times.is_empty() {
            return Ok(value);
        }

        let mut len = self.length_of(&mut value);
        for &times in &node.repeat_times {
            if times < 0 {
                return Err(CompileError::new(
                    node.span.begin,
                    "Repeat times can't be negative",
                )
                .with_code(ErrorCode::NEGATIVE_REPEAT));
            }
            let src = value.ptr();
            let times_v = Value::Const(times);
            let new_len = self.func.mul(len, times_v);
            let result = self.emit_alloc(new_len);

            let outer_pre = self.func.add_block("_repeat_outer_pre");
            let outer_head = self.func.add_block("_repeat_outer_head");
            let inner_pre = self.func.add_block("_repeat_inner_pre");
            let inner_head = self.func.add_block("_repeat_inner_head");
            let inner_body = self.func.add_block("_repeat_inner_body");
            let outer_next = self.func.add_block("_repeat_outer_next");
            let cont = self.func.add_block("_repeat_cont");

            let i_slot = self.func.add_slot("_repeat_i", IrType::I64);
            let j_slot = self.func.add_slot("_repeat_j", IrType::I64);
            let dst_slot = self.func.add_slot("_repeat_dst", IrType::I64);

            // a zero count skips straight to the terminator write
            let times_is_zero = self.func.icmp(IcmpOp::Eq, times_v, Value::Const(0));
            self.func.cond_branch(times_is_zero, cont, outer_pre);

            self.func.set_insert_point(outer_pre);
            self.func
                .store(IrType::I64, Value::Const(0), Value::Slot(i_slot));
            self.func
                .store(IrType::I64, Value::Const(0), Value::Slot(dst_slot));
            self.func.branch(outer_head);

            self.func.set_insert_point(outer_head);
            let i = self.func.load(IrType::I64, Value::Slot(i_slot));
            let outer_done = self.func.icmp(IcmpOp::Eq, i, times_v);
            self.func.cond_branch(outer_done, cont, inner_pre);

            self.func.set_insert_point(inner_pre);
            self.func
                .store(IrType::I64, Value::Const(0), Value::Slot(j_slot));
            self.func.branch(inner_head);

            self.func.set_insert_point(inner_head);
            let j = self.func.load(IrType::I64, Value::Slot(j_slot));
            let inner_done = self.func.icmp(IcmpOp::Eq, j, len);
            self.func.cond_branch(inner_done, outer_next, inner_body);

            self.func.set_insert_point(inner_body);
            let src_addr = self.func.gep(src, j);
            let byte = self.func.load(IrType::I8, src_addr);
            let dst = self.func.load(IrType::I64, Value::Slot(dst_slot));
            let dst_addr = self.func.gep(result, dst);
            self.func.store(IrType::I8, byte, dst_addr);
            let next_dst = self.func.add(dst, Value::Const(1));
            self.func
                .store(IrType::I64, next_dst, Value::Slot(dst_slot));
            let next_j = self.func.add(j, Value::Const(1));
            self.func.store(IrType::I64, next_j, Value::Slot(j_slot));
            self.func.branch(inner_head);

            self.func.set_insert_point(outer_next);
            let next_i = self.func.add(i, Value::Const(1));
            self.func.store(IrType::I64, next_i, Value::Slot(i_slot));
            self.func.branch(outer_head);

            self.func.set_insert_point(cont);
            let last_addr = self.func.gep(result, new_len);
            self.func.store(IrType::I8, Value::Const(0), last_addr);

            // the source is consumed by the repetition
            self.release(value);
            value = StrVal::Owned {
                ptr: result,
                len: new_len,
            };
            len = new_len;
        }
        Ok(value)
    }

    fn visit_factor(&mut self, node: &Factor) -> Result<StrVal, CompileError> {
        match node {
            Factor::Str { value, .. } => {
                let idx = self.module.add_string(value.clone());
                Ok(StrVal::Borrowed {
                    ptr: Value::Str(idx),
                    len: Some(Value::Const(value.len() as i64)),
                })
            }
            Factor::Var { identifier, span } => {
                let slot = self.lookup_slot(identifier).ok_or_else(|| {
                    CompileError::new(span.begin, format!("Undefined variable: {}", identifier))
                        .with_code(ErrorCode::UNDEFINED_VARIABLE)
                })?;
                let ptr = self.func.load(IrType::Ptr, Value::Slot(slot));
                Ok(StrVal::Borrowed { ptr, len: None })
            }
            Factor::Paren { expression, .. } => self.visit_expression(expression),
        }
    }

    fn emit_print_variables(&mut self) {
        for (name, slot) in self.variables.clone() {
            let on_null = self.func.add_block(format!("_display_onnull_{}", name));
            let cont = self.func.add_block(format!("_display_cont_{}", name));
            let msg_slot = self
                .func
                .add_slot(format!("_display_msg_{}", name), IrType::Ptr);

            let var = self.func.load(IrType::Ptr, Value::Slot(slot));
            self.func.store(IrType::Ptr, var, Value::Slot(msg_slot));
            let is_null = self.func.is_null(var);
            self.func.cond_branch(is_null, on_null, cont);

            self.func.set_insert_point(on_null);
            let null_alt = Value::Str(self.module.add_string("<null>"));
            self.func.store(IrType::Ptr, null_alt, Value::Slot(msg_slot));
            self.func.branch(cont);

            self.func.set_insert_point(cont);
            let msg = self.func.load(IrType::Ptr, Value::Slot(msg_slot));
            let template = Value::Str(self.module.add_string(format!("{} = %s\n", name)));
            self.func.call("printf", vec![template, msg]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instruction;
    use twine_error::Span;
    use twine_parser::parse_source;

    fn module_for(source: &str) -> Module {
        let program = parse_source(source).expect("source should parse");
        CodeGen::generate(&program).expect("program should lower")
    }

    fn codegen_err(source: &str) -> CompileError {
        let program = parse_source(source).expect("source should parse");
        CodeGen::generate(&program).expect_err("lowering should fail")
    }

    fn main_fn(module: &Module) -> &Function {
        module.get_function("main").expect("main should exist")
    }

    fn blocks_labeled<'a>(func: &'a Function, label: &str) -> Vec<usize> {
        func.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.label == label)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_if_has_one_condition_and_one_join_block() {
        let module = module_for(
            "string a; if (a == \"x\") start a=\"y\"; a=a+\"z\"; end else a=\"w\";",
        );
        let func = main_fn(&module);

        let true_blocks = blocks_labeled(func, "if_true");
        let false_blocks = blocks_labeled(func, "if_false");
        let cont_blocks = blocks_labeled(func, "if_cont");
        assert_eq!(true_blocks.len(), 1);
        assert_eq!(false_blocks.len(), 1);
        assert_eq!(cont_blocks.len(), 1);

        // exactly one conditional branch targets the two arms
        let cond_branches: Vec<_> = func
            .blocks
            .iter()
            .filter_map(|b| match b.terminator() {
                Some(Instruction::CondBr {
                    then_block,
                    else_block,
                    ..
                }) if then_block.0 == true_blocks[0] && else_block.0 == false_blocks[0] => Some(()),
                _ => None,
            })
            .collect();
        assert_eq!(cond_branches.len(), 1);

        // both arms join at the shared exit block; statements inside the
        // arms may open further blocks, so follow each arm's chain
        let join = cont_blocks[0];
        for arm in [true_blocks[0], false_blocks[0]] {
            let mut at = arm;
            loop {
                match func.blocks[at].terminator() {
                    Some(Instruction::Br { target }) if target.0 == join => break,
                    Some(Instruction::Br { target }) => at = target.0,
                    Some(Instruction::CondBr {
                        then_block,
                        else_block,
                        ..
                    }) => {
                        // skip over straight-line runtime loops by taking
                        // the forward edge
                        at = if then_block.0 > at {
                            then_block.0
                        } else {
                            else_block.0
                        };
                    }
                    other => panic!("unexpected terminator on the way to the join: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_do_while_has_back_edge() {
        let module = module_for("string a; do a=a+\"x\" while (a < \"yy\");");
        let func = main_fn(&module);

        let loop_blocks = blocks_labeled(func, "dowhile_loop");
        let cont_blocks = blocks_labeled(func, "dowhile_cont");
        assert_eq!(loop_blocks.len(), 1);
        assert_eq!(cont_blocks.len(), 1);

        // some block conditionally branches back to the loop body
        let back_edges = func
            .blocks
            .iter()
            .filter(|b| {
                matches!(
                    b.terminator(),
                    Some(Instruction::CondBr { then_block, else_block, .. })
                        if then_block.0 == loop_blocks[0] && else_block.0 == cont_blocks[0]
                )
            })
            .count();
        assert_eq!(back_edges, 1);
    }

    #[test]
    fn test_repeat_zero_skips_to_terminator_write() {
        let module = module_for("string a; a=\"xyz\"*0;");
        let func = main_fn(&module);

        // the zero check lives in the entry block and jumps straight to
        // the continuation that writes the terminator
        let cont = blocks_labeled(func, "_repeat_cont");
        assert_eq!(cont.len(), 1);
        let cont_block = &func.blocks[cont[0]];
        assert!(cont_block.instructions.iter().any(|i| matches!(
            i,
            Instruction::Store {
                ty: IrType::I8,
                value: Value::Const(0),
                ..
            }
        )));

        let entry = &func.blocks[0];
        assert!(matches!(
            entry.terminator(),
            Some(Instruction::CondBr { then_block, .. }) if then_block.0 == cont[0]
        ));
    }

    #[test]
    fn test_concat_frees_transient_parts_after_their_copy() {
        // the repeated literal becomes an owned buffer that must die in
        // the concat continuation block, before the next part is copied
        let module = module_for("string a; a=(\"x\"*2)+\"y\";");
        let func = main_fn(&module);

        let conts = blocks_labeled(func, "_concat_cont");
        assert_eq!(conts.len(), 2);
        let first_cont = &func.blocks[conts[0]];
        assert!(first_cont
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::Free { .. })));
    }

    #[test]
    fn test_assignment_moves_owned_buffers() {
        // an owned right-hand side is stored without a defensive copy
        let module = module_for("string a; a=\"x\"*2;");
        let func = main_fn(&module);
        let memcpys = func
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i, Instruction::MemCpy { .. }))
            .count();
        assert_eq!(memcpys, 0);
    }

    #[test]
    fn test_assignment_copies_borrowed_buffers() {
        // assigning a plain variable load must defensively copy
        let module = module_for("string a, b; a=b;");
        let func = main_fn(&module);
        let memcpys = func
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i, Instruction::MemCpy { .. }))
            .count();
        assert_eq!(memcpys, 1);
    }

    #[test]
    fn test_literal_lengths_skip_the_scan() {
        // both concat operands are literals with known lengths, so no
        // strlen loop is emitted
        let module = module_for("string a; a=\"ab\"+\"cd\";");
        let func = main_fn(&module);
        assert!(blocks_labeled(func, "_strlen_loop").is_empty());
    }

    #[test]
    fn test_ordering_compares_lengths_only() {
        let module = module_for("string a; if (\"abc\" > \"de\") a=\"y\" else a=\"n\";");
        let func = main_fn(&module);

        // a single unsigned-greater comparison on the two constant
        // lengths; no byte loops for the condition
        let ugt_on_lengths = func
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| {
                matches!(
                    i,
                    Instruction::Icmp {
                        op: IcmpOp::Ugt,
                        lhs: Value::Const(3),
                        rhs: Value::Const(2),
                        ..
                    }
                )
            })
            .count();
        assert_eq!(ugt_on_lengths, 1);
        assert!(blocks_labeled(func, "_streq_loop_body").is_empty());
    }

    #[test]
    fn test_program_epilogue_prints_then_frees_in_declaration_order() {
        let module = module_for("string b, a; a=\"x\";");
        let func = main_fn(&module);

        // templates are interned in declaration order
        let b_template = module.string_table.iter().position(|s| s == "b = %s\n");
        let a_template = module.string_table.iter().position(|s| s == "a = %s\n");
        assert!(b_template.expect("b template") < a_template.expect("a template"));

        // the final block frees both slots and returns 0
        let last = func.blocks.last().expect("function has blocks");
        let frees = last
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Free { .. }))
            .count();
        assert_eq!(frees, 2);
        assert!(matches!(
            last.terminator(),
            Some(Instruction::Ret {
                value: Value::Const(0)
            })
        ));
    }

    #[test]
    fn test_undefined_variable() {
        let err = codegen_err("string a; a=b;");
        assert_eq!(err.message, "Undefined variable: b");
        assert_eq!(err.position, 12);
    }

    #[test]
    fn test_duplicate_declaration() {
        let err = codegen_err("string a, b, a; a=\"x\";");
        assert_eq!(err.message, "Variable is already defined: a");
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_negative_repeat_count_is_rejected() {
        // the scanner has no sign tokens, so a negative count can only
        // come from a hand-built tree
        let span = Span::new(0, 0);
        let program = Program {
            variables: VariableDeclaration {
                ty: "string".to_string(),
                identifiers: vec!["a".to_string()],
                span,
            },
            statements: Statements {
                statements: vec![Statement::Assign(AssignStatement {
                    variable: "a".to_string(),
                    expression: Expression {
                        items: vec![Item {
                            factor: Factor::Str {
                                value: "x".to_string(),
                                span,
                            },
                            repeat_times: vec![-1],
                            span: Span::new(12, 18),
                        }],
                        span,
                    },
                    span,
                })],
                span,
            },
            span,
        };
        let err = CodeGen::generate(&program).expect_err("lowering should fail");
        assert_eq!(err.message, "Repeat times can't be negative");
        assert_eq!(err.position, 12);
    }

    #[test]
    fn test_unsupported_declared_type() {
        let span = Span::new(0, 9);
        let program = Program {
            variables: VariableDeclaration {
                ty: "number".to_string(),
                identifiers: vec!["a".to_string()],
                span,
            },
            statements: Statements {
                statements: vec![],
                span,
            },
            span,
        };
        let err = CodeGen::generate(&program).expect_err("lowering should fail");
        assert_eq!(err.message, "Unsupported variable type: number");
    }

    #[test]
    fn test_lowering_is_deterministic() {
        let program = parse_source(
            "string a, b; do start a=a+\"x\"; if (a >= b) b=b+a else b=\"y\"*3; end \
             while (a <> b);",
        )
        .expect("source should parse");
        let first = CodeGen::generate(&program).expect("program should lower");
        let second = CodeGen::generate(&program).expect("program should lower");
        assert_eq!(first.to_string(), second.to_string());
    }
}
