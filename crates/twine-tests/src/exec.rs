//! Reference evaluator for the low-level IR
//!
//! Executes a lowered module directly so the pipeline tests can observe
//! a program's printed output and its allocation behavior without any
//! backend. The evaluator is deliberately strict: reading a freed
//! buffer, freeing a static buffer, double-freeing, freeing an interior
//! pointer, or scanning past a buffer's end all panic, which turns
//! ownership bugs in the generated IR into test failures. Heap buffers
//! start filled with a non-zero pattern so a missing terminator write
//! cannot go unnoticed.

use std::collections::HashMap;
use twine_codegen::{BlockId, Function, IcmpOp, Instruction, Module, TempId, Value};

/// Outcome of running a module's `main`
#[derive(Debug)]
pub struct Execution {
    /// Everything printf produced, in order
    pub output: String,
    /// Heap allocations performed
    pub allocs: usize,
    /// Heap buffers actually released (frees of null are no-ops and do
    /// not count)
    pub frees: usize,
}

/// Runs the module's `main` function to completion
pub fn run(module: &Module) -> Execution {
    let mut machine = Machine::new(module);
    let func = module.get_function("main").expect("module has a main");
    machine.run_function(func);
    Execution {
        output: machine.output,
        allocs: machine.allocs,
        frees: machine.frees,
    }
}

struct Buffer {
    bytes: Vec<u8>,
    heap: bool,
    freed: bool,
}

/// Addresses encode (buffer, offset); buffer ids start at 1 so that 0
/// stays the null pointer.
const OFFSET_BITS: u32 = 32;

fn encode(buffer: usize, offset: usize) -> i64 {
    (((buffer + 1) as i64) << OFFSET_BITS) + offset as i64
}

fn decode(addr: i64) -> (usize, usize) {
    let buffer = (addr >> OFFSET_BITS) as usize - 1;
    let offset = (addr & ((1 << OFFSET_BITS) - 1)) as usize;
    (buffer, offset)
}

struct Machine {
    buffers: Vec<Buffer>,
    /// Address of each string-table entry's static buffer
    str_addrs: Vec<i64>,
    output: String,
    allocs: usize,
    frees: usize,
}

impl Machine {
    fn new(module: &Module) -> Self {
        let mut machine = Machine {
            buffers: Vec::new(),
            str_addrs: Vec::new(),
            output: String::new(),
            allocs: 0,
            frees: 0,
        };
        for s in &module.string_table {
            let mut bytes = s.as_bytes().to_vec();
            bytes.push(0);
            machine.buffers.push(Buffer {
                bytes,
                heap: false,
                freed: false,
            });
            let addr = encode(machine.buffers.len() - 1, 0);
            machine.str_addrs.push(addr);
        }
        machine
    }

    fn run_function(&mut self, func: &Function) {
        let mut slots = vec![0i64; func.slots.len()];
        let mut temps: HashMap<TempId, i64> = HashMap::new();
        let mut block = BlockId(0);
        let mut idx = 0;

        loop {
            let inst = &func.block(block).instructions[idx];
            idx += 1;

            match inst {
                Instruction::Add { dest, lhs, rhs } => {
                    let result = self.value(&temps, *lhs) + self.value(&temps, *rhs);
                    temps.insert(*dest, result);
                }
                Instruction::Mul { dest, lhs, rhs } => {
                    let result = self.value(&temps, *lhs) * self.value(&temps, *rhs);
                    temps.insert(*dest, result);
                }
                Instruction::Icmp { dest, op, lhs, rhs } => {
                    let a = self.value(&temps, *lhs) as u64;
                    let b = self.value(&temps, *rhs) as u64;
                    let result = match op {
                        IcmpOp::Eq => a == b,
                        IcmpOp::Ne => a != b,
                        IcmpOp::Ult => a < b,
                        IcmpOp::Ugt => a > b,
                        IcmpOp::Ule => a <= b,
                        IcmpOp::Uge => a >= b,
                    };
                    temps.insert(*dest, result as i64);
                }
                Instruction::Not { dest, value } => {
                    let v = self.value(&temps, *value);
                    temps.insert(*dest, (v == 0) as i64);
                }
                Instruction::Load { dest, ptr, .. } => {
                    let result = match ptr {
                        Value::Slot(slot) => slots[slot.0],
                        other => self.read_byte(self.value(&temps, *other)) as i64,
                    };
                    temps.insert(*dest, result);
                }
                Instruction::Store { value, ptr, .. } => {
                    let v = self.value(&temps, *value);
                    match ptr {
                        Value::Slot(slot) => slots[slot.0] = v,
                        other => {
                            let addr = self.value(&temps, *other);
                            self.write_byte(addr, v as u8);
                        }
                    }
                }
                Instruction::Gep { dest, base, offset } => {
                    let addr = self.value(&temps, *base) + self.value(&temps, *offset);
                    temps.insert(*dest, addr);
                }
                Instruction::Malloc { dest, size } => {
                    let size = self.value(&temps, *size) as usize;
                    // non-zero fill so a missing terminator write shows up
                    self.buffers.push(Buffer {
                        bytes: vec![0xAA; size],
                        heap: true,
                        freed: false,
                    });
                    self.allocs += 1;
                    temps.insert(*dest, encode(self.buffers.len() - 1, 0));
                }
                Instruction::Free { ptr } => {
                    let addr = self.value(&temps, *ptr);
                    if addr != 0 {
                        let (buffer, offset) = decode(addr);
                        assert_eq!(offset, 0, "free of an interior pointer");
                        let buffer = &mut self.buffers[buffer];
                        assert!(buffer.heap, "free of a static buffer");
                        assert!(!buffer.freed, "double free");
                        buffer.freed = true;
                        self.frees += 1;
                    }
                }
                Instruction::MemCpy { dst, src, size } => {
                    let size = self.value(&temps, *size) as usize;
                    let src_addr = self.value(&temps, *src);
                    let dst_addr = self.value(&temps, *dst);
                    for i in 0..size {
                        let byte = self.read_byte(src_addr + i as i64);
                        self.write_byte(dst_addr + i as i64, byte);
                    }
                }
                Instruction::IsNull { dest, ptr } => {
                    let addr = self.value(&temps, *ptr);
                    temps.insert(*dest, (addr == 0) as i64);
                }
                Instruction::Call { dest, func, args } => {
                    assert_eq!(func.as_str(), "printf", "unexpected external call: {func}");
                    let template = self.read_cstr(self.value(&temps, args[0]));
                    let arg = self.read_cstr(self.value(&temps, args[1]));
                    self.output.push_str(&template.replacen("%s", &arg, 1));
                    temps.insert(*dest, 0);
                }
                Instruction::Br { target } => {
                    block = *target;
                    idx = 0;
                }
                Instruction::CondBr {
                    cond,
                    then_block,
                    else_block,
                } => {
                    block = if self.value(&temps, *cond) != 0 {
                        *then_block
                    } else {
                        *else_block
                    };
                    idx = 0;
                }
                Instruction::Ret { .. } => return,
            }
        }
    }

    fn value(&self, temps: &HashMap<TempId, i64>, v: Value) -> i64 {
        match v {
            Value::Const(c) => c,
            Value::Bool(b) => b as i64,
            Value::Null => 0,
            Value::Str(idx) => self.str_addrs[idx],
            Value::Slot(_) => panic!("slot reference used as a plain operand"),
            Value::Temp(id) => temps[&id],
        }
    }

    fn read_byte(&self, addr: i64) -> u8 {
        let (buffer, offset) = decode(addr);
        let buffer = &self.buffers[buffer];
        assert!(!buffer.freed, "read from a freed buffer");
        buffer.bytes[offset]
    }

    fn write_byte(&mut self, addr: i64, byte: u8) {
        let (buffer, offset) = decode(addr);
        let buffer = &mut self.buffers[buffer];
        assert!(!buffer.freed, "write to a freed buffer");
        assert!(buffer.heap, "write to a static buffer");
        buffer.bytes[offset] = byte;
    }

    fn read_cstr(&self, addr: i64) -> String {
        let (buffer, offset) = decode(addr);
        let buffer = &self.buffers[buffer];
        assert!(!buffer.freed, "read from a freed buffer");
        let end = buffer.bytes[offset..]
            .iter()
            .position(|&b| b == 0)
            .expect("string not terminated within its buffer");
        String::from_utf8_lossy(&buffer.bytes[offset..offset + end]).into_owned()
    }
}
