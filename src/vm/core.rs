//! Fetch/decode/execute loop, dual stacks, symbol table ownership and
//! the per-Vm state machine.

use crate::constants::{DISCARD, FALSE, GC_THRESHOLD, STACK_INITIAL_CAPACITY, SYM_RESERVED, TRUE};
use crate::hostcall::HostTable;
use crate::opcode::Opcode;
use crate::section::{self, CodecError, Payload};
use crate::symbol::{Section as SymSection, Symbol, SymbolError, Table};
use crate::value::Value;
use super::disasm;
use log::{trace, warn};
use num_traits::FromPrimitive;
use std::fmt;

/// VM lifecycle states (§4.3 "State machine").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Fresh,
    Ready,
    Running,
    Paused,
    Exited,
    Faulted,
}

#[derive(Debug)]
pub enum LoadError {
    Codec(CodecError),
    NoCodeSection,
    MultipleCodeSections,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::Codec(e) => write!(f, "{}", e),
            LoadError::NoCodeSection => write!(f, "image has no code section"),
            LoadError::MultipleCodeSections => write!(f, "image has more than one code section"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<CodecError> for LoadError {
    fn from(e: CodecError) -> Self {
        LoadError::Codec(e)
    }
}

/// A fatal VM error: the kind plus the program counter it occurred at
/// (§7 "VM faults").
#[derive(Debug)]
pub struct VmError {
    pub pc: u64,
    pub fault: Fault,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fault at pc {}: {}", self.pc, self.fault)
    }
}

impl std::error::Error for VmError {}

#[derive(Debug)]
pub enum Fault {
    PcOutOfBounds,
    StackUnderflow { stack: &'static str },
    IllegalOpcode(u64),
    TypeMismatch { op: Opcode, lhs: &'static str, rhs: &'static str },
    DivideByZero,
    BranchOutOfBounds { op: Opcode, target: u64 },
    UnknownSymbol(u64),
    WriteToNonVariable(u64),
    NonBooleanBranchOperand(u64),
    Abort,
    HostCallDispatch(String),
    Symbol(SymbolError),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::PcOutOfBounds => write!(f, "program counter out of bounds"),
            Fault::StackUnderflow { stack } => write!(f, "{} stack underflow", stack),
            Fault::IllegalOpcode(op) => write!(f, "illegal opcode {}", op),
            Fault::TypeMismatch { op, lhs, rhs } => {
                write!(f, "{:?}: type mismatch ({} vs {})", op, lhs, rhs)
            }
            Fault::DivideByZero => write!(f, "divide by zero"),
            Fault::BranchOutOfBounds { op, target } => {
                write!(f, "{:?} target {} out of bounds", op, target)
            }
            Fault::UnknownSymbol(id) => write!(f, "unknown symbol id {:#x}", id),
            Fault::WriteToNonVariable(id) => {
                write!(f, "POP target {:#x} is not a variable symbol", id)
            }
            Fault::NonBooleanBranchOperand(v) => {
                write!(f, "branch operand {} is neither TRUE nor FALSE", v)
            }
            Fault::Abort => write!(f, "ABORT"),
            Fault::HostCallDispatch(name) => write!(f, "no such host call {:?}", name),
            Fault::Symbol(e) => write!(f, "{}", e),
        }
    }
}

impl From<SymbolError> for Fault {
    fn from(e: SymbolError) -> Self {
        Fault::Symbol(e)
    }
}

/// Distinguishes a normal `EXIT` from everything else (§7 "Normal
/// termination").
#[derive(Debug, Eq, PartialEq)]
pub enum ExitReason {
    Exited,
    Paused,
}

pub struct Vm {
    code: Vec<u64>,
    pc: u64,
    cmd_stack: Vec<u64>,
    call_stack: Vec<u64>,
    table: Table,
    hostcalls: HostTable,
    state: State,
    pub trace: bool,
    pub tainted: bool,
    instructions_executed: u64,
    breakpoints: std::collections::HashSet<u64>,
}

impl Vm {
    /// `New(image)`: Fresh -> Ready.
    pub fn new(image_bytes: &[u8]) -> Result<Vm, LoadError> {
        let sections = section::sections_from_image(image_bytes)?;

        let mut code: Option<Vec<u64>> = None;
        let mut table = Table::new(SYM_RESERVED);

        for s in sections {
            match s.payload {
                Payload::Code(words) => {
                    if code.is_some() {
                        return Err(LoadError::MultipleCodeSections);
                    }
                    code = Some(words);
                }
                Payload::Symbols(syms) => {
                    for sym in syms {
                        table.insert(sym);
                    }
                }
            }
        }

        let code = code.ok_or(LoadError::NoCodeSection)?;

        Ok(Vm {
            code,
            pc: 0,
            cmd_stack: Vec::with_capacity(STACK_INITIAL_CAPACITY),
            call_stack: Vec::with_capacity(STACK_INITIAL_CAPACITY),
            table,
            hostcalls: HostTable::default_table(),
            state: State::Ready,
            trace: false,
            tainted: false,
            instructions_executed: 0,
            breakpoints: std::collections::HashSet::new(),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn instructions_executed(&self) -> u64 {
        self.instructions_executed
    }

    pub fn cmd_stack(&self) -> &[u64] {
        &self.cmd_stack
    }

    pub fn call_stack(&self) -> &[u64] {
        &self.call_stack
    }

    pub fn code(&self) -> &[u64] {
        &self.code
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.table.iter()
    }

    pub fn symbol(&self, id: u64) -> Result<&Symbol, SymbolError> {
        self.table.get(id)
    }

    pub fn toggle_breakpoint(&mut self, pc: u64) -> bool {
        if self.breakpoints.remove(&pc) {
            false
        } else {
            self.breakpoints.insert(pc);
            true
        }
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &u64> {
        self.breakpoints.iter()
    }

    /// Reclaim zero-ref `Variable` symbols now (§4.3 "Garbage collection").
    pub fn gc(&mut self) -> usize {
        self.table.gc()
    }

    /// Cooperatively leave `Running` without finishing the program.
    /// Used by the interactive driver between `step()` calls; a no-op
    /// outside `Running`. Marks the run `tainted` (§4.3): once paused, a
    /// run's MIPS/instruction stats no longer describe one uninterrupted
    /// execution.
    pub fn pause(&mut self) {
        if self.state == State::Running {
            self.state = State::Paused;
            self.tainted = true;
        }
    }

    fn fault(&mut self, fault: Fault) -> VmError {
        self.state = State::Faulted;
        warn!("fault at pc {}: {}", self.pc, fault);
        VmError { pc: self.pc, fault }
    }

    /// Run to completion (non-interactive `Run`, §6.4 without `-I`).
    /// `Ready -> Running -> Exited|Faulted`.
    pub fn run(&mut self) -> Result<(), VmError> {
        self.state = State::Running;
        loop {
            match self.step()? {
                Some(ExitReason::Exited) => {
                    self.state = State::Exited;
                    return Ok(());
                }
                Some(ExitReason::Paused) => unreachable!("non-interactive run never pauses"),
                None => continue,
            }
        }
    }

    /// Execute exactly one instruction, returning `Some(Exited)` on
    /// `EXIT`, `None` otherwise. Callers driving an interactive session
    /// poll `breakpoints`/external pause requests between calls.
    pub fn step(&mut self) -> Result<Option<ExitReason>, VmError> {
        if self.table.zero_ref_symbols() > GC_THRESHOLD {
            self.gc();
        }

        let pc = self.pc;
        let op_word = *self
            .code
            .get(pc as usize)
            .ok_or_else(|| VmError { pc, fault: Fault::PcOutOfBounds })?;
        let opcode = Opcode::from_u64(op_word)
            .ok_or_else(|| VmError { pc, fault: Fault::IllegalOpcode(op_word) })?;

        let size = opcode.instr_size();
        if pc + size > self.code.len() as u64 {
            return Err(self.fault(Fault::PcOutOfBounds));
        }

        let stack_len = if opcode.uses_call_stack() {
            self.call_stack.len()
        } else {
            self.cmd_stack.len()
        };
        if stack_len < opcode.stack_need() {
            let stack = if opcode.uses_call_stack() { "call" } else { "command" };
            return Err(self.fault(Fault::StackUnderflow { stack }));
        }

        let arg = if size == 2 { self.code[(pc + 1) as usize] } else { 0 };
        if self.trace {
            trace!("{}", disasm::disassemble_one(opcode, arg, pc));
        }

        let result = self.dispatch(opcode, arg);
        self.instructions_executed += 1;

        match result {
            Ok(Some(reason)) => Ok(Some(reason)),
            Ok(None) => {
                if !opcode_sets_pc(opcode) {
                    self.pc += size;
                }
                Ok(None)
            }
            Err(fault) => Err(self.fault(fault)),
        }
    }

    fn dispatch(&mut self, opcode: Opcode, arg: u64) -> Result<Option<ExitReason>, Fault> {
        match opcode {
            Opcode::NOP => Ok(None),
            Opcode::ABORT => Err(Fault::Abort),
            Opcode::EXIT => Ok(Some(ExitReason::Exited)),
            Opcode::PUSH => {
                self.ref_adjust(arg, 1)?;
                self.cmd_stack.push(arg);
                Ok(None)
            }
            Opcode::POP => self.op_pop(arg).map(|_| None),
            Opcode::ADD => self.op_binary_arith(Opcode::ADD),
            Opcode::SUB => self.op_binary_arith(Opcode::SUB),
            Opcode::MUL => self.op_binary_arith(Opcode::MUL),
            Opcode::DIV => self.op_binary_arith(Opcode::DIV),
            Opcode::NEG => self.op_neg(),
            Opcode::EQ => self.op_compare(Opcode::EQ),
            Opcode::NEQ => self.op_compare(Opcode::NEQ),
            Opcode::LT => self.op_compare(Opcode::LT),
            Opcode::GT => self.op_compare(Opcode::GT),
            Opcode::LE => self.op_compare(Opcode::LE),
            Opcode::GE => self.op_compare(Opcode::GE),
            Opcode::BRT => self.op_branch(Opcode::BRT, arg, TRUE),
            Opcode::BRF => self.op_branch(Opcode::BRF, arg, FALSE),
            Opcode::JMP => {
                if arg >= self.code.len() as u64 {
                    return Err(Fault::BranchOutOfBounds { op: Opcode::JMP, target: arg });
                }
                self.pc = arg;
                Ok(None)
            }
            Opcode::JSR => self.op_jsr(arg),
            Opcode::RET => self.op_ret(),
            Opcode::CALL => self.op_call(arg),
        }
    }

    fn ref_adjust(&mut self, sym: u64, delta: i64) -> Result<(), Fault> {
        if sym >= SYM_RESERVED {
            self.table.ref_adjust(sym, delta)?;
        }
        Ok(())
    }

    fn op_pop(&mut self, dst: u64) -> Result<(), Fault> {
        let src = self
            .cmd_stack
            .pop()
            .ok_or(Fault::StackUnderflow { stack: "command" })?;

        if dst == DISCARD {
            self.ref_adjust(src, -1)?;
            return Ok(());
        }
        if dst < SYM_RESERVED {
            self.ref_adjust(src, -1)?;
            return Ok(());
        }

        {
            let dst_sym = self.table.get(dst)?;
            if dst_sym.section != SymSection::Variable {
                return Err(Fault::WriteToNonVariable(dst));
            }
        }
        let value = self.resolve_value(src)?;
        self.ref_adjust(src, -1)?;
        let dst_sym = self.table.get_mut(dst)?;
        dst_sym.value = value;
        Ok(())
    }

    /// Resolve a command-stack word into the `Value` it denotes, without
    /// mutating any ref count.
    fn resolve_value(&self, word: u64) -> Result<Value, Fault> {
        if word == TRUE || word == FALSE {
            return Ok(Value::Integer(if word == TRUE { 1 } else { 0 }));
        }
        Ok(self.table.get(word)?.value.clone())
    }

    fn op_neg(&mut self) -> Result<Option<ExitReason>, Fault> {
        let top = self
            .cmd_stack
            .last()
            .copied()
            .ok_or(Fault::StackUnderflow { stack: "command" })?;
        let value = self.resolve_value(top)?;
        let negated = match value {
            Value::Integer(n) => Value::Integer(n.wrapping_neg()),
            Value::Number(r) => Value::Number(-r),
            Value::Label(_) => {
                return Err(Fault::TypeMismatch { op: Opcode::NEG, lhs: "label", rhs: "label" })
            }
        };
        self.ref_adjust(top, -1)?;
        let id = self.alloc_variable(negated);
        *self.cmd_stack.last_mut().unwrap() = id;
        Ok(None)
    }

    fn op_binary_arith(&mut self, op: Opcode) -> Result<Option<ExitReason>, Fault> {
        let (a_word, b_word) = self.pop_two("command")?;
        let a = self.resolve_value(a_word)?;
        let b = self.resolve_value(b_word)?;
        if !a.same_arithmetic_type(&b) {
            return Err(Fault::TypeMismatch { op, lhs: a.type_name(), rhs: b.type_name() });
        }

        let result = match (&a, &b) {
            (Value::Integer(x), Value::Integer(y)) => {
                Value::Integer(integer_op(op, *x, *y)?)
            }
            (Value::Number(x), Value::Number(y)) => Value::Number(rational_op(op, x, y)?),
            _ => unreachable!("same_arithmetic_type guarantees matching variants"),
        };

        self.ref_adjust(a_word, -1)?;
        self.ref_adjust(b_word, -1)?;
        let id = self.alloc_variable(result);
        self.cmd_stack.push(id);
        Ok(None)
    }

    fn op_compare(&mut self, op: Opcode) -> Result<Option<ExitReason>, Fault> {
        let (a_word, b_word) = self.pop_two("command")?;
        let a = self.resolve_value(a_word)?;
        let b = self.resolve_value(b_word)?;
        if !a.same_arithmetic_type(&b) {
            return Err(Fault::TypeMismatch { op, lhs: a.type_name(), rhs: b.type_name() });
        }

        let result = match (&a, &b) {
            (Value::Integer(x), Value::Integer(y)) => compare(op, x.cmp(y)),
            (Value::Number(x), Value::Number(y)) => {
                compare(op, x.partial_cmp(y).expect("rationals are totally ordered"))
            }
            _ => unreachable!("same_arithmetic_type guarantees matching variants"),
        };

        self.ref_adjust(a_word, -1)?;
        self.ref_adjust(b_word, -1)?;
        self.cmd_stack.push(if result { TRUE } else { FALSE });
        Ok(None)
    }

    fn op_branch(&mut self, op: Opcode, target: u64, taken_on: u64) -> Result<Option<ExitReason>, Fault> {
        let top = self
            .cmd_stack
            .pop()
            .ok_or(Fault::StackUnderflow { stack: "command" })?;
        if top != TRUE && top != FALSE {
            return Err(Fault::NonBooleanBranchOperand(top));
        }
        if top == taken_on {
            if target >= self.code.len() as u64 {
                return Err(Fault::BranchOutOfBounds { op, target });
            }
            self.pc = target;
        } else {
            self.pc += op.instr_size();
        }
        Ok(None)
    }

    fn op_jsr(&mut self, sym: u64) -> Result<Option<ExitReason>, Fault> {
        let target = self.label_target(sym)?;
        if target >= self.code.len() as u64 {
            return Err(Fault::BranchOutOfBounds { op: Opcode::JSR, target });
        }
        self.call_stack.push(self.pc + Opcode::JSR.instr_size());
        self.pc = target;
        Ok(None)
    }

    fn op_ret(&mut self) -> Result<Option<ExitReason>, Fault> {
        let addr = self
            .call_stack
            .pop()
            .ok_or(Fault::StackUnderflow { stack: "call" })?;
        if addr >= self.code.len() as u64 {
            return Err(Fault::BranchOutOfBounds { op: Opcode::RET, target: addr });
        }
        self.pc = addr;
        Ok(None)
    }

    fn op_call(&mut self, sym: u64) -> Result<Option<ExitReason>, Fault> {
        let symbol = self.table.get(sym)?;
        if symbol.section != SymSection::Os {
            return Err(Fault::UnknownSymbol(sym));
        }
        let name = symbol.name.clone();
        let ok = self
            .hostcalls
            .call(&name)
            .map_err(|_| Fault::HostCallDispatch(name))?;
        self.cmd_stack.push(if ok { TRUE } else { FALSE });
        Ok(None)
    }

    fn label_target(&self, sym: u64) -> Result<u64, Fault> {
        let symbol = self.table.get(sym)?;
        if symbol.section != SymSection::Const {
            return Err(Fault::UnknownSymbol(sym));
        }
        match symbol.value {
            Value::Label(addr) => Ok(addr),
            _ => Err(Fault::UnknownSymbol(sym)),
        }
    }

    fn pop_two(&mut self, stack: &'static str) -> Result<(u64, u64), Fault> {
        if self.cmd_stack.len() < 2 {
            return Err(Fault::StackUnderflow { stack });
        }
        let b = self.cmd_stack.pop().unwrap();
        let a = self.cmd_stack.pop().unwrap();
        Ok((a, b))
    }

    fn alloc_variable(&mut self, value: Value) -> u64 {
        let id = self.table.alloc_id();
        self.table.insert(Symbol::new(id, String::new(), SymSection::Variable, value, 1));
        id
    }
}

fn opcode_sets_pc(op: Opcode) -> bool {
    matches!(op, Opcode::JMP | Opcode::JSR | Opcode::RET | Opcode::BRT | Opcode::BRF)
}

/// Integer arithmetic wraps on overflow (§4.3, §9: DIV is a true
/// quotient, not the source's copy/paste multiplication bug).
fn integer_op(op: Opcode, a: i64, b: i64) -> Result<i64, Fault> {
    Ok(match op {
        Opcode::ADD => a.wrapping_add(b),
        Opcode::SUB => a.wrapping_sub(b),
        Opcode::MUL => a.wrapping_mul(b),
        Opcode::DIV => {
            if b == 0 {
                return Err(Fault::DivideByZero);
            }
            a.wrapping_div(b)
        }
        _ => unreachable!("integer_op only called for arithmetic opcodes"),
    })
}

fn rational_op(
    op: Opcode,
    a: &num::BigRational,
    b: &num::BigRational,
) -> Result<num::BigRational, Fault> {
    use num::Zero;
    Ok(match op {
        Opcode::ADD => a + b,
        Opcode::SUB => a - b,
        Opcode::MUL => a * b,
        Opcode::DIV => {
            if b.is_zero() {
                return Err(Fault::DivideByZero);
            }
            a / b
        }
        _ => unreachable!("rational_op only called for arithmetic opcodes"),
    })
}

fn compare(op: Opcode, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match (op, ord) {
        (Opcode::EQ, Equal) => true,
        (Opcode::NEQ, o) => o != Equal,
        (Opcode::LT, Less) => true,
        (Opcode::GT, Greater) => true,
        (Opcode::LE, Less) | (Opcode::LE, Equal) => true,
        (Opcode::GE, Greater) | (Opcode::GE, Equal) => true,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::symbol::Section as SymSection;

    /// Build a bare VM over `code` with no image-loaded symbols, for
    /// tests that only care about opcode dispatch and faults.
    fn bare_vm(code: Vec<u64>) -> Vm {
        Vm {
            code,
            pc: 0,
            cmd_stack: Vec::new(),
            call_stack: Vec::new(),
            table: Table::new(SYM_RESERVED),
            hostcalls: HostTable::default_table(),
            state: State::Ready,
            trace: false,
            tainted: false,
            instructions_executed: 0,
            breakpoints: std::collections::HashSet::new(),
        }
    }

    fn push_const(vm: &mut Vm, value: Value) -> u64 {
        let id = vm.table.alloc_id();
        vm.table.insert(Symbol::new(id, String::new(), SymSection::Const, value, 1));
        id
    }

    #[test]
    fn e5_integer_division_by_zero_faults() {
        let mut vm = bare_vm(vec![
            Opcode::PUSH as u64, 0, // patched below
            Opcode::PUSH as u64, 0,
            Opcode::DIV as u64,
        ]);
        let a = push_const(&mut vm, Value::Integer(10));
        let b = push_const(&mut vm, Value::Integer(0));
        vm.code[1] = a;
        vm.code[3] = b;

        let err = vm.run().unwrap_err();
        assert!(matches!(err.fault, Fault::DivideByZero));
        assert_eq!(vm.state(), State::Faulted);
    }

    #[test]
    fn e6_stack_underflow_on_add_with_one_operand() {
        let mut vm = bare_vm(vec![Opcode::PUSH as u64, 0, Opcode::ADD as u64]);
        let a = push_const(&mut vm, Value::Integer(1));
        vm.code[1] = a;

        let err = vm.run().unwrap_err();
        assert!(matches!(err.fault, Fault::StackUnderflow { stack: "command" }));
    }

    #[test]
    fn e7_branch_out_of_bounds_faults() {
        let mut vm = bare_vm(vec![Opcode::BRT as u64, 9999]);
        vm.cmd_stack.push(TRUE);

        let err = vm.run().unwrap_err();
        assert!(matches!(
            err.fault,
            Fault::BranchOutOfBounds { op: Opcode::BRT, target: 9999 }
        ));
    }

    #[test]
    fn non_boolean_branch_operand_is_fatal() {
        let mut vm = bare_vm(vec![Opcode::BRT as u64, 0]);
        let id = push_const(&mut vm, Value::Integer(42));
        vm.cmd_stack.push(id);

        let err = vm.run().unwrap_err();
        assert!(matches!(err.fault, Fault::NonBooleanBranchOperand(_)));
    }

    #[test]
    fn integer_div_is_quotient_not_product() {
        // Guards against the source's copy/paste `t * t1` bug (§9).
        let mut vm = bare_vm(vec![
            Opcode::PUSH as u64, 0,
            Opcode::PUSH as u64, 0,
            Opcode::DIV as u64,
            Opcode::EXIT as u64,
        ]);
        let a = push_const(&mut vm, Value::Integer(7));
        let b = push_const(&mut vm, Value::Integer(2));
        vm.code[1] = a;
        vm.code[3] = b;

        vm.run().unwrap();
        let result_id = vm.cmd_stack[0];
        assert_eq!(vm.symbol(result_id).unwrap().value, Value::Integer(3));
    }

    #[test]
    fn add_produces_fresh_symbol_and_decrements_operands() {
        let mut vm = bare_vm(vec![
            Opcode::PUSH as u64, 0,
            Opcode::PUSH as u64, 0,
            Opcode::ADD as u64,
            Opcode::EXIT as u64,
        ]);
        let a = push_const(&mut vm, Value::Integer(2));
        let b = push_const(&mut vm, Value::Integer(3));
        vm.code[1] = a;
        vm.code[3] = b;

        vm.run().unwrap();
        assert_eq!(vm.cmd_stack.len(), 1);
        let result_id = vm.cmd_stack[0];
        assert_eq!(vm.symbol(result_id).unwrap().value, Value::Integer(5));
        // PUSH on a and b bumped their ref counts to 2; ADD decremented
        // each back to 1 (their permanent, image-pinned baseline).
        assert_eq!(vm.symbol(a).unwrap().ref_count, 1);
        assert_eq!(vm.symbol(b).unwrap().ref_count, 1);
    }

    #[test]
    fn jsr_pushes_return_address_and_ret_restores_pc() {
        // JSR const(label -> RET at index 3); EXIT; RET
        let mut vm = bare_vm(vec![
            Opcode::JSR as u64, 0, // patched
            Opcode::EXIT as u64,
            Opcode::RET as u64,
        ]);
        let label = push_const(&mut vm, Value::Label(3));
        vm.code[1] = label;

        vm.run().unwrap();
        assert_eq!(vm.state(), State::Exited);
        assert!(vm.call_stack().is_empty());
    }

    #[test]
    fn call_dispatches_to_registered_host_function() {
        let mut vm = bare_vm(vec![Opcode::CALL as u64, 0, Opcode::EXIT as u64]);
        let id = vm.table.alloc_id();
        vm.table
            .insert(Symbol::new(id, "os.true".to_string(), SymSection::Os, Value::Label(0), 1));
        vm.code[1] = id;

        vm.run().unwrap();
        assert_eq!(vm.cmd_stack(), &[TRUE]);
    }

    #[test]
    fn call_to_unregistered_name_is_fatal() {
        let mut vm = bare_vm(vec![Opcode::CALL as u64, 0]);
        let id = vm.table.alloc_id();
        vm.table.insert(Symbol::new(
            id,
            "os.nonexistent".to_string(),
            SymSection::Os,
            Value::Label(0),
            1,
        ));
        vm.code[1] = id;

        let err = vm.run().unwrap_err();
        assert!(matches!(err.fault, Fault::HostCallDispatch(_)));
    }

    #[test]
    fn gc_invariant_holds_after_collection() {
        let mut vm = bare_vm(vec![
            Opcode::PUSH as u64, 0,
            Opcode::PUSH as u64, 0,
            Opcode::ADD as u64,
            Opcode::EXIT as u64,
        ]);
        let a = push_const(&mut vm, Value::Integer(1));
        let b = push_const(&mut vm, Value::Integer(1));
        vm.code[1] = a;
        vm.code[3] = b;

        vm.run().unwrap();
        // pop the result and drop it so its refcount reaches zero
        let result_id = vm.cmd_stack.pop().unwrap();
        vm.ref_adjust(result_id, -1).unwrap();
        vm.gc();

        for sym in vm.symbols() {
            assert!(sym.ref_count > 0 || sym.section != SymSection::Variable);
        }
    }

    #[test]
    fn pause_taints_the_vm() {
        let mut vm = bare_vm(vec![Opcode::EXIT as u64]);
        vm.state = State::Running;
        assert!(!vm.tainted);

        vm.pause();

        assert_eq!(vm.state(), State::Paused);
        assert!(vm.tainted);
    }

    #[test]
    fn pause_outside_running_is_a_no_op() {
        let mut vm = bare_vm(vec![Opcode::EXIT as u64]);
        vm.pause();
        assert_eq!(vm.state(), State::Ready);
        assert!(!vm.tainted);
    }
}
