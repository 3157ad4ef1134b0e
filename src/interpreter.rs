//! Executes a [`Program`] frame by frame.
//!
//! Grounded on `original_source/minivm/run.py`'s `Machine`: a `step()`
//! fetch-decode-execute loop over a call-frame stack, with arithmetic,
//! comparison, and function-call dispatch broken out the same way
//! `handle_arith`/`handle_cmp`/`handle_call` are in the original. The
//! overall fetch/execute shape (advance `ip`, dispatch on the opcode)
//! follows the same fetch/execute loop structure used elsewhere in this
//! style of bytecode interpreter.

pub mod error;
pub mod frame;
pub mod natives;

use std::collections::HashMap;
use std::rc::Rc;

use crate::disassembler::Disassembler;
use crate::program::Program;
use crate::value::{overflow, Opcode, Value};

pub use error::RuntimeError;
pub use frame::Frame;
pub use natives::{BufferedIo, HostIo, StdIo};

const STACK_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Function {
    entry: usize,
    n_params: usize,
    n_locals: usize,
}

/// A running (or finished) MiniVM machine.
pub struct Machine<IO: HostIo> {
    program: Program,
    functions: HashMap<Rc<str>, Function>,
    frames: Vec<Frame>,
    globals: HashMap<Rc<str>, Value>,
    result: Option<Value>,
    io: IO,
}

impl<IO: HostIo> Machine<IO> {
    /// Build a machine, indexing every `FUNC` declaration in the program.
    /// Functions execute starting right after their own header.
    pub fn new(program: Program, io: IO) -> Machine<IO> {
        let mut functions = HashMap::new();
        for item in program.iter().flatten() {
            let (pos, length, op, args) = item;
            if op == Opcode::Func {
                let name: Rc<str> = Rc::from(args[0].as_str().unwrap());
                let n_params = args[1].as_i64().unwrap() as usize;
                let n_locals = args[2].as_i64().unwrap() as usize;
                functions.insert(name, Function { entry: pos + length, n_params, n_locals });
            }
        }
        Machine {
            program,
            functions,
            frames: Vec::new(),
            globals: HashMap::new(),
            result: None,
            io,
        }
    }

    /// Run `main` to completion, returning its result value.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        self.start()?;
        while self.running() {
            self.step()?;
        }
        Ok(self.result.clone().unwrap_or(Value::Null))
    }

    pub fn running(&self) -> bool {
        !self.frames.is_empty()
    }

    /// The current instruction pointer, or `None` once the machine halts.
    pub fn ip(&self) -> Option<usize> {
        self.frames.last().map(|f| f.ip)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    /// Enter `main` with no arguments.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        self.enter_function("main", &[], false)
    }

    fn enter_function(&mut self, name: &str, args: &[Value], void: bool) -> Result<(), RuntimeError> {
        let func = *self
            .functions
            .get(name)
            .ok_or_else(|| RuntimeError::new(format!("Function not found: {name}")))?;
        if args.len() != func.n_params {
            return Err(RuntimeError::new(format!(
                "Function {name} expects {} arguments, not {}",
                func.n_params,
                args.len()
            )));
        }
        self.frames.push(Frame::new(name, func.entry, args, func.n_locals, void));
        Ok(())
    }

    /// Execute exactly one instruction.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        let ip = self.frames.last().unwrap().ip;
        let (length, op, args) = self
            .program
            .read_from(ip)
            .map_err(|e| RuntimeError::new(format!("{e}")))?;
        {
            let frame = self.frames.last_mut().unwrap();
            frame.prev_ip = frame.ip;
            frame.ip += length;
        }

        match op {
            Opcode::Func => return Err(self.runtime_error("trying to execute FUNC")),
            Opcode::ConstNull => self.push(Value::Null)?,
            Opcode::ConstFalse => self.push(Value::Boolean(false))?,
            Opcode::ConstTrue => self.push(Value::Boolean(true))?,
            Opcode::ConstInt | Opcode::ConstIntBig => {
                self.push(Value::Integer(args[0].as_i64().unwrap() as i16))?
            }
            Opcode::ConstString => self.push(Value::string(args[0].as_str().unwrap()))?,

            Opcode::OpNeg => {
                let val = self.pop()?;
                let n = self.check_int(&val)?;
                self.push(Value::Integer(overflow(-(n as i64))))?;
            }

            Opcode::OpAdd | Opcode::OpSub | Opcode::OpMul | Opcode::OpDiv | Opcode::OpMod => {
                self.handle_arith(op)?
            }

            Opcode::CmpEq | Opcode::CmpNe | Opcode::CmpLt | Opcode::CmpLte | Opcode::CmpGt | Opcode::CmpGte => {
                self.handle_cmp(op)?
            }

            Opcode::OpNot => {
                let val = self.pop()?;
                self.push(Value::Boolean(!val.is_truthy()))?;
            }

            Opcode::Dup => {
                let val = self.pop()?;
                self.push(val.clone())?;
                self.push(val)?;
            }
            Opcode::Drop => {
                self.pop()?;
            }

            Opcode::LoadGlobal => {
                let name = args[0].as_str().unwrap();
                let val = self
                    .globals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::new(format!("Undefined global name: {name}")))?;
                self.push(val)?;
            }
            Opcode::StoreGlobal => {
                let name: Rc<str> = Rc::from(args[0].as_str().unwrap());
                let val = self.pop()?;
                self.globals.insert(name, val);
            }

            Opcode::LoadLocal => {
                let n = args[0].as_i64().unwrap() as usize;
                let frame = self.frames.last().unwrap();
                let val = frame
                    .locals
                    .get(n)
                    .cloned()
                    .ok_or_else(|| RuntimeError::new(format!("Invalid local number: {n}")))?;
                self.push(val)?;
            }
            Opcode::StoreLocal => {
                let n = args[0].as_i64().unwrap() as usize;
                let val = self.pop()?;
                let frame = self.frames.last_mut().unwrap();
                if n >= frame.locals.len() {
                    return Err(RuntimeError::new(format!("Invalid local number: {n}")));
                }
                frame.locals[n] = val;
            }

            Opcode::Jump => {
                let delta = args[0].as_i64().unwrap();
                let frame = self.frames.last_mut().unwrap();
                frame.ip = (frame.prev_ip as i64 + delta) as usize;
            }
            Opcode::JumpIf => {
                let val = self.pop()?;
                if val.is_truthy() {
                    let delta = args[0].as_i64().unwrap();
                    let frame = self.frames.last_mut().unwrap();
                    frame.ip = (frame.prev_ip as i64 + delta) as usize;
                }
            }

            Opcode::Call => {
                let name = args[0].as_str().unwrap().to_string();
                let n_args = args[1].as_i64().unwrap() as usize;
                self.handle_call(&name, n_args, false)?;
            }
            Opcode::CallVoid => {
                let name = args[0].as_str().unwrap().to_string();
                let n_args = args[1].as_i64().unwrap() as usize;
                self.handle_call(&name, n_args, true)?;
            }

            Opcode::Ret => {
                let frame = self.frames.last_mut().unwrap();
                let val = if frame.stack.is_empty() { None } else { Some(self.pop_unchecked()) };
                let frame = self.frames.pop().unwrap();
                if let Some(caller) = self.frames.last_mut() {
                    if !frame.void {
                        caller.stack.push(val.unwrap_or(Value::Null));
                    }
                } else {
                    self.result = val;
                }
            }
        }
        Ok(())
    }

    fn handle_arith(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;
        let a = self.check_int(&a)?;
        let b = self.check_int(&b)?;

        let result = match op {
            Opcode::OpAdd => a as i64 + b as i64,
            Opcode::OpSub => a as i64 - b as i64,
            Opcode::OpMul => a as i64 * b as i64,
            Opcode::OpDiv => {
                if b == 0 {
                    return Err(self.runtime_error("division by 0"));
                }
                floor_div(a as i64, b as i64)
            }
            Opcode::OpMod => {
                if b == 0 {
                    return Err(self.runtime_error("modulo by 0"));
                }
                floor_mod(a as i64, b as i64)
            }
            _ => unreachable!(),
        };
        self.push(Value::Integer(overflow(result)))
    }

    fn handle_cmp(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let (a, b) = self.pop_pair()?;

        if !matches!(op, Opcode::CmpEq | Opcode::CmpNe) && std::mem::discriminant(&a) != std::mem::discriminant(&b) {
            return Err(self.runtime_error(format!(
                "incompatible types for comparison: {a} and {b}"
            )));
        }

        let result = match op {
            Opcode::CmpEq => a == b,
            Opcode::CmpNe => a != b,
            Opcode::CmpLt | Opcode::CmpLte | Opcode::CmpGt | Opcode::CmpGte => {
                let ordering = ordered_compare(&a, &b)
                    .ok_or_else(|| RuntimeError::new(format!("incompatible types for comparison: {a} and {b}")))?;
                match op {
                    Opcode::CmpLt => ordering.is_lt(),
                    Opcode::CmpLte => ordering.is_le(),
                    Opcode::CmpGt => ordering.is_gt(),
                    Opcode::CmpGte => ordering.is_ge(),
                    _ => unreachable!(),
                }
            }
            _ => unreachable!(),
        };
        self.push(Value::Boolean(result))
    }

    fn handle_call(&mut self, name: &str, n_args: usize, void: bool) -> Result<(), RuntimeError> {
        let args = self.pop_n(n_args)?;

        if self.functions.contains_key(name) {
            self.enter_function(name, &args, void)
        } else if let Some(expected) = natives::arity(name) {
            if n_args != expected {
                return Err(self.runtime_error(format!(
                    "Function {name} expects {expected} arguments, not {}",
                    args.len()
                )));
            }
            let result = natives::call(name, &args, &mut self.io)
                .map_err(|e| RuntimeError::new(format!("Error running native function {name}: {e}")))?;
            if !void {
                self.push(result)?;
            }
            Ok(())
        } else {
            Err(self.runtime_error(format!("unknown function: {name}")))
        }
    }

    fn push(&mut self, val: Value) -> Result<(), RuntimeError> {
        let frame = self.frames.last_mut().unwrap();
        if frame.stack.len() >= STACK_LIMIT {
            return Err(RuntimeError::new("stack overflow"));
        }
        frame.stack.push(val);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.frames
            .last_mut()
            .unwrap()
            .stack
            .pop()
            .ok_or_else(|| RuntimeError::new("stack underflow"))
    }

    fn pop_unchecked(&mut self) -> Value {
        self.frames.last_mut().unwrap().stack.pop().unwrap()
    }

    /// Pop two values keeping stack order: the deeper value is `a`, the
    /// one popped last off the top is `b` — matches `pop_many(2)`'s
    /// reversal in the original, so `a - b` subtracts the top from the
    /// value beneath it.
    fn pop_pair(&mut self) -> Result<(Value, Value), RuntimeError> {
        let mut values = self.pop_n(2)?;
        let b = values.pop().unwrap();
        let a = values.pop().unwrap();
        Ok((a, b))
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let frame = self.frames.last_mut().unwrap();
        if frame.stack.len() < n {
            return Err(RuntimeError::new("stack underflow"));
        }
        Ok(frame.stack.split_off(frame.stack.len() - n))
    }

    fn check_int(&self, val: &Value) -> Result<i16, RuntimeError> {
        val.as_int()
            .ok_or_else(|| RuntimeError::new(format!("expecting an integer, got {val}")))
    }

    fn runtime_error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::new(message.into())
    }

    /// Render the active call stack, innermost frame last, the way
    /// `original_source/minivm/run.py`'s `traceback()` does: each frame's
    /// name and faulting address, followed by the disassembled line.
    pub fn traceback(&self) -> Vec<String> {
        let dis = Disassembler::new(&self.program, true, true);
        let mut lines = Vec::new();
        for frame in &self.frames {
            lines.push(format!("{} ({:04X})", frame.name, frame.prev_ip));
            if let Ok((_, op, args)) = self.program.read_from(frame.prev_ip) {
                let body = dis.dump_line_body(frame.prev_ip, op, &args, &HashMap::new());
                lines.push(format!("  {}", body.trim_start()));
            }
        }
        lines
    }
}

/// Floor division: matches Python's `//`, which `original_source/minivm/
/// run.py`'s `OP_DIV` relies on — distinct from Rust's truncating `/`
/// whenever the operands' signs differ and the division isn't exact.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }
}

/// Floor remainder: always takes the sign of `b`, unlike Rust's `%`.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { r + b } else { r }
}

/// `<`/`<=`/`>`/`>=` compare integers numerically and strings
/// lexicographically; any other pairing (already past the `CMP_EQ`/`CMP_NE`
/// short-circuit) has no ordering.
fn ordered_compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn run(source: &str) -> Result<Value, RuntimeError> {
        let bytecode = assemble(source).expect("assembles");
        let program = Program::new(bytecode).unwrap();
        Machine::new(program, BufferedIo::new()).run()
    }

    #[test]
    fn adds_two_constants() {
        let source = "FUNC \"main\" 0 0\n    CONST_INT 2\n    CONST_INT 3\n    OP_ADD\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(5));
    }

    #[test]
    fn subtraction_keeps_stack_order_a_minus_b() {
        let source = "FUNC \"main\" 0 0\n    CONST_INT 10\n    CONST_INT 3\n    OP_SUB\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(7));
    }

    #[test]
    fn modulo_is_floor_remainder_not_addition() {
        let source = "FUNC \"main\" 0 0\n    CONST_INT 7\n    CONST_INT 3\n    OP_MOD\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(1));
    }

    #[test]
    fn modulo_takes_the_sign_of_a_negative_divisor() {
        // 7 mod -2: Rust's truncating `%` gives 1, floor-remainder gives -1.
        let source = "FUNC \"main\" 0 0\n    CONST_INT 7\n    CONST_INT -2\n    OP_MOD\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(-1));
    }

    #[test]
    fn division_rounds_toward_negative_infinity() {
        // 7 / -2: Rust's truncating `/` gives -3, floor division gives -4.
        let source = "FUNC \"main\" 0 0\n    CONST_INT 7\n    CONST_INT -2\n    OP_DIV\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(-4));
    }

    #[test]
    fn modulo_by_zero_is_a_runtime_error() {
        let source = "FUNC \"main\" 0 0\n    CONST_INT 7\n    CONST_INT 0\n    OP_MOD\n    RET\n";
        assert!(run(source).is_err());
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let source = "FUNC \"main\" 0 0\n    CONST_INT 7\n    CONST_INT 0\n    OP_DIV\n    RET\n";
        assert!(run(source).is_err());
    }

    #[test]
    fn integer_overflow_wraps() {
        let source = "FUNC \"main\" 0 0\n    CONST_INT_BIG 32767\n    CONST_INT 1\n    OP_ADD\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(-32768));
    }

    #[test]
    fn locals_round_trip() {
        let source = "FUNC \"main\" 0 1\n    CONST_INT 9\n    STORE_LOCAL 0\n    LOAD_LOCAL 0\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(9));
    }

    #[test]
    fn globals_round_trip() {
        // STORE_GLOBAL/LOAD_GLOBAL take the name as an immediate operand,
        // not from the stack.
        let source = "FUNC \"main\" 0 0\n    CONST_INT 1\n    STORE_GLOBAL \"k\"\n    LOAD_GLOBAL \"k\"\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Integer(1));
    }

    #[test]
    fn jump_if_only_takes_the_branch_when_truthy() {
        let source = "\
FUNC \"main\" 0 0
    CONST_FALSE
    JUMP_IF SKIP
    CONST_INT 1
    RET
SKIP:
    CONST_INT 2
    RET
";
        assert_eq!(run(source).unwrap(), Value::Integer(1));
    }

    #[test]
    fn calling_an_unknown_function_is_a_runtime_error() {
        let source = "FUNC \"main\" 0 0\n    CALL_VOID \"nope\" 0\n    RET\n";
        assert!(run(source).is_err());
    }

    #[test]
    fn stack_underflow_is_reported_not_panicked() {
        let source = "FUNC \"main\" 0 0\n    OP_ADD\n    RET\n";
        assert!(run(source).is_err());
    }

    #[test]
    fn eq_across_types_is_false_not_an_error() {
        let source = "FUNC \"main\" 0 0\n    CONST_NULL\n    CONST_INT 0\n    CMP_EQ\n    RET\n";
        assert_eq!(run(source).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn ordering_across_types_is_a_runtime_error() {
        let source = "FUNC \"main\" 0 0\n    CONST_NULL\n    CONST_INT 0\n    CMP_LT\n    RET\n";
        assert!(run(source).is_err());
    }

    #[test]
    fn calling_a_native_function_round_trips_through_io() {
        let source = "FUNC \"main\" 0 0\n    CONST_STRING \"hi\"\n    CALL_VOID \"println\" 1\n    RET\n";
        let bytecode = assemble(source).unwrap();
        let program = Program::new(bytecode).unwrap();
        let mut machine = Machine::new(program, BufferedIo::new());
        machine.run().unwrap();
        assert_eq!(machine.io().output(), "hi\n");
    }
}
