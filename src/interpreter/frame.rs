//! A single call frame: operand stack, locals, and the two instruction
//! pointers a frame needs to resolve a relative jump after it has already
//! advanced past the jump's own operand.
//!
//! Grounded on `original_source/minivm/run.py`'s `Frame` class.

use crate::value::Value;

pub struct Frame {
    pub name: String,
    /// Instruction pointer of the instruction about to execute.
    pub ip: usize,
    /// Instruction pointer of the instruction that's currently executing —
    /// `JUMP`/`JUMP_IF` deltas are relative to this, and it's what gets
    /// reported in a traceback.
    pub prev_ip: usize,
    pub stack: Vec<Value>,
    pub locals: Vec<Value>,
    /// A `CALL_VOID`-entered frame discards its return value instead of
    /// pushing it onto the caller's stack.
    pub void: bool,
}

impl Frame {
    pub fn new(name: &str, ip: usize, args: &[Value], n_locals: usize, void: bool) -> Frame {
        let mut locals: Vec<Value> = args.to_vec();
        locals.extend(std::iter::repeat(Value::Null).take(n_locals));
        Frame {
            name: name.to_string(),
            ip,
            prev_ip: ip,
            stack: Vec::new(),
            locals,
            void,
        }
    }
}
