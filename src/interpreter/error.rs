//! The interpreter's single error type — `original_source/minivm/run.py`'s
//! `MachineError` carries only a message, so this does too, rather than
//! a per-cause enum: every failure site already produces a finished
//! human-readable sentence, and the caller's `traceback()` supplies the
//! "where".

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> RuntimeError {
        RuntimeError { message: message.into() }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeError {}
