//! Converts MiniVM assembly source into bytecode in a two-pass manner.
//!
//! Pass 1 tokenizes each line, records label addresses, and emits bytes —
//! with a 3-byte placeholder for any `JUMP`/`JUMP_IF` whose operand is a
//! label rather than a literal delta. Pass 2 patches those placeholders
//! once every label in the source is known.
//!
//! Comments start with `#` and run to the end of the line. Labels are
//! matched case-insensitively (internally normalized to uppercase), same
//! as opcode names; this mirrors `original_source/minivm/assemble.py`,
//! which upper-cases both before storing them in its symbol table.
//!
//! The syntax comes straight from `spec.md` §4.2-§4.3 and is exercised
//! end to end by `original_source/minivm/assemble.py`'s `AssemblerTest`.

pub mod encode;

use std::collections::HashMap;
use std::fmt;
use std::fs;

use crate::program::HEADER;
use crate::tokens::{Scanner, Token};
use crate::value::Opcode;

/// A single assembly diagnostic: `line:col: error: MESSAGE`, followed by
/// the offending source line and a caret under the column.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub col: usize,
    pub message: String,
    pub source_line: String,
}

impl Diagnostic {
    pub fn new(line: usize, col: usize, message: impl Into<String>, source_line: impl Into<String>) -> Diagnostic {
        Diagnostic {
            line,
            col,
            message: message.into(),
            source_line: source_line.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:{}: error: {}", self.line, self.col, self.message)?;
        writeln!(f, "  {}", self.source_line)?;
        write!(f, "  {}^", " ".repeat(self.col))
    }
}

impl std::error::Error for Diagnostic {}

/// Read a file and assemble it, wrapping read failures as a single
/// diagnostic so callers only ever handle one error shape.
pub fn assemble_from_file(path: &str) -> Result<Vec<u8>, Vec<Diagnostic>> {
    let source = fs::read_to_string(path)
        .map_err(|e| vec![Diagnostic::new(0, 0, format!("failed to read {path}: {e}"), "")])?;
    assemble(&source)
}

/// A forward reference recorded while assembling: the label needs to be
/// resolved, and its 2-byte delta written at `operand_offset`.
struct PendingJump {
    operand_offset: usize,
    label: String,
    line: usize,
    col: usize,
}

/// Assemble source text into a MiniVM bytecode buffer, or every
/// diagnostic the assembler could collect in one pass.
///
/// Every line is attempted even after earlier lines fail, the way
/// `original_source/minivm/assemble.py`'s `assemble` collects `self.errors`
/// across the whole file rather than aborting at the first one. A line
/// that fails to encode does not advance the output position.
pub fn assemble(source: &str) -> Result<Vec<u8>, Vec<Diagnostic>> {
    let lines: Vec<&str> = source.lines().collect();
    let mut data = HEADER.to_vec();
    let mut targets: HashMap<String, usize> = HashMap::new();
    let mut pending_jumps: Vec<PendingJump> = Vec::new();
    let mut errors: Vec<Diagnostic> = Vec::new();

    for (line_number, line) in lines.iter().enumerate() {
        let mut tokens = match Scanner::new(*line, line_number).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                errors.push(Diagnostic::new(e.line, e.col, e.message, *line));
                continue;
            }
        };

        if tokens.is_empty() {
            continue;
        }

        if let Token::Label { line: l, col, value } = tokens[0].clone() {
            let key = value.to_uppercase();
            if targets.contains_key(&key) {
                errors.push(Diagnostic::new(l, col, format!("duplicate label: {key}"), *line));
            } else {
                targets.insert(key, data.len());
            }
            tokens.remove(0);
        }

        if tokens.is_empty() {
            continue;
        }

        match encode_statement(&tokens, data.len(), *line, &mut pending_jumps) {
            Ok(bytes) => data.extend(bytes),
            Err(diag) => errors.push(diag),
        }
    }

    patch_jumps(&mut data, &targets, &pending_jumps, &lines, &mut errors);

    if errors.is_empty() {
        Ok(data)
    } else {
        Err(errors)
    }
}

fn encode_statement(
    tokens: &[Token],
    instr_offset: usize,
    source_line: &str,
    pending_jumps: &mut Vec<PendingJump>,
) -> Result<Vec<u8>, Diagnostic> {
    let Token::Ident { line, col, value } = &tokens[0] else {
        return Err(Diagnostic::new(tokens[0].line(), tokens[0].col(), "operation name expected", source_line));
    };
    let op_name = value.to_uppercase();
    let Some(op) = Opcode::by_name(&op_name) else {
        return Err(Diagnostic::new(*line, *col, format!("unknown operation: {op_name}"), source_line));
    };

    let params = op.params();
    let args = &tokens[1..];
    if args.len() != params.len() {
        return Err(Diagnostic::new(
            *line,
            *col,
            format!(
                "wrong number of parameters for {}: expected {}, found {}",
                op.name(),
                params.len(),
                args.len()
            ),
            source_line,
        ));
    }

    // JUMP/JUMP_IF accept either a literal delta or a label naming the
    // target instruction; a bare identifier operand means the latter.
    if matches!(op, Opcode::Jump | Opcode::JumpIf) {
        if let Token::Ident { value: label, .. } = &args[0] {
            let label_tok = &args[0];
            pending_jumps.push(PendingJump {
                operand_offset: instr_offset + 1,
                label: label.to_uppercase(),
                line: label_tok.line(),
                col: label_tok.col(),
            });
            return Ok(vec![op.to_byte(), 0, 0]);
        }
    }

    let mut bytes = vec![op.to_byte()];
    for (token, kind) in args.iter().zip(params) {
        bytes.extend(encode::encode_param(*kind, token, source_line)?);
    }
    Ok(bytes)
}

fn patch_jumps(
    data: &mut [u8],
    targets: &HashMap<String, usize>,
    pending_jumps: &[PendingJump],
    lines: &[&str],
    errors: &mut Vec<Diagnostic>,
) {
    for jump in pending_jumps {
        let Some(&target) = targets.get(&jump.label) else {
            errors.push(Diagnostic::new(
                jump.line,
                jump.col,
                format!("unknown label: {}", jump.label),
                lines[jump.line],
            ));
            continue;
        };

        // The delta is relative to the byte right after the operand, so
        // it's measured from `operand_offset - 1` (the opcode byte).
        let delta = target as i64 - (jump.operand_offset as i64 - 1);
        if !(i16::MIN as i64..=i16::MAX as i64).contains(&delta) {
            errors.push(Diagnostic::new(
                jump.line,
                jump.col,
                format!("jump too big ({delta} bytes)"),
                lines[jump.line],
            ));
            continue;
        }

        let encoded = (delta as i16 as u16).to_le_bytes();
        data[jump.operand_offset] = encoded[0];
        data[jump.operand_offset + 1] = encoded[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Opcode;

    #[test]
    fn jump_patching_matches_spec_example() {
        let source = "\
FUNC \"hello\" 0 2
    CONST_INT 2
    CONST_INT 3
L2: OP_ADD
    JUMP L1
    JUMP L2
    JUMP -1
L1: CALL \"print\" 1
    RET
";
        let data = assemble(source).unwrap();
        let mut expected = HEADER.to_vec();
        expected.extend([Opcode::Func.to_byte(), 5, b'h', b'e', b'l', b'l', b'o', 0, 2]);
        expected.extend([Opcode::ConstInt.to_byte(), 2]);
        expected.extend([Opcode::ConstInt.to_byte(), 3]);
        expected.extend([Opcode::OpAdd.to_byte()]);
        expected.extend([Opcode::Jump.to_byte(), 9, 0]);
        expected.extend([Opcode::Jump.to_byte(), (0x100u16 - 4) as u8, 0xFF]);
        expected.extend([Opcode::Jump.to_byte(), (0x100u16 - 1) as u8, 0xFF]);
        expected.extend([Opcode::Call.to_byte(), 5, b'p', b'r', b'i', b'n', b't', 1]);
        expected.extend([Opcode::Ret.to_byte()]);
        assert_eq!(data, expected);
    }

    #[test]
    fn duplicate_labels_are_rejected_with_position() {
        let source = "A:\n    CONST_NULL\nA:\n    RET\n";
        let errors = assemble(source).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate label")));
    }

    #[test]
    fn unknown_label_reference_is_a_diagnostic_not_a_panic() {
        let source = "    JUMP NOWHERE\n";
        let errors = assemble(source).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unknown label")));
    }

    #[test]
    fn int_range_boundaries() {
        assert!(assemble("    CONST_INT 127\n    RET\n").is_ok());
        assert!(assemble("    CONST_INT -128\n    RET\n").is_ok());
        assert!(assemble("    CONST_INT 128\n    RET\n").is_err());
        assert!(assemble("    CONST_INT -129\n    RET\n").is_err());
    }

    #[test]
    fn int_big_range_boundaries() {
        assert!(assemble("    CONST_INT_BIG 32767\n    RET\n").is_ok());
        assert!(assemble("    CONST_INT_BIG -32768\n    RET\n").is_ok());
        assert!(assemble("    CONST_INT_BIG 32768\n    RET\n").is_err());
    }

    #[test]
    fn string_length_256_is_rejected() {
        let long = "a".repeat(256);
        let source = format!("    CONST_STRING \"{long}\"\n    RET\n");
        assert!(assemble(&source).is_err());
    }

    #[test]
    fn literal_jump_delta_is_not_patched() {
        let data = assemble("    JUMP -1\n").unwrap();
        assert_eq!(&data[8..11], &[Opcode::Jump.to_byte(), 0xFF, 0xFF]);
    }

    #[test]
    fn labels_are_case_insensitive() {
        let a = assemble("loop:\n    JUMP loop\n").unwrap();
        let b = assemble("LOOP:\n    JUMP Loop\n").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn errors_on_one_line_do_not_shift_later_addresses() {
        // the bad CONST_INT on line 1 must not consume output bytes, so
        // the label on line 2 still points at the RET that follows it.
        let source = "    CONST_INT 999\nL:\n    RET\n    JUMP L\n";
        let errors = assemble(source).unwrap_err();
        assert_eq!(errors.len(), 1);
    }
}
