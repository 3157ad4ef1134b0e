//! Per-parameter-kind operand encoders, driven by each opcode's fixed
//! schema (`Opcode::params`) rather than per-instruction case analysis —
//! MiniVM's instruction set is schema-uniform, unlike CHIP-8's.
//!
//! Grounded on `original_source/minivm/assemble.py`'s `parse_param`.

use crate::assembler::Diagnostic;
use crate::tokens::Token;
use crate::value::ParamKind;

/// Encode a single operand token according to its declared parameter kind.
pub fn encode_param(kind: ParamKind, token: &Token, source_line: &str) -> Result<Vec<u8>, Diagnostic> {
    match kind {
        ParamKind::String => encode_string(token, source_line),
        ParamKind::Uint => encode_number(kind, token, source_line, 0, 0xFF),
        ParamKind::Int => encode_number(kind, token, source_line, -0x80, 0x7F),
        ParamKind::IntBig => encode_number(kind, token, source_line, -0x8000, 0x7FFF),
    }
}

fn encode_string(token: &Token, source_line: &str) -> Result<Vec<u8>, Diagnostic> {
    let &Token::Str { ref value, line, col } = token else {
        return Err(Diagnostic::new(token.line(), token.col(), "expected a string", source_line));
    };
    if !value.is_ascii() {
        return Err(Diagnostic::new(line, col, "string literal is not ASCII", source_line));
    }
    if value.len() > 255 {
        return Err(Diagnostic::new(line, col, "string literal too long", source_line));
    }
    let mut bytes = Vec::with_capacity(1 + value.len());
    bytes.push(value.len() as u8);
    bytes.extend_from_slice(value.as_bytes());
    Ok(bytes)
}

fn encode_number(
    kind: ParamKind,
    token: &Token,
    source_line: &str,
    min: i64,
    max: i64,
) -> Result<Vec<u8>, Diagnostic> {
    let &Token::Integer { value, line, col } = token else {
        return Err(Diagnostic::new(token.line(), token.col(), "expected a number", source_line));
    };
    if value < min || value > max {
        return Err(Diagnostic::new(
            line,
            col,
            format!("number should be between {min} and {max}: {value}"),
            source_line,
        ));
    }
    Ok(match kind {
        ParamKind::Uint => vec![value as u8],
        ParamKind::Int => vec![(value as i8) as u8],
        ParamKind::IntBig => ((value as i16) as u16).to_le_bytes().to_vec(),
        ParamKind::String => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_tok(value: i64) -> Token {
        Token::Integer { line: 0, col: 0, value }
    }

    fn str_tok(value: &str) -> Token {
        Token::Str { line: 0, col: 0, value: value.to_string() }
    }

    #[test]
    fn int_roundtrips_extremes() {
        assert_eq!(encode_param(ParamKind::Int, &int_tok(-128), "").unwrap(), vec![0x80]);
        assert_eq!(encode_param(ParamKind::Int, &int_tok(127), "").unwrap(), vec![0x7F]);
        assert!(encode_param(ParamKind::Int, &int_tok(-129), "").is_err());
        assert!(encode_param(ParamKind::Int, &int_tok(128), "").is_err());
    }

    #[test]
    fn int_big_roundtrips_extremes() {
        assert_eq!(
            encode_param(ParamKind::IntBig, &int_tok(-32768), "").unwrap(),
            vec![0x00, 0x80]
        );
        assert_eq!(
            encode_param(ParamKind::IntBig, &int_tok(32767), "").unwrap(),
            vec![0xFF, 0x7F]
        );
    }

    #[test]
    fn string_length_boundaries() {
        let s0 = str_tok("");
        assert_eq!(encode_param(ParamKind::String, &s0, "").unwrap(), vec![0]);

        let long = "a".repeat(255);
        let s255 = str_tok(&long);
        let encoded = encode_param(ParamKind::String, &s255, "").unwrap();
        assert_eq!(encoded[0], 255);
        assert_eq!(encoded.len(), 256);

        let too_long = "a".repeat(256);
        let s256 = str_tok(&too_long);
        assert!(encode_param(ParamKind::String, &s256, "").is_err());
    }
}
