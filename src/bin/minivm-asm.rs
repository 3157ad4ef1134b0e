use std::{env, fs};

use minivm::assembler;
use minivm::logging::{assembly_diagnostics, error};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <input.mvasm> <output.mvc>", args[0]);
        std::process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];

    let source = fs::read_to_string(input_path).unwrap_or_else(|e| {
        error(format!("failed to read input file: {e}"));
        std::process::exit(1);
    });

    let bytecode = assembler::assemble(&source).unwrap_or_else(|diagnostics| {
        assembly_diagnostics(&diagnostics);
        std::process::exit(1);
    });

    fs::write(output_path, bytecode).unwrap_or_else(|e| {
        error(format!("failed to write to output file: {e}"));
        std::process::exit(1);
    });
}
