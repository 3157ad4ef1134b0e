use std::{env, fs};

use minivm::disassembler::Disassembler;
use minivm::logging::error;
use minivm::program::Program;

struct Options {
    input_path: String,
    output_path: Option<String>,
    hex: bool,
    color: bool,
}

fn parse_args(args: &[String]) -> Options {
    let mut positional = Vec::new();
    let mut hex = false;
    let mut no_color = false;

    for arg in &args[1..] {
        match arg.as_str() {
            "--hex" => hex = true,
            "--no-color" => no_color = true,
            _ => positional.push(arg.clone()),
        }
    }

    if positional.is_empty() || positional.len() > 2 {
        eprintln!("Usage: {} [--hex] [--no-color] <input.mvc> [output.mvasm]", args[0]);
        std::process::exit(1);
    }

    Options {
        input_path: positional[0].clone(),
        output_path: positional.get(1).cloned(),
        hex,
        color: !no_color,
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = parse_args(&args);

    let bytecode = fs::read(&opts.input_path).unwrap_or_else(|e| {
        error(format!("failed to read input file: {e}"));
        std::process::exit(1);
    });

    let program = Program::new(bytecode).unwrap_or_else(|e| {
        error(format!("{e}"));
        std::process::exit(1);
    });

    let output = Disassembler::new(&program, opts.hex, opts.color).dump();

    match opts.output_path {
        Some(path) => fs::write(&path, output).unwrap_or_else(|e| {
            error(format!("failed to write to output file: {e}"));
            std::process::exit(1);
        }),
        None => print!("{output}"),
    }
}
