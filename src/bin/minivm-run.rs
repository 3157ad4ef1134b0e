use std::io::Read as _;
use std::{env, fs};

use minivm::interpreter::{Machine, StdIo};
use minivm::logging::{assembly_diagnostics, error, runtime_traceback};
use minivm::program::{Program, HEADER};
use minivm::assembler;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <input.mvc|input.mvasm|->", args[0]);
        std::process::exit(1);
    }

    let data = read_input(&args[1]).unwrap_or_else(|e| {
        error(format!("failed to read input: {e}"));
        std::process::exit(1);
    });

    let bytecode = if data.starts_with(HEADER) {
        data
    } else {
        let source = String::from_utf8(data).unwrap_or_else(|_| {
            error("input is neither a bytecode file nor valid UTF-8 assembly".to_string());
            std::process::exit(1);
        });
        assembler::assemble(&source).unwrap_or_else(|diagnostics| {
            assembly_diagnostics(&diagnostics);
            std::process::exit(1);
        })
    };

    let program = Program::new(bytecode).unwrap_or_else(|e| {
        error(format!("{e}"));
        std::process::exit(1);
    });

    let mut machine = Machine::new(program, StdIo);
    match machine.run() {
        Ok(result) => println!("result: {result}"),
        Err(e) => {
            runtime_traceback(&machine.traceback(), &e.message);
            std::process::exit(1);
        }
    }
}

fn read_input(path: &str) -> std::io::Result<Vec<u8>> {
    if path == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(path)
    }
}
