//! A plain-text stand-in for the original curses debugger: the same
//! step/inspect model (`n` to step, `q` to quit), rendered to stdout one
//! line at a time instead of painting a full-screen layout. Grounded on
//! `original_source/minivm/debug.py`'s `Debugger.run_command`/
//! `draw_frame_details`.

use std::io::{self, BufRead, Write};
use std::{env, fs};

use minivm::interpreter::{Machine, StdIo};
use minivm::logging::error;
use minivm::program::{Program, HEADER};
use minivm::assembler;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <input.mvc|input.mvasm>", args[0]);
        std::process::exit(1);
    }

    let data = fs::read(&args[1]).unwrap_or_else(|e| {
        error(format!("failed to read input file: {e}"));
        std::process::exit(1);
    });

    let bytecode = if data.starts_with(HEADER) {
        data
    } else {
        let source = String::from_utf8(data).unwrap_or_else(|_| {
            error("input is neither bytecode nor valid UTF-8 assembly".to_string());
            std::process::exit(1);
        });
        assembler::assemble(&source).unwrap_or_else(|diagnostics| {
            for d in &diagnostics {
                eprintln!("{d}");
            }
            std::process::exit(1);
        })
    };

    let program = Program::new(bytecode).unwrap_or_else(|e| {
        error(format!("{e}"));
        std::process::exit(1);
    });

    let mut machine = Machine::new(program, StdIo);
    if let Err(e) = machine.start() {
        error(format!("{e}"));
        std::process::exit(1);
    }

    println!("n - step one instruction, p - print state, q - quit");
    print_state(&machine);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    while machine.running() {
        print!("(minivm-debug) ");
        let _ = io::stdout().flush();
        let Some(Ok(line)) = lines.next() else { break };
        match line.trim() {
            "n" => match machine.step() {
                Ok(()) => print_state(&machine),
                Err(e) => {
                    for line in machine.traceback() {
                        eprintln!("{line}");
                    }
                    error(format!("{e}"));
                    break;
                }
            },
            "p" => print_state(&machine),
            "q" => break,
            "" => continue,
            other => println!("unknown command: {other}"),
        }
    }

    if !machine.running() {
        if let Some(result) = machine.result() {
            println!("result: {result}");
        }
    }
}

fn print_state(machine: &Machine<StdIo>) {
    let Some(ip) = machine.ip() else {
        println!("(halted)");
        return;
    };
    println!("ip: {ip:04X}");
    for frame in machine.frames() {
        println!("  {} (ip={:04X})", frame.name, frame.ip);
        println!(
            "    locals: [{}]",
            frame.locals.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        );
        println!(
            "    stack:  [{}]",
            frame.stack.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        );
    }
}
