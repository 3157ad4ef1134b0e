//! Pretty-printing messages to the console

use colored::Colorize;

use crate::assembler::Diagnostic;

/// Pretty-print an error message to the console
pub fn error(error_message: String) {
    let error_title = "error:".red().bold();
    eprintln!("{} {}", error_title, error_message);
}

/// Pretty-print a warning message to the console
pub fn warning(message: String, line_number: usize) {
    let warning = "warning:".yellow().bold();
    eprintln!("{} line {}: {}", warning, line_number, message);
}

/// Print every assembly diagnostic collected in one run, in the
/// `line:col: error: message` + source line + caret form.
pub fn assembly_diagnostics(diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        eprintln!(
            "{}:{}: {} {}",
            diag.line,
            diag.col,
            "error:".red().bold(),
            diag.message
        );
        eprintln!("  {}", diag.source_line);
        eprintln!("  {}{}", " ".repeat(diag.col), "^".green());
    }
}

/// Print a runtime traceback the way `minivm-run` reports a failed run:
/// innermost frame last, followed by the error message itself.
pub fn runtime_traceback(frames: &[String], message: &str) {
    eprintln!("Traceback (most recent frame last):");
    for line in frames {
        eprintln!("{line}");
    }
    eprintln!("{} {}", "error:".red().bold(), message);
}
