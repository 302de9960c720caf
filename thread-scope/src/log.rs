//! Auxilliary functions for logging information to `stderr`.
use colored::Colorize;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
    ExecutableCommand,
};
use std::io::stderr;

/// Width of the right-aligned header column.
const HEADER_WIDTH: usize = 12;

fn indent_with(header: colored::ColoredString, msg: String) {
    // clear current line
    let _ = stderr().execute(Clear(ClearType::CurrentLine));
    let _ = stderr().execute(cursor::MoveToColumn(0));

    let mut lines = msg.lines();
    eprintln!(
        "{:>w$} {}",
        header,
        lines.next().unwrap_or_default(),
        w = HEADER_WIDTH
    );
    for line in lines {
        eprintln!("{:>w$} {}", "", line, w = HEADER_WIDTH);
    }
}

pub fn status(header: &str, msg: String) {
    indent_with(header.green().bold(), msg);
}

pub fn warn(msg: String) {
    indent_with("Warning".yellow().bold(), msg);
}

pub fn err(msg: String) {
    indent_with("Error".red().bold(), msg);
}

pub fn frontend(msg: String) {
    indent_with("Frontend".cyan().bold(), msg);
}

pub fn hint(msg: String) {
    indent_with("Hint".blue().bold(), msg);
}

/// Echoes raw shell output for diagnosis. The line at `offending`, if
/// any, is highlighted.
pub fn raw_lines(header: &str, lines: &[String], offending: Option<usize>) {
    indent_with(header.magenta().bold(), format!("{} line(s):", lines.len()));
    for (i, line) in lines.iter().enumerate() {
        let nr = format!("{:>4} |", i + 1);
        if Some(i) == offending {
            eprintln!(
                "{:>w$} {} {}",
                ">>".red().bold(),
                nr,
                line.red(),
                w = HEADER_WIDTH
            );
        } else {
            eprintln!("{:>w$} {} {}", "", nr.dimmed(), line, w = HEADER_WIDTH);
        }
    }
}
