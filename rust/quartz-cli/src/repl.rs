//! Line-oriented read-eval-print loop.
//!
//! Each line compiles as a whole program against one persistent global
//! context, so definitions made on earlier lines stay visible through the
//! builtins-and-globals chain only; locals die with their line. Use `var`
//! assignments through builtins or wrap work in functions for persistence.

use crate::diagnostics::{render_exception, render_parse_error};
use quartz_core::{GlobalContext, Reference, Value};
use quartz_rt::Program;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub fn run(global: &GlobalContext) -> Result<(), ReadlineError> {
    let mut editor = DefaultEditor::new()?;
    println!("quartz repl — blank line or ctrl-d to exit");
    loop {
        let line = match editor.readline("qz> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        editor.add_history_entry(trimmed)?;
        // Statements need their semicolon; bare expressions get one and an
        // implicit `return` so the value prints.
        let source = if trimmed.ends_with(';') || trimmed.ends_with('}') {
            trimmed.to_string()
        } else {
            format!("return {};", trimmed)
        };
        let program = match Program::compile(source.as_bytes(), "<repl>") {
            Ok(program) => program,
            Err(err) => {
                eprint!("{}", render_parse_error(&err, source.as_bytes(), "<repl>"));
                continue;
            }
        };
        match program.execute(global, Vec::new()) {
            Ok(result) => match result.read() {
                Ok(Value::Null) => {}
                Ok(value) => println!("{}", value),
                Err(err) => eprintln!("{}", err),
            },
            Err(exception) => eprint!("{}", render_exception(&exception)),
        }
    }
}

/// Convert host command-line arguments into script references.
pub fn host_args(args: &[String]) -> Vec<Reference> {
    args.iter()
        .map(|arg| Reference::temporary(Value::string(arg.clone())))
        .collect()
}
