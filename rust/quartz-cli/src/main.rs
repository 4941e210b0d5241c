//! The `quartz` command: run a script file, evaluate a one-liner, or drop
//! into the REPL.

mod builtins;
mod diagnostics;
mod repl;

use clap::Parser;
use diagnostics::{parse_error_json, render_exception, render_parse_error};
use quartz_core::{GlobalContext, Value};
use quartz_rt::Program;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "quartz", version, about = "The Quartz scripting language")]
struct Cli {
    /// Script file to run; omitted, the REPL starts
    file: Option<PathBuf>,

    /// Evaluate the given source text instead of a file
    #[arg(short = 'e', long = "eval", conflicts_with = "file")]
    eval: Option<String>,

    /// Print parse errors as JSON records
    #[arg(long)]
    json: bool,

    /// Dump the program's result value on success
    #[arg(long)]
    dump: bool,

    /// Arguments handed to the script through `__varg`
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let global = GlobalContext::new();
    builtins::install(&global);

    let (source, filename): (Vec<u8>, String) = if let Some(text) = &cli.eval {
        (text.clone().into_bytes(), "<eval>".to_string())
    } else if let Some(path) = &cli.file {
        match std::fs::read(path) {
            Ok(bytes) => (bytes, path.display().to_string()),
            Err(err) => {
                eprintln!("quartz: cannot read {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        return match repl::run(&global) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("quartz: {}", err);
                ExitCode::FAILURE
            }
        };
    };

    let program = match Program::compile(&source, &filename) {
        Ok(program) => program,
        Err(err) => {
            if cli.json {
                println!("{}", parse_error_json(&err, &filename));
            } else {
                eprint!("{}", render_parse_error(&err, &source, &filename));
            }
            return ExitCode::FAILURE;
        }
    };

    match program.execute(&global, repl::host_args(&cli.args)) {
        Ok(result) => {
            match result.read() {
                Ok(value) => {
                    if cli.dump {
                        println!("{}", value.dump());
                    } else if cli.eval.is_some() && !matches!(value, Value::Null) {
                        println!("{}", value);
                    }
                }
                Err(err) => {
                    eprintln!("quartz: {}", err);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(exception) => {
            eprint!("{}", render_exception(&exception));
            ExitCode::FAILURE
        }
    }
}
