// File: src/main.rs
//
// Command-line entry point for the Adder programming language.
// Scripts run sequentially in independent environments on the bytecode VM
// (or the tree-walking interpreter behind a flag); with no scripts the
// interactive REPL starts. Precompiled `.adrc` images load directly.

use adder::compiler::Compiler;
use adder::errors::AdderError;
use adder::evaluator::Evaluator;
use adder::io;
use adder::parser::Parser as AdderParser;
use adder::repl::{Engine, Repl};
use adder::value::Value;
use adder::vm::VM;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "adder",
    about = "Adder: a small embeddable scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    /// Script files to evaluate sequentially; starts a REPL when omitted
    scripts: Vec<PathBuf>,

    /// Use the tree-walking interpreter instead of the bytecode VM
    #[arg(long)]
    interpreter: bool,

    /// Compile a single script to a bytecode image instead of running it
    #[arg(long, value_name = "FILE")]
    emit_bytecode: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(output) = &cli.emit_bytecode {
        let [script] = cli.scripts.as_slice() else {
            eprintln!("--emit-bytecode expects exactly one script");
            return ExitCode::from(2);
        };
        return match compile_to_file(script, output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                eprintln!("{}", error);
                ExitCode::FAILURE
            }
        };
    }

    if cli.scripts.is_empty() {
        let engine = if cli.interpreter { Engine::Interpreter } else { Engine::Vm };
        return match Repl::new(engine) {
            Ok(mut repl) => match repl.run() {
                Ok(()) => ExitCode::SUCCESS,
                Err(error) => {
                    eprintln!("REPL error: {}", error);
                    ExitCode::FAILURE
                }
            },
            Err(error) => {
                eprintln!("failed to start REPL: {}", error);
                ExitCode::FAILURE
            }
        };
    }

    let mut failed = false;
    for script in &cli.scripts {
        if let Err(error) = run_script(script, cli.interpreter) {
            eprintln!("{}", error);
            failed = true;
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn parse_source(path: &Path) -> Result<adder::ast::Program, AdderError> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        AdderError::new(
            adder::errors::ErrorKind::Runtime,
            format!("cannot read {}: {}", path.display(), e),
        )
    })?;
    let mut parser = AdderParser::new(&source);
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        for error in &parser.errors {
            eprintln!("{}", AdderError::parse(error.message.clone(), error.pos));
        }
        Err(AdderError::new(
            adder::errors::ErrorKind::Parse,
            format!("{}: {} parse error(s)", path.display(), parser.errors.len()),
        ))
    }
}

fn compile_to_file(script: &Path, output: &Path) -> Result<(), AdderError> {
    let program = parse_source(script)?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    io::write_file(output, &compiler.bytecode())
}

fn run_script(path: &Path, use_interpreter: bool) -> Result<(), AdderError> {
    // Precompiled images skip the front end entirely.
    if path.extension().is_some_and(|ext| ext == "adrc") {
        let bytecode = io::read_file(path)?;
        let mut vm = VM::new(bytecode);
        return vm.run();
    }

    let program = parse_source(path)?;
    if use_interpreter {
        let mut evaluator = Evaluator::new();
        match evaluator.eval_program(&program) {
            Value::Error(message) => Err(AdderError::new(
                adder::errors::ErrorKind::Runtime,
                message.to_string(),
            )),
            _ => Ok(()),
        }
    } else {
        let mut compiler = Compiler::new();
        compiler.compile(&program)?;
        let mut vm = VM::new(compiler.bytecode());
        vm.run()
    }
}
