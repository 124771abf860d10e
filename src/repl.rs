// File: src/repl.rs
//
// Interactive REPL for the Adder programming language.
// Line editing and history come from rustyline; input with unbalanced
// delimiters buffers into multi-line mode. Compiler and VM state thread
// across inputs so bindings, classes, and constants persist; results echo
// in their inspect form unless they are null.

use crate::compiler::{Compiler, CompilerState};
use crate::errors::AdderError;
use crate::evaluator::Evaluator;
use crate::parser::Parser;
use crate::value::Value;
use crate::vm::{VmState, VM};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Which engine evaluates REPL input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Vm,
    Interpreter,
}

pub struct Repl {
    editor: DefaultEditor,
    engine: Engine,
    compiler_state: CompilerState,
    vm_state: VmState,
    evaluator: Evaluator,
}

impl Repl {
    pub fn new(engine: Engine) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Repl {
            editor: DefaultEditor::new()?,
            engine,
            compiler_state: CompilerState::new(),
            vm_state: VmState::new(),
            evaluator: Evaluator::new(),
        })
    }

    fn show_banner(&self) {
        println!(
            "{} {} ({} engine)",
            "Adder".bright_green().bold(),
            env!("CARGO_PKG_VERSION"),
            match self.engine {
                Engine::Vm => "bytecode",
                Engine::Interpreter => "tree-walking",
            }
        );
        println!("Type {} for commands, {} to leave.", ":help".bright_yellow(), ":quit".bright_yellow());
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() { ">> " } else { ".. " };
            match self.editor.readline(prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim_start().starts_with(':') {
                        if !self.handle_command(line.trim()) {
                            break;
                        }
                        continue;
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');
                    if input_is_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("{} {}", "error:".bright_red(), err);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns false when the REPL should exit.
    fn handle_command(&mut self, command: &str) -> bool {
        match command {
            ":help" | ":h" => {
                println!("  :help   show this help");
                println!("  :reset  discard all bindings");
                println!("  :clear  clear the screen");
                println!("  :quit   leave the REPL");
                true
            }
            ":quit" | ":q" | ":exit" => false,
            ":clear" | ":c" => {
                print!("\x1B[2J\x1B[1;1H");
                self.show_banner();
                true
            }
            ":reset" | ":r" => {
                self.compiler_state = CompilerState::new();
                self.vm_state = VmState::new();
                self.evaluator = Evaluator::new();
                println!("{}", "environment reset".bright_green());
                true
            }
            other => {
                println!(
                    "{} unknown command {}; try {}",
                    "error:".bright_red(),
                    other.bright_yellow(),
                    ":help".bright_yellow()
                );
                true
            }
        }
    }

    fn eval_input(&mut self, input: &str) {
        let mut parser = Parser::new(input);
        let program = parser.parse_program();
        if !parser.errors.is_empty() {
            for error in &parser.errors {
                eprintln!("{}", AdderError::parse(error.message.clone(), error.pos));
            }
            return;
        }

        match self.engine {
            Engine::Interpreter => {
                let result = self.evaluator.eval_program(&program);
                match result {
                    Value::Error(message) => {
                        eprintln!("{} {}", "runtime error:".bright_red(), message)
                    }
                    Value::Null => {}
                    other => println!("{}", other.inspect()),
                }
            }
            Engine::Vm => {
                // Compile against a copy of the threaded state so a failed
                // line cannot poison later ones.
                let backup = self.compiler_state.clone();
                let state = std::mem::replace(&mut self.compiler_state, CompilerState::new());
                let mut compiler = Compiler::with_state(state);
                if let Err(error) = compiler.compile(&program) {
                    eprintln!("{}", error);
                    self.compiler_state = backup;
                    return;
                }
                let bytecode = compiler.bytecode();
                self.compiler_state = compiler.into_state();

                let vm_state = std::mem::take(&mut self.vm_state);
                let mut vm = VM::with_state(bytecode, vm_state);
                let outcome = vm.run();
                let last = vm.last_popped().clone();
                self.vm_state = vm.into_state();
                match outcome {
                    Err(error) => eprintln!("{}", error),
                    Ok(()) => {
                        if !matches!(last, Value::Null) {
                            println!("{}", last.inspect());
                        }
                    }
                }
            }
        }
    }
}

/// Input is complete once every brace, bracket, and paren outside strings
/// and comments is balanced.
fn input_is_complete(input: &str) -> bool {
    let mut depth: i64 = 0;
    let mut string_delim: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(delim) = string_delim {
            if c == delim {
                string_delim = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => string_delim = Some(c),
            '/' if chars.peek() == Some(&'/') => {
                for comment_char in chars.by_ref() {
                    if comment_char == '\n' {
                        break;
                    }
                }
            }
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_completeness() {
        assert!(input_is_complete("let a = 1;"));
        assert!(!input_is_complete("let f = fn() {"));
        assert!(input_is_complete("let f = fn() { 1 };"));
        // Braces inside strings and comments do not count.
        assert!(input_is_complete("let s = \"{\";"));
        assert!(input_is_complete("1 + 1 // {"));
    }
}
