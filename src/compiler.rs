// File: src/compiler.rs
//
// Bytecode compiler for the Adder programming language.
// Single pass over the AST emitting into a stack of compilation scopes. A
// new scope is entered for every function literal, `if` branch, `else`
// block, and loop body; leaving a scope yields a compiled function constant
// that gets wrapped by `Closure` at the call site together with whatever
// free variables the resolver recorded.

use crate::ast::{Expression, Program, Statement};
use crate::builtins::BUILTINS;
use crate::bytecode::{make, Bytecode, Op};
use crate::errors::{find_closest_match, AdderError, ErrorKind};
use crate::symbol::{Symbol, SymbolScope, SymbolTable};
use crate::value::{CompiledFunction, Value};
use crate::vm::MAX_CLASS_DEFS;
use colored::Colorize;
use std::rc::Rc;

/// Placeholder jump target, patched once the real target is known.
const PLACEHOLDER: usize = 9999;

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// One function-sized unit of emission: its instruction buffer plus the
/// metadata needed for the tail-rewrite peepholes.
#[derive(Default)]
struct CompilationScope {
    instructions: Vec<u8>,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The piece of compiler state that outlives a single compilation, so a REPL
/// can thread definitions and constants across inputs.
#[derive(Clone)]
pub struct CompilerState {
    pub symbol_table: SymbolTable,
    pub constants: Vec<Value>,
    pub class_slots: usize,
}

impl CompilerState {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        CompilerState { symbol_table, constants: Vec::new(), class_slots: 0 }
    }
}

impl Default for CompilerState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
    class_slots: usize,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_state(CompilerState::new())
    }

    /// Resume compilation with an existing symbol table and constant pool.
    pub fn with_state(state: CompilerState) -> Self {
        Compiler {
            constants: state.constants,
            symbol_table: state.symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
            class_slots: state.class_slots,
        }
    }

    /// Hand the threaded state back, for the next `with_state`.
    pub fn into_state(self) -> CompilerState {
        CompilerState {
            symbol_table: self.symbol_table,
            constants: self.constants,
            class_slots: self.class_slots,
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), AdderError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// The finished main-scope bytecode.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scope_index].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), AdderError> {
        match statement {
            Statement::Expr { expression } => {
                self.compile_expression(expression)?;
                self.emit(Op::Pop, &[]);
            }
            Statement::Block { statements } => {
                for statement in statements {
                    self.compile_statement(statement)?;
                }
            }
            Statement::Let { name, value } => {
                // Defined before the value compiles so `let f = fn() { f() }`
                // resolves.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                self.assign_symbol(&symbol)?;
            }
            Statement::Assign { target, value } => self.compile_assignment(target, value)?,
            Statement::Return { value } => {
                match value {
                    Some(expression) => self.compile_expression(expression)?,
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                }
                self.emit(Op::ReturnValue, &[]);
            }
            Statement::While { condition, body } => self.compile_while(condition, body)?,
            Statement::For { var, iterable, body } => self.compile_for(var, iterable, body)?,
            Statement::Continue => {
                self.emit(Op::Continue, &[]);
            }
            Statement::Break => {
                self.emit(Op::Break, &[]);
            }
            Statement::Class { name, constructor, methods } => {
                self.compile_class(name, constructor.as_ref(), methods)?;
            }
        }
        Ok(())
    }

    fn compile_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
    ) -> Result<(), AdderError> {
        match target {
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.compile_expression(value)?;
                self.emit(Op::SetIndex, &[]);
                Ok(())
            }
            Expression::Get { object, property } => {
                self.compile_expression(object)?;
                let name_index = self.add_constant(Value::str(property));
                self.emit(Op::Constant, &[name_index]);
                self.compile_expression(value)?;
                self.emit(Op::SetAttr, &[]);
                Ok(())
            }
            Expression::Ident(name) => {
                self.compile_expression(value)?;
                let symbol = self.resolve(name)?;
                self.assign_symbol(&symbol)
            }
            other => Err(AdderError::compile(format!("cannot assign to {}", other))),
        }
    }

    fn compile_while(
        &mut self,
        condition: &Expression,
        body: &Statement,
    ) -> Result<(), AdderError> {
        let loop_start = self.current_position();
        self.compile_expression(condition)?;
        let exit_jump = self.emit(Op::JumpNotTrue, &[PLACEHOLDER]);

        self.enter_scope(false);
        self.compile_statement(body)?;
        self.emit(Op::Continue, &[]);
        self.emit_scope_as_closure(0)?;

        self.emit(Op::LoopCall, &[0]);
        self.emit(Op::Jump, &[loop_start]);

        let after_loop = self.current_position();
        self.change_operand(exit_jump, after_loop);
        Ok(())
    }

    fn compile_for(
        &mut self,
        var: &str,
        iterable: &Expression,
        body: &Statement,
    ) -> Result<(), AdderError> {
        self.compile_expression(iterable)?;
        self.emit(Op::Iter, &[]);

        // The iterator lives in a synthetic slot of the enclosing scope.
        let tmp_name = format!("__iter_{:02}", self.symbol_table.num_definitions);
        let iterator_symbol = self.symbol_table.define(&tmp_name);
        self.assign_symbol(&iterator_symbol)?;

        let loop_start = self.current_position();
        self.load_symbol(&iterator_symbol);
        self.emit(Op::IterHasNext, &[]);
        let exit_jump = self.emit(Op::JumpNotTrue, &[PLACEHOLDER]);

        self.enter_scope(false);
        // The iteration variable is the loop frame's first local, filled by
        // the LoopCall argument.
        self.symbol_table.define(var);
        self.compile_statement(body)?;
        self.emit(Op::Continue, &[]);
        self.emit_scope_as_closure(1)?;

        self.load_symbol(&iterator_symbol);
        self.emit(Op::IterNext, &[]);
        self.emit(Op::LoopCall, &[1]);
        self.emit(Op::Jump, &[loop_start]);

        let after_loop = self.current_position();
        self.change_operand(exit_jump, after_loop);
        Ok(())
    }

    fn compile_class(
        &mut self,
        name: &str,
        constructor: Option<&Expression>,
        methods: &[(String, Expression)],
    ) -> Result<(), AdderError> {
        if self.class_slots >= MAX_CLASS_DEFS {
            return Err(AdderError::compile(format!(
                "too many class definitions (limit {})",
                MAX_CLASS_DEFS
            )));
        }
        // Redefinition is allowed but worth a warning; the name simply
        // rebinds to the new slot.
        if let Some(existing) = self.symbol_table.resolve(name) {
            if existing.scope == SymbolScope::Class {
                eprintln!(
                    "{} class {} is already defined; redefining",
                    "warning:".yellow().bold(),
                    name
                );
            }
        }
        // Bound before the bodies compile so methods can name their own
        // class.
        let class_index = self.class_slots;
        self.class_slots += 1;
        self.symbol_table.define_class(name, class_index);

        for (method_name, function) in methods {
            let name_index = self.add_constant(Value::str(method_name));
            self.emit(Op::Constant, &[name_index]);
            self.compile_expression(function)?;
        }
        if let Some(function) = constructor {
            self.compile_expression(function)?;
        }
        let name_index = self.add_constant(Value::str(name));
        self.emit(Op::Constant, &[name_index]);

        let nctor = usize::from(constructor.is_some());
        self.emit(Op::DefClass, &[class_index, nctor, methods.len()]);
        Ok(())
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), AdderError> {
        match expression {
            Expression::IntLit(value) => {
                let index = self.add_constant(Value::Int(*value));
                self.emit(Op::Constant, &[index]);
            }
            Expression::StrLit(value) => {
                let index = self.add_constant(Value::str(value));
                self.emit(Op::Constant, &[index]);
            }
            Expression::BoolLit(true) => {
                self.emit(Op::True, &[]);
            }
            Expression::BoolLit(false) => {
                self.emit(Op::False, &[]);
            }
            Expression::NullLit => {
                self.emit(Op::Null, &[]);
            }
            Expression::Ident(name) => {
                let symbol = self.resolve(name)?;
                self.load_symbol(&symbol);
            }
            Expression::This => {
                self.emit(Op::GetInstance, &[]);
            }
            Expression::ArrayLit(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Op::Array, &[elements.len()]);
            }
            Expression::HashLit(pairs) => {
                // Keys are emitted in render order so constant pools are
                // deterministic regardless of source order.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Op::Hash, &[pairs.len() * 2]);
            }
            Expression::Prefix { op, right } => {
                self.compile_expression(right)?;
                match op.as_str() {
                    "-" => self.emit(Op::Minus, &[]),
                    "!" | "not" => self.emit(Op::Not, &[]),
                    other => {
                        return Err(AdderError::compile(format!(
                            "unknown prefix operator: {}",
                            other
                        )))
                    }
                };
            }
            Expression::Infix { op, left, right } => {
                self.compile_infix(op, left, right)?;
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
            }
            Expression::Get { object, property } => {
                self.compile_expression(object)?;
                let name_index = self.add_constant(Value::str(property));
                self.emit(Op::Constant, &[name_index]);
                self.emit(Op::GetAttr, &[]);
            }
            Expression::If { branches, alternative } => {
                self.compile_if(branches, alternative.as_deref())?;
            }
            Expression::FnLit { name, params, body } => {
                self.compile_function_literal(name.as_deref(), params, body)?;
            }
            Expression::Call { function, arguments } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Op::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        op: &str,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), AdderError> {
        // `<` and `<=` compile right-then-left against Gt/GtEq; there are no
        // dedicated less-than opcodes.
        match op {
            "<" => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(Op::Gt, &[]);
                return Ok(());
            }
            "<=" => {
                self.compile_expression(right)?;
                self.compile_expression(left)?;
                self.emit(Op::GtEq, &[]);
                return Ok(());
            }
            "and" => return self.compile_and(left, right),
            "or" => return self.compile_or(left, right),
            _ => {}
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        match op {
            "+" => self.emit(Op::Add, &[]),
            "-" => self.emit(Op::Sub, &[]),
            "*" => self.emit(Op::Mul, &[]),
            "/" => self.emit(Op::Div, &[]),
            "==" => self.emit(Op::Eq, &[]),
            "!=" => self.emit(Op::NotEq, &[]),
            ">" => self.emit(Op::Gt, &[]),
            ">=" => self.emit(Op::GtEq, &[]),
            "in" => self.emit(Op::Contains, &[]),
            "notin" => {
                self.emit(Op::Contains, &[]);
                self.emit(Op::Not, &[])
            }
            other => {
                return Err(AdderError::compile(format!("unknown infix operator: {}", other)))
            }
        };
        Ok(())
    }

    /// Short-circuit `and`: either operand being falsey jumps straight to the
    /// false arm; the result is always a boolean.
    fn compile_and(&mut self, left: &Expression, right: &Expression) -> Result<(), AdderError> {
        self.compile_expression(left)?;
        let left_false = self.emit(Op::JumpNotTrue, &[PLACEHOLDER]);
        self.compile_expression(right)?;
        let right_false = self.emit(Op::JumpNotTrue, &[PLACEHOLDER]);
        self.emit(Op::True, &[]);
        let end = self.emit(Op::Jump, &[PLACEHOLDER]);
        let false_arm = self.current_position();
        self.change_operand(left_false, false_arm);
        self.change_operand(right_false, false_arm);
        self.emit(Op::False, &[]);
        let after = self.current_position();
        self.change_operand(end, after);
        Ok(())
    }

    /// Short-circuit `or`: a truthy left operand skips the right entirely.
    fn compile_or(&mut self, left: &Expression, right: &Expression) -> Result<(), AdderError> {
        self.compile_expression(left)?;
        let try_right = self.emit(Op::JumpNotTrue, &[PLACEHOLDER]);
        self.emit(Op::True, &[]);
        let end_after_left = self.emit(Op::Jump, &[PLACEHOLDER]);
        let right_arm = self.current_position();
        self.change_operand(try_right, right_arm);
        self.compile_expression(right)?;
        let right_false = self.emit(Op::JumpNotTrue, &[PLACEHOLDER]);
        self.emit(Op::True, &[]);
        let end_after_right = self.emit(Op::Jump, &[PLACEHOLDER]);
        let false_arm = self.current_position();
        self.change_operand(right_false, false_arm);
        self.emit(Op::False, &[]);
        let after = self.current_position();
        self.change_operand(end_after_left, after);
        self.change_operand(end_after_right, after);
        Ok(())
    }

    fn compile_if(
        &mut self,
        branches: &[(Expression, Statement)],
        alternative: Option<&Statement>,
    ) -> Result<(), AdderError> {
        let mut end_jumps = Vec::new();
        for (condition, consequence) in branches {
            self.compile_expression(condition)?;
            let skip_branch = self.emit(Op::JumpNotTrue, &[PLACEHOLDER]);

            self.compile_block_closure(consequence)?;
            self.emit(Op::BlockCall, &[]);

            end_jumps.push(self.emit(Op::Jump, &[PLACEHOLDER]));
            let after_branch = self.current_position();
            self.change_operand(skip_branch, after_branch);
        }

        match alternative {
            Some(block) => {
                self.compile_block_closure(block)?;
                self.emit(Op::BlockCall, &[]);
            }
            None => {
                // The if-chain is an expression; a missing else contributes
                // null.
                self.emit(Op::Null, &[]);
            }
        }

        let end = self.current_position();
        for jump in end_jumps {
            self.change_operand(jump, end);
        }
        Ok(())
    }

    /// Compile a block body in its own scope, ensure it ends by returning a
    /// value to the enclosing frame, and emit the resulting closure.
    fn compile_block_closure(&mut self, block: &Statement) -> Result<(), AdderError> {
        self.enter_scope(false);
        self.compile_statement(block)?;
        if self.last_instruction_is(Op::Pop) {
            self.replace_last_with(Op::BlockReturn);
        }
        if !self.last_instruction_is(Op::BlockReturn) {
            self.emit(Op::Null, &[]);
            self.emit(Op::BlockReturn, &[]);
        }
        self.emit_scope_as_closure(0)
    }

    fn compile_function_literal(
        &mut self,
        name: Option<&str>,
        params: &[String],
        body: &Statement,
    ) -> Result<(), AdderError> {
        self.enter_scope(true);
        if let Some(name) = name {
            self.symbol_table.define_function_name(name);
        }
        for param in params {
            self.symbol_table.define(param);
        }

        self.compile_statement(body)?;

        // An expression tail becomes the return value; otherwise fall back
        // to returning null.
        if self.last_instruction_is(Op::Pop) {
            self.replace_last_with(Op::ReturnValue);
        }
        if !self.last_instruction_is(Op::ReturnValue) {
            self.emit(Op::Null, &[]);
            self.emit(Op::ReturnValue, &[]);
        }

        self.emit_scope_as_closure(params.len())
    }

    /// Close the current scope and emit `Closure` for it, loading any free
    /// variables first in exactly the order the resolver recorded them.
    fn emit_scope_as_closure(&mut self, num_parameters: usize) -> Result<(), AdderError> {
        let free_symbols = self.symbol_table.free_symbols.clone();
        let num_locals = self.symbol_table.num_definitions;
        let instructions = self.leave_scope();
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }
        let function = Value::CompiledFunction(Rc::new(CompiledFunction {
            instructions,
            num_locals,
            num_parameters,
        }));
        let index = self.add_constant(function);
        self.emit(Op::Closure, &[index, free_symbols.len()]);
        Ok(())
    }

    fn resolve(&mut self, name: &str) -> Result<Symbol, AdderError> {
        match self.symbol_table.resolve(name) {
            Some(symbol) => Ok(symbol),
            None => {
                let visible = self.symbol_table.visible_names();
                let mut error = AdderError::new(
                    ErrorKind::UnknownIdentifier,
                    format!("identifier not defined: {}", name),
                );
                if let Some(suggestion) = find_closest_match(name, &visible) {
                    error = error.with_suggestion(suggestion.to_string());
                }
                Err(error)
            }
        }
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::GetFree, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            SymbolScope::Function => self.emit(Op::CurrentClosure, &[]),
            SymbolScope::Block => self.emit(Op::GetBlock, &[symbol.depth, symbol.index]),
            SymbolScope::Class => self.emit(Op::GetClass, &[symbol.index]),
        };
    }

    fn assign_symbol(&mut self, symbol: &Symbol) -> Result<(), AdderError> {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::SetLocal, &[symbol.index]),
            SymbolScope::Block => self.emit(Op::SetBlock, &[symbol.depth, symbol.index]),
            _ => {
                return Err(AdderError::compile(format!(
                    "cannot assign to {} in this scope",
                    symbol.name
                )))
            }
        };
        Ok(())
    }

    // --- emission machinery ---

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.current_position();
        self.scopes[self.scope_index].instructions.extend(instruction);
        let scope = &mut self.scopes[self.scope_index];
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode: op, position });
        position
    }

    fn current_position(&self) -> usize {
        self.scopes[self.scope_index].instructions.len()
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        matches!(
            self.scopes[self.scope_index].last_instruction,
            Some(EmittedInstruction { opcode, .. }) if opcode == op
        )
    }

    /// Rewrite the opcode byte of the last instruction in place. Only valid
    /// between operand-less instructions of the same width.
    fn replace_last_with(&mut self, op: Op) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = scope.last_instruction.as_mut() {
            scope.instructions[last.position] = op as u8;
            last.opcode = op;
        }
    }

    /// Re-encode the operand of the (jump) instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let scope = &mut self.scopes[self.scope_index];
        let op = Op::from_byte(scope.instructions[position])
            .expect("patch target is a valid instruction");
        let instruction = make(op, &[operand]);
        scope.instructions[position..position + instruction.len()]
            .copy_from_slice(&instruction);
    }

    fn enter_scope(&mut self, is_function_boundary: bool) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(Box::new(outer), is_function_boundary);
    }

    fn leave_scope(&mut self) -> Vec<u8> {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        self.scope_index -= 1;
        let outer = self.symbol_table.take_outer().expect("left the global scope");
        self.symbol_table = *outer;
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disassemble;
    use crate::parser;

    fn compile_source(input: &str) -> Bytecode {
        let program = parser::parse(input).expect("parses");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compiles");
        compiler.bytecode()
    }

    #[test]
    fn test_integer_arithmetic() {
        let bytecode = compile_source("1 + 2;");
        assert_eq!(
            disassemble(&bytecode.instructions),
            "0000 OpConstant 0\n0003 OpConstant 1\n0006 OpAdd\n0007 OpPop\n"
        );
    }

    #[test]
    fn test_less_than_swaps_operands() {
        let bytecode = compile_source("1 < 2;");
        // The 2 is compiled first: constants[0] == 2.
        assert_eq!(bytecode.constants[0], Value::Int(2));
        assert_eq!(
            disassemble(&bytecode.instructions),
            "0000 OpConstant 0\n0003 OpConstant 1\n0006 OpGt\n0007 OpPop\n"
        );
    }

    #[test]
    fn test_global_let() {
        let bytecode = compile_source("let one = 1; let two = one;");
        assert_eq!(
            disassemble(&bytecode.instructions),
            "0000 OpConstant 0\n0003 OpSetGlobal 0\n0006 OpGetGlobal 0\n0009 OpSetGlobal 1\n"
        );
    }

    #[test]
    fn test_function_tail_pop_becomes_return() {
        let bytecode = compile_source("fn() { 5 + 10 };");
        let function = match &bytecode.constants[2] {
            Value::CompiledFunction(f) => f,
            other => panic!("expected compiled function, got {:?}", other),
        };
        assert_eq!(
            disassemble(&function.instructions),
            "0000 OpConstant 0\n0003 OpConstant 1\n0006 OpAdd\n0007 OpReturnValue\n"
        );
    }

    #[test]
    fn test_empty_function_returns_null() {
        let bytecode = compile_source("fn() { };");
        let function = match &bytecode.constants[0] {
            Value::CompiledFunction(f) => f,
            other => panic!("expected compiled function, got {:?}", other),
        };
        assert_eq!(
            disassemble(&function.instructions),
            "0000 OpNull\n0001 OpReturnValue\n"
        );
    }

    #[test]
    fn test_if_emits_block_call() {
        let bytecode = compile_source("if (true) { 10 };");
        let listing = disassemble(&bytecode.instructions);
        assert!(listing.contains("OpJumpNotTrue"), "listing:\n{}", listing);
        assert!(listing.contains("OpBlockCall"), "listing:\n{}", listing);
        // Missing else contributes a null.
        assert!(listing.contains("OpNull"), "listing:\n{}", listing);
    }

    #[test]
    fn test_while_scaffolding() {
        let bytecode = compile_source("let i = 0; while (i < 3) { i = i + 1 }");
        let listing = disassemble(&bytecode.instructions);
        assert!(listing.contains("OpLoopCall 0"), "listing:\n{}", listing);
        assert!(listing.contains("OpJump"), "listing:\n{}", listing);
        // The body writes through to the enclosing scope's binding.
        let body = match bytecode
            .constants
            .iter()
            .find_map(|c| match c {
                Value::CompiledFunction(f) => Some(f),
                _ => None,
            }) {
            Some(f) => f,
            None => panic!("loop body should be a compiled function constant"),
        };
        assert!(
            disassemble(&body.instructions).contains("OpSetGlobal 0"),
            "body:\n{}",
            disassemble(&body.instructions)
        );
    }

    #[test]
    fn test_for_uses_synthetic_iterator_slot() {
        let bytecode = compile_source("for (x in [1, 2]) { x }");
        let listing = disassemble(&bytecode.instructions);
        assert!(listing.contains("OpIter"), "listing:\n{}", listing);
        assert!(listing.contains("OpIterHasNext"), "listing:\n{}", listing);
        assert!(listing.contains("OpIterNext"), "listing:\n{}", listing);
        assert!(listing.contains("OpLoopCall 1"), "listing:\n{}", listing);
    }

    #[test]
    fn test_free_variables_load_before_closure() {
        let bytecode = compile_source("fn(a) { fn(b) { a + b } };");
        let outer = match &bytecode.constants[1] {
            Value::CompiledFunction(f) => f,
            other => panic!("expected compiled function, got {:?}", other),
        };
        assert_eq!(
            disassemble(&outer.instructions),
            "0000 OpGetLocal 0\n0002 OpClosure 0 1\n0006 OpReturnValue\n"
        );
    }

    #[test]
    fn test_unknown_identifier_suggests() {
        let program = parser::parse("let length = 1; lenght;").expect("parses");
        let mut compiler = Compiler::new();
        let error = compiler.compile(&program).expect_err("must fail");
        assert_eq!(error.kind, ErrorKind::UnknownIdentifier);
        assert_eq!(error.suggestion.as_deref(), Some("length"));
    }

    #[test]
    fn test_class_lowering() {
        let bytecode =
            compile_source("class P { constructor(n) { this.n = n } getN() { return this.n } }");
        let listing = disassemble(&bytecode.instructions);
        assert!(listing.contains("OpDefClass 0 1 1"), "listing:\n{}", listing);
    }
}
