// Integration tests for the compiled pipeline: parser -> compiler -> VM.
// Programs run end to end; assertions inspect named globals, the last
// popped value, and the VM's stack/frame discipline afterwards.

use adder::compiler::{Compiler, CompilerState};
use adder::errors::ErrorKind;
use adder::io::{BytecodeReader, BytecodeWriter};
use adder::parser;
use adder::symbol::SymbolScope;
use adder::value::Value;
use adder::vm::{VmState, VM};

struct Run {
    vm: VM,
    state: CompilerState,
}

impl Run {
    fn global(&mut self, name: &str) -> Value {
        let symbol = self
            .state
            .symbol_table
            .resolve(name)
            .unwrap_or_else(|| panic!("global {} is not defined", name));
        assert_eq!(symbol.scope, SymbolScope::Global, "{} is not a global", name);
        self.vm.global(symbol.index).clone()
    }

    fn last(&self) -> String {
        self.vm.last_popped().inspect()
    }
}

fn run(input: &str) -> Run {
    let program = parser::parse(input).unwrap_or_else(|e| panic!("parse errors: {:?}", e));
    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap_or_else(|e| panic!("compile error: {}", e));
    let bytecode = compiler.bytecode();
    let state = compiler.into_state();
    let mut vm = VM::new(bytecode);
    vm.run().unwrap_or_else(|e| panic!("runtime error: {}", e));
    Run { vm, state }
}

fn run_error(input: &str) -> ErrorKind {
    let program = parser::parse(input).unwrap_or_else(|e| panic!("parse errors: {:?}", e));
    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap_or_else(|e| panic!("compile error: {}", e));
    let mut vm = VM::new(compiler.bytecode());
    vm.run().expect_err("program should fail").kind
}

#[test]
fn test_let_and_if_expression_value() {
    let mut run = run("let a = 3; let b = a - 1; let c = if (b < 3) { 3 } else { 0 };");
    assert_eq!(run.global("a").inspect(), "3");
    assert_eq!(run.global("b").inspect(), "2");
    assert_eq!(run.global("c").inspect(), "3");
}

#[test]
fn test_array_literals_and_indexing() {
    let mut sum_form = run("let arr = [1 + 2, -1, 5 * 6]; let m3 = arr[0] + arr[2] * 3 + 7;");
    assert_eq!(sum_form.global("arr").inspect(), "[3, -1, 30]");
    assert_eq!(sum_form.global("m3").inspect(), "100");
    let mut product_form = run("let arr = [1 + 2, -1, 5 * 6]; let m = arr[0] * arr[2] + 7;");
    assert_eq!(product_form.global("m").inspect(), "97");
}

#[test]
fn test_recursive_fibonacci() {
    let mut run = run(
        "let fib = fn(n) { if (n <= 1) { n } else { fib(n - 1) + fib(n - 2) } }; let f = fib(9);",
    );
    assert_eq!(run.global("f").inspect(), "34");
}

#[test]
fn test_for_loop_with_break() {
    // Break fires at the first sum past the threshold: 1+2+3.
    let low = run("let a = 0; for (i in [1, 2, 3, 4, 5]) { a = a + i; if (a > 5) { break } } a");
    assert_eq!(low.last(), "6");
    // A higher threshold lets the sum reach 1+2+3+4.
    let high = run("let a = 0; for (i in [1, 2, 3, 4, 5]) { a = a + i; if (a > 9) { break } } a");
    assert_eq!(high.last(), "10");
}

#[test]
fn test_closure_captures() {
    let mut run = run("let add = fn(a, b) { fn(c) { a + b + c } }; let x = add(1, 2)(8);");
    assert_eq!(run.global("x").inspect(), "11");
}

#[test]
fn test_class_with_constructor_and_method() {
    let mut run = run(
        "class P { constructor(n) { this.n = n } getN() { return this.n } } \
         let p = P(\"J\"); let g = p.getN();",
    );
    assert_eq!(run.global("g").inspect(), "\"J\"");
    assert_eq!(run.global("p").inspect(), "<classInstance of P>");
}

#[test]
fn test_stack_discipline_after_execution() {
    let run = run(
        "let a = 0; while (a < 10) { a = a + 1 } \
         for (x in [1, 2, 3]) { x } \
         if (a == 10) { a } else { 0 };",
    );
    assert_eq!(run.vm.stack_pointer(), 0, "stack pointer must return to 0");
    assert_eq!(run.vm.frame_count(), 1, "only the main frame may remain");
}

#[test]
fn test_let_in_block_introduces_new_binding() {
    let run = run("let a = 1; if (true) { let a = 2 } a");
    assert_eq!(run.last(), "1");
}

#[test]
fn test_assignment_in_block_reaches_outward() {
    let run = run("let a = 1; if (true) { a = 2 } a");
    assert_eq!(run.last(), "2");
}

#[test]
fn test_block_scoping_inside_functions() {
    let mut run = run(
        "let shadow = fn() { let a = 1; if (true) { let a = 2 } a }; \
         let reach = fn() { let a = 1; if (true) { a = 2 } a }; \
         let deep = fn() { let x = 1; if (true) { if (true) { x = x + 41 } } x }; \
         let s = shadow(); let r = reach(); let d = deep();",
    );
    assert_eq!(run.global("s").inspect(), "1");
    assert_eq!(run.global("r").inspect(), "2");
    assert_eq!(run.global("d").inspect(), "42");
}

#[test]
fn test_while_loop_writes_through_block_frames() {
    let mut run = run("let count = fn() { let i = 0; while (i < 3) { i = i + 1 } i }; let r = count();");
    assert_eq!(run.global("r").inspect(), "3");
}

#[test]
fn test_nested_loops_break_innermost() {
    let mut run = run(
        "let total = 0; \
         for (i in [1, 2, 3]) { \
           for (j in [10, 20, 30]) { \
             if (j == 20) { break } \
             total = total + j \
           } \
           total = total + i \
         } \
         let t = total;",
    );
    // Inner loop contributes 10 per outer pass, outer adds 1+2+3.
    assert_eq!(run.global("t").inspect(), "36");
}

#[test]
fn test_continue_skips_iteration() {
    let mut run = run(
        "let evens = []; for (n in [1, 2, 3, 4, 5, 6]) { \
           if (n / 2 * 2 != n) { continue } push(evens, n) } \
         let e = evens;",
    );
    assert_eq!(run.global("e").inspect(), "[2, 4, 6]");
}

#[test]
fn test_free_variables_capture_in_resolution_order() {
    let mut run = run(
        "let f = fn(a, b, c) { fn() { c + a + b } }; \
         let g = f(\"a\", \"b\", \"c\"); let x = g();",
    );
    // Captures load in the order the resolver recorded them; any shuffle
    // would scramble the concatenation.
    assert_eq!(run.global("x").inspect(), "\"cab\"");
}

#[test]
fn test_local_function_recursion_through_blocks() {
    let mut run = run(
        "let wrapper = fn() { \
           let countdown = fn(x) { if (x == 0) { 0 } else { countdown(x - 1) } }; \
           countdown(2) \
         }; \
         let r = wrapper();",
    );
    assert_eq!(run.global("r").inspect(), "0");
}

#[test]
fn test_string_operations() {
    let mut run = run(
        "let monkey = \"mon\" + \"key\"; \
         let up = monkey.toUpper(); \
         let down = \"LOUD\".toLower(); \
         let n = monkey.length; \
         let c = monkey[1]; \
         let last = monkey[-1];",
    );
    assert_eq!(run.global("monkey").inspect(), "\"monkey\"");
    assert_eq!(run.global("up").inspect(), "\"MONKEY\"");
    assert_eq!(run.global("down").inspect(), "\"loud\"");
    assert_eq!(run.global("n").inspect(), "6");
    assert_eq!(run.global("c").inspect(), "\"o\"");
    assert_eq!(run.global("last").inspect(), "\"y\"");
}

#[test]
fn test_hash_literals_are_deterministic() {
    let mut run = run("let h = {\"two\": 2, \"one\": 1}; let v = h[\"two\"]; let n = h.length;");
    // Literal keys are ordered by their rendered form.
    assert_eq!(run.global("h").inspect(), "{\"one\": 1, \"two\": 2}");
    assert_eq!(run.global("v").inspect(), "2");
    assert_eq!(run.global("n").inspect(), "2");
}

#[test]
fn test_missing_hash_key_reads_null() {
    let run = run("let h = {1: \"a\"}; h[2]");
    assert_eq!(run.last(), "null");
}

#[test]
fn test_membership_operators() {
    let mut run = run(
        "let a = 2 in [1, 2, 3]; \
         let b = 4 in [1, 2, 3]; \
         let c = \"on\" in \"monkey\"; \
         let d = \"k\" in {\"k\": 1}; \
         let e = 4 notin [1, 2, 3];",
    );
    assert_eq!(run.global("a").inspect(), "true");
    assert_eq!(run.global("b").inspect(), "false");
    assert_eq!(run.global("c").inspect(), "true");
    assert_eq!(run.global("d").inspect(), "true");
    assert_eq!(run.global("e").inspect(), "true");
}

#[test]
fn test_logical_operators_short_circuit_to_booleans() {
    let mut run = run(
        "let log = []; \
         let effect = fn(v) { push(log, v); true }; \
         let a = true and 1; \
         let b = false and effect(1); \
         let c = null or \"x\"; \
         let d = 1 or effect(2); \
         let n = log.length;",
    );
    assert_eq!(run.global("a").inspect(), "true");
    assert_eq!(run.global("b").inspect(), "false");
    assert_eq!(run.global("c").inspect(), "true");
    assert_eq!(run.global("d").inspect(), "true");
    // Neither effect() call may have run.
    assert_eq!(run.global("n").inspect(), "0");
}

#[test]
fn test_iteration_over_strings_and_hashes() {
    let mut run = run(
        "let s = \"\"; for (c in \"abc\") { s = s + c } \
         let sum = 0; for (v in {\"a\": 1, \"b\": 2}) { sum = sum + v } \
         let joined = s;",
    );
    assert_eq!(run.global("joined").inspect(), "\"abc\"");
    assert_eq!(run.global("sum").inspect(), "3");
}

#[test]
fn test_builtins() {
    let mut run = run(
        "let arr = [1, 2, 3]; \
         let n = len(arr); \
         let f = first(arr); \
         let l = last(arr); \
         let r = rest(arr); \
         push(arr, 4); \
         let p = pop(arr); \
         let s = str(12); \
         let e = first([]);",
    );
    assert_eq!(run.global("n").inspect(), "3");
    assert_eq!(run.global("f").inspect(), "1");
    assert_eq!(run.global("l").inspect(), "3");
    assert_eq!(run.global("r").inspect(), "[2, 3]");
    assert_eq!(run.global("p").inspect(), "4");
    assert_eq!(run.global("arr").inspect(), "[1, 2, 3]");
    assert_eq!(run.global("s").inspect(), "\"12\"");
    // Builtin failures surface as error values on the stack, not aborts.
    assert_eq!(run.global("e").inspect(), "ERROR: Sequence index error");
}

#[test]
fn test_object_bag_binds_assigned_functions() {
    let mut run = run(
        "let o = object(); \
         o.x = 41; \
         o.bump = fn() { this.x = this.x + 1 }; \
         o.bump(); \
         let x = o.x;",
    );
    assert_eq!(run.global("x").inspect(), "42");
}

#[test]
fn test_method_on_instance_uses_bound_this() {
    let mut run = run(
        "class Greeter { \
           constructor(name) { this.name = name } \
           greet(other) { return \"Hi \" + other + \", I am \" + this.name } \
         } \
         let g = Greeter(\"Ann\"); let m = g.greet(\"Bo\");",
    );
    assert_eq!(run.global("m").inspect(), "\"Hi Bo, I am Ann\"");
}

#[test]
fn test_class_redefinition_rebinds() {
    let mut run = run(
        "class A { } \
         class A { one() { return 1 } } \
         let a = A(); let r = a.one();",
    );
    assert_eq!(run.global("r").inspect(), "1");
}

#[test]
fn test_division_truncates() {
    let mut run = run("let a = 7 / 2; let b = -7 / 2; let c = 30 / 5;");
    assert_eq!(run.global("a").inspect(), "3");
    assert_eq!(run.global("b").inspect(), "-3");
    assert_eq!(run.global("c").inspect(), "6");
}

#[test]
fn test_runtime_error_kinds() {
    assert_eq!(run_error("let f = fn(a) { a }; f(1, 2);"), ErrorKind::ArityMismatch);
    assert_eq!(run_error("1 + true;"), ErrorKind::TypeMismatch);
    assert_eq!(run_error("5();"), ErrorKind::NotCallable);
    assert_eq!(run_error("1[0];"), ErrorKind::NotSubscriptable);
    assert_eq!(run_error("for (x in 5) { }"), ErrorKind::NotIterable);
    assert_eq!(run_error("let h = {[1, 2]: 3};"), ErrorKind::UnhashableKey);
    assert_eq!(run_error("1 / 0;"), ErrorKind::DivisionByZero);
    assert_eq!(run_error("this;"), ErrorKind::NoBoundInstance);
    assert_eq!(run_error("[1, 2][5];"), ErrorKind::IndexOutOfRange);
    assert_eq!(run_error("\"s\".missing;"), ErrorKind::UnknownAttribute);
    assert_eq!(run_error("let f = fn() { f() }; f();"), ErrorKind::FrameOverflow);
}

#[test]
fn test_unknown_identifier_is_a_compile_error() {
    let program = parser::parse("ghost;").expect("parses");
    let mut compiler = Compiler::new();
    let error = compiler.compile(&program).expect_err("must fail");
    assert_eq!(error.kind, ErrorKind::UnknownIdentifier);
}

#[test]
fn test_bytecode_image_round_trip_executes() {
    let program = parser::parse(
        "let fib = fn(n) { if (n <= 1) { n } else { fib(n - 1) + fib(n - 2) } }; let f = fib(10);",
    )
    .expect("parses");
    let mut compiler = Compiler::new();
    compiler.compile(&program).expect("compiles");
    let bytecode = compiler.bytecode();
    let mut state = compiler.into_state();

    let image = BytecodeWriter::new(&bytecode).write().expect("serializes");
    let restored = BytecodeReader::new(image).read().expect("deserializes");

    let mut vm = VM::new(restored);
    vm.run().expect("runs from image");
    let symbol = state.symbol_table.resolve("f").expect("f defined");
    assert_eq!(vm.global(symbol.index).inspect(), "55");
}

#[test]
fn test_state_threads_across_compilations() {
    // The REPL pattern: one symbol table, constant pool, and globals store
    // threaded across separate inputs.
    let mut state = CompilerState::new();
    let mut vm_state = VmState::new();

    for (source, expect_last) in [
        ("let a = 1;", None),
        ("let b = a + 1;", None),
        ("a + b", Some("3")),
        ("class C { val() { return a * 10 } }", None),
        ("C().val()", Some("10")),
    ] {
        let program = parser::parse(source).expect("parses");
        let mut compiler = Compiler::with_state(state);
        compiler.compile(&program).expect("compiles");
        let bytecode = compiler.bytecode();
        state = compiler.into_state();

        let mut vm = VM::with_state(bytecode, vm_state);
        vm.run().expect("runs");
        if let Some(expected) = expect_last {
            assert_eq!(vm.last_popped().inspect(), expected, "source {:?}", source);
        }
        vm_state = vm.into_state();
    }
}

#[test]
fn test_top_level_return_halts() {
    // The statement after `return` would fail at runtime; it must never run.
    let run = run("let a = 1; return 42; let b = 1 + true;");
    assert_eq!(run.last(), "42");
}
