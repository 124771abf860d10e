// Engine equivalence: for a corpus of programs, the tree-walking evaluator
// and the compiled VM must agree on the value of every named global (and on
// the program's final result).
//
// The corpus avoids the one documented divergence between the engines:
// VM closures capture free variables by value at creation time, while the
// evaluator's closures read their defining environment live.

use adder::compiler::Compiler;
use adder::evaluator::Evaluator;
use adder::parser;
use adder::symbol::SymbolScope;
use adder::vm::VM;
use pretty_assertions::assert_eq;

struct Case {
    source: &'static str,
    globals: &'static [&'static str],
}

fn check(case: &Case) {
    let program = parser::parse(case.source)
        .unwrap_or_else(|e| panic!("parse errors for {:?}: {:?}", case.source, e));

    // Tree-walking run.
    let mut evaluator = Evaluator::new();
    let eval_result = evaluator.eval_program(&program);
    assert!(
        !eval_result.is_error(),
        "evaluator failed on {:?}: {}",
        case.source,
        eval_result.inspect()
    );

    // Compiled run.
    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap_or_else(|e| panic!("compile error: {}", e));
    let bytecode = compiler.bytecode();
    let mut state = compiler.into_state();
    let mut vm = VM::new(bytecode);
    vm.run().unwrap_or_else(|e| panic!("runtime error for {:?}: {}", case.source, e));

    for name in case.globals {
        let from_eval = evaluator
            .envs
            .get(evaluator.envs.root(), name)
            .unwrap_or_else(|| panic!("evaluator did not bind {}", name));
        let symbol = state
            .symbol_table
            .resolve(name)
            .unwrap_or_else(|| panic!("compiler did not define {}", name));
        assert_eq!(symbol.scope, SymbolScope::Global);
        let from_vm = vm.global(symbol.index).clone();
        assert_eq!(
            from_eval.inspect(),
            from_vm.inspect(),
            "engines disagree on {} for {:?}",
            name,
            case.source
        );
    }
}

#[test]
fn test_engines_agree_on_the_corpus() {
    let corpus = [
        Case {
            source: "let a = 3; let b = a - 1; let c = if (b < 3) { 3 } else { 0 };",
            globals: &["a", "b", "c"],
        },
        Case {
            source: "let arr = [1 + 2, -1, 5 * 6]; let m3 = arr[0] + arr[2] * 3 + 7;",
            globals: &["arr", "m3"],
        },
        Case {
            source: "let fib = fn(n) { if (n <= 1) { n } else { fib(n - 1) + fib(n - 2) } }; \
                     let f = fib(9);",
            globals: &["f"],
        },
        Case {
            source: "let add = fn(a, b) { fn(c) { a + b + c } }; let x = add(1, 2)(8);",
            globals: &["x"],
        },
        Case {
            source: "class P { constructor(n) { this.n = n } getN() { return this.n } } \
                     let p = P(\"J\"); let g = p.getN();",
            globals: &["g"],
        },
        Case {
            source: "let a = 0; for (i in [1, 2, 3, 4, 5]) { a = a + i; if (a > 5) { break } }",
            globals: &["a"],
        },
        Case {
            source: "let i = 0; let total = 0; \
                     while (i < 10) { i = i + 1; if (i == 3) { continue } total = total + i }",
            globals: &["i", "total"],
        },
        Case {
            source: "let a = 1; if (true) { let a = 2 } let shadowed = a; \
                     let b = 1; if (true) { b = 2 } let reached = b;",
            globals: &["shadowed", "reached"],
        },
        Case {
            source: "let monkey = \"mon\" + \"key\"; let up = monkey.toUpper(); \
                     let n = monkey.length; let ch = monkey[2]; let tail = monkey[-1];",
            globals: &["monkey", "up", "n", "ch", "tail"],
        },
        Case {
            source: "let h = {\"two\": 2, \"one\": 1}; let v = h[\"one\"]; \
                     let missing = h[\"zero\"]; let size = h.length;",
            globals: &["h", "v", "missing", "size"],
        },
        Case {
            source: "let s = \"\"; for (c in \"abc\") { s = s + c } \
                     let sum = 0; for (v in {\"a\": 1, \"b\": 2, \"c\": 4}) { sum = sum + v }",
            globals: &["s", "sum"],
        },
        Case {
            source: "let hit = 2 in [1, 2, 3]; let miss = 9 in [1, 2, 3]; \
                     let sub = \"on\" in \"monkey\"; let key = \"k\" notin {\"k\": 1}; \
                     let both = hit and not miss or false;",
            globals: &["hit", "miss", "sub", "key", "both"],
        },
        Case {
            source: "let arr = [1, 2]; push(arr, 3); let l = last(arr); let r = rest(arr); \
                     let f = first(arr); let n = len(arr); let p = pop(arr);",
            globals: &["arr", "l", "r", "f", "n", "p"],
        },
        Case {
            source: "let o = object(); o.x = 41; o.bump = fn() { this.x = this.x + 1 }; \
                     o.bump(); let bumped = o.x;",
            globals: &["bumped"],
        },
        Case {
            source: "let quot = 7 / 2; let neg = -7 / 2; let exact = 30 / 5;",
            globals: &["quot", "neg", "exact"],
        },
        Case {
            source: "let gen = fn(k) { fn(x) { x * k } }; let double = gen(2); let triple = gen(3); \
                     let d = double(21); let t = triple(7);",
            globals: &["d", "t"],
        },
        Case {
            source: "class Counter { constructor() { this.n = 0 } \
                     bump(by) { this.n = this.n + by return this.n } } \
                     let c = Counter(); c.bump(2); c.bump(3); let total = c.n;",
            globals: &["total"],
        },
        Case {
            source: "let grid = [[1, 2], [3, 4]]; grid[1][0] = 30; \
                     let cell = grid[1][0]; let row = grid[0];",
            globals: &["cell", "row"],
        },
    ];

    for case in &corpus {
        check(case);
    }
}

#[test]
fn test_engines_agree_on_final_result() {
    let sources = [
        "1 + 2 * 3",
        "not (1 > 2) and true",
        "if (false) { 1 } elif (false) { 2 } else { 3 }",
        "if (false) { 1 }",
        "let a = 0; for (i in [1, 2, 3]) { a = a + i } a",
        "\"abc\"[1]",
        "[1, 2, 3][-2]",
        "len(\"four\")",
        "str(42)",
    ];
    for source in sources {
        let program = parser::parse(source).expect("parses");

        let mut evaluator = Evaluator::new();
        let eval_result = evaluator.eval_program(&program);

        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compiles");
        let mut vm = VM::new(compiler.bytecode());
        vm.run().expect("runs");

        assert_eq!(
            eval_result.inspect(),
            vm.last_popped().inspect(),
            "engines disagree on {:?}",
            source
        );
    }
}
