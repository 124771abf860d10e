// Integration tests for the Adder front end: lexer totality, operator
// precedence, and the parse/render round-trip.

use adder::ast::{Expression, Statement};
use adder::lexer::{Lexer, TokenKind};
use adder::parser;
use pretty_assertions::assert_eq;

fn parse_ok(input: &str) -> adder::ast::Program {
    match parser::parse(input) {
        Ok(program) => program,
        Err(errors) => panic!("parse errors for {:?}: {:?}", input, errors),
    }
}

/// Render the expression of a single expression statement.
fn expr_string(input: &str) -> String {
    let program = parse_ok(input);
    assert_eq!(program.statements.len(), 1, "expected one statement in {:?}", input);
    match &program.statements[0] {
        Statement::Expr { expression } => expression.to_string(),
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_lexer_totality() {
    // Whatever the input, the lexer terminates with EOF and classifies every
    // chunk, falling back to Illegal rather than failing.
    let inputs = [
        "",
        "let a = 1;",
        "@ § ~ ` ??",
        "\"unterminated string",
        "'other quote\" style'",
        "// just a comment",
        "ünïcode_idents åre fine",
        "1234567890 =========",
        "}}}}((((",
    ];
    for input in inputs {
        let tokens = Lexer::new(input).lex();
        assert!(!tokens.is_empty(), "no tokens for {:?}", input);
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof), "input {:?}", input);
        for token in &tokens[..tokens.len() - 1] {
            assert_ne!(token.kind, TokenKind::Eof);
        }
    }
}

#[test]
fn test_lexer_never_skips_content() {
    let tokens = Lexer::new("let x5 = y_z + 12;").lex();
    let literals: Vec<&str> = tokens.iter().map(|t| t.literal.as_str()).collect();
    assert_eq!(literals, vec!["let", "x5", "=", "y_z", "+", "12", ";", ""]);
}

#[test]
fn test_prefix_precedence() {
    assert_eq!(expr_string("-a * b"), "((-a) * b)");
    assert_eq!(expr_string("!-a"), "(!(-a))");
    assert_eq!(expr_string("not a and b"), "((not a) and b)");
}

#[test]
fn test_infix_precedence() {
    assert_eq!(
        expr_string("a + b * c + d / e - f"),
        "(((a + (b * c)) + (d / e)) - f)"
    );
    assert_eq!(expr_string("3 + 4 * 5 == 3 * 1 + 4 * 5"), "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))");
    assert_eq!(expr_string("5 < 4 != 3 > 4"), "((5 < 4) != (3 > 4))");
    // `and` and `or` share one precedence level and associate left.
    assert_eq!(expr_string("a or b and c"), "((a or b) and c)");
    assert_eq!(expr_string("x in xs and y notin ys"), "((x in xs) and (y notin ys))");
}

#[test]
fn test_call_index_get_bind_tightest() {
    assert_eq!(expr_string("-add(a, b)"), "(-add(a, b))");
    assert_eq!(expr_string("a * [1, 2][1]"), "(a * ([1, 2][1]))");
    assert_eq!(expr_string("a + p.n * 2"), "(a + ((p.n) * 2))");
    assert_eq!(expr_string("p.greet(x)[0]"), "((p.greet)(x)[0])");
}

#[test]
fn test_grouping_overrides_precedence() {
    assert_eq!(expr_string("(a + b) * c"), "((a + b) * c)");
    assert_eq!(expr_string("-(a + b)"), "(-(a + b))");
}

#[test]
fn test_round_trip() {
    // repr(parse(x)) re-parses to a structurally equal tree.
    let programs = [
        "let a = 3;",
        "let b = a - 1;",
        "a = a + 1;",
        "a[0] = 2;",
        "p.n = 3;",
        "return;",
        "return 1 + 2;",
        "let arr = [1 + 2, -1, 5 * 6];",
        "let h = {\"one\": 1, \"two\": 2};",
        "let c = if (b < 3) { 3 } else { 0 };",
        "if (a) { 1 } elif (b) { 2 } else { 3 };",
        "while (i < 10) { i = i + 1 }",
        "for (x in [1, 2, 3]) { print(x) }",
        "break;",
        "continue;",
        "let add = fn(a, b) { fn(c) { a + b + c } };",
        "class P { constructor(n) { this.n = n } getN() { return this.n } }",
        "let t = x in xs or y notin ys;",
        "let s = \"mon\" + \"key\";",
        "let n = null;",
        "this.n = n;",
        "let v = p.getN();",
        "not a and !b;",
    ];
    for source in programs {
        let first = parse_ok(source);
        let rendered = first.to_string();
        let second = parse_ok(&rendered);
        assert_eq!(first, second, "round trip changed shape for {:?} (rendered {:?})", source, rendered);
    }
}

#[test]
fn test_if_requires_block() {
    assert!(parser::parse("if (a) 1;").is_err());
}

#[test]
fn test_assignment_targets_are_validated() {
    assert!(parser::parse("a = 1;").is_ok());
    assert!(parser::parse("a[0] = 1;").is_ok());
    assert!(parser::parse("a.b = 1;").is_ok());
    assert!(parser::parse("a + b = 1;").is_err());
    assert!(parser::parse("1 = 2;").is_err());
    assert!(parser::parse("f() = 2;").is_err());
}

#[test]
fn test_multiple_errors_in_one_pass() {
    let mut parser = parser::Parser::new("let 1 = 2; if (a { }; let ok = 3;");
    let program = parser.parse_program();
    assert!(parser.errors.len() >= 2, "errors: {:?}", parser.errors);
    assert!(program
        .statements
        .iter()
        .any(|s| matches!(s, Statement::Let { name, .. } if name == "ok")));
}

#[test]
fn test_named_let_function_round_trips_through_display() {
    let program = parse_ok("let fib = fn(n) { if (n <= 1) { n } else { fib(n - 1) + fib(n - 2) } };");
    match &program.statements[0] {
        Statement::Let { value: Expression::FnLit { name, .. }, .. } => {
            assert_eq!(name.as_deref(), Some("fib"));
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn test_comments_are_dropped_by_the_parser() {
    let program = parse_ok("let a = 1; // trailing comment\n// whole line\nlet b = 2;");
    assert_eq!(program.statements.len(), 2);
}
