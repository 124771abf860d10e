// File: src/ast.rs
//
// Abstract syntax tree for the Adder programming language.
// Statements and expressions are native sum types with per-variant payloads.
// The Display implementations render source that re-parses to a structurally
// equal tree, which the parser round-trip tests rely on.

use std::fmt;

/// A parsed program: the top-level statement list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new() -> Self {
        Program { statements: Vec::new() }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{}", statement)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value;` introduces a new binding in the current scope.
    Let { name: String, value: Expression },
    /// `target = value;` where the target is restricted to identifier,
    /// index, or attribute access; the parser validates this.
    Assign { target: Expression, value: Expression },
    /// `return;` or `return value;`
    Return { value: Option<Expression> },
    /// A bare expression evaluated for its value.
    Expr { expression: Expression },
    /// `{ ... }`, the body form of functions, branches, and loops.
    Block { statements: Vec<Statement> },
    /// `while (condition) { ... }`
    While { condition: Expression, body: Box<Statement> },
    /// `for (var in iterable) { ... }`
    For { var: String, iterable: Expression, body: Box<Statement> },
    Break,
    Continue,
    /// `class Name { constructor(..) {..} method(..) {..} }`
    Class {
        name: String,
        constructor: Option<Expression>,
        methods: Vec<(String, Expression)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Ident(String),
    This,
    IntLit(i64),
    StrLit(String),
    BoolLit(bool),
    NullLit,
    ArrayLit(Vec<Expression>),
    HashLit(Vec<(Expression, Expression)>),
    /// `fn(params) { body }`; `name` is filled in when the literal is the
    /// right-hand side of a `let` or a class method, enabling recursion.
    FnLit {
        name: Option<String>,
        params: Vec<String>,
        body: Box<Statement>,
    },
    Prefix {
        op: String,
        right: Box<Expression>,
    },
    Infix {
        op: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
    Get {
        object: Box<Expression>,
        property: String,
    },
    /// An `if`/`elif` chain: one (condition, block) pair per branch, plus an
    /// optional `else` block.
    If {
        branches: Vec<(Expression, Statement)>,
        alternative: Option<Box<Statement>>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    /// Whether this expression is a legal assignment target.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expression::Ident(_) | Expression::Index { .. } | Expression::Get { .. }
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {} = {};", name, value),
            Statement::Assign { target, value } => write!(f, "{} = {};", target, value),
            Statement::Return { value: Some(v) } => write!(f, "return {};", v),
            Statement::Return { value: None } => write!(f, "return;"),
            Statement::Expr { expression } => write!(f, "{};", expression),
            Statement::Block { statements } => {
                write!(f, "{{ ")?;
                for statement in statements {
                    write!(f, "{} ", statement)?;
                }
                write!(f, "}}")
            }
            Statement::While { condition, body } => {
                write!(f, "while ({}) {}", condition, body)
            }
            Statement::For { var, iterable, body } => {
                write!(f, "for ({} in {}) {}", var, iterable, body)
            }
            Statement::Break => write!(f, "break;"),
            Statement::Continue => write!(f, "continue;"),
            Statement::Class { name, constructor, methods } => {
                write!(f, "class {} {{ ", name)?;
                if let Some(Expression::FnLit { params, body, .. }) = constructor {
                    write!(f, "constructor({}) {} ", params.join(", "), body)?;
                }
                for (method_name, method) in methods {
                    if let Expression::FnLit { params, body, .. } = method {
                        write!(f, "{}({}) {} ", method_name, params.join(", "), body)?;
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Ident(name) => write!(f, "{}", name),
            Expression::This => write!(f, "this"),
            Expression::IntLit(value) => write!(f, "{}", value),
            Expression::StrLit(value) => write!(f, "\"{}\"", value),
            Expression::BoolLit(value) => write!(f, "{}", value),
            Expression::NullLit => write!(f, "null"),
            Expression::ArrayLit(elements) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Expression::HashLit(pairs) => {
                let rendered: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Expression::FnLit { params, body, .. } => {
                write!(f, "fn({}) {}", params.join(", "), body)
            }
            Expression::Prefix { op, right } => {
                if op.chars().all(|c| c.is_alphabetic()) {
                    write!(f, "({} {})", op, right)
                } else {
                    write!(f, "({}{})", op, right)
                }
            }
            Expression::Infix { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expression::Index { left, index } => write!(f, "({}[{}])", left, index),
            Expression::Get { object, property } => write!(f, "({}.{})", object, property),
            Expression::If { branches, alternative } => {
                for (i, (condition, block)) in branches.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "elif" };
                    write!(f, "{} ({}) {}", keyword, condition, block)?;
                    if i + 1 < branches.len() || alternative.is_some() {
                        write!(f, " ")?;
                    }
                }
                if let Some(alternative) = alternative {
                    write!(f, "else {}", alternative)?;
                }
                Ok(())
            }
            Expression::Call { function, arguments } => {
                let rendered: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, rendered.join(", "))
            }
        }
    }
}
