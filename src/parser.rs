// File: src/parser.rs
//
// Pratt parser for the Adder programming language.
// Operator-precedence parsing with per-token prefix and infix handlers.
// Errors accumulate on the parser so a single pass can report as many
// diagnostics as possible; recovery is per-statement.

use crate::ast::{Expression, Program, Statement};
use crate::lexer::{Lexer, Position, Token, TokenKind};
use std::fmt;

/// Binding strength, lowest to highest. `.`/`[` bind tighter than calls,
/// calls tighter than prefix operators, and so on down to `and`/`or`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Bool,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn token_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::And | TokenKind::Or => Precedence::Bool,
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt
        | TokenKind::Gt
        | TokenKind::LtEq
        | TokenKind::GtEq
        | TokenKind::In
        | TokenKind::NotIn => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Asterisk | TokenKind::Slash => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket | TokenKind::Period => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// A parse diagnostic: message plus the position of the offending token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: Position,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.pos, self.message)
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub errors: Vec<ParseError>,
    /// Brace nesting depth; class definitions are only legal at depth zero.
    block_depth: usize,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        // Comment tokens are dropped here; the grammar never sees them.
        let tokens = Lexer::new(input)
            .lex()
            .into_iter()
            .filter(|t| t.kind != TokenKind::Comment)
            .collect();
        Parser { tokens, pos: 0, errors: Vec::new(), block_depth: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens.last().expect("token stream always ends with EOF")
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or_else(|| {
            self.tokens.last().expect("token stream always ends with EOF")
        })
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn current_is(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    /// Advance past the peek token if it matches, otherwise record an error.
    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.advance();
            true
        } else {
            let tok = self.peek().clone();
            self.error(
                format!("expected {:?} but got {:?} instead", kind, tok.kind),
                tok.pos,
            );
            false
        }
    }

    fn error(&mut self, message: String, pos: Position) {
        self.errors.push(ParseError { message, pos });
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::new();
        while !self.current_is(TokenKind::Eof) {
            match self.parse_statement() {
                Some(statement) => {
                    program.statements.push(statement);
                    self.advance();
                }
                None => {
                    self.synchronize();
                    if !self.current_is(TokenKind::Eof) {
                        self.advance();
                    }
                }
            }
        }
        program
    }

    /// Skip forward to a statement boundary after an error.
    fn synchronize(&mut self) {
        while !self.current_is(TokenKind::Eof)
            && !self.current_is(TokenKind::Semicolon)
            && !self.current_is(TokenKind::RBrace)
        {
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match self.current().kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Break => {
                self.skip_optional_semicolon();
                Some(Statement::Break)
            }
            TokenKind::Continue => {
                self.skip_optional_semicolon();
                Some(Statement::Continue)
            }
            TokenKind::Class => self.parse_class_statement(),
            _ => self.parse_assignment_or_expression_statement(),
        }
    }

    fn skip_optional_semicolon(&mut self) {
        if self.peek_is(TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn parse_let_statement(&mut self) -> Option<Statement> {
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.current().literal.clone();
        if !self.expect_peek(TokenKind::Assign) {
            return None;
        }
        self.advance();
        let mut value = self.parse_expression(Precedence::Lowest)?;
        // A function literal bound by `let` carries the bound name so it can
        // call itself.
        if let Expression::FnLit { name: fn_name, .. } = &mut value {
            *fn_name = Some(name.clone());
        }
        self.skip_optional_semicolon();
        Some(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Option<Statement> {
        if self.peek_is(TokenKind::Semicolon) || self.peek_is(TokenKind::RBrace) {
            self.skip_optional_semicolon();
            return Some(Statement::Return { value: None });
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_optional_semicolon();
        Some(Statement::Return { value: Some(value) })
    }

    /// Statements that are not introduced by a keyword are either assignments
    /// or expression statements. The left-hand side is parsed as a general
    /// expression; if an `=` follows, the assignment is accepted, otherwise
    /// the parser snapshot is restored and the same tokens re-parse as an
    /// expression statement.
    fn parse_assignment_or_expression_statement(&mut self) -> Option<Statement> {
        let snapshot = self.pos;
        let errors_before = self.errors.len();

        if let Some(target) = self.parse_expression(Precedence::Lowest) {
            if self.peek_is(TokenKind::Assign) {
                if !target.is_assignable() {
                    let pos = self.peek().pos;
                    self.error(
                        format!("cannot assign to {}", target),
                        pos,
                    );
                    return None;
                }
                self.advance(); // onto `=`
                self.advance(); // past `=`
                let value = self.parse_expression(Precedence::Lowest)?;
                self.skip_optional_semicolon();
                return Some(Statement::Assign { target, value });
            }
        }

        // Not an assignment: rewind and parse as a plain expression statement,
        // discarding any speculative diagnostics.
        self.pos = snapshot;
        self.errors.truncate(errors_before);
        let expression = self.parse_expression(Precedence::Lowest)?;
        self.skip_optional_semicolon();
        Some(Statement::Expr { expression })
    }

    fn parse_while_statement(&mut self) -> Option<Statement> {
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block_statement()?;
        Some(Statement::While { condition, body: Box::new(body) })
    }

    fn parse_for_statement(&mut self) -> Option<Statement> {
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let var = self.current().literal.clone();
        if !self.expect_peek(TokenKind::In) {
            return None;
        }
        self.advance();
        let iterable = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block_statement()?;
        Some(Statement::For { var, iterable, body: Box::new(body) })
    }

    fn parse_class_statement(&mut self) -> Option<Statement> {
        let class_pos = self.current().pos;
        if self.block_depth > 0 {
            self.error("class definitions are not allowed inside blocks".to_string(), class_pos);
            return None;
        }
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.current().literal.clone();
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        let mut constructor = None;
        let mut methods = Vec::new();
        while !self.peek_is(TokenKind::RBrace) && !self.peek_is(TokenKind::Eof) {
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            let method_name = self.current().literal.clone();
            let method_pos = self.current().pos;
            if !self.expect_peek(TokenKind::LParen) {
                return None;
            }
            let params = self.parse_function_parameters()?;
            if !self.expect_peek(TokenKind::LBrace) {
                return None;
            }
            let body = self.parse_block_statement()?;
            let function = Expression::FnLit {
                name: Some(method_name.clone()),
                params,
                body: Box::new(body),
            };
            if method_name == "constructor" {
                if constructor.is_some() {
                    self.error(
                        format!("class {} has more than one constructor", name),
                        method_pos,
                    );
                }
                constructor = Some(function);
            } else {
                methods.push((method_name, function));
            }
        }
        if !self.expect_peek(TokenKind::RBrace) {
            return None;
        }
        Some(Statement::Class { name, constructor, methods })
    }

    /// Parses `{ ... }` with the current token on the opening brace; leaves
    /// the current token on the closing brace.
    fn parse_block_statement(&mut self) -> Option<Statement> {
        self.block_depth += 1;
        let mut statements = Vec::new();
        self.advance();
        while !self.current_is(TokenKind::RBrace) && !self.current_is(TokenKind::Eof) {
            match self.parse_statement() {
                Some(statement) => {
                    statements.push(statement);
                    self.advance();
                }
                None => {
                    // Recover at the next statement boundary; a `}` here is
                    // the block terminator and must be left in place.
                    self.synchronize();
                    if self.current_is(TokenKind::Semicolon) {
                        self.advance();
                    }
                }
            }
        }
        self.block_depth -= 1;
        if self.current_is(TokenKind::Eof) {
            let pos = self.current().pos;
            self.error("unterminated block".to_string(), pos);
            return None;
        }
        Some(Statement::Block { statements })
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expression> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(TokenKind::Semicolon)
            && precedence < token_precedence(self.peek().kind)
        {
            self.advance();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expression> {
        match self.current().kind {
            TokenKind::Ident => Some(Expression::Ident(self.current().literal.clone())),
            TokenKind::This => Some(Expression::This),
            TokenKind::Int => self.parse_integer_literal(),
            TokenKind::Str => Some(Expression::StrLit(self.current().literal.clone())),
            TokenKind::True => Some(Expression::BoolLit(true)),
            TokenKind::False => Some(Expression::BoolLit(false)),
            TokenKind::Null => Some(Expression::NullLit),
            TokenKind::Bang | TokenKind::Minus | TokenKind::Not => self.parse_prefix_expression(),
            TokenKind::LParen => self.parse_grouped_expression(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Function => self.parse_function_literal(),
            kind => {
                let pos = self.current().pos;
                self.error(format!("no prefix parse rule for {:?}", kind), pos);
                None
            }
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Option<Expression> {
        match self.current().kind {
            TokenKind::LParen => self.parse_call_expression(left),
            TokenKind::LBracket => self.parse_index_expression(left),
            TokenKind::Period => self.parse_get_expression(left),
            _ => self.parse_infix_expression(left),
        }
    }

    fn parse_integer_literal(&mut self) -> Option<Expression> {
        let tok = self.current().clone();
        match tok.literal.parse::<i64>() {
            Ok(value) => Some(Expression::IntLit(value)),
            Err(_) => {
                self.error(format!("could not parse {} as integer", tok.literal), tok.pos);
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self) -> Option<Expression> {
        let op = self.current().literal.clone();
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expression::Prefix { op, right: Box::new(right) })
    }

    fn parse_infix_expression(&mut self, left: Expression) -> Option<Expression> {
        let op = self.current().literal.clone();
        let precedence = token_precedence(self.current().kind);
        self.advance();
        let right = self.parse_expression(precedence)?;
        Some(Expression::Infix { op, left: Box::new(left), right: Box::new(right) })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expression> {
        self.advance();
        let expression = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        Some(expression)
    }

    fn parse_array_literal(&mut self) -> Option<Expression> {
        let elements = self.parse_expression_list(TokenKind::RBracket)?;
        Some(Expression::ArrayLit(elements))
    }

    fn parse_hash_literal(&mut self) -> Option<Expression> {
        let mut pairs = Vec::new();
        while !self.peek_is(TokenKind::RBrace) {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if !self.peek_is(TokenKind::RBrace) && !self.expect_peek(TokenKind::Comma) {
                return None;
            }
        }
        if !self.expect_peek(TokenKind::RBrace) {
            return None;
        }
        Some(Expression::HashLit(pairs))
    }

    fn parse_if_expression(&mut self) -> Option<Expression> {
        let mut branches = Vec::new();
        let mut alternative = None;

        loop {
            if !self.expect_peek(TokenKind::LParen) {
                return None;
            }
            self.advance();
            let condition = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(TokenKind::RParen) {
                return None;
            }
            if !self.expect_peek(TokenKind::LBrace) {
                return None;
            }
            let consequence = self.parse_block_statement()?;
            branches.push((condition, consequence));

            if self.peek_is(TokenKind::Elif) {
                self.advance();
                continue;
            }
            if self.peek_is(TokenKind::Else) {
                self.advance();
                if !self.expect_peek(TokenKind::LBrace) {
                    return None;
                }
                alternative = Some(Box::new(self.parse_block_statement()?));
            }
            break;
        }

        Some(Expression::If { branches, alternative })
    }

    fn parse_function_literal(&mut self) -> Option<Expression> {
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        let params = self.parse_function_parameters()?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block_statement()?;
        Some(Expression::FnLit { name: None, params, body: Box::new(body) })
    }

    /// Parses `a, b, c)` with the current token on the opening paren.
    fn parse_function_parameters(&mut self) -> Option<Vec<String>> {
        let mut params = Vec::new();
        if self.peek_is(TokenKind::RParen) {
            self.advance();
            return Some(params);
        }
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        params.push(self.current().literal.clone());
        while self.peek_is(TokenKind::Comma) {
            self.advance();
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            params.push(self.current().literal.clone());
        }
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        Some(params)
    }

    fn parse_call_expression(&mut self, function: Expression) -> Option<Expression> {
        let arguments = self.parse_expression_list(TokenKind::RParen)?;
        Some(Expression::Call { function: Box::new(function), arguments })
    }

    fn parse_index_expression(&mut self, left: Expression) -> Option<Expression> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RBracket) {
            return None;
        }
        Some(Expression::Index { left: Box::new(left), index: Box::new(index) })
    }

    fn parse_get_expression(&mut self, object: Expression) -> Option<Expression> {
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let property = self.current().literal.clone();
        Some(Expression::Get { object: Box::new(object), property })
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expression>> {
        let mut list = Vec::new();
        if self.peek_is(end) {
            self.advance();
            return Some(list);
        }
        self.advance();
        list.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(TokenKind::Comma) {
            self.advance();
            self.advance();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }
        if !self.expect_peek(end) {
            return None;
        }
        Some(list)
    }
}

/// Convenience wrapper: parse a complete source string, returning the program
/// or the accumulated error list.
pub fn parse(input: &str) -> Result<Program, Vec<ParseError>> {
    let mut parser = Parser::new(input);
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Program {
        match parse(input) {
            Ok(program) => program,
            Err(errors) => panic!("parse errors for {:?}: {:?}", input, errors),
        }
    }

    #[test]
    fn test_speculative_assignment() {
        let program = parse_ok("a = 1; a[0] = 2; a.b = 3; a + 1;");
        assert_eq!(program.statements.len(), 4);
        assert!(matches!(program.statements[0], Statement::Assign { .. }));
        assert!(matches!(program.statements[1], Statement::Assign { .. }));
        assert!(matches!(program.statements[2], Statement::Assign { .. }));
        assert!(matches!(program.statements[3], Statement::Expr { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(parse("1 + 2 = 3;").is_err());
    }

    #[test]
    fn test_let_names_function_literal() {
        let program = parse_ok("let f = fn(x) { x };");
        match &program.statements[0] {
            Statement::Let { value: Expression::FnLit { name, .. }, .. } => {
                assert_eq!(name.as_deref(), Some("f"));
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_elif_chain() {
        let program = parse_ok("if (a) { 1 } elif (b) { 2 } elif (c) { 3 } else { 4 }");
        match &program.statements[0] {
            Statement::Expr { expression: Expression::If { branches, alternative } } => {
                assert_eq!(branches.len(), 3);
                assert!(alternative.is_some());
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_nested_class_rejected() {
        assert!(parse("if (true) { class A { } }").is_err());
    }

    #[test]
    fn test_class_constructor_is_separated() {
        let program = parse_ok("class P { constructor(n) { this.n = n } getN() { return this.n } }");
        match &program.statements[0] {
            Statement::Class { name, constructor, methods } => {
                assert_eq!(name, "P");
                assert!(constructor.is_some());
                assert_eq!(methods.len(), 1);
                assert_eq!(methods[0].0, "getN");
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn test_errors_accumulate() {
        let mut parser = Parser::new("let = 1; let b 2; let c = 3;");
        let program = parser.parse_program();
        assert!(parser.errors.len() >= 2);
        // The valid trailing statement still parses.
        assert!(program
            .statements
            .iter()
            .any(|s| matches!(s, Statement::Let { name, .. } if name == "c")));
    }
}
