// File: src/lexer.rs
//
// Lexer for the Adder programming language.
// Single-pass scanner with one character of lookahead that turns UTF-8
// source text into a token stream. Operators are matched longest-first so
// that `==` wins over `=`; identifiers are re-classified as keywords in a
// separate lookup step.

use once_cell::sync::Lazy;

/// Kinds of tokens produced by the lexer. This is a closed set: every byte of
/// input maps to one of these, with `Illegal` as the catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Illegal,
    Eof,
    Comment,

    // Literals
    Ident,
    Int,
    Str,

    // Keywords
    Let,
    Function,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    NotIn,
    Return,
    Break,
    Continue,
    True,
    False,
    Null,
    Class,
    This,
    And,
    Or,
    Not,

    // Operators and punctuation
    Assign,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Bang,
    Period,
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
}

/// Line/column position of a token in the source text (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single lexed token: its kind, the literal text it was built from, and
/// where it started.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, pos: Position) -> Self {
        Token { kind, literal: literal.into(), pos }
    }
}

/// Operator table, tried in order. Sorted by literal length descending so the
/// longest match always wins (`<=` before `<`, `==` before `=`).
static OPERATORS: Lazy<Vec<(&'static str, TokenKind)>> = Lazy::new(|| {
    let mut ops = vec![
        ("==", TokenKind::Eq),
        ("!=", TokenKind::NotEq),
        ("<=", TokenKind::LtEq),
        (">=", TokenKind::GtEq),
        ("=", TokenKind::Assign),
        ("<", TokenKind::Lt),
        (">", TokenKind::Gt),
        ("+", TokenKind::Plus),
        ("-", TokenKind::Minus),
        ("*", TokenKind::Asterisk),
        ("/", TokenKind::Slash),
        ("!", TokenKind::Bang),
        (".", TokenKind::Period),
        (",", TokenKind::Comma),
        (";", TokenKind::Semicolon),
        (":", TokenKind::Colon),
        ("(", TokenKind::LParen),
        (")", TokenKind::RParen),
        ("{", TokenKind::LBrace),
        ("}", TokenKind::RBrace),
        ("[", TokenKind::LBracket),
        ("]", TokenKind::RBracket),
    ];
    ops.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    ops
});

/// Re-classify an identifier that is actually a keyword.
fn lookup_ident(ident: &str) -> TokenKind {
    match ident {
        "let" => TokenKind::Let,
        "fn" | "function" => TokenKind::Function,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "notin" => TokenKind::NotIn,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "class" => TokenKind::Class,
        "this" => TokenKind::This,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => TokenKind::Ident,
    }
}

/// The lexer walks the source one character at a time, keeping `position`
/// (the char under examination) and `read_position` (the next char). It never
/// fails: anything it cannot classify becomes an `Illegal` token.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    read_position: usize,
    ch: Option<char>,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer {
            input: input.chars().collect(),
            position: 0,
            read_position: 0,
            ch: None,
            line: 1,
            column: 0,
        };
        lexer.read_char();
        lexer
    }

    /// Lex the entire input, returning every token up to and including `Eof`.
    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if eof {
                break;
            }
        }
        tokens
    }

    fn read_char(&mut self) {
        if let Some(c) = self.ch {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            }
        }
        self.ch = self.input.get(self.read_position).copied();
        if self.ch.is_some() {
            self.column += 1;
        }
        self.position = self.read_position;
        self.read_position += 1;
    }

    fn peek_chars(&self, num_chars: usize) -> String {
        self.input.iter().skip(self.read_position).take(num_chars).collect()
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let pos = Position::new(self.line, self.column.max(1));

        let ch = match self.ch {
            Some(c) => c,
            None => {
                self.read_char();
                return Token::new(TokenKind::Eof, "", pos);
            }
        };

        if ch == '/' && self.peek_chars(1) == "/" {
            let literal = self.read_comment();
            return Token::new(TokenKind::Comment, literal, pos);
        }

        for (literal, kind) in OPERATORS.iter() {
            let len = literal.chars().count();
            let mut candidate = String::new();
            candidate.push(ch);
            candidate.push_str(&self.peek_chars(len - 1));
            if candidate == *literal {
                for _ in 0..len {
                    self.read_char();
                }
                return Token::new(*kind, candidate, pos);
            }
        }

        if is_identifier_char(ch) {
            let literal = self.read_identifier();
            let kind = lookup_ident(&literal);
            Token::new(kind, literal, pos)
        } else if ch.is_ascii_digit() {
            let literal = self.read_number();
            Token::new(TokenKind::Int, literal, pos)
        } else if ch == '"' || ch == '\'' {
            let literal = self.read_string(ch);
            Token::new(TokenKind::Str, literal, pos)
        } else {
            self.read_char();
            Token::new(TokenKind::Illegal, ch.to_string(), pos)
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.ch, Some(c) if c.is_whitespace()) {
            self.read_char();
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while matches!(self.ch, Some(c) if is_identifier_char(c) || c.is_ascii_digit()) {
            self.read_char();
        }
        self.input[start..self.position].iter().collect()
    }

    fn read_number(&mut self) -> String {
        let start = self.position;
        while matches!(self.ch, Some(c) if c.is_ascii_digit()) {
            self.read_char();
        }
        self.input[start..self.position].iter().collect()
    }

    /// Reads a string delimited by `quote`. Characters pass through verbatim;
    /// an unterminated string ends at end of input.
    fn read_string(&mut self, quote: char) -> String {
        let start = self.position + 1;
        loop {
            self.read_char();
            match self.ch {
                Some(c) if c == quote => {
                    let literal: String = self.input[start..self.position].iter().collect();
                    self.read_char();
                    return literal;
                }
                Some(_) => {}
                None => {
                    return self.input[start..self.position].iter().collect();
                }
            }
        }
    }

    fn read_comment(&mut self) -> String {
        let start = self.position;
        while matches!(self.ch, Some(c) if c != '\n') {
            self.read_char();
        }
        self.input[start..self.position].iter().collect()
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}
