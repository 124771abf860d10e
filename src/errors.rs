// File: src/errors.rs
//
// Error handling and reporting for the Adder programming language.
// One structured error type serves all three surfaces (parser, compiler,
// runtime); rendering is colorized, with an optional source location and
// "did you mean" suggestions for misspelled identifiers.

use crate::lexer::Position;
use colored::Colorize;
use std::fmt;

/// Source location of a diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub file: Option<String>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column, file: None }
    }

    pub fn with_file(line: usize, column: usize, file: String) -> Self {
        Self { line, column, file: Some(file) }
    }

    pub fn from_position(pos: Position) -> Self {
        Self::new(pos.line, pos.column)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Classification of everything that can go wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Compile,
    Runtime,
    UnknownIdentifier,
    ArityMismatch,
    TypeMismatch,
    DivisionByZero,
    IndexOutOfRange,
    UnhashableKey,
    NotCallable,
    NotSubscriptable,
    NotIterable,
    StackOverflow,
    FrameOverflow,
    IteratorExhausted,
    NoBoundInstance,
    UnknownAttribute,
    IllegalLoopJump,
    ClassAlreadyDefined,
    InvalidBytecode,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "Parse error",
            ErrorKind::Compile => "Compile error",
            ErrorKind::Runtime => "Runtime error",
            ErrorKind::UnknownIdentifier => "Unknown identifier",
            ErrorKind::ArityMismatch => "Arity mismatch",
            ErrorKind::TypeMismatch => "Type mismatch",
            ErrorKind::DivisionByZero => "Division by zero",
            ErrorKind::IndexOutOfRange => "Index out of range",
            ErrorKind::UnhashableKey => "Unhashable key",
            ErrorKind::NotCallable => "Not callable",
            ErrorKind::NotSubscriptable => "Not subscriptable",
            ErrorKind::NotIterable => "Not iterable",
            ErrorKind::StackOverflow => "Stack overflow",
            ErrorKind::FrameOverflow => "Frame overflow",
            ErrorKind::IteratorExhausted => "Iterator exhausted",
            ErrorKind::NoBoundInstance => "No bound instance",
            ErrorKind::UnknownAttribute => "Unknown attribute",
            ErrorKind::IllegalLoopJump => "Illegal loop jump",
            ErrorKind::ClassAlreadyDefined => "Class already defined",
            ErrorKind::InvalidBytecode => "Invalid bytecode",
        };
        write!(f, "{}", name)
    }
}

/// A structured diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct AdderError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub suggestion: Option<String>,
}

impl AdderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), location: None, suggestion: None }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn parse(message: impl Into<String>, pos: Position) -> Self {
        Self::new(ErrorKind::Parse, message).with_location(SourceLocation::from_position(pos))
    }

    pub fn compile(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compile, message)
    }

    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message)
    }
}

impl fmt::Display for AdderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = format!("{}", self.kind);
        write!(f, "{}: {}", kind.red().bold(), self.message.bold())?;
        if let Some(ref location) = self.location {
            write!(f, "\n{}", format!("  --> {}", location).bright_blue())?;
        }
        if let Some(ref suggestion) = self.suggestion {
            write!(
                f,
                "\n   {} {}",
                "=".bright_green(),
                format!("Did you mean '{}'?", suggestion).bright_green()
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for AdderError {}

/// Computes the Levenshtein distance between two strings.
/// Used for "did you mean" suggestions on unknown identifiers.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];
    for (i, row) in matrix.iter_mut().enumerate().take(len1 + 1) {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = std::cmp::min(
                std::cmp::min(matrix[i - 1][j] + 1, matrix[i][j - 1] + 1),
                matrix[i - 1][j - 1] + cost,
            );
        }
    }

    matrix[len1][len2]
}

/// Find the closest match among candidates, ignoring anything further than
/// three edits away.
pub fn find_closest_match<'a>(target: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for candidate in candidates {
        let distance = levenshtein_distance(target, candidate);
        if distance <= 3 && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.as_str());
        }
    }

    best_match
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_find_closest_match() {
        let candidates =
            vec!["length".to_string(), "first".to_string(), "rest".to_string()];
        assert_eq!(find_closest_match("lenght", &candidates), Some("length"));
        assert_eq!(find_closest_match("zzzzzzzz", &candidates), None);
    }
}
