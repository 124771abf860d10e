// File: src/value.rs
//
// Runtime values for the Adder programming language.
// One tagged union serves both engines: the VM manipulates the compiled
// variants (CompiledFunction/Closure/CompiledClass) while the tree-walking
// evaluator uses the AST-carrying ones (Function/Method/Class). Collections
// are reference-counted with interior mutability so builtin mutators keep
// value identity, and the shared operator/attribute/iterator helpers at the
// bottom keep the two engines observably equivalent.

use crate::ast::Statement;
use crate::builtins::BuiltinFunction;
use crate::environment::EnvId;
use crate::errors::{AdderError, ErrorKind};
use ahash::AHashMap;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Hash fingerprint of a hashable value. Only ints, booleans, and strings
/// are hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
}

/// A hash entry keeps the original key value alongside the stored value so
/// the key can be re-inspected (the fingerprint alone is not enough).
#[derive(Debug, Clone)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// Insertion-ordered storage behind a hash value. Order is observable via
/// `inspect` and iteration, so a plain unordered map will not do.
#[derive(Debug, Clone, Default)]
pub struct HashData {
    pub pairs: IndexMap<HashKey, HashPair, ahash::RandomState>,
}

/// Output of the compiler for one function body.
#[derive(Debug)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function together with its captured free variables and, for
/// methods, the instance it is bound to.
#[derive(Debug)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
    pub instance: Option<Value>,
    pub is_constructor: bool,
}

impl Closure {
    pub fn new(function: Rc<CompiledFunction>, free: Vec<Value>) -> Self {
        Closure { function, free, instance: None, is_constructor: false }
    }

    /// A copy of this closure bound to `instance`.
    pub fn bind(&self, instance: Value, is_constructor: bool) -> Closure {
        Closure {
            function: Rc::clone(&self.function),
            free: self.free.clone(),
            instance: Some(instance),
            is_constructor,
        }
    }
}

/// A class definition in the VM: unbound method closures plus an optional
/// constructor, instantiated by binding each to a fresh instance.
#[derive(Debug)]
pub struct CompiledClass {
    pub name: Rc<str>,
    pub constructor: Option<Rc<Closure>>,
    pub methods: Vec<(Rc<str>, Rc<Closure>)>,
}

/// Instance state: the defining class name plus the attribute map.
#[derive(Debug)]
pub struct Instance {
    pub class_name: Rc<str>,
    pub attributes: AHashMap<String, Value>,
}

/// A tree-walker function value: parameters, body, and the environment the
/// literal was evaluated in (by arena id, so environment chains may cycle
/// through closures without upsetting reference counting).
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Statement>,
    pub env: EnvId,
}

/// A tree-walker function bound to an instance.
#[derive(Debug)]
pub struct Method {
    pub instance: Value,
    pub function: Rc<Function>,
}

/// A tree-walker class definition.
#[derive(Debug)]
pub struct Class {
    pub name: Rc<str>,
    pub constructor: Option<Rc<Function>>,
    pub methods: Vec<(Rc<str>, Rc<Function>)>,
}

/// A builtin attribute method (`"s".toUpper`) bound to its receiver.
pub struct BuiltinMethod {
    pub name: &'static str,
    pub receiver: Value,
    pub func: fn(&Value, &[Value]) -> Value,
}

impl fmt::Debug for BuiltinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinMethod({})", self.name)
    }
}

/// What an iterator walks over.
#[derive(Debug)]
pub enum IterSource {
    /// Live view of an array: growth during iteration is visible.
    Array(Rc<RefCell<Vec<Value>>>),
    /// Characters of a string, snapshotted at creation.
    Chars(Vec<Rc<str>>),
    /// Keys of a hash, snapshotted at creation; values are read live.
    Hash { hash: Rc<RefCell<HashData>>, keys: Vec<HashKey> },
}

#[derive(Debug)]
pub struct IteratorValue {
    pub source: IterSource,
    pub counter: usize,
}

impl IteratorValue {
    pub fn has_next(&self) -> bool {
        match &self.source {
            IterSource::Array(elements) => self.counter < elements.borrow().len(),
            IterSource::Chars(chars) => self.counter < chars.len(),
            IterSource::Hash { keys, .. } => self.counter < keys.len(),
        }
    }

    /// Advance and return the next element, or `None` when exhausted.
    pub fn next(&mut self) -> Option<Value> {
        if !self.has_next() {
            return None;
        }
        let index = self.counter;
        self.counter += 1;
        match &self.source {
            IterSource::Array(elements) => elements.borrow().get(index).cloned(),
            IterSource::Chars(chars) => Some(Value::Str(Rc::clone(&chars[index]))),
            IterSource::Hash { hash, keys } => Some(
                hash.borrow()
                    .pairs
                    .get(&keys[index])
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null),
            ),
        }
    }
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
    Null,
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashData>>),
    /// Wrapper carrying a `return` through the tree-walker.
    Return(Box<Value>),
    Break,
    Continue,
    /// A runtime error flowing through the tree-walker, or produced by a
    /// builtin and pushed by the VM.
    Error(Rc<str>),
    Function(Rc<Function>),
    Method(Rc<Method>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static BuiltinFunction),
    BuiltinMethod(Rc<BuiltinMethod>),
    Class(Rc<Class>),
    CompiledClass(Rc<CompiledClass>),
    Instance(Rc<RefCell<Instance>>),
    /// Bare attribute bag created by the `object` builtin.
    Object(Rc<RefCell<AHashMap<String, Value>>>),
    Iterator(Rc<RefCell<IteratorValue>>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn error(message: impl AsRef<str>) -> Self {
        Value::Error(Rc::from(message.as_ref()))
    }

    /// Short type name used in diagnostics and tests.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Return(_) => "returnValue",
            Value::Break => "break",
            Value::Continue => "continue",
            Value::Error(_) => "error",
            Value::Function(_) => "function",
            Value::Method(_) => "method",
            Value::CompiledFunction(_) => "compiledFunction",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtinFunction",
            Value::BuiltinMethod(_) => "builtinMethod",
            Value::Class(_) => "class",
            Value::CompiledClass(_) => "compiledClass",
            Value::Instance(_) => "classInstance",
            Value::Object(_) => "object",
            Value::Iterator(_) => "iterator",
        }
    }

    /// Only `false` and `null` are falsey.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_hashable(&self) -> bool {
        self.hash_key().is_some()
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Int(i) => Some(HashKey::Int(*i)),
            Value::Bool(b) => Some(HashKey::Bool(*b)),
            Value::Str(s) => Some(HashKey::Str(Rc::clone(s))),
            _ => None,
        }
    }

    /// Canonical string rendering used for printing results and in test
    /// assertions. Strings are quoted; `to_display_string` leaves them raw.
    pub fn inspect(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            Value::Return(v) => format!("return {}", v.inspect()),
            other => other.to_display_string(),
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.to_string(),
            Value::Null => "null".to_string(),
            Value::Array(elements) => {
                let rendered: Vec<String> =
                    elements.borrow().iter().map(|e| e.inspect()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Hash(data) => {
                let rendered: Vec<String> = data
                    .borrow()
                    .pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key.inspect(), pair.value.inspect()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Return(v) => format!("return {}", v.inspect()),
            Value::Break => "break".to_string(),
            Value::Continue => "continue".to_string(),
            Value::Error(message) => format!("ERROR: {}", message),
            Value::Function(function) => {
                format!("fn({}) {}", function.params.join(", "), function.body)
            }
            Value::Method(method) => {
                format!("<method of {} (bound)>", method.instance.type_name())
            }
            Value::CompiledFunction(function) => {
                format!("<compiledFunction (len={})>", function.instructions.len())
            }
            Value::Closure(closure) => {
                let free: Vec<String> = closure.free.iter().map(|v| v.inspect()).collect();
                format!(
                    "<closure{} (len={}) free=[{}]>",
                    if closure.is_constructor { "(constructor)" } else { "" },
                    closure.function.instructions.len(),
                    free.join(", ")
                )
            }
            Value::Builtin(builtin) => format!("[builtin]{}()", builtin.name),
            Value::BuiltinMethod(method) => format!(
                "<builtinMethod {} of {} (bound)>",
                method.name,
                method.receiver.type_name()
            ),
            Value::Class(class) => format!("<class {}>", class.name),
            Value::CompiledClass(class) => format!("<class(compiled) {}>", class.name),
            Value::Instance(instance) => {
                format!("<classInstance of {}>", instance.borrow().class_name)
            }
            Value::Object(_) => "<object>".to_string(),
            Value::Iterator(iterator) => {
                format!("<iterator counter={}>", iterator.borrow().counter)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

/// Equality: ints, booleans, strings, null, and errors compare by value;
/// everything else compares by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Break, Value::Break) => true,
            (Value::Continue, Value::Continue) => true,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::BuiltinMethod(a), Value::BuiltinMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledClass(a), Value::CompiledClass(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn runtime(kind: ErrorKind, message: String) -> AdderError {
    AdderError::runtime(kind, message)
}

/// `+`: integer addition or string concatenation.
pub fn binary_add(left: &Value, right: &Value) -> Result<Value, AdderError> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => Ok(Value::Int(l.wrapping_add(*r))),
        (Value::Str(l), Value::Str(r)) => {
            let mut joined = String::with_capacity(l.len() + r.len());
            joined.push_str(l);
            joined.push_str(r);
            Ok(Value::str(joined))
        }
        _ => Err(runtime(
            ErrorKind::TypeMismatch,
            format!("unsupported operand types for +: {} and {}", left.type_name(), right.type_name()),
        )),
    }
}

pub fn binary_sub(left: &Value, right: &Value) -> Result<Value, AdderError> {
    int_op(left, right, "-", |l, r| Ok(Value::Int(l.wrapping_sub(r))))
}

pub fn binary_mul(left: &Value, right: &Value) -> Result<Value, AdderError> {
    int_op(left, right, "*", |l, r| Ok(Value::Int(l.wrapping_mul(r))))
}

/// Integer division, truncating toward zero.
pub fn binary_div(left: &Value, right: &Value) -> Result<Value, AdderError> {
    int_op(left, right, "/", |l, r| {
        if r == 0 {
            Err(runtime(ErrorKind::DivisionByZero, format!("{} / 0", l)))
        } else {
            Ok(Value::Int(l.wrapping_div(r)))
        }
    })
}

pub fn compare_gt(left: &Value, right: &Value) -> Result<Value, AdderError> {
    int_op(left, right, ">", |l, r| Ok(Value::Bool(l > r)))
}

pub fn compare_gteq(left: &Value, right: &Value) -> Result<Value, AdderError> {
    int_op(left, right, ">=", |l, r| Ok(Value::Bool(l >= r)))
}

fn int_op(
    left: &Value,
    right: &Value,
    op: &str,
    apply: impl FnOnce(i64, i64) -> Result<Value, AdderError>,
) -> Result<Value, AdderError> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => apply(*l, *r),
        _ => Err(runtime(
            ErrorKind::TypeMismatch,
            format!(
                "unsupported operand types for {}: {} and {}",
                op,
                left.type_name(),
                right.type_name()
            ),
        )),
    }
}

/// Unary `-`.
pub fn unary_minus(operand: &Value) -> Result<Value, AdderError> {
    match operand {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        _ => Err(runtime(
            ErrorKind::TypeMismatch,
            format!("unsupported operand type for -: {}", operand.type_name()),
        )),
    }
}

/// Membership test backing `in`/`notin`.
pub fn contains(container: &Value, candidate: &Value) -> Result<bool, AdderError> {
    match container {
        Value::Array(elements) => {
            Ok(elements.borrow().iter().any(|element| element == candidate))
        }
        Value::Hash(data) => {
            let key = candidate.hash_key().ok_or_else(|| {
                runtime(
                    ErrorKind::UnhashableKey,
                    format!("unhashable key: {}", candidate.type_name()),
                )
            })?;
            Ok(data.borrow().pairs.contains_key(&key))
        }
        Value::Str(s) => match candidate {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            _ => Err(runtime(
                ErrorKind::TypeMismatch,
                format!("cannot test {} for membership in string", candidate.type_name()),
            )),
        },
        _ => Err(runtime(
            ErrorKind::NotIterable,
            format!("{} does not support membership tests", container.type_name()),
        )),
    }
}

/// Build an iterator value. Strings and hashes snapshot at this point;
/// arrays iterate live.
pub fn to_iterator(value: &Value) -> Result<Value, AdderError> {
    let source = match value {
        Value::Array(elements) => IterSource::Array(Rc::clone(elements)),
        Value::Str(s) => {
            IterSource::Chars(s.chars().map(|c| Rc::from(c.to_string().as_str())).collect())
        }
        Value::Hash(data) => IterSource::Hash {
            hash: Rc::clone(data),
            keys: data.borrow().pairs.keys().cloned().collect(),
        },
        Value::Iterator(_) => return Ok(value.clone()),
        _ => {
            return Err(runtime(
                ErrorKind::NotIterable,
                format!("{} is not iterable", value.type_name()),
            ))
        }
    };
    Ok(Value::Iterator(Rc::new(RefCell::new(IteratorValue { source, counter: 0 }))))
}

/// Subscript read: `target[index]`.
pub fn index_get(target: &Value, index: &Value) -> Result<Value, AdderError> {
    match target {
        Value::Array(elements) => {
            let elements = elements.borrow();
            let slot = resolve_index(index, elements.len(), "array")?;
            elements.get(slot).cloned().ok_or_else(|| {
                runtime(
                    ErrorKind::IndexOutOfRange,
                    format!("index {} out of range for array of length {}", index, elements.len()),
                )
            })
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let slot = resolve_index(index, chars.len(), "string")?;
            chars.get(slot).map(|c| Value::str(c.to_string())).ok_or_else(|| {
                runtime(
                    ErrorKind::IndexOutOfRange,
                    format!("index {} out of range for string of length {}", index, chars.len()),
                )
            })
        }
        Value::Hash(data) => {
            let key = index.hash_key().ok_or_else(|| {
                runtime(
                    ErrorKind::UnhashableKey,
                    format!("unhashable key: {}", index.type_name()),
                )
            })?;
            Ok(data
                .borrow()
                .pairs
                .get(&key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Value::Null))
        }
        _ => Err(runtime(
            ErrorKind::NotSubscriptable,
            format!("{} is not subscriptable", target.type_name()),
        )),
    }
}

/// Subscript write: `target[index] = value`.
pub fn index_set(target: &Value, index: &Value, value: Value) -> Result<(), AdderError> {
    match target {
        Value::Array(elements) => {
            let mut elements = elements.borrow_mut();
            let len = elements.len();
            let slot = resolve_index(index, len, "array")?;
            match elements.get_mut(slot) {
                Some(entry) => {
                    *entry = value;
                    Ok(())
                }
                None => Err(runtime(
                    ErrorKind::IndexOutOfRange,
                    format!("index {} out of range for array of length {}", index, len),
                )),
            }
        }
        Value::Hash(data) => {
            let key = index.hash_key().ok_or_else(|| {
                runtime(
                    ErrorKind::UnhashableKey,
                    format!("unhashable key: {}", index.type_name()),
                )
            })?;
            data.borrow_mut()
                .pairs
                .insert(key, HashPair { key: index.clone(), value });
            Ok(())
        }
        _ => Err(runtime(
            ErrorKind::NotSubscriptable,
            format!("{} does not support index assignment", target.type_name()),
        )),
    }
}

/// Negative indices count from the end, matching the reference semantics.
fn resolve_index(index: &Value, len: usize, what: &str) -> Result<usize, AdderError> {
    match index {
        Value::Int(i) if *i >= 0 => Ok(*i as usize),
        Value::Int(i) => {
            let from_end = len as i64 + i;
            if from_end < 0 {
                Err(runtime(
                    ErrorKind::IndexOutOfRange,
                    format!("index {} out of range for {} of length {}", i, what, len),
                ))
            } else {
                Ok(from_end as usize)
            }
        }
        _ => Err(runtime(
            ErrorKind::TypeMismatch,
            format!("{} index must be int, got {}", what, index.type_name()),
        )),
    }
}

fn builtin_method_to_upper(receiver: &Value, args: &[Value]) -> Value {
    if !args.is_empty() {
        return Value::error(format!(
            "Wrong number of arguments to <string>.toUpper: got {}, want 0",
            args.len()
        ));
    }
    match receiver {
        Value::Str(s) => Value::str(s.to_uppercase()),
        other => Value::error(format!("toUpper not supported on {}", other.type_name())),
    }
}

fn builtin_method_to_lower(receiver: &Value, args: &[Value]) -> Value {
    if !args.is_empty() {
        return Value::error(format!(
            "Wrong number of arguments to <string>.toLower: got {}, want 0",
            args.len()
        ));
    }
    match receiver {
        Value::Str(s) => Value::str(s.to_lowercase()),
        other => Value::error(format!("toLower not supported on {}", other.type_name())),
    }
}

fn bound_builtin_method(
    name: &'static str,
    receiver: &Value,
    func: fn(&Value, &[Value]) -> Value,
) -> Value {
    Value::BuiltinMethod(Rc::new(BuiltinMethod { name, receiver: receiver.clone(), func }))
}

/// Attribute read: instance/object attribute maps first, then the builtin
/// getters registered per value kind.
pub fn get_attribute(target: &Value, name: &str) -> Result<Value, AdderError> {
    match target {
        Value::Instance(instance) => {
            if let Some(value) = instance.borrow().attributes.get(name) {
                return Ok(value.clone());
            }
            Err(unknown_attribute(target, name))
        }
        Value::Object(attributes) => {
            if let Some(value) = attributes.borrow().get(name) {
                return Ok(value.clone());
            }
            Err(unknown_attribute(target, name))
        }
        Value::Str(s) => match name {
            "length" => Ok(Value::Int(s.chars().count() as i64)),
            "toUpper" => Ok(bound_builtin_method("toUpper", target, builtin_method_to_upper)),
            "toLower" => Ok(bound_builtin_method("toLower", target, builtin_method_to_lower)),
            _ => Err(unknown_attribute(target, name)),
        },
        Value::Array(elements) => match name {
            "length" => Ok(Value::Int(elements.borrow().len() as i64)),
            _ => Err(unknown_attribute(target, name)),
        },
        Value::Hash(data) => match name {
            "length" => Ok(Value::Int(data.borrow().pairs.len() as i64)),
            _ => Err(unknown_attribute(target, name)),
        },
        _ => Err(unknown_attribute(target, name)),
    }
}

/// Attribute write. Assigning a function value into an instance or object
/// implicitly rebinds it as a method of that target, so `obj.m = fn() {...}`
/// gives the function a `this`.
pub fn set_attribute(target: &Value, name: &str, value: Value) -> Result<(), AdderError> {
    let bound = bind_if_function(target, value);
    match target {
        Value::Instance(instance) => {
            instance.borrow_mut().attributes.insert(name.to_string(), bound);
            Ok(())
        }
        Value::Object(attributes) => {
            attributes.borrow_mut().insert(name.to_string(), bound);
            Ok(())
        }
        _ => Err(runtime(
            ErrorKind::TypeMismatch,
            format!("cannot set attribute '{}' on {}", name, target.type_name()),
        )),
    }
}

fn bind_if_function(target: &Value, value: Value) -> Value {
    match value {
        Value::Closure(closure) => Value::Closure(Rc::new(closure.bind(target.clone(), false))),
        Value::Function(function) => Value::Method(Rc::new(Method {
            instance: target.clone(),
            function,
        })),
        other => other,
    }
}

fn unknown_attribute(target: &Value, name: &str) -> AdderError {
    runtime(
        ErrorKind::UnknownAttribute,
        format!("no attribute '{}' on {}", name, target.type_name()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_equality_by_value_and_identity() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_eq!(Value::str("a"), Value::str("a"));
        let a = Value::array(vec![Value::Int(1)]);
        let b = Value::array(vec![Value::Int(1)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_negative_indexing() {
        let arr = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(index_get(&arr, &Value::Int(-1)).map(|v| v.inspect()), Ok("3".to_string()));
        assert!(index_get(&arr, &Value::Int(-4)).is_err());
    }

    #[test]
    fn test_missing_hash_key_reads_null() {
        let hash = Value::Hash(Rc::new(RefCell::new(HashData::default())));
        assert_eq!(index_get(&hash, &Value::str("absent")), Ok(Value::Null));
    }

    #[test]
    fn test_string_attributes() {
        let s = Value::str("MonKey");
        assert_eq!(get_attribute(&s, "length"), Ok(Value::Int(6)));
        let upper = get_attribute(&s, "toUpper").expect("toUpper exists");
        match upper {
            Value::BuiltinMethod(method) => {
                assert_eq!((method.func)(&method.receiver, &[]), Value::str("MONKEY"));
            }
            other => panic!("expected builtin method, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_iteration_snapshots_keys() {
        let mut data = HashData::default();
        data.pairs.insert(
            HashKey::Str(Rc::from("a")),
            HashPair { key: Value::str("a"), value: Value::Int(1) },
        );
        let hash = Value::Hash(Rc::new(RefCell::new(data)));
        let iterator = to_iterator(&hash).expect("hash iterates");

        // Mutating after ITER must not disturb the snapshot of keys.
        if let Value::Hash(data) = &hash {
            data.borrow_mut().pairs.insert(
                HashKey::Str(Rc::from("b")),
                HashPair { key: Value::str("b"), value: Value::Int(2) },
            );
        }
        if let Value::Iterator(it) = iterator {
            let mut it = it.borrow_mut();
            assert_eq!(it.next(), Some(Value::Int(1)));
            assert!(!it.has_next());
        } else {
            panic!("expected iterator");
        }
    }
}
