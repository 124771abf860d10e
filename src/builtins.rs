// File: src/builtins.rs
//
// Builtin functions for the Adder programming language.
// The registry is an ordered list with fixed indices: the compiler resolves
// builtin names to positions in this table and the VM fetches them back by
// index, so the order is part of the bytecode contract. Argument validation
// failures come back as error values, not host errors.

use crate::value::Value;
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A host function exposed to scripts.
pub struct BuiltinFunction {
    pub name: &'static str,
    pub func: fn(&[Value]) -> Value,
}

/// The builtin registry. Indices are stable; append only.
pub static BUILTINS: [BuiltinFunction; 9] = [
    BuiltinFunction { name: "len", func: builtin_len },
    BuiltinFunction { name: "first", func: builtin_first },
    BuiltinFunction { name: "last", func: builtin_last },
    BuiltinFunction { name: "rest", func: builtin_rest },
    BuiltinFunction { name: "push", func: builtin_push },
    BuiltinFunction { name: "pop", func: builtin_pop },
    BuiltinFunction { name: "print", func: builtin_print },
    BuiltinFunction { name: "str", func: builtin_str },
    BuiltinFunction { name: "object", func: builtin_object },
];

pub fn lookup(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn builtin_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "Wrong number of arguments to len. Got {}, want 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Str(s) => Value::Int(s.chars().count() as i64),
        Value::Array(elements) => Value::Int(elements.borrow().len() as i64),
        Value::Hash(data) => Value::Int(data.borrow().pairs.len() as i64),
        other => Value::error(format!(
            "Argument to len not supported. Got {}",
            other.type_name()
        )),
    }
}

fn builtin_first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "Wrong number of arguments to first. Got {}, want 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Str(s) => match s.chars().next() {
            Some(c) => Value::str(c.to_string()),
            None => Value::error("Sequence index error"),
        },
        Value::Array(elements) => match elements.borrow().first() {
            Some(value) => value.clone(),
            None => Value::error("Sequence index error"),
        },
        other => Value::error(format!(
            "Argument to first not supported. Got {}",
            other.type_name()
        )),
    }
}

fn builtin_last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "Wrong number of arguments to last. Got {}, want 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Str(s) => match s.chars().last() {
            Some(c) => Value::str(c.to_string()),
            None => Value::error("Sequence index error"),
        },
        Value::Array(elements) => match elements.borrow().last() {
            Some(value) => value.clone(),
            None => Value::error("Sequence index error"),
        },
        other => Value::error(format!(
            "Argument to last not supported. Got {}",
            other.type_name()
        )),
    }
}

/// Tail of a sequence as a fresh value; an empty input yields an empty tail.
fn builtin_rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "Wrong number of arguments to rest. Got {}, want 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Str(s) => Value::str(s.chars().skip(1).collect::<String>()),
        Value::Array(elements) => {
            Value::array(elements.borrow().iter().skip(1).cloned().collect())
        }
        other => Value::error(format!(
            "Argument to rest not supported. Got {}",
            other.type_name()
        )),
    }
}

/// Appends in place and returns the same array value.
fn builtin_push(args: &[Value]) -> Value {
    if args.len() < 2 {
        return Value::error(format!(
            "Wrong number of arguments to push. Got {}, want >=2",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            elements.borrow_mut().extend(args[1..].iter().cloned());
            args[0].clone()
        }
        other => Value::error(format!(
            "Argument 1 to push must be array. Got {}",
            other.type_name()
        )),
    }
}

/// Removes and returns the last element in place.
fn builtin_pop(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "Wrong number of arguments to pop. Got {}, want 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => match elements.borrow_mut().pop() {
            Some(value) => value,
            None => Value::error("Cannot pop from empty array"),
        },
        other => Value::error(format!(
            "Argument 1 to pop must be array. Got {}",
            other.type_name()
        )),
    }
}

fn builtin_print(args: &[Value]) -> Value {
    if args.is_empty() {
        return Value::error("print expected at least 1 argument.");
    }
    let rendered: Vec<String> = args.iter().map(|arg| arg.inspect()).collect();
    println!("{}", rendered.join(" "));
    Value::Null
}

/// Display-form conversion (strings stay unquoted).
fn builtin_str(args: &[Value]) -> Value {
    if args.len() != 1 {
        return Value::error(format!(
            "Wrong number of arguments to str. Got {}, want 1",
            args.len()
        ));
    }
    Value::str(args[0].to_display_string())
}

/// A bare attribute bag; attributes are added with `o.name = value`.
fn builtin_object(args: &[Value]) -> Value {
    if !args.is_empty() {
        return Value::error(format!(
            "Wrong number of arguments to object. Got {}, want 0",
            args.len()
        ));
    }
    Value::Object(Rc::new(RefCell::new(AHashMap::new())))
}
