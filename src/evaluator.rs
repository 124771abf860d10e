// File: src/evaluator.rs
//
// Tree-walking evaluator for the Adder programming language.
// The slower sibling of the compiler/VM pipeline, sharing the same value
// model and operator semantics. Control flow travels as wrapper values
// (Return/Break/Continue) and runtime failures as Error values, both checked
// at statement boundaries.

use crate::ast::{Expression, Program, Statement};
use crate::builtins;
use crate::environment::{EnvId, Environments};
use crate::errors::AdderError;
use crate::value::{self, Class, Function, Instance, Method, Value};
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Evaluator {
    pub envs: Environments,
}

fn error_value(error: AdderError) -> Value {
    Value::error(error.message)
}

/// True for the values that cut evaluation short at a statement boundary.
fn is_flow(value: &Value) -> bool {
    matches!(
        value,
        Value::Return(_) | Value::Break | Value::Continue | Value::Error(_)
    )
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator { envs: Environments::new() }
    }

    /// Evaluate a program in the root environment, returning the value of
    /// its last statement (with any top-level `return` unwrapped).
    pub fn eval_program(&mut self, program: &Program) -> Value {
        let root = self.envs.root();
        let mut result = Value::Null;
        for statement in &program.statements {
            result = self.eval_statement(statement, root);
            match result {
                Value::Return(inner) => return *inner,
                Value::Error(_) => return result,
                _ => {}
            }
        }
        result
    }

    fn eval_statement(&mut self, statement: &Statement, env: EnvId) -> Value {
        match statement {
            Statement::Expr { expression } => self.eval_expression(expression, env),
            Statement::Block { statements } => {
                let inner = self.envs.push(env);
                self.eval_statements(statements, inner)
            }
            Statement::Let { name, value } => {
                let evaluated = self.eval_expression(value, env);
                if evaluated.is_error() {
                    return evaluated;
                }
                self.envs.declare(env, name, evaluated);
                Value::Null
            }
            Statement::Assign { target, value } => self.eval_assignment(target, value, env),
            Statement::Return { value } => {
                let evaluated = match value {
                    Some(expression) => self.eval_expression(expression, env),
                    None => Value::Null,
                };
                if evaluated.is_error() {
                    return evaluated;
                }
                Value::Return(Box::new(evaluated))
            }
            Statement::While { condition, body } => self.eval_while(condition, body, env),
            Statement::For { var, iterable, body } => self.eval_for(var, iterable, body, env),
            Statement::Break => Value::Break,
            Statement::Continue => Value::Continue,
            Statement::Class { name, constructor, methods } => {
                self.eval_class_definition(name, constructor.as_ref(), methods, env)
            }
        }
    }

    /// Evaluate statements in order; the block's value is its last
    /// statement's value unless control flow cuts it short.
    fn eval_statements(&mut self, statements: &[Statement], env: EnvId) -> Value {
        let mut result = Value::Null;
        for statement in statements {
            result = self.eval_statement(statement, env);
            if is_flow(&result) {
                return result;
            }
        }
        result
    }

    fn eval_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
        env: EnvId,
    ) -> Value {
        match target {
            Expression::Ident(name) => {
                let evaluated = self.eval_expression(value, env);
                if evaluated.is_error() {
                    return evaluated;
                }
                if !self.envs.assign(env, name, evaluated) {
                    return Value::error(format!("identifier not defined: {}", name));
                }
                Value::Null
            }
            Expression::Index { left, index } => {
                let target = self.eval_expression(left, env);
                if target.is_error() {
                    return target;
                }
                let index = self.eval_expression(index, env);
                if index.is_error() {
                    return index;
                }
                let evaluated = self.eval_expression(value, env);
                if evaluated.is_error() {
                    return evaluated;
                }
                match value::index_set(&target, &index, evaluated) {
                    Ok(()) => Value::Null,
                    Err(error) => error_value(error),
                }
            }
            Expression::Get { object, property } => {
                let target = self.eval_expression(object, env);
                if target.is_error() {
                    return target;
                }
                let evaluated = self.eval_expression(value, env);
                if evaluated.is_error() {
                    return evaluated;
                }
                match value::set_attribute(&target, property, evaluated) {
                    Ok(()) => Value::Null,
                    Err(error) => error_value(error),
                }
            }
            other => Value::error(format!("cannot assign to {}", other)),
        }
    }

    fn eval_while(&mut self, condition: &Expression, body: &Statement, env: EnvId) -> Value {
        loop {
            let cond = self.eval_expression(condition, env);
            if cond.is_error() {
                return cond;
            }
            if !cond.is_truthy() {
                break;
            }
            let result = self.eval_statement(body, env);
            match result {
                Value::Break => break,
                Value::Continue => continue,
                Value::Return(_) | Value::Error(_) => return result,
                _ => {}
            }
        }
        Value::Null
    }

    fn eval_for(
        &mut self,
        var: &str,
        iterable: &Expression,
        body: &Statement,
        env: EnvId,
    ) -> Value {
        let source = self.eval_expression(iterable, env);
        if source.is_error() {
            return source;
        }
        let iterator = match value::to_iterator(&source) {
            Ok(Value::Iterator(iterator)) => iterator,
            Ok(_) => unreachable!("to_iterator yields iterators"),
            Err(error) => return error_value(error),
        };

        loop {
            let next = iterator.borrow_mut().next();
            let Some(element) = next else { break };
            let inner = self.envs.push(env);
            self.envs.declare(inner, var, element);
            let result = self.eval_statement(body, inner);
            match result {
                Value::Break => break,
                Value::Continue => continue,
                Value::Return(_) | Value::Error(_) => return result,
                _ => {}
            }
        }
        Value::Null
    }

    fn eval_class_definition(
        &mut self,
        name: &str,
        constructor: Option<&Expression>,
        methods: &[(String, Expression)],
        env: EnvId,
    ) -> Value {
        fn make_function(function: &Expression, env: EnvId) -> Option<Rc<Function>> {
            if let Expression::FnLit { name, params, body } = function {
                Some(Rc::new(Function {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::new((**body).clone()),
                    env,
                }))
            } else {
                None
            }
        }

        let constructor = match constructor {
            Some(function) => match make_function(function, env) {
                some @ Some(_) => some,
                None => return Value::error("class constructor is not a function"),
            },
            None => None,
        };
        let mut compiled_methods = Vec::with_capacity(methods.len());
        for (method_name, function) in methods {
            match make_function(function, env) {
                Some(method) => compiled_methods.push((Rc::from(method_name.as_str()), method)),
                None => return Value::error("class method is not a function"),
            }
        }

        let class = Value::Class(Rc::new(Class {
            name: Rc::from(name),
            constructor,
            methods: compiled_methods,
        }));
        self.envs.declare(env, name, class);
        Value::Null
    }

    fn eval_expression(&mut self, expression: &Expression, env: EnvId) -> Value {
        match expression {
            Expression::IntLit(value) => Value::Int(*value),
            Expression::StrLit(value) => Value::str(value),
            Expression::BoolLit(value) => Value::Bool(*value),
            Expression::NullLit => Value::Null,
            Expression::Ident(name) => match self.envs.get(env, name) {
                Some(value) => value,
                None => match builtins::lookup(name) {
                    Some(builtin) => Value::Builtin(builtin),
                    None => Value::error(format!("identifier not defined: {}", name)),
                },
            },
            Expression::This => match self.envs.instance(env) {
                Some(instance) => instance,
                None => Value::error("'this' used outside of a bound method"),
            },
            Expression::Prefix { op, right } => {
                let operand = self.eval_expression(right, env);
                if operand.is_error() {
                    return operand;
                }
                match op.as_str() {
                    "-" => value::unary_minus(&operand).unwrap_or_else(error_value),
                    "!" | "not" => Value::Bool(!operand.is_truthy()),
                    other => Value::error(format!("unknown prefix operator: {}", other)),
                }
            }
            Expression::Infix { op, left, right } => self.eval_infix(op, left, right, env),
            Expression::ArrayLit(elements) => {
                let mut evaluated = Vec::with_capacity(elements.len());
                for element in elements {
                    let value = self.eval_expression(element, env);
                    if value.is_error() {
                        return value;
                    }
                    evaluated.push(value);
                }
                Value::array(evaluated)
            }
            Expression::HashLit(pairs) => self.eval_hash_literal(pairs, env),
            Expression::Index { left, index } => {
                let target = self.eval_expression(left, env);
                if target.is_error() {
                    return target;
                }
                let index = self.eval_expression(index, env);
                if index.is_error() {
                    return index;
                }
                value::index_get(&target, &index).unwrap_or_else(error_value)
            }
            Expression::Get { object, property } => {
                let target = self.eval_expression(object, env);
                if target.is_error() {
                    return target;
                }
                value::get_attribute(&target, property).unwrap_or_else(error_value)
            }
            Expression::If { branches, alternative } => {
                for (condition, block) in branches {
                    let cond = self.eval_expression(condition, env);
                    if cond.is_error() {
                        return cond;
                    }
                    if cond.is_truthy() {
                        return self.eval_statement(block, env);
                    }
                }
                match alternative {
                    Some(block) => self.eval_statement(block, env),
                    None => Value::Null,
                }
            }
            Expression::FnLit { name, params, body } => Value::Function(Rc::new(Function {
                name: name.clone(),
                params: params.clone(),
                body: Rc::new((**body).clone()),
                env,
            })),
            Expression::Call { function, arguments } => {
                let callee = self.eval_expression(function, env);
                if callee.is_error() {
                    return callee;
                }
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    let value = self.eval_expression(argument, env);
                    if value.is_error() {
                        return value;
                    }
                    args.push(value);
                }
                self.apply_function(callee, args)
            }
        }
    }

    fn eval_infix(
        &mut self,
        op: &str,
        left: &Expression,
        right: &Expression,
        env: EnvId,
    ) -> Value {
        // Logical operators short-circuit and always produce a boolean, the
        // same as the compiled jump chains.
        match op {
            "and" => {
                let l = self.eval_expression(left, env);
                if l.is_error() {
                    return l;
                }
                if !l.is_truthy() {
                    return Value::Bool(false);
                }
                let r = self.eval_expression(right, env);
                if r.is_error() {
                    return r;
                }
                return Value::Bool(r.is_truthy());
            }
            "or" => {
                let l = self.eval_expression(left, env);
                if l.is_error() {
                    return l;
                }
                if l.is_truthy() {
                    return Value::Bool(true);
                }
                let r = self.eval_expression(right, env);
                if r.is_error() {
                    return r;
                }
                return Value::Bool(r.is_truthy());
            }
            _ => {}
        }

        let l = self.eval_expression(left, env);
        if l.is_error() {
            return l;
        }
        let r = self.eval_expression(right, env);
        if r.is_error() {
            return r;
        }
        match op {
            "+" => value::binary_add(&l, &r).unwrap_or_else(error_value),
            "-" => value::binary_sub(&l, &r).unwrap_or_else(error_value),
            "*" => value::binary_mul(&l, &r).unwrap_or_else(error_value),
            "/" => value::binary_div(&l, &r).unwrap_or_else(error_value),
            "==" => Value::Bool(l == r),
            "!=" => Value::Bool(l != r),
            ">" => value::compare_gt(&l, &r).unwrap_or_else(error_value),
            ">=" => value::compare_gteq(&l, &r).unwrap_or_else(error_value),
            "<" => value::compare_gt(&r, &l).unwrap_or_else(error_value),
            "<=" => value::compare_gteq(&r, &l).unwrap_or_else(error_value),
            "in" => match value::contains(&r, &l) {
                Ok(found) => Value::Bool(found),
                Err(error) => error_value(error),
            },
            "notin" => match value::contains(&r, &l) {
                Ok(found) => Value::Bool(!found),
                Err(error) => error_value(error),
            },
            other => Value::error(format!("unknown infix operator: {}", other)),
        }
    }

    fn eval_hash_literal(&mut self, pairs: &[(Expression, Expression)], env: EnvId) -> Value {
        // Same evaluation order as the compiler: keys sorted by their
        // rendered form, so both engines build identical hashes.
        let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
        sorted.sort_by_key(|(key, _)| key.to_string());

        let mut data = value::HashData::default();
        for (key_expr, value_expr) in sorted {
            let key = self.eval_expression(key_expr, env);
            if key.is_error() {
                return key;
            }
            let value = self.eval_expression(value_expr, env);
            if value.is_error() {
                return value;
            }
            let Some(hash_key) = key.hash_key() else {
                return Value::error(format!("unhashable key: {}", key.type_name()));
            };
            data.pairs.insert(hash_key, value::HashPair { key, value });
        }
        Value::Hash(Rc::new(RefCell::new(data)))
    }

    fn apply_function(&mut self, callee: Value, args: Vec<Value>) -> Value {
        match callee {
            Value::Function(function) => self.call_function(&function, None, args),
            Value::Method(method) => {
                self.call_function(&method.function, Some(method.instance.clone()), args)
            }
            Value::Builtin(builtin) => (builtin.func)(&args),
            Value::BuiltinMethod(method) => (method.func)(&method.receiver, &args),
            Value::Class(class) => self.instantiate_class(&class, args),
            other => Value::error(format!("cannot call {}", other.type_name())),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        instance: Option<Value>,
        args: Vec<Value>,
    ) -> Value {
        if args.len() != function.params.len() {
            return Value::error(format!(
                "wrong number of arguments: want {}, got {}",
                function.params.len(),
                args.len()
            ));
        }
        let fn_env = match instance {
            Some(instance) => self.envs.push_bound(function.env, instance),
            None => self.envs.push(function.env),
        };
        for (param, arg) in function.params.iter().zip(args) {
            self.envs.declare(fn_env, param, arg);
        }
        let body = Rc::clone(&function.body);
        let result = self.eval_statement(&body, fn_env);
        match result {
            Value::Return(inner) => *inner,
            Value::Break | Value::Continue => Value::error("break/continue outside of a loop"),
            other => other,
        }
    }

    fn instantiate_class(&mut self, class: &Rc<Class>, args: Vec<Value>) -> Value {
        let instance = Value::Instance(Rc::new(RefCell::new(Instance {
            class_name: Rc::clone(&class.name),
            attributes: AHashMap::new(),
        })));
        if let Value::Instance(data) = &instance {
            let mut data = data.borrow_mut();
            for (name, function) in &class.methods {
                let bound = Value::Method(Rc::new(Method {
                    instance: instance.clone(),
                    function: Rc::clone(function),
                }));
                data.attributes.insert(name.to_string(), bound);
            }
        }

        match &class.constructor {
            Some(constructor) => {
                let result =
                    self.call_function(constructor, Some(instance.clone()), args);
                if result.is_error() {
                    return result;
                }
                instance
            }
            None => {
                if !args.is_empty() {
                    return Value::error(format!(
                        "{} has no constructor but got {} arguments",
                        class.name,
                        args.len()
                    ));
                }
                instance
            }
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
