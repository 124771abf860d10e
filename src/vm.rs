// File: src/vm.rs
//
// Stack-based virtual machine for the Adder programming language.
// Executes the compiler's bytecode with three frame kinds: function frames
// created by calls, block frames giving `if` bodies their own local slots,
// and loop frames that `break`/`continue` unwind to. All bounds are hard
// limits surfaced as runtime errors.

use crate::builtins::BUILTINS;
use crate::bytecode::{read_u16, read_u8, Bytecode, Op};
use crate::errors::{AdderError, ErrorKind};
use crate::value::{
    self, Closure, CompiledClass, CompiledFunction, HashData, HashPair, Instance, Value,
};
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

pub const STACK_SIZE: usize = 2048;
pub const MAX_FRAMES: usize = 1024;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_CLASS_DEFS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Function,
    Block,
    Loop,
}

/// An activation record: the closure being executed, its instruction
/// pointer, and where its locals start on the value stack.
struct Frame {
    kind: FrameKind,
    closure: Rc<Closure>,
    ip: usize,
    base_pointer: usize,
}

/// VM state that a REPL threads across inputs so bindings and class
/// definitions persist.
pub struct VmState {
    pub globals: Vec<Value>,
    pub class_defs: Vec<Option<Rc<CompiledClass>>>,
}

impl VmState {
    pub fn new() -> Self {
        VmState { globals: vec![Value::Null; GLOBALS_SIZE], class_defs: vec![None; MAX_CLASS_DEFS] }
    }
}

impl Default for VmState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct VM {
    constants: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
    class_defs: Vec<Option<Rc<CompiledClass>>>,
    last_popped: Value,
    halted: bool,
}

impl VM {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_state(bytecode, VmState::new())
    }

    pub fn with_state(bytecode: Bytecode, state: VmState) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure::new(main_function, Vec::new()));
        VM {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals: state.globals,
            frames: vec![Frame {
                kind: FrameKind::Function,
                closure: main_closure,
                ip: 0,
                base_pointer: 0,
            }],
            class_defs: state.class_defs,
            last_popped: Value::Null,
            halted: false,
        }
    }

    pub fn into_state(self) -> VmState {
        VmState { globals: self.globals, class_defs: self.class_defs }
    }

    /// The value most recently discarded by `Pop`; what a REPL echoes.
    pub fn last_popped(&self) -> &Value {
        &self.last_popped
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn global(&self, index: usize) -> &Value {
        &self.globals[index]
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn operand_u16(&self, position: usize) -> usize {
        read_u16(&self.current_frame().closure.function.instructions, position)
    }

    fn operand_u8(&self, position: usize) -> usize {
        read_u8(&self.current_frame().closure.function.instructions, position)
    }

    fn advance_ip(&mut self, by: usize) {
        self.current_frame_mut().ip += by;
    }

    fn set_ip(&mut self, target: usize) {
        self.current_frame_mut().ip = target;
    }

    pub fn run(&mut self) -> Result<(), AdderError> {
        while !self.halted {
            let (op, ip) = {
                let frame = self.current_frame();
                let instructions = &frame.closure.function.instructions;
                if frame.ip >= instructions.len() {
                    break;
                }
                let byte = instructions[frame.ip];
                let op = Op::from_byte(byte).ok_or_else(|| {
                    AdderError::runtime(
                        ErrorKind::InvalidBytecode,
                        format!("unknown opcode 0x{:02X}", byte),
                    )
                })?;
                (op, frame.ip)
            };

            match op {
                Op::Constant => {
                    let index = self.operand_u16(ip + 1);
                    self.advance_ip(3);
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }
                Op::Pop => {
                    self.advance_ip(1);
                    self.last_popped = self.pop();
                }
                Op::Add => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    let result = value::binary_add(&left, &right)?;
                    self.push(result)?;
                }
                Op::Sub => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    let result = value::binary_sub(&left, &right)?;
                    self.push(result)?;
                }
                Op::Mul => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    let result = value::binary_mul(&left, &right)?;
                    self.push(result)?;
                }
                Op::Div => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    let result = value::binary_div(&left, &right)?;
                    self.push(result)?;
                }
                Op::True => {
                    self.advance_ip(1);
                    self.push(Value::Bool(true))?;
                }
                Op::False => {
                    self.advance_ip(1);
                    self.push(Value::Bool(false))?;
                }
                Op::Null => {
                    self.advance_ip(1);
                    self.push(Value::Null)?;
                }
                Op::Eq => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    self.push(Value::Bool(left == right))?;
                }
                Op::NotEq => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    self.push(Value::Bool(left != right))?;
                }
                Op::Gt => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    let result = value::compare_gt(&left, &right)?;
                    self.push(result)?;
                }
                Op::GtEq => {
                    self.advance_ip(1);
                    let (left, right) = self.pop_pair();
                    let result = value::compare_gteq(&left, &right)?;
                    self.push(result)?;
                }
                Op::Minus => {
                    self.advance_ip(1);
                    let operand = self.pop();
                    let result = value::unary_minus(&operand)?;
                    self.push(result)?;
                }
                Op::Not => {
                    self.advance_ip(1);
                    let operand = self.pop();
                    self.push(Value::Bool(!operand.is_truthy()))?;
                }
                Op::Jump => {
                    let target = self.operand_u16(ip + 1);
                    self.set_ip(target);
                }
                Op::JumpNotTrue => {
                    let target = self.operand_u16(ip + 1);
                    self.advance_ip(3);
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.set_ip(target);
                    }
                }
                Op::GetGlobal => {
                    let index = self.operand_u16(ip + 1);
                    self.advance_ip(3);
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                Op::SetGlobal => {
                    let index = self.operand_u16(ip + 1);
                    self.advance_ip(3);
                    self.globals[index] = self.pop();
                }
                Op::Array => {
                    let count = self.operand_u16(ip + 1);
                    self.advance_ip(3);
                    let elements = self.take_top(count)?;
                    self.push(Value::array(elements))?;
                }
                Op::Hash => {
                    let count = self.operand_u16(ip + 1);
                    self.advance_ip(3);
                    if count % 2 != 0 {
                        return Err(AdderError::runtime(
                            ErrorKind::InvalidBytecode,
                            "hash construction needs an even number of slots",
                        ));
                    }
                    let values = self.take_top(count)?;
                    let hash = self.build_hash(values)?;
                    self.push(hash)?;
                }
                Op::Index => {
                    self.advance_ip(1);
                    let index = self.pop();
                    let left = self.pop();
                    let result = value::index_get(&left, &index)?;
                    self.push(result)?;
                }
                Op::SetIndex => {
                    self.advance_ip(1);
                    let new_value = self.pop();
                    let index = self.pop();
                    let target = self.pop();
                    value::index_set(&target, &index, new_value)?;
                }
                Op::GetAttr => {
                    self.advance_ip(1);
                    let name = self.pop_attribute_name()?;
                    let target = self.pop();
                    let result = value::get_attribute(&target, &name)?;
                    self.push(result)?;
                }
                Op::SetAttr => {
                    self.advance_ip(1);
                    let new_value = self.pop();
                    let name = self.pop_attribute_name()?;
                    let target = self.pop();
                    value::set_attribute(&target, &name, new_value)?;
                }
                Op::GetInstance => {
                    self.advance_ip(1);
                    let instance = self
                        .frames
                        .iter()
                        .rev()
                        .find_map(|frame| frame.closure.instance.clone())
                        .ok_or_else(|| {
                            AdderError::runtime(
                                ErrorKind::NoBoundInstance,
                                "'this' used outside of a bound method",
                            )
                        })?;
                    self.push(instance)?;
                }
                Op::Call => {
                    let argc = self.operand_u8(ip + 1);
                    self.advance_ip(2);
                    self.execute_call(argc)?;
                }
                Op::BlockCall => {
                    self.advance_ip(1);
                    let callee = self.pop();
                    let Value::Closure(closure) = callee else {
                        return Err(AdderError::runtime(
                            ErrorKind::NotCallable,
                            format!("cannot enter block: {}", callee.type_name()),
                        ));
                    };
                    let base_pointer = self.sp;
                    self.push_frame(FrameKind::Block, closure, base_pointer)?;
                }
                Op::LoopCall => {
                    let argc = self.operand_u8(ip + 1);
                    self.advance_ip(2);
                    let callee = self.stack[self.sp - 1 - argc].clone();
                    let Value::Closure(closure) = callee else {
                        return Err(AdderError::runtime(
                            ErrorKind::NotCallable,
                            format!("cannot enter loop: {}", callee.type_name()),
                        ));
                    };
                    if argc != closure.function.num_parameters {
                        return Err(AdderError::runtime(
                            ErrorKind::ArityMismatch,
                            format!(
                                "loop frame expects {} arguments, got {}",
                                closure.function.num_parameters, argc
                            ),
                        ));
                    }
                    let base_pointer = self.sp - argc;
                    self.push_frame(FrameKind::Loop, closure, base_pointer)?;
                }
                Op::ReturnValue => {
                    self.execute_return()?;
                }
                Op::BlockReturn => {
                    let result = self.pop();
                    let frame = self
                        .frames
                        .pop()
                        .expect("block return with no frame to pop");
                    self.sp = frame.base_pointer;
                    self.push(result)?;
                }
                Op::Continue => {
                    self.unwind_to_loop(false)?;
                }
                Op::Break => {
                    self.unwind_to_loop(true)?;
                }
                Op::Iter => {
                    self.advance_ip(1);
                    let source = self.pop();
                    let iterator = value::to_iterator(&source)?;
                    self.push(iterator)?;
                }
                Op::IterHasNext => {
                    self.advance_ip(1);
                    let iterator = self.pop_iterator()?;
                    let has_next = iterator.borrow().has_next();
                    self.push(Value::Bool(has_next))?;
                }
                Op::IterNext => {
                    self.advance_ip(1);
                    let iterator = self.pop_iterator()?;
                    let next = iterator.borrow_mut().next();
                    match next {
                        Some(element) => self.push(element)?,
                        None => {
                            return Err(AdderError::runtime(
                                ErrorKind::IteratorExhausted,
                                "iterator advanced past its end",
                            ))
                        }
                    }
                }
                Op::GetBuiltin => {
                    let index = self.operand_u8(ip + 1);
                    self.advance_ip(2);
                    self.push(Value::Builtin(&BUILTINS[index]))?;
                }
                Op::Closure => {
                    let const_index = self.operand_u16(ip + 1);
                    let num_free = self.operand_u8(ip + 3);
                    self.advance_ip(4);
                    let Value::CompiledFunction(function) = self.constants[const_index].clone()
                    else {
                        return Err(AdderError::runtime(
                            ErrorKind::InvalidBytecode,
                            "closure constant is not a compiled function",
                        ));
                    };
                    let free = self.take_top(num_free)?;
                    self.push(Value::Closure(Rc::new(Closure::new(function, free))))?;
                }
                Op::GetFree => {
                    let index = self.operand_u8(ip + 1);
                    self.advance_ip(2);
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }
                Op::CurrentClosure => {
                    self.advance_ip(1);
                    let closure = Rc::clone(&self.current_frame().closure);
                    self.push(Value::Closure(closure))?;
                }
                Op::GetLocal => {
                    let index = self.operand_u8(ip + 1);
                    self.advance_ip(2);
                    let value = self.stack[self.current_frame().base_pointer + index].clone();
                    self.push(value)?;
                }
                Op::SetLocal => {
                    let index = self.operand_u8(ip + 1);
                    self.advance_ip(2);
                    let slot = self.current_frame().base_pointer + index;
                    self.stack[slot] = self.pop();
                }
                Op::GetBlock => {
                    let depth = self.operand_u16(ip + 1);
                    let index = self.operand_u16(ip + 3);
                    self.advance_ip(5);
                    let slot = self.block_slot(depth, index)?;
                    let value = self.stack[slot].clone();
                    self.push(value)?;
                }
                Op::SetBlock => {
                    let depth = self.operand_u16(ip + 1);
                    let index = self.operand_u16(ip + 3);
                    self.advance_ip(5);
                    let slot = self.block_slot(depth, index)?;
                    self.stack[slot] = self.pop();
                }
                Op::DefClass => {
                    let class_index = self.operand_u16(ip + 1);
                    let nctor = self.operand_u16(ip + 3);
                    let nmethods = self.operand_u16(ip + 5);
                    self.advance_ip(7);
                    self.define_class(class_index, nctor, nmethods)?;
                }
                Op::GetClass => {
                    let class_index = self.operand_u16(ip + 1);
                    self.advance_ip(3);
                    let class = self.class_defs[class_index].clone().ok_or_else(|| {
                        AdderError::runtime(
                            ErrorKind::UnknownIdentifier,
                            "class used before its definition was executed",
                        )
                    })?;
                    self.push(Value::CompiledClass(class))?;
                }
                Op::Contains => {
                    self.advance_ip(1);
                    let container = self.pop();
                    let candidate = self.pop();
                    let result = value::contains(&container, &candidate)?;
                    self.push(Value::Bool(result))?;
                }
            }
        }
        Ok(())
    }

    // --- dispatch helpers ---

    fn execute_call(&mut self, argc: usize) -> Result<(), AdderError> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        match callee {
            Value::Closure(closure) => {
                if argc != closure.function.num_parameters {
                    return Err(AdderError::runtime(
                        ErrorKind::ArityMismatch,
                        format!(
                            "wrong number of arguments: want {}, got {}",
                            closure.function.num_parameters, argc
                        ),
                    ));
                }
                let base_pointer = self.sp - argc;
                self.push_frame(FrameKind::Function, closure, base_pointer)
            }
            Value::Builtin(builtin) => {
                let args = self.stack[self.sp - argc..self.sp].to_vec();
                let result = (builtin.func)(&args);
                self.sp -= argc + 1;
                self.push(result)
            }
            Value::BuiltinMethod(method) => {
                let args = self.stack[self.sp - argc..self.sp].to_vec();
                let result = (method.func)(&method.receiver, &args);
                self.sp -= argc + 1;
                self.push(result)
            }
            Value::CompiledClass(class) => self.instantiate_class(class, argc),
            other => Err(AdderError::runtime(
                ErrorKind::NotCallable,
                format!("cannot call {}", other.type_name()),
            )),
        }
    }

    /// Create an instance, bind every method closure to it, then run the
    /// bound constructor (if any) as a function call whose return value is
    /// the instance itself.
    fn instantiate_class(
        &mut self,
        class: Rc<CompiledClass>,
        argc: usize,
    ) -> Result<(), AdderError> {
        let instance = Value::Instance(Rc::new(RefCell::new(Instance {
            class_name: Rc::clone(&class.name),
            attributes: AHashMap::new(),
        })));
        if let Value::Instance(data) = &instance {
            let mut data = data.borrow_mut();
            for (name, method) in &class.methods {
                let bound = Value::Closure(Rc::new(method.bind(instance.clone(), false)));
                data.attributes.insert(name.to_string(), bound);
            }
        }

        match &class.constructor {
            Some(constructor) => {
                if argc != constructor.function.num_parameters {
                    return Err(AdderError::runtime(
                        ErrorKind::ArityMismatch,
                        format!(
                            "constructor of {} takes {} arguments, got {}",
                            class.name, constructor.function.num_parameters, argc
                        ),
                    ));
                }
                let bound = Rc::new(constructor.bind(instance, true));
                let base_pointer = self.sp - argc;
                self.push_frame(FrameKind::Function, bound, base_pointer)
            }
            None => {
                if argc != 0 {
                    return Err(AdderError::runtime(
                        ErrorKind::ArityMismatch,
                        format!("{} has no constructor but got {} arguments", class.name, argc),
                    ));
                }
                self.sp -= argc + 1;
                self.push(instance)
            }
        }
    }

    fn push_frame(
        &mut self,
        kind: FrameKind,
        closure: Rc<Closure>,
        base_pointer: usize,
    ) -> Result<(), AdderError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(AdderError::runtime(
                ErrorKind::FrameOverflow,
                format!("frame stack exceeded {} frames", MAX_FRAMES),
            ));
        }
        let num_locals = closure.function.num_locals;
        if base_pointer + num_locals > STACK_SIZE {
            return Err(AdderError::runtime(ErrorKind::StackOverflow, "value stack exhausted"));
        }
        self.frames.push(Frame { kind, closure, ip: 0, base_pointer });
        self.sp = base_pointer + num_locals;
        Ok(())
    }

    /// `ReturnValue`: unwind block/loop frames until the innermost function
    /// frame, rewind the stack below its callee slot, and push the result
    /// (or the bound instance when the frame was a constructor).
    fn execute_return(&mut self) -> Result<(), AdderError> {
        let result = self.pop();
        loop {
            let frame = self.frames.pop().ok_or_else(|| {
                AdderError::runtime(ErrorKind::Runtime, "return with no active frame")
            })?;
            if frame.kind != FrameKind::Function {
                continue;
            }
            if self.frames.is_empty() {
                // Top-level `return` halts the program.
                self.sp = 0;
                self.last_popped = result;
                self.halted = true;
                return Ok(());
            }
            self.sp = frame.base_pointer - 1;
            let value = if frame.closure.is_constructor {
                frame.closure.instance.clone().ok_or_else(|| {
                    AdderError::runtime(ErrorKind::Runtime, "constructor frame without instance")
                })?
            } else {
                result
            };
            return self.push(value);
        }
    }

    /// `Break`/`Continue`: unwind to the nearest loop frame. `break`
    /// additionally skips the jump-back-to-start the compiler emits right
    /// after `LoopCall`, leaving the loop for good.
    fn unwind_to_loop(&mut self, is_break: bool) -> Result<(), AdderError> {
        loop {
            let frame = self.frames.pop().ok_or_else(|| {
                AdderError::runtime(ErrorKind::IllegalLoopJump, "break/continue outside of a loop")
            })?;
            match frame.kind {
                FrameKind::Loop => {
                    self.sp = frame.base_pointer - 1;
                    break;
                }
                FrameKind::Block => continue,
                FrameKind::Function => {
                    return Err(AdderError::runtime(
                        ErrorKind::IllegalLoopJump,
                        "break/continue outside of a loop",
                    ));
                }
            }
        }
        if is_break {
            // Skip the compiler-emitted Jump back to the loop condition.
            self.current_frame_mut().ip += 3;
        }
        Ok(())
    }

    fn define_class(
        &mut self,
        class_index: usize,
        nctor: usize,
        nmethods: usize,
    ) -> Result<(), AdderError> {
        if class_index >= MAX_CLASS_DEFS {
            return Err(AdderError::runtime(
                ErrorKind::InvalidBytecode,
                format!("class index {} out of range", class_index),
            ));
        }
        let Value::Str(name) = self.pop() else {
            return Err(AdderError::runtime(
                ErrorKind::InvalidBytecode,
                "class definition missing its name",
            ));
        };
        let constructor = if nctor == 1 {
            match self.pop() {
                Value::Closure(closure) => Some(closure),
                other => {
                    return Err(AdderError::runtime(
                        ErrorKind::InvalidBytecode,
                        format!("class constructor is {}", other.type_name()),
                    ))
                }
            }
        } else {
            None
        };
        let mut methods = Vec::with_capacity(nmethods);
        for _ in 0..nmethods {
            let Value::Closure(closure) = self.pop() else {
                return Err(AdderError::runtime(
                    ErrorKind::InvalidBytecode,
                    "class method is not a closure",
                ));
            };
            let Value::Str(method_name) = self.pop() else {
                return Err(AdderError::runtime(
                    ErrorKind::InvalidBytecode,
                    "class method missing its name",
                ));
            };
            methods.push((method_name, closure));
        }
        methods.reverse();
        self.class_defs[class_index] =
            Some(Rc::new(CompiledClass { name, constructor, methods }));
        Ok(())
    }

    fn block_slot(&self, depth: usize, index: usize) -> Result<usize, AdderError> {
        if depth >= self.frames.len() {
            return Err(AdderError::runtime(
                ErrorKind::InvalidBytecode,
                format!("block depth {} exceeds frame stack", depth),
            ));
        }
        let frame = &self.frames[self.frames.len() - 1 - depth];
        Ok(frame.base_pointer + index)
    }

    fn build_hash(&mut self, values: Vec<Value>) -> Result<Value, AdderError> {
        let mut data = HashData::default();
        for pair in values.chunks(2) {
            let key = pair[0].clone();
            let value = pair[1].clone();
            let hash_key = key.hash_key().ok_or_else(|| {
                AdderError::runtime(
                    ErrorKind::UnhashableKey,
                    format!("unhashable key: {}", key.type_name()),
                )
            })?;
            data.pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(Rc::new(RefCell::new(data))))
    }

    fn pop_attribute_name(&mut self) -> Result<Rc<str>, AdderError> {
        match self.pop() {
            Value::Str(name) => Ok(name),
            other => Err(AdderError::runtime(
                ErrorKind::TypeMismatch,
                format!("attribute name must be string, got {}", other.type_name()),
            )),
        }
    }

    fn pop_iterator(&mut self) -> Result<Rc<RefCell<value::IteratorValue>>, AdderError> {
        match self.pop() {
            Value::Iterator(iterator) => Ok(iterator),
            other => Err(AdderError::runtime(
                ErrorKind::NotIterable,
                format!("expected iterator, got {}", other.type_name()),
            )),
        }
    }

    // --- stack primitives ---

    fn push(&mut self, value: Value) -> Result<(), AdderError> {
        if self.sp >= STACK_SIZE {
            return Err(AdderError::runtime(ErrorKind::StackOverflow, "value stack exhausted"));
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        // Compiled code never pops an empty stack; replacing with Null keeps
        // reference counts honest.
        self.sp -= 1;
        std::mem::replace(&mut self.stack[self.sp], Value::Null)
    }

    fn pop_pair(&mut self) -> (Value, Value) {
        let right = self.pop();
        let left = self.pop();
        (left, right)
    }

    /// Remove and return the top `count` values, oldest first.
    fn take_top(&mut self, count: usize) -> Result<Vec<Value>, AdderError> {
        if count > self.sp {
            return Err(AdderError::runtime(
                ErrorKind::InvalidBytecode,
                "instruction consumes more stack slots than exist",
            ));
        }
        let mut values = Vec::with_capacity(count);
        for slot in self.sp - count..self.sp {
            values.push(std::mem::replace(&mut self.stack[slot], Value::Null));
        }
        self.sp -= count;
        Ok(values)
    }
}
