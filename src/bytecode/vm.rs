use log::trace;
use thiserror::Error;

use crate::{
    common::quote,
    evaluator::{normalize_index, normalize_slice, EvalError, Pairs, PanicKind},
};

use super::{
    code::{read_u16, Opcode},
    compiler::Bytecode,
    value::{RangeIter, Value},
};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("internal error: unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("internal error: {0}")]
    Internal(String),
    /// Runtime panics, reported like the evaluator does.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl VmError {
    pub fn panic_kind(&self) -> Option<PanicKind> {
        match self {
            VmError::Eval(err) => err.panic_kind(),
            _ => None,
        }
    }
}

fn internal(message: impl Into<String>) -> VmError {
    VmError::Internal(message.into())
}

fn type_error(expected: &str, found: &Value) -> VmError {
    internal(format!("expected {}, found {}", expected, found.type_name()))
}

pub struct Vm {
    constants: Vec<Value>,
    globals: Vec<Value>,
    instructions: Vec<u8>,
    stack: Vec<Value>,
    /// Next free slot; the top of the stack is `stack[sp - 1]`.
    sp: usize,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Vm {
            constants: bytecode.constants,
            globals: vec![Value::None; GLOBALS_SIZE],
            instructions: bytecode.instructions.0,
            stack: vec![Value::None; STACK_SIZE],
            sp: 0,
        }
    }

    /// The value most recently popped off the stack.
    pub fn last_popped(&self) -> Option<&Value> {
        self.stack.get(self.sp)
    }

    pub fn global(&self, index: usize) -> Option<&Value> {
        self.globals.get(index)
    }

    pub fn run(&mut self) -> Result<(), VmError> {
        let mut ip = 0;
        while ip < self.instructions.len() {
            let byte = self.instructions[ip];
            let op = Opcode::from_byte(byte).ok_or(VmError::UnknownOpcode(byte))?;
            trace!("{:04} {}", ip, op);
            let operand = read_u16(&self.instructions, ip + 1);
            let operand2 = read_u16(&self.instructions, ip + 3);
            ip += op.len();

            match op {
                Opcode::Constant => {
                    let value = self
                        .constants
                        .get(operand)
                        .cloned()
                        .ok_or_else(|| internal(format!("no constant {}", operand)))?;
                    self.push(value)?;
                }
                Opcode::GetGlobal => {
                    let value = self
                        .globals
                        .get(operand)
                        .cloned()
                        .ok_or_else(|| internal(format!("no global {}", operand)))?;
                    self.push(value)?;
                }
                Opcode::SetGlobal => {
                    let value = self.pop()?;
                    match self.globals.get_mut(operand) {
                        Some(slot) => *slot = value,
                        None => return Err(internal(format!("no global {}", operand))),
                    }
                }
                Opcode::Drop => {
                    self.sp = self
                        .sp
                        .checked_sub(operand)
                        .ok_or_else(|| internal("stack underflow"))?;
                }
                Opcode::Add
                | Opcode::Subtract
                | Opcode::Multiply
                | Opcode::Divide
                | Opcode::Modulo => {
                    let right = self.pop_num()?;
                    let left = self.pop_num()?;
                    self.push(Value::Num(arithmetic(op, left, right)))?;
                }
                Opcode::True => self.push(Value::Bool(true))?,
                Opcode::False => self.push(Value::Bool(false))?,
                Opcode::None => self.push(Value::None)?,
                Opcode::Not => {
                    let b = self.pop_bool()?;
                    self.push(Value::Bool(!b))?;
                }
                Opcode::Minus => {
                    let n = self.pop_num()?;
                    self.push(Value::Num(-n))?;
                }
                Opcode::Equal | Opcode::NotEqual => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let equal = left == right;
                    self.push(Value::Bool(if op == Opcode::Equal { equal } else { !equal }))?;
                }
                Opcode::NumLess
                | Opcode::NumLessEqual
                | Opcode::NumGreater
                | Opcode::NumGreaterEqual => {
                    let right = self.pop_num()?;
                    let left = self.pop_num()?;
                    let result = match op {
                        Opcode::NumLess => left < right,
                        Opcode::NumLessEqual => left <= right,
                        Opcode::NumGreater => left > right,
                        _ => left >= right,
                    };
                    self.push(Value::Bool(result))?;
                }
                Opcode::StringLess
                | Opcode::StringLessEqual
                | Opcode::StringGreater
                | Opcode::StringGreaterEqual => {
                    let right = self.pop_string()?;
                    let left = self.pop_string()?;
                    let result = match op {
                        Opcode::StringLess => left < right,
                        Opcode::StringLessEqual => left <= right,
                        Opcode::StringGreater => left > right,
                        _ => left >= right,
                    };
                    self.push(Value::Bool(result))?;
                }
                Opcode::StringConcatenate => {
                    let right = self.pop_string()?;
                    let left = self.pop_string()?;
                    self.push(Value::String(left + &right))?;
                }
                Opcode::Array => {
                    let elements = self.pop_n(operand)?;
                    self.push(Value::array(elements))?;
                }
                Opcode::ArrayConcatenate => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    let (Value::Array(left), Value::Array(right)) = (&left, &right) else {
                        return Err(type_error("arrays", &left));
                    };
                    let mut elements = left.borrow().clone();
                    elements.extend(right.borrow().iter().cloned());
                    self.push(Value::array(elements))?;
                }
                Opcode::Map => {
                    let mut pairs = Pairs::default();
                    let mut entries = self.pop_n(operand)?.into_iter();
                    while let (Some(key), Some(value)) = (entries.next(), entries.next()) {
                        match key {
                            Value::String(key) => pairs.insert(key, value),
                            key => return Err(type_error("string key", &key)),
                        }
                    }
                    self.push(Value::map(pairs))?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.push(index_value(&left, &index)?)?;
                }
                Opcode::SetIndex => {
                    let index = self.pop()?;
                    let container = self.pop()?;
                    let value = self.pop()?;
                    set_index(&container, index, value)?;
                }
                Opcode::Slice => {
                    let end = self.pop_bound()?;
                    let start = self.pop_bound()?;
                    let left = self.pop()?;
                    self.push(slice(&left, start, end)?)?;
                }
                Opcode::Jump => ip = operand,
                Opcode::JumpNotTruthy => {
                    if !self.pop_bool()? {
                        ip = operand;
                    }
                }
                Opcode::StepRange => {
                    let step = self.pop_bound()?.unwrap_or(1.0);
                    let stop = self.pop_num()?;
                    let start = self.pop_bound()?.unwrap_or(0.0);
                    if step == 0.0 {
                        let detail = "step cannot be 0, infinite loop";
                        return Err(EvalError::panic(PanicKind::RangeValue, detail).into());
                    }
                    let range = RangeIter::Step {
                        next: start,
                        stop,
                        step,
                    };
                    self.push(Value::Range(Box::new(range)))?;
                }
                Opcode::IterRange => match self.next_in_range()? {
                    Some(value) => {
                        if operand != 0 {
                            self.push(value)?;
                        }
                    }
                    None => {
                        self.pop()?;
                        ip = operand2;
                    }
                },
            }
        }
        Ok(())
    }

    /// Advances the iterator on top of the stack, creating it from the
    /// ranged over value on the first call.
    fn next_in_range(&mut self) -> Result<Option<Value>, VmError> {
        let top = self.top_mut()?;
        if !matches!(top, Value::Range(_)) {
            let iter = RangeIter::over(top).ok_or_else(|| type_error("range", top))?;
            *top = Value::Range(Box::new(iter));
        }
        match top {
            Value::Range(iter) => Ok(iter.next()),
            _ => Ok(None),
        }
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        let slot = self.stack.get_mut(self.sp).ok_or(VmError::StackOverflow)?;
        *slot = value;
        self.sp += 1;
        Ok(())
    }

    /// Pops the top of the stack, leaving a copy behind for
    /// [`Vm::last_popped`].
    fn pop(&mut self) -> Result<Value, VmError> {
        self.sp = self
            .sp
            .checked_sub(1)
            .ok_or_else(|| internal("stack underflow"))?;
        Ok(self.stack[self.sp].clone())
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        let start = self
            .sp
            .checked_sub(n)
            .ok_or_else(|| internal("stack underflow"))?;
        let values = self.stack[start..self.sp].to_vec();
        self.sp = start;
        Ok(values)
    }

    fn top_mut(&mut self) -> Result<&mut Value, VmError> {
        match self.sp.checked_sub(1) {
            Some(top) => Ok(&mut self.stack[top]),
            None => Err(internal("stack underflow")),
        }
    }

    fn pop_num(&mut self) -> Result<f64, VmError> {
        match self.pop()? {
            Value::Num(n) => Ok(n),
            v => Err(type_error("num", &v)),
        }
    }

    fn pop_bool(&mut self) -> Result<bool, VmError> {
        match self.pop()? {
            Value::Bool(b) => Ok(b),
            v => Err(type_error("bool", &v)),
        }
    }

    fn pop_string(&mut self) -> Result<String, VmError> {
        match self.pop()? {
            Value::String(s) => Ok(s),
            v => Err(type_error("string", &v)),
        }
    }

    /// Pops an optional number pushed as `None` when omitted.
    fn pop_bound(&mut self) -> Result<Option<f64>, VmError> {
        match self.pop()? {
            Value::None => Ok(None),
            Value::Num(n) => Ok(Some(n)),
            v => Err(type_error("num", &v)),
        }
    }
}

fn arithmetic(op: Opcode, left: f64, right: f64) -> f64 {
    match op {
        Opcode::Add => left + right,
        Opcode::Subtract => left - right,
        Opcode::Multiply => left * right,
        Opcode::Divide => left / right,
        _ => left % right,
    }
}

fn index_value(left: &Value, index: &Value) -> Result<Value, VmError> {
    match (left, index) {
        (Value::Array(elements), Value::Num(i)) => {
            let elements = elements.borrow();
            let i = normalize_index(*i, elements.len(), false)?;
            Ok(elements[i].clone())
        }
        (Value::String(s), Value::Num(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(*i, chars.len(), false)?;
            Ok(Value::String(chars[i].to_string()))
        }
        (Value::Map(pairs), Value::String(key)) => match pairs.borrow().get(key) {
            Some(value) => Ok(value.clone()),
            None => Err(EvalError::panic(PanicKind::MapKey, quote(key)).into()),
        },
        (left, _) => Err(type_error("array, string or map", left)),
    }
}

fn set_index(container: &Value, index: Value, value: Value) -> Result<(), VmError> {
    match (container, index) {
        (Value::Array(elements), Value::Num(i)) => {
            let mut elements = elements.borrow_mut();
            let i = normalize_index(i, elements.len(), false)?;
            elements[i] = value;
            Ok(())
        }
        (Value::Map(pairs), Value::String(key)) => {
            pairs.borrow_mut().insert(key, value);
            Ok(())
        }
        (container, _) => Err(type_error("array or map", container)),
    }
}

fn slice(left: &Value, start: Option<f64>, end: Option<f64>) -> Result<Value, VmError> {
    match left {
        Value::Array(elements) => {
            let elements = elements.borrow();
            let (start, end) = normalize_slice(start, end, elements.len())?;
            Ok(Value::array(elements[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = normalize_slice(start, end, chars.len())?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        left => Err(type_error("array or string", left)),
    }
}
