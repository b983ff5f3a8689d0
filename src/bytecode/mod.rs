//! Compiles a subset of Evy to bytecode and runs it on a stack machine.
//! Function calls, function declarations and event handlers are not
//! supported; every variable lives in a global slot.

pub mod code;
pub mod compiler;
pub mod symbol;
pub mod value;
pub mod vm;

use thiserror::Error;

use crate::{evaluator, parser::ParseErrors};

pub use self::{
    code::{Instructions, Opcode},
    compiler::{Bytecode, CompileError, Compiler},
    value::Value,
    vm::{Vm, VmError},
};

#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error(transparent)]
    Parse(#[from] ParseErrors),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Vm(#[from] VmError),
}

pub fn compile_source(source: &str) -> Result<Bytecode, BytecodeError> {
    let program = crate::parser::parse(source, &evaluator::builtins())?;
    let mut compiler = Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Parses, compiles and runs `source`, returning the finished machine so
/// its globals and last popped value can be inspected.
pub fn run(source: &str) -> Result<Vm, BytecodeError> {
    let mut vm = Vm::new(compile_source(source)?);
    vm.run()?;
    Ok(vm)
}
