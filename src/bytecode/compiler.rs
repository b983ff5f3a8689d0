use std::iter;

use log::debug;
use thiserror::Error;

use crate::{
    ast::{
        BinaryExpr, Block, Decl, Expr, ExprKind, ForRange, ForStmt, IfStmt, Operator, Program,
        Stmt, StmtKind, WhileStmt,
    },
    token::Token,
    types::TypeName,
};

use super::{
    code::{make, Instructions, Opcode},
    symbol::SymbolTable,
    value::Value,
};

/// Operand of a forward jump until its target is known.
const PLACEHOLDER: usize = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{location}: unsupported {node}")]
    Unsupported {
        node: &'static str,
        location: String,
    },
    #[error("undefined variable {0}")]
    UndefinedVar(String),
    #[error("too many {0}")]
    Limit(&'static str),
}

fn unsupported(node: &'static str, token: &Token) -> CompileError {
    CompileError::Unsupported {
        node,
        location: token.location(),
    }
}

/// Compiled program: the instruction stream and its constant pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

struct Loop {
    breaks: Vec<usize>,
    /// `for` loops keep an iterator on the stack that `break` must drop.
    has_iterator: bool,
}

#[derive(Default)]
pub struct Compiler {
    instructions: Instructions,
    constants: Vec<Value>,
    symbols: SymbolTable,
    loops: Vec<Loop>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        debug!("compiling {} statements", program.statements.len());
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        debug!(
            "compiled {} bytes, {} constants, {} globals",
            self.instructions.len(),
            self.constants.len(),
            self.symbols.len()
        );
        Ok(())
    }

    pub fn bytecode(self) -> Bytecode {
        Bytecode {
            instructions: self.instructions,
            constants: self.constants,
        }
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> Result<usize, CompileError> {
        if operands.iter().any(|o| *o > u16::MAX as usize) {
            return Err(CompileError::Limit("operands"));
        }
        Ok(self.instructions.push(&make(op, operands)))
    }

    fn add_constant(&mut self, value: Value) -> Result<usize, CompileError> {
        if self.constants.len() > u16::MAX as usize {
            return Err(CompileError::Limit("constants"));
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    fn emit_constant(&mut self, value: Value) -> Result<(), CompileError> {
        let index = self.add_constant(value)?;
        self.emit(Opcode::Constant, &[index])?;
        Ok(())
    }

    /// Points operand `n` of the jump at `pos` to the next instruction.
    fn patch(&mut self, pos: usize, n: usize) -> Result<(), CompileError> {
        let target = self.instructions.len();
        if target > u16::MAX as usize {
            return Err(CompileError::Limit("instructions"));
        }
        self.instructions.change_operand(pos, n, target);
        Ok(())
    }

    fn define(&mut self, name: &str) -> Result<usize, CompileError> {
        let index = self.symbols.define(name).index;
        if index > u16::MAX as usize {
            return Err(CompileError::Limit("globals"));
        }
        Ok(index)
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Empty(_) => Ok(()),
            StmtKind::TypedDecl(s) => self.compile_decl(&s.decl),
            StmtKind::InferredDecl(s) => self.compile_decl(&s.decl),
            StmtKind::Assignment(s) => self.compile_assignment(&s.target, &s.value),
            StmtKind::If(s) => self.compile_if(s),
            StmtKind::While(s) => self.compile_while(s),
            StmtKind::For(s) => self.compile_for(s),
            StmtKind::Break(_) => self.compile_break(&stmt.token),
            StmtKind::FuncCall(_) => Err(unsupported("function call", &stmt.token)),
            StmtKind::Return(_) => Err(unsupported("return", &stmt.token)),
            StmtKind::FuncDecl(_) => Err(unsupported("function declaration", &stmt.token)),
            StmtKind::EventHandler(_) => Err(unsupported("event handler", &stmt.token)),
        }
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        self.symbols.nest();
        let result = block
            .statements
            .iter()
            .try_for_each(|stmt| self.compile_stmt(stmt));
        self.symbols.unnest();
        result
    }

    fn compile_decl(&mut self, decl: &Decl) -> Result<(), CompileError> {
        self.compile_expr(&decl.value)?;
        let index = self.define(&decl.var.name)?;
        self.emit(Opcode::SetGlobal, &[index])?;
        Ok(())
    }

    fn compile_assignment(&mut self, target: &Expr, value: &Expr) -> Result<(), CompileError> {
        self.compile_expr(value)?;
        match &target.kind {
            ExprKind::Var(var) => {
                let index = self
                    .symbols
                    .resolve(&var.name)
                    .map(|s| s.index)
                    .ok_or_else(|| CompileError::UndefinedVar(var.name.clone()))?;
                self.emit(Opcode::SetGlobal, &[index])?;
            }
            ExprKind::Index(index) => {
                self.compile_expr(&index.left)?;
                self.compile_expr(&index.index)?;
                self.emit(Opcode::SetIndex, &[])?;
            }
            ExprKind::Dot(dot) => {
                self.compile_expr(&dot.left)?;
                self.emit_constant(Value::String(dot.key.clone()))?;
                self.emit(Opcode::SetIndex, &[])?;
            }
            _ => return Err(unsupported("assignment target", &target.token)),
        }
        Ok(())
    }

    fn compile_if(&mut self, stmt: &IfStmt) -> Result<(), CompileError> {
        let mut end_jumps = Vec::new();
        for cond in iter::once(&stmt.if_block).chain(&stmt.else_ifs) {
            self.compile_expr(&cond.condition)?;
            let skip = self.emit(Opcode::JumpNotTruthy, &[PLACEHOLDER])?;
            self.compile_block(&cond.block)?;
            end_jumps.push(self.emit(Opcode::Jump, &[PLACEHOLDER])?);
            self.patch(skip, 0)?;
        }
        if let Some(block) = &stmt.else_block {
            self.compile_block(block)?;
        }
        for pos in end_jumps {
            self.patch(pos, 0)?;
        }
        Ok(())
    }

    fn compile_while(&mut self, stmt: &WhileStmt) -> Result<(), CompileError> {
        let start = self.instructions.len();
        self.compile_expr(&stmt.cond_block.condition)?;
        let exit = self.emit(Opcode::JumpNotTruthy, &[PLACEHOLDER])?;
        self.compile_loop_body(&stmt.cond_block.block, start, false)?;
        self.patch(exit, 0)
    }

    fn compile_for(&mut self, stmt: &ForStmt) -> Result<(), CompileError> {
        match &stmt.range {
            ForRange::Step(range) => {
                self.compile_optional(range.start.as_ref())?;
                self.compile_expr(&range.stop)?;
                self.compile_optional(range.step.as_ref())?;
                self.emit(Opcode::StepRange, &[])?;
            }
            ForRange::Expr(expr) => self.compile_expr(expr)?,
        }
        self.symbols.nest();
        let has_var = usize::from(stmt.loop_var.is_some());
        let head = self.emit(Opcode::IterRange, &[has_var, PLACEHOLDER])?;
        if let Some(var) = &stmt.loop_var {
            let index = self.define(&var.name)?;
            self.emit(Opcode::SetGlobal, &[index])?;
        }
        let result = self.compile_loop_body(&stmt.block, head, true);
        self.symbols.unnest();
        result?;
        self.patch(head, 1)
    }

    /// Compiles the body, the jump back to `start` and patches the breaks
    /// to the instruction after the loop.
    fn compile_loop_body(
        &mut self,
        block: &Block,
        start: usize,
        has_iterator: bool,
    ) -> Result<(), CompileError> {
        self.loops.push(Loop {
            breaks: Vec::new(),
            has_iterator,
        });
        let result = self.compile_block(block);
        let breaks = self.loops.pop().map(|l| l.breaks).unwrap_or_default();
        result?;
        self.emit(Opcode::Jump, &[start])?;
        for pos in breaks {
            self.patch(pos, 0)?;
        }
        Ok(())
    }

    fn compile_break(&mut self, token: &Token) -> Result<(), CompileError> {
        let has_iterator = match self.loops.last() {
            Some(l) => l.has_iterator,
            None => return Err(unsupported("break outside loop", token)),
        };
        if has_iterator {
            self.emit(Opcode::Drop, &[1])?;
        }
        let pos = self.emit(Opcode::Jump, &[PLACEHOLDER])?;
        if let Some(l) = self.loops.last_mut() {
            l.breaks.push(pos);
        }
        Ok(())
    }

    fn compile_optional(&mut self, expr: Option<&Expr>) -> Result<(), CompileError> {
        match expr {
            Some(expr) => self.compile_expr(expr),
            None => self.emit(Opcode::None, &[]).map(|_| ()),
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Num(lit) => self.emit_constant(Value::Num(lit.value))?,
            ExprKind::String(lit) => self.emit_constant(Value::String(lit.value.clone()))?,
            ExprKind::Bool(lit) => {
                let op = if lit.value { Opcode::True } else { Opcode::False };
                self.emit(op, &[])?;
            }
            ExprKind::Var(var) => {
                let index = self
                    .symbols
                    .resolve(&var.name)
                    .map(|s| s.index)
                    .ok_or_else(|| CompileError::UndefinedVar(var.name.clone()))?;
                self.emit(Opcode::GetGlobal, &[index])?;
            }
            ExprKind::Array(lit) => {
                for element in &lit.elements {
                    self.compile_expr(element)?;
                }
                self.emit(Opcode::Array, &[lit.elements.len()])?;
            }
            ExprKind::Map(lit) => {
                for (key, value) in &lit.pairs {
                    self.emit_constant(Value::String(key.clone()))?;
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::Map, &[lit.pairs.len() * 2])?;
            }
            ExprKind::Unary(unary) => {
                self.compile_expr(&unary.right)?;
                let op = match unary.op {
                    Operator::Minus => Opcode::Minus,
                    Operator::Bang => Opcode::Not,
                    _ => return Err(unsupported("unary operator", &expr.token)),
                };
                self.emit(op, &[])?;
            }
            ExprKind::Binary(binary) => self.compile_binary(binary, &expr.token)?,
            ExprKind::Index(index) => {
                self.compile_expr(&index.left)?;
                self.compile_expr(&index.index)?;
                self.emit(Opcode::Index, &[])?;
            }
            ExprKind::Slice(slice) => {
                self.compile_expr(&slice.left)?;
                self.compile_optional(slice.start.as_deref())?;
                self.compile_optional(slice.end.as_deref())?;
                self.emit(Opcode::Slice, &[])?;
            }
            ExprKind::Dot(dot) => {
                self.compile_expr(&dot.left)?;
                self.emit_constant(Value::String(dot.key.clone()))?;
                self.emit(Opcode::Index, &[])?;
            }
            ExprKind::Group(group) => self.compile_expr(&group.expr)?,
            ExprKind::Any(any) => self.compile_expr(&any.value)?,
            ExprKind::Call(_) => return Err(unsupported("function call", &expr.token)),
            ExprKind::TypeAssertion(_) => {
                return Err(unsupported("type assertion", &expr.token))
            }
        }
        Ok(())
    }

    fn compile_binary(&mut self, binary: &BinaryExpr, token: &Token) -> Result<(), CompileError> {
        match binary.op {
            Operator::And => return self.compile_and(binary),
            Operator::Or => return self.compile_or(binary),
            _ => {}
        }
        self.compile_expr(&binary.left)?;
        self.compile_expr(&binary.right)?;
        let operand = binary.left.t.name;
        let op = match (binary.op, operand) {
            (Operator::Plus, TypeName::Num) => Opcode::Add,
            (Operator::Plus, TypeName::String) => Opcode::StringConcatenate,
            (Operator::Plus, TypeName::Array) => Opcode::ArrayConcatenate,
            (Operator::Minus, _) => Opcode::Subtract,
            (Operator::Asterisk, _) => Opcode::Multiply,
            (Operator::Slash, _) => Opcode::Divide,
            (Operator::Percent, _) => Opcode::Modulo,
            (Operator::Eq, _) => Opcode::Equal,
            (Operator::NotEq, _) => Opcode::NotEqual,
            (Operator::Lt, TypeName::String) => Opcode::StringLess,
            (Operator::LtEq, TypeName::String) => Opcode::StringLessEqual,
            (Operator::Gt, TypeName::String) => Opcode::StringGreater,
            (Operator::GtEq, TypeName::String) => Opcode::StringGreaterEqual,
            (Operator::Lt, _) => Opcode::NumLess,
            (Operator::LtEq, _) => Opcode::NumLessEqual,
            (Operator::Gt, _) => Opcode::NumGreater,
            (Operator::GtEq, _) => Opcode::NumGreaterEqual,
            _ => return Err(unsupported("binary operator", token)),
        };
        self.emit(op, &[])?;
        Ok(())
    }

    fn compile_and(&mut self, binary: &BinaryExpr) -> Result<(), CompileError> {
        self.compile_expr(&binary.left)?;
        let short = self.emit(Opcode::JumpNotTruthy, &[PLACEHOLDER])?;
        self.compile_expr(&binary.right)?;
        let end = self.emit(Opcode::Jump, &[PLACEHOLDER])?;
        self.patch(short, 0)?;
        self.emit(Opcode::False, &[])?;
        self.patch(end, 0)
    }

    fn compile_or(&mut self, binary: &BinaryExpr) -> Result<(), CompileError> {
        self.compile_expr(&binary.left)?;
        let right = self.emit(Opcode::JumpNotTruthy, &[PLACEHOLDER])?;
        self.emit(Opcode::True, &[])?;
        let end = self.emit(Opcode::Jump, &[PLACEHOLDER])?;
        self.patch(right, 0)?;
        self.compile_expr(&binary.right)?;
        self.patch(end, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{evaluator, parser::parse};

    fn compile(input: &str) -> Result<Bytecode, CompileError> {
        let program = match parse(input, &evaluator::builtins()) {
            Ok(program) => program,
            Err(err) => panic!("parse error: {}", err),
        };
        let mut compiler = Compiler::new();
        compiler.compile(&program)?;
        Ok(compiler.bytecode())
    }

    fn ins(parts: &[(Opcode, &[usize])]) -> Instructions {
        Instructions::from(
            parts
                .iter()
                .map(|(op, operands)| make(*op, operands))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn globals() {
        let bytecode = compile("x := 1\ny := x\ny = x + 1\nx = y").unwrap();
        assert_eq!(
            bytecode.constants,
            [Value::Num(1.0), Value::Num(1.0)]
        );
        let want = ins(&[
            (Opcode::Constant, &[0]),
            (Opcode::SetGlobal, &[0]),
            (Opcode::GetGlobal, &[0]),
            (Opcode::SetGlobal, &[1]),
            (Opcode::GetGlobal, &[0]),
            (Opcode::Constant, &[1]),
            (Opcode::Add, &[]),
            (Opcode::SetGlobal, &[1]),
            (Opcode::GetGlobal, &[1]),
            (Opcode::SetGlobal, &[0]),
        ]);
        assert_eq!(bytecode.instructions, want, "\n{}", bytecode.instructions);
    }

    #[test]
    fn index_assignment() {
        let bytecode = compile("x := [1 2]\nx[0] = x[1]").unwrap();
        let want = ins(&[
            (Opcode::Constant, &[0]),
            (Opcode::Constant, &[1]),
            (Opcode::Array, &[2]),
            (Opcode::SetGlobal, &[0]),
            (Opcode::GetGlobal, &[0]),
            (Opcode::Constant, &[2]),
            (Opcode::Index, &[]),
            (Opcode::GetGlobal, &[0]),
            (Opcode::Constant, &[3]),
            (Opcode::SetIndex, &[]),
        ]);
        assert_eq!(bytecode.instructions, want, "\n{}", bytecode.instructions);
    }

    #[test]
    fn maps_push_keys_as_constants() {
        let bytecode = compile("x := {a:1 b:2}\nx = x").unwrap();
        assert_eq!(
            bytecode.constants,
            [
                Value::String("a".into()),
                Value::Num(1.0),
                Value::String("b".into()),
                Value::Num(2.0)
            ]
        );
        assert!(bytecode.instructions.to_string().contains("OpMap 4"));
    }

    #[test]
    fn conditional_jumps_are_patched() {
        let bytecode = compile("x := 1\nif x > 0\n    x = 2\nend").unwrap();
        let want = "\
0000 OpConstant 0
0003 OpSetGlobal 0
0006 OpGetGlobal 0
0009 OpConstant 1
0012 OpNumGreater
0013 OpJumpNotTruthy 25
0016 OpConstant 2
0019 OpSetGlobal 0
0022 OpJump 25
";
        assert_eq!(bytecode.instructions.to_string(), want);
    }

    #[test]
    fn loops_jump_back() {
        let bytecode = compile("for range 3\n    break\nend").unwrap();
        let want = "\
0000 OpNone
0001 OpConstant 0
0004 OpNone
0005 OpStepRange
0006 OpIterRange 0 20
0011 OpDrop 1
0014 OpJump 20
0017 OpJump 6
";
        assert_eq!(bytecode.instructions.to_string(), want);
    }

    #[test]
    fn unsupported_nodes() {
        let err = compile("print 1").unwrap_err();
        assert_eq!(err.to_string(), "line 1 column 1: unsupported function call");
        let err = compile("func f\n    print 1\nend").unwrap_err();
        assert!(matches!(
            err,
            CompileError::Unsupported {
                node: "function declaration",
                ..
            }
        ));
    }
}
