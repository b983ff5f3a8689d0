//! Tree-walking evaluation of parsed programs.

mod builtins;
mod error;
mod runtime;
mod scope;
mod value;

use std::{cell::Cell, collections::HashMap, rc::Rc};

use log::{debug, trace};

use crate::{
    ast::{
        Block, ConditionalBlock, Decl, EventHandlerStmt, Expr, ExprKind, ForRange, ForStmt,
        FuncCall, FuncDeclStmt, IfStmt, Operator, Program, Stmt, StmtKind,
    },
    parser::{self, Builtins},
    types::Type,
};

pub use self::{
    builtins::{sprintf, Builtin, BuiltinFunc},
    error::{EvalError, InternalKind, PanicKind},
    runtime::{BufferRuntime, FontValue, Runtime, SleepingYielder, StdRuntime, Yielder},
    value::{normalize_index, normalize_slice, ArrayVal, MapVal, Pairs, Value},
};
use self::{
    scope::ScopeStack,
    value::{string_index, string_slice},
};

/// Declarations of every builtin function, event handler and global, as
/// the parser needs them.
pub fn builtins() -> Builtins {
    Builtins {
        funcs: builtins::registry()
            .into_iter()
            .map(|(name, b)| (name, b.decl))
            .collect(),
        event_handlers: builtins::event_handler_decls(),
        globals: builtins::globals(),
    }
}

/// An event delivered by the host to a program's `on` handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub params: Vec<Value>,
}

impl Event {
    pub fn new(name: &str, params: Vec<Value>) -> Self {
        Event {
            name: name.to_string(),
            params,
        }
    }

    pub fn down(x: f64, y: f64) -> Self {
        Self::new("down", vec![Value::Num(x), Value::Num(y)])
    }

    pub fn up(x: f64, y: f64) -> Self {
        Self::new("up", vec![Value::Num(x), Value::Num(y)])
    }

    pub fn pointer_move(x: f64, y: f64) -> Self {
        Self::new("move", vec![Value::Num(x), Value::Num(y)])
    }

    pub fn key(k: &str) -> Self {
        Self::new("key", vec![Value::String(k.to_string())])
    }

    pub fn input(id: &str, val: &str) -> Self {
        Self::new(
            "input",
            vec![Value::String(id.to_string()), Value::String(val.to_string())],
        )
    }

    pub fn animate(elapsed: f64) -> Self {
        Self::new("animate", vec![Value::Num(elapsed)])
    }
}

/// How a statement hands control to the one after it.
enum Flow {
    Next,
    Return(Value),
    Break,
}

#[derive(Clone)]
pub struct Evaluator {
    runtime: Box<dyn Runtime>,
    yielder: Option<Box<dyn Yielder>>,
    builtins: HashMap<String, Builtin>,
    decls: Builtins,
    scopes: ScopeStack,
    funcs: HashMap<String, Rc<FuncDeclStmt>>,
    event_handlers: HashMap<String, Rc<EventHandlerStmt>>,
    stopped: Rc<Cell<bool>>,
}

impl Evaluator {
    pub fn new(runtime: Box<dyn Runtime>) -> Self {
        let decls = builtins();
        let mut scopes = ScopeStack::default();
        for var in decls.globals.values() {
            scopes.insert_global(&var.name, Value::zero(&var.t));
        }
        Evaluator {
            yielder: runtime.yielder(),
            runtime,
            builtins: builtins::registry(),
            decls,
            scopes,
            funcs: HashMap::new(),
            event_handlers: HashMap::new(),
            stopped: Rc::new(Cell::new(false)),
        }
    }

    pub fn with_yielder(mut self, yielder: Box<dyn Yielder>) -> Self {
        self.yielder = Some(yielder);
        self
    }

    /// Parses and evaluates `source`. Event handlers stay registered for
    /// [`Evaluator::handle_event`].
    pub fn run(&mut self, source: &str) -> Result<(), EvalError> {
        let program = parser::parse(source, &self.decls)?;
        self.eval_program(&program)
    }

    pub fn eval_program(&mut self, program: &Program) -> Result<(), EvalError> {
        self.funcs = program.funcs.clone();
        self.event_handlers = program.event_handlers.clone();
        debug!(
            "evaluating {} statements, {} functions, {} event handlers",
            program.statements.len(),
            self.funcs.len(),
            self.event_handlers.len()
        );
        self.eval_stmts(&program.statements)?;
        Ok(())
    }

    /// Names of the event handlers of the last evaluated program, sorted.
    pub fn event_handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.event_handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn handle_event(&mut self, event: Event) -> Result<(), EvalError> {
        if self.stopped.get() {
            return Err(EvalError::Stopped);
        }
        let handler = self.event_handlers.get(&event.name).cloned().ok_or_else(|| {
            EvalError::internal(
                InternalKind::EventHandler,
                format!("no handler for event {}", event.name),
            )
        })?;
        if event.params.len() < handler.params.len() {
            return Err(EvalError::internal(
                InternalKind::EventHandler,
                format!(
                    "event {} expects {} parameters, got {}",
                    event.name,
                    handler.params.len(),
                    event.params.len()
                ),
            ));
        }
        debug!("handling event {}", event.name);
        let saved = self.scopes.enter_func();
        let result = self.run_handler(&handler, event.params);
        self.scopes.leave_func(saved);
        result
    }

    fn run_handler(
        &mut self,
        handler: &EventHandlerStmt,
        params: Vec<Value>,
    ) -> Result<(), EvalError> {
        for (param, value) in handler.params.iter().zip(params) {
            let found = value.type_of();
            if param.t != found {
                let detail = format!("expected {}, found {}", param.t, found);
                return Err(EvalError::panic(PanicKind::AnyConversion, detail).at(&param.token));
            }
            self.scopes.insert(&param.name, value);
        }
        self.eval_stmts(&handler.body.statements)?;
        Ok(())
    }

    /// Requests that evaluation ends before the next statement.
    pub fn stop(&self) {
        self.stopped.set(true);
    }

    /// A handle that stops evaluation when set, usable from the host.
    pub fn stopped_flag(&self) -> Rc<Cell<bool>> {
        self.stopped.clone()
    }

    /// The current value of a global variable.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.scopes.get(name).cloned()
    }

    fn eval_stmts(&mut self, stmts: &[Stmt]) -> Result<Flow, EvalError> {
        for stmt in stmts {
            match self.eval_stmt(stmt)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn eval_block(&mut self, block: &Block) -> Result<Flow, EvalError> {
        self.scopes.nest();
        let result = self.eval_stmts(&block.statements);
        self.scopes.unnest();
        result
    }

    fn eval_stmt(&mut self, stmt: &Stmt) -> Result<Flow, EvalError> {
        if self.stopped.get() {
            return Err(EvalError::Stopped);
        }
        if let Some(yielder) = self.yielder.as_mut() {
            yielder.yield_now();
        }
        trace!("{}: {}", stmt.token.location(), stmt.token.literal);

        let result = match &stmt.kind {
            StmtKind::Empty(_) | StmtKind::FuncDecl(_) | StmtKind::EventHandler(_) => {
                Ok(Flow::Next)
            }
            StmtKind::TypedDecl(s) => self.eval_decl(&s.decl),
            StmtKind::InferredDecl(s) => self.eval_decl(&s.decl),
            StmtKind::Assignment(s) => {
                let value = self.eval_expr(&s.value)?;
                self.assign(&s.target, value).map(|_| Flow::Next)
            }
            StmtKind::FuncCall(s) => self.eval_call(&s.call).map(|_| Flow::Next),
            StmtKind::Return(s) => match &s.value {
                Some(expr) => self.eval_expr(expr).map(Flow::Return),
                None => Ok(Flow::Return(Value::None)),
            },
            StmtKind::Break(_) => Ok(Flow::Break),
            StmtKind::If(s) => self.eval_if(s),
            StmtKind::While(s) => self.eval_while(&s.cond_block),
            StmtKind::For(s) => {
                self.scopes.nest();
                let result = self.eval_for(s);
                self.scopes.unnest();
                result
            }
        };
        result.map_err(|err| err.at(&stmt.token))
    }

    fn eval_decl(&mut self, decl: &Decl) -> Result<Flow, EvalError> {
        let mut value = self.eval_expr(&decl.value)?;
        if decl.var.t == Type::ANY {
            value = Value::any(value);
        }
        self.scopes.insert(&decl.var.name, value);
        Ok(Flow::Next)
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), EvalError> {
        match &target.kind {
            ExprKind::Var(var) => {
                let slot = self.scopes.get_mut(&var.name).ok_or_else(|| {
                    EvalError::internal(InternalKind::NoVariable, var.name.clone())
                })?;
                *slot = value;
                Ok(())
            }
            ExprKind::Index(index) => {
                let left = self.eval_expr(&index.left)?;
                let key = self.eval_expr(&index.index)?;
                match (left, key) {
                    (Value::Array(arr), Value::Num(i)) => {
                        arr.set(i, value).map_err(|err| err.at(&target.token))
                    }
                    (Value::Map(map), Value::String(key)) => {
                        map.insert(key, value);
                        Ok(())
                    }
                    (left, _) => Err(EvalError::internal(
                        InternalKind::AssignmentTarget,
                        format!("cannot index {}", left.type_of()),
                    )),
                }
            }
            ExprKind::Dot(dot) => match self.eval_expr(&dot.left)? {
                Value::Map(map) => {
                    map.insert(dot.key.clone(), value);
                    Ok(())
                }
                left => Err(EvalError::internal(
                    InternalKind::AssignmentTarget,
                    format!("cannot access field of {}", left.type_of()),
                )),
            },
            _ => Err(EvalError::internal(
                InternalKind::AssignmentTarget,
                target.token.literal.clone(),
            )),
        }
    }

    /// Evaluates the block if its condition holds, returning `None` if it
    /// does not.
    fn eval_conditional(&mut self, cond: &ConditionalBlock) -> Result<Option<Flow>, EvalError> {
        match self.eval_expr(&cond.condition)?.unwrap_any() {
            Value::Bool(true) => self.eval_block(&cond.block).map(Some),
            Value::Bool(false) => Ok(None),
            v => Err(EvalError::internal(
                InternalKind::Type,
                format!("expected bool condition, found {}", v.type_of()),
            )
            .at(&cond.token)),
        }
    }

    fn eval_if(&mut self, stmt: &IfStmt) -> Result<Flow, EvalError> {
        if let Some(flow) = self.eval_conditional(&stmt.if_block)? {
            return Ok(flow);
        }
        for else_if in &stmt.else_ifs {
            if let Some(flow) = self.eval_conditional(else_if)? {
                return Ok(flow);
            }
        }
        match &stmt.else_block {
            Some(block) => self.eval_block(block),
            None => Ok(Flow::Next),
        }
    }

    fn eval_while(&mut self, cond: &ConditionalBlock) -> Result<Flow, EvalError> {
        loop {
            match self.eval_conditional(cond)? {
                None | Some(Flow::Break) => return Ok(Flow::Next),
                Some(Flow::Next) => {}
                Some(flow) => return Ok(flow),
            }
        }
    }

    /// Runs one loop iteration with the loop variable bound to `value`.
    fn iterate(&mut self, stmt: &ForStmt, value: Value) -> Result<Flow, EvalError> {
        if let Some(var) = &stmt.loop_var {
            self.scopes.insert(&var.name, value);
        }
        self.eval_block(&stmt.block)
    }

    fn eval_for(&mut self, stmt: &ForStmt) -> Result<Flow, EvalError> {
        match &stmt.range {
            ForRange::Step(range) => {
                let start = match &range.start {
                    Some(expr) => self.eval_num(expr)?,
                    None => 0.0,
                };
                let stop = self.eval_num(&range.stop)?;
                let step = match &range.step {
                    Some(expr) => self.eval_num(expr)?,
                    None => 1.0,
                };
                if step == 0.0 {
                    let err = EvalError::panic(
                        PanicKind::RangeValue,
                        "step cannot be 0, infinite loop",
                    );
                    return Err(err.at(&range.stop.token));
                }
                let mut n = start;
                while (step > 0.0 && n < stop) || (step < 0.0 && n > stop) {
                    match self.iterate(stmt, Value::Num(n))? {
                        Flow::Next => {}
                        Flow::Break => break,
                        flow => return Ok(flow),
                    }
                    n += step;
                }
            }
            ForRange::Expr(expr) => match self.eval_expr(expr)?.unwrap_any().clone() {
                Value::Array(arr) => {
                    let mut i = 0;
                    loop {
                        let element = match arr.elements.borrow().get(i) {
                            Some(element) => element.clone(),
                            None => break,
                        };
                        match self.iterate(stmt, element)? {
                            Flow::Next => {}
                            Flow::Break => break,
                            flow => return Ok(flow),
                        }
                        i += 1;
                    }
                }
                Value::String(s) => {
                    for ch in s.chars() {
                        match self.iterate(stmt, Value::String(ch.to_string()))? {
                            Flow::Next => {}
                            Flow::Break => break,
                            flow => return Ok(flow),
                        }
                    }
                }
                Value::Map(map) => {
                    let keys = map.pairs.borrow().keys().to_vec();
                    for key in keys {
                        if !map.pairs.borrow().contains(&key) {
                            continue;
                        }
                        match self.iterate(stmt, Value::String(key))? {
                            Flow::Next => {}
                            Flow::Break => break,
                            flow => return Ok(flow),
                        }
                    }
                }
                v => {
                    return Err(EvalError::internal(
                        InternalKind::RangeType,
                        format!("cannot range over {}", v.type_of()),
                    )
                    .at(&expr.token))
                }
            },
        }
        Ok(Flow::Next)
    }

    fn eval_num(&mut self, expr: &Expr) -> Result<f64, EvalError> {
        match self.eval_expr(expr)?.unwrap_any() {
            Value::Num(n) => Ok(*n),
            v => Err(EvalError::internal(
                InternalKind::Type,
                format!("expected num, found {}", v.type_of()),
            )
            .at(&expr.token)),
        }
    }

    fn eval_opt_num(&mut self, expr: &Option<Box<Expr>>) -> Result<Option<f64>, EvalError> {
        expr.as_ref().map(|e| self.eval_num(e)).transpose()
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        let result = match &expr.kind {
            ExprKind::Var(var) => self.scopes.get(&var.name).cloned().ok_or_else(|| {
                EvalError::internal(InternalKind::NoVariable, var.name.clone())
            }),
            ExprKind::Num(lit) => Ok(Value::Num(lit.value)),
            ExprKind::String(lit) => Ok(Value::String(lit.value.clone())),
            ExprKind::Bool(lit) => Ok(Value::Bool(lit.value)),
            ExprKind::Array(lit) => {
                let elements = lit
                    .elements
                    .iter()
                    .map(|e| self.eval_expr(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(ArrayVal::new(elements, expr.t.unfixed())))
            }
            ExprKind::Map(lit) => {
                let mut pairs = Pairs::default();
                for (key, value) in &lit.pairs {
                    pairs.insert(key.clone(), self.eval_expr(value)?);
                }
                Ok(Value::Map(MapVal::new(pairs, expr.t.unfixed())))
            }
            ExprKind::Call(call) => self.eval_call(call),
            ExprKind::Unary(unary) => match (unary.op, self.eval_expr(&unary.right)?) {
                (Operator::Minus, Value::Num(n)) => Ok(Value::Num(-n)),
                (Operator::Bang, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (op, right) => Err(EvalError::internal(
                    InternalKind::Operation,
                    format!("(unary) {}{}", op, right),
                )),
            },
            ExprKind::Binary(binary) => {
                let left = self.eval_expr(&binary.left)?;
                match (binary.op, &left) {
                    (Operator::And, Value::Bool(false)) => Ok(Value::Bool(false)),
                    (Operator::Or, Value::Bool(true)) => Ok(Value::Bool(true)),
                    _ => {
                        let right = self.eval_expr(&binary.right)?;
                        binary_op(binary.op, left, right)
                    }
                }
            }
            ExprKind::Index(index) => {
                let left = self.eval_expr(&index.left)?;
                let key = self.eval_expr(&index.index)?;
                match (left.unwrap_any(), key.unwrap_any()) {
                    (Value::Array(arr), Value::Num(i)) => arr.get(*i),
                    (Value::String(s), Value::Num(i)) => string_index(s, *i),
                    (Value::Map(map), Value::String(key)) => map.get(key),
                    (left, key) => Err(EvalError::internal(
                        InternalKind::Type,
                        format!("cannot index {} with {}", left.type_of(), key.type_of()),
                    )),
                }
            }
            ExprKind::Slice(slice) => {
                let left = self.eval_expr(&slice.left)?;
                let start = self.eval_opt_num(&slice.start)?;
                let end = self.eval_opt_num(&slice.end)?;
                match left.unwrap_any() {
                    Value::Array(arr) => arr.slice(start, end),
                    Value::String(s) => string_slice(s, start, end),
                    left => Err(EvalError::internal(
                        InternalKind::Type,
                        format!("cannot slice {}", left.type_of()),
                    )),
                }
            }
            ExprKind::Dot(dot) => match self.eval_expr(&dot.left)?.unwrap_any() {
                Value::Map(map) => map.get(&dot.key),
                left => Err(EvalError::internal(
                    InternalKind::Type,
                    format!("cannot access field of {}", left.type_of()),
                )),
            },
            ExprKind::Group(group) => self.eval_expr(&group.expr),
            ExprKind::TypeAssertion(assertion) => match self.eval_expr(&assertion.left)? {
                Value::Any(inner) => {
                    let found = inner.type_of();
                    if expr.t.matches(&found) {
                        Ok(*inner)
                    } else {
                        let detail = format!("expected {}, found {}", expr.t, found);
                        Err(EvalError::panic(PanicKind::AnyConversion, detail))
                    }
                }
                v => Err(EvalError::internal(
                    InternalKind::Type,
                    format!("type assertion on {}", v.type_of()),
                )),
            },
            ExprKind::Any(any) => self.eval_expr(&any.value).map(Value::any),
        };
        result.map_err(|err| err.at(&expr.token))
    }

    fn eval_call(&mut self, call: &FuncCall) -> Result<Value, EvalError> {
        let args = call
            .args
            .iter()
            .map(|arg| self.eval_expr(arg))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(builtin) = self.builtins.get(&call.name) {
            let func = builtin.func;
            return func(self, args);
        }
        let func = self.funcs.get(&call.name).cloned().ok_or_else(|| {
            EvalError::internal(InternalKind::UnknownNode, format!("function {}", call.name))
        })?;
        trace!("calling {}", call.name);
        let saved = self.scopes.enter_func();
        let result = self.call_func(&func, args);
        self.scopes.leave_func(saved);
        result
    }

    fn call_func(&mut self, func: &FuncDeclStmt, mut args: Vec<Value>) -> Result<Value, EvalError> {
        let signature = &func.signature;
        let rest = args.split_off(signature.params.len().min(args.len()));
        for (param, arg) in signature.params.iter().zip(args) {
            self.scopes.insert(&param.name, arg);
        }
        if let Some(variadic) = &signature.variadic_param {
            let rest = ArrayVal::new(rest, Type::array(variadic.t.clone()));
            self.scopes.insert(&variadic.name, Value::Array(rest));
        }
        match self.eval_stmts(&func.body.statements)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

fn binary_op(op: Operator, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        Operator::Eq => return Ok(Value::Bool(left.equals(&right))),
        Operator::NotEq => return Ok(Value::Bool(!left.equals(&right))),
        _ => {}
    }
    let value = match (left, right) {
        (Value::Num(l), Value::Num(r)) => match op {
            Operator::Plus => Value::Num(l + r),
            Operator::Minus => Value::Num(l - r),
            Operator::Asterisk => Value::Num(l * r),
            Operator::Slash => Value::Num(l / r),
            Operator::Percent => Value::Num(l % r),
            Operator::Lt => Value::Bool(l < r),
            Operator::Gt => Value::Bool(l > r),
            Operator::LtEq => Value::Bool(l <= r),
            Operator::GtEq => Value::Bool(l >= r),
            _ => return Err(unknown_operation(op, "num")),
        },
        (Value::String(l), Value::String(r)) => match op {
            Operator::Plus => Value::String(l + &r),
            Operator::Lt => Value::Bool(l < r),
            Operator::Gt => Value::Bool(l > r),
            Operator::LtEq => Value::Bool(l <= r),
            Operator::GtEq => Value::Bool(l >= r),
            _ => return Err(unknown_operation(op, "string")),
        },
        (Value::Bool(l), Value::Bool(r)) => match op {
            Operator::And => Value::Bool(l && r),
            Operator::Or => Value::Bool(l || r),
            _ => return Err(unknown_operation(op, "bool")),
        },
        (Value::Array(l), Value::Array(r)) if op == Operator::Plus => Value::Array(l.concat(&r)),
        (l, _) => return Err(unknown_operation(op, &l.type_of().to_string())),
    };
    Ok(value)
}

fn unknown_operation(op: Operator, operand: &str) -> EvalError {
    EvalError::internal(InternalKind::Operation, format!("{} {}", operand, op))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> (Evaluator, BufferRuntime, Result<(), EvalError>) {
        let rt = BufferRuntime::new();
        let mut ev = Evaluator::new(Box::new(rt.clone()));
        let result = ev.run(source);
        (ev, rt, result)
    }

    fn run(source: &str) -> String {
        let (_, rt, result) = eval(source);
        if let Err(err) = result {
            panic!("unexpected error: {}\noutput: {}", err, rt.output());
        }
        rt.output()
    }

    fn run_err(source: &str) -> EvalError {
        match eval(source).2 {
            Err(err) => err,
            Ok(()) => panic!("expected error for {:?}", source),
        }
    }

    #[test]
    fn print_values() {
        assert_eq!(run("print 1 \"a\" true"), "1 a true\n");
        assert_eq!(run("print [1 2] {a:1 b:\"x\"}"), "[1 2] {a:1 b:x}\n");
        assert_eq!(run("print 7/2 7%2 -1.5"), "3.5 1 -1.5\n");
    }

    #[test]
    fn self_assignment() {
        let (ev, _, result) = eval("x := 1 + 2\nx = x\n");
        assert!(result.is_ok());
        assert_eq!(ev.global("x"), Some(Value::Num(3.0)));
    }

    #[test]
    fn composites_alias_scalars_copy() {
        let input = "
a := [1 2 3]
b := a
b[0] = 9
print a
n := 1
m := n
m = 2
print n m
";
        assert_eq!(run(input), "[9 2 3]\n1 2\n");
    }

    #[test]
    fn dot_fields() {
        let input = "
m := {a:1}
m.a = 5
x := m.a + 1
m.b = m.a * x
print m.a x m.b
print m
";
        assert_eq!(run(input), "5 6 30\n{a:5 b:30}\n");
    }

    #[test]
    fn index_panics() {
        let err = run_err("a := [1 2 3]\nprint a[5]");
        assert_eq!(err.panic_kind(), Some(PanicKind::Bounds));
        assert!(err.to_string().starts_with("line 2 column"), "{}", err);
        assert!(err.to_string().ends_with("panic: index out of bounds: 5"), "{}", err);
        let err = run_err("a := [1 2 3]\nprint a[-4]");
        assert_eq!(err.panic_kind(), Some(PanicKind::Bounds));
        assert_eq!(run("a := [1 2 3]\nprint a[-1] a[1:] a[:-1]"), "3 [2 3] [1 2]\n");
        let err = run_err("a := [1 2 3]\nprint a[2:1]");
        assert_eq!(err.panic_kind(), Some(PanicKind::Slice));
        let err = run_err("m := {a:1}\nprint m.b");
        assert_eq!(err.panic_kind(), Some(PanicKind::MapKey));
    }

    #[test]
    fn error_globals() {
        let input = r#"
n := str2num "abc"
print n err errmsg
n = str2num "42"
print n err errmsg
"#;
        assert_eq!(
            run(input),
            "0 true str2num: cannot parse \"abc\"\n42 false \n"
        );
    }

    #[test]
    fn functions() {
        let input = "
func fib:num n:num
    if n < 2
        return n
    end
    return (fib n-1) + (fib n-2)
end
func total:num nums:num...
    sum := 0
    for n := range nums
        sum = sum + n
    end
    return sum
end
func greet
    print \"hi\"
end
print (fib 10) (total 1 2 3) (total)
greet
";
        assert_eq!(run(input), "55 6 0\nhi\n");
    }

    #[test]
    fn functions_see_only_globals() {
        let input = "
g := 1
func f
    g = g + 1
end
for range 3
    f
end
print g
";
        assert_eq!(run(input), "4\n");
    }

    #[test]
    fn loops() {
        let input = "
for i := range 3
    print i
end
for i := range 10 0 -4
    print i
end
for ch := range \"hé\"
    print ch
end
m := {b:1 a:2}
for k := range m
    print k m[k]
end
n := 0
while true
    n = n + 1
    if n == 3
        break
    end
end
print n
";
        assert_eq!(run(input), "0\n1\n2\n10\n6\n2\nh\né\nb 1\na 2\n3\n");
    }

    #[test]
    fn ranges_are_evaluated_once() {
        let input = "
arr := [1]
for x := range arr
    if x < 3
        arr = arr + [x+1]
    end
    print x
end
";
        assert_eq!(run(input), "1\n");
        let input = "
m := {a:1 b:2 c:3}
for k := range m
    del m \"b\"
    print k
end
";
        assert_eq!(run(input), "a\nc\n");
    }

    #[test]
    fn zero_step() {
        let err = run_err("for range 0 10 0\n    print 1\nend");
        assert_eq!(err.panic_kind(), Some(PanicKind::RangeValue));
    }

    #[test]
    fn if_else_chain() {
        let input = "
for n := range 3
    if n == 0
        print \"zero\"
    else if n == 1
        print \"one\"
    else
        print \"many\"
    end
end
";
        assert_eq!(run(input), "zero\none\nmany\n");
    }

    #[test]
    fn logical_short_circuit() {
        let input = "
a := [1]
print ((len a) > 1 and a[1] == 2)
print ((len a) == 1 or a[5] == 2)
";
        assert_eq!(run(input), "false\ntrue\n");
    }

    #[test]
    fn any_values() {
        let input = "
x:any
print x
x = \"s\"
print x (typeof x) x.(string)
arr:[]any
arr = arr + [1 \"a\"]
print arr (typeof arr)
";
        assert_eq!(run(input), "false\ns string s\n[1 a] []any\n");
        let err = run_err("x:any\nx = 1\nprint x.(string)");
        assert_eq!(err.panic_kind(), Some(PanicKind::AnyConversion));
        assert!(err.to_string().ends_with("expected string, found num"), "{}", err);
    }

    #[test]
    fn printf_and_strings() {
        let input = r#"
printf "%v|%5.2f|%-4v|\n" [1 2] 3.14159 "ab"
s := "hello"
print s[1] s[1:3] (len s) (join ["a" "b"] "-")
"#;
        assert_eq!(run(input), "[1 2]| 3.14|ab  |\ne el 5 a-b\n");
    }

    #[test]
    fn exit_and_panic() {
        let (_, rt, result) = eval("print 1\nexit 3\nprint 2");
        assert_eq!(rt.output(), "1\n");
        assert_eq!(result.map_err(|e| e.exit_code()), Err(Some(3)));

        let err = run_err("panic \"boom\"");
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "line 1 column 1: boom");
    }

    #[test]
    fn events() {
        let input = "
on down x:num y:num
    print \"down\" x y
end
on key k:string
    print k
end
";
        let (mut ev, rt, result) = eval(input);
        assert!(result.is_ok());
        assert_eq!(ev.event_handler_names(), ["down", "key"]);
        ev.handle_event(Event::down(1.0, 2.5)).unwrap();
        ev.handle_event(Event::key("a")).unwrap();
        assert_eq!(rt.output(), "down 1 2.5\na\n");

        let err = ev.handle_event(Event::up(1.0, 1.0)).unwrap_err();
        assert!(matches!(err, EvalError::Internal(InternalKind::EventHandler, _)));
        let err = ev.handle_event(Event::new("key", vec![Value::Num(1.0)])).unwrap_err();
        assert_eq!(err.panic_kind(), Some(PanicKind::AnyConversion));

        ev.stop();
        assert!(matches!(ev.handle_event(Event::key("b")), Err(EvalError::Stopped)));
    }

    #[test]
    fn stop_flag_ends_evaluation() {
        let rt = BufferRuntime::new();
        let mut ev = Evaluator::new(Box::new(rt.clone()));
        ev.stopped_flag().set(true);
        assert!(matches!(ev.run("print 1"), Err(EvalError::Stopped)));
        assert_eq!(rt.output(), "");
    }

    #[test]
    fn parse_errors_pass_through() {
        let err = run_err("x := 1\nx := 2");
        assert!(matches!(err, EvalError::Parse(_)));
    }

    #[test]
    fn graphics_calls_reach_runtime() {
        let (_, rt, result) = eval("move 10 20\nline 30 40\ncolor \"red\"");
        assert!(result.is_ok());
        assert_eq!(rt.graphics(), ["move 10 20", "line 30 40", "color red"]);
    }
}
