use std::{collections::HashMap, fmt, rc::Rc};

use derive_more::{From, TryInto};

use crate::{
    common::quote,
    parser::format::Formatting,
    token::{Token, TokenKind},
    types::Type,
};

/// Identifies nodes that carry formatting metadata in side tables.
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Or,
    And,
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
    Percent,
    Bang,
}

impl Operator {
    pub fn from_token_kind(kind: TokenKind) -> Option<Operator> {
        match kind {
            TokenKind::Or => Some(Self::Or),
            TokenKind::And => Some(Self::And),
            TokenKind::Eq => Some(Self::Eq),
            TokenKind::NotEq => Some(Self::NotEq),
            TokenKind::Lt => Some(Self::Lt),
            TokenKind::Gt => Some(Self::Gt),
            TokenKind::LtEq => Some(Self::LtEq),
            TokenKind::GtEq => Some(Self::GtEq),
            TokenKind::Plus => Some(Self::Plus),
            TokenKind::Minus => Some(Self::Minus),
            TokenKind::Asterisk => Some(Self::Asterisk),
            TokenKind::Slash => Some(Self::Slash),
            TokenKind::Percent => Some(Self::Percent),
            TokenKind::Bang => Some(Self::Bang),
            _ => None,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::Gt | Self::LtEq | Self::GtEq
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prints numbers without exponent and without trailing zeros.
pub fn format_num(n: f64) -> String {
    if n.is_infinite() {
        if n > 0.0 { "+Inf".into() } else { "-Inf".into() }
    } else {
        format!("{}", n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub token: Token,
    pub name: String,
    pub t: Type,
}

impl Var {
    /// A variable declared outside of any source file, e.g. a builtin
    /// global or parameter.
    pub fn builtin(name: &str, t: Type) -> Self {
        Var {
            token: Token::synthetic(TokenKind::Ident, name),
            name: name.into(),
            t,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Static signature of a builtin or user defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncSignature {
    pub name: String,
    pub params: Vec<Var>,
    pub variadic_param: Option<Var>,
    pub return_type: Type,
}

#[derive(Debug, Clone)]
pub struct NumLiteral {
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct StringLiteral {
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct BoolLiteral {
    pub value: bool,
}

#[derive(Debug, Clone)]
pub struct ArrayLiteral {
    pub elements: Vec<Expr>,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub struct MapLiteral {
    /// Pairs in source order. Keys are unique.
    pub pairs: Vec<(String, Expr)>,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub signature: Rc<FuncSignature>,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: Operator,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: Operator,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub id: NodeId,
}

#[derive(Debug, Clone)]
pub struct IndexExpr {
    pub left: Box<Expr>,
    pub index: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct SliceExpr {
    pub left: Box<Expr>,
    pub start: Option<Box<Expr>>,
    pub end: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct DotExpr {
    pub left: Box<Expr>,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct GroupExpr {
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct TypeAssertion {
    pub left: Box<Expr>,
}

/// Boxes a value flowing into an `any` slot.
#[derive(Debug, Clone)]
pub struct AnyExpr {
    pub value: Box<Expr>,
}

#[derive(Debug, Clone, From, TryInto)]
pub enum ExprKind {
    Var(Var),
    Num(NumLiteral),
    String(StringLiteral),
    Bool(BoolLiteral),
    Array(ArrayLiteral),
    Map(MapLiteral),
    Call(FuncCall),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Index(IndexExpr),
    Slice(SliceExpr),
    Dot(DotExpr),
    Group(GroupExpr),
    TypeAssertion(TypeAssertion),
    Any(AnyExpr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub token: Token,
    pub t: Type,
}

impl Expr {
    pub fn new(kind: impl Into<ExprKind>, token: Token, t: Type) -> Self {
        Expr {
            kind: kind.into(),
            token,
            t,
        }
    }

    /// Resolves empty literal types to `any` elements, see [`Type::infer`].
    pub fn infer(&mut self) {
        match &mut self.kind {
            ExprKind::Array(arr) => {
                for el in arr.elements.iter_mut() {
                    el.infer();
                }
            }
            ExprKind::Map(map) => {
                for (_, val) in map.pairs.iter_mut() {
                    val.infer();
                }
            }
            ExprKind::Group(group) => group.expr.infer(),
            ExprKind::Binary(binary) => {
                binary.left.infer();
                binary.right.infer();
            }
            _ => return,
        }
        self.t = self.t.infer();
    }

    /// Reports whether the expression denotes storage that can be
    /// assigned to.
    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            ExprKind::Var(_) => true,
            ExprKind::Index(index) => index.left.is_assignable(),
            ExprKind::Dot(dot) => dot.left.is_assignable(),
            _ => false,
        }
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Var(var) => write!(f, "{}", var),
            ExprKind::Num(num) => f.write_str(&format_num(num.value)),
            ExprKind::String(s) => f.write_str(&quote(&s.value)),
            ExprKind::Bool(b) => write!(f, "{}", b.value),
            ExprKind::Array(arr) => write!(f, "[{}]", join(&arr.elements, ", ")),
            ExprKind::Map(map) => {
                let pairs: Vec<String> = map
                    .pairs
                    .iter()
                    .map(|(key, val)| format!("{}:{}", key, val))
                    .collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            ExprKind::Call(call) => write!(f, "{}({})", call.name, join(&call.args, ", ")),
            ExprKind::Unary(unary) => write!(f, "({}{})", unary.op, unary.right),
            ExprKind::Binary(binary) => match binary.op {
                Operator::And | Operator::Or => {
                    write!(f, "({} {} {})", binary.left, binary.op, binary.right)
                }
                _ => write!(f, "({}{}{})", binary.left, binary.op, binary.right),
            },
            ExprKind::Index(index) => write!(f, "({}[{}])", index.left, index.index),
            ExprKind::Slice(slice) => {
                let start = slice.start.as_ref().map(|e| e.to_string()).unwrap_or_default();
                let end = slice.end.as_ref().map(|e| e.to_string()).unwrap_or_default();
                write!(f, "({}[{}:{}])", slice.left, start, end)
            }
            ExprKind::Dot(dot) => write!(f, "({}.{})", dot.left, dot.key),
            ExprKind::Group(group) => write!(f, "{}", group.expr),
            ExprKind::TypeAssertion(ta) => write!(f, "({}.({}))", ta.left, self.t),
            ExprKind::Any(any) => write!(f, "any({})", any.value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub var: Var,
    pub value: Expr,
}

impl fmt::Display for Decl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.var, self.value)
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub token: Token,
    pub statements: Vec<Stmt>,
    pub id: NodeId,
    pub always_terminates: bool,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&newline_list(&self.statements))
    }
}

#[derive(Debug, Clone)]
pub struct ConditionalBlock {
    pub token: Token,
    pub condition: Expr,
    pub block: Block,
    pub id: NodeId,
}

impl fmt::Display for ConditionalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {{\n{}}}", self.condition, self.block)
    }
}

#[derive(Debug, Clone)]
pub struct StepRange {
    pub start: Option<Expr>,
    pub stop: Expr,
    pub step: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum ForRange {
    Step(StepRange),
    /// Iteration over an array, string or map.
    Expr(Expr),
}

impl fmt::Display for ForRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForRange::Step(r) => {
                let start = r.start.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "0".into());
                let step = r.step.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "1".into());
                write!(f, "{} {} {}", start, r.stop, step)
            }
            ForRange::Expr(e) => write!(f, "{}", e),
        }
    }
}

/// A blank line or a line holding only a comment.
#[derive(Debug, Clone)]
pub struct EmptyStmt;

#[derive(Debug, Clone)]
pub struct TypedDeclStmt {
    pub decl: Decl,
}

#[derive(Debug, Clone)]
pub struct InferredDeclStmt {
    pub decl: Decl,
}

#[derive(Debug, Clone)]
pub struct AssignmentStmt {
    pub target: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct FuncCallStmt {
    pub call: FuncCall,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct BreakStmt;

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub if_block: ConditionalBlock,
    pub else_ifs: Vec<ConditionalBlock>,
    pub else_block: Option<Block>,
}

impl IfStmt {
    fn always_terminates(&self) -> bool {
        match &self.else_block {
            Some(else_block) if else_block.always_terminates => {
                self.if_block.block.always_terminates
                    && self.else_ifs.iter().all(|b| b.block.always_terminates)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub cond_block: ConditionalBlock,
}

#[derive(Debug, Clone)]
pub struct ForStmt {
    pub loop_var: Option<Var>,
    pub range: ForRange,
    pub block: Block,
}

#[derive(Debug, Clone)]
pub struct FuncDeclStmt {
    pub token: Token,
    pub signature: Rc<FuncSignature>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct EventHandlerStmt {
    pub token: Token,
    pub name: String,
    pub params: Vec<Var>,
    pub body: Block,
}

#[derive(Debug, Clone, From, TryInto)]
pub enum StmtKind {
    Empty(EmptyStmt),
    TypedDecl(TypedDeclStmt),
    InferredDecl(InferredDeclStmt),
    Assignment(AssignmentStmt),
    FuncCall(FuncCallStmt),
    Return(ReturnStmt),
    Break(BreakStmt),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    FuncDecl(Rc<FuncDeclStmt>),
    EventHandler(Rc<EventHandlerStmt>),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub token: Token,
    pub id: NodeId,
}

impl Stmt {
    pub fn new(kind: impl Into<StmtKind>, token: Token, id: NodeId) -> Self {
        Stmt {
            kind: kind.into(),
            token,
            id,
        }
    }

    pub fn always_terminates(&self) -> bool {
        match &self.kind {
            StmtKind::Return(_) | StmtKind::Break(_) => true,
            StmtKind::If(if_stmt) => if_stmt.always_terminates(),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, StmtKind::Empty(_))
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Empty(_) => Ok(()),
            StmtKind::TypedDecl(TypedDeclStmt { decl })
            | StmtKind::InferredDecl(InferredDeclStmt { decl }) => write!(f, "{}", decl),
            StmtKind::Assignment(a) => write!(f, "{} = {}", a.target, a.value),
            StmtKind::FuncCall(c) => {
                write!(f, "{}({})", c.call.name, join(&c.call.args, ", "))
            }
            StmtKind::Return(r) => match &r.value {
                Some(value) => write!(f, "return {}", value),
                None => f.write_str("return"),
            },
            StmtKind::Break(_) => f.write_str("break"),
            StmtKind::If(i) => {
                write!(f, "if {}", i.if_block)?;
                for else_if in &i.else_ifs {
                    write!(f, "else if{}", else_if)?;
                }
                if let Some(else_block) = &i.else_block {
                    write!(f, "else {{\n{}}}\n", else_block)?;
                }
                Ok(())
            }
            StmtKind::While(w) => write!(f, "while {}", w.cond_block),
            StmtKind::For(fs) => {
                f.write_str("for ")?;
                if let Some(var) = &fs.loop_var {
                    write!(f, "{} := ", var)?;
                }
                write!(f, "{} {{\n{}}}", fs.range, fs.block)
            }
            StmtKind::FuncDecl(fd) => {
                let sig = &fd.signature;
                let mut params = join(&sig.params, ", ");
                if let Some(variadic) = &sig.variadic_param {
                    params.push_str(&format!("{}...", variadic));
                }
                write!(f, "{}({}){{\n{}}}\n", sig.name, params, fd.body)
            }
            StmtKind::EventHandler(eh) => write!(f, "on {} {{\n{}}}\n", eh.name, eh.body),
        }
    }
}

fn newline_list(stmts: &[Stmt]) -> String {
    let mut out = join(stmts, "\n");
    out.push('\n');
    out
}

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub funcs: HashMap<String, Rc<FuncDeclStmt>>,
    pub event_handlers: HashMap<String, Rc<EventHandlerStmt>>,
    pub formatting: Formatting,
}

impl Program {
    pub fn event_handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.event_handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&newline_list(&self.statements))
    }
}
