mod expression;
pub mod format;
mod scope;

use std::{collections::HashMap, fmt, rc::Rc};

use log::debug;

use crate::{
    ast::{
        AnyExpr, ArrayLiteral, AssignmentStmt, Block, BoolLiteral, BreakStmt, ConditionalBlock,
        Decl, EmptyStmt, EventHandlerStmt, Expr, ForRange, ForStmt, FuncCallStmt, FuncDeclStmt,
        FuncSignature, IfStmt, InferredDeclStmt, MapLiteral, NodeId, NumLiteral, Program,
        ReturnStmt, StepRange, Stmt, StmtKind, StringLiteral, TypedDeclStmt, Var, WhileStmt,
    },
    common::{quote, Error},
    lexer::Lexer,
    token::{Token, TokenKind},
    types::{Type, TypeName},
};

use self::{
    expression::wrap_any,
    format::Formatting,
    scope::{ScopeKind, Scopes},
};

/// Static declarations of everything the host provides: functions, event
/// handlers and global variables.
#[derive(Debug, Clone, Default)]
pub struct Builtins {
    pub funcs: HashMap<String, Rc<FuncSignature>>,
    pub event_handlers: HashMap<String, Rc<FuncSignature>>,
    pub globals: HashMap<String, Var>,
}

/// All errors found in a single parse, in the order they were found.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseErrors(pub Vec<Error>);

impl ParseErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn truncate(&self, len: usize) -> ParseErrors {
        ParseErrors(self.0.iter().take(len).cloned().collect())
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&lines.join("\n"))
    }
}

impl std::error::Error for ParseErrors {}

pub fn parse(source: &str, builtins: &Builtins) -> Result<Program, ParseErrors> {
    let mut parser = Parser::new(source, builtins);
    let program = parser.parse();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(ParseErrors(parser.errors))
    }
}

fn pluralize(n: usize, unit: &str) -> String {
    if n == 1 {
        unit.into()
    } else {
        format!("{}s", unit)
    }
}

fn quantify(n: usize, unit: &str) -> String {
    format!("{} {}", n, pluralize(n, unit))
}

fn ordinalize(n: usize) -> String {
    let suffix = match (n % 100, n % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    /// Index of the current token.
    pos: usize,
    errors: Vec<Error>,

    builtins: &'a Builtins,
    /// Signatures of all builtin and user defined functions.
    funcs: HashMap<String, Rc<FuncSignature>>,
    func_decls: HashMap<String, Rc<FuncDeclStmt>>,
    event_handlers: HashMap<String, Rc<EventHandlerStmt>>,

    scopes: Scopes,
    /// Whitespace significance, innermost construct last.
    wss: Vec<bool>,
    formatting: Formatting,
    next_id: NodeId,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, builtins: &'a Builtins) -> Self {
        let mut parser = Parser {
            tokens: Vec::new(),
            pos: 0,
            errors: Vec::new(),
            builtins,
            funcs: builtins.funcs.clone(),
            func_decls: HashMap::new(),
            event_handlers: HashMap::new(),
            scopes: Scopes::default(),
            wss: vec![false],
            formatting: Formatting::default(),
            next_id: 0,
        };
        let func_positions = parser.consume_tokens(Lexer::new(source).lex());
        parser.parse_func_signatures(&func_positions);
        parser
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Stores all tokens except illegal ones, which are reported. Returns
    /// the positions of all `func` keywords.
    fn consume_tokens(&mut self, tokens: Vec<Token>) -> Vec<usize> {
        let mut funcs = Vec::new();
        for token in tokens {
            match token.kind {
                TokenKind::Illegal => {
                    let message = match token.literal.as_str() {
                        "\"" => "unterminated string, missing \"".to_string(),
                        "invalid string" => "invalid string literal".to_string(),
                        literal => format!("illegal character {}", quote(literal)),
                    };
                    self.error_at(&token, &message);
                    continue;
                }
                TokenKind::Func => funcs.push(self.tokens.len()),
                _ => {}
            }
            self.tokens.push(token);
        }
        if self.tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, col, offset) = self
                .tokens
                .last()
                .map_or((1, 1, 0), |t| (t.line, t.col, t.span().end));
            self.tokens.push(Token {
                kind: TokenKind::Eof,
                literal: String::new(),
                offset,
                line,
                col,
            });
        }
        funcs
    }

    fn parse_func_signatures(&mut self, positions: &[usize]) {
        for &pos in positions {
            self.advance_to(pos);
            let Some((token, signature)) = self.parse_func_signature() else {
                continue;
            };
            let name = signature.name.clone();
            if self.builtins.globals.contains_key(&name) {
                let message = format!("cannot override builtin variable {}", quote(&name));
                self.error_at(&token, &message);
            }
            if self.builtins.funcs.contains_key(&name) {
                let message = format!("cannot override builtin function {}", quote(&name));
                self.error_at(&token, &message);
            } else if self.funcs.contains_key(&name) {
                let message = format!("redeclaration of function {}", quote(&name));
                self.error_at(&token, &message);
            }
            // the latest signature wins so that its body parses correctly
            self.funcs.insert(name, Rc::new(signature));
        }
    }

    pub fn parse(&mut self) -> Program {
        debug!("parsing {} tokens", self.tokens.len());
        self.scopes
            .push_with_return_type(ScopeKind::Program, None);
        for global in self.builtins.globals.values() {
            self.scopes.set_used(global.clone());
        }
        self.advance_to(0);

        let mut statements = Vec::new();
        let mut always_terminates = false;
        while self.cur().kind != TokenKind::Eof {
            let stmt = match self.cur().kind {
                TokenKind::Func => self.parse_func(),
                TokenKind::On => self.parse_event_handler(),
                _ => {
                    let token = self.cur().clone();
                    match self.parse_statement() {
                        Some(stmt) if always_terminates && !stmt.is_empty() => {
                            self.error_at(&token, "unreachable code");
                            None
                        }
                        Some(stmt) => {
                            always_terminates |= stmt.always_terminates();
                            Some(stmt)
                        }
                        None => None,
                    }
                }
            };
            if let Some(stmt) = stmt {
                statements.push(stmt);
            }
        }
        self.pop_scope();
        debug!(
            "parsed {} statements with {} errors",
            statements.len(),
            self.errors.len()
        );

        Program {
            statements,
            funcs: std::mem::take(&mut self.func_decls),
            event_handlers: std::mem::take(&mut self.event_handlers),
            formatting: std::mem::take(&mut self.formatting),
        }
    }

    fn next_id(&mut self) -> NodeId {
        self.next_id += 1;
        self.next_id
    }

    // token navigation

    fn look_at(&self, pos: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[pos.min(last)]
    }

    fn cur(&self) -> &Token {
        self.look_at(self.pos)
    }

    /// The token before the current one, whitespace included.
    fn prev_kind(&self) -> Option<TokenKind> {
        self.pos.checked_sub(1).map(|pos| self.look_at(pos).kind)
    }

    /// The token after the current one. Whitespace is skipped unless
    /// whitespace is significant.
    fn peek(&self) -> &Token {
        let next = self.look_at(self.pos + 1);
        if next.kind == TokenKind::Ws && !self.is_wss() {
            self.look_at(self.pos + 2)
        } else {
            next
        }
    }

    fn advance(&mut self) {
        self.advance_wss();
        if !self.is_wss() {
            self.advance_if_ws();
        }
    }

    /// Advances by exactly one token.
    fn advance_wss(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn advance_if_ws(&mut self) {
        if self.cur().kind == TokenKind::Ws {
            self.advance_wss();
        }
    }

    fn advance_to(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn advance_past_nl(&mut self) {
        while !matches!(self.cur().kind, TokenKind::Nl | TokenKind::Eof) {
            self.advance();
        }
        if self.cur().kind == TokenKind::Nl {
            self.advance();
        }
    }

    fn is_at_eol(&self) -> bool {
        matches!(
            self.cur().kind,
            TokenKind::Nl | TokenKind::Eof | TokenKind::Comment
        )
    }

    fn is_wss(&self) -> bool {
        self.wss.last().copied().unwrap_or(false)
    }

    fn push_wss(&mut self, wss: bool) {
        self.wss.push(wss);
    }

    fn pop_wss(&mut self) {
        self.wss.pop();
        if !self.is_wss() && self.cur().kind == TokenKind::Ws {
            self.advance();
        }
    }

    // errors

    fn error(&mut self, message: &str) {
        let err = self.cur().error_at(message);
        self.errors.push(err);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        self.errors.push(token.error_at(message));
    }

    fn assert_token(&mut self, kind: TokenKind) -> bool {
        if self.cur().kind == kind {
            return true;
        }
        let message = format!(
            "expected {}, got {}",
            kind.format_details(),
            self.cur().kind.format_details()
        );
        self.error(&message);
        false
    }

    fn assert_eol(&mut self) {
        if !self.is_at_eol() {
            let message = format!("expected end of line, found {}", self.cur().format_details());
            self.error(&message);
        }
    }

    fn assert_end(&mut self) {
        self.assert_token(TokenKind::End);
    }

    /// Closes the innermost scope and reports its unused variables.
    fn pop_scope(&mut self) {
        for var in self.scopes.pop() {
            let message = format!("{} declared but not used", quote(&var.name));
            self.error_at(&var.token, &message);
        }
    }

    // formatting side tables

    fn record_comment(&mut self, id: NodeId) {
        if let Some(comment) = self.cur_comment() {
            self.formatting.comments.insert(id, comment);
        }
    }

    fn cur_comment(&self) -> Option<String> {
        let cur = self.cur();
        (cur.kind == TokenKind::Comment).then(|| cur.literal.clone())
    }

    // statements

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.cur().kind {
            TokenKind::Ws => {
                self.advance();
                None
            }
            TokenKind::Nl | TokenKind::Comment => Some(self.parse_empty_stmt()),
            TokenKind::Ident => match self.peek().kind {
                TokenKind::Assign | TokenKind::Dot => self.parse_assignment_stmt(),
                TokenKind::Colon => self.parse_typed_decl_stmt(),
                TokenKind::Declare => self.parse_inferred_decl_stmt(),
                _ if self.is_func_call(&self.cur().literal) => self.parse_func_call_stmt(),
                TokenKind::LBracket => self.parse_assignment_stmt(),
                _ => {
                    let message = format!("unknown function {}", quote(&self.cur().literal));
                    self.error(&message);
                    self.advance_past_nl();
                    None
                }
            },
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Break => self.parse_break_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::If => self.parse_if_stmt(),
            _ => {
                let message = format!("unexpected input {}", self.cur().format_details());
                self.error(&message);
                self.advance_past_nl();
                None
            }
        }
    }

    fn parse_empty_stmt(&mut self) -> Stmt {
        let token = self.cur().clone();
        let id = self.next_id();
        if token.kind == TokenKind::Comment {
            self.record_comment(id);
            self.advance();
        }
        self.advance();
        Stmt::new(EmptyStmt, token, id)
    }

    fn parse_assignment_stmt(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        if self.is_func_call(&token.literal) {
            let message = format!(
                "cannot assign to {} as it is a function not a variable",
                quote(&token.literal)
            );
            self.error(&message);
            self.advance_past_nl();
            return None;
        }
        let Some(target) = self.parse_assignment_target() else {
            self.advance_past_nl();
            return None;
        };
        self.assert_token(TokenKind::Assign);
        self.advance();
        let Some(value) = self.parse_top_level_expr() else {
            self.advance_past_nl();
            return None;
        };
        if !target.t.accepts(&value.t) {
            let message = format!(
                "{} accepts values of type {}, found {}",
                quote(&target.to_string()),
                target.t,
                value.t
            );
            self.error_at(&token, &message);
        }
        self.assert_eol();
        let value = wrap_any(value, &target.t);
        let id = self.next_id();
        self.record_comment(id);
        self.advance_past_nl();
        Some(Stmt::new(AssignmentStmt { target, value }, token, id))
    }

    fn parse_assignment_target(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        self.advance();
        if token.literal == "_" {
            self.error_at(&token, "assignment to \"_\" not allowed");
            return None;
        }
        let Some(var) = self.scopes.get(&token.literal) else {
            let message = format!("unknown variable name {}", quote(&token.literal));
            self.error_at(&token, &message);
            return None;
        };
        let mut target = var_expr(var, token.clone());
        loop {
            target = match self.cur().kind {
                TokenKind::LBracket => {
                    if target.t == Type::STRING {
                        self.error_at(
                            &token,
                            "cannot index string on left side of \"=\", only on right",
                        );
                        return None;
                    }
                    self.parse_index_or_slice_expr(target, false)?
                }
                TokenKind::Dot => self.parse_dot_expr(target)?,
                _ => return Some(target),
            };
        }
    }

    /// Parses a function signature during the pre-pass over all `func`
    /// keywords, so that calls can be checked before the declaration.
    fn parse_func_signature(&mut self) -> Option<(Token, FuncSignature)> {
        let token = self.cur().clone();
        self.advance();
        if !self.assert_token(TokenKind::Ident) {
            self.advance_past_nl();
            return None;
        }
        let name = self.cur().literal.clone();
        self.advance();
        let mut return_type = Type::NONE;
        if self.cur().kind == TokenKind::Colon {
            self.advance();
            return_type = self.parse_type();
            if return_type.name == TypeName::Illegal {
                let message = format!("invalid return type: {}", self.cur().format_details());
                self.error_at(&token, &message);
            }
        }
        let mut params = Vec::new();
        while !self.is_at_eol() && self.cur().kind != TokenKind::Dot3 {
            self.assert_token(TokenKind::Ident);
            params.push(self.parse_typed_decl().var);
        }
        let mut variadic_param = None;
        if self.cur().kind == TokenKind::Dot3 {
            self.advance();
            if params.len() == 1 {
                variadic_param = params.pop();
            } else {
                self.error("invalid variadic parameter, must be used with single type");
            }
        }
        self.assert_eol();
        self.advance_past_nl();
        let signature = FuncSignature {
            name,
            params,
            variadic_param,
            return_type,
        };
        Some((token, signature))
    }

    fn parse_func(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        let id = self.next_id();
        self.advance();
        let name_token = self.cur().clone();
        // the signature has been parsed up front, only its comment is left
        while !matches!(self.cur().kind, TokenKind::Nl | TokenKind::Eof) {
            self.record_comment(id);
            self.advance();
        }
        self.advance_past_nl();

        let signature = self.funcs.get(&name_token.literal).cloned();
        let return_type = signature
            .as_ref()
            .map_or(Type::NONE, |s| s.return_type.clone());
        self.scopes
            .push_with_return_type(ScopeKind::Func, Some(return_type.clone()));
        if let Some(signature) = &signature {
            self.add_params_to_scope(signature);
        }
        let body = self.parse_block(&[TokenKind::End, TokenKind::Eof]);
        self.pop_scope();

        if return_type != Type::NONE && !body.always_terminates {
            self.error("missing return");
        }
        self.assert_end();
        self.advance();
        self.record_comment(body.id);
        self.advance_past_nl();

        let signature = signature.filter(|_| name_token.kind == TokenKind::Ident)?;
        if self.func_decls.contains_key(&signature.name) {
            return None; // reported with the signature
        }
        let decl = Rc::new(FuncDeclStmt {
            token: token.clone(),
            signature,
            body,
        });
        self.func_decls
            .insert(decl.signature.name.clone(), decl.clone());
        Some(Stmt::new(StmtKind::FuncDecl(decl), token, id))
    }

    fn add_params_to_scope(&mut self, signature: &FuncSignature) {
        for param in &signature.params {
            self.validate_var_decl(param, &param.token, true);
            self.scopes.set(param.clone());
        }
        if let Some(variadic) = &signature.variadic_param {
            self.validate_var_decl(variadic, &variadic.token, true);
            self.scopes.set(Var {
                t: Type::array(variadic.t.clone()),
                ..variadic.clone()
            });
        }
    }

    fn parse_event_handler(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        let id = self.next_id();
        self.advance();
        if !self.assert_token(TokenKind::Ident) {
            self.advance_past_nl();
            return None;
        }
        let name = self.cur().literal.clone();
        let mut register = false;
        if self.event_handlers.contains_key(&name) {
            self.error(&format!("redeclaration of on {}", name));
        } else if !self.builtins.event_handlers.contains_key(&name) {
            self.error(&format!("unknown event name {}", name));
        } else {
            register = true;
        }
        self.advance();
        let mut params = Vec::new();
        while !self.is_at_eol() {
            self.assert_token(TokenKind::Ident);
            params.push(self.parse_typed_decl().var);
        }
        self.record_comment(id);
        self.advance_past_nl();

        self.scopes
            .push_with_return_type(ScopeKind::EventHandler, Some(Type::NONE));
        self.add_event_params_to_scope(&name, &params);
        let body = self.parse_block(&[TokenKind::End, TokenKind::Eof]);
        self.pop_scope();
        self.assert_end();
        self.advance();
        self.record_comment(body.id);
        self.advance_past_nl();

        let handler = Rc::new(EventHandlerStmt {
            token: token.clone(),
            name: name.clone(),
            params,
            body,
        });
        if register {
            self.event_handlers.insert(name, handler.clone());
        }
        Some(Stmt::new(StmtKind::EventHandler(handler), token, id))
    }

    fn add_event_params_to_scope(&mut self, name: &str, params: &[Var]) {
        if params.is_empty() {
            return;
        }
        let Some(expected) = self.builtins.event_handlers.get(name).cloned() else {
            return;
        };
        if params.len() != expected.params.len() {
            let message = format!(
                "wrong number of parameters expected {}, got {}",
                expected.params.len(),
                params.len()
            );
            self.error(&message);
        }
        for (i, param) in params.iter().enumerate() {
            self.validate_var_decl(param, &param.token, true);
            if let Some(expected) = expected.params.get(i) {
                if !param.t.matches(&expected.t) {
                    let message = format!(
                        "wrong type for parameter {}, expected {}, got {}",
                        param.name, expected.t, param.t
                    );
                    self.error(&message);
                }
            }
            self.scopes.set(param.clone());
        }
    }

    fn parse_typed_decl_stmt(&mut self) -> Option<Stmt> {
        let decl = self.parse_typed_decl();
        let token = decl.var.token.clone();
        if decl.var.t.name != TypeName::Illegal && self.validate_var_decl(&decl.var, &token, false)
        {
            self.scopes.set(decl.var.clone());
            self.assert_eol();
        }
        let id = self.next_id();
        self.record_comment(id);
        self.advance_past_nl();
        Some(Stmt::new(TypedDeclStmt { decl }, token, id))
    }

    /// Parses declarations like `x:num` or `y:{}[]any`.
    fn parse_typed_decl(&mut self) -> Decl {
        let token = self.cur().clone();
        self.advance();
        self.advance();
        let t = self.parse_type();
        let value = self.zero_value(&t);
        if t.name == TypeName::Illegal {
            let message = format!("invalid type declaration for {}", quote(&token.literal));
            self.error_at(&token, &message);
        }
        let var = Var {
            name: token.literal.clone(),
            token,
            t,
        };
        Decl { var, value }
    }

    fn zero_value(&mut self, t: &Type) -> Expr {
        let token = self.cur().clone();
        match t.name {
            TypeName::Num => Expr::new(NumLiteral { value: 0.0 }, token, Type::NUM),
            TypeName::String => Expr::new(
                StringLiteral {
                    value: String::new(),
                },
                token,
                Type::STRING,
            ),
            TypeName::Any => {
                let inner = Expr::new(BoolLiteral { value: false }, token.clone(), Type::BOOL);
                let value = Box::new(inner);
                Expr::new(AnyExpr { value }, token, Type::ANY)
            }
            TypeName::Array => {
                let id = self.next_id();
                let elements = Vec::new();
                Expr::new(ArrayLiteral { elements, id }, token, t.clone())
            }
            TypeName::Map => {
                let id = self.next_id();
                let pairs = Vec::new();
                Expr::new(MapLiteral { pairs, id }, token, t.clone())
            }
            TypeName::Bool => Expr::new(BoolLiteral { value: false }, token, Type::BOOL),
            TypeName::Illegal | TypeName::None => {
                Expr::new(BoolLiteral { value: false }, token, Type::ILLEGAL)
            }
        }
    }

    fn validate_var_decl(&mut self, var: &Var, token: &Token, allow_underscore: bool) -> bool {
        let message = if self.builtins.globals.contains_key(&var.name) {
            format!("redeclaration of builtin variable {}", quote(&var.name))
        } else if self.scopes.in_local_scope(&var.name) {
            format!("redeclaration of {}", quote(&var.name))
        } else if self.funcs.contains_key(&var.name) {
            format!(
                "invalid declaration of {}, already used as function name",
                quote(&var.name)
            )
        } else if !allow_underscore && var.name == "_" {
            "declaration of anonymous variable \"_\" not allowed here".to_string()
        } else {
            return true;
        };
        self.error_at(token, &message);
        false
    }

    fn parse_inferred_decl_stmt(&mut self) -> Option<Stmt> {
        let stmt = self.parse_inferred_decl();
        self.advance_past_nl();
        stmt
    }

    fn parse_inferred_decl(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        self.advance();
        self.advance();
        let value_token = self.cur().clone();
        let Some(mut value) = self.parse_top_level_expr() else {
            let message = format!("invalid inferred declaration for {}", quote(&token.literal));
            self.error(&message);
            return None;
        };
        if value.t == Type::NONE {
            let message = format!(
                "invalid declaration, function {} has no return value",
                quote(&value_token.literal)
            );
            self.error(&message);
            return None;
        }
        value.infer();
        let var = Var {
            name: token.literal.clone(),
            token: token.clone(),
            t: value.t.infer().unfixed(),
        };
        if !self.validate_var_decl(&var, &token, false) {
            return None;
        }
        self.scopes.set(var.clone());
        self.assert_eol();
        let id = self.next_id();
        self.record_comment(id);
        let decl = Decl { var, value };
        Some(Stmt::new(InferredDeclStmt { decl }, token, id))
    }

    fn is_func_call(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    fn parse_func_call_stmt(&mut self) -> Option<Stmt> {
        let Some((token, call)) = self.parse_func_call() else {
            self.advance_past_nl();
            return None;
        };
        self.assert_eol();
        let id = self.next_id();
        self.record_comment(id);
        self.advance_past_nl();
        Some(Stmt::new(FuncCallStmt { call }, token, id))
    }

    /// Checks call arguments against the signature and wraps those passed
    /// to `any` parameters.
    fn check_args(&mut self, signature: &FuncSignature, args: Vec<Expr>) -> Vec<Expr> {
        let name = quote(&signature.name);
        if let Some(variadic) = &signature.variadic_param {
            for arg in &args {
                if !variadic.t.accepts(&arg.t) && !variadic.t.matches(&arg.t) {
                    let message = format!(
                        "{} takes variadic arguments of type {}, found {}",
                        name, variadic.t, arg.t
                    );
                    self.error_at(&arg.token, &message);
                }
            }
            return args
                .into_iter()
                .map(|arg| wrap_any(arg, &variadic.t))
                .collect();
        }
        let params = &signature.params;
        if params.len() != args.len() {
            let token = match args.get(params.len()) {
                Some(extra) => extra.token.clone(),
                None => self.cur().clone(),
            };
            let message = format!(
                "{} takes {}, found {}",
                name,
                quantify(params.len(), "argument"),
                args.len()
            );
            self.error_at(&token, &message);
            return args;
        }
        for (i, (arg, param)) in args.iter().zip(params).enumerate() {
            if !param.t.accepts(&arg.t) && !param.t.matches(&arg.t) {
                let message = format!(
                    "{} takes {} argument of type {}, found {}",
                    name,
                    ordinalize(i + 1),
                    param.t,
                    arg.t
                );
                self.error_at(&arg.token, &message);
            }
        }
        args.into_iter()
            .zip(params)
            .map(|(arg, param)| wrap_any(arg, &param.t))
            .collect()
    }

    fn parse_return_stmt(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        self.advance();
        let value_token = self.cur().clone();
        let (value, t) = if self.is_at_eol() {
            (None, Type::NONE)
        } else {
            match self.parse_top_level_expr() {
                Some(value) => {
                    self.assert_eol();
                    let t = value.t.clone();
                    (Some(value), t)
                }
                None => (None, Type::ILLEGAL),
            }
        };
        let mut value = value;
        match self.scopes.return_type().cloned() {
            None => self.error_at(&value_token, "return statement not allowed here"),
            Some(return_type) if !return_type.accepts(&t) => {
                let message = if return_type == Type::NONE && t != Type::NONE {
                    format!("expected no return value, found {}", t)
                } else {
                    format!("expected return value of type {}, found {}", return_type, t)
                };
                self.error_at(&value_token, &message);
            }
            Some(return_type) => value = value.map(|v| wrap_any(v, &return_type)),
        }
        let id = self.next_id();
        self.record_comment(id);
        self.advance_past_nl();
        Some(Stmt::new(ReturnStmt { value }, token, id))
    }

    fn parse_break_stmt(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        if !self.scopes.in_loop() {
            self.error("break is not in a loop");
        }
        self.advance();
        self.assert_eol();
        let id = self.next_id();
        self.record_comment(id);
        self.advance_past_nl();
        Some(Stmt::new(BreakStmt, token, id))
    }

    fn parse_for_stmt(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        let id = self.next_id();
        self.scopes.push(ScopeKind::For);
        let stmt = self.parse_for(token, id);
        if stmt.is_none() {
            self.scopes.pop();
        }
        stmt
    }

    fn parse_for(&mut self, token: Token, id: NodeId) -> Option<Stmt> {
        self.advance();
        let mut loop_var = None;
        if self.cur().kind == TokenKind::Ident {
            let var_token = self.cur().clone();
            let var = Var {
                name: var_token.literal.clone(),
                token: var_token.clone(),
                t: Type::NONE,
            };
            if !self.validate_var_decl(&var, &var_token, false) {
                self.advance_past_nl();
                return None;
            }
            self.advance();
            self.assert_token(TokenKind::Declare);
            self.advance();
            loop_var = Some(var);
        }
        if !self.assert_token(TokenKind::Range) {
            self.advance_past_nl();
            return None;
        }
        let range_token = self.cur().clone();
        self.advance();
        let Some(mut exprs) = self.parse_expr_list() else {
            self.advance_past_nl();
            return None;
        };
        if exprs.is_empty() {
            self.error("range cannot be empty");
            self.advance_past_nl();
            return None;
        }
        let t = exprs[0].t.clone();
        if exprs.len() > 1 && t != Type::NUM {
            let message = format!("range with more than one argument must be num, found {}", t);
            self.error(&message);
            self.advance_past_nl();
            return None;
        }
        self.assert_eol();
        let (range, var_type) = match t.name {
            TypeName::String | TypeName::Map => {
                (Some(ForRange::Expr(exprs.remove(0))), Type::STRING)
            }
            TypeName::Array => (Some(ForRange::Expr(exprs.remove(0))), t.infer().elem()),
            TypeName::Num => {
                let range = self.parse_step_range(exprs, &range_token);
                (range.map(ForRange::Step), Type::NUM)
            }
            _ => {
                let message = format!(
                    "expected num, string, array or map after range, found {}",
                    t
                );
                self.error(&message);
                (None, Type::ILLEGAL)
            }
        };
        if let Some(var) = &mut loop_var {
            var.t = var_type;
            self.scopes.set(var.clone());
        }
        self.record_comment(id);
        self.advance_past_nl();
        let block = self.parse_block(&[TokenKind::End, TokenKind::Eof]);
        self.pop_scope();
        self.assert_end();
        self.advance();
        self.record_comment(block.id);
        self.advance_past_nl();
        let range = range?;
        Some(Stmt::new(
            ForStmt {
                loop_var,
                range,
                block,
            },
            token,
            id,
        ))
    }

    fn parse_step_range(&mut self, mut exprs: Vec<Expr>, token: &Token) -> Option<StepRange> {
        if exprs.len() > 3 {
            let message = format!(
                "range can take up to 3 num arguments, found {}",
                exprs.len()
            );
            self.error_at(token, &message);
            return None;
        }
        for (i, expr) in exprs.iter().enumerate() {
            if expr.t != Type::NUM {
                let message = format!(
                    "range expects num type for {} argument, found {}",
                    ordinalize(i + 1),
                    expr.t
                );
                self.error_at(token, &message);
                return None;
            }
        }
        let step = if exprs.len() == 3 { exprs.pop() } else { None };
        let stop = exprs.pop()?;
        let start = exprs.pop();
        Some(StepRange { start, stop, step })
    }

    fn parse_while_stmt(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        let id = self.next_id();
        let cond_id = self.next_id();
        self.advance();
        self.scopes.push(ScopeKind::While);
        let condition = self.parse_condition();
        let comment = self.cur_comment();
        self.advance_past_nl();
        let block = self.parse_block(&[TokenKind::End, TokenKind::Eof]);
        self.pop_scope();
        if let Some(comment) = comment {
            self.formatting.comments.insert(cond_id, comment);
        }
        self.assert_end();
        self.advance();
        self.record_comment(block.id);
        self.advance_past_nl();
        let cond_block = ConditionalBlock {
            token: token.clone(),
            condition: condition?,
            block,
            id: cond_id,
        };
        Some(Stmt::new(WhileStmt { cond_block }, token, id))
    }

    fn parse_if_stmt(&mut self) -> Option<Stmt> {
        let token = self.cur().clone();
        let id = self.next_id();
        self.scopes.push(ScopeKind::If);
        let if_block = self.parse_if_conditional_block();
        self.pop_scope();

        let mut else_ifs = Vec::new();
        while self.cur().kind == TokenKind::Else && self.peek().kind == TokenKind::If {
            self.advance();
            self.scopes.push(ScopeKind::If);
            else_ifs.push(self.parse_if_conditional_block());
            self.pop_scope();
        }
        let mut else_block = None;
        if self.cur().kind == TokenKind::Else {
            self.advance();
            self.assert_eol();
            let comment = self.cur_comment();
            self.advance_past_nl();
            self.scopes.push(ScopeKind::If);
            let block = self.parse_block(&[TokenKind::End, TokenKind::Eof]);
            self.pop_scope();
            if let Some(comment) = comment {
                self.formatting.comments.insert(block.id, comment);
            }
            else_block = Some(block);
        }
        self.assert_end();
        self.advance();
        self.record_comment(id);
        self.advance_past_nl();

        let if_stmt = IfStmt {
            if_block: if_block?,
            else_ifs: else_ifs.into_iter().collect::<Option<Vec<_>>>()?,
            else_block,
        };
        Some(Stmt::new(if_stmt, token, id))
    }

    fn parse_if_conditional_block(&mut self) -> Option<ConditionalBlock> {
        let token = self.cur().clone();
        let id = self.next_id();
        self.advance();
        let condition = self.parse_condition();
        self.record_comment(id);
        self.advance_past_nl();
        let block = self.parse_block(&[TokenKind::End, TokenKind::Eof, TokenKind::Else]);
        Some(ConditionalBlock {
            token,
            condition: condition?,
            block,
            id,
        })
    }

    fn parse_condition(&mut self) -> Option<Expr> {
        let token = self.cur().clone();
        let condition = self.parse_top_level_expr()?;
        self.assert_eol();
        if condition.t != Type::BOOL {
            let message = format!("expected condition of type bool, found {}", condition.t);
            self.error_at(&token, &message);
        }
        Some(condition)
    }

    fn parse_block(&mut self, end_kinds: &[TokenKind]) -> Block {
        let token = self.cur().clone();
        let id = self.next_id();
        let mut statements = Vec::new();
        let mut always_terminates = false;
        while !end_kinds.contains(&self.cur().kind) {
            let stmt_token = self.cur().clone();
            let Some(stmt) = self.parse_statement() else {
                continue;
            };
            if always_terminates && !stmt.is_empty() {
                self.error_at(&stmt_token, "unreachable code");
                continue;
            }
            always_terminates |= stmt.always_terminates();
            statements.push(stmt);
        }
        if statements.is_empty() {
            self.error_at(&token, "at least one statement is required here");
        }
        Block {
            token,
            statements,
            id,
            always_terminates,
        }
    }

    fn parse_type(&mut self) -> Type {
        let kind = self.cur().kind;
        self.advance();
        match kind {
            TokenKind::Num => Type::NUM,
            TokenKind::String => Type::STRING,
            TokenKind::Bool => Type::BOOL,
            TokenKind::Any => Type::ANY,
            TokenKind::LBracket | TokenKind::LCurly => {
                let close = self.cur().kind;
                let is_array = kind == TokenKind::LBracket && close == TokenKind::RBracket;
                let is_map = kind == TokenKind::LCurly && close == TokenKind::RCurly;
                if !is_array && !is_map {
                    return Type::ILLEGAL;
                }
                self.advance();
                let sub = self.parse_type();
                match sub.name {
                    TypeName::Illegal => Type::ILLEGAL,
                    _ if is_array => Type::array(sub),
                    _ => Type::map(sub),
                }
            }
            _ => Type::ILLEGAL,
        }
    }
}

/// A variable read at `token`. Its type is fixed as it denotes storage.
fn var_expr(var: Var, token: Token) -> Expr {
    let t = var.t.fixed();
    let var = Var {
        token: token.clone(),
        ..var
    };
    Expr::new(var, token, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn test_builtins() -> Builtins {
        let mut builtins = Builtins::default();
        let print = FuncSignature {
            name: "print".into(),
            params: vec![],
            variadic_param: Some(Var::builtin("a", Type::ANY)),
            return_type: Type::NONE,
        };
        let len = FuncSignature {
            name: "len".into(),
            params: vec![Var::builtin("a", Type::ANY)],
            variadic_param: None,
            return_type: Type::NUM,
        };
        let down = FuncSignature {
            name: "down".into(),
            params: vec![Var::builtin("x", Type::NUM), Var::builtin("y", Type::NUM)],
            variadic_param: None,
            return_type: Type::NONE,
        };
        builtins.funcs.insert("print".into(), Rc::new(print));
        builtins.funcs.insert("len".into(), Rc::new(len));
        builtins.event_handlers.insert("down".into(), Rc::new(down));
        builtins
            .globals
            .insert("err".into(), Var::builtin("err", Type::BOOL));
        builtins
            .globals
            .insert("errmsg".into(), Var::builtin("errmsg", Type::STRING));
        builtins
    }

    fn parse_ok(input: &str) -> Program {
        let builtins = test_builtins();
        match parse(input, &builtins) {
            Ok(program) => program,
            Err(errs) => panic!("unexpected parse errors for {:?}:\n{}", input, errs),
        }
    }

    fn first_error(input: &str) -> String {
        let builtins = test_builtins();
        match parse(input, &builtins) {
            Ok(_) => panic!("expected parse errors for {:?}", input),
            Err(errs) => errs.truncate(1).to_string(),
        }
    }

    #[test]
    fn declarations() {
        let tests = [
            ("a := 1", "a=1"),
            ("a:bool", "a=false"),
            ("a:[]num", "a=[]"),
            ("a:{}[]num", "a={}"),
            ("a := [true]", "a=[true]"),
            ("a := []", "a=[]"),
            ("a := [[1 2] ([3 4])]", "a=[[1, 2], [3, 4]]"),
            ("a := {a:1 b:2}", "a={a:1, b:2}"),
            ("a := {digits: [] nums: [4]}", "a={digits:[], nums:[4]}"),
            ("a := [{}]", "a=[{}]"),
            ("a := {a:1 b:true}", "a={a:any(1), b:any(true)}"),
            ("a := [1 \"x\"]", "a=[any(1), any(\"x\")]"),
        ];
        for (input, want) in tests {
            let program = parse_ok(&format!("{}\nprint a", input));
            assert_eq!(program.to_string(), format!("{}\nprint(any(a))\n", want));
        }
        // values already of type any are passed on unwrapped
        let program = parse_ok("a:any\nprint a");
        assert_eq!(program.to_string(), "a=any(false)\nprint(a)\n");
    }

    #[test]
    fn empty_programs() {
        let tests = [
            ("", "\n"),
            ("\n", "\n"),
            ("\n\n\n", "\n\n\n"),
            (" ", "\n"),
            ("//blabla", "\n"),
            (" \n //blabla \n", "\n\n"),
        ];
        for (input, want) in tests {
            assert_eq!(parse_ok(input).to_string(), want, "input: {:?}", input);
        }
    }

    #[test]
    fn declaration_errors() {
        let tests = [
            ("a :invalid", "line 1 column 1: invalid type declaration for \"a\""),
            ("a :", "line 1 column 1: invalid type declaration for \"a\""),
            ("a :[]", "line 1 column 1: invalid type declaration for \"a\""),
            ("a :num[]", "line 1 column 7: expected end of line, found \"[\""),
            ("a := {}{", "line 1 column 8: expected end of line, found \"{\""),
            ("a :=:", "line 1 column 5: unexpected \":\""),
            ("a := {", "line 1 column 7: expected \"}\", got end of input"),
            ("a :num num", "line 1 column 8: expected end of line, found \"num\""),
            (
                "_ :num",
                "line 1 column 1: declaration of anonymous variable \"_\" not allowed here",
            ),
            (
                "_ := 0",
                "line 1 column 1: declaration of anonymous variable \"_\" not allowed here",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn func_calls() {
        let tests = [
            ("print", "print()"),
            ("print 123", "print(any(123))"),
            ("print 123 \"abc\"", "print(any(123), any(\"abc\"))"),
            ("len \"abc\"", "len(any(\"abc\"))"),
            ("len []", "len(any([]))"),
            ("a := len \"abc\"\nprint a", "a=len(any(\"abc\"))\nprint(any(a))"),
            ("print (len \"abc\")", "print(any(len(any(\"abc\"))))"),
        ];
        for (input, want) in tests {
            assert_eq!(parse_ok(input).to_string(), format!("{}\n", want));
        }
    }

    #[test]
    fn func_call_errors() {
        let tests = [
            ("len 2 2", "line 1 column 7: \"len\" takes 1 argument, found 2"),
            ("len", "line 1 column 4: \"len\" takes 1 argument, found 0"),
            (
                "a := print",
                "line 1 column 11: invalid declaration, function \"print\" has no return value",
            ),
            ("foo 0", "line 1 column 1: unknown function \"foo\""),
            (
                "len print",
                "line 1 column 5: function call must be parenthesized: (print ...)",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn argument_type_errors() {
        let input = "
func f3 a:num b:string
    print a b
end
f3 1 2
f3 \"1\" \"2\"
";
        let builtins = test_builtins();
        let errs = parse(input, &builtins).unwrap_err();
        assert_eq!(
            errs.to_string(),
            "line 5 column 6: \"f3\" takes 2nd argument of type string, found num\n\
             line 6 column 4: \"f3\" takes 1st argument of type num, found string"
        );
    }

    #[test]
    fn blocks() {
        let input = "
if true
    if true
        print \"TRUE\"
    end
end";
        let want = "
if (true) {
if (true) {
print(any(\"TRUE\"))
}
}
";
        assert_eq!(parse_ok(input).to_string(), want);
    }

    #[test]
    fn func_decl() {
        let input = "
c := 1
func nums1:num n1:num n2:num
    if c > 10
        print c
        return n1
    end
    return n2
end
func nums2 nums:num...
    print nums
end
func nums3 _:num
    print \"not yet implemented\"
end
";
        let program = parse_ok(input);
        assert_eq!(program.funcs.len(), 3);
        let nums1 = &program.funcs["nums1"];
        assert_eq!(nums1.signature.return_type, Type::NUM);
        assert_eq!(nums1.signature.params.len(), 2);
        assert_eq!(nums1.signature.params[0].name, "n1");
        assert_eq!(nums1.body.statements.len(), 2);
        assert_eq!(nums1.body.statements[1].to_string(), "return n2");
        let nums2 = &program.funcs["nums2"];
        assert!(nums2.signature.params.is_empty());
        assert_eq!(
            nums2.signature.variadic_param.as_ref().map(|v| v.t.clone()),
            Some(Type::NUM)
        );
    }

    #[test]
    fn return_errors() {
        let tests = [
            (
                "
func add:num
    return 1
    print \"boom\"
end
",
                "line 4 column 5: unreachable code",
            ),
            (
                "
func nums:num
    if true
        return 1
    else
        return 2
    end
    print \"boom\"
end
",
                "line 8 column 5: unreachable code",
            ),
            (
                "
return false
",
                "line 2 column 8: return statement not allowed here",
            ),
            (
                "
func nums:num
    if true
        return 1
    end
end
",
                "line 6 column 1: missing return",
            ),
            (
                "
on down
    return \"abc\"
end
",
                "line 3 column 12: expected no return value, found string",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn assignments() {
        let program = parse_ok(
            "
a := [0 2 3]
a[0] = 1
m := {name: \"mali\"}
m.sport = \"climbing\"
x:any
x = a
print a m x
",
        );
        let lines: Vec<String> = program.statements.iter().map(|s| s.to_string()).collect();
        assert_eq!(lines[2], "(a[0]) = 1");
        assert_eq!(lines[4], "(m.sport) = \"climbing\"");
        assert_eq!(lines[6], "x = any(a)");
    }

    #[test]
    fn assignment_errors() {
        let tests = [
            (
                "b:num\nb = true",
                "line 2 column 1: \"b\" accepts values of type num, found bool",
            ),
            ("a := 1\na = b", "line 2 column 5: unknown variable name \"b\""),
            ("a := 1\nb = a", "line 2 column 1: unknown variable name \"b\""),
            (
                "a := 1\na = []",
                "line 2 column 1: \"a\" accepts values of type num, found []",
            ),
            (
                "m := [{a:1} {b:2}]\nm[0]. a = 3\nprint m",
                "line 2 column 5: unexpected whitespace after \".\"",
            ),
            (
                "s := \"abc\"\ns[0] = \"x\"",
                "line 2 column 1: cannot index string on left side of \"=\", only on right",
            ),
            (
                "func fn:bool\n    return true\nend\nfn = 3",
                "line 4 column 1: cannot assign to \"fn\" as it is a function not a variable",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn any_composite_assignment() {
        // literals can be re-typed, variables of another element type cannot
        parse_ok("arr:[]any\narr = [1 2]\nprint arr");
        assert_eq!(
            first_error("arr:[]any\nnums := [1 2]\narr = nums\nprint arr"),
            "line 3 column 1: \"arr\" accepts values of type []any, found []num"
        );
    }

    #[test]
    fn unused_variables() {
        let tests = [
            ("\nx := 1\n", "line 2 column 1: \"x\" declared but not used"),
            (
                "\nx := 1\nif true\n    x := 1\nend\nprint x\n",
                "line 4 column 5: \"x\" declared but not used",
            ),
            (
                "\nx := 1\nfor i := range 10\n    x := 2 * i\nend\nprint x\n",
                "line 4 column 5: \"x\" declared but not used",
            ),
            (
                "\nx := 1\nfunc foo\n    x := 2\n    print x\nend\n",
                "line 2 column 1: \"x\" declared but not used",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn scope_errors() {
        let tests = [
            ("x := 1\nx := 2", "line 2 column 1: redeclaration of \"x\""),
            ("x :num\nx :string", "line 2 column 1: redeclaration of \"x\""),
            (
                "x :num\nfunc x\n   print \"abc\"\nend",
                "line 1 column 1: invalid declaration of \"x\", already used as function name",
            ),
            (
                "func x in:string in:string\n   print in\nend",
                "line 1 column 18: redeclaration of \"in\"",
            ),
            (
                "err := true",
                "line 1 column 1: redeclaration of builtin variable \"err\"",
            ),
            (
                "func errmsg\n   print 1\nend",
                "line 1 column 1: cannot override builtin variable \"errmsg\"",
            ),
            (
                "func len s:string\n   print s\nend",
                "line 1 column 1: cannot override builtin function \"len\"",
            ),
            (
                "func fox\n   print 1\nend\nfunc fox\n   print 2\nend",
                "line 4 column 1: redeclaration of function \"fox\"",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn control_flow_errors() {
        let tests = [
            (
                "\nif true\n    print \"x\"\n",
                "line 4 column 1: expected \"end\", got end of input",
            ),
            (
                "\nif true\nend",
                "line 3 column 1: at least one statement is required here",
            ),
            ("\nif\n    print 1\nend", "line 2 column 3: unexpected end of line"),
            (
                "\nif true\n    print 1\nelse\n    print 2\nelse if false\n    print 3\nend",
                "line 6 column 1: unexpected input \"else\"",
            ),
            (
                "\nwhile 1\n    print 1\nend",
                "line 2 column 7: expected condition of type bool, found num",
            ),
            ("\nbreak\n", "line 2 column 1: break is not in a loop"),
            (
                "\nwhile true\n    break\n    print 1\nend",
                "line 4 column 5: unreachable code",
            ),
            (
                "\nfor true\n    print 1\nend",
                "line 2 column 5: expected \"range\", got \"true\"",
            ),
            (
                "\nfor x := range 1 2 3 4\n    print x\nend",
                "line 2 column 10: range can take up to 3 num arguments, found 4",
            ),
            (
                "\nfor x := range true\n    print x\nend",
                "line 2 column 20: expected num, string, array or map after range, found bool",
            ),
            (
                "\nfor x := range 1 true\n    print x\nend",
                "line 2 column 10: range expects num type for 2nd argument, found bool",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn loops() {
        let program = parse_ok(
            "
for i := range 3 15 -1
    print i
end
for ch := range \"abc\"
    print ch
end
for range 2
    print \"x\"
end
while true
    break
end
",
        );
        assert_eq!(program.statements[1].to_string(), "for i := 3 15 (-1) {\nprint(any(i))\n}");
        let StmtKind::For(for_stmt) = &program.statements[2].kind else {
            panic!("expected for statement");
        };
        assert_eq!(for_stmt.loop_var.as_ref().map(|v| v.t.clone()), Some(Type::STRING));
    }

    #[test]
    fn event_handlers() {
        let program = parse_ok("on down x:num _:num\n    print x\nend\n");
        assert_eq!(program.event_handler_names(), vec!["down".to_string()]);

        let tests = [
            (
                "on down2\n    print 1\nend",
                "line 1 column 4: unknown event name down2",
            ),
            (
                "on down x:num\n    print x\nend",
                "line 2 column 5: wrong number of parameters expected 2, got 1",
            ),
            (
                "on down:num\n    print 1\nend",
                "line 1 column 8: expected identifier, got \":\"",
            ),
            (
                "on down\n    print 1\nend\non down\n    print 2\nend",
                "line 4 column 4: redeclaration of on down",
            ),
        ];
        for (input, want) in tests {
            assert_eq!(first_error(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn error_recovery() {
        let input = "
move 10 10
line 20 20

x := 12
print \"x:\" x
if x > 10
    print \"big x\"
end";
        let builtins = test_builtins();
        let mut parser = Parser::new(input, &builtins);
        let program = parser.parse();
        let errors: Vec<String> = parser.errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            errors,
            vec![
                "line 2 column 1: unknown function \"move\"",
                "line 3 column 1: unknown function \"line\"",
            ]
        );
        let want = "

x=12
print(any(\"x:\"), any(x))
if ((x>10)) {
print(any(\"big x\"))
}
";
        assert_eq!(program.to_string(), want);
    }

    #[test]
    fn illegal_tokens() {
        assert_eq!(
            first_error("print \"abc"),
            "line 1 column 7: unterminated string, missing \""
        );
        assert_eq!(first_error("x := 1 @ 2"), "line 1 column 8: illegal character \"@\"");
    }

    #[test]
    fn truncated_errors() {
        let input = "a\nb\nc\n";
        let builtins = test_builtins();
        let errs = parse(input, &builtins).unwrap_err();
        assert_eq!(errs.len(), 3);
        assert_eq!(errs.truncate(2).len(), 2);
        assert_eq!(errs.truncate(5).len(), 3);
    }

    #[test]
    fn ordinals() {
        assert_eq!(ordinalize(1), "1st");
        assert_eq!(ordinalize(2), "2nd");
        assert_eq!(ordinalize(3), "3rd");
        assert_eq!(ordinalize(4), "4th");
        assert_eq!(ordinalize(11), "11th");
        assert_eq!(ordinalize(22), "22nd");
        assert_eq!(quantify(1, "argument"), "1 argument");
        assert_eq!(quantify(0, "argument"), "0 arguments");
    }
}
