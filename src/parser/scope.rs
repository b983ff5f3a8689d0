use crate::{ast::Var, types::Type};

/// The construct that opened a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Program,
    Func,
    EventHandler,
    If,
    While,
    For,
}

#[derive(Debug, Clone)]
struct ScopeVar {
    var: Var,
    used: bool,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    vars: Vec<ScopeVar>,
    /// `None` where `return` is not allowed.
    return_type: Option<Type>,
}

/// Lexical scopes open at the current parse position, innermost last.
#[derive(Debug, Clone, Default)]
pub struct Scopes {
    stack: Vec<Scope>,
}

impl Scopes {
    /// Opens a scope that inherits the return type of the enclosing one.
    pub fn push(&mut self, kind: ScopeKind) {
        let return_type = self.return_type().cloned();
        self.push_with_return_type(kind, return_type);
    }

    pub fn push_with_return_type(&mut self, kind: ScopeKind, return_type: Option<Type>) {
        self.stack.push(Scope {
            kind,
            vars: Vec::new(),
            return_type,
        });
    }

    /// Closes the innermost scope, returning the variables that were
    /// declared in it but never read.
    pub fn pop(&mut self) -> Vec<Var> {
        self.stack
            .pop()
            .map(|scope| {
                scope
                    .vars
                    .into_iter()
                    .filter(|v| !v.used)
                    .map(|v| v.var)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn return_type(&self) -> Option<&Type> {
        self.stack.last().and_then(|s| s.return_type.as_ref())
    }

    pub fn in_local_scope(&self, name: &str) -> bool {
        self.stack
            .last()
            .map_or(false, |s| s.vars.iter().any(|v| v.var.name == name))
    }

    pub fn in_loop(&self) -> bool {
        self.stack
            .iter()
            .any(|s| matches!(s.kind, ScopeKind::While | ScopeKind::For))
    }

    /// Looks up `name` from the innermost scope outwards and marks it read.
    pub fn get(&mut self, name: &str) -> Option<Var> {
        if name == "_" {
            return None;
        }
        for scope in self.stack.iter_mut().rev() {
            if let Some(v) = scope.vars.iter_mut().find(|v| v.var.name == name) {
                v.used = true;
                return Some(v.var.clone());
            }
        }
        None
    }

    pub fn set(&mut self, var: Var) {
        self.insert(var, false);
    }

    /// Declares a variable that never counts as unused.
    pub fn set_used(&mut self, var: Var) {
        self.insert(var, true);
    }

    fn insert(&mut self, var: Var, used: bool) {
        if var.name == "_" {
            return;
        }
        if let Some(scope) = self.stack.last_mut() {
            scope.vars.push(ScopeVar { var, used });
        }
    }
}
