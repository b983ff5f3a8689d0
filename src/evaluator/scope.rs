use std::collections::HashMap;

use super::value::Value;

/// Runtime variable storage. The first frame holds the globals; function
/// calls swap out every frame above it.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    stack: Vec<HashMap<String, Value>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        ScopeStack {
            stack: vec![HashMap::new()],
        }
    }
}

impl ScopeStack {
    pub fn nest(&mut self) {
        self.stack.push(HashMap::new());
    }

    pub fn unnest(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Starts a function body that only sees globals. The returned frames
    /// must be handed back to [`ScopeStack::leave_func`].
    pub fn enter_func(&mut self) -> Vec<HashMap<String, Value>> {
        let saved = self.stack.split_off(1);
        self.nest();
        saved
    }

    pub fn leave_func(&mut self, saved: Vec<HashMap<String, Value>>) {
        self.stack.truncate(1);
        self.stack.extend(saved);
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.stack.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    pub fn insert_global(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.stack.first_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.stack.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.stack
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_and_shadowing() {
        let mut scopes = ScopeStack::default();
        scopes.insert("x", Value::Num(1.0));
        scopes.nest();
        scopes.insert("x", Value::Num(2.0));
        assert_eq!(scopes.get("x"), Some(&Value::Num(2.0)));
        if let Some(x) = scopes.get_mut("x") {
            *x = Value::Num(3.0);
        }
        scopes.unnest();
        assert_eq!(scopes.get("x"), Some(&Value::Num(1.0)));
        scopes.unnest();
        assert_eq!(scopes.get("x"), Some(&Value::Num(1.0)));
    }

    #[test]
    fn functions_only_see_globals() {
        let mut scopes = ScopeStack::default();
        scopes.insert("g", Value::Bool(true));
        scopes.nest();
        scopes.insert("local", Value::Num(1.0));

        let saved = scopes.enter_func();
        assert!(scopes.get("local").is_none());
        assert_eq!(scopes.get("g"), Some(&Value::Bool(true)));
        scopes.insert("param", Value::Num(2.0));
        scopes.insert_global("g", Value::Bool(false));
        scopes.leave_func(saved);

        assert!(scopes.get("param").is_none());
        assert_eq!(scopes.get("local"), Some(&Value::Num(1.0)));
        assert_eq!(scopes.get("g"), Some(&Value::Bool(false)));
    }
}
