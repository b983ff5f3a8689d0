use std::collections::HashMap;

/// A variable with its global slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub index: usize,
}

/// Block scoped names mapped onto global slots. Shadowing variables get
/// slots of their own.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    globals: HashMap<String, Symbol>,
    blocks: Vec<HashMap<String, Symbol>>,
    next: usize,
}

impl SymbolTable {
    pub fn nest(&mut self) {
        self.blocks.push(HashMap::new());
    }

    pub fn unnest(&mut self) {
        self.blocks.pop();
    }

    /// Defines `name` in the innermost scope, or returns the symbol
    /// already defined there.
    pub fn define(&mut self, name: &str) -> Symbol {
        let next = &mut self.next;
        let scope = match self.blocks.last_mut() {
            Some(scope) => scope,
            None => &mut self.globals,
        };
        scope
            .entry(name.to_string())
            .or_insert_with(|| {
                let symbol = Symbol {
                    name: name.to_string(),
                    index: *next,
                };
                *next += 1;
                symbol
            })
            .clone()
    }

    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.blocks
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// Number of slots handed out.
    pub fn len(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_resolve() {
        let mut table = SymbolTable::default();
        assert_eq!(table.define("a").index, 0);
        assert_eq!(table.define("b").index, 1);
        assert_eq!(table.define("a").index, 0);
        assert_eq!(table.resolve("b").map(|s| s.index), Some(1));
        assert!(table.resolve("c").is_none());
    }

    #[test]
    fn shadowing_gets_new_slots() {
        let mut table = SymbolTable::default();
        table.define("a");
        table.nest();
        assert_eq!(table.define("a").index, 1);
        assert_eq!(table.resolve("a").map(|s| s.index), Some(1));
        table.unnest();
        assert_eq!(table.resolve("a").map(|s| s.index), Some(0));
        assert_eq!(table.define("c").index, 2);
        assert_eq!(table.len(), 3);
    }
}
