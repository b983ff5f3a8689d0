use std::{cell::RefCell, fmt, rc::Rc};

use crate::{ast::format_num, evaluator::Pairs};

/// Values of the virtual machine. Arrays and maps share storage when
/// copied, like in the evaluator.
#[derive(Debug, Clone)]
pub enum Value {
    Num(f64),
    Bool(bool),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<Pairs<Value>>>),
    None,
    /// State of a running `for` loop. Only ever lives on the stack.
    Range(Box<RangeIter>),
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn map(pairs: Pairs<Value>) -> Value {
        Value::Map(Rc::new(RefCell::new(pairs)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "num",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::None => "none",
            Value::Range(_) => "range",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|(key, val)| b.get(key) == Some(val))
            }
            (Value::None, Value::None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => f.write_str(&format_num(*n)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => f.write_str(s),
            Value::Array(elements) => {
                let elements: Vec<String> =
                    elements.borrow().iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elements.join(" "))
            }
            Value::Map(pairs) => {
                let pairs: Vec<String> = pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v))
                    .collect();
                write!(f, "{{{}}}", pairs.join(" "))
            }
            Value::None => Ok(()),
            Value::Range(_) => f.write_str("<range>"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RangeIter {
    Step {
        next: f64,
        stop: f64,
        step: f64,
    },
    /// Reads the live array, so appends made by the loop body are seen.
    Array {
        elements: Rc<RefCell<Vec<Value>>>,
        next: usize,
    },
    String {
        chars: Vec<char>,
        next: usize,
    },
    /// Walks the keys present when the loop started, skipping deleted ones.
    Map {
        pairs: Rc<RefCell<Pairs<Value>>>,
        keys: Vec<String>,
        next: usize,
    },
}

impl RangeIter {
    /// Starts iterating over an array, string or map.
    pub fn over(value: &Value) -> Option<RangeIter> {
        let iter = match value {
            Value::Array(elements) => RangeIter::Array {
                elements: elements.clone(),
                next: 0,
            },
            Value::String(s) => RangeIter::String {
                chars: s.chars().collect(),
                next: 0,
            },
            Value::Map(pairs) => RangeIter::Map {
                keys: pairs.borrow().keys().to_vec(),
                pairs: pairs.clone(),
                next: 0,
            },
            _ => return None,
        };
        Some(iter)
    }
}

impl Iterator for RangeIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            RangeIter::Step { next, stop, step } => {
                let in_range = (*step > 0.0 && *next < *stop) || (*step < 0.0 && *next > *stop);
                if !in_range {
                    return None;
                }
                let value = *next;
                *next += *step;
                Some(Value::Num(value))
            }
            RangeIter::Array { elements, next } => {
                let element = elements.borrow().get(*next).cloned()?;
                *next += 1;
                Some(element)
            }
            RangeIter::String { chars, next } => {
                let ch = chars.get(*next)?;
                *next += 1;
                Some(Value::String(ch.to_string()))
            }
            RangeIter::Map { pairs, keys, next } => {
                while let Some(key) = keys.get(*next) {
                    *next += 1;
                    if pairs.borrow().contains(key) {
                        return Some(Value::String(key.clone()));
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(ns: &[f64]) -> Value {
        Value::array(ns.iter().map(|n| Value::Num(*n)).collect())
    }

    #[test]
    fn display_and_equality() {
        let mut pairs = Pairs::default();
        pairs.insert("a".to_string(), nums(&[1.0, 2.5]));
        pairs.insert("b".to_string(), Value::String("x".into()));
        let m = Value::map(pairs);
        assert_eq!(m.to_string(), "{a:[1 2.5] b:x}");
        assert_eq!(nums(&[1.0]), nums(&[1.0]));
        assert_ne!(nums(&[1.0]), nums(&[1.0, 2.0]));
        assert_ne!(Value::Num(1.0), Value::String("1".into()));
    }

    #[test]
    fn ranges() {
        let step = RangeIter::Step {
            next: 3.0,
            stop: 0.0,
            step: -1.5,
        };
        assert_eq!(step.collect::<Vec<_>>(), [Value::Num(3.0), Value::Num(1.5)]);

        let s = Value::String("hé".into());
        let chars: Vec<String> = RangeIter::over(&s)
            .into_iter()
            .flatten()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(chars, ["h", "é"]);
        assert!(RangeIter::over(&Value::Num(1.0)).is_none());
    }

    #[test]
    fn map_range_skips_deleted_keys() {
        let mut pairs = Pairs::default();
        for key in ["a", "b", "c"] {
            pairs.insert(key.to_string(), Value::Bool(true));
        }
        let m = Value::map(pairs);
        let Some(mut iter) = RangeIter::over(&m) else {
            panic!("maps are iterable");
        };
        assert_eq!(iter.next(), Some(Value::String("a".into())));
        if let Value::Map(pairs) = &m {
            pairs.borrow_mut().remove("b");
        }
        assert_eq!(iter.next(), Some(Value::String("c".into())));
        assert_eq!(iter.next(), None);
    }
}
