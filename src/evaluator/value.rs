use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use crate::{
    ast::format_num,
    common::quote,
    lexer::is_ident,
    types::{Type, TypeName},
};

use super::error::{EvalError, PanicKind};

/// Map entries in insertion order.
#[derive(Debug, Clone)]
pub struct Pairs<V = Value> {
    values: HashMap<String, V>,
    order: Vec<String>,
}

impl<V> Default for Pairs<V> {
    fn default() -> Self {
        Pairs {
            values: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<V> Pairs<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: String, value: V) {
        if !self.values.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.values.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.order
            .iter()
            .filter_map(move |k| self.values.get(k).map(|v| (k, v)))
    }
}

#[derive(Debug, Clone)]
pub struct ArrayVal {
    pub elements: Rc<RefCell<Vec<Value>>>,
    pub t: Type,
}

impl ArrayVal {
    pub fn new(elements: Vec<Value>, t: Type) -> Self {
        ArrayVal {
            elements: Rc::new(RefCell::new(elements)),
            t,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: f64) -> Result<Value, EvalError> {
        let elements = self.elements.borrow();
        let i = normalize_index(idx, elements.len(), false)?;
        Ok(elements[i].clone())
    }

    pub fn set(&self, idx: f64, value: Value) -> Result<(), EvalError> {
        let mut elements = self.elements.borrow_mut();
        let i = normalize_index(idx, elements.len(), false)?;
        elements[i] = value;
        Ok(())
    }

    pub fn slice(&self, start: Option<f64>, end: Option<f64>) -> Result<Value, EvalError> {
        let elements = self.elements.borrow();
        let (start, end) = normalize_slice(start, end, elements.len())?;
        let sliced = elements[start..end].to_vec();
        Ok(Value::Array(ArrayVal::new(sliced, self.t.clone())))
    }

    /// A new array holding the elements of both arrays.
    pub fn concat(&self, other: &ArrayVal) -> ArrayVal {
        let mut elements = self.elements.borrow().clone();
        elements.extend(other.elements.borrow().iter().cloned());
        let t = if self.t.is_empty() {
            other.t.clone()
        } else {
            self.t.clone()
        };
        ArrayVal::new(elements, t)
    }
}

#[derive(Debug, Clone)]
pub struct MapVal {
    pub pairs: Rc<RefCell<Pairs>>,
    pub t: Type,
}

impl MapVal {
    pub fn new(pairs: Pairs, t: Type) -> Self {
        MapVal {
            pairs: Rc::new(RefCell::new(pairs)),
            t,
        }
    }

    pub fn get(&self, key: &str) -> Result<Value, EvalError> {
        self.pairs
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::panic(PanicKind::MapKey, quote(key)))
    }

    pub fn insert(&self, key: String, value: Value) {
        self.pairs.borrow_mut().insert(key, value);
    }
}

/// A runtime value. Cloning copies scalars and shares the storage of
/// arrays and maps.
#[derive(Debug, Clone)]
pub enum Value {
    Num(f64),
    String(String),
    Bool(bool),
    /// A value in an `any` slot; never wraps another `Any`.
    Any(Box<Value>),
    Array(ArrayVal),
    Map(MapVal),
    None,
}

impl Value {
    pub fn any(value: Value) -> Value {
        match value {
            Value::Any(_) => value,
            value => Value::Any(Box::new(value)),
        }
    }

    /// The zero value of a declared type.
    pub fn zero(t: &Type) -> Value {
        match t.name {
            TypeName::Num => Value::Num(0.0),
            TypeName::String => Value::String(String::new()),
            TypeName::Bool => Value::Bool(false),
            TypeName::Any => Value::any(Value::Bool(false)),
            TypeName::Array => Value::Array(ArrayVal::new(Vec::new(), t.unfixed())),
            TypeName::Map => Value::Map(MapVal::new(Pairs::default(), t.unfixed())),
            TypeName::Illegal | TypeName::None => Value::None,
        }
    }

    pub fn type_of(&self) -> Type {
        match self {
            Value::Num(_) => Type::NUM,
            Value::String(_) => Type::STRING,
            Value::Bool(_) => Type::BOOL,
            Value::Any(_) => Type::ANY,
            Value::Array(arr) => arr.t.clone(),
            Value::Map(map) => map.t.clone(),
            Value::None => Type::NONE,
        }
    }

    /// The concrete value behind an `any` wrapper.
    pub fn unwrap_any(&self) -> &Value {
        match self {
            Value::Any(inner) => inner,
            value => value,
        }
    }

    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Any(a), Value::Any(b)) => a.type_of() == b.type_of() && a.equals(b),
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(&a.elements, &b.elements) {
                    return true;
                }
                let (a, b) = (a.elements.borrow(), b.elements.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                if Rc::ptr_eq(&a.pairs, &b.pairs) {
                    return true;
                }
                let (a, b) = (a.pairs.borrow(), b.pairs.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, val)| b.get(key).map_or(false, |other| val.equals(other)))
            }
            _ => false,
        }
    }

    /// The quoted form used by `%q`: strings are quoted, map keys that
    /// are not identifiers too.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => quote(s),
            Value::Any(inner) => inner.repr(),
            Value::Array(arr) => {
                let elements: Vec<String> =
                    arr.elements.borrow().iter().map(|e| e.repr()).collect();
                format!("[{}]", elements.join(" "))
            }
            Value::Map(map) => {
                let pairs: Vec<String> = map
                    .pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}:{}", key_repr(k), v.repr()))
                    .collect();
                format!("{{{}}}", pairs.join(" "))
            }
            value => value.to_string(),
        }
    }
}

fn key_repr(key: &str) -> String {
    if is_ident(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => f.write_str(&format_num(*n)),
            Value::String(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Any(inner) => write!(f, "{}", inner),
            Value::Array(arr) => {
                let elements: Vec<String> =
                    arr.elements.borrow().iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elements.join(" "))
            }
            Value::Map(map) => {
                let pairs: Vec<String> = map
                    .pairs
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v))
                    .collect();
                write!(f, "{{{}}}", pairs.join(" "))
            }
            Value::None => Ok(()),
        }
    }
}

/// Resolves a possibly negative index against `len`. Slice bounds may
/// point one past the last element.
pub fn normalize_index(idx: f64, len: usize, for_slice: bool) -> Result<usize, EvalError> {
    if idx.fract() != 0.0 || !idx.is_finite() {
        return Err(EvalError::panic(PanicKind::IndexValue, format_num(idx)));
    }
    let len = len as i64;
    let limit = if for_slice { len } else { len - 1 };
    let i = idx as i64;
    if i < -len || i > limit {
        return Err(EvalError::panic(PanicKind::Bounds, i.to_string()));
    }
    Ok(if i < 0 { (len + i) as usize } else { i as usize })
}

pub fn normalize_slice(
    start: Option<f64>,
    end: Option<f64>,
    len: usize,
) -> Result<(usize, usize), EvalError> {
    let start = match start {
        Some(idx) => normalize_index(idx, len, true)?,
        None => 0,
    };
    let end = match end {
        Some(idx) => normalize_index(idx, len, true)?,
        None => len,
    };
    if start > end {
        return Err(EvalError::panic(
            PanicKind::Slice,
            format!("{} > {}", start, end),
        ));
    }
    Ok((start, end))
}

/// Indexes a string by Unicode scalar value.
pub fn string_index(s: &str, idx: f64) -> Result<Value, EvalError> {
    let chars: Vec<char> = s.chars().collect();
    let i = normalize_index(idx, chars.len(), false)?;
    Ok(Value::String(chars[i].to_string()))
}

pub fn string_slice(s: &str, start: Option<f64>, end: Option<f64>) -> Result<Value, EvalError> {
    let chars: Vec<char> = s.chars().collect();
    let (start, end) = normalize_slice(start, end, chars.len())?;
    Ok(Value::String(chars[start..end].iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(ns: &[f64]) -> Value {
        let elements = ns.iter().map(|n| Value::Num(*n)).collect();
        Value::Array(ArrayVal::new(elements, Type::array(Type::NUM)))
    }

    fn array(v: &Value) -> &ArrayVal {
        match v {
            Value::Array(arr) => arr,
            _ => panic!("not an array: {}", v),
        }
    }

    #[test]
    fn display_forms() {
        assert_eq!(nums(&[1.0, 2.5]).to_string(), "[1 2.5]");
        let mut pairs = Pairs::default();
        pairs.insert("b".into(), Value::String("x".into()));
        pairs.insert("a".into(), Value::any(Value::Bool(true)));
        pairs.insert("my key".into(), Value::Num(1.0));
        let m = Value::Map(MapVal::new(pairs, Type::map(Type::ANY)));
        assert_eq!(m.to_string(), "{b:x a:true my key:1}");
        assert_eq!(m.repr(), "{b:\"x\" a:true \"my key\":1}");
        assert_eq!(Value::None.to_string(), "");
    }

    #[test]
    fn composites_are_shared_on_clone() {
        let a = nums(&[1.0, 2.0, 3.0]);
        let b = a.clone();
        array(&b).set(0.0, Value::Num(9.0)).expect("set");
        assert_eq!(array(&a).get(0.0).expect("get"), Value::Num(9.0));

        let mut s = Value::String("abc".into());
        let t = s.clone();
        s = Value::String("xyz".into());
        assert_eq!(t, Value::String("abc".into()));
        assert_ne!(s, t);
    }

    #[test]
    fn negative_indices_and_bounds() {
        let a = nums(&[1.0, 2.0, 3.0]);
        let arr = array(&a);
        assert_eq!(arr.get(-1.0).expect("last"), Value::Num(3.0));
        assert_eq!(arr.get(-3.0).expect("first"), Value::Num(1.0));
        for idx in [3.0, 5.0, -4.0] {
            let err = arr.get(idx).expect_err("out of bounds");
            assert_eq!(err.panic_kind(), Some(PanicKind::Bounds));
        }
        let err = arr.get(0.5).expect_err("fraction");
        assert_eq!(err.panic_kind(), Some(PanicKind::IndexValue));
    }

    #[test]
    fn slices() {
        let a = nums(&[1.0, 2.0, 3.0]);
        let arr = array(&a);
        assert_eq!(arr.slice(Some(1.0), None).expect("slice"), nums(&[2.0, 3.0]));
        assert_eq!(arr.slice(None, Some(-1.0)).expect("slice"), nums(&[1.0, 2.0]));
        assert_eq!(arr.slice(Some(3.0), None).expect("slice"), nums(&[]));
        let err = arr.slice(Some(2.0), Some(1.0)).expect_err("bad slice");
        assert_eq!(err.to_string(), "panic: bad slice: 2 > 1");

        assert_eq!(
            string_slice("héllo", Some(1.0), Some(3.0)).expect("slice"),
            Value::String("él".into())
        );
        assert_eq!(string_index("héllo", -4.0).expect("index"), Value::String("é".into()));
    }

    #[test]
    fn map_order_and_delete() {
        let m = MapVal::new(Pairs::default(), Type::map(Type::NUM));
        m.insert("x".into(), Value::Num(1.0));
        m.insert("y".into(), Value::Num(2.0));
        m.insert("x".into(), Value::Num(3.0));
        m.pairs.borrow_mut().remove("y");
        m.insert("y".into(), Value::Num(4.0));
        assert_eq!(m.pairs.borrow().keys(), ["x".to_string(), "y".to_string()]);
        assert_eq!(m.get("x").expect("x"), Value::Num(3.0));
        let err = m.get("z").expect_err("missing");
        assert_eq!(err.to_string(), "panic: no value for map key: \"z\"");
    }

    #[test]
    fn any_equality_compares_types() {
        let one = Value::any(Value::Num(1.0));
        assert_eq!(one, Value::any(Value::Num(1.0)));
        assert_ne!(one, Value::any(Value::String("1".into())));
        assert_eq!(Value::any(one.clone()).unwrap_any(), &Value::Num(1.0));
    }

    #[test]
    fn zero_values() {
        assert_eq!(Value::zero(&Type::NUM), Value::Num(0.0));
        assert_eq!(Value::zero(&Type::ANY), Value::any(Value::Bool(false)));
        let arr = Value::zero(&Type::array(Type::STRING).fixed());
        assert_eq!(arr.type_of().to_string(), "[]string");
        assert_eq!(arr.to_string(), "[]");
    }
}
