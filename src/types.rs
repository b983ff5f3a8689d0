use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeName {
    Illegal,
    Num,
    String,
    Bool,
    Any,
    Array,
    Map,
    /// Functions without return value, statements, and the element type
    /// of the empty literals `[]` and `{}`.
    None,
}

impl TypeName {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Illegal => "illegal",
            Self::Num => "num",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Any => "any",
            Self::Array => "array",
            Self::Map => "map",
            Self::None => "none",
        }
    }

    fn format(&self) -> &'static str {
        match self {
            Self::Illegal => "ILLEGAL",
            Self::Array => "[]",
            Self::Map => "{}",
            _ => self.name(),
        }
    }
}

/// A static Evy type. Composite types carry their element type in `sub`.
///
/// `fixed` marks the type of a value that lives in storage (a variable,
/// a function result). A fixed composite cannot be re-typed, so `[]any`
/// does not accept a fixed `[]num`, while it does accept the unfixed type
/// of an array literal such as `[1 2]`.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: TypeName,
    pub sub: Option<Box<Type>>,
    pub fixed: bool,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.sub == other.sub
    }
}

impl Eq for Type {}

impl Type {
    pub const ILLEGAL: Type = Type::basic(TypeName::Illegal);
    pub const NUM: Type = Type::basic(TypeName::Num);
    pub const STRING: Type = Type::basic(TypeName::String);
    pub const BOOL: Type = Type::basic(TypeName::Bool);
    pub const ANY: Type = Type::basic(TypeName::Any);
    pub const NONE: Type = Type::basic(TypeName::None);
    /// Builtin parameter type accepting arrays of any element type.
    pub const GENERIC_ARRAY: Type = Type::basic(TypeName::Array);
    /// Builtin parameter type accepting maps of any element type.
    pub const GENERIC_MAP: Type = Type::basic(TypeName::Map);

    const fn basic(name: TypeName) -> Type {
        Type {
            name,
            sub: None,
            fixed: false,
        }
    }

    pub fn array(sub: Type) -> Type {
        Type {
            name: TypeName::Array,
            sub: Some(Box::new(sub)),
            fixed: false,
        }
    }

    pub fn map(sub: Type) -> Type {
        Type {
            name: TypeName::Map,
            sub: Some(Box::new(sub)),
            fixed: false,
        }
    }

    /// The type of the literal `[]`.
    pub fn empty_array() -> Type {
        Type::array(Type::NONE)
    }

    /// The type of the literal `{}`.
    pub fn empty_map() -> Type {
        Type::map(Type::NONE)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.name, TypeName::Array | TypeName::Map)
    }

    pub fn is_empty(&self) -> bool {
        self.is_composite() && matches!(&self.sub, Some(sub) if sub.name == TypeName::None)
    }

    pub fn is_generic(&self) -> bool {
        self.is_composite() && self.sub.is_none()
    }

    pub fn is_any(&self) -> bool {
        self.name == TypeName::Any
    }

    /// Element type of a composite, `NONE` otherwise.
    pub fn elem(&self) -> Type {
        self.sub.as_deref().cloned().unwrap_or(Type::NONE)
    }

    /// Marks the type as living in storage.
    pub fn fixed(&self) -> Type {
        let mut t = self.clone();
        if self.is_composite() && !self.is_empty() && !self.is_generic() {
            t.fixed = true;
        }
        t
    }

    /// The type with storage marks removed, as used for new storage.
    pub fn unfixed(&self) -> Type {
        Type {
            name: self.name,
            sub: self.sub.as_ref().map(|sub| Box::new(sub.unfixed())),
            fixed: false,
        }
    }

    /// Reports whether a value of type `other` can be stored in a slot of
    /// this type.
    pub fn accepts(&self, other: &Type) -> bool {
        let mut left = Some(self);
        let mut right = Some(other);
        let mut right_fixed = false;
        let mut top = true;
        while let (Some(l), Some(r)) = (left, right) {
            if r.fixed {
                right_fixed = true;
            }
            if l == r {
                return true;
            }
            if l.name == TypeName::Any
                && r.name != TypeName::None
                && r.name != TypeName::Illegal
                && (top || !right_fixed)
            {
                return true;
            }
            if l.name != r.name {
                return false;
            }
            if l.is_generic() || r.is_empty() {
                return true;
            }
            left = l.sub.as_deref();
            right = r.sub.as_deref();
            top = false;
        }
        left.is_none() && right.is_none()
    }

    /// Operand compatibility for binary operators: equal types, or an
    /// empty composite against a composite of the same kind.
    pub fn matches(&self, other: &Type) -> bool {
        let mut left = Some(self);
        let mut right = Some(other);
        while let (Some(l), Some(r)) = (left, right) {
            if l == r {
                return true;
            }
            if l.name != r.name {
                return false;
            }
            if l.is_empty() || r.is_empty() {
                return true;
            }
            left = l.sub.as_deref();
            right = r.sub.as_deref();
        }
        left.is_none() && right.is_none()
    }

    /// Resolves the element type of empty literals to `any`, e.g. for
    /// `x := []`.
    pub fn infer(&self) -> Type {
        if !self.is_composite() || self.is_generic() {
            return self.clone();
        }
        if self.is_empty() {
            return Type {
                name: self.name,
                sub: Some(Box::new(Type::ANY)),
                fixed: self.fixed,
            };
        }
        Type {
            name: self.name,
            sub: self.sub.as_ref().map(|sub| Box::new(sub.infer())),
            fixed: self.fixed,
        }
    }
}

/// Element type of an array or map literal with elements of the given
/// types. Mixed element types combine to `any`.
pub fn combine_types(types: &[Type]) -> Type {
    let Some((first, rest)) = types.split_first() else {
        return Type::NONE;
    };
    let mut combined = first.clone();
    for t in rest {
        if combined == *t {
            continue;
        }
        if t.fixed || combined.fixed {
            return Type::ANY;
        }
        if t.is_composite() && t.name == combined.name {
            if t.is_empty() {
                // keep combined
            } else if combined.is_empty() {
                combined = t.clone();
            } else {
                let sub = combine_types(&[t.elem(), combined.elem()]);
                combined = Type {
                    name: t.name,
                    sub: Some(Box::new(sub)),
                    fixed: false,
                };
            }
            continue;
        }
        return Type::ANY;
    }
    combined
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.format())?;
        match &self.sub {
            Some(sub) if !self.is_empty() => write!(f, "{}", sub),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num_array() -> Type {
        Type::array(Type::NUM)
    }

    #[test]
    fn display() {
        assert_eq!(Type::NUM.to_string(), "num");
        assert_eq!(num_array().to_string(), "[]num");
        assert_eq!(Type::map(Type::array(Type::STRING)).to_string(), "{}[]string");
        assert_eq!(Type::empty_array().to_string(), "[]");
        assert_eq!(Type::GENERIC_MAP.to_string(), "{}");
        assert_eq!(Type::ILLEGAL.to_string(), "ILLEGAL");
        assert_eq!(Type::NONE.name.name(), "none");
    }

    #[test]
    fn equality_ignores_fixed() {
        let t1 = Type::array(Type::ANY);
        let t2 = Type::array(Type::ANY).fixed();
        assert_eq!(t1, t2);
        assert_ne!(num_array(), Type::array(Type::STRING));
        assert_ne!(Type::GENERIC_ARRAY, num_array());
    }

    #[test]
    fn any_accepts_everything_but_none() {
        for t in [
            Type::NUM,
            Type::STRING,
            Type::BOOL,
            num_array(),
            Type::map(Type::BOOL),
            num_array().fixed(),
        ] {
            assert!(Type::ANY.accepts(&t), "any should accept {}", t);
        }
        assert!(!Type::ANY.accepts(&Type::NONE));
        assert!(!Type::ANY.accepts(&Type::ILLEGAL));
        assert!(!Type::NUM.accepts(&Type::BOOL));
        assert!(Type::NUM.accepts(&Type::NUM));
    }

    #[test]
    fn nested_composites() {
        let any_array = Type::array(Type::ANY);
        // literal `[1 2]` may become `[]any`
        assert!(any_array.accepts(&num_array()));
        // a `[]num` variable may not
        assert!(!any_array.accepts(&num_array().fixed()));
        assert!(!num_array().accepts(&any_array));
        assert!(num_array().accepts(&Type::empty_array()));
        assert!(!Type::map(Type::NUM).accepts(&Type::empty_array()));
        assert!(Type::GENERIC_ARRAY.accepts(&num_array().fixed()));
        assert!(!Type::GENERIC_ARRAY.accepts(&Type::map(Type::NUM)));
        let nested = Type::array(Type::array(Type::ANY));
        assert!(nested.accepts(&Type::array(num_array())));
        assert!(!nested.accepts(&Type::array(num_array()).fixed()));
    }

    #[test]
    fn matches_empty() {
        assert!(num_array().matches(&Type::empty_array()));
        assert!(Type::empty_array().matches(&num_array()));
        assert!(!num_array().matches(&Type::array(Type::STRING)));
        assert!(!Type::NUM.matches(&Type::STRING));
    }

    #[test]
    fn infer_nested_empty() {
        let t = Type::array(Type::empty_array());
        assert_eq!(t.infer(), Type::array(Type::array(Type::ANY)));
        assert_eq!(Type::empty_map().infer(), Type::map(Type::ANY));
        assert_eq!(Type::NUM.infer(), Type::NUM);
    }

    #[test]
    fn combine() {
        assert_eq!(combine_types(&[Type::NUM, Type::NUM]), Type::NUM);
        assert_eq!(combine_types(&[Type::NUM, Type::STRING]), Type::ANY);
        assert_eq!(
            combine_types(&[Type::empty_array(), num_array()]),
            num_array()
        );
        assert_eq!(
            combine_types(&[num_array(), Type::array(Type::STRING)]),
            Type::array(Type::ANY)
        );
        assert_eq!(
            combine_types(&[num_array().fixed(), Type::array(Type::STRING)]),
            Type::ANY
        );
    }
}
