use std::rc::Rc;

use colored::Colorize;

/// Size of a machine word on the target in bytes
pub const WORD_SIZE: usize = 8;

/// A source language type. Types are small immutable values: compound types
/// share their payload behind an [`Rc`] so cloning never copies a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// int64
    Int64,
    /// bool
    Bool,
    /// The result "type" of procedures. Also the pointee of `null`.
    Unknown,
    /// T*
    Pointer(Rc<Type>),
    /// T[length]
    ///
    /// A fixed size run of `length` T's stored contiguously
    List { ty: Rc<Type>, length: usize },
}

impl Type {
    pub fn pointer_to(ty: Type) -> Self {
        Self::Pointer(Rc::new(ty))
    }

    pub fn list_of(ty: Type, length: usize) -> Self {
        Self::List {
            ty: Rc::new(ty),
            length,
        }
    }

    /// The type of the `null` literal
    pub fn null() -> Self {
        Self::pointer_to(Self::Unknown)
    }

    pub fn size_of(&self) -> usize {
        match self {
            Type::Int64 | Type::Bool | Type::Pointer(_) => WORD_SIZE,
            Type::List { ty, length } => length * ty.size_of(),
            Type::Unknown => 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Structural type equality used by every typing rule. Pointer types are
    /// additionally compatible when either side points to an unconstrained
    /// target, which is how `null` is accepted wherever a pointer is expected.
    pub fn matches(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Pointer(lhs), Type::Pointer(rhs)) => {
                lhs.is_unknown() || rhs.is_unknown() || lhs.matches(rhs)
            }
            (
                Type::List { ty: lhs, length: l },
                Type::List {
                    ty: rhs,
                    length: r,
                },
            ) => l == r && lhs.matches(rhs),
            (lhs, rhs) => lhs == rhs,
        }
    }

    /// Element type of a list, if this is one
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List { ty, .. } => Some(ty),
            _ => None,
        }
    }

    /// Pointee type of a pointer, if this is one
    pub fn pointee_type(&self) -> Option<&Type> {
        match self {
            Type::Pointer(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn colored(&self) -> colored::ColoredString {
        self.to_string().yellow()
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int64 => write!(f, "int64"),
            Self::Bool => write!(f, "bool"),
            Self::Unknown => write!(f, "<unknown>"),
            Self::Pointer(ty) => write!(f, "{ty}*"),
            Self::List { ty, length } => write!(f, "{ty}[{length}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(Type::Int64.size_of(), 8);
        assert_eq!(Type::Bool.size_of(), 8);
        assert_eq!(Type::pointer_to(Type::list_of(Type::Int64, 100)).size_of(), 8);
        assert_eq!(Type::list_of(Type::Bool, 10).size_of(), 80);
        assert_eq!(
            Type::list_of(Type::list_of(Type::Int64, 3), 4).size_of(),
            96
        );
        assert_eq!(Type::Unknown.size_of(), 0);
    }

    #[test]
    fn null_matches_any_pointer_but_nothing_else() {
        let int_ptr = Type::pointer_to(Type::Int64);
        let ptr_ptr = Type::pointer_to(Type::pointer_to(Type::Bool));

        assert!(Type::null().matches(&int_ptr));
        assert!(ptr_ptr.matches(&Type::null()));
        assert!(!Type::null().matches(&Type::Int64));
        assert!(!int_ptr.matches(&Type::pointer_to(Type::Bool)));
        assert!(!int_ptr.matches(&ptr_ptr));
    }

    #[test]
    fn lists_compare_element_type_and_length() {
        let a = Type::list_of(Type::Int64, 4);

        assert!(a.matches(&Type::list_of(Type::Int64, 4)));
        assert!(!a.matches(&Type::list_of(Type::Int64, 5)));
        assert!(!a.matches(&Type::list_of(Type::Bool, 4)));
    }

    #[test]
    fn rendering_uses_source_syntax() {
        assert_eq!(Type::pointer_to(Type::Int64).to_string(), "int64*");
        assert_eq!(
            Type::list_of(Type::pointer_to(Type::Bool), 3).to_string(),
            "bool*[3]"
        );
        assert_eq!(Type::Unknown.to_string(), "<unknown>");
    }
}
