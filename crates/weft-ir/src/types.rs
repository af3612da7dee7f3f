//! IR types.
//!
//! Types arrive from the frontend fully resolved: generic bindings are
//! substituted and nullability/fallibility are explicit wrappers. The
//! backend's describe pass flattens these wrappers into a normalized
//! view; this module only defines the wire shape and a few structural
//! accessors.

use serde::{Deserialize, Serialize};

use crate::name::Name;

/// A resolved IR type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrType {
    /// A nominal type: a builtin (`Int`, `String`, `List`, ...), a
    /// user-declared class or interface, or a bound type parameter.
    Named { name: Name, args: Vec<IrType> },
    /// A function type.
    Function(Box<Signature>),
    /// `T?` — the wrapped type or null.
    Nullable(Box<IrType>),
    /// A computation that may short-circuit with an error instead of
    /// producing the wrapped type (the "bubble" marker).
    Fallible(Box<IrType>),
    /// The uninhabited type; no value of it can be expressed in Rust.
    Never,
}

impl IrType {
    pub fn named(name: impl Into<Name>) -> Self {
        IrType::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn void() -> Self {
        IrType::named("Void")
    }

    pub fn int() -> Self {
        IrType::named("Int")
    }

    pub fn boolean() -> Self {
        IrType::named("Boolean")
    }

    pub fn string() -> Self {
        IrType::named("String")
    }

    pub fn nullable(self) -> Self {
        IrType::Nullable(Box::new(self))
    }

    pub fn fallible(self) -> Self {
        IrType::Fallible(Box::new(self))
    }

    /// The nominal name, looking through nullable/fallible wrappers.
    pub fn core_name(&self) -> Option<&Name> {
        match self {
            IrType::Named { name, .. } => Some(name),
            IrType::Nullable(inner) | IrType::Fallible(inner) => inner.core_name(),
            IrType::Function(_) | IrType::Never => None,
        }
    }

    /// Whether any layer of this type is the fallible wrapper.
    pub fn is_fallible(&self) -> bool {
        match self {
            IrType::Fallible(_) => true,
            IrType::Nullable(inner) => inner.is_fallible(),
            _ => false,
        }
    }
}

/// A resolved function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<IrType>,
    pub ret: IrType,
}

impl Signature {
    pub fn new(params: Vec<IrType>, ret: IrType) -> Self {
        Self { params, ret }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_name_looks_through_wrappers() {
        let ty = IrType::string().nullable().fallible();
        assert_eq!(ty.core_name(), Some(&Name::new("String")));
        assert!(ty.is_fallible());
        assert!(!IrType::int().nullable().is_fallible());
    }

    #[test]
    fn function_types_have_no_core_name() {
        let ty = IrType::Function(Box::new(Signature::new(vec![IrType::int()], IrType::void())));
        assert_eq!(ty.core_name(), None);
    }
}
