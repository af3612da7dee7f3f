//! Type descriptor normalization.
//!
//! Reduces a raw [`IrType`] into the uniform view every other component
//! consumes: a core type (or none), a nullability flag, and a
//! fallibility flag. Nested wrappers flatten in any order, so
//! `Fallible(Nullable(T))` and `Nullable(Fallible(T))` describe the
//! same shape.

use weft_ir::{IrType, Name, Signature, TypeFactsMap, TypeKind};

/// The normalized core of a type, with wrappers stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum Core {
    Named { name: Name, args: Vec<IrType> },
    Function(Signature),
}

/// The normalized `{core-or-none, nullable, fallible}` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Describe {
    pub core: Option<Core>,
    pub nullable: bool,
    pub fallible: bool,
}

/// Normalize a raw IR type.
pub fn describe(ty: &IrType) -> Describe {
    let mut nullable = false;
    let mut fallible = false;
    let mut current = ty;
    loop {
        match current {
            IrType::Nullable(inner) => {
                nullable = true;
                current = inner;
            }
            IrType::Fallible(inner) => {
                fallible = true;
                current = inner;
            }
            IrType::Named { name, args } => {
                // Bare Null and Never leave no core of their own.
                return match name.as_str() {
                    "Null" => Describe {
                        core: None,
                        nullable: true,
                        fallible,
                    },
                    _ => Describe {
                        core: Some(Core::Named {
                            name: name.clone(),
                            args: args.clone(),
                        }),
                        nullable,
                        fallible,
                    },
                };
            }
            IrType::Function(sig) => {
                return Describe {
                    core: Some(Core::Function((**sig).clone())),
                    nullable,
                    fallible,
                };
            }
            IrType::Never => {
                return Describe {
                    core: None,
                    nullable,
                    fallible,
                };
            }
        }
    }
}

impl Describe {
    /// The description of the unit/void type.
    pub fn unit() -> Self {
        describe(&IrType::void())
    }

    /// The nominal core name, if any.
    pub fn core_name(&self) -> Option<&Name> {
        match &self.core {
            Some(Core::Named { name, .. }) => Some(name),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.core, Some(Core::Function(_)))
    }

    /// Two descriptions are wrap-compatible when their cores agree;
    /// otherwise coercion must insert an explicit cast or dispatch.
    pub fn same_core(&self, other: &Describe) -> bool {
        match (&self.core, &other.core) {
            (Some(Core::Named { name: a, .. }), Some(Core::Named { name: b, .. })) => a == b,
            (Some(Core::Function(_)), Some(Core::Function(_))) => true,
            (None, None) => true,
            _ => false,
        }
    }

    /// Whether values of this type are shared without cloning.
    ///
    /// Nullability does not matter: `Option` of a machine type is still
    /// copyable.
    pub fn is_copy(&self) -> bool {
        match self.core_name() {
            Some(name) => matches!(
                name.as_str(),
                "Boolean" | "Int" | "Int64" | "Float64" | "Void"
            ),
            // A coreless description is the unit-like null case.
            None => !self.fallible,
        }
    }

    pub fn is_unit(&self) -> bool {
        !self.nullable
            && !self.fallible
            && self.core_name().is_some_and(|name| name.as_str() == "Void")
    }

    pub fn is_class(&self, facts: &TypeFactsMap) -> bool {
        self.core_name()
            .and_then(|name| facts.get(name.as_str()))
            .is_some_and(|f| f.kind == TypeKind::Class)
    }

    pub fn is_interface(&self, facts: &TypeFactsMap) -> bool {
        self.core_name()
            .and_then(|name| facts.get(name.as_str()))
            .is_some_and(|f| f.kind == TypeKind::Interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_wrappers_in_any_order() {
        let a = describe(&IrType::int().nullable().fallible());
        let b = describe(&IrType::int().fallible().nullable());
        assert_eq!(a, b);
        assert!(a.nullable && a.fallible);
        assert_eq!(a.core_name().unwrap().as_str(), "Int");
    }

    #[test]
    fn null_has_no_core() {
        let d = describe(&IrType::named("Null"));
        assert_eq!(d.core, None);
        assert!(d.nullable);
    }

    #[test]
    fn copy_classification() {
        assert!(describe(&IrType::int()).is_copy());
        assert!(describe(&IrType::boolean().nullable()).is_copy());
        assert!(!describe(&IrType::string()).is_copy());
        assert!(!describe(&IrType::named("Shape")).is_copy());
    }

    #[test]
    fn core_compatibility() {
        let int = describe(&IrType::int());
        let int_opt = describe(&IrType::int().nullable());
        let str_ = describe(&IrType::string());
        assert!(int.same_core(&int_opt));
        assert!(!int.same_core(&str_));
    }
}
