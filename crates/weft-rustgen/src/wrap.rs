//! The type coercion engine.
//!
//! `maybe_wrap` inserts exactly the wrapping a produced value needs to
//! satisfy its use site's wanted shape, in a fixed order so composition
//! is deterministic: interface widening first, then optionality
//! injection (lifted through `.map` when both sides are nullable, since
//! the widening function accepts the inner value, not the wrapper),
//! then fallibility. Matching cores after those steps are a no-op; no
//! double-wrapping happens.
//!
//! `maybe_clone` implements the clone-at-read policy: copyable cores
//! are shared bare, everything else clones when read unless the caller
//! already owns a transient value.

use weft_ir::Name;
use weft_rust_ast::{Expr, Pattern};

use crate::describe::{Core, Describe};
use crate::lower::Translator;

/// `Ok(expr)`
pub fn wrap_ok(expr: Expr) -> Expr {
    Expr::call_path("Ok", vec![expr])
}

/// `Some(expr)`
pub fn wrap_some(expr: Expr) -> Expr {
    Expr::call_path("Some", vec![expr])
}

/// `std::sync::Arc::new(expr)`
pub fn wrap_arc(expr: Expr) -> Expr {
    Expr::call_path("std::sync::Arc::new", vec![expr])
}

/// `std::sync::RwLock::new(expr)`
pub fn wrap_lock(expr: Expr) -> Expr {
    Expr::call_path("std::sync::RwLock::new", vec![expr])
}

/// `weft_core::read_locked(&expr)` — take a read guard, clone the value
/// out, release the guard before anything else runs.
pub fn read_locked(expr: Expr) -> Expr {
    Expr::call_path("weft_core::read_locked", vec![expr.reference()])
}

/// Clone policy without translator context (topper accessors).
pub fn maybe_clone_simple(expr: Expr, desc: &Describe) -> Expr {
    if desc.is_copy() {
        expr
    } else {
        expr.method_call("clone", vec![])
    }
}

impl Translator<'_> {
    /// Insert the wrapping needed to go from `given` to `wanted`.
    pub(crate) fn maybe_wrap(
        &mut self,
        expr: Expr,
        given: &Describe,
        wanted: Option<&Describe>,
    ) -> Expr {
        let Some(wanted) = wanted else {
            return expr;
        };
        let given_none = is_none_literal(&expr);
        // When both sides are nullable, any core adjustment applies to
        // the value inside the Option, so it must lift through `map`.
        let map_param = if given.nullable && wanted.nullable && !given_none {
            Some(self.unused_temp("it"))
        } else {
            None
        };
        let working = match &map_param {
            Some(param) => Expr::id(param),
            None => expr.clone(),
        };

        let mut result = working;
        if matches!(wanted.core, Some(Core::Function(_))) && !given_none {
            // Function values are shared handles; wrap plain functions
            // once, already-wrapped values never.
            if !self.is_function_value(&expr) {
                result = wrap_arc(result);
            }
        } else if wanted.same_core(given) {
            // Wrap-compatible cores need no widening.
        } else if wanted.is_interface(self.facts()) {
            if given.is_class(self.facts()) {
                // Concrete to interface: direct construction of the
                // dispatch wrapper.
                let owner = wanted.core_name().cloned().unwrap_or_else(|| Name::new(""));
                let callee = crate::types::user_type_path(&owner, &self.decls).join("new");
                result = Expr::call(Expr::Path(callee), vec![result]);
            } else if given.is_interface(self.facts()) {
                // Interface to interface needs a runtime-checked
                // upcast; target dispatch has no implicit subtyping.
                let to = wanted
                    .core_name()
                    .map(|name| weft_ir::IrType::named(name.as_str()));
                if let Some(to) = to {
                    let callee = self.cast_callee(&to);
                    result = Expr::call(callee, vec![result]).method_call("unwrap", vec![]);
                }
            }
            // Neither class nor interface: a special core (null, type
            // params); leave the value alone.
        }

        if !given.nullable && wanted.nullable {
            result = wrap_some(result);
        }

        result = match map_param {
            None => result,
            Some(param) => {
                if result == Expr::id(&param) {
                    // No inner change; no need to map at all.
                    expr
                } else {
                    expr.method_call(
                        "map",
                        vec![Expr::Closure {
                            is_move: false,
                            params: vec![Pattern::Id(param)],
                            body: Box::new(result),
                        }],
                    )
                }
            }
        };

        if !given.fallible && wanted.fallible {
            result = wrap_ok(result);
        }
        result
    }

    /// Clone-at-read policy. Trait-object receivers clone through
    /// `clone_boxed` so the handle type is preserved.
    pub(crate) fn maybe_clone(&self, expr: Expr, given: &Describe, avoid_clone: bool) -> Expr {
        if avoid_clone || given.is_copy() {
            return expr;
        }
        let is_self = matches!(&expr, Expr::Path(path) if path.segments == ["self"]);
        if is_self && given.is_interface(self.facts()) {
            expr.method_call("clone_boxed", vec![])
        } else {
            expr.method_call("clone", vec![])
        }
    }

    /// Whether an expression already evaluates to a shared function
    /// value (so wrapping it in another `Arc` would double-wrap).
    pub(crate) fn is_function_value(&self, expr: &Expr) -> bool {
        match expr {
            // Call results follow the convention of returning
            // already-shared function values.
            Expr::Call { .. } => true,
            Expr::MethodCall { subject, method, .. } if method == "clone" => {
                self.is_function_value(subject)
            }
            Expr::Path(path) if path.segments.len() == 1 => {
                let name = Name::new(path.segments[0].clone());
                self.decls.resolve(&name).is_some_and(|d| d.local)
            }
            _ => false,
        }
    }

    /// Whether equality on this type compares pointer identity rather
    /// than value structure.
    pub(crate) fn is_identifiable(&self, desc: &Describe) -> bool {
        match desc.core_name() {
            Some(name) => match name.as_str() {
                "Boolean" | "Int" | "Int64" | "Float64" | "String" | "Void" | "Null" => false,
                _ => {
                    // Known nominal types are identity-equatable unless
                    // they are type parameters bounded by Equatable;
                    // unknown names are type parameters, compared by
                    // value only when so bounded. The facts map covers
                    // every nominal type in the library.
                    self.facts().contains_key(name.as_str())
                }
            },
            None => false,
        }
    }
}

fn is_none_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(path) if path.segments == ["None"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::describe;
    use crate::lower::Translator;
    use std::collections::BTreeMap;
    use weft_common::Span;
    use weft_ir::{IrLibrary, IrModule, IrType, PackageMeta, TypeFacts, TypeKind};
    use weft_rust_ast::render::render_expr;

    fn library() -> IrLibrary {
        let mut type_facts = BTreeMap::new();
        type_facts.insert(
            "Circle".to_string(),
            TypeFacts {
                kind: TypeKind::Class,
                sealed_subtypes: None,
                has_mutable_field: false,
                supertypes: vec![weft_ir::Name::new("Shape")],
                methods: vec![],
            },
        );
        type_facts.insert(
            "Shape".to_string(),
            TypeFacts {
                kind: TypeKind::Interface,
                sealed_subtypes: None,
                has_mutable_field: false,
                supertypes: vec![],
                methods: vec![],
            },
        );
        IrLibrary {
            meta: PackageMeta {
                name: "demo".into(),
                version: "0.1.0".into(),
                license: None,
                authors: vec![],
                description: None,
            },
            modules: vec![IrModule {
                name: String::new(),
                src_path: vec![],
                imports: vec![],
                top_levels: vec![],
                span: Span::dummy(),
            }],
            type_facts,
        }
    }

    fn with_translator<R>(f: impl FnOnce(&mut Translator) -> R) -> R {
        let library = library();
        let mut translator = Translator::new(&library, &library.modules[0]);
        f(&mut translator)
    }

    #[test]
    fn optionality_injection() {
        with_translator(|t| {
            let given = describe(&IrType::int());
            let wanted = describe(&IrType::int().nullable());
            let wrapped = t.maybe_wrap(Expr::id("x"), &given, Some(&wanted));
            assert_eq!(render_expr(&wrapped), "Some(x)");
        });
    }

    #[test]
    fn fallibility_injection_after_optionality() {
        with_translator(|t| {
            let given = describe(&IrType::int());
            let wanted = describe(&IrType::int().nullable().fallible());
            let wrapped = t.maybe_wrap(Expr::id("x"), &given, Some(&wanted));
            assert_eq!(render_expr(&wrapped), "Ok(Some(x))");
        });
    }

    #[test]
    fn widening_lifts_through_map_when_both_nullable() {
        with_translator(|t| {
            let given = describe(&IrType::named("Circle").nullable());
            let wanted = describe(&IrType::named("Shape").nullable());
            let wrapped = t.maybe_wrap(Expr::id("c"), &given, Some(&wanted));
            assert_eq!(render_expr(&wrapped), "c.map(|it___1| Shape::new(it___1))");
        });
    }

    #[test]
    fn concrete_to_interface_constructs_wrapper() {
        with_translator(|t| {
            let given = describe(&IrType::named("Circle"));
            let wanted = describe(&IrType::named("Shape"));
            let wrapped = t.maybe_wrap(Expr::id("c"), &given, Some(&wanted));
            assert_eq!(render_expr(&wrapped), "Shape::new(c)");
        });
    }

    #[test]
    fn no_wanted_is_identity() {
        with_translator(|t| {
            let given = describe(&IrType::int());
            let wrapped = t.maybe_wrap(Expr::id("x"), &given, None);
            assert_eq!(render_expr(&wrapped), "x");
        });
    }

    #[test]
    fn matching_shapes_never_double_wrap() {
        with_translator(|t| {
            let nullable = describe(&IrType::int().nullable());
            let wrapped = t.maybe_wrap(Expr::id("x"), &nullable, Some(&nullable));
            assert_eq!(render_expr(&wrapped), "x");
        });
    }

    #[test]
    fn wrap_chain_equals_direct_wrap() {
        // wrap(wrap(e, given, mid), mid, wanted) == wrap(e, given, wanted)
        with_translator(|t| {
            let given = describe(&IrType::int());
            let mid = describe(&IrType::int().nullable());
            let wanted = describe(&IrType::int().nullable().fallible());
            let chained = {
                let step = t.maybe_wrap(Expr::id("e"), &given, Some(&mid));
                t.maybe_wrap(step, &mid, Some(&wanted))
            };
            let direct = t.maybe_wrap(Expr::id("e"), &given, Some(&wanted));
            assert_eq!(render_expr(&chained), render_expr(&direct));
        });
    }

    #[test]
    fn clone_at_read_policy() {
        with_translator(|t| {
            let copyable = describe(&IrType::int());
            let shared = describe(&IrType::string());
            assert_eq!(
                render_expr(&t.maybe_clone(Expr::id("n"), &copyable, false)),
                "n"
            );
            assert_eq!(
                render_expr(&t.maybe_clone(Expr::id("s"), &shared, false)),
                "s.clone()"
            );
            // Caller opt-out for transient values.
            assert_eq!(
                render_expr(&t.maybe_clone(Expr::id("s"), &shared, true)),
                "s"
            );
        });
    }
}
