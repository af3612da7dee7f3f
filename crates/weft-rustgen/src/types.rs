//! IR type to Rust type translation.
//!
//! After describe-normalization, a type becomes its core's Rust form
//! wrapped in `Option` for nullability and `weft_core::Result` for
//! fallibility. Builtin cores map to machine types or `weft_core`
//! containers; user types map to their wrapper type names (classes and
//! interfaces alike are used through shared-handle wrappers).

use weft_ir::{IrType, Name, Signature};
use weft_rust_ast::{Path, Type};

use crate::decls::DeclTable;
use crate::describe::{describe, Core, Describe};
use crate::names;

/// Translate a raw IR type.
pub fn translate_type(ty: &IrType, decls: &DeclTable) -> Type {
    translate_described(&describe(ty), decls)
}

/// Translate a normalized description.
pub fn translate_described(desc: &Describe, decls: &DeclTable) -> Type {
    let core = match &desc.core {
        None => Type::Unit,
        Some(Core::Function(sig)) => function_type(sig, decls),
        Some(Core::Named { name, args }) => named_type(name, args, decls),
    };
    let core = if desc.nullable { core.option() } else { core };
    if desc.fallible {
        wrap_result_type(core)
    } else {
        core
    }
}

/// `weft_core::Result<T>` — the emitted code's fallible return shape.
pub fn wrap_result_type(ty: Type) -> Type {
    Type::generic("weft_core::Result", vec![ty])
}

/// `Arc<dyn Fn(..) -> .. + Send + Sync>` — all function values are
/// shared and thread-safe, since captures may cross threads.
fn function_type(sig: &Signature, decls: &DeclTable) -> Type {
    let params = sig.params.iter().map(|p| translate_type(p, decls)).collect();
    let ret = translate_type(&sig.ret, decls);
    Type::TraitObject {
        bounds: vec![
            Type::Fn {
                params,
                ret: Box::new(ret),
            },
            Type::path("Send"),
            Type::path("Sync"),
        ],
    }
    .arc()
}

fn named_type(name: &Name, args: &[IrType], decls: &DeclTable) -> Type {
    let translated_args = || -> Vec<Type> { args.iter().map(|a| translate_type(a, decls)).collect() };
    match name.as_str() {
        "Void" | "Null" => Type::Unit,
        "Boolean" => Type::path("bool"),
        "Int" => Type::path("i32"),
        "Int64" => Type::path("i64"),
        "Float64" => Type::path("f64"),
        "String" => Type::path("String").arc(),
        "List" => Type::generic("weft_core::List", translated_args()),
        "ListBuilder" => Type::generic("weft_core::ListBuilder", translated_args()),
        "Map" => Type::generic("weft_core::Map", translated_args()),
        "MapBuilder" => Type::generic("weft_core::MapBuilder", translated_args()),
        "Pair" => Type::Tuple(translated_args()),
        "AnyValue" => Type::path("weft_core::AnyValue"),
        // Connected type: foreign-implemented mutable string buffer.
        "StringBuilder" => Type::path("String").rw_lock().arc(),
        _ => {
            let path = user_type_path(name, decls);
            if args.is_empty() {
                Type::Path(path)
            } else {
                Type::Generic {
                    path,
                    args: translated_args(),
                }
            }
        }
    }
}

/// Path to a user type: local declarations and type parameters by bare
/// name, imported types through their defining module.
pub fn user_type_path(name: &Name, decls: &DeclTable) -> Path {
    if let Some(info) = decls.resolve(name) {
        if let Some(import) = &info.import {
            return names::import_path(import, names::type_name(name));
        }
    }
    Path::single(names::type_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_rust_ast::render::render_type;

    fn ty(ir: &IrType) -> String {
        render_type(&translate_type(ir, &DeclTable::new()))
    }

    #[test]
    fn builtin_cores() {
        assert_eq!(ty(&IrType::int()), "i32");
        assert_eq!(ty(&IrType::boolean()), "bool");
        assert_eq!(ty(&IrType::string()), "std::sync::Arc<String>");
        assert_eq!(ty(&IrType::void()), "()");
    }

    #[test]
    fn wrappers_compose_in_fixed_order() {
        assert_eq!(ty(&IrType::int().nullable()), "Option<i32>");
        assert_eq!(
            ty(&IrType::int().nullable().fallible()),
            "weft_core::Result<Option<i32>>"
        );
        // Flattening makes wrapper order irrelevant.
        assert_eq!(
            ty(&IrType::int().fallible().nullable()),
            "weft_core::Result<Option<i32>>"
        );
    }

    #[test]
    fn function_values_are_shared() {
        let sig = Signature::new(vec![IrType::int()], IrType::boolean());
        assert_eq!(
            ty(&IrType::Function(Box::new(sig))),
            "std::sync::Arc<dyn Fn(i32) -> bool + Send + Sync>"
        );
    }

    #[test]
    fn containers_and_generics() {
        let list = IrType::Named {
            name: Name::new("List"),
            args: vec![IrType::string()],
        };
        assert_eq!(ty(&list), "weft_core::List<std::sync::Arc<String>>");
        let user = IrType::Named {
            name: Name::new("Shape"),
            args: vec![],
        };
        assert_eq!(ty(&user), "Shape");
    }
}
