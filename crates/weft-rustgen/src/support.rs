//! The support-code network.
//!
//! A flat table from builtin operator identity or connected (foreign
//! implemented) reference name to an inlining template. Call lowering
//! looks the template up, lets it veto default argument translation
//! (raw string literals for text sinks, identity comparison for
//! reference types), and otherwise falls back to the general
//! argument-translation-and-wrap path.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use weft_ir::{BuiltinOp, IrArg, IrExpr, IrExprKind, IrLiteral};
use weft_rust_ast::{BinOp, Expr, UnOp};

use crate::describe::describe;
use crate::error::{Lower, TranslateError};
use crate::lower::Translator;
use crate::wrap::wrap_arc;

/// Key into the support table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SupportKey {
    Builtin(BuiltinOp),
    Connected(String),
}

/// How a template consumes its arguments and emits its expression.
#[derive(Debug, Clone, Copy)]
pub enum Template {
    /// `a <op> b`
    Infix(BinOp),
    /// `<op> a`
    Prefix(UnOp),
    /// `path(a, b, ...)`
    FunctionCall(&'static str),
    /// `a.method(b, ...)`
    MethodCall(&'static str),
    /// Bespoke shapes handled in [`Translator::lower_support_call`].
    Special(Special),
}

#[derive(Debug, Clone, Copy)]
pub enum Special {
    /// Value equality that falls back to pointer identity for
    /// reference types.
    EqGeneric { negated: bool },
    /// String concatenation via `format!`.
    StrCat,
    ConsoleLog,
    /// List literal construction.
    Listify,
    Panic,
    /// `Arc::new(x.to_string())`
    ToStringArc,
    /// Connected mutable string buffer operations.
    StringBuilderNew,
    StringBuilderAppend,
    StringBuilderToString,
}

/// One support-code entry: the template plus its argument policy.
#[derive(Debug, Clone, Copy)]
pub struct SupportEntry {
    pub template: Template,
    /// The first argument is normally consumed by reference (no
    /// clone); set to force the default clone policy anyway.
    pub clone_even_if_first: bool,
    /// Needs the statically-resolved generic argument type.
    pub has_generic: bool,
    /// Skip wanted-type wrapping of arguments entirely.
    pub avoid_type_wrapping: bool,
    /// Veto: string literal arguments stay raw literals.
    pub raw_str_args: bool,
}

impl SupportEntry {
    const fn of(template: Template) -> Self {
        Self {
            template,
            clone_even_if_first: false,
            has_generic: false,
            avoid_type_wrapping: false,
            raw_str_args: false,
        }
    }

    const fn cloning(mut self) -> Self {
        self.clone_even_if_first = true;
        self
    }

    const fn generic(mut self) -> Self {
        self.has_generic = true;
        self
    }

    const fn unwrapped(mut self) -> Self {
        self.avoid_type_wrapping = true;
        self
    }

    const fn raw_strings(mut self) -> Self {
        self.raw_str_args = true;
        self
    }
}

/// Look up the template for a builtin or connected reference.
pub fn lookup(key: &SupportKey) -> Option<&'static SupportEntry> {
    table().get(key)
}

fn table() -> &'static FxHashMap<SupportKey, SupportEntry> {
    static TABLE: OnceLock<FxHashMap<SupportKey, SupportEntry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = FxHashMap::default();
        for (key, entry) in entries() {
            map.insert(key, entry);
        }
        map
    })
}

fn entries() -> Vec<(SupportKey, SupportEntry)> {
    use BuiltinOp::*;
    use SupportKey::{Builtin, Connected};
    let infix = |op| SupportEntry::of(Template::Infix(op));
    let prefix = |op| SupportEntry::of(Template::Prefix(op));
    let func = |path| SupportEntry::of(Template::FunctionCall(path));
    let method = |name| SupportEntry::of(Template::MethodCall(name));
    let special = |s| SupportEntry::of(Template::Special(s));
    vec![
        (Builtin(AddInt), infix(BinOp::Add)),
        (Builtin(SubInt), infix(BinOp::Sub)),
        (Builtin(MulInt), infix(BinOp::Mul)),
        (Builtin(DivInt), func("weft_core::int_div")),
        (Builtin(DivIntSafe), method("wrapping_div")),
        (Builtin(ModInt), func("weft_core::int_mod")),
        (Builtin(ModIntSafe), method("wrapping_rem")),
        (Builtin(NegInt), prefix(UnOp::Neg)),
        (Builtin(AddFlt), infix(BinOp::Add)),
        (Builtin(SubFlt), infix(BinOp::Sub)),
        (Builtin(MulFlt), infix(BinOp::Mul)),
        (Builtin(DivFlt), infix(BinOp::Div)),
        (Builtin(ModFlt), func("weft_core::float64::rem")),
        (Builtin(NegFlt), prefix(UnOp::Neg)),
        (Builtin(EqInt), infix(BinOp::Eq)),
        (Builtin(NeInt), infix(BinOp::Ne)),
        (Builtin(LtInt), infix(BinOp::Lt)),
        (Builtin(LeInt), infix(BinOp::Le)),
        (Builtin(GtInt), infix(BinOp::Gt)),
        (Builtin(GeInt), infix(BinOp::Ge)),
        (Builtin(EqFlt), infix(BinOp::Eq)),
        (Builtin(NeFlt), infix(BinOp::Ne)),
        (Builtin(LtFlt), infix(BinOp::Lt)),
        (Builtin(LeFlt), infix(BinOp::Le)),
        (Builtin(GtFlt), infix(BinOp::Gt)),
        (Builtin(GeFlt), infix(BinOp::Ge)),
        (Builtin(EqStr), infix(BinOp::Eq)),
        (Builtin(NeStr), infix(BinOp::Ne)),
        (Builtin(LtStr), infix(BinOp::Lt)),
        (Builtin(LeStr), infix(BinOp::Le)),
        (Builtin(GtStr), infix(BinOp::Gt)),
        (Builtin(GeStr), infix(BinOp::Ge)),
        (
            Builtin(EqGeneric),
            special(Special::EqGeneric { negated: false }).generic(),
        ),
        (
            Builtin(NeGeneric),
            special(Special::EqGeneric { negated: true }).generic(),
        ),
        (Builtin(Not), prefix(UnOp::Not)),
        (Builtin(BitAnd), infix(BinOp::And)),
        (Builtin(BitOr), infix(BinOp::Or)),
        (Builtin(StrCat), special(Special::StrCat).raw_strings().unwrapped()),
        (Builtin(IntToString), special(Special::ToStringArc)),
        (Builtin(Int64ToString), special(Special::ToStringArc)),
        (Builtin(FltToString), func("weft_core::float64::to_string")),
        (Builtin(IsNull), method("is_none")),
        (Builtin(Listify), special(Special::Listify)),
        (Builtin(ListGet), method("get")),
        (Builtin(ListLength), method("length")),
        (Builtin(Panic), special(Special::Panic).unwrapped()),
        (
            Builtin(ConsoleLog),
            special(Special::ConsoleLog).raw_strings().unwrapped(),
        ),
        (
            Connected("StringBuilder::constructor".into()),
            special(Special::StringBuilderNew),
        ),
        (
            Connected("StringBuilder::append".into()),
            special(Special::StringBuilderAppend),
        ),
        (
            Connected("StringBuilder::toString".into()),
            special(Special::StringBuilderToString).cloning(),
        ),
    ]
}

/// A lowered argument with the IR type it had.
pub struct TypedArg {
    pub expr: Expr,
    pub ty: weft_ir::IrType,
}

impl Translator<'_> {
    /// Lower a builtin or connected call through its table entry.
    pub(crate) fn lower_support_call(
        &mut self,
        key: SupportKey,
        args: &[IrArg],
        call: &IrExpr,
    ) -> Lower<Expr> {
        let entry = *lookup(&key).ok_or_else(|| {
            TranslateError::unsupported(format!("builtin call {:?}", key), call.span)
        })?;
        let mut typed: Vec<TypedArg> = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            let avoid_clone = i == 0 && !entry.clone_even_if_first;
            // Per-argument veto: specialized raw encodings skip the
            // default translation.
            if entry.raw_str_args {
                if let IrExprKind::Literal(IrLiteral::Str(text)) = &arg.value.kind {
                    typed.push(TypedArg {
                        expr: Expr::Str(text.clone()),
                        ty: arg.value.ty.clone(),
                    });
                    continue;
                }
            }
            let wanted = if entry.avoid_type_wrapping || avoid_clone {
                None
            } else {
                arg.formal.as_ref()
            };
            let lowered = self.lower_actual(&arg.value, wanted, avoid_clone)?;
            typed.push(TypedArg {
                expr: lowered,
                ty: arg.value.ty.clone(),
            });
        }
        self.apply_template(&entry, &typed, call)
    }

    fn apply_template(
        &mut self,
        entry: &SupportEntry,
        args: &[TypedArg],
        call: &IrExpr,
    ) -> Lower<Expr> {
        let arg = |i: usize| -> Lower<Expr> {
            args.get(i).map(|a| a.expr.clone()).ok_or_else(|| {
                TranslateError::internal("builtin arity mismatch", call.span).into()
            })
        };
        match entry.template {
            Template::Infix(op) => Ok(Expr::binary(op, arg(0)?, arg(1)?)),
            Template::Prefix(op) => Ok(Expr::unary(op, arg(0)?)),
            Template::FunctionCall(path) => Ok(Expr::call_path(
                path,
                args.iter().map(|a| a.expr.clone()).collect(),
            )),
            Template::MethodCall(name) => {
                let rest = args.iter().skip(1).map(|a| a.expr.clone()).collect();
                Ok(arg(0)?.method_call(name, rest))
            }
            Template::Special(special) => self.apply_special(special, args, call),
        }
    }

    fn apply_special(
        &mut self,
        special: Special,
        args: &[TypedArg],
        call: &IrExpr,
    ) -> Lower<Expr> {
        let arg = |i: usize| -> Lower<Expr> {
            args.get(i).map(|a| a.expr.clone()).ok_or_else(|| {
                TranslateError::internal("builtin arity mismatch", call.span).into()
            })
        };
        match special {
            Special::EqGeneric { negated } => {
                let identity = args
                    .first()
                    .map(|a| self.is_identifiable(&describe(&a.ty)))
                    .unwrap_or(false);
                let compare = if identity {
                    // Pointer identity for reference types.
                    Expr::call_path(
                        "weft_core::ptr_eq",
                        vec![arg(0)?.reference(), arg(1)?.reference()],
                    )
                } else {
                    Expr::binary(BinOp::Eq, arg(0)?, arg(1)?)
                };
                Ok(if negated {
                    Expr::unary(UnOp::Not, compare)
                } else {
                    compare
                })
            }
            Special::StrCat => {
                let mut macro_args = vec![Expr::Str("{}".repeat(args.len()))];
                macro_args.extend(args.iter().map(|a| a.expr.clone()));
                Ok(wrap_arc(Expr::MacroCall {
                    name: "format!".into(),
                    args: macro_args,
                }))
            }
            Special::ConsoleLog => {
                let mut macro_args = vec![Expr::Str("{}".into())];
                macro_args.push(arg(0)?);
                Ok(Expr::MacroCall {
                    name: "println!".into(),
                    args: macro_args,
                })
            }
            Special::Listify => Ok(Expr::call_path(
                "weft_core::list_of",
                vec![Expr::MacroCall {
                    name: "vec!".into(),
                    args: args.iter().map(|a| a.expr.clone()).collect(),
                }],
            )),
            Special::Panic => Ok(Expr::MacroCall {
                name: "panic!".into(),
                args: vec![],
            }),
            Special::ToStringArc => Ok(wrap_arc(arg(0)?.method_call("to_string", vec![]))),
            Special::StringBuilderNew => Ok(wrap_arc(crate::wrap::wrap_lock(Expr::call_path(
                "String::new",
                vec![],
            )))),
            Special::StringBuilderAppend => Ok(arg(0)?
                .method_call("write", vec![])
                .method_call("unwrap", vec![])
                .method_call("push_str", vec![arg(1)?.reference()])),
            Special::StringBuilderToString => Ok(wrap_arc(
                arg(0)?
                    .method_call("read", vec![])
                    .method_call("unwrap", vec![])
                    .method_call("clone", vec![]),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_builtin_op() {
        use BuiltinOp::*;
        for op in [
            AddInt, SubInt, MulInt, DivInt, DivIntSafe, ModInt, ModIntSafe, NegInt, AddFlt,
            SubFlt, MulFlt, DivFlt, ModFlt, NegFlt, EqInt, NeInt, LtInt, LeInt, GtInt, GeInt,
            EqFlt, NeFlt, LtFlt, LeFlt, GtFlt, GeFlt, EqStr, NeStr, LtStr, LeStr, GtStr, GeStr,
            EqGeneric, NeGeneric, Not, BitAnd, BitOr, StrCat, IntToString, Int64ToString,
            FltToString, IsNull, Listify, ListGet, ListLength, Panic, ConsoleLog,
        ] {
            assert!(
                lookup(&SupportKey::Builtin(op)).is_some(),
                "missing support entry for {:?}",
                op
            );
        }
    }

    #[test]
    fn connected_references_present() {
        for name in [
            "StringBuilder::constructor",
            "StringBuilder::append",
            "StringBuilder::toString",
        ] {
            assert!(lookup(&SupportKey::Connected(name.to_string())).is_some());
        }
    }

    #[test]
    fn argument_policy_flags() {
        let strcat = lookup(&SupportKey::Builtin(BuiltinOp::StrCat)).unwrap();
        assert!(strcat.raw_str_args);
        assert!(!strcat.clone_even_if_first);
        let eq = lookup(&SupportKey::Builtin(BuiltinOp::EqGeneric)).unwrap();
        assert!(eq.has_generic);
    }
}
