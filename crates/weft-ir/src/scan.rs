//! Name scans over IR subtrees.
//!
//! Used by the backend's preprocessing passes: topper promotion needs
//! "which module-level names does this item reference", and capture
//! analysis needs the free names and assignment targets of closure
//! groups. All scans are purely structural.

use rustc_hash::FxHashSet;

use crate::expr::{IrCallee, IrExpr, IrExprKind};
use crate::module::{IrCtor, IrFunction, IrItem, IrMember};
use crate::name::Name;
use crate::stmt::{IrBlock, IrStmt, IrStmtKind};

/// Every name referenced (read, called, or assigned) in an item.
pub fn item_referenced_names(item: &IrItem) -> FxHashSet<Name> {
    let mut out = FxHashSet::default();
    match item {
        IrItem::Global(global) => {
            if let Some(init) = &global.init {
                collect_expr(init, &mut out);
            }
        }
        IrItem::Function(function) => collect_function(function, &mut out),
        IrItem::Type(decl) => {
            for member in &decl.members {
                match member {
                    IrMember::Field(_) => {}
                    IrMember::Method(method) => collect_function(&method.function, &mut out),
                    IrMember::Ctor(ctor) => collect_ctor(ctor, &mut out),
                    IrMember::StaticField(field) => collect_expr(&field.value, &mut out),
                }
            }
        }
        IrItem::Test(test) => collect_block(&test.body, &mut out),
        IrItem::Init(init) => collect_block(&init.body, &mut out),
    }
    out
}

/// Every name referenced anywhere in a function body.
pub fn function_referenced_names(function: &IrFunction) -> FxHashSet<Name> {
    let mut out = FxHashSet::default();
    collect_function(function, &mut out);
    out
}

/// Names that are the target of an assignment anywhere in the
/// statements, including inside nested local functions.
pub fn assigned_names(statements: &[IrStmt]) -> FxHashSet<Name> {
    let mut out = FxHashSet::default();
    for stmt in statements {
        collect_assigned(stmt, &mut out);
    }
    out
}

/// Names referenced inside nested local function declarations.
///
/// Intersected with the enclosing scope's locals and with
/// [`assigned_names`], this yields the mutable-capture set, which must
/// be known before the captured declarations themselves are lowered.
pub fn local_fn_referenced_names(statements: &[IrStmt]) -> FxHashSet<Name> {
    let mut out = FxHashSet::default();
    for stmt in statements {
        walk_stmt(stmt, &mut |s| {
            if let IrStmtKind::LocalFn(function) = &s.kind {
                collect_function(function, &mut out);
            }
        });
    }
    out
}

fn collect_function(function: &IrFunction, out: &mut FxHashSet<Name>) {
    if let Some(body) = &function.body {
        collect_block(body, out);
    }
}

fn collect_ctor(ctor: &IrCtor, out: &mut FxHashSet<Name>) {
    for stmt in ctor.field_init.iter().chain(&ctor.rest) {
        collect_stmt(stmt, out);
    }
}

fn collect_block(block: &IrBlock, out: &mut FxHashSet<Name>) {
    for stmt in &block.statements {
        collect_stmt(stmt, out);
    }
}

fn collect_stmt(stmt: &IrStmt, out: &mut FxHashSet<Name>) {
    match &stmt.kind {
        IrStmtKind::Let(local) => {
            if let Some(init) = &local.init {
                collect_expr(init, out);
            }
        }
        IrStmtKind::Assign { target, value } => {
            out.insert(target.clone());
            collect_expr(value, out);
        }
        IrStmtKind::SetProperty { subject, value, .. } => {
            collect_expr(subject, out);
            collect_expr(value, out);
        }
        IrStmtKind::Expr(expr) => collect_expr(expr, out),
        IrStmtKind::If { test, then, alt } => {
            collect_expr(test, out);
            collect_stmt(then, out);
            if let Some(alt) = alt {
                collect_stmt(alt, out);
            }
        }
        IrStmtKind::While { test, body } => {
            collect_expr(test, out);
            collect_stmt(body, out);
        }
        IrStmtKind::Block(block) => collect_block(block, out),
        IrStmtKind::Labeled { stmt, .. } => collect_stmt(stmt, out),
        IrStmtKind::Break { .. } | IrStmtKind::Continue { .. } | IrStmtKind::InitFailed => {}
        IrStmtKind::Return { value } => {
            if let Some(value) = value {
                collect_expr(value, out);
            }
        }
        IrStmtKind::Switch {
            scrutinee,
            cases,
            default,
        } => {
            collect_expr(scrutinee, out);
            for case in cases {
                collect_block(&case.body, out);
            }
            collect_block(default, out);
        }
        IrStmtKind::LocalFn(function) => collect_function(function, out),
        IrStmtKind::Handler {
            assign, handled, ..
        } => {
            if let Some(assign) = assign {
                out.insert(assign.clone());
            }
            collect_expr(handled, out);
        }
    }
}

fn collect_expr(expr: &IrExpr, out: &mut FxHashSet<Name>) {
    match &expr.kind {
        IrExprKind::Literal(_) | IrExprKind::This | IrExprKind::FailSentinel => {}
        IrExprKind::Ref(name) => {
            out.insert(name.clone());
        }
        IrExprKind::Call { callee, args } => {
            match callee {
                IrCallee::Function { name, .. } => {
                    out.insert(name.clone());
                }
                IrCallee::Method { subject, .. } => collect_expr(subject, out),
                IrCallee::Value(expr) => collect_expr(expr, out),
                IrCallee::Static { .. } | IrCallee::Ctor { .. } => {}
                IrCallee::Builtin(_) | IrCallee::Connected(_) => {}
            }
            for arg in args {
                collect_expr(&arg.value, out);
            }
        }
        IrExprKind::GetProperty { subject, .. } => collect_expr(subject, out),
        IrExprKind::Cast { expr, .. }
        | IrExprKind::IsType { expr, .. }
        | IrExprKind::NotNull(expr) => collect_expr(expr, out),
    }
}

fn collect_assigned(stmt: &IrStmt, out: &mut FxHashSet<Name>) {
    walk_stmt(stmt, &mut |s| match &s.kind {
        IrStmtKind::Assign { target, .. } => {
            out.insert(target.clone());
        }
        IrStmtKind::Handler {
            assign: Some(assign),
            ..
        } => {
            out.insert(assign.clone());
        }
        _ => {}
    });
}

/// Pre-order walk over a statement subtree, including statements nested
/// in local function bodies.
fn walk_stmt(stmt: &IrStmt, visit: &mut dyn FnMut(&IrStmt)) {
    visit(stmt);
    match &stmt.kind {
        IrStmtKind::If { then, alt, .. } => {
            walk_stmt(then, visit);
            if let Some(alt) = alt {
                walk_stmt(alt, visit);
            }
        }
        IrStmtKind::While { body, .. } => walk_stmt(body, visit),
        IrStmtKind::Block(block) => {
            for s in &block.statements {
                walk_stmt(s, visit);
            }
        }
        IrStmtKind::Labeled { stmt, .. } => walk_stmt(stmt, visit),
        IrStmtKind::Switch { cases, default, .. } => {
            for case in cases {
                for s in &case.body.statements {
                    walk_stmt(s, visit);
                }
            }
            for s in &default.statements {
                walk_stmt(s, visit);
            }
        }
        IrStmtKind::LocalFn(function) => {
            if let Some(body) = &function.body {
                for s in &body.statements {
                    walk_stmt(s, visit);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::IrParams;
    use crate::types::IrType;
    use weft_common::Span;

    fn sp() -> Span {
        Span::dummy()
    }

    fn int_ref(name: &str) -> IrExpr {
        IrExpr::new(IrExprKind::Ref(Name::new(name)), IrType::int(), sp())
    }

    fn let_stmt(name: &str, init: IrExpr) -> IrStmt {
        IrStmt::new(
            IrStmtKind::Let(crate::stmt::IrLocal {
                name: Name::new(name),
                ty: IrType::int(),
                init: Some(init),
                assign_once: false,
                fail_flag: false,
            }),
            sp(),
        )
    }

    fn local_fn(name: &str, body: Vec<IrStmt>) -> IrStmt {
        IrStmt::new(
            IrStmtKind::LocalFn(IrFunction {
                name: Name::new(name),
                type_params: vec![],
                params: IrParams::plain(vec![]),
                ret: IrType::void(),
                body: Some(IrBlock::new(body, sp())),
                exported: false,
                span: sp(),
            }),
            sp(),
        )
    }

    #[test]
    fn assigned_names_sees_through_nesting() {
        let stmts = vec![local_fn(
            "bump",
            vec![IrStmt::new(
                IrStmtKind::Assign {
                    target: Name::new("counter"),
                    value: int_ref("counter"),
                },
                sp(),
            )],
        )];
        let assigned = assigned_names(&stmts);
        assert!(assigned.contains(&Name::new("counter")));
    }

    #[test]
    fn local_fn_references_exclude_enclosing_code() {
        let stmts = vec![
            let_stmt("outer_only", int_ref("unrelated")),
            local_fn("reader", vec![let_stmt("tmp", int_ref("captured"))]),
        ];
        let inner = local_fn_referenced_names(&stmts);
        assert!(inner.contains(&Name::new("captured")));
        assert!(!inner.contains(&Name::new("unrelated")));
    }
}
