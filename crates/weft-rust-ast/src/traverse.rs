//! Generic traversal over the output AST.
//!
//! Every node kind exposes an ordered, fixed list of child slots; the
//! renderer visits children strictly in this order, and consumers that
//! want tree-wide queries (tests, lints over generated code) can walk
//! without knowing each node shape.

use crate::ast::*;

/// A borrowed reference to any node category.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    File(&'a SourceFile),
    Item(&'a Item),
    Stmt(&'a Stmt),
    Block(&'a Block),
    Expr(&'a Expr),
    Type(&'a Type),
    Pattern(&'a Pattern),
}

impl<'a> NodeRef<'a> {
    /// The node's children in slot order.
    pub fn children(self) -> Vec<NodeRef<'a>> {
        match self {
            NodeRef::File(file) => file.items.iter().map(NodeRef::Item).collect(),
            NodeRef::Item(item) => item_children(&item.kind),
            NodeRef::Stmt(stmt) => match stmt {
                Stmt::Let { pat, ty, value } => {
                    let mut out = vec![NodeRef::Pattern(pat)];
                    out.extend(ty.iter().map(NodeRef::Type));
                    out.extend(value.iter().map(NodeRef::Expr));
                    out
                }
                Stmt::Expr(expr) => vec![NodeRef::Expr(expr)],
                Stmt::Item(item) => vec![NodeRef::Item(item)],
            },
            NodeRef::Block(block) => {
                let mut out: Vec<NodeRef<'a>> = block.stmts.iter().map(NodeRef::Stmt).collect();
                out.extend(block.result.iter().map(|e| NodeRef::Expr(e)));
                out
            }
            NodeRef::Expr(expr) => expr_children(expr),
            NodeRef::Type(ty) => type_children(ty),
            NodeRef::Pattern(pat) => match pat {
                Pattern::TupleStruct { subpats, .. } => {
                    subpats.iter().map(NodeRef::Pattern).collect()
                }
                Pattern::Alt(pats) => pats.iter().map(NodeRef::Pattern).collect(),
                _ => Vec::new(),
            },
        }
    }

    /// Pre-order walk of this subtree.
    pub fn walk(self, visit: &mut dyn FnMut(NodeRef<'a>)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Total number of nodes in this subtree, including the root.
    pub fn count(self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }
}

fn item_children(kind: &ItemKind) -> Vec<NodeRef<'_>> {
    match kind {
        ItemKind::Function(f) => {
            let mut out = Vec::new();
            for param in &f.params {
                if let Param::Typed { pat, ty } = param {
                    out.push(NodeRef::Pattern(pat));
                    out.push(NodeRef::Type(ty));
                }
            }
            out.extend(f.ret.iter().map(NodeRef::Type));
            out.extend(f.body.iter().map(NodeRef::Block));
            out
        }
        ItemKind::Struct(s) => s.fields.iter().map(|f| NodeRef::Type(&f.ty)).collect(),
        ItemKind::TupleStruct(s) => s.fields.iter().map(NodeRef::Type).collect(),
        ItemKind::Enum(e) => e
            .variants
            .iter()
            .flat_map(|v| v.fields.iter().map(NodeRef::Type))
            .collect(),
        ItemKind::Trait(t) => {
            let mut out: Vec<NodeRef<'_>> = t.bounds.iter().map(NodeRef::Type).collect();
            out.extend(t.items.iter().map(NodeRef::Item));
            out
        }
        ItemKind::Impl(i) => {
            let mut out = Vec::new();
            out.extend(i.of_trait.iter().map(NodeRef::Type));
            out.push(NodeRef::Type(&i.self_ty));
            out.extend(i.items.iter().map(NodeRef::Item));
            out
        }
        ItemKind::Static(s) => vec![NodeRef::Type(&s.ty), NodeRef::Expr(&s.value)],
        ItemKind::Mod { items, .. } => items
            .iter()
            .flat_map(|items| items.iter().map(NodeRef::Item))
            .collect(),
        ItemKind::Use(_) => Vec::new(),
        ItemKind::TypeAlias { ty, .. } => vec![NodeRef::Type(ty)],
    }
}

fn expr_children(expr: &Expr) -> Vec<NodeRef<'_>> {
    match expr {
        Expr::Path(_)
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Unit
        | Expr::Break { .. }
        | Expr::Continue { .. } => Vec::new(),
        Expr::Call { callee, args } => {
            let mut out = vec![NodeRef::Expr(callee)];
            out.extend(args.iter().map(NodeRef::Expr));
            out
        }
        Expr::MethodCall { subject, args, .. } => {
            let mut out = vec![NodeRef::Expr(subject)];
            out.extend(args.iter().map(NodeRef::Expr));
            out
        }
        Expr::FieldAccess { subject, .. } => vec![NodeRef::Expr(subject)],
        Expr::Binary { left, right, .. } => vec![NodeRef::Expr(left), NodeRef::Expr(right)],
        Expr::Unary { expr, .. } | Expr::Propagate(expr) => vec![NodeRef::Expr(expr)],
        Expr::Closure { params, body, .. } => {
            let mut out: Vec<NodeRef<'_>> = params.iter().map(NodeRef::Pattern).collect();
            out.push(NodeRef::Expr(body));
            out
        }
        Expr::Block(block) => vec![NodeRef::Block(block)],
        Expr::If { test, then, alt } => {
            let mut out = vec![NodeRef::Expr(test), NodeRef::Block(then)];
            out.extend(alt.iter().map(|e| NodeRef::Expr(e)));
            out
        }
        Expr::Match { scrutinee, arms } => {
            let mut out = vec![NodeRef::Expr(scrutinee)];
            for arm in arms {
                out.push(NodeRef::Pattern(&arm.pat));
                out.push(NodeRef::Expr(&arm.body));
            }
            out
        }
        Expr::While { test, body, .. } => vec![NodeRef::Expr(test), NodeRef::Block(body)],
        Expr::Loop { body, .. } | Expr::LabeledBlock { body, .. } => vec![NodeRef::Block(body)],
        Expr::Return(value) => value.iter().map(|e| NodeRef::Expr(e)).collect(),
        Expr::StructLit { fields, .. } => fields
            .iter()
            .filter_map(|(_, value)| value.as_ref().map(NodeRef::Expr))
            .collect(),
        Expr::Array(values) | Expr::MacroCall { args: values, .. } => {
            values.iter().map(NodeRef::Expr).collect()
        }
        Expr::CastAs { expr, ty } => vec![NodeRef::Expr(expr), NodeRef::Type(ty)],
    }
}

fn type_children(ty: &Type) -> Vec<NodeRef<'_>> {
    match ty {
        Type::Path(_) | Type::Unit => Vec::new(),
        Type::Generic { args, .. } => args.iter().map(NodeRef::Type).collect(),
        Type::Ref(inner) => vec![NodeRef::Type(inner)],
        Type::Tuple(types) => types.iter().map(NodeRef::Type).collect(),
        Type::Fn { params, ret } => {
            let mut out: Vec<NodeRef<'_>> = params.iter().map(NodeRef::Type).collect();
            out.push(NodeRef::Type(ret));
            out
        }
        Type::TraitObject { bounds } | Type::ImplTrait { bounds } => {
            bounds.iter().map(NodeRef::Type).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_in_slot_order() {
        let expr = Expr::call(Expr::id("f"), vec![Expr::Int(1), Expr::Int(2)]);
        let kids = NodeRef::Expr(&expr).children();
        assert_eq!(kids.len(), 3);
        assert!(matches!(kids[0], NodeRef::Expr(Expr::Path(_))));
        assert!(matches!(kids[1], NodeRef::Expr(Expr::Int(1))));
        assert!(matches!(kids[2], NodeRef::Expr(Expr::Int(2))));
    }

    #[test]
    fn count_covers_whole_subtree() {
        let expr = Expr::id("a").method_call("b", vec![Expr::Int(3)]);
        // MethodCall + subject path + argument literal.
        assert_eq!(NodeRef::Expr(&expr).count(), 3);
    }
}
