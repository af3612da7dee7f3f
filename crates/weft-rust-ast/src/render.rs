//! Token rendering for the output AST.
//!
//! Rendering is deterministic: children are emitted strictly in slot
//! order, with a fixed four-space indent. Generated code favors
//! redundant parentheses over precedence bookkeeping.

use crate::ast::*;

/// Render one emitted source file to text.
pub fn render_file(file: &SourceFile) -> String {
    let mut p = Printer::new();
    for attr in &file.inner_attrs {
        p.line(&format!("#![{}]", render_attr_body(attr)));
    }
    if !file.inner_attrs.is_empty() && !file.items.is_empty() {
        p.blank();
    }
    for (i, item) in file.items.iter().enumerate() {
        if i > 0 {
            p.blank();
        }
        p.item(item);
    }
    p.finish()
}

fn render_attr_body(attr: &Attr) -> String {
    if attr.args.is_empty() {
        attr.name.clone()
    } else {
        format!("{}({})", attr.name, attr.args.join(", "))
    }
}

struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        self.open_line();
        self.out.push_str(text);
        self.close_line();
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn open_line(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn close_line(&mut self) {
        self.out.push('\n');
    }

    // ── Items ────────────────────────────────────────────────────

    fn item(&mut self, item: &Item) {
        for attr in &item.attrs {
            self.line(&format!("#[{}]", render_attr_body(attr)));
        }
        let vis = match item.vis {
            Vis::Private => "",
            Vis::Pub => "pub ",
            Vis::PubCrate => "pub(crate) ",
        };
        match &item.kind {
            ItemKind::Function(f) => self.function(vis, f),
            ItemKind::Struct(s) => self.struct_item(vis, s),
            ItemKind::TupleStruct(s) => {
                let fields = s
                    .fields
                    .iter()
                    .map(render_type)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.line(&format!(
                    "{}struct {}{}({});",
                    vis,
                    s.name,
                    render_generics(&s.generics),
                    fields
                ));
            }
            ItemKind::Enum(e) => {
                self.line(&format!("{}enum {} {{", vis, e.name));
                self.indent += 1;
                for variant in &e.variants {
                    if variant.fields.is_empty() {
                        self.line(&format!("{},", variant.name));
                    } else {
                        let fields = variant
                            .fields
                            .iter()
                            .map(render_type)
                            .collect::<Vec<_>>()
                            .join(", ");
                        self.line(&format!("{}({}),", variant.name, fields));
                    }
                }
                self.indent -= 1;
                self.line("}");
            }
            ItemKind::Trait(t) => {
                let bounds = if t.bounds.is_empty() {
                    String::new()
                } else {
                    format!(
                        ": {}",
                        t.bounds
                            .iter()
                            .map(render_type)
                            .collect::<Vec<_>>()
                            .join(" + ")
                    )
                };
                self.line(&format!(
                    "{}trait {}{}{} {{",
                    vis,
                    t.name,
                    render_generics(&t.generics),
                    bounds
                ));
                self.items_block(&t.items);
                self.line("}");
            }
            ItemKind::Impl(i) => {
                let head = match &i.of_trait {
                    Some(of_trait) => format!(
                        "impl{} {} for {} {{",
                        render_generics(&i.generics),
                        render_type(of_trait),
                        render_type(&i.self_ty)
                    ),
                    None => format!(
                        "impl{} {} {{",
                        render_generics(&i.generics),
                        render_type(&i.self_ty)
                    ),
                };
                self.line(&head);
                self.items_block(&i.items);
                self.line("}");
            }
            ItemKind::Static(s) => {
                self.line(&format!(
                    "{}static {}: {} = {};",
                    vis,
                    s.name,
                    render_type(&s.ty),
                    render_expr(&s.value)
                ));
            }
            ItemKind::Mod { name, items } => match items {
                None => self.line(&format!("{}mod {};", vis, name)),
                Some(items) => {
                    self.line(&format!("{}mod {} {{", vis, name));
                    self.items_block(items);
                    self.line("}");
                }
            },
            ItemKind::Use(path) => self.line(&format!("{}use {};", vis, render_path(path))),
            ItemKind::TypeAlias { name, ty } => {
                self.line(&format!("{}type {} = {};", vis, name, render_type(ty)));
            }
        }
    }

    fn items_block(&mut self, items: &[Item]) {
        self.indent += 1;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.blank();
            }
            self.item(item);
        }
        self.indent -= 1;
    }

    fn function(&mut self, vis: &str, f: &Function) {
        let params = f
            .params
            .iter()
            .map(|param| match param {
                Param::SelfRef => "&self".to_string(),
                Param::SelfOwned => "self".to_string(),
                Param::Typed { pat, ty } => {
                    format!("{}: {}", render_pattern(pat), render_type(ty))
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let ret = match &f.ret {
            Some(ty) => format!(" -> {}", render_type(ty)),
            None => String::new(),
        };
        let head = format!(
            "{}fn {}{}({}){}",
            vis,
            f.name,
            render_generics(&f.generics),
            params,
            ret
        );
        match &f.body {
            None => self.line(&format!("{};", head)),
            Some(body) => {
                self.line(&format!("{} {{", head));
                self.block_inner(body);
                self.line("}");
            }
        }
    }

    fn struct_item(&mut self, vis: &str, s: &Struct) {
        if s.fields.is_empty() {
            self.line(&format!(
                "{}struct {}{} {{}}",
                vis,
                s.name,
                render_generics(&s.generics)
            ));
            return;
        }
        self.line(&format!(
            "{}struct {}{} {{",
            vis,
            s.name,
            render_generics(&s.generics)
        ));
        self.indent += 1;
        for field in &s.fields {
            let field_vis = match field.vis {
                Vis::Private => "",
                Vis::Pub => "pub ",
                Vis::PubCrate => "pub(crate) ",
            };
            self.line(&format!(
                "{}{}: {},",
                field_vis,
                field.name,
                render_type(&field.ty)
            ));
        }
        self.indent -= 1;
        self.line("}");
    }

    // ── Statements and blocks ────────────────────────────────────

    fn block_inner(&mut self, block: &Block) {
        self.indent += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        if let Some(result) = &block.result {
            self.expr_line(result, "");
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { pat, ty, value } => {
                let ty_text = match ty {
                    Some(ty) => format!(": {}", render_type(ty)),
                    None => String::new(),
                };
                match value {
                    Some(value) => self.expr_line_prefixed(
                        &format!("let {}{} = ", render_pattern(pat), ty_text),
                        value,
                        ";",
                    ),
                    None => self.line(&format!("let {}{};", render_pattern(pat), ty_text)),
                }
            }
            Stmt::Expr(expr) => self.expr_line(expr, ";"),
            Stmt::Item(item) => self.item(item),
        }
    }

    /// Render a possibly-multiline expression as its own line(s).
    fn expr_line(&mut self, expr: &Expr, suffix: &str) {
        self.expr_line_prefixed("", expr, suffix);
    }

    fn expr_line_prefixed(&mut self, prefix: &str, expr: &Expr, suffix: &str) {
        match expr {
            Expr::Block(block) => {
                self.line(&format!("{}{{", prefix));
                self.block_inner(block);
                self.line(&format!("}}{}", suffix));
            }
            Expr::If { .. } => {
                self.open_line();
                self.out.push_str(prefix);
                self.if_expr(expr);
                self.out.push_str(suffix);
                self.close_line();
            }
            Expr::Match { scrutinee, arms } => {
                self.line(&format!(
                    "{}match {} {{",
                    prefix,
                    render_expr_parenthesized(scrutinee)
                ));
                self.indent += 1;
                for arm in arms {
                    self.match_arm(arm);
                }
                self.indent -= 1;
                self.line(&format!("}}{}", suffix));
            }
            Expr::While { label, test, body } => {
                let label_text = label
                    .as_ref()
                    .map(|l| format!("'{}: ", l))
                    .unwrap_or_default();
                self.line(&format!(
                    "{}{}while {} {{",
                    prefix,
                    label_text,
                    render_expr(test)
                ));
                self.block_inner(body);
                self.line(&format!("}}{}", suffix));
            }
            Expr::Loop { label, body } => {
                let label_text = label
                    .as_ref()
                    .map(|l| format!("'{}: ", l))
                    .unwrap_or_default();
                self.line(&format!("{}{}loop {{", prefix, label_text));
                self.block_inner(body);
                self.line(&format!("}}{}", suffix));
            }
            Expr::LabeledBlock { label, body } => {
                self.line(&format!("{}'{}: {{", prefix, label));
                self.block_inner(body);
                self.line(&format!("}}{}", suffix));
            }
            _ => self.line(&format!("{}{}{}", prefix, render_expr(expr), suffix)),
        }
    }

    fn if_expr(&mut self, expr: &Expr) {
        let Expr::If { test, then, alt } = expr else {
            unreachable!("if_expr called on non-if");
        };
        self.out.push_str(&format!("if {} {{", render_expr(test)));
        self.close_line();
        self.block_inner(then);
        self.open_line();
        self.out.push('}');
        if let Some(alt) = alt {
            self.out.push_str(" else ");
            match alt.as_ref() {
                Expr::If { .. } => self.if_expr(alt),
                Expr::Block(block) => {
                    self.out.push('{');
                    self.close_line();
                    self.block_inner(block);
                    self.open_line();
                    self.out.push('}');
                }
                other => {
                    self.out.push('{');
                    self.close_line();
                    self.indent += 1;
                    self.expr_line(other, "");
                    self.indent -= 1;
                    self.open_line();
                    self.out.push('}');
                }
            }
        }
    }

    fn match_arm(&mut self, arm: &MatchArm) {
        match &arm.body {
            Expr::Block(block) => {
                self.line(&format!("{} => {{", render_pattern(&arm.pat)));
                self.block_inner(block);
                self.line("}");
            }
            body => self.line(&format!(
                "{} => {},",
                render_pattern(&arm.pat),
                render_expr(body)
            )),
        }
    }
}

// ── Inline rendering ─────────────────────────────────────────────────

fn render_generics(generics: &[GenericParam]) -> String {
    if generics.is_empty() {
        return String::new();
    }
    let inner = generics
        .iter()
        .map(|g| {
            if g.bounds.is_empty() {
                g.name.clone()
            } else {
                format!(
                    "{}: {}",
                    g.name,
                    g.bounds
                        .iter()
                        .map(render_type)
                        .collect::<Vec<_>>()
                        .join(" + ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("<{}>", inner)
}

fn render_path(path: &Path) -> String {
    let base = path.segments.join("::");
    if path.final_args.is_empty() {
        base
    } else {
        let args = path
            .final_args
            .iter()
            .map(render_type)
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}::<{}>", base, args)
    }
}

pub fn render_type(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path.segments.join("::"),
        Type::Unit => "()".to_string(),
        Type::Generic { path, args } => {
            let args = args.iter().map(render_type).collect::<Vec<_>>().join(", ");
            format!("{}<{}>", path.segments.join("::"), args)
        }
        Type::Ref(inner) => format!("&{}", render_type(inner)),
        Type::Tuple(types) => {
            let inner = types.iter().map(render_type).collect::<Vec<_>>().join(", ");
            format!("({})", inner)
        }
        Type::Fn { params, ret } => {
            let params = params
                .iter()
                .map(render_type)
                .collect::<Vec<_>>()
                .join(", ");
            format!("Fn({}) -> {}", params, render_type(ret))
        }
        Type::TraitObject { bounds } => {
            let bounds = bounds
                .iter()
                .map(render_type)
                .collect::<Vec<_>>()
                .join(" + ");
            format!("dyn {}", bounds)
        }
        Type::ImplTrait { bounds } => {
            let bounds = bounds
                .iter()
                .map(render_type)
                .collect::<Vec<_>>()
                .join(" + ");
            format!("impl {}", bounds)
        }
    }
}

pub fn render_pattern(pat: &Pattern) -> String {
    match pat {
        Pattern::Id(name) => name.clone(),
        Pattern::MutId(name) => format!("mut {}", name),
        Pattern::Wild => "_".to_string(),
        Pattern::TupleStruct { path, subpats } => {
            let inner = subpats
                .iter()
                .map(render_pattern)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}({})", render_path(path), inner)
        }
        Pattern::Alt(pats) => pats
            .iter()
            .map(render_pattern)
            .collect::<Vec<_>>()
            .join(" | "),
        Pattern::IntLit(value) => value.to_string(),
    }
}

/// Render an expression inline. Multiline forms (blocks, matches) are
/// rendered flat; statement-level callers use `Printer` paths instead.
pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Path(path) => render_path(path),
        Expr::Bool(value) => value.to_string(),
        Expr::Int(value) => value.to_string(),
        Expr::Float(value) => {
            if value.fract() == 0.0 && value.is_finite() {
                format!("{:.1}", value)
            } else {
                format!("{:?}", value)
            }
        }
        Expr::Str(text) => format!("\"{}\"", escape_str(text)),
        Expr::Unit => "()".to_string(),
        Expr::Call { callee, args } => {
            let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            format!("{}({})", render_expr_parenthesized(callee), args)
        }
        Expr::MethodCall {
            subject,
            method,
            args,
        } => {
            let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            format!(
                "{}.{}({})",
                render_expr_parenthesized(subject),
                method,
                args
            )
        }
        Expr::FieldAccess { subject, field } => {
            format!("{}.{}", render_expr_parenthesized(subject), field)
        }
        Expr::Binary { op, left, right } => {
            if *op == BinOp::Assign {
                format!("{} = {}", render_expr(left), render_expr(right))
            } else {
                format!(
                    "{} {} {}",
                    render_operand(left),
                    op.token(),
                    render_operand(right)
                )
            }
        }
        Expr::Unary { op, expr } => match op {
            UnOp::Not => format!("!{}", render_expr_parenthesized(expr)),
            UnOp::Neg => format!("-{}", render_expr_parenthesized(expr)),
            UnOp::Deref => format!("*{}", render_expr_parenthesized(expr)),
            UnOp::Ref => format!("&{}", render_expr_parenthesized(expr)),
        },
        Expr::Propagate(expr) => format!("{}?", render_expr_parenthesized(expr)),
        Expr::Closure {
            is_move,
            params,
            body,
        } => {
            let move_text = if *is_move { "move " } else { "" };
            let params = params
                .iter()
                .map(render_pattern)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{}|{}| {}", move_text, params, render_expr(body))
        }
        Expr::Block(block) => render_block_inline(block),
        Expr::If { test, then, alt } => {
            let mut out = format!("if {} {}", render_expr(test), render_block_inline(then));
            if let Some(alt) = alt {
                out.push_str(" else ");
                match alt.as_ref() {
                    Expr::Block(block) => out.push_str(&render_block_inline(block)),
                    other => out.push_str(&render_expr(other)),
                }
            }
            out
        }
        Expr::Match { scrutinee, arms } => {
            let arms = arms
                .iter()
                .map(|arm| {
                    format!(
                        "{} => {},",
                        render_pattern(&arm.pat),
                        render_expr(&arm.body)
                    )
                })
                .collect::<Vec<_>>()
                .join(" ");
            format!(
                "match {} {{ {} }}",
                render_expr_parenthesized(scrutinee),
                arms
            )
        }
        Expr::While { label, test, body } => {
            let label_text = label
                .as_ref()
                .map(|l| format!("'{}: ", l))
                .unwrap_or_default();
            format!(
                "{}while {} {}",
                label_text,
                render_expr(test),
                render_block_inline(body)
            )
        }
        Expr::Loop { label, body } => {
            let label_text = label
                .as_ref()
                .map(|l| format!("'{}: ", l))
                .unwrap_or_default();
            format!("{}loop {}", label_text, render_block_inline(body))
        }
        Expr::LabeledBlock { label, body } => {
            format!("'{}: {}", label, render_block_inline(body))
        }
        Expr::Break { label } => match label {
            Some(label) => format!("break '{}", label),
            None => "break".to_string(),
        },
        Expr::Continue { label } => match label {
            Some(label) => format!("continue '{}", label),
            None => "continue".to_string(),
        },
        Expr::Return(value) => match value {
            Some(value) => format!("return {}", render_expr(value)),
            None => "return".to_string(),
        },
        Expr::StructLit { path, fields } => {
            if fields.is_empty() {
                return format!("{} {{}}", render_path(path));
            }
            let fields = fields
                .iter()
                .map(|(name, value)| match value {
                    Some(value) => format!("{}: {}", name, render_expr(value)),
                    None => name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} {{ {} }}", render_path(path), fields)
        }
        Expr::Array(values) => {
            let values = values.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            format!("[{}]", values)
        }
        Expr::MacroCall { name, args } => {
            let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            format!("{}({})", name, args)
        }
        Expr::CastAs { expr, ty } => {
            format!("{} as {}", render_expr_parenthesized(expr), render_type(ty))
        }
    }
}

fn render_block_inline(block: &Block) -> String {
    let mut parts = Vec::new();
    for stmt in &block.stmts {
        match stmt {
            Stmt::Let { pat, ty, value } => {
                let ty_text = match ty {
                    Some(ty) => format!(": {}", render_type(ty)),
                    None => String::new(),
                };
                match value {
                    Some(value) => parts.push(format!(
                        "let {}{} = {};",
                        render_pattern(pat),
                        ty_text,
                        render_expr(value)
                    )),
                    None => parts.push(format!("let {}{};", render_pattern(pat), ty_text)),
                }
            }
            Stmt::Expr(expr) => parts.push(format!("{};", render_expr(expr))),
            // Items cannot render inline; lowering only nests them in
            // statement-level blocks.
            Stmt::Item(_) => parts.push("/* item */".to_string()),
        }
    }
    if let Some(result) = &block.result {
        parts.push(render_expr(result));
    }
    if parts.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", parts.join(" "))
    }
}

/// Parenthesize operands that would otherwise be ambiguous.
fn render_operand(expr: &Expr) -> String {
    match expr {
        Expr::Binary { .. } | Expr::CastAs { .. } | Expr::Closure { .. } => {
            format!("({})", render_expr(expr))
        }
        _ => render_expr(expr),
    }
}

/// Parenthesize subjects of postfix syntax (calls, `.`, `?`, `as`).
fn render_expr_parenthesized(expr: &Expr) -> String {
    match expr {
        Expr::Binary { .. }
        | Expr::Unary { .. }
        | Expr::Closure { .. }
        | Expr::CastAs { .. }
        | Expr::If { .. }
        | Expr::StructLit { .. }
        | Expr::Return(_) => format!("({})", render_expr(expr)),
        _ => render_expr(expr),
    }
}

fn escape_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_function_item() {
        let file = SourceFile {
            inner_attrs: vec![],
            items: vec![Item::public(ItemKind::Function(Function {
                name: "answer".into(),
                generics: vec![],
                params: vec![],
                ret: Some(Type::path("i32")),
                body: Some(Block::of_result(Expr::Int(42))),
            }))],
        };
        assert_eq!(render_file(&file), "pub fn answer() -> i32 {\n    42\n}\n");
    }

    #[test]
    fn renders_static_with_once_lock() {
        let file = SourceFile {
            inner_attrs: vec![],
            items: vec![Item::plain(ItemKind::Static(Static {
                name: "COUNTER".into(),
                ty: Type::path("i32").once_lock(),
                value: Expr::call_path("std::sync::OnceLock::new", vec![]),
            }))],
        };
        assert_eq!(
            render_file(&file),
            "static COUNTER: std::sync::OnceLock<i32> = std::sync::OnceLock::new();\n"
        );
    }

    #[test]
    fn renders_match_statement() {
        let expr = Expr::Match {
            scrutinee: Box::new(Expr::id("r")),
            arms: vec![
                MatchArm {
                    pat: Pattern::TupleStruct {
                        path: Path::single("Ok"),
                        subpats: vec![Pattern::Id("x".into())],
                    },
                    body: Expr::id("x"),
                },
                MatchArm {
                    pat: Pattern::Wild,
                    body: Expr::ret(None),
                },
            ],
        };
        let file = SourceFile {
            inner_attrs: vec![],
            items: vec![Item::plain(ItemKind::Function(Function {
                name: "pick".into(),
                generics: vec![],
                params: vec![],
                ret: None,
                body: Some(Block::of_stmts(vec![Stmt::Expr(expr)])),
            }))],
        };
        let text = render_file(&file);
        assert!(text.contains("match r {"));
        assert!(text.contains("Ok(x) => x,"));
        assert!(text.contains("_ => return,"));
    }

    #[test]
    fn renders_closure_and_turbofish() {
        let cast = Expr::call(
            Expr::Path(Path::parse("weft_core::cast").with_args(vec![Type::path("Shape")])),
            vec![Expr::id("x")],
        );
        assert_eq!(render_expr(&cast), "weft_core::cast::<Shape>(x)");
        let closure = Expr::Closure {
            is_move: true,
            params: vec![Pattern::Id("x".into())],
            body: Box::new(Expr::id("x").method_call("clone", vec![])),
        };
        assert_eq!(render_expr(&closure), "move |x| x.clone()");
    }

    #[test]
    fn parenthesizes_ambiguous_operands() {
        let expr = Expr::binary(
            BinOp::Mul,
            Expr::binary(BinOp::Add, Expr::Int(1), Expr::Int(2)),
            Expr::Int(3),
        );
        assert_eq!(render_expr(&expr), "(1 + 2) * 3");
        let prop = Expr::binary(BinOp::Add, Expr::Int(1), Expr::Int(2)).propagate();
        assert_eq!(render_expr(&prop), "(1 + 2)?");
    }

    #[test]
    fn renders_labeled_loops() {
        let expr = Expr::Loop {
            label: Some("loop_0".into()),
            body: Block::of_stmts(vec![Stmt::Expr(Expr::Break {
                label: Some("loop_0".into()),
            })]),
        };
        assert_eq!(render_expr(&expr), "'loop_0: loop { break 'loop_0; }");
    }
}
