//! Rust AST node definitions and construction helpers.
//!
//! The catalog covers exactly what the translator emits; it is not a
//! general Rust grammar. Construction helpers keep the lowering code
//! terse (`expr.method_call("clone", vec![])` and friends).

/// One emitted `.rs` file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceFile {
    /// Inner attributes, rendered as `#![...]`.
    pub inner_attrs: Vec<Attr>,
    pub items: Vec<Item>,
}

/// An attribute, e.g. `derive(Clone)` or `cfg(test)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub args: Vec<String>,
}

impl Attr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn derive(traits: &[&str]) -> Self {
        Self::call("derive", traits.iter().map(|t| t.to_string()).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Vis {
    #[default]
    Private,
    Pub,
    PubCrate,
}

/// An item with its attributes and visibility.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub attrs: Vec<Attr>,
    pub vis: Vis,
    pub kind: ItemKind,
}

impl Item {
    pub fn plain(kind: ItemKind) -> Self {
        Self {
            attrs: Vec::new(),
            vis: Vis::Private,
            kind,
        }
    }

    pub fn public(kind: ItemKind) -> Self {
        Self {
            attrs: Vec::new(),
            vis: Vis::Pub,
            kind,
        }
    }

    pub fn with_attrs(attrs: Vec<Attr>, vis: Vis, kind: ItemKind) -> Self {
        Self { attrs, vis, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Function(Function),
    Struct(Struct),
    TupleStruct(TupleStruct),
    Enum(Enum),
    Trait(Trait),
    Impl(Impl),
    Static(Static),
    /// `mod name;` when `items` is `None`, inline module otherwise.
    Mod {
        name: String,
        items: Option<Vec<Item>>,
    },
    Use(Path),
    TypeAlias {
        name: String,
        ty: Type,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub params: Vec<Param>,
    /// `None` renders no `->` clause (unit return).
    pub ret: Option<Type>,
    /// `None` renders a trailing `;` (trait method without default).
    pub body: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// `&self`
    SelfRef,
    /// `self` by value
    SelfOwned,
    Typed { pat: Pattern, ty: Type },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: String,
    pub bounds: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub vis: Vis,
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleStruct {
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub fields: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enum {
    pub name: String,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    pub fields: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trait {
    pub name: String,
    pub generics: Vec<GenericParam>,
    pub bounds: Vec<Type>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Impl {
    pub generics: Vec<GenericParam>,
    /// `Some(trait)` for `impl Trait for Type`.
    pub of_trait: Option<Type>,
    pub self_ty: Type,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Static {
    pub name: String,
    pub ty: Type,
    pub value: Expr,
}

// ── Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Path(Path),
    Unit,
    Generic { path: Path, args: Vec<Type> },
    Ref(Box<Type>),
    Tuple(Vec<Type>),
    /// A bare `Fn(A, B) -> R` bound.
    Fn { params: Vec<Type>, ret: Box<Type> },
    /// `dyn Bound + Bound + ...`
    TraitObject { bounds: Vec<Type> },
    /// `impl Bound + Bound + ...`
    ImplTrait { bounds: Vec<Type> },
}

impl Type {
    pub fn path(text: &str) -> Self {
        Type::Path(Path::parse(text))
    }

    pub fn generic(path: &str, args: Vec<Type>) -> Self {
        Type::Generic {
            path: Path::parse(path),
            args,
        }
    }

    /// Wrap in `Option<...>`.
    pub fn option(self) -> Self {
        Type::generic("Option", vec![self])
    }

    /// Wrap in `std::sync::Arc<...>`.
    pub fn arc(self) -> Self {
        Type::generic("std::sync::Arc", vec![self])
    }

    /// Wrap in `std::sync::RwLock<...>`.
    pub fn rw_lock(self) -> Self {
        Type::generic("std::sync::RwLock", vec![self])
    }

    /// Wrap in `std::sync::OnceLock<...>`.
    pub fn once_lock(self) -> Self {
        Type::generic("std::sync::OnceLock", vec![self])
    }
}

/// A `::`-separated path. The final segment may carry generic
/// arguments, rendered turbofish-style in expression position.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<String>,
    pub final_args: Vec<Type>,
}

impl Path {
    pub fn new(segments: Vec<String>) -> Self {
        Self {
            segments,
            final_args: Vec::new(),
        }
    }

    /// Split a `::`-separated string into a path.
    pub fn parse(text: &str) -> Self {
        Self::new(text.split("::").map(str::to_string).collect())
    }

    pub fn single(segment: impl Into<String>) -> Self {
        Self::new(vec![segment.into()])
    }

    /// A copy with `next` appended.
    pub fn join(&self, next: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(next.into());
        Self::new(segments)
    }

    /// A copy whose last segment gains `suffix`.
    pub fn suffixed(&self, suffix: &str) -> Self {
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            last.push_str(suffix);
        }
        Self {
            segments,
            final_args: self.final_args.clone(),
        }
    }

    /// A copy with turbofish arguments on the last segment.
    pub fn with_args(mut self, args: Vec<Type>) -> Self {
        self.final_args = args;
        self
    }

    pub fn last(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }
}

// ── Statements and blocks ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        pat: Pattern,
        ty: Option<Type>,
        value: Option<Expr>,
    },
    /// Expression followed by `;`.
    Expr(Expr),
    /// An item in statement position (closure-group structs/impls).
    Item(Box<Item>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Trailing result expression, rendered without `;`.
    pub result: Option<Box<Expr>>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, result: Option<Expr>) -> Self {
        Self {
            stmts,
            result: result.map(Box::new),
        }
    }

    pub fn of_result(result: Expr) -> Self {
        Self::new(Vec::new(), Some(result))
    }

    pub fn of_stmts(stmts: Vec<Stmt>) -> Self {
        Self::new(stmts, None)
    }
}

// ── Expressions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Assign,
}

impl BinOp {
    pub fn token(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Assign => "=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
    Deref,
    Ref,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(Path),
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Unit,
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    MethodCall {
        subject: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    FieldAccess {
        subject: Box<Expr>,
        field: String,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    /// `expr?`
    Propagate(Box<Expr>),
    Closure {
        is_move: bool,
        params: Vec<Pattern>,
        body: Box<Expr>,
    },
    Block(Block),
    If {
        test: Box<Expr>,
        then: Block,
        /// A `Block` or nested `If` expression.
        alt: Option<Box<Expr>>,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    While {
        label: Option<String>,
        test: Box<Expr>,
        body: Block,
    },
    Loop {
        label: Option<String>,
        body: Block,
    },
    /// A labeled non-loop block.
    LabeledBlock {
        label: String,
        body: Block,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Return(Option<Box<Expr>>),
    StructLit {
        path: Path,
        /// `None` value renders field shorthand.
        fields: Vec<(String, Option<Expr>)>,
    },
    Array(Vec<Expr>),
    MacroCall {
        name: String,
        args: Vec<Expr>,
    },
    /// `expr as Type`
    CastAs {
        expr: Box<Expr>,
        ty: Type,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pat: Pattern,
    pub body: Expr,
}

impl Expr {
    pub fn path(text: &str) -> Self {
        Expr::Path(Path::parse(text))
    }

    pub fn id(text: impl Into<String>) -> Self {
        Expr::Path(Path::single(text))
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// `path(args)` for a `::`-separated callee.
    pub fn call_path(path: &str, args: Vec<Expr>) -> Self {
        Expr::call(Expr::path(path), args)
    }

    pub fn method_call(self, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::MethodCall {
            subject: Box::new(self),
            method: method.into(),
            args,
        }
    }

    pub fn field(self, field: impl Into<String>) -> Self {
        Expr::FieldAccess {
            subject: Box::new(self),
            field: field.into(),
        }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn reference(self) -> Self {
        Expr::unary(UnOp::Ref, self)
    }

    pub fn deref(self) -> Self {
        Expr::unary(UnOp::Deref, self)
    }

    pub fn propagate(self) -> Self {
        Expr::Propagate(Box::new(self))
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Expr::Return(value.map(Box::new))
    }
}

// ── Patterns ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Id(String),
    MutId(String),
    Wild,
    TupleStruct { path: Path, subpats: Vec<Pattern> },
    Alt(Vec<Pattern>),
    IntLit(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let p = Path::parse("std::sync::Arc");
        assert_eq!(p.segments, vec!["std", "sync", "Arc"]);
        assert_eq!(p.join("new").last(), "new");
        assert_eq!(Path::single("Shape").suffixed("Trait").last(), "ShapeTrait");
    }

    #[test]
    fn deep_copy_is_explicit() {
        // Sharing a node between two parents requires a clone; the
        // original and the copy are then fully independent values.
        let inner = Expr::id("x").method_call("clone", vec![]);
        let copy = inner.clone();
        let call = Expr::call(Expr::id("f"), vec![inner]);
        let other = Expr::call(Expr::id("g"), vec![copy]);
        assert_ne!(call, other);
    }
}
