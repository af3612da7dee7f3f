//! IR-to-Rust lowering.
//!
//! One [`Translator`] per IR module. Two preprocessing passes populate
//! the declaration table (imports + module-level declarations, then
//! topper promotion), after which top-levels lower one at a time into
//! module items, module init statements, and test items. The assembler
//! merges those into the emitted source file.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use tracing::debug;
use weft_common::Span;
use weft_ir::scan;
use weft_ir::{
    IrArg, IrBlock, IrCallee, IrExpr, IrExprKind, IrFunction, IrGlobal, IrItem, IrLibrary,
    IrLiteral, IrLocal, IrModule, IrParam, IrProperty, IrStmt, IrStmtKind, IrTest, IrType,
    Name, TypeFactsMap, Visibility,
};
use weft_rust_ast::{
    Attr, BinOp, Block, Expr, Function, GenericParam, Item, ItemKind, MatchArm, Param, Path,
    Pattern, Stmt, Type, Vis,
};

use crate::decls::{DeclInfo, DeclOrigin, DeclTable, ImportInfo};
use crate::describe::{describe, Describe};
use crate::error::{Lower, LowerInterrupt, TranslateError};
use crate::names;
use crate::types::{translate_described, translate_type, wrap_result_type};
use crate::wrap::{self, read_locked, wrap_arc, wrap_lock, wrap_ok, wrap_some};

/// Constructor lowering phase: field-initializing statements resolve
/// internal properties to raw local slots, later statements to the
/// already-built instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CtorMode {
    Init,
    Use,
}

/// A name captured by the active closure group.
#[derive(Debug, Clone)]
pub(crate) struct CapturedDecl {
    pub assign_once: bool,
    /// Present for captured local functions; used to synthesize a
    /// callable wrapper when the function is referenced as a value.
    pub function: Option<Box<IrFunction>>,
}

/// Per-function lowering state.
pub(crate) struct FunctionContext {
    pub captures: FxHashMap<Name, CapturedDecl>,
    pub methodized: FxHashSet<Name>,
    pub mutable_captures: FxHashSet<Name>,
    pub return_type: Describe,
    pub ctor_mode: Option<CtorMode>,
    pub this_name: Option<Name>,
}

impl FunctionContext {
    pub fn plain(return_type: Describe) -> Self {
        Self {
            captures: FxHashMap::default(),
            methodized: FxHashSet::default(),
            mutable_captures: FxHashSet::default(),
            return_type,
            ctor_mode: None,
            this_name: None,
        }
    }
}

/// Options for [`Translator::translate_function`].
#[derive(Default)]
pub(crate) struct FunctionOpts {
    pub name_override: Option<String>,
    /// Present when the function becomes a method of a closure-group
    /// capture struct; adds `&self` and routes capture references.
    pub captures: Option<FxHashMap<Name, CapturedDecl>>,
    pub methodized: FxHashSet<Name>,
    pub vis: Option<Vis>,
    pub return_type: Option<IrType>,
    pub skip_self: bool,
    /// Replaces the lowered body entirely (supertype forwarders).
    pub body_override: Option<Block>,
    pub as_method: bool,
}

pub struct Translator<'a> {
    pub(crate) library: &'a IrLibrary,
    pub(crate) module: &'a IrModule,
    pub(crate) decls: DeclTable,
    pub(crate) fn_stack: Vec<FunctionContext>,
    /// Innermost-last stack of jump labels; `None` frames are labeled
    /// non-loop statements.
    pub(crate) loop_labels: Vec<Option<String>>,
    pub(crate) module_inits: Vec<Stmt>,
    pub(crate) module_items: Vec<Item>,
    pub(crate) test_items: Vec<Item>,
    /// Dispatch traits whose methods this module calls; sorted for
    /// deterministic `use` emission.
    pub(crate) trait_imports: BTreeSet<String>,
    pub(crate) fail_vars: FxHashSet<Name>,
    pub(crate) inside_mutable_type: bool,
    pub(crate) closure_count: u32,
    pub(crate) temp_count: u32,
}

impl<'a> Translator<'a> {
    pub fn new(library: &'a IrLibrary, module: &'a IrModule) -> Self {
        Self {
            library,
            module,
            decls: DeclTable::new(),
            fn_stack: Vec::new(),
            loop_labels: Vec::new(),
            module_inits: Vec::new(),
            module_items: Vec::new(),
            test_items: Vec::new(),
            trait_imports: BTreeSet::new(),
            fail_vars: FxHashSet::default(),
            inside_mutable_type: false,
            closure_count: 0,
            temp_count: 0,
        }
    }

    pub(crate) fn facts(&self) -> &'a TypeFactsMap {
        &self.library.type_facts
    }

    /// A fresh name no user declaration can collide with.
    pub(crate) fn unused_temp(&mut self, hint: &str) -> String {
        self.temp_count += 1;
        format!("{}___{}", hint, self.temp_count)
    }

    // ── Preprocessing ────────────────────────────────────────────

    pub(crate) fn preprocess_imports(&mut self) {
        for import in &self.module.imports {
            let mut info = DeclInfo::new(DeclOrigin::Import, import.span)
                .with_type(import.ty.clone());
            if let Some(sig) = &import.function_sig {
                info.sig = Some(sig.clone());
            }
            info.import = Some(ImportInfo {
                source: import.source.clone(),
                exported_name: import.exported_name.clone(),
                is_function: import.function_sig.is_some(),
            });
            self.decls.declare(import.local_name.clone(), info);
        }
    }

    pub(crate) fn preprocess_top_levels(&mut self) {
        // Pass one: register module-level declarations. Exported values
        // are toppers from the start.
        for item in &self.module.top_levels {
            match item {
                IrItem::Global(global) => {
                    let mut info = DeclInfo::new(DeclOrigin::Global, global.span)
                        .with_type(global.ty.clone());
                    info.assign_once = global.assign_once;
                    info.exported = global.exported;
                    info.topper = global.exported;
                    self.decls.declare(global.name.clone(), info);
                }
                IrItem::Function(function) => {
                    let mut info = DeclInfo::new(DeclOrigin::Function, function.span).with_sig(
                        weft_ir::Signature::new(
                            function.params.params.iter().map(|p| p.ty.clone()).collect(),
                            function.ret.clone(),
                        ),
                    );
                    info.exported = function.exported;
                    self.decls.declare(function.name.clone(), info);
                }
                IrItem::Type(decl) => {
                    let mut info = DeclInfo::new(DeclOrigin::Type, decl.span);
                    info.exported = decl.visibility == Visibility::Public;
                    self.decls.declare(decl.name.clone(), info);
                }
                IrItem::Test(_) | IrItem::Init(_) => {}
            }
        }
        // Pass two: a module-scope value referenced from a function or
        // type body crosses a scope boundary, so promote it. Promotion
        // must finish before any lowering emits a reference.
        let mut promote = Vec::new();
        for item in &self.module.top_levels {
            if !matches!(item, IrItem::Function(_) | IrItem::Type(_) | IrItem::Test(_)) {
                continue;
            }
            for name in scan::item_referenced_names(item) {
                let Some(decl) = self.decls.resolve(&name) else {
                    continue;
                };
                if decl.origin == DeclOrigin::Global && !decl.topper {
                    promote.push(name);
                }
            }
        }
        for name in promote {
            self.decls.promote_topper(&name);
        }
        // Emit a singleton accessor per topper.
        for (name, info) in self
            .decls
            .toppers()
            .into_iter()
            .map(|(n, d)| (n.clone(), d.clone()))
            .collect::<Vec<_>>()
        {
            let getter = self.build_topper_getter(&name, &info);
            self.module_items.push(getter);
        }
    }

    pub(crate) fn process_top_level(&mut self, item: &IrItem) -> Result<(), TranslateError> {
        match item {
            IrItem::Global(global) => self.process_global(global),
            IrItem::Function(function) => {
                let item = self.translate_function(function, FunctionOpts::default())?;
                self.module_items.push(item);
                Ok(())
            }
            IrItem::Type(decl) => self.process_type_decl(decl),
            IrItem::Test(test) => self.process_test(test),
            IrItem::Init(init) => {
                if init.fails {
                    return Ok(());
                }
                let mut results = Vec::new();
                self.process_statements(&init.body.statements, &mut results, false)?;
                self.module_inits.extend(results);
                Ok(())
            }
        }
    }

    fn process_global(&mut self, global: &IrGlobal) -> Result<(), TranslateError> {
        let info = self
            .decls
            .resolve(&global.name)
            .cloned()
            .unwrap_or_else(|| DeclInfo::new(DeclOrigin::Global, global.span));
        let value = match &global.init {
            None => None,
            Some(init) => {
                let given = describe(&init.ty);
                let wanted = describe(&global.ty);
                match self.lower_never_guard(init)? {
                    None => return Ok(()),
                    Some(expr) => Some(self.maybe_wrap(expr, &given, Some(&wanted))),
                }
            }
        };
        if info.topper {
            if let Some(value) = value {
                let stmts = self.build_topper_assign(&global.name, &info, value);
                self.module_inits.extend(stmts);
            }
        } else {
            // Only init code can reach a non-topper module value, so it
            // stays a local of the init closure.
            let ty = translate_type(&global.ty, &self.decls);
            let pat = if global.assign_once {
                Pattern::Id(names::value_name(&global.name))
            } else {
                Pattern::MutId(names::value_name(&global.name))
            };
            self.module_inits.push(Stmt::Let {
                pat,
                ty: Some(ty),
                value,
            });
        }
        Ok(())
    }

    /// Lower an expression, mapping the never-reference interrupt to
    /// `None` for callers that drop the statement.
    fn lower_never_guard(&mut self, expr: &IrExpr) -> Result<Option<Expr>, TranslateError> {
        match self.lower_expr(expr, false) {
            Ok(expr) => Ok(Some(expr)),
            Err(LowerInterrupt::NeverRef) => Ok(None),
            Err(LowerInterrupt::Fatal(error)) => Err(error),
        }
    }

    fn process_test(&mut self, test: &IrTest) -> Result<(), TranslateError> {
        self.fn_stack.push(FunctionContext::plain(Describe {
            core: None,
            nullable: false,
            fallible: true,
        }));
        let lowered = (|| {
            let mut stmts = vec![
                // Init is idempotent, so every test may call it.
                Stmt::Expr(Expr::call_path("crate::init", vec![]).propagate()),
            ];
            self.process_statements(&test.body.statements, &mut stmts, false)?;
            Ok::<_, TranslateError>(Block::new(stmts, Some(wrap_ok(Expr::Unit))))
        })();
        self.fn_stack.pop();
        let block = lowered?;
        let function = Function {
            name: names::value_name(&test.name),
            generics: vec![],
            params: vec![],
            ret: Some(wrap_result_type(Type::Unit)),
            body: Some(block),
        };
        self.test_items.push(Item::with_attrs(
            vec![Attr::new("test")],
            Vis::Private,
            ItemKind::Function(function),
        ));
        Ok(())
    }

    // ── Toppers ──────────────────────────────────────────────────

    /// The storage cell and accessor for a topper: a `OnceLock` static
    /// for assign-once values, a locked `Option` for mutable ones.
    pub(crate) fn build_topper_getter(&mut self, name: &Name, info: &DeclInfo) -> Item {
        let ty = info
            .ir_type
            .as_ref()
            .map(|t| translate_type(t, &self.decls))
            .unwrap_or(Type::Unit);
        let cell = info.cell.clone().unwrap_or_else(|| names::shout_name(name));
        let accessor = info
            .accessor
            .clone()
            .unwrap_or_else(|| names::value_name(name));
        let desc = info
            .ir_type
            .as_ref()
            .map(describe)
            .unwrap_or_else(Describe::unit);
        let access = if info.assign_once {
            self.module_items.push(Item::plain(ItemKind::Static(
                weft_rust_ast::Static {
                    name: cell.clone(),
                    ty: ty.clone().once_lock(),
                    value: Expr::call_path("std::sync::OnceLock::new", vec![]),
                },
            )));
            let read = Expr::id(&cell)
                .method_call("get", vec![])
                .method_call("unwrap", vec![])
                .deref();
            wrap::maybe_clone_simple(read, &desc)
        } else {
            self.module_items.push(Item::plain(ItemKind::Static(
                weft_rust_ast::Static {
                    name: cell.clone(),
                    ty: ty.clone().option().rw_lock(),
                    value: wrap_lock(Expr::path("None")),
                },
            )));
            // First-access reads block behind the write that seeds the
            // cell; the clone keeps no guard alive past the call.
            Expr::id(&cell)
                .method_call("read", vec![])
                .method_call("unwrap", vec![])
                .method_call("clone", vec![])
                .method_call("unwrap", vec![])
        };
        let vis = if info.exported { Vis::Pub } else { Vis::PubCrate };
        Item::with_attrs(
            vec![],
            vis,
            ItemKind::Function(Function {
                name: accessor,
                generics: vec![],
                params: vec![],
                ret: Some(ty),
                body: Some(Block::of_result(access)),
            }),
        )
    }

    pub(crate) fn build_topper_assign(
        &mut self,
        name: &Name,
        info: &DeclInfo,
        value: Expr,
    ) -> Vec<Stmt> {
        let cell = info.cell.clone().unwrap_or_else(|| names::shout_name(name));
        if info.assign_once {
            // The frontend rules out double assignment; panic rather
            // than require Debug on every stored type.
            let fail = Expr::Closure {
                is_move: false,
                params: vec![Pattern::Wild],
                body: Box::new(Expr::MacroCall {
                    name: "panic!".into(),
                    args: vec![],
                }),
            };
            vec![Stmt::Expr(
                Expr::id(&cell)
                    .method_call("set", vec![value])
                    .method_call("unwrap_or_else", vec![fail]),
            )]
        } else {
            let write = Expr::binary(
                BinOp::Assign,
                Expr::id(&cell)
                    .method_call("write", vec![])
                    .method_call("unwrap", vec![])
                    .deref(),
                wrap_some(value),
            );
            // Scope the write guard to its own block.
            vec![Stmt::Expr(Expr::Block(Block::of_stmts(vec![Stmt::Expr(
                write,
            )])))]
        }
    }

    // ── Statement processing ─────────────────────────────────────

    /// Lower a statement list, combining handler-scope pairs and
    /// flushing pending local function groups when first referenced.
    pub(crate) fn process_statements(
        &mut self,
        statements: &[IrStmt],
        results: &mut Vec<Stmt>,
        skip_last_return: bool,
    ) -> Result<(), TranslateError> {
        let mut pending: Vec<&IrFunction> = Vec::new();
        let mut i = 0;
        while i < statements.len() {
            let statement = &statements[i];
            if let IrStmtKind::LocalFn(function) = &statement.kind {
                pending.push(function);
                i += 1;
                continue;
            }
            if !pending.is_empty() {
                let mut referenced = FxHashSet::default();
                collect_stmt_names(statement, &mut referenced);
                if pending.iter().any(|f| referenced.contains(&f.name)) {
                    let group: Vec<&IrFunction> = pending.drain(..).collect();
                    let stmts = self.lower_local_fn_group(&group)?;
                    results.extend(stmts);
                }
            }
            // Handler scopes pair with the conditional that follows.
            if let IrStmtKind::Handler {
                assign,
                handled,
                fail_flag,
            } = &statement.kind
            {
                let check = statements.get(i + 1).ok_or_else(|| {
                    TranslateError::internal("handler scope without its check", statement.span)
                })?;
                let stmts = self.lower_handler_pair(
                    assign.as_ref(),
                    handled,
                    fail_flag,
                    check,
                    statement.span,
                )?;
                results.extend(stmts);
                i += 2;
                continue;
            }
            let lowered = if skip_last_return && i == statements.len() - 1 {
                if let IrStmtKind::Return { .. } = &statement.kind {
                    self.lower_return_stmt(statement, true)
                } else {
                    self.lower_statement(statement)
                }
            } else {
                self.lower_statement(statement)
            };
            match lowered {
                Ok(stmts) => results.extend(stmts),
                Err(LowerInterrupt::NeverRef) => {
                    // A reference to a never-typed value: the statement
                    // is dropped. Flag it so changed side effects are
                    // observable to a developer.
                    debug!(span = %statement.span, "dropped statement referencing never value");
                }
                Err(LowerInterrupt::Fatal(error)) => return Err(error),
            }
            i += 1;
        }
        Ok(())
    }

    fn lower_statement(&mut self, statement: &IrStmt) -> Lower<Vec<Stmt>> {
        let span = statement.span;
        match &statement.kind {
            IrStmtKind::Let(local) => self.lower_let(local, span),
            IrStmtKind::Assign { target, value } => {
                if self.fail_vars.contains(target) {
                    return Ok(vec![]);
                }
                let decl = self.decls.resolve(target).cloned();
                let given = describe(&value.ty);
                let wanted = decl.as_ref().and_then(|d| d.ir_type.as_ref()).map(describe);
                let lowered = self.lower_expr(value, false)?;
                let lowered = self.maybe_wrap(lowered, &given, wanted.as_ref());
                self.lower_assignment_to(target, lowered, span)
            }
            IrStmtKind::SetProperty {
                subject,
                property,
                value,
            } => self.lower_set_property(subject, property, value, span),
            IrStmtKind::Expr(expr) => {
                let lowered = self.lower_expr(expr, false)?;
                Ok(vec![Stmt::Expr(lowered)])
            }
            IrStmtKind::If { test, then, alt } => self.lower_if(test, then, alt.as_deref()),
            IrStmtKind::While { test, body } => Ok(vec![self.lower_while(test, body, None)?]),
            IrStmtKind::Block(block) => {
                let mut stmts = Vec::new();
                self.process_statements(&block.statements, &mut stmts, false)
                    .map_err(LowerInterrupt::Fatal)?;
                Ok(vec![Stmt::Expr(Expr::Block(Block::of_stmts(stmts)))])
            }
            IrStmtKind::Labeled { label, stmt } => self.lower_labeled(label, stmt),
            IrStmtKind::Break { label } => {
                let label = self.resolve_jump_label(label.as_ref());
                Ok(vec![Stmt::Expr(Expr::Break { label })])
            }
            IrStmtKind::Continue { label } => {
                let label = self.resolve_jump_label(label.as_ref());
                Ok(vec![Stmt::Expr(Expr::Continue { label })])
            }
            IrStmtKind::Return { .. } => self.lower_return_stmt(statement, false),
            IrStmtKind::Switch {
                scrutinee,
                cases,
                default,
            } => self.lower_switch(scrutinee, cases, default),
            IrStmtKind::LocalFn(_) => Err(TranslateError::internal(
                "local function outside a statement list",
                span,
            )
            .into()),
            IrStmtKind::Handler { .. } => Err(TranslateError::internal(
                "handler scope lowered outside its pair",
                span,
            )
            .into()),
            IrStmtKind::InitFailed => {
                let sentinel = self.fail_sentinel(span);
                Ok(vec![Stmt::Expr(Expr::ret(Some(sentinel)))])
            }
        }
    }

    fn lower_let(&mut self, local: &IrLocal, span: Span) -> Lower<Vec<Stmt>> {
        if local.fail_flag {
            self.fail_vars.insert(local.name.clone());
            return Ok(vec![]);
        }
        let is_mutable_capture = self
            .fn_stack
            .last()
            .is_some_and(|ctx| ctx.mutable_captures.contains(&local.name));
        let raw_ty = translate_type(&local.ty, &self.decls);
        let ty = if is_mutable_capture {
            raw_ty.clone().rw_lock().arc()
        } else {
            raw_ty
        };
        let mut info = DeclInfo::new(DeclOrigin::Local, span)
            .local()
            .with_type(local.ty.clone());
        info.assign_once = local.assign_once;
        info.mutable_capture = is_mutable_capture;
        self.decls.declare_if_absent(local.name.clone(), info);
        if is_mutable_capture {
            self.decls.promote_mutable_capture(&local.name);
        }

        let value = match &local.init {
            None => None,
            Some(init) => {
                let given = describe(&init.ty);
                let wanted = describe(&local.ty);
                let lowered = self.lower_expr(init, false)?;
                let wrapped = self.maybe_wrap(lowered, &given, Some(&wanted));
                Some(if is_mutable_capture {
                    // The declaration itself allocates the shared,
                    // lockable slot.
                    wrap_arc(wrap_lock(wrapped))
                } else {
                    wrapped
                })
            }
        };
        if matches!(local.ty, IrType::Never) {
            // Never-typed slots cannot exist; keep only the side effect.
            return Ok(value.map(|v| vec![Stmt::Expr(v)]).unwrap_or_default());
        }
        // Mutable captures mutate through the lock, so the binding
        // itself stays immutable.
        let pat = if local.assign_once || is_mutable_capture {
            Pattern::Id(names::value_name(&local.name))
        } else {
            Pattern::MutId(names::value_name(&local.name))
        };
        Ok(vec![Stmt::Let {
            pat,
            ty: Some(ty),
            value,
        }])
    }

    pub(crate) fn lower_assignment_to(
        &mut self,
        target: &Name,
        value: Expr,
        span: Span,
    ) -> Lower<Vec<Stmt>> {
        let decl = self.decls.resolve(target).cloned();
        if decl
            .as_ref()
            .and_then(|d| d.ir_type.as_ref())
            .is_some_and(|t| matches!(t, IrType::Never))
        {
            return Ok(vec![Stmt::Expr(value)]);
        }
        let mutable_capture = decl.as_ref().is_some_and(|d| d.mutable_capture);
        let in_capture_scope = mutable_capture
            && self
                .fn_stack
                .last()
                .is_some_and(|ctx| ctx.captures.contains_key(target));
        if let Some(decl) = &decl {
            if decl.topper {
                return Ok(self.build_topper_assign(target, decl, value));
            }
        }
        let id = names::value_name(target);
        let place = if in_capture_scope {
            Expr::id("self").field(&id)
        } else {
            Expr::id(&id)
        };
        let stmt = if mutable_capture {
            let assign = Expr::binary(
                BinOp::Assign,
                place
                    .method_call("write", vec![])
                    .method_call("unwrap", vec![])
                    .deref(),
                value,
            );
            // Scope the write guard so it cannot overlap a later read.
            Stmt::Expr(Expr::Block(Block::of_stmts(vec![Stmt::Expr(assign)])))
        } else {
            Stmt::Expr(Expr::binary(BinOp::Assign, place, value))
        };
        let _ = span;
        Ok(vec![stmt])
    }

    fn lower_set_property(
        &mut self,
        subject: &IrExpr,
        property: &IrProperty,
        value: &IrExpr,
        _span: Span,
    ) -> Lower<Vec<Stmt>> {
        let given = describe(&value.ty);
        let wanted = self.property_type(subject, property).map(|t| describe(&t));
        let lowered_value = self.lower_expr(value, false)?;
        let lowered_value = self.maybe_wrap(lowered_value, &given, wanted.as_ref());
        if property.internal {
            let place = self.lower_property_place(subject, property, "write")?;
            Ok(vec![Stmt::Expr(Expr::binary(
                BinOp::Assign,
                place,
                lowered_value,
            ))])
        } else {
            let subject = self.lower_expr(subject, true)?;
            let setter = format!(
                "set_{}",
                weft_common::ident::camel_to_snake(&property.name)
            );
            Ok(vec![Stmt::Expr(
                subject.method_call(setter, vec![lowered_value]),
            )])
        }
    }

    /// The declared type of a property, recovered from the subject's
    /// type facts; absent for foreign types the facts don't cover.
    fn property_type(&self, subject: &IrExpr, property: &IrProperty) -> Option<IrType> {
        let _ = (subject, property);
        // Field types are tracked on the class declaration itself;
        // cross-module property writes rely on the value's own type
        // matching, which the frontend guarantees for stores.
        None
    }

    fn lower_if(
        &mut self,
        test: &IrExpr,
        then: &IrStmt,
        alt: Option<&IrStmt>,
    ) -> Lower<Vec<Stmt>> {
        // The frontend conjures checks of fail flags; those vanish with
        // the flags themselves.
        if let IrExprKind::Ref(name) = &test.kind {
            if self.fail_vars.contains(name) {
                return Ok(vec![]);
            }
        }
        let test = self.lower_expr(test, false)?;
        let then_block = self.lower_stmt_as_block(then)?;
        let alt_expr = match alt {
            None => None,
            Some(alt) => {
                let stmts = self.lower_statement(alt)?;
                if stmts.is_empty() {
                    None
                } else if let [Stmt::Expr(expr @ Expr::If { .. })] = stmts.as_slice() {
                    Some(Box::new(expr.clone()))
                } else {
                    Some(Box::new(Expr::Block(stmts_to_block(stmts))))
                }
            }
        };
        Ok(vec![Stmt::Expr(Expr::If {
            test: Box::new(test),
            then: then_block,
            alt: alt_expr,
        })])
    }

    fn lower_while(
        &mut self,
        test: &IrExpr,
        body: &IrStmt,
        explicit_label: Option<String>,
    ) -> Lower<Stmt> {
        // Every loop is labeled so jump rewrites never revisit it.
        let label = match explicit_label {
            Some(label) => label,
            None => self.unused_temp("loop"),
        };
        self.loop_labels.push(Some(label.clone()));
        let result = (|| {
            let body_block = self.lower_stmt_as_block(body)?;
            let expr = if matches!(
                &test.kind,
                IrExprKind::Literal(IrLiteral::Bool(true))
            ) {
                // `loop` is recognized as nonterminating by rustc.
                Expr::Loop {
                    label: Some(label.clone()),
                    body: body_block,
                }
            } else {
                let test = self.lower_expr(test, false)?;
                Expr::While {
                    label: Some(label.clone()),
                    test: Box::new(test),
                    body: body_block,
                }
            };
            Ok(Stmt::Expr(expr))
        })();
        self.loop_labels.pop();
        result
    }

    fn lower_labeled(&mut self, label: &Name, stmt: &IrStmt) -> Lower<Vec<Stmt>> {
        let label_text = names::value_name(label);
        // A labeled loop takes the label itself; anything else becomes
        // a labeled block, with a `None` frame so unlabeled jumps skip
        // past it to the nearest real loop.
        if let IrStmtKind::While { test, body } = &stmt.kind {
            let lowered = self.lower_while(test, body, Some(label_text))?;
            return Ok(vec![lowered]);
        }
        self.loop_labels.push(None);
        let result = (|| {
            let lowered = self.lower_statement(stmt)?;
            // A labeled declaration keeps its binding in the enclosing
            // scope; only the initializer can be jumped out of.
            if let [Stmt::Let {
                pat,
                ty,
                value: Some(value),
            }] = lowered.as_slice()
            {
                return Ok(vec![Stmt::Let {
                    pat: pat.clone(),
                    ty: ty.clone(),
                    value: Some(Expr::LabeledBlock {
                        label: label_text.clone(),
                        body: Block::of_result(value.clone()),
                    }),
                }]);
            }
            let block = stmts_to_block(lowered);
            Ok(vec![Stmt::Expr(Expr::LabeledBlock {
                label: label_text.clone(),
                body: block,
            })])
        })();
        self.loop_labels.pop();
        result
    }

    /// Default-jump-label resolution: an explicit label is used as-is;
    /// otherwise, if the innermost frame is a labeled non-loop, jump to
    /// the nearest enclosing loop's label explicitly.
    fn resolve_jump_label(&self, label: Option<&Name>) -> Option<String> {
        match label {
            Some(label) => Some(names::value_name(label)),
            None => match self.loop_labels.last() {
                Some(Some(_)) | None => None,
                Some(None) => self
                    .loop_labels
                    .iter()
                    .rev()
                    .find_map(|frame| frame.clone()),
            },
        }
    }

    fn lower_return_stmt(&mut self, statement: &IrStmt, last: bool) -> Lower<Vec<Stmt>> {
        let IrStmtKind::Return { value } = &statement.kind else {
            return Err(
                TranslateError::internal("return lowering on non-return", statement.span).into(),
            );
        };
        let ctx_return = self
            .fn_stack
            .last()
            .map(|ctx| (ctx.return_type.clone(), ctx.ctor_mode))
            .unwrap_or((Describe::unit(), None));
        let lowered = match value {
            None => {
                if ctx_return.1 == Some(CtorMode::Use) {
                    let selfish = Expr::id("selfish");
                    Some(if ctx_return.0.fallible {
                        wrap_ok(selfish)
                    } else {
                        selfish
                    })
                } else if ctx_return.0.fallible {
                    Some(wrap_ok(Expr::Unit))
                } else if last {
                    return Ok(vec![]);
                } else {
                    None
                }
            }
            Some(value) => {
                let given = describe(&value.ty);
                let expr = self.lower_expr(value, false)?;
                Some(self.maybe_wrap(expr, &given, Some(&ctx_return.0)))
            }
        };
        Ok(vec![Stmt::Expr(Expr::ret(lowered))])
    }

    fn lower_switch(
        &mut self,
        scrutinee: &IrExpr,
        cases: &[weft_ir::IrSwitchCase],
        default: &IrBlock,
    ) -> Lower<Vec<Stmt>> {
        let scrutinee = self.lower_expr(scrutinee, false)?;
        let mut arms = Vec::new();
        for case in cases {
            let pat = if case.values.len() == 1 {
                Pattern::IntLit(case.values[0])
            } else {
                Pattern::Alt(case.values.iter().map(|v| Pattern::IntLit(*v)).collect())
            };
            let mut stmts = Vec::new();
            self.process_statements(&case.body.statements, &mut stmts, false)
                .map_err(LowerInterrupt::Fatal)?;
            arms.push(MatchArm {
                pat,
                body: Expr::Block(stmts_to_block(stmts)),
            });
        }
        let mut default_stmts = Vec::new();
        self.process_statements(&default.statements, &mut default_stmts, false)
            .map_err(LowerInterrupt::Fatal)?;
        arms.push(MatchArm {
            pat: Pattern::Wild,
            body: Expr::Block(stmts_to_block(default_stmts)),
        });
        Ok(vec![Stmt::Expr(Expr::Match {
            scrutinee: Box::new(scrutinee),
            arms,
        })])
    }

    // ── Handler scopes ───────────────────────────────────────────

    /// Compile a fallible call plus its failure check into one match:
    /// the success arm binds the unwrapped value and continues; the
    /// failure arm either propagates or runs the check's consequent.
    fn lower_handler_pair(
        &mut self,
        assign: Option<&Name>,
        handled: &IrExpr,
        fail_flag: &Name,
        check: &IrStmt,
        span: Span,
    ) -> Result<Vec<Stmt>, TranslateError> {
        self.fail_vars.insert(fail_flag.clone());
        let IrStmtKind::If { test, then, alt } = &check.kind else {
            return Err(TranslateError::internal(
                "handler scope check is not a conditional",
                check.span,
            ));
        };
        if !matches!(&test.kind, IrExprKind::Ref(name) if name == fail_flag) {
            return Err(TranslateError::internal(
                "handler scope check does not test its fail flag",
                check.span,
            ));
        }
        let handled_desc = describe(&handled.ty);
        let handled_expr = match self.lower_never_guard(handled)? {
            Some(expr) => expr,
            None => return Ok(vec![]),
        };
        let wanted = assign
            .and_then(|name| self.decls.resolve(name))
            .and_then(|decl| decl.ir_type.clone())
            .map(|t| describe(&t));
        // Sometimes handling is conjured around nonfallible values.
        if !handled_desc.fallible {
            return match assign {
                Some(target) => self
                    .lower_assignment_to(target, handled_expr, span)
                    .map_err(fatal_lower),
                None => Ok(vec![Stmt::Expr(handled_expr)]),
            };
        }
        let inner_desc = Describe {
            core: handled_desc.core.clone(),
            nullable: handled_desc.nullable,
            fallible: false,
        };
        // A failure branch that just returns the fail sentinel means
        // "propagate": compile the whole pair to `?`.
        if is_bare_fail_return(then) {
            let value = handled_expr.propagate();
            let value = self.maybe_wrap(value, &inner_desc, wanted.as_ref());
            return match assign {
                Some(target) => self
                    .lower_assignment_to(target, value, span)
                    .map_err(fatal_lower),
                None => Ok(vec![Stmt::Expr(value)]),
            };
        }
        // Success arm.
        let capture = "x";
        let ok_value = self.maybe_wrap(Expr::id(capture), &inner_desc, wanted.as_ref());
        let extra = alt.as_deref().filter(|alt| !stmt_is_empty_block(alt));
        let ok_expr = match extra {
            None => ok_value,
            Some(extra) => {
                // Bind internally, then continue with the extra
                // statements under the success arm.
                let mut stmts = match assign {
                    Some(target) => self
                        .lower_assignment_to(target, ok_value, span)
                        .map_err(fatal_lower)?,
                    None => vec![],
                };
                let mut extra_stmts = Vec::new();
                self.process_statements(std::slice::from_ref(extra), &mut extra_stmts, false)?;
                stmts.extend(extra_stmts);
                Expr::Block(stmts_to_block(stmts))
            }
        };
        // Failure arm: the branch's statements, lowered verbatim.
        let err_stmts = match self.lower_statement(then) {
            Ok(stmts) => stmts,
            Err(LowerInterrupt::NeverRef) => vec![],
            Err(LowerInterrupt::Fatal(error)) => return Err(error),
        };
        let err_expr = match err_stmts.as_slice() {
            [Stmt::Expr(expr)] => expr.clone(),
            _ => Expr::Block(stmts_to_block(err_stmts)),
        };
        let match_expr = Expr::Match {
            scrutinee: Box::new(handled_expr),
            arms: vec![
                MatchArm {
                    pat: Pattern::TupleStruct {
                        path: Path::single("Ok"),
                        subpats: vec![Pattern::Id(capture.into())],
                    },
                    body: ok_expr,
                },
                MatchArm {
                    pat: Pattern::Wild,
                    body: err_expr,
                },
            ],
        };
        match (assign, extra) {
            (Some(target), None) => self
                .lower_assignment_to(target, match_expr, span)
                .map_err(fatal_lower),
            _ => Ok(vec![Stmt::Expr(match_expr)]),
        }
    }

    /// The fail sentinel: propagate in a fallible context, abort in a
    /// non-fallible one.
    pub(crate) fn fail_sentinel(&self, _span: Span) -> Expr {
        match self.fn_stack.last() {
            Some(ctx) if !ctx.return_type.fallible => Expr::MacroCall {
                name: "panic!".into(),
                args: vec![],
            },
            _ => Expr::call_path(
                "Err",
                vec![Expr::call_path("weft_core::Error::new", vec![])],
            ),
        }
    }

    // ── Expressions ──────────────────────────────────────────────

    pub(crate) fn lower_expr(&mut self, expr: &IrExpr, avoid_clone: bool) -> Lower<Expr> {
        match &expr.kind {
            IrExprKind::Literal(literal) => Ok(self.lower_literal(literal)),
            IrExprKind::Ref(name) => self.lower_reference(name, &expr.ty, avoid_clone, false),
            IrExprKind::This => self.lower_this(&expr.ty, avoid_clone, expr.span),
            IrExprKind::FailSentinel => Ok(self.fail_sentinel(expr.span)),
            IrExprKind::Call { callee, args } => self.lower_call(callee, args, expr),
            IrExprKind::GetProperty { subject, property } => {
                self.lower_get_property(subject, property, &expr.ty, avoid_clone)
            }
            IrExprKind::Cast { expr: inner, to } => self.lower_cast(inner, to, &expr.ty),
            IrExprKind::IsType { expr: inner, tested } => self.lower_is_type(inner, tested),
            IrExprKind::NotNull(inner) => {
                let lowered = self.lower_expr(inner, avoid_clone)?;
                Ok(lowered.method_call("unwrap", vec![]))
            }
        }
    }

    fn lower_literal(&mut self, literal: &IrLiteral) -> Expr {
        match literal {
            IrLiteral::Bool(value) => Expr::Bool(*value),
            IrLiteral::Int(value) => Expr::Int(*value as i64),
            IrLiteral::Int64(value) => Expr::Int(*value),
            IrLiteral::Float64(value) => {
                if value.is_nan() {
                    Expr::path("f64::NAN")
                } else if value.is_infinite() {
                    if *value < 0.0 {
                        Expr::path("f64::NEG_INFINITY")
                    } else {
                        Expr::path("f64::INFINITY")
                    }
                } else {
                    Expr::Float(*value)
                }
            }
            IrLiteral::Str(text) => {
                wrap_arc(Expr::Str(text.clone()).method_call("to_string", vec![]))
            }
            IrLiteral::Null => Expr::path("None"),
            IrLiteral::Void => Expr::Unit,
        }
    }

    /// References read through whatever representation the declaration
    /// chose: capture fields, locked cells, topper accessors, import
    /// paths, or plain locals. Reads clone unless the caller opted out.
    pub(crate) fn lower_reference(
        &mut self,
        name: &Name,
        ty: &IrType,
        avoid_clone: bool,
        is_call: bool,
    ) -> Lower<Expr> {
        let desc = describe(ty);
        let captured = self
            .fn_stack
            .last()
            .and_then(|ctx| ctx.captures.get(name).cloned());
        let got = match captured {
            Some(capture) => {
                let field = names::value_name(name);
                let methodized = self
                    .fn_stack
                    .last()
                    .is_some_and(|ctx| ctx.methodized.contains(name));
                if methodized && !is_call {
                    // A captured group function referenced as a value:
                    // wrap the group in a fresh callable.
                    let function = capture.function.as_deref().ok_or_else(|| {
                        TranslateError::internal("methodized capture without function", Span::dummy())
                    })?;
                    let function = function.clone();
                    self.build_method_capture_wrapper(&function, Expr::id("self"))?
                } else {
                    let access = Expr::id("self").field(&field);
                    if capture.assign_once {
                        access
                    } else {
                        read_locked(access)
                    }
                }
            }
            None => {
                let decl = self.decls.resolve(name).cloned();
                if let Some(decl) = &decl {
                    if matches!(decl.ir_type, Some(IrType::Never)) {
                        return Err(LowerInterrupt::NeverRef);
                    }
                }
                match &decl {
                    Some(decl) if decl.mutable_capture => {
                        read_locked(Expr::id(names::value_name(name)))
                    }
                    Some(decl) if decl.topper => {
                        let accessor = decl
                            .accessor
                            .clone()
                            .unwrap_or_else(|| names::value_name(name));
                        Expr::call(Expr::id(accessor), vec![])
                    }
                    Some(decl) if decl.import.is_some() => {
                        let import = decl.import.as_ref().unwrap();
                        let styled = names::value_name(&Name::new(import.exported_name.clone()));
                        let path = names::import_path(import, styled);
                        if import.is_function || is_call {
                            Expr::Path(path)
                        } else {
                            // Value imports read through the exporting
                            // module's accessor.
                            Expr::call(Expr::Path(path), vec![])
                        }
                    }
                    _ => Expr::id(names::value_name(name)),
                }
            }
        };
        // Plain references clone; call results are already transient.
        Ok(self.maybe_clone(got, &desc, avoid_clone || is_call))
    }

    fn lower_this(&mut self, ty: &IrType, avoid_clone: bool, span: Span) -> Lower<Expr> {
        let mode = self.fn_stack.last().and_then(|ctx| ctx.ctor_mode);
        let this_name = self
            .fn_stack
            .iter()
            .rev()
            .find_map(|ctx| ctx.this_name.clone())
            .ok_or_else(|| TranslateError::internal("this outside a method", span))?;
        let desc = describe(ty);
        let base = if mode == Some(CtorMode::Use) {
            Expr::id("selfish")
        } else if self
            .fn_stack
            .last()
            .is_some_and(|ctx| ctx.captures.contains_key(&this_name))
        {
            Expr::id("self").field(names::value_name(&this_name))
        } else {
            Expr::id("self")
        };
        Ok(self.maybe_clone(base, &desc, avoid_clone))
    }

    fn lower_get_property(
        &mut self,
        subject: &IrExpr,
        property: &IrProperty,
        ty: &IrType,
        avoid_clone: bool,
    ) -> Lower<Expr> {
        let desc = describe(ty);
        if property.internal {
            let access = self.lower_property_place(subject, property, "read")?;
            Ok(self.maybe_clone(access, &desc, avoid_clone))
        } else {
            // External properties go through the accessor, which
            // already returns an owned value.
            let subject = self.lower_expr(subject, true)?;
            let getter = weft_common::ident::camel_to_snake(&property.name);
            Ok(subject.method_call(getter, vec![]))
        }
    }

    /// Internal property access path: the raw local slot during
    /// constructor init, otherwise through the wrapper handle with the
    /// appropriate lock operation.
    fn lower_property_place(
        &mut self,
        subject: &IrExpr,
        property: &IrProperty,
        lock_name: &str,
    ) -> Lower<Expr> {
        let field = weft_common::ident::camel_to_snake(&property.name);
        if self
            .fn_stack
            .last()
            .is_some_and(|ctx| ctx.ctor_mode == Some(CtorMode::Init))
        {
            return Ok(Expr::id(field));
        }
        let subject = self.lower_expr(subject, true)?;
        let mut core = subject.field("0");
        if self.inside_mutable_type {
            core = core
                .method_call(lock_name, vec![])
                .method_call("unwrap", vec![]);
        }
        Ok(core.field(field))
    }

    // ── Calls ────────────────────────────────────────────────────

    fn lower_call(&mut self, callee: &IrCallee, args: &[IrArg], expr: &IrExpr) -> Lower<Expr> {
        match callee {
            IrCallee::Builtin(op) => self.lower_support_call(
                crate::support::SupportKey::Builtin(*op),
                args,
                expr,
            ),
            IrCallee::Connected(name) => self.lower_support_call(
                crate::support::SupportKey::Connected(name.clone()),
                args,
                expr,
            ),
            IrCallee::Function { name, sig } => {
                let lowered_args = self.lower_args(args)?;
                let ctx_methodized = self
                    .fn_stack
                    .last()
                    .is_some_and(|ctx| ctx.methodized.contains(name) && ctx.captures.contains_key(name));
                if ctx_methodized {
                    // Group functions call through the capture struct.
                    return Ok(Expr::id("self")
                        .method_call(names::value_name(name), lowered_args));
                }
                let is_closure_value = self.decls.resolve(name).is_some_and(|d| d.local);
                let callee_expr = self.lower_reference(name, &IrType::Function(Box::new(sig.clone())), true, true)?;
                if is_closure_value {
                    // Function values are Arc-wrapped; call through a
                    // deref of the handle.
                    Ok(Expr::call(callee_expr.deref(), lowered_args))
                } else {
                    Ok(Expr::call(callee_expr, lowered_args))
                }
            }
            IrCallee::Method {
                subject,
                name,
                trait_owner,
            } => {
                if let Some(owner) = trait_owner {
                    self.record_trait_import(owner);
                }
                let lowered_args = self.lower_args(args)?;
                let subject = self.lower_expr(subject, true)?;
                Ok(subject.method_call(
                    weft_common::ident::camel_to_snake(name),
                    lowered_args,
                ))
            }
            IrCallee::Static { type_name, name } => {
                let lowered_args = self.lower_args(args)?;
                let path = crate::types::user_type_path(type_name, &self.decls)
                    .join(weft_common::ident::camel_to_snake(name));
                Ok(Expr::call(Expr::Path(path), lowered_args))
            }
            IrCallee::Ctor { type_name } => {
                let lowered_args = self.lower_args(args)?;
                let path = crate::types::user_type_path(type_name, &self.decls).join("new");
                Ok(Expr::call(Expr::Path(path), lowered_args))
            }
            IrCallee::Value(callee_expr) => {
                let lowered_args = self.lower_args(args)?;
                let callee_expr = self.lower_expr(callee_expr, true)?;
                Ok(Expr::call(callee_expr.deref(), lowered_args))
            }
        }
    }

    /// Record that this module calls methods of a dispatch trait, so
    /// the assembler emits the `use` that brings it into scope.
    pub(crate) fn record_trait_import(&mut self, owner: &Name) {
        let path = crate::types::user_type_path(owner, &self.decls).suffixed("Trait");
        self.trait_imports.insert(path.segments.join("::"));
    }

    /// General argument translation: each argument is lowered and then
    /// wrapped toward its resolved formal type. Rest arguments collect
    /// into a `vec![]`.
    fn lower_args(&mut self, args: &[IrArg]) -> Lower<Vec<Expr>> {
        let mut out = Vec::new();
        let mut rest = Vec::new();
        for arg in args {
            let lowered = self.lower_actual(&arg.value, arg.formal.as_ref(), false)?;
            if arg.is_rest {
                rest.push(lowered);
            } else {
                out.push(lowered);
            }
        }
        if !rest.is_empty() || args.iter().any(|a| a.is_rest) {
            out.push(Expr::MacroCall {
                name: "vec!".into(),
                args: rest,
            });
        }
        Ok(out)
    }

    /// Lower an argument toward a wanted type.
    pub(crate) fn lower_actual(
        &mut self,
        arg: &IrExpr,
        wanted: Option<&IrType>,
        avoid_clone: bool,
    ) -> Lower<Expr> {
        let wanted_desc = wanted.map(describe);
        if matches!(&arg.kind, IrExprKind::Literal(IrLiteral::Null)) {
            // Typed nulls: `()` where only null can flow, `None` where
            // a value could.
            let lowered = match &wanted_desc {
                Some(wanted) if wanted.core.is_none() && !wanted.nullable => Expr::Unit,
                None => Expr::Unit,
                _ => Expr::path("None"),
            };
            let given = describe(&arg.ty);
            return Ok(self.maybe_wrap(lowered, &given, wanted_desc.as_ref()));
        }
        let given = describe(&arg.ty);
        let lowered = self.lower_expr(arg, avoid_clone)?;
        Ok(self.maybe_wrap(lowered, &given, wanted_desc.as_ref()))
    }

    // ── Casts and type tests ─────────────────────────────────────

    fn lower_cast(&mut self, inner: &IrExpr, to: &IrType, own_ty: &IrType) -> Lower<Expr> {
        let found = describe(&inner.ty);
        let wanted = describe(to);
        let expr = self.lower_expr(inner, false)?;
        if found == wanted {
            return Ok(expr);
        }
        let narrows_null = found.nullable && !wanted.nullable;
        if found.same_core(&wanted) && !narrows_null {
            // Only widening the wrappers; coercion handles that.
            return Ok(expr);
        }
        let optioned = if found.same_core(&wanted) {
            // Same nominal type; only the null layer needs checking.
            expr
        } else if narrows_null {
            let callee = self.cast_callee(to);
            expr.method_call(
                "and_then",
                vec![Expr::Closure {
                    is_move: false,
                    params: vec![Pattern::Id("x".into())],
                    body: Box::new(Expr::call(callee, vec![Expr::id("x")])),
                }],
            )
        } else {
            let callee = self.cast_callee(to);
            Expr::call(callee, vec![expr])
        };
        // The cast's own type says whether failure propagates or
        // asserts.
        if describe(own_ty).fallible {
            Ok(optioned.method_call(
                "ok_or_else",
                vec![Expr::Closure {
                    is_move: false,
                    params: vec![],
                    body: Box::new(Expr::call_path("weft_core::Error::new", vec![])),
                }],
            ))
        } else {
            Ok(optioned.method_call("unwrap", vec![]))
        }
    }

    /// The runtime-checked conversion for a wanted type.
    pub(crate) fn cast_callee(&mut self, to: &IrType) -> Expr {
        let target = translate_type(to, &self.decls);
        Expr::Path(Path::parse("weft_core::cast").with_args(vec![target]))
    }

    fn lower_is_type(&mut self, inner: &IrExpr, tested: &IrType) -> Lower<Expr> {
        let found = describe(&inner.ty);
        let wanted = describe(tested);
        let expr = self.lower_expr(inner, false)?;
        let mut parts: Vec<Expr> = Vec::new();
        let post_null = if found.nullable && !wanted.nullable {
            parts.push(expr.clone().method_call("is_some", vec![]));
            expr.method_call("unwrap", vec![])
        } else {
            expr
        };
        if !found.same_core(&wanted) && wanted.core.is_some() {
            let target = translate_type(tested, &self.decls);
            let callee = Expr::Path(Path::parse("weft_core::is").with_args(vec![target]));
            parts.push(Expr::call(callee, vec![post_null]));
        }
        Ok(match parts.len() {
            0 => Expr::Bool(true),
            1 => parts.pop().unwrap(),
            _ => {
                let mut iter = parts.into_iter();
                let first = iter.next().unwrap();
                iter.fold(first, |acc, part| Expr::binary(BinOp::And, acc, part))
            }
        })
    }

    // ── Functions ────────────────────────────────────────────────

    pub(crate) fn translate_function(
        &mut self,
        f: &IrFunction,
        opts: FunctionOpts,
    ) -> Result<Item, TranslateError> {
        // Mutable captures must be known before their declarations
        // lower, because the declarations allocate the locked storage.
        let body_stmts: &[IrStmt] = f
            .body
            .as_ref()
            .map(|b| b.statements.as_slice())
            .unwrap_or(&[]);
        let inner_refs = scan::local_fn_referenced_names(body_stmts);
        let assigned = scan::assigned_names(body_stmts);
        let mutable_captures: FxHashSet<Name> =
            inner_refs.intersection(&assigned).cloned().collect();

        let mut generics = Vec::new();
        for type_param in &f.type_params {
            let mut bounds = Vec::new();
            for bound in &type_param.bounds {
                match bound.core_name().map(|n| n.as_str()) {
                    Some("Equatable") => bounds.push(Type::path("std::cmp::PartialEq")),
                    Some("MapKey") => {
                        bounds.push(Type::path("std::cmp::Eq"));
                        bounds.push(Type::path("std::hash::Hash"));
                    }
                    Some(_) => {
                        let owner = bound.core_name().cloned().unwrap();
                        let path =
                            crate::types::user_type_path(&owner, &self.decls).suffixed("Trait");
                        bounds.push(Type::Path(path));
                    }
                    None => {}
                }
            }
            for common in ["Clone", "Send", "Sync", "'static"] {
                bounds.push(Type::path(common));
            }
            self.decls.declare(
                type_param.name.clone(),
                DeclInfo::new(DeclOrigin::TypeParam, f.span),
            );
            generics.push(GenericParam {
                name: names::type_name(&type_param.name),
                bounds,
            });
        }

        let mut params = Vec::new();
        if opts.captures.is_some() || (opts.as_method && !opts.skip_self) {
            params.push(Param::SelfRef);
        }
        let mut conversions: Vec<Stmt> = Vec::new();
        for param in f
            .params
            .params
            .iter()
            .chain(f.params.rest.as_ref().into_iter())
        {
            if Some(&param.name) == f.params.this_name.as_ref() {
                continue;
            }
            self.register_param(param);
            let mut ty = translate_type(&param.ty, &self.decls);
            if param.optional && !describe(&param.ty).nullable {
                ty = ty.option();
            }
            let rust_name = names::value_name(&param.name);
            params.push(Param::Typed {
                pat: Pattern::Id(rust_name.clone()),
                ty,
            });
            if mutable_captures.contains(&param.name) {
                // Rebind the parameter into shared, lockable storage
                // before any capture is built over it.
                conversions.push(Stmt::Let {
                    pat: Pattern::Id(rust_name.clone()),
                    ty: None,
                    value: Some(wrap_arc(wrap_lock(Expr::id(&rust_name)))),
                });
                self.decls.promote_mutable_capture(&param.name);
            }
        }

        let effective_ret = opts.return_type.clone().unwrap_or_else(|| f.ret.clone());
        let ret_desc = describe(&effective_ret);
        let ret = if ret_desc.is_unit() {
            None
        } else {
            Some(translate_described(&ret_desc, &self.decls))
        };

        let body = match &opts.body_override {
            Some(block) => Some(block.clone()),
            None => match &f.body {
                None => None,
                Some(body) => {
                    self.fn_stack.push(FunctionContext {
                        captures: opts.captures.clone().unwrap_or_default(),
                        methodized: opts.methodized.clone(),
                        mutable_captures,
                        return_type: ret_desc.clone(),
                        ctor_mode: None,
                        this_name: f.params.this_name.clone(),
                    });
                    let lowered = (|| {
                        let mut stmts = conversions;
                        self.process_statements(&body.statements, &mut stmts, true)?;
                        Ok::<_, TranslateError>(Block::of_stmts(stmts))
                    })();
                    self.fn_stack.pop();
                    Some(lowered?)
                }
            },
        };

        let vis = opts.vis.unwrap_or(if f.exported { Vis::Pub } else { Vis::Private });
        let name = opts
            .name_override
            .clone()
            .unwrap_or_else(|| names::value_name(&f.name));
        Ok(Item::with_attrs(
            vec![],
            vis,
            ItemKind::Function(Function {
                name,
                generics,
                params,
                ret,
                body,
            }),
        ))
    }

    pub(crate) fn register_param(&mut self, param: &IrParam) {
        let info = DeclInfo::new(DeclOrigin::Param, param.span)
            .local()
            .with_type(param.ty.clone());
        self.decls.declare(param.name.clone(), info);
    }

    /// Register a local function's declaration entry.
    pub(crate) fn register_local_fn(&mut self, function: &IrFunction) {
        let sig = weft_ir::Signature::new(
            function
                .params
                .params
                .iter()
                .map(|p| p.ty.clone())
                .collect(),
            function.ret.clone(),
        );
        let info = DeclInfo::new(DeclOrigin::LocalFn, function.span)
            .local()
            .with_type(IrType::Function(Box::new(sig.clone())))
            .with_sig(sig);
        self.decls.declare(function.name.clone(), info);
    }

    pub(crate) fn lower_stmt_as_block(&mut self, stmt: &IrStmt) -> Lower<Block> {
        if let IrStmtKind::Block(block) = &stmt.kind {
            let mut stmts = Vec::new();
            self.process_statements(&block.statements, &mut stmts, false)
                .map_err(LowerInterrupt::Fatal)?;
            return Ok(Block::of_stmts(stmts));
        }
        let stmts = self.lower_statement(stmt)?;
        Ok(stmts_to_block(stmts))
    }
}

/// Whether the statement is (possibly via a single-statement block) a
/// bare return of the fail sentinel or an init failure, which lowers to
/// plain `?` propagation.
fn is_bare_fail_return(stmt: &IrStmt) -> bool {
    let trimmed = match &stmt.kind {
        IrStmtKind::Block(block) if block.statements.len() == 1 => &block.statements[0],
        _ => stmt,
    };
    match &trimmed.kind {
        IrStmtKind::Return { value: Some(value) } => {
            matches!(value.kind, IrExprKind::FailSentinel)
        }
        IrStmtKind::InitFailed => true,
        _ => false,
    }
}

fn stmt_is_empty_block(stmt: &IrStmt) -> bool {
    matches!(&stmt.kind, IrStmtKind::Block(block) if block.statements.is_empty())
}

/// Collapse a lowering interrupt where a never-reference cannot occur.
pub(crate) fn fatal_lower(interrupt: LowerInterrupt) -> TranslateError {
    match interrupt {
        LowerInterrupt::Fatal(error) => error,
        LowerInterrupt::NeverRef => {
            TranslateError::internal("never reference in non-droppable position", Span::dummy())
        }
    }
}

pub(crate) fn stmts_to_block(stmts: Vec<Stmt>) -> Block {
    // All statement-position blocks type to unit; keep every lowered
    // statement terminated rather than promoting a trailing result.
    Block::of_stmts(stmts)
}

fn collect_stmt_names(stmt: &IrStmt, out: &mut FxHashSet<Name>) {
    // Reuse the scan over a single-statement slice.
    let slice = std::slice::from_ref(stmt);
    for name in scan::assigned_names(slice) {
        out.insert(name);
    }
    // referenced_names works at item granularity; wrap the statement in
    // a block scan instead.
    let mut refs = FxHashSet::default();
    scan_stmt_refs(stmt, &mut refs);
    out.extend(refs);
}

fn scan_stmt_refs(stmt: &IrStmt, out: &mut FxHashSet<Name>) {
    // Delegate to the IR scan by faking a single-statement function
    // body; keeps reference semantics in one place.
    let block = IrBlock::new(vec![stmt.clone()], stmt.span);
    let function = IrFunction {
        name: Name::new("__scan"),
        type_params: vec![],
        params: weft_ir::IrParams::plain(vec![]),
        ret: IrType::void(),
        body: Some(block),
        exported: false,
        span: stmt.span,
    };
    out.extend(scan::function_referenced_names(&function));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weft_ir::{IrArg, IrLiteral, IrParams, PackageMeta, Signature};
    use weft_rust_ast::render_file;
    use weft_rust_ast::SourceFile;

    fn sp() -> Span {
        Span::dummy()
    }

    fn library() -> IrLibrary {
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
                span: sp(),
            }],
            type_facts: BTreeMap::new(),
        }
    }

    fn render_fn(library: &IrLibrary, function: &IrFunction) -> String {
        let mut translator = Translator::new(library, &library.modules[0]);
        let item = translator
            .translate_function(function, FunctionOpts::default())
            .unwrap();
        render_file(&SourceFile {
            inner_attrs: vec![],
            items: vec![item],
        })
    }

    fn fallible_call(name: &str) -> IrExpr {
        IrExpr::new(
            IrExprKind::Call {
                callee: IrCallee::Function {
                    name: Name::new(name),
                    sig: Signature::new(vec![], IrType::int().fallible()),
                },
                args: vec![],
            },
            IrType::int().fallible(),
            sp(),
        )
    }

    fn let_uninit(name: &str, ty: IrType) -> IrStmt {
        IrStmt::new(
            IrStmtKind::Let(IrLocal {
                name: Name::new(name),
                ty,
                init: None,
                assign_once: false,
                fail_flag: false,
            }),
            sp(),
        )
    }

    fn check_if(fail_flag: &str, then: IrStmt, alt: Option<IrStmt>) -> IrStmt {
        IrStmt::new(
            IrStmtKind::If {
                test: IrExpr::new(
                    IrExprKind::Ref(Name::new(fail_flag)),
                    IrType::boolean(),
                    sp(),
                ),
                then: Box::new(then),
                alt: alt.map(Box::new),
            },
            sp(),
        )
    }

    fn return_fail() -> IrStmt {
        // The sentinel's own type carries the fallible marker.
        IrStmt::new(
            IrStmtKind::Return {
                value: Some(IrExpr::new(
                    IrExprKind::FailSentinel,
                    IrType::Never.fallible(),
                    sp(),
                )),
            },
            sp(),
        )
    }

    /// `let v; v = f() or fail; return v` inside a fallible function
    /// compiles the handler pair to plain `?` propagation.
    #[test]
    fn handler_scope_propagate_only() {
        let library = library();
        let function = IrFunction {
            name: Name::new("work"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::int().fallible(),
            body: Some(IrBlock::new(
                vec![
                    let_uninit("v", IrType::int()),
                    IrStmt::new(
                        IrStmtKind::Handler {
                            assign: Some(Name::new("v")),
                            handled: fallible_call("f"),
                            fail_flag: Name::new("ff"),
                        },
                        sp(),
                    ),
                    check_if("ff", return_fail(), None),
                    IrStmt::new(
                        IrStmtKind::Return {
                            value: Some(IrExpr::new(
                                IrExprKind::Ref(Name::new("v")),
                                IrType::int(),
                                sp(),
                            )),
                        },
                        sp(),
                    ),
                ],
                sp(),
            )),
            exported: false,
            span: sp(),
        };
        let text = render_fn(&library, &function);
        assert!(
            text.contains("v = f()?;"),
            "bare fail return compiles to propagation:\n{text}"
        );
        assert!(
            !text.contains("match"),
            "no match needed for propagate-only handlers:\n{text}"
        );
        // The fallible function wraps its successful return.
        assert!(text.contains("return Ok(v)"), "{text}");
    }

    /// A failure branch with its own statements, plus extra statements
    /// under the success path, compiles to a two-arm match.
    #[test]
    fn handler_scope_with_extra_statements() {
        let library = library();
        let log_failed = IrStmt::new(
            IrStmtKind::Expr(IrExpr::new(
                IrExprKind::Call {
                    callee: IrCallee::Builtin(weft_ir::BuiltinOp::ConsoleLog),
                    args: vec![IrArg::plain(
                        IrExpr::new(
                            IrExprKind::Literal(IrLiteral::Str("failed".into())),
                            IrType::string(),
                            sp(),
                        ),
                        None,
                    )],
                },
                IrType::void(),
                sp(),
            )),
            sp(),
        );
        let failure_branch = IrStmt::new(
            IrStmtKind::Block(IrBlock::new(vec![log_failed, return_fail()], sp())),
            sp(),
        );
        let extra = IrStmt::new(
            IrStmtKind::Block(IrBlock::new(
                vec![IrStmt::new(
                    IrStmtKind::Expr(IrExpr::new(
                        IrExprKind::Call {
                            callee: IrCallee::Function {
                                name: Name::new("g"),
                                sig: Signature::new(vec![], IrType::void()),
                            },
                            args: vec![],
                        },
                        IrType::void(),
                        sp(),
                    )),
                    sp(),
                )],
                sp(),
            )),
            sp(),
        );
        let function = IrFunction {
            name: Name::new("work"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::void().fallible(),
            body: Some(IrBlock::new(
                vec![
                    let_uninit("v", IrType::int()),
                    IrStmt::new(
                        IrStmtKind::Handler {
                            assign: Some(Name::new("v")),
                            handled: fallible_call("f"),
                            fail_flag: Name::new("ff"),
                        },
                        sp(),
                    ),
                    check_if("ff", failure_branch, Some(extra)),
                ],
                sp(),
            )),
            exported: false,
            span: sp(),
        };
        let text = render_fn(&library, &function);
        // Success arm binds the unwrapped value, assigns it, and
        // continues into the extra statements.
        assert!(text.contains("match f() {"), "{text}");
        assert!(text.contains("Ok(x) => {"), "{text}");
        assert!(text.contains("v = x;"), "{text}");
        assert!(text.contains("g();"), "{text}");
        // Failure arm lowers the branch verbatim.
        assert!(text.contains("println!(\"{}\", \"failed\");"), "{text}");
        assert!(
            text.contains("return Err(weft_core::Error::new())"),
            "{text}"
        );
    }

    /// A fail sentinel aborts when the enclosing function cannot
    /// propagate it.
    #[test]
    fn fail_sentinel_outside_fallible_context_panics() {
        let library = library();
        let function = IrFunction {
            name: Name::new("strict"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::void(),
            body: Some(IrBlock::new(
                vec![IrStmt::new(
                    IrStmtKind::Expr(IrExpr::new(
                        IrExprKind::FailSentinel,
                        IrType::Never,
                        sp(),
                    )),
                    sp(),
                )],
                sp(),
            )),
            exported: false,
            span: sp(),
        };
        let text = render_fn(&library, &function);
        assert!(text.contains("panic!()"), "{text}");
    }

    /// Unlabeled jumps inside a labeled non-loop statement target the
    /// nearest enclosing loop explicitly.
    #[test]
    fn break_inside_labeled_block_targets_enclosing_loop() {
        let library = library();
        let labeled_break = IrStmt::new(
            IrStmtKind::Labeled {
                label: Name::new("section"),
                stmt: Box::new(IrStmt::new(
                    IrStmtKind::Block(IrBlock::new(
                        vec![IrStmt::new(IrStmtKind::Break { label: None }, sp())],
                        sp(),
                    )),
                    sp(),
                )),
            },
            sp(),
        );
        let function = IrFunction {
            name: Name::new("spin"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::void(),
            body: Some(IrBlock::new(
                vec![IrStmt::new(
                    IrStmtKind::While {
                        test: IrExpr::new(
                            IrExprKind::Literal(IrLiteral::Bool(true)),
                            IrType::boolean(),
                            sp(),
                        ),
                        body: Box::new(labeled_break),
                    },
                    sp(),
                )],
                sp(),
            )),
            exported: false,
            span: sp(),
        };
        let text = render_fn(&library, &function);
        // `while true` becomes `loop`, and the break names the loop's
        // synthesized label even though the IR jump was unlabeled.
        assert!(text.contains("'loop___1: loop {"), "{text}");
        assert!(text.contains("break 'loop___1"), "{text}");
        assert!(text.contains("'section: {"), "{text}");
    }

    /// Statements referencing a never-typed value are dropped; the
    /// producing call itself still lowers.
    #[test]
    fn never_references_drop_statements() {
        let library = library();
        let mut translator = Translator::new(&library, &library.modules[0]);
        translator.decls.declare(
            Name::new("doomed"),
            DeclInfo::new(DeclOrigin::Local, sp())
                .local()
                .with_type(IrType::Never),
        );
        let mut results = Vec::new();
        translator
            .process_statements(
                &[IrStmt::new(
                    IrStmtKind::Expr(IrExpr::new(
                        IrExprKind::Ref(Name::new("doomed")),
                        IrType::Never,
                        sp(),
                    )),
                    sp(),
                )],
                &mut results,
                false,
            )
            .unwrap();
        assert!(results.is_empty());
    }
}
