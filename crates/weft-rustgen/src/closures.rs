//! The closure/capture compiler.
//!
//! A run of function-scoped function declarations forms one closure
//! group. The group compiles to: a capture struct holding one field per
//! captured name (mutable captures as shared, lockable handles), an
//! inherent impl carrying one method per member function, one instance
//! built once with mutable-capture fields cloned as shared handles, and
//! one `Arc`-wrapped forwarding closure per function so members pass
//! around as ordinary function values.

use rustc_hash::{FxHashMap, FxHashSet};
use weft_ir::scan;
use weft_ir::{IrFunction, Name};
use weft_rust_ast::{
    Attr, Block, Expr, Field, Item, ItemKind, Pattern, Stmt, Struct, Type, Vis,
};

use crate::error::{Lower, TranslateError};
use crate::lower::{CapturedDecl, FunctionOpts, Translator};
use crate::names;
use crate::types::translate_type;
use crate::wrap::wrap_arc;

impl Translator<'_> {
    /// Compile one co-located group of local function declarations.
    pub(crate) fn lower_local_fn_group(
        &mut self,
        functions: &[&IrFunction],
    ) -> Result<Vec<Stmt>, TranslateError> {
        let group_names: FxHashSet<Name> =
            functions.iter().map(|f| f.name.clone()).collect();
        for function in functions {
            self.register_local_fn(function);
        }
        // Free variables: names any member references that are already
        // local in the enclosing scope. Member-internal names are not
        // declared yet, so they fall out naturally.
        let mut captured: Vec<Name> = Vec::new();
        let mut capture_map: FxHashMap<Name, CapturedDecl> = FxHashMap::default();
        for function in functions {
            for name in scan::function_referenced_names(function) {
                if group_names.contains(&name) || capture_map.contains_key(&name) {
                    continue;
                }
                let Some(decl) = self.decls.resolve(&name) else {
                    continue;
                };
                if !decl.local {
                    continue;
                }
                capture_map.insert(
                    name.clone(),
                    CapturedDecl {
                        assign_once: !decl.mutable_capture,
                        function: None,
                    },
                );
                captured.push(name);
            }
        }
        captured.sort();
        // Member functions referencing each other capture through the
        // group: record them as methodized captures.
        for function in functions {
            capture_map.insert(
                function.name.clone(),
                CapturedDecl {
                    assign_once: true,
                    function: Some(Box::new((*function).clone())),
                },
            );
        }
        let this_name = self
            .fn_stack
            .last()
            .and_then(|ctx| ctx.this_name.clone());
        let enclosing_captures: FxHashSet<Name> = self
            .fn_stack
            .last()
            .map(|ctx| ctx.captures.keys().cloned().collect())
            .unwrap_or_default();

        self.closure_count += 1;
        let struct_name = format!("ClosureGroup___{}", self.closure_count);
        let instance = "closure_group";

        let mut stmts = Vec::new();
        // Capture struct.
        let mut fields = Vec::new();
        for name in &captured {
            let decl = self.decls.resolve(name).cloned();
            let ir_type = decl.as_ref().and_then(|d| d.ir_type.clone());
            let base = ir_type
                .as_ref()
                .map(|t| translate_type(t, &self.decls))
                .unwrap_or(Type::Unit);
            let ty = if decl.as_ref().is_some_and(|d| d.mutable_capture) {
                base.rw_lock().arc()
            } else {
                base
            };
            fields.push(Field {
                vis: Vis::Private,
                name: names::value_name(name),
                ty,
            });
        }
        stmts.push(Stmt::Item(Box::new(Item::with_attrs(
            vec![Attr::derive(&["Clone"])],
            Vis::Private,
            ItemKind::Struct(Struct {
                name: struct_name.clone(),
                generics: vec![],
                fields,
            }),
        ))));

        // One method per member function.
        let mut methods = Vec::new();
        for function in functions {
            let item = self.translate_function(
                function,
                FunctionOpts {
                    captures: Some(capture_map.clone()),
                    methodized: group_names.clone(),
                    vis: Some(Vis::Private),
                    ..FunctionOpts::default()
                },
            )?;
            methods.push(item);
        }
        stmts.push(Stmt::Item(Box::new(Item::plain(ItemKind::Impl(
            weft_rust_ast::Impl {
                generics: vec![],
                of_trait: None,
                self_ty: Type::path(&struct_name),
                items: methods,
            },
        )))));

        // The instance: mutable-capture fields clone the shared handle,
        // so every alias observes the same storage.
        let mut members = Vec::new();
        for name in &captured {
            let decl = self.decls.resolve(name).cloned();
            let field_name = names::value_name(name);
            let value = if decl.as_ref().is_some_and(|d| d.mutable_capture) {
                let base = if enclosing_captures.contains(name) {
                    Expr::id("self").field(&field_name)
                } else {
                    Expr::id(&field_name)
                };
                Some(base.method_call("clone", vec![]))
            } else if Some(name) == this_name.as_ref() {
                Some(Expr::id("self").method_call("clone", vec![]))
            } else {
                let ty = decl
                    .and_then(|d| d.ir_type)
                    .unwrap_or(weft_ir::IrType::void());
                let reference = self
                    .lower_reference(name, &ty, false, false)
                    .map_err(crate::lower::fatal_lower)?;
                if reference == Expr::id(&field_name) {
                    None
                } else {
                    Some(reference)
                }
            };
            members.push((field_name, value));
        }
        stmts.push(Stmt::Let {
            pat: Pattern::Id(instance.into()),
            ty: None,
            value: Some(Expr::StructLit {
                path: weft_rust_ast::Path::single(struct_name),
                fields: members,
            }),
        });

        // Thin callable wrappers forwarding through a shared handle.
        for function in functions {
            let wrapper = self
                .build_method_capture_wrapper(function, Expr::id(instance))
                .map_err(crate::lower::fatal_lower)?;
            stmts.push(Stmt::Let {
                pat: Pattern::Id(names::value_name(&function.name)),
                ty: None,
                value: Some(wrapper),
            });
        }
        Ok(stmts)
    }

    /// `{ let closure_group = <captured>.clone(); Arc::new(move |args|
    /// closure_group.f(args)) }` — the callable view of one group
    /// member.
    pub(crate) fn build_method_capture_wrapper(
        &mut self,
        function: &IrFunction,
        captured: Expr,
    ) -> Lower<Expr> {
        let instance = "closure_group";
        let params: Vec<Pattern> = function
            .params
            .params
            .iter()
            .map(|p| Pattern::Id(names::value_name(&p.name)))
            .collect();
        let args: Vec<Expr> = function
            .params
            .params
            .iter()
            .map(|p| Expr::id(names::value_name(&p.name)))
            .collect();
        let forward = Expr::id(instance).method_call(names::value_name(&function.name), args);
        Ok(Expr::Block(Block::new(
            vec![Stmt::Let {
                pat: Pattern::Id(instance.into()),
                ty: None,
                value: Some(captured.method_call("clone", vec![])),
            }],
            Some(wrap_arc(Expr::Closure {
                is_move: true,
                params,
                body: Box::new(forward),
            })),
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use weft_common::Span;
    use weft_ir::{
        BuiltinOp, IrArg, IrBlock, IrCallee, IrExpr, IrExprKind, IrFunction, IrLibrary,
        IrLiteral, IrLocal, IrModule, IrParams, IrStmt, IrStmtKind, IrType, Name, PackageMeta,
        Signature,
    };
    use weft_rust_ast::render::render_file;
    use weft_rust_ast::SourceFile;

    use crate::lower::{FunctionOpts, Translator};

    fn sp() -> Span {
        Span::dummy()
    }

    fn int_expr(kind: IrExprKind) -> IrExpr {
        IrExpr::new(kind, IrType::int(), sp())
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

    /// `fn outer() { let total = 0; fn bump() { total = total + 1 };
    /// fn read() -> Int { return total }; bump(); }`
    fn outer_with_mutable_capture() -> IrFunction {
        let add = int_expr(IrExprKind::Call {
            callee: IrCallee::Builtin(BuiltinOp::AddInt),
            args: vec![
                IrArg::plain(int_expr(IrExprKind::Ref(Name::new("total"))), None),
                IrArg::plain(int_expr(IrExprKind::Literal(IrLiteral::Int(1))), None),
            ],
        });
        let bump = IrFunction {
            name: Name::new("bump"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::void(),
            body: Some(IrBlock::new(
                vec![IrStmt::new(
                    IrStmtKind::Assign {
                        target: Name::new("total"),
                        value: add,
                    },
                    sp(),
                )],
                sp(),
            )),
            exported: false,
            span: sp(),
        };
        let read = IrFunction {
            name: Name::new("read"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::int(),
            body: Some(IrBlock::new(
                vec![IrStmt::new(
                    IrStmtKind::Return {
                        value: Some(int_expr(IrExprKind::Ref(Name::new("total")))),
                    },
                    sp(),
                )],
                sp(),
            )),
            exported: false,
            span: sp(),
        };
        let call_bump = IrStmt::new(
            IrStmtKind::Expr(IrExpr::new(
                IrExprKind::Call {
                    callee: IrCallee::Function {
                        name: Name::new("bump"),
                        sig: Signature::new(vec![], IrType::void()),
                    },
                    args: vec![],
                },
                IrType::void(),
                sp(),
            )),
            sp(),
        );
        IrFunction {
            name: Name::new("outer"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::void(),
            body: Some(IrBlock::new(
                vec![
                    IrStmt::new(
                        IrStmtKind::Let(IrLocal {
                            name: Name::new("total"),
                            ty: IrType::int(),
                            init: Some(int_expr(IrExprKind::Literal(IrLiteral::Int(0)))),
                            assign_once: false,
                            fail_flag: false,
                        }),
                        sp(),
                    ),
                    IrStmt::new(IrStmtKind::LocalFn(bump), sp()),
                    IrStmt::new(IrStmtKind::LocalFn(read), sp()),
                    call_bump,
                ],
                sp(),
            )),
            exported: false,
            span: sp(),
        }
    }

    #[test]
    fn mutable_capture_aliases_shared_state() {
        let library = library();
        let mut translator = Translator::new(&library, &library.modules[0]);
        let item = translator
            .translate_function(&outer_with_mutable_capture(), FunctionOpts::default())
            .unwrap();
        let text = render_file(&SourceFile {
            inner_attrs: vec![],
            items: vec![item],
        });

        // The declaration allocates the shared, lockable slot before
        // any capture is built over it.
        assert!(
            text.contains("std::sync::Arc::new(std::sync::RwLock::new(0))"),
            "declaration must allocate shared storage:\n{text}"
        );
        // The capture struct stores the handle, not the value.
        assert!(
            text.contains("total: std::sync::Arc<std::sync::RwLock<i32>>"),
            "capture field must be a shared handle:\n{text}"
        );
        // The instance aliases the handle rather than deep-copying.
        assert!(
            text.contains("total: total.clone()"),
            "instance must clone the handle:\n{text}"
        );
        // A write in one method and a read in another both go through
        // the same lock.
        assert!(
            text.contains("*self.total.write().unwrap() ="),
            "writes must take the write guard:\n{text}"
        );
        assert!(
            text.contains("weft_core::read_locked(&self.total)"),
            "reads must go through the read guard:\n{text}"
        );
        // Members become callable wrappers over a cloned group handle.
        assert!(
            text.contains("let closure_group = closure_group.clone()"),
            "wrappers must clone the group handle:\n{text}"
        );
        assert!(
            text.contains("std::sync::Arc::new(move ||"),
            "wrappers must be shared move closures:\n{text}"
        );
        // The later call goes through the Arc-wrapped callable.
        assert!(
            text.contains("(*bump)()"),
            "calls deref the shared callable:\n{text}"
        );
    }
}
