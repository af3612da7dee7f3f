//! The module assembler.
//!
//! Merges per-module outputs into emitted source files, builds the
//! lazy, idempotent init sequence (module inits ordered by the library
//! module graph, dependency crate inits before them), and records the
//! cross-library dependency/feature usage and package metadata the
//! driver needs for manifest emission.

use std::collections::BTreeMap;

use tracing::debug;
use weft_common::module_graph::{topological_sort, ModuleGraph};
use weft_common::Span;
use weft_ir::{ImportSource, IrLibrary, IrModule, PackageMeta};
use weft_rust_ast::{
    render_file, Attr, Block, Expr, Function, Item, ItemKind, Path, SourceFile, Static, Stmt,
    Type, Vis,
};

use crate::error::{TranslateError, TranslateErrorKind};
use crate::lower::Translator;
use crate::names;
use crate::types::wrap_result_type;
use crate::wrap::wrap_ok;

/// One emitted file, path relative to the generated crate root.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedFile {
    pub path: String,
    pub content: String,
}

/// One cross-library dependency discovered during translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepReport {
    pub library: String,
    pub version: String,
    /// Enabled optional features, sorted and deduplicated.
    pub features: Vec<String>,
}

/// Everything the driver needs to materialize and build one library.
#[derive(Debug, Clone)]
pub struct LibraryOutput {
    pub package: PackageMeta,
    pub files: Vec<EmittedFile>,
    pub deps: Vec<DepReport>,
}

/// Translate a whole library into its emitted crate.
pub fn translate_library(library: &IrLibrary) -> Result<LibraryOutput, TranslateError> {
    debug!(library = %library.meta.name, modules = library.modules.len(), "translating library");
    // The module graph orders init calls; a cycle is fatal for the
    // library.
    let mut graph = ModuleGraph::new();
    for module in &library.modules {
        graph.add_module(module.name.clone(), module.src_path.clone());
    }
    for module in &library.modules {
        let from = graph.resolve(&module.name).expect("module just added");
        for import in &module.imports {
            if let ImportSource::SameLibrary { module: target } = &import.source {
                if let Some(to) = graph.resolve(target) {
                    graph.add_dependency(from, to);
                }
            }
        }
    }
    let init_order = topological_sort(&graph).map_err(|cycle| {
        TranslateError::new(
            TranslateErrorKind::DependencyCycle(cycle.to_string()),
            Span::dummy(),
        )
    })?;

    // Parent/child links between module directories, including levels
    // with no module of their own.
    let mut kids: BTreeMap<Vec<String>, Vec<String>> = BTreeMap::new();
    let module_paths: Vec<Vec<String>> =
        library.modules.iter().map(|m| m.src_path.clone()).collect();
    for path in &module_paths {
        for depth in 1..=path.len() {
            let parent = path[..depth - 1].to_vec();
            let child = weft_common::ident::dash_to_snake(&path[depth - 1]);
            let entry = kids.entry(parent).or_default();
            if !entry.contains(&child) {
                entry.push(child);
            }
        }
    }

    let mut files = Vec::new();
    let mut deps: BTreeMap<String, DepReport> = BTreeMap::new();
    for module in &library.modules {
        // Record cross-library usage before lowering so even unused
        // imports keep their manifest entries.
        for import in &module.imports {
            if let ImportSource::External {
                library: dep,
                version,
                features,
                ..
            } = &import.source
            {
                let entry = deps.entry(dep.clone()).or_insert_with(|| DepReport {
                    library: dep.clone(),
                    version: version.clone(),
                    features: Vec::new(),
                });
                for feature in features {
                    if !entry.features.contains(feature) {
                        entry.features.push(feature.clone());
                    }
                }
            }
        }
        let module_kids = kids.get(&module.src_path).cloned().unwrap_or_default();
        let file = translate_module(library, module, &module_kids)?;
        files.push(EmittedFile {
            path: names::src_file_path(&module.src_path),
            content: render_file(&file),
        });
    }
    // Link layers for directory levels without a module of their own.
    for (parent, children) in &kids {
        if parent.is_empty() || module_paths.iter().any(|p| p == parent) {
            continue;
        }
        let items = children
            .iter()
            .map(|child| Item::public(ItemKind::Mod {
                name: child.clone(),
                items: None,
            }))
            .collect();
        files.push(EmittedFile {
            path: names::src_file_path(parent),
            content: render_file(&SourceFile {
                inner_attrs: vec![],
                items,
            }),
        });
    }

    let dep_list: Vec<DepReport> = deps
        .into_values()
        .map(|mut dep| {
            dep.features.sort();
            dep
        })
        .collect();
    files.push(EmittedFile {
        path: "src/lib.rs".into(),
        content: render_file(&build_lib_file(library, &graph, &init_order, &kids, &dep_list)),
    });
    files.push(EmittedFile {
        path: "src/main.rs".into(),
        content: render_file(&build_main_file(&library.meta.name)),
    });
    Ok(LibraryOutput {
        package: library.meta.clone(),
        files,
        deps: dep_list,
    })
}

/// Translate one module and assemble its source file.
pub fn translate_module(
    library: &IrLibrary,
    module: &IrModule,
    kids: &[String],
) -> Result<SourceFile, TranslateError> {
    debug!(module = %module.name, "translating module");
    let mut translator = Translator::new(library, module);
    translator.preprocess_imports();
    translator.preprocess_top_levels();
    for item in &module.top_levels {
        translator.process_top_level(item)?;
    }
    Ok(assemble_module_file(translator, kids))
}

fn assemble_module_file(translator: Translator<'_>, kids: &[String]) -> SourceFile {
    let Translator {
        module_inits,
        module_items,
        test_items,
        trait_imports,
        ..
    } = translator;
    let mut items = Vec::new();
    // Submodules first, except at the root where lib.rs declares them.
    for kid in kids {
        items.push(Item::public(ItemKind::Mod {
            name: kid.clone(),
            items: None,
        }));
    }
    // Dispatch traits whose methods this module calls.
    for trait_import in &trait_imports {
        items.push(Item::plain(ItemKind::Use(Path::parse(trait_import))));
    }
    items.push(build_init_fn(module_inits));
    items.extend(module_items);
    if !test_items.is_empty() {
        let mut tests = vec![Item::plain(ItemKind::Use(Path::parse("super::*")))];
        tests.extend(test_items);
        items.push(Item::with_attrs(
            vec![Attr::call("cfg", vec!["test".into()])],
            Vis::Private,
            ItemKind::Mod {
                name: "tests".into(),
                items: Some(tests),
            },
        ));
    }
    SourceFile {
        inner_attrs: vec![],
        items,
    }
}

/// The per-module init: a compute-once cell guarantees the module's
/// init statements run at most once, whichever caller arrives first.
fn build_init_fn(module_inits: Vec<Stmt>) -> Item {
    let once_decl = Stmt::Item(Box::new(Item::plain(ItemKind::Static(Static {
        name: "INIT_ONCE".into(),
        ty: wrap_result_type(Type::Unit).once_lock(),
        value: Expr::call_path("std::sync::OnceLock::new", vec![]),
    }))));
    let init_closure = Expr::Closure {
        is_move: false,
        params: vec![],
        body: Box::new(Expr::Block(Block::new(
            module_inits,
            Some(wrap_ok(Expr::Unit)),
        ))),
    };
    let body = Block::new(
        vec![once_decl],
        Some(
            Expr::id("INIT_ONCE")
                .method_call("get_or_init", vec![init_closure])
                .method_call("clone", vec![]),
        ),
    );
    Item::with_attrs(
        vec![],
        Vis::PubCrate,
        ItemKind::Function(Function {
            name: "init".into(),
            generics: vec![],
            params: vec![],
            ret: Some(wrap_result_type(Type::Unit)),
            body: Some(body),
        }),
    )
}

/// The crate root: allow-attrs for generated-name noise, submodule
/// declarations, and the library init that chains dependency inits
/// (each itself idempotent, so shared dependencies are safe) before the
/// module inits in graph order.
fn build_lib_file(
    library: &IrLibrary,
    graph: &ModuleGraph,
    init_order: &[weft_common::ModuleId],
    kids: &BTreeMap<Vec<String>, Vec<String>>,
    deps: &[DepReport],
) -> SourceFile {
    let mut items = Vec::new();
    let has_root = library.modules.iter().any(|m| m.src_path.is_empty());
    for kid in kids.get(&Vec::new()).into_iter().flatten() {
        items.push(Item::public(ItemKind::Mod {
            name: kid.clone(),
            items: None,
        }));
    }
    if has_root {
        items.push(Item::plain(ItemKind::Mod {
            name: "root".into(),
            items: None,
        }));
        items.push(Item::public(ItemKind::Use(Path::parse("root::*"))));
    }
    let mut init_stmts = Vec::new();
    for dep in deps {
        let path = format!("{}::init", names::crate_name(&dep.library));
        init_stmts.push(Stmt::Expr(Expr::call_path(&path, vec![]).propagate()));
    }
    for id in init_order {
        let info = graph.get(*id);
        let mut segments = if info.mod_path.is_empty() {
            vec!["root".to_string()]
        } else {
            info.mod_path
                .iter()
                .map(|seg| weft_common::ident::dash_to_snake(seg))
                .collect()
        };
        segments.push("init".into());
        init_stmts.push(Stmt::Expr(
            Expr::call(Expr::Path(Path::new(segments)), vec![]).propagate(),
        ));
    }
    items.push(Item::with_attrs(
        vec![],
        Vis::Pub,
        ItemKind::Function(Function {
            name: "init".into(),
            generics: vec![],
            params: vec![],
            ret: Some(wrap_result_type(Type::Unit)),
            body: Some(Block::new(init_stmts, Some(wrap_ok(Expr::Unit)))),
        }),
    ));
    SourceFile {
        inner_attrs: vec![Attr::call(
            "allow",
            vec![
                "nonstandard_style".into(),
                "unused_imports".into(),
                "unused_mut".into(),
                "unused_variables".into(),
            ],
        )],
        items,
    }
}

fn build_main_file(library_name: &str) -> SourceFile {
    let init = format!("{}::init", names::crate_name(library_name));
    SourceFile {
        inner_attrs: vec![],
        items: vec![Item::plain(ItemKind::Function(Function {
            name: "main".into(),
            generics: vec![],
            params: vec![],
            ret: None,
            body: Some(Block::of_stmts(vec![Stmt::Expr(
                Expr::call_path(&init, vec![]).method_call("unwrap", vec![]),
            )])),
        }))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weft_common::Span;
    use weft_ir::{
        BuiltinOp, IrArg, IrBlock, IrCallee, IrExpr, IrExprKind, IrFunction, IrGlobal, IrImport,
        IrItem, IrLiteral, IrModule, IrParams, IrStmt, IrStmtKind, IrType, Name,
    };

    fn sp() -> Span {
        Span::dummy()
    }

    fn meta() -> PackageMeta {
        PackageMeta {
            name: "demo".into(),
            version: "0.1.0".into(),
            license: Some("MIT".into()),
            authors: vec!["Weft Authors".into()],
            description: Some("demo library".into()),
        }
    }

    fn int_expr(kind: IrExprKind) -> IrExpr {
        IrExpr::new(kind, IrType::int(), sp())
    }

    /// The counter scenario: an exported mutable module-level integer
    /// plus an `increment` function reading and storing it.
    fn counter_library() -> IrLibrary {
        let counter_ref = || int_expr(IrExprKind::Ref(Name::new("counter")));
        let add_one = int_expr(IrExprKind::Call {
            callee: IrCallee::Builtin(BuiltinOp::AddInt),
            args: vec![
                IrArg::plain(counter_ref(), None),
                IrArg::plain(int_expr(IrExprKind::Literal(IrLiteral::Int(1))), None),
            ],
        });
        let increment = IrFunction {
            name: Name::new("increment"),
            type_params: vec![],
            params: IrParams::plain(vec![]),
            ret: IrType::int(),
            body: Some(IrBlock::new(
                vec![
                    IrStmt::new(
                        IrStmtKind::Assign {
                            target: Name::new("counter"),
                            value: add_one,
                        },
                        sp(),
                    ),
                    IrStmt::new(
                        IrStmtKind::Return {
                            value: Some(counter_ref()),
                        },
                        sp(),
                    ),
                ],
                sp(),
            )),
            exported: true,
            span: sp(),
        };
        IrLibrary {
            meta: meta(),
            modules: vec![IrModule {
                name: String::new(),
                src_path: vec![],
                imports: vec![],
                top_levels: vec![
                    IrItem::Global(IrGlobal {
                        name: Name::new("counter"),
                        ty: IrType::int(),
                        init: Some(int_expr(IrExprKind::Literal(IrLiteral::Int(0)))),
                        assign_once: false,
                        exported: true,
                        span: sp(),
                    }),
                    IrItem::Function(increment),
                ],
                span: sp(),
            }],
            type_facts: BTreeMap::new(),
        }
    }

    #[test]
    fn counter_scenario_emits_lock_backed_singleton() {
        let library = counter_library();
        let output = translate_library(&library).unwrap();
        let root = output
            .files
            .iter()
            .find(|f| f.path == "src/root.rs")
            .expect("root module emitted");
        let text = &root.content;
        // Once-lock-backed storage cell plus accessor.
        assert!(
            text.contains(
                "static COUNTER: std::sync::RwLock<Option<i32>> = std::sync::RwLock::new(None);"
            ),
            "mutable topper storage:\n{text}"
        );
        assert!(
            text.contains("pub fn counter() -> i32 {"),
            "accessor emitted:\n{text}"
        );
        assert!(
            text.contains("COUNTER.read().unwrap().clone().unwrap()"),
            "reads clone under the read guard:\n{text}"
        );
        // The init seeds the cell exactly once.
        assert!(
            text.contains("INIT_ONCE.get_or_init"),
            "module init is compute-once:\n{text}"
        );
        assert!(
            text.contains("*COUNTER.write().unwrap() = Some(0)"),
            "init seeds the counter:\n{text}"
        );
        // Increment: read through the accessor, store under the write
        // guard, return the freshly-read value.
        assert!(
            text.contains("*COUNTER.write().unwrap() = Some(counter() + 1)"),
            "increment stores through the write guard:\n{text}"
        );
        assert!(
            text.contains("return counter()"),
            "increment returns the stored value:\n{text}"
        );
    }

    #[test]
    fn library_init_chains_dependencies_then_modules() {
        let mut library = counter_library();
        library.modules.push(IrModule {
            name: "util".into(),
            src_path: vec!["util".into()],
            imports: vec![IrImport {
                local_name: Name::new("joinLines"),
                exported_name: "joinLines".into(),
                source: weft_ir::ImportSource::External {
                    library: "weft-std".into(),
                    version: "0.3.0".into(),
                    module: "text".into(),
                    features: vec!["text".into()],
                },
                ty: IrType::string(),
                function_sig: Some(weft_ir::Signature::new(vec![], IrType::string())),
                span: sp(),
            }],
            top_levels: vec![],
            span: sp(),
        });
        let output = translate_library(&library).unwrap();
        let lib = output
            .files
            .iter()
            .find(|f| f.path == "src/lib.rs")
            .unwrap();
        // Dependency init first, then module inits; all idempotent.
        let dep_pos = lib.content.find("weft_std::init()?").unwrap();
        let root_pos = lib.content.find("root::init()?").unwrap();
        let util_pos = lib.content.find("util::init()?").unwrap();
        assert!(dep_pos < root_pos && dep_pos < util_pos);
        // Dependency report carries name, version, and features.
        assert_eq!(
            output.deps,
            vec![DepReport {
                library: "weft-std".into(),
                version: "0.3.0".into(),
                features: vec!["text".into()],
            }]
        );
    }

    #[test]
    fn emits_main_stub_and_submodule_decls() {
        let mut library = counter_library();
        library.modules.push(IrModule {
            name: "geo.shapes".into(),
            src_path: vec!["geo".into(), "shapes".into()],
            imports: vec![],
            top_levels: vec![],
            span: sp(),
        });
        let output = translate_library(&library).unwrap();
        let main = output
            .files
            .iter()
            .find(|f| f.path == "src/main.rs")
            .unwrap();
        assert!(main.content.contains("demo::init().unwrap();"));
        // The geo level has no module of its own: link layer.
        let link = output
            .files
            .iter()
            .find(|f| f.path == "src/geo/mod.rs")
            .expect("link layer emitted");
        assert!(link.content.contains("pub mod shapes;"));
        let lib = output
            .files
            .iter()
            .find(|f| f.path == "src/lib.rs")
            .unwrap();
        assert!(lib.content.contains("pub mod geo;"));
        assert!(lib.content.contains("pub use root::*;"));
    }
}
