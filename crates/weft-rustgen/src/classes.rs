//! Class and interface lowering.
//!
//! A concrete type becomes a plain data struct, a public wrapper around
//! a shared (and, when any field is mutable, lockable) handle, an
//! inherent impl, and one dispatch-trait impl per supertype whose
//! methods forward to the type's own after return-type coercion. An
//! interface becomes a dispatch trait requiring `clone_boxed` (and
//! `as_variant` when sealed), a wrapper around a trait object, and for
//! sealed interfaces a variant enum giving exhaustive-match access.
//! Constructors may additionally synthesize builder aggregates: the
//! required-parameters one must be able to evolve independently of the
//! optional-parameters one, because adding a required parameter is a
//! breaking change while adding an optional one is not.

use rustc_hash::FxHashSet;
use weft_common::ident::camel_to_snake;
use weft_ir::{
    IrCtor, IrMember, IrMethod, IrStmt, IrStmtKind, IrType, IrTypeDecl, MethodKind, Name,
    TypeKind, Visibility,
};
use weft_rust_ast::{
    Attr, Block, Enum, Expr, Field, Function, GenericParam, Impl, Item, ItemKind, Param, Path,
    Pattern, Stmt, Struct, TupleStruct, Type, Variant, Vis,
};

use crate::decls::{DeclInfo, DeclOrigin};
use crate::describe::{describe, Describe};
use crate::error::TranslateError;
use crate::lower::{CtorMode, FunctionContext, FunctionOpts, Translator};
use crate::names;
use crate::types::{translate_described, translate_type, wrap_result_type};
use crate::wrap::{wrap_arc, wrap_lock, wrap_ok};

impl Translator<'_> {
    pub(crate) fn process_type_decl(&mut self, decl: &IrTypeDecl) -> Result<(), TranslateError> {
        match decl.kind {
            TypeKind::Class => self.process_class(decl),
            TypeKind::Interface => self.process_interface(decl),
        }
    }

    // ── Classes ──────────────────────────────────────────────────

    fn process_class(&mut self, decl: &IrTypeDecl) -> Result<(), TranslateError> {
        self.gather_static_members(decl)?;
        let name = names::type_name(&decl.name);
        let struct_name = format!("{name}Struct");
        let mutable = decl.has_mutable_field();
        let generics = self.class_generics(decl);

        // Data layout: concrete fields only, plus phantoms so unused
        // generics still anchor.
        let mut fields = Vec::new();
        for member in &decl.members {
            if let IrMember::Field(field) = member {
                fields.push(Field {
                    vis: Vis::Private,
                    name: camel_to_snake(&field.name),
                    ty: translate_type(&field.ty, &self.decls),
                });
            }
        }
        for generic in &generics {
            fields.push(Field {
                vis: Vis::Private,
                name: format!("phantom_{}", camel_to_snake(&generic.name)),
                ty: Type::generic(
                    "std::marker::PhantomData",
                    vec![Type::path(&generic.name)],
                ),
            });
        }
        self.module_items.push(Item::plain(ItemKind::Struct(Struct {
            name: struct_name.clone(),
            generics: generics.clone(),
            fields,
        })));

        // Public wrapper holding the shared handle.
        let core = self_ty(&struct_name, &generics);
        let handle = if mutable {
            core.rw_lock().arc()
        } else {
            core.arc()
        };
        let wrapper_vis = if decl.visibility == Visibility::Public {
            Vis::Pub
        } else {
            Vis::PubCrate
        };
        self.module_items.push(Item::with_attrs(
            vec![Attr::derive(&["Clone"])],
            wrapper_vis,
            ItemKind::TupleStruct(TupleStruct {
                name: name.clone(),
                generics: generics.clone(),
                fields: vec![handle],
            }),
        ));

        // Inherent impl: constructors and the type's own methods.
        // Internal property access inside runs against the handle, so
        // remember whether a lock layer sits in between.
        self.inside_mutable_type = mutable;
        let result = (|| {
            let mut items = Vec::new();
            for member in &decl.members {
                match member {
                    IrMember::Ctor(ctor) => {
                        let item = self.translate_ctor(decl, ctor, mutable, &generics)?;
                        items.push(item);
                    }
                    IrMember::Method(method) => {
                        items.push(self.translate_method(method)?);
                    }
                    IrMember::Field(_) | IrMember::StaticField(_) => {}
                }
            }
            Ok::<_, TranslateError>(items)
        })();
        self.inside_mutable_type = false;
        let items = result?;
        self.module_items.push(Item::plain(ItemKind::Impl(Impl {
            generics: generics.clone(),
            of_trait: None,
            self_ty: self_ty(&name, &generics),
            items,
        })));

        // One dispatch impl per supertype, transitively: Rust requires
        // every inherited trait implemented separately.
        for sup in self.all_interfaces(decl) {
            let item = self.build_sup_impl(decl, &generics, &sup)?;
            self.module_items.push(item);
        }
        Ok(())
    }

    /// Transitive closure of supertype interfaces, nearest first, each
    /// visited once.
    fn all_interfaces(&self, decl: &IrTypeDecl) -> Vec<Name> {
        let mut seen = FxHashSet::default();
        let mut queue: Vec<Name> = decl
            .supertypes
            .iter()
            .filter_map(|t| t.core_name().cloned())
            .collect();
        let mut out = Vec::new();
        while let Some(sup) = queue.pop() {
            if !seen.insert(sup.clone()) {
                continue;
            }
            let Some(facts) = self.facts().get(sup.as_str()) else {
                continue;
            };
            if facts.kind != TypeKind::Interface {
                continue;
            }
            queue.extend(facts.supertypes.iter().cloned());
            out.push(sup);
        }
        out.sort();
        out
    }

    fn build_sup_impl(
        &mut self,
        decl: &IrTypeDecl,
        generics: &[GenericParam],
        sup: &Name,
    ) -> Result<Item, TranslateError> {
        let sup_facts = self.facts().get(sup.as_str()).cloned();
        let sup_path = crate::types::user_type_path(sup, &self.decls);
        let trait_path = sup_path.suffixed("Trait");
        let mut items = Vec::new();
        // Sealed supertypes expose the exhaustive-match view.
        if let Some(facts) = &sup_facts {
            if facts.sealed_subtypes.is_some() {
                let variant_path = sup_path.suffixed("Variant");
                let arm = variant_path.join(names::type_name(&decl.name));
                items.push(Item::plain(ItemKind::Function(Function {
                    name: "as_variant".into(),
                    generics: vec![],
                    params: vec![Param::SelfRef],
                    ret: Some(Type::Path(variant_path.clone())),
                    body: Some(Block::of_result(Expr::call(
                        Expr::Path(arm),
                        vec![Expr::id("self").method_call("clone", vec![])],
                    ))),
                })));
            }
        }
        // Every dispatch trait can clone into a fresh shared handle.
        items.push(Item::plain(ItemKind::Function(Function {
            name: "clone_boxed".into(),
            generics: vec![],
            params: vec![Param::SelfRef],
            ret: Some(Type::Path(sup_path.clone())),
            body: Some(Block::of_result(Expr::call(
                Expr::Path(sup_path.join("new")),
                vec![Expr::id("self").method_call("clone", vec![])],
            ))),
        })));
        // Forward each contract method to the type's own, wrapping the
        // return for covariant nullability/fallibility narrowing.
        if let Some(facts) = &sup_facts {
            for contract in &facts.methods {
                let Some(method) = decl.members.iter().find_map(|m| match m {
                    IrMember::Method(method) if method.function.name == contract.name => {
                        Some(method)
                    }
                    _ => None,
                }) else {
                    continue;
                };
                items.push(self.build_forwarder(method, &contract.ret)?);
            }
        }
        Ok(Item::plain(ItemKind::Impl(Impl {
            generics: generics.to_vec(),
            of_trait: Some(Type::Path(trait_path)),
            self_ty: self_ty(&names::type_name(&decl.name), generics),
            items,
        })))
    }

    /// A thin forwarder: call the inherent method, then coerce the
    /// result to the supertype's declared return shape.
    fn build_forwarder(
        &mut self,
        method: &IrMethod,
        wanted_ret: &IrType,
    ) -> Result<Item, TranslateError> {
        let f = &method.function;
        let given = describe(&f.ret);
        let wanted = describe(wanted_ret);
        let args: Vec<Expr> = f
            .params
            .params
            .iter()
            .filter(|p| Some(&p.name) != f.params.this_name.as_ref())
            .map(|p| Expr::id(names::value_name(&p.name)))
            .collect();
        let call = Expr::id("self").method_call(method_rust_name(method), args);
        let wrapped = self.maybe_wrap(call, &given, Some(&wanted));
        // The forwarder's signature widens only where the contract
        // widens: the core stays the type's own.
        let effective = Describe {
            core: given.core.clone(),
            nullable: given.nullable || wanted.nullable,
            fallible: given.fallible || wanted.fallible,
        };
        let ret = if effective.is_unit() {
            None
        } else {
            Some(translate_described(&effective, &self.decls))
        };
        let mut params = vec![Param::SelfRef];
        for p in &f.params.params {
            if Some(&p.name) == f.params.this_name.as_ref() {
                continue;
            }
            self.register_param(p);
            params.push(Param::Typed {
                pat: Pattern::Id(names::value_name(&p.name)),
                ty: translate_type(&p.ty, &self.decls),
            });
        }
        Ok(Item::plain(ItemKind::Function(Function {
            name: method_rust_name(method),
            generics: vec![],
            params,
            ret,
            body: Some(Block::of_result(wrapped)),
        })))
    }

    fn translate_method(&mut self, method: &IrMethod) -> Result<Item, TranslateError> {
        let vis = match method.visibility {
            Visibility::Public => Some(Vis::Pub),
            Visibility::Private => Some(Vis::Private),
        };
        self.translate_function(
            &method.function,
            FunctionOpts {
                name_override: Some(method_rust_name(method)),
                vis,
                as_method: method.kind != MethodKind::Static,
                ..FunctionOpts::default()
            },
        )
    }

    // ── Constructors ─────────────────────────────────────────────

    fn translate_ctor(
        &mut self,
        decl: &IrTypeDecl,
        ctor: &IrCtor,
        mutable: bool,
        generics: &[GenericParam],
    ) -> Result<Item, TranslateError> {
        let name = names::type_name(&decl.name);
        let struct_name = format!("{name}Struct");
        let instance_ty = self_ty(&name, generics);
        let ret_ty = if ctor.fallible {
            wrap_result_type(instance_ty.clone())
        } else {
            instance_ty.clone()
        };

        // Builders ride along for public constructors with enough
        // parameters to name.
        if ctor.visibility == Visibility::Public && decl.visibility == Visibility::Public {
            self.process_class_builder(decl, ctor, generics, &ret_ty);
        }

        // Parameters.
        let mut params = Vec::new();
        for param in &ctor.params.params {
            if Some(&param.name) == ctor.params.this_name.as_ref() {
                continue;
            }
            self.register_param(param);
            let mut ty = translate_type(&param.ty, &self.decls);
            if param.optional && !describe(&param.ty).nullable {
                ty = ty.option();
            }
            params.push(Param::Typed {
                pat: Pattern::Id(names::value_name(&param.name)),
                ty,
            });
        }

        self.fn_stack.push(FunctionContext {
            captures: Default::default(),
            methodized: Default::default(),
            mutable_captures: Default::default(),
            return_type: Describe {
                core: Some(crate::describe::Core::Named {
                    name: decl.name.clone(),
                    args: vec![],
                }),
                nullable: false,
                fallible: ctor.fallible,
            },
            ctor_mode: Some(CtorMode::Init),
            this_name: ctor.params.this_name.clone(),
        });
        let lowered = (|| {
            let mut stmts = Vec::new();
            // Field slots first: the init statements assign raw locals.
            let field_names = ctor_field_slots(decl, ctor);
            for (field, count) in &field_names {
                let pat = if *count > 1 {
                    Pattern::MutId(field.clone())
                } else {
                    Pattern::Id(field.clone())
                };
                stmts.push(Stmt::Let {
                    pat,
                    ty: None,
                    value: None,
                });
            }
            self.process_statements(&ctor.field_init, &mut stmts, false)?;
            // Assemble the instance, then switch every internal
            // property reference over to it.
            let mut members: Vec<(String, Option<Expr>)> = field_names
                .iter()
                .map(|(field, _)| (field.clone(), None))
                .collect();
            for generic in generics {
                members.push((
                    format!("phantom_{}", camel_to_snake(&generic.name)),
                    Some(Expr::path("std::marker::PhantomData")),
                ));
            }
            let mut core = Expr::StructLit {
                path: Path::single(struct_name.clone()),
                fields: members,
            };
            if mutable {
                core = wrap_lock(core);
            }
            let build = Expr::call(
                Expr::Path(Path::single(name.clone())),
                vec![wrap_arc(core)],
            );
            stmts.push(Stmt::Let {
                pat: Pattern::Id("selfish".into()),
                ty: None,
                value: Some(build),
            });
            if let Some(ctx) = self.fn_stack.last_mut() {
                ctx.ctor_mode = Some(CtorMode::Use);
            }
            self.process_statements(&ctor.rest, &mut stmts, true)?;
            // No explicit trailing return: the instance is the result.
            let ends_with_return = ctor
                .rest
                .last()
                .is_some_and(|s| matches!(s.kind, IrStmtKind::Return { .. }));
            let result = if ends_with_return {
                None
            } else if ctor.fallible {
                Some(wrap_ok(Expr::id("selfish")))
            } else {
                Some(Expr::id("selfish"))
            };
            Ok::<_, TranslateError>(Block::new(stmts, result))
        })();
        self.fn_stack.pop();
        let block = lowered?;

        Ok(Item::with_attrs(
            vec![],
            Vis::Pub,
            ItemKind::Function(Function {
                name: "new".into(),
                generics: vec![],
                params,
                ret: Some(ret_ty),
                body: Some(block),
            }),
        ))
    }

    // ── Builders ─────────────────────────────────────────────────

    /// Synthesize `FooBuilder` / `FooOptions` for a constructor.
    ///
    /// Requireds and optionals split into separate aggregates so they
    /// can evolve independently; `build()` call sites survive new
    /// optional parameters unchanged.
    fn process_class_builder(
        &mut self,
        decl: &IrTypeDecl,
        ctor: &IrCtor,
        generics: &[GenericParam],
        ret_ty: &Type,
    ) {
        let non_self: Vec<_> = ctor
            .params
            .params
            .iter()
            .filter(|p| Some(&p.name) != ctor.params.this_name.as_ref())
            .collect();
        // Not worth a builder for zero or one parameter; rest
        // parameters don't fit named fields at all.
        if non_self.len() <= 1 || ctor.params.rest.is_some() {
            return;
        }
        let name = names::type_name(&decl.name);
        let builder_name = format!("{name}Builder");
        let options_name = format!("{name}Options");

        let mut requireds = Vec::new();
        let mut optionals = Vec::new();
        for param in &non_self {
            let mut ty = translate_type(&param.ty, &self.decls);
            if param.optional && !describe(&param.ty).nullable {
                ty = ty.option();
            }
            let field = Field {
                vis: Vis::Pub,
                name: names::value_name(&param.name),
                ty,
            };
            if param.optional {
                optionals.push(field);
            } else {
                requireds.push(field);
            }
        }

        let call_new = |takes: &[(&str, &[Field])]| -> Expr {
            let mut args = Vec::new();
            for (subject, fields) in takes {
                for field in *fields {
                    args.push(Expr::id(*subject).field(&field.name));
                }
            }
            Expr::call(Expr::Path(Path::single(name.clone()).join("new")), args)
        };

        let options_generics = used_generics(generics, &optionals);
        if !optionals.is_empty() {
            // Optionals default component-wise; Clone in case callers
            // want to reuse a prepared set.
            self.module_items.push(Item::with_attrs(
                vec![Attr::derive(&["Clone", "Default"])],
                Vis::Pub,
                ItemKind::Struct(Struct {
                    name: options_name.clone(),
                    generics: options_generics.clone(),
                    fields: optionals.clone(),
                }),
            ));
            if requireds.is_empty() {
                // With no requireds the options aggregate builds
                // directly.
                self.module_items.push(Item::plain(ItemKind::Impl(Impl {
                    generics: options_generics.clone(),
                    of_trait: None,
                    self_ty: self_ty(&options_name, &options_generics),
                    items: vec![Item::with_attrs(
                        vec![],
                        Vis::Pub,
                        ItemKind::Function(Function {
                            name: "build".into(),
                            generics: vec![],
                            // Self by move avoids cloning; the type is
                            // Clone for callers that want copies.
                            params: vec![Param::SelfOwned],
                            ret: Some(ret_ty.clone()),
                            body: Some(Block::of_result(call_new(&[("self", &optionals)]))),
                        }),
                    )],
                })));
            }
        }
        if !requireds.is_empty() {
            let builder_generics = used_generics(generics, &requireds);
            self.module_items.push(Item::with_attrs(
                vec![Attr::derive(&["Clone"])],
                Vis::Pub,
                ItemKind::Struct(Struct {
                    name: builder_name.clone(),
                    generics: builder_generics.clone(),
                    fields: requireds.clone(),
                }),
            ));
            let mut impl_items = Vec::new();
            let build_body = if optionals.is_empty() {
                call_new(&[("self", &requireds)])
            } else {
                Expr::id("self").method_call(
                    "build_with",
                    vec![Expr::call_path("Default::default", vec![])],
                )
            };
            impl_items.push(Item::with_attrs(
                vec![],
                Vis::Pub,
                ItemKind::Function(Function {
                    name: "build".into(),
                    generics: vec![],
                    params: vec![Param::SelfOwned],
                    ret: Some(ret_ty.clone()),
                    body: Some(Block::of_result(build_body)),
                }),
            ));
            if !optionals.is_empty() {
                impl_items.push(Item::with_attrs(
                    vec![],
                    Vis::Pub,
                    ItemKind::Function(Function {
                        name: "build_with".into(),
                        generics: options_generics.clone(),
                        params: vec![
                            Param::SelfOwned,
                            Param::Typed {
                                pat: Pattern::Id("options".into()),
                                ty: self_ty(&options_name, &options_generics),
                            },
                        ],
                        ret: Some(ret_ty.clone()),
                        body: Some(Block::of_result(call_new(&[
                            ("self", &requireds),
                            ("options", &optionals),
                        ]))),
                    }),
                ));
            }
            self.module_items.push(Item::plain(ItemKind::Impl(Impl {
                generics: builder_generics.clone(),
                of_trait: None,
                self_ty: self_ty(&builder_name, &builder_generics),
                items: impl_items,
            })));
        }
    }

    // ── Interfaces ───────────────────────────────────────────────

    fn process_interface(&mut self, decl: &IrTypeDecl) -> Result<(), TranslateError> {
        self.gather_static_members(decl)?;
        let name = names::type_name(&decl.name);
        let trait_name = format!("{name}Trait");
        let generics = self.class_generics(decl);
        let vis = if decl.visibility == Visibility::Public {
            Vis::Pub
        } else {
            Vis::PubCrate
        };

        // Sealed interfaces get the variant enum first, so the trait
        // can mention it.
        let variant_name = decl.sealed_subtypes.as_ref().map(|subtypes| {
            let variant_name = format!("{name}Variant");
            let variants = subtypes
                .iter()
                .map(|sub| Variant {
                    name: names::type_name(sub),
                    fields: vec![Type::Path(crate::types::user_type_path(sub, &self.decls))],
                })
                .collect();
            self.module_items.push(Item::with_attrs(
                vec![],
                vis,
                ItemKind::Enum(Enum {
                    name: variant_name.clone(),
                    variants,
                }),
            ));
            variant_name
        });

        // The dispatch trait: supertype bounds, thread-safety bounds,
        // the handle-clone requirement, and the user-declared contract.
        let mut bounds = Vec::new();
        for sup in &decl.supertypes {
            if let Some(sup_name) = sup.core_name() {
                bounds.push(Type::Path(
                    crate::types::user_type_path(sup_name, &self.decls).suffixed("Trait"),
                ));
            }
        }
        bounds.push(Type::path("Send"));
        bounds.push(Type::path("Sync"));

        let mut trait_items = Vec::new();
        if let Some(variant_name) = &variant_name {
            trait_items.push(Item::plain(ItemKind::Function(Function {
                name: "as_variant".into(),
                generics: vec![],
                params: vec![Param::SelfRef],
                ret: Some(Type::path(variant_name)),
                body: None,
            })));
        }
        trait_items.push(Item::plain(ItemKind::Function(Function {
            name: "clone_boxed".into(),
            generics: vec![],
            params: vec![Param::SelfRef],
            ret: Some(self_ty(&name, &generics)),
            body: None,
        })));
        for member in &decl.members {
            if let IrMember::Method(method) = member {
                if method.kind == MethodKind::Static {
                    continue;
                }
                let item = self.translate_function(
                    &method.function,
                    FunctionOpts {
                        name_override: Some(method_rust_name(method)),
                        vis: Some(Vis::Private),
                        as_method: true,
                        ..FunctionOpts::default()
                    },
                )?;
                trait_items.push(item);
            }
        }
        self.module_items.push(Item::with_attrs(
            vec![],
            vis,
            ItemKind::Trait(weft_rust_ast::Trait {
                name: trait_name.clone(),
                generics: generics.clone(),
                bounds,
                items: trait_items,
            }),
        ));

        // Wrapper over a shared trait object.
        self.module_items.push(Item::with_attrs(
            vec![Attr::derive(&["Clone"])],
            vis,
            ItemKind::TupleStruct(TupleStruct {
                name: name.clone(),
                generics: generics.clone(),
                fields: vec![Type::TraitObject {
                    bounds: vec![self_ty(&trait_name, &generics)],
                }
                .arc()],
            }),
        ));

        // `new` wraps any implementer; static members ride along.
        let mut impl_items = vec![Item::with_attrs(
            vec![],
            Vis::Pub,
            ItemKind::Function(Function {
                name: "new".into(),
                generics: vec![],
                params: vec![Param::Typed {
                    pat: Pattern::Id("selfish".into()),
                    ty: Type::ImplTrait {
                        bounds: vec![self_ty(&trait_name, &generics), Type::path("'static")],
                    },
                }],
                ret: Some(self_ty(&name, &generics)),
                body: Some(Block::of_result(Expr::call(
                    Expr::Path(Path::single(name.clone())),
                    vec![wrap_arc(Expr::id("selfish"))],
                ))),
            }),
        )];
        for member in &decl.members {
            if let IrMember::Method(method) = member {
                if method.kind == MethodKind::Static {
                    impl_items.push(self.translate_method(method)?);
                }
            }
        }
        self.module_items.push(Item::plain(ItemKind::Impl(Impl {
            generics: generics.clone(),
            of_trait: None,
            self_ty: self_ty(&name, &generics),
            items: impl_items,
        })));

        // Deref exposes the contract on the wrapper directly.
        self.module_items.push(Item::plain(ItemKind::Impl(Impl {
            generics: generics.clone(),
            of_trait: Some(Type::path("std::ops::Deref")),
            self_ty: self_ty(&name, &generics),
            items: vec![
                Item::plain(ItemKind::TypeAlias {
                    name: "Target".into(),
                    ty: Type::TraitObject {
                        bounds: vec![self_ty(&trait_name, &generics)],
                    },
                }),
                Item::plain(ItemKind::Function(Function {
                    name: "deref".into(),
                    generics: vec![],
                    params: vec![Param::SelfRef],
                    ret: Some(Type::Ref(Box::new(Type::path("Self::Target")))),
                    body: Some(Block::of_result(
                        Expr::id("self").field("0").deref().reference(),
                    )),
                })),
            ],
        })));
        Ok(())
    }

    // ── Shared pieces ────────────────────────────────────────────

    /// Static members lower as toppers with type-qualified names.
    fn gather_static_members(&mut self, decl: &IrTypeDecl) -> Result<(), TranslateError> {
        for member in &decl.members {
            if let IrMember::StaticField(field) = member {
                let mut info = DeclInfo::new(DeclOrigin::StaticMember, field.span)
                    .with_type(field.ty.clone());
                info.topper = true;
                info.exported = field.visibility == Visibility::Public;
                info.cell = Some(names::static_member_cell(&decl.name, &field.name));
                info.accessor = Some(names::static_member_accessor(&decl.name, &field.name));
                self.decls.declare(field.name.clone(), info.clone());
                let getter = self.build_topper_getter(&field.name, &info);
                self.module_items.push(getter);
                let given = describe(&field.value.ty);
                let wanted = field.ty.clone();
                let value = self
                    .lower_expr(&field.value, false)
                    .map_err(crate::lower::fatal_lower)?;
                let value = self.maybe_wrap(value, &given, Some(&describe(&wanted)));
                let assigns = self.build_topper_assign(&field.name, &info, value);
                self.module_inits.extend(assigns);
            }
        }
        Ok(())
    }

    fn class_generics(&mut self, decl: &IrTypeDecl) -> Vec<GenericParam> {
        decl.type_params
            .iter()
            .map(|param| {
                self.decls.declare(
                    param.name.clone(),
                    DeclInfo::new(DeclOrigin::TypeParam, decl.span),
                );
                GenericParam {
                    name: names::type_name(&param.name),
                    bounds: ["Clone", "Send", "Sync", "'static"]
                        .iter()
                        .map(|b| Type::path(b))
                        .collect(),
                }
            })
            .collect()
    }
}

fn method_rust_name(method: &IrMethod) -> String {
    let base = camel_to_snake(method.function.name.as_str());
    match method.kind {
        MethodKind::Setter => format!("set_{base}"),
        _ => base,
    }
}

fn self_ty(name: &str, generics: &[GenericParam]) -> Type {
    if generics.is_empty() {
        Type::path(name)
    } else {
        Type::Generic {
            path: Path::single(name),
            args: generics.iter().map(|g| Type::path(&g.name)).collect(),
        }
    }
}

/// Count assignments per field slot in the init statements, in first
/// assignment order; multiply-assigned slots need `mut`.
fn ctor_field_slots(decl: &IrTypeDecl, ctor: &IrCtor) -> Vec<(String, u32)> {
    let mut counts: Vec<(String, u32)> = Vec::new();
    fn visit(stmt: &IrStmt, counts: &mut Vec<(String, u32)>) {
        match &stmt.kind {
            IrStmtKind::SetProperty { property, .. } if property.internal => {
                let field = camel_to_snake(&property.name);
                if let Some(entry) = counts.iter_mut().find(|(name, _)| *name == field) {
                    entry.1 += 1;
                } else {
                    counts.push((field, 1));
                }
            }
            IrStmtKind::If { then, alt, .. } => {
                visit(then, counts);
                if let Some(alt) = alt {
                    visit(alt, counts);
                }
            }
            IrStmtKind::While { body, .. } => visit(body, counts),
            IrStmtKind::Block(block) => {
                for s in &block.statements {
                    visit(s, counts);
                }
            }
            IrStmtKind::Labeled { stmt, .. } => visit(stmt, counts),
            _ => {}
        }
    }
    for stmt in &ctor.field_init {
        visit(stmt, &mut counts);
    }
    // Fields never assigned in init (none expected) still need slots.
    for member in &decl.members {
        if let IrMember::Field(field) = member {
            let name = camel_to_snake(&field.name);
            if !counts.iter().any(|(n, _)| *n == name) {
                counts.push((name, 1));
            }
        }
    }
    counts
}

/// Keep only the generics whose names appear in the field types; an
/// aggregate with unused parameters would not compile.
fn used_generics(generics: &[GenericParam], fields: &[Field]) -> Vec<GenericParam> {
    let mut used = FxHashSet::default();
    for field in fields {
        collect_type_names(&field.ty, &mut used);
    }
    generics
        .iter()
        .filter(|g| used.contains(&g.name))
        .cloned()
        .collect()
}

fn collect_type_names(ty: &Type, out: &mut FxHashSet<String>) {
    match ty {
        Type::Path(path) => {
            if path.segments.len() == 1 {
                out.insert(path.segments[0].clone());
            }
        }
        Type::Generic { path, args } => {
            if path.segments.len() == 1 {
                out.insert(path.segments[0].clone());
            }
            for arg in args {
                collect_type_names(arg, out);
            }
        }
        Type::Ref(inner) => collect_type_names(inner, out),
        Type::Tuple(types) => {
            for t in types {
                collect_type_names(t, out);
            }
        }
        Type::Fn { params, ret } => {
            for p in params {
                collect_type_names(p, out);
            }
            collect_type_names(ret, out);
        }
        Type::TraitObject { bounds } | Type::ImplTrait { bounds } => {
            for b in bounds {
                collect_type_names(b, out);
            }
        }
        Type::Unit => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use weft_common::Span;
    use weft_ir::{
        IrBlock, IrCtor, IrExpr, IrExprKind, IrField, IrFunction, IrItem, IrLibrary, IrLiteral,
        IrMember, IrMethod, IrModule, IrParam, IrParams, IrProperty, IrStmt, IrStmtKind, IrType,
        IrTypeDecl, MethodFacts, MethodKind, Name, PackageMeta, TypeFacts, TypeKind, Visibility,
    };

    use crate::assemble::translate_module;

    fn sp() -> Span {
        Span::dummy()
    }

    fn field(name: &str, ty: IrType) -> IrMember {
        IrMember::Field(IrField {
            name: name.into(),
            ty,
            assign_once: true,
            visibility: Visibility::Public,
            span: sp(),
        })
    }

    fn area_method() -> IrMember {
        IrMember::Method(IrMethod {
            kind: MethodKind::Normal,
            visibility: Visibility::Public,
            function: IrFunction {
                name: Name::new("area"),
                type_params: vec![],
                params: IrParams {
                    this_name: Some(Name::new("this")),
                    params: vec![],
                    rest: None,
                },
                ret: IrType::named("Float64"),
                body: Some(IrBlock::new(
                    vec![IrStmt::new(
                        IrStmtKind::Return {
                            value: Some(IrExpr::new(
                                IrExprKind::Literal(IrLiteral::Float64(1.0)),
                                IrType::named("Float64"),
                                sp(),
                            )),
                        },
                        sp(),
                    )],
                    sp(),
                )),
                exported: false,
                span: sp(),
            },
        })
    }

    fn sealed_library() -> IrLibrary {
        let shape = IrTypeDecl {
            name: Name::new("Shape"),
            kind: TypeKind::Interface,
            type_params: vec![],
            supertypes: vec![],
            members: vec![IrMember::Method(IrMethod {
                kind: MethodKind::Normal,
                visibility: Visibility::Public,
                function: IrFunction {
                    name: Name::new("area"),
                    type_params: vec![],
                    params: IrParams {
                        this_name: Some(Name::new("this")),
                        params: vec![],
                        rest: None,
                    },
                    ret: IrType::named("Float64"),
                    body: None,
                    exported: false,
                    span: sp(),
                },
            })],
            sealed_subtypes: Some(vec![Name::new("Circle"), Name::new("Square")]),
            visibility: Visibility::Public,
            span: sp(),
        };
        let circle = IrTypeDecl {
            name: Name::new("Circle"),
            kind: TypeKind::Class,
            type_params: vec![],
            supertypes: vec![IrType::named("Shape")],
            members: vec![field("radius", IrType::named("Float64")), area_method()],
            sealed_subtypes: None,
            visibility: Visibility::Public,
            span: sp(),
        };
        let square = IrTypeDecl {
            name: Name::new("Square"),
            kind: TypeKind::Class,
            type_params: vec![],
            supertypes: vec![IrType::named("Shape")],
            members: vec![field("side", IrType::named("Float64")), area_method()],
            sealed_subtypes: None,
            visibility: Visibility::Public,
            span: sp(),
        };
        let mut type_facts = BTreeMap::new();
        type_facts.insert(
            "Shape".to_string(),
            TypeFacts {
                kind: TypeKind::Interface,
                sealed_subtypes: Some(vec![Name::new("Circle"), Name::new("Square")]),
                has_mutable_field: false,
                supertypes: vec![],
                methods: vec![MethodFacts {
                    name: Name::new("area"),
                    ret: IrType::named("Float64"),
                }],
            },
        );
        for class in ["Circle", "Square"] {
            type_facts.insert(
                class.to_string(),
                TypeFacts {
                    kind: TypeKind::Class,
                    sealed_subtypes: None,
                    has_mutable_field: false,
                    supertypes: vec![Name::new("Shape")],
                    methods: vec![],
                },
            );
        }
        IrLibrary {
            meta: PackageMeta {
                name: "shapes".into(),
                version: "0.1.0".into(),
                license: None,
                authors: vec![],
                description: None,
            },
            modules: vec![IrModule {
                name: String::new(),
                src_path: vec![],
                imports: vec![],
                top_levels: vec![
                    IrItem::Type(shape),
                    IrItem::Type(circle),
                    IrItem::Type(square),
                ],
                span: sp(),
            }],
            type_facts,
        }
    }

    fn render_module(library: &IrLibrary) -> String {
        let file = translate_module(library, &library.modules[0], &[]).unwrap();
        weft_rust_ast::render_file(&file)
    }

    #[test]
    fn sealed_interface_gets_variant_enum_and_view() {
        let library = sealed_library();
        let text = render_module(&library);
        // The closed set of implementers becomes a tagged enum.
        assert!(text.contains("pub enum ShapeVariant {"), "{text}");
        assert!(text.contains("Circle(Circle),"), "{text}");
        assert!(text.contains("Square(Square),"), "{text}");
        // The dispatch trait requires the variant view and the handle
        // clone.
        assert!(
            text.contains("fn as_variant(&self) -> ShapeVariant;"),
            "{text}"
        );
        assert!(text.contains("fn clone_boxed(&self) -> Shape;"), "{text}");
        // Lowering a concrete value through the interface and asking
        // for its variant yields that type's arm.
        assert!(
            text.contains("ShapeVariant::Circle(self.clone())"),
            "{text}"
        );
        assert!(
            text.contains("ShapeVariant::Square(self.clone())"),
            "{text}"
        );
        // Wrapper holds a shared trait object and derefs to it.
        assert!(
            text.contains("pub struct Shape(std::sync::Arc<dyn ShapeTrait>);"),
            "{text}"
        );
        assert!(text.contains("impl std::ops::Deref for Shape {"), "{text}");
        // Forwarders delegate to the concrete type's own method.
        assert!(text.contains("impl ShapeTrait for Circle {"), "{text}");
        assert!(text.contains("self.area()"), "{text}");
    }

    #[test]
    fn class_lowering_splits_layout_and_wrapper() {
        let library = sealed_library();
        let text = render_module(&library);
        // Data layout struct plus a shared-handle wrapper; no lock
        // layer because every field is assign-once.
        assert!(text.contains("struct CircleStruct {"), "{text}");
        assert!(text.contains("radius: f64,"), "{text}");
        assert!(
            text.contains("pub struct Circle(std::sync::Arc<CircleStruct>);"),
            "{text}"
        );
    }

    fn builder_library() -> IrLibrary {
        let param = |name: &str, optional: bool| IrParam {
            name: Name::new(name),
            ty: IrType::int(),
            optional,
            span: sp(),
        };
        let set_field = |field: &str, from: &str| {
            IrStmt::new(
                IrStmtKind::SetProperty {
                    subject: IrExpr::new(IrExprKind::This, IrType::named("Point"), sp()),
                    property: IrProperty {
                        name: field.into(),
                        internal: true,
                    },
                    value: IrExpr::new(IrExprKind::Ref(Name::new(from)), IrType::int(), sp()),
                },
                sp(),
            )
        };
        let ctor = IrCtor {
            params: IrParams {
                this_name: Some(Name::new("this")),
                params: vec![
                    param("a", false),
                    param("b", false),
                    param("c", true),
                    param("d", true),
                ],
                rest: None,
            },
            field_init: vec![set_field("x", "a"), set_field("y", "b")],
            rest: vec![],
            fallible: false,
            visibility: Visibility::Public,
            span: sp(),
        };
        let point = IrTypeDecl {
            name: Name::new("Point"),
            kind: TypeKind::Class,
            type_params: vec![],
            supertypes: vec![],
            members: vec![
                field("x", IrType::int()),
                field("y", IrType::int()),
                IrMember::Ctor(ctor),
            ],
            sealed_subtypes: None,
            visibility: Visibility::Public,
            span: sp(),
        };
        let mut type_facts = BTreeMap::new();
        type_facts.insert(
            "Point".to_string(),
            TypeFacts {
                kind: TypeKind::Class,
                sealed_subtypes: None,
                has_mutable_field: false,
                supertypes: vec![],
                methods: vec![],
            },
        );
        IrLibrary {
            meta: PackageMeta {
                name: "points".into(),
                version: "0.1.0".into(),
                license: None,
                authors: vec![],
                description: None,
            },
            modules: vec![IrModule {
                name: String::new(),
                src_path: vec![],
                imports: vec![],
                top_levels: vec![IrItem::Type(point)],
                span: sp(),
            }],
            type_facts,
        }
    }

    #[test]
    fn builder_split_keeps_requireds_and_optionals_independent() {
        let library = builder_library();
        let text = render_module(&library);
        // Required aggregate with public fields.
        assert!(text.contains("pub struct PointBuilder {"), "{text}");
        assert!(text.contains("pub a: i32,"), "{text}");
        assert!(text.contains("pub b: i32,"), "{text}");
        // Optional aggregate defaults component-wise.
        assert!(text.contains("#[derive(Clone, Default)]"), "{text}");
        assert!(text.contains("pub struct PointOptions {"), "{text}");
        assert!(text.contains("pub c: Option<i32>,"), "{text}");
        assert!(text.contains("pub d: Option<i32>,"), "{text}");
        // `build()` stays stable when optionals grow: it delegates with
        // defaults rather than naming them.
        assert!(
            text.contains("self.build_with(Default::default())"),
            "{text}"
        );
        // `build_with` honors supplied optionals.
        assert!(
            text.contains("Point::new(self.a, self.b, options.c, options.d)"),
            "{text}"
        );
    }

    #[test]
    fn constructor_lowers_in_two_phases() {
        let library = builder_library();
        let text = render_module(&library);
        // Raw slots first, then the instance is assembled and later
        // statements run against it.
        assert!(text.contains("let x;"), "{text}");
        assert!(text.contains("let y;"), "{text}");
        assert!(text.contains("x = a;"), "{text}");
        assert!(
            text.contains("let selfish = Point(std::sync::Arc::new(PointStruct { x, y }));"),
            "{text}"
        );
        assert!(text.contains("selfish"), "{text}");
        assert!(
            text.contains("pub fn new(a: i32, b: i32, c: Option<i32>, d: Option<i32>) -> Point {"),
            "{text}"
        );
    }
}
