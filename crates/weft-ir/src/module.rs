//! IR modules, libraries, and declarations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weft_common::Span;

use crate::expr::IrExpr;
use crate::name::Name;
use crate::stmt::{IrBlock, IrStmt};
use crate::types::{IrType, Signature};

/// One Weft library: package metadata plus its translated module graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrLibrary {
    pub meta: PackageMeta,
    pub modules: Vec<IrModule>,
    /// Structural facts for every nominal type the library mentions,
    /// its own and imported ones alike.
    pub type_facts: TypeFactsMap,
}

/// Package metadata fields forwarded into the emitted crate manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    pub version: String,
    pub license: Option<String>,
    pub authors: Vec<String>,
    pub description: Option<String>,
}

/// A file-scoped IR unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrModule {
    /// Dotted source name; empty for the library root module.
    pub name: String,
    /// Source path segments relative to the library root (dash-cased).
    pub src_path: Vec<String>,
    pub imports: Vec<IrImport>,
    pub top_levels: Vec<IrItem>,
    pub span: Span,
}

/// A resolved import binding one local name to an export elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrImport {
    pub local_name: Name,
    /// The exporter's name for the value.
    pub exported_name: String,
    pub source: ImportSource,
    pub ty: IrType,
    /// Set when the import is a module-level function rather than a
    /// value; function imports are referenced directly, value imports
    /// go through the exporter's accessor.
    pub function_sig: Option<Signature>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportSource {
    /// Another module of the same library.
    SameLibrary { module: String },
    /// Another library; `features` lists the optional features of that
    /// library this import requires.
    External {
        library: String,
        version: String,
        module: String,
        features: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrItem {
    Global(IrGlobal),
    Function(IrFunction),
    Type(IrTypeDecl),
    Test(IrTest),
    Init(IrInitBlock),
}

/// A module-level value declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrGlobal {
    pub name: Name,
    pub ty: IrType,
    pub init: Option<IrExpr>,
    pub assign_once: bool,
    pub exported: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: Name,
    pub type_params: Vec<IrTypeParam>,
    pub params: IrParams,
    pub ret: IrType,
    /// Absent for pure-virtual interface methods.
    pub body: Option<IrBlock>,
    pub exported: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParams {
    /// The receiver name for methods and constructors.
    pub this_name: Option<Name>,
    pub params: Vec<IrParam>,
    pub rest: Option<IrParam>,
}

impl IrParams {
    pub fn plain(params: Vec<IrParam>) -> Self {
        Self {
            this_name: None,
            params,
            rest: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParam {
    pub name: Name,
    pub ty: IrType,
    pub optional: bool,
    pub span: Span,
}

/// A declared type parameter with its upper bounds.
///
/// Bounds name well-known capability interfaces (`Equatable`, `MapKey`)
/// or user interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrTypeParam {
    pub name: Name,
    pub bounds: Vec<IrType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrTest {
    pub name: Name,
    pub body: IrBlock,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrInitBlock {
    pub body: IrBlock,
    /// Set when the frontend already knows this init cannot run.
    pub fails: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Private,
    Public,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrTypeDecl {
    pub name: Name,
    pub kind: TypeKind,
    pub type_params: Vec<IrTypeParam>,
    pub supertypes: Vec<IrType>,
    pub members: Vec<IrMember>,
    /// For a sealed interface, the closed set of implementer names.
    pub sealed_subtypes: Option<Vec<Name>>,
    pub visibility: Visibility,
    pub span: Span,
}

impl IrTypeDecl {
    /// Whether any instance field is reassignable, which decides the
    /// lock wrapping of the data layout.
    pub fn has_mutable_field(&self) -> bool {
        self.members.iter().any(|m| match m {
            IrMember::Field(f) => !f.assign_once,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrMember {
    Field(IrField),
    Method(IrMethod),
    Ctor(IrCtor),
    StaticField(IrStaticField),
}

/// A concrete instance property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrField {
    pub name: String,
    pub ty: IrType,
    pub assign_once: bool,
    pub visibility: Visibility,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Normal,
    Getter,
    Setter,
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrMethod {
    pub kind: MethodKind,
    pub function: IrFunction,
    pub visibility: Visibility,
}

/// A constructor. The frontend splits the body at the point where every
/// field has been initialized: `field_init` runs against raw local
/// slots, `rest` against the constructed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrCtor {
    pub params: IrParams,
    pub field_init: Vec<IrStmt>,
    pub rest: Vec<IrStmt>,
    pub fallible: bool,
    pub visibility: Visibility,
    pub span: Span,
}

/// A static property, promoted to a lazily-initialized singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrStaticField {
    pub name: Name,
    pub ty: IrType,
    pub value: IrExpr,
    pub visibility: Visibility,
    pub span: Span,
}

/// Structural facts about nominal types, keyed by type name.
///
/// Covers both the library's own declarations and imported types; the
/// frontend supplies it alongside the module graph so the backend can
/// classify cores without re-walking foreign libraries.
pub type TypeFactsMap = BTreeMap<String, TypeFacts>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeFacts {
    pub kind: TypeKind,
    pub sealed_subtypes: Option<Vec<Name>>,
    pub has_mutable_field: bool,
    /// Direct supertypes by name; the backend closes over these when a
    /// class must implement every inherited dispatch trait.
    pub supertypes: Vec<Name>,
    /// For interfaces, the dispatch contract: method names with their
    /// declared return types, so implementers can forward covariantly.
    pub methods: Vec<MethodFacts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodFacts {
    pub name: Name,
    pub ret: IrType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{IrExprKind, IrLiteral};
    use crate::expr::IrExpr;
    use weft_common::Span;

    #[test]
    fn library_round_trips_through_json() {
        let library = IrLibrary {
            meta: PackageMeta {
                name: "demo".into(),
                version: "0.1.0".into(),
                license: Some("MIT".into()),
                authors: vec!["Weft Authors".into()],
                description: None,
            },
            modules: vec![IrModule {
                name: String::new(),
                src_path: vec![],
                imports: vec![],
                top_levels: vec![IrItem::Global(IrGlobal {
                    name: Name::new("answer"),
                    ty: IrType::int(),
                    init: Some(IrExpr::new(
                        IrExprKind::Literal(IrLiteral::Int(42)),
                        IrType::int(),
                        Span::new(0, 2),
                    )),
                    assign_once: true,
                    exported: true,
                    span: Span::new(0, 2),
                })],
                span: Span::dummy(),
            }],
            type_facts: TypeFactsMap::new(),
        };
        let json = serde_json::to_string(&library).unwrap();
        let back: IrLibrary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, library);
    }
}
