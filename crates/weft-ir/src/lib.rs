//! The typed IR consumed by the Weft Rust backend.
//!
//! The frontend hands the backend a finalized, type-annotated module
//! graph: imports are resolved, generic bindings are substituted, and
//! every expression and declaration carries an [`IrType`] including its
//! nullability and fallibility. The backend never re-infers types.
//!
//! The IR is serde-serializable; the driver reads it from JSON produced
//! by the frontend.

pub mod expr;
pub mod module;
pub mod name;
pub mod scan;
pub mod stmt;
pub mod types;

pub use expr::{BuiltinOp, IrArg, IrCallee, IrExpr, IrExprKind, IrLiteral, IrProperty};
pub use module::{
    ImportSource, IrCtor, IrField, IrFunction, IrGlobal, IrImport, IrInitBlock, IrItem,
    IrLibrary, IrMember, IrMethod, IrModule, IrParam, IrParams, IrStaticField, IrTest,
    IrTypeDecl, IrTypeParam, MethodFacts, MethodKind, PackageMeta, TypeFacts, TypeFactsMap,
    TypeKind, Visibility,
};
pub use name::Name;
pub use stmt::{IrBlock, IrLocal, IrStmt, IrStmtKind, IrSwitchCase};
pub use types::{IrType, Signature};
