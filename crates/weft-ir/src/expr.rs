//! IR expressions.

use serde::{Deserialize, Serialize};
use weft_common::Span;

use crate::name::Name;
use crate::types::{IrType, Signature};

/// A typed IR expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrExpr {
    pub kind: IrExprKind,
    /// The expression's static type as resolved by the frontend.
    pub ty: IrType,
    pub span: Span,
}

impl IrExpr {
    pub fn new(kind: IrExprKind, ty: IrType, span: Span) -> Self {
        Self { kind, ty, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrExprKind {
    Literal(IrLiteral),
    /// Reference to a declared name (local, parameter, global, import).
    Ref(Name),
    /// The receiver inside a method or constructor.
    This,
    /// The fail sentinel: evaluating it short-circuits the enclosing
    /// fallible context, or aborts when there is none.
    FailSentinel,
    Call {
        callee: IrCallee,
        args: Vec<IrArg>,
    },
    GetProperty {
        subject: Box<IrExpr>,
        property: IrProperty,
    },
    /// Checked conversion to `to`; fallible when the expression's own
    /// type carries the fallible marker.
    Cast {
        expr: Box<IrExpr>,
        to: IrType,
    },
    /// Runtime type test.
    IsType {
        expr: Box<IrExpr>,
        tested: IrType,
    },
    /// Unchecked not-null assertion on a nullable expression.
    NotNull(Box<IrExpr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrLiteral {
    Bool(bool),
    Int(i32),
    Int64(i64),
    Float64(f64),
    Str(String),
    Null,
    Void,
}

/// What a call dispatches through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrCallee {
    /// A declared function (module-level or local).
    Function { name: Name, sig: Signature },
    /// An instance method, dispatched through the subject.
    /// `trait_owner` names the declaring interface when the method is
    /// abstract, so the backend can import the dispatch trait.
    Method {
        subject: Box<IrExpr>,
        name: String,
        trait_owner: Option<Name>,
    },
    /// A static member of a type.
    Static { type_name: Name, name: String },
    /// A constructor of a concrete type.
    Ctor { type_name: Name },
    /// A builtin operation with a table-driven lowering.
    Builtin(BuiltinOp),
    /// A foreign-implemented ("connected") reference, also table-driven.
    Connected(String),
    /// Calling a function value produced by an expression.
    Value(Box<IrExpr>),
}

/// One call argument with its resolved formal type.
///
/// The frontend positions arguments (filling omitted optionals with a
/// typed null) and substitutes generic bindings into `formal`, so the
/// backend only chooses representations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrArg {
    pub value: IrExpr,
    /// The formal parameter type at this position, if the callee has a
    /// known signature.
    pub formal: Option<IrType>,
    /// Whether this argument feeds the callee's rest parameter.
    pub is_rest: bool,
}

impl IrArg {
    pub fn plain(value: IrExpr, formal: Option<IrType>) -> Self {
        Self {
            value,
            formal,
            is_rest: false,
        }
    }
}

/// A property slot on a class instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrProperty {
    pub name: String,
    /// Internal properties are the type's own backing fields; external
    /// ones go through the subject's accessor methods.
    pub internal: bool,
}

/// Identity of a builtin operator, the key into the support-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinOp {
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    DivIntSafe,
    ModInt,
    ModIntSafe,
    NegInt,
    AddFlt,
    SubFlt,
    MulFlt,
    DivFlt,
    ModFlt,
    NegFlt,
    EqInt,
    NeInt,
    LtInt,
    LeInt,
    GtInt,
    GeInt,
    EqFlt,
    NeFlt,
    LtFlt,
    LeFlt,
    GtFlt,
    GeFlt,
    EqStr,
    NeStr,
    LtStr,
    LeStr,
    GtStr,
    GeStr,
    EqGeneric,
    NeGeneric,
    Not,
    BitAnd,
    BitOr,
    StrCat,
    IntToString,
    Int64ToString,
    FltToString,
    IsNull,
    Listify,
    ListGet,
    ListLength,
    Panic,
    ConsoleLog,
}
