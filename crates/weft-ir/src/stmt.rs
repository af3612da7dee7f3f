//! IR statements.

use serde::{Deserialize, Serialize};
use weft_common::Span;

use crate::expr::{IrExpr, IrProperty};
use crate::module::IrFunction;
use crate::name::Name;
use crate::types::IrType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrStmt {
    pub kind: IrStmtKind,
    pub span: Span,
}

impl IrStmt {
    pub fn new(kind: IrStmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrStmtKind {
    /// A local declaration.
    Let(IrLocal),
    /// Assignment to a declared name. The frontend guarantees the
    /// target is a simple resolved name; anything else is a bug in an
    /// earlier pass.
    Assign { target: Name, value: IrExpr },
    /// Property store; internal properties write the backing field,
    /// external ones call the subject's setter.
    SetProperty {
        subject: IrExpr,
        property: IrProperty,
        value: IrExpr,
    },
    Expr(IrExpr),
    If {
        test: IrExpr,
        then: Box<IrStmt>,
        alt: Option<Box<IrStmt>>,
    },
    While {
        test: IrExpr,
        body: Box<IrStmt>,
    },
    Block(IrBlock),
    Labeled {
        label: Name,
        stmt: Box<IrStmt>,
    },
    Break {
        label: Option<Name>,
    },
    Continue {
        label: Option<Name>,
    },
    Return {
        value: Option<IrExpr>,
    },
    /// Dense integer dispatch, produced by the frontend for state
    /// machines and the like.
    Switch {
        scrutinee: IrExpr,
        cases: Vec<IrSwitchCase>,
        default: IrBlock,
    },
    /// A function declared in function scope. Consecutive declarations
    /// form one closure group.
    LocalFn(IrFunction),
    /// A handler scope: evaluate the fallible `handled` expression,
    /// optionally binding its success value to `assign`, and record
    /// failure in `fail_flag`. The immediately following statement is
    /// an `If` testing `fail_flag`; the pair lowers as one unit.
    Handler {
        assign: Option<Name>,
        handled: IrExpr,
        fail_flag: Name,
    },
    /// Module initialization failed; short-circuits the module init.
    InitFailed,
}

/// A local variable declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrLocal {
    pub name: Name,
    pub ty: IrType,
    pub init: Option<IrExpr>,
    pub assign_once: bool,
    /// Marks a handler-scope fail flag; such declarations produce no
    /// storage of their own.
    pub fail_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrBlock {
    pub statements: Vec<IrStmt>,
    pub span: Span,
}

impl IrBlock {
    pub fn new(statements: Vec<IrStmt>, span: Span) -> Self {
        Self { statements, span }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// One arm of a computed jump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrSwitchCase {
    pub values: Vec<i64>,
    pub body: IrBlock,
}
