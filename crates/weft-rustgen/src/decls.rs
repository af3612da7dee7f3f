//! The declaration table.
//!
//! Tracks every name's origin, locality, capture/promotion status, and
//! chosen target representation. Populated by two preprocessing passes
//! before any statement lowering: (a) imports and module-level
//! declarations, (b) topper promotion for module-scope values
//! referenced from function or type bodies. Later analysis mutates
//! entries only through the promotion methods here, so no stale copies
//! circulate.

use rustc_hash::FxHashMap;
use weft_common::Span;
use weft_ir::{ImportSource, IrType, Name, Signature};

/// Where a name was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclOrigin {
    Import,
    Global,
    Function,
    LocalFn,
    Local,
    Param,
    TypeParam,
    StaticMember,
    Type,
}

/// Everything the lowering needs to know about one declared name.
#[derive(Debug, Clone)]
pub struct DeclInfo {
    pub origin: DeclOrigin,
    /// Function-scope rather than module-scope.
    pub local: bool,
    /// Promoted to a process-wide lazily-initialized singleton.
    pub topper: bool,
    /// Captured by a closure and reassigned; stored shared + lockable.
    pub mutable_capture: bool,
    pub assign_once: bool,
    pub exported: bool,
    /// The declaration's IR type, when it has one.
    pub ir_type: Option<IrType>,
    /// The signature for function declarations.
    pub sig: Option<Signature>,
    pub import: Option<ImportInfo>,
    /// Storage cell name for toppers that need one other than the
    /// default SHOUT form (static members).
    pub cell: Option<String>,
    /// Accessor function name when it differs from the value name.
    pub accessor: Option<String>,
    pub span: Span,
}

impl DeclInfo {
    pub fn new(origin: DeclOrigin, span: Span) -> Self {
        Self {
            origin,
            local: false,
            topper: false,
            mutable_capture: false,
            assign_once: true,
            exported: false,
            ir_type: None,
            sig: None,
            import: None,
            cell: None,
            accessor: None,
            span,
        }
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_type(mut self, ty: IrType) -> Self {
        self.ir_type = Some(ty);
        self
    }

    pub fn with_sig(mut self, sig: Signature) -> Self {
        self.sig = Some(sig);
        self
    }

    pub fn assignable(mut self) -> Self {
        self.assign_once = false;
        self
    }
}

/// Cross-module origin of an imported name.
#[derive(Debug, Clone)]
pub struct ImportInfo {
    pub source: ImportSource,
    pub exported_name: String,
    /// Function imports are referenced directly; value imports go
    /// through the exporter's accessor.
    pub is_function: bool,
}

/// The table itself. One entry per declaring occurrence.
#[derive(Debug, Default)]
pub struct DeclTable {
    map: FxHashMap<Name, DeclInfo>,
}

impl DeclTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name. Re-declaring replaces the previous entry; the
    /// frontend resolves shadowing, so a replacement only happens for
    /// intentional clobbering (static members re-registered with
    /// context).
    pub fn declare(&mut self, name: Name, info: DeclInfo) {
        self.map.insert(name, info);
    }

    pub fn declare_if_absent(&mut self, name: Name, info: DeclInfo) {
        self.map.entry(name).or_insert(info);
    }

    pub fn resolve(&self, name: &Name) -> Option<&DeclInfo> {
        self.map.get(name)
    }

    /// Promote a module-scope value to topper status. Idempotent; the
    /// one controlled mutation point for topper state.
    pub fn promote_topper(&mut self, name: &Name) {
        if let Some(info) = self.map.get_mut(name) {
            info.topper = true;
        }
    }

    /// Promote a local to mutable-capture status, which changes how its
    /// declaration allocates storage. Must run before the declaring
    /// statement is lowered.
    pub fn promote_mutable_capture(&mut self, name: &Name) {
        if let Some(info) = self.map.get_mut(name) {
            info.mutable_capture = true;
        }
    }

    pub fn is_topper(&self, name: &Name) -> bool {
        self.resolve(name).is_some_and(|d| d.topper)
    }

    pub fn is_local(&self, name: &Name) -> bool {
        self.resolve(name).is_some_and(|d| d.local)
    }

    /// All topper entries in name order, for deterministic emission.
    pub fn toppers(&self) -> Vec<(&Name, &DeclInfo)> {
        let mut out: Vec<_> = self.map.iter().filter(|(_, d)| d.topper).collect();
        out.sort_by(|(a, _), (b, _)| a.cmp(b));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_idempotent_and_in_place() {
        let mut table = DeclTable::new();
        let name = Name::new("counter");
        table.declare(
            name.clone(),
            DeclInfo::new(DeclOrigin::Global, Span::dummy()).assignable(),
        );
        assert!(!table.is_topper(&name));
        table.promote_topper(&name);
        table.promote_topper(&name);
        let info = table.resolve(&name).unwrap();
        assert!(info.topper);
        assert!(!info.assign_once);
    }

    #[test]
    fn toppers_listed_in_name_order() {
        let mut table = DeclTable::new();
        for name in ["zeta", "alpha"] {
            table.declare(
                Name::new(name),
                DeclInfo::new(DeclOrigin::Global, Span::dummy()),
            );
            table.promote_topper(&Name::new(name));
        }
        let names: Vec<_> = table.toppers().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
