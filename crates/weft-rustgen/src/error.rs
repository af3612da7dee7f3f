//! Translation errors.

use std::fmt;

use weft_common::Span;

/// A fatal translation error; aborts the enclosing module.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateError {
    pub kind: TranslateErrorKind,
    pub span: Span,
}

impl TranslateError {
    pub fn new(kind: TranslateErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// An IR shape with no defined lowering.
    pub fn unsupported(what: impl Into<String>, span: Span) -> Self {
        Self::new(TranslateErrorKind::UnsupportedConstruct(what.into()), span)
    }

    /// An internal consistency failure: a bug in an earlier pass, not a
    /// user-facing condition.
    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        Self::new(TranslateErrorKind::Internal(message.into()), span)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranslateErrorKind {
    /// An IR construct the backend does not lower.
    UnsupportedConstruct(String),
    /// Malformed capture, visibility, or pattern state left by an
    /// earlier pass.
    Internal(String),
    /// The library's intra-module imports form a cycle.
    DependencyCycle(String),
}

impl fmt::Display for TranslateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedConstruct(what) => {
                write!(f, "unsupported construct: {what}")
            }
            Self::Internal(message) => write!(f, "internal translation error: {message}"),
            Self::DependencyCycle(path) => write!(f, "module dependency cycle: {path}"),
        }
    }
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}

impl std::error::Error for TranslateError {}

/// Result of lowering a single expression or statement.
///
/// `NeverRef` is not an error: it interrupts the current statement when
/// a reference to a never-typed value is encountered, and the statement
/// is dropped. Everything else is fatal for the module.
#[derive(Debug)]
pub enum LowerInterrupt {
    /// A direct reference to a value of the uninhabited type; the
    /// target cannot express it, so the referencing statement is
    /// omitted.
    NeverRef,
    Fatal(TranslateError),
}

impl From<TranslateError> for LowerInterrupt {
    fn from(error: TranslateError) -> Self {
        LowerInterrupt::Fatal(error)
    }
}

pub type Lower<T> = Result<T, LowerInterrupt>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_span() {
        let err = TranslateError::unsupported("yield statement", Span::new(3, 9));
        assert_eq!(
            err.to_string(),
            "unsupported construct: yield statement at 3..9"
        );
    }

    #[test]
    fn fatal_conversion() {
        let err = TranslateError::internal("pattern is not a simple name", Span::dummy());
        let interrupt: LowerInterrupt = err.clone().into();
        assert!(matches!(interrupt, LowerInterrupt::Fatal(e) if e == err));
    }
}
