//! The Weft-to-Rust translation backend.
//!
//! Lowers the frontend's typed IR into a Rust AST, choosing concrete
//! representations for everything the IR leaves polymorphic:
//! nullability becomes `Option`, fallibility becomes
//! `weft_core::Result`, interface dispatch becomes shared trait-object
//! wrappers, mutable closure captures become `Arc<RwLock<..>>` handles,
//! and module-scope state becomes lazily-initialized singletons.
//!
//! The entry point is [`translate_library`]; per-module translation is
//! driven by [`Translator`].

mod classes;
mod closures;
pub mod decls;
pub mod describe;
pub mod error;
mod lower;
pub mod names;
pub mod support;
pub mod types;
mod wrap;

pub mod assemble;

pub use assemble::{translate_library, translate_module, DepReport, EmittedFile, LibraryOutput};
pub use error::{TranslateError, TranslateErrorKind};
pub use lower::Translator;
