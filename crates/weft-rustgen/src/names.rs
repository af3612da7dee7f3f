//! IR name to Rust identifier and path translation.

use weft_common::ident::{camel_to_shout, camel_to_snake, dash_to_snake, escape_ident};
use weft_ir::{ImportSource, Name};
use weft_rust_ast::Path;

use crate::decls::ImportInfo;

/// Snake-case value identifier (locals, functions, fields).
pub fn value_name(name: &Name) -> String {
    escape_ident(&camel_to_snake(name.as_str()))
}

/// Type identifier; Weft type names are already PascalCase.
pub fn type_name(name: &Name) -> String {
    escape_ident(name.as_str())
}

/// SCREAMING_SNAKE identifier for topper storage cells.
pub fn shout_name(name: &Name) -> String {
    escape_ident(&camel_to_shout(name.as_str()))
}

/// Storage cell name for a static member: `TYPE__MEMBER`.
pub fn static_member_cell(type_name: &Name, member: &Name) -> String {
    format!(
        "{}__{}",
        camel_to_shout(type_name.as_str()),
        camel_to_shout(member.as_str())
    )
}

/// Accessor name for a static member: `type__member`.
pub fn static_member_accessor(type_name: &Name, member: &Name) -> String {
    format!(
        "{}__{}",
        camel_to_snake(type_name.as_str()),
        camel_to_snake(member.as_str())
    )
}

/// Rust module path segments for a dotted IR module name.
pub fn module_segments(module: &str) -> Vec<String> {
    if module.is_empty() {
        return vec!["root".to_string()];
    }
    module
        .split('.')
        .map(|seg| escape_ident(&dash_to_snake(seg)))
        .collect()
}

/// The crate-relative source file path for a module's segments.
///
/// The library root module lands in `src/root.rs`; everything else in
/// `src/<segments>/mod.rs`.
pub fn src_file_path(src_path: &[String]) -> String {
    if src_path.is_empty() {
        return "src/root.rs".to_string();
    }
    let mut parts = vec!["src".to_string()];
    parts.extend(src_path.iter().map(|seg| dash_to_snake(seg)));
    parts.push("mod.rs".to_string());
    parts.join("/")
}

/// Crate name for a Weft library name (`geo-shapes` -> `geo_shapes`).
pub fn crate_name(library: &str) -> String {
    dash_to_snake(library)
}

/// Path to an imported name from the current module.
pub fn import_path(info: &ImportInfo, styled_name: String) -> Path {
    let mut segments = match &info.source {
        ImportSource::SameLibrary { module } => {
            let mut segs = vec!["crate".to_string()];
            segs.extend(module_segments(module));
            segs
        }
        ImportSource::External {
            library, module, ..
        } => {
            let mut segs = vec![crate_name(library)];
            segs.extend(module_segments(module));
            segs
        }
    };
    segments.push(styled_name);
    Path::new(segments)
}
