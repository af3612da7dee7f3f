//! Cargo manifest emission for generated crates.
//!
//! The assembler reports package metadata and discovered cross-library
//! dependencies; this turns them into the emitted crate's `Cargo.toml`.
//! Sibling Weft libraries are path dependencies pinned to exact
//! versions, and the runtime support crate is always present.

use semver::Version;
use toml::value::{Array, Table, Value};
use tracing::warn;
use weft_rustgen::LibraryOutput;

/// The runtime support crate every emitted crate links against.
const CORE_DEP: &str = "weft-core";
const CORE_VERSION: &str = "0.1.0";

/// Render the `Cargo.toml` for an emitted library.
pub fn render_manifest(output: &LibraryOutput) -> String {
    let meta = &output.package;
    let version = match Version::parse(&meta.version) {
        Ok(version) => version.to_string(),
        Err(_) => {
            warn!(version = %meta.version, "library version is not semver; emitting as-is");
            meta.version.clone()
        }
    };

    let mut package = Table::new();
    package.insert("name".into(), Value::String(meta.name.clone()));
    package.insert("version".into(), Value::String(version));
    package.insert("edition".into(), Value::String("2021".into()));
    if let Some(license) = &meta.license {
        package.insert("license".into(), Value::String(license.clone()));
    }
    if let Some(description) = &meta.description {
        package.insert("description".into(), Value::String(description.clone()));
    }
    if !meta.authors.is_empty() {
        let authors: Array = meta
            .authors
            .iter()
            .map(|a| Value::String(a.clone()))
            .collect();
        package.insert("authors".into(), Value::Array(authors));
    }

    let mut dependencies = Table::new();
    dependencies.insert(CORE_DEP.into(), dep_entry(CORE_DEP, CORE_VERSION, &[]));
    for dep in &output.deps {
        dependencies.insert(
            dep.library.clone(),
            dep_entry(&dep.library, &dep.version, &dep.features),
        );
    }

    let mut root = Table::new();
    root.insert("package".into(), Value::Table(package));
    root.insert("dependencies".into(), Value::Table(dependencies));
    toml::to_string(&Value::Table(root)).expect("manifest tables serialize")
}

fn dep_entry(library: &str, version: &str, features: &[String]) -> Value {
    let mut entry = Table::new();
    entry.insert("path".into(), Value::String(format!("../{library}")));
    entry.insert("version".into(), Value::String(format!("={version}")));
    if !features.is_empty() {
        let features: Array = features.iter().map(|f| Value::String(f.clone())).collect();
        entry.insert("features".into(), Value::Array(features));
    }
    Value::Table(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_ir::PackageMeta;
    use weft_rustgen::DepReport;

    fn output() -> LibraryOutput {
        LibraryOutput {
            package: PackageMeta {
                name: "geo-shapes".into(),
                version: "1.2.0".into(),
                license: Some("Apache-2.0".into()),
                authors: vec!["Weft Authors".into()],
                description: Some("shape utilities".into()),
            },
            files: vec![],
            deps: vec![DepReport {
                library: "weft-std".into(),
                version: "0.3.0".into(),
                features: vec!["text".into()],
            }],
        }
    }

    #[test]
    fn renders_package_and_dependencies() {
        let manifest = render_manifest(&output());
        assert!(manifest.contains("[package]"));
        assert!(manifest.contains("name = \"geo-shapes\""));
        assert!(manifest.contains("version = \"1.2.0\""));
        assert!(manifest.contains("license = \"Apache-2.0\""));
        assert!(manifest.contains("authors = [\"Weft Authors\"]"));
        // The runtime crate is always a dependency.
        assert!(manifest.contains("[dependencies.weft-core]"));
        assert!(manifest.contains("path = \"../weft-core\""));
        // Cross-library deps pin exact versions and carry features.
        assert!(manifest.contains("[dependencies.weft-std]"));
        assert!(manifest.contains("version = \"=0.3.0\""));
        assert!(manifest.contains("features = [\"text\"]"));
    }
}
