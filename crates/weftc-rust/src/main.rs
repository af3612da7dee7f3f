//! The Weft Rust backend driver.
//!
//! Reads a frontend-produced IR library from JSON, translates it to a
//! cargo crate, and optionally invokes cargo to build it or run its
//! tests, converting cargo's textual test output into a structured
//! JSON report.

mod manifest;
mod report;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as Process, ExitCode};

use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use weft_ir::IrLibrary;
use weft_rustgen::{translate_library, LibraryOutput};

#[derive(Parser)]
#[command(name = "weftc-rust", about = "Weft to Rust backend driver", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate an IR library to a cargo crate on disk.
    Translate {
        /// Path to the IR library JSON.
        ir: PathBuf,
        /// Output directory for the emitted crate.
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Translate and run `cargo build` on the emitted crate.
    Build {
        ir: PathBuf,
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Translate, run `cargo test`, and report structured results.
    Test {
        ir: PathBuf,
        #[arg(long, default_value = "out")]
        out: PathBuf,
        /// Where to write the JSON report; stdout when omitted.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    match cli.command {
        Command::Translate { ir, out } => {
            let output = translate(&ir)?;
            write_crate(&output, &out)?;
            info!(files = output.files.len(), "emitted crate to {}", out.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Build { ir, out } => {
            let output = translate(&ir)?;
            write_crate(&output, &out)?;
            let (status, _stdout) = run_cargo(&out, "build")?;
            Ok(if status {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Test { ir, out, report } => {
            let output = translate(&ir)?;
            write_crate(&output, &out)?;
            let (status, stdout) = run_cargo(&out, "test")?;
            let parsed = report::parse_cargo_test_output(&stdout)
                .ok_or("cargo test output did not contain a consistent test report")?;
            let json = serde_json::to_string_pretty(&parsed)
                .map_err(|e| format!("serializing report: {e}"))?;
            match report {
                Some(path) => fs::write(&path, json)
                    .map_err(|e| format!("writing {}: {e}", path.display()))?,
                None => println!("{json}"),
            }
            Ok(if status && parsed.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn translate(ir_path: &Path) -> Result<LibraryOutput, String> {
    let text = fs::read_to_string(ir_path)
        .map_err(|e| format!("reading {}: {e}", ir_path.display()))?;
    let library: IrLibrary =
        serde_json::from_str(&text).map_err(|e| format!("parsing {}: {e}", ir_path.display()))?;
    translate_library(&library).map_err(|e| format!("translating {}: {e}", library.meta.name))
}

/// Write the emitted file set plus its manifest under `out`.
fn write_crate(output: &LibraryOutput, out: &Path) -> Result<(), String> {
    for file in &output.files {
        let path = out.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("creating {}: {e}", parent.display()))?;
        }
        fs::write(&path, &file.content)
            .map_err(|e| format!("writing {}: {e}", path.display()))?;
        debug!(path = %path.display(), "wrote");
    }
    let manifest_path = out.join("Cargo.toml");
    fs::write(&manifest_path, manifest::render_manifest(output))
        .map_err(|e| format!("writing {}: {e}", manifest_path.display()))?;
    Ok(())
}

/// Run a cargo subcommand in the emitted crate, capturing stdout.
fn run_cargo(dir: &Path, subcommand: &str) -> Result<(bool, String), String> {
    info!(subcommand, dir = %dir.display(), "running cargo");
    let output = Process::new("cargo")
        .arg(subcommand)
        .current_dir(dir)
        .output()
        .map_err(|e| format!("running cargo {subcommand}: {e}"))?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    Ok((output.status.success(), stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weft_common::Span;
    use weft_ir::{IrModule, PackageMeta};

    fn library() -> IrLibrary {
        IrLibrary {
            meta: PackageMeta {
                name: "demo".into(),
                version: "0.1.0".into(),
                license: None,
                authors: vec![],
                description: None,
            },
            modules: vec![IrModule {
                name: String::new(),
                src_path: vec![],
                imports: vec![],
                top_levels: vec![],
                span: Span::dummy(),
            }],
            type_facts: BTreeMap::new(),
        }
    }

    #[test]
    fn writes_crate_layout() {
        let output = translate_library(&library()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        write_crate(&output, dir.path()).unwrap();
        assert!(dir.path().join("Cargo.toml").exists());
        assert!(dir.path().join("src/lib.rs").exists());
        assert!(dir.path().join("src/main.rs").exists());
        assert!(dir.path().join("src/root.rs").exists());
    }

    #[test]
    fn translate_round_trips_through_json() {
        let json = serde_json::to_string(&library()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let ir_path = dir.path().join("demo.json");
        fs::write(&ir_path, json).unwrap();
        let output = translate(&ir_path).unwrap();
        assert_eq!(output.package.name, "demo");
    }
}
