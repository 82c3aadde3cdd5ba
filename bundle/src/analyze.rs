//! Static import analysis
//!
//! Scans the entry-point script for import statements, resolves each
//! module name against the search paths and follows resolved script
//! modules transitively. Static scanning cannot see imports built from
//! strings at runtime, which is what the descriptor's `hidden_imports`
//! allow-list is for: those names are unioned into the result whether or
//! not any import statement mentions them.

use std::{
    collections::{BTreeSet, VecDeque},
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use regex::Regex;

use crate::descriptor::BundleDescriptor;
use crate::error::BundleError;

/// Extensions treated as native extension modules (collected as loose
/// binaries instead of going into the payload archive).
const NATIVE_EXTENSIONS: &[&str] = &["so", "pyd", "dll"];
const SCRIPT_EXTENSION: &str = "py";

/// Result of the analysis stage.
#[derive(Debug)]
pub struct ImportGraph {
    /// Script modules, archived into the payload
    pub pure: Vec<Module>,
    /// Native extension modules, collected as loose files
    pub native: Vec<Module>,
    /// Names that resolved nowhere; assumed provided by the host runtime
    pub externals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub path: PathBuf,
}

enum Resolved {
    Pure(PathBuf),
    Native(PathBuf),
    External,
}

pub fn analyze(
    descriptor: &BundleDescriptor,
) -> Result<ImportGraph, BundleError> {
    let entry = &descriptor.entry_point;
    let source =
        fs::read_to_string(entry).map_err(BundleError::io(entry))?;

    // The entry point's directory is the implicit first search path.
    let mut search_paths: Vec<PathBuf> = Vec::new();
    if let Some(parent) = entry.parent() {
        search_paths.push(parent.to_path_buf());
    }
    search_paths.extend(descriptor.search_paths.iter().cloned());

    let mut queue: VecDeque<String> = scan_imports(&source).into();
    queue.extend(descriptor.hidden_imports.iter().cloned());

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut pure = Vec::new();
    let mut native = Vec::new();
    let mut externals = Vec::new();

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        match resolve(&name, &search_paths) {
            Resolved::Pure(path) => {
                let text =
                    fs::read_to_string(&path).map_err(BundleError::io(&path))?;
                queue.extend(scan_imports(&text));
                pure.push(Module { name, path });
            }
            Resolved::Native(path) => {
                native.push(Module { name, path });
            }
            Resolved::External => {
                debug!("import {name} not found locally, assuming host-provided");
                externals.push(name);
            }
        }
    }

    // Deterministic ordering regardless of discovery order
    pure.sort_by(|a, b| a.name.cmp(&b.name));
    native.sort_by(|a, b| a.name.cmp(&b.name));
    externals.sort();

    Ok(ImportGraph {
        pure,
        native,
        externals,
    })
}

/// Extract imported module names from script source, line by line.
/// Handles `import a`, `import a, b`, `import a as x` and
/// `from a.b import c`.
pub(crate) fn scan_imports(source: &str) -> Vec<String> {
    let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").unwrap();
    let mut names = Vec::new();

    for raw in source.lines() {
        let line = raw.trim();
        let line = line.split('#').next().unwrap_or("");
        if let Some(rest) = line.strip_prefix("import ") {
            for part in rest.split(',') {
                let name = part
                    .trim()
                    .split_whitespace()
                    .next()
                    .unwrap_or("");
                if ident.is_match(name) {
                    names.push(name.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            let name = rest.split_whitespace().next().unwrap_or("");
            if ident.is_match(name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

// First match wins across search paths; within one path, a script beats
// a package marker beats a native extension.
fn resolve(name: &str, search_paths: &[PathBuf]) -> Resolved {
    let rel: PathBuf = name.split('.').collect();
    for base in search_paths {
        let stem = base.join(&rel);

        let script = stem.with_extension(SCRIPT_EXTENSION);
        if script.is_file() {
            return Resolved::Pure(script);
        }
        let package = stem.join("__init__.py");
        if package.is_file() {
            return Resolved::Pure(package);
        }
        for ext in NATIVE_EXTENSIONS {
            let native = stem.with_extension(ext);
            if native.is_file() {
                return Resolved::Native(native);
            }
        }
    }
    Resolved::External
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn descriptor(entry: &Path, hidden: &[&str]) -> BundleDescriptor {
        toml::from_str(&format!(
            r#"
            entry_point = "{}"
            hidden_imports = [{}]
            output_name = "out"
            "#,
            entry.display(),
            hidden
                .iter()
                .map(|h| format!("\"{h}\""))
                .collect::<Vec<_>>()
                .join(", "),
        ))
        .unwrap_or_else(|e| panic!("descriptor: {e}"))
    }

    #[test]
    fn test_scan_imports() {
        let names = scan_imports(
            "import os, sys\n\
             import usb.core as core  # runtime dep\n\
             from avr_isp.stk500v2 import Stk500v2\n\
             x = 1\n\
             # import commented_out\n",
        );
        assert_eq!(
            names,
            vec!["os", "sys", "usb.core", "avr_isp.stk500v2"]
        );
    }

    #[test]
    fn test_transitive_resolution() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), "import helper\nimport sys\n")
            .unwrap();
        fs::write(root.join("helper.py"), "import fast_crc\n").unwrap();
        fs::write(root.join("fast_crc.so"), b"\x7fELF").unwrap();

        let graph = analyze(&descriptor(&root.join("main.py"), &[])).unwrap();
        assert_eq!(graph.pure.len(), 1);
        assert_eq!(graph.pure[0].name, "helper");
        assert_eq!(graph.native.len(), 1);
        assert_eq!(graph.native[0].name, "fast_crc");
        assert_eq!(graph.externals, vec!["sys".to_string()]);
    }

    #[test]
    fn test_package_resolution() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("avr_isp")).unwrap();
        fs::write(root.join("avr_isp/__init__.py"), "").unwrap();
        fs::write(root.join("avr_isp/stk500v2.py"), "import struct\n")
            .unwrap();
        fs::write(
            root.join("main.py"),
            "from avr_isp.stk500v2 import Stk500v2\nimport avr_isp\n",
        )
        .unwrap();

        let graph = analyze(&descriptor(&root.join("main.py"), &[])).unwrap();
        let names: Vec<_> =
            graph.pure.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["avr_isp", "avr_isp.stk500v2"]);
    }

    #[test]
    fn test_hidden_import_forced() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), "print('hi')\n").unwrap();

        let graph =
            analyze(&descriptor(&root.join("main.py"), &["usb"])).unwrap();
        // nothing references "usb", it still lands in the graph
        assert_eq!(graph.externals, vec!["usb".to_string()]);
    }
}
