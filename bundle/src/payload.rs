//! Payload archive
//!
//! Serializes the entry point and every pure module into a single
//! gzip-compressed tar blob. The archive is deterministic: members are
//! written in a fixed order with zeroed timestamps and ownership, so an
//! unchanged descriptor and unchanged inputs rebuild byte-identically.
//!
//! The first member is a `MANIFEST` listing every module the analysis
//! settled on, including forced hidden imports that resolved nowhere.
//! That record shows they were not silently dropped.

use std::{fmt::Write as _, fs, path::Path};

use flate2::{Compression, write::GzEncoder};

use crate::analyze::ImportGraph;
use crate::error::BundleError;

pub(crate) const MANIFEST_NAME: &str = "MANIFEST";

pub fn build_payload(
    entry_point: &Path,
    graph: &ImportGraph,
    compress_harder: bool,
) -> Result<Vec<u8>, BundleError> {
    let level = if compress_harder {
        Compression::best()
    } else {
        Compression::default()
    };
    let gz = GzEncoder::new(Vec::new(), level);
    let mut builder = tar::Builder::new(gz);

    append_member(
        &mut builder,
        MANIFEST_NAME,
        manifest_text(entry_point, graph).as_bytes(),
    )?;

    let entry_name = entry_point
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "__main__.py".to_string());
    let entry_data =
        fs::read(entry_point).map_err(BundleError::io(entry_point))?;
    append_member(&mut builder, &entry_name, &entry_data)?;

    for module in &graph.pure {
        let data =
            fs::read(&module.path).map_err(BundleError::io(&module.path))?;
        let archive_path = format!(
            "{}.py",
            module.name.replace('.', "/")
        );
        append_member(&mut builder, &archive_path, &data)?;
    }

    let gz = builder
        .into_inner()
        .map_err(BundleError::io(entry_point))?;
    gz.finish().map_err(BundleError::io(entry_point))
}

fn manifest_text(entry_point: &Path, graph: &ImportGraph) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "entry {}", entry_point.display());
    for module in &graph.pure {
        let _ = writeln!(text, "pure {}", module.name);
    }
    for module in &graph.native {
        let _ = writeln!(text, "native {}", module.name);
    }
    for name in &graph.externals {
        let _ = writeln!(text, "external {}", name);
    }
    text
}

fn append_member<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
) -> Result<(), BundleError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .map_err(BundleError::io(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::Module;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_archive(payload: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(GzDecoder::new(payload));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name =
                    entry.path().unwrap().to_string_lossy().into_owned();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (name, data)
            })
            .collect()
    }

    #[test]
    fn test_payload_members_and_manifest() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), "import helper\n").unwrap();
        fs::write(root.join("helper.py"), "x = 1\n").unwrap();

        let graph = ImportGraph {
            pure: vec![Module {
                name: "helper".into(),
                path: root.join("helper.py"),
            }],
            native: vec![],
            externals: vec!["usb".into()],
        };
        let payload =
            build_payload(&root.join("main.py"), &graph, false).unwrap();
        let members = read_archive(&payload);

        assert_eq!(members[0].0, MANIFEST_NAME);
        let manifest = String::from_utf8(members[0].1.clone()).unwrap();
        assert!(manifest.contains("pure helper"));
        // forced/unresolved imports still appear (never silently dropped)
        assert!(manifest.contains("external usb"));

        assert_eq!(members[1].0, "main.py");
        assert_eq!(members[2].0, "helper.py");
        assert_eq!(members[2].1, b"x = 1\n");
    }

    #[test]
    fn test_payload_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("main.py"), "print('hi')\n").unwrap();
        let graph = ImportGraph {
            pure: vec![],
            native: vec![],
            externals: vec![],
        };
        let a = build_payload(&root.join("main.py"), &graph, true).unwrap();
        let b = build_payload(&root.join("main.py"), &graph, true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dotted_module_path() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("pkg")).unwrap();
        fs::write(root.join("main.py"), "").unwrap();
        fs::write(root.join("pkg/mod.py"), "y = 2\n").unwrap();

        let graph = ImportGraph {
            pure: vec![Module {
                name: "pkg.mod".into(),
                path: root.join("pkg/mod.py"),
            }],
            native: vec![],
            externals: vec![],
        };
        let payload =
            build_payload(&root.join("main.py"), &graph, false).unwrap();
        let members = read_archive(&payload);
        assert!(members.iter().any(|(name, _)| name == "pkg/mod.py"));
    }
}
