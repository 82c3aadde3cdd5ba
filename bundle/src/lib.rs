//! Self-contained application bundling
//!
//! Turns a script plus its dependencies into a shippable directory: a
//! bootstrap executable with an embedded, compressed payload of the
//! script modules, surrounded by the native libraries and data files it
//! needs at runtime (USB driver DLLs, icons, ...).
//!
//! The pipeline is linear and one-shot:
//!
//! 1. **Analyze**: walk the entry point's import graph and union in the
//!    descriptor's forced imports
//! 2. **Archive**: pack the pure modules into a deterministic tar.gz
//! 3. **Link**: frame the payload with launch flags, version metadata
//!    and icon into a bootstrap executable image
//! 4. **Collect**: lay out the executable and all loose files in the
//!    output directory
//!
//! Inputs are validated before anything is written; a failed build
//! leaves no partial bundle behind.

mod analyze;
mod collect;
mod descriptor;
mod error;
mod payload;
mod stub;

use std::path::Path;

use log::info;

pub use analyze::{ImportGraph, Module, analyze};
pub use collect::BundleReport;
pub use descriptor::{BundleDescriptor, ResourceEntry, VersionInfo};
pub use error::BundleError;
pub use payload::build_payload;
pub use stub::{
    BootstrapStub, FLAG_COMPRESSED, FLAG_CONSOLE, FLAG_STRIPPED, STUB_MAGIC,
};

/// Run the whole pipeline and collect the bundle under `out_parent`.
pub fn build_bundle(
    descriptor: &BundleDescriptor,
    out_parent: &Path,
) -> Result<BundleReport, BundleError> {
    descriptor.verify_inputs()?;

    info!("analyzing {}", descriptor.entry_point.display());
    let graph = analyze(descriptor)?;
    info!(
        "{} pure, {} native, {} host-provided modules",
        graph.pure.len(),
        graph.native.len(),
        graph.externals.len()
    );

    let payload = build_payload(
        &descriptor.entry_point,
        &graph,
        descriptor.compress,
    )?;
    let stub = BootstrapStub::link(descriptor, payload)?;
    collect::collect(descriptor, &graph, &stub, out_parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(root: &Path, extra: &str) -> BundleDescriptor {
        let manifest = format!(
            r#"
            entry_point = "{root}/installer.py"
            output_name = "installer"
            {extra}
            "#,
            root = root.display(),
        );
        toml::from_str(&manifest).unwrap()
    }

    fn seed_project(root: &Path) {
        fs::write(root.join("installer.py"), "import flasher\n").unwrap();
        fs::write(root.join("flasher.py"), "def run(): pass\n").unwrap();
    }

    #[test]
    fn test_full_pipeline() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        seed_project(root);
        fs::write(root.join("libusb0.dll"), b"MZ").unwrap();
        fs::write(root.join("ico.ico"), b"\x00\x00\x01\x00").unwrap();

        let descriptor = write_manifest(
            root,
            &format!(
                r#"
                hidden_imports = ["usb"]
                icon = "{root}/ico.ico"
                console = false

                [[binaries]]
                source = "{root}/libusb0.dll"

                [[datas]]
                source = "{root}/ico.ico"
                "#,
                root = root.display(),
            ),
        );

        let out = TempDir::new().unwrap();
        let report = build_bundle(&descriptor, out.path()).unwrap();

        assert_eq!(report.root, out.path().join("installer"));
        assert!(report.executable.exists());
        // one binary + one data next to the executable
        assert_eq!(report.files.len(), 2);
        assert!(report.root.join("libusb0.dll").exists());
        assert!(report.root.join("ico.ico").exists());

        let stub = BootstrapStub::decode(
            &fs::read(&report.executable).unwrap(),
        )
        .unwrap();
        assert!(!stub.console());
        assert_eq!(stub.icon, b"\x00\x00\x01\x00");

        // forced import is recorded in the payload manifest
        let payload = {
            use flate2::read::GzDecoder;
            use std::io::Read;
            let mut archive =
                tar::Archive::new(GzDecoder::new(&stub.payload[..]));
            let mut first = archive.entries().unwrap().next().unwrap().unwrap();
            let mut text = String::new();
            first.read_to_string(&mut text).unwrap();
            text
        };
        assert!(payload.contains("external usb"));
        assert!(payload.contains("pure flasher"));
    }

    #[test]
    fn test_missing_binary_fails_before_output() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        seed_project(root);

        let descriptor = write_manifest(
            root,
            &format!(
                r#"
                [[binaries]]
                source = "{root}/not-there.dll"
                "#,
                root = root.display(),
            ),
        );

        let out = TempDir::new().unwrap();
        let err = build_bundle(&descriptor, out.path()).unwrap_err();
        assert!(matches!(err, BundleError::MissingSource(_)));
        // fail-fast: nothing was written
        assert!(!out.path().join("installer").exists());
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        seed_project(root);
        let descriptor = write_manifest(root, "");

        let out_a = TempDir::new().unwrap();
        let out_b = TempDir::new().unwrap();
        let a = build_bundle(&descriptor, out_a.path()).unwrap();
        let b = build_bundle(&descriptor, out_b.path()).unwrap();
        assert_eq!(
            fs::read(&a.executable).unwrap(),
            fs::read(&b.executable).unwrap()
        );
    }

    #[test]
    fn test_duplicate_destination_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        seed_project(root);
        let sub = root.join("other");
        fs::create_dir(&sub).unwrap();
        fs::write(root.join("driver.dll"), b"first").unwrap();
        fs::write(sub.join("driver.dll"), b"second").unwrap();

        let descriptor = write_manifest(
            root,
            &format!(
                r#"
                [[binaries]]
                source = "{root}/driver.dll"

                [[binaries]]
                source = "{root}/other/driver.dll"
                "#,
                root = root.display(),
            ),
        );

        let out = TempDir::new().unwrap();
        let report = build_bundle(&descriptor, out.path()).unwrap();
        assert_eq!(
            fs::read(report.root.join("driver.dll")).unwrap(),
            b"second"
        );
    }
}
