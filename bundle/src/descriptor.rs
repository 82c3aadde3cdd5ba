//! Bundle descriptor
//!
//! A TOML manifest declaring everything the packaging pipeline needs:
//! the entry-point script, import search paths, loose binary and data
//! resources, forced imports the static scan cannot see, executable
//! metadata and output naming.
//!
//! ```toml
//! entry_point = "src/firmware_installer.py"
//! search_paths = ["src"]
//! hidden_imports = ["usb"]
//! output_name = "firmwareInstaller"
//! console = false
//! upx = true
//!
//! [[binaries]]
//! source = "drivers/libusb0.dll"
//!
//! [[datas]]
//! source = "ico.ico"
//! ```

use std::{fs, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use crate::error::BundleError;

#[derive(Debug, Deserialize)]
pub struct BundleDescriptor {
    /// Script whose import graph seeds the packaging
    pub entry_point: PathBuf,
    /// Directories used to resolve unqualified imports, in order.
    /// The entry point's own directory is always searched first.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    /// Native libraries and driver files copied verbatim into the bundle
    #[serde(default)]
    pub binaries: Vec<ResourceEntry>,
    /// Non-binary assets; never stripped or marked executable
    #[serde(default)]
    pub datas: Vec<ResourceEntry>,
    /// Modules force-included even when no import statement names them
    #[serde(default)]
    pub hidden_imports: Vec<String>,
    /// Version metadata embedded into the executable
    pub version_info: Option<PathBuf>,
    /// Icon embedded into the executable
    pub icon: Option<PathBuf>,
    /// Whether the produced executable attaches a console on launch
    #[serde(default = "default_console")]
    pub console: bool,
    #[serde(default)]
    pub strip: bool,
    #[serde(default, alias = "upx")]
    pub compress: bool,
    /// Name of both the executable and the collected output directory
    pub output_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceEntry {
    pub source: PathBuf,
    /// Destination directory relative to the bundle root; `"."` is the
    /// root itself.
    #[serde(default = "default_dest")]
    pub dest: PathBuf,
}

fn default_console() -> bool {
    true
}

fn default_dest() -> PathBuf {
    PathBuf::from(".")
}

impl BundleDescriptor {
    /// Load a descriptor from a TOML manifest. Relative paths inside the
    /// manifest are interpreted against the current working directory.
    pub fn from_path(path: &Path) -> Result<Self, BundleError> {
        let text =
            fs::read_to_string(path).map_err(BundleError::io(path))?;
        Ok(toml::from_str(&text)?)
    }

    /// Fail-fast input validation: every declared source path must exist
    /// before the pipeline writes anything, so a broken descriptor never
    /// produces a partial bundle.
    pub fn verify_inputs(&self) -> Result<(), BundleError> {
        let mut required: Vec<&Path> = vec![&self.entry_point];
        if let Some(icon) = &self.icon {
            required.push(icon);
        }
        if let Some(version_info) = &self.version_info {
            required.push(version_info);
        }
        required.extend(self.binaries.iter().map(|e| e.source.as_path()));
        required.extend(self.datas.iter().map(|e| e.source.as_path()));

        for path in required {
            if !path.exists() {
                return Err(BundleError::MissingSource(path.to_path_buf()));
            }
        }
        Ok(())
    }
}

/// Version/product metadata embedded into the bootstrap executable.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub file_version: String,
    #[serde(default)]
    pub product_version: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub description: String,
}

impl VersionInfo {
    pub fn from_path(path: &Path) -> Result<Self, BundleError> {
        let text =
            fs::read_to_string(path).map_err(BundleError::io(path))?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_manifest() {
        let descriptor: BundleDescriptor = toml::from_str(
            r#"
            entry_point = "installer.py"
            output_name = "installer"
            "#,
        )
        .unwrap();
        assert!(descriptor.console);
        assert!(!descriptor.compress);
        assert!(descriptor.binaries.is_empty());
        assert!(descriptor.search_paths.is_empty());
    }

    #[test]
    fn test_upx_alias_and_dest_default() {
        let descriptor: BundleDescriptor = toml::from_str(
            r#"
            entry_point = "installer.py"
            output_name = "installer"
            console = false
            upx = true

            [[binaries]]
            source = "drivers/libusb0.dll"

            [[binaries]]
            source = "drivers/ftd2xx.dll"
            dest = "drivers"
            "#,
        )
        .unwrap();
        assert!(descriptor.compress);
        assert!(!descriptor.console);
        assert_eq!(descriptor.binaries[0].dest, PathBuf::from("."));
        assert_eq!(descriptor.binaries[1].dest, PathBuf::from("drivers"));
    }

    #[test]
    fn test_verify_inputs_missing() {
        let descriptor: BundleDescriptor = toml::from_str(
            r#"
            entry_point = "/nonexistent/installer.py"
            output_name = "installer"
            "#,
        )
        .unwrap();
        match descriptor.verify_inputs() {
            Err(BundleError::MissingSource(path)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/installer.py"));
            }
            other => panic!("expected MissingSource, got {other:?}"),
        }
    }
}
