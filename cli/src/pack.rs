use std::path::{Path, PathBuf};

use bundle::{BundleDescriptor, build_bundle};

use crate::CliError;

pub(crate) fn build_bundle_cmd(manifest: &PathBuf) -> Result<(), CliError> {
    let descriptor = BundleDescriptor::from_path(manifest)?;
    let report = build_bundle(&descriptor, Path::new("."))?;

    println!("Bundle: {}", report.root.display());
    println!("  executable: {}", report.executable.display());
    for file in &report.files {
        println!("  {}", file.display());
    }
    Ok(())
}
