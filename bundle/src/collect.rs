//! Collection
//!
//! The terminal pipeline stage: create the output directory named for
//! distribution and place the linked executable, every declared binary
//! and data resource, and every native module discovered by analysis
//! into it. Duplicate destinations are allowed; the last write wins.

use std::{fs, path::{Path, PathBuf}};

use log::info;

use crate::analyze::ImportGraph;
use crate::descriptor::{BundleDescriptor, ResourceEntry};
use crate::error::BundleError;
use crate::stub::BootstrapStub;

/// What the pipeline produced.
#[derive(Debug)]
pub struct BundleReport {
    /// The collected output directory
    pub root: PathBuf,
    pub executable: PathBuf,
    /// Every file placed next to the executable
    pub files: Vec<PathBuf>,
}

pub fn collect(
    descriptor: &BundleDescriptor,
    graph: &ImportGraph,
    stub: &BootstrapStub,
    out_parent: &Path,
) -> Result<BundleReport, BundleError> {
    let root = out_parent.join(&descriptor.output_name);
    fs::create_dir_all(&root).map_err(BundleError::io(&root))?;

    let executable = root.join(exe_name(&descriptor.output_name));
    stub.write_to(&executable)?;
    info!("linked executable: {}", executable.display());

    let mut files = Vec::new();

    // native modules discovered by analysis land at the bundle root
    for module in &graph.native {
        files.push(copy_into(&module.path, &root, true)?);
    }

    for entry in &descriptor.binaries {
        files.push(place_entry(entry, &root, true)?);
    }
    for entry in &descriptor.datas {
        // datas are copied verbatim, never marked executable
        files.push(place_entry(entry, &root, false)?);
    }

    info!(
        "collected {} files into {}",
        files.len() + 1,
        root.display()
    );
    Ok(BundleReport {
        root,
        executable,
        files,
    })
}

fn place_entry(
    entry: &ResourceEntry,
    root: &Path,
    executable: bool,
) -> Result<PathBuf, BundleError> {
    let dest_dir = if entry.dest == Path::new(".") {
        root.to_path_buf()
    } else {
        root.join(&entry.dest)
    };
    fs::create_dir_all(&dest_dir).map_err(BundleError::io(&dest_dir))?;
    copy_into(&entry.source, &dest_dir, executable)
}

fn copy_into(
    source: &Path,
    dest_dir: &Path,
    executable: bool,
) -> Result<PathBuf, BundleError> {
    let file_name =
        source.file_name().ok_or_else(|| {
            BundleError::MissingSource(source.to_path_buf())
        })?;
    let dest = dest_dir.join(file_name);
    fs::copy(source, &dest).map_err(BundleError::io(source))?;
    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))
            .map_err(BundleError::io(&dest))?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    Ok(dest)
}

fn exe_name(output_name: &str) -> String {
    if cfg!(windows) {
        format!("{output_name}.exe")
    } else {
        output_name.to_string()
    }
}
