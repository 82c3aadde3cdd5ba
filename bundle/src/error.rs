use std::{io, path::PathBuf};

#[derive(Debug)]
pub enum BundleError {
    Io { path: PathBuf, source: io::Error },
    Descriptor(toml::de::Error),
    /// A declared source path does not exist at build time
    MissingSource(PathBuf),
    InvalidStub,
}

impl BundleError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| BundleError::Io { path, source }
    }
}

impl std::error::Error for BundleError {}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            BundleError::Descriptor(err) => {
                write!(f, "invalid bundle descriptor: {err}")
            }
            BundleError::MissingSource(path) => {
                write!(f, "missing source file: {}", path.display())
            }
            BundleError::InvalidStub => {
                write!(f, "not a bootstrap stub (bad magic or framing)")
            }
        }
    }
}

impl From<toml::de::Error> for BundleError {
    fn from(err: toml::de::Error) -> Self {
        BundleError::Descriptor(err)
    }
}
