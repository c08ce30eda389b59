//! Style reference input of a generation request

use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// Where the engine reads the style reference image from
#[derive(Debug)]
pub enum StyleReference {
    /// Catalog image; owned by the catalog, never deleted
    Catalog(PathBuf),
    /// Decoded custom reference, deleted when dropped
    Custom(TempReference),
}

impl StyleReference {
    pub fn path(&self) -> &Path {
        match self {
            Self::Catalog(path) => path,
            Self::Custom(temp) => temp.path(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

/// Uniquely named temporary reference image.
///
/// The file is removed when this value drops: after success, after an
/// error, and when the owning task is aborted.
#[derive(Debug)]
pub struct TempReference {
    path: Option<TempPath>,
}

impl TempReference {
    pub fn new(path: TempPath) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> &Path {
        match &self.path {
            Some(path) => path,
            None => Path::new(""),
        }
    }
}

impl Drop for TempReference {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };

        let removed = path.to_path_buf();
        match path.close() {
            Ok(()) => debug!(path = %removed.display(), "Removed temporary reference image"),
            Err(e) => warn!(
                path = %removed.display(),
                error = %e,
                "Failed to remove temporary reference image"
            ),
        }
    }
}
