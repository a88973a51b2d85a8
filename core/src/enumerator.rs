use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions recognised when no explicit list is configured.
pub const DEFAULT_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "bmp"];

/// One image discovered during an enumeration pass.
///
/// The ordinal is 1-based traversal order and only feeds progress output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub path: PathBuf,
    pub ordinal: usize,
}

impl ImageRef {
    pub fn new(path: PathBuf, ordinal: usize) -> Self {
        Self { path, ordinal }
    }
}

pub fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// Recursively lists image files below `root` in file-name order.
///
/// Entries that cannot be read below the root are skipped; the root itself
/// must exist, be a directory, and be listable.
pub fn enumerate_images(
    root: &Path,
    extensions: &[String],
) -> Result<Vec<ImageRef>, EnumerationError> {
    check_root(root)?;

    let mut images = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && has_image_extension(path, extensions) {
                    images.push(ImageRef::new(path.to_path_buf(), images.len() + 1));
                }
            }
            Err(error) => {
                tracing::debug!(%error, "skipping unreadable entry");
            }
        }
    }
    Ok(images)
}

pub fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_lowercase();
            extensions
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(&lower))
        })
        .unwrap_or(false)
}

fn check_root(root: &Path) -> Result<(), EnumerationError> {
    let metadata = fs::metadata(root).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            EnumerationError::Missing(root.to_path_buf())
        } else {
            EnumerationError::Unreadable {
                source,
                path: root.to_path_buf(),
            }
        }
    })?;
    if !metadata.is_dir() {
        return Err(EnumerationError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|source| EnumerationError::Unreadable {
        source,
        path: root.to_path_buf(),
    })?;
    Ok(())
}

/// Raised when a whole image root cannot be listed.
#[derive(Debug)]
pub enum EnumerationError {
    Missing(PathBuf),
    NotADirectory(PathBuf),
    Unreadable {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Display for EnumerationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "image root {} does not exist", path.display()),
            Self::NotADirectory(path) => {
                write!(f, "image root {} is not a directory", path.display())
            }
            Self::Unreadable { source, path } => {
                write!(f, "cannot read image root {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for EnumerationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unreadable { source, .. } => Some(source),
            _ => None,
        }
    }
}
