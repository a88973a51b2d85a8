use crate::reporting::MANIFEST_FILE;
use crate::selection::RankedCandidate;
use indicatif::ProgressBar;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// Scale applied to an average before it is written into a file name.
const DISTANCE_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedFile {
    pub rank: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializeStats {
    pub copied: Vec<MaterializedFile>,
    pub failed: usize,
    /// Ranked files of an earlier run removed from the directory.
    pub removed: usize,
}

/// Output directory for one backend/model combination below `output_root`.
pub fn namespaced_output_dir(output_root: &Path, backend: &str, model: &str) -> PathBuf {
    output_root.join(format!("best-{}-{}", sanitize_tag(backend), sanitize_tag(model)))
}

/// File name encoding the 1-based rank and the scaled average distance.
///
/// Zero padding keeps lexical directory order equal to rank order.
pub fn ranked_file_name(rank: usize, candidate: &RankedCandidate) -> String {
    let scaled = (candidate.average * DISTANCE_SCALE).floor().max(0.0) as u64;
    let mut name = format!("{:05}_{:04}", rank, scaled);
    if let Some(extension) = candidate.path.extension().and_then(|ext| ext.to_str()) {
        name.push('.');
        name.push_str(&extension.to_lowercase());
    }
    name
}

/// Copies the selected candidates into `output_dir` in rank order.
///
/// The directory is created when absent; failing that is fatal. Ranked files
/// and the manifest left by an earlier run are removed first, so the listing
/// only ever holds one ranking; other files are left alone. A file that
/// cannot be copied is logged and counted, and the remaining files are still
/// delivered.
pub fn materialize(
    ranked: &[RankedCandidate],
    output_dir: &Path,
    progress: &ProgressBar,
) -> Result<MaterializeStats, MaterializeError> {
    fs::create_dir_all(output_dir).map_err(|source| MaterializeError::CreateDirectory {
        source,
        path: output_dir.to_path_buf(),
    })?;
    let removed = clear_previous_ranking(output_dir)?;
    if removed > 0 {
        tracing::info!(removed, dir = %output_dir.display(), "removed previous ranking");
    }

    progress.set_length(ranked.len() as u64);
    progress.set_position(0);

    let mut stats = MaterializeStats {
        removed,
        ..MaterializeStats::default()
    };
    for (index, candidate) in ranked.iter().enumerate() {
        let rank = index + 1;
        let destination = output_dir.join(ranked_file_name(rank, candidate));
        match fs::copy(&candidate.path, &destination) {
            Ok(_) => {
                progress.set_message(format!("Copied: {}", destination.display()));
                stats.copied.push(MaterializedFile {
                    rank,
                    source: candidate.path.clone(),
                    destination,
                });
            }
            Err(source) => {
                let error = MaterializeError::Copy {
                    source,
                    path: candidate.path.clone(),
                };
                tracing::warn!(%error, rank, "skipping selected file");
                stats.failed += 1;
            }
        }
        progress.inc(1);
    }

    progress.finish_with_message("File copying complete");
    Ok(stats)
}

fn clear_previous_ranking(output_dir: &Path) -> Result<usize, MaterializeError> {
    let clear_error = |source, path: &Path| MaterializeError::ClearPrevious {
        source,
        path: path.to_path_buf(),
    };
    let mut removed = 0;
    for entry in fs::read_dir(output_dir).map_err(|source| clear_error(source, output_dir))? {
        let entry = entry.map_err(|source| clear_error(source, output_dir))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_ranked_file_name(name) {
            fs::remove_file(&path).map_err(|source| clear_error(source, &path))?;
            removed += 1;
        } else if name == MANIFEST_FILE {
            fs::remove_file(&path).map_err(|source| clear_error(source, &path))?;
        }
    }
    Ok(removed)
}

/// Matches names produced by [`ranked_file_name`].
fn is_ranked_file_name(name: &str) -> bool {
    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    let Some((rank, distance)) = stem.split_once('_') else {
        return false;
    };
    let digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    rank.len() >= 5 && distance.len() >= 4 && digits(rank) && digits(distance)
}

fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        String::from("default")
    } else {
        cleaned
    }
}

#[derive(Debug)]
pub enum MaterializeError {
    CreateDirectory {
        source: std::io::Error,
        path: PathBuf,
    },
    ClearPrevious {
        source: std::io::Error,
        path: PathBuf,
    },
    Copy {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl Display for MaterializeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDirectory { source, path } => write!(
                f,
                "failed to create output directory {}: {}",
                path.display(),
                source
            ),
            Self::ClearPrevious { source, path } => write!(
                f,
                "failed to remove previous ranking file {}: {}",
                path.display(),
                source
            ),
            Self::Copy { source, path } => {
                write!(f, "failed to copy {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for MaterializeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. }
            | Self::ClearPrevious { source, .. }
            | Self::Copy { source, .. } => Some(source),
        }
    }
}
