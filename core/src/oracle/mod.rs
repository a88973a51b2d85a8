//! Pairwise image distance oracles.
//!
//! The scoring engine only sees the [`DistanceOracle`] trait: an oracle
//! prepares an image once with [`DistanceOracle::load`] and then compares
//! prepared images. Lower distances mean more similar images; zero is
//! reserved for exact matches.
//!
//! The built-in [`PerceptualOracle`] selects its metric from the `model` tag
//! and its decoder from the `backend` tag:
//!
//! | backend  | decoder                                   |
//! |----------|-------------------------------------------|
//! | `image`  | pure Rust `image` crate (default)         |
//! | `opencv` | OpenCV, requires the `opencv` feature     |

mod decode;
mod features;
mod perceptual;
mod timeout;

pub use decode::Backend;
pub use features::{hamming_distance, ImageFeatures};
pub use perceptual::{Metric, PerceptualOracle};
pub use timeout::TimeoutOracle;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Computes a non-negative dissimilarity between two images.
pub trait DistanceOracle: Send + Sync {
    /// Prepared form of an image, reused across every comparison it takes part in.
    type Image: Send + Sync;

    fn load(&self, path: &Path) -> Result<Self::Image, OracleError>;

    fn distance(&self, reference: &Self::Image, candidate: &Self::Image)
        -> Result<f64, OracleError>;
}

/// Errors produced while preparing or comparing images.
#[derive(Debug)]
pub enum OracleError {
    Decode {
        source: image::ImageError,
        path: PathBuf,
    },
    #[cfg(feature = "opencv")]
    OpenCv(opencv::Error),
    InvalidPath(PathBuf),
    EmptyImage(PathBuf),
    InvalidDistance(f64),
    Timeout(Duration),
    UnknownModel(String),
    UnknownBackend(String),
    Internal(String),
}

impl Display for OracleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode { source, path } => {
                write!(f, "failed to decode {}: {}", path.display(), source)
            }
            #[cfg(feature = "opencv")]
            Self::OpenCv(error) => write!(f, "opencv error: {}", error),
            Self::InvalidPath(path) => write!(
                f,
                "unable to convert path {} to UTF-8 string",
                path.display()
            ),
            Self::EmptyImage(path) => write!(f, "image at {} is empty", path.display()),
            Self::InvalidDistance(value) => write!(f, "oracle returned invalid distance {}", value),
            Self::Timeout(limit) => write!(f, "oracle call exceeded {:?}", limit),
            Self::UnknownModel(tag) => write!(f, "unknown model tag: {}", tag),
            Self::UnknownBackend(tag) => write!(f, "unknown backend tag: {}", tag),
            Self::Internal(message) => write!(f, "oracle failure: {}", message),
        }
    }
}

impl Error for OracleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode { source, .. } => Some(source),
            #[cfg(feature = "opencv")]
            Self::OpenCv(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for OracleError {
    fn from(error: opencv::Error) -> Self {
        Self::OpenCv(error)
    }
}
