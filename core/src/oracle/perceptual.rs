use super::decode::Backend;
use super::features::{hamming_distance, vector_distance, ImageFeatures};
use super::{DistanceOracle, OracleError};
use std::path::Path;

const HASH_BITS: f64 = 64.0;
const TEXTURE_SCALE: f64 = 64.0;

/// Distance function applied to a pair of [`ImageFeatures`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    AverageHash,
    DifferenceHash,
    Color,
    Combined,
}

impl Metric {
    pub fn from_tag(tag: &str) -> Result<Self, OracleError> {
        match tag.to_ascii_lowercase().as_str() {
            "ahash" | "average-hash" => Ok(Self::AverageHash),
            "dhash" | "difference-hash" => Ok(Self::DifferenceHash),
            "color" | "colour" => Ok(Self::Color),
            "combined" | "default" => Ok(Self::Combined),
            _ => Err(OracleError::UnknownModel(tag.to_string())),
        }
    }

    /// Returns a distance in `[0, 1]`; identical features give exactly zero.
    pub fn distance(&self, left: &ImageFeatures, right: &ImageFeatures) -> f64 {
        match self {
            Self::AverageHash => hash_distance(left.average_hash, right.average_hash),
            Self::DifferenceHash => hash_distance(left.difference_hash, right.difference_hash),
            Self::Color => color_distance(left, right),
            Self::Combined => {
                let texture = ((left.texture - right.texture).abs() / TEXTURE_SCALE).min(1.0);
                (hash_distance(left.average_hash, right.average_hash)
                    + hash_distance(left.difference_hash, right.difference_hash)
                    + color_distance(left, right)
                    + texture)
                    / 4.0
            }
        }
    }
}

fn hash_distance(left: u64, right: u64) -> f64 {
    hamming_distance(left, right) as f64 / HASH_BITS
}

fn color_distance(left: &ImageFeatures, right: &ImageFeatures) -> f64 {
    let mean = vector_distance(&left.mean, &right.mean);
    let spread = vector_distance(&left.stddev, &right.stddev);
    let max = 255.0 * 6f64.sqrt();
    ((mean * mean + spread * spread).sqrt() / max).min(1.0)
}

/// Feature-based oracle configured from `model` and `backend` tags.
#[derive(Clone, Debug)]
pub struct PerceptualOracle {
    metric: Metric,
    backend: Backend,
}

impl PerceptualOracle {
    pub fn new(metric: Metric, backend: Backend) -> Self {
        Self { metric, backend }
    }

    pub fn from_tags(model: &str, backend: &str) -> Result<Self, OracleError> {
        Ok(Self::new(Metric::from_tag(model)?, Backend::from_tag(backend)?))
    }
}

impl DistanceOracle for PerceptualOracle {
    type Image = ImageFeatures;

    fn load(&self, path: &Path) -> Result<Self::Image, OracleError> {
        self.backend.extract(path)
    }

    fn distance(
        &self,
        reference: &Self::Image,
        candidate: &Self::Image,
    ) -> Result<f64, OracleError> {
        Ok(self.metric.distance(reference, candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn features(hash: u64, mean: f64, texture: f64) -> ImageFeatures {
        ImageFeatures {
            average_hash: hash,
            difference_hash: hash,
            mean: [mean; 3],
            stddev: [0.0; 3],
            texture,
        }
    }

    #[test]
    fn identical_features_have_zero_distance() {
        let left = features(0xdead_beef, 100.0, 3.0);
        for metric in [
            Metric::AverageHash,
            Metric::DifferenceHash,
            Metric::Color,
            Metric::Combined,
        ] {
            assert_eq!(metric.distance(&left, &left.clone()), 0.0);
        }
    }

    #[test]
    fn hash_metric_scales_by_bit_count() {
        let left = features(0, 0.0, 0.0);
        let right = features(0xffff, 0.0, 0.0);
        assert_eq!(Metric::AverageHash.distance(&left, &right), 0.25);
    }

    #[test]
    fn color_metric_is_bounded() {
        let black = features(0, 0.0, 0.0);
        let white = features(0, 255.0, 0.0);
        let distance = Metric::Color.distance(&black, &white);
        assert!(distance > 0.0 && distance <= 1.0);
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!(matches!(
            PerceptualOracle::from_tags("Facenet512", "image"),
            Err(OracleError::UnknownModel(_))
        ));
        assert!(matches!(
            PerceptualOracle::from_tags("ahash", "mtcnn"),
            Err(OracleError::UnknownBackend(_))
        ));
    }

    #[test]
    fn oracle_compares_decoded_files() {
        let dir = tempdir().unwrap();
        let dark = dir.path().join("dark.png");
        let light = dir.path().join("light.png");
        RgbImage::from_pixel(16, 16, Rgb([20, 20, 20])).save(&dark).unwrap();
        RgbImage::from_pixel(16, 16, Rgb([220, 220, 220])).save(&light).unwrap();

        let oracle = PerceptualOracle::from_tags("combined", "image").unwrap();
        let dark = oracle.load(&dark).unwrap();
        let light = oracle.load(&light).unwrap();
        assert_eq!(oracle.distance(&dark, &dark).unwrap(), 0.0);
        assert!(oracle.distance(&dark, &light).unwrap() > 0.0);
    }
}
