use super::features::{
    average_hash, channel_statistics, difference_hash, texture_energy, ImageFeatures, HASH_SIZE,
    TEXTURE_SIZE,
};
use super::OracleError;
use image::imageops::{self, FilterType};
use std::path::Path;

/// Image decoder used to turn a file into [`ImageFeatures`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Image,
    #[cfg(feature = "opencv")]
    OpenCv,
}

impl Backend {
    pub fn from_tag(tag: &str) -> Result<Self, OracleError> {
        match tag.to_ascii_lowercase().as_str() {
            "image" | "default" => Ok(Self::Image),
            #[cfg(feature = "opencv")]
            "opencv" => Ok(Self::OpenCv),
            _ => Err(OracleError::UnknownBackend(tag.to_string())),
        }
    }

    pub fn extract(&self, path: &Path) -> Result<ImageFeatures, OracleError> {
        match self {
            Self::Image => extract_with_image(path),
            #[cfg(feature = "opencv")]
            Self::OpenCv => opencv_backend::extract(path),
        }
    }
}

fn extract_with_image(path: &Path) -> Result<ImageFeatures, OracleError> {
    let image = image::open(path).map_err(|source| OracleError::Decode {
        source,
        path: path.to_path_buf(),
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(OracleError::EmptyImage(path.to_path_buf()));
    }

    let rgb = image.to_rgb8();
    let (mean, stddev) = channel_statistics(rgb.pixels().map(|pixel| &pixel.0));

    let gray = image.to_luma8();
    let grid = imageops::resize(&gray, HASH_SIZE, HASH_SIZE, FilterType::Triangle);
    let wide = imageops::resize(&gray, HASH_SIZE + 1, HASH_SIZE, FilterType::Triangle);
    let sample = imageops::resize(&gray, TEXTURE_SIZE, TEXTURE_SIZE, FilterType::Triangle);

    Ok(ImageFeatures {
        average_hash: average_hash(grid.as_raw()),
        difference_hash: difference_hash(wide.as_raw()),
        mean,
        stddev,
        texture: texture_energy(
            sample.as_raw(),
            TEXTURE_SIZE as usize,
            TEXTURE_SIZE as usize,
        ),
    })
}

#[cfg(feature = "opencv")]
mod opencv_backend {
    use super::super::features::{average_hash, difference_hash, HASH_SIZE, TEXTURE_SIZE};
    use super::super::{ImageFeatures, OracleError};
    use opencv::core::{self, AlgorithmHint, Mat, MatTraitConst, MatTraitConstManual, Scalar, Size};
    use opencv::imgcodecs;
    use opencv::imgproc;
    use std::path::Path;

    pub(super) fn extract(path: &Path) -> Result<ImageFeatures, OracleError> {
        let image = load_image(path)?;
        let mut grayscale = Mat::default();
        imgproc::cvt_color(
            &image,
            &mut grayscale,
            imgproc::COLOR_BGR2GRAY,
            0,
            AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;

        let grid = resized_cells(&grayscale, HASH_SIZE as i32, HASH_SIZE as i32)?;
        let wide = resized_cells(&grayscale, HASH_SIZE as i32 + 1, HASH_SIZE as i32)?;

        let mut mean = Scalar::default();
        let mut stddev = Scalar::default();
        core::mean_std_dev(&image, &mut mean, &mut stddev, &Mat::default())?;

        Ok(ImageFeatures {
            average_hash: average_hash(&grid),
            difference_hash: difference_hash(&wide),
            mean: [mean[2], mean[1], mean[0]],
            stddev: [stddev[2], stddev[1], stddev[0]],
            texture: texture_energy(&grayscale)?,
        })
    }

    fn load_image(path: &Path) -> Result<Mat, OracleError> {
        let path_string = path
            .to_str()
            .ok_or_else(|| OracleError::InvalidPath(path.to_path_buf()))?;
        let image = imgcodecs::imread(path_string, imgcodecs::IMREAD_COLOR)?;
        if image.empty() {
            return Err(OracleError::EmptyImage(path.to_path_buf()));
        }
        Ok(image)
    }

    fn resized_cells(grayscale: &Mat, width: i32, height: i32) -> Result<Vec<u8>, OracleError> {
        let mut resized = Mat::default();
        imgproc::resize(
            grayscale,
            &mut resized,
            Size::new(width, height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        Ok(resized.data_typed::<u8>()?.to_vec())
    }

    fn texture_energy(grayscale: &Mat) -> Result<f64, OracleError> {
        let mut sample = Mat::default();
        imgproc::resize(
            grayscale,
            &mut sample,
            Size::new(TEXTURE_SIZE as i32, TEXTURE_SIZE as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        let mut laplacian = Mat::default();
        imgproc::laplacian(
            &sample,
            &mut laplacian,
            core::CV_32F,
            1,
            1.0,
            0.0,
            core::BORDER_DEFAULT,
        )?;
        let zeros = Mat::zeros(laplacian.rows(), laplacian.cols(), laplacian.typ())?;
        let mut magnitude = Mat::default();
        core::absdiff(&laplacian, &zeros, &mut magnitude)?;
        Ok(core::mean(&magnitude, &Mat::default())?[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn image_backend_extracts_uniform_statistics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flat.png");
        RgbImage::from_pixel(32, 32, Rgb([10, 20, 30])).save(&path).unwrap();

        let features = Backend::Image.extract(&path).unwrap();
        assert_eq!(features.mean, [10.0, 20.0, 30.0]);
        assert_eq!(features.stddev, [0.0, 0.0, 0.0]);
        assert_eq!(features.difference_hash, 0);
        assert_eq!(features.texture, 0.0);
    }

    #[test]
    fn image_backend_reports_decode_failures() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let result = Backend::Image.extract(&path);
        assert!(matches!(result, Err(OracleError::Decode { .. })));
    }

    #[test]
    fn backend_tags_resolve() {
        assert_eq!(Backend::from_tag("image").unwrap(), Backend::Image);
        assert_eq!(Backend::from_tag("IMAGE").unwrap(), Backend::Image);
        assert!(matches!(
            Backend::from_tag("retinaface"),
            Err(OracleError::UnknownBackend(tag)) if tag == "retinaface"
        ));
    }
}
