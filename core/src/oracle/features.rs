/// Side length of the grid used for the average hash.
pub const HASH_SIZE: u32 = 8;

/// Side length of the grayscale sample used for texture energy.
pub const TEXTURE_SIZE: u32 = 64;

/// Perceptual and statistical description of one decoded image.
///
/// Channel statistics are in RGB order regardless of the decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageFeatures {
    pub average_hash: u64,
    pub difference_hash: u64,
    pub mean: [f64; 3],
    pub stddev: [f64; 3],
    pub texture: f64,
}

/// Calculates the Hamming distance between `left` and `right`.
pub fn hamming_distance(left: u64, right: u64) -> u32 {
    (left ^ right).count_ones()
}

/// Builds an average hash from an 8x8 grayscale grid in row-major order.
pub(crate) fn average_hash(cells: &[u8]) -> u64 {
    let mean = cells.iter().map(|value| *value as f64).sum::<f64>() / cells.len().max(1) as f64;

    let mut fingerprint = 0u64;
    for value in cells.iter().take(64) {
        fingerprint <<= 1;
        if (*value as f64) >= mean {
            fingerprint |= 1;
        }
    }
    fingerprint
}

/// Builds a difference hash from a 9x8 grayscale grid in row-major order.
pub(crate) fn difference_hash(cells: &[u8]) -> u64 {
    let width = (HASH_SIZE + 1) as usize;
    let mut fingerprint = 0u64;
    for row in cells.chunks_exact(width).take(HASH_SIZE as usize) {
        for pair in row.windows(2) {
            fingerprint <<= 1;
            if pair[0] < pair[1] {
                fingerprint |= 1;
            }
        }
    }
    fingerprint
}

/// Mean and population standard deviation per channel.
pub(crate) fn channel_statistics<'a, I>(pixels: I) -> ([f64; 3], [f64; 3])
where
    I: IntoIterator<Item = &'a [u8; 3]>,
{
    let mut count = 0f64;
    let mut sum = [0f64; 3];
    let mut squares = [0f64; 3];
    for pixel in pixels {
        count += 1.0;
        for channel in 0..3 {
            let value = pixel[channel] as f64;
            sum[channel] += value;
            squares[channel] += value * value;
        }
    }
    if count == 0.0 {
        return ([0.0; 3], [0.0; 3]);
    }

    let mut mean = [0f64; 3];
    let mut stddev = [0f64; 3];
    for channel in 0..3 {
        mean[channel] = sum[channel] / count;
        let variance = squares[channel] / count - mean[channel] * mean[channel];
        stddev[channel] = variance.max(0.0).sqrt();
    }
    (mean, stddev)
}

/// Mean absolute 4-neighbour Laplacian over the interior of a grayscale grid.
pub(crate) fn texture_energy(gray: &[u8], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 || gray.len() < width * height {
        return 0.0;
    }

    let at = |x: usize, y: usize| gray[y * width + x] as f64;
    let mut total = 0.0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let laplacian =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            total += laplacian.abs();
        }
    }
    total / ((width - 2) * (height - 2)) as f64
}

pub(crate) fn vector_distance(left: &[f64; 3], right: &[f64; 3]) -> f64 {
    let dx = left[0] - right[0];
    let dy = left[1] - right[1];
    let dz = left[2] - right[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}
