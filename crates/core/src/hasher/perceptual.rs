//! The four perceptual hashes: aHash, dHash, pHash, and wHash. All four are
//! produced from the same EXIF-orientation-corrected decode of an image and
//! share a 64-bit output width so Hamming distance is comparable across them.

use std::io::BufReader;
use std::path::Path;

use fast_image_resize::{self as fir, images::Image as FirImage};

/// All four perceptual hashes for one image, each `None` if that stage of
/// decoding failed. Failures are localized — a pHash failure
/// does not prevent aHash/dHash from being reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualHashes {
    pub average_hash: Option<u64>,
    pub difference_hash: Option<u64>,
    pub perceptual_hash: Option<u64>,
    pub wavelet_hash: Option<u64>,
}

/// Compute all four perceptual hashes for the image at `path`.
///
/// Uses a hybrid decode strategy:
/// - JPEG: `turbojpeg` full-resolution grayscale decode (feature-gated, skips chroma)
/// - Other formats: `image` crate decode, RGB resize, then grayscale conversion
///
/// Both paths apply EXIF orientation before resizing, so photos with rotation
/// tags (common on phone originals) hash the same as a physically-rotated export.
pub fn compute_perceptual_hashes(path: &Path) -> PerceptualHashes {
    let mut out = PerceptualHashes::default();

    match load_grayscale(path, 9, 8) {
        Some(pixels) => {
            out.average_hash = Some(compute_ahash(&pixels));
            out.difference_hash = Some(compute_dhash(&pixels));
        }
        None => {
            tracing::warn!(path = %path.display(), "failed to decode image for aHash/dHash");
        }
    }

    match load_grayscale(path, 32, 32) {
        Some(pixels) => {
            out.perceptual_hash = Some(compute_phash(&pixels));
            out.wavelet_hash = Some(compute_whash(&pixels));
        }
        None => {
            tracing::warn!(path = %path.display(), "failed to decode image for pHash/wHash");
        }
    }

    out
}

/// Load image and produce a `w`x`h` grayscale pixel buffer ready for hashing.
fn load_grayscale(path: &Path, w: usize, h: usize) -> Option<Vec<u8>> {
    #[cfg(feature = "turbojpeg")]
    if is_jpeg(path) {
        if let Some(buf) = load_jpeg_grayscale(path, w, h) {
            return Some(buf);
        }
    }

    load_image_crate_grayscale(path, w, h)
}

/// Check if a file is JPEG by extension.
#[cfg(feature = "turbojpeg")]
fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
}

/// Read EXIF orientation tag (1-8). Returns 1 (normal) if missing or unreadable.
fn read_exif_orientation(path: &Path) -> u8 {
    let read = || -> Option<u8> {
        let file = std::fs::File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().unwrap_or(1)
}

/// Apply EXIF orientation to a grayscale buffer, returning the corrected buffer
/// and new dimensions. Handles all 8 EXIF orientation values.
///
/// Orientations:
/// 1: Normal                    5: Mirror + rotate 90° CW
/// 2: Mirror horizontal         6: Rotate 90° CW
/// 3: Rotate 180°               7: Mirror + rotate 90° CCW
/// 4: Mirror vertical           8: Rotate 90° CCW
fn apply_orientation(buf: &[u8], w: usize, h: usize, orientation: u8) -> (Vec<u8>, usize, usize) {
    match orientation {
        1 => (buf.to_vec(), w, h),
        2 => {
            let mut out = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    out[y * w + x] = buf[y * w + (w - 1 - x)];
                }
            }
            (out, w, h)
        }
        3 => {
            let mut out = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    out[y * w + x] = buf[(h - 1 - y) * w + (w - 1 - x)];
                }
            }
            (out, w, h)
        }
        4 => {
            let mut out = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    out[y * w + x] = buf[(h - 1 - y) * w + x];
                }
            }
            (out, w, h)
        }
        5 => {
            let mut out = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    out[x * h + y] = buf[y * w + x];
                }
            }
            (out, h, w)
        }
        6 => {
            let mut out = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    out[x * h + (h - 1 - y)] = buf[y * w + x];
                }
            }
            (out, h, w)
        }
        7 => {
            let mut out = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    out[(w - 1 - x) * h + (h - 1 - y)] = buf[y * w + x];
                }
            }
            (out, h, w)
        }
        8 => {
            let mut out = vec![0u8; w * h];
            for y in 0..h {
                for x in 0..w {
                    out[(w - 1 - x) * h + y] = buf[y * w + x];
                }
            }
            (out, h, w)
        }
        _ => (buf.to_vec(), w, h),
    }
}

/// Decode JPEG at full resolution directly to grayscale using turbojpeg,
/// apply EXIF orientation, then SIMD-resize to the requested `out_w`x`out_h`.
///
/// Full-resolution decode is required — DCT scaling produces different
/// intermediate pixels for recompressed JPEGs, causing hash divergence.
#[cfg(feature = "turbojpeg")]
fn load_jpeg_grayscale(path: &Path, out_w: usize, out_h: usize) -> Option<Vec<u8>> {
    let jpeg_data = std::fs::read(path).ok()?;
    let mut decompressor = turbojpeg::Decompressor::new().ok()?;
    let header = decompressor.read_header(&jpeg_data).ok()?;
    let w = header.width;
    let h = header.height;

    let mut buf = vec![0u8; w * h];
    let output = turbojpeg::Image {
        pixels: buf.as_mut_slice(),
        width: w,
        pitch: w,
        height: h,
        format: turbojpeg::PixelFormat::GRAY,
    };
    decompressor.decompress(&jpeg_data, output).ok()?;

    let orientation = read_exif_orientation(path);
    let (buf, w, h) = apply_orientation(&buf, w, h, orientation);

    let src = FirImage::from_vec_u8(w as u32, h as u32, buf, fir::PixelType::U8).ok()?;
    let mut dst = FirImage::new(out_w as u32, out_h as u32, fir::PixelType::U8);
    fir::Resizer::new().resize(&src, &mut dst, None).ok()?;

    Some(dst.buffer()[..out_w * out_h].to_vec())
}

/// Apply EXIF orientation to an RGB buffer, returning corrected buffer and new dimensions.
fn apply_orientation_rgb(buf: &[u8], w: usize, h: usize, orientation: u8) -> (Vec<u8>, usize, usize) {
    if orientation == 1 {
        return (buf.to_vec(), w, h);
    }

    let pixel_count = w * h;
    let mut out = vec![0u8; pixel_count * 3];
    let (new_w, new_h) = if orientation >= 5 { (h, w) } else { (w, h) };

    for y in 0..h {
        for x in 0..w {
            let src_idx = (y * w + x) * 3;
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                8 => (y, w - 1 - x),
                _ => (x, y),
            };
            let dst_idx = (dy * new_w + dx) * 3;
            out[dst_idx..dst_idx + 3].copy_from_slice(&buf[src_idx..src_idx + 3]);
        }
    }
    (out, new_w, new_h)
}

/// Decode any supported format using the `image` crate, apply EXIF orientation,
/// resize RGB to `out_w`x`out_h`, then convert to grayscale.
fn load_image_crate_grayscale(path: &Path, out_w: usize, out_h: usize) -> Option<Vec<u8>> {
    let img = image::open(path).ok()?;
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);

    let orientation = read_exif_orientation(path);
    let (rgb_data, w, h) = apply_orientation_rgb(rgb.as_raw(), w, h, orientation);

    let src = FirImage::from_vec_u8(w as u32, h as u32, rgb_data, fir::PixelType::U8x3).ok()?;
    let mut dst = FirImage::new(out_w as u32, out_h as u32, fir::PixelType::U8x3);
    fir::Resizer::new().resize(&src, &mut dst, None).ok()?;

    let rgb_buf = dst.buffer();
    let n = out_w * out_h;
    let mut gray = vec![0u8; n];
    for i in 0..n {
        let r = rgb_buf[i * 3] as f32;
        let g = rgb_buf[i * 3 + 1] as f32;
        let b = rgb_buf[i * 3 + 2] as f32;
        gray[i] = (0.299 * r + 0.587 * g + 0.114 * b) as u8;
    }
    Some(gray)
}

/// Average hash from a 9x8 grayscale buffer. Uses the left 8x8 block.
/// Each bit = 1 if pixel >= mean, 0 otherwise.
fn compute_ahash(pixels: &[u8]) -> u64 {
    let mut block = [0u8; 64];
    for row in 0..8 {
        for col in 0..8 {
            block[row * 8 + col] = pixels[row * 9 + col];
        }
    }

    let mean: u64 = block.iter().map(|&p| p as u64).sum::<u64>() / 64;
    let mut hash: u64 = 0;
    for (i, &pixel) in block.iter().enumerate() {
        if pixel as u64 >= mean {
            hash |= 1 << i;
        }
    }
    hash
}

/// Difference hash from a 9x8 grayscale buffer: for each row of 9 pixels,
/// compare adjacent pairs → 8 bits per row × 8 rows = 64 bits.
fn compute_dhash(pixels: &[u8]) -> u64 {
    let mut hash: u64 = 0;
    let mut bit = 0;
    for row in 0..8 {
        for col in 0..8 {
            let left = pixels[row * 9 + col];
            let right = pixels[row * 9 + col + 1];
            if left > right {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }
    hash
}

/// Perceptual hash from a 32x32 grayscale buffer: a 2-D DCT-II, keeping the
/// top-left 8x8 low-frequency coefficients (excluding the DC term),
/// thresholded against their median.
fn compute_phash(pixels: &[u8]) -> u64 {
    let coeffs = dct2d_32x32(pixels);

    // Top-left 8x8 block, skipping the DC coefficient at (0, 0).
    let mut low_freq = Vec::with_capacity(63);
    for row in 0..8 {
        for col in 0..8 {
            if row == 0 && col == 0 {
                continue;
            }
            low_freq.push(coeffs[row * 32 + col]);
        }
    }

    let median = median_of(&mut low_freq.clone());

    let mut hash: u64 = 0;
    for (i, &v) in low_freq.iter().enumerate() {
        if v >= median {
            hash |= 1 << i;
        }
    }
    hash
}

/// Wavelet hash from a 32x32 grayscale buffer: a two-level 2-D Haar average
/// pool (32 -> 16 -> 8), producing an 8x8 approximation (LL) subband
/// thresholded against its mean.
fn compute_whash(pixels: &[u8]) -> u64 {
    let as_f64: Vec<f64> = pixels.iter().map(|&p| p as f64).collect();
    let level1 = average_pool_2x2(&as_f64, 32, 32); // 32x32 -> 16x16
    let level2 = average_pool_2x2(&level1, 16, 16); // 16x16 -> 8x8

    let mean: f64 = level2.iter().sum::<f64>() / level2.len() as f64;
    let mut hash: u64 = 0;
    for (i, &v) in level2.iter().enumerate() {
        if v >= mean {
            hash |= 1 << i;
        }
    }
    hash
}

/// One level of a Haar wavelet decomposition reduced to just its
/// approximation (LL) subband: the 2x2-block average, which is what wHash
/// thresholds at each level.
fn average_pool_2x2(pixels: &[f64], w: usize, h: usize) -> Vec<f64> {
    let out_w = w / 2;
    let out_h = h / 2;
    let mut out = vec![0.0; out_w * out_h];
    for oy in 0..out_h {
        for ox in 0..out_w {
            let x = ox * 2;
            let y = oy * 2;
            let sum = pixels[y * w + x]
                + pixels[y * w + x + 1]
                + pixels[(y + 1) * w + x]
                + pixels[(y + 1) * w + x + 1];
            out[oy * out_w + ox] = sum / 4.0;
        }
    }
    out
}

/// 2-D DCT-II of a 32x32 grayscale buffer, row-then-column separable pass.
fn dct2d_32x32(pixels: &[u8]) -> Vec<f64> {
    const N: usize = 32;
    let input: Vec<f64> = pixels.iter().map(|&p| p as f64).collect();

    // DCT-II along each row.
    let mut rows = vec![0.0; N * N];
    for r in 0..N {
        let row = &input[r * N..(r + 1) * N];
        let transformed = dct1d(row);
        rows[r * N..(r + 1) * N].copy_from_slice(&transformed);
    }

    // DCT-II along each column of the row-transformed buffer.
    let mut out = vec![0.0; N * N];
    let mut column = vec![0.0; N];
    for c in 0..N {
        for r in 0..N {
            column[r] = rows[r * N + c];
        }
        let transformed = dct1d(&column);
        for r in 0..N {
            out[r * N + c] = transformed[r];
        }
    }
    out
}

/// 1-D DCT-II, orthonormalized.
fn dct1d(input: &[f64]) -> Vec<f64> {
    let n = input.len();
    let mut output = vec![0.0; n];
    for (k, out_k) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &x) in input.iter().enumerate() {
            sum += x * ((std::f64::consts::PI / n as f64) * (i as f64 + 0.5) * k as f64).cos();
        }
        let scale = if k == 0 {
            (1.0 / n as f64).sqrt()
        } else {
            (2.0 / n as f64).sqrt()
        };
        *out_k = sum * scale;
    }
    output
}

fn median_of(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Compute the Hamming distance between two hash values.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_jpeg(path: &Path, r: u8, g: u8, b: u8) {
        let img = image::RgbImage::from_fn(64, 64, |_, _| image::Rgb([r, g, b]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_hamming_distance_identical() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(u64::MAX, u64::MAX), 0);
    }

    #[test]
    fn test_hamming_distance_different() {
        assert_eq!(hamming_distance(0, 1), 1);
        assert_eq!(hamming_distance(0, 3), 2);
        assert_eq!(hamming_distance(0, u64::MAX), 64);
    }

    #[test]
    fn test_compute_perceptual_hashes_returns_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 128, 128, 128);

        let result = compute_perceptual_hashes(&path);
        assert!(result.average_hash.is_some());
        assert!(result.difference_hash.is_some());
        assert!(result.perceptual_hash.is_some());
        assert!(result.wavelet_hash.is_some());
    }

    #[test]
    fn test_identical_images_same_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let path_a = tmp.path().join("a.jpg");
        let path_b = tmp.path().join("b.jpg");
        create_test_jpeg(&path_a, 200, 100, 50);
        create_test_jpeg(&path_b, 200, 100, 50);

        let a = compute_perceptual_hashes(&path_a);
        let b = compute_perceptual_hashes(&path_b);
        assert_eq!(a.average_hash, b.average_hash);
        assert_eq!(a.difference_hash, b.difference_hash);
        assert_eq!(a.perceptual_hash, b.perceptual_hash);
        assert_eq!(a.wavelet_hash, b.wavelet_hash);
    }

    #[test]
    fn test_different_images_different_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let path_a = tmp.path().join("gradient.jpg");
        let path_b = tmp.path().join("checkerboard.jpg");

        let img_a = image::RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            image::Rgb([v, 0, 0])
        });
        img_a.save(&path_a).unwrap();

        let img_b = image::RgbImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        img_b.save(&path_b).unwrap();

        let a = compute_perceptual_hashes(&path_a);
        let b = compute_perceptual_hashes(&path_b);
        assert_ne!(a.perceptual_hash, b.perceptual_hash);
    }

    #[test]
    fn test_nonexistent_file_returns_none() {
        let result = compute_perceptual_hashes(Path::new("/nonexistent/image.jpg"));
        assert!(result.average_hash.is_none());
        assert!(result.perceptual_hash.is_none());
    }

    #[test]
    fn test_non_image_file_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("not_an_image.jpg");
        std::fs::write(&path, b"this is not a jpeg").unwrap();

        let result = compute_perceptual_hashes(&path);
        assert!(result.average_hash.is_none());
    }

    #[test]
    fn test_ahash_dhash_manual() {
        let mut pixels = [100u8; 72];
        pixels[0] = 200;

        let ahash = compute_ahash(&pixels);
        let dhash = compute_dhash(&pixels);

        assert_ne!(ahash, 0);
        assert_ne!(dhash, 0);
    }

    #[test]
    fn test_png_support() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.png");
        let img = image::RgbImage::from_fn(32, 32, |_, _| image::Rgb([100, 150, 200]));
        img.save(&path).unwrap();

        let result = compute_perceptual_hashes(&path);
        assert!(result.perceptual_hash.is_some());
    }

    #[test]
    fn test_apply_orientation_identity() {
        let buf: Vec<u8> = (0..12).collect();
        let (out, w, h) = apply_orientation(&buf, 4, 3, 1);
        assert_eq!((w, h), (4, 3));
        assert_eq!(out, buf);
    }

    #[test]
    fn test_apply_orientation_rotate_90_cw() {
        let buf = vec![1, 2, 3, 4, 5, 6];
        let (out, w, h) = apply_orientation(&buf, 3, 2, 6);
        assert_eq!((w, h), (2, 3));
        assert_eq!(out, vec![4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn test_apply_orientation_rotate_180() {
        let buf = vec![1, 2, 3, 4, 5, 6];
        let (out, w, h) = apply_orientation(&buf, 3, 2, 3);
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_apply_orientation_rotate_90_ccw() {
        let buf = vec![1, 2, 3, 4, 5, 6];
        let (out, w, h) = apply_orientation(&buf, 3, 2, 8);
        assert_eq!((w, h), (2, 3));
        assert_eq!(out, vec![3, 6, 2, 5, 1, 4]);
    }

    #[test]
    fn test_dct_of_constant_image_is_single_coefficient() {
        let pixels = [128u8; 1024];
        let coeffs = dct2d_32x32(&pixels);
        // A flat image has energy only in the DC coefficient (0, 0).
        for (i, &c) in coeffs.iter().enumerate() {
            if i != 0 {
                assert!(c.abs() < 1e-6, "unexpected energy at index {i}: {c}");
            }
        }
        assert!(coeffs[0].abs() > 0.0);
    }

    #[test]
    fn test_average_pool_halves_dimensions() {
        let pixels: Vec<f64> = (0..16).map(|v| v as f64).collect();
        let pooled = average_pool_2x2(&pixels, 4, 4);
        assert_eq!(pooled.len(), 4);
    }

    #[test]
    fn test_median_of_even_and_odd() {
        assert_eq!(median_of(&mut [1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median_of(&mut [1.0, 2.0, 3.0, 4.0]), 2.5);
    }
}
