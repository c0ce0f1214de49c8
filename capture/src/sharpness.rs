//! Frame sharpness – variance of the Laplacian of the intensity image.
//!
//! Higher values mean more high-frequency detail, i.e. less blur.  This
//! estimates focus; it says nothing about whether a barcode is legible.

use image::{imageops, GrayImage, RgbImage};

/// Sharpness score of an RGB frame.
pub fn score(frame: &RgbImage) -> f64 {
    laplacian_variance(&imageops::grayscale(frame))
}

/// Population variance of the 3×3 Laplacian response
/// (`[0 1 0; 1 -4 1; 0 1 0]`), borders reflected without repeating the
/// edge pixel.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }

    let at = |x: i64, y: i64| -> f64 {
        let x = reflect101(x, w as i64);
        let y = reflect101(y, h as i64);
        gray.get_pixel(x as u32, y as u32)[0] as f64
    };

    let n = (w as f64) * (h as f64);
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// `dcb|abcdefgh|gfe` border mapping.
fn reflect101(i: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let m = i.rem_euclid(period);
    if m < len {
        m
    } else {
        period - m
    }
}
