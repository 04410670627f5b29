use image::{Rgba, RgbaImage};

/// Which kind of content a raster holds. Decides the dithering algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    /// Rendered glyphs, thresholded to keep edges crisp.
    Text,
    /// Photos and drawings, error-diffused to keep gradients.
    Photo,
}

/// Gray threshold, values strictly above print white.
const THRESHOLD: f64 = 128.0;

#[inline]
fn luma(r: f64, g: f64, b: f64) -> f64 {
    r * 0.2125 + g * 0.7154 + b * 0.0721
}

/// Dithers `img` in place with the algorithm for `class`.
pub fn dither(img: &mut RgbaImage, class: ContentClass) {
    match class {
        ContentClass::Text => threshold_dither(img),
        ContentClass::Photo => error_diffusion_dither(img),
    }
}

/// Applies threshold dithering to an RGBA image in place.
///
/// Each pixel becomes pure white when its (truncated) luma is above 128,
/// otherwise pure black. Alpha is kept.
pub fn threshold_dither(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let gray = luma(r.into(), g.into(), b.into()) as u8;
        let v = if f64::from(gray) > THRESHOLD { 255 } else { 0 };
        *pixel = Rgba([v, v, v, a]);
    }
}

/// Converts a pixel to gray, blending transparency toward white.
fn gray_over_white(pixel: &Rgba<u8>) -> f64 {
    let [r, g, b, a] = pixel.0;
    let (mut r, mut g, mut b) = (f64::from(r), f64::from(g), f64::from(b));
    let alpha = f64::from(a) / 255.0;
    if alpha < 1.0 {
        let inv = 1.0 - alpha;
        r += (255.0 - r) * inv;
        g += (255.0 - g) * inv;
        b += (255.0 - b) * inv;
    }
    luma(r, g, b)
}

/// Applies Floyd-Steinberg error diffusion to an RGBA image in place.
///
/// Pixels are visited in raster order. The quantization error goes 7/16
/// right, 3/16 down-left, 5/16 down and 1/16 down-right, skipping
/// neighbours outside the image. The result is opaque.
pub fn error_diffusion_dither(img: &mut RgbaImage) {
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut mono: Vec<f64> = img.pixels().map(gray_over_white).collect();

    let mut p = 0;
    for y in 0..h {
        for x in 0..w {
            let m = mono[p];
            let n = if m > THRESHOLD { 255.0 } else { 0.0 };
            let err = m - n;
            mono[p] = n;

            let has_below = y + 1 < h;
            if x + 1 < w {
                mono[p + 1] += err * 7.0 / 16.0;
            }
            if x >= 1 && has_below {
                mono[p + w - 1] += err * 3.0 / 16.0;
            }
            if has_below {
                mono[p + w] += err * 5.0 / 16.0;
            }
            if x + 1 < w && has_below {
                mono[p + w + 1] += err * 1.0 / 16.0;
            }
            p += 1;
        }
    }

    for (pixel, &v) in img.pixels_mut().zip(mono.iter()) {
        let v = v.clamp(0.0, 255.0) as u8;
        *pixel = Rgba([v, v, v, 255]);
    }
}
