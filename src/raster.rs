//! Fits arbitrary rasters to the paper width.
//!
//! Wider images are scaled down proportionally, images narrower than half
//! the paper are blown up by the largest whole factor that fits, and
//! whatever is still narrower gets centered on white.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::config::validate_paper_width;
use crate::error::{Error, Result};

/// Padding color.
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Normalizes `img` to exactly `paper_width` pixels wide.
///
/// `filter` is only used when scaling down; whole-factor upscales are
/// always nearest-neighbour.
pub fn normalize(img: &RgbaImage, paper_width: u32, filter: FilterType) -> Result<RgbaImage> {
    validate_paper_width(paper_width)?;
    let (width, height) = img.dimensions();
    if width == 0 {
        return Err(Error::Configuration("cannot print a zero-width raster".into()));
    }

    let scaled = if width > paper_width {
        let new_height = ((height as f64 * (paper_width as f64 / width as f64)) as u32).max(1);
        log::debug!("downscale {width}x{height} -> {paper_width}x{new_height}");
        imageops::resize(img, paper_width, new_height, filter)
    } else if width < paper_width / 2 {
        let factor = paper_width / width;
        log::debug!("upscale {width}x{height} by {factor}");
        upscale_nearest(img, factor)
    } else {
        img.clone()
    };

    if scaled.width() == paper_width {
        return Ok(scaled);
    }
    let left = (paper_width - scaled.width()) / 2;
    log::debug!("pad {} wide image, {left}px on the left", scaled.width());
    Ok(pad_to_width(&scaled, paper_width, left))
}

/// Replicates every pixel `factor` times in both directions.
fn upscale_nearest(img: &RgbaImage, factor: u32) -> RgbaImage {
    RgbaImage::from_fn(img.width() * factor, img.height() * factor, |x, y| {
        *img.get_pixel(x / factor, y / factor)
    })
}

fn pad_to_width(img: &RgbaImage, width: u32, left: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, img.height(), BACKGROUND);
    // copy, not blend: alpha is left for the ditherer
    imageops::replace(&mut canvas, img, i64::from(left), 0);
    canvas
}

/// Composites `img` over opaque white.
pub fn flatten_alpha(img: &RgbaImage) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(img.width(), img.height(), BACKGROUND);
    imageops::overlay(&mut canvas, img, 0, 0);
    canvas
}
