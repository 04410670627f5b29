use image::RgbaImage;

use crate::config::{PrinterConfig, validate_paper_width};
use crate::dithering::{ContentClass, dither};
use crate::error::{Error, Result};
use crate::raster::normalize;

/// One packed scanline, `paper_width / 8` bytes.
pub type PrintLine = Vec<u8>;

/// Packs a dithered RGBA image into one print line per row.
///
/// Only the first channel of each pixel is looked at: below 128 is ink
/// (bit set). Bit 0 of each byte is the leftmost pixel of its group of 8.
/// The image must be exactly `paper_width` wide.
pub fn pack_lines(img: &RgbaImage, paper_width: u32) -> Result<Vec<PrintLine>> {
    validate_paper_width(paper_width)?;
    if img.width() != paper_width {
        return Err(Error::Configuration(format!(
            "raster is {} wide, paper is {paper_width}",
            img.width()
        )));
    }
    let bytes_per_row = (paper_width / 8) as usize;
    let lines = img
        .rows()
        .map(|row| {
            let mut line = vec![0u8; bytes_per_row];
            for (x, pixel) in row.enumerate() {
                if pixel.0[0] < 128 {
                    line[x / 8] |= 1 << (x % 8);
                }
            }
            line
        })
        .collect();
    Ok(lines)
}

/// Turns any raster into print lines: normalize, dither for `class`, pack.
pub fn render_lines(
    img: &RgbaImage,
    class: ContentClass,
    config: &PrinterConfig,
) -> Result<Vec<PrintLine>> {
    let mut canvas = normalize(img, config.paper_width, config.downscale_filter)?;
    dither(&mut canvas, class);
    pack_lines(&canvas, config.paper_width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn test_pack_all_white() {
        let img = RgbaImage::from_pixel(8, 1, WHITE);
        assert_eq!(pack_lines(&img, 8).unwrap(), vec![vec![0x00]]);
    }

    #[test]
    fn test_pack_all_black() {
        let img = RgbaImage::from_pixel(8, 1, BLACK);
        assert_eq!(pack_lines(&img, 8).unwrap(), vec![vec![0xff]]);
    }

    #[test]
    fn test_pack_is_lsb_first() {
        let mut img = RgbaImage::from_pixel(16, 2, WHITE);
        img.put_pixel(0, 0, BLACK);
        img.put_pixel(9, 0, BLACK);
        img.put_pixel(7, 1, BLACK);
        img.put_pixel(15, 1, BLACK);
        let lines = pack_lines(&img, 16).unwrap();
        assert_eq!(lines, vec![vec![0x01, 0x02], vec![0x80, 0x80]]);
    }

    #[test]
    fn test_pack_reads_first_channel_only() {
        let mut img = RgbaImage::from_pixel(8, 1, WHITE);
        img.put_pixel(0, 0, Rgba([127, 255, 255, 255]));
        img.put_pixel(1, 0, Rgba([128, 0, 0, 255]));
        assert_eq!(pack_lines(&img, 8).unwrap(), vec![vec![0x01]]);
    }

    #[test]
    fn test_pack_rejects_mismatched_width() {
        let img = RgbaImage::from_pixel(16, 1, WHITE);
        assert!(matches!(pack_lines(&img, 8), Err(Error::Configuration(_))));
        let img = RgbaImage::from_pixel(12, 1, WHITE);
        assert!(matches!(pack_lines(&img, 12), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_render_black_block() {
        let config = PrinterConfig {
            paper_width: 16,
            ..PrinterConfig::default()
        };
        let img = RgbaImage::from_pixel(16, 8, BLACK);
        for class in [ContentClass::Text, ContentClass::Photo] {
            let lines = render_lines(&img, class, &config).unwrap();
            assert_eq!(lines.len(), 8);
            assert!(lines.iter().all(|l| l == &vec![0xff, 0xff]));
        }
    }
}
