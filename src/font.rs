use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use rusttype::{Font, Scale, point};

use crate::config::{DEFAULT_PAPER_WIDTH, validate_paper_width};
use crate::error::{Error, Result};

/// Blank space around the text block.
const MARGIN: u32 = 10;

/// Shortest canvas ever produced.
const MIN_HEIGHT: u32 = 50;

const MAX_BORDER: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    /// Pixel height of the font.
    pub font_size: u32,
    pub align: Align,
    /// White text on black.
    pub invert: bool,
    /// Frame thickness in pixels, 0 for none, at most 10.
    pub border: u32,
    pub paper_width: u32,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            font_size: 16,
            align: Align::Center,
            invert: false,
            border: 0,
            paper_width: DEFAULT_PAPER_WIDTH,
        }
    }
}

/// Rasterizes text onto a paper-wide RGBA canvas for printing.
///
/// - `font`: any TrueType font, loading it is up to the caller
/// - `text`: the text to render, `\n` separated lines
/// - `opts`: size, alignment, colors and border
///
/// The result is exactly `opts.paper_width` wide and ready for
/// [`ContentClass::Text`](crate::ContentClass::Text) dithering.
pub fn render_text(font: &Font<'_>, text: &str, opts: &TextOptions) -> Result<RgbaImage> {
    validate_paper_width(opts.paper_width)?;
    if opts.border > MAX_BORDER {
        return Err(Error::Configuration(format!(
            "border {} is thicker than {MAX_BORDER}px",
            opts.border
        )));
    }
    let scale = Scale::uniform(opts.font_size as f32);
    let ascent = font.v_metrics(scale).ascent;

    let lines: Vec<&str> = text.split('\n').collect();
    let extents: Vec<(u32, u32)> = lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                (0, opts.font_size)
            } else {
                let (w, h) = measure(font, line, scale);
                (w, h.max(opts.font_size / 2))
            }
        })
        .collect();
    let heights: Vec<u32> = extents.iter().map(|&(_, h)| h).collect();
    let height = canvas_height(&heights, opts.font_size, opts.border);
    log::debug!(
        "text: {} lines on {}x{height}",
        lines.len(),
        opts.paper_width
    );

    let (bg, fg) = if opts.invert {
        (Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]))
    } else {
        (Rgba([255, 255, 255, 255]), Rgba([0, 0, 0, 255]))
    };
    let mut canvas = RgbaImage::from_pixel(opts.paper_width, height, bg);

    if opts.border > 0 {
        draw_border(&mut canvas, opts.border, fg);
    }

    let spacing = line_spacing(opts.font_size);
    let mut y = MARGIN + opts.border + top_border_padding(opts.border) + 2 * opts.border;
    for (line, &(line_width, line_height)) in lines.iter().zip(&extents) {
        if !line.trim().is_empty() {
            let x = line_x(opts.align, opts.paper_width, line_width, opts.border);
            draw_line(&mut canvas, font, line, scale, (x as f32, y as f32 + ascent), bg, fg);
        }
        y += line_height + spacing;
    }
    Ok(canvas)
}

fn line_spacing(font_size: u32) -> u32 {
    (font_size / 4).max(4)
}

fn top_border_padding(border: u32) -> u32 {
    if border > 0 { (border + 6).max(10) } else { 0 }
}

/// Canvas height for lines of the given heights.
fn canvas_height(line_heights: &[u32], font_size: u32, border: u32) -> u32 {
    let gaps = line_heights.len().saturating_sub(1) as u32;
    let text = line_heights.iter().sum::<u32>() + gaps * line_spacing(font_size);
    let framing = 2 * border + top_border_padding(border) + 2 * border;
    (text + 2 * MARGIN + framing).max(MIN_HEIGHT)
}

/// Left edge of a line of `line_width` pixels.
fn line_x(align: Align, canvas_width: u32, line_width: u32, border: u32) -> i32 {
    let inset = (MARGIN + border) as i32;
    let (canvas_width, line_width) = (canvas_width as i32, line_width as i32);
    match align {
        Align::Left => inset,
        Align::Right => canvas_width - inset - line_width,
        Align::Center => (canvas_width - line_width).div_euclid(2),
    }
}

/// Ink extent of a line, in pixels.
fn measure(font: &Font<'_>, line: &str, scale: Scale) -> (u32, u32) {
    let bounds = font
        .layout(line, scale, point(0.0, 0.0))
        .filter_map(|g| g.pixel_bounding_box())
        .reduce(|a, b| rusttype::Rect {
            min: point(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
            max: point(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
        });
    match bounds {
        Some(bb) => (bb.width() as u32, bb.height() as u32),
        None => (0, 0),
    }
}

fn draw_border(canvas: &mut RgbaImage, border: u32, color: Rgba<u8>) {
    let (width, height) = canvas.dimensions();
    let top = top_border_padding(border);
    let side = height.saturating_sub(top);
    let b = border as i32;
    draw_filled_rect_mut(canvas, Rect::at(0, top as i32).of_size(width, border), color);
    draw_filled_rect_mut(canvas, Rect::at(0, height as i32 - b).of_size(width, border), color);
    draw_filled_rect_mut(canvas, Rect::at(0, top as i32).of_size(border, side), color);
    draw_filled_rect_mut(
        canvas,
        Rect::at(width as i32 - b, top as i32).of_size(border, side),
        color,
    );
}

/// Blends glyph coverage of `fg` over `bg`, baseline at `origin.1`.
fn draw_line(
    canvas: &mut RgbaImage,
    font: &Font<'_>,
    line: &str,
    scale: Scale,
    origin: (f32, f32),
    bg: Rgba<u8>,
    fg: Rgba<u8>,
) {
    let (width, height) = canvas.dimensions();
    for glyph in font.layout(line, scale, point(origin.0, origin.1)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, v| {
            let px = bb.min.x + gx as i32;
            let py = bb.min.y + gy as i32;
            if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                return;
            }
            let mix = |b: u8, f: u8| (f32::from(b) + (f32::from(f) - f32::from(b)) * v).round() as u8;
            let px_ref = canvas.get_pixel_mut(px as u32, py as u32);
            *px_ref = Rgba([mix(bg[0], fg[0]), mix(bg[1], fg[1]), mix(bg[2], fg[2]), 255]);
        });
    }
}
