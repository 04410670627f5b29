//! Session and job configuration.
//!
//! ```
//! use catprint::PrinterConfig;
//!
//! let config = PrinterConfig {
//!     model: "GB03".into(),
//!     ..PrinterConfig::default()
//! };
//! assert_eq!(config.paper_width, 384);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use image::imageops::FilterType;

use crate::error::{Error, Result};

/// Paper width of the common 58mm models, in dots.
pub const DEFAULT_PAPER_WIDTH: u32 = 384;

/// Send buffer size used when the sink does not negotiate one.
pub const DEFAULT_MTU: usize = 200;

/// Pause after every sink write so the printer's receive queue keeps up.
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(20);

/// How often a paused flush re-checks the pause flag.
pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Printable width in dots, a multiple of 8.
    pub paper_width: u32,
    /// Send buffer capacity. `None` uses the sink's MTU.
    pub mtu: Option<usize>,
    pub write_delay: Duration,
    pub pause_poll_interval: Duration,
    /// Model identifier, e.g. "GB01" or "MX10".
    pub model: String,
    /// Resampling filter for proportional downscales.
    pub downscale_filter: FilterType,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            paper_width: DEFAULT_PAPER_WIDTH,
            mtu: None,
            write_delay: DEFAULT_WRITE_DELAY,
            pause_poll_interval: DEFAULT_PAUSE_POLL,
            model: "GB01".to_string(),
            downscale_filter: FilterType::CatmullRom,
        }
    }
}

impl PrinterConfig {
    pub fn validate(&self) -> Result<()> {
        validate_paper_width(self.paper_width)?;
        if self.mtu == Some(0) {
            return Err(Error::Configuration("mtu must be non-zero".into()));
        }
        Ok(())
    }

    /// Bytes in one packed print line.
    pub fn line_bytes(&self) -> usize {
        (self.paper_width / 8) as usize
    }
}

pub(crate) fn validate_paper_width(paper_width: u32) -> Result<()> {
    if paper_width == 0 || paper_width % 8 != 0 {
        return Err(Error::Configuration(format!(
            "paper width {paper_width} is not a positive multiple of 8"
        )));
    }
    Ok(())
}

/// How a print line is handed to the print head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineMode {
    /// Bytes go out as packed.
    #[default]
    Standard,
    /// Every byte is bit-reversed first.
    Pbm,
}

/// Per-job print parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Print speed, lower is darker and slower.
    pub speed: u8,
    pub energy: u16,
    /// Feed after the last line, in dots.
    pub extra_feed: u16,
    pub line_mode: LineMode,
}

impl JobOptions {
    pub fn text() -> Self {
        Self {
            speed: 35,
            energy: 8000,
            extra_feed: 50,
            line_mode: LineMode::Standard,
        }
    }

    pub fn photo() -> Self {
        Self {
            speed: 45,
            ..Self::text()
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::text()
    }
}
