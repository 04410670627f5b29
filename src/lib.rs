//! catprint: drive GB01/GB03/MX style Bluetooth cat printers.
//!
//! Main modules:
//! - protocol: frame codec, checksum and command ids
//! - transport: sink trait and the MTU-bounded send buffer
//! - printer: print session (prepare, draw lines, finish)
//! - raster: fit images to the paper width
//! - dithering: threshold and error-diffusion dithering
//! - bitmap: pack dithered rows into print lines
//! - font: text rasterization
//! - ble: btleplug sink

pub mod bitmap;
pub mod ble;
pub mod config;
pub mod dithering;
pub mod error;
pub mod font;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod transport;

pub use bitmap::{PrintLine, pack_lines, render_lines};
pub use ble::BleSink;
pub use config::{JobOptions, LineMode, PrinterConfig};
pub use dithering::ContentClass;
pub use error::{Error, Result};
/// Session API
pub use printer::{DeviceState, PrinterSession, SessionPhase};
pub use transport::{PauseFlag, Sink, TransportBuffer};
