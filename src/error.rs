use thiserror::Error;

use crate::printer::SessionPhase;

#[derive(Debug, Error)]
pub enum Error {
    /// Payload does not fit the 2-byte length field of a frame.
    #[error("payload of {0} bytes does not fit in a frame (max 65535)")]
    Encoding(usize),

    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),

    /// The sink refused a write. Whatever was buffered is gone.
    #[error("transport write failed: {0}")]
    Transport(String),

    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cannot {op} while session is {phase:?}")]
    Sequencing {
        op: &'static str,
        phase: SessionPhase,
    },
}

impl Error {
    /// True for failures of the underlying link, which end the session.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Ble(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
