use crate::error::{Error, Result};

/// Every frame starts with these two bytes.
pub const PREAMBLE: [u8; 2] = [0x51, 0x78];

/// Every frame ends with this byte.
pub const TERMINATOR: u8 = 0xFF;

/// Largest payload the 2-byte length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// preamble + command + type + length
const HEADER_LEN: usize = 6;

/// Pause request, a GetDeviceState response carrying the pause flag.
pub const PAUSE_FRAME: [u8; 9] = [0x51, 0x78, 0xa3, 0x01, 0x01, 0x00, 0x10, 0x70, 0xff];

/// Resume request, a GetDeviceState response with no flag set.
pub const RESUME_FRAME: [u8; 9] = [0x51, 0x78, 0xa3, 0x01, 0x01, 0x00, 0x00, 0x00, 0xff];

/// Firmware-fixed camera preparation bytes. The length field is not a real
/// length, so this is sent verbatim instead of going through [`encode_frame`].
pub const PREPARE_CAMERA: [u8; 9] = [0x51, 0x78, 0xbc, 0x00, 0x01, 0x02, 0x01, 0x2d, 0xff];

/// Lattice payload opening a raster transfer.
pub const LATTICE_START: [u8; 11] = [
    0xaa, 0x55, 0x17, 0x38, 0x44, 0x5f, 0x5f, 0x5f, 0x44, 0x38, 0x2c,
];

/// Lattice payload closing a raster transfer.
pub const LATTICE_END: [u8; 11] = [
    0xaa, 0x55, 0x17, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x17,
];

/// CRC-8 (poly 0x07, init 0) lookup table.
const CRC8_TABLE: [u8; 256] = [
    0x00, 0x07, 0x0e, 0x09, 0x1c, 0x1b, 0x12, 0x15, 0x38, 0x3f, 0x36, 0x31, 0x24, 0x23, 0x2a, 0x2d,
    0x70, 0x77, 0x7e, 0x79, 0x6c, 0x6b, 0x62, 0x65, 0x48, 0x4f, 0x46, 0x41, 0x54, 0x53, 0x5a, 0x5d,
    0xe0, 0xe7, 0xee, 0xe9, 0xfc, 0xfb, 0xf2, 0xf5, 0xd8, 0xdf, 0xd6, 0xd1, 0xc4, 0xc3, 0xca, 0xcd,
    0x90, 0x97, 0x9e, 0x99, 0x8c, 0x8b, 0x82, 0x85, 0xa8, 0xaf, 0xa6, 0xa1, 0xb4, 0xb3, 0xba, 0xbd,
    0xc7, 0xc0, 0xc9, 0xce, 0xdb, 0xdc, 0xd5, 0xd2, 0xff, 0xf8, 0xf1, 0xf6, 0xe3, 0xe4, 0xed, 0xea,
    0xb7, 0xb0, 0xb9, 0xbe, 0xab, 0xac, 0xa5, 0xa2, 0x8f, 0x88, 0x81, 0x86, 0x93, 0x94, 0x9d, 0x9a,
    0x27, 0x20, 0x29, 0x2e, 0x3b, 0x3c, 0x35, 0x32, 0x1f, 0x18, 0x11, 0x16, 0x03, 0x04, 0x0d, 0x0a,
    0x57, 0x50, 0x59, 0x5e, 0x4b, 0x4c, 0x45, 0x42, 0x6f, 0x68, 0x61, 0x66, 0x73, 0x74, 0x7d, 0x7a,
    0x89, 0x8e, 0x87, 0x80, 0x95, 0x92, 0x9b, 0x9c, 0xb1, 0xb6, 0xbf, 0xb8, 0xad, 0xaa, 0xa3, 0xa4,
    0xf9, 0xfe, 0xf7, 0xf0, 0xe5, 0xe2, 0xeb, 0xec, 0xc1, 0xc6, 0xcf, 0xc8, 0xdd, 0xda, 0xd3, 0xd4,
    0x69, 0x6e, 0x67, 0x60, 0x75, 0x72, 0x7b, 0x7c, 0x51, 0x56, 0x5f, 0x58, 0x4d, 0x4a, 0x43, 0x44,
    0x19, 0x1e, 0x17, 0x10, 0x05, 0x02, 0x0b, 0x0c, 0x21, 0x26, 0x2f, 0x28, 0x3d, 0x3a, 0x33, 0x34,
    0x4e, 0x49, 0x40, 0x47, 0x52, 0x55, 0x5c, 0x5b, 0x76, 0x71, 0x78, 0x7f, 0x6a, 0x6d, 0x64, 0x63,
    0x3e, 0x39, 0x30, 0x37, 0x22, 0x25, 0x2c, 0x2b, 0x06, 0x01, 0x08, 0x0f, 0x1a, 0x1d, 0x14, 0x13,
    0xae, 0xa9, 0xa0, 0xa7, 0xb2, 0xb5, 0xbc, 0xbb, 0x96, 0x91, 0x98, 0x9f, 0x8a, 0x8d, 0x84, 0x83,
    0xde, 0xd9, 0xd0, 0xd7, 0xc2, 0xc5, 0xcc, 0xcb, 0xe6, 0xe1, 0xe8, 0xef, 0xfa, 0xfd, 0xf4, 0xf3,
];

/// Command ids understood by the printer firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Retract = 0xa0,
    Feed = 0xa1,
    Bitmap = 0xa2,
    GetDeviceState = 0xa3,
    SetDpi = 0xa4,
    Lattice = 0xa6,
    GetDeviceInfo = 0xa8,
    UpdateDevice = 0xa9,
    SetEnergy = 0xaf,
    SetSpeed = 0xbd,
    ApplyEnergy = 0xbe,
}

impl Command {
    pub fn from_u8(id: u8) -> Option<Self> {
        Some(match id {
            0xa0 => Command::Retract,
            0xa1 => Command::Feed,
            0xa2 => Command::Bitmap,
            0xa3 => Command::GetDeviceState,
            0xa4 => Command::SetDpi,
            0xa6 => Command::Lattice,
            0xa8 => Command::GetDeviceInfo,
            0xa9 => Command::UpdateDevice,
            0xaf => Command::SetEnergy,
            0xbd => Command::SetSpeed,
            0xbe => Command::ApplyEnergy,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Transfer = 0,
    Response = 1,
}

/// Computes the frame checksum of a payload.
///
/// Table driven CRC-8, running value starts at zero. An empty payload yields 0.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

/// Builds one frame for the printer.
///
/// Layout: preamble, command, type, payload length (LE u16), payload,
/// crc8(payload), terminator.
///
/// Returns `Error::Encoding` if the payload does not fit the length field.
pub fn encode_frame(command: Command, kind: CommandType, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::Encoding(payload.len()));
    }
    let len = payload.len() as u16;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + 2);
    out.extend_from_slice(&PREAMBLE);
    out.push(command as u8);
    out.push(kind as u8);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    out.push(crc8(payload));
    out.push(TERMINATOR);
    Ok(out)
}

/// A decoded frame, as received from the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub kind: CommandType,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl Frame {
    /// Validates and decodes a single frame.
    ///
    /// Trailing bytes after the terminator are rejected.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + 2 {
            return Err(Error::InvalidFrame("packet too short"));
        }
        if data[0..2] != PREAMBLE {
            return Err(Error::InvalidFrame("bad preamble"));
        }
        let kind = match data[3] {
            0 => CommandType::Transfer,
            1 => CommandType::Response,
            _ => return Err(Error::InvalidFrame("unknown command type")),
        };
        let payload_len = u16::from_le_bytes([data[4], data[5]]) as usize;
        if data.len() != HEADER_LEN + payload_len + 2 {
            return Err(Error::InvalidFrame("length field does not match frame size"));
        }
        let payload = data[HEADER_LEN..HEADER_LEN + payload_len].to_vec();
        let checksum = data[HEADER_LEN + payload_len];
        if checksum != crc8(&payload) {
            return Err(Error::InvalidFrame("checksum mismatch"));
        }
        if data[data.len() - 1] != TERMINATOR {
            return Err(Error::InvalidFrame("missing terminator"));
        }
        Ok(Frame {
            command: data[2],
            kind,
            payload,
            checksum,
        })
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_u8(self.command)
    }
}

/// Encodes `value` into a fixed-width field of `length` bytes.
///
/// Little-endian unless `big_endian` is set. Missing high bytes are zero,
/// bytes beyond `length` are dropped.
pub fn int_to_bytes(value: u64, length: usize, big_endian: bool) -> Vec<u8> {
    let mut out: Vec<u8> = value
        .to_le_bytes()
        .into_iter()
        .chain(std::iter::repeat(0))
        .take(length)
        .collect();
    if big_endian {
        out.reverse();
    }
    out
}

/// Reverses the bit order of a byte (PBM line mode).
pub fn reverse_bits(b: u8) -> u8 {
    let b = ((b & 0b1010_1010) >> 1) | ((b & 0b0101_0101) << 1);
    let b = ((b & 0b1100_1100) >> 2) | ((b & 0b0011_0011) << 2);
    ((b & 0b1111_0000) >> 4) | ((b & 0b0000_1111) << 4)
}

/// Splits data into chunks of given size.
///
/// - `data`: input bytes
/// - `chunk_size`: size of each chunk, 0 keeps the data whole
pub fn chunk_data(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if chunk_size == 0 {
        return vec![data];
    }
    data.chunks(chunk_size).collect()
}
