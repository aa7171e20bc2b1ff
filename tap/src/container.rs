use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{Result, TapError};

/// Twelve-byte signature at the start of every TAP file.
pub const TAP_MAGIC: &[u8; 12] = b"C64-TAPE-RAW";

/// Byte offset of the little-endian payload length field.
pub const LENGTH_OFFSET: usize = 0x10;

/// Byte offset at which the pulse payload starts.
pub const PAYLOAD_OFFSET: usize = 0x14;

/// TAP container version byte.
///
/// The two versions differ only in the meaning of a zero pulse byte:
/// version 0 treats it as a single 2048-cycle overflow pulse, version 1
/// as an escape introducing a 24-bit absolute cycle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum TapVersion {
    V0,
    V1,
}

impl TapVersion {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(TapVersion::V0),
            1 => Ok(TapVersion::V1),
            got => Err(TapError::UnsupportedVersion { got }),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            TapVersion::V0 => 0,
            TapVersion::V1 => 1,
        }
    }
}

/// Parsed TAP container.
#[derive(Debug, Clone)]
pub struct TapImage {
    pub version: TapVersion,
    /// Payload length declared in the header. The pulse decoder trusts the
    /// actual payload size; callers may compare and warn on disagreement.
    pub declared_len: u32,
    /// Pulse bytes from offset 0x14 to end of file.
    pub payload: Vec<u8>,
}

impl TapImage {
    /// Actual payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Parse a TAP container from a full file image.
pub fn parse_tap(data: &[u8]) -> Result<TapImage> {
    if data.len() < TAP_MAGIC.len() || &data[..TAP_MAGIC.len()] != TAP_MAGIC {
        return Err(TapError::InvalidMagic);
    }

    let version = TapVersion::from_byte(data[TAP_MAGIC.len()])?;

    if data.len() < PAYLOAD_OFFSET {
        return Err(TapError::TruncatedStream {
            offset: data.len() as u64,
        });
    }

    let declared_len = u32::from_le_bytes([
        data[LENGTH_OFFSET],
        data[LENGTH_OFFSET + 1],
        data[LENGTH_OFFSET + 2],
        data[LENGTH_OFFSET + 3],
    ]);

    Ok(TapImage {
        version,
        declared_len,
        payload: data[PAYLOAD_OFFSET..].to_vec(),
    })
}

/// Open a `.tap` or gzip-compressed `.tap.gz` file and parse the container.
///
/// Gzip-compressed files are fully decompressed into memory; TAP payloads
/// are small enough that a seekable-gzip scheme is not worth the complexity.
pub fn read_tap_file(path: &Path) -> Result<TapImage> {
    let is_gz = path.to_str().map(|s| s.ends_with(".gz")).unwrap_or(false);

    let mut data = Vec::new();
    if is_gz {
        let file = File::open(path)?;
        let mut decoder = GzDecoder::new(file);
        decoder.read_to_end(&mut data)?;
    } else {
        let mut file = File::open(path)?;
        file.read_to_end(&mut data)?;
    }

    parse_tap(&data)
}
