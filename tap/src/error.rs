use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a TAP file: missing C64-TAPE-RAW signature")]
    InvalidMagic,

    #[error("unsupported TAP version {got} (expected 0 or 1)")]
    UnsupportedVersion { got: u8 },

    #[error("truncated stream at offset 0x{offset:X}")]
    TruncatedStream { offset: u64 },

    #[error("block {index}: {count} byte(s) failed the odd-parity check")]
    ParityMismatch { index: usize, count: u32 },

    #[error("block {index}: checksum mismatch: expected 0x{expected:02X}, got 0x{got:02X}")]
    ChecksumMismatch { index: usize, expected: u8, got: u8 },

    #[error("block {index}: first nine bytes are not a kernal countdown")]
    CountdownMismatch { index: usize },

    #[error("block {index}: cannot pair header and data blocks")]
    UnexpectedBlockShape { index: usize },

    #[error("PRG file too short: {got} byte(s), need at least the 2-byte load address")]
    PrgTooShort { got: usize },
}

pub type Result<T> = std::result::Result<T, TapError>;
