use crate::container::{TapImage, PAYLOAD_OFFSET};
use crate::demod::{DemodulatedByte, Demodulator};
use crate::error::TapError;
use crate::pulse::PulseReader;

/// Countdown prefix of a primary block copy.
pub const COUNTDOWN_PRIMARY: [u8; 9] = [0x89, 0x88, 0x87, 0x86, 0x85, 0x84, 0x83, 0x82, 0x81];

/// Countdown prefix of a backup block copy.
pub const COUNTDOWN_BACKUP: [u8; 9] = [0x09, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01];

/// Shortest well-formed block: nine countdown bytes plus the checksum.
pub const MIN_BLOCK_LEN: usize = COUNTDOWN_PRIMARY.len() + 1;

/// Which countdown alphabet a block's first nine bytes matched.
///
/// The high bit of the first countdown byte distinguishes the primary copy
/// (set) from the backup copy (clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum CountdownKind {
    Primary,
    Backup,
    Invalid,
}

/// A finalized kernal block with its validation results.
///
/// Blocks that fail validation are flagged, never discarded; policy is the
/// caller's.
#[derive(Debug, Clone, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct KernalBlock {
    /// Raw block bytes: countdown prefix, payload, trailing checksum.
    pub bytes: Vec<u8>,
    pub countdown: CountdownKind,
    pub checksum_ok: bool,
    /// Number of bytes in this block whose odd-parity check failed.
    pub parity_errors: u32,
}

impl KernalBlock {
    fn finalize(bytes: Vec<u8>, parity_errors: u32) -> Self {
        let countdown = match bytes.get(..COUNTDOWN_PRIMARY.len()) {
            Some(prefix) if prefix == COUNTDOWN_PRIMARY.as_slice() => CountdownKind::Primary,
            Some(prefix) if prefix == COUNTDOWN_BACKUP.as_slice() => CountdownKind::Backup,
            _ => CountdownKind::Invalid,
        };

        let checksum_ok = bytes.len() >= MIN_BLOCK_LEN
            && Self::compute_checksum(&bytes[COUNTDOWN_PRIMARY.len()..bytes.len() - 1])
                == bytes[bytes.len() - 1];

        KernalBlock {
            bytes,
            countdown,
            checksum_ok,
            parity_errors,
        }
    }

    /// XOR of a byte run, as the kernal computes block checksums.
    pub fn compute_checksum(payload: &[u8]) -> u8 {
        payload.iter().fold(0, |acc, b| acc ^ b)
    }

    /// Payload bytes: everything between the countdown prefix and the
    /// trailing checksum. Empty for malformed short blocks.
    pub fn payload(&self) -> &[u8] {
        if self.bytes.len() >= MIN_BLOCK_LEN {
            &self.bytes[COUNTDOWN_PRIMARY.len()..self.bytes.len() - 1]
        } else {
            &[]
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Group demodulated bytes into blocks on the block-start signal.
pub fn collect_blocks<I>(bytes: I) -> Vec<KernalBlock>
where
    I: IntoIterator<Item = DemodulatedByte>,
{
    let mut blocks = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut parity_errors: u32 = 0;

    for byte in bytes {
        if byte.starts_new_block && !current.is_empty() {
            blocks.push(KernalBlock::finalize(
                std::mem::take(&mut current),
                parity_errors,
            ));
            parity_errors = 0;
        }
        current.push(byte.value);
        if !byte.parity_ok {
            parity_errors += 1;
        }
    }

    if !current.is_empty() {
        blocks.push(KernalBlock::finalize(current, parity_errors));
    }

    blocks
}

/// Result of demodulating and framing a whole TAP image.
#[derive(Debug, Clone, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct TapAnalysis {
    /// TAP container version byte.
    pub version: u8,
    pub blocks: Vec<KernalBlock>,
    /// Whether the pulse stream ended mid-byte or inside a length escape.
    pub truncated: bool,
    /// Absolute file offset where truncation was detected.
    pub truncated_offset: Option<u64>,
}

impl TapAnalysis {
    /// Per-block validation failures as reportable errors. Parity failures
    /// are included here; they are never raised by the demodulator itself.
    pub fn issues(&self) -> Vec<TapError> {
        let mut issues = Vec::new();
        if let Some(offset) = self.truncated_offset {
            issues.push(TapError::TruncatedStream { offset });
        }
        for (index, block) in self.blocks.iter().enumerate() {
            if block.countdown == CountdownKind::Invalid {
                issues.push(TapError::CountdownMismatch { index });
            }
            if !block.checksum_ok {
                let expected = KernalBlock::compute_checksum(block.payload());
                let got = block.bytes.last().copied().unwrap_or(0);
                issues.push(TapError::ChecksumMismatch {
                    index,
                    expected,
                    got,
                });
            }
            if block.parity_errors > 0 {
                issues.push(TapError::ParityMismatch {
                    index,
                    count: block.parity_errors,
                });
            }
        }
        issues
    }
}

/// Demodulate and frame a TAP image into its kernal blocks.
pub fn analyze(image: &TapImage) -> TapAnalysis {
    let mut demod = Demodulator::new(PulseReader::new(&image.payload, image.version));

    let mut recovered = Vec::new();
    while let Some(byte) = demod.next_byte() {
        recovered.push(byte);
    }

    TapAnalysis {
        version: image.version.as_byte(),
        blocks: collect_blocks(recovered),
        truncated: demod.stream_truncated(),
        truncated_offset: demod
            .truncated_at()
            .map(|pos| (pos + PAYLOAD_OFFSET) as u64),
    }
}
