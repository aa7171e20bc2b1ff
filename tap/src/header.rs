use crate::block::{CountdownKind, KernalBlock, MIN_BLOCK_LEN};

/// Payload size of a kernal header block.
pub const HEADER_PAYLOAD_LEN: usize = 192;

/// On-tape size of a header block: countdown, payload, checksum.
pub const HEADER_BLOCK_LEN: usize = MIN_BLOCK_LEN + HEADER_PAYLOAD_LEN;

/// Length of the filename field shown by the kernal LOAD routine.
pub const FILENAME_DISPLAYED_LEN: usize = 16;

/// Length of the filename tail the kernal stores but never shows.
pub const FILENAME_HIDDEN_LEN: usize = 171;

/// Header types the kernal writes.
pub const HEADER_TYPE_MIN: u8 = 0x01;
pub const HEADER_TYPE_MAX: u8 = 0x05;

/// Decoded kernal header block payload.
///
/// Decoded field by field rather than overlaid on the raw buffer, so the
/// little-endian addresses and the 0x20 padding are explicit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct KernalHeader {
    pub header_type: u8,
    pub load_address: u16,
    pub end_address: u16,
    /// Sixteen bytes, right-padded with 0x20.
    pub filename_displayed: [u8; FILENAME_DISPLAYED_LEN],
    /// 171 bytes, right-padded with 0x20. Preserved verbatim on export.
    #[cfg_attr(feature = "jsonschema", schemars(with = "Vec<u8>"))]
    #[serde(serialize_with = "serialize_hidden")]
    pub filename_hidden: [u8; FILENAME_HIDDEN_LEN],
}

fn serialize_hidden<S>(bytes: &[u8; FILENAME_HIDDEN_LEN], s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.collect_seq(bytes.iter())
}

impl KernalHeader {
    /// Decode a 192-byte header payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() != HEADER_PAYLOAD_LEN {
            return None;
        }

        let header_type = payload[0];
        if !(HEADER_TYPE_MIN..=HEADER_TYPE_MAX).contains(&header_type) {
            return None;
        }

        let mut filename_displayed = [0u8; FILENAME_DISPLAYED_LEN];
        filename_displayed.copy_from_slice(&payload[5..5 + FILENAME_DISPLAYED_LEN]);
        let mut filename_hidden = [0u8; FILENAME_HIDDEN_LEN];
        filename_hidden.copy_from_slice(&payload[21..21 + FILENAME_HIDDEN_LEN]);

        Some(KernalHeader {
            header_type,
            load_address: u16::from_le_bytes([payload[1], payload[2]]),
            end_address: u16::from_le_bytes([payload[3], payload[4]]),
            filename_displayed,
            filename_hidden,
        })
    }

    /// Decode the header carried by a block, if the block has the header
    /// shape: exactly 202 bytes with a type byte in the kernal range.
    pub fn from_block(block: &KernalBlock) -> Option<Self> {
        if block.len() != HEADER_BLOCK_LEN {
            return None;
        }
        Self::parse(block.payload())
    }

    /// Whether a block looks like the primary copy of a header block.
    pub fn is_primary_header_block(block: &KernalBlock) -> bool {
        block.countdown == CountdownKind::Primary && Self::from_block(block).is_some()
    }

    /// Re-encode to the 192-byte on-tape payload layout.
    pub fn to_bytes(&self) -> [u8; HEADER_PAYLOAD_LEN] {
        let mut bytes = [0u8; HEADER_PAYLOAD_LEN];
        bytes[0] = self.header_type;
        bytes[1..3].copy_from_slice(&self.load_address.to_le_bytes());
        bytes[3..5].copy_from_slice(&self.end_address.to_le_bytes());
        bytes[5..5 + FILENAME_DISPLAYED_LEN].copy_from_slice(&self.filename_displayed);
        bytes[21..21 + FILENAME_HIDDEN_LEN].copy_from_slice(&self.filename_hidden);
        bytes
    }

    /// Displayed filename with the 0x20 padding trimmed, for presentation
    /// only; the underlying bytes are preserved.
    pub fn display_name(&self) -> String {
        let trimmed_len = self
            .filename_displayed
            .iter()
            .rposition(|&b| b != 0x20)
            .map_or(0, |i| i + 1);
        self.filename_displayed[..trimmed_len]
            .iter()
            .map(|&b| {
                if (0x20..0x7F).contains(&b) {
                    b as char
                } else {
                    '?'
                }
            })
            .collect()
    }

    pub fn type_name(&self) -> &'static str {
        match self.header_type {
            0x01 => "relocatable program",
            0x02 => "data block",
            0x03 => "non-relocatable program",
            0x04 => "data file header",
            0x05 => "end of tape",
            _ => "unknown",
        }
    }
}
