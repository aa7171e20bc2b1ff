use crate::block::{CountdownKind, KernalBlock, TapAnalysis};
use crate::error::{Result, TapError};
use crate::header::KernalHeader;

/// A C64 program image: load address plus the raw bytes loaded at it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PrgFile {
    pub load_address: u16,
    pub bytes: Vec<u8>,
}

impl PrgFile {
    /// Parse a .prg file image: 2-byte little-endian load address, then payload.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(TapError::PrgTooShort { got: raw.len() });
        }
        Ok(PrgFile {
            load_address: u16::from_le_bytes([raw[0], raw[1]]),
            bytes: raw[2..].to_vec(),
        })
    }

    /// Serialise back to the .prg file layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.bytes.len());
        out.extend_from_slice(&self.load_address.to_le_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    /// Address of the first byte past the program.
    pub fn end_address(&self) -> u16 {
        self.load_address.wrapping_add(self.bytes.len() as u16)
    }
}

/// A program recovered from a header/data block group.
#[derive(Debug, Clone, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct RecoveredFile {
    /// Index of the primary header block in the analysis block list.
    pub block_index: usize,
    pub header: KernalHeader,
    pub prg: PrgFile,
    /// The primary header copy failed its checksum and the backup was used.
    pub used_backup_header: bool,
    /// The primary data copy failed its checksum and the backup was used.
    pub used_backup_data: bool,
    /// The header's end address disagrees with the data block length.
    pub end_address_mismatch: bool,
}

/// Outcome of walking a block list for exportable programs.
#[derive(Debug, Default)]
pub struct Recovery {
    pub files: Vec<RecoveredFile>,
    /// Non-fatal problems encountered while pairing blocks.
    pub issues: Vec<TapError>,
}

/// Pick a block copy: the primary unless its checksum failed and the
/// backup's passed. The kernal records every block twice for exactly this
/// recovery.
fn pick_copy<'a>(
    primary: &'a KernalBlock,
    backup: &'a KernalBlock,
) -> (&'a KernalBlock, bool) {
    if !primary.checksum_ok && backup.checksum_ok {
        (backup, true)
    } else {
        (primary, false)
    }
}

/// Walk the finalized block list and reconstruct PRG files.
///
/// Each file is carried by four blocks in file order: header primary,
/// header backup, data primary, data backup, matched here on the countdown
/// parity bit rather than by blind indexing. Groups that do not fit the
/// pattern are skipped and reported.
pub fn recover_files(analysis: &TapAnalysis) -> Recovery {
    let blocks = &analysis.blocks;
    let mut recovery = Recovery::default();

    let mut i = 0;
    while i < blocks.len() {
        if !KernalHeader::is_primary_header_block(&blocks[i]) {
            i += 1;
            continue;
        }

        let Some(group) = blocks.get(i..i + 4) else {
            recovery
                .issues
                .push(TapError::UnexpectedBlockShape { index: i });
            i += 1;
            continue;
        };

        let [header_primary, header_backup, data_primary, data_backup] = group else {
            unreachable!("get(i..i + 4) yields four blocks");
        };

        let shape_ok = header_backup.countdown == CountdownKind::Backup
            && header_backup.len() == header_primary.len()
            && data_primary.countdown == CountdownKind::Primary
            && data_backup.countdown == CountdownKind::Backup;
        if !shape_ok {
            recovery
                .issues
                .push(TapError::UnexpectedBlockShape { index: i });
            i += 1;
            continue;
        }

        let (header_block, used_backup_header) = pick_copy(header_primary, header_backup);
        let Some(header) = KernalHeader::from_block(header_block)
            .or_else(|| KernalHeader::from_block(header_primary))
        else {
            recovery
                .issues
                .push(TapError::UnexpectedBlockShape { index: i });
            i += 1;
            continue;
        };

        let (data_block, used_backup_data) = pick_copy(data_primary, data_backup);

        let prg = PrgFile {
            load_address: header.load_address,
            bytes: data_block.payload().to_vec(),
        };
        let end_address_mismatch = header.end_address != prg.end_address();

        recovery.files.push(RecoveredFile {
            block_index: i,
            header,
            prg,
            used_backup_header,
            used_backup_data,
            end_address_mismatch,
        });

        i += 4;
    }

    recovery
}
