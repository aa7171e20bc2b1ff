use std::io::{self, Seek, SeekFrom, Write};

use crate::block::{KernalBlock, COUNTDOWN_BACKUP, COUNTDOWN_PRIMARY};
use crate::container::{TapVersion, LENGTH_OFFSET, TAP_MAGIC};
use crate::error::Result;
use crate::export::PrgFile;
use crate::header::{KernalHeader, FILENAME_DISPLAYED_LEN, FILENAME_HIDDEN_LEN};
use crate::pulse::PulseCategory;

// Target pulse lengths in cycles for emission. All three are divisible
// into a single TAP byte by the truncating /8 without loss.
pub const SHORT_PULSE_CYCLES: u32 = 360;
pub const MEDIUM_PULSE_CYCLES: u32 = 524;
pub const LONG_PULSE_CYCLES: u32 = 687;

// Leader tone lengths in short pulses. Format-defined; the 27135-pulse
// leader is roughly ten seconds at PAL.
pub const LEADER_PULSES: u32 = 27135;
pub const BLOCK_GAP_PULSES: u32 = 5671;
pub const BACKUP_GAP_PULSES: u32 = 79;

/// Displayed filename written into synthesized headers.
pub const DEFAULT_FILENAME: &str = "C64-TAP-TOOL";

/// Sink for the logical pulse stream. The TAP and WAVE writers implement
/// this, so both render the identical stream.
pub trait PulseSink {
    fn write_pulse(&mut self, category: PulseCategory) -> io::Result<()>;
}

fn write_short_run<S: PulseSink>(sink: &mut S, count: u32) -> io::Result<()> {
    for _ in 0..count {
        sink.write_pulse(PulseCategory::Short)?;
    }
    Ok(())
}

/// Emit one framed kernal byte: (Long, Medium) marker, eight bit cells
/// LSB first, then the odd-parity cell.
fn write_byte<S: PulseSink>(sink: &mut S, byte: u8) -> io::Result<()> {
    sink.write_pulse(PulseCategory::Long)?;
    sink.write_pulse(PulseCategory::Medium)?;

    let mut parity_bit = 1u8;
    for bit in 0..8 {
        if byte & (1 << bit) != 0 {
            sink.write_pulse(PulseCategory::Medium)?;
            sink.write_pulse(PulseCategory::Short)?;
            parity_bit ^= 1;
        } else {
            sink.write_pulse(PulseCategory::Short)?;
            sink.write_pulse(PulseCategory::Medium)?;
        }
    }

    if parity_bit == 1 {
        sink.write_pulse(PulseCategory::Medium)?;
        sink.write_pulse(PulseCategory::Short)?;
    } else {
        sink.write_pulse(PulseCategory::Short)?;
        sink.write_pulse(PulseCategory::Medium)?;
    }
    Ok(())
}

/// Emit a countdown, a payload, and its XOR checksum.
fn write_block<S: PulseSink>(sink: &mut S, countdown: &[u8; 9], payload: &[u8]) -> io::Result<()> {
    for &b in countdown {
        write_byte(sink, b)?;
    }
    for &b in payload {
        write_byte(sink, b)?;
    }
    write_byte(sink, KernalBlock::compute_checksum(payload))
}

/// The (Long, Short) marker separating a block from its backup's leader.
fn write_end_of_data<S: PulseSink>(sink: &mut S) -> io::Result<()> {
    sink.write_pulse(PulseCategory::Long)?;
    sink.write_pulse(PulseCategory::Short)
}

impl KernalHeader {
    /// Synthesize the header the kernal would have written for a PRG.
    pub fn for_prg(prg: &PrgFile) -> Self {
        let mut filename_displayed = [0x20u8; FILENAME_DISPLAYED_LEN];
        let name = DEFAULT_FILENAME.as_bytes();
        filename_displayed[..name.len()].copy_from_slice(name);

        KernalHeader {
            header_type: 0x01,
            load_address: prg.load_address,
            end_address: prg.end_address(),
            filename_displayed,
            filename_hidden: [0x20; FILENAME_HIDDEN_LEN],
        }
    }
}

/// Emit the complete kernal tape recording of a PRG: leader, header block
/// and its backup, inter-block leader, data block and its backup, with
/// end-of-data markers and short leaders between the copies.
pub fn write_prg_pulses<S: PulseSink>(prg: &PrgFile, sink: &mut S) -> io::Result<()> {
    let header_bytes = KernalHeader::for_prg(prg).to_bytes();

    write_short_run(sink, LEADER_PULSES)?;
    write_block(sink, &COUNTDOWN_PRIMARY, &header_bytes)?;
    write_end_of_data(sink)?;

    write_short_run(sink, BACKUP_GAP_PULSES)?;
    write_block(sink, &COUNTDOWN_BACKUP, &header_bytes)?;

    write_short_run(sink, BLOCK_GAP_PULSES)?;
    write_block(sink, &COUNTDOWN_PRIMARY, &prg.bytes)?;
    write_end_of_data(sink)?;

    write_short_run(sink, BACKUP_GAP_PULSES)?;
    write_block(sink, &COUNTDOWN_BACKUP, &prg.bytes)
}

/// TAP container writer: streams pulse bytes after the 20-byte header,
/// then patches the payload length on [`TapWriter::finish`].
pub struct TapWriter<W: Write + Seek> {
    writer: W,
    payload_len: u32,
}

impl<W: Write + Seek> TapWriter<W> {
    pub fn new(mut writer: W, version: TapVersion) -> io::Result<Self> {
        writer.write_all(TAP_MAGIC)?;
        writer.write_all(&[version.as_byte(), 0, 0, 0])?;
        writer.write_all(&0u32.to_le_bytes())?;
        Ok(TapWriter {
            writer,
            payload_len: 0,
        })
    }

    /// Patch the payload length field and hand the writer back.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.seek(SeekFrom::Start(LENGTH_OFFSET as u64))?;
        self.writer.write_all(&self.payload_len.to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write + Seek> PulseSink for TapWriter<W> {
    fn write_pulse(&mut self, category: PulseCategory) -> io::Result<()> {
        let cycles = match category {
            PulseCategory::Short => SHORT_PULSE_CYCLES,
            PulseCategory::Medium => MEDIUM_PULSE_CYCLES,
            PulseCategory::Long => LONG_PULSE_CYCLES,
            PulseCategory::Unknown => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "unclassified pulse has no TAP encoding",
                ));
            }
        };
        self.writer.write_all(&[(cycles / 8) as u8])?;
        self.payload_len += 1;
        Ok(())
    }
}

/// Synthesize a full TAP image of a PRG into a seekable writer.
pub fn encode_prg_to_tap<W: Write + Seek>(
    prg: &PrgFile,
    version: TapVersion,
    writer: W,
) -> Result<W> {
    let mut sink = TapWriter::new(writer, version)?;
    write_prg_pulses(prg, &mut sink)?;
    Ok(sink.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{parse_tap, PAYLOAD_OFFSET};
    use std::io::Cursor;

    /// Pulses per framed byte: marker, eight cells, parity cell.
    const PULSES_PER_BYTE: u32 = 2 + 8 * 2 + 2;

    struct CountingSink {
        short: u32,
        medium: u32,
        long: u32,
    }

    impl PulseSink for CountingSink {
        fn write_pulse(&mut self, category: PulseCategory) -> io::Result<()> {
            match category {
                PulseCategory::Short => self.short += 1,
                PulseCategory::Medium => self.medium += 1,
                PulseCategory::Long => self.long += 1,
                PulseCategory::Unknown => unreachable!(),
            }
            Ok(())
        }
    }

    #[test]
    fn test_byte_pulse_count() {
        let mut sink = CountingSink {
            short: 0,
            medium: 0,
            long: 0,
        };
        write_byte(&mut sink, 0x5A).unwrap();
        assert_eq!(sink.long, 1);
        assert_eq!(sink.short + sink.medium + sink.long, PULSES_PER_BYTE);
        // Each of the nine cells holds exactly one short and one medium
        assert_eq!(sink.short, 9);
        assert_eq!(sink.medium, 9 + 1);
    }

    #[test]
    fn test_container_length_is_patched() {
        let prg = PrgFile {
            load_address: 0x0801,
            bytes: vec![0xA9, 0x00],
        };
        let cursor = encode_prg_to_tap(&prg, TapVersion::V1, Cursor::new(Vec::new())).unwrap();
        let data = cursor.into_inner();

        let image = parse_tap(&data).unwrap();
        assert_eq!(image.declared_len as usize, data.len() - PAYLOAD_OFFSET);
        assert_eq!(image.version, TapVersion::V1);
    }

    #[test]
    fn test_payload_pulse_count_for_empty_prg() {
        let prg = PrgFile {
            load_address: 0x0801,
            bytes: Vec::new(),
        };
        let cursor = encode_prg_to_tap(&prg, TapVersion::V0, Cursor::new(Vec::new())).unwrap();
        let data = cursor.into_inner();

        // Header blocks carry 9 + 192 + 1 framed bytes, data blocks 9 + 0 + 1.
        let expected = LEADER_PULSES
            + 202 * PULSES_PER_BYTE
            + 2
            + BACKUP_GAP_PULSES
            + 202 * PULSES_PER_BYTE
            + BLOCK_GAP_PULSES
            + 10 * PULSES_PER_BYTE
            + 2
            + BACKUP_GAP_PULSES
            + 10 * PULSES_PER_BYTE;
        assert_eq!(data.len() - PAYLOAD_OFFSET, expected as usize);
    }

    #[test]
    fn test_emitted_pulse_bytes_are_canonical() {
        let prg = PrgFile {
            load_address: 0x0801,
            bytes: Vec::new(),
        };
        let cursor = encode_prg_to_tap(&prg, TapVersion::V1, Cursor::new(Vec::new())).unwrap();
        let data = cursor.into_inner();
        for &b in &data[PAYLOAD_OFFSET..] {
            assert!(
                b == (SHORT_PULSE_CYCLES / 8) as u8
                    || b == (MEDIUM_PULSE_CYCLES / 8) as u8
                    || b == (LONG_PULSE_CYCLES / 8) as u8,
                "unexpected pulse byte 0x{b:02X}"
            );
        }
    }

    #[test]
    fn test_synthesized_header_fields() {
        let prg = PrgFile {
            load_address: 0x0801,
            bytes: vec![0; 12],
        };
        let header = KernalHeader::for_prg(&prg);
        assert_eq!(header.header_type, 0x01);
        assert_eq!(header.load_address, 0x0801);
        assert_eq!(header.end_address, 0x080D);
        assert_eq!(header.display_name(), DEFAULT_FILENAME);
        assert!(header.filename_hidden.iter().all(|&b| b == 0x20));
    }
}
