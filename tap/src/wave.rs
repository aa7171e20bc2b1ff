use std::io::{self, Seek, SeekFrom, Write};

use crate::encode::{write_prg_pulses, PulseSink};
use crate::error::Result;
use crate::export::PrgFile;
use crate::pulse::PulseCategory;

/// Audio frequencies for the three pulse lengths, derived from the PAL
/// cycle counts (985248 / cycles).
pub const SHORT_PULSE_HZ: f32 = 2737.0;
pub const MEDIUM_PULSE_HZ: f32 = 1882.0;
pub const LONG_PULSE_HZ: f32 = 1434.0;

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;
const HEADER_LEN: u32 = 44;

/// WAVE renderer for the pulse stream: each pulse becomes one inverted
/// full sine period at the pulse's frequency. Mono, 32-bit IEEE float.
/// The RIFF and data chunk sizes are patched on [`WavWriter::finish`].
pub struct WavWriter<W: Write + Seek> {
    writer: W,
    sample_rate: u32,
    samples_written: u32,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut writer: W, sample_rate: u32) -> io::Result<Self> {
        let byte_rate = sample_rate * size_of::<f32>() as u32;
        let block_align = size_of::<f32>() as u16;

        writer.write_all(b"RIFF")?;
        writer.write_all(&0u32.to_le_bytes())?; // patched in finish()
        writer.write_all(b"WAVE")?;
        writer.write_all(b"fmt ")?;
        writer.write_all(&16u32.to_le_bytes())?;
        writer.write_all(&3u16.to_le_bytes())?; // IEEE float
        writer.write_all(&1u16.to_le_bytes())?; // mono
        writer.write_all(&sample_rate.to_le_bytes())?;
        writer.write_all(&byte_rate.to_le_bytes())?;
        writer.write_all(&block_align.to_le_bytes())?;
        writer.write_all(&32u16.to_le_bytes())?;
        writer.write_all(b"data")?;
        writer.write_all(&0u32.to_le_bytes())?; // patched in finish()

        Ok(WavWriter {
            writer,
            sample_rate,
            samples_written: 0,
        })
    }

    /// Samples in one period of the given tone at this writer's rate.
    fn samples_per_period(&self, frequency: f32) -> u32 {
        (self.sample_rate as f32 / frequency).round() as u32
    }

    /// Patch the RIFF and data chunk sizes and hand the writer back.
    pub fn finish(mut self) -> io::Result<W> {
        let data_size = self.samples_written * size_of::<f32>() as u32;

        self.writer.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.writer
            .write_all(&(HEADER_LEN - 8 + data_size).to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.writer.write_all(&data_size.to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write + Seek> PulseSink for WavWriter<W> {
    fn write_pulse(&mut self, category: PulseCategory) -> io::Result<()> {
        let frequency = match category {
            PulseCategory::Short => SHORT_PULSE_HZ,
            PulseCategory::Medium => MEDIUM_PULSE_HZ,
            PulseCategory::Long => LONG_PULSE_HZ,
            PulseCategory::Unknown => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "unclassified pulse has no WAVE encoding",
                ));
            }
        };

        let period = self.samples_per_period(frequency);
        for sample in 0..period {
            let t = sample as f32 / self.sample_rate as f32;
            // The datasette signal is inverted relative to the sine
            let value = -(2.0 * std::f32::consts::PI * frequency * t).sin();
            self.writer.write_all(&value.to_le_bytes())?;
        }
        self.samples_written += period;
        Ok(())
    }
}

/// Render a PRG's tape recording as a float-PCM WAVE file.
///
/// The pulse stream is identical to the TAP rendering; only the backend
/// differs.
pub fn encode_prg_to_wav<W: Write + Seek>(
    prg: &PrgFile,
    sample_rate: u32,
    writer: W,
) -> Result<W> {
    let mut sink = WavWriter::new(writer, sample_rate)?;
    write_prg_pulses(prg, &mut sink)?;
    Ok(sink.finish()?)
}
