use crate::container::TapVersion;

// Pulse length windows in C64 system clock cycles (PAL), as used by the
// kernal tape loader. Anything outside the three windows is noise.
pub const SHORT_PULSE_MIN: u32 = 288;
pub const SHORT_PULSE_MAX: u32 = 432;
pub const MEDIUM_PULSE_MIN: u32 = 440;
pub const MEDIUM_PULSE_MAX: u32 = 584;
pub const LONG_PULSE_MIN: u32 = 592;
pub const LONG_PULSE_MAX: u32 = 800;

/// Cycle count represented by a zero payload byte in a version 0 TAP.
pub const V0_OVERFLOW_CYCLES: u32 = 256 * 8;

/// Classified tape pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum PulseCategory {
    Short,
    Medium,
    Long,
    Unknown,
}

/// A single pulse event: its category and its raw duration in cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    pub category: PulseCategory,
    pub cycles: u32,
}

/// Map a cycle count onto a pulse category.
pub fn classify_cycles(cycles: u32) -> PulseCategory {
    match cycles {
        SHORT_PULSE_MIN..=SHORT_PULSE_MAX => PulseCategory::Short,
        MEDIUM_PULSE_MIN..=MEDIUM_PULSE_MAX => PulseCategory::Medium,
        LONG_PULSE_MIN..=LONG_PULSE_MAX => PulseCategory::Long,
        _ => PulseCategory::Unknown,
    }
}

/// Iterator-style reader over a TAP payload, decoding one pulse per call.
///
/// A payload byte `b != 0` encodes `b * 8` cycles. A zero byte is an escape:
/// in version 0 it stands for a single 2048-cycle overflow pulse, in
/// version 1 it introduces a 24-bit little-endian absolute cycle count in
/// the following three bytes. The reader is the single place this escape
/// handling lives.
pub struct PulseReader<'a> {
    payload: &'a [u8],
    pos: usize,
    version: TapVersion,
    truncated_at: Option<usize>,
}

impl<'a> PulseReader<'a> {
    pub fn new(payload: &'a [u8], version: TapVersion) -> Self {
        PulseReader {
            payload,
            pos: 0,
            version,
            truncated_at: None,
        }
    }

    /// Current cursor position within the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Payload offset of a version 1 escape that ran past the end of the
    /// buffer, if one was encountered.
    pub fn truncated_at(&self) -> Option<usize> {
        self.truncated_at
    }

    /// Decode the next pulse, or None at end of payload.
    pub fn next_pulse(&mut self) -> Option<Pulse> {
        let b = *self.payload.get(self.pos)?;

        let cycles = if b == 0 {
            match self.version {
                TapVersion::V0 => {
                    self.pos += 1;
                    V0_OVERFLOW_CYCLES
                }
                TapVersion::V1 => {
                    if self.pos + 4 > self.payload.len() {
                        // Escape runs past end of buffer: consume the rest
                        self.truncated_at = Some(self.pos);
                        self.pos = self.payload.len();
                        return Some(Pulse {
                            category: PulseCategory::Unknown,
                            cycles: 0,
                        });
                    }
                    let cycles = u32::from_le_bytes([
                        self.payload[self.pos + 1],
                        self.payload[self.pos + 2],
                        self.payload[self.pos + 3],
                        0,
                    ]);
                    self.pos += 4;
                    cycles
                }
            }
        } else {
            self.pos += 1;
            u32::from(b) * 8
        };

        Some(Pulse {
            category: classify_cycles(cycles),
            cycles,
        })
    }
}
