//! Codec for the Commodore 64 cassette tape image format (.tap).
//!
//! Decoding runs in layers: the [`pulse`] classifier turns raw payload
//! bytes into typed pulses, the [`demod`] state machine recovers framed
//! kernal bytes, the [`block`] framer groups them into countdown-prefixed
//! blocks, and [`export`] pairs header and data blocks back into PRG
//! program images. [`encode`] and [`wave`] are the inverse: they render a
//! PRG as a byte-accurate TAP image or a float-PCM WAVE recording.

pub mod block;
pub mod container;
pub mod demod;
pub mod encode;
pub mod error;
pub mod export;
pub mod header;
pub mod pulse;
pub mod version;
pub mod wave;
