use std::io::Cursor;

use tap::block::{analyze, CountdownKind};
use tap::container::{parse_tap, TapVersion, PAYLOAD_OFFSET};
use tap::encode::{encode_prg_to_tap, write_prg_pulses, PulseSink, LEADER_PULSES};
use tap::error::TapError;
use tap::export::{recover_files, PrgFile};
use tap::pulse::{PulseCategory, PulseReader};

/// Pulses per framed kernal byte: marker, eight bit cells, parity cell.
const PULSES_PER_BYTE: usize = 2 + 8 * 2 + 2;

/// Classic BASIC stub: 10 SYS2061.
const BASIC_STUB: &[u8] = &[
    0x01, 0x08, 0x0A, 0x00, 0x00, 0x00, 0x9E, 0x32, 0x30, 0x36, 0x31, 0x00, 0x00, 0x00,
];

fn encode_to_vec(prg: &PrgFile, version: TapVersion) -> Vec<u8> {
    encode_prg_to_tap(prg, version, Cursor::new(Vec::new()))
        .unwrap()
        .into_inner()
}

#[test]
fn roundtrip_basic_stub() {
    let prg = PrgFile::from_bytes(BASIC_STUB).unwrap();
    let data = encode_to_vec(&prg, TapVersion::V1);

    let image = parse_tap(&data).unwrap();
    let analysis = analyze(&image);

    assert_eq!(analysis.blocks.len(), 4);
    assert!(!analysis.truncated);
    for block in &analysis.blocks {
        assert!(block.checksum_ok);
        assert_ne!(block.countdown, CountdownKind::Invalid);
        assert_eq!(block.parity_errors, 0);
    }
    assert_eq!(analysis.blocks[0].countdown, CountdownKind::Primary);
    assert_eq!(analysis.blocks[1].countdown, CountdownKind::Backup);

    let recovery = recover_files(&analysis);
    assert!(recovery.issues.is_empty());
    assert_eq!(recovery.files.len(), 1);

    let file = &recovery.files[0];
    assert_eq!(file.header.display_name(), "C64-TAP-TOOL");
    assert_eq!(file.header.load_address, 0x0801);
    assert_eq!(file.header.end_address, 0x080D);
    assert!(!file.end_address_mismatch);
    assert_eq!(file.prg, prg);
    assert_eq!(file.prg.to_bytes(), BASIC_STUB);
}

#[test]
fn roundtrip_empty_prg() {
    // Just a load address: the data block is a lone zero checksum byte
    let prg = PrgFile {
        load_address: 0x0801,
        bytes: Vec::new(),
    };
    let data = encode_to_vec(&prg, TapVersion::V1);
    let analysis = analyze(&parse_tap(&data).unwrap());

    assert_eq!(analysis.blocks.len(), 4);
    let data_block = &analysis.blocks[2];
    assert_eq!(data_block.len(), 10);
    assert!(data_block.payload().is_empty());
    assert_eq!(*data_block.bytes.last().unwrap(), 0x00);
    assert!(data_block.checksum_ok);

    let recovery = recover_files(&analysis);
    assert_eq!(recovery.files.len(), 1);
    assert_eq!(recovery.files[0].prg, prg);
}

#[test]
fn roundtrip_v0_container() {
    let prg = PrgFile::from_bytes(BASIC_STUB).unwrap();
    let data = encode_to_vec(&prg, TapVersion::V0);
    let image = parse_tap(&data).unwrap();
    assert_eq!(image.version, TapVersion::V0);

    let recovery = recover_files(&analyze(&image));
    assert_eq!(recovery.files.len(), 1);
    assert_eq!(recovery.files[0].prg, prg);
}

#[test]
fn parity_corruption_is_isolated() {
    let prg = PrgFile::from_bytes(BASIC_STUB).unwrap();
    let mut data = encode_to_vec(&prg, TapVersion::V1);

    // Swap the two pulses of one bit cell inside the primary header's
    // sixth payload byte (the first filename character). The bit flips, so
    // the parity cell no longer matches.
    let byte_frame_start =
        PAYLOAD_OFFSET + LEADER_PULSES as usize + (9 + 5) * PULSES_PER_BYTE;
    let first_cell = byte_frame_start + 2;
    data.swap(first_cell, first_cell + 1);

    let analysis = analyze(&parse_tap(&data).unwrap());

    assert_eq!(analysis.blocks.len(), 4);
    let total_parity_errors: u32 = analysis.blocks.iter().map(|b| b.parity_errors).sum();
    assert_eq!(total_parity_errors, 1);
    assert_eq!(analysis.blocks[0].parity_errors, 1);
    assert!(!analysis.blocks[0].checksum_ok);
    assert_eq!(analysis.blocks[0].countdown, CountdownKind::Primary);
    // The other three blocks are untouched
    for block in &analysis.blocks[1..] {
        assert!(block.checksum_ok);
    }

    // The backup header copy still recovers the file intact
    let recovery = recover_files(&analysis);
    assert_eq!(recovery.files.len(), 1);
    assert!(recovery.files[0].used_backup_header);
    assert_eq!(recovery.files[0].header.display_name(), "C64-TAP-TOOL");
    assert_eq!(recovery.files[0].prg, prg);
}

#[test]
fn truncated_v1_escape_is_reported_once() {
    let prg = PrgFile::from_bytes(BASIC_STUB).unwrap();
    let mut data = encode_to_vec(&prg, TapVersion::V1);
    data.push(0x00); // lone escape byte at end of payload

    let analysis = analyze(&parse_tap(&data).unwrap());

    assert!(analysis.truncated);
    assert_eq!(analysis.truncated_offset, Some((data.len() - 1) as u64));
    // The blocks recovered so far are intact
    assert_eq!(analysis.blocks.len(), 4);
    let truncation_issues = analysis
        .issues()
        .iter()
        .filter(|e| matches!(e, TapError::TruncatedStream { .. }))
        .count();
    assert_eq!(truncation_issues, 1);

    assert_eq!(recover_files(&analysis).files.len(), 1);
}

#[test]
fn decode_hand_built_tap() {
    // Build the pulse stream by hand, independent of the encoder.
    const S: u8 = 45;
    const M: u8 = 65;
    const L: u8 = 85;

    fn push_byte(out: &mut Vec<u8>, value: u8) {
        out.extend_from_slice(&[L, M]);
        let mut parity = 1u8;
        for bit in 0..8 {
            if value & (1 << bit) != 0 {
                out.extend_from_slice(&[M, S]);
                parity ^= 1;
            } else {
                out.extend_from_slice(&[S, M]);
            }
        }
        if parity == 1 {
            out.extend_from_slice(&[M, S]);
        } else {
            out.extend_from_slice(&[S, M]);
        }
    }

    fn push_block(out: &mut Vec<u8>, countdown: &[u8; 9], payload: &[u8]) {
        for &b in countdown {
            push_byte(out, b);
        }
        let mut checksum = 0u8;
        for &b in payload {
            checksum ^= b;
            push_byte(out, b);
        }
        push_byte(out, checksum);
    }

    let program: &[u8] = &[0xA9, 0x00, 0x8D, 0x20, 0xD0, 0x60];
    let mut header = vec![0x01, 0x01, 0x08];
    header.extend_from_slice(&(0x0801u16 + program.len() as u16).to_le_bytes());
    let mut name = [0x20u8; 16];
    name[..7].copy_from_slice(b"TESTPRG");
    header.extend_from_slice(&name);
    header.extend_from_slice(&[0x20; 171]);

    let countdown_primary = [0x89, 0x88, 0x87, 0x86, 0x85, 0x84, 0x83, 0x82, 0x81];
    let countdown_backup = [0x09, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01];

    let mut payload = vec![S; 27135];
    push_block(&mut payload, &countdown_primary, &header);
    payload.extend_from_slice(&[L, S]);
    payload.extend_from_slice(&[S; 79]);
    push_block(&mut payload, &countdown_backup, &header);
    payload.extend_from_slice(&[S; 5671]);
    push_block(&mut payload, &countdown_primary, program);
    payload.extend_from_slice(&[L, S]);
    payload.extend_from_slice(&[S; 79]);
    push_block(&mut payload, &countdown_backup, program);

    let mut data = Vec::new();
    data.extend_from_slice(b"C64-TAPE-RAW");
    data.extend_from_slice(&[1, 0, 0, 0]);
    data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    data.extend_from_slice(&payload);

    let analysis = analyze(&parse_tap(&data).unwrap());
    assert_eq!(analysis.blocks.len(), 4);
    assert!(!analysis.truncated);
    for block in &analysis.blocks {
        assert!(block.checksum_ok);
        assert_ne!(block.countdown, CountdownKind::Invalid);
    }

    let recovery = recover_files(&analysis);
    assert_eq!(recovery.files.len(), 1);
    let file = &recovery.files[0];
    assert_eq!(file.header.display_name(), "TESTPRG");
    assert_eq!(file.header.load_address, 0x0801);
    assert_eq!(file.header.end_address, 0x0807);
    assert_eq!(file.prg.bytes, program);
    assert!(!file.end_address_mismatch);
}

#[test]
fn tap_and_wave_render_the_same_pulse_stream() {
    struct Collector(Vec<PulseCategory>);
    impl PulseSink for Collector {
        fn write_pulse(&mut self, category: PulseCategory) -> std::io::Result<()> {
            self.0.push(category);
            Ok(())
        }
    }

    let prg = PrgFile::from_bytes(BASIC_STUB).unwrap();
    let mut logical = Collector(Vec::new());
    write_prg_pulses(&prg, &mut logical).unwrap();

    let data = encode_to_vec(&prg, TapVersion::V1);
    let image = parse_tap(&data).unwrap();
    let mut reader = PulseReader::new(&image.payload, image.version);
    let mut from_tap = Vec::new();
    while let Some(pulse) = reader.next_pulse() {
        from_tap.push(pulse.category);
    }

    assert_eq!(from_tap, logical.0);
}

#[test]
fn analysis_serializes_to_json() {
    let prg = PrgFile {
        load_address: 0x0801,
        bytes: vec![0xEA],
    };
    let data = encode_to_vec(&prg, TapVersion::V1);
    let analysis = analyze(&parse_tap(&data).unwrap());

    let json = serde_json::to_value(&analysis).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["blocks"].as_array().unwrap().len(), 4);
    assert_eq!(json["blocks"][0]["countdown"], "Primary");
}
