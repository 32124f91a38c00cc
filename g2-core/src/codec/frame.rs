//! Frame-level parsing: the extended/interrupt framings coming in on
//! endpoints `0x82`/`0x81`, and the outgoing frame builder for `0x03`.
//!
//! `spec.md` §4.5's "Extended frame"/"Interrupt frame"/"Outgoing frame"
//! paragraphs, and §6's exact offsets, are the contract this module
//! implements.

use super::constants::*;
use super::subrecords::{self, MorphVariation, ParamListEntry};
use crate::bitstream::BitStream;
use crate::crc16;
use crate::error::CodecError;
use crate::model::{Cable, KnobAssignment, Location, Module, PatchDescription, Slot};
use std::collections::HashMap;

/// Everything the patch-fetch sequence (`GetPatchSlot*`) can hand back
/// in one extended response: zero or more sub-records of each kind,
/// folded together. `module_names`/`param_names` are applied onto
/// `modules` by the caller (`session.rs`) once all slots are known,
/// since either sub-record may arrive before or after `ModuleList`.
#[derive(Debug, Clone, Default)]
pub struct ParsedPatch {
    pub descr: Option<PatchDescription>,
    pub location: Option<Location>,
    pub modules: Vec<Module>,
    pub cables: Vec<Cable>,
    pub param_lists: Vec<ParamValues>,
    pub param_names: Vec<(u8, HashMap<u8, [u8; 7]>)>,
    pub module_names: Vec<(u8, String)>,
    pub knobs: Vec<Option<KnobAssignment>>,
    pub controllers: Vec<Option<KnobAssignment>>,
    pub note2: Option<Vec<u8>>,
    pub patch_notes: Option<Vec<u8>>,
    pub morph_count: u8,
    pub morph: Vec<MorphVariation>,
}

#[derive(Debug, Clone)]
pub struct ParamValues {
    pub module_index: u8,
    pub param_count: u32,
    pub values: Vec<Vec<u8>>,
}

/// One unsolicited or solicited event the device produced, handed up to
/// `SessionMachine`.
#[derive(Debug, Clone)]
pub enum Indication {
    InitAck,
    Ok,
    Error,
    PatchVersion { slot: Slot, version: u8 },
    PatchVersionChange,
    SynthSettings(Vec<u8>),
    PatchName(String),
    Patch(Box<ParsedPatch>),
    ParamChange { location: Location, module_index: u8, param_index: u8, variation: u8, value: u8 },
    Volume { entries: Vec<(Location, u8, [u16; 2])> },
    Led { entries: Vec<(Location, u8, bool)> },
    Unknown(u8),
}

/// Parse one `RESPONSE_TYPE_INIT`/`RESPONSE_TYPE_COMMAND` frame
/// (`spec.md` §4.5 "Extended frame", minus the CRC which the caller has
/// already stripped via [`crate::crc16::split_and_verify`]).
///
/// `module_type_at(location, index)` resolves the real module type
/// occupying a grid slot in the *current* slot (`0` for "nothing
/// there"/unknown, the catalog's own sentinel) — `parse_volume_indicator`/
/// `parse_led_indicator` need it to know which indices carry data on the
/// wire, since neither sub-record tags its entries with a type.
pub fn parse_incoming(
    payload: &[u8],
    slot: Slot,
    param_count: impl Fn(u8) -> u32,
    volume_type: impl Fn(u8) -> crate::catalog::VolumeType,
    led_type: impl Fn(u8) -> crate::catalog::LedType,
    module_type_at: impl Fn(Location, u8) -> u8,
) -> Result<Indication, CodecError> {
    let mut bs = BitStream::from_bytes(payload.to_vec());
    let response_type = bs.read(8) as u8;
    match response_type {
        RESPONSE_TYPE_INIT => Ok(Indication::InitAck),
        RESPONSE_TYPE_COMMAND => {
            let _command = bs.read(8);
            let _version = bs.read(8);
            let sub_command = bs.read(8) as u8;
            parse_command_response(&mut bs, sub_command, slot, param_count, volume_type, led_type, module_type_at)
        }
        other => Err(CodecError::UnknownResponseType(other)),
    }
}

fn parse_command_response(
    bs: &mut BitStream,
    sub_command: u8,
    slot: Slot,
    param_count: impl Fn(u8) -> u32,
    volume_type: impl Fn(u8) -> crate::catalog::VolumeType,
    led_type: impl Fn(u8) -> crate::catalog::LedType,
    module_type_at: impl Fn(Location, u8) -> u8,
) -> Result<Indication, CodecError> {
    match sub_command {
        SUB_RESPONSE_OK => Ok(Indication::Ok),
        SUB_RESPONSE_ERROR => Ok(Indication::Error),
        SUB_RESPONSE_PATCH_VERSION_CHANGE => Ok(Indication::PatchVersionChange),
        SUB_RESPONSE_PATCH_VERSION => {
            let version = bs.read(8) as u8;
            Ok(Indication::PatchVersion { slot, version })
        }
        SUB_RESPONSE_SYNTH_SETTINGS => Ok(Indication::SynthSettings(remaining_bytes(bs))),
        SUB_RESPONSE_PATCH_NAME => Ok(Indication::PatchName(read_cstring(bs, 16))),
        SUB_RESPONSE_PARAM_CHANGE => {
            let location = Location::try_from(bs.read(2))?;
            let module_index = bs.read(8) as u8;
            let param_index = bs.read(8) as u8;
            let value = bs.read(8) as u8;
            let variation = bs.read(8) as u8;
            Ok(Indication::ParamChange { location, module_index, param_index, variation, value })
        }
        SUB_RESPONSE_VOLUME_INDICATOR => Ok(parse_volume_indicator(bs, volume_type, &module_type_at)),
        SUB_RESPONSE_LED_DATA => Ok(parse_led_indicator(bs, led_type, &module_type_at)),
        // Everything that arrives as a nested payload of sub-records
        // (the per-slot patch fetch): fold every sub-record we find.
        _ => Ok(Indication::Patch(Box::new(parse_patch_payload(bs, slot, param_count)?))),
    }
}

/// Parse the concatenated sub-records that make up a full patch fetch
/// response (`spec.md` §4.5: "the parser reads a subType/length header
/// ... and advances regardless of how much the handler consumed").
fn parse_patch_payload(bs: &mut BitStream, slot: Slot, param_count: impl Fn(u8) -> u32) -> Result<ParsedPatch, CodecError> {
    let mut out = ParsedPatch::default();
    let total_bits = bs.bit_len();
    while bs.bit_pos() + 8 <= total_bits {
        let (sub_type, next) = subrecords::read_subrecord_header(bs);
        match sub_type {
            SUB_RECORD_IGNORE_MARKER => {}
            SUB_RESPONSE_PATCH_DESCRIPTION => out.descr = Some(subrecords::parse_patch_descr(bs)),
            SUB_RESPONSE_MODULE_LIST => {
                let (location, modules) = subrecords::parse_module_list(bs, slot, &param_count)?;
                out.location = Some(location);
                out.modules = modules;
            }
            SUB_RESPONSE_CABLE_LIST => {
                let (_location, cables) = subrecords::parse_cable_list(bs, slot)?;
                out.cables = cables;
            }
            SUB_RESPONSE_PARAM_LIST => {
                let (_location, entries) = subrecords::parse_param_list(bs);
                out.param_lists = entries
                    .into_iter()
                    .map(|ParamListEntry { module_index, param_count, values }| ParamValues { module_index, param_count, values })
                    .collect();
            }
            SUB_RESPONSE_PARAM_NAMES => {
                let (_location, entries) = subrecords::parse_param_names(bs);
                out.param_names = entries;
            }
            SUB_RESPONSE_MODULE_NAMES => {
                let (_location, entries) = subrecords::parse_module_names(bs);
                out.module_names = entries;
            }
            SUB_RESPONSE_KNOBS => out.knobs = subrecords::parse_knobs(bs),
            SUB_RESPONSE_CONTROLLERS => out.controllers = subrecords::parse_knobs(bs),
            SUB_RESPONSE_CURRENT_NOTE_2 => out.note2 = Some(remaining_bytes_bounded(bs, next)),
            SUB_RESPONSE_PATCH_NOTES => out.patch_notes = Some(remaining_bytes_bounded(bs, next)),
            SUB_RESPONSE_MORPH_PARAMS => {
                let (morph_count, variations) = subrecords::parse_morph_params(bs);
                out.morph_count = morph_count;
                out.morph = variations;
            }
            _ => {}
        }
        bs.seek_bits(next);
    }
    // Fold per-module parameter values and names into `modules` now that
    // every sub-record has been seen at least once in this payload.
    for pv in &out.param_lists {
        if let Some(m) = out.modules.iter_mut().find(|m| m.key.index == pv.module_index) {
            // `spec.md` §3: the device-reported paramCount MUST equal
            // ModuleCatalog.param_count(moduleType); a mismatch can only
            // mean the catalog and the wire disagree about this module's
            // type, which is unrecoverable (`spec.md` §7).
            let expected = param_count(m.module_type);
            if pv.param_count != expected {
                return Err(CodecError::ProtocolInvariantViolated(format!(
                    "module {} (type {}): paramCount {} on the wire, catalog says {}",
                    pv.module_index, m.module_type, pv.param_count, expected
                )));
            }
            for (variation, values) in pv.values.iter().enumerate() {
                if variation < m.params.len() {
                    for (cell, v) in m.params[variation].iter_mut().zip(values) {
                        cell.value = *v;
                    }
                }
            }
        }
    }
    for v in &out.morph {
        let variation = v.variation as usize;
        for a in &v.assignments {
            if let Some(m) = out.modules.iter_mut().find(|m| m.key.index == a.module_index) {
                if let Some(cell) = m.params.get_mut(variation).and_then(|p| p.get_mut(a.param_index as usize)) {
                    if let Some(slot) = cell.morph_range.get_mut(a.morph as usize) {
                        *slot = a.range;
                    }
                }
            }
        }
    }
    for (module_index, names) in &out.param_names {
        if let Some(m) = out.modules.iter_mut().find(|m| m.key.index == *module_index) {
            m.param_names = names.clone();
        }
    }
    for (index, name) in &out.module_names {
        if let Some(m) = out.modules.iter_mut().find(|m| m.key.index == *index) {
            m.name = name.clone();
        }
    }
    Ok(out)
}

fn remaining_bytes(bs: &mut BitStream) -> Vec<u8> {
    let mut out = Vec::new();
    while bs.bit_pos() + 8 <= bs.bit_len() {
        out.push(bs.read(8) as u8);
    }
    out
}

fn remaining_bytes_bounded(bs: &mut BitStream, until_bit: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while bs.bit_pos() + 8 <= until_bit {
        out.push(bs.read(8) as u8);
    }
    out
}

fn read_cstring(bs: &mut BitStream, cap: usize) -> String {
    let mut bytes = Vec::with_capacity(cap);
    while bytes.len() < cap && bs.bit_pos() + 8 <= bs.bit_len() {
        let b = bs.read(8) as u8;
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// `spec.md` §4.5: iterate `location ∈ {1, 0}` in that order, then
/// `index ∈ 0..=255`, reading 16 or 32 bits per module depending on
/// `ModuleCatalog.volumeType`. The wire carries no type tag, so
/// `module_type_at(location, index)` resolves the real type of whatever
/// module the current slot has at that grid position (the already-parsed
/// module list, via `SessionMachine`/`PatchDb` — `0` when nothing is
/// there, matching the catalog's "unknown" sentinel, whose `volumeType`
/// is `None`).
fn parse_volume_indicator(
    bs: &mut BitStream,
    volume_type_for_module_type: impl Fn(u8) -> crate::catalog::VolumeType,
    module_type_at: &impl Fn(Location, u8) -> u8,
) -> Indication {
    use crate::catalog::VolumeType;
    let mut entries = Vec::new();
    for &location_raw in &[1u32, 0u32] {
        let location = Location::try_from(location_raw).unwrap_or(Location::Fx);
        for index in 0..=255u8 {
            if bs.bit_pos() + 1 > bs.bit_len() {
                break;
            }
            match volume_type_for_module_type(module_type_at(location, index)) {
                VolumeType::None => {}
                VolumeType::Mono => entries.push((location, index, [bs.read(16) as u16, 0])),
                VolumeType::Stereo | VolumeType::Compress => {
                    entries.push((location, index, [bs.read(16) as u16, bs.read(16) as u16]))
                }
            }
        }
    }
    Indication::Volume { entries }
}

/// `spec.md` §4.5: bit-reverse every byte of the payload in place
/// before parsing, then for each `ledType == Yes` module read 1 bit of
/// state + 1 bit of padding. `spec.md` doesn't spell out a per-location
/// split here the way it does for the volume indicator, but module
/// indices are only meaningful per location, so this iterates the same
/// `{Fx, Voice}` order as `parse_volume_indicator` (see `DESIGN.md`).
fn parse_led_indicator(
    bs: &mut BitStream,
    led_type_for_module_type: impl Fn(u8) -> crate::catalog::LedType,
    module_type_at: &impl Fn(Location, u8) -> u8,
) -> Indication {
    let reversed: Vec<u8> = remaining_bytes(bs).iter().map(|b| b.reverse_bits()).collect();
    let mut bits = BitStream::from_bytes(reversed);
    let mut entries = Vec::new();
    'outer: for &location_raw in &[1u32, 0u32] {
        let location = Location::try_from(location_raw).unwrap_or(Location::Fx);
        for index in 0..=255u8 {
            if bits.bit_pos() + 2 > bits.bit_len() {
                break 'outer;
            }
            if matches!(led_type_for_module_type(module_type_at(location, index)), crate::catalog::LedType::Yes) {
                let on = bits.read(1) != 0;
                let _padding = bits.read(1);
                entries.push((location, index, on));
            }
        }
    }
    Indication::Led { entries }
}

/// Bit-reverse a byte (MSB<->LSB), used standalone by property tests
/// (`spec.md` §8 property 10).
pub fn reverse_bits_in_place(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = b.reverse_bits();
    }
}

// --------------------------------------------------------- Interrupt framing

/// One interrupt-endpoint (`0x81`) read, decoded per `spec.md` §4.5.
pub enum InterruptFrame {
    /// `type == Embedded(0x02)`: the rest of the buffer is the payload.
    Embedded(Vec<u8>),
    /// `type == Extended(0x01)`: a follow-up extended read of this many
    /// bytes is needed.
    ExtendedFollowUp { data_length: usize },
    /// Nothing usable: an empty read, or the Apple-silicon all-zero
    /// quirk buffer that looks like an extended announcement but isn't.
    Empty,
}

pub fn parse_interrupt_frame(buf: &[u8]) -> InterruptFrame {
    if buf.is_empty() {
        return InterruptFrame::Empty;
    }
    let mut bs = BitStream::from_bytes(buf.to_vec());
    let data_length = bs.read(4);
    let frame_type = bs.read(4) as u8;
    match frame_type {
        INTERRUPT_TYPE_EXTENDED => {
            // Platform quirk: a spurious all-zero-from-offset-3 buffer
            // claims to be an extended announcement but carries none.
            if buf.len() > 3 && buf[3..].iter().all(|b| *b == 0) {
                InterruptFrame::Empty
            } else {
                let full_length = bs.read(16) as usize;
                let _ = data_length;
                InterruptFrame::ExtendedFollowUp { data_length: full_length }
            }
        }
        INTERRUPT_TYPE_EMBEDDED => InterruptFrame::Embedded(buf[1..].to_vec()),
        _ => InterruptFrame::Empty,
    }
}

// ----------------------------------------------------------- Outgoing frames

/// Build one outgoing frame per `spec.md` §6: length (including itself
/// and the CRC), command byte, version byte, sub-command, body, then
/// CRC-16 big-endian over bytes `[2..N-2)`.
pub fn build_outgoing_frame(command_byte: u8, version_byte: u8, sub_command: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8, 0u8, command_byte, version_byte, sub_command];
    buf.extend_from_slice(body);
    let total_len = buf.len() + 2;
    buf[0] = (total_len >> 8) as u8;
    buf[1] = (total_len & 0xff) as u8;
    let crc = crc16::crc16(&buf[2..]);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

/// Build the single-byte Init frame (`spec.md` §8 S1): no command byte,
/// version byte or sub-command, just `0x80` framed with length and CRC.
pub fn build_init_frame() -> Vec<u8> {
    let mut buf = vec![0u8, 0u8, 0x80u8];
    let total_len = buf.len() + 2;
    buf[0] = (total_len >> 8) as u8;
    buf[1] = (total_len & 0xff) as u8;
    let crc = crc16::crc16(&buf[2..]);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_frame_matches_s1_scenario() {
        let frame = build_init_frame();
        // length(2) + 0x80(1) + crc(2) = 5 bytes.
        assert_eq!(frame.len(), 5);
        assert_eq!(frame[2], 0x80);
        let crc = crc16::crc16(&frame[2..3]);
        assert_eq!(&frame[3..5], &crc.to_be_bytes());
    }

    #[test]
    fn outgoing_frame_crc_covers_command_through_body() {
        let frame = build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x41, SUB_COMMAND_GET_SYNTH_SETTINGS, &[]);
        let (payload, trailer) = frame.split_at(frame.len() - 2);
        let crc = u16::from_be_bytes([trailer[0], trailer[1]]);
        assert_eq!(crc16::crc16(&payload[2..]), crc);
        let total_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        assert_eq!(total_len, frame.len());
    }

    #[test]
    fn init_ack_round_trip() {
        let frame = build_init_frame();
        let payload = crc16::split_and_verify(&frame[2..]).unwrap();
        let ind = parse_incoming(payload, 0, |_| 0, |_| crate::catalog::VolumeType::None, |_| crate::catalog::LedType::None, |_, _| 0).unwrap();
        assert!(matches!(ind, Indication::InitAck));
    }

    #[test]
    fn param_list_matching_catalog_count_parses_cleanly() {
        use crate::model::ModuleKey;
        let module = Module::new(ModuleKey { slot: 0, location: Location::Voice, index: 0 }, 1, 12);
        let mut bs = BitStream::new();
        subrecords::emit_module_list(&mut bs, Location::Voice, std::slice::from_ref(&module));
        let entries = vec![ParamListEntry { module_index: 0, param_count: 12, values: vec![] }];
        subrecords::emit_param_list(&mut bs, Location::Voice, &entries, 0);
        bs.seek_bits(0);
        let patch = parse_patch_payload(&mut bs, 0, crate::catalog::param_count).unwrap();
        assert_eq!(patch.modules.len(), 1);
    }

    #[test]
    fn param_list_count_mismatching_catalog_is_a_protocol_invariant_violation() {
        use crate::model::ModuleKey;
        // Catalog type 1 ("Osc A") declares 12 params; claim 5 on the wire.
        let module = Module::new(ModuleKey { slot: 0, location: Location::Voice, index: 0 }, 1, 12);
        let mut bs = BitStream::new();
        subrecords::emit_module_list(&mut bs, Location::Voice, std::slice::from_ref(&module));
        let entries = vec![ParamListEntry { module_index: 0, param_count: 5, values: vec![] }];
        subrecords::emit_param_list(&mut bs, Location::Voice, &entries, 0);
        bs.seek_bits(0);
        let err = parse_patch_payload(&mut bs, 0, crate::catalog::param_count).unwrap_err();
        assert!(matches!(err, CodecError::ProtocolInvariantViolated(_)));
    }

    #[test]
    fn morph_params_apply_onto_module_morph_range() {
        use crate::model::ModuleKey;
        use subrecords::{MorphAssignment, MorphVariation};
        let module = Module::new(ModuleKey { slot: 0, location: Location::Voice, index: 2 }, 1, 12);
        let mut bs = BitStream::new();
        subrecords::emit_module_list(&mut bs, Location::Voice, std::slice::from_ref(&module));
        let variations = vec![MorphVariation {
            variation: 0,
            opaque: 0,
            assignments: vec![MorphAssignment { location: Location::Voice, module_index: 2, param_index: 5, morph: 1, range: 64 }],
        }];
        subrecords::emit_morph_params(&mut bs, 4, &variations);
        bs.seek_bits(0);
        let patch = parse_patch_payload(&mut bs, 0, crate::catalog::param_count).unwrap();
        let m = patch.modules.iter().find(|m| m.key.index == 2).unwrap();
        assert_eq!(m.params[0][5].morph_range[1], 64);
    }

    #[test]
    fn volume_indicator_uses_real_module_type_not_a_hardcoded_one() {
        // index 0 is a stereo-meter module (type 7), index 1 has no
        // module at all: only index 0 should consume volume-meter bits.
        let mut bs = BitStream::new();
        bs.write(16, 0x1111); // index 0, left
        bs.write(16, 0x2222); // index 0, right
        bs.seek_bits(0);
        let ind = parse_volume_indicator(&mut bs, crate::catalog::volume_type, &|location, index| {
            if location == Location::Fx && index == 0 {
                7
            } else {
                0
            }
        });
        match ind {
            Indication::Volume { entries } => {
                assert_eq!(entries, vec![(Location::Fx, 0, [0x1111, 0x2222])]);
            }
            _ => panic!("expected Volume"),
        }
    }

    #[test]
    fn led_indicator_uses_real_module_type_not_a_hardcoded_one() {
        // Index 0 has an LFO (type 3, ledType=Yes). `parse_led_indicator`
        // bit-reverses the raw byte itself, so the raw LSB (0b...0001)
        // becomes the first (MSB) bit it reads: on=true.
        let mut bs = BitStream::from_bytes(vec![0b0000_0001u8]);
        let ind = parse_led_indicator(&mut bs, crate::catalog::led_type, &|location, index| {
            if location == Location::Fx && index == 0 {
                3
            } else {
                0
            }
        });
        match ind {
            Indication::Led { entries } => assert_eq!(entries, vec![(Location::Fx, 0, true)]),
            _ => panic!("expected Led"),
        }
    }

    #[test]
    fn embedded_interrupt_frame_exposes_payload_without_type_byte() {
        let buf = [0x12, 0xAA, 0xBB, 0xCC];
        match parse_interrupt_frame(&buf) {
            InterruptFrame::Embedded(payload) => assert_eq!(payload, vec![0xAA, 0xBB, 0xCC]),
            _ => panic!("expected embedded"),
        }
    }

    #[test]
    fn apple_silicon_quirk_buffer_is_treated_as_empty() {
        let mut buf = vec![0x01, 0, 0, 0, 0, 0];
        buf[0] = 0x01; // type nibble = Extended in low bits of first byte's low nibble
        match parse_interrupt_frame(&buf) {
            InterruptFrame::Empty => {}
            _ => panic!("expected empty due to all-zero quirk"),
        }
    }

    #[test]
    fn led_reversal_is_involution() {
        let mut bytes = vec![0b1001_0110u8, 0b0000_0001];
        let original = bytes.clone();
        reverse_bits_in_place(&mut bytes);
        reverse_bits_in_place(&mut bytes);
        assert_eq!(bytes, original);
    }
}
