//! Bit-packed sub-record parse/emit, one pair of functions per row of
//! the `spec.md` §4.5 layout table.
//!
//! Every emitter follows the same three-step pattern the bit-width
//! table calls out: write `[subType:8]`, save the position, write a
//! zero `[length:16]` placeholder, write the body, align up to a byte
//! boundary, then patch the placeholder with `(end - saved)/8 - 2`.

use super::constants::*;
use crate::bitstream::BitStream;
use crate::error::CodecError;
use crate::model::{
    Cable, CableKey, KnobAssignment, Location, Module, ModuleKey, PatchDescription, Slot,
};
use std::collections::HashMap;

/// Begin one sub-record: write its type byte and a placeholder length,
/// returning the bit position to patch afterward.
fn begin(bs: &mut BitStream, sub_type: u8) -> usize {
    bs.write(8, sub_type as u32);
    let saved = bs.save_position();
    bs.write(16, 0);
    saved
}

/// Close a sub-record opened with [`begin`]: align to a byte boundary
/// and patch the length field in place.
fn finish(bs: &mut BitStream, saved: usize) {
    bs.align_up_to_byte();
    let end = bs.save_position();
    let length = (end - saved) / 8 - 2;
    bs.restore_position(saved);
    bs.write(16, length as u32);
    bs.restore_position(end);
}

/// Read a sub-record header, returning `(subType, bitOffset of the
/// record after this one)`. The parser must always skip to that offset
/// regardless of how much of the body the handler actually consumed —
/// except the `0x2d` ignore marker, a one-byte record with no length
/// field (`spec.md` §4.5).
pub fn read_subrecord_header(bs: &mut BitStream) -> (u8, usize) {
    let sub_type = bs.read(8) as u8;
    if sub_type == SUB_RECORD_IGNORE_MARKER {
        return (sub_type, bs.bit_pos());
    }
    let length = bs.read(16) as usize;
    let next = bs.bit_pos() + length * 8;
    (sub_type, next)
}

// ---------------------------------------------------------------- PatchDescr

pub fn emit_patch_descr(bs: &mut BitStream, d: &PatchDescription) {
    let saved = begin(bs, SUB_RESPONSE_PATCH_DESCRIPTION);
    bs.write(32, d.unknown1);
    bs.write(29, d.unknown2);
    bs.write(5, d.voice_count as u32);
    bs.write(14, d.bar_position as u32);
    bs.write(3, d.unknown3 as u32);
    bs.write(1, d.visibility_red as u32);
    bs.write(1, d.visibility_blue as u32);
    bs.write(1, d.visibility_yellow as u32);
    bs.write(1, d.visibility_orange as u32);
    bs.write(1, d.visibility_green as u32);
    bs.write(1, d.visibility_purple as u32);
    bs.write(1, d.visibility_white as u32);
    bs.write(2, d.mono_poly as u32);
    bs.write(8, d.active_variation as u32);
    bs.write(8, d.category as u32);
    bs.write(12, d.unknown4 as u32);
    finish(bs, saved);
}

pub fn parse_patch_descr(bs: &mut BitStream) -> PatchDescription {
    PatchDescription {
        unknown1: bs.read(32),
        unknown2: bs.read(29),
        voice_count: bs.read(5) as u8,
        bar_position: bs.read(14) as u16,
        unknown3: bs.read(3) as u8,
        visibility_red: bs.read(1) != 0,
        visibility_blue: bs.read(1) != 0,
        visibility_yellow: bs.read(1) != 0,
        visibility_orange: bs.read(1) != 0,
        visibility_green: bs.read(1) != 0,
        visibility_purple: bs.read(1) != 0,
        visibility_white: bs.read(1) != 0,
        mono_poly: bs.read(2) as u8,
        active_variation: bs.read(8) as u8,
        category: bs.read(8) as u8,
        unknown4: bs.read(12) as u16,
    }
}

// ---------------------------------------------------------------- ModuleList

pub fn emit_module_list(bs: &mut BitStream, location: Location, modules: &[Module]) {
    let saved = begin(bs, SUB_RESPONSE_MODULE_LIST);
    bs.write(2, location.into());
    let count_pos = bs.save_position();
    bs.write(8, 0);
    let mut count = 0u32;
    for m in modules {
        bs.write(8, m.module_type as u32);
        bs.write(8, m.key.index as u32);
        bs.write(7, m.column as u32);
        bs.write(7, m.row as u32);
        bs.write(8, m.colour as u32);
        bs.write(1, m.up_rate as u32);
        bs.write(1, m.is_led as u32);
        bs.write(6, 0); // unknown1
        bs.write(4, m.modes.len() as u32);
        for mode in &m.modes {
            bs.write(6, *mode as u32);
        }
        count += 1;
    }
    let end = bs.save_position();
    bs.restore_position(count_pos);
    bs.write(8, count);
    bs.restore_position(end);
    finish(bs, saved);
}

/// `param_count` supplies each module's parameter count (from
/// `ModuleCatalog`, by module type) so `Module::new` can size its
/// per-variation parameter vectors.
pub fn parse_module_list(
    bs: &mut BitStream,
    slot: Slot,
    param_count: impl Fn(u8) -> u32,
) -> Result<(Location, Vec<Module>), CodecError> {
    let location = Location::try_from(bs.read(2))?;
    let module_count = bs.read(8);
    let mut modules = Vec::with_capacity(module_count as usize);
    for _ in 0..module_count {
        let module_type = bs.read(8) as u8;
        let index = bs.read(8) as u8;
        let column = bs.read(7) as u8;
        let row = bs.read(7) as u8;
        let colour = bs.read(8) as u8;
        let up_rate = bs.read(1) != 0;
        let is_led = bs.read(1) != 0;
        let _unknown1 = bs.read(6);
        let mode_count = bs.read(4);
        let mut modes = Vec::with_capacity(mode_count as usize);
        for _ in 0..mode_count {
            modes.push(bs.read(6) as u8);
        }
        let key = ModuleKey { slot, location, index };
        let mut module = Module::new(key, module_type, param_count(module_type) as usize);
        module.column = column;
        module.row = row;
        module.colour = colour;
        module.up_rate = up_rate;
        module.is_led = is_led;
        module.modes = modes;
        modules.push(module);
    }
    Ok((location, modules))
}

// ----------------------------------------------------------------- CableList

pub fn emit_cable_list(bs: &mut BitStream, location: Location, cables: &[Cable]) {
    let saved = begin(bs, SUB_RESPONSE_CABLE_LIST);
    bs.write(2, location.into());
    bs.write(12, 0); // unknown
    let count_pos = bs.save_position();
    bs.write(10, 0);
    for c in cables {
        bs.write(3, c.colour as u32);
        bs.write(8, c.key.module_from_index as u32);
        bs.write(6, c.key.connector_from_io_count as u32);
        bs.write(1, c.key.link_type as u32);
        bs.write(8, c.key.module_to_index as u32);
        bs.write(6, c.key.connector_to_io_count as u32);
    }
    let end = bs.save_position();
    bs.restore_position(count_pos);
    bs.write(10, cables.len() as u32);
    bs.restore_position(end);
    finish(bs, saved);
}

pub fn parse_cable_list(bs: &mut BitStream, slot: Slot) -> Result<(Location, Vec<Cable>), CodecError> {
    let location = Location::try_from(bs.read(2))?;
    let _unknown = bs.read(12);
    let cable_count = bs.read(10);
    let mut cables = Vec::with_capacity(cable_count as usize);
    for _ in 0..cable_count {
        let colour = bs.read(3) as u8;
        let module_from_index = bs.read(8) as u8;
        let connector_from_io_count = bs.read(6) as u8;
        let link_type = crate::model::LinkType::try_from(bs.read(1))?;
        let module_to_index = bs.read(8) as u8;
        let connector_to_io_count = bs.read(6) as u8;
        cables.push(Cable {
            key: CableKey {
                slot,
                location,
                module_from_index,
                connector_from_io_count,
                link_type,
                module_to_index,
                connector_to_io_count,
            },
            colour,
        });
    }
    Ok((location, cables))
}

// ------------------------------------------------------------------ ParamList

/// One module's worth of parsed parameter values: `values[variation][param]`.
pub struct ParamListEntry {
    pub module_index: u8,
    /// The device-reported parameter count for this module, read
    /// straight off the wire before `values` is parsed. `spec.md` §3
    /// requires this to equal `ModuleCatalog.param_count(moduleType)`
    /// for the matching module; the caller checks that once the
    /// module's type is known (`frame.rs`'s fold step).
    pub param_count: u32,
    pub values: Vec<Vec<u8>>,
}

pub fn emit_param_list(bs: &mut BitStream, location: Location, entries: &[ParamListEntry], variation_count: u8) {
    let saved = begin(bs, SUB_RESPONSE_PARAM_LIST);
    bs.write(2, location.into());
    bs.write(8, entries.len() as u32);
    bs.write(8, variation_count as u32);
    for e in entries {
        bs.write(8, e.module_index as u32);
        bs.write(7, e.param_count);
        for (variation, values) in e.values.iter().enumerate() {
            bs.write(8, variation as u32);
            for v in values {
                bs.write(7, *v as u32);
            }
        }
    }
    finish(bs, saved);
}

pub fn parse_param_list(bs: &mut BitStream) -> (Location, Vec<ParamListEntry>) {
    let location = Location::try_from(bs.read(2)).unwrap_or(Location::Fx);
    let module_count = bs.read(8);
    let variation_count = bs.read(8);
    let mut entries = Vec::with_capacity(module_count as usize);
    for _ in 0..module_count {
        let module_index = bs.read(8) as u8;
        let param_count = bs.read(7);
        let mut values = vec![Vec::new(); crate::model::NUM_VARIATIONS];
        for _ in 0..variation_count {
            let variation = bs.read(8) as usize;
            let mut row = Vec::with_capacity(param_count as usize);
            for _ in 0..param_count {
                row.push(bs.read(7) as u8);
            }
            if variation < values.len() {
                values[variation] = row;
            }
        }
        entries.push(ParamListEntry { module_index, param_count, values });
    }
    (location, entries)
}

// ---------------------------------------------------------------- ParamNames

pub fn emit_param_names(bs: &mut BitStream, location: Location, entries: &[(u8, HashMap<u8, [u8; 7]>)]) {
    let saved = begin(bs, SUB_RESPONSE_PARAM_NAMES);
    bs.write(2, location.into());
    bs.write(8, entries.len() as u32);
    for (module_index, names) in entries {
        bs.write(8, *module_index as u32);
        bs.write(8, names.len() as u32);
        for (param_index, label) in names {
            bs.write(8, 0); // isString
            bs.write(8, label.len() as u32);
            bs.write(8, *param_index as u32);
            for b in label {
                bs.write(8, *b as u32);
            }
        }
    }
    finish(bs, saved);
}

pub fn parse_param_names(bs: &mut BitStream) -> (Location, Vec<(u8, HashMap<u8, [u8; 7]>)>) {
    let location = Location::try_from(bs.read(2)).unwrap_or(Location::Fx);
    let module_count = bs.read(8);
    let mut out = Vec::with_capacity(module_count as usize);
    for _ in 0..module_count {
        let module_index = bs.read(8) as u8;
        let module_length = bs.read(8);
        let mut names = HashMap::new();
        let mut consumed = 0u32;
        while consumed < module_length {
            let _is_string = bs.read(8);
            let param_length = bs.read(8);
            let param_index = bs.read(8) as u8;
            let mut label = [0u8; 7];
            for b in label.iter_mut() {
                *b = bs.read(8) as u8;
            }
            names.insert(param_index, label);
            let _ = param_length;
            consumed += 3 + 7;
        }
        out.push((module_index, names));
    }
    (location, out)
}

// --------------------------------------------------------------- ModuleNames

pub fn emit_module_names(bs: &mut BitStream, location: Location, entries: &[(u8, String)]) {
    let saved = begin(bs, SUB_RESPONSE_MODULE_NAMES);
    bs.write(2, location.into());
    bs.write(6, 0); // reserved
    bs.write(8, entries.len() as u32);
    for (index, name) in entries {
        bs.write(8, *index as u32);
        let bytes = name.as_bytes();
        let n = bytes.len().min(16);
        for b in &bytes[..n] {
            bs.write(8, *b as u32);
        }
        bs.write(8, 0); // NUL terminator
    }
    finish(bs, saved);
}

pub fn parse_module_names(bs: &mut BitStream) -> (Location, Vec<(u8, String)>) {
    let location = Location::try_from(bs.read(2)).unwrap_or(Location::Fx);
    let _reserved = bs.read(6);
    let item_count = bs.read(8);
    let mut out = Vec::with_capacity(item_count as usize);
    for _ in 0..item_count {
        let index = bs.read(8) as u8;
        let mut name = Vec::with_capacity(16);
        loop {
            if name.len() >= 16 {
                break;
            }
            let b = bs.read(8) as u8;
            if b == 0 {
                break;
            }
            name.push(b);
        }
        out.push((index, String::from_utf8_lossy(&name).into_owned()));
    }
    (location, out)
}

// -------------------------------------------------------------------- Knobs

/// `original_source/src/protocol.c::parse_knobs`: a 16-bit count header,
/// then per knob a 1-bit `assigned` flag followed by
/// location/index/isLed/paramIndex when set.
pub fn emit_knobs(bs: &mut BitStream, knobs: &[Option<KnobAssignment>]) {
    let saved = begin(bs, SUB_RESPONSE_KNOBS);
    bs.write(16, knobs.len() as u32);
    for knob in knobs {
        match knob {
            Some(k) => {
                bs.write(1, 1);
                bs.write(2, k.location.into());
                bs.write(8, k.module_index as u32);
                bs.write(1, k.is_led as u32);
                bs.write(7, k.param_index as u32);
            }
            None => bs.write(1, 0),
        }
    }
    finish(bs, saved);
}

pub fn parse_knobs(bs: &mut BitStream) -> Vec<Option<KnobAssignment>> {
    let count = bs.read(16);
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let assigned = bs.read(1) != 0;
        if assigned {
            let location = Location::try_from(bs.read(2)).unwrap_or(Location::Fx);
            let module_index = bs.read(8) as u8;
            let is_led = bs.read(1) as u8;
            let param_index = bs.read(7) as u8;
            out.push(Some(KnobAssignment { location, module_index, is_led, param_index }));
        } else {
            out.push(None);
        }
    }
    out
}

// --------------------------------------------------------------- MorphParams

/// One per-assignment entry of a MorphParams variation block
/// (`spec.md` §4.5 MorphParams per-assignment row).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphAssignment {
    pub location: Location,
    pub module_index: u8,
    pub param_index: u8,
    pub morph: u8,
    pub range: u8,
}

/// One per-variation block of a MorphParams sub-record. `opaque` is the
/// 56 bits between `variation` and `morphParamCount` that
/// `original_source/src/protocol.c::parse_morph_params` reads and
/// never interprets; kept bit-exact the way `PatchDescription`'s
/// `unknown*` fields are.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MorphVariation {
    pub variation: u8,
    pub opaque: u64,
    pub assignments: Vec<MorphAssignment>,
}

pub fn emit_morph_params(bs: &mut BitStream, morph_count: u8, variations: &[MorphVariation]) {
    let saved = begin(bs, SUB_RESPONSE_MORPH_PARAMS);
    bs.write(8, variations.len() as u32);
    bs.write(4, morph_count as u32);
    bs.write(20, 0); // reserved
    for v in variations {
        bs.write(4, v.variation as u32);
        bs.write(28, (v.opaque >> 28) as u32);
        bs.write(28, (v.opaque & 0x0fff_ffff) as u32);
        bs.write(8, v.assignments.len() as u32);
        for a in &v.assignments {
            bs.write(2, a.location.into());
            bs.write(8, a.module_index as u32);
            bs.write(7, a.param_index as u32);
            bs.write(4, a.morph as u32);
            bs.write(8, a.range as u32);
        }
        bs.write(4, 0); // trailing
    }
    finish(bs, saved);
}

pub fn parse_morph_params(bs: &mut BitStream) -> (u8, Vec<MorphVariation>) {
    let variation_count = bs.read(8);
    let morph_count = bs.read(4) as u8;
    let _reserved = bs.read(20);
    let mut variations = Vec::with_capacity(variation_count as usize);
    for _ in 0..variation_count {
        let variation = bs.read(4) as u8;
        let opaque = ((bs.read(28) as u64) << 28) | bs.read(28) as u64;
        let morph_param_count = bs.read(8);
        let mut assignments = Vec::with_capacity(morph_param_count as usize);
        for _ in 0..morph_param_count {
            let location = Location::try_from(bs.read(2)).unwrap_or(Location::Fx);
            let module_index = bs.read(8) as u8;
            let param_index = bs.read(7) as u8;
            let morph = bs.read(4) as u8;
            let range = bs.read(8) as u8;
            assignments.push(MorphAssignment { location, module_index, param_index, morph, range });
        }
        let _trailing = bs.read(4);
        variations.push(MorphVariation { variation, opaque, assignments });
    }
    (morph_count, variations)
}
