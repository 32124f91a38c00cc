//! The patch data model: modules, cables, and per-slot side state.
//!
//! This mirrors `spec.md` §3 one-for-one. Where the original C source
//! used fixed-size `param[9][MAX_PARAMETERS]` arrays, this uses `Vec`
//! sized to the module's actual parameter count (from `ModuleCatalog`)
//! — §9's design notes call this kind of modernization out explicitly
//! for the walk-cursor container; the same reasoning applies to the
//! fixed per-module arrays.

use crate::error::CodecError;
use std::collections::HashMap;

/// One of the four patch contexts the device holds simultaneously.
pub type Slot = u8;

pub const NUM_SLOTS: usize = 4;
pub const NUM_VARIATIONS: usize = 9;
pub const NUM_MORPHS: usize = 4;

/// Sub-context within a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Location {
    Fx = 0,
    Voice = 1,
    Morph = 2,
}

impl TryFrom<u32> for Location {
    type Error = CodecError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Location::Fx),
            1 => Ok(Location::Voice),
            2 => Ok(Location::Morph),
            other => Err(CodecError::ProtocolInvariantViolated(format!(
                "location field out of range: {other}"
            ))),
        }
    }
}

impl From<Location> for u32 {
    fn from(l: Location) -> u32 {
        l as u32
    }
}

/// Uniquely identifies a module: (slot, location, index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub slot: Slot,
    pub location: Location,
    pub index: u8,
}

/// Connector direction on one side of a cable endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Which two connector kinds a cable links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkType {
    InputToInput = 0,
    OutputToInput = 1,
}

impl TryFrom<u32> for LinkType {
    type Error = CodecError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(LinkType::InputToInput),
            1 => Ok(LinkType::OutputToInput),
            other => Err(CodecError::ProtocolInvariantViolated(format!(
                "link type field out of range: {other}"
            ))),
        }
    }
}

/// The cable key *is* the cable's identity (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CableKey {
    pub slot: Slot,
    pub location: Location,
    pub module_from_index: u8,
    pub connector_from_io_count: u8,
    pub link_type: LinkType,
    pub module_to_index: u8,
    pub connector_to_io_count: u8,
}

impl std::hash::Hash for LinkType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (*self as u8).hash(state)
    }
}
impl PartialOrd for LinkType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        (*self as u8).partial_cmp(&(*other as u8))
    }
}
impl Ord for LinkType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cable {
    pub key: CableKey,
    pub colour: u8,
}

/// One stored parameter cell: a 0..127 value plus a per-morph range
/// offset (wire field width 8 bits, `spec.md` §4.5 MorphParams table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamCell {
    pub value: u8,
    pub morph_range: [u8; NUM_MORPHS],
}

/// A DSP node placed on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub key: ModuleKey,
    pub module_type: u8,
    pub row: u8,
    pub column: u8,
    pub colour: u8,
    pub up_rate: bool,
    pub is_led: bool,
    pub modes: Vec<u8>,
    /// `params[variation][param_index]`, one inner `Vec` per variation,
    /// all the same length (the module's parameter count).
    pub params: [Vec<ParamCell>; NUM_VARIATIONS],
    pub param_names: HashMap<u8, [u8; 7]>,
    pub name: String,
    /// Transient: two 16-bit volume-meter values, overwritten by every
    /// volume indication; never round-tripped to the device.
    pub volume: [u16; 2],
    /// Transient: current LED state, overwritten by every LED indication.
    pub led_on: bool,
}

impl Module {
    pub fn new(key: ModuleKey, module_type: u8, param_count: usize) -> Self {
        Module {
            key,
            module_type,
            row: 0,
            column: 0,
            colour: 0,
            up_rate: false,
            is_led: false,
            modes: Vec::new(),
            params: std::array::from_fn(|_| vec![ParamCell::default(); param_count]),
            param_names: HashMap::new(),
            name: String::new(),
            volume: [0, 0],
            led_on: false,
        }
    }
}

/// Per-slot patch description (`spec.md` §3). The four "unknown" fields
/// are preserved bit-exact parse-to-emit; their meaning is undocumented
/// upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchDescription {
    pub unknown1: u32,
    pub unknown2: u32,
    pub voice_count: u8,
    pub bar_position: u16,
    pub unknown3: u8,
    pub visibility_red: bool,
    pub visibility_blue: bool,
    pub visibility_yellow: bool,
    pub visibility_orange: bool,
    pub visibility_green: bool,
    pub visibility_purple: bool,
    pub visibility_white: bool,
    pub mono_poly: u8,
    pub active_variation: u8,
    pub category: u8,
    pub unknown4: u16,
}

/// A knob assignment (`original_source/src/protocol.c::parse_knobs`):
/// 16-bit count header, then per-knob a 1-bit `assigned` flag followed
/// by location/index/isLed/paramIndex when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnobAssignment {
    pub location: Location,
    pub module_index: u8,
    pub is_led: u8,
    pub param_index: u8,
}

/// Controller assignments are named alongside knobs in `spec.md` §3 but
/// their wire layout isn't present in the retained original source; they
/// are modeled with the same shape as knobs (see `DESIGN.md`).
pub type ControllerAssignment = KnobAssignment;

/// Everything per-slot that isn't a module or a cable.
#[derive(Debug, Clone, Default)]
pub struct SlotState {
    pub patch_descr: PatchDescription,
    pub knobs: Vec<Option<KnobAssignment>>,
    pub controllers: Vec<Option<ControllerAssignment>>,
    pub note2: Vec<u8>,
    pub patch_notes: Vec<u8>,
    pub morph_count: u8,
    /// Patch-version byte the device attaches to this slot's state;
    /// every outgoing edit for this slot must carry the current value.
    pub patch_version: u8,
    pub recognized_slot_version: u8,
    pub synth_settings: Vec<u8>,
}

impl SlotState {
    pub fn new() -> Self {
        SlotState { morph_count: 4, ..Default::default() }
    }
}

/// The morph-param-count table for Morph-location (`location == 2`)
/// modules, hardcoded per `spec.md` §4.5 since its derivation from the
/// catalog is unclear.
pub fn morph_param_count_for_index(index: u8) -> u32 {
    match index {
        1 => 16,
        2 | 3 | 4 | 7 => 2,
        5 => 3,
        6 => 4,
        _ => 0,
    }
}
