//! Read-only module-type catalog.
//!
//! `spec.md` §1 explicitly treats the full ~200-entry Clavia module
//! catalog as an external resource the core merely *consults* — it is
//! not part of this crate's job to reproduce Clavia's proprietary
//! per-module tables. What's in scope is the lookup API itself and the
//! `ioCount`/index conversion rules in §4.3, so this module ships a
//! representative subset of module types (enough to cover every
//! connector-direction/LED/volume-meter shape the wire format
//! distinguishes) behind the same API a full table would expose.

use crate::model::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedType {
    None,
    Yes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeType {
    None,
    Mono,
    Stereo,
    Compress,
}

struct ModuleInfo {
    type_id: u8,
    name: &'static str,
    param_count: u32,
    connectors: &'static [Direction],
    led: LedType,
    volume: VolumeType,
}

use Direction::{In, Out};

/// Module type `0` is the "unknown"/sentinel type: zero parameters, zero
/// connectors, matching `spec.md` §4.3 ("0 for 'unknown' sentinel type").
const UNKNOWN: ModuleInfo = ModuleInfo {
    type_id: 0,
    name: "Unknown",
    param_count: 0,
    connectors: &[],
    led: LedType::None,
    volume: VolumeType::None,
};

static CATALOG: &[ModuleInfo] = &[
    ModuleInfo {
        type_id: 1,
        name: "Osc A",
        param_count: 12,
        connectors: &[Out, Out, In, In],
        led: LedType::None,
        volume: VolumeType::None,
    },
    ModuleInfo {
        type_id: 2,
        name: "Osc B",
        param_count: 14,
        connectors: &[Out, Out, Out, In, In, In],
        led: LedType::None,
        volume: VolumeType::None,
    },
    ModuleInfo {
        type_id: 3,
        name: "LFO A",
        param_count: 6,
        connectors: &[Out, In],
        led: LedType::Yes,
        volume: VolumeType::None,
    },
    ModuleInfo {
        type_id: 4,
        name: "Filter A",
        param_count: 9,
        connectors: &[In, In, Out],
        led: LedType::None,
        volume: VolumeType::None,
    },
    ModuleInfo {
        type_id: 5,
        name: "Env ADSR",
        param_count: 8,
        connectors: &[In, Out, Out],
        led: LedType::Yes,
        volume: VolumeType::None,
    },
    ModuleInfo {
        type_id: 6,
        name: "Mixer 4-1",
        param_count: 5,
        connectors: &[In, In, In, In, Out],
        led: LedType::None,
        volume: VolumeType::Mono,
    },
    ModuleInfo {
        type_id: 7,
        name: "Stereo Mixer",
        param_count: 7,
        connectors: &[In, In, In, In, Out, Out],
        led: LedType::None,
        volume: VolumeType::Stereo,
    },
    ModuleInfo {
        type_id: 8,
        name: "Delay",
        param_count: 10,
        connectors: &[In, Out],
        led: LedType::None,
        volume: VolumeType::Mono,
    },
    ModuleInfo {
        type_id: 9,
        name: "Sequencer",
        param_count: 20,
        connectors: &[Out, Out, Out, In],
        led: LedType::Yes,
        volume: VolumeType::None,
    },
    ModuleInfo {
        type_id: 10,
        name: "Compressor",
        param_count: 6,
        connectors: &[In, In, Out, Out],
        led: LedType::None,
        volume: VolumeType::Compress,
    },
    ModuleInfo {
        type_id: 11,
        name: "Constant CV",
        param_count: 1,
        connectors: &[Out],
        led: LedType::None,
        volume: VolumeType::None,
    },
    ModuleInfo {
        type_id: 12,
        name: "Logic Out",
        param_count: 0,
        connectors: &[In],
        led: LedType::Yes,
        volume: VolumeType::None,
    },
];

fn lookup(type_id: u8) -> &'static ModuleInfo {
    CATALOG.iter().find(|m| m.type_id == type_id).unwrap_or(&UNKNOWN)
}

/// Number of parameters a module type declares; `0` for the unknown type.
pub fn param_count(type_id: u8) -> u32 {
    lookup(type_id).param_count
}

pub fn connector_count(type_id: u8) -> u32 {
    lookup(type_id).connectors.len() as u32
}

pub fn connector(type_id: u8, index: usize) -> Option<Direction> {
    lookup(type_id).connectors.get(index).copied()
}

pub fn led_type(type_id: u8) -> LedType {
    lookup(type_id).led
}

pub fn volume_type(type_id: u8) -> VolumeType {
    lookup(type_id).volume
}

pub fn name(type_id: u8) -> &'static str {
    lookup(type_id).name
}

/// Convert an absolute connector index to the `ioCount` the wire format
/// uses: the 0-based position of that connector among connectors of the
/// same direction. Returns `-1` if `index` names a connector of the
/// wrong direction (or doesn't exist).
pub fn io_count_from_index(type_id: u8, dir: Direction, index: usize) -> i32 {
    let connectors = lookup(type_id).connectors;
    match connectors.get(index) {
        Some(d) if *d == dir => {
            connectors[..=index].iter().filter(|c| **c == dir).count() as i32 - 1
        }
        _ => -1,
    }
}

/// Inverse of [`io_count_from_index`]: the absolute connector index of
/// the `n`-th (0-based) connector of direction `dir`, or `-1` if there
/// are fewer than `n + 1` such connectors.
pub fn index_from_io_count(type_id: u8, dir: Direction, n: usize) -> i32 {
    lookup(type_id)
        .connectors
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == dir)
        .nth(n)
        .map(|(i, _)| i as i32)
        .unwrap_or(-1)
}
