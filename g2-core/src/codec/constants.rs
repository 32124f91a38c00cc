//! Protocol byte constants.
//!
//! A handful of these are given exact values by `spec.md` §6 (the
//! command-byte flag bits, `SUB_COMMAND_SELECT_VARIATION = 0x0f` from
//! the worked S4 example, the interrupt-frame type nibble values, and
//! the `0x2d` sub-record ignore marker) or by
//! `original_source/src/usbComms.c` (the two raw "unknown" query sub-
//! commands `0x81`/`0x59`, and `RESPONSE_TYPE_INIT = 0x80` from the S1
//! scenario). Everything else named only by symbol in `defs.h` was not
//! present in the retained original source — those are assigned
//! arbitrary, internally-consistent placeholder values here, flagged in
//! `DESIGN.md` as unverified against real hardware.

// -- Frame-level response types (offset 0 of a command/extended frame) --
pub const RESPONSE_TYPE_INIT: u8 = 0x80;
pub const RESPONSE_TYPE_COMMAND: u8 = 0x01;

// -- Interrupt-frame type nibble (low 4 bits of byte 0) --
pub const INTERRUPT_TYPE_EXTENDED: u8 = 0x01;
pub const INTERRUPT_TYPE_EMBEDDED: u8 = 0x02;

// -- Outgoing command byte flags (spec.md §6, exact) --
pub const COMMAND_REQ: u8 = 0x20;
pub const COMMAND_WRITE_NO_RESP: u8 = 0x30;
pub const COMMAND_SYS: u8 = 0x0c;
pub const fn command_slot(slot: u8) -> u8 {
    0x08 | slot
}

/// Leading body byte `original_source` writes ahead of the command byte
/// for every non-Init outgoing command. `spec.md`'s own outgoing-frame
/// layout (§6) doesn't carry this byte; DESIGN.md records the decision
/// to follow the spec's explicit frame shape rather than this one.
#[allow(dead_code)]
pub const LEGACY_BODY_LEAD_BYTE: u8 = 0x01;

// -- Sub-commands (outgoing), placeholder values except where noted --
pub const SUB_COMMAND_SELECT_SLOT: u8 = 0x01;
pub const SUB_COMMAND_START_STOP: u8 = 0x02;
pub const SUB_COMMAND_GET_SYNTH_SETTINGS: u8 = 0x03;
pub const SUB_COMMAND_GET_PATCH_VERSION: u8 = 0x04;
pub const SUB_COMMAND_GET_PATCH_SLOT: u8 = 0x05;
pub const SUB_COMMAND_GET_PATCH_NAME: u8 = 0x06;
pub const SUB_COMMAND_SET_PARAM: u8 = 0x07;
pub const SUB_COMMAND_SET_MODE: u8 = 0x08;
pub const SUB_COMMAND_WRITE_CABLE: u8 = 0x09;
pub const SUB_COMMAND_ADD_MODULE: u8 = 0x0a;
pub const SUB_COMMAND_MOVE_MODULE: u8 = 0x0b;
pub const SUB_COMMAND_DELETE_MODULE: u8 = 0x0c;
pub const SUB_COMMAND_DELETE_CABLE: u8 = 0x0d;
pub const SUB_COMMAND_SET_MODULE_UPRATE: u8 = 0x0e;
/// Confirmed by the `spec.md` §8 S4 scenario.
pub const SUB_COMMAND_SELECT_VARIATION: u8 = 0x0f;
pub const SUB_COMMAND_SET_MORPH_RANGE: u8 = 0x10;

/// Exact raw sub-command bytes for the two undocumented init-sequence
/// queries (`original_source/src/usbComms.c` `eStateGetUnknown1/2`).
pub const SUB_COMMAND_GET_UNKNOWN1: u8 = 0x81;
pub const SUB_COMMAND_GET_UNKNOWN2: u8 = 0x59;

// -- Top-level command-response kinds (the `subCommand` byte read right
// after responseType/command/version in a RESPONSE_TYPE_COMMAND frame;
// `original_source`'s `parse_command_response` switch). Placeholder
// values, assigned in the order they appear in that switch. --
pub const SUB_RESPONSE_VOLUME_INDICATOR: u8 = 0x20;
pub const SUB_RESPONSE_LED_DATA: u8 = 0x21;
pub const SUB_RESPONSE_ERROR: u8 = 0x22;
pub const SUB_RESPONSE_RESOURCES_USED: u8 = 0x23;
pub const SUB_RESPONSE_PARAM_CHANGE: u8 = 0x24;
pub const SUB_RESPONSE_PATCH_VERSION: u8 = 0x25;
pub const SUB_RESPONSE_SYNTH_SETTINGS: u8 = 0x26;
pub const SUB_RESPONSE_MIDI_CC: u8 = 0x27;
pub const SUB_RESPONSE_GLOBAL_PAGE: u8 = 0x28;
pub const SUB_RESPONSE_PATCH_VERSION_CHANGE: u8 = 0x29;
pub const SUB_RESPONSE_ASSIGNED_VOICES: u8 = 0x2a;
pub const SUB_RESPONSE_PERFORMANCE_NAME: u8 = 0x2b;
pub const SUB_RESPONSE_MASTER_CLOCK: u8 = 0x2c;
pub const SUB_RESPONSE_PATCH_NAME: u8 = 0x2e;
pub const SUB_RESPONSE_OK: u8 = 0x2f;

// -- Per-sub-record `subType` byte (inside a patch/list payload;
// `original_source`'s nested `case SUB_RESPONSE_*` inside the per-slot
// fetch). Placeholder values except the confirmed `0x2d` ignore marker. --
pub const SUB_RESPONSE_MODULE_LIST: u8 = 0x01;
pub const SUB_RESPONSE_CABLE_LIST: u8 = 0x02;
pub const SUB_RESPONSE_PARAM_LIST: u8 = 0x03;
pub const SUB_RESPONSE_PARAM_NAMES: u8 = 0x04;
pub const SUB_RESPONSE_MODULE_NAMES: u8 = 0x05;
pub const SUB_RESPONSE_PATCH_DESCRIPTION: u8 = 0x06;
pub const SUB_RESPONSE_MORPH_PARAMS: u8 = 0x07;
pub const SUB_RESPONSE_KNOBS: u8 = 0x08;
pub const SUB_RESPONSE_CONTROLLERS: u8 = 0x09;
pub const SUB_RESPONSE_CURRENT_NOTE_2: u8 = 0x0a;
pub const SUB_RESPONSE_PATCH_NOTES: u8 = 0x0b;
/// One-byte "ignore, rewind" marker (`spec.md` §4.5, exact).
pub const SUB_RECORD_IGNORE_MARKER: u8 = 0x2d;
