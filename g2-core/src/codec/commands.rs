//! Outgoing command construction: the init/poll handshake sequence
//! (`emit_command`) and GUI-originated edits (`emit_edit`).
//!
//! Body layouts for `emit_edit` follow
//! `original_source/src/usbComms.c::send_write_data` field-for-field —
//! `spec.md` doesn't give per-edit body layouts, only the sub-command
//! names, so this is exactly the kind of detail the process calls for
//! resolving against the original. The frame *envelope* (length/command
//! byte/version/sub-command/CRC) follows `spec.md` §6's explicit layout
//! instead of the original's, which also writes an extra leading `0x01`
//! body byte the spec's contract doesn't mention (see `DESIGN.md`).

use super::constants::*;
use super::frame::build_outgoing_frame;
use crate::model::Slot;
use crate::queue::EditCommand;

/// One step of the init/poll handshake (`spec.md` §4.6). `FindDevice`
/// and `Poll` don't build a frame — the state machine handles them
/// directly (enumerate-and-open, or drain-the-queue-or-receive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    FindDevice,
    Init,
    Stop,
    GetSynthSettings,
    GetUnknown1,
    GetUnknown2,
    SelectSlot,
    GetPatchVersion(Slot),
    GetPatch(Slot),
    GetPatchName(Slot),
    Start,
    Poll,
}

impl SessionState {
    /// The state that follows this one on a successful `receive_one()`,
    /// per the sequence diagram in `spec.md` §4.6. `Poll` loops to
    /// itself; `FindDevice` is advanced externally once a device opens.
    pub fn next(self) -> SessionState {
        use SessionState::*;
        match self {
            FindDevice => Init,
            Init => Stop,
            Stop => GetSynthSettings,
            GetSynthSettings => GetUnknown1,
            GetUnknown1 => GetUnknown2,
            GetUnknown2 => SelectSlot,
            SelectSlot => GetPatchVersion(0),
            GetPatchVersion(s) if s < 3 => GetPatchVersion(s + 1),
            GetPatchVersion(_) => GetPatch(0),
            GetPatch(s) if s < 3 => GetPatch(s + 1),
            GetPatch(_) => GetPatchName(0),
            GetPatchName(s) if s < 3 => GetPatchName(s + 1),
            GetPatchName(_) => Start,
            Start => Poll,
            Poll => Poll,
        }
    }
}

/// Build the outgoing frame for one handshake state, or `None` for
/// states the state machine itself drives (`FindDevice`, `Poll`).
pub fn emit_command(state: SessionState, slot_version: impl Fn(Slot) -> u8) -> Option<Vec<u8>> {
    use SessionState::*;
    Some(match state {
        FindDevice | Poll => return None,
        Init => super::frame::build_init_frame(),
        Stop => build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x41, SUB_COMMAND_START_STOP, &[0x01]),
        Start => build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x41, SUB_COMMAND_START_STOP, &[0x00]),
        SelectSlot => build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x00, SUB_COMMAND_SELECT_SLOT, &[0x00]),
        GetSynthSettings => build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x41, SUB_COMMAND_GET_SYNTH_SETTINGS, &[]),
        GetUnknown1 => build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x41, SUB_COMMAND_GET_UNKNOWN1, &[]),
        GetUnknown2 => build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x00, SUB_COMMAND_GET_UNKNOWN2, &[]),
        GetPatchVersion(slot) => {
            build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x41, SUB_COMMAND_GET_PATCH_VERSION, &[slot])
        }
        GetPatch(slot) => build_outgoing_frame(
            COMMAND_REQ | command_slot(slot),
            slot_version(slot),
            SUB_COMMAND_GET_PATCH_SLOT,
            &[],
        ),
        GetPatchName(slot) => build_outgoing_frame(
            COMMAND_REQ | command_slot(slot),
            slot_version(slot),
            SUB_COMMAND_GET_PATCH_NAME,
            &[],
        ),
    })
}

/// Serialize one GUI-originated edit (`spec.md` §4.6 Poll state).
pub fn emit_edit(cmd: &EditCommand, slot_version: impl Fn(Slot) -> u8) -> Vec<u8> {
    match *cmd {
        EditCommand::SelectSlot { slot } => {
            build_outgoing_frame(COMMAND_REQ | COMMAND_SYS, 0x00, SUB_COMMAND_SELECT_SLOT, &[slot])
        }
        EditCommand::StartStop { stop } => build_outgoing_frame(
            COMMAND_REQ | COMMAND_SYS,
            0x41,
            SUB_COMMAND_START_STOP,
            &[if stop { 1 } else { 0 }],
        ),
        EditCommand::SetParam { slot, location, module_index, param_index, variation, value } => {
            let body = [location as u8, module_index, param_index, value, variation];
            build_outgoing_frame(
                COMMAND_WRITE_NO_RESP | command_slot(slot),
                slot_version(slot),
                SUB_COMMAND_SET_PARAM,
                &body,
            )
        }
        EditCommand::SetMode { slot, location, module_index, mode_index, value } => {
            let body = [location as u8, module_index, mode_index, value];
            build_outgoing_frame(COMMAND_REQ | command_slot(slot), slot_version(slot), SUB_COMMAND_SET_MODE, &body)
        }
        EditCommand::WriteCable {
            slot,
            location,
            module_from_index,
            connector_from_io_count,
            link_type,
            module_to_index,
            connector_to_io_count,
            colour,
        } => {
            // `original_source`: `0x10 | (location<<3) | colour(3 bits)`.
            let head = 0x10 | ((location as u8) << 3) | (colour & 0x07);
            let from = ((link_type as u8) << 6) | (connector_from_io_count & 0x3f);
            let body = [head, module_from_index, from, module_to_index, connector_to_io_count];
            build_outgoing_frame(
                COMMAND_REQ | command_slot(slot),
                slot_version(slot),
                SUB_COMMAND_WRITE_CABLE,
                &body,
            )
        }
        EditCommand::DeleteCable { slot, key } => {
            // `original_source`: `0x2 | location` (no colour bits here).
            let head = 0x2 | (key.location as u8);
            let from = ((key.link_type as u8) << 6) | (key.connector_from_io_count & 0x3f);
            let body = [head, key.module_from_index, from, key.module_to_index, key.connector_to_io_count];
            build_outgoing_frame(
                COMMAND_REQ | command_slot(slot),
                slot_version(slot),
                SUB_COMMAND_DELETE_CABLE,
                &body,
            )
        }
        EditCommand::AddModule { slot, location, module_type, row, column } => {
            // The device assigns the new module's index and defaults
            // colour/upRate/isLed/modes/name; `EditCommand` doesn't carry
            // them (see `DESIGN.md`), so the body is the minimal
            // type/location/column/row the original always sends first.
            let body = [module_type, location as u8, column, row];
            build_outgoing_frame(COMMAND_REQ | command_slot(slot), slot_version(slot), SUB_COMMAND_ADD_MODULE, &body)
        }
        EditCommand::MoveModule { slot, location, module_index, row, column } => {
            let body = [location as u8, module_index, column, row];
            build_outgoing_frame(COMMAND_REQ | command_slot(slot), slot_version(slot), SUB_COMMAND_MOVE_MODULE, &body)
        }
        EditCommand::DeleteModule { slot, location, module_index } => {
            let body = [location as u8, module_index];
            build_outgoing_frame(
                COMMAND_REQ | command_slot(slot),
                slot_version(slot),
                SUB_COMMAND_DELETE_MODULE,
                &body,
            )
        }
        EditCommand::SetModuleUpRate { slot, location, module_index, up_rate } => {
            let body = [location as u8, module_index, up_rate as u8];
            build_outgoing_frame(
                COMMAND_REQ | command_slot(slot),
                slot_version(slot),
                SUB_COMMAND_SET_MODULE_UPRATE,
                &body,
            )
        }
        EditCommand::SetMorphRange { slot, location, module_index, param_index, morph, range } => {
            let body = [location as u8, module_index, param_index, morph, range, 0 /* negative */, 0 /* variation */];
            build_outgoing_frame(
                COMMAND_WRITE_NO_RESP | command_slot(slot),
                slot_version(slot),
                SUB_COMMAND_SET_MORPH_RANGE,
                &body,
            )
        }
        EditCommand::SelectVariation { slot, variation } => build_outgoing_frame(
            COMMAND_REQ | command_slot(slot),
            slot_version(slot),
            SUB_COMMAND_SELECT_VARIATION,
            &[variation],
        ),
    }
}
