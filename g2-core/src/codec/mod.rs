//! The G2 wire-protocol codec: framing, CRC, and sub-message
//! parse/emit (`spec.md` §4.5).

pub mod commands;
pub mod constants;
pub mod frame;
pub mod subrecords;

pub use commands::{emit_command, emit_edit, SessionState};
pub use frame::{
    build_init_frame, build_outgoing_frame, parse_incoming, parse_interrupt_frame, Indication, InterruptFrame,
    ParamValues, ParsedPatch,
};
