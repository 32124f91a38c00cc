//! `g2-core`: the G2 wire-protocol codec and connection state machine.
//!
//! This crate has no GUI, no file I/O, and no knowledge of MIDI — it
//! owns exactly the USB transport, the bit-packed protocol, and the
//! in-memory patch database, leaving the render/GUI layer to a host
//! binary (`g2-cli` in this workspace is a minimal one).

pub mod bitstream;
pub mod catalog;
pub mod codec;
pub mod crc16;
pub mod error;
pub mod model;
pub mod patchdb;
pub mod queue;
pub mod session;
pub mod transport;

pub use error::{CodecError, SessionError, SessionResult, TransportError};
pub use patchdb::PatchDb;
pub use queue::{EditCommand, MessageQueue, MessageQueueSender};
pub use session::{NullObserver, Observer, SessionMachine};
pub use transport::{RusbTransport, Transport};
