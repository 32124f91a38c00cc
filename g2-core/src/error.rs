//! Typed errors for the codec, transport and session layers.
//!
//! `anyhow` is fine at a CLI boundary where every failure just gets
//! printed and the process exits, but `SessionMachine` has to *react*
//! differently to a bad CRC than to a missing device, so the core uses
//! `thiserror` enums it can match on.

use thiserror::Error;

/// Errors raised while parsing or emitting a G2 sub-message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("CRC mismatch: computed {computed:#06x}, frame said {expected:#06x}")]
    BadCrc { computed: u16, expected: u16 },

    #[error("frame shorter than its declared length")]
    ShortFrame,

    #[error("unknown sub-command 0x{0:02x}")]
    UnknownSubCommand(u8),

    #[error("unknown response type 0x{0:02x}")]
    UnknownResponseType(u8),

    /// A catalog/wire mismatch that can only be a programmer or catalog
    /// bug (e.g. device-reported `paramCount` disagrees with the known
    /// module type). Not recoverable at runtime; see `spec.md` §7.
    #[error("protocol invariant violated: {0}")]
    ProtocolInvariantViolated(String),
}

impl CodecError {
    /// `true` for the error kinds §7 says to log-and-discard rather than
    /// propagate as fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CodecError::ProtocolInvariantViolated(_))
    }
}

/// Errors raised by the USB transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("USB operation timed out")]
    Timeout,

    #[error("device not present")]
    NoDevice,

    #[error("USB transport error: {0}")]
    Other(String),
}

impl From<rusb::Error> for TransportError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Timeout => TransportError::Timeout,
            rusb::Error::NoDevice | rusb::Error::NotFound => TransportError::NoDevice,
            other => TransportError::Other(other.to_string()),
        }
    }
}

/// Aggregated error type for `SessionMachine`'s internal plumbing.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type SessionResult<T> = Result<T, SessionError>;
