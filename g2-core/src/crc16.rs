//! CCITT-variant CRC-16 used by the G2: seed 0x0000, polynomial 0x1021,
//! no input/output reflection, no final XOR.
//!
//! That's bit-for-bit the `crc` crate's `CRC_16_XMODEM` algorithm, so we
//! reuse it instead of hand-rolling a table (grounded by
//! `tangybbq-keyboard-firmware`, which pulls in the same crate for a
//! firmware-side CRC).

use crc::{Crc, CRC_16_XMODEM};

const G2_CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the CRC the device expects over `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    G2_CRC16.checksum(bytes)
}

/// Split the trailing big-endian CRC off `frame`, verify it against the
/// preceding bytes, and return the payload with the CRC removed.
///
/// Returns `None` (a `BadCrc`-shaped failure) if `frame` is too short to
/// hold a CRC or the check fails — callers turn that into
/// [`crate::error::CodecError::BadCrc`] with the two values for logging.
pub fn split_and_verify(frame: &[u8]) -> Result<&[u8], (u16, u16)> {
    if frame.len() < 2 {
        return Err((0, 0));
    }
    let (payload, crc_bytes) = frame.split_at(frame.len() - 2);
    let expected = u16::from_be_bytes([crc_bytes[0], crc_bytes[1]]);
    let computed = crc16(payload);
    if computed == expected {
        Ok(payload)
    } else {
        Err((computed, expected))
    }
}
