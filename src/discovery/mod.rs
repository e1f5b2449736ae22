//! Multicast discovery of upstream servers.
//!
//! An announcement is a single UDP datagram whose whole payload is the
//! announcing server's HTTP port as a big-endian `u16`.  The host part of
//! the upstream address is taken from the datagram's source IP.

use crate::error::MalformedAnnouncement;

pub mod announcer;
pub mod listener;

pub use announcer::{announce, run_announcer, DEFAULT_INTERVAL};
pub use listener::run_discovery;

/// Exact payload size of an announcement datagram.
pub const ANNOUNCEMENT_LEN: usize = 2;

/// Encodes `port` as an announcement payload.
pub fn encode_port(port: u16) -> [u8; ANNOUNCEMENT_LEN] {
    port.to_be_bytes()
}

/// Decodes an announcement payload, rejecting wrong lengths and port 0.
pub fn decode_port(payload: &[u8]) -> Result<u16, MalformedAnnouncement> {
    let bytes: [u8; ANNOUNCEMENT_LEN] =
        payload.try_into().map_err(|_| MalformedAnnouncement::Length {
            expected: ANNOUNCEMENT_LEN,
            len: payload.len(),
        })?;
    match u16::from_be_bytes(bytes) {
        0 => Err(MalformedAnnouncement::ZeroPort),
        port => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_is_big_endian() {
        assert_eq!(encode_port(1111), [0x04, 0x57]);
        assert_eq!(decode_port(&[0x1f, 0x90]), Ok(8080));
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert_eq!(
            decode_port(&[0, 0, 4, 87]),
            Err(MalformedAnnouncement::Length {
                expected: 2,
                len: 4
            })
        );
        assert_eq!(
            decode_port(&[]),
            Err(MalformedAnnouncement::Length {
                expected: 2,
                len: 0
            })
        );
    }

    #[test]
    fn test_zero_port_rejected() {
        assert_eq!(decode_port(&[0, 0]), Err(MalformedAnnouncement::ZeroPort));
    }
}
