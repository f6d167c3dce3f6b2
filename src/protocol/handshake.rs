//! Server side of the RTMP handshake
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes) -------------->|   AwaitC0C1
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes) ---------------|
//!   |<------ S2 (1536 bytes: echo of C1) ---|
//!   |------- C2 (1536 bytes) -------------->|   AwaitC2
//!   |          [chunk stream follows]        |   Streaming
//! ```
//!
//! Only the simple handshake is implemented; S1 is time zero, four zero
//! bytes, then pseudo-random filler. C2 is length-checked and discarded.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for C0 + C1
    AwaitC0C1,
    /// S0/S1/S2 sent, waiting for C2
    AwaitC2,
    /// Handshake finished, remaining bytes belong to the chunk stream
    Streaming,
}

#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::AwaitC0C1,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Streaming
    }

    /// Bytes required before the next transition
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            HandshakeState::AwaitC0C1 => 1 + HANDSHAKE_SIZE,
            HandshakeState::AwaitC2 => HANDSHAKE_SIZE,
            HandshakeState::Streaming => 0,
        }
    }

    /// Advance the state machine with buffered input.
    ///
    /// Consumes C0C1 or C2 from the front of `buf` once enough bytes are
    /// present and leaves everything after them in place. Returns S0+S1+S2
    /// when C0C1 has been accepted. Too little input is `Ok(None)`.
    pub fn process(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.state {
            HandshakeState::AwaitC0C1 => {
                if buf.len() < 1 + HANDSHAKE_SIZE {
                    return Ok(None);
                }

                let version = buf.get_u8();
                if version != RTMP_VERSION {
                    return Err(HandshakeError::InvalidVersion(version).into());
                }
                let c1 = buf.split_to(HANDSHAKE_SIZE);

                let mut response = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
                response.put_u8(RTMP_VERSION);
                response.put_slice(&generate_s1());
                response.put_slice(&c1);

                self.state = HandshakeState::AwaitC2;
                Ok(Some(response.freeze()))
            }
            HandshakeState::AwaitC2 => {
                if buf.len() < HANDSHAKE_SIZE {
                    return Ok(None);
                }
                buf.advance(HANDSHAKE_SIZE);
                self.state = HandshakeState::Streaming;
                Ok(None)
            }
            HandshakeState::Streaming => Ok(None),
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

/// S1: time (zero), four zero bytes, 1528 filler bytes
fn generate_s1() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];

    let mut seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x5DEE_CE66);
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }

    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn c0c1(version: u8, c1: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(version);
        buf.put_slice(c1);
        buf
    }

    #[test]
    fn test_zero_c1_scenario() {
        let mut hs = Handshake::new();
        let mut buf = c0c1(3, &[0u8; HANDSHAKE_SIZE]);

        let reply = hs.process(&mut buf).unwrap().unwrap();
        assert_eq!(reply.len(), 1 + HANDSHAKE_SIZE * 2);
        assert_eq!(reply[0], 0x03);
        assert_eq!(&reply[1..9], &[0u8; 8]);
        assert_eq!(&reply[1 + HANDSHAKE_SIZE..], &[0u8; HANDSHAKE_SIZE][..]);
        assert_eq!(hs.state(), HandshakeState::AwaitC2);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_s2_echoes_c1() {
        let c1: Vec<u8> = (0..HANDSHAKE_SIZE).map(|i| (i % 251) as u8).collect();
        let mut hs = Handshake::new();
        let mut buf = c0c1(3, &c1);

        let reply = hs.process(&mut buf).unwrap().unwrap();
        assert_eq!(&reply[1 + HANDSHAKE_SIZE..], &c1[..]);
    }

    #[test]
    fn test_full_handshake_leaves_trailing_bytes() {
        let mut hs = Handshake::new();
        let mut buf = c0c1(3, &[7u8; HANDSHAKE_SIZE]);
        hs.process(&mut buf).unwrap();

        buf.put_slice(&[1u8; HANDSHAKE_SIZE]);
        buf.put_slice(&[0x02, 0xAA]);
        assert!(hs.process(&mut buf).unwrap().is_none());
        assert!(hs.is_done());
        assert_eq!(&buf[..], &[0x02, 0xAA]);
    }

    #[test]
    fn test_incremental_input() {
        let mut hs = Handshake::new();
        let mut buf = BytesMut::new();
        buf.put_u8(3);
        buf.put_slice(&[0u8; 100]);
        assert!(hs.process(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 101);
        assert_eq!(hs.bytes_needed(), 1 + HANDSHAKE_SIZE);

        buf.put_slice(&[0u8; HANDSHAKE_SIZE - 100]);
        assert!(hs.process(&mut buf).unwrap().is_some());

        buf.put_slice(&[0u8; HANDSHAKE_SIZE - 1]);
        assert!(hs.process(&mut buf).unwrap().is_none());
        assert_eq!(hs.state(), HandshakeState::AwaitC2);

        buf.put_u8(0);
        hs.process(&mut buf).unwrap();
        assert!(hs.is_done());
    }

    #[test]
    fn test_wrong_version_is_fatal() {
        for version in [0u8, 6, 31] {
            let mut hs = Handshake::new();
            let mut buf = c0c1(version, &[0u8; HANDSHAKE_SIZE]);
            let err = hs.process(&mut buf).unwrap_err();
            assert!(matches!(
                err,
                Error::Handshake(HandshakeError::InvalidVersion(v)) if v == version
            ));
        }
    }

    #[test]
    fn test_s1_filler_is_not_constant() {
        let s1 = generate_s1();
        assert_eq!(&s1[..8], &[0u8; 8]);
        assert!(s1[8..].iter().any(|&b| b != s1[8]));
    }
}
