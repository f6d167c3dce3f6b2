//! Session state machine
//!
//! Tracks one connection from handshake to close.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Instant;

use crate::protocol::command::ConnectParams;
use crate::protocol::constants::DEFAULT_CHUNK_SIZE;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Handshake in progress
    Handshaking,
    /// Handshake complete, waiting for connect command
    WaitingConnect,
    /// Connect command accepted
    Connected,
    /// Owns a media source and feeds it packets
    Publishing,
    /// Session closed
    Closed,
}

#[derive(Debug)]
pub struct SessionState {
    pub id: u64,

    pub peer_addr: SocketAddr,

    pub phase: SessionPhase,

    pub connected_at: Instant,

    pub handshake_completed_at: Option<Instant>,

    /// Connect parameters (after connect command)
    pub connect_params: Option<ConnectParams>,

    /// Message stream ids handed out by createStream
    pub streams: BTreeSet<u32>,

    /// Next message stream ID to allocate
    next_stream_id: u32,

    /// Negotiated chunk size (incoming)
    pub in_chunk_size: u32,

    /// Negotiated chunk size (outgoing)
    pub out_chunk_size: u32,

    /// Window acknowledgement size requested by the peer
    pub window_ack_size: u32,
}

impl SessionState {
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Handshaking,
            connected_at: Instant::now(),
            handshake_completed_at: None,
            connect_params: None,
            streams: BTreeSet::new(),
            next_stream_id: 1, // Stream 0 is reserved for NetConnection
            in_chunk_size: DEFAULT_CHUNK_SIZE,
            out_chunk_size: DEFAULT_CHUNK_SIZE,
            window_ack_size: 0,
        }
    }

    pub fn complete_handshake(&mut self) {
        if self.phase == SessionPhase::Handshaking {
            self.phase = SessionPhase::WaitingConnect;
            self.handshake_completed_at = Some(Instant::now());
        }
    }

    pub fn on_connect(&mut self, params: ConnectParams) {
        self.connect_params = Some(params);
        if self.phase == SessionPhase::WaitingConnect {
            self.phase = SessionPhase::Connected;
        }
    }

    pub fn on_publish(&mut self) {
        self.phase = SessionPhase::Publishing;
    }

    pub fn on_unpublish(&mut self) {
        if self.phase == SessionPhase::Publishing {
            self.phase = SessionPhase::Connected;
        }
    }

    /// Allocate a new message stream ID
    pub fn allocate_stream_id(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        self.streams.insert(id);
        id
    }

    pub fn remove_stream(&mut self, stream_id: u32) -> bool {
        self.streams.remove(&stream_id)
    }

    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    pub fn is_connected(&self) -> bool {
        self.connect_params.is_some()
    }

    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Get the application name
    pub fn app(&self) -> Option<&str> {
        self.connect_params.as_ref().map(|p| p.app.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn state() -> SessionState {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1935);
        SessionState::new(1, addr)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = state();
        assert_eq!(state.phase, SessionPhase::Handshaking);

        state.complete_handshake();
        assert_eq!(state.phase, SessionPhase::WaitingConnect);
        assert!(state.handshake_completed_at.is_some());

        state.on_connect(ConnectParams {
            app: "live".into(),
            ..Default::default()
        });
        assert_eq!(state.phase, SessionPhase::Connected);
        assert_eq!(state.app(), Some("live"));

        state.on_publish();
        assert_eq!(state.phase, SessionPhase::Publishing);
        state.on_unpublish();
        assert_eq!(state.phase, SessionPhase::Connected);

        state.close();
        assert_eq!(state.phase, SessionPhase::Closed);
    }

    #[test]
    fn test_stream_allocation() {
        let mut state = state();

        assert_eq!(state.allocate_stream_id(), 1);
        assert_eq!(state.allocate_stream_id(), 2);
        assert!(state.streams.contains(&2));
        assert!(state.remove_stream(1));
        assert!(!state.remove_stream(1));
    }
}
