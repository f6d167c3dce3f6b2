//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;
use crate::registry::{MAX_CACHE_SIZE, MIN_CACHE_SIZE};

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Disconnect if no data arrives for this long
    pub idle_timeout: Duration,

    /// Handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Chunk size for outgoing messages
    pub chunk_size: u32,

    /// Window acknowledgement size announced to the peer
    pub window_ack_size: u32,

    /// Peer bandwidth announced to the peer
    pub peer_bandwidth: u32,

    /// Largest message length a peer may declare
    pub max_message_size: u32,

    /// Largest total of partially assembled payload across chunk streams
    pub max_pending_bytes: usize,

    /// Used when the publish string names no vhost
    pub default_vhost: String,

    /// Trailing packet cache per source
    pub packet_cache_size: usize,

    /// Queue depth of channel-backed subscribers
    pub subscriber_queue: usize,

    /// Tolerate AMF0 objects without an end marker
    pub lenient_amf: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, RTMP_PORT)),
            max_connections: 0,
            tcp_nodelay: true,
            idle_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            max_message_size: MAX_MESSAGE_SIZE,
            max_pending_bytes: MAX_PENDING_BYTES,
            default_vhost: DEFAULT_VHOST.to_string(),
            packet_cache_size: MAX_CACHE_SIZE,
            subscriber_queue: 512,
            lenient_amf: false,
        }
    }
}

impl ServerConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set chunk size, clamped to the valid range
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn window_ack_size(mut self, size: u32) -> Self {
        self.window_ack_size = size;
        self
    }

    pub fn peer_bandwidth(mut self, size: u32) -> Self {
        self.peer_bandwidth = size;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn max_message_size(mut self, size: u32) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn max_pending_bytes(mut self, size: usize) -> Self {
        self.max_pending_bytes = size;
        self
    }

    pub fn default_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.default_vhost = vhost.into();
        self
    }

    /// Set the trailing cache size, clamped to the dispatcher's bounds
    pub fn packet_cache_size(mut self, size: usize) -> Self {
        self.packet_cache_size = size.clamp(MIN_CACHE_SIZE, MAX_CACHE_SIZE);
        self
    }

    pub fn subscriber_queue(mut self, depth: usize) -> Self {
        self.subscriber_queue = depth.max(1);
        self
    }

    pub fn lenient_amf(mut self, lenient: bool) -> Self {
        self.lenient_amf = lenient;
        self
    }
}
