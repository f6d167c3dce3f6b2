//! RTMP wire protocol
//!
//! - [`handshake`]: C0/C1/C2 exchange ahead of the chunk stream
//! - [`chunk`]: chunk stream demultiplexing and encoding
//! - [`message`]: reassembled messages and protocol control messages
//! - [`command`]: NetConnection/NetStream commands and their replies

pub mod chunk;
pub mod command;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder};
pub use command::{Command, ConnectParams};
pub use handshake::{Handshake, HandshakeState};
pub use message::{ControlMessage, RtmpMessage};
