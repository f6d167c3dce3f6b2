//! RTMP publish ingest
//!
//! Accepts RTMP publishers, turns their chunk streams into messages, and
//! makes each published stream discoverable in a [`Registry`] keyed by
//! `(schema, vhost, app, stream)`. Readers attach to a [`MediaSource`] and
//! receive its packets, starting from the latest keyframe.
//!
//! ```no_run
//! use rtmp_ingest::{RtmpServer, ServerConfig};
//!
//! # async fn run() -> rtmp_ingest::Result<()> {
//! let server = RtmpServer::new(ServerConfig::default());
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

pub mod amf;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use error::{Error, ErrorCategory, Result};
pub use media::{MediaPacket, PacketKind, StreamMetadata};
pub use registry::{MediaKey, MediaSource, Registry, Subscription};
pub use server::{RtmpServer, ServerConfig};
