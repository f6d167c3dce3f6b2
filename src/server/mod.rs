//! TCP server
//!
//! [`RtmpServer`] accepts connections and runs one [`Connection`] task per
//! peer. Every connection shares the server's [`Registry`].
//!
//! [`Registry`]: crate::registry::Registry

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::RtmpServer;
