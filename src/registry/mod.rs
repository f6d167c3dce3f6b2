//! Live source registry and packet fan-out
//!
//! # Architecture
//!
//! ```text
//!                           Arc<Registry>
//!                  ┌──────────────────────────────┐
//!                  │ schema/vhost/app/stream ──►  │
//!                  │        Weak<MediaSource>     │
//!                  └──────────────┬───────────────┘
//!                                 │ find()
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    Ownership              Subscription            SubscriberHandle
//!    input_packet()         recv().await            read callback
//!         │                       ▲                       ▲
//!         └──► PacketDispatcher::distribute() ────────────┘
//! ```
//!
//! # Zero-Copy Design
//!
//! Packets carry `bytes::Bytes` payloads, so every subscriber shares the
//! publisher's allocation. Cloning a packet only bumps a reference count.

pub mod dispatcher;
pub mod error;
pub mod key;
pub mod source;
pub mod store;
pub mod subscriber;

pub use dispatcher::{PacketDispatcher, SubscriberHandle, MAX_CACHE_SIZE, MIN_CACHE_SIZE};
pub use error::RegistryError;
pub use key::{MediaKey, StreamPath};
pub use source::{MediaSource, Ownership};
pub use store::Registry;
pub use subscriber::Subscription;
