//! AMF0 value model and wire codec
//!
//! Commands and metadata on an RTMP connection are sequences of AMF0 values.
//! AMF3 (message types 15/17, or the 0x11 switch marker) is detected and
//! reported as unsupported.

pub mod amf0;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use value::{AmfObject, AmfValue};
