//! Assembled RTMP messages and protocol control messages

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfValue};
use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// A complete message reassembled from one or more chunks
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpMessage {
    pub chunk_stream_id: u32,
    pub stream_id: u32,
    pub type_id: u8,
    /// Absolute timestamp in milliseconds
    pub timestamp: u32,
    pub payload: Bytes,
}

impl RtmpMessage {
    pub fn new(chunk_stream_id: u32, type_id: u8, stream_id: u32, timestamp: u32, payload: Bytes) -> Self {
        Self {
            chunk_stream_id,
            stream_id,
            type_id,
            timestamp,
            payload,
        }
    }

    /// An AMF0 command on the command chunk stream
    pub fn command(stream_id: u32, values: &[AmfValue]) -> Self {
        Self::new(
            CSID_COMMAND,
            MSG_COMMAND_AMF0,
            stream_id,
            0,
            amf0::encode_all(values),
        )
    }

    pub fn is_media(&self) -> bool {
        matches!(self.type_id, MSG_AUDIO | MSG_VIDEO)
    }
}

/// Protocol control messages (types 1-6)
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    SetChunkSize(u32),
    Abort(u32),
    Acknowledgement(u32),
    UserControl { event: u16, data: Bytes },
    WindowAckSize(u32),
    SetPeerBandwidth { size: u32, limit: u8 },
}

impl ControlMessage {
    /// Parse a control message payload, `Ok(None)` for other message types
    pub fn parse(type_id: u8, payload: &Bytes) -> Result<Option<Self>> {
        let mut buf = payload.clone();
        let msg = match type_id {
            MSG_SET_CHUNK_SIZE => {
                ControlMessage::SetChunkSize(read_u32(&mut buf, "SetChunkSize")? & MAX_CHUNK_SIZE)
            }
            MSG_ABORT => ControlMessage::Abort(read_u32(&mut buf, "Abort")?),
            MSG_ACKNOWLEDGEMENT => {
                ControlMessage::Acknowledgement(read_u32(&mut buf, "Acknowledgement")?)
            }
            MSG_USER_CONTROL => {
                if buf.remaining() < 2 {
                    return Err(truncated("UserControl", payload));
                }
                let event = buf.get_u16();
                ControlMessage::UserControl { event, data: buf }
            }
            MSG_WINDOW_ACK_SIZE => {
                ControlMessage::WindowAckSize(read_u32(&mut buf, "WindowAckSize")?)
            }
            MSG_SET_PEER_BANDWIDTH => {
                if buf.remaining() < 5 {
                    return Err(truncated("SetPeerBandwidth", payload));
                }
                let size = buf.get_u32();
                let limit = buf.get_u8();
                ControlMessage::SetPeerBandwidth { size, limit }
            }
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }

    pub fn type_id(&self) -> u8 {
        match self {
            ControlMessage::SetChunkSize(_) => MSG_SET_CHUNK_SIZE,
            ControlMessage::Abort(_) => MSG_ABORT,
            ControlMessage::Acknowledgement(_) => MSG_ACKNOWLEDGEMENT,
            ControlMessage::UserControl { .. } => MSG_USER_CONTROL,
            ControlMessage::WindowAckSize(_) => MSG_WINDOW_ACK_SIZE,
            ControlMessage::SetPeerBandwidth { .. } => MSG_SET_PEER_BANDWIDTH,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8);
        match self {
            ControlMessage::SetChunkSize(v)
            | ControlMessage::Abort(v)
            | ControlMessage::Acknowledgement(v)
            | ControlMessage::WindowAckSize(v) => buf.put_u32(*v),
            ControlMessage::UserControl { event, data } => {
                buf.put_u16(*event);
                buf.put_slice(data);
            }
            ControlMessage::SetPeerBandwidth { size, limit } => {
                buf.put_u32(*size);
                buf.put_u8(*limit);
            }
        }
        buf.freeze()
    }

    /// Wrap into a message on the protocol control chunk stream
    pub fn into_message(self) -> RtmpMessage {
        RtmpMessage::new(CSID_PROTOCOL_CONTROL, self.type_id(), 0, 0, self.encode())
    }
}

fn read_u32(buf: &mut Bytes, kind: &'static str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(truncated(kind, buf));
    }
    Ok(buf.get_u32())
}

fn truncated(kind: &'static str, payload: &Bytes) -> crate::error::Error {
    ProtocolError::TruncatedControl {
        kind,
        len: payload.len(),
    }
    .into()
}
