//! Chunk stream demultiplexer and encoder
//!
//! Chunk format:
//! ```text
//! +-------------+----------------+-------------------+--------------+
//! | Basic Header| Message Header | Extended Timestamp|  Chunk Data  |
//! | (1-3 bytes) | (0,3,7,11 bytes)|   (0 or 4 bytes) | (variable)   |
//! +-------------+----------------+-------------------+--------------+
//! ```
//!
//! Basic header: `fmt` in the top two bits, chunk stream id in the low six.
//! Id 0 means `64 + next byte`, id 1 means `64 + next byte + 256 * byte after`.
//!
//! Message header by `fmt`:
//! - 0: timestamp (3), length (3), type (1), stream id (4, little-endian)
//! - 1: timestamp delta (3), length (3), type (1)
//! - 2: timestamp delta (3)
//! - 3: nothing, everything is inherited
//!
//! A 3-byte timestamp of `0xFFFFFF` announces a 4-byte extended timestamp.
//! Type 3 chunks of such a stream carry the extended field too.

use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;
use crate::protocol::message::RtmpMessage;

/// Header context of one message on a chunk stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MessageHeader {
    /// Resolved absolute timestamp
    timestamp: u32,
    /// Delta a following type 3 header repeats
    timestamp_delta: u32,
    /// The 3-byte timestamp field held the extended sentinel
    extended: bool,
    /// Set only by a type 0 header
    absolute: bool,
    length: u32,
    type_id: u8,
    stream_id: u32,
}

#[derive(Debug)]
struct PartialMessage {
    header: MessageHeader,
    payload: BytesMut,
}

/// Per chunk stream bookkeeping
#[derive(Debug, Default)]
struct ChunkStreamState {
    /// Message being assembled, present only while bytes are missing
    in_progress: Option<PartialMessage>,
    /// Header of the last message started on this stream
    last: Option<MessageHeader>,
}

/// What the next chunk in the buffer would do, computed without consuming
struct ChunkPlan {
    csid: u32,
    header_len: usize,
    payload_len: usize,
    /// `Some` when the chunk opens a new message
    new_header: Option<MessageHeader>,
}

enum Step {
    NeedMore,
    Continue,
    Complete(RtmpMessage),
}

/// Reassembles RTMP messages from a byte stream.
///
/// Input is only consumed a whole chunk at a time; when the buffer ends in the
/// middle of a chunk, nothing of that chunk is consumed and decoding resumes
/// from the same offset once more bytes have been appended.
#[derive(Debug)]
pub struct ChunkDecoder {
    streams: HashMap<u32, ChunkStreamState>,
    chunk_size: u32,
    max_message_size: u32,
    max_pending_bytes: usize,
    /// Payload bytes held by incomplete messages across all streams
    pending_bytes: usize,
    window_ack_size: u32,
    bytes_received: u64,
    last_ack: u64,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            max_pending_bytes: MAX_PENDING_BYTES,
            pending_bytes: 0,
            window_ack_size: 0,
            bytes_received: 0,
            last_ack: 0,
        }
    }

    pub fn with_limits(max_message_size: u32, max_pending_bytes: usize) -> Self {
        Self {
            max_message_size,
            max_pending_bytes,
            ..Self::new()
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Apply a peer SetChunkSize
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::InvalidChunkSize(size).into());
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Apply a peer WindowAckSize; zero disables acknowledgements
    pub fn set_window_ack_size(&mut self, size: u32) {
        self.window_ack_size = size;
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Drop the partially assembled message of a chunk stream (Abort)
    pub fn abort(&mut self, csid: u32) {
        if let Some(partial) = self.streams.get_mut(&csid).and_then(|s| s.in_progress.take()) {
            self.pending_bytes -= partial.payload.len();
            tracing::debug!(csid, dropped = partial.payload.len(), "Aborted partial message");
        }
    }

    /// Sequence number to acknowledge, once a full window has arrived since
    /// the last acknowledgement
    pub fn take_ack(&mut self) -> Option<u32> {
        if self.window_ack_size == 0 {
            return None;
        }
        if self.bytes_received - self.last_ack < self.window_ack_size as u64 {
            return None;
        }
        self.last_ack = self.bytes_received;
        // sequence numbers wrap at 32 bits
        Some(self.bytes_received as u32)
    }

    /// Decode the next complete message from `buf`
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RtmpMessage>> {
        loop {
            match self.read_chunk(buf)? {
                Step::NeedMore => return Ok(None),
                Step::Continue => continue,
                Step::Complete(msg) => return Ok(Some(msg)),
            }
        }
    }

    fn read_chunk(&mut self, buf: &mut BytesMut) -> Result<Step> {
        let plan = match self.plan_chunk(buf)? {
            Some(plan) => plan,
            None => return Ok(Step::NeedMore),
        };

        let total = plan.header_len + plan.payload_len;
        if buf.len() < total {
            return Ok(Step::NeedMore);
        }
        if plan.payload_len > 0 && self.pending_bytes + plan.payload_len > self.max_pending_bytes {
            return Err(ProtocolError::BacklogExceeded {
                pending: self.pending_bytes + plan.payload_len,
                limit: self.max_pending_bytes,
            }
            .into());
        }

        buf.advance(plan.header_len);
        let data = buf.split_to(plan.payload_len);
        self.bytes_received += total as u64;

        let state = self.streams.entry(plan.csid).or_default();

        if let Some(header) = plan.new_header {
            if let Some(stale) = state.in_progress.take() {
                tracing::warn!(
                    csid = plan.csid,
                    dropped = stale.payload.len(),
                    "New message header interrupted a partial message"
                );
                self.pending_bytes -= stale.payload.len();
            }
            state.last = Some(header);

            if header.length == 0 {
                return Ok(Step::Continue);
            }

            let capacity = (header.length as usize).min(self.chunk_size as usize * 4);
            state.in_progress = Some(PartialMessage {
                header,
                payload: BytesMut::with_capacity(capacity),
            });
        }

        let Some(partial) = state.in_progress.as_mut() else {
            return Err(ProtocolError::MissingChunkContext(plan.csid).into());
        };
        partial.payload.put_slice(&data);
        self.pending_bytes += data.len();

        if partial.payload.len() < partial.header.length as usize {
            return Ok(Step::Continue);
        }

        let Some(done) = state.in_progress.take() else {
            return Ok(Step::Continue);
        };
        self.pending_bytes -= done.payload.len();

        Ok(Step::Complete(RtmpMessage {
            chunk_stream_id: plan.csid,
            stream_id: done.header.stream_id,
            type_id: done.header.type_id,
            timestamp: done.header.timestamp,
            payload: done.payload.freeze(),
        }))
    }

    /// Parse the headers of the chunk at the front of `buf` without consuming
    fn plan_chunk(&self, buf: &[u8]) -> Result<Option<ChunkPlan>> {
        let Some((fmt, csid, basic_len)) = parse_basic_header(buf) else {
            return Ok(None);
        };

        let msg_header_len = match fmt {
            CHUNK_FMT_0 => 11,
            CHUNK_FMT_1 => 7,
            CHUNK_FMT_2 => 3,
            _ => 0,
        };
        if buf.len() < basic_len + msg_header_len {
            return Ok(None);
        }
        let h = &buf[basic_len..basic_len + msg_header_len];

        let state = self.streams.get(&csid);
        let in_progress = state.and_then(|s| s.in_progress.as_ref());
        let last = state.and_then(|s| s.last);

        // type 3 on a stream with a partial message continues that message
        if fmt == CHUNK_FMT_3 {
            if let Some(partial) = in_progress {
                let ext_len = if partial.header.extended { 4 } else { 0 };
                let header_len = basic_len + ext_len;
                if buf.len() < header_len {
                    return Ok(None);
                }
                let remaining = partial.header.length as usize - partial.payload.len();
                return Ok(Some(ChunkPlan {
                    csid,
                    header_len,
                    payload_len: remaining.min(self.chunk_size as usize),
                    new_header: None,
                }));
            }
        }

        let base = match (fmt, last) {
            (CHUNK_FMT_0, _) => MessageHeader::default(),
            (_, Some(last)) => last,
            (_, None) => return Err(ProtocolError::MissingChunkContext(csid).into()),
        };

        let raw_timestamp = if fmt == CHUNK_FMT_3 {
            if base.extended {
                EXTENDED_TIMESTAMP_THRESHOLD
            } else {
                base.timestamp_delta
            }
        } else {
            read_u24(&h[0..3])
        };
        let extended = raw_timestamp == EXTENDED_TIMESTAMP_THRESHOLD;
        let ext_len = if extended { 4 } else { 0 };
        let header_len = basic_len + msg_header_len + ext_len;
        if buf.len() < header_len {
            return Ok(None);
        }
        let timestamp_field = if extended {
            let ext = &buf[basic_len + msg_header_len..header_len];
            u32::from_be_bytes([ext[0], ext[1], ext[2], ext[3]])
        } else {
            raw_timestamp
        };

        let mut header = MessageHeader {
            timestamp_delta: timestamp_field,
            extended,
            absolute: fmt == CHUNK_FMT_0,
            ..base
        };
        match fmt {
            CHUNK_FMT_0 => {
                header.length = read_u24(&h[3..6]);
                header.type_id = h[6];
                header.stream_id = u32::from_le_bytes([h[7], h[8], h[9], h[10]]);
            }
            CHUNK_FMT_1 => {
                header.length = read_u24(&h[3..6]);
                header.type_id = h[6];
            }
            _ => {}
        }
        // timestamps wrap at 32 bits, no rollover extension is attempted
        header.timestamp = if header.absolute {
            timestamp_field
        } else {
            base.timestamp.wrapping_add(timestamp_field)
        };

        if header.length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                length: header.length,
                limit: self.max_message_size,
            }
            .into());
        }

        Ok(Some(ChunkPlan {
            csid,
            header_len,
            payload_len: (header.length as usize).min(self.chunk_size as usize),
            new_header: Some(header),
        }))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// `(fmt, csid, header length)`, `None` until enough bytes are present
fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    let first = *buf.first()?;
    let fmt = first >> 6;
    match first & 0x3F {
        0 => Some((fmt, 64 + *buf.get(1)? as u32, 2)),
        1 => {
            let b1 = *buf.get(1)? as u32;
            let b2 = *buf.get(2)? as u32;
            Some((fmt, 64 + b1 + 256 * b2, 3))
        }
        id => Some((fmt, id as u32, 1)),
    }
}

fn read_u24(b: &[u8]) -> u32 {
    (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32
}

/// Splits outgoing messages into chunks: one type 0 header, then type 3
/// continuations
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: u32,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Takes effect for messages encoded after the SetChunkSize announcing it
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    pub fn encode(&self, msg: &RtmpMessage, out: &mut BytesMut) {
        let extended = msg.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let chunk_size = self.chunk_size as usize;
        let len = msg.payload.len();
        out.reserve(len + 16 + (len / chunk_size) * 8);

        let timestamp_field = if extended {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            msg.timestamp
        };

        write_basic_header(out, CHUNK_FMT_0, msg.chunk_stream_id);
        out.put_uint(timestamp_field as u64, 3);
        out.put_uint(len as u64, 3);
        out.put_u8(msg.type_id);
        out.put_u32_le(msg.stream_id);
        if extended {
            out.put_u32(msg.timestamp);
        }

        let mut chunks = msg.payload.chunks(chunk_size);
        if let Some(first) = chunks.next() {
            out.put_slice(first);
        }
        for chunk in chunks {
            write_basic_header(out, CHUNK_FMT_3, msg.chunk_stream_id);
            if extended {
                out.put_u32(msg.timestamp);
            }
            out.put_slice(chunk);
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    let fmt = fmt << 6;
    match csid {
        0..=63 => out.put_u8(fmt | csid as u8),
        64..=319 => {
            out.put_u8(fmt);
            out.put_u8((csid - 64) as u8);
        }
        _ => {
            let id = csid - 64;
            out.put_u8(fmt | 1);
            out.put_u8((id & 0xFF) as u8);
            out.put_u8((id >> 8) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use bytes::Bytes;

    fn basic(fmt: u8, csid: u32) -> Vec<u8> {
        let mut out = BytesMut::new();
        write_basic_header(&mut out, fmt, csid);
        out.to_vec()
    }

    fn fmt0(csid: u32, ts: u32, len: u32, type_id: u8, sid: u32) -> Vec<u8> {
        let mut v = basic(0, csid);
        v.extend_from_slice(&ts.to_be_bytes()[1..]);
        v.extend_from_slice(&len.to_be_bytes()[1..]);
        v.push(type_id);
        v.extend_from_slice(&sid.to_le_bytes());
        v
    }

    fn fmt1(csid: u32, delta: u32, len: u32, type_id: u8) -> Vec<u8> {
        let mut v = basic(1, csid);
        v.extend_from_slice(&delta.to_be_bytes()[1..]);
        v.extend_from_slice(&len.to_be_bytes()[1..]);
        v.push(type_id);
        v
    }

    fn fmt2(csid: u32, delta: u32) -> Vec<u8> {
        let mut v = basic(2, csid);
        v.extend_from_slice(&delta.to_be_bytes()[1..]);
        v
    }

    fn decode_all(decoder: &mut ChunkDecoder, buf: &mut BytesMut) -> Vec<RtmpMessage> {
        let mut out = Vec::new();
        while let Some(msg) = decoder.decode(buf).unwrap() {
            out.push(msg);
        }
        out
    }

    /// Feed `wire` in slices of `step` bytes, collecting every message
    fn feed(wire: &[u8], step: usize, chunk_size: u32) -> Vec<RtmpMessage> {
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(chunk_size).unwrap();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for piece in wire.chunks(step) {
            buf.extend_from_slice(piece);
            out.extend(decode_all(&mut decoder, &mut buf));
        }
        assert!(buf.is_empty());
        out
    }

    #[test]
    fn test_basic_header_forms() {
        assert_eq!(parse_basic_header(&[0x03]), Some((0, 3, 1)));
        assert_eq!(parse_basic_header(&[0xC4]), Some((3, 4, 1)));
        assert_eq!(parse_basic_header(&[0x40, 0x0A]), Some((1, 74, 2)));
        assert_eq!(parse_basic_header(&[0x81, 0x02, 0x01]), Some((2, 64 + 2 + 256, 3)));
        // id bytes not yet available
        assert_eq!(parse_basic_header(&[]), None);
        assert_eq!(parse_basic_header(&[0x00]), None);
        assert_eq!(parse_basic_header(&[0x01, 0x02]), None);

        for csid in [2, 63, 64, 319, 320, 65599] {
            let header = basic(0, csid);
            assert_eq!(parse_basic_header(&header), Some((0, csid, header.len())));
        }
    }

    #[test]
    fn test_single_chunk_message() {
        let mut wire = fmt0(3, 1000, 4, MSG_COMMAND_AMF0, 1);
        wire.extend_from_slice(b"abcd");

        let msgs = feed(&wire, wire.len(), 128);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].chunk_stream_id, 3);
        assert_eq!(msgs[0].stream_id, 1);
        assert_eq!(msgs[0].type_id, MSG_COMMAND_AMF0);
        assert_eq!(msgs[0].timestamp, 1000);
        assert_eq!(&msgs[0].payload[..], b"abcd");
    }

    #[test]
    fn test_roundtrip_through_encoder_in_any_slicing() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7) as u8).collect();
        let msg = RtmpMessage::new(6, MSG_VIDEO, 1, 40, Bytes::from(payload));

        for chunk_size in [1u32, 7, 128, 999, 1000, 4096] {
            let mut encoder = ChunkEncoder::new();
            encoder.set_chunk_size(chunk_size);
            let mut wire = BytesMut::new();
            encoder.encode(&msg, &mut wire);

            for step in [1usize, 3, 100, wire.len()] {
                let msgs = feed(&wire, step, chunk_size);
                assert_eq!(msgs, vec![msg.clone()], "chunk {chunk_size} step {step}");
            }
        }
    }

    #[test]
    fn test_interleaved_chunk_streams() {
        // two 6-byte messages on csid 4 and 5 plus a 2-byte one on csid 70,
        // split into 2-byte chunks and interleaved
        let mut wire = Vec::new();
        wire.extend(fmt0(4, 10, 6, MSG_AUDIO, 1));
        wire.extend_from_slice(b"a1");
        wire.extend(fmt0(5, 20, 6, MSG_VIDEO, 1));
        wire.extend_from_slice(b"v1");
        wire.extend(fmt0(70, 30, 2, MSG_DATA_AMF0, 1));
        wire.extend_from_slice(b"d1");
        wire.extend(basic(3, 4));
        wire.extend_from_slice(b"a2");
        wire.extend(basic(3, 5));
        wire.extend_from_slice(b"v2");
        wire.extend(basic(3, 5));
        wire.extend_from_slice(b"v3");
        wire.extend(basic(3, 4));
        wire.extend_from_slice(b"a3");

        for step in [1, 2, 5, wire.len()] {
            let msgs = feed(&wire, step, 2);
            assert_eq!(msgs.len(), 3);
            assert_eq!((msgs[0].chunk_stream_id, &msgs[0].payload[..]), (70, &b"d1"[..]));
            assert_eq!((msgs[1].chunk_stream_id, &msgs[1].payload[..]), (5, &b"v1v2v3"[..]));
            assert_eq!(msgs[1].timestamp, 20);
            assert_eq!(msgs[1].type_id, MSG_VIDEO);
            assert_eq!((msgs[2].chunk_stream_id, &msgs[2].payload[..]), (4, &b"a1a2a3"[..]));
            assert_eq!(msgs[2].timestamp, 10);
        }
    }

    #[test]
    fn test_type3_new_message_inherits_header() {
        let mut wire = fmt0(4, 1000, 3, MSG_AUDIO, 7);
        wire.extend_from_slice(b"one");
        wire.extend(basic(3, 4));
        wire.extend_from_slice(b"two");
        wire.extend(basic(3, 4));
        wire.extend_from_slice(b"six");

        let msgs = feed(&wire, 1, 128);
        assert_eq!(msgs.len(), 3);
        for m in &msgs {
            assert_eq!((m.stream_id, m.type_id, m.payload.len()), (7, MSG_AUDIO, 3));
        }
        assert_eq!(msgs[0].timestamp, 1000);
        assert_eq!(msgs[1].timestamp, 2000);
        assert_eq!(msgs[2].timestamp, 3000);
    }

    #[test]
    fn test_type1_and_type2_deltas() {
        let mut wire = fmt0(6, 100, 2, MSG_VIDEO, 1);
        wire.extend_from_slice(b"k1");
        wire.extend(fmt1(6, 33, 3, MSG_AUDIO));
        wire.extend_from_slice(b"abc");
        wire.extend(fmt2(6, 40));
        wire.extend_from_slice(b"def");
        wire.extend(basic(3, 6));
        wire.extend_from_slice(b"ghi");

        let msgs = feed(&wire, wire.len(), 128);
        let summary: Vec<_> = msgs
            .iter()
            .map(|m| (m.timestamp, m.type_id, m.stream_id, m.payload.len()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (100, MSG_VIDEO, 1, 2),
                (133, MSG_AUDIO, 1, 3),
                (173, MSG_AUDIO, 1, 3),
                (213, MSG_AUDIO, 1, 3),
            ]
        );
    }

    #[test]
    fn test_extended_timestamp() {
        let ts = 0x0100_0000;
        let msg = RtmpMessage::new(4, MSG_AUDIO, 1, ts, Bytes::from(vec![9u8; 300]));
        let mut wire = BytesMut::new();
        ChunkEncoder::new().encode(&msg, &mut wire);
        // fmt0 + ext ts + 128, then two continuations carrying ext ts again
        assert_eq!(wire.len(), 12 + 4 + 300 + 2 * (1 + 4));

        let msgs = feed(&wire, 1, 128);
        assert_eq!(msgs, vec![msg]);
    }

    #[test]
    fn test_extended_delta_repeated_by_type3() {
        let mut wire = fmt0(4, 0, 1, MSG_AUDIO, 1);
        wire.push(0xAA);
        wire.extend(fmt2(4, 0xFF_FFFF));
        wire.extend_from_slice(&0x0200_0000u32.to_be_bytes());
        wire.push(0xBB);
        wire.extend(basic(3, 4));
        wire.extend_from_slice(&0x0200_0000u32.to_be_bytes());
        wire.push(0xCC);

        let msgs = feed(&wire, 1, 128);
        let stamps: Vec<_> = msgs.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![0, 0x0200_0000, 0x0400_0000]);
    }

    #[test]
    fn test_timestamp_wraps() {
        let mut wire = fmt0(4, 0xFF_FFFF, 1, MSG_AUDIO, 1);
        wire.extend_from_slice(&u32::MAX.to_be_bytes());
        wire.push(1);
        wire.extend(fmt2(4, 2));
        wire.push(2);

        let msgs = feed(&wire, wire.len(), 128);
        assert_eq!(msgs[0].timestamp, u32::MAX);
        assert_eq!(msgs[1].timestamp, 1);
    }

    #[test]
    fn test_zero_length_message_refreshes_context_only() {
        let mut wire = fmt0(4, 500, 0, MSG_AUDIO, 1);
        wire.extend(fmt2(4, 10));
        let msgs = feed(&wire, wire.len(), 128);
        assert!(msgs.is_empty());

        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::from(&fmt0(4, 500, 0, MSG_AUDIO, 1)[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        let mut next = fmt1(4, 10, 1, MSG_AUDIO);
        next.push(0x01);
        buf.extend_from_slice(&next);
        let msg = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.timestamp, 510);
    }

    #[test]
    fn test_partial_chunk_is_not_consumed() {
        let mut wire = fmt0(3, 0, 10, MSG_COMMAND_AMF0, 0);
        wire.extend_from_slice(b"0123456789");

        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::from(&wire[..wire.len() - 1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), wire.len() - 1);
        assert_eq!(decoder.bytes_received(), 0);

        buf.extend_from_slice(&wire[wire.len() - 1..]);
        let msg = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&msg.payload[..], b"0123456789");
        assert_eq!(decoder.bytes_received(), wire.len() as u64);
    }

    #[test]
    fn test_message_too_large() {
        let wire = fmt0(4, 0, 0xFF_FFFF, MSG_VIDEO, 1);
        let mut decoder = ChunkDecoder::with_limits(1024, MAX_PENDING_BYTES);
        let mut buf = BytesMut::from(&wire[..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MessageTooLarge {
                length: 0xFF_FFFF,
                limit: 1024
            })
        ));
    }

    #[test]
    fn test_backlog_cap() {
        // three streams each holding an unfinished 100-byte message
        let mut decoder = ChunkDecoder::with_limits(1024, 250);
        decoder.set_chunk_size(100).unwrap();
        let mut buf = BytesMut::new();
        for csid in [4, 5] {
            buf.extend_from_slice(&fmt0(csid, 0, 200, MSG_VIDEO, 1));
            buf.extend_from_slice(&[0u8; 100]);
        }
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(decoder.pending_bytes(), 200);

        buf.extend_from_slice(&fmt0(6, 0, 200, MSG_VIDEO, 1));
        buf.extend_from_slice(&[0u8; 100]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::BacklogExceeded {
                pending: 300,
                limit: 250
            })
        ));
    }

    #[test]
    fn test_missing_context() {
        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::from(&fmt2(9, 10)[..]);
        buf.put_u8(0);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MissingChunkContext(9))
        ));
    }

    #[test]
    fn test_abort_drops_partial_message() {
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(4).unwrap();
        let mut buf = BytesMut::from(&fmt0(4, 0, 8, MSG_AUDIO, 1)[..]);
        buf.extend_from_slice(b"dead");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(decoder.pending_bytes(), 4);

        decoder.abort(4);
        assert_eq!(decoder.pending_bytes(), 0);

        // the stream's context survives, so a type 1 header starts afresh
        buf.extend_from_slice(&fmt1(4, 5, 2, MSG_AUDIO));
        buf.extend_from_slice(b"ok");
        let msg = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&msg.payload[..], b"ok");
        assert_eq!(msg.timestamp, 5);
    }

    #[test]
    fn test_acknowledgement_window() {
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(4096).unwrap();
        decoder.set_window_ack_size(1000);

        let msg = RtmpMessage::new(4, MSG_AUDIO, 1, 0, Bytes::from(vec![0u8; 600]));
        let mut wire = BytesMut::new();
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(4096);
        encoder.encode(&msg, &mut wire);

        let mut buf = wire.clone();
        decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoder.take_ack(), None);

        let mut buf = wire.clone();
        decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoder.take_ack(), Some(2 * wire.len() as u32));
        assert_eq!(decoder.take_ack(), None);
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.set_chunk_size(0).is_err());
        assert!(decoder.set_chunk_size(0x8000_0000).is_err());
        decoder.set_chunk_size(MAX_CHUNK_SIZE).unwrap();
        assert_eq!(decoder.chunk_size(), MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_encoder_large_csid() {
        let msg = RtmpMessage::new(400, MSG_AUDIO, 1, 0, Bytes::from_static(b"x"));
        let mut wire = BytesMut::new();
        ChunkEncoder::new().encode(&msg, &mut wire);
        assert_eq!(&wire[..3], &[0x01, (336 & 0xFF) as u8, (336 >> 8) as u8]);
        assert_eq!(feed(&wire, 1, 128), vec![msg]);
    }
}
