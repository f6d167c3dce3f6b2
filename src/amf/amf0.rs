//! AMF0 encoder and decoder
//!
//! Type markers handled here:
//! ```text
//! 0x00 - Number (IEEE 754 double, big-endian)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key/value pairs until 0x00 0x00 0x09)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x08 - ECMA Array (32-bit count hint, then like Object)
//! 0x09 - Object End
//! 0x0A - Strict Array
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported (decoded as Undefined)
//! 0x11 - AVM+ switch; the rest of the message is AMF3, which is rejected
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::{AmfObject, AmfValue};
use crate::error::AmfError;

pub const MARKER_NUMBER: u8 = 0x00;
pub const MARKER_BOOLEAN: u8 = 0x01;
pub const MARKER_STRING: u8 = 0x02;
pub const MARKER_OBJECT: u8 = 0x03;
pub const MARKER_NULL: u8 = 0x05;
pub const MARKER_UNDEFINED: u8 = 0x06;
pub const MARKER_ECMA_ARRAY: u8 = 0x08;
pub const MARKER_OBJECT_END: u8 = 0x09;
pub const MARKER_STRICT_ARRAY: u8 = 0x0A;
pub const MARKER_LONG_STRING: u8 = 0x0C;
pub const MARKER_UNSUPPORTED: u8 = 0x0D;
pub const MARKER_AVMPLUS: u8 = 0x11;

/// Maximum nesting depth for objects/arrays
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder over a `Bytes` cursor.
///
/// Every entry point consumes exactly the bytes of the value it returns, so a
/// command can be decoded field by field.
pub struct Amf0Decoder {
    /// Tolerate a missing Object-End marker at the end of the buffer
    lenient: bool,
    depth: usize,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self {
            lenient: false,
            depth: 0,
        }
    }

    pub fn with_lenient(lenient: bool) -> Self {
        Self { lenient, depth: 0 }
    }

    /// Look at the next type marker without consuming it
    pub fn peek_marker(&self, buf: &Bytes) -> Option<u8> {
        buf.first().copied()
    }

    /// Decode a single value of any supported type
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode values until the buffer is exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    /// Decode a Number, failing on any other marker
    pub fn decode_number(&mut self, buf: &mut Bytes) -> Result<f64, AmfError> {
        self.expect_marker(buf, MARKER_NUMBER, "number")?;
        self.read_number(buf)
    }

    /// Decode a Boolean, failing on any other marker
    pub fn decode_boolean(&mut self, buf: &mut Bytes) -> Result<bool, AmfError> {
        self.expect_marker(buf, MARKER_BOOLEAN, "boolean")?;
        self.read_boolean(buf)
    }

    /// Decode a String (short or long form)
    pub fn decode_string(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        match self.take_marker(buf)? {
            MARKER_STRING => self.read_utf8(buf),
            MARKER_LONG_STRING => self.read_utf8_long(buf),
            found => Err(AmfError::UnexpectedMarker {
                expected: "string",
                found,
            }),
        }
    }

    /// Decode an Object or ECMA array into its map
    pub fn decode_object(&mut self, buf: &mut Bytes) -> Result<AmfObject, AmfError> {
        match self.take_marker(buf)? {
            MARKER_OBJECT => self.read_properties(buf),
            MARKER_ECMA_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(AmfError::UnexpectedEof);
                }
                let _count = buf.get_u32();
                self.read_properties(buf)
            }
            found => Err(AmfError::UnexpectedMarker {
                expected: "object",
                found,
            }),
        }
    }

    /// Consume a Null (or Undefined) placeholder
    pub fn decode_null(&mut self, buf: &mut Bytes) -> Result<(), AmfError> {
        match self.take_marker(buf)? {
            MARKER_NULL | MARKER_UNDEFINED => Ok(()),
            found => Err(AmfError::UnexpectedMarker {
                expected: "null",
                found,
            }),
        }
    }

    fn take_marker(&mut self, buf: &mut Bytes) -> Result<u8, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }
        match buf.get_u8() {
            MARKER_AVMPLUS => Err(AmfError::Amf3Unsupported),
            marker => Ok(marker),
        }
    }

    fn expect_marker(
        &mut self,
        buf: &mut Bytes,
        expected_marker: u8,
        expected: &'static str,
    ) -> Result<(), AmfError> {
        let found = self.take_marker(buf)?;
        if found != expected_marker {
            return Err(AmfError::UnexpectedMarker { expected, found });
        }
        Ok(())
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => self.read_number(buf).map(AmfValue::Number),
            MARKER_BOOLEAN => self.read_boolean(buf).map(AmfValue::Boolean),
            MARKER_STRING => self.read_utf8(buf).map(AmfValue::String),
            MARKER_LONG_STRING => self.read_utf8_long(buf).map(AmfValue::String),
            MARKER_OBJECT => self.read_properties(buf).map(AmfValue::Object),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Undefined),
            MARKER_ECMA_ARRAY => {
                if buf.remaining() < 4 {
                    return Err(AmfError::UnexpectedEof);
                }
                // count hint, encoders do not always fill it in
                let _count = buf.get_u32();
                self.read_properties(buf).map(AmfValue::EcmaArray)
            }
            MARKER_STRICT_ARRAY => self.read_strict_array(buf),
            MARKER_AVMPLUS => Err(AmfError::Amf3Unsupported),
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    fn read_number(&mut self, buf: &mut Bytes) -> Result<f64, AmfError> {
        if buf.remaining() < 8 {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(buf.get_f64())
    }

    fn read_boolean(&mut self, buf: &mut Bytes) -> Result<bool, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(buf.get_u8() != 0)
    }

    /// Key/value pairs up to the empty key and Object-End marker
    fn read_properties(&mut self, buf: &mut Bytes) -> Result<AmfObject, AmfError> {
        let mut properties = AmfObject::new();

        loop {
            if self.lenient && buf.is_empty() {
                // some encoders drop the trailing end sequence
                break;
            }

            let key = self.read_utf8(buf)?;
            if key.is_empty() {
                if buf.is_empty() {
                    if self.lenient {
                        break;
                    }
                    return Err(AmfError::UnexpectedEof);
                }
                if buf.get_u8() != MARKER_OBJECT_END {
                    return Err(AmfError::InvalidObjectEnd);
                }
                break;
            }

            let value = self.decode(buf)?;
            properties.insert(key, value);
        }

        Ok(properties)
    }

    fn read_strict_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::UnexpectedEof);
        }

        let count = buf.get_u32() as usize;
        // every element takes at least one byte
        if count > buf.remaining() {
            return Err(AmfError::UnexpectedEof);
        }

        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(self.decode(buf)?);
        }
        Ok(AmfValue::Array(elements))
    }

    fn read_utf8(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        if buf.remaining() < 2 {
            return Err(AmfError::UnexpectedEof);
        }
        let len = buf.get_u16() as usize;
        self.read_utf8_bytes(buf, len)
    }

    fn read_utf8_long(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        if buf.remaining() < 4 {
            return Err(AmfError::UnexpectedEof);
        }
        let len = buf.get_u32() as usize;
        self.read_utf8_bytes(buf, len)
    }

    fn read_utf8_bytes(&mut self, buf: &mut Bytes, len: usize) -> Result<String, AmfError> {
        if buf.remaining() < len {
            return Err(AmfError::UnexpectedEof);
        }
        let bytes = buf.split_to(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Take the encoded bytes, leaving the encoder empty
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Null => self.buf.put_u8(MARKER_NULL),
            AmfValue::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(u8::from(*b));
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.write_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                let count = props.keys().filter(|k| !k.is_empty()).count();
                self.buf.put_u32(count as u32);
                self.write_properties(props);
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.encode(elem);
                }
            }
        }
    }

    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn write_properties(&mut self, props: &AmfObject) {
        for (key, val) in props {
            // an empty key would read back as the object terminator
            if key.is_empty() {
                continue;
            }
            self.write_utf8(key);
            self.encode(val);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// Property key: 16-bit length prefix, no marker
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(0xFFFF);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value);
    encoder.finish()
}

pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut buf = Bytes::copy_from_slice(data);
    Amf0Decoder::new().decode(&mut buf)
}

pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut buf = Bytes::copy_from_slice(data);
    Amf0Decoder::new().decode_all(&mut buf)
}
