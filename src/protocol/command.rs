//! NetConnection / NetStream commands
//!
//! Incoming command messages are decoded into [`Command`]; the reply helpers
//! build the server's answers as ready-to-send messages on the command chunk
//! stream.

use bytes::Bytes;

use crate::amf::{Amf0Decoder, AmfObject, AmfValue};
use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::RtmpMessage;

/// Parameters carried by the `connect` command object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectParams {
    pub app: String,
    pub tc_url: Option<String>,
    pub flash_ver: Option<String>,
    pub object_encoding: f64,
}

impl ConnectParams {
    pub fn from_amf(obj: &AmfObject) -> Self {
        let string = |key: &str| obj.get(key).and_then(AmfValue::as_str).map(str::to_string);
        Self {
            app: string("app").unwrap_or_default(),
            tc_url: string("tcUrl"),
            flash_ver: string("flashVer"),
            object_encoding: obj
                .get("objectEncoding")
                .and_then(AmfValue::as_number)
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect {
        transaction_id: f64,
        params: ConnectParams,
    },
    CreateStream {
        transaction_id: f64,
    },
    Publish {
        transaction_id: f64,
        /// `<stream>[?vhost=..][&token=..]`
        path: String,
        /// `live`, `record` or `append` when given
        publish_type: Option<String>,
    },
    ReleaseStream {
        transaction_id: f64,
        name: String,
    },
    FcPublish {
        transaction_id: f64,
        name: String,
    },
    FcUnpublish {
        transaction_id: f64,
        name: String,
    },
    DeleteStream {
        transaction_id: f64,
        stream_id: u32,
    },
    CloseStream {
        transaction_id: f64,
    },
    Other {
        name: String,
        transaction_id: f64,
    },
}

impl Command {
    /// Decode an AMF0 command payload: name, transaction id, then the
    /// command-specific arguments
    pub fn parse(payload: &Bytes, decoder: &mut Amf0Decoder) -> Result<Self> {
        let mut buf = payload.clone();
        let name = decoder.decode_string(&mut buf)?;
        // some clients omit the transaction id on fire-and-forget commands
        let transaction_id = if buf.is_empty() {
            0.0
        } else {
            decoder.decode_number(&mut buf)?
        };

        let command = match name.as_str() {
            CMD_CONNECT => {
                let obj = decoder.decode_object(&mut buf)?;
                Command::Connect {
                    transaction_id,
                    params: ConnectParams::from_amf(&obj),
                }
            }
            CMD_CREATE_STREAM => Command::CreateStream { transaction_id },
            CMD_PUBLISH => {
                decoder.decode_null(&mut buf)?;
                let path = decoder.decode_string(&mut buf)?;
                let publish_type = if buf.is_empty() {
                    None
                } else {
                    Some(decoder.decode_string(&mut buf)?)
                };
                Command::Publish {
                    transaction_id,
                    path,
                    publish_type,
                }
            }
            CMD_RELEASE_STREAM => Command::ReleaseStream {
                transaction_id,
                name: stream_name_arg(&mut buf, decoder)?,
            },
            CMD_FC_PUBLISH => Command::FcPublish {
                transaction_id,
                name: stream_name_arg(&mut buf, decoder)?,
            },
            CMD_FC_UNPUBLISH => Command::FcUnpublish {
                transaction_id,
                name: stream_name_arg(&mut buf, decoder)?,
            },
            CMD_DELETE_STREAM => {
                let mut stream_id = 0;
                if !buf.is_empty() {
                    decoder.decode_null(&mut buf)?;
                    if !buf.is_empty() {
                        stream_id = decoder.decode_number(&mut buf)? as u32;
                    }
                }
                Command::DeleteStream {
                    transaction_id,
                    stream_id,
                }
            }
            CMD_CLOSE_STREAM => Command::CloseStream { transaction_id },
            _ => Command::Other {
                name,
                transaction_id,
            },
        };
        Ok(command)
    }

    pub fn name(&self) -> &str {
        match self {
            Command::Connect { .. } => CMD_CONNECT,
            Command::CreateStream { .. } => CMD_CREATE_STREAM,
            Command::Publish { .. } => CMD_PUBLISH,
            Command::ReleaseStream { .. } => CMD_RELEASE_STREAM,
            Command::FcPublish { .. } => CMD_FC_PUBLISH,
            Command::FcUnpublish { .. } => CMD_FC_UNPUBLISH,
            Command::DeleteStream { .. } => CMD_DELETE_STREAM,
            Command::CloseStream { .. } => CMD_CLOSE_STREAM,
            Command::Other { name, .. } => name,
        }
    }
}

// null command object followed by the stream name
fn stream_name_arg(buf: &mut Bytes, decoder: &mut Amf0Decoder) -> Result<String> {
    if buf.is_empty() {
        return Ok(String::new());
    }
    decoder.decode_null(buf)?;
    if buf.is_empty() {
        return Ok(String::new());
    }
    Ok(decoder.decode_string(buf)?)
}

/// Decode a data message carrying stream metadata.
///
/// Accepts both `@setDataFrame, onMetaData, {..}` and `onMetaData, {..}`.
/// Returns `None` for other data messages.
pub fn parse_metadata(payload: &Bytes, decoder: &mut Amf0Decoder) -> Result<Option<AmfObject>> {
    let mut buf = payload.clone();
    let mut name = decoder.decode_string(&mut buf)?;
    if name == CMD_SET_DATA_FRAME {
        name = decoder.decode_string(&mut buf)?;
    }
    if name != CMD_ON_METADATA {
        return Ok(None);
    }
    Ok(Some(decoder.decode_object(&mut buf)?))
}

/// `_result` for `connect`, followed by `onBWDone`
pub fn connect_result(transaction_id: f64) -> Vec<RtmpMessage> {
    let properties: AmfValue = [
        ("fmsVer", AmfValue::from(FMS_VERSION)),
        ("capabilities", AmfValue::Number(FMS_CAPABILITIES)),
    ]
    .into_iter()
    .collect();

    let information: AmfValue = [
        ("level", AmfValue::from("status")),
        ("code", AmfValue::from(NC_CONNECT_SUCCESS)),
        ("description", AmfValue::from("Connection succeeded")),
        ("objectEncoding", AmfValue::Number(0.0)),
    ]
    .into_iter()
    .collect();

    vec![
        RtmpMessage::command(
            0,
            &[
                AmfValue::from(CMD_RESULT),
                AmfValue::Number(transaction_id),
                properties,
                information,
            ],
        ),
        RtmpMessage::command(
            0,
            &[
                AmfValue::from(CMD_ON_BW_DONE),
                AmfValue::Number(0.0),
                AmfValue::Null,
            ],
        ),
    ]
}

pub fn create_stream_result(transaction_id: f64, stream_id: u32) -> RtmpMessage {
    RtmpMessage::command(
        0,
        &[
            AmfValue::from(CMD_RESULT),
            AmfValue::Number(transaction_id),
            AmfValue::Null,
            AmfValue::from(stream_id),
        ],
    )
}

/// `onStatus` for a `publish`, `Err` carries the failure description
pub fn publish_status(
    stream_id: u32,
    transaction_id: f64,
    outcome: std::result::Result<(), &str>,
) -> RtmpMessage {
    let (level, code, description) = match outcome {
        Ok(()) => ("status", NS_PUBLISH_START, "Start publishing"),
        Err(reason) => ("error", NS_PUBLISH_BAD_NAME, reason),
    };
    let info: AmfValue = [
        ("level", AmfValue::from(level)),
        ("code", AmfValue::from(code)),
        ("description", AmfValue::from(description)),
        ("clientid", AmfValue::from("0")),
    ]
    .into_iter()
    .collect();

    RtmpMessage::command(
        stream_id,
        &[
            AmfValue::from(CMD_ON_STATUS),
            AmfValue::Number(transaction_id),
            AmfValue::Null,
            info,
        ],
    )
}
