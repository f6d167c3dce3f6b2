//! RTMP protocol constants

/// RTMP version byte carried in C0/S0
pub const RTMP_VERSION: u8 = 3;

pub const RTMP_PORT: u16 = 1935;

/// Size of C1/C2/S1/S2
pub const HANDSHAKE_SIZE: usize = 1536;

/// Chunk payload size both sides start with
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size the server announces after the handshake
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Largest value SetChunkSize may carry (top bit must be zero)
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Hard cap on a single declared message length
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Hard cap on the bytes of all partially assembled messages of a connection
pub const MAX_PENDING_BYTES: usize = 32 * 1024 * 1024;

/// 3-byte timestamp sentinel announcing a 4-byte extended timestamp
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFF_FFFF;

// Chunk stream ids used for outgoing messages
pub const CSID_PROTOCOL_CONTROL: u32 = 2;
pub const CSID_COMMAND: u32 = 3;

// Message type ids
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types
pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

/// SetPeerBandwidth limit type: hard or soft depending on the previous limit
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

/// Window ack size and peer bandwidth the server announces
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 100 * 1024;
pub const DEFAULT_PEER_BANDWIDTH: u32 = 100 * 1024;

// Command names
pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_CLOSE_STREAM: &str = "closeStream";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ON_STATUS: &str = "onStatus";
pub const CMD_ON_BW_DONE: &str = "onBWDone";
pub const CMD_SET_DATA_FRAME: &str = "@setDataFrame";
pub const CMD_ON_METADATA: &str = "onMetaData";

// Status codes
pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";

/// Server version string reported in the connect reply
pub const FMS_VERSION: &str = "FMS/3,0,1,123";
pub const FMS_CAPABILITIES: f64 = 31.0;

/// Schema component of every stream published over RTMP
pub const RTMP_SCHEMA: &str = "RTMP";

/// Vhost used when the publish string does not name one
pub const DEFAULT_VHOST: &str = "__defaultVhost__";

// Chunk header formats
pub const CHUNK_FMT_0: u8 = 0;
pub const CHUNK_FMT_1: u8 = 1;
pub const CHUNK_FMT_2: u8 = 2;
pub const CHUNK_FMT_3: u8 = 3;
