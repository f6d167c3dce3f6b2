//! Per-connection command processing
//!
//! Interprets commands, metadata and media messages of one publishing
//! connection and drives the registry. All replies are collected into an
//! output list so the caller decides when to write them; a failed operation
//! may still leave replies (such as `NetStream.Publish.BadName`) that must be
//! sent before the connection closes.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::amf::Amf0Decoder;
use crate::error::{Error, ProtocolError, RegistryError, Result};
use crate::media::StreamMetadata;
use crate::protocol::command::{self, Command, ConnectParams};
use crate::protocol::constants::*;
use crate::protocol::message::RtmpMessage;
use crate::registry::{MediaKey, MediaSource, Ownership, Registry, StreamPath};
use crate::server::config::ServerConfig;
use crate::session::state::{SessionPhase, SessionState};

struct Publishing {
    // dropped before `source` so the flag is cleared while the source is alive
    ownership: Ownership,
    source: Arc<MediaSource>,
    stream_id: u32,
}

pub struct CommandProcessor {
    state: SessionState,
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    decoder: Amf0Decoder,
    publishing: Option<Publishing>,
}

impl CommandProcessor {
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        config: Arc<ServerConfig>,
        registry: Arc<Registry>,
    ) -> Self {
        let decoder = Amf0Decoder::with_lenient(config.lenient_amf);
        Self {
            state: SessionState::new(session_id, peer_addr),
            config,
            registry,
            decoder,
            publishing: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// Key of the stream this connection publishes, if any
    pub fn publishing_key(&self) -> Option<&MediaKey> {
        self.publishing.as_ref().map(|p| p.source.key())
    }

    pub fn source(&self) -> Option<&Arc<MediaSource>> {
        self.publishing.as_ref().map(|p| &p.source)
    }

    /// Handle one non-control message, appending replies to `out`
    pub fn handle(&mut self, msg: &RtmpMessage, out: &mut Vec<RtmpMessage>) -> Result<()> {
        match msg.type_id {
            MSG_COMMAND_AMF0 => self.on_command(msg, out),
            MSG_DATA_AMF0 => self.on_data(msg),
            MSG_AUDIO | MSG_VIDEO => self.on_media(msg),
            MSG_COMMAND_AMF3 | MSG_DATA_AMF3 => Err(ProtocolError::Amf3Unsupported.into()),
            other => {
                tracing::debug!(
                    session_id = self.state.id,
                    type_id = other,
                    "Ignoring message"
                );
                Ok(())
            }
        }
    }

    fn on_command(&mut self, msg: &RtmpMessage, out: &mut Vec<RtmpMessage>) -> Result<()> {
        let cmd = Command::parse(&msg.payload, &mut self.decoder)?;
        tracing::debug!(session_id = self.state.id, command = cmd.name(), "Command");

        match cmd {
            Command::Connect {
                transaction_id,
                params,
            } => self.on_connect(transaction_id, params, out),
            Command::CreateStream { transaction_id } => {
                if !self.state.is_connected() {
                    return Err(Error::ConnectRequired(CMD_CREATE_STREAM));
                }
                let stream_id = self.state.allocate_stream_id();
                out.push(command::create_stream_result(transaction_id, stream_id));
                Ok(())
            }
            Command::Publish {
                transaction_id,
                path,
                ..
            } => self.on_publish(msg.stream_id, transaction_id, &path, out),
            Command::FcUnpublish { .. } | Command::CloseStream { .. } => {
                self.stop_publishing(true);
                Ok(())
            }
            Command::DeleteStream { stream_id, .. } => {
                self.state.remove_stream(stream_id);
                self.stop_publishing(true);
                Ok(())
            }
            Command::ReleaseStream { .. } | Command::FcPublish { .. } => Ok(()),
            Command::Other { name, .. } => {
                tracing::debug!(session_id = self.state.id, command = %name, "Unhandled command");
                Ok(())
            }
        }
    }

    fn on_connect(
        &mut self,
        transaction_id: f64,
        params: ConnectParams,
        out: &mut Vec<RtmpMessage>,
    ) -> Result<()> {
        if params.app.is_empty() {
            return Err(RegistryError::InvalidKey("app").into());
        }
        tracing::info!(
            session_id = self.state.id,
            app = %params.app,
            tc_url = params.tc_url.as_deref().unwrap_or_default(),
            "Connect"
        );
        self.state.on_connect(params);
        out.extend(command::connect_result(transaction_id));
        Ok(())
    }

    fn on_publish(
        &mut self,
        stream_id: u32,
        transaction_id: f64,
        path: &str,
        out: &mut Vec<RtmpMessage>,
    ) -> Result<()> {
        let Some(app) = self.state.app().map(str::to_string) else {
            return Err(Error::ConnectRequired(CMD_PUBLISH));
        };

        // a second publish on this connection gives up the first stream
        self.stop_publishing(true);

        match self.start_publishing(&app, path, stream_id) {
            Ok(()) => {
                out.push(command::publish_status(stream_id, transaction_id, Ok(())));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = self.state.id, path, error = %e, "Publish rejected");
                let reason = e.to_string();
                out.push(command::publish_status(stream_id, transaction_id, Err(&reason)));
                Err(e)
            }
        }
    }

    fn start_publishing(&mut self, app: &str, path: &str, stream_id: u32) -> Result<()> {
        let path = StreamPath::parse(path);
        let vhost = if path.vhost.is_empty() {
            self.config.default_vhost.as_str()
        } else {
            path.vhost.as_str()
        };
        let key = MediaKey::new(RTMP_SCHEMA, vhost, app, path.stream.as_str())?;

        let (existing, existed) = self.registry.find(&key);
        let (source, ownership) = match existing {
            Some(source) => {
                tracing::info!(stream = %key, "Source exists, reconnecting");
                let ownership = source
                    .get_ownership()
                    .ok_or_else(|| RegistryError::AlreadyPublishing(key.clone()))?;
                // a publisher tearing down may have unregistered it already
                self.registry.register(&source)?;
                (source, ownership)
            }
            None => {
                if existed {
                    tracing::warn!(stream = %key, "Registry entry outlived its source");
                }
                let source = Arc::new(MediaSource::new(key.clone(), self.config.packet_cache_size));
                let ownership = source
                    .get_ownership()
                    .ok_or_else(|| RegistryError::AlreadyPublishing(key.clone()))?;
                self.registry.register(&source)?;
                (source, ownership)
            }
        };

        tracing::info!(
            session_id = self.state.id,
            stream = %key,
            token = !path.token.is_empty(),
            "Publishing"
        );
        self.publishing = Some(Publishing {
            ownership,
            source,
            stream_id,
        });
        self.state.on_publish();
        Ok(())
    }

    fn on_data(&mut self, msg: &RtmpMessage) -> Result<()> {
        let Some(map) = command::parse_metadata(&msg.payload, &mut self.decoder)? else {
            tracing::debug!(session_id = self.state.id, "Ignoring data message");
            return Ok(());
        };
        let Some(publishing) = &self.publishing else {
            return Err(Error::PublishRequired("metadata"));
        };
        let metadata = StreamMetadata::from_amf(&map)?;
        publishing.source.set_metadata(metadata)
    }

    fn on_media(&mut self, msg: &RtmpMessage) -> Result<()> {
        let Some(publishing) = &self.publishing else {
            let kind = if msg.type_id == MSG_AUDIO { "audio" } else { "video" };
            return Err(Error::PublishRequired(kind));
        };
        publishing.source.input_packet(msg)
    }

    /// Unregister the source and detach its readers, then release ownership.
    ///
    /// Ownership goes last: a publisher that claims the source in between
    /// re-registers it, so the key never maps to a source nobody feeds.
    /// No-op when not publishing.
    pub fn stop_publishing(&mut self, is_normal: bool) {
        let Some(Publishing {
            ownership,
            source,
            stream_id,
        }) = self.publishing.take()
        else {
            return;
        };

        self.registry.unregister(&source);
        source.dispatcher().detach_all(is_normal);
        ownership.release();
        self.state.on_unpublish();

        tracing::info!(
            session_id = self.state.id,
            stream = %source.key(),
            stream_id,
            is_normal,
            "Unpublished"
        );
    }

    /// Connection teardown
    pub fn close(&mut self, is_normal: bool) {
        self.stop_publishing(is_normal);
        if self.state.phase != SessionPhase::Closed {
            self.state.close();
        }
    }
}

impl Drop for CommandProcessor {
    fn drop(&mut self) {
        self.stop_publishing(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::{amf0, AmfValue};
    use crate::error::ErrorCategory;
    use bytes::Bytes;

    fn processor(registry: &Arc<Registry>) -> CommandProcessor {
        let mut processor = CommandProcessor::new(
            1,
            "127.0.0.1:50000".parse().unwrap(),
            Arc::new(ServerConfig::default()),
            Arc::clone(registry),
        );
        processor.state_mut().complete_handshake();
        processor
    }

    fn command(stream_id: u32, values: &[AmfValue]) -> RtmpMessage {
        RtmpMessage::new(3, MSG_COMMAND_AMF0, stream_id, 0, amf0::encode_all(values))
    }

    fn connect(app: &str) -> RtmpMessage {
        let obj: AmfValue = [("app", app), ("tcUrl", "rtmp://localhost/live")]
            .into_iter()
            .collect();
        command(0, &["connect".into(), 1.0.into(), obj])
    }

    fn publish(path: &str) -> RtmpMessage {
        command(1, &["publish".into(), 5.0.into(), AmfValue::Null, path.into(), "live".into()])
    }

    fn status_code(msg: &RtmpMessage) -> String {
        let values = amf0::decode_all(&msg.payload).unwrap();
        values[3].get_string("code").unwrap_or_default().to_string()
    }

    fn publish_ready(registry: &Arc<Registry>, path: &str) -> (CommandProcessor, Vec<RtmpMessage>) {
        let mut p = processor(registry);
        let mut out = Vec::new();
        p.handle(&connect("live"), &mut out).unwrap();
        p.handle(&command(0, &["createStream".into(), 2.0.into(), AmfValue::Null]), &mut out)
            .unwrap();
        out.clear();
        p.handle(&publish(path), &mut out).unwrap();
        (p, out)
    }

    #[test]
    fn test_connect_replies() {
        let registry = Arc::new(Registry::new());
        let mut p = processor(&registry);
        let mut out = Vec::new();

        p.handle(&connect("live"), &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(p.state().phase, SessionPhase::Connected);
        assert_eq!(p.state().app(), Some("live"));
    }

    #[test]
    fn test_create_stream_allocates_ids() {
        let registry = Arc::new(Registry::new());
        let mut p = processor(&registry);
        let mut out = Vec::new();
        p.handle(&connect("live"), &mut out).unwrap();
        out.clear();

        let create = command(0, &["createStream".into(), 2.0.into(), AmfValue::Null]);
        p.handle(&create, &mut out).unwrap();
        p.handle(&create, &mut out).unwrap();

        let ids: Vec<f64> = out
            .iter()
            .map(|m| amf0::decode_all(&m.payload).unwrap()[3].as_number().unwrap())
            .collect();
        assert_eq!(ids, vec![1.0, 2.0]);
    }

    #[test]
    fn test_publish_creates_and_registers_source() {
        let registry = Arc::new(Registry::new());
        let (p, out) = publish_ready(&registry, "mystream?vhost=a.com&token=xyz");

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stream_id, 1);
        assert_eq!(status_code(&out[0]), "NetStream.Publish.Start");
        assert_eq!(p.state().phase, SessionPhase::Publishing);

        let key = MediaKey::new("RTMP", "a.com", "live", "mystream").unwrap();
        assert_eq!(p.publishing_key(), Some(&key));
        let (source, existed) = registry.find(&key);
        assert!(existed);
        let source = source.unwrap();
        assert!(source.is_owned());
        assert!(source.is_registered());
    }

    #[test]
    fn test_publish_without_vhost_uses_default() {
        let registry = Arc::new(Registry::new());
        let (p, _) = publish_ready(&registry, "cam");
        assert_eq!(p.publishing_key().unwrap().vhost, "__defaultVhost__");
    }

    #[test]
    fn test_second_publisher_gets_bad_name() {
        let registry = Arc::new(Registry::new());
        let (_first, _) = publish_ready(&registry, "mystream");

        let mut second = processor(&registry);
        let mut out = Vec::new();
        second.handle(&connect("live"), &mut out).unwrap();
        out.clear();

        let err = second.handle(&publish("mystream"), &mut out).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert_eq!(out.len(), 1);
        assert_eq!(status_code(&out[0]), "NetStream.Publish.BadName");
    }

    #[test]
    fn test_reconnect_after_unpublish() {
        let registry = Arc::new(Registry::new());
        let (mut first, _) = publish_ready(&registry, "mystream");
        first.handle(&command(1, &["FCUnpublish".into(), 6.0.into(), AmfValue::Null, "mystream".into()]), &mut Vec::new())
            .unwrap();
        assert!(first.publishing_key().is_none());
        assert_eq!(first.state().phase, SessionPhase::Connected);
        assert!(registry.is_empty());

        let (second, out) = publish_ready(&registry, "mystream");
        assert_eq!(status_code(&out[0]), "NetStream.Publish.Start");
        assert!(second.source().is_some());
    }

    #[test]
    fn test_takeover_of_unowned_live_source() {
        let registry = Arc::new(Registry::new());
        let key = MediaKey::new("RTMP", "__defaultVhost__", "live", "mystream").unwrap();
        let orphan = Arc::new(MediaSource::new(key, 32));
        registry.register(&orphan).unwrap();

        let (p, out) = publish_ready(&registry, "mystream");
        assert_eq!(status_code(&out[0]), "NetStream.Publish.Start");
        assert!(Arc::ptr_eq(p.source().unwrap(), &orphan));
        assert!(orphan.is_owned());
        assert!(orphan.is_registered());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_publish_while_previous_publisher_tears_down() {
        let registry = Arc::new(Registry::new());
        let (mut first, _) = publish_ready(&registry, "mystream");
        let old = first.publishing.take().unwrap();

        // first half of stop_publishing: gone from the registry, still owned
        registry.unregister(&old.source);
        old.source.dispatcher().detach_all(true);
        assert!(old.source.is_owned());

        let (second, out) = publish_ready(&registry, "mystream");
        assert_eq!(status_code(&out[0]), "NetStream.Publish.Start");
        let current = Arc::clone(second.source().unwrap());
        assert!(!Arc::ptr_eq(&current, &old.source));

        let old_source = Arc::clone(&old.source);
        drop(old);
        assert!(!old_source.is_owned());

        let key = MediaKey::new("RTMP", "__defaultVhost__", "live", "mystream").unwrap();
        let (found, existed) = registry.find(&key);
        assert!(existed);
        assert!(Arc::ptr_eq(&found.unwrap(), &current));
        assert!(current.is_owned());
        assert!(current.is_registered());
    }

    #[test]
    fn test_publish_before_connect() {
        let registry = Arc::new(Registry::new());
        let mut p = processor(&registry);
        let err = p.handle(&publish("s"), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::ConnectRequired("publish")));
        assert_eq!(err.category(), ErrorCategory::Contract);
    }

    #[test]
    fn test_media_before_publish() {
        let registry = Arc::new(Registry::new());
        let mut p = processor(&registry);
        let msg = RtmpMessage::new(6, MSG_VIDEO, 1, 0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]));
        let err = p.handle(&msg, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::PublishRequired("video")));
    }

    #[test]
    fn test_metadata_initializes_tracks() {
        let registry = Arc::new(Registry::new());
        let (mut p, _) = publish_ready(&registry, "mystream");

        let meta: AmfValue = [
            ("duration", AmfValue::Number(0.0)),
            ("videocodecid", AmfValue::Number(7.0)),
            ("videodatarate", AmfValue::Number(2500.0)),
            ("audiocodecid", AmfValue::Number(10.0)),
            ("stereo", AmfValue::Boolean(true)),
        ]
        .into_iter()
        .collect();
        let data = RtmpMessage::new(
            4,
            MSG_DATA_AMF0,
            1,
            0,
            amf0::encode_all(&["@setDataFrame".into(), "onMetaData".into(), meta]),
        );
        p.handle(&data, &mut Vec::new()).unwrap();

        let metadata = p.source().unwrap().metadata().unwrap();
        assert_eq!(metadata.video_codec_id, 7);
        assert!(metadata.stereo);
    }

    #[test]
    fn test_unsupported_codec_in_metadata() {
        let registry = Arc::new(Registry::new());
        let (mut p, _) = publish_ready(&registry, "mystream");
        let meta: AmfValue = [("videocodecid", 2.0)].into_iter().collect();
        let data = RtmpMessage::new(4, MSG_DATA_AMF0, 1, 0, amf0::encode_all(&["onMetaData".into(), meta]));
        assert!(p.handle(&data, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_amf3_command_rejected() {
        let registry = Arc::new(Registry::new());
        let mut p = processor(&registry);
        let msg = RtmpMessage::new(3, MSG_COMMAND_AMF3, 0, 0, Bytes::from_static(&[0x00]));
        let err = p.handle(&msg, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Amf3Unsupported)));
    }

    #[test]
    fn test_drop_tears_down_publisher() {
        let registry = Arc::new(Registry::new());
        let (p, _) = publish_ready(&registry, "mystream");
        let source = Arc::clone(p.source().unwrap());
        let transport = Arc::new(());
        let sub = source.subscribe(&transport, 8);

        drop(p);
        assert!(!source.is_owned());
        assert!(!source.is_registered());
        assert!(registry.is_empty());
        assert_eq!(sub.detach_reason(), Some(false));
    }
}
