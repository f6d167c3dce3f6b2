//! Per-connection RTMP handler
//!
//! Manages the lifecycle of a single publishing connection:
//! 1. Handshake
//! 2. Protocol control setup
//! 3. Command, metadata and media messages
//! 4. Teardown of whatever the connection published

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::time::timeout;

use crate::error::{Error, ErrorCategory, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder};
use crate::protocol::constants::*;
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{ControlMessage, RtmpMessage};
use crate::registry::Registry;
use crate::server::config::ServerConfig;
use crate::session::CommandProcessor;

const READ_BUFFER_SIZE: usize = 64 * 1024;
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

pub struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,

    read_buf: BytesMut,
    write_buf: BytesMut,

    chunk_decoder: ChunkDecoder,
    chunk_encoder: ChunkEncoder,

    processor: CommandProcessor,

    config: Arc<ServerConfig>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        session_id: u64,
        socket: S,
        peer_addr: SocketAddr,
        config: Arc<ServerConfig>,
        registry: Arc<Registry>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(socket);

        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, read_half),
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, write_half),
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(WRITE_BUFFER_SIZE),
            chunk_decoder: ChunkDecoder::with_limits(
                config.max_message_size,
                config.max_pending_bytes,
            ),
            chunk_encoder: ChunkEncoder::new(),
            processor: CommandProcessor::new(
                session_id,
                peer_addr,
                Arc::clone(&config),
                registry,
            ),
            config,
        }
    }

    pub fn processor(&self) -> &CommandProcessor {
        &self.processor
    }

    /// Serve the connection until the peer leaves or an error occurs.
    ///
    /// Any published stream is torn down before returning.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;
        let session_id = self.processor.state().id;

        match &result {
            Ok(()) => {
                tracing::debug!(session_id, "Peer closed connection");
            }
            Err(e) => match e.category() {
                ErrorCategory::Transport => {
                    tracing::debug!(session_id, error = %e, "Connection dropped");
                }
                category => {
                    tracing::error!(session_id, ?category, error = %e, "Closing connection");
                }
            },
        }

        self.processor.close(result.is_ok());
        tracing::info!(
            session_id,
            duration_ms = self.processor.state().duration().as_millis() as u64,
            bytes_received = self.chunk_decoder.bytes_received(),
            "Connection closed"
        );
        result
    }

    async fn serve(&mut self) -> Result<()> {
        self.do_handshake().await?;
        self.send_initial_control().await?;

        let idle_timeout = self.config.idle_timeout;
        loop {
            match timeout(idle_timeout, self.read_and_process()).await {
                Ok(Ok(true)) => continue,
                Ok(Ok(false)) => return Ok(()),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(Error::Timeout),
            }
        }
    }

    async fn do_handshake(&mut self) -> Result<()> {
        let mut handshake = Handshake::new();

        timeout(self.config.handshake_timeout, async {
            while !handshake.is_done() {
                if self.read_buf.len() < handshake.bytes_needed() {
                    let n = self.reader.read_buf(&mut self.read_buf).await?;
                    if n == 0 {
                        return Err(Error::ConnectionClosed);
                    }
                    continue;
                }

                if let Some(response) = handshake.process(&mut self.read_buf)? {
                    self.writer.write_all(&response).await?;
                    self.writer.flush().await?;
                }
            }
            Ok::<_, Error>(())
        })
        .await
        .map_err(|_| Error::Timeout)??;

        self.processor.state_mut().complete_handshake();
        tracing::debug!(session_id = self.processor.state().id, "Handshake complete");
        Ok(())
    }

    async fn send_initial_control(&mut self) -> Result<()> {
        let chunk_size = self.config.chunk_size;
        self.queue(ControlMessage::SetChunkSize(chunk_size).into_message());
        self.chunk_encoder.set_chunk_size(chunk_size);
        self.processor.state_mut().out_chunk_size = chunk_size;

        self.queue(ControlMessage::WindowAckSize(self.config.window_ack_size).into_message());
        self.queue(
            ControlMessage::SetPeerBandwidth {
                size: self.config.peer_bandwidth,
                limit: BANDWIDTH_LIMIT_DYNAMIC,
            }
            .into_message(),
        );
        self.flush().await
    }

    /// Returns `false` once the peer has closed its side
    async fn read_and_process(&mut self) -> Result<bool> {
        // data that arrived with the handshake or a previous read
        if self.process_buffered().await? {
            return Ok(true);
        }

        let n = self.reader.read_buf(&mut self.read_buf).await?;
        if n == 0 {
            return Ok(false);
        }

        self.process_buffered().await?;
        Ok(true)
    }

    async fn process_buffered(&mut self) -> Result<bool> {
        let mut processed = false;
        while let Some(msg) = self.chunk_decoder.decode(&mut self.read_buf)? {
            processed = true;
            let result = self.handle_message(msg);
            // replies explaining a failure still go out
            self.flush().await?;
            result?;
        }

        if let Some(sequence) = self.chunk_decoder.take_ack() {
            self.queue(ControlMessage::Acknowledgement(sequence).into_message());
            self.flush().await?;
        }
        Ok(processed)
    }

    fn handle_message(&mut self, msg: RtmpMessage) -> Result<()> {
        if let Some(control) = ControlMessage::parse(msg.type_id, &msg.payload)? {
            return self.handle_control(control);
        }

        let mut replies = Vec::new();
        let result = self.processor.handle(&msg, &mut replies);
        for reply in &replies {
            self.queue_ref(reply);
        }
        result
    }

    fn handle_control(&mut self, control: ControlMessage) -> Result<()> {
        let session_id = self.processor.state().id;
        match control {
            ControlMessage::SetChunkSize(size) => {
                self.chunk_decoder.set_chunk_size(size)?;
                self.processor.state_mut().in_chunk_size = size;
                tracing::debug!(session_id, size, "Peer chunk size");
            }
            ControlMessage::Abort(csid) => {
                self.chunk_decoder.abort(csid);
            }
            ControlMessage::WindowAckSize(size) => {
                self.chunk_decoder.set_window_ack_size(size);
                self.processor.state_mut().window_ack_size = size;
                tracing::debug!(session_id, size, "Peer window acknowledgement size");
            }
            ControlMessage::UserControl { event, data } if event == UC_PING_REQUEST => {
                self.queue(
                    ControlMessage::UserControl {
                        event: UC_PING_RESPONSE,
                        data,
                    }
                    .into_message(),
                );
            }
            other => {
                tracing::trace!(session_id, message = ?other, "Ignoring control message");
            }
        }
        Ok(())
    }

    fn queue(&mut self, msg: RtmpMessage) {
        self.queue_ref(&msg);
    }

    fn queue_ref(&mut self, msg: &RtmpMessage) {
        self.chunk_encoder.encode(msg, &mut self.write_buf);
    }

    async fn flush(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let out = self.write_buf.split().freeze();
        self.writer.write_all(&out).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
