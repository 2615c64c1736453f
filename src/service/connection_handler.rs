// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{PacketProcessor, ServerContext, Shutdown};
use crate::network::{Connection, Packet};
use crate::session::ConnectionSession;
use crate::{AppError, AppResult};

/// Owns one accepted connection from accept to close.
///
/// The read loop frames packets into a bounded queue; a single processing
/// task consumes it in arrival order, so packets of one connection are never
/// handled concurrently. A full queue blocks the read loop rather than
/// growing. Outbound bytes go through a writer task that owns the write half.
///
/// `shutdown` must be subscribed before the handler task is spawned, otherwise
/// a signal sent in between is never seen.
pub(crate) struct ConnectionHandler {
    pub(crate) ctx: Arc<ServerContext>,
    pub(crate) shutdown: Shutdown,
    pub(crate) _shutdown_complete_tx: mpsc::Sender<()>,
}

impl ConnectionHandler {
    /// Serves the connection until the peer goes away, the liveness check
    /// fails or the server shuts down. Packets queued before teardown are
    /// still processed, nothing is read after it.
    pub(crate) async fn handle_connection<R, W>(
        &mut self,
        reader: R,
        writer: W,
        peer_addr: SocketAddr,
    ) -> AppResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let network = &self.ctx.config().network;
        let (outbound_tx, outbound_rx) = mpsc::channel(network.write_buffer_size);
        let fs = self
            .ctx
            .sessions()
            .create_handler_session(peer_addr, outbound_tx);
        self.ctx.sessions().dump_handler_sessions();

        let terminate = CancellationToken::new();
        let stop_writer = CancellationToken::new();
        let (packet_tx, packet_rx) = mpsc::channel(network.packet_buffer_size);

        let processor = tokio::spawn(process_packets(
            self.ctx.clone(),
            fs.clone(),
            packet_rx,
            terminate.clone(),
        ));
        let writer = tokio::spawn(write_packets(
            BufWriter::new(writer),
            outbound_rx,
            stop_writer.clone(),
            fs.id(),
        ));

        let mut connection = Connection::new(
            reader,
            network.conn_read_buffer_size,
            network.max_package_size,
        );
        let result = self.read_packets(&mut connection, &fs, &packet_tx).await;
        match &result {
            Ok(()) => info!("session {} closed", fs.id()),
            Err(e) => info!("session {} closed({})", fs.id(), e),
        }

        fs.close();
        self.ctx.sessions().close_session(fs.session());
        self.ctx.sessions().dump_handler_sessions();
        drop(packet_tx);
        terminate.cancel();
        if let Err(e) = processor.await {
            error!("session {} processing task failed: {}", fs.id(), e);
        }
        stop_writer.cancel();
        if let Err(e) = writer.await {
            error!("session {} writer task failed: {}", fs.id(), e);
        }
        debug!("end reading session {}", fs.id());
        result
    }

    async fn read_packets<R: AsyncRead + Unpin>(
        &mut self,
        connection: &mut Connection<R>,
        fs: &Arc<ConnectionSession>,
        packet_tx: &mpsc::Sender<Packet>,
    ) -> AppResult<()> {
        let heartbeat = &self.ctx.config().heartbeat;
        let idle_timeout = heartbeat.timeout();
        let mut liveness = time::interval(heartbeat.check_interval());
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let maybe_packet = tokio::select! {
                res = connection.read_packet() => res?,
                _ = self.shutdown.recv() => {
                    debug!("session {} exit read loop after recv shutdown signal", fs.id());
                    return Ok(());
                }
                _ = liveness.tick() => {
                    if let Some(timeout) = idle_timeout {
                        if fs.idle_time() > timeout {
                            warn!("session {} heartbeat timeout", fs.id());
                            return Ok(());
                        }
                    }
                    continue;
                }
            };

            let packet = match maybe_packet {
                Some(packet) => packet,
                // client closed the connection gracefully
                None => return Ok(()),
            };

            // blocks while the processing queue is full
            packet_tx
                .send(packet)
                .await
                .map_err(|e| AppError::ChannelSendError(e.to_string()))?;
        }
    }
}

async fn process_packets(
    ctx: Arc<ServerContext>,
    fs: Arc<ConnectionSession>,
    mut packet_rx: mpsc::Receiver<Packet>,
    terminate: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = terminate.cancelled() => {
                packet_rx.close();
                while let Ok(packet) = packet_rx.try_recv() {
                    PacketProcessor::process_packet(&ctx, &fs, packet);
                }
                break;
            }
            maybe_packet = packet_rx.recv() => match maybe_packet {
                Some(packet) => PacketProcessor::process_packet(&ctx, &fs, packet),
                None => break,
            },
        }
    }
    debug!("session {} processing task exited", fs.id());
}

async fn write_packets<W: AsyncWrite + Unpin>(
    mut writer: BufWriter<W>,
    mut outbound_rx: mpsc::Receiver<Bytes>,
    stop: CancellationToken,
    session_id: u64,
) {
    loop {
        let data = tokio::select! {
            maybe_data = outbound_rx.recv() => match maybe_data {
                Some(data) => data,
                None => break,
            },
            _ = stop.cancelled() => {
                outbound_rx.close();
                while let Ok(data) = outbound_rx.try_recv() {
                    if writer.write_all(&data).await.is_err() {
                        break;
                    }
                }
                let _ = writer.flush().await;
                break;
            }
        };
        if let Err(e) = write_and_flush(&mut writer, &data).await {
            warn!("session {} write failed: {}", session_id, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!("session {} writer task exited", session_id);
}

async fn write_and_flush<W: AsyncWrite + Unpin>(
    writer: &mut BufWriter<W>,
    data: &[u8],
) -> std::io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::duplex;
    use tokio::sync::broadcast;

    use super::*;
    use crate::handler::HandlerService;
    use crate::rpc::ChannelTransport;
    use crate::ServerConfig;

    fn context() -> Arc<ServerContext> {
        let mut config = ServerConfig::default();
        config.general.server_type = "chat".to_string();
        config.heartbeat.timeout = 0;
        let handlers = Arc::new(HandlerService::new("chat"));
        let (transport, _rpc_rx) = ChannelTransport::bounded(1);
        Arc::new(ServerContext::new(config, handlers, Arc::new(transport)).unwrap())
    }

    #[tokio::test]
    async fn test_signal_sent_before_first_poll_is_seen() {
        let ctx = context();
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

        let mut handler = ConnectionHandler {
            ctx: ctx.clone(),
            shutdown: Shutdown::new(notify_shutdown.subscribe()),
            _shutdown_complete_tx: shutdown_complete_tx,
        };
        // the signal goes out after accept but before the handler task runs
        notify_shutdown.send(()).unwrap();

        // the peer stays connected and silent
        let (_client, server) = duplex(64);
        let (reader, writer) = tokio::io::split(server);
        let peer = "127.0.0.1:7000".parse().unwrap();
        let handle = tokio::spawn(async move {
            handler.handle_connection(reader, writer, peer).await
        });

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("handler must observe the shutdown signal")
            .unwrap()
            .unwrap();
        assert_eq!(ctx.sessions().session_count(), 0);
        // every handler dropped its completion sender
        assert!(shutdown_complete_rx.recv().await.is_none());
    }
}
