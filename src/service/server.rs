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

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info_span, Instrument};

use super::connection_handler::ConnectionHandler;
use super::{ServerContext, Shutdown};
use crate::{AppError, AppResult};

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    limit_connections: Arc<Semaphore>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    ctx: Arc<ServerContext>,
}

impl Server {
    pub fn new(
        listener: TcpListener,
        limit_connections: Arc<Semaphore>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        ctx: Arc<ServerContext>,
    ) -> Self {
        Server {
            listener,
            limit_connections,
            notify_shutdown,
            shutdown_complete_tx,
            ctx,
        }
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until accepting fails for good.
    ///
    /// Every connection holds a permit of `limit_connections` for its whole
    /// life and gets its own `ConnectionHandler` task. Handlers keep a clone of
    /// `shutdown_complete_tx`, so the owner of the receiver can wait for all of
    /// them to finish after sending the shutdown signal.
    pub async fn run(&self) -> AppResult<()> {
        loop {
            let permit = self
                .limit_connections
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::IllegalStateError(e.to_string()))?;

            let (socket, peer_addr) = self.accept().await?;
            debug!("accept new connection from {}", peer_addr);
            if let Err(e) = socket.set_nodelay(true) {
                debug!("set_nodelay failed for {}: {}", peer_addr, e);
            }
            let (reader, writer) = socket.into_split();

            let mut handler = ConnectionHandler {
                ctx: self.ctx.clone(),
                shutdown: Shutdown::new(self.notify_shutdown.subscribe()),
                _shutdown_complete_tx: self.shutdown_complete_tx.clone(),
            };

            tokio::spawn(
                async move {
                    if let Err(err) = handler.handle_connection(reader, writer, peer_addr).await {
                        debug!("connection error: {:?}", err);
                    }
                    // whether gracefully or unexpectedly closed, release connection
                    drop(permit);
                }
                .instrument(info_span!("connection", peer = %peer_addr)),
            );
        }
    }

    async fn accept(&self) -> AppResult<(TcpStream, SocketAddr)> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return Ok(accepted),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::DetailedIoError(format!(
                            "accept tcp server error: {}",
                            err
                        )));
                    }
                    error!("accept failed, retry in {}s: {}", backoff, err);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!("tcp server dropped");
    }
}
