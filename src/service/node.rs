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

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::{runtime, signal};
use tracing::{error, info, trace};

use super::{AppError, AppResult, Server, ServerConfig, ServerContext};
use crate::handler::HandlerService;
use crate::rpc::RemoteTransport;

/// One server process: binds the client port and serves it until shut down.
pub struct Node {
    ctx: Arc<ServerContext>,
}

impl Node {
    /// Handlers must be fully registered before the node starts accepting.
    pub fn new(
        config: ServerConfig,
        handlers: Arc<HandlerService>,
        remote: Arc<dyn RemoteTransport>,
    ) -> AppResult<Self> {
        let ctx = ServerContext::new(config, handlers, remote)?;
        Ok(Node { ctx: Arc::new(ctx) })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Serves on `rt` until Ctrl-C.
    pub fn start(&self, rt: &runtime::Runtime) -> AppResult<()> {
        rt.block_on(async {
            let listener = self.bind().await?;
            self.serve(listener, async {
                if let Err(e) = signal::ctrl_c().await {
                    error!("listen for ctrl-c failed: {}", e);
                }
                info!("get shutdown signal");
            })
            .await
        })
    }

    pub async fn bind(&self) -> AppResult<TcpListener> {
        let listen_address = self.ctx.config().listen_address();
        let listener = TcpListener::bind(&listen_address).await.map_err(|err| {
            let error_msg = format!(
                "Failed to bind server to address: {} - Error: {}",
                listen_address, err
            );
            error!("{}", error_msg);
            AppError::IllegalStateError(error_msg)
        })?;
        info!(
            "{} server {} listening on {}",
            self.ctx.config().general.server_type,
            self.ctx.config().general.server_id,
            &listen_address
        );
        Ok(listener)
    }

    /// Accepts connections on `listener` until `shutdown` completes, then
    /// signals every connection handler and waits for them to finish.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);
        let max_connection = self.ctx.config().network.max_connection;

        let server = Server::new(
            listener,
            Arc::new(Semaphore::new(max_connection)),
            notify_shutdown.clone(),
            shutdown_complete_tx,
            self.ctx.clone(),
        );
        tokio::select! {
            res = server.run() => {
                if let Err(err) = res {
                    error!(cause = %err, "failed to accept");
                }
            }
            _ = shutdown => {}
        }

        // no receiver means no live connection, which is fine
        let _ = notify_shutdown.send(());
        drop(server);
        trace!("waiting for connection handlers to finish...");
        let _ = shutdown_complete_rx.recv().await;
        info!("node shutdown complete");
        Ok(())
    }
}
