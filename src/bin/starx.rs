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

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use starx::rpc::ChannelTransport;
use starx::{setup_tracing, AppResult, HandlerService, Node, ServerConfig};
use tokio::runtime;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level when RUST_LOG is unset (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// print the effective configuration and exit
    PrintConfig,
}

const RPC_QUEUE_CAPACITY: usize = 1024;

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("./conf.toml"), PathBuf::from);
    let server_config = ServerConfig::set_up_config(config_path)?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{}", serde_json::to_string_pretty(&server_config)?);
        return Ok(());
    }

    let rt = runtime::Builder::new_multi_thread()
        .worker_threads(server_config.worker_threads())
        .enable_all()
        .build()?;

    let _tracing_guard = rt.block_on(setup_tracing(
        &server_config.tracing,
        commandline.verbose,
    ))?;

    // a standalone node registers no handlers: routes of other server types go
    // to the rpc queue, routes of its own type find no service and are dropped
    let handlers = Arc::new(HandlerService::new(
        server_config.general.server_type.clone(),
    ));
    let (transport, rpc_rx) = ChannelTransport::bounded(RPC_QUEUE_CAPACITY);
    rt.spawn(async move {
        while let Ok(request) = rpc_rx.recv().await {
            warn!(
                "no rpc client attached, drop {} for session {}",
                request.route,
                request.session.id()
            );
        }
    });

    let node = Node::new(server_config, handlers, Arc::new(transport))?;
    node.start(&rt)?;
    info!("bye");
    Ok(())
}
