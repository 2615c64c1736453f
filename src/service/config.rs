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

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    /// unique id of this node inside the cluster
    pub server_id: String,
    /// category of this node, routes whose first segment equals it are handled locally
    pub server_type: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            server_id: "connector-1".to_string(),
            server_type: "connector".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: usize,
    /// largest packet body accepted from a client, in bytes
    pub max_package_size: usize,
    /// initial capacity of the per-connection read buffer
    pub conn_read_buffer_size: usize,
    /// capacity of the per-connection packet queue, a full queue blocks the reader
    pub packet_buffer_size: usize,
    /// capacity of the per-connection outbound queue
    pub write_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "127.0.0.1".to_string(),
            port: 3250,
            max_connection: 10_000,
            max_package_size: 1024 * 1024,
            conn_read_buffer_size: 4 * 1024,
            packet_buffer_size: 256,
            write_buffer_size: 256,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// heartbeat interval advertised to clients in the handshake reply, seconds
    pub interval: u64,
    /// a connection silent for longer than this is closed, seconds, 0 disables the check
    pub timeout: u64,
    /// how often liveness is checked, seconds
    pub check_interval: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            interval: 30,
            timeout: 90,
            check_interval: 10,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.max(1))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TracingConfig {
    pub log_dir: String,
    pub log_file: String,
    /// export spans to an OTLP collector configured through the OTEL_* env vars
    pub otlp_enabled: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig {
            log_dir: "logs".to_string(),
            log_file: "starx.log".to_string(),
            otlp_enabled: false,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
    pub heartbeat: HeartbeatConfig,
    pub tracing: TracingConfig,
    /// tokio worker threads, 0 means one per cpu
    pub worker_threads: usize,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(config::Environment::with_prefix("STARX").separator("__"))
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;
        Ok(server_config)
    }

    pub fn worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.ip, self.network.port)
    }

    fn validate(&self) -> AppResult<()> {
        if self.general.server_type.is_empty() {
            return Err(AppError::InvalidValue(
                "general.server_type must not be empty".to_string(),
            ));
        }
        if self.network.packet_buffer_size == 0 || self.network.write_buffer_size == 0 {
            return Err(AppError::InvalidValue(
                "network queue sizes must be greater than 0".to_string(),
            ));
        }
        if self.network.max_package_size > crate::network::MAX_BODY_LENGTH {
            return Err(AppError::InvalidValue(format!(
                "network.max_package_size {} exceeds the wire limit {}",
                self.network.max_package_size,
                crate::network::MAX_BODY_LENGTH
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_partial_config_file() -> AppResult<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[general]
server_id = "chat-3"
server_type = "chat"

[network]
port = 4000
packet_buffer_size = 16
"#
        )?;
        let config = ServerConfig::set_up_config(file.path())?;
        assert_eq!(config.general.server_type, "chat");
        assert_eq!(config.network.port, 4000);
        assert_eq!(config.network.packet_buffer_size, 16);
        // untouched sections keep their defaults
        assert_eq!(config.network.write_buffer_size, 256);
        assert_eq!(config.heartbeat.interval, 30);
        Ok(())
    }

    #[test]
    fn test_reject_zero_queue() -> AppResult<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[network]\npacket_buffer_size = 0")?;
        let result = ServerConfig::set_up_config(file.path());
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
        Ok(())
    }

    #[test]
    fn test_heartbeat_timeout_disabled() {
        let heartbeat = HeartbeatConfig {
            timeout: 0,
            ..Default::default()
        };
        assert!(heartbeat.timeout().is_none());
        assert_eq!(heartbeat.interval(), Duration::from_secs(30));
    }
}
