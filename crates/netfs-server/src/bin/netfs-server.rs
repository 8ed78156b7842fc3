// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! NetFS server binary
//!
//! Usage: `netfs-server <root> [port]`

use anyhow::Context;
use clap::Parser;
use netfs_logging::CliLoggingArgs;
use netfs_proto::DEFAULT_PORT;
use netfs_server::{DEFAULT_MAX_READ_LEN, NetFsServer, ServerConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "netfs-server")]
#[command(about = "Export a directory read-only over the NetFS protocol")]
#[command(version, long_about = None)]
struct Cli {
    /// Directory to export
    #[arg(env = "NETFS_ROOT")]
    root: PathBuf,

    /// TCP port to listen on
    #[arg(env = "NETFS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Timeout for each socket read or write, in milliseconds
    #[arg(long, default_value_t = 30_000, value_parser = clap::value_parser!(u64).range(1..))]
    io_timeout_ms: u64,

    /// Largest number of bytes returned by one READ
    #[arg(long, default_value_t = DEFAULT_MAX_READ_LEN)]
    max_read_bytes: u64,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            root: self.root.clone(),
            bind_addr: SocketAddr::new(self.bind, self.port),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            max_read_len: self.max_read_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.logging.clone().init("netfs-server")?;

    let config = cli.server_config();
    info!(root = %config.root.display(), addr = %config.bind_addr, "starting NetFS server");

    let server = NetFsServer::bind(config).await.context("failed to start NetFS server")?;
    server.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_root_and_port() {
        let cli = Cli::try_parse_from(["netfs-server", "/srv/data", "9000"]).unwrap();
        let config = cli.server_config();
        assert_eq!(config.root, PathBuf::from("/srv/data"));
        assert_eq!(config.bind_addr.port(), 9000);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.io_timeout, Duration::from_secs(30));
        assert_eq!(config.max_read_len, DEFAULT_MAX_READ_LEN);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "netfs-server",
            "/srv/data",
            "--bind",
            "127.0.0.1",
            "--io-timeout-ms",
            "500",
            "--max-read-bytes",
            "4096",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = cli.server_config();
        assert_eq!(config.bind_addr, "127.0.0.1:4455".parse().unwrap());
        assert_eq!(config.io_timeout, Duration::from_millis(500));
        assert_eq!(config.max_read_len, 4096);
        assert!(cli.logging.log_level.is_some());
    }

    #[test]
    fn rejects_zero_io_timeout() {
        let parsed = Cli::try_parse_from(["netfs-server", "/srv/data", "--io-timeout-ms", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(Cli::try_parse_from(["netfs-server", "/srv/data", "http"]).is_err());
    }
}
