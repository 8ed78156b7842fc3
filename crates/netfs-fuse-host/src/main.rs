// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! NetFS FUSE Host: mounts a remote NetFS export read-only
//!
//! The mount is backed by `netfs-client`; FUSE support is compiled in with
//! the `fuse` feature on Linux.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;
#[cfg_attr(not(all(feature = "fuse", target_os = "linux")), allow(dead_code))]
mod inodes;

#[cfg(all(feature = "fuse", target_os = "linux"))]
use adapter::NetFsFuse;
use anyhow::{Context, Result};
use clap::Parser;
use netfs_client::{ClientConfig, NetFsClient};
use netfs_logging::CliLoggingArgs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "netfs-fuse-host")]
#[command(about = "Mount a NetFS export read-only through FUSE")]
#[command(version, long_about = None)]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Server host name or address
    #[arg(short, long)]
    server: Option<String>,

    /// Server TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Client configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connect timeout in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    connect_timeout_ms: Option<u64>,

    /// Socket read/write timeout in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    io_timeout_ms: Option<u64>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

impl Args {
    /// Command-line values win over the configuration file.
    fn apply_overrides(&self, config: &mut ClientConfig) {
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.io_timeout_ms {
            config.io_timeout_ms = ms;
        }
    }
}

fn load_config(config_path: Option<&Path>) -> Result<ClientConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: ClientConfig = serde_json::from_str(&content)
                .with_context(|| format!("invalid client configuration in {}", path.display()))?;
            Ok(config)
        }
        None => Ok(ClientConfig::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.logging.clone().init("netfs-fuse-host")?;

    info!("Starting NetFS FUSE Host");
    info!("Mount point: {}", args.mount_point.display());

    let mut config = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    info!(
        server = %config.server,
        port = config.port,
        connect_timeout = ?config.connect_timeout(),
        io_timeout = ?config.io_timeout(),
        "Client configuration loaded"
    );
    let client = NetFsClient::new(config);

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        let filesystem = NetFsFuse::new(client);

        let mut mount_options = vec![
            fuser::MountOption::FSName("netfs".to_string()),
            fuser::MountOption::Subtype("netfs".to_string()),
            fuser::MountOption::RO,
            fuser::MountOption::NoDev,
            fuser::MountOption::NoSuid,
        ];
        if args.allow_other {
            mount_options.push(fuser::MountOption::AllowOther);
        }
        if args.auto_unmount {
            mount_options.push(fuser::MountOption::AutoUnmount);
        }

        info!("Mounting filesystem...");
        fuser::mount2(filesystem, &args.mount_point, &mount_options)
            .with_context(|| format!("failed to mount at {}", args.mount_point.display()))?;
        info!("NetFS filesystem unmounted");
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        tracing::warn!("FUSE support not compiled in. This binary is for testing only.");
        info!("To enable FUSE support, compile with: cargo build --features fuse");
        // Probe the server so the configuration can still be exercised.
        match client.get_attr("/") {
            Ok(stat) => info!(kind = ?stat.kind, "server root is reachable"),
            Err(err) => tracing::warn!(error = %err, "server root is not reachable"),
        }
    }

    Ok(())
}
