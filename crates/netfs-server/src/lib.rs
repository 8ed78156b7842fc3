// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! NetFS Server: exports one directory read-only over TCP
//!
//! [`NetFsServer`] accepts connections on a tokio `TcpListener` and gives
//! each one its own task. A task reads a single request frame, hands it to
//! the [`RequestHandler`] on the blocking pool, writes a single response
//! frame and closes the connection.
//!
//! # Example
//!
//! ```no_run
//! use netfs_server::{NetFsServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("/srv/data", "0.0.0.0:4455".parse()?);
//!     let server = NetFsServer::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod root;
pub mod server;
mod transfer;

pub use handler::{DEFAULT_MAX_READ_LEN, FileRange, Reply, RequestHandler, clamp_read};
pub use root::{PathError, ServedRoot, status_for_io};
pub use server::{DEFAULT_IO_TIMEOUT, NetFsServer, ServerConfig, ServerError};
