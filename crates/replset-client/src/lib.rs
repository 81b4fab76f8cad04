//! Replica-set topology monitor and routing client.
//!
//! This crate tracks which member of a named replica set is currently the
//! primary and which secondaries are healthy — without help from any
//! central coordinator — and routes user operations to an appropriate
//! member, transparently recovering from node failure and primary failover.
//!
//! # Architecture
//!
//! - [`node`] - per-set membership directory with health flags and the
//!   primary index
//! - [`monitor`] - per-set singleton performing seed-based discovery,
//!   gossip incorporation and health checks
//! - [`registry`] - process-wide name → monitor map plus the background
//!   watcher task that re-checks every set periodically
//! - [`client`] - the user-facing routing façade with cached role
//!   connections, credential replay and read/write routing policy
//!
//! # Example
//!
//! ```no_run
//! use replset_client::ReplicaSetClient;
//! use replset_common::{Connector, HostAndPort};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(connector: Arc<dyn Connector>) -> replset_common::Result<()> {
//! let seeds: Vec<HostAndPort> = vec!["db1:27017".parse()?, "db2:27017".parse()?];
//! let mut client = ReplicaSetClient::new("rs0", &seeds, connector).await;
//!
//! client.insert("app.events", json!({"kind": "signup"})).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod monitor;
pub mod node;
pub mod registry;

pub use client::ReplicaSetClient;
pub use monitor::{ConfigChangeHook, ReplicaSetMonitor};
pub use node::{Node, NodeTable};
pub use registry::{check_all, shutdown, shutdown_requested, WATCHER_INTERVAL};
