//! Shared types for the replset client.
//!
//! This crate provides everything the monitor and routing layers have in
//! common: the error type, the host-address value type, cached-credential
//! records, permissive parsers for the status documents replica-set members
//! return, and the narrow connection interfaces the core drives its external
//! collaborators through.
//!
//! # Components
//!
//! - [`error`] - `ReplSetError` and the crate-wide `Result` alias
//! - [`host`] - the `"host:port"` address value type
//! - [`auth`] - credentials cached for replay after failover
//! - [`protocol`] - status-document views and the wire-message header view
//! - [`connection`] - the `Connection`/`Connector` traits
//!
//! # Example
//!
//! ```
//! use replset_common::{HostAndPort, IsMasterReply};
//! use serde_json::json;
//!
//! let addr: HostAndPort = "db1:27017".parse().unwrap();
//! assert_eq!(addr.port(), 27017);
//!
//! let reply = IsMasterReply::parse(&json!({
//!     "ismaster": true,
//!     "hosts": ["db1:27017", "db2:27017"],
//! }));
//! assert_eq!(reply.hosts.len(), 2);
//! ```

pub mod auth;
pub mod connection;
pub mod error;
pub mod host;
pub mod protocol;

pub use auth::AuthInfo;
pub use connection::{Connection, ConnectionRef, Connector};
pub use error::{ReplSetError, Result};
pub use host::HostAndPort;
pub use protocol::{IsMasterReply, Message, MemberStatus, OpCode, ReplSetStatus, SECONDARY_OK};
