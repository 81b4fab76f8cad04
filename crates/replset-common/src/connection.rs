//! Connection interfaces consumed by the monitor and routing client.
//!
//! The single-node connection object — sockets, wire codec, cursors — is an
//! external collaborator. The core drives it through these object-safe
//! traits so that monitors can own probe connections, clients can own role
//! connections, and tests can substitute a scripted in-memory cluster.

use crate::error::Result;
use crate::host::HostAndPort;
use crate::protocol::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// An established connection to one database node.
///
/// Every I/O method may fail with a transport-class error
/// (`ReplSetError::is_transport()`); the caller decides whether to downgrade
/// the node and try elsewhere. Implementations are internally synchronized:
/// a `&self` method may be called from the monitor and a client
/// concurrently, and operations issued from one task are sent in issue
/// order.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Runs the `isMaster` handshake, returning whether the node considers
    /// itself primary together with the raw status document.
    async fn is_master(&self) -> Result<(bool, Value)>;

    /// Runs a database command, returning the reply document. A command the
    /// server rejects is an error; callers that treat command failure as
    /// advisory simply ignore the `Err`.
    async fn run_command(&self, db: &str, command: Value) -> Result<Value>;

    /// Authenticates against `db`. Success means subsequent operations on
    /// this connection run as `user`.
    async fn auth(&self, db: &str, user: &str, password: &str, digest_password: bool)
        -> Result<()>;

    /// Whether the connection has observed a transport failure and must be
    /// replaced before further use.
    fn is_failed(&self) -> bool;

    async fn insert(&self, ns: &str, doc: Value) -> Result<()>;

    async fn insert_many(&self, ns: &str, docs: Vec<Value>) -> Result<()>;

    async fn update(&self, ns: &str, filter: Value, doc: Value, upsert: bool, multi: bool)
        -> Result<()>;

    async fn remove(&self, ns: &str, filter: Value, just_one: bool) -> Result<()>;

    /// Runs a query and returns the matching documents.
    #[allow(clippy::too_many_arguments)]
    async fn query(
        &self,
        ns: &str,
        filter: Value,
        n_to_return: i32,
        n_to_skip: i32,
        fields: Option<Value>,
        options: u32,
        batch_size: i32,
    ) -> Result<Vec<Value>>;

    async fn find_one(
        &self,
        ns: &str,
        filter: Value,
        fields: Option<Value>,
        options: u32,
    ) -> Result<Option<Value>>;

    async fn kill_cursor(&self, cursor_id: i64) -> Result<()>;

    /// Sends a raw wire message and returns the reply.
    async fn call(&self, message: &Message) -> Result<Message>;
}

/// Shared connection handle.
///
/// The monitor copies a handle out of its table before probing so that no
/// lock is held across I/O; the handle stays valid because only table
/// destruction closes the underlying connection.
pub type ConnectionRef = Arc<dyn Connection>;

/// Factory opening connections to individual nodes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to `addr`, waiting at most `timeout` for the
    /// connect to complete when one is given.
    async fn connect(&self, addr: &HostAndPort, timeout: Option<Duration>)
        -> Result<ConnectionRef>;
}
