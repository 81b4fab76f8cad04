//! User-facing routing client.
//!
//! A `ReplicaSetClient` presents a single connection-like surface over a
//! whole replica set. Addresses are resolved through the shared monitor;
//! the client lazily opens one direct connection per role (primary,
//! secondary), caches them, and replays previously-successful credentials
//! on every fresh connection so failover is invisible to authenticated
//! callers.
//!
//! Routing policy: writes and cursor management go to the primary with a
//! single attempt. Queries that opt into `SECONDARY_OK` try up to two
//! secondaries — a failed attempt rotates to a different one — before
//! falling back to the primary. Retries never duplicate writes.

use crate::monitor::ReplicaSetMonitor;
use crate::registry;
use replset_common::protocol::{Message, SECONDARY_OK};
use replset_common::{AuthInfo, ConnectionRef, Connector, HostAndPort, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Secondary attempts before a slave-ok read falls back to the primary.
const SECONDARY_ATTEMPTS: usize = 2;

/// Routing façade over one replica set.
///
/// Operations issued through one client are serialized in issue order to
/// the backend they select. The client owns its role connections; the
/// monitor it resolves addresses through is shared with every other client
/// of the same set.
///
/// Each role connection is tagged with the address it was opened against.
/// The host is recorded before the connect attempt, so a failed attempt can
/// still be reported against the member that was actually tried.
pub struct ReplicaSetClient {
    monitor: Arc<ReplicaSetMonitor>,
    connector: Arc<dyn Connector>,
    primary_host: Option<HostAndPort>,
    primary: Option<ConnectionRef>,
    secondary_host: Option<HostAndPort>,
    secondary: Option<ConnectionRef>,
    /// Credentials the caller has used successfully, in first-use order.
    auths: Vec<AuthInfo>,
}

impl ReplicaSetClient {
    /// Creates a client for the named set, registering (or joining) its
    /// shared monitor.
    pub async fn new(
        name: &str,
        seeds: &[HostAndPort],
        connector: Arc<dyn Connector>,
    ) -> Self {
        let monitor = registry::get(name, seeds, connector.clone()).await;
        Self {
            monitor,
            connector,
            primary_host: None,
            primary: None,
            secondary_host: None,
            secondary: None,
            auths: Vec::new(),
        }
    }

    /// The monitor this client resolves addresses through.
    pub fn monitor(&self) -> &Arc<ReplicaSetMonitor> {
        &self.monitor
    }

    /// Ensures a usable primary connection and returns it.
    ///
    /// The cache is reused while the monitor still designates its address
    /// and the connection has not failed. Otherwise the monitor is told
    /// about the failure, re-asked for the primary, and a fresh connection
    /// is opened with credentials replayed. The target host is recorded
    /// before the connect attempt; when the attempt fails, `primary_host`
    /// names the member that was tried.
    pub async fn check_master(&mut self) -> Result<ConnectionRef> {
        let addr = self.monitor.get_master().await?;

        if let (Some(host), Some(conn)) = (&self.primary_host, &self.primary) {
            if *host == addr {
                if !conn.is_failed() {
                    return Ok(conn.clone());
                }
                self.monitor.notify_failure(host);
            }
        }

        let host = self.monitor.get_master().await?;
        self.primary_host = Some(host.clone());
        self.primary = None;
        let conn = self.connector.connect(&host, None).await?;
        self.replay_auth(&conn).await;
        self.primary = Some(conn.clone());
        Ok(conn)
    }

    /// Ensures a usable secondary connection and returns it.
    ///
    /// A failed cached connection is reported to the monitor before a new
    /// secondary is requested; the monitor's rotation then lands on a
    /// different member. If the monitor hands back the address already
    /// cached, the cache is returned as-is.
    pub async fn check_slave(&mut self) -> Result<ConnectionRef> {
        if let (Some(host), Some(conn)) = (&self.secondary_host, &self.secondary) {
            if !conn.is_failed() {
                return Ok(conn.clone());
            }
            self.monitor.notify_slave_failure(host);
        }

        let host = self.monitor.get_slave()?;
        if self.secondary_host.as_ref() == Some(&host) {
            if let Some(conn) = &self.secondary {
                return Ok(conn.clone());
            }
        }

        self.secondary_host = Some(host.clone());
        self.secondary = None;
        let conn = self.connector.connect(&host, None).await?;
        self.replay_auth(&conn).await;
        self.secondary = Some(conn.clone());
        Ok(conn)
    }

    /// The checked primary connection.
    pub async fn primary_conn(&mut self) -> Result<ConnectionRef> {
        self.check_master().await
    }

    /// The checked secondary connection.
    pub async fn secondary_conn(&mut self) -> Result<ConnectionRef> {
        self.check_slave().await
    }

    /// Replays every cached credential against a fresh connection. A
    /// credential that fails is logged and skipped; the connection is still
    /// used and the caller may re-authenticate explicitly.
    async fn replay_auth(&self, conn: &ConnectionRef) {
        for auth in &self.auths {
            if let Err(e) = conn
                .auth(&auth.db, &auth.user, &auth.password, auth.digest_password)
                .await
            {
                warn!(
                    "cached auth failed for set: {} db: {} user: {}: {}",
                    self.monitor.name(),
                    auth.db,
                    auth.user,
                    e
                );
            }
        }
    }

    /// Verifies a primary is reachable. On failure the monitor is told
    /// about the host that was attempted and `false` is returned.
    pub async fn connect(&mut self) -> bool {
        match self.check_master().await {
            Ok(_) => true,
            Err(_) => {
                if let Some(host) = &self.primary_host {
                    self.monitor.notify_failure(host);
                }
                false
            }
        }
    }

    /// Authenticates against the primary. Successful credentials are cached
    /// and replayed on every connection the client opens afterwards; failed
    /// ones are not cached.
    pub async fn auth(
        &mut self,
        db: &str,
        user: &str,
        password: &str,
        digest_password: bool,
    ) -> Result<()> {
        let conn = self.check_master().await?;
        conn.auth(db, user, password, digest_password).await?;
        self.auths
            .push(AuthInfo::new(db, user, password, digest_password));
        Ok(())
    }

    pub async fn insert(&mut self, ns: &str, doc: Value) -> Result<()> {
        let conn = self.check_master().await?;
        conn.insert(ns, doc).await
    }

    pub async fn insert_many(&mut self, ns: &str, docs: Vec<Value>) -> Result<()> {
        let conn = self.check_master().await?;
        conn.insert_many(ns, docs).await
    }

    pub async fn update(
        &mut self,
        ns: &str,
        filter: Value,
        doc: Value,
        upsert: bool,
        multi: bool,
    ) -> Result<()> {
        let conn = self.check_master().await?;
        conn.update(ns, filter, doc, upsert, multi).await
    }

    pub async fn remove(&mut self, ns: &str, filter: Value, just_one: bool) -> Result<()> {
        let conn = self.check_master().await?;
        conn.remove(ns, filter, just_one).await
    }

    pub async fn kill_cursor(&mut self, cursor_id: i64) -> Result<()> {
        let conn = self.check_master().await?;
        conn.kill_cursor(cursor_id).await
    }

    /// Runs a query, honoring the `SECONDARY_OK` option bit: two secondary
    /// attempts (rotating on failure), then the primary.
    #[allow(clippy::too_many_arguments)]
    pub async fn query(
        &mut self,
        ns: &str,
        filter: Value,
        n_to_return: i32,
        n_to_skip: i32,
        fields: Option<Value>,
        options: u32,
        batch_size: i32,
    ) -> Result<Vec<Value>> {
        if options & SECONDARY_OK != 0 {
            for _ in 0..SECONDARY_ATTEMPTS {
                match self.try_on_slave(|conn| {
                    let filter = filter.clone();
                    let fields = fields.clone();
                    async move {
                        conn.query(ns, filter, n_to_return, n_to_skip, fields, options, batch_size)
                            .await
                    }
                })
                .await
                {
                    Some(result) => return result,
                    None => continue,
                }
            }
        }

        let conn = self.check_master().await?;
        conn.query(ns, filter, n_to_return, n_to_skip, fields, options, batch_size)
            .await
    }

    /// Finds a single document, with the same secondary routing as `query`.
    pub async fn find_one(
        &mut self,
        ns: &str,
        filter: Value,
        fields: Option<Value>,
        options: u32,
    ) -> Result<Option<Value>> {
        if options & SECONDARY_OK != 0 {
            for _ in 0..SECONDARY_ATTEMPTS {
                match self.try_on_slave(|conn| {
                    let filter = filter.clone();
                    let fields = fields.clone();
                    async move { conn.find_one(ns, filter, fields, options).await }
                })
                .await
                {
                    Some(result) => return result,
                    None => continue,
                }
            }
        }

        let conn = self.check_master().await?;
        conn.find_one(ns, filter, fields, options).await
    }

    /// Forwards a raw wire message. A query carrying the `SECONDARY_OK`
    /// option bit is routed like a slave-ok read; everything else goes to
    /// the primary.
    pub async fn call(&mut self, message: &Message) -> Result<Message> {
        if message.is_secondary_ok_query() {
            for _ in 0..SECONDARY_ATTEMPTS {
                match self
                    .try_on_slave(|conn| async move { conn.call(message).await })
                    .await
                {
                    Some(result) => return result,
                    None => continue,
                }
            }
        }

        let conn = self.check_master().await?;
        conn.call(message).await
    }

    /// Runs one slave-ok attempt. `None` means the attempt failed on a
    /// transport error and the caller should rotate and retry; `Some`
    /// carries a definitive outcome to return as-is.
    async fn try_on_slave<T, F, Fut>(&mut self, op: F) -> Option<Result<T>>
    where
        F: FnOnce(ConnectionRef) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let conn = match self.check_slave().await {
            Ok(conn) => conn,
            Err(e) if e.is_transport() => {
                debug!(
                    "can't reach replica set secondary {}: {}",
                    self.secondary_host_label(),
                    e
                );
                return None;
            }
            // no secondary to be had at all; let the primary fallback run
            Err(_) => return None,
        };

        match op(conn).await {
            Ok(value) => Some(Ok(value)),
            Err(e) if e.is_transport() => {
                debug!(
                    "can't query replica set secondary {}: {}",
                    self.secondary_host_label(),
                    e
                );
                None
            }
            Err(e) => Some(Err(e)),
        }
    }

    fn secondary_host_label(&self) -> String {
        self.secondary_host
            .as_ref()
            .map(|host| host.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    }
}
