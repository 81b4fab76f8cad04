//! Replica-set topology monitor.
//!
//! One monitor tracks one named replica set: which members exist, which are
//! healthy, and which one is currently primary. Discovery is seed-based and
//! cooperative — members gossip about each other through the `hosts`,
//! `passives` and `primary` fields of their `isMaster` replies, and the
//! monitor reconciles health against a `replSetGetStatus` view. No central
//! coordinator is involved.
//!
//! Monitors are shared: every client of the same set name holds a reference
//! to the same monitor (see [`registry`](crate::registry)), so a topology
//! change observed by any caller's check is immediately visible to all of
//! them.
//!
//! # Locking
//!
//! The node table sits behind a `std::sync::Mutex` that is held only to read
//! or write table fields, never across I/O. Probe handles are copied out
//! under the lock, the lock is released, the probe runs, and the lock is
//! re-acquired to apply results. Since the guard is not `Send`, holding it
//! across an `.await` point does not compile.

use crate::node::NodeTable;
use rand::Rng;
use replset_common::{
    ConnectionRef, Connector, HostAndPort, IsMasterReply, ReplSetError, ReplSetStatus, Result,
};
use serde_json::json;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connect timeout for probe connections.
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Rounds a full check scans the membership before giving up.
const CHECK_ROUNDS: usize = 2;
/// Pause between full-check rounds.
const CHECK_ROUND_PAUSE: Duration = Duration::from_secs(1);

/// Process-global callback invoked after any monitor adds members.
pub type ConfigChangeHook = Box<dyn Fn(&ReplicaSetMonitor) + Send + Sync>;

static CONFIG_CHANGE_HOOK: OnceLock<ConfigChangeHook> = OnceLock::new();

/// Monitors one replica set and answers routing questions about it.
pub struct ReplicaSetMonitor {
    name: String,
    connector: Arc<dyn Connector>,
    nodes: Mutex<NodeTable>,
}

impl ReplicaSetMonitor {
    /// Builds a monitor from bootstrap seeds.
    ///
    /// Each seed is probed in order with a 5 s connect timeout; unreachable
    /// seeds are logged and skipped. Seeding stops early once a seed's check
    /// reports it is the primary. Seeds that connected but failed their
    /// check stay in the table and are retried by future checks.
    pub async fn new(
        name: impl Into<String>,
        seeds: &[HostAndPort],
        connector: Arc<dyn Connector>,
    ) -> Self {
        let monitor = Self {
            name: name.into(),
            connector,
            nodes: Mutex::new(NodeTable::new()),
        };

        for seed in seeds {
            let conn = match monitor
                .connector
                .connect(seed, Some(PROBE_CONNECT_TIMEOUT))
                .await
            {
                Ok(conn) => conn,
                Err(e) => {
                    debug!("error connecting to seed {}: {}", seed, e);
                    continue;
                }
            };

            let index = {
                let mut table = monitor.nodes.lock().expect("node table lock poisoned");
                match table.find(seed) {
                    // a previous seed's gossip already brought this one in
                    Some(_) => continue,
                    None => table.add(seed.clone(), Some(conn)),
                }
            };

            let (is_primary, _) = monitor.check_connection(index, false).await;
            if is_primary {
                let mut table = monitor.nodes.lock().expect("node table lock poisoned");
                table.set_primary(Some(index));
                break;
            }
        }

        monitor
    }

    /// The logical set name this monitor tracks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs the process-global configuration-change hook, invoked after
    /// any monitor adds members during a check.
    ///
    /// # Panics
    ///
    /// Panics if a hook has already been set; installing it twice is a
    /// programmer error.
    pub fn set_config_change_hook(hook: ConfigChangeHook) {
        if CONFIG_CHANGE_HOOK.set(hook).is_err() {
            panic!("ConfigChangeHook already specified");
        }
    }

    /// Renders `"<name>/host1:port1,host2:port2,…"` over the current
    /// membership.
    pub fn server_address(&self) -> String {
        let table = self.nodes.lock().expect("node table lock poisoned");
        table.server_address(&self.name)
    }

    /// Address of the current primary, running a full check first when no
    /// healthy primary is designated.
    pub async fn get_master(&self) -> Result<HostAndPort> {
        let needs_check = {
            let table = self.nodes.lock().expect("node table lock poisoned");
            match table.primary() {
                None => true,
                Some(i) => !table.node(i).is_ok(),
            }
        };
        if needs_check {
            self.full_check().await;
        }

        let table = self.nodes.lock().expect("node table lock poisoned");
        table
            .primary_addr()
            .cloned()
            .ok_or_else(|| ReplSetError::NoPrimary {
                set: self.name.clone(),
            })
    }

    /// Address of a healthy non-primary member, rotating from a random
    /// start offset. Falls back to the first known member when nothing
    /// better qualifies; the address is best-effort and a failure on use is
    /// expected to come back through [`notify_slave_failure`].
    ///
    /// [`notify_slave_failure`]: Self::notify_slave_failure
    pub fn get_slave(&self) -> Result<HostAndPort> {
        let table = self.nodes.lock().expect("node table lock poisoned");
        if table.is_empty() {
            return Err(ReplSetError::NoMembers {
                set: self.name.clone(),
            });
        }
        let offset = rand::thread_rng().gen_range(0..table.len());
        table
            .pick_secondary(offset)
            .cloned()
            .ok_or_else(|| ReplSetError::NoMembers {
                set: self.name.clone(),
            })
    }

    /// Tells the monitor the primary at `addr` failed; clears the primary
    /// designation if it still points there.
    pub fn notify_failure(&self, addr: &HostAndPort) {
        let mut table = self.nodes.lock().expect("node table lock poisoned");
        table.clear_primary_if(addr);
    }

    /// Tells the monitor the member at `addr` failed a read; marks it
    /// unhealthy. Unknown addresses are ignored.
    pub fn notify_slave_failure(&self, addr: &HostAndPort) {
        let mut table = self.nodes.lock().expect("node table lock poisoned");
        if let Some(i) = table.find(addr) {
            table.set_health(i, false);
        }
    }

    /// Periodic check entry point used by the background watcher.
    ///
    /// Fast path: when a primary is designated, probe it alone and return if
    /// it still claims primacy. Otherwise run a full check.
    pub async fn check(&self) {
        let primary = {
            let table = self.nodes.lock().expect("node table lock poisoned");
            table.primary()
        };
        if let Some(i) = primary {
            let (still_primary, _) = self.check_connection(i, false).await;
            if still_primary {
                return;
            }
        }
        self.full_check().await;
    }

    /// Scans the membership for a primary: up to two rounds separated by a
    /// one-second pause, with at most one hint-driven out-of-order probe
    /// per invocation.
    async fn full_check(&self) {
        let mut tried_quick_check = false;
        debug!("checking members of {}", self.server_address());

        for round in 0..CHECK_ROUNDS {
            let verbose = round > 0;
            let mut i = 0;
            // membership can grow while the round runs; re-read the length
            // so gossiped nodes are scanned too
            loop {
                let len = {
                    let table = self.nodes.lock().expect("node table lock poisoned");
                    table.len()
                };
                if i >= len {
                    break;
                }

                let (is_primary, maybe_primary) = self.check_connection(i, verbose).await;
                if is_primary {
                    let mut table = self.nodes.lock().expect("node table lock poisoned");
                    table.set_primary(Some(i));
                    return;
                }

                if !tried_quick_check {
                    if let Some(hinted) = Self::parse_hint(maybe_primary.as_deref()) {
                        let target = {
                            let table = self.nodes.lock().expect("node table lock poisoned");
                            table.find(&hinted)
                        };
                        if let Some(x) = target {
                            tried_quick_check = true;
                            let (is_primary, _) = self.check_connection(x, false).await;
                            if is_primary {
                                let mut table =
                                    self.nodes.lock().expect("node table lock poisoned");
                                table.set_primary(Some(x));
                                return;
                            }
                        }
                    }
                }

                i += 1;
            }

            if round + 1 < CHECK_ROUNDS {
                tokio::time::sleep(CHECK_ROUND_PAUSE).await;
            }
        }
    }

    fn parse_hint(hint: Option<&str>) -> Option<HostAndPort> {
        hint.and_then(|raw| raw.parse().ok())
    }

    /// Probes one member: runs the `isMaster` handshake, folds any gossiped
    /// membership into the table, records the member's primary hint, and
    /// reconciles health flags against `replSetGetStatus`.
    ///
    /// Probe failures are logged and reported as "not primary"; they never
    /// escape into the caller. Returns whether the member claims to be
    /// primary, plus its primary hint if it offered one.
    async fn check_connection(&self, index: usize, verbose: bool) -> (bool, Option<String>) {
        let addr = {
            let table = self.nodes.lock().expect("node table lock poisoned");
            table.node(index).addr().clone()
        };
        let conn = match self.probe_conn(index, &addr).await {
            Some(conn) => conn,
            None => return (false, None),
        };

        let mut is_primary = false;
        let mut maybe_primary = None;
        let mut changed = false;

        match conn.is_master().await {
            Ok((primary, doc)) => {
                is_primary = primary;
                if verbose {
                    info!("member check: {} {}", addr, doc);
                } else {
                    debug!("member check: {} {}", addr, doc);
                }

                let reply = IsMasterReply::parse(&doc);
                changed |= self.check_hosts(&reply.hosts).await;
                changed |= self.check_hosts(&reply.passives).await;
                maybe_primary = reply.primary;

                self.check_status(&conn).await;
            }
            Err(e) => {
                if verbose {
                    info!("member check failed: {} {}", addr, e);
                } else {
                    debug!("member check failed: {} {}", addr, e);
                }
            }
        }

        if changed {
            if let Some(hook) = CONFIG_CHANGE_HOOK.get() {
                hook(self);
            }
        }

        (is_primary, maybe_primary)
    }

    /// Copies the probe connection for `index` out of the table, reopening
    /// it first when the node has none or the previous one failed.
    async fn probe_conn(&self, index: usize, addr: &HostAndPort) -> Option<ConnectionRef> {
        let existing = {
            let table = self.nodes.lock().expect("node table lock poisoned");
            table.node(index).conn().filter(|conn| !conn.is_failed())
        };
        if let Some(conn) = existing {
            return Some(conn);
        }

        match self.connector.connect(addr, Some(PROBE_CONNECT_TIMEOUT)).await {
            Ok(conn) => {
                let mut table = self.nodes.lock().expect("node table lock poisoned");
                table.set_conn(index, Some(conn.clone()));
                Some(conn)
            }
            Err(e) => {
                debug!("error reconnecting to member {}: {}", addr, e);
                None
            }
        }
    }

    /// Folds a gossiped `"host:port"` list into the table. Unknown members
    /// are appended even when their probe connect fails — a later check
    /// retries the connect. Returns whether anything was added.
    async fn check_hosts(&self, hosts: &[String]) -> bool {
        let mut changed = false;

        for raw in hosts {
            let addr: HostAndPort = match raw.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!("ignoring malformed member address in gossip: {}", e);
                    continue;
                }
            };

            let known = {
                let table = self.nodes.lock().expect("node table lock poisoned");
                table.find(&addr).is_some()
            };
            if known {
                continue;
            }

            // connect outside the lock; the node is added either way
            let conn = match self
                .connector
                .connect(&addr, Some(PROBE_CONNECT_TIMEOUT))
                .await
            {
                Ok(conn) => Some(conn),
                Err(e) => {
                    debug!("error connecting to discovered member {}: {}", addr, e);
                    None
                }
            };

            let mut table = self.nodes.lock().expect("node table lock poisoned");
            // a concurrent check may have added it while we were connecting
            if table.find(&addr).is_none() {
                table.add(addr, conn);
                info!(
                    "updated set ({}) to: {}",
                    self.name,
                    table.server_address(&self.name)
                );
                changed = true;
            }
        }

        changed
    }

    /// Reconciles per-member health flags against the member's
    /// `replSetGetStatus` view. A reply without a usable `members` array is
    /// ignored.
    async fn check_status(&self, conn: &ConnectionRef) {
        let reply = match conn
            .run_command("admin", json!({ "replSetGetStatus": 1 }))
            .await
        {
            Ok(reply) => reply,
            Err(_) => return,
        };

        let status = ReplSetStatus::parse(&reply);
        if status.members.is_empty() {
            return;
        }

        let mut table = self.nodes.lock().expect("node table lock poisoned");
        for member in &status.members {
            let addr: HostAndPort = match member.name.parse() {
                Ok(addr) => addr,
                Err(_) => continue,
            };
            if let Some(i) = table.find(&addr) {
                table.set_health(i, member.is_healthy());
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_table<T>(&self, f: impl FnOnce(&NodeTable) -> T) -> T {
        let table = self.nodes.lock().expect("node table lock poisoned");
        f(&table)
    }
}
