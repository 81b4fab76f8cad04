//! Scripted in-memory cluster used by the integration tests.
//!
//! Each member's behavior is configured up front and can be changed while a
//! test runs (taking a primary down, promoting another member, making reads
//! fail). Connections hand out the member's scripted `isMaster` view and
//! record every operation so tests can assert where traffic landed.

use async_trait::async_trait;
use replset_common::protocol::Message;
use replset_common::{
    Connection, ConnectionRef, Connector, HostAndPort, ReplSetError, Result,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MemberState {
    /// Member answers `isMaster` with `ismaster: true`.
    pub primary: bool,
    /// Gossiped electable membership.
    pub hosts: Vec<String>,
    /// Gossiped passive membership.
    pub passives: Vec<String>,
    /// Gossiped primary hint.
    pub primary_hint: Option<String>,
    /// Scripted `replSetGetStatus` reply, if the member serves one.
    pub status: Option<Value>,
    /// Hard-down: connects fail and existing connections report failed.
    pub down: bool,
    /// Soft failure: connects succeed but operations throw and poison the
    /// connection they ran on.
    pub fail_ops: bool,
    /// Authentication attempts are rejected.
    pub auth_fails: bool,
    /// Documents returned by queries.
    pub docs: Vec<Value>,

    // recorded traffic
    pub auth_log: Vec<(String, String)>,
    pub inserts: Vec<(String, Value)>,
    pub queries: Vec<String>,
    pub updates: Vec<String>,
    pub removes: Vec<String>,
    pub calls: usize,
}

#[derive(Default)]
struct ClusterState {
    members: HashMap<HostAndPort, MemberState>,
    /// Order in which members answered `isMaster` probes.
    probe_log: Vec<HostAndPort>,
}

/// Handle tests use to script and observe the cluster.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, addr: &str, configure: impl FnOnce(&mut MemberState)) {
        let mut state = self.state.lock().unwrap();
        let mut member = MemberState::default();
        configure(&mut member);
        state.members.insert(addr.parse().unwrap(), member);
    }

    /// Rewrites a member's script mid-test.
    pub fn configure(&self, addr: &str, configure: impl FnOnce(&mut MemberState)) {
        let mut state = self.state.lock().unwrap();
        let member = state
            .members
            .get_mut(&addr.parse().unwrap())
            .expect("unknown mock member");
        configure(member);
    }

    pub fn inspect<T>(&self, addr: &str, inspect: impl FnOnce(&MemberState) -> T) -> T {
        let state = self.state.lock().unwrap();
        inspect(
            state
                .members
                .get(&addr.parse().unwrap())
                .expect("unknown mock member"),
        )
    }

    pub fn probe_log(&self) -> Vec<HostAndPort> {
        self.state.lock().unwrap().probe_log.clone()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            state: self.state.clone(),
        })
    }
}

struct MockConnector {
    state: Arc<Mutex<ClusterState>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        addr: &HostAndPort,
        _timeout: Option<Duration>,
    ) -> Result<ConnectionRef> {
        let state = self.state.lock().unwrap();
        match state.members.get(addr) {
            Some(member) if !member.down => Ok(Arc::new(MockConnection {
                state: self.state.clone(),
                addr: addr.clone(),
                failed: AtomicBool::new(false),
            })),
            _ => Err(ReplSetError::Connection(format!(
                "connection refused: {}",
                addr
            ))),
        }
    }
}

struct MockConnection {
    state: Arc<Mutex<ClusterState>>,
    addr: HostAndPort,
    failed: AtomicBool,
}

impl MockConnection {
    /// Runs `op` against this connection's member, translating scripted
    /// failure modes into transport errors that also poison the connection.
    fn with_member<T>(&self, op: impl FnOnce(&mut MemberState) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let member = state
            .members
            .get_mut(&self.addr)
            .expect("unknown mock member");
        if member.down || member.fail_ops {
            self.failed.store(true, Ordering::SeqCst);
            return Err(ReplSetError::Connection(format!(
                "connection reset: {}",
                self.addr
            )));
        }
        Ok(op(member))
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn is_master(&self) -> Result<(bool, Value)> {
        let mut state = self.state.lock().unwrap();
        state.probe_log.push(self.addr.clone());
        let member = state
            .members
            .get_mut(&self.addr)
            .expect("unknown mock member");
        if member.down {
            self.failed.store(true, Ordering::SeqCst);
            return Err(ReplSetError::Connection(format!(
                "connection reset: {}",
                self.addr
            )));
        }

        let mut doc = json!({ "ismaster": member.primary });
        if !member.hosts.is_empty() {
            doc["hosts"] = json!(member.hosts);
        }
        if !member.passives.is_empty() {
            doc["passives"] = json!(member.passives);
        }
        if let Some(hint) = &member.primary_hint {
            doc["primary"] = json!(hint);
        }
        Ok((member.primary, doc))
    }

    async fn run_command(&self, _db: &str, command: Value) -> Result<Value> {
        self.with_member(|member| member.status.clone())?
            .ok_or_else(|| ReplSetError::Command {
                command: command.to_string(),
                message: "no scripted reply".to_string(),
            })
    }

    async fn auth(&self, db: &str, user: &str, _pw: &str, _digest: bool) -> Result<()> {
        let accepted = self.with_member(|member| {
            if member.auth_fails {
                return false;
            }
            member.auth_log.push((db.to_string(), user.to_string()));
            true
        })?;
        if accepted {
            Ok(())
        } else {
            Err(ReplSetError::Auth {
                db: db.to_string(),
                user: user.to_string(),
                message: "authentication denied".to_string(),
            })
        }
    }

    fn is_failed(&self) -> bool {
        if self.failed.load(Ordering::SeqCst) {
            return true;
        }
        let state = self.state.lock().unwrap();
        state
            .members
            .get(&self.addr)
            .map(|member| member.down)
            .unwrap_or(true)
    }

    async fn insert(&self, ns: &str, doc: Value) -> Result<()> {
        self.with_member(|member| member.inserts.push((ns.to_string(), doc)))
    }

    async fn insert_many(&self, ns: &str, docs: Vec<Value>) -> Result<()> {
        self.with_member(|member| {
            for doc in docs {
                member.inserts.push((ns.to_string(), doc));
            }
        })
    }

    async fn update(
        &self,
        ns: &str,
        _filter: Value,
        _doc: Value,
        _upsert: bool,
        _multi: bool,
    ) -> Result<()> {
        self.with_member(|member| member.updates.push(ns.to_string()))
    }

    async fn remove(&self, ns: &str, _filter: Value, _just_one: bool) -> Result<()> {
        self.with_member(|member| member.removes.push(ns.to_string()))
    }

    async fn query(
        &self,
        ns: &str,
        _filter: Value,
        _n_to_return: i32,
        _n_to_skip: i32,
        _fields: Option<Value>,
        _options: u32,
        _batch_size: i32,
    ) -> Result<Vec<Value>> {
        self.with_member(|member| {
            member.queries.push(ns.to_string());
            member.docs.clone()
        })
    }

    async fn find_one(
        &self,
        ns: &str,
        _filter: Value,
        _fields: Option<Value>,
        _options: u32,
    ) -> Result<Option<Value>> {
        self.with_member(|member| {
            member.queries.push(ns.to_string());
            member.docs.first().cloned()
        })
    }

    async fn kill_cursor(&self, _cursor_id: i64) -> Result<()> {
        self.with_member(|_| ())
    }

    async fn call(&self, message: &Message) -> Result<Message> {
        self.with_member(|member| {
            member.calls += 1;
            message.clone()
        })
    }
}
