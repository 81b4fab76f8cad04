//! Process-wide monitor registry and background watcher.
//!
//! Monitors are one-per-set-name and live for the process lifetime; every
//! client of the same set shares the monitor the registry hands out. The
//! first registration also starts the watcher: a single background task
//! that wakes every twenty seconds and re-checks every registered set, so
//! topology changes are picked up even while no client is issuing traffic.

use crate::monitor::ReplicaSetMonitor;
use replset_common::{Connector, HostAndPort};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info};

/// How long the watcher sleeps between passes.
pub const WATCHER_INTERVAL: Duration = Duration::from_secs(20);

static MONITORS: OnceLock<Mutex<HashMap<String, Arc<ReplicaSetMonitor>>>> = OnceLock::new();
static WATCHER_STARTED: AtomicBool = AtomicBool::new(false);
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

fn monitors() -> &'static Mutex<HashMap<String, Arc<ReplicaSetMonitor>>> {
    MONITORS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the shared monitor for `name`, creating it from `seeds` if this
/// is the first request for that set. Existing monitors ignore the caller's
/// seeds — they have already discovered the real membership.
///
/// The first call also starts the background watcher task; it must therefore
/// run inside a tokio runtime.
pub async fn get(
    name: &str,
    seeds: &[HostAndPort],
    connector: Arc<dyn Connector>,
) -> Arc<ReplicaSetMonitor> {
    let existing = {
        let map = monitors().lock().expect("monitor registry lock poisoned");
        map.get(name).cloned()
    };

    let monitor = match existing {
        Some(monitor) => monitor,
        None => {
            // Seeding probes the network, so it runs outside the registry
            // lock. If another caller registers the same name first, its
            // monitor wins and this one is discarded.
            let candidate = Arc::new(ReplicaSetMonitor::new(name, seeds, connector).await);
            let mut map = monitors().lock().expect("monitor registry lock poisoned");
            map.entry(name.to_string()).or_insert(candidate).clone()
        }
    };

    if WATCHER_STARTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        tokio::spawn(watcher_loop());
    }

    monitor
}

/// Runs a check pass over every registered monitor, visiting each set name
/// exactly once. The registry lock is taken briefly per iteration to find
/// the next unvisited monitor, so sets registered while the pass is running
/// are still picked up.
pub async fn check_all() {
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        let next = {
            let map = monitors().lock().expect("monitor registry lock poisoned");
            map.iter()
                .find(|(name, _)| !seen.contains(*name))
                .map(|(name, monitor)| (name.clone(), monitor.clone()))
        };

        let Some((name, monitor)) = next else {
            break;
        };
        info!("checking replica set: {}", name);
        seen.insert(name);
        monitor.check().await;
    }
}

/// Requests process shutdown; the watcher observes the flag at its next
/// wakeup and exits.
pub fn shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

async fn watcher_loop() {
    info!("replica set monitor watcher started");
    loop {
        tokio::time::sleep(WATCHER_INTERVAL).await;
        if shutdown_requested() {
            break;
        }
        debug!("replica set monitor watcher pass");
        watcher_pass().await;
    }
    info!("replica set monitor watcher stopped");
}

/// One guarded watcher pass. The check runs in its own task so a panic
/// escaping a `Connector` or `Connection` implementation is logged and
/// contained instead of killing the watcher; the next wakeup runs a fresh
/// pass.
async fn watcher_pass() {
    if let Err(e) = tokio::spawn(check_all()).await {
        error!("replica set monitor check failed: {}", e);
    }
}
