//! In-memory directory of the known members of one replica set.
//!
//! The table is owned by a [`ReplicaSetMonitor`](crate::monitor::ReplicaSetMonitor)
//! and only ever mutated under its lock. Insertion order is significant: it
//! is the scan order for health checks and the rotation order for secondary
//! selection.

use replset_common::{ConnectionRef, HostAndPort};

/// One known replica-set member.
pub struct Node {
    addr: HostAndPort,
    /// Probe connection owned by the monitor. `None` when the node was
    /// discovered but could not be reached yet; the next check retries the
    /// connect. Dropped (and thereby closed) only with the table.
    conn: Option<ConnectionRef>,
    /// Health flag; starts true and follows probe results.
    ok: bool,
}

impl Node {
    pub fn new(addr: HostAndPort, conn: Option<ConnectionRef>) -> Self {
        Self {
            addr,
            conn,
            ok: true,
        }
    }

    pub fn addr(&self) -> &HostAndPort {
        &self.addr
    }

    pub fn conn(&self) -> Option<ConnectionRef> {
        self.conn.clone()
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }
}

/// Ordered membership of one replica set plus the current primary index.
///
/// `primary == None` means "primary unknown". When set, the index is always
/// in bounds: nodes are only ever appended, never removed.
#[derive(Default)]
pub struct NodeTable {
    nodes: Vec<Node>,
    primary: Option<usize>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Linear scan by address equality.
    pub fn find(&self, addr: &HostAndPort) -> Option<usize> {
        self.nodes.iter().position(|node| node.addr() == addr)
    }

    /// Appends a member. The caller has already checked `find(addr)` is
    /// `None`; addresses stay unique within one table.
    pub fn add(&mut self, addr: HostAndPort, conn: Option<ConnectionRef>) -> usize {
        debug_assert!(self.find(&addr).is_none());
        self.nodes.push(Node::new(addr, conn));
        self.nodes.len() - 1
    }

    /// Replaces a node's probe connection after a reconnect.
    pub fn set_conn(&mut self, index: usize, conn: Option<ConnectionRef>) {
        self.nodes[index].conn = conn;
    }

    pub fn set_health(&mut self, index: usize, ok: bool) {
        self.nodes[index].ok = ok;
    }

    pub fn primary(&self) -> Option<usize> {
        self.primary
    }

    pub fn set_primary(&mut self, index: Option<usize>) {
        debug_assert!(index.map(|i| i < self.nodes.len()).unwrap_or(true));
        self.primary = index;
    }

    pub fn primary_addr(&self) -> Option<&HostAndPort> {
        self.primary.map(|i| self.nodes[i].addr())
    }

    /// Forgets the primary designation if `addr` is the current primary.
    pub fn clear_primary_if(&mut self, addr: &HostAndPort) {
        if self.primary_addr() == Some(addr) {
            self.primary = None;
        }
    }

    /// Picks a healthy non-primary member, scanning cyclically from `offset`.
    ///
    /// If no member qualifies, falls back to the first node as a last resort
    /// even if it is the primary or known-failed; the caller treats the
    /// address as best-effort and any failure on use is reported back
    /// through the normal notification path. Returns `None` only when the
    /// table is empty.
    pub fn pick_secondary(&self, offset: usize) -> Option<&HostAndPort> {
        if self.nodes.is_empty() {
            return None;
        }
        for i in 0..self.nodes.len() {
            let p = (i + offset) % self.nodes.len();
            if Some(p) == self.primary {
                continue;
            }
            if self.nodes[p].ok {
                return Some(self.nodes[p].addr());
            }
        }
        Some(self.nodes[0].addr())
    }

    /// Renders `"<name>/host1:port1,host2:port2,…"` in node order. An empty
    /// set name omits the prefix.
    pub fn server_address(&self, name: &str) -> String {
        let mut out = String::new();
        if !name.is_empty() {
            out.push_str(name);
            out.push('/');
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&node.addr().to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> HostAndPort {
        s.parse().unwrap()
    }

    fn table_with(addrs: &[&str]) -> NodeTable {
        let mut table = NodeTable::new();
        for a in addrs {
            table.add(addr(a), None);
        }
        table
    }

    #[test]
    fn test_find_by_address() {
        let table = table_with(&["a:27017", "b:27017", "c:27017"]);
        assert_eq!(table.find(&addr("b:27017")), Some(1));
        assert_eq!(table.find(&addr("d:27017")), None);
    }

    #[test]
    fn test_addresses_unique() {
        let table = table_with(&["a:27017", "b:27017"]);
        let mut seen = std::collections::HashSet::new();
        for node in table.nodes() {
            assert!(seen.insert(node.addr().clone()));
        }
    }

    #[test]
    fn test_new_nodes_start_healthy() {
        let table = table_with(&["a:27017"]);
        assert!(table.node(0).is_ok());
    }

    #[test]
    fn test_primary_index_in_bounds() {
        let mut table = table_with(&["a:27017", "b:27017"]);
        assert_eq!(table.primary(), None);
        table.set_primary(Some(1));
        assert_eq!(table.primary_addr(), Some(&addr("b:27017")));
    }

    #[test]
    fn test_clear_primary_if_matches() {
        let mut table = table_with(&["a:27017", "b:27017"]);
        table.set_primary(Some(0));

        table.clear_primary_if(&addr("b:27017"));
        assert_eq!(table.primary(), Some(0));

        table.clear_primary_if(&addr("a:27017"));
        assert_eq!(table.primary(), None);
    }

    #[test]
    fn test_pick_secondary_skips_primary() {
        let mut table = table_with(&["a:27017", "b:27017", "c:27017"]);
        table.set_primary(Some(0));

        // whatever the offset, the primary is never selected while a
        // healthy non-primary exists
        for offset in 0..10 {
            let picked = table.pick_secondary(offset).unwrap();
            assert_ne!(picked, &addr("a:27017"));
        }
    }

    #[test]
    fn test_pick_secondary_skips_unhealthy() {
        let mut table = table_with(&["a:27017", "b:27017", "c:27017"]);
        table.set_primary(Some(0));
        table.set_health(1, false);

        for offset in 0..10 {
            assert_eq!(table.pick_secondary(offset).unwrap(), &addr("c:27017"));
        }
    }

    #[test]
    fn test_pick_secondary_rotates_with_offset() {
        let mut table = table_with(&["a:27017", "b:27017", "c:27017"]);
        table.set_primary(Some(0));

        assert_eq!(table.pick_secondary(1).unwrap(), &addr("b:27017"));
        assert_eq!(table.pick_secondary(2).unwrap(), &addr("c:27017"));
    }

    #[test]
    fn test_pick_secondary_last_resort_fallback() {
        let mut table = table_with(&["a:27017", "b:27017"]);
        table.set_primary(Some(0));
        table.set_health(1, false);

        // no healthy non-primary left: falls back to the first node even
        // though it is the primary
        assert_eq!(table.pick_secondary(1).unwrap(), &addr("a:27017"));
    }

    #[test]
    fn test_pick_secondary_empty_table() {
        let table = NodeTable::new();
        assert!(table.pick_secondary(0).is_none());
    }

    #[test]
    fn test_server_address_rendering() {
        let table = table_with(&["a:27017", "b:27018"]);
        assert_eq!(table.server_address("rs0"), "rs0/a:27017,b:27018");
        assert_eq!(table.server_address(""), "a:27017,b:27018");
    }
}
