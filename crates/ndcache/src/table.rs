//! Per-interface neighbor cache table
//!
//! Maps network-layer addresses to shared entries. The table lock is only
//! ever held for map operations; it is never taken while an entry lock is
//! held, and entry locks are only taken after the table lock is dropped.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Per-interface neighbor inventory
//! - SC-5: Denial of Service Protection - Garbage collection threshold

use crate::domain::Domain;
use crate::entry::{EntrySnapshot, NeighborEntry, SharedEntry};
use crate::error::{ResolveError, Result};
use crate::metrics::NdMetrics;
use crate::nud::{self, Deferred, Resolved};
use crate::timer::{TimerEngine, cancel_timer};
use crate::types::{AddressFamily, Confirmation, Interface, LinkAddr, Packet, RouteKind};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument};

/// Context shared by a table and all of its entries
pub(crate) struct TableScope {
    pub(crate) ifp: Interface,
    pub(crate) domain: Arc<Domain>,
    pub(crate) engine: TimerEngine,
    pub(crate) metrics: Arc<NdMetrics>,
}

/// Neighbor cache for one interface and one address family
pub struct CacheTable {
    scope: Arc<TableScope>,
    entries: RwLock<HashMap<IpAddr, SharedEntry>>,
    this: Weak<CacheTable>,
}

impl CacheTable {
    /// Create a table with its own metrics registry.
    ///
    /// Must be called from within a tokio runtime; entry timers are spawned
    /// onto it.
    pub fn new(domain: Arc<Domain>, ifp: Interface) -> Result<Arc<Self>> {
        Self::with_metrics(domain, ifp, Arc::new(NdMetrics::new()?))
    }

    /// Create a table reporting into a shared metrics collector
    pub fn with_metrics(
        domain: Arc<Domain>,
        ifp: Interface,
        metrics: Arc<NdMetrics>,
    ) -> Result<Arc<Self>> {
        let engine = TimerEngine::current()?;
        info!(ifp = %ifp, family = %domain.family(), "Created neighbor cache table");

        let scope = Arc::new(TableScope {
            ifp,
            domain,
            engine,
            metrics,
        });
        Ok(Arc::new_cyclic(|this| Self {
            scope,
            entries: RwLock::new(HashMap::new()),
            this: this.clone(),
        }))
    }

    pub fn interface(&self) -> &Interface {
        &self.scope.ifp
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.scope.domain
    }

    pub fn metrics(&self) -> &Arc<NdMetrics> {
        &self.scope.metrics
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<IpAddr> {
        self.entries.read().keys().copied().collect()
    }

    pub fn lookup(&self, key: &IpAddr) -> Option<SharedEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Snapshot of the entry for `key`, if present
    pub fn snapshot(&self, key: &IpAddr) -> Option<EntrySnapshot> {
        self.lookup(key).map(|entry| entry.snapshot())
    }

    /// Entry for `key`, creating a `NoState` entry on first use.
    ///
    /// # Panics
    ///
    /// If `key` belongs to a different address family than the table.
    pub fn get_or_insert(&self, key: IpAddr) -> SharedEntry {
        if let Some(entry) = self.lookup(&key) {
            return entry;
        }
        self.assert_family(&key);

        let (entry, len) = {
            let mut entries = self.entries.write();
            if let Some(entry) = entries.get(&key) {
                return Arc::clone(entry);
            }
            let entry = Arc::new(NeighborEntry::new(
                key,
                Arc::clone(&self.scope),
                self.this.clone(),
            ));
            entries.insert(key, Arc::clone(&entry));
            (entry, entries.len())
        };

        debug!(ifp = %self.scope.ifp, ip = %key, "Created neighbor entry");
        self.scope.metrics.record_created();

        let threshold = self.scope.domain.params().gc_threshold;
        if threshold > 0 && len > threshold {
            self.collect_garbage();
        }
        entry
    }

    /// Free `entry` and unlink it. No-op if it was already freed or has been
    /// replaced by a newer entry under the same key.
    pub fn remove(&self, entry: &SharedEntry) -> bool {
        let freed = nud::release(entry);
        // Already freed by someone else; make sure it is gone from the map.
        self.unlink(entry) || freed
    }

    /// Drop the table's reference if it still points at `entry`
    pub(crate) fn unlink(&self, entry: &SharedEntry) -> bool {
        let removed = {
            let mut entries = self.entries.write();
            match entries.get(&entry.key()) {
                Some(current) if Arc::ptr_eq(current, entry) => entries.remove(&entry.key()),
                _ => None,
            }
        };
        match removed {
            Some(_) => {
                self.scope.metrics.record_unlinked();
                true
            }
            None => false,
        }
    }

    /// Call `f` for every aged `Stale` or `Purge` entry.
    ///
    /// Handles are collected under the table lock; `f` runs after it is
    /// released, so it may free entries.
    pub fn for_each_stale<F>(&self, mut f: F)
    where
        F: FnMut(&SharedEntry),
    {
        let entries: Vec<SharedEntry> = self.entries.read().values().cloned().collect();
        for entry in &entries {
            let stale = nud::is_collectable(&entry.inner.lock());
            if stale {
                f(entry);
            }
        }
    }

    /// Free aged entries until the table is back under `gc_threshold`.
    /// Returns the number freed.
    pub fn collect_garbage(&self) -> usize {
        let threshold = self.scope.domain.params().gc_threshold;
        let mut excess = self.len().saturating_sub(threshold);
        let mut freed = 0;

        self.for_each_stale(|entry| {
            if excess > 0 && nud::collect(entry) {
                excess -= 1;
                freed += 1;
            }
        });

        if freed > 0 {
            info!(ifp = %self.scope.ifp, freed, "Collected stale neighbor entries");
        }
        freed
    }

    /// Resolve `key` for transmission of `packet`.
    ///
    /// On success the packet comes back with the link-layer address to send
    /// it to. Otherwise the packet has been queued on the entry (or dropped)
    /// and the error says whether resolution is still underway.
    pub fn resolve(
        &self,
        key: IpAddr,
        packet: Packet,
        route: RouteKind,
    ) -> std::result::Result<Resolved, ResolveError> {
        loop {
            let entry = self.get_or_insert(key);
            let mut inner = entry.inner.lock();
            if !inner.linked {
                drop(inner);
                self.unlink(&entry);
                continue;
            }

            let mut deferred = Deferred::default();
            let result = nud::resolve_locked(&entry, &mut inner, packet, route, &mut deferred);
            drop(inner);
            deferred.run(&entry);
            return result;
        }
    }

    /// Like [`resolve`](Self::resolve), copying the link-layer address into
    /// `link_buf`. Returns the number of octets copied and the packet.
    pub fn resolve_into(
        &self,
        key: IpAddr,
        packet: Packet,
        route: RouteKind,
        link_buf: &mut [u8],
    ) -> std::result::Result<(usize, Packet), ResolveError> {
        let Resolved { link_addr, packet } = self.resolve(key, packet, route)?;
        Ok((link_addr.copy_to(link_buf), packet))
    }

    /// Upper-layer reachability hint for `key`
    pub fn nud_hint(&self, key: &IpAddr) -> bool {
        match self.lookup(key) {
            Some(entry) => nud::nud_hint(&entry),
            None => false,
        }
    }

    /// Apply a link-layer confirmation for `key`.
    ///
    /// Returns false if there is no entry or it cannot take a confirmation in
    /// its current state.
    pub fn confirm(&self, key: IpAddr, confirmation: Confirmation) -> bool {
        match self.lookup(&key) {
            Some(entry) => nud::confirm(&entry, confirmation),
            None => false,
        }
    }

    /// Force re-verification of `key`
    pub fn mark_purge(&self, key: &IpAddr) -> bool {
        match self.lookup(key) {
            Some(entry) => nud::mark_purge(&entry),
            None => false,
        }
    }

    /// Install a permanent entry, replacing whatever is cached for `key`
    #[instrument(skip(self), fields(ifp = %self.scope.ifp))]
    pub fn add_static(&self, key: IpAddr, link_addr: LinkAddr) -> SharedEntry {
        self.assert_family(&key);

        let entry = Arc::new(NeighborEntry::new_static(
            key,
            link_addr,
            Arc::clone(&self.scope),
            self.this.clone(),
        ));
        let replaced = self.entries.write().insert(key, Arc::clone(&entry));
        self.scope.metrics.record_created();

        if let Some(old) = replaced {
            // Already out of the map; release only marks it dead.
            self.scope.metrics.record_unlinked();
            nud::release(&old);
        }
        info!(ip = %key, %link_addr, "Installed static neighbor");
        entry
    }

    /// Administrative removal of `key`
    #[instrument(skip(self), fields(ifp = %self.scope.ifp))]
    pub fn delete(&self, key: &IpAddr) -> bool {
        match self.lookup(key) {
            Some(entry) => self.remove(&entry),
            None => false,
        }
    }

    /// Free every entry; used on interface teardown
    #[instrument(skip(self), fields(ifp = %self.scope.ifp))]
    pub fn flush(&self) -> usize {
        let entries: Vec<SharedEntry> = self.entries.read().values().cloned().collect();
        let count = entries.iter().filter(|entry| self.remove(entry)).count();
        info!(count, "Flushed neighbor cache");
        count
    }

    fn assert_family(&self, key: &IpAddr) {
        assert_eq!(
            AddressFamily::of(key),
            self.scope.domain.family(),
            "neighbor {} does not belong to the {} table on {}",
            key,
            self.scope.domain.family(),
            self.scope.ifp
        );
    }
}

impl std::fmt::Debug for TableScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableScope")
            .field("ifp", &self.ifp)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for CacheTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTable")
            .field("ifp", &self.scope.ifp)
            .field("family", &self.scope.domain.family())
            .field("len", &self.len())
            .finish()
    }
}

impl Drop for CacheTable {
    fn drop(&mut self) {
        let entries = std::mem::take(self.entries.get_mut());
        for entry in entries.values() {
            let mut inner = entry.inner.lock();
            if inner.linked {
                inner.linked = false;
                inner.flush_pending = true;
                cancel_timer(&mut inner);
                self.scope.metrics.record_unlinked();
            }
        }
        debug!(ifp = %self.scope.ifp, count = entries.len(), "Dropped neighbor cache table");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NdParams;
    use crate::domain::{DomainConfig, DomainRegistry, MockNdDomain};
    use crate::types::NdState;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn table(params: NdParams) -> Arc<CacheTable> {
        let mut mock = MockNdDomain::new();
        mock.expect_state_changed().returning(|_, _, _, _| ());
        mock.expect_reclaim().returning(|_, _, _| ());
        let mut registry = DomainRegistry::new();
        let domain =
            registry.register_domain(AddressFamily::Inet, DomainConfig::new(params, Arc::new(mock)));
        CacheTable::new(domain, Interface::new(1, "Ethernet0")).unwrap()
    }

    fn make_stale(entry: &SharedEntry) {
        let mut inner = entry.inner.lock();
        inner.state = NdState::Stale;
        inner.link_addr = Some(LinkAddr::ethernet([2, 0, 0, 0, 0, 1]));
        inner.valid = true;
    }

    #[tokio::test]
    async fn test_get_or_insert_is_idempotent() {
        let table = table(NdParams::default());
        let a = table.get_or_insert(ip(1));
        let b = table.get_or_insert(ip(1));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
        assert_eq!(a.state(), NdState::NoState);
        assert_eq!(table.metrics().entries.get(), 1.0);
    }

    #[tokio::test]
    async fn test_remove_ignores_replaced_entry() {
        let table = table(NdParams::default());
        let old = table.get_or_insert(ip(1));
        let new = table.add_static(ip(1), LinkAddr::ethernet([2, 0, 0, 0, 0, 9]));

        assert!(!old.snapshot().linked);
        assert!(!table.remove(&old));
        assert!(Arc::ptr_eq(&table.lookup(&ip(1)).unwrap(), &new));
        assert_eq!(table.metrics().entries.get(), 1.0);
    }

    #[tokio::test]
    async fn test_for_each_stale_allows_removal() {
        let table = table(NdParams::default());
        for last in 1..=4 {
            let entry = table.get_or_insert(ip(last));
            if last % 2 == 0 {
                make_stale(&entry);
            }
        }

        let mut visited = Vec::new();
        table.for_each_stale(|entry| {
            visited.push(entry.key());
            table.remove(entry);
        });

        visited.sort();
        assert_eq!(visited, vec![ip(2), ip(4)]);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_gc_threshold_collects_stale_entries() {
        let params = NdParams {
            gc_threshold: 2,
            ..Default::default()
        };
        let table = table(params);
        make_stale(&table.get_or_insert(ip(1)));
        make_stale(&table.get_or_insert(ip(2)));

        table.get_or_insert(ip(3));
        assert_eq!(table.len(), 2);
        assert!(table.lookup(&ip(3)).is_some());
    }

    #[tokio::test]
    async fn test_flush_empties_table() {
        let table = table(NdParams::default());
        table.get_or_insert(ip(1));
        table.add_static(ip(2), LinkAddr::ethernet([2, 0, 0, 0, 0, 2]));

        assert_eq!(table.flush(), 2);
        assert!(table.is_empty());
        assert_eq!(table.metrics().entries.get(), 0.0);
    }

    #[tokio::test]
    async fn test_resolve_into_copies_address() {
        let table = table(NdParams::default());
        let mac = LinkAddr::ethernet([2, 0, 0, 0, 0, 7]);
        table.add_static(ip(7), mac);

        let mut buf = [0u8; 4];
        let (copied, packet) = table
            .resolve_into(ip(7), Packet::new(vec![0xaa]), RouteKind::Direct, &mut buf)
            .unwrap();
        assert_eq!(copied, 4);
        assert_eq!(buf, [2, 0, 0, 0]);
        assert_eq!(packet.as_bytes(), &[0xaa]);
    }

    #[tokio::test]
    #[should_panic(expected = "does not belong")]
    async fn test_wrong_family_panics() {
        let table = table(NdParams::default());
        table.get_or_insert("fe80::1".parse().unwrap());
    }
}
