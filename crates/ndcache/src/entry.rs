//! Neighbor entry
//!
//! One resolution record per network-layer address. Entries are shared as
//! [`SharedEntry`]; the strong count is the reference count, so the table, a
//! pending timer task and any caller-held handle each pin the entry. When the
//! last handle goes away the domain's `reclaim` hook runs exactly once.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Each entry identifies one neighbor
//! - SC-5: Denial of Service Protection - Bounded hold queue per entry

use crate::table::{CacheTable, TableScope};
use crate::timer::TimerSlot;
use crate::types::{LinkAddr, NdState, Packet, PacketList};
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::debug;

/// Counted handle to a neighbor entry
pub type SharedEntry = Arc<NeighborEntry>;

/// Packets waiting for resolution, oldest first, bounded
#[derive(Debug)]
pub(crate) struct HoldQueue {
    packets: PacketList,
    capacity: usize,
}

impl HoldQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            packets: PacketList::new(),
            capacity,
        }
    }

    /// Append `packet`, discarding the oldest ones beyond capacity.
    /// Returns how many were discarded.
    pub(crate) fn push(&mut self, packet: Packet) -> usize {
        self.packets.push_back(packet);
        let mut dropped = 0;
        while self.packets.len() > self.capacity {
            self.packets.pop_front();
            dropped += 1;
        }
        dropped
    }

    pub(crate) fn drain(&mut self) -> PacketList {
        std::mem::take(&mut self.packets)
    }

    pub(crate) fn packets(&self) -> &PacketList {
        &self.packets
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// Mutable entry state, guarded by the entry lock
#[derive(Debug)]
pub(crate) struct EntryInner {
    pub(crate) state: NdState,
    pub(crate) link_addr: Option<LinkAddr>,
    pub(crate) valid: bool,
    pub(crate) permanent: bool,
    pub(crate) hold: HoldQueue,
    pub(crate) asked: u32,
    pub(crate) byhint: u32,
    pub(crate) expire: Option<Instant>,
    pub(crate) timer: TimerSlot,
    pub(crate) linked: bool,
    pub(crate) flush_pending: bool,
}

impl EntryInner {
    fn new(capacity: usize) -> Self {
        Self {
            state: NdState::NoState,
            link_addr: None,
            valid: false,
            permanent: false,
            hold: HoldQueue::new(capacity),
            asked: 0,
            byhint: 0,
            expire: None,
            timer: TimerSlot::default(),
            linked: true,
            flush_pending: false,
        }
    }

    /// Link-layer address if it may be used for transmission
    pub(crate) fn usable_link_addr(&self) -> Option<LinkAddr> {
        if self.valid && self.state.is_resolved() {
            self.link_addr
        } else {
            None
        }
    }
}

/// Point-in-time copy of an entry, taken under its lock
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub key: IpAddr,
    pub state: NdState,
    pub link_addr: Option<LinkAddr>,
    pub valid: bool,
    pub permanent: bool,
    pub asked: u32,
    pub byhint: u32,
    /// Deadline of the pending timer
    pub expire: Option<Instant>,
    pub held: Vec<Packet>,
    /// Still reachable through its table
    pub linked: bool,
}

/// What `reclaim` receives once an entry is gone
#[derive(Debug, Clone, PartialEq)]
pub struct ReclaimedEntry {
    pub target: IpAddr,
    pub state: NdState,
    /// Last usable link-layer address, if the entry was valid
    pub link_addr: Option<LinkAddr>,
    /// Packets still held; ownership passes to the domain
    pub held: PacketList,
}

/// A neighbor cache entry
pub struct NeighborEntry {
    key: IpAddr,
    scope: Arc<TableScope>,
    table: Weak<CacheTable>,
    pub(crate) inner: Mutex<EntryInner>,
}

impl NeighborEntry {
    pub(crate) fn new(key: IpAddr, scope: Arc<TableScope>, table: Weak<CacheTable>) -> Self {
        let capacity = scope.domain.params().max_queue_length;
        Self {
            key,
            scope,
            table,
            inner: Mutex::new(EntryInner::new(capacity)),
        }
    }

    /// Entry created already resolved, never aging
    pub(crate) fn new_static(
        key: IpAddr,
        link_addr: LinkAddr,
        scope: Arc<TableScope>,
        table: Weak<CacheTable>,
    ) -> Self {
        let entry = Self::new(key, scope, table);
        {
            let mut inner = entry.inner.lock();
            inner.state = NdState::Reachable;
            inner.link_addr = Some(link_addr);
            inner.valid = true;
            inner.permanent = true;
        }
        entry
    }

    /// Network-layer address this entry resolves
    pub fn key(&self) -> IpAddr {
        self.key
    }

    pub fn state(&self) -> NdState {
        self.inner.lock().state
    }

    /// Usable link-layer address, `None` unless resolved and valid
    pub fn link_addr(&self) -> Option<LinkAddr> {
        self.inner.lock().usable_link_addr()
    }

    pub fn is_permanent(&self) -> bool {
        self.inner.lock().permanent
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        let inner = self.inner.lock();
        EntrySnapshot {
            key: self.key,
            state: inner.state,
            link_addr: inner.link_addr,
            valid: inner.valid,
            permanent: inner.permanent,
            asked: inner.asked,
            byhint: inner.byhint,
            expire: inner.expire,
            held: inner.hold.packets().iter().cloned().collect(),
            linked: inner.linked,
        }
    }

    pub(crate) fn scope(&self) -> &TableScope {
        &self.scope
    }

    pub(crate) fn table(&self) -> Option<Arc<CacheTable>> {
        self.table.upgrade()
    }
}

impl std::fmt::Debug for NeighborEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborEntry")
            .field("key", &self.key)
            .field("ifp", &self.scope.ifp)
            .finish_non_exhaustive()
    }
}

impl Drop for NeighborEntry {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let reclaimed = ReclaimedEntry {
            target: self.key,
            state: inner.state,
            link_addr: inner.usable_link_addr(),
            held: inner.hold.drain(),
        };

        debug!(
            ifp = %self.scope.ifp,
            ip = %self.key,
            state = %reclaimed.state,
            held = reclaimed.held.len(),
            flush_pending = inner.flush_pending,
            "Reclaiming neighbor entry"
        );
        self.scope.metrics.record_reclaimed();
        self.scope
            .domain
            .ops()
            .reclaim(&self.scope.ifp, reclaimed, inner.flush_pending);
    }
}
