//! Neighbor unreachability detection
//!
//! All transitions of a single entry happen under its lock and are therefore
//! totally ordered. Work that leaves the cache (probes, failure reports,
//! packet delivery, unlinking from the table) is collected into a
//! [`Deferred`] while the lock is held and carried out after it is released,
//! so domain callbacks are free to re-enter the table.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-4: System Monitoring - Reachability tracking of every neighbor
//! - SC-5: Denial of Service Protection - Probe budgets and backoff bound
//!   solicitation traffic

use crate::entry::{EntryInner, SharedEntry};
use crate::error::ResolveError;
use crate::timer::{TimerKind, cancel_timer, set_timer};
use crate::types::{Confirmation, LinkAddr, NdState, Packet, PacketList, RouteKind};
use std::net::IpAddr;
use tracing::{debug, info, trace, warn};

/// A resolve that produced a usable link-layer address
///
/// The packet is handed back so the caller can transmit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub link_addr: LinkAddr,
    pub packet: Packet,
}

#[derive(Debug)]
struct ProbeRequest {
    dest: Option<LinkAddr>,
    source: Option<IpAddr>,
}

/// Side effects of one locked step, run once the entry lock is dropped
#[derive(Debug, Default)]
pub(crate) struct Deferred {
    transitions: Vec<(NdState, NdState)>,
    probe: Option<ProbeRequest>,
    missed: Option<(NdState, Option<PacketList>)>,
    output: Option<(LinkAddr, PacketList)>,
    unlink: bool,
}

impl Deferred {
    pub(crate) fn run(self, entry: &SharedEntry) {
        let scope = entry.scope();
        let ops = scope.domain.ops();
        let ifp = &scope.ifp;
        let target = entry.key();

        for (from, to) in self.transitions {
            debug!(ifp = %ifp, ip = %target, %from, %to, "Neighbor state change");
            ops.state_changed(ifp, &target, from, to);
        }

        if self.unlink {
            if let Some(table) = entry.table() {
                table.unlink(entry);
            }
        }

        if let Some(probe) = self.probe {
            trace!(ifp = %ifp, ip = %target, dest = ?probe.dest, "Sending solicitation");
            scope.metrics.record_probe(probe.dest.is_some());
            ops.send_probe(ifp, &target, probe.dest, probe.source);
        }

        if let Some((state, held)) = self.missed {
            info!(ifp = %ifp, ip = %target, %state, "Neighbor resolution failed");
            scope.metrics.record_resolution_failure(state);
            ops.notify_missed(ifp, &target, state, held);
        }

        if let Some((link_addr, packets)) = self.output {
            debug!(ifp = %ifp, ip = %target, count = packets.len(), "Releasing held packets");
            scope.metrics.observe_flush(packets.len());
            ops.output(ifp, &link_addr, packets);
        }
    }
}

fn transition(inner: &mut EntryInner, next: NdState, deferred: &mut Deferred) {
    let prev = inner.state;
    if prev == next {
        return;
    }
    debug_assert!(
        prev.can_transition_to(next),
        "illegal neighbor transition {} -> {}",
        prev,
        next
    );
    inner.state = next;
    deferred.transitions.push((prev, next));
}

fn probe(entry: &SharedEntry, inner: &EntryInner, unicast: bool) -> ProbeRequest {
    let scope = entry.scope();
    let dest = if unicast { inner.link_addr } else { None };
    let source = scope
        .domain
        .ops()
        .select_source(&scope.ifp, &entry.key(), inner.hold.packets());
    ProbeRequest { dest, source }
}

/// Mark the entry dead and schedule its removal from the table.
fn free(inner: &mut EntryInner, flush_pending: bool, deferred: &mut Deferred) {
    inner.linked = false;
    inner.flush_pending = flush_pending;
    cancel_timer(inner);
    deferred.unlink = true;
}

/// Locked part of a resolve. The caller has checked that the entry is linked.
pub(crate) fn resolve_locked(
    entry: &SharedEntry,
    inner: &mut EntryInner,
    packet: Packet,
    route: RouteKind,
    deferred: &mut Deferred,
) -> Result<Resolved, ResolveError> {
    let scope = entry.scope();
    let params = scope.domain.params();

    if inner.state == NdState::Stale && inner.valid {
        inner.asked = 0;
        transition(inner, NdState::Delay, deferred);
        set_timer(entry, inner, TimerKind::Delay);
    }

    if let Some(link_addr) = inner.usable_link_addr() {
        return Ok(Resolved { link_addr, packet });
    }

    match inner.state {
        NdState::NoState | NdState::WaitDelete => {
            transition(inner, NdState::Incomplete, deferred);
        }
        NdState::Purge => {
            inner.asked = 0;
            transition(inner, NdState::Incomplete, deferred);
        }
        NdState::Incomplete => {}
        state => {
            warn!(ip = %entry.key(), %state, "Resolved state without a usable address");
        }
    }

    let dropped = inner.hold.push(packet);
    if dropped > 0 {
        debug!(ip = %entry.key(), dropped, "Hold queue full, dropped oldest");
        scope.metrics.record_held_dropped(dropped);
    }

    // Every multicast probe is out once `asked` reaches the budget.
    let error = if inner.asked >= params.max_multicast_probes {
        match route {
            RouteKind::Gateway => ResolveError::HostUnreachable,
            RouteKind::Direct => ResolveError::HostDown,
        }
    } else {
        ResolveError::WouldBlock
    };

    if inner.asked == 0 {
        inner.asked = 1;
        deferred.probe = Some(probe(entry, inner, false));
        set_timer(entry, inner, TimerKind::Retrans);
    }

    Err(error)
}

/// Timer callback. `generation` identifies the registration that fired.
pub(crate) fn timer_expired(entry: &SharedEntry, generation: u64) {
    let mut deferred = Deferred::default();
    {
        let mut inner = entry.inner.lock();
        if !inner.timer.take_if_current(generation) {
            trace!(ip = %entry.key(), generation, "Superseded timer");
            return;
        }
        inner.expire = None;
        if !inner.linked {
            return;
        }
        expire_locked(entry, &mut inner, &mut deferred);
    }
    deferred.run(entry);
}

fn expire_locked(entry: &SharedEntry, inner: &mut EntryInner, deferred: &mut Deferred) {
    let scope = entry.scope();
    let params = scope.domain.params();
    let mmax = params.max_multicast_probes;
    let umax = params.max_unicast_probes;

    match inner.state {
        NdState::NoState => {}

        NdState::Incomplete => {
            inner.asked = inner.asked.saturating_add(1);
            if inner.asked <= mmax {
                deferred.probe = Some(probe(entry, inner, false));
                set_timer(entry, inner, TimerKind::Retrans);
            } else {
                deferred.probe = Some(probe(entry, inner, false));
                let mut held = inner.hold.drain();
                let first = held.pop_front();
                scope.metrics.record_held_dropped(held.len());
                deferred.missed = Some((NdState::Incomplete, first.map(|p| PacketList::from([p]))));
                transition(inner, NdState::WaitDelete, deferred);
                let n = inner.asked.saturating_sub(mmax).max(1);
                set_timer(entry, inner, TimerKind::Backoff(n));
            }
        }

        NdState::Reachable => {
            if !inner.permanent {
                transition(inner, NdState::Stale, deferred);
                set_timer(entry, inner, TimerKind::Gc);
            }
        }

        NdState::Stale | NdState::Purge => {
            if !inner.permanent {
                free(inner, true, deferred);
            }
        }

        NdState::Delay => {
            if scope.domain.ops().nud_enabled(&scope.ifp) {
                inner.asked = 1;
                transition(inner, NdState::Probe, deferred);
                deferred.probe = Some(probe(entry, inner, true));
                set_timer(entry, inner, TimerKind::Retrans);
            } else {
                transition(inner, NdState::Stale, deferred);
                set_timer(entry, inner, TimerKind::Gc);
            }
        }

        NdState::Probe => {
            inner.asked = inner.asked.saturating_add(1);
            if inner.asked <= umax {
                deferred.probe = Some(probe(entry, inner, true));
                set_timer(entry, inner, TimerKind::Retrans);
            } else {
                inner.asked = 1;
                transition(inner, NdState::Unreachable, deferred);
                deferred.missed = Some((NdState::Probe, None));
                deferred.probe = Some(probe(entry, inner, false));
                set_timer(entry, inner, TimerKind::Backoff(1));
            }
        }

        NdState::Unreachable => {
            inner.asked = inner.asked.saturating_add(1);
            if inner.asked <= umax {
                deferred.probe = Some(probe(entry, inner, true));
                let n = inner.asked;
                set_timer(entry, inner, TimerKind::Backoff(n));
            } else {
                deferred.missed = Some((NdState::Unreachable, None));
                deferred.probe = Some(probe(entry, inner, false));
                inner.valid = false;
                transition(inner, NdState::WaitDelete, deferred);
                let n = inner.asked.saturating_sub(umax).max(1);
                set_timer(entry, inner, TimerKind::Backoff(n));
            }
        }

        NdState::WaitDelete => free(inner, false, deferred),
    }
}

/// Upper-layer evidence that `entry` is reachable.
///
/// Returns whether the hint was applied. Hints beyond `max_nud_hint` in a row
/// are ignored until the next confirmation resets the counter.
pub fn nud_hint(entry: &SharedEntry) -> bool {
    let mut deferred = Deferred::default();
    let accepted = {
        let mut inner = entry.inner.lock();
        if !inner.linked || inner.usable_link_addr().is_none() {
            return false;
        }

        inner.byhint = inner.byhint.saturating_add(1);
        if inner.byhint > entry.scope().domain.params().max_nud_hint {
            false
        } else {
            transition(&mut inner, NdState::Reachable, &mut deferred);
            set_timer(entry, &mut inner, TimerKind::Reachable);
            true
        }
    };
    entry.scope().metrics.record_hint(accepted);
    deferred.run(entry);
    accepted
}

/// Apply a link-layer confirmation. Returns whether the entry changed.
pub(crate) fn confirm(entry: &SharedEntry, confirmation: Confirmation) -> bool {
    let mut deferred = Deferred::default();
    let applied = {
        let mut inner = entry.inner.lock();
        confirm_locked(entry, &mut inner, confirmation, &mut deferred)
    };
    if applied {
        entry.scope().metrics.record_confirmation();
    }
    deferred.run(entry);
    applied
}

fn confirm_locked(
    entry: &SharedEntry,
    inner: &mut EntryInner,
    confirmation: Confirmation,
    deferred: &mut Deferred,
) -> bool {
    if !inner.linked || inner.permanent {
        return false;
    }
    if matches!(inner.state, NdState::NoState | NdState::WaitDelete) {
        debug!(ip = %entry.key(), state = %inner.state, "Ignoring confirmation");
        return false;
    }

    let link_addr = confirmation.link_addr;
    let changed = !inner.valid || inner.link_addr != Some(link_addr);
    inner.link_addr = Some(link_addr);
    inner.valid = true;

    if confirmation.solicited {
        inner.asked = 0;
        inner.byhint = 0;
        transition(inner, NdState::Reachable, deferred);
        set_timer(entry, inner, TimerKind::Reachable);
    } else if changed || !inner.state.is_resolved() {
        inner.asked = 0;
        inner.byhint = 0;
        transition(inner, NdState::Stale, deferred);
        set_timer(entry, inner, TimerKind::Gc);
    }

    if !inner.hold.is_empty() {
        deferred.output = Some((link_addr, inner.hold.drain()));
    }
    true
}

/// Force re-verification of a resolved entry.
pub(crate) fn mark_purge(entry: &SharedEntry) -> bool {
    let mut deferred = Deferred::default();
    {
        let mut inner = entry.inner.lock();
        if !inner.linked || inner.permanent || !inner.state.is_resolved() {
            return false;
        }
        transition(&mut inner, NdState::Purge, &mut deferred);
        set_timer(entry, &mut inner, TimerKind::Expire);
    }
    deferred.run(entry);
    true
}

/// Free `entry` unconditionally. Returns false if it was already freed.
pub(crate) fn release(entry: &SharedEntry) -> bool {
    let mut deferred = Deferred::default();
    {
        let mut inner = entry.inner.lock();
        if !inner.linked {
            return false;
        }
        free(&mut inner, true, &mut deferred);
    }
    deferred.run(entry);
    true
}

/// Free `entry` if it is an aged, non-permanent `Stale` or `Purge` entry.
pub(crate) fn collect(entry: &SharedEntry) -> bool {
    let mut deferred = Deferred::default();
    {
        let mut inner = entry.inner.lock();
        if !is_collectable(&inner) {
            return false;
        }
        free(&mut inner, true, &mut deferred);
    }
    deferred.run(entry);
    true
}

pub(crate) fn is_collectable(inner: &EntryInner) -> bool {
    inner.linked
        && !inner.permanent
        && matches!(inner.state, NdState::Stale | NdState::Purge)
}
