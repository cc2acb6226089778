//! Per-entry timer engine
//!
//! Every non-permanent entry has exactly one pending wakeup. Arming a timer
//! spawns a tokio task that owns one strong handle to the entry and sleeps
//! until the deadline. Re-arming cancels the previous task's token and bumps
//! the slot generation; a task that wakes with an old generation (it lost the
//! race with the re-arm and was already past its `select!`) is a no-op. So
//! exactly one successor timer ends up live, never zero and never two.

use crate::config::MAX_TIMER_DELAY;
use crate::entry::{EntryInner, SharedEntry};
use crate::error::{NdError, Result};
use crate::nud;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// What the next wakeup is for; decides its delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Plain retransmit interval
    Retrans,
    /// Retransmit interval backed off `n` times
    Backoff(u32),
    /// Reachable lifetime after a confirmation
    Reachable,
    /// Remaining time until the recorded expiry, else the GC interval
    Expire,
    /// Wait before the first unicast probe
    Delay,
    /// Idle lifetime of a stale entry
    Gc,
}

/// Spawns timer tasks onto the runtime the table was created in
#[derive(Debug, Clone)]
pub(crate) struct TimerEngine {
    handle: Handle,
}

impl TimerEngine {
    /// Engine bound to the current tokio runtime
    pub(crate) fn current() -> Result<Self> {
        Handle::try_current()
            .map(|handle| Self { handle })
            .map_err(|_| NdError::NoRuntime)
    }
}

/// Timer bookkeeping stored under the entry lock
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    generation: u64,
    token: Option<CancellationToken>,
}

impl TimerSlot {
    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Consume the pending registration if `generation` is still current.
    pub(crate) fn take_if_current(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        self.token = None;
        true
    }

    fn supersede(&mut self) -> u64 {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

/// Delay for `kind` given the entry's current state
fn interval(entry: &SharedEntry, inner: &EntryInner, kind: TimerKind, now: Instant) -> Duration {
    let scope = entry.scope();
    let domain = &scope.domain;
    let params = domain.params();

    match kind {
        TimerKind::Retrans => domain.retrans_interval(&scope.ifp),
        TimerKind::Backoff(attempts) => {
            params.backoff_interval(domain.retrans_interval(&scope.ifp), attempts)
        }
        TimerKind::Reachable => domain.reachable_interval(&scope.ifp),
        TimerKind::Expire => match inner.expire {
            Some(deadline) if deadline > now => deadline - now,
            _ => params.gc_interval(),
        },
        TimerKind::Delay => domain.delay_interval(&scope.ifp),
        TimerKind::Gc => params.gc_interval(),
    }
}

/// Arm the entry's timer, superseding whatever was pending.
///
/// Permanent entries never age, so for them this only cancels.
pub(crate) fn set_timer(entry: &SharedEntry, inner: &mut EntryInner, kind: TimerKind) {
    if inner.permanent {
        cancel_timer(inner);
        return;
    }

    let now = Instant::now();
    let delay = interval(entry, inner, kind, now).min(MAX_TIMER_DELAY);
    let deadline = now + delay;
    inner.expire = Some(deadline);

    let generation = inner.timer.supersede();
    let token = CancellationToken::new();
    inner.timer.token = Some(token.clone());

    trace!(ip = %entry.key(), ?kind, ?delay, generation, "Armed neighbor timer");

    let task_entry = SharedEntry::clone(entry);
    entry.scope().engine.handle.spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => {
                nud::timer_expired(&task_entry, generation);
            }
        }
    });
}

/// Cancel the pending timer, if any
pub(crate) fn cancel_timer(inner: &mut EntryInner) {
    inner.timer.supersede();
    inner.expire = None;
}
