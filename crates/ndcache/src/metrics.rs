//! Prometheus metrics for the neighbor cache
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-6: Audit Record Review - Metrics available for analysis
//! - SI-4: System Monitoring - Resolution health and probe activity

use crate::types::NdState;
use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector shared by one or more cache tables
///
/// # NIST Controls
/// - SI-4: System Monitoring - Centralized metrics collection
#[derive(Clone)]
pub struct NdMetrics {
    // Counters
    pub probes_sent_total: CounterVec,
    pub resolution_failures_total: CounterVec,
    pub confirmations_total: Counter,
    pub hints_accepted_total: Counter,
    pub hints_ignored_total: Counter,
    pub held_dropped_total: Counter,
    pub entries_created_total: Counter,
    pub entries_reclaimed_total: Counter,

    // Gauges
    pub entries: Gauge,

    // Histograms
    pub flush_batch_size: Histogram,

    // Registry for export
    pub registry: Arc<Registry>,
}

impl NdMetrics {
    /// Create a new collector with its own registry
    ///
    /// # NIST Controls
    /// - AU-12: Audit Record Generation - Initialize audit metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let probes_sent_total = CounterVec::new(
            Opts::new(
                "ndcache_probes_sent_total",
                "Total number of solicitations handed to the domain",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(probes_sent_total.clone()))?;

        let resolution_failures_total = CounterVec::new(
            Opts::new(
                "ndcache_resolution_failures_total",
                "Total number of exhausted probe cycles by failing state",
            ),
            &["state"],
        )?;
        registry.register(Box::new(resolution_failures_total.clone()))?;

        let confirmations_total = Counter::with_opts(Opts::new(
            "ndcache_confirmations_total",
            "Total number of link-layer confirmations applied",
        ))?;
        registry.register(Box::new(confirmations_total.clone()))?;

        let hints_accepted_total = Counter::with_opts(Opts::new(
            "ndcache_hints_accepted_total",
            "Total number of upper-layer reachability hints accepted",
        ))?;
        registry.register(Box::new(hints_accepted_total.clone()))?;

        let hints_ignored_total = Counter::with_opts(Opts::new(
            "ndcache_hints_ignored_total",
            "Total number of upper-layer reachability hints ignored",
        ))?;
        registry.register(Box::new(hints_ignored_total.clone()))?;

        let held_dropped_total = Counter::with_opts(Opts::new(
            "ndcache_held_dropped_total",
            "Total number of held packets discarded",
        ))?;
        registry.register(Box::new(held_dropped_total.clone()))?;

        let entries_created_total = Counter::with_opts(Opts::new(
            "ndcache_entries_created_total",
            "Total number of neighbor entries created",
        ))?;
        registry.register(Box::new(entries_created_total.clone()))?;

        let entries_reclaimed_total = Counter::with_opts(Opts::new(
            "ndcache_entries_reclaimed_total",
            "Total number of neighbor entries reclaimed",
        ))?;
        registry.register(Box::new(entries_reclaimed_total.clone()))?;

        // Gauges
        let entries = Gauge::with_opts(Opts::new(
            "ndcache_entries",
            "Current number of entries linked into cache tables",
        ))?;
        registry.register(Box::new(entries.clone()))?;

        // Histograms
        let flush_batch_size = Histogram::with_opts(
            HistogramOpts::new(
                "ndcache_flush_batch_size",
                "Number of held packets released per successful resolution",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
        )?;
        registry.register(Box::new(flush_batch_size.clone()))?;

        Ok(Self {
            probes_sent_total,
            resolution_failures_total,
            confirmations_total,
            hints_accepted_total,
            hints_ignored_total,
            held_dropped_total,
            entries_created_total,
            entries_reclaimed_total,
            entries,
            flush_batch_size,
            registry: Arc::new(registry),
        })
    }

    /// Record a solicitation
    pub fn record_probe(&self, unicast: bool) {
        let kind = if unicast { "unicast" } else { "multicast" };
        self.probes_sent_total.with_label_values(&[kind]).inc();
    }

    /// Record an exhausted probe cycle
    pub fn record_resolution_failure(&self, state: NdState) {
        let label = state.to_string();
        self.resolution_failures_total
            .with_label_values(&[label.as_str()])
            .inc();
    }

    pub fn record_confirmation(&self) {
        self.confirmations_total.inc();
    }

    /// Record an upper-layer hint
    pub fn record_hint(&self, accepted: bool) {
        if accepted {
            self.hints_accepted_total.inc();
        } else {
            self.hints_ignored_total.inc();
        }
    }

    /// Record discarded held packets
    pub fn record_held_dropped(&self, count: usize) {
        if count > 0 {
            self.held_dropped_total.inc_by(count as f64);
        }
    }

    /// Record a new entry linked into a table
    pub fn record_created(&self) {
        self.entries_created_total.inc();
        self.entries.inc();
    }

    /// Record an entry unlinked from its table
    pub fn record_unlinked(&self) {
        self.entries.dec();
    }

    pub fn record_reclaimed(&self) {
        self.entries_reclaimed_total.inc();
    }

    /// Record held packets released on resolution
    pub fn observe_flush(&self, packets: usize) {
        self.flush_batch_size.observe(packets as f64);
    }
}

impl Default for NdMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create neighbor cache metrics")
    }
}
