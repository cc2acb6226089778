//! Per-address-family domain interface
//!
//! A domain bundles the policy parameters of one address family with the
//! callbacks that put probes on the wire and report failures. The cache
//! itself never builds packets; everything protocol specific lives behind
//! [`NdDomain`].
//!
//! Domains are registered once at stack initialization into a
//! [`DomainRegistry`], which is then handed to every [`CacheTable`] that needs
//! one. Registration is not a runtime event: registering a family twice, or
//! asking for one that was never registered, is a bug and panics.
//!
//! [`CacheTable`]: crate::table::CacheTable

use crate::config::NdParams;
use crate::entry::ReclaimedEntry;
use crate::types::{AddressFamily, Interface, LinkAddr, NdState, PacketList};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Callbacks supplied by the address-family layer
///
/// Methods that receive packets take them by value; the cache gives up
/// ownership and never touches them again. All methods except the interval
/// getters and [`select_source`](NdDomain::select_source) are invoked without
/// any cache lock held, so they may call back into the table.
#[cfg_attr(test, mockall::automock)]
pub trait NdDomain: Send + Sync {
    /// Retransmit interval for solicitations on `ifp`
    fn retrans_interval(&self, _ifp: &Interface, params: &NdParams) -> Duration {
        params.retrans_interval()
    }

    /// Time a confirmed entry stays `Reachable`; may differ on every call
    fn reachable_interval(&self, _ifp: &Interface, params: &NdParams) -> Duration {
        params.randomized_reachable_time()
    }

    /// Time spent in `Delay` before unicast probing starts
    fn delay_interval(&self, _ifp: &Interface, params: &NdParams) -> Duration {
        params.delay_first_probe()
    }

    /// Whether unreachability detection runs on `ifp`
    fn nud_enabled(&self, _ifp: &Interface) -> bool {
        true
    }

    /// Transmit a solicitation for `target`. Multicast when `unicast_dest` is
    /// `None`. Best effort: failures are indistinguishable from silence.
    fn send_probe(
        &self,
        ifp: &Interface,
        target: &IpAddr,
        unicast_dest: Option<LinkAddr>,
        source: Option<IpAddr>,
    );

    /// Source address for the next solicitation to `target`, typically taken
    /// from the oldest held packet. Called with the entry lock held; must not
    /// call back into the cache.
    fn select_source(&self, _ifp: &Interface, _target: &IpAddr, _held: &PacketList) -> Option<IpAddr> {
        None
    }

    /// Resolution of `target` failed in `failed_state`
    fn notify_missed(
        &self,
        ifp: &Interface,
        target: &IpAddr,
        failed_state: NdState,
        held: Option<PacketList>,
    );

    /// Deliver packets that were held until `link_addr` became known
    fn output(&self, ifp: &Interface, link_addr: &LinkAddr, packets: PacketList);

    /// Final teardown of an entry, once its last reference is gone
    fn reclaim(&self, ifp: &Interface, entry: ReclaimedEntry, flush_pending: bool);

    /// Observer for state changes
    fn state_changed(&self, _ifp: &Interface, _target: &IpAddr, _from: NdState, _to: NdState) {}
}

/// Registration record for one family
#[derive(Clone)]
pub struct DomainConfig {
    pub params: NdParams,
    pub ops: Arc<dyn NdDomain>,
}

impl DomainConfig {
    pub fn new(params: NdParams, ops: Arc<dyn NdDomain>) -> Self {
        Self { params, ops }
    }
}

/// A registered domain, shared read-only by every table of its family
pub struct Domain {
    family: AddressFamily,
    params: NdParams,
    ops: Arc<dyn NdDomain>,
}

impl Domain {
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn params(&self) -> &NdParams {
        &self.params
    }

    pub fn ops(&self) -> &dyn NdDomain {
        self.ops.as_ref()
    }

    pub(crate) fn retrans_interval(&self, ifp: &Interface) -> Duration {
        self.ops.retrans_interval(ifp, &self.params)
    }

    pub(crate) fn reachable_interval(&self, ifp: &Interface) -> Duration {
        self.ops.reachable_interval(ifp, &self.params)
    }

    pub(crate) fn delay_interval(&self, ifp: &Interface) -> Duration {
        self.ops.delay_interval(ifp, &self.params)
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("family", &self.family)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Domains by family, built once during stack initialization
#[derive(Debug, Default)]
pub struct DomainRegistry {
    domains: HashMap<AddressFamily, Arc<Domain>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the domain for `family`.
    ///
    /// # Panics
    ///
    /// If `family` is already registered or `config.params` does not validate.
    pub fn register_domain(&mut self, family: AddressFamily, config: DomainConfig) -> Arc<Domain> {
        assert!(
            !self.domains.contains_key(&family),
            "neighbor domain for {} registered twice",
            family
        );
        if let Err(e) = config.params.validate() {
            panic!("invalid parameters for {} neighbor domain: {}", family, e);
        }

        let domain = Arc::new(Domain {
            family,
            params: config.params,
            ops: config.ops,
        });
        self.domains.insert(family, Arc::clone(&domain));
        info!(%family, params = ?domain.params, "Registered neighbor domain");
        domain
    }

    /// Domain for `family`.
    ///
    /// # Panics
    ///
    /// If `family` was never registered.
    pub fn domain(&self, family: AddressFamily) -> Arc<Domain> {
        match self.domains.get(&family) {
            Some(domain) => Arc::clone(domain),
            None => panic!("neighbor domain for {} used before registration", family),
        }
    }

    pub fn is_registered(&self, family: AddressFamily) -> bool {
        self.domains.contains_key(&family)
    }
}
