//! Shared fixtures for neighbor cache integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use sonic_ndcache::{
    AddressFamily, CacheTable, DomainConfig, DomainRegistry, Interface, LinkAddr, NdDomain,
    NdParams, NdState, Packet, PacketList, ReclaimedEntry,
};
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

pub const MAC: LinkAddr = LinkAddr::ethernet([0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);
pub const OTHER_MAC: LinkAddr = LinkAddr::ethernet([0x02, 0x42, 0xac, 0x11, 0x00, 0x03]);
pub const REACHABLE: Duration = Duration::from_secs(30);

pub fn source() -> IpAddr {
    IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0xfe))
}

pub fn neighbor(last: u16) -> IpAddr {
    IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, last))
}

pub fn pkt(tag: u8) -> Packet {
    Packet::new(vec![tag; 8])
}

/// Everything the cache asked the domain to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Probe {
        target: IpAddr,
        dest: Option<LinkAddr>,
        source: Option<IpAddr>,
    },
    Missed {
        target: IpAddr,
        state: NdState,
        held: Option<Vec<Packet>>,
    },
    Output {
        link_addr: LinkAddr,
        packets: Vec<Packet>,
    },
    Reclaim {
        target: IpAddr,
        state: NdState,
        held: usize,
        flush_pending: bool,
    },
    StateChanged {
        target: IpAddr,
        from: NdState,
        to: NdState,
    },
}

/// Domain that records every callback
pub struct RecordingDomain {
    events: Mutex<Vec<Event>>,
    nud_enabled: bool,
}

impl RecordingDomain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            nud_enabled: true,
        })
    }

    pub fn without_nud() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            nud_enabled: false,
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn probes(&self) -> Vec<Event> {
        self.filter(|e| matches!(e, Event::Probe { .. }))
    }

    pub fn missed(&self) -> Vec<Event> {
        self.filter(|e| matches!(e, Event::Missed { .. }))
    }

    pub fn outputs(&self) -> Vec<Event> {
        self.filter(|e| matches!(e, Event::Output { .. }))
    }

    pub fn reclaims(&self) -> Vec<Event> {
        self.filter(|e| matches!(e, Event::Reclaim { .. }))
    }

    pub fn transitions(&self) -> Vec<(NdState, NdState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::StateChanged { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    fn filter(&self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.events.lock().iter().filter(|e| pred(e)).cloned().collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl NdDomain for RecordingDomain {
    fn reachable_interval(&self, _ifp: &Interface, _params: &NdParams) -> Duration {
        REACHABLE
    }

    fn nud_enabled(&self, _ifp: &Interface) -> bool {
        self.nud_enabled
    }

    fn send_probe(
        &self,
        _ifp: &Interface,
        target: &IpAddr,
        unicast_dest: Option<LinkAddr>,
        source: Option<IpAddr>,
    ) {
        self.push(Event::Probe {
            target: *target,
            dest: unicast_dest,
            source,
        });
    }

    fn select_source(&self, _ifp: &Interface, _target: &IpAddr, held: &PacketList) -> Option<IpAddr> {
        held.front().map(|_| source())
    }

    fn notify_missed(
        &self,
        _ifp: &Interface,
        target: &IpAddr,
        failed_state: NdState,
        held: Option<PacketList>,
    ) {
        self.push(Event::Missed {
            target: *target,
            state: failed_state,
            held: held.map(|packets| packets.into_iter().collect()),
        });
    }

    fn output(&self, _ifp: &Interface, link_addr: &LinkAddr, packets: PacketList) {
        self.push(Event::Output {
            link_addr: *link_addr,
            packets: packets.into_iter().collect(),
        });
    }

    fn reclaim(&self, _ifp: &Interface, entry: ReclaimedEntry, flush_pending: bool) {
        self.push(Event::Reclaim {
            target: entry.target,
            state: entry.state,
            held: entry.held.len(),
            flush_pending,
        });
    }

    fn state_changed(&self, _ifp: &Interface, target: &IpAddr, from: NdState, to: NdState) {
        self.push(Event::StateChanged {
            target: *target,
            from,
            to,
        });
    }
}

/// IPv6 table on Ethernet0 backed by a fresh recording domain
pub fn setup(params: NdParams) -> (Arc<CacheTable>, Arc<RecordingDomain>) {
    setup_with(params, RecordingDomain::new())
}

pub fn setup_with(
    params: NdParams,
    recorder: Arc<RecordingDomain>,
) -> (Arc<CacheTable>, Arc<RecordingDomain>) {
    init_tracing();
    let mut registry = DomainRegistry::new();
    let domain = registry.register_domain(
        AddressFamily::Inet6,
        DomainConfig::new(params, Arc::clone(&recorder) as Arc<dyn NdDomain>),
    );
    let table = CacheTable::new(domain, Interface::new(1, "Ethernet0")).expect("table");
    (table, recorder)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
