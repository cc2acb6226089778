//! Core types for the neighbor cache
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Neighbor entries as network components
//! - SI-4: System Monitoring - Neighbor state tracking for security monitoring
//! - IA-3: Device Identification - Link-layer addresses identify devices

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Longest link-layer address the cache stores (InfiniBand uses 20 octets).
pub const MAX_LINK_ADDR_LEN: usize = 20;

/// Link-layer address of a neighbor
///
/// Variable length, so the same cache serves Ethernet (6 octets) as well as
/// longer hardware address formats.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkAddr {
    len: u8,
    bytes: [u8; MAX_LINK_ADDR_LEN],
}

impl LinkAddr {
    /// Build from raw octets, `None` if empty or longer than [`MAX_LINK_ADDR_LEN`]
    pub fn new(octets: &[u8]) -> Option<Self> {
        if octets.is_empty() || octets.len() > MAX_LINK_ADDR_LEN {
            return None;
        }
        let mut bytes = [0u8; MAX_LINK_ADDR_LEN];
        bytes[..octets.len()].copy_from_slice(octets);
        Some(Self {
            len: octets.len() as u8,
            bytes,
        })
    }

    /// Ethernet MAC address
    pub const fn ethernet(mac: [u8; 6]) -> Self {
        let mut bytes = [0u8; MAX_LINK_ADDR_LEN];
        let mut i = 0;
        while i < 6 {
            bytes[i] = mac[i];
            i += 1;
        }
        Self { len: 6, bytes }
    }

    /// Raw octets of the address
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of octets
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false; a `LinkAddr` holds at least one octet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the address into a caller-owned buffer, truncating to the buffer
    /// length. Returns the number of octets written.
    pub fn copy_to(&self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        buf[..n].copy_from_slice(&self.as_bytes()[..n]);
        n
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkAddr({})", self)
    }
}

impl FromStr for LinkAddr {
    type Err = String;

    /// Parse colon-separated hex octets (e.g., "00:11:22:33:44:55")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = Vec::with_capacity(MAX_LINK_ADDR_LEN);
        for part in s.split(':') {
            let octet = u8::from_str_radix(part, 16)
                .map_err(|_| format!("Invalid hex in link address: {}", part))?;
            octets.push(octet);
        }
        Self::new(&octets).ok_or_else(|| format!("Invalid link address length: {}", s))
    }
}

impl From<[u8; 6]> for LinkAddr {
    fn from(mac: [u8; 6]) -> Self {
        Self::ethernet(mac)
    }
}

/// Address family a domain serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4 (ARP)
    Inet,
    /// IPv6 (NDP)
    Inet6,
}

impl AddressFamily {
    /// Family of a network-layer address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Inet,
            IpAddr::V6(_) => Self::Inet6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => f.write_str("inet"),
            Self::Inet6 => f.write_str("inet6"),
        }
    }
}

/// Network interface the cache table is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interface {
    /// Interface index
    pub index: u32,
    /// Interface name (e.g., "Ethernet0")
    pub name: String,
}

impl Interface {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.index)
    }
}

/// Outbound packet, opaque to the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet(Vec<u8>);

impl Packet {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

/// Packets handed across the domain boundary, oldest first
pub type PacketList = VecDeque<Packet>;

/// How the route that selected this neighbor reaches it
///
/// Decides which terminal error a resolve reports once probing is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteKind {
    /// Destination is on-link
    #[default]
    Direct,
    /// Neighbor is a gateway for the destination
    Gateway,
}

/// Neighbor reachability state
///
/// # NIST Controls
/// - SI-4: System Monitoring - Track neighbor reachability states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NdState {
    /// Entry exists but resolution has not started
    NoState,
    /// Multicast solicitations outstanding, packets held
    Incomplete,
    /// Reachability confirmed recently
    Reachable,
    /// Reachability unknown; re-verified on next use
    Stale,
    /// Waiting before the first unicast probe
    Delay,
    /// Unicast probes outstanding
    Probe,
    /// Unicast probes exhausted; retrying with backoff
    Unreachable,
    /// Externally forced re-verification
    Purge,
    /// Resolution failed; pending reclamation
    WaitDelete,
}

impl NdState {
    /// States in which a valid link-layer address may be used
    #[inline]
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            Self::Reachable | Self::Stale | Self::Delay | Self::Probe | Self::Unreachable
        )
    }

    /// Whether `self -> next` is a legal transition. Remaining in the same
    /// state is always legal.
    pub fn can_transition_to(&self, next: NdState) -> bool {
        use NdState::*;

        if *self == next {
            return true;
        }
        match (*self, next) {
            (NoState, Incomplete) => true,
            (Incomplete, Reachable | Stale | WaitDelete) => true,
            (Reachable, Stale | Purge) => true,
            (Stale, Delay | Reachable | Purge) => true,
            (Delay, Probe | Stale | Reachable | Purge) => true,
            (Probe, Reachable | Stale | Unreachable | Purge) => true,
            (Unreachable, Reachable | Stale | WaitDelete | Purge) => true,
            (Purge, Incomplete | Reachable | Stale) => true,
            (WaitDelete, Incomplete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for NdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoState => "NOSTATE",
            Self::Incomplete => "INCOMPLETE",
            Self::Reachable => "REACHABLE",
            Self::Stale => "STALE",
            Self::Delay => "DELAY",
            Self::Probe => "PROBE",
            Self::Unreachable => "UNREACHABLE",
            Self::Purge => "PURGE",
            Self::WaitDelete => "WAITDELETE",
        };
        f.write_str(s)
    }
}

/// Confirmation of a neighbor's link-layer address from the wire layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Link-layer address carried by the reply
    pub link_addr: LinkAddr,
    /// Reply answered one of our solicitations; unsolicited replies only
    /// make the entry `Stale`
    pub solicited: bool,
}

impl Confirmation {
    pub fn solicited(link_addr: LinkAddr) -> Self {
        Self {
            link_addr,
            solicited: true,
        }
    }

    pub fn unsolicited(link_addr: LinkAddr) -> Self {
        Self {
            link_addr,
            solicited: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_addr_display() {
        let mac = LinkAddr::ethernet([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(mac.to_string(), "00:11:22:33:44:55");
        assert_eq!(mac.len(), 6);
    }

    #[test]
    fn test_link_addr_parse() {
        let mac: LinkAddr = "00:11:22:33:44:55".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(mac, LinkAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]));

        assert!("00:11:zz".parse::<LinkAddr>().is_err());
        assert!(LinkAddr::new(&[]).is_none());
        assert!(LinkAddr::new(&[0u8; MAX_LINK_ADDR_LEN + 1]).is_none());
    }

    #[test]
    fn test_link_addr_copy_truncates() {
        let mac = LinkAddr::ethernet([1, 2, 3, 4, 5, 6]);
        let mut short = [0u8; 4];
        assert_eq!(mac.copy_to(&mut short), 4);
        assert_eq!(short, [1, 2, 3, 4]);

        let mut long = [0u8; 8];
        assert_eq!(mac.copy_to(&mut long), 6);
        assert_eq!(long, [1, 2, 3, 4, 5, 6, 0, 0]);
    }

    #[test]
    fn test_state_resolved() {
        assert!(NdState::Reachable.is_resolved());
        assert!(NdState::Stale.is_resolved());
        assert!(NdState::Unreachable.is_resolved());
        assert!(!NdState::Incomplete.is_resolved());
        assert!(!NdState::WaitDelete.is_resolved());
        assert!(!NdState::Purge.is_resolved());
    }

    #[test]
    fn test_state_transitions() {
        assert!(NdState::NoState.can_transition_to(NdState::Incomplete));
        assert!(NdState::Stale.can_transition_to(NdState::Delay));
        assert!(NdState::Probe.can_transition_to(NdState::Unreachable));
        assert!(NdState::WaitDelete.can_transition_to(NdState::WaitDelete));

        assert!(!NdState::WaitDelete.can_transition_to(NdState::Reachable));
        assert!(!NdState::NoState.can_transition_to(NdState::Reachable));
        assert!(!NdState::Reachable.can_transition_to(NdState::Incomplete));
        assert!(!NdState::Incomplete.can_transition_to(NdState::Probe));
    }

    #[test]
    fn test_address_family_of() {
        let v4: IpAddr = "192.0.2.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(AddressFamily::of(&v4), AddressFamily::Inet);
        assert_eq!(AddressFamily::of(&v6), AddressFamily::Inet6);
    }
}
