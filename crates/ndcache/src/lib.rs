//! Neighbor Cache for SONiC
//!
//! Protocol-independent neighbor resolution cache with Neighbor
//! Unreachability Detection. One [`CacheTable`] per interface and address
//! family maps network-layer addresses to link-layer addresses; the address
//! family layer (ARP for IPv4, NDP for IPv6) plugs in through [`NdDomain`]
//! and does all packet construction.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//!
//! | Control | Description | Implementation |
//! |---------|-------------|----------------|
//! | AU-12 | Audit Record Generation | State changes and failures logged |
//! | CM-6 | Configuration Settings | Per-family TOML parameters |
//! | CM-8 | System Component Inventory | Track network neighbors |
//! | IA-3 | Device Identification | Link-layer address tracking |
//! | SC-5 | DoS Protection | Bounded hold queues, probe budgets, GC threshold |
//! | SI-4 | System Monitoring | Reachability state machine and metrics |
//! | SI-11 | Error Handling | Structured error types |
//!
//! # Architecture
//!
//! ```text
//!  packet path                      wire layer (ARP / NDP)
//!      │ resolve()                        │ confirm()
//!      ▼                                  ▼
//! ┌──────────────┐   lookup    ┌───────────────────┐
//! │  CacheTable  │────────────▶│  NeighborEntry    │◀──── timer task
//! │  (per ifp)   │             │  state machine    │      (tokio)
//! └──────────────┘             └─────────┬─────────┘
//!                                        │ send_probe / notify_missed /
//!                                        │ output / reclaim
//!                                        ▼
//!                               ┌───────────────────┐
//!                               │  NdDomain (family)│
//!                               └───────────────────┘
//! ```

pub mod config;
pub mod domain;
pub mod entry;
pub mod error;
pub mod metrics;
pub mod nud;
pub mod table;
pub mod timer;
pub mod types;

pub use config::{DEFAULT_CONFIG_PATH, NdConfig, NdParams};
pub use domain::{Domain, DomainConfig, DomainRegistry, NdDomain};
pub use entry::{EntrySnapshot, NeighborEntry, ReclaimedEntry, SharedEntry};
pub use error::{NdError, ResolveError, Result};
pub use metrics::NdMetrics;
pub use nud::{Resolved, nud_hint};
pub use table::CacheTable;
pub use timer::TimerKind;
pub use types::{
    AddressFamily, Confirmation, Interface, LinkAddr, NdState, Packet, PacketList, RouteKind,
};
