//! Neighbor discovery parameters
//!
//! Per-family policy knobs, loadable from a TOML file. Every field has a
//! default, so a file only needs to name what it overrides:
//!
//! ```toml
//! [inet6]
//! retrans_interval_ms = 1000
//! max_multicast_probes = 3
//!
//! [inet]
//! max_queue_length = 1
//! ```
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-6: Configuration Settings - Validated, documented defaults
//! - SC-5: Denial of Service Protection - Bounded hold queue and probe budget

use crate::error::{NdError, Result};
use crate::types::AddressFamily;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/ndcache.conf";

/// Longest delay the timer engine schedules; later deadlines are clamped.
pub const MAX_TIMER_DELAY: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Policy parameters for one address family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdParams {
    /// Interval between solicitations (RetransTimer)
    #[serde(default = "default_retrans_interval_ms")]
    pub retrans_interval_ms: u64,

    /// Base reachable time (BaseReachableTime)
    #[serde(default = "default_reachable_time_ms")]
    pub reachable_time_ms: u64,

    /// Lower bound of the reachable-time jitter factor
    #[serde(default = "default_min_random_factor")]
    pub min_random_factor: f64,

    /// Upper bound of the reachable-time jitter factor
    #[serde(default = "default_max_random_factor")]
    pub max_random_factor: f64,

    /// Time spent in DELAY before the first unicast probe
    #[serde(default = "default_delay_first_probe_secs")]
    pub delay_first_probe_secs: u64,

    /// Idle lifetime of a STALE entry before it is collected
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,

    /// Multicast solicitations sent while INCOMPLETE
    #[serde(default = "default_max_multicast_probes")]
    pub max_multicast_probes: u32,

    /// Unicast probes sent while PROBE or UNREACHABLE
    #[serde(default = "default_max_unicast_probes")]
    pub max_unicast_probes: u32,

    /// Retransmit interval multiplier once probing fails
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Cap on the backed-off retransmit interval
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Packets held per unresolved neighbor
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,

    /// Upper-layer reachability hints accepted between confirmations
    #[serde(default = "default_max_nud_hint")]
    pub max_nud_hint: u32,

    /// Table size that triggers collection of stale entries (0 disables)
    #[serde(default = "default_gc_threshold")]
    pub gc_threshold: usize,
}

fn default_retrans_interval_ms() -> u64 {
    1000
}

fn default_reachable_time_ms() -> u64 {
    30_000
}

fn default_min_random_factor() -> f64 {
    0.5
}

fn default_max_random_factor() -> f64 {
    1.5
}

fn default_delay_first_probe_secs() -> u64 {
    5
}

fn default_gc_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_multicast_probes() -> u32 {
    3
}

fn default_max_unicast_probes() -> u32 {
    3
}

fn default_backoff_multiplier() -> u32 {
    3
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_max_queue_length() -> usize {
    16
}

fn default_max_nud_hint() -> u32 {
    0
}

fn default_gc_threshold() -> usize {
    2048
}

impl Default for NdParams {
    fn default() -> Self {
        Self {
            retrans_interval_ms: default_retrans_interval_ms(),
            reachable_time_ms: default_reachable_time_ms(),
            min_random_factor: default_min_random_factor(),
            max_random_factor: default_max_random_factor(),
            delay_first_probe_secs: default_delay_first_probe_secs(),
            gc_interval_secs: default_gc_interval_secs(),
            max_multicast_probes: default_max_multicast_probes(),
            max_unicast_probes: default_max_unicast_probes(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            max_queue_length: default_max_queue_length(),
            max_nud_hint: default_max_nud_hint(),
            gc_threshold: default_gc_threshold(),
        }
    }
}

impl NdParams {
    /// Get retransmit interval as Duration
    pub fn retrans_interval(&self) -> Duration {
        Duration::from_millis(self.retrans_interval_ms)
    }

    /// Get base reachable time as Duration
    pub fn reachable_time(&self) -> Duration {
        Duration::from_millis(self.reachable_time_ms)
    }

    /// Get DELAY state duration
    pub fn delay_first_probe(&self) -> Duration {
        Duration::from_secs(self.delay_first_probe_secs)
    }

    /// Get STALE entry lifetime
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    /// Get backoff cap as Duration
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Base reachable time scaled by a random factor from the configured band,
    /// so that neighbors learned together do not expire together.
    pub fn randomized_reachable_time(&self) -> Duration {
        let factor = rand::thread_rng().gen_range(self.min_random_factor..=self.max_random_factor);
        self.reachable_time().mul_f64(factor)
    }

    /// `retrans * multiplier^attempts`, saturating, capped at `max_backoff`
    /// and never shorter than `retrans`.
    pub fn backoff_interval(&self, retrans: Duration, attempts: u32) -> Duration {
        let cap = self.max_backoff().max(retrans);
        let mut delay = retrans;
        for _ in 0..attempts {
            delay = delay.saturating_mul(self.backoff_multiplier);
            if delay >= cap {
                return cap;
            }
        }
        delay
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if self.retrans_interval_ms == 0 {
            return Err(NdError::Config(
                "retrans_interval_ms must be > 0".to_string(),
            ));
        }

        if self.max_queue_length == 0 {
            return Err(NdError::Config("max_queue_length must be > 0".to_string()));
        }

        if self.max_multicast_probes == 0 || self.max_unicast_probes == 0 {
            return Err(NdError::Config(
                "max_multicast_probes and max_unicast_probes must be > 0".to_string(),
            ));
        }

        if self.backoff_multiplier == 0 {
            return Err(NdError::Config(
                "backoff_multiplier must be >= 1".to_string(),
            ));
        }

        if self.max_backoff_ms < self.retrans_interval_ms {
            return Err(NdError::Config(format!(
                "max_backoff_ms ({}) must be >= retrans_interval_ms ({})",
                self.max_backoff_ms, self.retrans_interval_ms
            )));
        }

        if !(self.min_random_factor > 0.0 && self.min_random_factor <= self.max_random_factor) {
            return Err(NdError::Config(format!(
                "invalid reachable jitter band [{}, {}]",
                self.min_random_factor, self.max_random_factor
            )));
        }

        Ok(())
    }
}

/// Parameters for every supported family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NdConfig {
    /// IPv4 (ARP) parameters
    #[serde(default)]
    pub inet: NdParams,

    /// IPv6 (NDP) parameters
    #[serde(default)]
    pub inet6: NdParams,
}

impl NdConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                info!(path = %path.display(), "Loaded neighbor cache configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(NdError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NdError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Parameters for one family
    pub fn params(&self, family: AddressFamily) -> &NdParams {
        match family {
            AddressFamily::Inet => &self.inet,
            AddressFamily::Inet6 => &self.inet6,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.inet
            .validate()
            .map_err(|e| NdError::Config(format!("[inet] {}", e)))?;
        self.inet6
            .validate()
            .map_err(|e| NdError::Config(format!("[inet6] {}", e)))?;
        Ok(())
    }
}
