//! Resolver Statistics
//!
//! Lock-free per-branch counters for origin resolution.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::resolver::Origin;

/// Per-branch counters (cache-line aligned)
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct ResolverStats {
    /// Ingress proxy markers
    pub ingress_proxy: AtomicU64,
    /// Egress proxy markers
    pub egress_proxy: AtomicU64,
    /// Identity markers
    pub identity: AtomicU64,
    /// Host markers
    pub host: AtomicU64,
    /// Encryption markers honored
    pub encrypted: AtomicU64,
    /// Fell through to a world identity
    pub world: AtomicU64,
    /// Diagnostic records the sink refused
    pub events_dropped: AtomicU64,
}

impl ResolverStats {
    /// Count one resolution
    #[inline(always)]
    pub fn record(&self, origin: Origin) {
        let counter = match origin {
            Origin::IngressProxy => &self.ingress_proxy,
            Origin::EgressProxy => &self.egress_proxy,
            Origin::Identity => &self.identity,
            Origin::Host => &self.host,
            Origin::Encrypted => &self.encrypted,
            Origin::World => &self.world,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one refused diagnostic record
    #[inline(always)]
    pub fn record_event_drop(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> ResolverStatsSnapshot {
        ResolverStatsSnapshot {
            ingress_proxy: self.ingress_proxy.load(Ordering::Relaxed),
            egress_proxy: self.egress_proxy.load(Ordering::Relaxed),
            identity: self.identity.load(Ordering::Relaxed),
            host: self.host.load(Ordering::Relaxed),
            encrypted: self.encrypted.load(Ordering::Relaxed),
            world: self.world.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Stats snapshot (non-atomic); fields mirror [`ResolverStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct ResolverStatsSnapshot {
    pub ingress_proxy: u64,
    pub egress_proxy: u64,
    pub identity: u64,
    pub host: u64,
    pub encrypted: u64,
    pub world: u64,
    pub events_dropped: u64,
}

impl ResolverStatsSnapshot {
    /// Packets resolved across all branches
    pub fn total(&self) -> u64 {
        self.ingress_proxy + self.egress_proxy + self.identity + self.host + self.encrypted + self.world
    }

    /// Share of packets that arrived without a recognized marker
    pub fn world_ratio(&self) -> f64 {
        let total = self.total();
        if total == 0 { return 0.0; }
        self.world as f64 / total as f64
    }
}
