//! Datapath configuration
//!
//! Resolved once at deployment time and immutable for the lifetime of the
//! process. Loaded from JSON, the same way the edge appliance loads its
//! configuration, and validated before anything is constructed from it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SecIdError, SecIdResult};
use crate::identity::{
    Identity, IdentityConstants, IDENTITY_SCOPE_MASK, IDENTITY_SCOPE_REMOTE_NODE,
};

/// Build/deployment-time feature switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// IPv4 datapath enabled
    pub enable_ipv4: bool,
    /// IPv6 datapath enabled
    pub enable_ipv6: bool,
    /// IPsec encryption support compiled in
    pub enable_ipsec: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_ipv4: true,
            enable_ipv6: false,
            enable_ipsec: false,
        }
    }
}

impl FeatureFlags {
    /// World identity is split per IP family only when both are enabled
    #[inline(always)]
    pub const fn dual_stack(&self) -> bool {
        self.enable_ipv4 && self.enable_ipv6
    }
}

/// Inclusive range of identities allocated to CIDR prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidrRange {
    /// First identity in the range
    pub start: Identity,
    /// Last identity in the range
    pub end: Identity,
}

impl Default for CidrRange {
    fn default() -> Self {
        Self {
            start: 0x0100_0000,
            end: 0x01FF_FFFF,
        }
    }
}

impl CidrRange {
    /// Create a range; bounds are inclusive
    pub const fn new(start: Identity, end: Identity) -> Self {
        Self { start, end }
    }

    /// Interval membership, inclusive on both ends
    #[inline(always)]
    pub const fn contains(&self, identity: Identity) -> bool {
        self.start <= identity && identity <= self.end
    }
}

/// Event channel sizing and rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Channel capacity in records
    pub capacity: usize,
    /// Records per second, 0 disables rate limiting
    pub rate_limit: u32,
    /// Burst size, defaults to `rate_limit`
    pub burst_limit: Option<u32>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            rate_limit: 0,
            burst_limit: None,
        }
    }
}

impl EventsConfig {
    /// Effective burst size
    pub fn burst(&self) -> u32 {
        self.burst_limit.unwrap_or(self.rate_limit)
    }
}

/// Complete datapath configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatapathConfig {
    /// Feature switches
    pub features: FeatureFlags,
    /// Reserved identity table
    pub identities: IdentityConstants,
    /// CIDR identity range
    pub cidr_range: CidrRange,
    /// Diagnostics channel
    pub events: EventsConfig,
}

impl DatapathConfig {
    /// Load from a JSON file and validate
    pub fn load(path: impl AsRef<Path>) -> SecIdResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), "datapath config loaded");
        Ok(config)
    }

    /// Parse from a JSON document and validate
    pub fn from_json_str(content: &str) -> SecIdResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json_pretty(&self) -> SecIdResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the constant table, threshold and CIDR range against each other
    pub fn validate(&self) -> SecIdResult<()> {
        let ids = &self.identities;
        let threshold = ids.reserved_threshold;

        for (name, value) in [
            ("unmanaged", ids.unmanaged),
            ("health", ids.health),
            ("init", ids.init),
        ] {
            if value < threshold {
                return Err(invalid(format!(
                    "{name} identity {value} is below reserved threshold {threshold}"
                )));
            }
        }

        for (name, value) in [("host", ids.host), ("world", ids.world)] {
            if value >= threshold {
                return Err(invalid(format!(
                    "{name} identity {value} must be below reserved threshold {threshold}"
                )));
            }
        }

        let named = self.checked_constants();
        for (i, (name, value)) in named.iter().enumerate() {
            if value & IDENTITY_SCOPE_MASK != 0 {
                return Err(invalid(format!(
                    "{name} identity {value:#010x} is not in the global scope"
                )));
            }
            if let Some((other, _)) = named[i + 1..].iter().find(|(_, v)| v == value) {
                return Err(invalid(format!(
                    "{name} and {other} share identity {value}"
                )));
            }
        }

        let range = self.cidr_range;
        if range.start > range.end {
            return Err(invalid(format!(
                "CIDR range start {:#x} is after end {:#x}",
                range.start, range.end
            )));
        }
        if range.start < threshold {
            return Err(invalid(format!(
                "CIDR range start {:#x} overlaps reserved identities",
                range.start
            )));
        }
        // remote-node scoped identities are reserved regardless of value
        let remote_node_end = IDENTITY_SCOPE_REMOTE_NODE | !IDENTITY_SCOPE_MASK;
        if range.start <= remote_node_end && IDENTITY_SCOPE_REMOTE_NODE <= range.end {
            return Err(invalid(format!(
                "CIDR range [{:#010x}, {:#010x}] overlaps the remote-node scope",
                range.start, range.end
            )));
        }
        if let Some((name, value)) = ids.named().iter().find(|(_, v)| range.contains(*v)) {
            return Err(invalid(format!(
                "CIDR range contains {name} identity {value}"
            )));
        }

        if self.events.capacity == 0 {
            return Err(invalid("event channel capacity must be non-zero".into()));
        }

        Ok(())
    }

    /// Constants that must be pairwise distinct. The split world identities
    /// only carry meaning in dual-stack mode.
    fn checked_constants(&self) -> Vec<(&'static str, Identity)> {
        let dual_stack = self.features.dual_stack();
        self.identities
            .named()
            .into_iter()
            .filter(|(name, _)| dual_stack || !name.starts_with("world-"))
            .collect()
    }
}

fn invalid(msg: String) -> SecIdError {
    SecIdError::InvalidConfig(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        DatapathConfig::default().validate().unwrap();
    }

    #[test]
    fn test_cidr_range_inclusive() {
        let range = CidrRange::new(1000, 2000);
        assert!(range.contains(1000));
        assert!(range.contains(1500));
        assert!(range.contains(2000));
        assert!(!range.contains(999));
        assert!(!range.contains(2001));
    }

    #[test]
    fn test_dual_stack_switch() {
        let mut flags = FeatureFlags::default();
        assert!(!flags.dual_stack());
        flags.enable_ipv6 = true;
        assert!(flags.dual_stack());
        flags.enable_ipv4 = false;
        assert!(!flags.dual_stack());
    }

    #[test]
    fn test_endpoint_identity_below_threshold_rejected() {
        let mut config = DatapathConfig::default();
        config.identities.reserved_threshold = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unmanaged"));
    }

    #[test]
    fn test_world_above_threshold_rejected() {
        let mut config = DatapathConfig::default();
        config.identities.world = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_world_only_checked_in_dual_stack() {
        let mut config = DatapathConfig::default();
        config.identities.world_ipv4 = config.identities.world_ipv6;
        config.validate().unwrap();

        config.features.enable_ipv6 = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("share identity"));
    }

    #[test]
    fn test_scoped_constant_rejected() {
        let mut config = DatapathConfig::default();
        config.identities.ingress = 0x0200_0008;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cidr_range_overlap_rejected() {
        let mut config = DatapathConfig::default();
        config.cidr_range = CidrRange::new(5, 100);
        assert!(config.validate().is_err());

        config.cidr_range = CidrRange::new(2000, 1000);
        assert!(config.validate().is_err());

        config.cidr_range = CidrRange::new(1000, 2000);
        config.validate().unwrap();
    }

    #[test]
    fn test_cidr_range_remote_node_scope_rejected() {
        let mut config = DatapathConfig::default();
        config.cidr_range = CidrRange::new(0x0100_0000, 0x0200_00FF);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("remote-node scope"));

        config.cidr_range = CidrRange::new(0x02FF_FFFF, 0x0300_0010);
        assert!(config.validate().is_err());

        // right up to the scope boundary is fine
        config.cidr_range = CidrRange::new(0x0100_0000, 0x01FF_FFFF);
        config.validate().unwrap();
        config.cidr_range = CidrRange::new(0x0300_0000, 0x03FF_FFFF);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json_defaults_and_overrides() {
        let config = DatapathConfig::from_json_str(
            r#"{
                "features": { "enable_ipv6": true, "enable_ipsec": true },
                "cidr_range": { "start": 16777216, "end": 16777471 },
                "events": { "capacity": 16, "rate_limit": 100 }
            }"#,
        )
        .unwrap();

        assert!(config.features.dual_stack());
        assert!(config.features.enable_ipsec);
        assert_eq!(config.identities, IdentityConstants::default());
        assert_eq!(config.cidr_range.end, 0x0100_00FF);
        assert_eq!(config.events.burst(), 100);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let err = DatapathConfig::from_json_str(r#"{ "events": { "capacity": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, SecIdError::InvalidConfig(_)));

        let err = DatapathConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, SecIdError::Parse(_)));
    }
}
