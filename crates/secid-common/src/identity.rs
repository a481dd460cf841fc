//! Identity values, scopes and the reserved identity table

use serde::{Deserialize, Serialize};

use crate::error::{SecIdError, SecIdResult};

/// Security identity (32 bits, top byte is the scope)
pub type Identity = u32;

/// Mask selecting the scope byte of an identity
pub const IDENTITY_SCOPE_MASK: u32 = 0xFF00_0000;

/// Scope value for globally allocated identities
pub const IDENTITY_SCOPE_GLOBAL: u32 = 0x0000_0000;

/// Scope value for locally allocated identities (CIDR identities live here)
pub const IDENTITY_SCOPE_LOCAL: u32 = 0x0100_0000;

/// Scope value for identities allocated to remote nodes
pub const IDENTITY_SCOPE_REMOTE_NODE: u32 = 0x0200_0000;

/// Allocation scope of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Cluster-wide allocation (scope byte 0x00)
    Global,
    /// Node-local allocation (scope byte 0x01)
    Local,
    /// Remote-node allocation (scope byte 0x02)
    RemoteNode,
    /// Any other non-zero scope byte
    Other(u8),
}

impl Scope {
    /// Scope of the given identity
    #[inline(always)]
    pub const fn of(identity: Identity) -> Self {
        match identity & IDENTITY_SCOPE_MASK {
            IDENTITY_SCOPE_GLOBAL => Scope::Global,
            IDENTITY_SCOPE_LOCAL => Scope::Local,
            IDENTITY_SCOPE_REMOTE_NODE => Scope::RemoteNode,
            other => Scope::Other((other >> 24) as u8),
        }
    }

    /// Scope byte
    pub const fn as_u8(self) -> u8 {
        match self {
            Scope::Global => 0x00,
            Scope::Local => 0x01,
            Scope::RemoteNode => 0x02,
            Scope::Other(b) => b,
        }
    }
}

/// Reserved identity constants
///
/// These values are the contract with the policy engine and every marker
/// producer. `reserved_threshold` is co-configured with `unmanaged`,
/// `health` and `init`: identities below it are reserved, and those three
/// must sit at or above it. See [`crate::DatapathConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConstants {
    /// Unknown identity
    pub unknown: Identity,
    /// The local host
    pub host: Identity,
    /// Anything outside the cluster (generic)
    pub world: Identity,
    /// Endpoints not managed by the agent
    pub unmanaged: Identity,
    /// Health-check endpoints
    pub health: Identity,
    /// Endpoints still being initialized
    pub init: Identity,
    /// Any remote node in the cluster
    pub remote_node: Identity,
    /// Remote node that also runs the kube-apiserver
    pub kube_apiserver_node: Identity,
    /// Ingress proxy
    pub ingress: Identity,
    /// IPv4 world, only distinct in dual-stack mode
    pub world_ipv4: Identity,
    /// IPv6 world, only distinct in dual-stack mode
    pub world_ipv6: Identity,
    /// Identities strictly below this value are reserved
    pub reserved_threshold: Identity,
}

impl Default for IdentityConstants {
    fn default() -> Self {
        Self {
            unknown: 0,
            host: 1,
            world: 2,
            unmanaged: 3,
            health: 4,
            init: 5,
            remote_node: 6,
            kube_apiserver_node: 7,
            ingress: 8,
            world_ipv4: 9,
            world_ipv6: 10,
            reserved_threshold: 3,
        }
    }
}

impl IdentityConstants {
    /// All named constants with their label, in table order
    pub fn named(&self) -> [(&'static str, Identity); 11] {
        [
            ("unknown", self.unknown),
            ("host", self.host),
            ("world", self.world),
            ("unmanaged", self.unmanaged),
            ("health", self.health),
            ("init", self.init),
            ("remote-node", self.remote_node),
            ("kube-apiserver", self.kube_apiserver_node),
            ("ingress", self.ingress),
            ("world-ipv4", self.world_ipv4),
            ("world-ipv6", self.world_ipv6),
        ]
    }

    /// Label of the reserved identity with this value, if any
    pub fn name_of(&self, identity: Identity) -> Option<&'static str> {
        self.named()
            .into_iter()
            .find(|(_, value)| *value == identity)
            .map(|(name, _)| name)
    }
}

/// Parse an identity or marker literal: decimal or `0x`-prefixed hex
pub fn parse_u32(input: &str) -> SecIdResult<u32> {
    let trimmed = input.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => trimmed.replace('_', "").parse::<u32>(),
    };
    parsed.map_err(|e| SecIdError::InvalidIdentity(format!("{trimmed:?}: {e}")))
}
