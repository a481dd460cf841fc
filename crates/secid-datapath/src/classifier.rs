//! Identity Classifier
//!
//! Pure O(1) predicates over a 32-bit identity. Each predicate answers one
//! question; callers combine them. `is_cluster` and `is_reserved` are not
//! mutually exclusive (the host is both).

use secid_common::identity::{IDENTITY_SCOPE_MASK, IDENTITY_SCOPE_REMOTE_NODE};
use secid_common::{
    CidrRange, DatapathConfig, FeatureFlags, Identity, IdentityConstants, ETH_P_IP, ETH_P_IPV6,
};
use serde::Serialize;

/// World identity layout, decided once from the feature switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldMode {
    /// Single-stack: one generic world identity
    Generic {
        /// Generic world
        world: Identity,
    },
    /// Dual-stack: world split per IP family, generic still recognized
    DualStack {
        /// Generic world
        world: Identity,
        /// IPv4 world
        ipv4: Identity,
        /// IPv6 world
        ipv6: Identity,
    },
}

impl WorldMode {
    /// Resolve from feature switches and the constant table
    pub fn new(features: &FeatureFlags, ids: &IdentityConstants) -> Self {
        if features.dual_stack() {
            WorldMode::DualStack {
                world: ids.world,
                ipv4: ids.world_ipv4,
                ipv6: ids.world_ipv6,
            }
        } else {
            WorldMode::Generic { world: ids.world }
        }
    }

    /// Matches any configured world variant
    #[inline(always)]
    pub fn is_world(&self, identity: Identity) -> bool {
        match *self {
            WorldMode::Generic { world } => identity == world,
            WorldMode::DualStack { world, ipv4, ipv6 } => {
                identity == world || identity == ipv4 || identity == ipv6
            }
        }
    }

    /// Matches one of the split identities (never the generic one)
    #[inline(always)]
    pub fn is_split_world(&self, identity: Identity) -> bool {
        match *self {
            WorldMode::Generic { .. } => false,
            WorldMode::DualStack { ipv4, ipv6, .. } => identity == ipv4 || identity == ipv6,
        }
    }

    /// Generic world or the IPv4 world
    #[inline(always)]
    pub fn is_world_ipv4(&self, identity: Identity) -> bool {
        match *self {
            WorldMode::Generic { world } => identity == world,
            WorldMode::DualStack { world, ipv4, .. } => identity == world || identity == ipv4,
        }
    }

    /// Generic world or the IPv6 world
    #[inline(always)]
    pub fn is_world_ipv6(&self, identity: Identity) -> bool {
        match *self {
            WorldMode::Generic { world } => identity == world,
            WorldMode::DualStack { world, ipv6, .. } => identity == world || identity == ipv6,
        }
    }

    /// World identity for unmarked traffic of the given EtherType
    #[inline(always)]
    pub fn for_protocol(&self, protocol: u16) -> Identity {
        match *self {
            WorldMode::Generic { world } => world,
            WorldMode::DualStack { world, ipv4, ipv6 } => match protocol {
                ETH_P_IP => ipv4,
                ETH_P_IPV6 => ipv6,
                _ => world,
            },
        }
    }
}

/// Primary category of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityScope {
    /// The local host
    Host,
    /// A remote node
    RemoteNode,
    /// The remote node running the kube-apiserver
    KubeApiServerNode,
    /// Generic world
    WorldGeneric,
    /// IPv4 world (dual-stack)
    WorldIpv4,
    /// IPv6 world (dual-stack)
    WorldIpv6,
    /// Identity allocated to a CIDR prefix
    CidrRange,
    /// Reserved, below the threshold
    Reserved,
    /// Locally allocated, outside the CIDR range
    Local,
    /// Any other identity inside the cluster
    ClusterMember,
}

/// Every predicate answer for one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IdentityClassSet {
    /// [`IdentityClassifier::is_host`]
    pub host: bool,
    /// [`IdentityClassifier::is_remote_node`]
    pub remote_node: bool,
    /// [`IdentityClassifier::is_node`]
    pub node: bool,
    /// [`IdentityClassifier::is_reserved`]
    pub reserved: bool,
    /// [`IdentityClassifier::is_world_ipv4`]
    pub world_ipv4: bool,
    /// [`IdentityClassifier::is_world_ipv6`]
    pub world_ipv6: bool,
    /// [`IdentityClassifier::is_cidr_range`]
    pub cidr_range: bool,
    /// [`IdentityClassifier::is_cluster`]
    pub cluster: bool,
    /// [`IdentityClassifier::is_local`]
    pub local: bool,
}

/// Identity classifier
///
/// Holds the constant table, CIDR range and world layout. Cheap to copy;
/// every worker can own one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityClassifier {
    ids: IdentityConstants,
    cidr: CidrRange,
    world: WorldMode,
}

impl IdentityClassifier {
    /// Build from a datapath configuration
    pub fn new(config: &DatapathConfig) -> Self {
        Self::from_parts(&config.features, config.identities, config.cidr_range)
    }

    /// Build from individual parts
    pub fn from_parts(features: &FeatureFlags, ids: IdentityConstants, cidr: CidrRange) -> Self {
        Self {
            world: WorldMode::new(features, &ids),
            ids,
            cidr,
        }
    }

    /// Constant table in use
    pub fn constants(&self) -> &IdentityConstants {
        &self.ids
    }

    /// World layout in use
    pub fn world_mode(&self) -> WorldMode {
        self.world
    }

    /// CIDR range in use
    pub fn cidr_range(&self) -> CidrRange {
        self.cidr
    }

    /// The local host
    #[inline(always)]
    pub fn is_host(&self, identity: Identity) -> bool {
        identity == self.ids.host
    }

    /// Remote node by legacy constant, kube-apiserver constant, or scope.
    ///
    /// The kube-apiserver identity carries both the remote-node and
    /// kube-apiserver labels, so routing treats it as a remote node. Policy
    /// for the apiserver is enforced separately and does not depend on this.
    #[inline(always)]
    pub fn is_remote_node(&self, identity: Identity) -> bool {
        identity == self.ids.remote_node
            || identity == self.ids.kube_apiserver_node
            || identity & IDENTITY_SCOPE_MASK == IDENTITY_SCOPE_REMOTE_NODE
    }

    /// Host or any remote node
    #[inline(always)]
    pub fn is_node(&self, identity: Identity) -> bool {
        self.is_host(identity) || self.is_remote_node(identity)
    }

    /// Reserved identities are never handed out to endpoints.
    ///
    /// True for unknown, host, world (all variants in dual-stack), remote
    /// node and kube-apiserver. Unmanaged, health and init are endpoint
    /// identities and sit at or above the threshold.
    #[inline(always)]
    pub fn is_reserved(&self, identity: Identity) -> bool {
        identity < self.ids.reserved_threshold
            || self.is_remote_node(identity)
            || self.world.is_split_world(identity)
    }

    /// Generic world, or the IPv4 world in dual-stack mode
    #[inline(always)]
    pub fn is_world_ipv4(&self, identity: Identity) -> bool {
        self.world.is_world_ipv4(identity)
    }

    /// Generic world, or the IPv6 world in dual-stack mode
    #[inline(always)]
    pub fn is_world_ipv6(&self, identity: Identity) -> bool {
        self.world.is_world_ipv6(identity)
    }

    /// Inside the configured CIDR identity range (inclusive)
    #[inline(always)]
    pub fn is_cidr_range(&self, identity: Identity) -> bool {
        self.cidr.contains(identity)
    }

    /// Inside the cluster: anything that is neither world nor a CIDR identity.
    #[inline(always)]
    pub fn is_cluster(&self, identity: Identity) -> bool {
        !self.world.is_world(identity) && !self.is_cidr_range(identity)
    }

    /// Locally allocated: any non-global scope byte
    #[inline(always)]
    pub fn is_local(&self, identity: Identity) -> bool {
        identity & IDENTITY_SCOPE_MASK != 0
    }

    /// World identity for unmarked traffic of the given EtherType
    #[inline(always)]
    pub fn world_for_protocol(&self, protocol: u16) -> Identity {
        self.world.for_protocol(protocol)
    }

    /// Primary category, first match wins
    pub fn classify(&self, identity: Identity) -> IdentityScope {
        if self.is_host(identity) {
            return IdentityScope::Host;
        }
        if identity == self.ids.kube_apiserver_node {
            return IdentityScope::KubeApiServerNode;
        }
        if self.is_remote_node(identity) {
            return IdentityScope::RemoteNode;
        }
        match self.world {
            WorldMode::Generic { world } | WorldMode::DualStack { world, .. }
                if identity == world =>
            {
                return IdentityScope::WorldGeneric;
            }
            WorldMode::DualStack { ipv4, .. } if identity == ipv4 => {
                return IdentityScope::WorldIpv4;
            }
            WorldMode::DualStack { ipv6, .. } if identity == ipv6 => {
                return IdentityScope::WorldIpv6;
            }
            _ => {}
        }
        if self.is_cidr_range(identity) {
            IdentityScope::CidrRange
        } else if identity < self.ids.reserved_threshold {
            IdentityScope::Reserved
        } else if self.is_local(identity) {
            IdentityScope::Local
        } else {
            IdentityScope::ClusterMember
        }
    }

    /// All predicate answers at once
    pub fn classes(&self, identity: Identity) -> IdentityClassSet {
        IdentityClassSet {
            host: self.is_host(identity),
            remote_node: self.is_remote_node(identity),
            node: self.is_node(identity),
            reserved: self.is_reserved(identity),
            world_ipv4: self.is_world_ipv4(identity),
            world_ipv6: self.is_world_ipv6(identity),
            cidr_range: self.is_cidr_range(identity),
            cluster: self.is_cluster(identity),
            local: self.is_local(identity),
        }
    }
}

impl Default for IdentityClassifier {
    fn default() -> Self {
        Self::new(&DatapathConfig::default())
    }
}
