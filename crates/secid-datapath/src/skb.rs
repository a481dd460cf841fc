//! Per-packet socket-buffer metadata
//!
//! The subset of packet metadata the identity stage reads and writes. Only
//! contexts that carry a mutable socket buffer have one; contexts without it
//! (e.g. XDP) never run origin resolution.
//!
//! A packet's metadata is owned by exactly one worker at a time and is
//! passed by `&mut` through the stages.

use serde::Serialize;
use std::ops::{BitOr, BitOrAssign};

use crate::marker::{MarkMagic, PacketMarker};
use secid_common::Identity;

/// Number of 32-bit control-block scratch slots
pub const CB_SLOTS: usize = 5;

/// Control-block slot holding the source identity
pub const CB_SRC_LABEL: usize = 0;
/// Control-block slot holding the ingress ifindex
pub const CB_IFINDEX: usize = 1;
/// Encryption identity, aliases `CB_IFINDEX` (never live at the same time)
pub const CB_ENCRYPT_IDENTITY: usize = CB_IFINDEX;

/// Provenance bits carried in `tc_index`
///
/// Stages only ever OR bits in; nothing in the identity stage clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(transparent)]
pub struct ProvenanceFlags(u16);

impl ProvenanceFlags {
    /// No provenance recorded
    pub const EMPTY: Self = Self(0);
    /// Re-injected by the ingress proxy; skip ingress redirection
    pub const FROM_INGRESS_PROXY: Self = Self(0x0001);
    /// Returned from the egress proxy; skip egress redirection
    pub const FROM_EGRESS_PROXY: Self = Self(0x0002);
    /// Skip nodeport handling
    pub const SKIP_NODEPORT: Self = Self(0x0004);
    /// Skip the host firewall
    pub const SKIP_HOST_FIREWALL: Self = Self(0x0010);

    /// Flags from raw `tc_index` bits
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// All bits of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// OR in `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// No bits set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ProvenanceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProvenanceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Socket-buffer metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkbMeta {
    /// Marker word set by upstream producers
    pub mark: u32,
    /// Provenance flags
    pub tc_index: ProvenanceFlags,
    /// Network-layer protocol (EtherType, host byte order)
    pub protocol: u16,
    /// Control-block scratch slots
    pub cb: [u32; CB_SLOTS],
}

impl SkbMeta {
    /// Metadata for a packet of the given EtherType
    pub fn new(protocol: u16) -> Self {
        Self {
            protocol,
            ..Default::default()
        }
    }

    /// Builder: set the marker word
    pub fn with_mark(mut self, marker: PacketMarker) -> Self {
        self.mark = marker.raw();
        self
    }

    /// Builder: set a control-block slot
    pub fn with_meta(mut self, slot: usize, value: u32) -> Self {
        self.store_meta(slot, value);
        self
    }

    /// Marker word as a [`PacketMarker`]
    #[inline(always)]
    pub fn marker(&self) -> PacketMarker {
        PacketMarker::new(self.mark)
    }

    /// Write an identity-bearing marker (what the proxy and tunnel
    /// producers do before handing the packet on)
    pub fn set_identity_mark(&mut self, magic: MarkMagic, identity: Identity) {
        self.mark = PacketMarker::with_identity(magic, identity).raw();
    }

    /// Read a control-block slot. Out-of-range slots read as zero.
    #[inline(always)]
    pub fn load_meta(&self, slot: usize) -> u32 {
        self.cb.get(slot).copied().unwrap_or(0)
    }

    /// Write a control-block slot. Out-of-range slots are ignored.
    #[inline(always)]
    pub fn store_meta(&mut self, slot: usize, value: u32) {
        if let Some(entry) = self.cb.get_mut(slot) {
            *entry = value;
        }
    }
}
