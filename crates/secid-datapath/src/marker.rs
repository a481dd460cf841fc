//! Packet marker word
//!
//! The marker is the 32-bit metadata word upstream producers attach to a
//! packet. Its layout is a fixed protocol; changing any offset or selector
//! value is a breaking change for every producer.
//!
//! | Bits  | Mask         | Field                                      |
//! |-------|--------------|--------------------------------------------|
//! | 0-7   | `0x000000FF` | identity bits 16-23 (identity selectors)   |
//! | 8-11  | `0x00000F00` | magic selector                             |
//! | 12-15 | `0x0000F000` | not interpreted here                       |
//! | 16-31 | `0xFFFF0000` | identity bits 0-15 (identity selectors)    |
//!
//! Only 24 identity bits fit, so the scope byte of an embedded identity is
//! always zero on decode.

use secid_common::Identity;
use serde::Serialize;

/// Selector bits of the marker word
pub const MARK_MAGIC_HOST_MASK: u32 = 0x0F00;
/// Packet re-injected by the ingress proxy
pub const MARK_MAGIC_PROXY_INGRESS: u32 = 0x0A00;
/// Packet returned from the egress proxy
pub const MARK_MAGIC_PROXY_EGRESS: u32 = 0x0B00;
/// Packet originated from the local host
pub const MARK_MAGIC_HOST: u32 = 0x0C00;
/// Packet was decrypted (not an origin marker)
pub const MARK_MAGIC_DECRYPT: u32 = 0x0D00;
/// Packet is to be encrypted; identity travels in the control block
pub const MARK_MAGIC_ENCRYPT: u32 = 0x0E00;
/// Packet carries an identity in the marker word
pub const MARK_MAGIC_IDENTITY: u32 = 0x0F00;

const IDENTITY_LOW_SHIFT: u32 = 16;
const IDENTITY_LOW_MASK: u32 = 0xFFFF;
const IDENTITY_HIGH_MASK: u32 = 0xFF;
const IDENTITY_HIGH_SHIFT: u32 = 16;

/// Largest identity that survives a round trip through the marker word
pub const MAX_MARKER_IDENTITY: Identity = 0x00FF_FFFF;

/// Decoded magic selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkMagic {
    /// From the ingress proxy
    ProxyIngress,
    /// From the egress proxy
    ProxyEgress,
    /// From the local host
    Host,
    /// Decrypted packet
    Decrypt,
    /// Encryption pending
    Encrypt,
    /// Identity-bearing
    Identity,
    /// Any other selector value, including zero
    Other(u32),
}

impl MarkMagic {
    /// Decode the selector of a raw marker word
    #[inline(always)]
    pub const fn from_mark(mark: u32) -> Self {
        match mark & MARK_MAGIC_HOST_MASK {
            MARK_MAGIC_PROXY_INGRESS => MarkMagic::ProxyIngress,
            MARK_MAGIC_PROXY_EGRESS => MarkMagic::ProxyEgress,
            MARK_MAGIC_HOST => MarkMagic::Host,
            MARK_MAGIC_DECRYPT => MarkMagic::Decrypt,
            MARK_MAGIC_ENCRYPT => MarkMagic::Encrypt,
            MARK_MAGIC_IDENTITY => MarkMagic::Identity,
            other => MarkMagic::Other(other),
        }
    }

    /// Selector value as it appears in the marker word
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        match self {
            MarkMagic::ProxyIngress => MARK_MAGIC_PROXY_INGRESS,
            MarkMagic::ProxyEgress => MARK_MAGIC_PROXY_EGRESS,
            MarkMagic::Host => MARK_MAGIC_HOST,
            MarkMagic::Decrypt => MARK_MAGIC_DECRYPT,
            MarkMagic::Encrypt => MARK_MAGIC_ENCRYPT,
            MarkMagic::Identity => MARK_MAGIC_IDENTITY,
            MarkMagic::Other(raw) => raw & MARK_MAGIC_HOST_MASK,
        }
    }

    /// Selectors whose payload bits hold an identity
    pub const fn carries_identity(self) -> bool {
        matches!(
            self,
            MarkMagic::ProxyIngress | MarkMagic::ProxyEgress | MarkMagic::Identity
        )
    }
}

/// Marker word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[repr(transparent)]
pub struct PacketMarker(u32);

impl PacketMarker {
    /// Wrap a raw marker word
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Marker with a selector and no payload
    pub const fn magic_only(magic: MarkMagic) -> Self {
        Self(magic.raw())
    }

    /// Marker with a selector and an embedded identity (low 24 bits kept)
    pub const fn with_identity(magic: MarkMagic, identity: Identity) -> Self {
        let low = (identity & IDENTITY_LOW_MASK) << IDENTITY_LOW_SHIFT;
        let high = (identity >> IDENTITY_HIGH_SHIFT) & IDENTITY_HIGH_MASK;
        Self(low | high | magic.raw())
    }

    /// Raw word
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Decoded selector
    #[inline(always)]
    pub const fn magic(self) -> MarkMagic {
        MarkMagic::from_mark(self.0)
    }

    /// Embedded identity. Only meaningful for identity-bearing selectors.
    #[inline(always)]
    pub const fn identity(self) -> Identity {
        ((self.0 >> IDENTITY_LOW_SHIFT) & IDENTITY_LOW_MASK)
            | ((self.0 & IDENTITY_HIGH_MASK) << IDENTITY_HIGH_SHIFT)
    }

    /// No selector and no payload
    pub const fn is_cleared(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for PacketMarker {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn identity_selector() -> impl Strategy<Value = MarkMagic> {
        prop_oneof![
            Just(MarkMagic::ProxyIngress),
            Just(MarkMagic::ProxyEgress),
            Just(MarkMagic::Identity),
        ]
    }

    proptest! {
        #[test]
        fn proptest_embedded_identity_survives(
            magic in identity_selector(),
            identity in 0u32..=MAX_MARKER_IDENTITY,
        ) {
            let marker = PacketMarker::with_identity(magic, identity);
            prop_assert_eq!(marker.magic(), magic);
            prop_assert_eq!(marker.identity(), identity);
        }

        #[test]
        fn proptest_selector_is_four_bits(mark in any::<u32>()) {
            prop_assert_eq!(MarkMagic::from_mark(mark).raw(), mark & MARK_MAGIC_HOST_MASK);
        }
    }
}
