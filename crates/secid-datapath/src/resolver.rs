//! Origin Resolver
//!
//! Decodes the marker word of a packet into the identity of its origin,
//! records provenance, and clears the marker so no later stage decodes it
//! again.
//!
//! Selector priority, first match wins:
//!
//! | # | Selector      | Identity                        | Provenance          |
//! |---|---------------|---------------------------------|---------------------|
//! | 1 | ProxyIngress  | embedded in marker              | FROM_INGRESS_PROXY  |
//! | 2 | ProxyEgress   | embedded in marker              | FROM_EGRESS_PROXY   |
//! | 3 | Identity      | embedded in marker              | -                   |
//! | 4 | Host          | host constant                   | -                   |
//! | 5 | Encrypt       | control block (IPsec only)      | -                   |
//! | 6 | anything else | world for the packet's protocol | -                   |

use secid_common::{DatapathConfig, Identity};
use serde::Serialize;

use crate::classifier::IdentityClassifier;
use crate::events::{DebugRecord, EventSink};
use crate::marker::MarkMagic;
use crate::skb::{ProvenanceFlags, SkbMeta, CB_ENCRYPT_IDENTITY};
use crate::stats::{ResolverStats, ResolverStatsSnapshot};

/// Which decode branch produced the identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Re-injected by the ingress proxy
    IngressProxy,
    /// Returned from the egress proxy
    EgressProxy,
    /// Identity carried in the marker
    Identity,
    /// Local host
    Host,
    /// Identity stashed for encryption
    Encrypted,
    /// No recognized marker
    World,
}

/// Outcome of one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Selector found in the marker, whether or not it was honored
    pub magic: MarkMagic,
    /// Branch taken
    pub origin: Origin,
    /// Resolved source identity
    pub identity: Identity,
}

/// Origin resolver
///
/// Shared across workers; holds no per-packet state.
pub struct OriginResolver<S: EventSink> {
    classifier: IdentityClassifier,
    ipsec: bool,
    sink: S,
    stats: ResolverStats,
}

impl<S: EventSink> OriginResolver<S> {
    /// Create a resolver from a datapath configuration
    pub fn new(config: &DatapathConfig, sink: S) -> Self {
        Self::with_classifier(IdentityClassifier::new(config), config.features.enable_ipsec, sink)
    }

    /// Create a resolver around an existing classifier
    pub fn with_classifier(classifier: IdentityClassifier, ipsec: bool, sink: S) -> Self {
        tracing::debug!(
            ipsec,
            world = ?classifier.world_mode(),
            "origin resolver created"
        );
        Self {
            classifier,
            ipsec,
            sink,
            stats: ResolverStats::default(),
        }
    }

    /// Classifier in use
    pub fn classifier(&self) -> &IdentityClassifier {
        &self.classifier
    }

    /// Event sink in use
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Snapshot of the per-branch counters
    pub fn stats(&self) -> ResolverStatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolve the origin identity of a packet from its marker.
    ///
    /// Always clears `skb.mark`; only ever ORs bits into `skb.tc_index`.
    /// The diagnostic record is best-effort and cannot affect the result.
    pub fn inherit_identity_from_host(&self, skb: &mut SkbMeta) -> Resolution {
        let marker = skb.marker();
        let magic = marker.magic();

        let (origin, identity) = match magic {
            // Packets from the ingress proxy must skip the proxy when the
            // destination endpoint evaluates policy, or they loop.
            MarkMagic::ProxyIngress => {
                skb.tc_index |= ProvenanceFlags::FROM_INGRESS_PROXY;
                (Origin::IngressProxy, marker.identity())
            }
            // Return traffic from the egress proxy must skip redirection
            // back to it for the same reason.
            MarkMagic::ProxyEgress => {
                skb.tc_index |= ProvenanceFlags::FROM_EGRESS_PROXY;
                (Origin::EgressProxy, marker.identity())
            }
            MarkMagic::Identity => (Origin::Identity, marker.identity()),
            MarkMagic::Host => (Origin::Host, self.classifier.constants().host),
            MarkMagic::Encrypt if self.ipsec => {
                (Origin::Encrypted, skb.load_meta(CB_ENCRYPT_IDENTITY))
            }
            _ => (Origin::World, self.classifier.world_for_protocol(skb.protocol)),
        };

        // reset so routing rules keyed on the mark are not hit again
        skb.mark = 0;

        self.stats.record(origin);
        if !self.sink.emit(DebugRecord::inherit_identity(identity, magic)) {
            self.stats.record_event_drop();
        }

        tracing::trace!(?magic, ?origin, identity, "inherited identity");

        Resolution {
            magic,
            origin,
            identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, DebugSubtype, NullSink};
    use crate::marker::{PacketMarker, MARK_MAGIC_HOST, MARK_MAGIC_PROXY_INGRESS};
    use secid_common::{FeatureFlags, ETH_P_IP, ETH_P_IPV6};

    fn config(dual_stack: bool, ipsec: bool) -> DatapathConfig {
        DatapathConfig {
            features: FeatureFlags {
                enable_ipv4: true,
                enable_ipv6: dual_stack,
                enable_ipsec: ipsec,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_host_marker() {
        let resolver = OriginResolver::new(&config(false, false), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IP).with_mark(PacketMarker::new(MARK_MAGIC_HOST));
        skb.tc_index = ProvenanceFlags::SKIP_NODEPORT;

        let res = resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(res.identity, 1);
        assert_eq!(res.origin, Origin::Host);
        assert_eq!(res.magic.raw(), MARK_MAGIC_HOST);
        assert_eq!(skb.tc_index, ProvenanceFlags::SKIP_NODEPORT);
        assert_eq!(skb.mark, 0);
    }

    #[test]
    fn test_ingress_proxy_marker() {
        let resolver = OriginResolver::new(&config(false, false), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IP);
        skb.set_identity_mark(MarkMagic::ProxyIngress, 4242);

        let res = resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(res.identity, 4242);
        assert_eq!(res.magic.raw(), MARK_MAGIC_PROXY_INGRESS);
        assert!(skb.tc_index.contains(ProvenanceFlags::FROM_INGRESS_PROXY));
        assert!(!skb.tc_index.contains(ProvenanceFlags::FROM_EGRESS_PROXY));
        assert!(skb.marker().is_cleared());
    }

    #[test]
    fn test_egress_proxy_marker() {
        let resolver = OriginResolver::new(&config(false, false), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IPV6);
        skb.set_identity_mark(MarkMagic::ProxyEgress, 0x00_1234);

        let res = resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(res.origin, Origin::EgressProxy);
        assert_eq!(res.identity, 0x1234);
        assert_eq!(skb.tc_index, ProvenanceFlags::FROM_EGRESS_PROXY);
    }

    #[test]
    fn test_identity_marker_adds_no_provenance() {
        let resolver = OriginResolver::new(&config(true, false), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IP);
        skb.set_identity_mark(MarkMagic::Identity, 70_000);

        let res = resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(res.origin, Origin::Identity);
        assert_eq!(res.identity, 70_000);
        assert!(skb.tc_index.is_empty());
    }

    #[test]
    fn test_encrypt_marker_requires_ipsec() {
        let marker = PacketMarker::magic_only(MarkMagic::Encrypt);

        let resolver = OriginResolver::new(&config(false, true), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IP)
            .with_mark(marker)
            .with_meta(CB_ENCRYPT_IDENTITY, 31337);
        let res = resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(res.origin, Origin::Encrypted);
        assert_eq!(res.identity, 31337);

        let resolver = OriginResolver::new(&config(false, false), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IP)
            .with_mark(marker)
            .with_meta(CB_ENCRYPT_IDENTITY, 31337);
        let res = resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(res.origin, Origin::World);
        assert_eq!(res.identity, 2);
        // the selector is still reported
        assert_eq!(res.magic, MarkMagic::Encrypt);
        assert_eq!(skb.mark, 0);
    }

    #[test]
    fn test_unmarked_world_per_protocol() {
        let dual = OriginResolver::new(&config(true, false), NullSink);
        let cases = [(ETH_P_IP, 9), (ETH_P_IPV6, 10), (0x0806, 2)];
        for (proto, expected) in cases {
            let mut skb = SkbMeta::new(proto);
            let res = dual.inherit_identity_from_host(&mut skb);
            assert_eq!(res.origin, Origin::World);
            assert_eq!(res.identity, expected, "proto {proto:#06x}");
        }

        let single = OriginResolver::new(&config(false, false), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IPV6);
        assert_eq!(single.inherit_identity_from_host(&mut skb).identity, 2);
    }

    #[test]
    fn test_decrypt_and_unknown_selectors_fall_through() {
        let resolver = OriginResolver::new(&config(false, true), NullSink);
        for raw in [0x0D00, 0x0200, 0x0100, 0xF000] {
            let mut skb = SkbMeta::new(ETH_P_IP).with_mark(PacketMarker::new(raw));
            let res = resolver.inherit_identity_from_host(&mut skb);
            assert_eq!(res.origin, Origin::World, "mark {raw:#x}");
            assert_eq!(skb.mark, 0);
        }
    }

    #[test]
    fn test_emits_record_and_counts() {
        let (sink, rx) = ChannelSink::bounded(&Default::default());
        let resolver = OriginResolver::new(&config(false, false), sink);

        let mut skb = SkbMeta::new(ETH_P_IP).with_mark(PacketMarker::new(MARK_MAGIC_HOST));
        resolver.inherit_identity_from_host(&mut skb);
        let mut skb = SkbMeta::new(ETH_P_IP);
        resolver.inherit_identity_from_host(&mut skb);

        let records = rx.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subtype, DebugSubtype::InheritIdentity);
        assert_eq!(records[0].arg1, 1);
        assert_eq!(records[0].arg2, MARK_MAGIC_HOST);
        assert_eq!(records[1].arg1, 2);
        assert_eq!(records[1].arg2, 0);

        let stats = resolver.stats();
        assert_eq!(stats.host, 1);
        assert_eq!(stats.world, 1);
        assert_eq!(stats.events_dropped, 0);
    }

    #[test]
    fn test_proxy_markers_keep_earlier_provenance() {
        let resolver = OriginResolver::new(&config(true, false), NullSink);

        let mut skb = SkbMeta::new(ETH_P_IP);
        skb.tc_index = ProvenanceFlags::SKIP_HOST_FIREWALL;
        skb.set_identity_mark(MarkMagic::ProxyIngress, 4242);
        resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(
            skb.tc_index,
            ProvenanceFlags::SKIP_HOST_FIREWALL | ProvenanceFlags::FROM_INGRESS_PROXY
        );
        assert_eq!(skb.tc_index.bits(), 0x0011);

        let mut skb = SkbMeta::new(ETH_P_IPV6);
        skb.tc_index = ProvenanceFlags::SKIP_NODEPORT | ProvenanceFlags::FROM_INGRESS_PROXY;
        skb.set_identity_mark(MarkMagic::ProxyEgress, 4243);
        resolver.inherit_identity_from_host(&mut skb);
        assert!(skb.tc_index.contains(ProvenanceFlags::SKIP_NODEPORT));
        assert!(skb.tc_index.contains(ProvenanceFlags::FROM_INGRESS_PROXY));
        assert!(skb.tc_index.contains(ProvenanceFlags::FROM_EGRESS_PROXY));
        assert_eq!(skb.tc_index.bits(), 0x0007);
    }

    #[test]
    fn test_sink_failure_does_not_affect_result() {
        let (sink, rx) = ChannelSink::bounded(&Default::default());
        drop(rx);
        let resolver = OriginResolver::new(&config(false, false), sink);
        let mut skb = SkbMeta::new(ETH_P_IP);
        skb.set_identity_mark(MarkMagic::Identity, 512);

        let res = resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(res.identity, 512);
        assert_eq!(resolver.stats().events_dropped, 1);
    }

    #[test]
    fn test_null_sink_is_not_a_drop() {
        let resolver = OriginResolver::new(&config(false, false), NullSink);
        let mut skb = SkbMeta::new(ETH_P_IP);
        resolver.inherit_identity_from_host(&mut skb);
        assert_eq!(resolver.stats().world, 1);
        assert_eq!(resolver.stats().events_dropped, 0);
    }
}
