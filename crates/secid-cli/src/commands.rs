//! Command handlers
//!
//! Each handler returns a serializable report; `main` picks the format.

use clap::ValueEnum;
use serde::Serialize;

use secid_common::identity::parse_u32;
use secid_common::{DatapathConfig, Identity, Scope, ETH_P_IP, ETH_P_IPV6};
use secid_datapath::skb::CB_ENCRYPT_IDENTITY;
use secid_datapath::{
    IdentityClassSet, IdentityClassifier, IdentityScope, MarkMagic, NullSink, Origin,
    OriginResolver, PacketMarker, SkbMeta,
};

/// Network-layer protocol of the synthetic packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Proto {
    Ipv4,
    Ipv6,
    Other,
}

impl Proto {
    pub fn ethertype(self) -> u16 {
        match self {
            Proto::Ipv4 => ETH_P_IP,
            Proto::Ipv6 => ETH_P_IPV6,
            // ARP
            Proto::Other => 0x0806,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentityReport {
    pub identity: Identity,
    pub hex: String,
    pub name: Option<&'static str>,
    pub allocation: Scope,
    pub scope: IdentityScope,
    pub classes: IdentityClassSet,
}

#[derive(Debug, Serialize)]
pub struct MarkReport {
    pub mark: String,
    pub magic: MarkMagic,
    pub origin: Origin,
    pub identity: Identity,
    pub scope: IdentityScope,
    pub provenance: u16,
    pub mark_after: u32,
}

/// Classify each identity literal
pub fn classify(config: &DatapathConfig, ids: &[String]) -> anyhow::Result<Vec<IdentityReport>> {
    let classifier = IdentityClassifier::new(config);
    ids.iter()
        .map(|raw| {
            let identity = parse_u32(raw)?;
            Ok::<_, anyhow::Error>(IdentityReport {
                identity,
                hex: format!("{identity:#010x}"),
                name: classifier.constants().name_of(identity),
                allocation: Scope::of(identity),
                scope: classifier.classify(identity),
                classes: classifier.classes(identity),
            })
        })
        .collect()
}

/// Run origin resolution over a synthetic packet carrying `mark`
pub fn decode_mark(
    config: &DatapathConfig,
    mark: &str,
    proto: Proto,
    encrypt_identity: Option<u32>,
) -> anyhow::Result<MarkReport> {
    let raw = parse_u32(mark)?;
    let resolver = OriginResolver::new(config, NullSink);

    let mut skb = SkbMeta::new(proto.ethertype()).with_mark(PacketMarker::new(raw));
    if let Some(identity) = encrypt_identity {
        skb.store_meta(CB_ENCRYPT_IDENTITY, identity);
    }

    let res = resolver.inherit_identity_from_host(&mut skb);
    tracing::debug!(mark = raw, ?res, "decoded marker");

    Ok(MarkReport {
        mark: format!("{raw:#010x}"),
        magic: res.magic,
        origin: res.origin,
        identity: res.identity,
        scope: resolver.classifier().classify(res.identity),
        provenance: skb.tc_index.bits(),
        mark_after: skb.mark,
    })
}
