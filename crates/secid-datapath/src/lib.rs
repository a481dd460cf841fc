//! secid Datapath - Security identity resolution for a policy-enforcing stage
//!
//! Sits between the components that tag packets with a marker word (proxy
//! redirection, tunnel/encryption encapsulation, connection tracking) and
//! the policy engine, which only understands classified identities.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     IDENTITY STAGE (per packet)                  │
//! │                                                                  │
//! │   SkbMeta { mark, tc_index, protocol, cb[] }                     │
//! │        │                                                         │
//! │        ▼                                                         │
//! │  ┌────────────────┐  record   ┌───────────────┐                  │
//! │  │ OriginResolver │─────────►│   EventSink   │ (best effort)    │
//! │  │  mark → id     │          └───────────────┘                  │
//! │  └───────┬────────┘                                              │
//! │          │ identity (mark cleared, provenance OR-ed in)          │
//! │          ▼                                                       │
//! │  ┌────────────────────┐                                          │
//! │  │ IdentityClassifier │ host / remote-node / world / CIDR /      │
//! │  │  pure predicates   │ cluster / reserved / local               │
//! │  └─────────┬──────────┘                                          │
//! │            ▼                                                     │
//! │      policy engine                                               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation is branch-only, lock-free and bounded. The only shared
//! resource is the event channel, and writes to it never block.

#![warn(missing_docs)]

pub mod classifier;
pub mod events;
pub mod marker;
pub mod pipeline;
pub mod resolver;
pub mod skb;
pub mod stats;

pub use classifier::{IdentityClassSet, IdentityClassifier, IdentityScope, WorldMode};
pub use events::{ChannelSink, DebugRecord, DebugSubtype, EventReceiver, EventSink, NullSink};
pub use marker::{MarkMagic, PacketMarker};
pub use pipeline::{ClassifyStage, InheritIdentityStage, Pipeline, Stage, StageContext, StageResult};
pub use resolver::{Origin, OriginResolver, Resolution};
pub use skb::{ProvenanceFlags, SkbMeta};
pub use stats::{ResolverStats, ResolverStatsSnapshot};
