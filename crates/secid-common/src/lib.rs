//! secid Common - Shared types for the security identity datapath
//!
//! This crate holds the protocol contract shared by every producer and
//! consumer of security identities:
//! - The reserved identity constant table
//! - Identity scope layout (top byte of the 32-bit identity)
//! - The CIDR identity range
//! - Feature switches and datapath configuration
//! - Error handling
//!
//! # Identity Layout
//!
//! ```text
//!  31        24 23                                   0
//! ┌────────────┬──────────────────────────────────────┐
//! │   scope    │              identity                │
//! └────────────┴──────────────────────────────────────┘
//!   0x00 global   0x01 local (CIDR)   0x02 remote-node
//! ```
//!
//! Nothing here is ambient global state: constants and ranges are carried in
//! values that the datapath receives at construction time.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod identity;

pub use config::{CidrRange, DatapathConfig, EventsConfig, FeatureFlags};
pub use error::{SecIdError, SecIdResult};
pub use identity::{Identity, IdentityConstants, Scope};

/// EtherType for IPv4, host byte order
pub const ETH_P_IP: u16 = 0x0800;

/// EtherType for IPv6, host byte order
pub const ETH_P_IPV6: u16 = 0x86DD;
