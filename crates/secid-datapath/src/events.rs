//! Diagnostics event channel
//!
//! Best-effort, append-only output. Emission never blocks the packet path:
//! a full channel, a rate-limit miss or a contended limiter all count as a
//! silent drop.
//!
//! # Wire layout
//!
//! ```text
//!  0      1         2          4        8        12       16       20
//! ┌──────┬─────────┬──────────┬────────┬────────┬────────┬────────┐
//! │ type │ subtype │  source  │  hash  │  arg1  │  arg2  │  arg3  │
//! └──────┴─────────┴──────────┴────────┴────────┴────────┴────────┘
//! ```
//!
//! All fields little-endian.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use secid_common::{EventsConfig, Identity};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::marker::MarkMagic;

/// Message type for debug records
pub const NOTIFY_DBG_MSG: u8 = 2;

/// Debug record subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum DebugSubtype {
    /// Free-form debug message
    Generic = 1,
    /// Origin resolution: arg1 = identity, arg2 = selector value
    InheritIdentity = 50,
}

/// Diagnostic record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugRecord {
    /// Record subtype
    pub subtype: DebugSubtype,
    /// Emitting endpoint, 0 when unknown
    pub source: u16,
    /// Packet hash, 0 when unknown
    pub hash: u32,
    /// First argument (identity for [`DebugSubtype::InheritIdentity`])
    pub arg1: u32,
    /// Second argument (selector value for [`DebugSubtype::InheritIdentity`])
    pub arg2: u32,
    /// Third argument, unused by origin resolution
    pub arg3: u32,
}

impl DebugRecord {
    /// Encoded size in bytes
    pub const WIRE_SIZE: usize = 20;

    /// Record for a completed origin resolution
    pub fn inherit_identity(identity: Identity, magic: MarkMagic) -> Self {
        Self {
            subtype: DebugSubtype::InheritIdentity,
            source: 0,
            hash: 0,
            arg1: identity,
            arg2: magic.raw(),
            arg3: 0,
        }
    }

    /// Encode to the fixed wire layout
    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0] = NOTIFY_DBG_MSG;
        out[1] = self.subtype as u8;
        out[2..4].copy_from_slice(&self.source.to_le_bytes());
        out[4..8].copy_from_slice(&self.hash.to_le_bytes());
        out[8..12].copy_from_slice(&self.arg1.to_le_bytes());
        out[12..16].copy_from_slice(&self.arg2.to_le_bytes());
        out[16..20].copy_from_slice(&self.arg3.to_le_bytes());
        out
    }
}

/// Output sink for diagnostic records
///
/// Implementations must not block. Returns whether the record was accepted.
pub trait EventSink: Send + Sync {
    /// Offer one record to the sink
    fn emit(&self, record: DebugRecord) -> bool;
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, record: DebugRecord) -> bool {
        (**self).emit(record)
    }
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn emit(&self, record: DebugRecord) -> bool {
        (**self).emit(record)
    }
}

/// Discards every record
///
/// Used when diagnostics are switched off. Discarding is the requested
/// behavior, so records are reported as accepted and never count as drops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _record: DebugRecord) -> bool {
        true
    }
}

/// Token bucket
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl RateLimiter {
    /// `rate` records per second, up to `burst` at once. Starts full.
    pub fn new(rate: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: f64::from(rate),
            burst,
            tokens: burst,
            last: Instant::now(),
        }
    }

    /// Take a token at `now`
    pub fn allow_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Bounded channel sink with optional rate limiting
pub struct ChannelSink {
    tx: Sender<DebugRecord>,
    limiter: Option<Mutex<RateLimiter>>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and its consumer end
    pub fn bounded(config: &EventsConfig) -> (Self, EventReceiver) {
        let (tx, rx) = channel::bounded(config.capacity.max(1));
        let limiter = (config.rate_limit > 0)
            .then(|| Mutex::new(RateLimiter::new(config.rate_limit, config.burst())));

        tracing::debug!(
            capacity = config.capacity,
            rate_limit = config.rate_limit,
            burst = config.burst(),
            "event channel created"
        );

        let sink = Self {
            tx,
            limiter,
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        };
        (sink, EventReceiver { rx })
    }

    /// Records accepted so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Records dropped so far (full, rate limited or disconnected)
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn rate_allows(&self) -> bool {
        match &self.limiter {
            None => true,
            // contention means another worker holds the bucket; drop rather than wait
            Some(limiter) => limiter
                .try_lock()
                .map(|mut bucket| bucket.allow_at(Instant::now()))
                .unwrap_or(false),
        }
    }

    fn record_drop(&self, reason: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("secid_events_dropped_total", "reason" => reason).increment(1);
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, record: DebugRecord) -> bool {
        if !self.rate_allows() {
            self.record_drop("rate_limited");
            return false;
        }

        match self.tx.try_send(record) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("secid_events_emitted_total").increment(1);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.record_drop("full");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.record_drop("disconnected");
                false
            }
        }
    }
}

/// Consumer end of a [`ChannelSink`]
#[derive(Debug, Clone)]
pub struct EventReceiver {
    rx: Receiver<DebugRecord>,
}

impl EventReceiver {
    /// Next pending record, if any
    pub fn try_recv(&self) -> Option<DebugRecord> {
        self.rx.try_recv().ok()
    }

    /// All pending records
    pub fn drain(&self) -> Vec<DebugRecord> {
        self.rx.try_iter().collect()
    }

    /// Number of pending records
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// No records pending
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
