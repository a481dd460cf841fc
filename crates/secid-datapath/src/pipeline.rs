//! Identity Stage Pipeline
//!
//! RX → InheritIdentity → Classify → (policy engine)
//!
//! Stages mutate the packet's metadata in place; the metadata is owned by
//! the worker running the pipeline for the duration of the call.

use secid_common::Identity;
use std::sync::Arc;

use crate::classifier::{IdentityClassSet, IdentityClassifier, IdentityScope};
use crate::events::EventSink;
use crate::marker::MarkMagic;
use crate::resolver::{Origin, OriginResolver};
use crate::skb::SkbMeta;

/// Pipeline stage result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    /// Continue to next stage
    Continue,
    /// Drop packet
    Drop,
}

/// Per-packet results handed to downstream stages
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageContext {
    // Origin resolution
    /// Resolved source identity
    pub src_identity: Option<Identity>,
    /// Selector found in the marker
    pub magic: Option<MarkMagic>,
    /// Branch the resolver took
    pub origin: Option<Origin>,

    // Classification
    /// Primary category of the source identity
    pub scope: Option<IdentityScope>,
    /// Every predicate answer for the source identity
    pub classes: Option<IdentityClassSet>,
}

/// Pipeline stage trait
pub trait Stage: Send + Sync {
    /// Process one packet
    fn process(&self, skb: &mut SkbMeta, ctx: &mut StageContext) -> StageResult;
    /// Stage name for logs
    fn name(&self) -> &'static str;
}

/// Ordered list of stages
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Resolve the origin identity, then classify it
    pub fn identity_pipeline<S: EventSink + 'static>(resolver: Arc<OriginResolver<S>>) -> Self {
        let classifier = *resolver.classifier();
        let mut p = Self::new();
        p.add_stage(Box::new(InheritIdentityStage::new(resolver)));
        p.add_stage(Box::new(ClassifyStage::new(classifier)));
        p
    }

    /// Append a stage
    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Run every stage in order until one stops the packet
    #[inline]
    pub fn process(&self, skb: &mut SkbMeta, ctx: &mut StageContext) -> StageResult {
        for stage in &self.stages {
            match stage.process(skb, ctx) {
                StageResult::Continue => continue,
                result => {
                    tracing::trace!(stage = stage.name(), ?result, "pipeline stopped");
                    return result;
                }
            }
        }
        StageResult::Continue
    }

    /// Number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage names in order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Stage 1: InheritIdentity (marker → source identity)
// ============================================================================

/// Runs origin resolution and records the source identity
pub struct InheritIdentityStage<S: EventSink> {
    resolver: Arc<OriginResolver<S>>,
}

impl<S: EventSink> InheritIdentityStage<S> {
    /// Stage around a shared resolver
    pub fn new(resolver: Arc<OriginResolver<S>>) -> Self {
        Self { resolver }
    }
}

impl<S: EventSink> Stage for InheritIdentityStage<S> {
    fn process(&self, skb: &mut SkbMeta, ctx: &mut StageContext) -> StageResult {
        let res = self.resolver.inherit_identity_from_host(skb);
        ctx.src_identity = Some(res.identity);
        ctx.magic = Some(res.magic);
        ctx.origin = Some(res.origin);
        StageResult::Continue
    }

    fn name(&self) -> &'static str { "inherit-identity" }
}

// ============================================================================
// Stage 2: Classify (identity → categories for policy)
// ============================================================================

/// Classifies the source identity for the policy engine
pub struct ClassifyStage {
    classifier: IdentityClassifier,
}

impl ClassifyStage {
    /// Stage around a classifier
    pub fn new(classifier: IdentityClassifier) -> Self {
        Self { classifier }
    }
}

impl Stage for ClassifyStage {
    fn process(&self, _skb: &mut SkbMeta, ctx: &mut StageContext) -> StageResult {
        if let Some(identity) = ctx.src_identity {
            ctx.scope = Some(self.classifier.classify(identity));
            ctx.classes = Some(self.classifier.classes(identity));
        }
        StageResult::Continue
    }

    fn name(&self) -> &'static str { "classify" }
}
