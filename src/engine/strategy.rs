//! The strategy seam.
//!
//! Alternate strategies (LLM-backed, Sage, hybrids) plug in by implementing
//! [`RoutingStrategy`] and are selected by configuration, not inheritance.
//! The rules engine is the in-crate implementation.

use crate::engine::decision::RoutingDecision;
use crate::engine::error::RoutingError;
use crate::memory::RoutingContext;

/// Contract every routing strategy must satisfy.
pub trait RoutingStrategy: Send + Sync {
    /// Pick the best destination for the context, or fail with
    /// [`RoutingError`] when no destination can be determined.
    fn route_task(&self, ctx: &RoutingContext) -> Result<RoutingDecision, RoutingError>;

    /// Ranked candidate destinations, best first, at most `limit`.
    fn suggest_destinations(
        &self,
        ctx: &RoutingContext,
        limit: usize,
    ) -> Result<Vec<RoutingDecision>, RoutingError>;

    /// Persist a decision for later feedback. Returns the generated id.
    fn record_decision(
        &self,
        decision: &RoutingDecision,
        ctx: &RoutingContext,
        metadata: Option<serde_json::Value>,
    ) -> String;

    /// Report how a recorded decision turned out. Returns false when the
    /// decision id is unknown (feedback after eviction is tolerated).
    fn provide_feedback(
        &self,
        decision_id: &str,
        correct: bool,
        actual_destination: Option<&str>,
        notes: Option<&str>,
    ) -> bool;

    /// Confidence below which decisions should be escalated.
    fn confidence_threshold(&self) -> f64;

    /// Render a decision as human-readable text. Pure presentation.
    fn explain_decision(&self, decision: &RoutingDecision) -> String;
}
