//! Pipeline strategies and the plumbing they share: the health gate around
//! every external call, and progress forwarding to the status sink.

pub mod monolithic;
pub mod orchestrated;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use verity_analysis::grounding::GroundingConfig;
use verity_analysis::understanding::NormalizationConfig;
use verity_analysis::{
    AnalysisDraft, BoundaryDraft, DecomposedClaim, Decomposition, EvidencePolicy,
    EvidenceSearcher, MonolithicMode, TextAnalyst, TextPair, VerdictDraft,
};
use verity_common::{
    AnalysisReport, Boundary, Claim, EvidenceItem, InputType, JobStatus, LogLevel,
    PipelineVariant, VerityError,
};

use crate::health::{HealthTracker, ProviderClass};
use crate::store::JobStore;

use monolithic::MonolithicStrategy;
use orchestrated::OrchestratedStrategy;

// ---------------------------------------------------------------------------
// Progress forwarding
// ---------------------------------------------------------------------------

/// Receives progress and warning events from inside a strategy and forwards
/// them to the status sink, so partial progress stays visible even
/// mid-fallback. Sink failures are logged, never propagated.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn progress(&self, pct: u8, message: &str);
    async fn warn(&self, message: &str);
}

pub struct JobProgress {
    store: Arc<dyn JobStore>,
    job_id: Uuid,
    last_pct: AtomicU8,
}

impl JobProgress {
    pub fn new(store: Arc<dyn JobStore>, job_id: Uuid) -> Self {
        Self {
            store,
            job_id,
            last_pct: AtomicU8::new(0),
        }
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn progress(&self, pct: u8, message: &str) {
        self.last_pct.store(pct, Ordering::Relaxed);
        if let Err(e) = self
            .store
            .set_status(self.job_id, JobStatus::Running, pct, LogLevel::Info, message)
            .await
        {
            warn!(job_id = %self.job_id, error = %e, "Failed to forward progress");
        }
    }

    async fn warn(&self, message: &str) {
        let pct = self.last_pct.load(Ordering::Relaxed);
        if let Err(e) = self
            .store
            .set_status(self.job_id, JobStatus::Running, pct, LogLevel::Warn, message)
            .await
        {
            warn!(job_id = %self.job_id, error = %e, "Failed to forward warning");
        }
    }
}

// ---------------------------------------------------------------------------
// Health gate
// ---------------------------------------------------------------------------

fn gate_open(health: &HealthTracker, class: ProviderClass) -> Result<()> {
    if health.is_paused() {
        return Err(VerityError::Paused(format!("{class} call refused")).into());
    }
    if !health.is_healthy(class) {
        return Err(VerityError::CircuitOpen(class.to_string()).into());
    }
    Ok(())
}

async fn guarded<T, F>(health: &HealthTracker, class: ProviderClass, call: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    gate_open(health, class)?;
    match call.await {
        Ok(v) => {
            health.record_success(class);
            Ok(v)
        }
        Err(e) => {
            health.record_failure(class, &e.to_string(), None);
            Err(e)
        }
    }
}

/// Analyst wrapper that consults and feeds the health tracker on every
/// call. Strategies only ever see this, so no external call escapes the
/// gate.
pub struct GatedAnalyst {
    inner: Arc<dyn TextAnalyst>,
    health: Arc<HealthTracker>,
}

impl GatedAnalyst {
    pub fn new(inner: Arc<dyn TextAnalyst>, health: Arc<HealthTracker>) -> Self {
        Self { inner, health }
    }
}

#[async_trait]
impl TextAnalyst for GatedAnalyst {
    async fn decompose(&self, input: &str) -> Result<Decomposition> {
        guarded(&self.health, ProviderClass::Llm, self.inner.decompose(input)).await
    }

    async fn detect_boundaries(
        &self,
        input: &str,
        claims: &[DecomposedClaim],
    ) -> Result<Vec<BoundaryDraft>> {
        guarded(
            &self.health,
            ProviderClass::Llm,
            self.inner.detect_boundaries(input, claims),
        )
        .await
    }

    async fn grade_claim(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
        policy: EvidencePolicy,
    ) -> Result<VerdictDraft> {
        guarded(
            &self.health,
            ProviderClass::Llm,
            self.inner.grade_claim(claim, evidence, policy),
        )
        .await
    }

    async fn extract_key_terms(
        &self,
        reasonings: &[(String, String)],
    ) -> Result<HashMap<String, Vec<String>>> {
        guarded(
            &self.health,
            ProviderClass::Llm,
            self.inner.extract_key_terms(reasonings),
        )
        .await
    }

    async fn score_pairs(&self, pairs: &[TextPair]) -> Result<Vec<serde_json::Value>> {
        guarded(&self.health, ProviderClass::Llm, self.inner.score_pairs(pairs)).await
    }

    async fn full_analysis(
        &self,
        input: &str,
        mode: MonolithicMode,
        policy: EvidencePolicy,
    ) -> Result<AnalysisDraft> {
        guarded(
            &self.health,
            ProviderClass::Llm,
            self.inner.full_analysis(input, mode, policy),
        )
        .await
    }
}

/// Searcher wrapper with the same gate plus a one-retry budget for
/// transient failures: only the retried failure counts against the
/// circuit.
pub struct GatedSearcher {
    inner: Arc<dyn EvidenceSearcher>,
    health: Arc<HealthTracker>,
}

impl GatedSearcher {
    pub fn new(inner: Arc<dyn EvidenceSearcher>, health: Arc<HealthTracker>) -> Self {
        Self { inner, health }
    }

    async fn with_retry<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        gate_open(&self.health, ProviderClass::Search)?;
        match call().await {
            Ok(v) => {
                self.health.record_success(ProviderClass::Search);
                return Ok(v);
            }
            Err(e) => {
                warn!(error = %e, "Search call failed, retrying once");
            }
        }
        match call().await {
            Ok(v) => {
                self.health.record_success(ProviderClass::Search);
                Ok(v)
            }
            Err(e) => {
                self.health
                    .record_failure(ProviderClass::Search, &e.to_string(), None);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EvidenceSearcher for GatedSearcher {
    async fn gather(&self, claim: &Claim, boundaries: &[Boundary]) -> Result<Vec<EvidenceItem>> {
        self.with_retry(|| self.inner.gather(claim, boundaries)).await
    }

    async fn contradiction_search(&self, claim: &Claim) -> Result<Vec<EvidenceItem>> {
        self.with_retry(|| self.inner.contradiction_search(claim))
            .await
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub input_type: InputType,
    pub value: String,
}

/// Everything a strategy needs, constructed once at process start. The
/// analyst and searcher handed out here are already health-gated.
pub struct StrategyContext {
    pub analyst: Arc<dyn TextAnalyst>,
    pub searcher: Arc<dyn EvidenceSearcher>,
    pub policy: EvidencePolicy,
    pub normalization: NormalizationConfig,
    pub grounding: GroundingConfig,
}

impl StrategyContext {
    pub fn new(
        analyst: Arc<dyn TextAnalyst>,
        searcher: Arc<dyn EvidenceSearcher>,
        health: Arc<HealthTracker>,
        policy: EvidencePolicy,
    ) -> Self {
        Self {
            analyst: Arc::new(GatedAnalyst::new(analyst, Arc::clone(&health))),
            searcher: Arc::new(GatedSearcher::new(searcher, health)),
            policy,
            normalization: NormalizationConfig::default(),
            grounding: GroundingConfig::default(),
        }
    }
}

/// One interchangeable end-to-end analysis strategy. All strategies share
/// the same claim -> verdict contract.
#[async_trait]
pub trait AnalysisStrategy: Send + Sync {
    fn variant(&self) -> PipelineVariant;

    async fn execute(
        &self,
        input: &AnalysisInput,
        ctx: &StrategyContext,
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisReport>;
}

pub fn strategy_for(variant: PipelineVariant) -> Box<dyn AnalysisStrategy> {
    match variant {
        PipelineVariant::Orchestrated => Box::new(OrchestratedStrategy),
        PipelineVariant::MonolithicCanonical => {
            Box::new(MonolithicStrategy::new(MonolithicMode::Canonical))
        }
        PipelineVariant::MonolithicDynamic => {
            Box::new(MonolithicStrategy::new(MonolithicMode::Dynamic))
        }
    }
}

// ---------------------------------------------------------------------------
// Shared intake helpers
// ---------------------------------------------------------------------------

/// Fail-fast verdict intake: an out-of-range truth percentage from a
/// collaborator is a contract violation, not a value to repair. Confidence
/// and per-boundary findings are defensively clamped — the downstream
/// guards adjust them anyway.
pub(crate) fn intake_verdict(claim_id: &str, draft: VerdictDraft) -> Result<verity_common::ClaimVerdict> {
    let truth = verity_analysis::scores::validate_truth_percentage(draft.truth_percentage)?;
    Ok(verity_common::ClaimVerdict {
        claim_id: claim_id.to_string(),
        truth_percentage: truth,
        confidence: draft.confidence.clamp(0.0, 100.0),
        verdict: draft.verdict,
        reasoning: draft.reasoning,
        supporting_evidence: draft.supporting_evidence,
        contradicting_evidence: draft.contradicting_evidence,
        boundary_findings: draft
            .boundary_findings
            .into_iter()
            .map(|f| verity_common::BoundaryFinding {
                boundary_id: f.boundary_id,
                truth_percentage: verity_analysis::scores::clamp_truth_percentage(
                    f.truth_percentage,
                ),
                note: f.note,
            })
            .collect(),
    })
}

/// Normalize source-reliability scores at intake so everything downstream
/// sees the 0-1 scale.
pub(crate) fn normalize_evidence(items: Vec<EvidenceItem>) -> Vec<EvidenceItem> {
    items
        .into_iter()
        .map(|mut e| {
            if let Some(r) = e.source_reliability {
                e.source_reliability = Some(verity_analysis::scores::normalize_track_record_score(r));
            }
            e
        })
        .collect()
}
