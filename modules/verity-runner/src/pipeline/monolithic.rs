//! Single-exchange strategies: the whole claim -> verdict contract comes
//! back in one collaborator response, then passes through the same guards
//! as the orchestrated path.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use verity_analysis::aggregate::{
    aggregate_article, build_coverage, compute_quality_gates, GateInputs,
};
use verity_analysis::grounding::ground_verdicts;
use verity_analysis::temporal::apply_recency_guard;
use verity_analysis::understanding::{assemble, normalize_question};
use verity_analysis::{Decomposition, MonolithicMode};
use verity_common::{
    AnalysisReport, ClaimVerdict, EvidenceItem, InputType, PipelineVariant, VerityError,
};

use super::{
    intake_verdict, normalize_evidence, AnalysisInput, AnalysisStrategy, ProgressSink,
    StrategyContext,
};

pub struct MonolithicStrategy {
    mode: MonolithicMode,
}

impl MonolithicStrategy {
    pub fn new(mode: MonolithicMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl AnalysisStrategy for MonolithicStrategy {
    fn variant(&self) -> PipelineVariant {
        match self.mode {
            MonolithicMode::Canonical => PipelineVariant::MonolithicCanonical,
            MonolithicMode::Dynamic => PipelineVariant::MonolithicDynamic,
        }
    }

    async fn execute(
        &self,
        input: &AnalysisInput,
        ctx: &StrategyContext,
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisReport> {
        let normalized = match input.input_type {
            InputType::Text => normalize_question(&input.value, &ctx.normalization),
            InputType::Url => input.value.clone(),
        };
        progress.progress(10, "running single-pass analysis").await;

        let draft = ctx
            .analyst
            .full_analysis(&normalized, self.mode, ctx.policy)
            .await?;
        progress.progress(60, "single-pass analysis returned").await;

        // Fail-fast intake: the contract is one verdict per claim.
        if draft.verdicts.len() != draft.claims.len() {
            return Err(VerityError::Validation(format!(
                "monolithic response returned {} verdicts for {} claims",
                draft.verdicts.len(),
                draft.claims.len()
            ))
            .into());
        }

        let evidence = normalize_evidence(draft.evidence);
        let understanding = assemble(
            Decomposition {
                claims: draft.claims,
                recency_sensitive: draft.recency_sensitive,
            },
            draft.boundaries,
        );

        let mut verdicts: Vec<ClaimVerdict> = Vec::with_capacity(draft.verdicts.len());
        for (claim, verdict_draft) in understanding.claims.iter().zip(draft.verdicts) {
            verdicts.push(intake_verdict(&claim.id, verdict_draft)?);
        }

        let evidence_by_id: HashMap<String, EvidenceItem> =
            evidence.iter().map(|e| (e.id.clone(), e.clone())).collect();

        // Per-claim evidence is whatever each verdict cites; the coverage
        // matrix and grounding both work off citations, never the whole
        // evidence pool.
        let evidence_by_claim: HashMap<String, Vec<EvidenceItem>> = verdicts
            .iter()
            .map(|v| {
                let cited: Vec<EvidenceItem> = v
                    .cited_evidence()
                    .filter_map(|id| evidence_by_id.get(id).cloned())
                    .collect();
                (v.claim_id.clone(), cited)
            })
            .collect();

        let groundings = ground_verdicts(
            ctx.analyst.as_ref(),
            &verdicts,
            &evidence_by_id,
            &ctx.grounding,
        )
        .await;
        for (verdict, grounding) in verdicts.iter_mut().zip(&groundings) {
            if grounding.adjustment.applied {
                info!(
                    claim_id = %verdict.claim_id,
                    ratio = grounding.ratio,
                    penalty = grounding.adjustment.penalty,
                    "Grounding penalty applied"
                );
                verdict.confidence = grounding.adjustment.adjusted_confidence;
            }
        }

        let corrections = apply_recency_guard(&mut verdicts, understanding.recency_sensitive);
        if !corrections.is_empty() {
            progress
                .warn(&format!(
                    "{} uncited high-truth verdicts capped to unverified",
                    corrections.len()
                ))
                .await;
        }
        progress.progress(85, "consistency guards applied").await;

        let coverage = build_coverage(
            &understanding.claims,
            &understanding.boundaries,
            &evidence_by_claim,
        )?;

        let distinct_sources: HashSet<&str> =
            evidence.iter().map(|e| e.source_id.as_str()).collect();
        let gates = compute_quality_gates(
            &understanding.claims,
            &verdicts,
            &GateInputs {
                evidence_items: evidence.len(),
                distinct_sources: distinct_sources.len(),
                searches_performed: draft.searches_performed,
                contradiction_search_performed: draft.contradiction_search_performed,
            },
        );
        let article = aggregate_article(&understanding.claims, &verdicts);
        progress.progress(95, "verdicts aggregated").await;

        Ok(AnalysisReport {
            article,
            claims: verdicts,
            boundaries: understanding.boundaries,
            coverage,
            gates,
            variant: self.variant(),
            pipeline_fallback: false,
            fallback_reason: None,
            searches_performed: draft.searches_performed,
            contradiction_search_performed: draft.contradiction_search_performed,
        })
    }
}
