//! The canonical multi-stage strategy: understand -> gather -> grade ->
//! guard -> aggregate. Also the fallback target for the monolithic
//! variants.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use verity_analysis::aggregate::{
    aggregate_article, build_coverage, compute_quality_gates, GateInputs,
};
use verity_analysis::grounding::ground_verdicts;
use verity_analysis::temporal::apply_recency_guard;
use verity_analysis::understanding::{
    assemble, dedup_claims, heuristic_boundaries, normalize_question,
};
use verity_common::{AnalysisReport, ClaimVerdict, EvidenceItem, InputType, PipelineVariant};

use super::{
    intake_verdict, normalize_evidence, AnalysisInput, AnalysisStrategy, ProgressSink,
    StrategyContext,
};

pub struct OrchestratedStrategy;

#[async_trait]
impl AnalysisStrategy for OrchestratedStrategy {
    fn variant(&self) -> PipelineVariant {
        PipelineVariant::Orchestrated
    }

    async fn execute(
        &self,
        input: &AnalysisInput,
        ctx: &StrategyContext,
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisReport> {
        // Question normalization only makes sense for free text.
        let normalized = match input.input_type {
            InputType::Text => normalize_question(&input.value, &ctx.normalization),
            InputType::Url => input.value.clone(),
        };
        progress.progress(5, "input normalized").await;

        let decomposition = ctx.analyst.decompose(&normalized).await?;
        progress
            .progress(
                20,
                &format!("decomposed into {} claims", decomposition.claims.len()),
            )
            .await;

        let drafts = match heuristic_boundaries(&normalized) {
            Some(drafts) => drafts,
            None => {
                ctx.analyst
                    .detect_boundaries(&normalized, &decomposition.claims)
                    .await?
            }
        };
        let mut understanding = assemble(decomposition, drafts);
        understanding.claims =
            dedup_claims(ctx.analyst.as_ref(), understanding.claims).await;
        progress
            .progress(
                30,
                &format!("{} analytical boundaries detected", understanding.boundaries.len()),
            )
            .await;

        // Evidence gathering. Central claims additionally get a deliberate
        // contradiction search.
        let mut evidence_by_claim: HashMap<String, Vec<EvidenceItem>> = HashMap::new();
        let mut searches_performed = 0u32;
        let mut contradiction_search_performed = false;
        for claim in &understanding.claims {
            let mut gathered = normalize_evidence(
                ctx.searcher
                    .gather(claim, &understanding.boundaries)
                    .await?,
            );
            searches_performed += 1;

            if claim.is_central {
                gathered.extend(normalize_evidence(
                    ctx.searcher.contradiction_search(claim).await?,
                ));
                searches_performed += 1;
                contradiction_search_performed = true;
            }

            evidence_by_claim.insert(claim.id.clone(), gathered);
        }
        progress.progress(55, "evidence gathered").await;

        let mut verdicts: Vec<ClaimVerdict> = Vec::with_capacity(understanding.claims.len());
        for claim in &understanding.claims {
            let evidence = evidence_by_claim
                .get(&claim.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let draft = ctx.analyst.grade_claim(claim, evidence, ctx.policy).await?;
            verdicts.push(intake_verdict(&claim.id, draft)?);
        }
        progress.progress(75, "claims graded").await;

        let evidence_by_id: HashMap<String, EvidenceItem> = evidence_by_claim
            .values()
            .flatten()
            .map(|e| (e.id.clone(), e.clone()))
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

        let distinct_sources: HashSet<&str> = evidence_by_id
            .values()
            .map(|e| e.source_id.as_str())
            .collect();
        let gates = compute_quality_gates(
            &understanding.claims,
            &verdicts,
            &GateInputs {
                evidence_items: evidence_by_id.len(),
                distinct_sources: distinct_sources.len(),
                searches_performed,
                contradiction_search_performed,
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
            variant: PipelineVariant::Orchestrated,
            pipeline_fallback: false,
            fallback_reason: None,
            searches_performed,
            contradiction_search_performed,
        })
    }
}
