//! Article-level aggregation: coverage matrix, combined verdict, and the
//! quality-gate snapshot.

use std::collections::{HashMap, HashSet};

use verity_common::{
    confidence_tier, verdict_label, ArticleVerdict, Boundary, Claim, ClaimVerdict,
    ConfidenceStats, ConfidenceTier, CoverageMatrix, EvidenceItem, EvidenceVolumeStats,
    QualityGates, VerityError, MIN_DISTINCT_SOURCES, MIN_EVIDENCE_ITEMS,
};

use crate::scores::clamp_truth_percentage;

/// Build the claims x boundaries evidence-count matrix. Evidence whose
/// boundary tag is missing or unrecognized counts under the unassigned
/// column (always present, see `understanding::assemble`).
pub fn build_coverage(
    claims: &[Claim],
    boundaries: &[Boundary],
    evidence_by_claim: &HashMap<String, Vec<EvidenceItem>>,
) -> Result<CoverageMatrix, VerityError> {
    let known: HashSet<String> = boundaries.iter().map(|b| b.id.clone()).collect();

    let counts: Vec<Vec<u32>> = claims
        .iter()
        .map(|claim| {
            let evidence = evidence_by_claim
                .get(&claim.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            boundaries
                .iter()
                .map(|b| {
                    evidence
                        .iter()
                        .filter(|e| {
                            verity_common::resolve_boundary_id(e.boundary_id.as_deref(), &known)
                                == b.id
                        })
                        .count() as u32
                })
                .collect()
        })
        .collect();

    CoverageMatrix::new(
        claims.iter().map(|c| c.id.clone()).collect(),
        boundaries.iter().map(|b| b.id.clone()).collect(),
        counts,
    )
}

/// Combine per-claim verdicts into the article verdict. Central claims carry
/// double weight, and each claim's pull scales with its confidence. Truth
/// inputs are clamped here — defensive math over already-validated values.
pub fn aggregate_article(claims: &[Claim], verdicts: &[ClaimVerdict]) -> ArticleVerdict {
    if verdicts.is_empty() {
        return ArticleVerdict {
            truth_percentage: 0.0,
            confidence: 0.0,
            verdict: "unverified".to_string(),
            summary: "No claims survived analysis.".to_string(),
        };
    }

    let central: HashSet<&str> = claims
        .iter()
        .filter(|c| c.is_central)
        .map(|c| c.id.as_str())
        .collect();

    let mut truth_sum = 0.0;
    let mut truth_weight = 0.0;
    let mut conf_sum = 0.0;
    let mut conf_weight = 0.0;
    for v in verdicts {
        let centrality = if central.contains(v.claim_id.as_str()) {
            2.0
        } else {
            1.0
        };
        let w = centrality * (v.confidence.clamp(0.0, 100.0) / 100.0).max(0.05);
        truth_sum += w * clamp_truth_percentage(v.truth_percentage);
        truth_weight += w;
        conf_sum += centrality * v.confidence.clamp(0.0, 100.0);
        conf_weight += centrality;
    }

    let truth = clamp_truth_percentage(truth_sum / truth_weight);
    let confidence = (conf_sum / conf_weight).clamp(0.0, 100.0);

    ArticleVerdict {
        truth_percentage: truth,
        confidence,
        verdict: verdict_label(truth).to_string(),
        summary: format!(
            "Combined verdict across {} claims ({} central).",
            verdicts.len(),
            central.len()
        ),
    }
}

/// Evidence-volume and search-effort inputs to gate 1, tallied by the
/// strategy that gathered them.
#[derive(Debug, Clone, Default)]
pub struct GateInputs {
    pub evidence_items: usize,
    pub distinct_sources: usize,
    pub searches_performed: u32,
    pub contradiction_search_performed: bool,
}

/// Compute the pass/fail snapshot. Central claims stay in the publishable
/// set even at the low confidence tier; `central_kept` tracks how often
/// that exception fired.
pub fn compute_quality_gates(
    claims: &[Claim],
    verdicts: &[ClaimVerdict],
    inputs: &GateInputs,
) -> QualityGates {
    let gate1_passed = inputs.evidence_items >= MIN_EVIDENCE_ITEMS
        && inputs.distinct_sources >= MIN_DISTINCT_SOURCES
        && inputs.searches_performed > 0
        && inputs.contradiction_search_performed;
    let gate1 = EvidenceVolumeStats {
        evidence_items: inputs.evidence_items,
        distinct_sources: inputs.distinct_sources,
        searches_performed: inputs.searches_performed,
        contradiction_search_performed: inputs.contradiction_search_performed,
        passed: gate1_passed,
    };

    let central: HashSet<&str> = claims
        .iter()
        .filter(|c| c.is_central)
        .map(|c| c.id.as_str())
        .collect();

    let (mut high, mut moderate, mut low) = (0usize, 0usize, 0usize);
    let mut publishable = 0usize;
    let mut central_kept = 0usize;
    for v in verdicts {
        match confidence_tier(v.confidence) {
            ConfidenceTier::High => {
                high += 1;
                publishable += 1;
            }
            ConfidenceTier::Moderate => {
                moderate += 1;
                publishable += 1;
            }
            ConfidenceTier::Low => {
                low += 1;
                if central.contains(v.claim_id.as_str()) {
                    publishable += 1;
                    central_kept += 1;
                }
            }
        }
    }
    let gate4_passed = publishable > 0;
    let gate4 = ConfidenceStats {
        high,
        moderate,
        low,
        publishable,
        central_kept,
        passed: gate4_passed,
    };

    let passed = gate1_passed && gate4_passed;
    let summary = format!(
        "gate1 {}: {} evidence items from {} sources, {} searches, contradiction search {}; gate4 {}: {}/{} verdicts publishable ({} central kept at low tier)",
        if gate1_passed { "passed" } else { "failed" },
        inputs.evidence_items,
        inputs.distinct_sources,
        inputs.searches_performed,
        if inputs.contradiction_search_performed { "done" } else { "skipped" },
        if gate4_passed { "passed" } else { "failed" },
        publishable,
        verdicts.len(),
        central_kept,
    );

    QualityGates {
        passed,
        gate1_stats: gate1,
        gate4_stats: gate4,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_common::{ClaimDirection, ProbativeValue, UNASSIGNED_BOUNDARY};

    fn claim(id: &str, central: bool, boundary: Option<&str>) -> Claim {
        Claim {
            id: id.to_string(),
            text: format!("claim {id}"),
            is_central: central,
            category: "factual".to_string(),
            boundary_id: boundary.map(String::from),
        }
    }

    fn verdict(claim_id: &str, truth: f64, confidence: f64) -> ClaimVerdict {
        ClaimVerdict {
            claim_id: claim_id.to_string(),
            truth_percentage: truth,
            confidence,
            verdict: verdict_label(truth).to_string(),
            reasoning: String::new(),
            supporting_evidence: Vec::new(),
            contradicting_evidence: Vec::new(),
            boundary_findings: Vec::new(),
        }
    }

    fn evidence(id: &str, boundary: Option<&str>) -> EvidenceItem {
        EvidenceItem {
            id: id.to_string(),
            statement: format!("statement {id}"),
            source_id: format!("src_{id}"),
            boundary_id: boundary.map(String::from),
            claim_direction: ClaimDirection::Supports,
            probative_value: ProbativeValue::Medium,
            source_reliability: None,
        }
    }

    fn frames() -> Vec<Boundary> {
        vec![
            Boundary {
                id: "ctx_1_eu".into(),
                name: "EU".into(),
                short_name: "eu".into(),
                constituent_scopes: Vec::new(),
                internal_coherence: 1.0,
            },
            Boundary::unassigned(),
        ]
    }

    #[test]
    fn coverage_dimensions_match_inputs_for_all_shapes() {
        for n_claims in 0..4usize {
            let claims: Vec<Claim> = (0..n_claims)
                .map(|i| claim(&format!("c{i}"), false, None))
                .collect();
            let boundaries = frames();
            let mut by_claim = HashMap::new();
            for (i, c) in claims.iter().enumerate() {
                by_claim.insert(
                    c.id.clone(),
                    (0..i).map(|j| evidence(&format!("e{i}_{j}"), None)).collect(),
                );
            }
            let m = build_coverage(&claims, &boundaries, &by_claim).unwrap();
            assert_eq!(m.counts.len(), claims.len());
            for row in &m.counts {
                assert_eq!(row.len(), boundaries.len());
            }
        }
    }

    #[test]
    fn unrecognized_evidence_boundary_counts_as_unassigned() {
        let claims = vec![claim("c1", false, None)];
        let boundaries = frames();
        let mut by_claim = HashMap::new();
        by_claim.insert(
            "c1".to_string(),
            vec![
                evidence("e1", Some("ctx_1_eu")),
                evidence("e2", Some("ctx_from_another_run")),
                evidence("e3", None),
            ],
        );

        let m = build_coverage(&claims, &boundaries, &by_claim).unwrap();
        let unassigned_col = m
            .boundary_ids
            .iter()
            .position(|b| b == UNASSIGNED_BOUNDARY)
            .unwrap();
        assert_eq!(m.count(0, 0), 1);
        assert_eq!(m.count(0, unassigned_col), 2);
    }

    #[test]
    fn central_claims_pull_the_article_verdict_harder() {
        let claims = vec![claim("c1", true, None), claim("c2", false, None)];
        let verdicts = vec![verdict("c1", 90.0, 80.0), verdict("c2", 10.0, 80.0)];
        let article = aggregate_article(&claims, &verdicts);
        assert!(article.truth_percentage > 50.0);
        assert_eq!(article.verdict, verdict_label(article.truth_percentage));
    }

    #[test]
    fn empty_verdicts_yield_unverified() {
        let article = aggregate_article(&[], &[]);
        assert_eq!(article.verdict, "unverified");
        assert_eq!(article.truth_percentage, 0.0);
    }

    #[test]
    fn gate1_requires_volume_and_contradiction_search() {
        let gates = compute_quality_gates(
            &[],
            &[],
            &GateInputs {
                evidence_items: 5,
                distinct_sources: 3,
                searches_performed: 4,
                contradiction_search_performed: false,
            },
        );
        assert!(!gates.gate1_stats.passed);
        assert!(!gates.passed);
    }

    #[test]
    fn low_tier_central_claims_are_kept_publishable() {
        let claims = vec![claim("c1", true, None), claim("c2", false, None)];
        let verdicts = vec![verdict("c1", 80.0, 20.0), verdict("c2", 60.0, 20.0)];
        let gates = compute_quality_gates(
            &claims,
            &verdicts,
            &GateInputs {
                evidence_items: 5,
                distinct_sources: 3,
                searches_performed: 4,
                contradiction_search_performed: true,
            },
        );
        assert_eq!(gates.gate4_stats.low, 2);
        assert_eq!(gates.gate4_stats.publishable, 1);
        assert_eq!(gates.gate4_stats.central_kept, 1);
        assert!(gates.gate4_stats.passed);
        assert!(gates.passed);
    }
}
