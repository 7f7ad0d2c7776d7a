//! Evidence grounding: does a verdict's reasoning actually trace back to
//! the evidence it cites?

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use verity_common::{ClaimVerdict, EvidenceItem, GROUNDING_CONFIDENCE_FLOOR};

use crate::traits::TextAnalyst;

static TERM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "and", "that", "this", "with", "from", "have", "has", "had", "was", "were", "are",
    "been", "being", "will", "would", "could", "should", "because", "therefore", "however",
    "which", "while", "where", "when", "their", "there", "these", "those", "than", "then",
    "into", "over", "under", "about", "after", "before", "between", "during", "does", "did",
    "not", "but", "for", "its", "it", "is", "of", "to", "in", "on", "as", "by", "an", "a",
    "claim", "evidence", "source", "sources", "states", "stated", "according", "suggests",
    "indicates", "shows",
];

/// Deterministic key-term extraction used when the LLM-backed extraction
/// fails: lowercase alphanumeric runs of length >= 4, stop words excluded,
/// first occurrence wins.
pub fn fallback_key_terms(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = std::collections::HashSet::new();
    let mut terms = Vec::new();
    for m in TERM_RE.find_iter(&lower) {
        let term = m.as_str();
        if term.len() < 4 || STOP_WORDS.contains(&term) {
            continue;
        }
        if seen.insert(term.to_string()) {
            terms.push(term.to_string());
        }
    }
    terms
}

/// Fraction of terms that appear in the cited evidence statements.
/// A verdict with no extractable terms is not penalized: ratio 1.0.
pub fn grounding_ratio(terms: &[String], cited_statements: &[&str]) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let haystacks: Vec<String> = cited_statements.iter().map(|s| s.to_lowercase()).collect();
    let grounded = terms
        .iter()
        .filter(|t| haystacks.iter().any(|h| h.contains(t.as_str())))
        .count();
    grounded as f64 / terms.len() as f64
}

#[derive(Debug, Clone)]
pub struct GroundingConfig {
    pub enabled: bool,
    /// Ratios at or above this are left alone.
    pub threshold: f64,
    /// Ratios below this are treated as this — the penalty bottoms out.
    pub ratio_floor: f64,
    /// Penalty (confidence points) at the ratio floor.
    pub max_penalty: f64,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.6,
            ratio_floor: 0.2,
            max_penalty: 30.0,
        }
    }
}

/// Outcome of `apply_grounding_penalty`. `penalty` is the confidence actually
/// removed, which may be less than the computed penalty when the floor bites.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundingAdjustment {
    pub adjusted_confidence: f64,
    pub applied: bool,
    pub penalty: f64,
}

/// Reduce confidence in proportion to how far the grounding ratio falls
/// below the threshold. Pure: no side effects. No-op when disabled or when
/// the ratio clears the threshold; the result never drops below the
/// grounding confidence floor.
pub fn apply_grounding_penalty(
    confidence: f64,
    ratio: f64,
    cfg: &GroundingConfig,
) -> GroundingAdjustment {
    if !cfg.enabled || ratio >= cfg.threshold {
        return GroundingAdjustment {
            adjusted_confidence: confidence,
            applied: false,
            penalty: 0.0,
        };
    }

    let clamped_ratio = ratio.max(cfg.ratio_floor);
    let severity = (cfg.threshold - clamped_ratio) / (cfg.threshold - cfg.ratio_floor);
    let adjusted =
        (confidence - cfg.max_penalty * severity).max(GROUNDING_CONFIDENCE_FLOOR);
    let penalty = confidence - adjusted;

    GroundingAdjustment {
        adjusted_confidence: adjusted,
        applied: penalty > 0.0,
        penalty,
    }
}

/// Per-verdict grounding outcome from a batch pass.
#[derive(Debug, Clone)]
pub struct VerdictGrounding {
    pub claim_id: String,
    pub ratio: f64,
    pub terms_total: usize,
    pub terms_grounded: usize,
    pub adjustment: GroundingAdjustment,
}

/// Ground a batch of verdicts in one collaborator call, falling back to
/// deterministic tokenization when that call fails. Terms are matched only
/// against evidence each verdict cites — uncited evidence never grounds a
/// term.
pub async fn ground_verdicts(
    analyst: &dyn TextAnalyst,
    verdicts: &[ClaimVerdict],
    evidence_by_id: &HashMap<String, EvidenceItem>,
    cfg: &GroundingConfig,
) -> Vec<VerdictGrounding> {
    let batch: Vec<(String, String)> = verdicts
        .iter()
        .map(|v| (v.claim_id.clone(), v.reasoning.clone()))
        .collect();

    let extracted: HashMap<String, Vec<String>> = match analyst.extract_key_terms(&batch).await {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "Key-term extraction failed, using deterministic fallback");
            batch
                .iter()
                .map(|(id, reasoning)| (id.clone(), fallback_key_terms(reasoning)))
                .collect()
        }
    };

    verdicts
        .iter()
        .map(|v| {
            let terms = extracted
                .get(&v.claim_id)
                .cloned()
                .unwrap_or_else(|| fallback_key_terms(&v.reasoning));
            let cited: Vec<&str> = v
                .cited_evidence()
                .filter_map(|id| evidence_by_id.get(id).map(|e| e.statement.as_str()))
                .collect();
            let ratio = grounding_ratio(&terms, &cited);
            let grounded = (ratio * terms.len() as f64).round() as usize;
            VerdictGrounding {
                claim_id: v.claim_id.clone(),
                ratio,
                terms_total: terms.len(),
                terms_grounded: grounded,
                adjustment: apply_grounding_penalty(v.confidence, ratio, cfg),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_terms_are_lowercased_deduped_and_filtered() {
        let terms = fallback_key_terms(
            "The vaccine trial showed vaccine efficacy above 90% in the trial cohort.",
        );
        assert_eq!(
            terms,
            vec!["vaccine", "trial", "showed", "efficacy", "above", "cohort"]
        );
    }

    #[test]
    fn ratio_counts_only_cited_statements() {
        let terms = vec!["efficacy".to_string(), "cohort".to_string()];
        let cited = vec!["Trial efficacy was 94%"];
        assert!((grounding_ratio(&terms, &cited) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_terms_means_ratio_one() {
        assert_eq!(grounding_ratio(&[], &["anything"]), 1.0);
    }

    #[test]
    fn penalty_noop_above_threshold_and_when_disabled() {
        let cfg = GroundingConfig::default();
        let adj = apply_grounding_penalty(80.0, cfg.threshold, &cfg);
        assert!(!adj.applied);
        assert_eq!(adj.adjusted_confidence, 80.0);

        let disabled = GroundingConfig {
            enabled: false,
            ..GroundingConfig::default()
        };
        let adj = apply_grounding_penalty(80.0, 0.0, &disabled);
        assert!(!adj.applied);
        assert_eq!(adj.penalty, 0.0);
    }

    #[test]
    fn ratio_zero_and_ratio_floor_are_equivalent() {
        let cfg = GroundingConfig::default();
        let at_zero = apply_grounding_penalty(80.0, 0.0, &cfg);
        let at_floor = apply_grounding_penalty(80.0, cfg.ratio_floor, &cfg);
        assert_eq!(at_zero, at_floor);
        assert!(at_zero.applied);
    }

    #[test]
    fn confidence_never_drops_below_the_floor() {
        let cfg = GroundingConfig::default();
        let adj = apply_grounding_penalty(10.0, 0.0, &cfg);
        assert_eq!(adj.adjusted_confidence, GROUNDING_CONFIDENCE_FLOOR);
        // Reported penalty is the actual reduction, not the computed one.
        assert!((adj.penalty - 5.0).abs() < 1e-9);
    }

    #[test]
    fn penalty_scales_with_severity() {
        let cfg = GroundingConfig::default();
        let mild = apply_grounding_penalty(80.0, 0.5, &cfg);
        let severe = apply_grounding_penalty(80.0, 0.25, &cfg);
        assert!(mild.applied && severe.applied);
        assert!(severe.penalty > mild.penalty);
    }
}
