//! Recency guard: a high truth score with no cited support is worth nothing
//! when the answer can drift with time.

use tracing::info;

use verity_common::{
    ClaimVerdict, RECENCY_HIGH_TRUTH_THRESHOLD, UNVERIFIED_CONFIDENCE_FLOOR,
    UNVERIFIED_TRUTH_CEILING,
};

#[derive(Debug, Clone)]
pub struct RecencyCorrection {
    pub claim_id: String,
    pub original_truth: f64,
    pub capped_truth: f64,
}

/// Cap uncited high-truth verdicts down to the unverified band when the
/// input is recency-sensitive. Verdicts citing supporting evidence are left
/// untouched regardless of magnitude; when recency does not matter this is
/// unconditionally a no-op.
pub fn apply_recency_guard(
    verdicts: &mut [ClaimVerdict],
    recency_sensitive: bool,
) -> Vec<RecencyCorrection> {
    if !recency_sensitive {
        return Vec::new();
    }

    let mut corrections = Vec::new();
    for v in verdicts.iter_mut() {
        if v.truth_percentage >= RECENCY_HIGH_TRUTH_THRESHOLD && v.supporting_evidence.is_empty() {
            corrections.push(RecencyCorrection {
                claim_id: v.claim_id.clone(),
                original_truth: v.truth_percentage,
                capped_truth: UNVERIFIED_TRUTH_CEILING,
            });
            info!(
                claim_id = %v.claim_id,
                original = v.truth_percentage,
                "Recency guard: capping uncited high-truth verdict"
            );
            v.truth_percentage = UNVERIFIED_TRUTH_CEILING;
            v.confidence = UNVERIFIED_CONFIDENCE_FLOOR;
            v.verdict = "unverified".to_string();
        }
    }
    corrections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(truth: f64, supporting: Vec<String>) -> ClaimVerdict {
        ClaimVerdict {
            claim_id: "claim_1".into(),
            truth_percentage: truth,
            confidence: 85.0,
            verdict: "true".into(),
            reasoning: String::new(),
            supporting_evidence: supporting,
            contradicting_evidence: Vec::new(),
            boundary_findings: Vec::new(),
        }
    }

    #[test]
    fn uncited_high_truth_is_capped() {
        let mut verdicts = vec![verdict(92.0, Vec::new())];
        let corrections = apply_recency_guard(&mut verdicts, true);
        assert_eq!(corrections.len(), 1);
        assert_eq!(verdicts[0].truth_percentage, UNVERIFIED_TRUTH_CEILING);
        assert_eq!(verdicts[0].confidence, UNVERIFIED_CONFIDENCE_FLOOR);
        assert_eq!(verdicts[0].verdict, "unverified");
    }

    #[test]
    fn cited_verdicts_are_untouched_regardless_of_magnitude() {
        let mut verdicts = vec![verdict(99.0, vec!["e1".into()])];
        let corrections = apply_recency_guard(&mut verdicts, true);
        assert!(corrections.is_empty());
        assert_eq!(verdicts[0].truth_percentage, 99.0);
    }

    #[test]
    fn below_threshold_is_untouched() {
        let mut verdicts = vec![verdict(60.0, Vec::new())];
        assert!(apply_recency_guard(&mut verdicts, true).is_empty());
        assert_eq!(verdicts[0].truth_percentage, 60.0);
    }

    #[test]
    fn noop_when_recency_does_not_matter() {
        let mut verdicts = vec![verdict(99.0, Vec::new())];
        assert!(apply_recency_guard(&mut verdicts, false).is_empty());
        assert_eq!(verdicts[0].truth_percentage, 99.0);
    }
}
