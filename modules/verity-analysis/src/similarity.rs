//! Chunked, retrying pairwise similarity scoring.
//!
//! A pair whose score cannot be obtained is left absent from the result
//! map. Callers must pick an explicit conservative default per call site
//! (`unwrap_or`) — "missing" is a distinct signal from "score 0".

use std::collections::HashMap;

use tracing::warn;

use crate::traits::{TextAnalyst, TextPair};

pub const DEFAULT_CHUNK_SIZE: usize = 25;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct SimilarityScorer {
    chunk_size: usize,
    max_retries: u32,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SimilarityScorer {
    pub fn new(chunk_size: usize, max_retries: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_retries: max_retries.max(1),
        }
    }

    /// Score all pairs, chunked. The same retry budget covers thrown
    /// errors, length mismatches, and schema-invalid responses. An
    /// exhausted chunk leaves all its pairs absent; a non-numeric entry in
    /// an otherwise-valid array leaves only that pair absent.
    pub async fn score(
        &self,
        analyst: &dyn TextAnalyst,
        pairs: &[TextPair],
    ) -> HashMap<String, f64> {
        let mut scores = HashMap::new();

        for chunk in pairs.chunks(self.chunk_size) {
            let mut entries = None;
            for attempt in 1..=self.max_retries {
                match analyst.score_pairs(chunk).await {
                    Ok(e) if e.len() == chunk.len() => {
                        entries = Some(e);
                        break;
                    }
                    Ok(e) => {
                        warn!(
                            attempt,
                            expected = chunk.len(),
                            got = e.len(),
                            "Similarity chunk length mismatch"
                        );
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Similarity chunk failed");
                    }
                }
            }

            match entries {
                Some(entries) => {
                    for (pair, entry) in chunk.iter().zip(entries) {
                        match entry.as_f64() {
                            Some(n) => {
                                scores.insert(pair.id.clone(), n.clamp(0.0, 1.0));
                            }
                            None => {
                                warn!(pair_id = %pair.id, "Non-numeric similarity entry, pair left unscored");
                            }
                        }
                    }
                }
                None => {
                    warn!(
                        pairs = chunk.len(),
                        retries = self.max_retries,
                        "Similarity chunk exhausted retries, pairs left unscored"
                    );
                }
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap as Map;
    use std::sync::Mutex;

    use crate::traits::{
        AnalysisDraft, BoundaryDraft, Decomposition, EvidencePolicy, MonolithicMode, VerdictDraft,
    };
    use verity_common::{Claim, EvidenceItem};

    /// Scripted analyst: pops the next canned response per score_pairs call.
    struct ScriptedAnalyst {
        responses: Mutex<Vec<Result<Vec<serde_json::Value>>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedAnalyst {
        fn new(responses: Vec<Result<Vec<serde_json::Value>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TextAnalyst for ScriptedAnalyst {
        async fn decompose(&self, _input: &str) -> Result<Decomposition> {
            unimplemented!()
        }
        async fn detect_boundaries(
            &self,
            _input: &str,
            _claims: &[crate::traits::DecomposedClaim],
        ) -> Result<Vec<BoundaryDraft>> {
            unimplemented!()
        }
        async fn grade_claim(
            &self,
            _claim: &Claim,
            _evidence: &[EvidenceItem],
            _policy: EvidencePolicy,
        ) -> Result<VerdictDraft> {
            unimplemented!()
        }
        async fn extract_key_terms(
            &self,
            _reasonings: &[(String, String)],
        ) -> Result<Map<String, Vec<String>>> {
            unimplemented!()
        }
        async fn score_pairs(&self, _pairs: &[TextPair]) -> Result<Vec<serde_json::Value>> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                bail!("script exhausted");
            }
            responses.remove(0)
        }
        async fn full_analysis(
            &self,
            _input: &str,
            _mode: MonolithicMode,
            _policy: EvidencePolicy,
        ) -> Result<AnalysisDraft> {
            unimplemented!()
        }
    }

    fn pairs(n: usize) -> Vec<TextPair> {
        (0..n)
            .map(|i| TextPair {
                id: format!("p{i}"),
                left: format!("left {i}"),
                right: format!("right {i}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn exhausted_second_chunk_leaves_its_pairs_absent() {
        // 28 pairs: chunk of 25 succeeds, chunk of 3 fails 3 times.
        let first: Vec<serde_json::Value> = (0..25).map(|_| json!(0.5)).collect();
        let analyst = ScriptedAnalyst::new(vec![
            Ok(first),
            Err(anyhow::anyhow!("boom")),
            Err(anyhow::anyhow!("boom")),
            Err(anyhow::anyhow!("boom")),
        ]);

        let scores = SimilarityScorer::default().score(&analyst, &pairs(28)).await;
        assert_eq!(scores.len(), 25);
        for i in 0..25 {
            assert!(scores.contains_key(&format!("p{i}")));
        }
        for i in 25..28 {
            assert!(!scores.contains_key(&format!("p{i}")), "p{i} must be absent, not zero");
        }
        assert_eq!(analyst.calls(), 4);
    }

    #[tokio::test]
    async fn length_mismatch_consumes_the_same_retry_budget() {
        let analyst = ScriptedAnalyst::new(vec![
            Ok(vec![json!(0.1)]),           // wrong length for 2 pairs
            Err(anyhow::anyhow!("boom")),   // thrown error
            Ok(vec![json!(0.2), json!(0.9)]),
        ]);

        let scores = SimilarityScorer::new(25, 3).score(&analyst, &pairs(2)).await;
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["p0"], 0.2);
        assert_eq!(scores["p1"], 0.9);
    }

    #[tokio::test]
    async fn non_numeric_entry_drops_only_that_pair() {
        let analyst = ScriptedAnalyst::new(vec![Ok(vec![
            json!(0.4),
            json!("not a number"),
            json!(1.7),
        ])]);

        let scores = SimilarityScorer::default().score(&analyst, &pairs(3)).await;
        assert_eq!(analyst.calls(), 1, "valid array must not trigger a retry");
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["p0"], 0.4);
        assert!(!scores.contains_key("p1"));
        assert_eq!(scores["p2"], 1.0, "out-of-range scores are clamped");
    }

    #[tokio::test]
    async fn callers_pick_explicit_defaults_for_missing() {
        let analyst = ScriptedAnalyst::new(vec![
            Err(anyhow::anyhow!("down")),
            Err(anyhow::anyhow!("down")),
            Err(anyhow::anyhow!("down")),
        ]);
        let scores = SimilarityScorer::default().score(&analyst, &pairs(1)).await;

        // Split-avoidance treats missing as maximally similar; merge logic
        // treats missing as dissimilar. Both are call-site decisions.
        assert_eq!(scores.get("p0").copied().unwrap_or(1.0), 1.0);
        assert_eq!(scores.get("p0").copied().unwrap_or(0.0), 0.0);
    }
}
