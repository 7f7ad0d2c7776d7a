//! HTTP-backed collaborator implementations. The analysis and search
//! services own their prompts and heuristics; these clients only carry the
//! structured request/response contract.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use verity_analysis::{
    AnalysisDraft, BoundaryDraft, DecomposedClaim, Decomposition, EvidencePolicy,
    EvidenceSearcher, MonolithicMode, TextAnalyst, TextPair, VerdictDraft,
};
use verity_common::{Boundary, Claim, EvidenceItem};

async fn post_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<T> {
    let resp = http.post(url).json(body).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!("{url} returned {status}: {text}");
    }
    Ok(resp.json::<T>().await?)
}

pub struct HttpTextAnalyst {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTextAnalyst {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct BoundariesResponse {
    boundaries: Vec<BoundaryDraft>,
}

#[derive(Deserialize)]
struct KeyTermsResponse {
    terms: HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct ScoresResponse {
    scores: Vec<serde_json::Value>,
}

#[async_trait]
impl TextAnalyst for HttpTextAnalyst {
    async fn decompose(&self, input: &str) -> Result<Decomposition> {
        let url = format!("{}/v1/decompose", self.base_url);
        post_json(&self.http, &url, &json!({ "input": input })).await
    }

    async fn detect_boundaries(
        &self,
        input: &str,
        claims: &[DecomposedClaim],
    ) -> Result<Vec<BoundaryDraft>> {
        let url = format!("{}/v1/boundaries", self.base_url);
        let resp: BoundariesResponse =
            post_json(&self.http, &url, &json!({ "input": input, "claims": claims })).await?;
        Ok(resp.boundaries)
    }

    async fn grade_claim(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
        policy: EvidencePolicy,
    ) -> Result<VerdictDraft> {
        let url = format!("{}/v1/grade", self.base_url);
        post_json(
            &self.http,
            &url,
            &json!({
                "claim": claim,
                "evidence": evidence,
                "policy": policy,
                "framing": policy.framing(),
            }),
        )
        .await
    }

    async fn extract_key_terms(
        &self,
        reasonings: &[(String, String)],
    ) -> Result<HashMap<String, Vec<String>>> {
        let url = format!("{}/v1/key-terms", self.base_url);
        let items: Vec<serde_json::Value> = reasonings
            .iter()
            .map(|(id, reasoning)| json!({ "id": id, "reasoning": reasoning }))
            .collect();
        let resp: KeyTermsResponse =
            post_json(&self.http, &url, &json!({ "items": items })).await?;
        Ok(resp.terms)
    }

    async fn score_pairs(&self, pairs: &[TextPair]) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/v1/similarity", self.base_url);
        let resp: ScoresResponse =
            post_json(&self.http, &url, &json!({ "pairs": pairs })).await?;
        Ok(resp.scores)
    }

    async fn full_analysis(
        &self,
        input: &str,
        mode: MonolithicMode,
        policy: EvidencePolicy,
    ) -> Result<AnalysisDraft> {
        let url = format!("{}/v1/full-analysis", self.base_url);
        post_json(
            &self.http,
            &url,
            &json!({
                "input": input,
                "mode": mode,
                "policy": policy,
                "framing": policy.framing(),
            }),
        )
        .await
    }
}

pub struct HttpEvidenceSearcher {
    base_url: String,
    http: reqwest::Client,
}

impl HttpEvidenceSearcher {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct EvidenceResponse {
    evidence: Vec<EvidenceItem>,
}

#[async_trait]
impl EvidenceSearcher for HttpEvidenceSearcher {
    async fn gather(&self, claim: &Claim, boundaries: &[Boundary]) -> Result<Vec<EvidenceItem>> {
        let url = format!("{}/v1/gather", self.base_url);
        let resp: EvidenceResponse = post_json(
            &self.http,
            &url,
            &json!({ "claim": claim, "boundaries": boundaries }),
        )
        .await?;
        Ok(resp.evidence)
    }

    async fn contradiction_search(&self, claim: &Claim) -> Result<Vec<EvidenceItem>> {
        let url = format!("{}/v1/contradictions", self.base_url);
        let resp: EvidenceResponse =
            post_json(&self.http, &url, &json!({ "claim": claim })).await?;
        Ok(resp.evidence)
    }
}
