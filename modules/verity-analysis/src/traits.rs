//! Collaborator seams. The harness owns these contracts; prompt wording and
//! scoring heuristics live on the other side of them.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use verity_common::{Boundary, Claim, EvidenceItem};

/// Whether collaborators may lean on model knowledge or must argue from
/// gathered evidence alone. Selects the framing handed to the text-analysis
/// capability; it never changes guard corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidencePolicy {
    EvidenceOnly,
    ModelKnowledgeAllowed,
}

impl EvidencePolicy {
    pub fn framing(&self) -> &'static str {
        match self {
            Self::EvidenceOnly => {
                "Argue strictly from the supplied evidence. Do not draw on background knowledge."
            }
            Self::ModelKnowledgeAllowed => {
                "Prefer the supplied evidence; background knowledge may fill gaps when flagged as such."
            }
        }
    }
}

/// Which one-shot analysis contract a monolithic run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonolithicMode {
    Canonical,
    Dynamic,
}

// ---------------------------------------------------------------------------
// Structured response payloads
// ---------------------------------------------------------------------------

/// A claim as proposed by the decomposition collaborator. Ids are assigned
/// by the understanding phase, not by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecomposedClaim {
    pub text: String,
    /// Whether this claim is central to the input's overall assertion.
    #[serde(default)]
    pub is_central: bool,
    /// Claim category, e.g. "factual", "causal", "predictive".
    #[serde(default)]
    pub category: Option<String>,
    /// Collaborator's best guess at a boundary. Resolved against detected
    /// boundaries; anything unrecognized lands in the unassigned frame.
    #[serde(default)]
    pub boundary_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Decomposition {
    pub claims: Vec<DecomposedClaim>,
    /// Whether the truth of this input can drift with time.
    #[serde(default)]
    pub recency_sensitive: bool,
}

/// A boundary as proposed by the detection collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BoundaryDraft {
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub constituent_scopes: Vec<String>,
    #[serde(default = "default_coherence")]
    pub internal_coherence: f64,
}

fn default_coherence() -> f64 {
    1.0
}

/// A verdict as produced by the grading collaborator, before fail-fast
/// range validation at intake.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VerdictDraft {
    pub truth_percentage: f64,
    pub confidence: f64,
    pub verdict: String,
    pub reasoning: String,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    #[serde(default)]
    pub contradicting_evidence: Vec<String>,
    /// How the claim fares inside each analytical frame separately.
    #[serde(default)]
    pub boundary_findings: Vec<BoundaryFindingDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BoundaryFindingDraft {
    pub boundary_id: String,
    pub truth_percentage: f64,
    #[serde(default)]
    pub note: Option<String>,
}

/// The one-shot monolithic analysis response: the whole claim -> verdict
/// contract in a single exchange.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisDraft {
    pub claims: Vec<DecomposedClaim>,
    #[serde(default)]
    pub boundaries: Vec<BoundaryDraft>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    /// One verdict per claim, in claim order.
    pub verdicts: Vec<VerdictDraft>,
    #[serde(default)]
    pub recency_sensitive: bool,
    #[serde(default)]
    pub searches_performed: u32,
    #[serde(default)]
    pub contradiction_search_performed: bool,
}

/// One pair of texts submitted for similarity scoring.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextPair {
    pub id: String,
    pub left: String,
    pub right: String,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The external text-analysis capability (LLM-backed).
#[async_trait]
pub trait TextAnalyst: Send + Sync {
    /// Decompose input into atomic claims.
    async fn decompose(&self, input: &str) -> Result<Decomposition>;

    /// Detect the analytical frames under which the claims must be judged.
    /// Runs before claim ids exist, so it sees the decomposed drafts.
    async fn detect_boundaries(
        &self,
        input: &str,
        claims: &[DecomposedClaim],
    ) -> Result<Vec<BoundaryDraft>>;

    /// Grade one claim against its gathered evidence.
    async fn grade_claim(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
        policy: EvidencePolicy,
    ) -> Result<VerdictDraft>;

    /// Extract key terms from a batch of verdict reasonings in one call.
    /// Keys of the input and output maps are verdict (claim) ids.
    async fn extract_key_terms(
        &self,
        reasonings: &[(String, String)],
    ) -> Result<HashMap<String, Vec<String>>>;

    /// Score a chunk of text pairs for similarity. Returns raw entries;
    /// length and schema validation is the caller's responsibility.
    async fn score_pairs(&self, pairs: &[TextPair]) -> Result<Vec<serde_json::Value>>;

    /// Run the entire analysis as a single exchange (monolithic variants).
    async fn full_analysis(
        &self,
        input: &str,
        mode: MonolithicMode,
        policy: EvidencePolicy,
    ) -> Result<AnalysisDraft>;
}

/// The external evidence-gathering capability (search-backed).
#[async_trait]
pub trait EvidenceSearcher: Send + Sync {
    /// Gather evidence bearing on a claim, tagged per boundary where the
    /// collaborator can tell.
    async fn gather(&self, claim: &Claim, boundaries: &[Boundary]) -> Result<Vec<EvidenceItem>>;

    /// Deliberately search for evidence *against* the claim.
    async fn contradiction_search(&self, claim: &Claim) -> Result<Vec<EvidenceItem>>;
}
