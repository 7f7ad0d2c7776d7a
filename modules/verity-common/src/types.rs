use std::collections::HashSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VerityError;

/// Reserved boundary id for claims and evidence that could not be confidently
/// placed under a named analytical frame. Ambiguous material lands here —
/// it is never guessed into a named boundary.
pub const UNASSIGNED_BOUNDARY: &str = "ctx_unassigned";

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Url,
}

/// Severity of a status-sink log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// An analysis job as held by the authoritative job store.
///
/// The harness mutates only status and progress; the terminal result payload
/// is written once through the result sink. `pipeline_variant` stays a raw
/// string so unrecognized values survive transport — resolution (and the
/// warn-and-substitute policy) belongs to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub input_type: InputType,
    pub input_value: String,
    pub pipeline_variant: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_payload: Option<serde_json::Value>,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    Orchestrated,
    MonolithicCanonical,
    MonolithicDynamic,
}

impl PipelineVariant {
    /// Parse a requested variant string. `None` for unrecognized values —
    /// substitution is the runner's decision, not the parser's.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "orchestrated" => Some(Self::Orchestrated),
            "monolithic_canonical" => Some(Self::MonolithicCanonical),
            "monolithic_dynamic" => Some(Self::MonolithicDynamic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrated => "orchestrated",
            Self::MonolithicCanonical => "monolithic_canonical",
            Self::MonolithicDynamic => "monolithic_dynamic",
        }
    }
}

impl std::fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Claims, boundaries, evidence
// ---------------------------------------------------------------------------

/// Atomic proposition extracted from the input. Immutable once emitted by
/// the understanding phase.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    pub text: String,
    /// High-importance claims keep their place in the publishable set even
    /// at low confidence tiers.
    pub is_central: bool,
    pub category: String,
    pub boundary_id: Option<String>,
}

/// A distinct analytical frame (jurisdiction, methodology, time window)
/// under which claims and evidence must be kept separate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Boundary {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub constituent_scopes: Vec<String>,
    pub internal_coherence: f64,
}

impl Boundary {
    /// The reserved frame for material that fits no named boundary.
    pub fn unassigned() -> Self {
        Self {
            id: UNASSIGNED_BOUNDARY.to_string(),
            name: "Unassigned".to_string(),
            short_name: "unassigned".to_string(),
            constituent_scopes: Vec::new(),
            internal_coherence: 1.0,
        }
    }
}

/// Map a collaborator-provided boundary reference onto a known boundary id.
/// Missing or unrecognized references resolve to the unassigned sentinel.
pub fn resolve_boundary_id(raw: Option<&str>, known: &HashSet<String>) -> String {
    match raw {
        Some(id) if known.contains(id) => id.to_string(),
        _ => UNASSIGNED_BOUNDARY.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDirection {
    Supports,
    Contradicts,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProbativeValue {
    High,
    Medium,
    Low,
}

/// A graded piece of evidence produced by the extraction collaborator.
/// Consumed read-only by the harness.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: String,
    pub statement: String,
    pub source_id: String,
    pub boundary_id: Option<String>,
    pub claim_direction: ClaimDirection,
    pub probative_value: ProbativeValue,
    /// Source track record on a 0-1 scale. Normalized at intake; see
    /// `normalize_track_record_score`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reliability: Option<f64>,
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryFinding {
    pub boundary_id: String,
    pub truth_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-claim verdict. Truth and confidence live on 0-100 scales, enforced by
/// explicit clamping or fail-fast validation at the documented call sites.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVerdict {
    pub claim_id: String,
    pub truth_percentage: f64,
    pub confidence: f64,
    pub verdict: String,
    pub reasoning: String,
    pub supporting_evidence: Vec<String>,
    pub contradicting_evidence: Vec<String>,
    #[serde(default)]
    pub boundary_findings: Vec<BoundaryFinding>,
}

impl ClaimVerdict {
    /// Ids of all evidence this verdict actually cites, supporting and
    /// contradicting. Grounding checks must never look beyond these.
    pub fn cited_evidence(&self) -> impl Iterator<Item = &str> {
        self.supporting_evidence
            .iter()
            .chain(self.contradicting_evidence.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleVerdict {
    pub truth_percentage: f64,
    pub confidence: f64,
    pub verdict: String,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Coverage matrix
// ---------------------------------------------------------------------------

/// Claims x boundaries evidence-count matrix. Dimensions are a structural
/// invariant checked on construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageMatrix {
    pub claim_ids: Vec<String>,
    pub boundary_ids: Vec<String>,
    pub counts: Vec<Vec<u32>>,
}

impl CoverageMatrix {
    pub fn new(
        claim_ids: Vec<String>,
        boundary_ids: Vec<String>,
        counts: Vec<Vec<u32>>,
    ) -> Result<Self, VerityError> {
        if counts.len() != claim_ids.len() {
            return Err(VerityError::Validation(format!(
                "coverage matrix has {} rows for {} claims",
                counts.len(),
                claim_ids.len()
            )));
        }
        for (i, row) in counts.iter().enumerate() {
            if row.len() != boundary_ids.len() {
                return Err(VerityError::Validation(format!(
                    "coverage matrix row {} has {} columns for {} boundaries",
                    i,
                    row.len(),
                    boundary_ids.len()
                )));
            }
        }
        Ok(Self {
            claim_ids,
            boundary_ids,
            counts,
        })
    }

    pub fn count(&self, claim_idx: usize, boundary_idx: usize) -> u32 {
        self.counts[claim_idx][boundary_idx]
    }
}

// ---------------------------------------------------------------------------
// Quality gates
// ---------------------------------------------------------------------------

/// Gate 1: is there enough evidence to say anything at all?
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceVolumeStats {
    pub evidence_items: usize,
    pub distinct_sources: usize,
    pub searches_performed: u32,
    pub contradiction_search_performed: bool,
    pub passed: bool,
}

/// Gate 4: does the confidence distribution support publishing?
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceStats {
    pub high: usize,
    pub moderate: usize,
    pub low: usize,
    pub publishable: usize,
    /// Central claims retained in the publishable set despite a low
    /// confidence tier. A policy exception, not an oversight.
    pub central_kept: usize,
    pub passed: bool,
}

/// Pass/fail snapshot computed once per job, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGates {
    pub passed: bool,
    pub gate1_stats: EvidenceVolumeStats,
    pub gate4_stats: ConfidenceStats,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Terminal report
// ---------------------------------------------------------------------------

/// The terminal result payload written to the job store on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub article: ArticleVerdict,
    pub claims: Vec<ClaimVerdict>,
    pub boundaries: Vec<Boundary>,
    pub coverage: CoverageMatrix,
    pub gates: QualityGates,
    /// Variant that actually produced this report.
    pub variant: PipelineVariant,
    pub pipeline_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub searches_performed: u32,
    pub contradiction_search_performed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_parse_round_trip() {
        for v in [
            PipelineVariant::Orchestrated,
            PipelineVariant::MonolithicCanonical,
            PipelineVariant::MonolithicDynamic,
        ] {
            assert_eq!(PipelineVariant::parse(v.as_str()), Some(v));
        }
        assert_eq!(PipelineVariant::parse("monolithic_v3"), None);
    }

    #[test]
    fn job_status_serializes_upper_case() {
        let s = serde_json::to_string(&JobStatus::Succeeded).unwrap();
        assert_eq!(s, "\"SUCCEEDED\"");
    }

    #[test]
    fn unknown_boundary_resolves_to_sentinel() {
        let known: HashSet<String> = ["b1".to_string()].into_iter().collect();
        assert_eq!(resolve_boundary_id(Some("b1"), &known), "b1");
        assert_eq!(resolve_boundary_id(Some("b9"), &known), UNASSIGNED_BOUNDARY);
        assert_eq!(resolve_boundary_id(None, &known), UNASSIGNED_BOUNDARY);
    }

    #[test]
    fn coverage_matrix_rejects_bad_dimensions() {
        let err = CoverageMatrix::new(
            vec!["c1".into(), "c2".into()],
            vec!["b1".into()],
            vec![vec![1]],
        );
        assert!(err.is_err());

        let err = CoverageMatrix::new(
            vec!["c1".into()],
            vec!["b1".into(), "b2".into()],
            vec![vec![1]],
        );
        assert!(err.is_err());

        let ok = CoverageMatrix::new(
            vec!["c1".into()],
            vec!["b1".into(), "b2".into()],
            vec![vec![1, 0]],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn cited_evidence_spans_both_directions() {
        let v = ClaimVerdict {
            claim_id: "c1".into(),
            truth_percentage: 80.0,
            confidence: 60.0,
            verdict: "mostly_true".into(),
            reasoning: String::new(),
            supporting_evidence: vec!["e1".into()],
            contradicting_evidence: vec!["e2".into()],
            boundary_findings: Vec::new(),
        };
        let cited: Vec<&str> = v.cited_evidence().collect();
        assert_eq!(cited, vec!["e1", "e2"]);
    }
}
