//! Input normalization and claim/boundary assembly.
//!
//! Decomposition and boundary detection are delegated to the text-analysis
//! collaborator; this module owns the deterministic parts around those
//! calls: question normalization, id assignment, and the rule that
//! ambiguous material lands under the unassigned sentinel.

use std::collections::HashSet;

use tracing::{debug, info};

use verity_common::{resolve_boundary_id, Boundary, Claim};

use crate::similarity::SimilarityScorer;
use crate::traits::{BoundaryDraft, Decomposition, TextAnalyst, TextPair};

/// Claim pairs scoring at or above this are treated as duplicates.
pub const DUPLICATE_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Heuristics for rewriting yes/no question phrasing into a declarative,
/// analyzable form.
#[derive(Debug, Clone)]
pub struct NormalizationConfig {
    /// Auxiliaries that open a yes/no question ("Is", "Does", "Can", ...).
    pub predicate_starters: Vec<String>,
    /// Suffixes that mark a plausible predicate head ("effective",
    /// "growing", "harmful", ...). Used to locate the subject/predicate
    /// split.
    pub adjective_suffixes: Vec<String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            predicate_starters: [
                "is", "are", "was", "were", "does", "do", "did", "can", "could", "will", "would",
                "has", "have", "had", "should", "must",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            adjective_suffixes: [
                "able", "ible", "ful", "ous", "ive", "al", "ic", "ing", "ed", "er", "est", "less",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Rewrite a yes/no question toward a declarative claim: "Is the new policy
/// effective?" becomes "the new policy is effective".
///
/// When the subject/predicate split cannot be confidently located, the input
/// is returned with only the trailing `?` stripped — conservative by design,
/// never fabricated filler. Non-questions pass through untouched.
pub fn normalize_question(input: &str, cfg: &NormalizationConfig) -> String {
    let trimmed = input.trim();
    if !trimmed.ends_with('?') {
        return trimmed.to_string();
    }

    let body = trimmed.trim_end_matches('?').trim();
    let words: Vec<&str> = body.split_whitespace().collect();
    if words.len() < 3 {
        return body.to_string();
    }

    let starter = words[0].to_lowercase();
    if !cfg.predicate_starters.iter().any(|s| s == &starter) {
        return body.to_string();
    }

    // The predicate head is the last token carrying a recognized suffix.
    // Everything before it is the subject; a head in first position would
    // leave no subject, so that also falls back.
    let rest = &words[1..];
    let head = rest.iter().rposition(|w| {
        let lw = w.to_lowercase();
        cfg.adjective_suffixes
            .iter()
            .any(|suf| lw.len() > suf.len() + 1 && lw.ends_with(suf.as_str()))
    });

    match head {
        Some(k) if k >= 1 => {
            let subject = rest[..k].join(" ");
            let predicate = rest[k..].join(" ");
            debug!(subject = %subject, predicate = %predicate, "Normalized question form");
            format!("{subject} {starter} {predicate}")
        }
        _ => body.to_string(),
    }
}

/// Pattern-based boundary pre-detection. Always `None`: detection is
/// LLM-first, so every input reaches the collaborator. The call site
/// still honors a `Some` should this ever be re-enabled.
pub fn heuristic_boundaries(input: &str) -> Option<Vec<BoundaryDraft>> {
    let _ = input;
    None
}

/// Claims and boundaries after assembly, ready for evidence gathering.
#[derive(Debug, Clone)]
pub struct Understanding {
    pub claims: Vec<Claim>,
    pub boundaries: Vec<Boundary>,
    pub recency_sensitive: bool,
}

/// Turn collaborator drafts into the immutable claim/boundary sets.
///
/// Boundary ids are derived from short names; claim boundary hints resolve
/// against the detected set, with everything unrecognized mapped to the
/// unassigned sentinel. The sentinel boundary is always appended so the
/// coverage matrix has a column for unassigned material.
pub fn assemble(decomposition: Decomposition, boundary_drafts: Vec<BoundaryDraft>) -> Understanding {
    let mut boundaries: Vec<Boundary> = boundary_drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let slug: String = d
                .short_name
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect();
            Boundary {
                id: format!("ctx_{}_{}", i + 1, slug),
                name: d.name,
                short_name: d.short_name,
                constituent_scopes: d.constituent_scopes,
                internal_coherence: d.internal_coherence.clamp(0.0, 1.0),
            }
        })
        .collect();

    // Hints usually name the short name, not our generated id; accept both.
    let known: HashSet<String> = boundaries
        .iter()
        .flat_map(|b| [b.id.clone(), b.short_name.clone()])
        .collect();
    let by_short: std::collections::HashMap<String, String> = boundaries
        .iter()
        .map(|b| (b.short_name.clone(), b.id.clone()))
        .collect();

    let claims: Vec<Claim> = decomposition
        .claims
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let resolved = resolve_boundary_id(c.boundary_hint.as_deref(), &known);
            let boundary_id = by_short.get(&resolved).cloned().unwrap_or(resolved);
            Claim {
                id: format!("claim_{}", i + 1),
                text: c.text,
                is_central: c.is_central,
                category: c.category.unwrap_or_else(|| "factual".to_string()),
                boundary_id: Some(boundary_id),
            }
        })
        .collect();

    // The sentinel frame is always present so unassigned claims and
    // evidence have a column in the coverage matrix.
    boundaries.push(Boundary::unassigned());

    Understanding {
        claims,
        boundaries,
        recency_sensitive: decomposition.recency_sensitive,
    }
}

/// Drop near-duplicate claims after decomposition, keeping the earlier
/// claim and inheriting centrality from anything merged into it.
///
/// A pair whose similarity score is absent is treated as dissimilar — a
/// scoring outage must never cause a merge.
pub async fn dedup_claims(analyst: &dyn TextAnalyst, mut claims: Vec<Claim>) -> Vec<Claim> {
    if claims.len() < 2 {
        return claims;
    }

    let mut pairs = Vec::new();
    for i in 0..claims.len() {
        for j in (i + 1)..claims.len() {
            pairs.push(TextPair {
                id: format!("{}|{}", claims[i].id, claims[j].id),
                left: claims[i].text.clone(),
                right: claims[j].text.clone(),
            });
        }
    }

    let scores = SimilarityScorer::default().score(analyst, &pairs).await;

    let mut dropped: HashSet<String> = HashSet::new();
    for i in 0..claims.len() {
        if dropped.contains(&claims[i].id) {
            continue;
        }
        for j in (i + 1)..claims.len() {
            if dropped.contains(&claims[j].id) {
                continue;
            }
            let key = format!("{}|{}", claims[i].id, claims[j].id);
            let score = scores.get(&key).copied().unwrap_or(0.0);
            if score >= DUPLICATE_SIMILARITY_THRESHOLD {
                if claims[j].is_central {
                    claims[i].is_central = true;
                }
                dropped.insert(claims[j].id.clone());
            }
        }
    }

    if !dropped.is_empty() {
        info!(merged = dropped.len(), "Near-duplicate claims merged");
        claims.retain(|c| !dropped.contains(&c.id));
    }
    claims
}
