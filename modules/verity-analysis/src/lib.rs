pub mod aggregate;
pub mod grounding;
pub mod scores;
pub mod similarity;
pub mod temporal;
pub mod traits;
pub mod understanding;

pub use traits::{
    AnalysisDraft, BoundaryDraft, BoundaryFindingDraft, DecomposedClaim, Decomposition,
    EvidencePolicy, EvidenceSearcher, MonolithicMode, TextAnalyst, TextPair, VerdictDraft,
};
