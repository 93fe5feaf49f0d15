pub mod cache;
pub mod config;
pub mod eligibility;
pub mod embedding;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod safety;
pub mod scoring;
pub mod search;
pub mod semantic;
pub mod sources;
pub mod synonyms;

// Re-export commonly used types
pub use cache::ResponseCache;
pub use config::PipelineConfig;
pub use eligibility::EligibilityAssessor;
pub use embedding::Embedder;
pub use error::{PipelineError, Result};
pub use models::{
    DrugInteraction, DrugLabel, EligibilityAssessment, EligibilityStatus, InteractionSeverity,
    LiteratureArticle, PatientProfile, PipelineReport, SafetyFlag, SafetySeverity,
    SearchPreferences, TrialCandidate, TrialStatus, VectorDocument,
};
pub use pipeline::PipelineOrchestrator;
pub use ratelimit::RateLimiter;
pub use safety::{DrugSafetyAnalyzer, SafetyReport};
pub use scoring::RelevanceScorer;
pub use search::{SearchOutcome, TrialQuery, TrialSearchClient};
pub use semantic::{SemanticHit, SemanticMatcher};
pub use sources::{
    ClinicalTablesCodes, CodeLookup, CtGovRegistry, DrugLabelSource, LiteratureSource,
    OpenFdaLabels, PubMedSource, TrialRegistry,
};
