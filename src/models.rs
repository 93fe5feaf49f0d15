use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Clinical profile of a single patient, produced by an upstream extraction
/// step and consumed read-only by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub diagnosis: String,
    pub diagnosis_code: Option<String>,
    pub age: u32,
    /// Ordered; may contain repeats.
    pub medications: Vec<String>,
    pub lab_values: LabValues,
    pub comorbidities: Vec<String>,
    pub allergies: Vec<String>,
    pub location: Option<String>,
    pub biomarkers: Vec<String>,
    pub prior_treatments: Vec<String>,
}

impl PatientProfile {
    pub fn new(diagnosis: impl Into<String>, age: u32) -> Self {
        Self {
            diagnosis: diagnosis.into(),
            diagnosis_code: None,
            age,
            medications: Vec::new(),
            lab_values: LabValues::default(),
            comorbidities: Vec::new(),
            allergies: Vec::new(),
            location: None,
            biomarkers: Vec::new(),
            prior_treatments: Vec::new(),
        }
    }
}

/// Sparse named lab results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabValues {
    pub hba1c: Option<f64>,
    pub egfr: Option<f64>,
    pub creatinine: Option<f64>,
    pub blood_pressure: Option<BloodPressure>,
    #[serde(default)]
    pub other: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

/// Recruitment status as reported by the trial registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialStatus {
    Recruiting,
    ActiveNotRecruiting,
    Completed,
    Suspended,
    Terminated,
    Withdrawn,
    EnrollingByInvitation,
}

impl TrialStatus {
    pub const ALL: [TrialStatus; 7] = [
        TrialStatus::Recruiting,
        TrialStatus::ActiveNotRecruiting,
        TrialStatus::Completed,
        TrialStatus::Suspended,
        TrialStatus::Terminated,
        TrialStatus::Withdrawn,
        TrialStatus::EnrollingByInvitation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrialStatus::Recruiting => "RECRUITING",
            TrialStatus::ActiveNotRecruiting => "ACTIVE_NOT_RECRUITING",
            TrialStatus::Completed => "COMPLETED",
            TrialStatus::Suspended => "SUSPENDED",
            TrialStatus::Terminated => "TERMINATED",
            TrialStatus::Withdrawn => "WITHDRAWN",
            TrialStatus::EnrollingByInvitation => "ENROLLING_BY_INVITATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECRUITING" => Some(TrialStatus::Recruiting),
            "ACTIVE_NOT_RECRUITING" => Some(TrialStatus::ActiveNotRecruiting),
            "COMPLETED" => Some(TrialStatus::Completed),
            "SUSPENDED" => Some(TrialStatus::Suspended),
            "TERMINATED" => Some(TrialStatus::Terminated),
            "WITHDRAWN" => Some(TrialStatus::Withdrawn),
            "ENROLLING_BY_INVITATION" => Some(TrialStatus::EnrollingByInvitation),
            _ => None,
        }
    }

    /// Tie-break priority for ranking; lower sorts first.
    pub fn rank_priority(self) -> u8 {
        match self {
            TrialStatus::Recruiting => 0,
            TrialStatus::ActiveNotRecruiting => 1,
            TrialStatus::EnrollingByInvitation => 2,
            _ => 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialLocation {
    pub facility: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Inclusion/exclusion rules as published by the registry. Age bounds are
/// free text ("18 Years"); parsing happens at scoring/assessment time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilityCriteria {
    pub inclusion: Vec<String>,
    pub exclusion: Vec<String>,
    pub minimum_age: Option<String>,
    pub maximum_age: Option<String>,
    pub gender: Option<String>,
}

impl EligibilityCriteria {
    /// Combined criteria text, used for the completeness bonus and as the
    /// semantic corpus document for this trial.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.inclusion.iter().map(String::as_str));
        parts.extend(self.exclusion.iter().map(String::as_str));
        if let Some(min) = &self.minimum_age {
            parts.push(min.as_str());
        }
        if let Some(max) = &self.maximum_age {
            parts.push(max.as_str());
        }
        parts.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.inclusion.is_empty()
            && self.exclusion.is_empty()
            && self.minimum_age.is_none()
            && self.maximum_age.is_none()
    }
}

/// One registry search hit. Created per search call and discarded after
/// assessment; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialCandidate {
    pub nct_id: String,
    pub title: String,
    pub status: TrialStatus,
    pub phase: Option<String>,
    pub condition: String,
    pub criteria: EligibilityCriteria,
    pub locations: Vec<TrialLocation>,
    /// Computed by `RelevanceScorer`; in [0,1].
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityStatus {
    Eligible,
    PotentiallyEligible,
    Ineligible,
    RequiresReview,
}

/// Final categorical assessment for one (patient, trial) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityAssessment {
    pub nct_id: String,
    pub title: String,
    pub status: EligibilityStatus,
    pub match_score: f64,
    pub inclusion_matches: Vec<String>,
    pub exclusion_conflicts: Vec<String>,
    pub age_eligible: bool,
    pub location_eligible: bool,
    pub biomarker_eligible: bool,
    pub interactions: Vec<DrugInteraction>,
    pub safety_flags: Vec<SafetyFlag>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionSeverity {
    Minor,
    Moderate,
    Major,
    Contraindicated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugInteraction {
    pub drug_a: String,
    pub drug_b: String,
    pub severity: InteractionSeverity,
    pub description: String,
    pub management: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetySeverity {
    Low,
    Moderate,
    High,
    Critical,
}

/// A per-medication safety signal (allergy contraindication, age-band
/// warning) independent of any particular trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyFlag {
    pub medication: String,
    pub severity: SafetySeverity,
    pub description: String,
}

/// Structured drug-label text fetched from the label source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugLabel {
    pub name: String,
    pub interactions: String,
    pub contraindications: String,
    pub warnings: String,
}

/// Long-lived semantic corpus entry; immutable after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureArticle {
    pub pmid: String,
    pub title: String,
    pub journal: Option<String>,
    pub summary: Option<String>,
}

/// Caller preferences for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPreferences {
    pub max_candidates: usize,
    pub literature_cap: usize,
    pub include_completed: bool,
}

impl Default for SearchPreferences {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            literature_cap: 5,
            include_completed: false,
        }
    }
}

/// Pipeline output, consumed by an external report formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub diagnosis_code: Option<String>,
    pub assessments: Vec<EligibilityAssessment>,
    pub total_assessed: usize,
    pub eligible_count: usize,
    pub potentially_eligible_count: usize,
    pub ineligible_count: usize,
    pub requires_review_count: usize,
    pub safety_concerns: Vec<SafetyFlag>,
    pub interactions: Vec<DrugInteraction>,
    pub literature: Vec<LiteratureArticle>,
    pub fallback_used: bool,
    /// 1.0 when this run's candidate retrieval was served from cache.
    pub cache_hit_rate: f64,
}
