use crate::models::{
    DrugInteraction, EligibilityAssessment, EligibilityStatus, InteractionSeverity,
    PatientProfile, SafetyFlag, SafetySeverity, TrialCandidate,
};
use crate::scoring::{location_matches, parse_age_years};

/// Biomarkers recognized inside inclusion-criteria text when deriving a
/// trial's required marker set.
const BIOMARKER_LEXICON: &[&str] = &[
    "egfr mutation",
    "her2",
    "brca1",
    "brca2",
    "alk",
    "pd-l1",
    "kras",
    "braf",
    "estrogen receptor positive",
    "msi-high",
];

/// Folds relevance score, recomputed sub-eligibilities, and safety findings
/// into one terminal categorical state per (patient, candidate) pair.
pub struct EligibilityAssessor {
    eligible_threshold: f64,
    potential_threshold: f64,
}

impl EligibilityAssessor {
    pub fn new(eligible_threshold: f64, potential_threshold: f64) -> Self {
        Self {
            eligible_threshold,
            potential_threshold,
        }
    }

    pub fn assess(
        &self,
        profile: &PatientProfile,
        candidate: &TrialCandidate,
        match_score: f64,
        interactions: &[DrugInteraction],
        safety_flags: &[SafetyFlag],
    ) -> EligibilityAssessment {
        let match_score = match_score.clamp(0.0, 1.0);
        let age_eligible = age_eligible(profile.age, candidate);
        let location_eligible = location_eligible(profile, candidate);
        let biomarker_eligible = biomarker_eligible(profile, candidate);
        let inclusion_matches = inclusion_matches(profile, candidate);
        let exclusion_conflicts = exclusion_conflicts(profile, candidate);

        let contraindicated = interactions
            .iter()
            .any(|i| i.severity == InteractionSeverity::Contraindicated);
        let blocking_flag = safety_flags
            .iter()
            .any(|f| f.severity >= SafetySeverity::High);

        let status = if !exclusion_conflicts.is_empty() || contraindicated {
            EligibilityStatus::Ineligible
        } else if candidate.criteria.is_empty() {
            EligibilityStatus::RequiresReview
        } else if age_eligible
            && location_eligible
            && biomarker_eligible
            && match_score >= self.eligible_threshold
            && !blocking_flag
        {
            EligibilityStatus::Eligible
        } else if match_score >= self.potential_threshold {
            EligibilityStatus::PotentiallyEligible
        } else {
            EligibilityStatus::RequiresReview
        };

        let reasoning = build_reasoning(
            status,
            match_score,
            age_eligible,
            location_eligible,
            biomarker_eligible,
            &exclusion_conflicts,
            contraindicated,
        );

        EligibilityAssessment {
            nct_id: candidate.nct_id.clone(),
            title: candidate.title.clone(),
            status,
            match_score,
            inclusion_matches,
            exclusion_conflicts,
            age_eligible,
            location_eligible,
            biomarker_eligible,
            interactions: interactions.to_vec(),
            safety_flags: safety_flags.to_vec(),
            reasoning,
        }
    }
}

fn age_eligible(age: u32, candidate: &TrialCandidate) -> bool {
    let min = candidate
        .criteria
        .minimum_age
        .as_deref()
        .and_then(parse_age_years);
    let max = candidate
        .criteria
        .maximum_age
        .as_deref()
        .and_then(parse_age_years);
    age >= min.unwrap_or(0) && age <= max.unwrap_or(u32::MAX)
}

fn location_eligible(profile: &PatientProfile, candidate: &TrialCandidate) -> bool {
    match profile.location.as_deref() {
        // No stated preference: any site, or none listed, works.
        None => true,
        Some(requested) => {
            candidate.locations.is_empty()
                || candidate
                    .locations
                    .iter()
                    .any(|l| location_matches(requested, l))
        }
    }
}

/// Patient's biomarker set must cover every marker the trial's inclusion
/// text names; a trial naming none requires nothing.
fn biomarker_eligible(profile: &PatientProfile, candidate: &TrialCandidate) -> bool {
    let inclusion_text = candidate.criteria.inclusion.join(" ").to_lowercase();
    BIOMARKER_LEXICON
        .iter()
        .filter(|marker| inclusion_text.contains(*marker))
        .all(|marker| {
            profile
                .biomarkers
                .iter()
                .any(|b| b.to_lowercase().contains(marker) || marker.contains(&b.to_lowercase()))
        })
}

fn inclusion_matches(profile: &PatientProfile, candidate: &TrialCandidate) -> Vec<String> {
    let mut terms: Vec<String> = vec![profile.diagnosis.clone()];
    terms.extend(profile.biomarkers.iter().cloned());
    terms.extend(profile.comorbidities.iter().cloned());
    matching_lines(&candidate.criteria.inclusion, &terms)
}

fn exclusion_conflicts(profile: &PatientProfile, candidate: &TrialCandidate) -> Vec<String> {
    let mut terms: Vec<String> = profile.medications.clone();
    terms.extend(profile.comorbidities.iter().cloned());
    terms.extend(profile.allergies.iter().cloned());
    matching_lines(&candidate.criteria.exclusion, &terms)
}

fn matching_lines(lines: &[String], terms: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| {
            let line = line.to_lowercase();
            terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| t.len() > 3)
                .any(|t| line.contains(&t))
        })
        .cloned()
        .collect()
}

fn build_reasoning(
    status: EligibilityStatus,
    match_score: f64,
    age_eligible: bool,
    location_eligible: bool,
    biomarker_eligible: bool,
    exclusion_conflicts: &[String],
    contraindicated: bool,
) -> String {
    let mut parts = vec![format!("match score {match_score:.2}")];
    if !exclusion_conflicts.is_empty() {
        parts.push(format!(
            "{} exclusion conflict(s)",
            exclusion_conflicts.len()
        ));
    }
    if contraindicated {
        parts.push("contraindicated drug interaction".to_string());
    }
    if !age_eligible {
        parts.push("age outside trial bounds".to_string());
    }
    if !location_eligible {
        parts.push("no site near patient location".to_string());
    }
    if !biomarker_eligible {
        parts.push("required biomarker missing".to_string());
    }
    let verdict = match status {
        EligibilityStatus::Eligible => "meets assessed criteria",
        EligibilityStatus::PotentiallyEligible => "partial match, review recommended",
        EligibilityStatus::Ineligible => "disqualified",
        EligibilityStatus::RequiresReview => "criteria could not be assessed unambiguously",
    };
    format!("{verdict}: {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EligibilityCriteria, TrialLocation, TrialStatus};

    fn assessor() -> EligibilityAssessor {
        EligibilityAssessor::new(0.7, 0.4)
    }

    fn candidate() -> TrialCandidate {
        TrialCandidate {
            nct_id: "NCT00000001".into(),
            title: "Diabetes Trial".into(),
            status: TrialStatus::Recruiting,
            phase: Some("PHASE3".into()),
            condition: "Type 2 Diabetes Mellitus".into(),
            criteria: EligibilityCriteria {
                inclusion: vec!["Confirmed type 2 diabetes mellitus".into()],
                exclusion: vec!["Current insulin therapy".into(), "Pregnancy".into()],
                minimum_age: Some("18 Years".into()),
                maximum_age: Some("75 Years".into()),
                gender: Some("ALL".into()),
            },
            locations: vec![TrialLocation {
                facility: None,
                city: Some("Atlanta".into()),
                state: Some("Georgia".into()),
                country: Some("United States".into()),
            }],
            relevance_score: 0.9,
        }
    }

    fn profile() -> PatientProfile {
        let mut p = PatientProfile::new("Type 2 Diabetes Mellitus", 65);
        p.location = Some("Atlanta, Georgia".into());
        p.medications = vec!["Metformin".into()];
        p
    }

    fn contraindicated_interaction() -> DrugInteraction {
        DrugInteraction {
            drug_a: "warfarin".into(),
            drug_b: "aspirin".into(),
            severity: InteractionSeverity::Contraindicated,
            description: "contraindicated".into(),
            management: None,
        }
    }

    #[test]
    fn clean_high_score_is_eligible() {
        let a = assessor().assess(&profile(), &candidate(), 0.9, &[], &[]);
        assert_eq!(a.status, EligibilityStatus::Eligible);
        assert!(a.age_eligible && a.location_eligible && a.biomarker_eligible);
        assert_eq!(a.inclusion_matches.len(), 1);
    }

    #[test]
    fn exclusion_conflict_is_ineligible_regardless_of_score() {
        let mut p = profile();
        p.medications = vec!["Insulin".into()];
        let a = assessor().assess(&p, &candidate(), 0.95, &[], &[]);
        assert_eq!(a.status, EligibilityStatus::Ineligible);
        assert_eq!(a.exclusion_conflicts, vec!["Current insulin therapy"]);
    }

    #[test]
    fn contraindicated_interaction_is_ineligible() {
        let a = assessor().assess(
            &profile(),
            &candidate(),
            0.95,
            &[contraindicated_interaction()],
            &[],
        );
        assert_eq!(a.status, EligibilityStatus::Ineligible);
    }

    #[test]
    fn moderate_score_is_potentially_eligible() {
        let a = assessor().assess(&profile(), &candidate(), 0.5, &[], &[]);
        assert_eq!(a.status, EligibilityStatus::PotentiallyEligible);
    }

    #[test]
    fn critical_safety_flag_blocks_eligible() {
        let flag = SafetyFlag {
            medication: "amoxicillin".into(),
            severity: SafetySeverity::Critical,
            description: "allergy".into(),
        };
        let a = assessor().assess(&profile(), &candidate(), 0.9, &[], &[flag]);
        assert_eq!(a.status, EligibilityStatus::PotentiallyEligible);
    }

    #[test]
    fn empty_criteria_requires_review() {
        let mut c = candidate();
        c.criteria = EligibilityCriteria::default();
        let a = assessor().assess(&profile(), &c, 0.9, &[], &[]);
        assert_eq!(a.status, EligibilityStatus::RequiresReview);
    }

    #[test]
    fn low_score_defaults_to_requires_review() {
        let a = assessor().assess(&profile(), &candidate(), 0.2, &[], &[]);
        assert_eq!(a.status, EligibilityStatus::RequiresReview);
    }

    #[test]
    fn missing_required_biomarker_downgrades() {
        let mut c = candidate();
        c.criteria.inclusion = vec!["HER2 positive breast cancer".into()];
        let a = assessor().assess(&profile(), &c, 0.9, &[], &[]);
        assert!(!a.biomarker_eligible);
        assert_eq!(a.status, EligibilityStatus::PotentiallyEligible);

        let mut p = profile();
        p.biomarkers = vec!["HER2".into()];
        let a = assessor().assess(&p, &c, 0.9, &[], &[]);
        assert!(a.biomarker_eligible);
    }
}
