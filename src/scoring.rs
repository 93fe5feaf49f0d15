use crate::models::{PatientProfile, TrialCandidate, TrialLocation, TrialStatus};
use crate::synonyms;

const AGE_FULL: f64 = 0.3;
const AGE_NEAR: f64 = 0.2;
const AGE_UNBOUNDED: f64 = 0.15;
const AGE_NEAR_MARGIN: u32 = 5;

const CONDITION_EXACT: f64 = 0.4;
const CONDITION_SYNONYM: f64 = 0.3;
const CONDITION_TOKEN: f64 = 0.15;

const LOCATION_FULL: f64 = 0.2;
const LOCATION_PARTIAL: f64 = 0.1;

const STATUS_BONUS: f64 = 0.1;
const COMPLETENESS_BONUS: f64 = 0.05;
const COMPLETENESS_MIN_CHARS: usize = 100;

/// Deterministic relevance scoring of a trial candidate against a patient
/// profile. The same score ranks search results and feeds eligibility
/// categorization. Always in [0,1].
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceScorer;

impl RelevanceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, profile: &PatientProfile, candidate: &TrialCandidate) -> f64 {
        let mut score = 0.0;
        score += age_component(profile.age, &candidate.criteria.minimum_age, &candidate.criteria.maximum_age);
        score += condition_component(&profile.diagnosis, &candidate.condition);
        score += location_component(profile.location.as_deref(), &candidate.locations);
        score += match candidate.status {
            TrialStatus::Recruiting => STATUS_BONUS,
            TrialStatus::ActiveNotRecruiting => STATUS_BONUS / 2.0,
            _ => 0.0,
        };
        if candidate.criteria.combined_text().len() > COMPLETENESS_MIN_CHARS {
            score += COMPLETENESS_BONUS;
        }
        score.clamp(0.0, 1.0)
    }
}

fn age_component(age: u32, minimum: &Option<String>, maximum: &Option<String>) -> f64 {
    let min = minimum.as_deref().and_then(parse_age_years);
    let max = maximum.as_deref().and_then(parse_age_years);

    if min.is_none() && max.is_none() {
        return AGE_UNBOUNDED;
    }
    let lower = min.unwrap_or(0);
    let upper = max.unwrap_or(u32::MAX);
    if age >= lower && age <= upper {
        AGE_FULL
    } else if age + AGE_NEAR_MARGIN >= lower && age <= upper.saturating_add(AGE_NEAR_MARGIN) {
        AGE_NEAR
    } else {
        0.0
    }
}

fn condition_component(diagnosis: &str, condition: &str) -> f64 {
    if diagnosis.trim().is_empty() || condition.trim().is_empty() {
        return 0.0;
    }
    let a = diagnosis.to_lowercase();
    let b = condition.to_lowercase();
    if a.contains(&b) || b.contains(&a) {
        return CONDITION_EXACT;
    }
    if synonyms::are_synonyms(diagnosis, condition) {
        return CONDITION_SYNONYM;
    }
    let shared_token = a
        .split_whitespace()
        .filter(|t| t.len() > 3)
        .any(|t| b.split_whitespace().any(|u| u == t));
    if shared_token {
        CONDITION_TOKEN
    } else {
        0.0
    }
}

fn location_component(requested: Option<&str>, locations: &[TrialLocation]) -> f64 {
    match requested {
        Some(requested) => {
            if locations.iter().any(|l| location_matches(requested, l)) {
                LOCATION_FULL
            } else if !locations.is_empty() {
                LOCATION_PARTIAL
            } else {
                0.0
            }
        }
        None => {
            if locations.is_empty() {
                0.0
            } else {
                LOCATION_PARTIAL
            }
        }
    }
}

/// Whether any comma-separated part of the requested location text overlaps
/// a trial location's city, state, or country (case-insensitive, either
/// direction).
pub(crate) fn location_matches(requested: &str, location: &TrialLocation) -> bool {
    let fields = [&location.city, &location.state, &location.country];
    requested
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .any(|part| {
            fields.iter().any(|field| {
                field.as_deref().is_some_and(|f| {
                    let f = f.to_lowercase();
                    f.contains(&part) || part.contains(&f)
                })
            })
        })
}

/// Lenient free-text age parse: first integer in the string, converted from
/// months when the unit says so ("6 Months" is under a year).
pub(crate) fn parse_age_years(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let value: u32 = digits.parse().ok()?;
    if text.to_lowercase().contains("month") {
        Some(value / 12)
    } else {
        Some(value)
    }
}
