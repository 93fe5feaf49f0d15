use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{
    DrugInteraction, DrugLabel, InteractionSeverity, PatientProfile, SafetyFlag, SafetySeverity,
};
use crate::ratelimit::RateLimiter;
use crate::sources::DrugLabelSource;

const LABEL_SOURCE_NAME: &str = "openfda";
const ELDERLY_AGE: u32 = 65;
const PEDIATRIC_AGE: u32 = 18;

/// Everything the safety pass found for one patient.
#[derive(Debug, Clone, Default)]
pub struct SafetyReport {
    pub interactions: Vec<DrugInteraction>,
    pub flags: Vec<SafetyFlag>,
}

impl SafetyReport {
    pub fn has_contraindicated_interaction(&self) -> bool {
        self.interactions
            .iter()
            .any(|i| i.severity == InteractionSeverity::Contraindicated)
    }
}

/// Pairwise drug-interaction and safety-signal detection over a patient's
/// medication list, driven by free-text label sections.
pub struct DrugSafetyAnalyzer {
    labels: Arc<dyn DrugLabelSource>,
    limiter: RateLimiter,
    rate_limit: usize,
}

impl DrugSafetyAnalyzer {
    pub fn new(labels: Arc<dyn DrugLabelSource>, limiter: RateLimiter, rate_limit: usize) -> Self {
        Self {
            labels,
            limiter,
            rate_limit,
        }
    }

    /// Labels are fetched sequentially, one per unique medication, through
    /// the shared rate limiter. A failed lookup is logged and that
    /// medication simply contributes nothing; the rest of the batch is
    /// unaffected.
    pub async fn analyze(&self, profile: &PatientProfile) -> SafetyReport {
        let medications = unique_in_order(&profile.medications);
        let mut labels: HashMap<String, DrugLabel> = HashMap::new();

        for medication in &medications {
            self.limiter
                .wait_if_needed(LABEL_SOURCE_NAME, self.rate_limit)
                .await;
            match self.labels.fetch_label(medication).await {
                Ok(label) => {
                    labels.insert(medication.clone(), label);
                }
                Err(e) => {
                    warn!(medication = %medication, error = %e, "label lookup failed, skipping");
                }
            }
        }

        let mut report = SafetyReport::default();
        for drug_a in &medications {
            let Some(label) = labels.get(drug_a) else {
                continue;
            };
            for drug_b in &medications {
                if drug_a == drug_b {
                    continue;
                }
                // Asymmetric by design: b named in a's interactions text is
                // enough, without confirmation from b's own label.
                if let Some(interaction) = detect_interaction(label, drug_a, drug_b) {
                    report.interactions.push(interaction);
                }
            }
            report.flags.extend(allergy_flags(label, drug_a, profile));
            report.flags.extend(age_flags(label, drug_a, profile.age));
        }

        info!(
            medications = medications.len(),
            interactions = report.interactions.len(),
            flags = report.flags.len(),
            "drug safety analysis completed"
        );
        report
    }
}

fn unique_in_order(medications: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    medications
        .iter()
        .filter(|m| !m.trim().is_empty())
        .filter(|m| seen.insert(m.to_lowercase()))
        .cloned()
        .collect()
}

fn detect_interaction(label: &DrugLabel, drug_a: &str, drug_b: &str) -> Option<DrugInteraction> {
    if !contains_ci(&label.interactions, drug_b) {
        return None;
    }
    let sentence = matched_sentence(&label.interactions, drug_b);
    let severity = classify_severity(&sentence);
    let management = match severity {
        InteractionSeverity::Contraindicated => Some("Avoid the combination".to_string()),
        InteractionSeverity::Major => {
            Some("Consider an alternative or monitor closely".to_string())
        }
        _ => None,
    };
    Some(DrugInteraction {
        drug_a: drug_a.to_string(),
        drug_b: drug_b.to_string(),
        severity,
        description: sentence,
        management,
    })
}

/// Severity of the matched sentence, scanned in fixed priority order.
fn classify_severity(sentence: &str) -> InteractionSeverity {
    let lower = sentence.to_lowercase();
    if lower.contains("contraindicated") || lower.contains("should not be used") {
        InteractionSeverity::Contraindicated
    } else if ["major", "severe", "serious"].iter().any(|k| lower.contains(k)) {
        InteractionSeverity::Major
    } else if ["moderate", "caution", "monitor"].iter().any(|k| lower.contains(k)) {
        InteractionSeverity::Moderate
    } else {
        InteractionSeverity::Minor
    }
}

/// First sentence of the interactions text naming the other drug; falls
/// back to the whole section when sentence splitting finds nothing.
fn matched_sentence(text: &str, drug: &str) -> String {
    text.split('.')
        .find(|sentence| contains_ci(sentence, drug))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| text.trim().to_string())
}

fn allergy_flags(label: &DrugLabel, medication: &str, profile: &PatientProfile) -> Vec<SafetyFlag> {
    profile
        .allergies
        .iter()
        .filter(|allergy| contains_ci(&label.contraindications, allergy))
        .map(|allergy| SafetyFlag {
            medication: medication.to_string(),
            severity: SafetySeverity::Critical,
            description: format!(
                "Label contraindications mention declared allergy '{allergy}'"
            ),
        })
        .collect()
}

fn age_flags(label: &DrugLabel, medication: &str, age: u32) -> Vec<SafetyFlag> {
    let mut flags = Vec::new();
    if age >= ELDERLY_AGE && contains_ci(&label.warnings, "elderly") {
        flags.push(SafetyFlag {
            medication: medication.to_string(),
            severity: SafetySeverity::Moderate,
            description: "Label warnings flag use in elderly patients".to_string(),
        });
    }
    if age < PEDIATRIC_AGE && contains_ci(&label.warnings, "pediatric") {
        flags.push(SafetyFlag {
            medication: medication.to_string(),
            severity: SafetySeverity::Moderate,
            description: "Label warnings flag pediatric use".to_string(),
        });
    }
    flags
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}
