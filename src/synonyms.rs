//! Static condition synonym table shared by query expansion and relevance
//! scoring. Lookup stops at the first matching group; groups are never
//! merged.

const SYNONYM_TABLE: &[&[&str]] = &[
    &[
        "type 2 diabetes",
        "type 2 diabetes mellitus",
        "t2dm",
        "adult-onset diabetes",
        "non-insulin-dependent diabetes",
    ],
    &[
        "type 1 diabetes",
        "type 1 diabetes mellitus",
        "t1dm",
        "insulin-dependent diabetes",
    ],
    &["hypertension", "high blood pressure", "elevated blood pressure"],
    &[
        "heart failure",
        "congestive heart failure",
        "chf",
        "cardiac failure",
    ],
    &[
        "coronary artery disease",
        "ischemic heart disease",
        "coronary heart disease",
    ],
    &["breast cancer", "breast carcinoma", "mammary carcinoma"],
    &[
        "lung cancer",
        "pulmonary carcinoma",
        "non-small cell lung cancer",
        "nsclc",
    ],
    &[
        "copd",
        "chronic obstructive pulmonary disease",
        "emphysema",
        "chronic bronchitis",
    ],
    &[
        "chronic kidney disease",
        "ckd",
        "renal insufficiency",
        "chronic renal failure",
    ],
    &[
        "alzheimer's disease",
        "alzheimer disease",
        "dementia of the alzheimer type",
    ],
    &["asthma", "bronchial asthma", "reactive airway disease"],
    &[
        "major depressive disorder",
        "depression",
        "mdd",
        "unipolar depression",
    ],
    &[
        "rheumatoid arthritis",
        "ra",
        "inflammatory polyarthritis",
    ],
    &["atrial fibrillation", "afib", "af"],
];

fn group_matches(group: &[&str], term: &str) -> bool {
    let term = term.to_lowercase();
    group
        .iter()
        .any(|entry| term.contains(entry) || entry.contains(term.as_str()))
}

/// First synonym group matching `term` (case-insensitive substring either
/// direction), or `None`.
pub fn synonym_group(term: &str) -> Option<&'static [&'static str]> {
    SYNONYM_TABLE
        .iter()
        .find(|group| group_matches(group, term))
        .copied()
}

/// Whether two condition phrases fall in the same synonym group.
pub fn are_synonyms(a: &str, b: &str) -> bool {
    match synonym_group(a) {
        Some(group) => group_matches(group, b),
        None => false,
    }
}

/// Expand a primary condition into search terms: the condition itself plus
/// up to two synonyms from the first matching table entry, capped at three
/// terms total.
pub fn expand_condition(primary: &str) -> Vec<String> {
    let mut terms = vec![primary.to_string()];
    if let Some(group) = synonym_group(primary) {
        let lower = primary.to_lowercase();
        for synonym in group {
            if terms.len() >= 3 {
                break;
            }
            if *synonym != lower {
                terms.push((*synonym).to_string());
            }
        }
    }
    terms.truncate(3);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_caps_at_three_terms() {
        let terms = expand_condition("Type 2 Diabetes Mellitus");
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0], "Type 2 Diabetes Mellitus");
    }

    #[test]
    fn unknown_condition_expands_to_itself() {
        let terms = expand_condition("Fibrodysplasia Ossificans Progressiva");
        assert_eq!(terms, vec!["Fibrodysplasia Ossificans Progressiva"]);
    }

    #[test]
    fn first_matching_group_wins() {
        // "type 2 diabetes" matches the first table entry; the type 1 group
        // must not contribute.
        let group = synonym_group("type 2 diabetes").unwrap();
        assert!(group.contains(&"t2dm"));
        assert!(!group.contains(&"t1dm"));
    }

    #[test]
    fn synonym_pairs_resolve_both_ways() {
        assert!(are_synonyms("hypertension", "high blood pressure"));
        assert!(are_synonyms("CHF", "heart failure"));
        assert!(!are_synonyms("asthma", "hypertension"));
    }
}
