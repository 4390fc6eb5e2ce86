//! Symptom keyword map.
//!
//! Each symptom term (French or English) maps to the words a medication's
//! usage text must contain for it to be suggested.

use crate::similarity::fold;

const SYMPTOM_KEYWORDS: &[(&str, &[&str])] = &[
    ("fever", &["fievre", "fever", "antipyretique"]),
    ("fievre", &["fievre", "fever", "antipyretique"]),
    ("pain", &["douleur", "pain", "analgesique"]),
    ("douleur", &["douleur", "pain", "analgesique"]),
    ("headache", &["douleur", "cephalee", "migraine", "maux de tete"]),
    ("mal de tete", &["douleur", "cephalee", "migraine", "maux de tete"]),
    ("cold", &["fievre", "douleur", "symptomatique"]),
    ("rhume", &["fievre", "douleur", "symptomatique"]),
    ("inflammation", &["inflammatoire", "inflammation"]),
    ("heart", &["cardiovasculaire", "cardiaque", "antiagr"]),
    ("coeur", &["cardiovasculaire", "cardiaque", "antiagr"]),
    ("stomach", &["digestif", "gastrique", "ulcere", "estomac"]),
    ("estomac", &["digestif", "gastrique", "ulcere", "estomac"]),
];

/// Every symptom term the map knows, accent-folded.
pub fn symptom_terms() -> impl Iterator<Item = &'static str> {
    SYMPTOM_KEYWORDS.iter().map(|(term, _)| *term)
}

/// Usage keywords for a symptom. Unknown symptoms match on themselves.
pub fn usage_keywords(symptom: &str) -> Vec<String> {
    let folded = fold(symptom);
    SYMPTOM_KEYWORDS
        .iter()
        .find(|(term, _)| *term == folded)
        .map(|(_, words)| words.iter().map(|w| w.to_string()).collect())
        .unwrap_or_else(|| vec![folded])
}

/// Whether a folded usage text matches any of the keywords.
pub fn usage_matches(usage: &str, keywords: &[String]) -> bool {
    let usage = fold(usage);
    keywords.iter().any(|k| usage.contains(k.as_str()))
}

/// Find the first known symptom mentioned in a piece of text.
pub fn find_symptom(text: &str) -> Option<&'static str> {
    let folded = fold(text);
    symptom_terms().find(|term| {
        folded == *term
            || folded.split_whitespace().any(|w| w == *term)
            || (term.contains(' ') && folded.contains(term))
    })
}
