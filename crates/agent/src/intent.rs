//! Intent detection and entity extraction.

use medquery_core::query::Query;
use medquery_core::tool::ToolKind;
use medquery_core::trace::{Entities, EntityKind, Intent};
use medquery_knowledge::{fold, ratio, symptom_terms};
use regex_lite::Regex;
use std::sync::LazyLock;

/// Minimum edit-distance ratio for a token to count as a known drug.
const ENTITY_MATCH_RATIO: u8 = 80;

static DOSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:[.,]\d+)?)\s*(mcg|µg|mg|ml|g)\b").expect("dosage pattern is valid")
});

/// Keyword groups, checked in priority order.
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Comparison,
        &[
            "au lieu de", "au lieu du", "instead of", "compar", "versus", " vs ", "remplacer",
            "replace", "substitu", "difference entre", "difference between",
        ],
    ),
    (
        Intent::InteractionCheck,
        &[
            "interaction", "en meme temps", "ensemble", "together", "melanger", "mix", "combiner",
            "combine", "alcool", "alcohol",
        ],
    ),
    (
        Intent::Alternatives,
        &["alternative", "equivalent", "generique", "generic", "similaire", "similar"],
    ),
    (
        Intent::SymptomSearch,
        &[
            "medicament pour", "medicament contre", "medicine for", "medication for",
            "quoi prendre", "what to take", "take for",
        ],
    ),
    (
        Intent::Pregnancy,
        &["enceinte", "grossesse", "pregnan", "allaitement", "allaiter", "breastfeed"],
    ),
    (
        Intent::DrugInfo,
        &[
            "posologie", "dosage", "dose", "effets secondaires", "effet secondaire", "side effect",
            "info", "c'est quoi", "what is", "utilisation", "usage", "precaution", "warning",
        ],
    ),
];

/// Detect the intent of a query.
///
/// When the agent ran, the tools it chose decide; otherwise keyword groups
/// are tried in priority order.
pub fn detect_intent(query: &Query, selected_tools: &[ToolKind]) -> Intent {
    const BY_TOOL: &[(ToolKind, Intent)] = &[
        (ToolKind::CompareMedications, Intent::Comparison),
        (ToolKind::InteractionCheck, Intent::InteractionCheck),
        (ToolKind::FindAlternatives, Intent::Alternatives),
        (ToolKind::SymptomSearch, Intent::SymptomSearch),
        (ToolKind::DrugDetails, Intent::DrugInfo),
        (ToolKind::SearchMedication, Intent::DrugInfo),
        (ToolKind::ExternalSource, Intent::DrugInfo),
    ];
    if let Some((_, intent)) = BY_TOOL.iter().find(|(kind, _)| selected_tools.contains(kind)) {
        return *intent;
    }

    let text = format!(" {} ", fold(query.normalized()));
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}

/// Extract drug names, symptoms and dosages mentioned in a query.
///
/// `known_names` are catalog base names (lower-case). Drug mentions are
/// reported as the known name they matched, in order of appearance.
pub fn extract_entities(query: &Query, known_names: &[String]) -> Entities {
    let folded = fold(query.normalized());
    let words: Vec<&str> = folded.split_whitespace().collect();
    let mut entities = Entities::new();

    let drugs = extract_drugs(&words, known_names);
    if !drugs.is_empty() {
        entities.insert(EntityKind::Drug, drugs);
    }

    let symptoms: Vec<String> = symptom_terms()
        .filter(|term| {
            if term.contains(' ') {
                format!(" {folded} ").contains(&format!(" {term} "))
            } else {
                words.contains(term)
            }
        })
        .map(str::to_string)
        .collect();
    if !symptoms.is_empty() {
        entities.insert(EntityKind::Symptom, symptoms);
    }

    // Raw text keeps decimal points ("0.25mg") that normalization folds away
    let raw = query.raw().to_lowercase();
    let dosages: Vec<String> = DOSAGE
        .captures_iter(&raw)
        .map(|c| format!("{} {}", c[1].replace(',', "."), &c[2]))
        .collect();
    if !dosages.is_empty() {
        entities.insert(EntityKind::Dosage, dosages);
    }

    entities
}

fn extract_drugs(words: &[&str], known_names: &[String]) -> Vec<String> {
    let known: Vec<(String, &String)> = known_names.iter().map(|n| (fold(n), n)).collect();
    let mut found: Vec<String> = Vec::new();
    let mut push = |name: &String| {
        if !found.contains(name) {
            found.push(name.clone());
        }
    };

    let mut i = 0;
    while i < words.len() {
        // Two-word names ("inflamyl fort") first
        if let Some(next) = words.get(i + 1) {
            let pair = format!("{} {}", words[i], next);
            if let Some((_, name)) = known.iter().find(|(k, _)| *k == pair) {
                push(name);
                i += 2;
                continue;
            }
        }

        let word = words[i];
        if let Some((_, name)) = known
            .iter()
            .find(|(k, _)| k.split_whitespace().next() == Some(word))
        {
            push(name);
        } else if word.chars().count() >= 4 {
            let best = known
                .iter()
                .map(|(k, name)| (ratio(word, k.split_whitespace().next().unwrap_or(k)), *name))
                .max_by_key(|(score, _)| *score);
            if let Some((score, name)) = best
                && score >= ENTITY_MATCH_RATIO
            {
                push(name);
            }
        }
        i += 1;
    }
    found
}
