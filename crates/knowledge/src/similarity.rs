//! Name similarity scoring for fuzzy medication lookup.
//!
//! Scores are integers in 0..=100. Matching is done on accent-folded,
//! lower-cased text so "voltarene" finds "Voltarène".

use medquery_core::DrugRecord;

/// Second words that OCR and hurried typing produce for "fort".
const FORT_VARIANTS: &[&str] = &["fort", "forte", "ort", "frt", "iort"];

/// Lower-case and strip diacritics from Latin letters.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => out.push('a'),
            'ç' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ñ' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'ö' | 'õ' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            other => out.push(other),
        }
    }
    out
}

/// Edit distance between two strings, counted in characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Levenshtein similarity as a percentage of the longer string.
pub fn ratio(a: &str, b: &str) -> u8 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100;
    }
    let distance = levenshtein(a, b).min(longest);
    ((longest - distance) * 100 / longest) as u8
}

/// Base of a folded query: first word, keeping a "fort" suffix and
/// correcting its common misspellings.
fn query_base(folded: &str) -> String {
    let mut words = folded.split_whitespace();
    match (words.next(), words.next()) {
        (Some(first), Some(second)) if FORT_VARIANTS.contains(&second) => format!("{first} fort"),
        (Some(first), _) => first.to_string(),
        (None, _) => String::new(),
    }
}

fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or_default()
}

/// Similarity between a free-text drug name and a catalog record.
///
/// Exact key or base-name matches score 100, an active-ingredient match 90,
/// prefix matches 80/75, substring 60, then edit-distance and shared words.
pub fn score(query: &str, record: &DrugRecord) -> u8 {
    let q = fold(query);
    let q_len = q.chars().count();
    if q_len < 2 {
        return 0;
    }

    let key = fold(&record.key);
    let base = fold(&record.base_name());
    let qbase = query_base(&q);
    let ingredient = record.active_ingredient().map(|i| fold(&i));

    if q == key || qbase == base {
        return 100;
    }

    if let Some(ing) = &ingredient
        && (q == *ing || qbase == first_word(ing))
    {
        return 90;
    }

    if q_len >= 3 && (key.starts_with(&q) || q.starts_with(&key)) {
        return 80;
    }

    if q_len >= 3 && !base.is_empty() && (base.starts_with(&qbase) || qbase.starts_with(&base)) {
        return 75;
    }

    if q_len >= 4 && key.contains(&q) {
        return 60;
    }

    let mut edit = ratio(&qbase, &base);
    if let Some(ing) = &ingredient {
        edit = edit.max(ratio(&qbase, first_word(ing)));
    }
    if edit >= 70 && qbase.chars().count() >= 4 {
        return (u16::from(edit) * 85 / 100) as u8;
    }

    let shared = q
        .split_whitespace()
        .filter(|w| w.chars().count() >= 3 && key.split_whitespace().any(|k| k == *w))
        .count();
    if shared > 0 {
        return (40 + 10 * shared).min(59) as u8;
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, name: &str) -> DrugRecord {
        DrugRecord {
            key: key.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn fold_strips_accents() {
        assert_eq!(fold("Voltarène"), "voltarene");
        assert_eq!(fold(" FIÈVRE "), "fievre");
        assert_eq!(fold("Cœur"), "coeur");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("doliprane", "doliprane"), 0);
        assert_eq!(levenshtein("dolipane", "doliprane"), 1);
    }

    #[test]
    fn ratio_is_percentage() {
        assert_eq!(ratio("abc", "abc"), 100);
        assert_eq!(ratio("", ""), 100);
        assert_eq!(ratio("abcd", "wxyz"), 0);
        assert_eq!(ratio("dolipane", "doliprane"), 88);
    }

    #[test]
    fn exact_and_base_matches_score_100() {
        let doliprane = record("Doliprane 1000mg", "Doliprane 1000mg (Paracétamol)");
        assert_eq!(score("doliprane 1000mg", &doliprane), 100);
        assert_eq!(score("Doliprane", &doliprane), 100);
    }

    #[test]
    fn accents_do_not_matter() {
        let voltarene = record("Voltarène 50mg", "Voltarène 50mg (Diclofénac)");
        assert_eq!(score("voltarene", &voltarene), 100);
    }

    #[test]
    fn active_ingredient_match() {
        let advil = record("Advil 400mg", "Advil 400mg (Ibuprofène)");
        assert_eq!(score("ibuprofene", &advil), 90);
    }

    #[test]
    fn prefix_matches() {
        let doliprane = record("Doliprane 1000mg", "Doliprane 1000mg (Paracétamol)");
        assert_eq!(score("dolip", &doliprane), 80);

        assert_eq!(score("dolipr 500", &doliprane), 75);
    }

    #[test]
    fn typo_scores_above_threshold() {
        let doliprane = record("Doliprane 1000mg", "Doliprane 1000mg (Paracétamol)");
        let s = score("dolipane", &doliprane);
        assert!((60..80).contains(&s), "got {s}");
    }

    #[test]
    fn fort_variants_are_normalized() {
        let inflamyl = record("Inflamyl Fort 100mg", "Inflamyl Fort 100mg (Kétoprofène)");
        assert_eq!(score("inflamyl ort", &inflamyl), 100);
        assert_eq!(score("inflamyl forte", &inflamyl), 100);
    }

    #[test]
    fn unrelated_names_score_low() {
        let advil = record("Advil 400mg", "Advil 400mg (Ibuprofène)");
        assert!(score("glucophage", &advil) < 60);
        assert_eq!(score("x", &advil), 0);
    }
}
