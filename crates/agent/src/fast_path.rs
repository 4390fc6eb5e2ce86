//! Pattern-matched fast path for simple lookups.
//!
//! A query matching one of the [`FastPattern`]s is answered straight from
//! the knowledge base, without the model. The first pattern that matches
//! decides; if its subject cannot be resolved the query goes to the agent.

use medquery_config::FastPathConfig;
use medquery_core::error::KnowledgeError;
use medquery_core::knowledge::{DrugMatch, DrugRecord, KnowledgeBase};
use medquery_core::query::Query;
use medquery_core::response::{Candidate, Note};
use medquery_knowledge::symptoms::{usage_keywords, usage_matches};
use medquery_knowledge::{find_symptom, fold};
use regex_lite::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Longest subject, in words, the fast path will try to resolve.
const MAX_SUBJECT_WORDS: usize = 3;
/// Most medications listed for a symptom.
const MAX_SYMPTOM_RESULTS: usize = 6;
const SEARCH_LIMIT: usize = 5;

/// Words that join several subjects ("advil et xanax", "advil vs nurofen").
const CONNECTORS: &[&str] = &[
    "et", "and", "ou", "or", "vs", "versus", "avec", "with", "sans", "without", "instead", "lieu",
    "plutot", "puis",
];

/// Query shapes the fast path recognizes, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FastPattern {
    SymptomSearch,
    SideEffects,
    Dosage,
    Usage,
    Warnings,
    IndicationCheck,
    DrugInfo,
    BareDrugName,
}

impl FastPattern {
    pub const ALL: [FastPattern; 8] = [
        FastPattern::SymptomSearch,
        FastPattern::SideEffects,
        FastPattern::Dosage,
        FastPattern::Usage,
        FastPattern::Warnings,
        FastPattern::IndicationCheck,
        FastPattern::DrugInfo,
        FastPattern::BareDrugName,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SymptomSearch => "symptom_search",
            Self::SideEffects => "side_effects",
            Self::Dosage => "dosage",
            Self::Usage => "usage",
            Self::Warnings => "warnings",
            Self::IndicationCheck => "indication_check",
            Self::DrugInfo => "drug_info",
            Self::BareDrugName => "bare_drug_name",
        }
    }

    fn expressions(self) -> &'static [&'static str] {
        match self {
            Self::SymptomSearch => &[
                r"^(?:quels? |quelles? )?(?:medicaments?|medicines?|medications?|remedes?|drugs?) (?:pour|contre|for|against) (.+)$",
                r"^(?:what|which) (?:medicines?|medications?|drugs?|pills?) (?:for|to take for|against) (.+)$",
                r"^what (?:should i |can i |do i |to )?take for (.+)$",
                r"^(?:que|quoi) prendre (?:pour|contre) (.+)$",
            ],
            Self::SideEffects => &[
                r"^(?:side effects?|adverse effects?) (?:of|for) (.+)$",
                r"^(?:effets? secondaires?|effets? indesirables?) (?:de |du |des |d')?(.+)$",
                r"^(.+?) (?:side effects?|effets? secondaires?)$",
            ],
            Self::Dosage => &[
                r"^(?:dosage|dose|posology) (?:of|for) (.+)$",
                r"^(?:posologie|dosage|dose) (?:de |du |des |d'|pour )?(.+)$",
                r"^(.+?) (?:dosage|posologie)$",
            ],
            Self::Usage => &[
                r"^(?:usage|use|uses) (?:of|for) (.+)$",
                r"^(?:utilisation|usage|indications?) (?:de |du |des |d')?(.+)$",
                r"^when (?:do i |do we |should i |can i |to )?(?:use|take) (.+)$",
                r"^(?:quand|comment) (?:utiliser|prendre) (.+)$",
                r"^a quoi sert (.+)$",
                r"^(.+?) (?:usage|utilisation)$",
            ],
            Self::Warnings => &[
                r"^(?:warnings?|precautions?|contraindications?) (?:for|of|about|with) (.+)$",
                r"^(?:precautions?|avertissements?|mises? en garde|contre-indications?) (?:de |du |des |d'|pour |avec )?(.+)$",
                r"^(.+?) (?:warnings?|precautions?)$",
            ],
            Self::IndicationCheck => &[
                r"^(?:does|is) (.+?) (?:help|helps|work|works|good|effective) (?:with|for|against) (.+)$",
                r"^est[- ]ce qu(?:e |')(.+?) (?:aide|marche|fonctionne|soigne|est efficace|est bon) (?:pour|contre) (.+)$",
                r"^(.+?) (?:helps?|works?) (?:with|for|against) (.+)$",
                r"^(.+?) (?:aide|marche|est efficace) (?:pour|contre) (.+)$",
            ],
            Self::DrugInfo => &[
                r"^(?:infos?|informations?|renseignements?|details?) (?:sur|about|on|for|de|du|pour) (.+)$",
                r"^(?:donne|montre|affiche)(?:-moi| moi)? (?:les )?(?:infos?|informations?) (?:sur|de|pour) (.+)$",
                r"^(?:c'est quoi|qu'est-ce que|qu'est ce que) (.+)$",
                r"^(?:what is|what's|tell me about) (.+)$",
                r"^parle(?:-moi| moi) (?:de |du |des |d')(.+)$",
                r"^(.+?) c'est quoi$",
            ],
            Self::BareDrugName => &[
                r"^([a-z][a-z0-9'-]{3,})$",
                r"^([a-z][a-z0-9'-]{2,} (?:fort|forte))$",
            ],
        }
    }
}

impl std::fmt::Display for FastPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

static PATTERNS: LazyLock<Vec<(FastPattern, Vec<Regex>)>> = LazyLock::new(|| {
    FastPattern::ALL
        .into_iter()
        .map(|pattern| {
            let compiled = pattern
                .expressions()
                .iter()
                .map(|e| Regex::new(e).expect("fast path pattern is valid"))
                .collect();
            (pattern, compiled)
        })
        .collect()
});

/// The pattern a query matched and what it captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub pattern: FastPattern,
    /// Drug name, or the symptom for `SymptomSearch`
    pub subject: String,
    /// Condition asked about by `IndicationCheck`
    pub topic: Option<String>,
}

const LEADING_FILLERS: &[&str] = &[
    "le ", "la ", "les ", "l'", "du ", "de ", "des ", "d'", "un ", "une ", "the ", "a ", "an ",
    "my ", "mon ", "ma ", "mes ", "j'ai ", "i have ",
];

fn strip_fillers(text: &str) -> String {
    let mut rest = text.trim();
    while let Some(prefix) = LEADING_FILLERS.iter().find(|p| rest.starts_with(*p)) {
        rest = rest[prefix.len()..].trim_start();
    }
    rest.to_string()
}

/// Match normalized query text against the fast path patterns.
pub fn match_pattern(normalized: &str) -> Option<PatternMatch> {
    let text = fold(normalized);
    for (pattern, expressions) in PATTERNS.iter() {
        for re in expressions {
            let Some(caps) = re.captures(&text) else {
                continue;
            };
            let subject = strip_fillers(caps.get(1).map_or("", |m| m.as_str()));
            if subject.is_empty() {
                continue;
            }
            let topic = caps
                .get(2)
                .map(|m| strip_fillers(m.as_str()))
                .filter(|t| !t.is_empty());
            return Some(PatternMatch {
                pattern: *pattern,
                subject,
                topic,
            });
        }
    }
    None
}

fn has_connector(subject: &str) -> bool {
    subject.split_whitespace().any(|w| CONNECTORS.contains(&w))
}

/// How many distinct catalog drugs the subject names by their first word.
fn named_drugs(subject: &str, known_names: &[String]) -> usize {
    let words: Vec<&str> = subject.split_whitespace().collect();
    let mut firsts: Vec<String> = known_names
        .iter()
        .filter_map(|n| fold(n).split_whitespace().next().map(str::to_string))
        .filter(|first| words.contains(&first.as_str()))
        .collect();
    firsts.sort();
    firsts.dedup();
    firsts.len()
}

/// A query answered by the fast path.
#[derive(Debug, Clone)]
pub struct FastResolution {
    pub pattern: FastPattern,
    pub answer: String,
    /// Similarity of the resolved drug; None for symptom lookups
    pub match_score: Option<u8>,
    pub ambiguous: bool,
    pub note: Option<Note>,
    /// Catalog keys the answer is about
    pub drugs: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub enum FastPathOutcome {
    Resolved(FastResolution),
    Unresolved,
}

impl FastPathOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

enum NameMatch {
    Found(DrugRecord, u8),
    Ambiguous(Vec<DrugMatch>),
    NoMatch,
}

#[derive(Clone, Copy)]
enum Section {
    Dosage,
    Usage,
    SideEffects,
    Warnings,
    Interactions,
    Instructions,
    Manufacturer,
}

impl Section {
    fn label(self) -> &'static str {
        match self {
            Self::Dosage => "Dosage",
            Self::Usage => "Usage",
            Self::SideEffects => "Effets secondaires",
            Self::Warnings => "Précautions",
            Self::Interactions => "Interactions",
            Self::Instructions => "Instructions",
            Self::Manufacturer => "Fabricant",
        }
    }

    fn value(self, record: &DrugRecord) -> &str {
        match self {
            Self::Dosage => &record.dosage,
            Self::Usage => &record.usage,
            Self::SideEffects => &record.side_effects,
            Self::Warnings => &record.warnings,
            Self::Interactions => &record.interactions,
            Self::Instructions => &record.instructions,
            Self::Manufacturer => &record.manufacturer,
        }
    }
}

const ALL_SECTIONS: &[Section] = &[
    Section::Dosage,
    Section::Usage,
    Section::SideEffects,
    Section::Warnings,
    Section::Interactions,
    Section::Instructions,
    Section::Manufacturer,
];

fn sections_for(pattern: FastPattern) -> &'static [Section] {
    match pattern {
        FastPattern::SideEffects => &[Section::SideEffects, Section::Warnings],
        FastPattern::Dosage => &[Section::Dosage, Section::Instructions],
        FastPattern::Usage => &[Section::Usage, Section::Dosage],
        FastPattern::Warnings => &[Section::Warnings, Section::Interactions],
        _ => ALL_SECTIONS,
    }
}

fn drug_card(record: &DrugRecord, sections: &[Section]) -> String {
    let mut card = format!("**{}**\n\n", record.display_name());
    for section in sections {
        let value = section.value(record);
        if !value.is_empty() {
            card.push_str(&format!("**{}:** {}\n\n", section.label(), value));
        }
    }
    card.trim_end().to_string()
}

fn fuzzy_prefix(record: &DrugRecord, score: u8) -> String {
    if score >= 100 {
        String::new()
    } else {
        format!(
            "Je pense que vous cherchez **{}** (similarité: {}%)\n\n",
            record.key, score
        )
    }
}

/// Answers simple queries from the knowledge base alone.
pub struct FastPathClassifier {
    kb: Arc<dyn KnowledgeBase>,
    enabled: bool,
    accept_threshold: u8,
    ambiguity_margin: u8,
}

impl FastPathClassifier {
    pub fn new(kb: Arc<dyn KnowledgeBase>, config: &FastPathConfig) -> Self {
        Self {
            kb,
            enabled: config.enabled,
            accept_threshold: config.accept_threshold,
            ambiguity_margin: config.ambiguity_margin,
        }
    }

    pub async fn classify(&self, query: &Query) -> FastPathOutcome {
        if !self.enabled {
            return FastPathOutcome::Unresolved;
        }
        let Some(m) = match_pattern(query.normalized()) else {
            debug!(fingerprint = query.fingerprint(), "No fast path pattern matched");
            return FastPathOutcome::Unresolved;
        };
        if m.subject.split_whitespace().count() > MAX_SUBJECT_WORDS {
            debug!(pattern = %m.pattern, "Subject too long for the fast path");
            return FastPathOutcome::Unresolved;
        }
        if has_connector(&m.subject) {
            debug!(pattern = %m.pattern, subject = %m.subject, "Compound subject, leaving it to the agent");
            return FastPathOutcome::Unresolved;
        }
        if m.pattern != FastPattern::SymptomSearch {
            match self.kb.known_names().await {
                Ok(names) if named_drugs(&m.subject, &names) > 1 => {
                    debug!(pattern = %m.pattern, subject = %m.subject, "Several drugs named, leaving it to the agent");
                    return FastPathOutcome::Unresolved;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Could not list known drug names");
                    return FastPathOutcome::Unresolved;
                }
            }
        }

        let result = match m.pattern {
            FastPattern::SymptomSearch => self.symptom(&m.subject).await,
            FastPattern::IndicationCheck => self.indication(&m).await,
            pattern => self.drug_lookup(pattern, &m.subject).await,
        };

        match result {
            Ok(Some(resolution)) => {
                debug!(pattern = %m.pattern, subject = %m.subject, "Fast path resolved");
                FastPathOutcome::Resolved(resolution)
            }
            Ok(None) => {
                debug!(pattern = %m.pattern, subject = %m.subject, "Fast path subject not resolved");
                FastPathOutcome::Unresolved
            }
            Err(e) => {
                warn!(pattern = %m.pattern, error = %e, "Knowledge lookup failed on fast path");
                FastPathOutcome::Unresolved
            }
        }
    }

    async fn resolve_name(&self, name: &str) -> Result<NameMatch, KnowledgeError> {
        if let Some(record) = self.kb.get(name).await? {
            return Ok(NameMatch::Found(record, 100));
        }

        let mut accepted: Vec<DrugMatch> = self
            .kb
            .search(name, SEARCH_LIMIT)
            .await?
            .into_iter()
            .filter(|m| m.score >= self.accept_threshold)
            .collect();
        accepted.sort_by(|a, b| b.score.cmp(&a.score));
        let Some(top) = accepted.first() else {
            return Ok(NameMatch::NoMatch);
        };

        // Strengths of one brand are not competing candidates
        let mut close: Vec<DrugMatch> = Vec::new();
        for candidate in &accepted {
            let within = top.score.saturating_sub(candidate.score) <= self.ambiguity_margin;
            let new_brand = !close
                .iter()
                .any(|c| c.record.base_name() == candidate.record.base_name());
            if within && new_brand {
                close.push(candidate.clone());
            }
        }

        if close.len() >= 2 {
            Ok(NameMatch::Ambiguous(close))
        } else {
            Ok(NameMatch::Found(top.record.clone(), top.score))
        }
    }

    fn disambiguation(&self, pattern: FastPattern, name: &str, candidates: Vec<DrugMatch>) -> FastResolution {
        let mut answer = format!("Plusieurs médicaments correspondent à « {name} » :\n\n");
        for c in &candidates {
            answer.push_str(&format!("- **{}** (similarité: {}%)\n", c.record.key, c.score));
        }
        answer.push_str("\nPrécisez lequel vous intéresse.");

        let top = candidates.first().map(|c| c.score);
        FastResolution {
            pattern,
            answer,
            match_score: top,
            ambiguous: true,
            note: Some(
                Note::new(format!("Ambiguous medication name '{name}'")).with_candidates(
                    candidates
                        .iter()
                        .map(|c| Candidate {
                            name: c.record.key.clone(),
                            score: c.score,
                        })
                        .collect(),
                ),
            ),
            drugs: candidates.iter().map(|c| c.record.key.clone()).collect(),
            reasoning: format!("'{name}' matches several medications within the ambiguity margin"),
        }
    }

    async fn drug_lookup(&self, pattern: FastPattern, name: &str) -> Result<Option<FastResolution>, KnowledgeError> {
        match self.resolve_name(name).await? {
            NameMatch::NoMatch => Ok(None),
            NameMatch::Ambiguous(candidates) => Ok(Some(self.disambiguation(pattern, name, candidates))),
            NameMatch::Found(record, score) => {
                let answer = format!(
                    "{}{}",
                    fuzzy_prefix(&record, score),
                    drug_card(&record, sections_for(pattern))
                );
                let reasoning = if score >= 100 {
                    format!("Direct lookup of '{name}' found {}", record.key)
                } else {
                    format!("Fuzzy match of '{name}' to {} (score {score})", record.key)
                };
                Ok(Some(FastResolution {
                    pattern,
                    answer,
                    match_score: Some(score),
                    ambiguous: false,
                    note: None,
                    drugs: vec![record.key],
                    reasoning,
                }))
            }
        }
    }

    async fn symptom(&self, subject: &str) -> Result<Option<FastResolution>, KnowledgeError> {
        let symptom = find_symptom(subject)
            .map(str::to_string)
            .unwrap_or_else(|| subject.to_string());
        let records = self.kb.by_symptom(&symptom).await?;
        if records.is_empty() {
            return Ok(None);
        }

        let mut answer = format!("**Médicaments pour {subject} :**\n\n");
        for record in records.iter().take(MAX_SYMPTOM_RESULTS) {
            answer.push_str(&format!(
                "- **{}**\n  - Usage: {}\n  - Dosage: {}\n\n",
                record.key, record.usage, record.dosage
            ));
        }
        answer.push_str("**Important :** consultez un pharmacien ou un médecin pour un conseil personnalisé.");

        Ok(Some(FastResolution {
            pattern: FastPattern::SymptomSearch,
            answer,
            match_score: None,
            ambiguous: false,
            note: None,
            drugs: records
                .iter()
                .take(MAX_SYMPTOM_RESULTS)
                .map(|r| r.key.clone())
                .collect(),
            reasoning: format!("Symptom '{symptom}' matched {} medications by usage", records.len()),
        }))
    }

    async fn indication(&self, m: &PatternMatch) -> Result<Option<FastResolution>, KnowledgeError> {
        let Some(condition) = m.topic.as_deref() else {
            return Ok(None);
        };
        let (record, score) = match self.resolve_name(&m.subject).await? {
            NameMatch::NoMatch => return Ok(None),
            NameMatch::Ambiguous(candidates) => {
                return Ok(Some(self.disambiguation(m.pattern, &m.subject, candidates)));
            }
            NameMatch::Found(record, score) => (record, score),
        };

        let keywords = usage_keywords(find_symptom(condition).unwrap_or(condition));
        let indicated = usage_matches(&record.usage, &keywords);
        let verdict = if indicated {
            format!(
                "**Oui**, {} est indiqué pour {condition}.\n\n**Usage:** {}",
                record.key, record.usage
            )
        } else {
            format!(
                "**Non**, {} n'est pas indiqué pour {condition}.\n\n**Usage réel:** {}\n\n\
                 Consultez un professionnel de santé pour un traitement approprié.",
                record.key, record.usage
            )
        };

        Ok(Some(FastResolution {
            pattern: m.pattern,
            answer: format!("{}{verdict}", fuzzy_prefix(&record, score)),
            match_score: Some(score),
            ambiguous: false,
            note: None,
            reasoning: format!(
                "Usage of {} {} '{condition}'",
                record.key,
                if indicated { "mentions" } else { "does not mention" }
            ),
            drugs: vec![record.key],
        }))
    }
}
