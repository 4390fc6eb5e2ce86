//! Rule-based drug interaction checker.
//!
//! Each drug is classified by markers found in its name, catalog key and
//! active ingredient (accent-folded). Pair rules between classes produce
//! interactions; some classes also carry standing warnings.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::knowledge::{DrugRecord, KnowledgeBase};
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use medquery_knowledge::fold;
use serde::Serialize;
use std::sync::Arc;

use crate::lookup::{resolve, with_confirmed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrugClass {
    Antithrombotic,
    Nsaid,
    Benzodiazepine,
    Opioid,
    Paracetamol,
    Metformin,
    Alcohol,
    IodinatedContrast,
}

const CLASS_MARKERS: &[(DrugClass, &[&str])] = &[
    (
        DrugClass::Antithrombotic,
        &[
            "aspirine", "aspirin", "acetylsalicylique", "kardegic", "warfarin", "coumadine",
            "sintrom", "acenocoumarol", "apixaban", "rivaroxaban", "heparine",
        ],
    ),
    (
        DrugClass::Nsaid,
        &[
            "advil", "nurofen", "ibuprofen", "voltarene", "diclofenac", "ketoprofene",
            "inflamyl", "naproxene",
        ],
    ),
    (
        DrugClass::Benzodiazepine,
        &["lexomil", "xanax", "bromazepam", "alprazolam", "valium", "diazepam", "lorazepam"],
    ),
    (
        DrugClass::Opioid,
        &["opioide", "opioid", "morphine", "codeine", "tramadol", "oxycodone", "fentanyl"],
    ),
    (
        DrugClass::Paracetamol,
        &["paracetamol", "doliprane", "efferalgan", "dafalgan", "acetaminophen"],
    ),
    (DrugClass::Metformin, &["metformine", "metformin", "glucophage"]),
    (DrugClass::Alcohol, &["alcool", "alcohol", "vin", "biere"]),
    (DrugClass::IodinatedContrast, &["contraste", "contrast", "iode"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

struct PairRule {
    a: DrugClass,
    b: DrugClass,
    severity: Severity,
    warning: &'static str,
    action: &'static str,
}

const PAIR_RULES: &[PairRule] = &[
    PairRule {
        a: DrugClass::Antithrombotic,
        b: DrugClass::Nsaid,
        severity: Severity::High,
        warning: "DANGER: Risque très élevé de saignement gastro-intestinal",
        action: "Consulter immédiatement un médecin",
    },
    PairRule {
        a: DrugClass::Benzodiazepine,
        b: DrugClass::Opioid,
        severity: Severity::High,
        warning: "DANGER: Risque de dépression respiratoire sévère",
        action: "Combinaison dangereuse, consulter un médecin",
    },
    PairRule {
        a: DrugClass::Benzodiazepine,
        b: DrugClass::Alcohol,
        severity: Severity::High,
        warning: "DANGER: L'alcool potentialise la sédation des benzodiazépines",
        action: "Ne jamais consommer d'alcool pendant le traitement",
    },
    PairRule {
        a: DrugClass::Metformin,
        b: DrugClass::IodinatedContrast,
        severity: Severity::High,
        warning: "Risque d'acidose lactique",
        action: "Arrêter la metformine 48h avant l'examen",
    },
    PairRule {
        a: DrugClass::Paracetamol,
        b: DrugClass::Alcohol,
        severity: Severity::Moderate,
        warning: "Toxicité hépatique accrue",
        action: "Éviter l'alcool et respecter la dose maximale",
    },
];

/// A class-level warning, reported whenever one checked drug has the class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub warning: &'static str,
    pub risk: &'static str,
}

fn class_warning(class: DrugClass) -> Option<Warning> {
    match class {
        DrugClass::Benzodiazepine => Some(Warning {
            kind: "alcohol",
            warning: "ATTENTION: Ne jamais consommer d'alcool avec les benzodiazépines",
            risk: "Dépression respiratoire potentiellement mortelle",
        }),
        DrugClass::Metformin => Some(Warning {
            kind: "medical_procedure",
            warning: "Arrêter 48h avant tout examen avec produit de contraste iodé",
            risk: "Risque d'acidose lactique",
        }),
        DrugClass::Paracetamol => Some(Warning {
            kind: "alcohol",
            warning: "Éviter l'alcool, risque de toxicité hépatique",
            risk: "Dommages au foie",
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interaction {
    pub severity: Severity,
    pub drugs: [String; 2],
    pub warning: &'static str,
    pub action: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct InteractionReport {
    pub drugs_checked: Vec<String>,
    pub interactions: Vec<Interaction>,
    pub warnings: Vec<Warning>,
    pub severity_level: Severity,
    pub safe: bool,
    /// Inputs not found in the catalog (still checked by name).
    pub unrecognized: Vec<String>,
}

/// Markers shorter than this only match a whole word ("vin" is not "vincristine").
const MIN_PREFIX_MARKER: usize = 5;

fn marker_matches(word: &str, marker: &str) -> bool {
    if marker.len() < MIN_PREFIX_MARKER {
        word == marker
    } else {
        word.starts_with(marker)
    }
}

/// One input drug with the classes it belongs to.
#[derive(Debug, Clone)]
pub struct CheckedDrug {
    pub label: String,
    pub classes: Vec<DrugClass>,
}

impl CheckedDrug {
    /// Classify a drug from its input name and, when known, its catalog record.
    pub fn classify(input: &str, record: Option<&DrugRecord>) -> Self {
        let mut profile = fold(input);
        if let Some(record) = record {
            profile.push(' ');
            profile.push_str(&fold(&record.name));
            profile.push(' ');
            profile.push_str(&fold(&record.key));
        }

        let classes = CLASS_MARKERS
            .iter()
            .filter(|(_, markers)| {
                markers
                    .iter()
                    .any(|m| profile.split(|c: char| !c.is_alphanumeric()).any(|w| marker_matches(w, m)))
            })
            .map(|(class, _)| *class)
            .collect();

        Self {
            label: record.map_or_else(|| input.trim().to_string(), |r| r.key.clone()),
            classes,
        }
    }

    fn has(&self, class: DrugClass) -> bool {
        self.classes.contains(&class)
    }
}

/// Apply the pair rules and class warnings to a set of classified drugs.
pub fn check(drugs: &[CheckedDrug]) -> InteractionReport {
    let mut interactions = Vec::new();
    for (i, first) in drugs.iter().enumerate() {
        for second in &drugs[i + 1..] {
            for rule in PAIR_RULES {
                let hit = (first.has(rule.a) && second.has(rule.b))
                    || (first.has(rule.b) && second.has(rule.a));
                if hit {
                    interactions.push(Interaction {
                        severity: rule.severity,
                        drugs: [first.label.clone(), second.label.clone()],
                        warning: rule.warning,
                        action: rule.action,
                    });
                }
            }
        }
    }

    let mut warnings: Vec<Warning> = Vec::new();
    for drug in drugs {
        for class in &drug.classes {
            if let Some(w) = class_warning(*class)
                && !warnings.contains(&w)
            {
                warnings.push(w);
            }
        }
    }

    let severity_level = interactions
        .iter()
        .map(|i| i.severity)
        .max()
        .unwrap_or(Severity::Low);

    InteractionReport {
        drugs_checked: drugs.iter().map(|d| d.label.clone()).collect(),
        safe: interactions.is_empty(),
        interactions,
        warnings,
        severity_level,
        unrecognized: Vec::new(),
    }
}

/// Accepts either a `drugs` array or a comma-separated `drug_list` string.
fn drug_names(arguments: &serde_json::Value) -> Result<Vec<String>, ToolError> {
    let names: Vec<String> = if let Some(list) = arguments["drugs"].as_array() {
        list.iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .collect()
    } else if let Some(list) = arguments["drug_list"].as_str() {
        list.split(',').map(|s| s.trim().to_string()).collect()
    } else {
        return Err(ToolError::InvalidArguments(
            "Missing 'drug_list' argument".into(),
        ));
    };

    let names: Vec<String> = names.into_iter().filter(|n| !n.is_empty()).collect();
    if names.is_empty() {
        return Err(ToolError::InvalidArguments(
            "'drug_list' must name at least one medication".into(),
        ));
    }
    Ok(names)
}

pub struct InteractionCheckTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl InteractionCheckTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for InteractionCheckTool {
    fn kind(&self) -> ToolKind {
        ToolKind::InteractionCheck
    }

    fn description(&self) -> &str {
        "Check a list of medications (and substances such as alcohol or iodinated \
         contrast) for dangerous interactions. Returns interactions, warnings, an \
         overall severity level and whether the combination is safe."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "drug_list": {
                    "type": "string",
                    "description": "Comma-separated medication names, e.g. 'Aspirine, Advil'"
                },
                "drugs": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Medication names as a list (alternative to drug_list)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let names = drug_names(&arguments)?;

        let mut checked = Vec::with_capacity(names.len());
        let mut records = Vec::new();
        let mut unrecognized = Vec::new();
        for name in &names {
            match resolve(self.kb.as_ref(), self.kind(), name).await? {
                Some(found) => {
                    checked.push(CheckedDrug::classify(name, Some(&found.record)));
                    records.push(found.record);
                }
                None => {
                    unrecognized.push(name.clone());
                    checked.push(CheckedDrug::classify(name, None));
                }
            }
        }

        let mut report = check(&checked);
        report.unrecognized = unrecognized;

        let data = serde_json::to_value(&report).unwrap_or_default();
        let output = serde_json::to_string_pretty(&data).unwrap_or_default();
        let confirmed: Vec<&DrugRecord> = records.iter().collect();
        Ok(ToolOutput::ok(output).with_data(with_confirmed(data, &confirmed)))
    }
}
