//! Two-medication comparison with a substitution verdict.

use async_trait::async_trait;
use medquery_core::error::ToolError;
use medquery_core::knowledge::{DrugRecord, KnowledgeBase};
use medquery_core::tool::{Tool, ToolKind, ToolOutput};
use medquery_knowledge::fold;
use serde::Serialize;
use std::sync::Arc;

use crate::lookup::{require, required_str, with_confirmed};

const PAIN_KEYWORDS: &[&str] = &["douleur", "pain", "analgesique"];
const FEVER_KEYWORDS: &[&str] = &["fievre", "fever", "antipyretique"];
const ANTIPLATELET_KEYWORDS: &[&str] = &["antiagr", "cardiovasculaire", "coagulation", "anticoagulant"];

/// Why two medications can or cannot replace each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    SameActiveIngredient,
    OverlappingUsage,
    AntiplateletDanger,
    DifferentUsage,
}

impl Verdict {
    pub fn can_substitute(self) -> bool {
        matches!(self, Self::SameActiveIngredient | Self::OverlappingUsage)
    }

    fn warning(self) -> &'static str {
        match self {
            Self::SameActiveIngredient => "Vérifier le dosage avec un pharmacien",
            Self::OverlappingUsage => "Principes actifs différents, consulter un pharmacien",
            Self::AntiplateletDanger => {
                "DANGER: Ne PAS substituer! L'un est un antiagrégant ou anticoagulant, \
                 l'autre non. Risque cardiovasculaire!"
            }
            Self::DifferentUsage => "Consulter un médecin ou pharmacien avant substitution",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub same_active_ingredient: bool,
    pub verdict: Verdict,
    pub can_substitute: bool,
    pub reason: String,
    pub warning: &'static str,
    pub recommendation: &'static str,
}

fn mentions(usage: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| usage.contains(k))
}

fn ingredient_of(record: &DrugRecord) -> String {
    record
        .active_ingredient()
        .unwrap_or_else(|| record.name.to_lowercase())
}

/// Decide whether `second` can stand in for `first`.
pub fn compare(first: &DrugRecord, second: &DrugRecord) -> Comparison {
    let active1 = ingredient_of(first);
    let active2 = ingredient_of(second);
    let same_active = fold(&active1) == fold(&active2);

    let usage1 = fold(&first.usage);
    let usage2 = fold(&second.usage);

    let (verdict, reason) = if same_active {
        (
            Verdict::SameActiveIngredient,
            format!("Même principe actif ({active1})"),
        )
    } else if (mentions(&usage1, PAIN_KEYWORDS) && mentions(&usage2, PAIN_KEYWORDS))
        || (mentions(&usage1, FEVER_KEYWORDS) && mentions(&usage2, FEVER_KEYWORDS))
    {
        (
            Verdict::OverlappingUsage,
            "Usages similaires (douleur/fièvre)".to_string(),
        )
    } else if mentions(&usage1, ANTIPLATELET_KEYWORDS) || mentions(&usage2, ANTIPLATELET_KEYWORDS) {
        (Verdict::AntiplateletDanger, "Usages DIFFÉRENTS".to_string())
    } else {
        (Verdict::DifferentUsage, "Usages différents".to_string())
    };

    let can_substitute = verdict.can_substitute();
    Comparison {
        same_active_ingredient: same_active,
        verdict,
        can_substitute,
        reason,
        warning: verdict.warning(),
        recommendation: if can_substitute {
            "Substitution possible"
        } else {
            "Substitution NON recommandée"
        },
    }
}

pub struct CompareMedicationsTool {
    kb: Arc<dyn KnowledgeBase>,
}

impl CompareMedicationsTool {
    pub fn new(kb: Arc<dyn KnowledgeBase>) -> Self {
        Self { kb }
    }
}

#[async_trait]
impl Tool for CompareMedicationsTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CompareMedications
    }

    fn description(&self) -> &str {
        "Compare two medications and decide whether one can replace the other. Use it \
         for questions like 'X au lieu de Y' or 'X instead of Y'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "drug1": {
                    "type": "string",
                    "description": "The medication the user wants to take"
                },
                "drug2": {
                    "type": "string",
                    "description": "The medication it would replace"
                }
            },
            "required": ["drug1", "drug2"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let name1 = required_str(&arguments, "drug1")?;
        let name2 = required_str(&arguments, "drug2")?;

        let first = require(self.kb.as_ref(), self.kind(), name1).await?.record;
        let second = require(self.kb.as_ref(), self.kind(), name2).await?.record;
        let comparison = compare(&first, &second);

        let describe = |r: &DrugRecord| {
            serde_json::json!({
                "name": r.key,
                "active_ingredient": ingredient_of(r),
                "usage": r.usage,
                "dosage": r.dosage,
            })
        };

        let mut data = serde_json::to_value(&comparison).unwrap_or_default();
        data["drug1"] = describe(&first);
        data["drug2"] = describe(&second);

        let output = serde_json::to_string_pretty(&data).unwrap_or_default();
        Ok(ToolOutput::ok(output).with_data(with_confirmed(data, &[&first, &second])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medquery_knowledge::InMemoryKnowledgeBase;

    fn tool() -> CompareMedicationsTool {
        CompareMedicationsTool::new(Arc::new(InMemoryKnowledgeBase::seed().unwrap()))
    }

    #[tokio::test]
    async fn doliprane_instead_of_aspirine_is_dangerous() {
        let result = tool()
            .execute(serde_json::json!({"drug1": "doliprane", "drug2": "aspirine"}))
            .await
            .unwrap();
        let data = result.data.as_ref().unwrap();
        assert_eq!(data["verdict"], "antiplatelet_danger");
        assert_eq!(data["can_substitute"], false);
        assert!(data["warning"].as_str().unwrap().contains("DANGER"));
        assert_eq!(result.confirmed_drugs(), vec!["aspirine", "doliprane"]);
    }

    #[tokio::test]
    async fn same_ingredient_can_substitute() {
        let result = tool()
            .execute(serde_json::json!({"drug1": "Efferalgan", "drug2": "Doliprane"}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["same_active_ingredient"], true);
        assert_eq!(data["can_substitute"], true);
        assert_eq!(data["warning"], "Vérifier le dosage avec un pharmacien");
    }

    #[tokio::test]
    async fn overlapping_pain_usage_can_substitute_with_warning() {
        let result = tool()
            .execute(serde_json::json!({"drug1": "Advil", "drug2": "Doliprane"}))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["verdict"], "overlapping_usage");
        assert_eq!(data["same_active_ingredient"], false);
    }

    #[tokio::test]
    async fn unrelated_usages_are_different() {
        let result = tool()
            .execute(serde_json::json!({"drug1": "Glucophage", "drug2": "Mopral"}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["verdict"], "different_usage");
    }

    #[tokio::test]
    async fn missing_drug_is_not_found() {
        let err = tool()
            .execute(serde_json::json!({"drug1": "doliprane", "drug2": "unknownium"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));

        let err = tool()
            .execute(serde_json::json!({"drug1": "doliprane"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
