//! Join Validation
//!
//! Checks a concept's required joins against the entities available to a query.

use crate::concepts::model::{Concept, JoinRequirement, RequiredJoin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Why a required join is not satisfied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnsatisfiedReason {
    MissingEntities { entities: BTreeSet<String> },
    Malformed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsatisfiedJoin {
    pub raw: String,
    #[serde(flatten)]
    pub reason: UnsatisfiedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinValidationResult {
    pub concept_name: String,
    pub satisfied: Vec<JoinRequirement>,
    pub unsatisfied: Vec<UnsatisfiedJoin>,
    /// Union of missing entities over unsatisfied joins
    pub missing_entities: BTreeSet<String>,
    pub valid: bool,
}

impl JoinValidationResult {
    pub fn malformed_joins(&self) -> impl Iterator<Item = &UnsatisfiedJoin> {
        self.unsatisfied
            .iter()
            .filter(|u| matches!(u.reason, UnsatisfiedReason::Malformed { .. }))
    }
}

/// Validates required joins against an available entity set (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct JoinValidator;

impl JoinValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate<'a, I>(&self, available: I, concept: &Concept) -> JoinValidationResult
    where
        I: IntoIterator<Item = &'a String>,
    {
        let available: BTreeSet<String> = available.into_iter().map(|e| e.to_lowercase()).collect();
        let mut satisfied = Vec::new();
        let mut unsatisfied = Vec::new();
        let mut missing_entities = BTreeSet::new();

        for required in &concept.required_joins {
            match required {
                RequiredJoin::Parsed { raw, join } => {
                    let missing: BTreeSet<String> = join
                        .entities()
                        .iter()
                        .filter(|e| !available.contains(&e.to_lowercase()))
                        .map(|e| e.to_string())
                        .collect();
                    if missing.is_empty() {
                        satisfied.push(join.clone());
                    } else {
                        missing_entities.extend(missing.iter().cloned());
                        unsatisfied.push(UnsatisfiedJoin {
                            raw: raw.clone(),
                            reason: UnsatisfiedReason::MissingEntities { entities: missing },
                        });
                    }
                }
                RequiredJoin::Malformed(err) => unsatisfied.push(UnsatisfiedJoin {
                    raw: err.raw.clone(),
                    reason: UnsatisfiedReason::Malformed {
                        message: err.reason.clone(),
                    },
                }),
            }
        }

        let valid = unsatisfied.is_empty();
        JoinValidationResult {
            concept_name: concept.name.clone(),
            satisfied,
            unsatisfied,
            missing_entities,
            valid,
        }
    }
}
