//! Business and entity contexts handed to SQL validation, with their digests.
//!
//! Digests are lowercase hex SHA-256. Fields are separated with 0x1F (unit
//! separator) and records with 0x1E (record separator) so that no
//! concatenation of names can collide with another.

use crate::concepts::joins::JoinValidationResult;
use crate::concepts::model::{Concept, ConceptExample};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const UNIT_SEP: &[u8] = b"\x1f";
const RECORD_SEP: &[u8] = b"\x1e";

/// A concept selected for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMatch {
    pub concept: Concept,
    /// In [0, 1]
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessInstruction {
    pub concept: String,
    pub instructions: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantExample {
    pub concept: String,
    pub example: ConceptExample,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCoverage {
    pub total_entities: usize,
    /// Entities targeted by at least one matched concept
    pub covered_entities: BTreeSet<String>,
}

/// Output of concept matching; input to business compliance validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessContext {
    pub query: String,
    pub matches: Vec<ConceptMatch>,
    pub join_validation: Vec<JoinValidationResult>,
    pub business_instructions: Vec<BusinessInstruction>,
    pub relevant_examples: Vec<RelevantExample>,
    pub entity_coverage: EntityCoverage,
}

impl BusinessContext {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn concept_names(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.concept.name.as_str()).collect()
    }

    /// Digest over matched concepts sorted by name (name, instructions, raw
    /// required joins), followed by each join validation outcome sorted by
    /// concept (validity and missing entities).
    ///
    /// Similarity scores, examples and the query text do not contribute.
    pub fn digest(&self) -> String {
        let mut concepts: Vec<&Concept> = self.matches.iter().map(|m| &m.concept).collect();
        concepts.sort_by(|a, b| a.name.cmp(&b.name));

        let mut hasher = Sha256::new();
        for concept in concepts {
            hasher.update(concept.name.as_bytes());
            hasher.update(UNIT_SEP);
            hasher.update(concept.instructions.as_bytes());
            for join in &concept.required_joins {
                hasher.update(UNIT_SEP);
                hasher.update(join.raw().as_bytes());
            }
            hasher.update(RECORD_SEP);
        }

        let mut outcomes: Vec<&JoinValidationResult> = self.join_validation.iter().collect();
        outcomes.sort_by(|a, b| a.concept_name.cmp(&b.concept_name));
        for outcome in outcomes {
            hasher.update(RECORD_SEP);
            hasher.update(outcome.concept_name.as_bytes());
            hasher.update(UNIT_SEP);
            hasher.update(if outcome.valid { "valid" } else { "invalid" });
            for entity in &outcome.missing_entities {
                hasher.update(UNIT_SEP);
                hasher.update(entity.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// The entity names a SQL candidate was generated against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityContext {
    pub entities: Vec<String>,
}

impl EntityContext {
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entities: entities.into_iter().map(Into::into).collect(),
        }
    }

    /// Digest over sorted, de-duplicated, lowercased entity names
    pub fn digest(&self) -> String {
        let names: BTreeSet<String> = self.entities.iter().map(|e| e.to_lowercase()).collect();
        let mut hasher = Sha256::new();
        for name in names {
            hasher.update(name.as_bytes());
            hasher.update(RECORD_SEP);
        }
        hex::encode(hasher.finalize())
    }
}
