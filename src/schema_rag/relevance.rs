//! Relevance Scoring
//!
//! Fuses the raw semantic similarity reported by the entity index with two
//! lexical signals:
//! - purpose match: Jaccard overlap of query and business-purpose tokens
//! - name match: verbatim (1.0), partial containment (0.7) or none (0.0)
//!
//! The fused score is `w_s * semantic + w_p * purpose + w_n * name`, clamped to [0, 1].

use crate::config::RelevanceWeights;
use crate::oracle::EntityCandidate;
use crate::text::{clamp_unit, content_tokens, jaccard, number_variants, tokenize};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Score given to a name that is only contained in (or contains) a query token
pub const PARTIAL_NAME_MATCH: f64 = 0.7;

/// Below this many surviving entities the inclusion floor is ignored
const MIN_GUARANTEED_RESULTS: usize = 3;

/// Shortest query token considered for partial name containment
const MIN_PARTIAL_TOKEN_LEN: usize = 3;

/// Score breakdown for one entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub semantic: f64,
    pub purpose_match: f64,
    pub name_match: f64,
    pub fused: f64,
}

/// Coarse label for a fused score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelevanceTier {
    HighlyRelevant,
    Relevant,
    Moderate,
    Low,
    NotRelevant,
}

impl RelevanceTier {
    pub fn from_score(fused: f64) -> Self {
        if fused >= 0.8 {
            RelevanceTier::HighlyRelevant
        } else if fused >= 0.6 {
            RelevanceTier::Relevant
        } else if fused >= 0.4 {
            RelevanceTier::Moderate
        } else if fused >= 0.2 {
            RelevanceTier::Low
        } else {
            RelevanceTier::NotRelevant
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RelevanceTier::HighlyRelevant => "Highly relevant - strongly recommended",
            RelevanceTier::Relevant => "Relevant - good match",
            RelevanceTier::Moderate => "Moderately relevant",
            RelevanceTier::Low => "Low relevance",
            RelevanceTier::NotRelevant => "Not relevant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub name: String,
    pub business_purpose: String,
    pub score: RelevanceScore,
    pub recommendation: RelevanceTier,
}

/// Ranked output of entity resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntities {
    pub query: String,
    pub entities: Vec<RankedEntity>,
    /// min(1, 1.2 * mean fused score); 0 when empty
    pub confidence: f64,
    pub analysis: String,
    pub candidates_considered: usize,
    pub floor_relaxed: bool,
}

impl RankedEntities {
    pub fn names(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Pure, deterministic entity ranker
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    weights: RelevanceWeights,
    inclusion_floor: f64,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self {
            weights: RelevanceWeights::default(),
            inclusion_floor: 0.2,
        }
    }
}

impl RelevanceScorer {
    pub fn new(weights: RelevanceWeights, inclusion_floor: f64) -> Self {
        Self {
            weights,
            inclusion_floor: clamp_unit(inclusion_floor),
        }
    }

    pub fn weights(&self) -> RelevanceWeights {
        self.weights
    }

    /// Score a single candidate against the query
    pub fn score(&self, query: &str, candidate: &EntityCandidate) -> RelevanceScore {
        let query_tokens = content_tokens(query);
        self.score_with_tokens(query, &query_tokens, candidate)
    }

    fn score_with_tokens(
        &self,
        query: &str,
        query_tokens: &BTreeSet<String>,
        candidate: &EntityCandidate,
    ) -> RelevanceScore {
        let semantic = clamp_unit(candidate.similarity);
        let purpose_match = clamp_unit(jaccard(
            query_tokens,
            &content_tokens(&candidate.business_purpose),
        ));
        let name_match = clamp_unit(name_match(&candidate.name, query));
        let fused = clamp_unit(
            self.weights.semantic * semantic
                + self.weights.purpose * purpose_match
                + self.weights.name * name_match,
        );

        RelevanceScore {
            semantic,
            purpose_match,
            name_match,
            fused,
        }
    }

    /// Rank candidates for a query.
    ///
    /// Empty input yields an empty result, never an error.
    pub fn rank(
        &self,
        query: &str,
        candidates: &[EntityCandidate],
        max_results: Option<usize>,
    ) -> RankedEntities {
        let unique = dedupe_candidates(candidates);
        let query_tokens = content_tokens(query);

        let mut scored: Vec<RankedEntity> = unique
            .iter()
            .map(|candidate| {
                let score = self.score_with_tokens(query, &query_tokens, candidate);
                RankedEntity {
                    name: candidate.name.clone(),
                    business_purpose: candidate.business_purpose.clone(),
                    score,
                    recommendation: RelevanceTier::from_score(score.fused),
                }
            })
            .collect();

        let above_floor = scored
            .iter()
            .filter(|e| e.score.fused >= self.inclusion_floor)
            .count();
        let floor_relaxed = above_floor < MIN_GUARANTEED_RESULTS;
        if !floor_relaxed {
            scored.retain(|e| e.score.fused >= self.inclusion_floor);
        }

        scored.sort_by(compare_ranked);
        if let Some(max) = max_results {
            scored.truncate(max);
        }

        let confidence = if scored.is_empty() {
            0.0
        } else {
            let mean = scored.iter().map(|e| e.score.fused).sum::<f64>() / scored.len() as f64;
            clamp_unit(mean * 1.2)
        };

        RankedEntities {
            query: query.to_string(),
            analysis: summarize(query, &scored),
            entities: scored,
            confidence,
            candidates_considered: unique.len(),
            floor_relaxed,
        }
    }
}

/// Fused score desc, then raw semantic desc, then name asc
fn compare_ranked(a: &RankedEntity, b: &RankedEntity) -> Ordering {
    b.score
        .fused
        .total_cmp(&a.score.fused)
        .then_with(|| b.score.semantic.total_cmp(&a.score.semantic))
        .then_with(|| a.name.cmp(&b.name))
}

/// Entity names are unique per request (case-insensitively); keep the strongest
/// hit for a repeated name
fn dedupe_candidates(candidates: &[EntityCandidate]) -> Vec<EntityCandidate> {
    let mut by_name: HashMap<String, &EntityCandidate> = HashMap::new();
    for candidate in candidates {
        by_name
            .entry(candidate.name.to_lowercase())
            .and_modify(|existing| {
                if clamp_unit(candidate.similarity) > clamp_unit(existing.similarity) {
                    *existing = candidate;
                }
            })
            .or_insert(candidate);
    }
    let mut unique: Vec<EntityCandidate> = by_name.into_values().cloned().collect();
    unique.sort_by(|a, b| a.name.cmp(&b.name));
    unique
}

/// 1.0 for a verbatim hit (including singular/plural variants), 0.7 for
/// substring containment, otherwise 0.0
pub fn name_match(entity_name: &str, query: &str) -> f64 {
    let name = entity_name.trim().to_lowercase();
    if name.is_empty() {
        return 0.0;
    }
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let padded_query = format!(" {} ", query_tokens.join(" "));

    let name_parts = tokenize(&name);
    if name_parts.is_empty() {
        return 0.0;
    }
    // Only the last word of a compound name is inflected: order_item -> order items
    let head = &name_parts[..name_parts.len() - 1];
    let last = &name_parts[name_parts.len() - 1];
    for variant in number_variants(last) {
        let mut phrase: Vec<&str> = head.iter().map(String::as_str).collect();
        phrase.push(variant.as_str());
        let needle = format!(" {} ", phrase.join(" "));
        if padded_query.contains(&needle) {
            return 1.0;
        }
    }
    // The name written as one word in the query, e.g. "orderitems"
    let joined = name_parts.concat();
    if number_variants(&joined).iter().any(|v| query_tokens.contains(v)) {
        return 1.0;
    }

    let partial = query_tokens
        .iter()
        .filter(|t| t.len() >= MIN_PARTIAL_TOKEN_LEN)
        .any(|t| {
            joined.contains(t.as_str())
                || (joined.len() >= MIN_PARTIAL_TOKEN_LEN && t.contains(joined.as_str()))
        });
    if partial {
        PARTIAL_NAME_MATCH
    } else {
        0.0
    }
}

fn summarize(query: &str, entities: &[RankedEntity]) -> String {
    match entities.first() {
        None => format!("No relevant entities found for '{}'", query),
        Some(top) => {
            let mean = entities.iter().map(|e| e.score.fused).sum::<f64>() / entities.len() as f64;
            format!(
                "Found {} applicable entities for '{}'. Top match: '{}' with average relevance: {:.2}",
                entities.len(),
                query,
                top.name,
                mean
            )
        }
    }
}
