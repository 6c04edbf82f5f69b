//! Concept Matching
//!
//! Selects the business concepts that apply to a query over a resolved entity
//! set and assembles the business context used downstream by SQL validation.

use crate::concepts::catalog::ConceptCatalog;
use crate::concepts::context::{
    BusinessContext, BusinessInstruction, ConceptMatch, EntityCoverage, RelevantExample,
};
use crate::concepts::joins::JoinValidator;
use crate::concepts::model::{Concept, ConceptExample};
use crate::error::{ResolutionError, Result};
use crate::oracle::TextSimilarityOracle;
use crate::text::{clamp_unit, lexical_similarity};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Examples attached to each matched concept in the business context
pub const DEFAULT_MAX_EXAMPLES: usize = 3;

/// How query/concept similarity is computed
#[derive(Clone)]
pub enum SimilarityStrategy {
    /// Jaccard overlap of content tokens
    Lexical,
    /// External similarity service, optionally falling back to `Lexical` on failure
    Oracle {
        oracle: Arc<dyn TextSimilarityOracle>,
        lexical_fallback: bool,
    },
}

impl std::fmt::Debug for SimilarityStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimilarityStrategy::Lexical => write!(f, "Lexical"),
            SimilarityStrategy::Oracle { lexical_fallback, .. } => f
                .debug_struct("Oracle")
                .field("lexical_fallback", lexical_fallback)
                .finish(),
        }
    }
}

impl SimilarityStrategy {
    pub async fn similarity(&self, left: &str, right: &str) -> Result<f64> {
        let score = match self {
            SimilarityStrategy::Lexical => lexical_similarity(left, right),
            SimilarityStrategy::Oracle {
                oracle,
                lexical_fallback,
            } => match oracle.similarity(left, right).await {
                Ok(score) => score,
                Err(e) if *lexical_fallback => {
                    warn!("Similarity oracle failed, using lexical overlap: {}", e);
                    lexical_similarity(left, right)
                }
                Err(e) => {
                    return Err(match e {
                        ResolutionError::UpstreamUnavailable(_) => e,
                        other => ResolutionError::UpstreamUnavailable(other.to_string()),
                    })
                }
            },
        };
        Ok(clamp_unit(score))
    }
}

pub struct ConceptMatcher {
    catalog: Arc<dyn ConceptCatalog>,
    strategy: SimilarityStrategy,
    threshold: f64,
    join_validator: JoinValidator,
}

impl ConceptMatcher {
    pub fn new(catalog: Arc<dyn ConceptCatalog>, strategy: SimilarityStrategy, threshold: f64) -> Self {
        Self {
            catalog,
            strategy,
            threshold: clamp_unit(threshold),
            join_validator: JoinValidator::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Concepts targeting `entities` whose similarity to `query` reaches the threshold,
    /// sorted by similarity (descending) then name.
    pub async fn find_matches(&self, query: &str, entities: &[String]) -> Result<Vec<ConceptMatch>> {
        let entity_set: BTreeSet<String> = entities.iter().cloned().collect();
        if entity_set.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self
            .catalog
            .concepts_targeting(&entity_set)
            .await
            .map_err(|e| match e {
                ResolutionError::UpstreamUnavailable(_) => e,
                other => ResolutionError::UpstreamUnavailable(other.to_string()),
            })?;
        debug!("{} candidate concepts for {:?}", candidates.len(), entity_set);

        let mut matches = Vec::new();
        for concept in candidates {
            if !concept.targets_any(&entity_set) {
                continue;
            }
            let similarity = self.strategy.similarity(query, &concept.match_text()).await?;
            if similarity >= self.threshold {
                matches.push(ConceptMatch {
                    concept,
                    similarity,
                });
            } else {
                debug!(
                    "Concept '{}' below threshold ({:.3} < {:.3})",
                    concept.name, similarity, self.threshold
                );
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.concept.name.cmp(&b.concept.name))
        });
        Ok(matches)
    }

    /// Rank a concept's examples by similarity of their query text, keeping
    /// declaration order on ties.
    pub async fn find_similar_examples(
        &self,
        concept: &Concept,
        query: &str,
        max_examples: usize,
    ) -> Result<Vec<(ConceptExample, f64)>> {
        let mut scored = Vec::with_capacity(concept.examples.len());
        for example in &concept.examples {
            let similarity = self.strategy.similarity(query, &example.query).await?;
            scored.push((example.clone(), similarity));
        }
        // Stable sort keeps declaration order for equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(max_examples);
        Ok(scored)
    }

    /// Match concepts and assemble the full business context
    pub async fn match_concepts(&self, query: &str, entities: &[String]) -> Result<BusinessContext> {
        let matches = self.find_matches(query, entities).await?;

        let join_validation = matches
            .iter()
            .map(|m| self.join_validator.validate(entities, &m.concept))
            .collect::<Vec<_>>();

        for result in join_validation.iter().filter(|r| !r.valid) {
            warn!(
                "Concept '{}' has {} unsatisfied joins (missing: {:?})",
                result.concept_name,
                result.unsatisfied.len(),
                result.missing_entities
            );
        }

        let business_instructions = matches
            .iter()
            .filter(|m| !m.concept.instructions.trim().is_empty())
            .map(|m| BusinessInstruction {
                concept: m.concept.name.clone(),
                instructions: m.concept.instructions.clone(),
                similarity: m.similarity,
            })
            .collect();

        let mut relevant_examples = Vec::new();
        for m in &matches {
            for (example, similarity) in self
                .find_similar_examples(&m.concept, query, DEFAULT_MAX_EXAMPLES)
                .await?
            {
                relevant_examples.push(RelevantExample {
                    concept: m.concept.name.clone(),
                    example,
                    similarity,
                });
            }
        }

        let lowered: BTreeSet<String> = entities.iter().map(|e| e.to_lowercase()).collect();
        let covered_entities = entities
            .iter()
            .filter(|e| {
                matches.iter().any(|m| {
                    m.concept
                        .target_entities
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(e))
                })
            })
            .cloned()
            .collect();

        info!(
            concepts = matches.len(),
            entities = lowered.len(),
            "Matched business concepts"
        );

        Ok(BusinessContext {
            query: query.to_string(),
            matches,
            join_validation,
            business_instructions,
            relevant_examples,
            entity_coverage: EntityCoverage {
                total_entities: lowered.len(),
                covered_entities,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::catalog::InMemoryConceptCatalog;
    use async_trait::async_trait;

    struct FixedOracle(f64);

    #[async_trait]
    impl TextSimilarityOracle for FixedOracle {
        async fn similarity(&self, _left: &str, _right: &str) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct DownOracle;

    #[async_trait]
    impl TextSimilarityOracle for DownOracle {
        async fn similarity(&self, _left: &str, _right: &str) -> Result<f64> {
            Err(ResolutionError::UpstreamUnavailable("embeddings offline".to_string()))
        }
    }

    fn catalog() -> Arc<dyn ConceptCatalog> {
        Arc::new(InMemoryConceptCatalog::from_concepts(vec![
            Concept::new("customer_orders", "total orders per customer")
                .with_targets(["customers", "orders"])
                .with_join("customers.id = orders.customer_id")
                .with_instructions("Group by customer and calculate totals")
                .with_example("orders per customer", Some("SELECT 1"))
                .with_example("total customer orders", None)
                .with_example("revenue by month", None)
                .with_example("customer order totals", None),
            Concept::new("order_volume", "total orders per customer")
                .with_targets(["orders"]),
            Concept::new("staffing", "employees per branch").with_targets(["employees"]),
        ]))
    }

    fn entities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_matches_sorted_by_similarity_then_name() {
        let matcher = ConceptMatcher::new(
            catalog(),
            SimilarityStrategy::Oracle {
                oracle: Arc::new(FixedOracle(0.8)),
                lexical_fallback: false,
            },
            0.5,
        );
        let matches = matcher
            .find_matches("total orders per customer", &entities(&["orders"]))
            .await
            .unwrap();
        let names: Vec<&str> = matches.iter().map(|m| m.concept.name.as_str()).collect();
        assert_eq!(names, vec!["customer_orders", "order_volume"]);
    }

    #[test]
    fn test_threshold_is_clamped_to_unit_interval() {
        let high = ConceptMatcher::new(catalog(), SimilarityStrategy::Lexical, 1.5);
        assert_eq!(high.threshold(), 1.0);
        let low = ConceptMatcher::new(catalog(), SimilarityStrategy::Lexical, -0.2);
        assert_eq!(low.threshold(), 0.0);
    }

    #[tokio::test]
    async fn test_threshold_filters_matches() {
        let matcher = ConceptMatcher::new(
            catalog(),
            SimilarityStrategy::Oracle {
                oracle: Arc::new(FixedOracle(0.49)),
                lexical_fallback: false,
            },
            0.5,
        );
        let matches = matcher
            .find_matches("anything", &entities(&["orders", "employees"]))
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_oracle_scores_are_clamped() {
        let matcher = ConceptMatcher::new(
            catalog(),
            SimilarityStrategy::Oracle {
                oracle: Arc::new(FixedOracle(3.5)),
                lexical_fallback: false,
            },
            0.5,
        );
        let matches = matcher
            .find_matches("q", &entities(&["employees"]))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].similarity, 1.0);
    }

    #[tokio::test]
    async fn test_oracle_failure_without_fallback_is_upstream_error() {
        let matcher = ConceptMatcher::new(
            catalog(),
            SimilarityStrategy::Oracle {
                oracle: Arc::new(DownOracle),
                lexical_fallback: false,
            },
            0.5,
        );
        let err = matcher
            .find_matches("q", &entities(&["orders"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back_to_lexical() {
        let matcher = ConceptMatcher::new(
            catalog(),
            SimilarityStrategy::Oracle {
                oracle: Arc::new(DownOracle),
                lexical_fallback: true,
            },
            0.5,
        );
        let matches = matcher
            .find_matches("total orders per customer", &entities(&["orders"]))
            .await
            .unwrap();
        assert!(!matches.is_empty());
        assert!(matches.iter().all(|m| (0.0..=1.0).contains(&m.similarity)));
    }

    #[tokio::test]
    async fn test_match_concepts_builds_business_context() {
        let matcher = ConceptMatcher::new(catalog(), SimilarityStrategy::Lexical, 0.5);
        let context = matcher
            .match_concepts("total orders per customer", &entities(&["customers"]))
            .await
            .unwrap();

        assert_eq!(context.concept_names(), vec!["customer_orders"]);
        assert_eq!(context.join_validation.len(), 1);
        assert!(!context.join_validation[0].valid);
        assert!(context.join_validation[0].missing_entities.contains("orders"));
        assert_eq!(context.business_instructions.len(), 1);
        assert_eq!(context.relevant_examples.len(), DEFAULT_MAX_EXAMPLES);
        assert_eq!(context.entity_coverage.total_entities, 1);
        assert!(context.entity_coverage.covered_entities.contains("customers"));
    }

    #[tokio::test]
    async fn test_find_similar_examples_ranks_by_query() {
        let matcher = ConceptMatcher::new(catalog(), SimilarityStrategy::Lexical, 0.5);
        let concept = Concept::new("c", "d")
            .with_example("revenue by month", None)
            .with_example("orders per customer", None);
        let ranked = matcher
            .find_similar_examples(&concept, "orders per customer", 1)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.query, "orders per customer");
    }

    #[tokio::test]
    async fn test_no_entities_no_matches() {
        let matcher = ConceptMatcher::new(catalog(), SimilarityStrategy::Lexical, 0.5);
        let context = matcher.match_concepts("orders", &[]).await.unwrap();
        assert!(context.is_empty());
    }
}
