//! Schema Entity Retriever
//!
//! Asks the semantic entity index for candidates and ranks them with the
//! relevance scorer.

use crate::error::{ResolutionError, Result};
use crate::oracle::SemanticSearchOracle;
use crate::schema_rag::relevance::{RankedEntities, RelevanceScorer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidates requested from the index per entity finally returned
const CANDIDATE_OVERSAMPLING: usize = 2;

pub struct EntityRetriever {
    oracle: Arc<dyn SemanticSearchOracle>,
    scorer: RelevanceScorer,
    default_max_entities: usize,
}

impl EntityRetriever {
    pub fn new(
        oracle: Arc<dyn SemanticSearchOracle>,
        scorer: RelevanceScorer,
        default_max_entities: usize,
    ) -> Self {
        Self {
            oracle,
            scorer,
            default_max_entities: default_max_entities.max(1),
        }
    }

    /// Retrieve and rank the schema entities relevant to a query
    pub async fn resolve_entities(
        &self,
        query: &str,
        max_entities: Option<usize>,
    ) -> Result<RankedEntities> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::InvalidInput("Query cannot be empty".to_string()));
        }

        let max_entities = max_entities.unwrap_or(self.default_max_entities).max(1);
        let limit = max_entities.saturating_mul(CANDIDATE_OVERSAMPLING);

        let candidates = self.oracle.search(query, limit).await.map_err(|e| {
            warn!("Semantic search failed for '{}': {}", query, e);
            match e {
                ResolutionError::UpstreamUnavailable(_) => e,
                other => ResolutionError::UpstreamUnavailable(other.to_string()),
            }
        })?;
        debug!("Semantic index returned {} candidates", candidates.len());

        let ranked = self.scorer.rank(query, &candidates, Some(max_entities));
        info!(
            entities = ranked.entities.len(),
            confidence = ranked.confidence,
            floor_relaxed = ranked.floor_relaxed,
            "Resolved entities"
        );
        Ok(ranked)
    }
}
