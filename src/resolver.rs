//! Query Resolver
//!
//! Entry point tying the three pipeline stages together:
//! entity resolution, concept matching and SQL validation.
//! Every stage returns a structured response; errors never escape as `Err`.

use crate::concepts::{
    BusinessContext, ConceptCatalog, ConceptMatcher, EntityContext, InMemoryConceptCatalog,
    SimilarityStrategy,
};
use crate::config::ResolverConfig;
use crate::error::{ResolutionError, Result, StageResponse};
use crate::oracle::{QueryExecutor, SemanticSearchOracle, SqlCheck};
use crate::schema_rag::{EntityRetriever, RankedEntities, RelevanceScorer};
use crate::validation::{
    BusinessComplianceValidator, ValidationBundle, ValidationCache, ValidationOrchestrator,
    Validator,
};
use std::sync::Arc;
use tracing::{info, warn};

/// External collaborators injected into the resolver
pub struct ResolverDeps {
    pub search: Arc<dyn SemanticSearchOracle>,
    pub catalog: Arc<dyn ConceptCatalog>,
    pub similarity: SimilarityStrategy,
    pub syntax: Arc<dyn SqlCheck>,
    pub security: Arc<dyn SqlCheck>,
    pub performance: Arc<dyn SqlCheck>,
    /// Without an executor the Execution aspect is not run
    pub executor: Option<Arc<dyn QueryExecutor>>,
}

pub struct QueryResolver {
    config: ResolverConfig,
    retriever: EntityRetriever,
    matcher: ConceptMatcher,
    orchestrator: ValidationOrchestrator,
}

impl QueryResolver {
    pub fn new(config: ResolverConfig, deps: ResolverDeps) -> Result<Self> {
        config.validate()?;

        let scorer = RelevanceScorer::new(config.relevance_weights, config.relevance_floor);
        let retriever = EntityRetriever::new(deps.search, scorer, config.max_entities);
        let matcher = ConceptMatcher::new(deps.catalog, deps.similarity, config.similarity_threshold);

        let mut validators = vec![
            Validator::Syntax(deps.syntax),
            Validator::Security(deps.security),
            Validator::Performance(deps.performance),
            Validator::BusinessCompliance(BusinessComplianceValidator::new()),
        ];
        if let Some(executor) = deps.executor {
            validators.push(Validator::Execution {
                executor,
                max_rows: config.max_execution_rows,
            });
        }
        let orchestrator = ValidationOrchestrator::new(
            validators,
            Arc::new(ValidationCache::new(config.cache_capacity)),
            config.validation_timeout,
            config.worker_pool_size,
        );

        info!(
            cache_capacity = config.cache_capacity,
            workers = config.worker_pool_size,
            "Query resolver ready"
        );
        Ok(Self {
            config,
            retriever,
            matcher,
            orchestrator,
        })
    }

    /// Load the concept catalog named by `CONCEPTS_DIR`, or an empty one
    pub fn catalog_from_config(config: &ResolverConfig) -> Result<Arc<dyn ConceptCatalog>> {
        let catalog = match &config.concepts_dir {
            Some(dir) => InMemoryConceptCatalog::load_dir(dir)?,
            None => {
                warn!("CONCEPTS_DIR not set; concept matching will find nothing");
                InMemoryConceptCatalog::new()
            }
        };
        Ok(Arc::new(catalog))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        self.orchestrator.cache()
    }

    pub fn dispatch_count(&self) -> u64 {
        self.orchestrator.dispatch_count()
    }

    pub async fn resolve_entities(
        &self,
        query: &str,
        max_entities: Option<usize>,
    ) -> StageResponse<RankedEntities> {
        let result = self.retriever.resolve_entities(query, max_entities).await;
        if let Err(e) = &result {
            warn!("Entity resolution failed: {}", e);
        }
        StageResponse::from_result(result)
    }

    pub async fn match_concepts(&self, query: &str, entities: &[String]) -> StageResponse<BusinessContext> {
        let result = if query.trim().is_empty() {
            Err(ResolutionError::InvalidInput("Query cannot be empty".to_string()))
        } else {
            self.matcher.match_concepts(query.trim(), entities).await
        };
        if let Err(e) = &result {
            warn!("Concept matching failed: {}", e);
        }
        StageResponse::from_result(result)
    }

    /// Always yields a bundle; aspect failures are recorded in it
    pub async fn validate_sql(
        &self,
        sql: &str,
        business: &BusinessContext,
        entities: &EntityContext,
    ) -> ValidationBundle {
        self.orchestrator.validate_sql(sql, business, entities).await
    }
}
