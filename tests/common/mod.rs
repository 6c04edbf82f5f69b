//! In-memory doubles for the external collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use query_resolution::concepts::{
    Concept, ConceptCatalog, InMemoryConceptCatalog, SimilarityStrategy,
};
use query_resolution::error::{ResolutionError, Result};
use query_resolution::oracle::{
    CheckOutcome, EntityCandidate, ExecutionOutcome, QueryExecutor, SemanticSearchOracle, SqlCheck,
};
use query_resolution::{QueryResolver, ResolverConfig, ResolverDeps};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct StaticSearch(pub Vec<EntityCandidate>);

#[async_trait]
impl SemanticSearchOracle for StaticSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<EntityCandidate>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}

pub struct DownSearch;

#[async_trait]
impl SemanticSearchOracle for DownSearch {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<EntityCandidate>> {
        Err(ResolutionError::UpstreamUnavailable("vector index offline".to_string()))
    }
}

pub struct DownCatalog;

#[async_trait]
impl ConceptCatalog for DownCatalog {
    async fn concepts_targeting(&self, _entities: &BTreeSet<String>) -> Result<Vec<Concept>> {
        Err(ResolutionError::Catalog("concept store offline".to_string()))
    }

    async fn concept_by_name(&self, _name: &str) -> Result<Option<Concept>> {
        Err(ResolutionError::Catalog("concept store offline".to_string()))
    }

    async fn all_concepts(&self) -> Result<Vec<Concept>> {
        Err(ResolutionError::Catalog("concept store offline".to_string()))
    }
}

/// Counts calls; optionally sleeps before answering
pub struct CountingCheck {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub outcome: CheckOutcome,
}

impl CountingCheck {
    pub fn passing() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            outcome: CheckOutcome::passed(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlCheck for CountingCheck {
    async fn validate(&self, _sql: &str) -> Result<CheckOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.outcome.clone())
    }
}

pub struct PanickingCheck;

#[async_trait]
impl SqlCheck for PanickingCheck {
    async fn validate(&self, _sql: &str) -> Result<CheckOutcome> {
        panic!("performance analyzer crashed");
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Never returns; records when it starts and when its future is dropped
#[derive(Default)]
pub struct HangingCheck {
    pub started: Arc<AtomicBool>,
    pub dropped: Arc<AtomicBool>,
}

impl HangingCheck {
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlCheck for HangingCheck {
    async fn validate(&self, _sql: &str) -> Result<CheckOutcome> {
        let _flag = DropFlag(Arc::clone(&self.dropped));
        self.started.store(true, Ordering::SeqCst);
        std::future::pending::<Result<CheckOutcome>>().await
    }
}

pub struct StubExecutor;

#[async_trait]
impl QueryExecutor for StubExecutor {
    async fn try_execute(&self, _sql: &str, max_rows: usize, _timeout: Duration) -> Result<ExecutionOutcome> {
        let rows: Vec<_> = (1..=3)
            .filter_map(|i| json!({"customer_id": i, "order_count": i * 2}).as_object().cloned())
            .collect();
        Ok(ExecutionOutcome {
            success: true,
            row_count: rows.len().min(max_rows),
            columns: vec!["customer_id".to_string(), "order_count".to_string()],
            sample_rows: rows,
            error: None,
        })
    }
}

pub fn sample_entities() -> Vec<EntityCandidate> {
    vec![
        EntityCandidate::new("users", 0.90, "user accounts and login data"),
        EntityCandidate::new("orders", 0.40, "order history"),
        EntityCandidate::new("customers", 0.55, "customer master data"),
    ]
}

pub fn sample_catalog() -> Arc<dyn ConceptCatalog> {
    Arc::new(InMemoryConceptCatalog::from_concepts(vec![
        Concept::new("customer_orders", "total orders per customer")
            .with_targets(["customers", "orders"])
            .with_join("customers.id = orders.customer_id")
            .with_instructions("Group by customer and calculate order totals")
            .with_example("orders per customer", None),
    ]))
}

pub const JOINED_SQL: &str = "SELECT c.id, COUNT(o.id) AS order_count \
     FROM customers c JOIN orders o ON c.id = o.customer_id GROUP BY c.id";

/// Validator handles plugged into a test resolver
pub struct Checks {
    pub syntax: Arc<dyn SqlCheck>,
    pub security: Arc<dyn SqlCheck>,
    pub performance: Arc<dyn SqlCheck>,
    pub executor: Option<Arc<dyn QueryExecutor>>,
}

impl Checks {
    pub fn passing() -> Self {
        Self {
            syntax: CountingCheck::passing(),
            security: CountingCheck::passing(),
            performance: CountingCheck::passing(),
            executor: None,
        }
    }
}

pub fn resolver_with(config: ResolverConfig, checks: Checks) -> QueryResolver {
    resolver_with_catalog(config, checks, sample_catalog())
}

pub fn resolver_with_catalog(
    config: ResolverConfig,
    checks: Checks,
    catalog: Arc<dyn ConceptCatalog>,
) -> QueryResolver {
    query_resolution::telemetry::init_tracing();
    let deps = ResolverDeps {
        search: Arc::new(StaticSearch(sample_entities())),
        catalog,
        similarity: SimilarityStrategy::Lexical,
        syntax: checks.syntax,
        security: checks.security,
        performance: checks.performance,
        executor: checks.executor,
    };
    QueryResolver::new(config, deps).expect("valid test configuration")
}

pub fn short_timeout(ms: u64) -> ResolverConfig {
    ResolverConfig {
        validation_timeout: Duration::from_millis(ms),
        ..ResolverConfig::default()
    }
}
