//! Validation Orchestrator
//!
//! Runs every validator for a SQL candidate concurrently on a bounded worker
//! pool, under a single shared deadline, and caches the aggregated bundle.
//!
//! Per request: `Received -> Cached` on a cache hit, otherwise
//! `Received -> Dispatched -> Aggregated -> Cached`. Failed aspects are never
//! retried within a request.

use crate::concepts::context::{BusinessContext, EntityContext};
use crate::error::{ResolutionError, Result};
use crate::validation::aspect::{AspectKind, ValidationAspect, ValidationBundle};
use crate::validation::cache::{cache_key, ValidationCache};
use crate::validation::validator::Validator;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type AspectTask = JoinHandle<Result<ValidationAspect>>;

/// Spawned aspect tasks; aborted if the request is dropped before they finish
struct AspectTasks(Vec<(AspectKind, AspectTask)>);

impl Drop for AspectTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

pub struct ValidationOrchestrator {
    validators: Vec<Validator>,
    cache: Arc<ValidationCache>,
    timeout: Duration,
    worker_pool_size: usize,
    dispatched: AtomicU64,
}

impl ValidationOrchestrator {
    pub fn new(
        validators: Vec<Validator>,
        cache: Arc<ValidationCache>,
        timeout: Duration,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            validators,
            cache,
            timeout,
            worker_pool_size: worker_pool_size.max(1),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    /// Number of validator invocations dispatched so far
    pub fn dispatch_count(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Validate a SQL candidate against its business and entity context.
    ///
    /// Always returns a bundle. Dropping the returned future cancels the
    /// in-flight validators and releases the per-key lock.
    pub async fn validate_sql(
        &self,
        sql: &str,
        business: &BusinessContext,
        entities: &EntityContext,
    ) -> ValidationBundle {
        let business_digest = business.digest();
        let entity_digest = entities.digest();
        let key = cache_key(sql, &business_digest);

        let _lease = self.cache.lock(&key).await;

        match self.cache.get(&key) {
            Ok(Some(mut bundle)) => {
                info!(cache_key = %key, "Validation cache hit");
                bundle.cached = true;
                return bundle;
            }
            Ok(None) => debug!(cache_key = %key, "Validation cache miss"),
            Err(e) => warn!("{}; validating without cache", e),
        }

        let aspects = self.dispatch(sql, business).await;
        let overall_valid = ValidationBundle::aggregate(&aspects);

        let bundle = ValidationBundle {
            sql: sql.to_string(),
            aspects,
            overall_valid,
            cached: false,
            cache_key: key.to_string(),
            business_context_digest: business_digest,
            entity_context_digest: entity_digest,
            request_id: Uuid::new_v4().to_string(),
            validated_at: Utc::now(),
        };

        match self.cache.insert(key, bundle.clone()) {
            Ok(evicted) if !evicted.is_empty() => {
                debug!("Evicted {} validation bundles", evicted.len())
            }
            Ok(_) => {}
            Err(e) => warn!("Could not cache validation bundle: {}", e),
        }

        info!(
            request_id = %bundle.request_id,
            overall_valid = bundle.overall_valid,
            "SQL validation complete"
        );
        bundle
    }

    async fn dispatch(&self, sql: &str, business: &BusinessContext) -> Vec<ValidationAspect> {
        let deadline = Instant::now() + self.timeout;
        let budget_ms = self.timeout.as_millis() as u64;
        let workers = Arc::new(Semaphore::new(self.worker_pool_size));
        let sql: Arc<str> = Arc::from(sql);
        let context = Arc::new(business.clone());

        let mut tasks = AspectTasks(Vec::with_capacity(self.validators.len()));
        for validator in &self.validators {
            let kind = validator.kind();
            let validator = validator.clone();
            let workers = Arc::clone(&workers);
            let sql = Arc::clone(&sql);
            let context = Arc::clone(&context);

            self.dispatched.fetch_add(1, Ordering::SeqCst);
            let handle = tokio::spawn(async move {
                let _permit = workers
                    .acquire_owned()
                    .await
                    .map_err(|e| ResolutionError::Validator(format!("worker pool closed: {}", e)))?;
                let started = Instant::now();
                let budget = deadline.saturating_duration_since(started);
                let aspect = validator.validate(&sql, &context, budget).await?;
                Ok::<_, ResolutionError>(aspect.with_elapsed(started.elapsed().as_millis() as u64))
            });
            tasks.0.push((kind, handle));
        }

        let mut aspects = Vec::with_capacity(tasks.0.len());
        for (kind, handle) in tasks.0.iter_mut() {
            let kind = *kind;
            let aspect = match tokio::time::timeout_at(deadline, &mut *handle).await {
                Ok(Ok(Ok(aspect))) => aspect,
                Ok(Ok(Err(ResolutionError::ValidatorTimeout(ms)))) => {
                    warn!("{} validator reported a timeout", kind);
                    ValidationAspect::timeout(kind, ms).with_elapsed(ms)
                }
                Ok(Ok(Err(e))) => {
                    warn!("{} validator failed: {}", kind, e);
                    ValidationAspect::error(kind, e.to_string())
                }
                Ok(Err(join_error)) => aspect_from_join_error(kind, join_error),
                Err(_) => {
                    handle.abort();
                    warn!("{} validator exceeded {}ms", kind, budget_ms);
                    ValidationAspect::timeout(kind, budget_ms).with_elapsed(budget_ms)
                }
            };
            aspects.push(aspect);
        }
        aspects
    }
}

fn aspect_from_join_error(kind: AspectKind, join_error: JoinError) -> ValidationAspect {
    if join_error.is_panic() {
        error!("{} validator panicked", kind);
        ValidationAspect::error(kind, format!("{} validator panicked", kind))
    } else {
        ValidationAspect::error(kind, format!("{} validator was cancelled", kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{CheckOutcome, SqlCheck};
    use crate::validation::aspect::AspectStatus;
    use crate::validation::business::BusinessComplianceValidator;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct Pass;

    #[async_trait]
    impl SqlCheck for Pass {
        async fn validate(&self, _sql: &str) -> Result<CheckOutcome> {
            Ok(CheckOutcome::passed())
        }
    }

    /// Tracks the largest number of concurrent calls
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SqlCheck for Gauge {
        async fn validate(&self, _sql: &str) -> Result<CheckOutcome> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(CheckOutcome::passed())
        }
    }

    fn orchestrator(validators: Vec<Validator>, workers: usize) -> ValidationOrchestrator {
        ValidationOrchestrator::new(
            validators,
            Arc::new(ValidationCache::new(50)),
            Duration::from_secs(5),
            workers,
        )
    }

    fn standard() -> Vec<Validator> {
        vec![
            Validator::Syntax(Arc::new(Pass)),
            Validator::Security(Arc::new(Pass)),
            Validator::Performance(Arc::new(Pass)),
            Validator::BusinessCompliance(BusinessComplianceValidator::new()),
        ]
    }

    #[tokio::test]
    async fn test_bundle_is_cached() {
        let orchestrator = orchestrator(standard(), 4);
        let business = BusinessContext::default();
        let entities = EntityContext::new(["orders"]);

        let first = orchestrator
            .validate_sql("SELECT id FROM orders", &business, &entities)
            .await;
        assert!(first.overall_valid);
        assert!(!first.cached);
        assert_eq!(first.aspects.len(), 4);
        assert_eq!(orchestrator.dispatch_count(), 4);

        let second = orchestrator
            .validate_sql("  SELECT id\n FROM orders ", &business, &entities)
            .await;
        assert!(second.cached);
        assert_eq!(second.request_id, first.request_id);
        assert_eq!(orchestrator.dispatch_count(), 4);
    }

    #[tokio::test]
    async fn test_poisoned_cache_degrades_to_always_miss() {
        let orchestrator = orchestrator(standard(), 4);
        orchestrator.cache().poison_state();
        let business = BusinessContext::default();
        let entities = EntityContext::new(["orders"]);

        let first = orchestrator
            .validate_sql("SELECT id FROM orders", &business, &entities)
            .await;
        let second = orchestrator
            .validate_sql("SELECT id FROM orders", &business, &entities)
            .await;

        assert!(first.overall_valid);
        assert_eq!(first.aspects.len(), 4);
        assert!(!first.cached);
        assert!(!second.cached);
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(orchestrator.dispatch_count(), 8);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let validators = vec![
            Validator::Syntax(gauge.clone()),
            Validator::Security(gauge.clone()),
            Validator::Performance(gauge.clone()),
        ];
        let bundle = orchestrator(validators, 2)
            .validate_sql("SELECT 1", &BusinessContext::default(), &EntityContext::default())
            .await;

        assert_eq!(bundle.aspects.len(), 3);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_aspects_keep_validator_order() {
        let bundle = orchestrator(standard(), 1)
            .validate_sql("SELECT 1", &BusinessContext::default(), &EntityContext::default())
            .await;
        let kinds: Vec<AspectKind> = bundle.aspects.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AspectKind::Syntax,
                AspectKind::Security,
                AspectKind::Performance,
                AspectKind::BusinessCompliance
            ]
        );
        assert!(bundle.aspects.iter().all(|a| a.status == AspectStatus::Valid));
    }

    #[tokio::test]
    async fn test_different_business_context_is_a_new_key() {
        let orchestrator = orchestrator(standard(), 4);
        let entities = EntityContext::default();
        let plain = BusinessContext::default();
        let other = BusinessContext {
            matches: vec![crate::concepts::context::ConceptMatch {
                concept: crate::concepts::model::Concept::new("c", "d"),
                similarity: 0.9,
            }],
            ..Default::default()
        };

        let a = orchestrator.validate_sql("SELECT 1", &plain, &entities).await;
        let b = orchestrator.validate_sql("SELECT 1", &other, &entities).await;
        assert!(!b.cached);
        assert_ne!(a.cache_key, b.cache_key);
        assert_eq!(orchestrator.dispatch_count(), 8);
    }
}
