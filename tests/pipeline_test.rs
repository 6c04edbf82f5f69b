mod common;

use common::*;
use query_resolution::concepts::{ConceptCatalog, EntityContext};
use query_resolution::oracle::SemanticSearchOracle;
use query_resolution::sql_extract::extract_sql;
use query_resolution::validation::{AspectKind, AspectStatus};
use query_resolution::{QueryResolver, ResolverConfig, ResolverDeps};
use std::sync::Arc;

#[tokio::test]
async fn test_full_pipeline_over_sample_schema() {
    let resolver = resolver_with(
        ResolverConfig::default(),
        Checks {
            executor: Some(Arc::new(StubExecutor)),
            ..Checks::passing()
        },
    );

    let ranked = resolver
        .resolve_entities("user login info", None)
        .await
        .into_result()
        .unwrap();
    assert_eq!(ranked.entities[0].name, "users");
    assert!(ranked.entities[0].score.fused >= 0.65);
    assert!(ranked
        .entities
        .iter()
        .all(|e| (0.0..=1.0).contains(&e.score.fused)));

    let entities = vec!["customers".to_string(), "orders".to_string()];
    let business = resolver
        .match_concepts("total orders per customer", &entities)
        .await
        .into_result()
        .unwrap();
    assert_eq!(business.concept_names(), vec!["customer_orders"]);
    assert!(business.join_validation[0].valid);

    let generated = format!("Here is the query:\n```sql\n{}\n```", JOINED_SQL);
    let sql = extract_sql(&generated).unwrap();
    let bundle = resolver
        .validate_sql(&sql, &business, &EntityContext::new(entities))
        .await;

    assert!(bundle.overall_valid, "{:?}", bundle.blocking_issues());
    assert_eq!(bundle.aspects.len(), 5);
    let execution = bundle.aspect(AspectKind::Execution).unwrap();
    assert_eq!(execution.status, AspectStatus::Valid);
    let report = execution.execution.as_ref().unwrap();
    assert_eq!(report.row_count, 3);
    assert_eq!(report.numeric_summary["order_count"].max, 6.0);
}

#[tokio::test]
async fn test_upstream_failure_is_structured() {
    let search: Arc<dyn SemanticSearchOracle> = Arc::new(DownSearch);
    let checks = Checks::passing();
    let resolver = QueryResolver::new(
        ResolverConfig::default(),
        ResolverDeps {
            search,
            catalog: sample_catalog(),
            similarity: query_resolution::concepts::SimilarityStrategy::Lexical,
            syntax: checks.syntax,
            security: checks.security,
            performance: checks.performance,
            executor: None,
        },
    )
    .unwrap();

    let response = resolver.resolve_entities("user login info", Some(3)).await;
    assert!(!response.success);
    assert!(response.data.is_none());
    assert_eq!(response.error.unwrap().kind, "upstream_unavailable");
}

#[tokio::test]
async fn test_unreachable_catalog_fails_concept_matching() {
    let resolver = resolver_with_catalog(
        ResolverConfig::default(),
        Checks::passing(),
        Arc::new(DownCatalog),
    );

    let response = resolver
        .match_concepts("total orders per customer", &["orders".to_string()])
        .await;
    assert!(!response.success);
    assert!(response.data.is_none());
    assert_eq!(response.error.unwrap().kind, "upstream_unavailable");
}

#[tokio::test]
async fn test_scope_warnings_follow_the_current_entities() {
    let resolver = resolver_with(ResolverConfig::default(), Checks::passing());
    let partial = vec!["customers".to_string()];
    let full = vec!["customers".to_string(), "orders".to_string()];

    let narrow = resolver
        .match_concepts("total orders per customer", &partial)
        .await
        .into_result()
        .unwrap();
    let first = resolver
        .validate_sql(JOINED_SQL, &narrow, &EntityContext::new(partial))
        .await;
    let warnings = &first.aspect(AspectKind::BusinessCompliance).unwrap().warnings;
    assert!(warnings.iter().any(|w| w.contains("not in scope")));

    let wide = resolver
        .match_concepts("total orders per customer", &full)
        .await
        .into_result()
        .unwrap();
    let second = resolver
        .validate_sql(JOINED_SQL, &wide, &EntityContext::new(full))
        .await;
    assert!(!second.cached);
    let warnings = &second.aspect(AspectKind::BusinessCompliance).unwrap().warnings;
    assert!(warnings.iter().all(|w| !w.contains("not in scope")));
}

#[tokio::test]
async fn test_resolver_keeps_its_configuration() {
    let config = ResolverConfig {
        cache_capacity: 7,
        ..ResolverConfig::default()
    };
    let resolver = resolver_with(config.clone(), Checks::passing());
    assert_eq!(resolver.config().cache_capacity, 7);
    assert_eq!(resolver.config().worker_pool_size, config.worker_pool_size);
    assert_eq!(resolver.cache().capacity(), 7);
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let resolver = resolver_with(ResolverConfig::default(), Checks::passing());

    let response = resolver.resolve_entities("   ", None).await;
    assert!(!response.success);
    assert_eq!(response.error.unwrap().kind, "invalid_input");

    let response = resolver.match_concepts("", &["orders".to_string()]).await;
    assert_eq!(response.error.unwrap().kind, "invalid_input");
}

#[tokio::test]
async fn test_missing_join_entity_reported_and_blocks_compliance() {
    let resolver = resolver_with(ResolverConfig::default(), Checks::passing());
    let entities = vec!["customers".to_string()];

    let business = resolver
        .match_concepts("total orders per customer", &entities)
        .await
        .into_result()
        .unwrap();
    let joins = &business.join_validation[0];
    assert!(!joins.valid);
    assert_eq!(joins.missing_entities.iter().collect::<Vec<_>>(), vec!["orders"]);

    let bundle = resolver
        .validate_sql(
            "SELECT id, COUNT(*) FROM customers GROUP BY id",
            &business,
            &EntityContext::new(entities),
        )
        .await;
    let compliance = bundle.aspect(AspectKind::BusinessCompliance).unwrap();
    assert_eq!(compliance.status, AspectStatus::Invalid);
    assert!(!compliance.warnings.is_empty());
    assert!(!bundle.overall_valid);
}

#[tokio::test]
async fn test_resolver_uses_yaml_catalog_from_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("sales.yaml"),
        r#"
concepts:
  - name: customer_orders
    description: total orders per customer
    target: [customers, orders]
    instructions: Group by customer
    required_joins:
      - customers.id = orders.customer_id
"#,
    )
    .unwrap();

    let config = ResolverConfig {
        concepts_dir: Some(dir.path().to_path_buf()),
        ..ResolverConfig::default()
    };
    let catalog = QueryResolver::catalog_from_config(&config).unwrap();
    let all = catalog.all_concepts().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "customer_orders");
}
