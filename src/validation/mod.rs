//! SQL candidate validation: aspects, cache and orchestration

pub mod aspect;
pub mod business;
pub mod cache;
pub mod orchestrator;
pub mod validator;

pub use aspect::{
    AspectKind, AspectStatus, ColumnStats, ExecutionReport, ValidationAspect, ValidationBundle,
};
pub use business::{BusinessComplianceValidator, ComplianceReport};
pub use cache::{cache_key, normalize_sql, CacheKey, CacheStats, KeyLease, ValidationCache};
pub use orchestrator::ValidationOrchestrator;
pub use validator::Validator;
