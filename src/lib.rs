pub mod concepts;
pub mod config;
pub mod error;
pub mod oracle;
pub mod resolver;
pub mod schema_rag;
pub mod sql_extract;
pub mod telemetry;
pub mod text;
pub mod validation;

pub use config::{RelevanceWeights, ResolverConfig};
pub use error::{ErrorInfo, ResolutionError, Result, StageResponse};
pub use resolver::{QueryResolver, ResolverDeps};
