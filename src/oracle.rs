//! External collaborators
//!
//! The pipeline never talks to an embedding backend, a SQL checker or a live
//! database directly. Those are injected as `Arc<dyn ...>` handles implementing
//! the traits below.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One hit from the semantic entity index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    pub name: String,
    /// Raw vector similarity reported by the index (expected 0-1)
    pub similarity: f64,
    pub business_purpose: String,
}

impl EntityCandidate {
    pub fn new(name: impl Into<String>, similarity: f64, business_purpose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            similarity,
            business_purpose: business_purpose.into(),
        }
    }
}

/// Semantic search over documented schema entities
#[async_trait]
pub trait SemanticSearchOracle: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<EntityCandidate>>;
}

/// Text-to-text similarity (typically embedding cosine similarity)
#[async_trait]
pub trait TextSimilarityOracle: Send + Sync {
    /// Returns a similarity in [0, 1]
    async fn similarity(&self, left: &str, right: &str) -> Result<f64>;
}

/// Verdict of an external SQL check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub valid: bool,
    pub issues: Vec<String>,
}

impl CheckOutcome {
    pub fn passed() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn failed(issues: Vec<String>) -> Self {
        Self {
            valid: false,
            issues,
        }
    }
}

/// Syntax, security and performance checkers implement this contract
#[async_trait]
pub trait SqlCheck: Send + Sync {
    async fn validate(&self, sql: &str) -> Result<CheckOutcome>;
}

/// Result of a bounded trial execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub row_count: usize,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub sample_rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub error: Option<String>,
}

/// Live database access used for the trial execution aspect
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn try_execute(&self, sql: &str, max_rows: usize, timeout: Duration) -> Result<ExecutionOutcome>;
}
