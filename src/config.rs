//! Resolver Configuration
//!
//! Recognised options (environment variables, optionally loaded from `.env`):
//! - `SIMILARITY_THRESHOLD` (default 0.5)
//! - `RELEVANCE_WEIGHTS` (default `0.5,0.3,0.2`, must sum to 1.0)
//! - `RELEVANCE_FLOOR` (default 0.2)
//! - `CACHE_CAPACITY` (default 50)
//! - `MAX_ENTITIES` (default 5)
//! - `VALIDATION_TIMEOUT_SECONDS` (default 30)
//! - `MAX_EXECUTION_ROWS` (default 100)
//! - `WORKER_POOL_SIZE` (default 4)
//! - `CONCEPTS_DIR` (optional YAML concept catalog directory)

use crate::error::{ResolutionError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Weights used to fuse the three relevance signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceWeights {
    pub semantic: f64,
    pub purpose: f64,
    pub name: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            purpose: 0.3,
            name: 0.2,
        }
    }
}

impl RelevanceWeights {
    pub fn new(semantic: f64, purpose: f64, name: f64) -> Result<Self> {
        let weights = Self {
            semantic,
            purpose,
            name,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<()> {
        let all = [self.semantic, self.purpose, self.name];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ResolutionError::Config(format!(
                "relevance weights must be finite and non-negative, got {:?}",
                all
            )));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ResolutionError::Config(format!(
                "relevance weights must sum to 1.0, got {:.6}",
                sum
            )));
        }
        Ok(())
    }

    /// Parse `"0.5,0.3,0.2"` or `"0.5/0.3/0.2"`
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw
            .split(|c: char| c == ',' || c == '/')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 3 {
            return Err(ResolutionError::Config(format!(
                "RELEVANCE_WEIGHTS expects three values, got '{}'",
                raw
            )));
        }
        let mut values = [0.0_f64; 3];
        for (slot, part) in values.iter_mut().zip(parts.iter()) {
            *slot = part.parse::<f64>().map_err(|e| {
                ResolutionError::Config(format!("invalid relevance weight '{}': {}", part, e))
            })?;
        }
        Self::new(values[0], values[1], values[2])
    }
}

/// Configuration shared by every pipeline component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Minimum concept similarity for a match (default: 0.5)
    pub similarity_threshold: f64,
    pub relevance_weights: RelevanceWeights,
    /// Entities with a fused score below this are dropped (default: 0.2)
    pub relevance_floor: f64,
    /// Maximum number of cached validation bundles (default: 50)
    pub cache_capacity: usize,
    /// Default number of ranked entities returned (default: 5)
    pub max_entities: usize,
    /// Shared budget for all validation aspects of one request (default: 30s)
    pub validation_timeout: Duration,
    /// Row cap for the trial execution aspect (default: 100)
    pub max_execution_rows: usize,
    /// Concurrent aspect workers per request (default: 4)
    pub worker_pool_size: usize,
    pub concepts_dir: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            relevance_weights: RelevanceWeights::default(),
            relevance_floor: 0.2,
            cache_capacity: 50,
            max_entities: 5,
            validation_timeout: Duration::from_secs(30),
            max_execution_rows: 100,
            worker_pool_size: 4,
            concepts_dir: None,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from the process environment (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup; unset keys keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let similarity_threshold =
            parse_var(&lookup, "SIMILARITY_THRESHOLD")?.unwrap_or(defaults.similarity_threshold);
        let relevance_weights = match lookup("RELEVANCE_WEIGHTS") {
            Some(raw) => RelevanceWeights::parse(&raw)?,
            None => defaults.relevance_weights,
        };
        let relevance_floor =
            parse_var(&lookup, "RELEVANCE_FLOOR")?.unwrap_or(defaults.relevance_floor);
        let cache_capacity = parse_var(&lookup, "CACHE_CAPACITY")?.unwrap_or(defaults.cache_capacity);
        let max_entities = parse_var(&lookup, "MAX_ENTITIES")?.unwrap_or(defaults.max_entities);
        let validation_timeout = parse_var::<u64, _>(&lookup, "VALIDATION_TIMEOUT_SECONDS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.validation_timeout);
        let max_execution_rows =
            parse_var(&lookup, "MAX_EXECUTION_ROWS")?.unwrap_or(defaults.max_execution_rows);
        let worker_pool_size =
            parse_var(&lookup, "WORKER_POOL_SIZE")?.unwrap_or(defaults.worker_pool_size);
        let concepts_dir = lookup("CONCEPTS_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let config = Self {
            similarity_threshold,
            relevance_weights,
            relevance_floor,
            cache_capacity,
            max_entities,
            validation_timeout,
            max_execution_rows,
            worker_pool_size,
            concepts_dir,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.relevance_weights.validate()?;
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ResolutionError::Config(format!(
                "SIMILARITY_THRESHOLD must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.relevance_floor) {
            return Err(ResolutionError::Config(format!(
                "RELEVANCE_FLOOR must be within [0, 1], got {}",
                self.relevance_floor
            )));
        }
        if self.max_entities == 0 {
            return Err(ResolutionError::Config("MAX_ENTITIES must be at least 1".to_string()));
        }
        if self.worker_pool_size == 0 {
            return Err(ResolutionError::Config(
                "WORKER_POOL_SIZE must be at least 1".to_string(),
            ));
        }
        if self.validation_timeout.is_zero() {
            return Err(ResolutionError::Config(
                "VALIDATION_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ResolutionError::Config(format!("invalid {} '{}': {}", key, raw, e))),
    }
}
