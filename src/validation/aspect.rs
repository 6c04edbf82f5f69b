//! Validation aspects and the aggregated bundle

use crate::oracle::ExecutionOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sample rows kept in an execution report
pub const MAX_SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AspectKind {
    Syntax,
    Security,
    Performance,
    BusinessCompliance,
    Execution,
}

impl AspectKind {
    pub const ALL: [AspectKind; 5] = [
        AspectKind::Syntax,
        AspectKind::Security,
        AspectKind::Performance,
        AspectKind::BusinessCompliance,
        AspectKind::Execution,
    ];

    /// Whether a non-valid status on this aspect blocks the bundle
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            AspectKind::Syntax | AspectKind::Security | AspectKind::BusinessCompliance
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectKind::Syntax => "syntax",
            AspectKind::Security => "security",
            AspectKind::Performance => "performance",
            AspectKind::BusinessCompliance => "business_compliance",
            AspectKind::Execution => "execution",
        }
    }
}

impl fmt::Display for AspectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectStatus {
    Valid,
    Invalid,
    Timeout,
    Error,
}

/// Numeric summary of one result column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Summary of a bounded trial execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub row_count: usize,
    /// The row cap was reached, so more rows may exist
    pub truncated: bool,
    pub columns: Vec<String>,
    pub sample_rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub numeric_summary: BTreeMap<String, ColumnStats>,
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn from_outcome(outcome: ExecutionOutcome, max_rows: usize) -> Self {
        let mut columns = outcome.columns;
        if columns.is_empty() {
            if let Some(first) = outcome.sample_rows.first() {
                columns = first.keys().cloned().collect();
            }
        }

        let mut numeric_summary = BTreeMap::new();
        for column in &columns {
            let values: Vec<f64> = outcome
                .sample_rows
                .iter()
                .filter_map(|row| row.get(column))
                .filter_map(|v| v.as_f64())
                .collect();
            if values.is_empty() {
                continue;
            }
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            numeric_summary.insert(column.clone(), ColumnStats { min, max, avg });
        }

        let mut sample_rows = outcome.sample_rows;
        sample_rows.truncate(MAX_SAMPLE_ROWS);

        Self {
            success: outcome.success,
            row_count: outcome.row_count,
            truncated: outcome.success && max_rows > 0 && outcome.row_count >= max_rows,
            columns,
            sample_rows,
            numeric_summary,
            error: outcome.error,
        }
    }
}

/// Verdict of one validation axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAspect {
    pub kind: AspectKind,
    pub status: AspectStatus,
    pub detail: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
}

impl ValidationAspect {
    fn with_status(kind: AspectKind, status: AspectStatus, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            detail: detail.into(),
            issues: Vec::new(),
            warnings: Vec::new(),
            elapsed_ms: 0,
            execution: None,
        }
    }

    pub fn valid(kind: AspectKind) -> Self {
        Self::with_status(kind, AspectStatus::Valid, format!("{} checks passed", kind))
    }

    pub fn invalid(kind: AspectKind, issues: Vec<String>) -> Self {
        let detail = format!("{} check found {} issue(s)", kind, issues.len());
        Self {
            issues,
            ..Self::with_status(kind, AspectStatus::Invalid, detail)
        }
    }

    /// `Valid` when there are no issues, `Invalid` otherwise
    pub fn from_issues(kind: AspectKind, issues: Vec<String>, warnings: Vec<String>) -> Self {
        let aspect = if issues.is_empty() {
            Self::valid(kind)
        } else {
            Self::invalid(kind, issues)
        };
        Self { warnings, ..aspect }
    }

    pub fn error(kind: AspectKind, message: impl Into<String>) -> Self {
        Self::with_status(kind, AspectStatus::Error, message)
    }

    pub fn timeout(kind: AspectKind, budget_ms: u64) -> Self {
        Self::with_status(
            kind,
            AspectStatus::Timeout,
            format!("{} validation exceeded the {}ms budget", kind, budget_ms),
        )
    }

    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.status == AspectStatus::Valid
    }
}

/// Aggregated result of all aspects for one SQL candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationBundle {
    pub sql: String,
    pub aspects: Vec<ValidationAspect>,
    pub overall_valid: bool,
    pub cached: bool,
    pub cache_key: String,
    pub business_context_digest: String,
    pub entity_context_digest: String,
    pub request_id: String,
    pub validated_at: DateTime<Utc>,
}

impl ValidationBundle {
    /// Syntax, Security and BusinessCompliance must all be present and Valid.
    /// Performance and Execution are advisory.
    pub fn aggregate(aspects: &[ValidationAspect]) -> bool {
        AspectKind::ALL
            .iter()
            .filter(|kind| kind.is_blocking())
            .all(|kind| {
                aspects
                    .iter()
                    .any(|a| a.kind == *kind && a.status == AspectStatus::Valid)
            })
    }

    pub fn aspect(&self, kind: AspectKind) -> Option<&ValidationAspect> {
        self.aspects.iter().find(|a| a.kind == kind)
    }

    pub fn status(&self, kind: AspectKind) -> Option<AspectStatus> {
        self.aspect(kind).map(|a| a.status)
    }

    /// Every blocking issue, prefixed with its aspect
    pub fn blocking_issues(&self) -> Vec<String> {
        self.aspects
            .iter()
            .filter(|a| a.kind.is_blocking())
            .flat_map(|a| a.issues.iter().map(move |i| format!("{}: {}", a.kind, i)))
            .collect()
    }
}
