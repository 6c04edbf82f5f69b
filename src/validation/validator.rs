//! The closed set of validators run for every SQL candidate

use crate::concepts::context::BusinessContext;
use crate::error::{ResolutionError, Result};
use crate::oracle::{QueryExecutor, SqlCheck};
use crate::validation::aspect::{AspectKind, ExecutionReport, ValidationAspect};
use crate::validation::business::BusinessComplianceValidator;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub enum Validator {
    Syntax(Arc<dyn SqlCheck>),
    Security(Arc<dyn SqlCheck>),
    Performance(Arc<dyn SqlCheck>),
    BusinessCompliance(BusinessComplianceValidator),
    Execution {
        executor: Arc<dyn QueryExecutor>,
        max_rows: usize,
    },
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validator::Execution { max_rows, .. } => {
                write!(f, "Validator::Execution(max_rows={})", max_rows)
            }
            other => write!(f, "Validator::{:?}", other.kind()),
        }
    }
}

impl Validator {
    pub fn kind(&self) -> AspectKind {
        match self {
            Validator::Syntax(_) => AspectKind::Syntax,
            Validator::Security(_) => AspectKind::Security,
            Validator::Performance(_) => AspectKind::Performance,
            Validator::BusinessCompliance(_) => AspectKind::BusinessCompliance,
            Validator::Execution { .. } => AspectKind::Execution,
        }
    }

    /// Run this validator. `budget` is the time left for the request; only
    /// the executor is told about it, the caller enforces it for everyone.
    pub async fn validate(
        &self,
        sql: &str,
        context: &BusinessContext,
        budget: Duration,
    ) -> Result<ValidationAspect> {
        let kind = self.kind();
        match self {
            Validator::Syntax(check) | Validator::Security(check) | Validator::Performance(check) => {
                let outcome = check.validate(sql).await.map_err(|e| {
                    ResolutionError::Validator(format!("{} check failed: {}", kind, e))
                })?;
                if outcome.valid {
                    // Issues reported alongside a passing verdict are advisory
                    Ok(ValidationAspect::from_issues(kind, Vec::new(), outcome.issues))
                } else if outcome.issues.is_empty() {
                    Ok(ValidationAspect::invalid(
                        kind,
                        vec![format!("{} check rejected the query", kind)],
                    ))
                } else {
                    Ok(ValidationAspect::invalid(kind, outcome.issues))
                }
            }
            Validator::BusinessCompliance(validator) => {
                let report = validator.check(sql, context);
                Ok(ValidationAspect::from_issues(kind, report.issues, report.warnings))
            }
            Validator::Execution { executor, max_rows } => {
                let outcome = executor
                    .try_execute(sql, *max_rows, budget)
                    .await
                    .map_err(|e| ResolutionError::Validator(format!("trial execution failed: {}", e)))?;
                let report = ExecutionReport::from_outcome(outcome, *max_rows);
                let mut aspect = if report.success {
                    ValidationAspect::valid(kind)
                } else {
                    ValidationAspect::invalid(
                        kind,
                        vec![report
                            .error
                            .clone()
                            .unwrap_or_else(|| "execution failed".to_string())],
                    )
                };
                if report.truncated {
                    aspect
                        .warnings
                        .push(format!("result truncated at {} rows", max_rows));
                }
                aspect.detail = format!("{} rows returned", report.row_count);
                aspect.execution = Some(report);
                Ok(aspect)
            }
        }
    }
}
