//! Business Compliance Validation
//!
//! Checks a SQL candidate against the concepts matched for its query:
//! required joins must appear as equality predicates, and instruction
//! keywords (time, calculate/sum, group) must be reflected in the SQL.

use crate::concepts::context::BusinessContext;
use crate::concepts::model::{JoinRequirement, RequiredJoin};
use crate::text::tokenize;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::{
    BinaryOperator, Expr, Join, JoinConstraint, JoinOperator, Query, SetExpr, Statement,
    TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;
use tracing::debug;

lazy_static! {
    static ref DATE_REFERENCE_RE: Regex =
        Regex::new(r"(?i)date|time|year|month|day").expect("static date pattern");
    static ref AGGREGATE_RE: Regex =
        Regex::new(r"(?i)\b(sum|count|avg|max|min)\s*\(").expect("static aggregate pattern");
    static ref GROUP_BY_RE: Regex = Regex::new(r"(?i)\bgroup\s+by\b").expect("static group by pattern");
    static ref SELECT_STAR_RE: Regex = Regex::new(r"(?i)\bselect\s+\*").expect("static select pattern");
}

const SENSITIVE_COLUMNS: &[&str] = &[
    "password",
    "ssn",
    "credit_card",
    "social_security",
    "phone",
    "email",
    "address",
    "birth_date",
];

/// Outcome of a business compliance check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceReport {
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ComplianceReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Column reference `qualifier.column`, lowercased, qualifier alias-resolved
type ColumnRef = (String, String);

/// Equality predicates found in a SQL statement
#[derive(Debug, Default)]
struct JoinPredicates {
    /// lowercased alias or table name -> lowercased table name
    aliases: HashMap<String, String>,
    equalities: Vec<(ColumnRef, ColumnRef)>,
}

impl JoinPredicates {
    fn from_sql(sql: &str) -> Option<Self> {
        let statements = match Parser::parse_sql(&GenericDialect {}, sql) {
            Ok(statements) => statements,
            Err(e) => {
                debug!("SQL parse failed, falling back to text matching: {}", e);
                return None;
            }
        };
        let mut predicates = Self::default();
        for statement in &statements {
            if let Statement::Query(query) = statement {
                predicates.visit_query(query);
            }
        }
        Some(predicates)
    }

    fn visit_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.visit_query(&cte.query);
            }
        }
        self.visit_set_expr(&query.body);
    }

    fn visit_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for table in &select.from {
                    self.visit_table_with_joins(table);
                }
                if let Some(selection) = &select.selection {
                    self.collect_equalities(selection);
                }
            }
            SetExpr::Query(query) => self.visit_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.visit_set_expr(left);
                self.visit_set_expr(right);
            }
            _ => {}
        }
    }

    fn visit_table_with_joins(&mut self, table: &TableWithJoins) {
        self.visit_table_factor(&table.relation);
        for join in &table.joins {
            self.visit_join(join);
        }
    }

    fn visit_join(&mut self, join: &Join) {
        self.visit_table_factor(&join.relation);
        let constraint = match &join.join_operator {
            JoinOperator::Inner(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c)
            | JoinOperator::LeftSemi(c)
            | JoinOperator::RightSemi(c)
            | JoinOperator::LeftAnti(c)
            | JoinOperator::RightAnti(c) => c,
            _ => return,
        };
        if let JoinConstraint::On(expr) = constraint {
            self.collect_equalities(expr);
        }
    }

    fn visit_table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let Some(table) = name.0.last().map(|ident| ident.value.to_lowercase()) else {
                    return;
                };
                if let Some(alias) = alias {
                    self.aliases
                        .insert(alias.name.value.to_lowercase(), table.clone());
                }
                self.aliases.entry(table.clone()).or_insert(table);
            }
            TableFactor::Derived { subquery, .. } => self.visit_query(subquery),
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.visit_table_with_joins(table_with_joins),
            _ => {}
        }
    }

    fn collect_equalities(&mut self, expr: &Expr) {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            }
            | Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => {
                self.collect_equalities(left);
                self.collect_equalities(right);
            }
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            } => {
                if let (Some(l), Some(r)) = (column_ref(left), column_ref(right)) {
                    self.equalities.push((l, r));
                }
            }
            Expr::Nested(inner) => self.collect_equalities(inner),
            _ => {}
        }
    }

    fn resolve(&self, qualifier: &str) -> String {
        self.aliases
            .get(qualifier)
            .cloned()
            .unwrap_or_else(|| qualifier.to_string())
    }

    fn contains(&self, join: &JoinRequirement) -> bool {
        let wanted_left = (join.left_entity.to_lowercase(), join.left_column.to_lowercase());
        let wanted_right = (join.right_entity.to_lowercase(), join.right_column.to_lowercase());
        self.equalities.iter().any(|(l, r)| {
            let l = (self.resolve(&l.0), l.1.clone());
            let r = (self.resolve(&r.0), r.1.clone());
            (l == wanted_left && r == wanted_right) || (l == wanted_right && r == wanted_left)
        })
    }
}

fn column_ref(expr: &Expr) -> Option<ColumnRef> {
    match expr {
        Expr::CompoundIdentifier(idents) if idents.len() >= 2 => {
            let column = &idents[idents.len() - 1];
            let qualifier = &idents[idents.len() - 2];
            Some((qualifier.value.to_lowercase(), column.value.to_lowercase()))
        }
        Expr::Nested(inner) => column_ref(inner),
        _ => None,
    }
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Text fallback: the join appears verbatim (whitespace-insensitive) in either orientation
fn join_in_text(sql: &str, join: &JoinRequirement) -> bool {
    let sql = squash(sql);
    let forward = squash(&format!(
        "{}.{}={}.{}",
        join.left_entity, join.left_column, join.right_entity, join.right_column
    ));
    let backward = squash(&format!(
        "{}.{}={}.{}",
        join.right_entity, join.right_column, join.left_entity, join.left_column
    ));
    sql.contains(&forward) || sql.contains(&backward)
}

#[derive(Debug, Clone, Default)]
pub struct BusinessComplianceValidator;

impl BusinessComplianceValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, sql: &str, context: &BusinessContext) -> ComplianceReport {
        let mut report = ComplianceReport::default();
        let predicates = JoinPredicates::from_sql(sql);

        for matched in &context.matches {
            let concept = &matched.concept;

            let mut missing = Vec::new();
            for required in &concept.required_joins {
                match required {
                    RequiredJoin::Parsed { raw, join } => {
                        let present = match &predicates {
                            Some(p) => p.contains(join),
                            None => join_in_text(sql, join),
                        };
                        if !present {
                            missing.push(raw.clone());
                        }
                    }
                    RequiredJoin::Malformed(err) => report
                        .issues
                        .push(format!("Concept '{}': {}", concept.name, err)),
                }
            }
            if !missing.is_empty() {
                report.issues.push(format!(
                    "Concept '{}': missing required joins: {}",
                    concept.name,
                    missing.join(", ")
                ));
            }

            if let Some(issue) = instruction_issue(sql, &concept.instructions) {
                report
                    .issues
                    .push(format!("Concept '{}': {}", concept.name, issue));
            }
        }

        for result in context.join_validation.iter().filter(|r| !r.valid) {
            let missing: Vec<&str> = result.missing_entities.iter().map(String::as_str).collect();
            report.warnings.push(if missing.is_empty() {
                format!(
                    "Concept '{}' has joins that cannot be validated",
                    result.concept_name
                )
            } else {
                format!(
                    "Concept '{}' needs entities not in scope: {}",
                    result.concept_name,
                    missing.join(", ")
                )
            });
        }

        report.warnings.extend(privacy_warnings(sql));
        report
    }
}

/// First instruction heuristic the SQL violates, if any
fn instruction_issue(sql: &str, instructions: &str) -> Option<&'static str> {
    let tokens = tokenize(instructions);
    let mentions = |prefixes: &[&str]| {
        tokens
            .iter()
            .any(|t| prefixes.iter().any(|p| t.starts_with(p)))
    };

    if mentions(&["time", "date"]) && !DATE_REFERENCE_RE.is_match(sql) {
        return Some("time-based analysis required but no date/time reference found");
    }
    if mentions(&["calculat", "sum"]) && !AGGREGATE_RE.is_match(sql) {
        return Some("aggregation required but no aggregate function found");
    }
    if mentions(&["group"]) && !GROUP_BY_RE.is_match(sql) {
        return Some("grouping required but no GROUP BY clause found");
    }
    None
}

fn privacy_warnings(sql: &str) -> Vec<String> {
    let lower = sql.to_lowercase();
    let mut warnings: Vec<String> = SENSITIVE_COLUMNS
        .iter()
        .filter(|column| lower.contains(*column))
        .map(|column| format!("Query may expose sensitive data: {}", column))
        .collect();
    if SELECT_STAR_RE.is_match(sql) {
        warnings.push("SELECT * may expose unnecessary sensitive data".to_string());
    }
    warnings
}
