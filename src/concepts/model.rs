//! Business Concepts - named rule bundles over schema entities

use crate::error::ResolutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An equality constraint `left_entity.left_column = right_entity.right_column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinRequirement {
    pub left_entity: String,
    pub left_column: String,
    pub right_entity: String,
    pub right_column: String,
}

impl JoinRequirement {
    pub fn new(
        left_entity: impl Into<String>,
        left_column: impl Into<String>,
        right_entity: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            left_entity: left_entity.into(),
            left_column: left_column.into(),
            right_entity: right_entity.into(),
            right_column: right_column.into(),
        }
    }

    /// Parse `"entity.col = entity2.col2"`
    pub fn parse(raw: &str) -> Result<Self, JoinParseError> {
        let sides: Vec<&str> = raw.split('=').collect();
        if sides.len() != 2 {
            return Err(JoinParseError::new(
                raw,
                format!("expected exactly one '=', found {}", sides.len().saturating_sub(1)),
            ));
        }
        let (left_entity, left_column) = parse_column_ref(raw, sides[0])?;
        let (right_entity, right_column) = parse_column_ref(raw, sides[1])?;
        Ok(Self {
            left_entity,
            left_column,
            right_entity,
            right_column,
        })
    }

    pub fn entities(&self) -> [&str; 2] {
        [&self.left_entity, &self.right_entity]
    }
}

impl fmt::Display for JoinRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = {}.{}",
            self.left_entity, self.left_column, self.right_entity, self.right_column
        )
    }
}

fn parse_column_ref(raw: &str, side: &str) -> Result<(String, String), JoinParseError> {
    let side = side.trim();
    if side.is_empty() {
        return Err(JoinParseError::new(raw, "empty side of join condition"));
    }
    let parts: Vec<&str> = side.split('.').map(str::trim).collect();
    if parts.len() != 2 {
        return Err(JoinParseError::new(
            raw,
            format!("'{}' is not of the form entity.column", side),
        ));
    }
    let valid_ident = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    };
    if !valid_ident(parts[0]) || !valid_ident(parts[1]) {
        return Err(JoinParseError::new(
            raw,
            format!("'{}' contains an invalid identifier", side),
        ));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Why a join string could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinParseError {
    pub raw: String,
    pub reason: String,
}

impl JoinParseError {
    pub fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for JoinParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed join '{}': {}", self.raw, self.reason)
    }
}

impl From<JoinParseError> for ResolutionError {
    fn from(err: JoinParseError) -> Self {
        ResolutionError::JoinParse(err.to_string())
    }
}

/// A required join as declared on a concept.
///
/// Malformed strings are kept as `Malformed` so they are reported, not dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequiredJoin {
    Parsed { raw: String, join: JoinRequirement },
    Malformed(JoinParseError),
}

impl RequiredJoin {
    pub fn parse(raw: &str) -> Self {
        match JoinRequirement::parse(raw) {
            Ok(join) => RequiredJoin::Parsed {
                raw: raw.trim().to_string(),
                join,
            },
            Err(e) => RequiredJoin::Malformed(e),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            RequiredJoin::Parsed { raw, .. } => raw,
            RequiredJoin::Malformed(e) => &e.raw,
        }
    }

    pub fn requirement(&self) -> Option<&JoinRequirement> {
        match self {
            RequiredJoin::Parsed { join, .. } => Some(join),
            RequiredJoin::Malformed(_) => None,
        }
    }
}

impl From<String> for RequiredJoin {
    fn from(raw: String) -> Self {
        RequiredJoin::parse(&raw)
    }
}

impl From<RequiredJoin> for String {
    fn from(join: RequiredJoin) -> Self {
        join.raw().to_string()
    }
}

/// Worked example attached to a concept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptExample {
    pub query: String,
    #[serde(default)]
    pub sql: Option<String>,
}

/// A business concept definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub description: String,

    /// Entities this concept applies to
    #[serde(rename = "target")]
    pub target_entities: BTreeSet<String>,

    #[serde(default)]
    pub required_joins: Vec<RequiredJoin>,

    /// Guidance handed to the SQL generator and checked by business compliance
    pub instructions: String,

    #[serde(default)]
    pub examples: Vec<ConceptExample>,
}

impl Concept {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            target_entities: BTreeSet::new(),
            required_joins: Vec::new(),
            instructions: String::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_entities.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn with_join(mut self, raw: &str) -> Self {
        self.required_joins.push(RequiredJoin::parse(raw));
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_example(mut self, query: impl Into<String>, sql: Option<&str>) -> Self {
        self.examples.push(ConceptExample {
            query: query.into(),
            sql: sql.map(str::to_string),
        });
        self
    }

    /// Case-insensitive check against an entity set
    pub fn targets_any<'a, I>(&self, entities: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let targets: BTreeSet<String> = self
            .target_entities
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        entities
            .into_iter()
            .any(|e| targets.contains(&e.to_lowercase()))
    }

    /// Description plus example queries; what the matcher compares against
    pub fn match_text(&self) -> String {
        let mut text = self.description.clone();
        for example in &self.examples {
            text.push(' ');
            text.push_str(&example.query);
        }
        text
    }
}
