//! Concept Catalog
//!
//! Read-only registry of business concepts, loaded once per process.
//! Concept files are YAML documents with a top-level `concepts:` list:
//!
//! ```yaml
//! concepts:
//!   - name: customer_orders
//!     description: Orders placed by each customer
//!     target: [customers, orders]
//!     instructions: Group by customer and calculate order totals
//!     required_joins:
//!       - customers.id = orders.customer_id
//!     examples:
//!       - query: total orders per customer
//!         sql: SELECT ...
//! ```

use crate::concepts::model::Concept;
use crate::error::{ResolutionError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Source of concepts for the matcher
#[async_trait]
pub trait ConceptCatalog: Send + Sync {
    /// Concepts whose target entities intersect `entities` (case-insensitive), sorted by name
    async fn concepts_targeting(&self, entities: &BTreeSet<String>) -> Result<Vec<Concept>>;

    async fn concept_by_name(&self, name: &str) -> Result<Option<Concept>>;

    async fn all_concepts(&self) -> Result<Vec<Concept>>;
}

#[derive(Debug, Deserialize)]
struct ConceptFile {
    #[serde(default)]
    concepts: Vec<serde_yaml::Value>,
}

const REQUIRED_FIELDS: &[&str] = &["name", "description", "target", "instructions"];

/// In-memory catalog keyed by concept name
#[derive(Debug, Clone, Default)]
pub struct InMemoryConceptCatalog {
    /// Concept name -> Concept
    concepts: BTreeMap<String, Concept>,
    /// Lowercased entity name -> concept names
    entity_index: HashMap<String, BTreeSet<String>>,
    source_dir: Option<PathBuf>,
}

impl InMemoryConceptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_concepts<I>(concepts: I) -> Self
    where
        I: IntoIterator<Item = Concept>,
    {
        let mut catalog = Self::new();
        for concept in concepts {
            catalog.add_concept(concept);
        }
        catalog
    }

    /// Add or replace a concept (names are unique per catalog)
    pub fn add_concept(&mut self, concept: Concept) {
        if let Some(previous) = self.concepts.remove(&concept.name) {
            warn!("Concept '{}' redefined; replacing earlier definition", concept.name);
            self.remove_from_index(&previous);
        }
        for target in &concept.target_entities {
            self.entity_index
                .entry(target.to_lowercase())
                .or_default()
                .insert(concept.name.clone());
        }
        self.concepts.insert(concept.name.clone(), concept);
    }

    fn remove_from_index(&mut self, concept: &Concept) {
        for target in &concept.target_entities {
            let key = target.to_lowercase();
            if let Some(names) = self.entity_index.get_mut(&key) {
                names.remove(&concept.name);
                if names.is_empty() {
                    self.entity_index.remove(&key);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Concept> {
        self.concepts.get(name)
    }

    /// Concepts in name order
    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    pub fn targeting(&self, entities: &BTreeSet<String>) -> Vec<Concept> {
        let names: BTreeSet<&String> = entities
            .iter()
            .filter_map(|e| self.entity_index.get(&e.to_lowercase()))
            .flatten()
            .collect();
        names
            .into_iter()
            .filter_map(|name| self.concepts.get(name))
            .cloned()
            .collect()
    }

    /// Load every `*.yaml` / `*.yml` file under `dir`, recursively.
    ///
    /// A missing directory yields an empty catalog. Invalid concept records are
    /// skipped with a warning; unreadable or unparsable files are errors.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();
        catalog.source_dir = Some(dir.to_path_buf());

        if !dir.exists() {
            warn!("Concepts directory {} does not exist", dir.display());
            return Ok(catalog);
        }

        let mut files = Vec::new();
        collect_yaml_files(dir, &mut files)?;
        files.sort();
        if files.is_empty() {
            warn!("No concept files found in {}", dir.display());
        }

        for path in files {
            let content = std::fs::read_to_string(&path)?;
            let concepts = parse_concepts_yaml(&content).map_err(|e| {
                ResolutionError::Catalog(format!("{}: {}", path.display(), e))
            })?;
            info!("Loaded {} concepts from {}", concepts.len(), path.display());
            for concept in concepts {
                catalog.add_concept(concept);
            }
        }

        Ok(catalog)
    }

    /// Re-read the directory this catalog was loaded from
    pub fn reload(&mut self) -> Result<()> {
        let dir = self.source_dir.clone().ok_or_else(|| {
            ResolutionError::Catalog("catalog was not loaded from a directory".to_string())
        })?;
        *self = Self::load_dir(dir)?;
        info!("Concepts reloaded: {}", self.len());
        Ok(())
    }
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

/// Parse the `concepts:` list of one YAML document
pub fn parse_concepts_yaml(content: &str) -> Result<Vec<Concept>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: ConceptFile = serde_yaml::from_str(content)?;
    let mut concepts = Vec::new();
    for value in file.concepts {
        let label = value
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| value.get(*field).is_none())
            .collect();
        if !missing.is_empty() {
            warn!("Skipping concept '{}': missing fields {:?}", label, missing);
            continue;
        }
        match serde_yaml::from_value::<Concept>(value) {
            Ok(concept) => concepts.push(concept),
            Err(e) => warn!("Skipping invalid concept '{}': {}", label, e),
        }
    }
    Ok(concepts)
}

#[async_trait]
impl ConceptCatalog for InMemoryConceptCatalog {
    async fn concepts_targeting(&self, entities: &BTreeSet<String>) -> Result<Vec<Concept>> {
        Ok(self.targeting(entities))
    }

    async fn concept_by_name(&self, name: &str) -> Result<Option<Concept>> {
        Ok(self.get(name).cloned())
    }

    async fn all_concepts(&self) -> Result<Vec<Concept>> {
        Ok(self.concepts.values().cloned().collect())
    }
}
