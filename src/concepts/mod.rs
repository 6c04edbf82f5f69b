//! Business concepts: catalog, matching and join validation

pub mod catalog;
pub mod context;
pub mod joins;
pub mod matcher;
pub mod model;

pub use catalog::{parse_concepts_yaml, ConceptCatalog, InMemoryConceptCatalog};
pub use context::{
    BusinessContext, BusinessInstruction, ConceptMatch, EntityContext, EntityCoverage,
    RelevantExample,
};
pub use joins::{JoinValidationResult, JoinValidator, UnsatisfiedJoin, UnsatisfiedReason};
pub use matcher::{ConceptMatcher, SimilarityStrategy, DEFAULT_MAX_EXAMPLES};
pub use model::{Concept, ConceptExample, JoinParseError, JoinRequirement, RequiredJoin};
