pub mod relevance;
pub mod retriever;

pub use relevance::{name_match, RankedEntities, RankedEntity, RelevanceScore, RelevanceScorer, RelevanceTier};
pub use retriever::EntityRetriever;
