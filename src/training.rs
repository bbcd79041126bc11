pub mod matching;
pub mod trainer;

pub use matching::{
    CategoryMatcher, FALLBACK_CATEGORY, GreedyKeywordMatcher, match_clusters_to_categories,
    top_words, top_words_by_group,
};
pub use trainer::{EMBED_CHUNK_SIZE, LabeledSummary, Trainer};
