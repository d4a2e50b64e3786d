//! Fixed-sequence name-ethnicity classification cascade: Rule (curated
//! dictionary) -> Phonetic (family matching) -> Learning (cache and
//! learned patterns) -> LLM (spec §4 Classifier Pipeline, §4.3 Phonetic
//! Matcher, §4.9 Pattern Extractor).

mod dictionary_layer;
mod layer;
mod learning_layer;
mod llm_layer;
mod pattern_extractor;
mod phonetic_matcher;
mod pipeline;

pub use dictionary_layer::DictionaryLayer;
pub use layer::ClassifierLayer;
pub use learning_layer::LearningLayer;
pub use llm_layer::LlmLayer;
pub use pattern_extractor::PatternExtractor;
pub use phonetic_matcher::PhoneticMatcher;
pub use pipeline::ClassifierPipeline;
