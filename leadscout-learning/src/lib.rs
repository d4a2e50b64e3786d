//! Durable store of prior LLM verdicts and auto-derived patterns
//! (spec §4.4 Learning Store).

mod schema;
mod store;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::{LearningStore, DEFAULT_LEARNED_THRESHOLD};
