//! Shared domain types, configuration, and error types for LeadScout.
//!
//! This crate has no I/O and no async runtime dependency: every other
//! crate in the workspace depends on it, never the reverse.

pub mod classification;
pub mod config;
pub mod dictionary_entry;
pub mod error;
pub mod ethnicity;
pub mod job;
pub mod lead;
pub mod llm_record;
pub mod method;
pub mod name;
pub mod pattern;
pub mod phonetic;

pub use classification::Classification;
pub use config::{Config, LlmProvider};
pub use dictionary_entry::{DictionaryEntry, TokenRole, COMPOUND_PARTICLE_SEQUENCES, PARTICLES};
pub use error::{Error, Result};
pub use ethnicity::Ethnicity;
pub use job::{Batch, BatchStatus, InputFingerprint, Job, JobStatus, ResumeState};
pub use lead::{ErrorKind, Lead, LeadResult, ProcessingStatus};
pub use llm_record::LLMRecord;
pub use method::Method;
pub use pattern::{LearnedPattern, PatternType};
pub use phonetic::{agreement, family_key, PhoneticCode, PhoneticFamily};
