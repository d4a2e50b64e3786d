//! Learning Store cascade layer: exact cache hits, then active learned
//! patterns (spec §4.4).

use std::sync::Arc;

use async_trait::async_trait;
use leadscout_core::{phonetic::PhoneticCode, Classification};
use leadscout_learning::{LearningStore, DEFAULT_LEARNED_THRESHOLD};

use crate::layer::ClassifierLayer;

pub struct LearningLayer {
    learning: Arc<LearningStore>,
    threshold: f64,
}

impl LearningLayer {
    pub fn new(learning: Arc<LearningStore>) -> Self {
        Self { learning, threshold: DEFAULT_LEARNED_THRESHOLD }
    }

    pub fn with_threshold(learning: Arc<LearningStore>, threshold: f64) -> Self {
        Self { learning, threshold }
    }
}

#[async_trait]
impl ClassifierLayer for LearningLayer {
    async fn try_classify(&self, _original_name: &str, normalized_name: &str, codes: &PhoneticCode) -> Option<Classification> {
        if let Some(hit) = self.learning.lookup_exact(normalized_name) {
            return Some(hit);
        }
        self.learning.lookup_patterns(normalized_name, codes, self.threshold)
    }

    fn layer_name(&self) -> &'static str {
        "learning"
    }
}
