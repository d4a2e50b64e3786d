//! LLM cascade layer: last resort, always returns `Some` (either a real
//! classification or the terminal `llm_unavailable` outcome, spec §4.6).

use std::sync::Arc;

use async_trait::async_trait;
use leadscout_core::{phonetic::PhoneticCode, Classification};
use leadscout_learning::LearningStore;
use leadscout_llm::LLMRouter;
use tracing::error;

use crate::layer::ClassifierLayer;

/// Bounded number of prior verified exemplars injected into each LLM
/// request (spec §4.5: "a small number of retrieved exemplars").
const MAX_EXEMPLARS: usize = 5;

pub struct LlmLayer {
    router: Arc<LLMRouter>,
    learning: Arc<LearningStore>,
}

impl LlmLayer {
    pub fn new(router: Arc<LLMRouter>, learning: Arc<LearningStore>) -> Self {
        Self { router, learning }
    }
}

#[async_trait]
impl ClassifierLayer for LlmLayer {
    async fn try_classify(&self, original_name: &str, normalized_name: &str, _codes: &PhoneticCode) -> Option<Classification> {
        let exemplars = self.learning.exemplars(MAX_EXEMPLARS);
        match self.router.classify(original_name, normalized_name, &exemplars).await {
            Ok(classification) => Some(classification),
            Err(e) => {
                error!(error = %e, "LLM layer produced an internal error, falling through with no classification");
                None
            }
        }
    }

    fn layer_name(&self) -> &'static str {
        "llm"
    }
}
