//! Classifier Pipeline: fixed cascade Rule -> Phonetic -> Learning -> LLM
//! (spec §4, "Classifier Pipeline").

use std::sync::Arc;
use std::time::Instant;

use leadscout_core::{name::normalize, Classification, Error, Result};
use tracing::{debug, instrument};

use crate::layer::ClassifierLayer;
use crate::pattern_extractor::PatternExtractor;

/// Orchestrates the fixed-sequence cascade. Layers are tried in order;
/// the first to return `Some` wins. The LLM layer (last, if configured)
/// always resolves to `Some` — either a real classification or the
/// terminal `llm_unavailable` outcome — so the cascade never falls off
/// the end when an LLM layer is present.
pub struct ClassifierPipeline {
    layers: Vec<Box<dyn ClassifierLayer>>,
    pattern_extractor: Option<Arc<PatternExtractor>>,
}

impl ClassifierPipeline {
    pub fn new(layers: Vec<Box<dyn ClassifierLayer>>, pattern_extractor: Option<Arc<PatternExtractor>>) -> Self {
        Self { layers, pattern_extractor }
    }

    /// Classifies one name end to end: normalize, compute phonetic
    /// codes, walk the cascade, then (if the winning classification came
    /// from the LLM layer) hand it to the Pattern Extractor.
    #[instrument(skip(self), fields(name = %original_name))]
    pub async fn classify(&self, original_name: &str) -> Result<Classification> {
        let start = Instant::now();
        let normalized_name = normalize(original_name).map_err(|_| Error::invalid_input(original_name.to_string()))?;
        let codes = leadscout_phonetic::codes(&normalized_name);

        for layer in &self.layers {
            if let Some(mut classification) = layer.try_classify(original_name, &normalized_name, &codes).await {
                classification.processing_ms = start.elapsed().as_millis() as u64;
                debug!(layer = layer.layer_name(), method = ?classification.method, "cascade resolved");

                if let Some(extractor) = &self.pattern_extractor {
                    extractor.extract(&classification, &codes);
                }

                return Ok(classification);
            }
        }

        Err(Error::invalid_input(format!("no cascade layer classified '{original_name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use leadscout_core::{phonetic::PhoneticCode, Ethnicity, Method};

    struct AlwaysNone;
    #[async_trait]
    impl ClassifierLayer for AlwaysNone {
        async fn try_classify(&self, _o: &str, _n: &str, _c: &PhoneticCode) -> Option<Classification> {
            None
        }
        fn layer_name(&self) -> &'static str {
            "none"
        }
    }

    struct AlwaysHits;
    #[async_trait]
    impl ClassifierLayer for AlwaysHits {
        async fn try_classify(&self, o: &str, n: &str, _c: &PhoneticCode) -> Option<Classification> {
            Classification::new(o, n, Ethnicity::African, 0.9, Method::RuleBased, 0).ok()
        }
        fn layer_name(&self) -> &'static str {
            "always-hits"
        }
    }

    #[tokio::test]
    async fn falls_through_to_first_layer_that_hits() {
        let pipeline = ClassifierPipeline::new(vec![Box::new(AlwaysNone), Box::new(AlwaysHits)], None);
        let result = pipeline.classify("Bongani Nkosi").await.unwrap();
        assert_eq!(result.ethnicity, Ethnicity::African);
        assert_eq!(result.method, Method::RuleBased);
    }

    #[tokio::test]
    async fn errors_when_no_layer_classifies() {
        let pipeline = ClassifierPipeline::new(vec![Box::new(AlwaysNone)], None);
        assert!(pipeline.classify("Bongani Nkosi").await.is_err());
    }

    #[tokio::test]
    async fn rejects_empty_name_before_any_layer_runs() {
        let pipeline = ClassifierPipeline::new(vec![Box::new(AlwaysHits)], None);
        assert!(pipeline.classify("   ").await.is_err());
    }
}
