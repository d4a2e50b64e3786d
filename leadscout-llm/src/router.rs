//! Provider failover and the LLM layer's entry point for the classifier
//! cascade (spec §4.5, §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use leadscout_core::{Classification, Error, Method, Result};
use tracing::{debug, warn};

use crate::client::LLMClient;
use crate::rate_limit::{CircuitBreaker, ProviderRateLimiter, RetryConfig};
use crate::types::{Exemplars, LLMError};

struct ProviderSlot {
    client: Arc<dyn LLMClient>,
    limiter: ProviderRateLimiter,
    breaker: CircuitBreaker,
}

/// Routes a classification request across providers in priority order,
/// applying rate limiting, retry-with-backoff, and circuit breaking per
/// provider. When every provider is unavailable it returns the terminal
/// `llm_unavailable` outcome rather than erroring the caller (spec §6:
/// "the pipeline must make forward progress even when the LLM layer is
/// entirely down").
pub struct LLMRouter {
    slots: Vec<ProviderSlot>,
    retry: RetryConfig,
    breaker_threshold: u32,
    breaker_cooldown: std::time::Duration,
}

impl LLMRouter {
    pub fn new(
        clients: Vec<Arc<dyn LLMClient>>,
        per_provider_rpm: &HashMap<String, u32>,
        per_provider_max_concurrent: &HashMap<String, usize>,
        retry: RetryConfig,
        breaker_threshold: u32,
        breaker_cooldown: std::time::Duration,
    ) -> Self {
        let slots = clients
            .into_iter()
            .map(|client| {
                let rpm = per_provider_rpm.get(client.provider_name()).copied().unwrap_or(60);
                let max_concurrent = per_provider_max_concurrent.get(client.provider_name()).copied().unwrap_or(5);
                ProviderSlot {
                    client,
                    limiter: ProviderRateLimiter::new(rpm, max_concurrent),
                    breaker: CircuitBreaker::new(breaker_threshold, breaker_cooldown),
                }
            })
            .collect();
        Self { slots, retry, breaker_threshold, breaker_cooldown }
    }

    /// Classifies `normalized_name`, trying each configured provider in
    /// order. Within a provider, retriable errors are retried with
    /// backoff up to `retry.max_attempts`; terminal errors and exhausted
    /// retries fail over to the next provider.
    pub async fn classify(
        &self,
        original_name: &str,
        normalized_name: &str,
        context: &Exemplars,
    ) -> Result<Classification> {
        for slot in &self.slots {
            if !slot.breaker.allow_call().await {
                debug!(provider = slot.client.provider_name(), "circuit open, skipping provider");
                continue;
            }

            let mut attempt = 0u32;
            loop {
                attempt += 1;
                // Held across the call so `max_concurrent` bounds
                // in-flight requests to this provider, not just how many
                // are admitted per minute.
                let _permit = slot.limiter.acquire().await;

                match slot.client.classify(normalized_name, context).await {
                    Ok(result) => {
                        slot.breaker.record_success().await;
                        let cost = slot.client.cost_per_call(result.input_tokens, result.output_tokens);
                        let classification = Classification::new(
                            original_name.to_string(),
                            normalized_name.to_string(),
                            result.ethnicity,
                            result.confidence,
                            Method::Llm,
                            result.latency_ms,
                        )
                        .map_err(|e| Error::internal(e.to_string()))?
                        .with_provider(slot.client.provider_name().to_string())
                        .with_cost(cost);
                        return Ok(classification);
                    }
                    Err(err) => {
                        warn!(
                            provider = slot.client.provider_name(),
                            attempt,
                            error = %err,
                            "LLM call failed"
                        );
                        slot.breaker.record_failure().await;

                        if err.is_terminal() || !self.retry.should_retry(attempt) {
                            break;
                        }
                        tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        Ok(Classification::llm_unavailable(original_name.to_string(), normalized_name.to_string()))
    }

    pub fn provider_count(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    fn breaker_threshold(&self) -> u32 {
        self.breaker_threshold
    }

    #[cfg(test)]
    fn breaker_cooldown(&self) -> std::time::Duration {
        self.breaker_cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LLMCallResult;
    use async_trait::async_trait;
    use leadscout_core::Ethnicity;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedClient {
        name: &'static str,
        calls: AtomicU32,
        fail_times: u32,
        terminal: bool,
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn classify(&self, _normalized_name: &str, _context: &Exemplars) -> std::result::Result<LLMCallResult, LLMError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(if self.terminal {
                    LLMError::Auth(self.name.to_string())
                } else {
                    LLMError::ProviderUnavailable(self.name.to_string())
                });
            }
            Ok(LLMCallResult {
                ethnicity: Ethnicity::African,
                confidence: 0.9,
                latency_ms: 10,
                input_tokens: 100,
                output_tokens: 10,
            })
        }

        fn provider_name(&self) -> &str {
            self.name
        }

        fn cost_per_call(&self, _input_tokens: u64, _output_tokens: u64) -> f64 {
            0.001
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            base: std::time::Duration::from_millis(1),
            factor: 1.0,
            cap: std::time::Duration::from_millis(5),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_without_failover() {
        let client: Arc<dyn LLMClient> =
            Arc::new(ScriptedClient { name: "anthropic", calls: AtomicU32::new(0), fail_times: 2, terminal: false });
        let router = LLMRouter::new(vec![client], &HashMap::new(), &HashMap::new(), fast_retry(), 5, std::time::Duration::from_secs(60));

        let result = router.classify("Bongani Nkosi", "bongani nkosi", &vec![]).await.unwrap();
        assert_eq!(result.method, Method::Llm);
        assert_eq!(result.provider.as_deref(), Some("anthropic"));
    }

    #[tokio::test]
    async fn fails_over_to_next_provider_on_terminal_error() {
        let primary: Arc<dyn LLMClient> =
            Arc::new(ScriptedClient { name: "anthropic", calls: AtomicU32::new(0), fail_times: 100, terminal: true });
        let secondary: Arc<dyn LLMClient> =
            Arc::new(ScriptedClient { name: "openai", calls: AtomicU32::new(0), fail_times: 0, terminal: false });
        let router =
            LLMRouter::new(vec![primary, secondary], &HashMap::new(), &HashMap::new(), fast_retry(), 5, std::time::Duration::from_secs(60));

        let result = router.classify("Bongani Nkosi", "bongani nkosi", &vec![]).await.unwrap();
        assert_eq!(result.provider.as_deref(), Some("openai"));
    }

    #[tokio::test]
    async fn returns_llm_unavailable_when_all_providers_exhausted() {
        let client: Arc<dyn LLMClient> =
            Arc::new(ScriptedClient { name: "anthropic", calls: AtomicU32::new(0), fail_times: 100, terminal: true });
        let router = LLMRouter::new(vec![client], &HashMap::new(), &HashMap::new(), fast_retry(), 5, std::time::Duration::from_secs(60));

        let result = router.classify("Bongani Nkosi", "bongani nkosi", &vec![]).await.unwrap();
        assert_eq!(result.ethnicity, Ethnicity::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, Method::Llm);
    }
}
