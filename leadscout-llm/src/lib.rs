//! Provider-agnostic LLM classification adapter: rate limiting, retry
//! backoff, circuit breaking, and failover across configured providers
//! (spec §4.5 LLM Adapter, §4.6 Rate Limiter & Circuit Breaker).

mod client;
mod rate_limit;
mod router;
mod types;

pub use client::{AnthropicClient, ClientConfig, LLMCallResult, LLMClient, NullClient, OpenAiClient};
pub use rate_limit::{CircuitBreaker, ProviderRateLimiter, RetryConfig};
pub use router::LLMRouter;
pub use types::{Exemplars, LLMClassificationOutput, LLMError};
