//! The capability trait every cascade stage implements (spec §9 redesign
//! flag: a flat `Vec<Box<dyn ClassifierLayer>>` instead of the teacher's
//! generic typed-signature module system).

use async_trait::async_trait;
use leadscout_core::{phonetic::PhoneticCode, Classification};

/// One stage of the classification cascade. `try_classify` returns
/// `Some` to short-circuit the cascade, `None` to fall through to the
/// next layer (spec §4's Rule → Phonetic → Learning → LLM ordering).
#[async_trait]
pub trait ClassifierLayer: Send + Sync {
    async fn try_classify(&self, original_name: &str, normalized_name: &str, codes: &PhoneticCode) -> Option<Classification>;

    /// Name used in `tracing` spans and diagnostics; not the `Method`
    /// provenance tag (several layers, e.g. Dictionary, can emit more
    /// than one `Method`).
    fn layer_name(&self) -> &'static str;
}
