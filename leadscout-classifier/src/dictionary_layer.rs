//! Rule-based cascade layer wrapping the curated dictionary (spec §4.2).

use async_trait::async_trait;
use leadscout_core::{phonetic::PhoneticCode, Classification};
use leadscout_dictionary::DictionaryStore;

use crate::layer::ClassifierLayer;

pub struct DictionaryLayer {
    store: DictionaryStore,
}

impl DictionaryLayer {
    pub fn new(store: DictionaryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ClassifierLayer for DictionaryLayer {
    async fn try_classify(&self, original_name: &str, normalized_name: &str, _codes: &PhoneticCode) -> Option<Classification> {
        self.store.classify_name(normalized_name, original_name)
    }

    fn layer_name(&self) -> &'static str {
        "dictionary"
    }
}
