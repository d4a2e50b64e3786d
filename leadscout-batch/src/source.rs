//! `LeadSource` / `LeadSink`: the narrow traits the Batch Runner consumes
//! from external-interface adapters (spec §6). Defined here, rather than
//! in the adapter crate, so the runner never depends on a spreadsheet or
//! CSV library.

use async_trait::async_trait;
use leadscout_core::{Lead, LeadResult, Result};

/// A read-only, streaming, restartable row source.
///
/// `total_rows` must be known up front so the Job Store can size a job;
/// implementations that read the whole input once to count rows (e.g. a
/// spreadsheet) should do that during construction, not here.
#[async_trait]
pub trait LeadSource: Send {
    /// Total rows in the input, independent of how many have been read.
    fn total_rows(&self) -> u64;

    /// Reposition the stream so the next `next_lead` call returns the
    /// row at `row_index` (1-based). Used to resume mid-file.
    async fn seek(&mut self, row_index: u64) -> Result<()>;

    /// Returns the next row, or `None` once the source is exhausted.
    async fn next_lead(&mut self) -> Result<Option<Lead>>;
}

/// A write-only, commit-per-batch-safe sink for classified rows.
#[async_trait]
pub trait LeadSink: Send {
    /// Persists one batch's worth of results. Must not corrupt
    /// previously written content if called again after a failure.
    async fn write_batch(&mut self, results: &[LeadResult]) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;

    pub struct VecLeadSource {
        rows: VecDeque<Lead>,
        total: u64,
        all_rows: Vec<Lead>,
    }

    impl VecLeadSource {
        pub fn new(rows: Vec<Lead>) -> Self {
            let total = rows.len() as u64;
            Self { all_rows: rows.clone(), rows: rows.into(), total }
        }
    }

    #[async_trait]
    impl LeadSource for VecLeadSource {
        fn total_rows(&self) -> u64 {
            self.total
        }

        async fn seek(&mut self, row_index: u64) -> Result<()> {
            self.rows = self.all_rows.iter().filter(|l| l.row_index >= row_index).cloned().collect();
            Ok(())
        }

        async fn next_lead(&mut self) -> Result<Option<Lead>> {
            Ok(self.rows.pop_front())
        }
    }

    #[derive(Default)]
    pub struct VecLeadSink {
        pub committed: Vec<LeadResult>,
    }

    #[async_trait]
    impl LeadSink for VecLeadSink {
        async fn write_batch(&mut self, results: &[LeadResult]) -> Result<()> {
            self.committed.extend_from_slice(results);
            Ok(())
        }
    }
}
