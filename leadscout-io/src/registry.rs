//! Company-registry CSV ingestion: a thin adapter turning a CIPC-style
//! company register export into `Lead` rows. The registry's own
//! business logic (matching companies to existing leads, deduplication,
//! enrichment) is out of scope here — this module only exposes the
//! register as a `LeadSource` so it can be fed through the same
//! classifier cascade as any other input.

use std::collections::HashMap;
use std::path::Path;

use csv::ReaderBuilder;
use serde_json::Value;

use leadscout_batch::LeadSource;
use leadscout_core::error::{Error, Result};
use leadscout_core::Lead;
use async_trait::async_trait;

const DIRECTOR_NAME_HEADER: &str = "director_name";
const REGISTRATION_NUMBER_HEADER: &str = "registration_number";

/// Reads a company-registry export, treating `director_name` as the
/// name to classify and every other column (typically
/// `registration_number`, `company_name`, `registration_date`, `status`)
/// as passthrough fields.
pub struct CompanyRegistrySource {
    rows: Vec<Lead>,
    cursor: usize,
}

impl CompanyRegistrySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| Error::invalid_input(format!("cannot open {}: {e}", path.display())))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::invalid_input(format!("cannot read header row of {}: {e}", path.display())))?
            .iter()
            .map(str::to_string)
            .collect();
        let director_col = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(DIRECTOR_NAME_HEADER))
            .ok_or_else(|| Error::invalid_input(format!("no '{DIRECTOR_NAME_HEADER}' column in {}", path.display())))?;
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(REGISTRATION_NUMBER_HEADER)) {
            return Err(Error::invalid_input(format!("no '{REGISTRATION_NUMBER_HEADER}' column in {}", path.display())));
        }

        let mut rows = Vec::new();
        for (offset, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::invalid_input(format!("malformed row in {}: {e}", path.display())))?;
            let row_index = (offset + 1) as u64;
            let director_name = record.get(director_col).unwrap_or_default().to_string();
            let mut fields = HashMap::new();
            for (col_idx, header) in headers.iter().enumerate() {
                if col_idx == director_col {
                    continue;
                }
                if let Some(value) = record.get(col_idx) {
                    fields.insert(header.clone(), Value::String(value.to_string()));
                }
            }
            rows.push(Lead { row_index, director_name, fields });
        }

        Ok(Self { rows, cursor: 0 })
    }
}

#[async_trait]
impl LeadSource for CompanyRegistrySource {
    fn total_rows(&self) -> u64 {
        self.rows.len() as u64
    }

    async fn seek(&mut self, row_index: u64) -> Result<()> {
        self.cursor = self.rows.iter().position(|l| l.row_index >= row_index).unwrap_or(self.rows.len());
        Ok(())
    }

    async fn next_lead(&mut self) -> Result<Option<Lead>> {
        if self.cursor >= self.rows.len() {
            return Ok(None);
        }
        let lead = self.rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(lead))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_registry_rows_and_keeps_passthrough_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.csv");
        std::fs::write(
            &path,
            "registration_number,company_name,director_name\n2021/123456/07,Acme Co,Bongani Nkosi\n2019/654321/07,Beta Ltd,Andreas van der Merwe\n",
        )
        .unwrap();

        let mut source = CompanyRegistrySource::open(&path).unwrap();
        assert_eq!(source.total_rows(), 2);

        let first = source.next_lead().await.unwrap().unwrap();
        assert_eq!(first.director_name, "Bongani Nkosi");
        assert_eq!(first.fields.get("registration_number").unwrap(), "2021/123456/07");
    }

    #[tokio::test]
    async fn missing_registration_number_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.csv");
        std::fs::write(&path, "company_name,director_name\nAcme Co,Bongani Nkosi\n").unwrap();
        assert!(CompanyRegistrySource::open(&path).is_err());
    }
}
