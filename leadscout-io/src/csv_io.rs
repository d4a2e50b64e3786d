//! CSV `LeadSource`/`LeadSink` adapters. Simpler than the xlsx adapters
//! since CSV supports true append, so the sink never has to rewrite the
//! whole file on each batch.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::{ReaderBuilder, WriterBuilder};
use serde_json::Value;

use leadscout_batch::{LeadSink, LeadSource};
use leadscout_core::error::{Error, Result};
use leadscout_core::{Lead, LeadResult};

const DIRECTOR_NAME_HEADER: &str = "director_name";

/// Reads an entire CSV file into memory up front, the same bounded-read
/// tradeoff as `XlsxLeadSource`.
pub struct CsvLeadSource {
    rows: Vec<Lead>,
    cursor: usize,
}

impl CsvLeadSource {
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
impl LeadSource for CsvLeadSource {
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

/// Appends committed rows to a CSV file, writing the header on first
/// use. Column order is fixed at construction from the first batch's
/// field names, so every later batch must carry the same field set —
/// true for any single run of the Batch Runner, which reads from one
/// source.
pub struct CsvLeadSink {
    path: PathBuf,
    field_names: Option<Vec<String>>,
}

impl CsvLeadSink {
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), field_names: None }
    }

    fn ensure_header(&mut self, results: &[LeadResult]) -> Result<Vec<String>> {
        if let Some(names) = &self.field_names {
            return Ok(names.clone());
        }
        let mut field_names: Vec<String> = Vec::new();
        for row in results {
            for key in row.lead_fields.keys() {
                if !field_names.contains(key) {
                    field_names.push(key.clone());
                }
            }
        }
        field_names.sort();

        let mut header = vec!["row_index".to_string()];
        header.extend(field_names.iter().cloned());
        header.extend(
            ["ethnicity", "confidence", "method", "processing_ms", "provider", "cost", "processing_status", "error_kind", "error_message"]
                .iter()
                .map(|s| s.to_string()),
        );

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::storage(format!("cannot create {}: {e}", self.path.display())))?;
        let mut writer = WriterBuilder::new().from_writer(file);
        writer.write_record(&header).map_err(csv_err)?;
        writer.flush().map_err(csv_err)?;

        self.field_names = Some(field_names.clone());
        Ok(field_names)
    }
}

#[async_trait]
impl LeadSink for CsvLeadSink {
    async fn write_batch(&mut self, results: &[LeadResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let field_names = self.ensure_header(results)?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::storage(format!("cannot open {}: {e}", self.path.display())))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        // A batch commits in `row_index` order (spec §5, §8); sort
        // defensively rather than trust the caller, matching
        // `XlsxLeadSink`.
        let mut results = results.to_vec();
        results.sort_by_key(|r| r.row_index);

        for result in &results {
            let mut record = vec![result.row_index.to_string()];
            for name in &field_names {
                record.push(result.lead_fields.get(name).map(value_to_cell).unwrap_or_default());
            }
            if let Some(c) = &result.classification {
                record.push(c.ethnicity.as_str().to_string());
                record.push(c.confidence.to_string());
                record.push(c.method.as_str().to_string());
                record.push(c.processing_ms.to_string());
                record.push(c.provider.clone().unwrap_or_default());
                record.push(c.cost.map(|v| v.to_string()).unwrap_or_default());
            } else {
                record.extend(std::iter::repeat(String::new()).take(6));
            }
            record.push(processing_status_str(result.processing_status).to_string());
            record.push(result.error_kind.map(|k| k.as_str().to_string()).unwrap_or_default());
            record.push(result.error_message.clone().unwrap_or_default());

            writer.write_record(&record).map_err(csv_err)?;
        }
        writer.flush().map_err(csv_err)?;
        Ok(())
    }
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn processing_status_str(status: leadscout_core::ProcessingStatus) -> &'static str {
    match status {
        leadscout_core::ProcessingStatus::Success => "success",
        leadscout_core::ProcessingStatus::Failed => "failed",
        leadscout_core::ProcessingStatus::Skipped => "skipped",
    }
}

fn csv_err(e: impl std::fmt::Display) -> Error {
    Error::storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_core::{Classification, Ethnicity, Method};

    fn write_sample(path: &Path) {
        std::fs::write(path, "director_name,company_name\nBongani Nkosi,Acme Co\nAndreas van der Merwe,Beta Ltd\n").unwrap();
    }

    #[tokio::test]
    async fn reads_director_name_and_passthrough_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        write_sample(&path);

        let mut source = CsvLeadSource::open(&path).unwrap();
        assert_eq!(source.total_rows(), 2);

        let first = source.next_lead().await.unwrap().unwrap();
        assert_eq!(first.row_index, 1);
        assert_eq!(first.director_name, "Bongani Nkosi");
        assert_eq!(first.fields.get("company_name").unwrap(), "Acme Co");

        assert!(source.next_lead().await.unwrap().is_some());
        assert!(source.next_lead().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_director_name_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        std::fs::write(&path, "full_name,company_name\nBongani Nkosi,Acme Co\n").unwrap();
        assert!(CsvLeadSource::open(&path).is_err());
    }

    #[tokio::test]
    async fn sink_appends_across_multiple_batches() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.csv");
        let mut sink = CsvLeadSink::create(&out_path);

        let classification = Classification::new("Bongani", "bongani", Ethnicity::African, 0.9, Method::RuleBased, 3).unwrap();
        let mut fields = HashMap::new();
        fields.insert("company_name".to_string(), Value::String("Acme Co".to_string()));
        let first_batch = vec![LeadResult::success(1, fields.clone(), classification.clone(), 1)];
        sink.write_batch(&first_batch).await.unwrap();

        let second_batch = vec![LeadResult::success(2, fields, classification, 1)];
        sink.write_batch(&second_batch).await.unwrap();

        let content = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("african"));
    }
}
