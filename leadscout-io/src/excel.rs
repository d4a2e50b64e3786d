//! Spreadsheet `LeadSource`/`LeadSink` adapters. Intentionally thin: no
//! classification logic, only row <-> `Lead`/`LeadResult` translation.
//!
//! Known limitation: `calamine` parses an entire worksheet into memory
//! up front, so `XlsxLeadSource` does not keep read-side memory bounded
//! independent of row count — only the Batch Runner's per-batch
//! processing is memory bounded. A true streaming xlsx reader
//! (SAX-style over the zipped XML) would be needed to close that gap;
//! see DESIGN.md.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use serde_json::Value;

use leadscout_batch::{LeadSink, LeadSource};
use leadscout_core::error::{Error, Result};
use leadscout_core::{Lead, LeadResult};

const DIRECTOR_NAME_HEADER: &str = "director_name";

/// Reads an xlsx worksheet's first sheet, mapping a `director_name`
/// column (matched case-insensitively) to `Lead::director_name` and
/// every other column to `Lead::fields`.
pub struct XlsxLeadSource {
    rows: Vec<Lead>,
    cursor: usize,
}

impl XlsxLeadSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut workbook: Xlsx<_> =
            open_workbook(path).map_err(|e| Error::invalid_input(format!("cannot open {}: {e}", path.display())))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::invalid_input(format!("{} has no worksheets", path.display())))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| Error::invalid_input(format!("cannot read worksheet {sheet_name}: {e}")))?;

        let mut rows_iter = range.rows();
        let header_row = rows_iter
            .next()
            .ok_or_else(|| Error::invalid_input(format!("{} has no header row", path.display())))?;
        let headers: Vec<String> = header_row.iter().map(data_to_string).collect();
        let director_col = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(DIRECTOR_NAME_HEADER))
            .ok_or_else(|| Error::invalid_input(format!("no '{DIRECTOR_NAME_HEADER}' column in {}", path.display())))?;

        let mut rows = Vec::new();
        for (offset, row) in rows_iter.enumerate() {
            let row_index = (offset + 1) as u64;
            let director_name = row.get(director_col).map(data_to_string).unwrap_or_default();
            let mut fields = HashMap::new();
            for (col_idx, header) in headers.iter().enumerate() {
                if col_idx == director_col {
                    continue;
                }
                if let Some(cell) = row.get(col_idx) {
                    fields.insert(header.clone(), data_to_json(cell));
                }
            }
            rows.push(Lead { row_index, director_name, fields });
        }

        Ok(Self { rows, cursor: 0 })
    }
}

#[async_trait]
impl LeadSource for XlsxLeadSource {
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

fn data_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}

fn data_to_json(cell: &Data) -> Value {
    match cell {
        Data::String(s) => Value::String(s.clone()),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Int(i) => Value::Number((*i).into()),
        Data::Bool(b) => Value::Bool(*b),
        Data::Empty => Value::Null,
        other => Value::String(data_to_string(other)),
    }
}

/// Accumulates committed `LeadResult`s in memory and rewrites the whole
/// workbook to a temp file + atomic rename on every `write_batch`, so a
/// partial write can never corrupt previously committed content.
/// xlsx's zip/XML container format has no safe append operation, so
/// whole-file-then-rename is the only atomicity strategy available to a
/// thin adapter.
pub struct XlsxLeadSink {
    path: PathBuf,
    committed: Vec<LeadResult>,
}

impl XlsxLeadSink {
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), committed: Vec::new() }
    }
}

#[async_trait]
impl LeadSink for XlsxLeadSink {
    async fn write_batch(&mut self, results: &[LeadResult]) -> Result<()> {
        self.committed.extend_from_slice(results);
        self.committed.sort_by_key(|r| r.row_index);
        write_workbook_atomically(&self.path, &self.committed)
    }
}

fn write_workbook_atomically(path: &Path, rows: &[LeadResult]) -> Result<()> {
    let mut field_names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.lead_fields.keys() {
            if !field_names.contains(key) {
                field_names.push(key.clone());
            }
        }
    }
    field_names.sort();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    let mut col = 0u16;
    sheet.write_string(0, col, "row_index").map_err(xlsx_err)?;
    col += 1;
    for name in &field_names {
        sheet.write_string(0, col, name).map_err(xlsx_err)?;
        col += 1;
    }
    for header in ["ethnicity", "confidence", "method", "processing_ms", "provider", "cost", "processing_status", "error_kind", "error_message"] {
        sheet.write_string(0, col, header).map_err(xlsx_err)?;
        col += 1;
    }

    for (row_idx, result) in rows.iter().enumerate() {
        let r = (row_idx + 1) as u32;
        let mut c = 0u16;
        sheet.write_number(r, c, result.row_index as f64).map_err(xlsx_err)?;
        c += 1;
        for name in &field_names {
            match result.lead_fields.get(name) {
                Some(Value::String(s)) => sheet.write_string(r, c, s).map_err(xlsx_err)?,
                Some(Value::Number(n)) => sheet.write_number(r, c, n.as_f64().unwrap_or_default()).map_err(xlsx_err)?,
                Some(Value::Bool(b)) => sheet.write_boolean(r, c, *b).map_err(xlsx_err)?,
                _ => sheet.write_blank(r, c, &rust_xlsxwriter::Format::new()).map_err(xlsx_err)?,
            };
            c += 1;
        }

        if let Some(classification) = &result.classification {
            sheet.write_string(r, c, classification.ethnicity.as_str()).map_err(xlsx_err)?;
            sheet.write_number(r, c + 1, classification.confidence).map_err(xlsx_err)?;
            sheet.write_string(r, c + 2, classification.method.as_str()).map_err(xlsx_err)?;
            sheet.write_number(r, c + 3, classification.processing_ms as f64).map_err(xlsx_err)?;
            if let Some(provider) = &classification.provider {
                sheet.write_string(r, c + 4, provider).map_err(xlsx_err)?;
            }
            if let Some(cost) = classification.cost {
                sheet.write_number(r, c + 5, cost).map_err(xlsx_err)?;
            }
        }
        c += 6;

        sheet.write_string(r, c, processing_status_str(result.processing_status)).map_err(xlsx_err)?;
        if let Some(kind) = result.error_kind {
            sheet.write_string(r, c + 1, kind.as_str()).map_err(xlsx_err)?;
        }
        if let Some(msg) = &result.error_message {
            sheet.write_string(r, c + 2, msg).map_err(xlsx_err)?;
        }
    }

    let tmp_path = path.with_extension("xlsx.tmp");
    workbook.save(&tmp_path).map_err(xlsx_err)?;
    std::fs::rename(&tmp_path, path).map_err(|e| Error::storage(format!("cannot rename {}: {e}", tmp_path.display())))?;
    Ok(())
}

fn processing_status_str(status: leadscout_core::ProcessingStatus) -> &'static str {
    match status {
        leadscout_core::ProcessingStatus::Success => "success",
        leadscout_core::ProcessingStatus::Failed => "failed",
        leadscout_core::ProcessingStatus::Skipped => "skipped",
    }
}

fn xlsx_err(e: impl std::fmt::Display) -> Error {
    Error::storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn sample_workbook(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "director_name").unwrap();
        sheet.write_string(0, 1, "company_name").unwrap();
        sheet.write_string(1, 0, "Bongani Nkosi").unwrap();
        sheet.write_string(1, 1, "Acme Co").unwrap();
        sheet.write_string(2, 0, "Andreas van der Merwe").unwrap();
        sheet.write_string(2, 1, "Beta Ltd").unwrap();
        workbook.save(path).unwrap();
    }

    #[tokio::test]
    async fn reads_director_name_and_passthrough_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.xlsx");
        sample_workbook(&path);

        let mut source = XlsxLeadSource::open(&path).unwrap();
        assert_eq!(source.total_rows(), 2);

        let first = source.next_lead().await.unwrap().unwrap();
        assert_eq!(first.row_index, 1);
        assert_eq!(first.director_name, "Bongani Nkosi");
        assert_eq!(first.fields.get("company_name").unwrap(), "Acme Co");

        let second = source.next_lead().await.unwrap().unwrap();
        assert_eq!(second.director_name, "Andreas van der Merwe");

        assert!(source.next_lead().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seek_repositions_to_the_requested_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.xlsx");
        sample_workbook(&path);

        let mut source = XlsxLeadSource::open(&path).unwrap();
        source.seek(2).await.unwrap();
        let row = source.next_lead().await.unwrap().unwrap();
        assert_eq!(row.row_index, 2);
    }

    #[tokio::test]
    async fn sink_writes_a_readable_workbook() {
        use leadscout_core::{Classification, Ethnicity, Method};

        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.xlsx");
        let mut sink = XlsxLeadSink::create(&out_path);

        let classification = Classification::new("Bongani", "bongani", Ethnicity::African, 0.9, Method::RuleBased, 3).unwrap();
        let mut fields = HashMap::new();
        fields.insert("company_name".to_string(), Value::String("Acme Co".to_string()));
        let result = LeadResult::success(1, fields, classification, 1);

        sink.write_batch(&[result]).await.unwrap();
        assert!(out_path.exists());

        let mut workbook: Xlsx<_> = open_workbook(&out_path).unwrap();
        let range = workbook.worksheet_range("Sheet1").unwrap();
        let mut rows = range.rows();
        let header = rows.next().unwrap();
        assert!(header.iter().any(|c| data_to_string(c) == "ethnicity"));
    }
}
