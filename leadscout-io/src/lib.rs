//! External-interface adapters implementing the Batch Runner's
//! `LeadSource`/`LeadSink` traits: xlsx spreadsheets, CSV files, and
//! company-registry CSV exports. No classification logic lives here.

mod csv_io;
mod excel;
mod fingerprint;
mod registry;

pub use csv_io::{CsvLeadSink, CsvLeadSource};
pub use excel::{XlsxLeadSink, XlsxLeadSource};
pub use fingerprint::fingerprint_file;
pub use registry::CompanyRegistrySource;
