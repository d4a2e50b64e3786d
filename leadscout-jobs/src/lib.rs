//! Durable job, batch, and per-lead-result store with exclusive file
//! locking and resumable cursor tracking (spec §4.7 Job Store).

mod schema;
mod store;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::JobStore;
