//! Persistence layer: SQLite-backed storage for reports and contacted users.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ReportRecord, ReportStore};
