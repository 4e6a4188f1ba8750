//! Persistence layer: libSQL-backed storage for sequences, send logs and
//! warmup counters.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
