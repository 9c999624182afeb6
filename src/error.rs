use cache_db::Row;

use crate::event::EventContext;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced across the cache's public boundary (spec §6/§7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// The COPY transport failed during a flush. Surfaces unchanged.
   #[error("COPY flush failed for table {table}: {source}")]
   CopyFlush {
      table: String,
      #[source]
      source: cache_db::Error,
   },

   /// A single buffered row was identified, via savepoint bisection, as the
   /// cause of a batch-write failure.
   #[error("insert of row {key} into {table} failed: {source}")]
   DelayedInsert {
      table: String,
      key: String,
      row: Box<Row>,
      event: Option<Box<EventContext>>,
      #[source]
      source: cache_db::Error,
   },

   /// A fast-path flush failed; the caller should retry, which engages the
   /// savepoint/bisect path and either succeeds or raises `DelayedInsert`.
   #[error("flush failed for one or more tables on the fast path; retry to engage recovery")]
   Retryable { tables: Vec<String> },

   /// `set` was called for an insert without a value for a required column.
   #[error("missing required column {column} for insert into {table}")]
   MissingColumn { table: String, column: String },

   /// A row handed to `set`/`get`/`delete` has no value for one or more of
   /// the table's primary-key columns, so no cache key can be derived.
   #[error("row is missing a primary-key column for table {table}")]
   MissingPrimaryKey { table: String },

   /// Any other database error surfaced from a point read or delete.
   #[error(transparent)]
   Db(#[from] cache_db::Error),

   /// A DB-touching operation was attempted with no query-builder handle
   /// assigned (spec §4.1 "Query-builder context").
   #[error("no query builder is set")]
   NoQueryBuilder,
}

impl Error {
   /// Machine-readable error code, mirroring the teacher's `error_code()`
   /// accessor.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::CopyFlush { .. } => "COPY_FLUSH_ERROR",
         Error::DelayedInsert { .. } => "DELAYED_INSERT_ERROR",
         Error::Retryable { .. } => "RETRYABLE_ERROR",
         Error::MissingColumn { .. } => "MISSING_COLUMN",
         Error::MissingPrimaryKey { .. } => "MISSING_PRIMARY_KEY",
         Error::Db(_) => "DB_ERROR",
         Error::NoQueryBuilder => "NO_QUERY_BUILDER",
      }
   }
}
