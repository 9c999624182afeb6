/// Result type alias for query-builder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a `QueryBuilder` implementation.
///
/// These are the boundary errors named in spec §6/§7 that originate below
/// the cache: transport failures during COPY, and anything else the
/// underlying driver raised. The cache wraps and re-attributes these; it
/// never constructs this variant itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// The COPY transport failed (connection reset, protocol violation,
   /// server-side abort). Surfaces unchanged to the cache's caller per §7.
   #[error("COPY transport failed: {0}")]
   CopyTransport(String),

   /// A constraint or validation error from the database, carrying the raw
   /// driver message. The flush engine attributes this to a single row via
   /// bisection before wrapping it as a `DelayedInsertError`.
   #[error("database error: {0}")]
   Database(String),

   #[cfg(feature = "postgres")]
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),
}

impl Error {
   /// True for errors that mean "the COPY transport itself failed" (broken
   /// connection, protocol violation) as opposed to a constraint/validation
   /// rejection the database reported for specific row data. The flush
   /// engine uses this to skip bisection for transport failures — retrying
   /// a halved batch against a dead connection can't isolate anything.
   pub fn is_copy_transport(&self) -> bool {
      match self {
         Error::CopyTransport(_) => true,
         Error::Database(_) => false,
         #[cfg(feature = "postgres")]
         Error::Sqlx(err) => err.as_database_error().is_none(),
      }
   }
}
