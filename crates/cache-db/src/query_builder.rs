use async_trait::async_trait;

use crate::error::Result;
use crate::table::Table;
use crate::value::Row;

/// A row of primary-key column values, enough to identify one logical row.
/// May carry extra columns (callers are free to pass a full row); only the
/// table's declared PK columns are read.
pub type PrimaryKey = Row;

/// Abstract query-builder/driver boundary (spec §6).
///
/// The cache calls exactly these operations; it never constructs SQL
/// itself and never knows the dialect. Implementations forward to a
/// concrete driver and may wrap a transaction, a plain client, or — as with
/// the reference `PgQueryBuilder` — a `sqlx::Transaction`.
///
/// All methods take `&mut self` because a single `QueryBuilder` instance
/// models one transaction-scoped handle: statements it issues are ordered
/// and share transaction state (savepoints, temp tables).
#[async_trait]
pub trait QueryBuilder: Send {
   /// `SELECT * FROM T WHERE pk = key`.
   async fn select_by_pk(&mut self, table: &dyn Table, key: &PrimaryKey) -> Result<Option<Row>>;

   /// `DELETE FROM T WHERE pk = key RETURNING *`.
   async fn delete_returning(&mut self, table: &dyn Table, key: &PrimaryKey)
   -> Result<Option<Row>>;

   /// `SELECT * FROM T WHERE (pk = k1) OR (pk = k2) OR ...`.
   async fn select_by_pks_any(
      &mut self,
      table: &dyn Table,
      keys: &[PrimaryKey],
   ) -> Result<Vec<Row>>;

   /// Row-wise `INSERT INTO T VALUES (...)` fast path for small batches.
   async fn insert_values(&mut self, table: &dyn Table, rows: &[Row]) -> Result<()>;

   /// `INSERT INTO T VALUES (...) ON CONFLICT (pk) DO UPDATE SET ...` fast
   /// path for small update batches.
   async fn insert_on_conflict_update(&mut self, table: &dyn Table, rows: &[Row]) -> Result<()>;

   /// Execute a raw statement (savepoint open/release/rollback, temp-table
   /// creation, set-based `UPDATE`, `TRUNCATE`).
   async fn execute_raw(&mut self, sql: &str) -> Result<()>;

   /// Stream a COPY-format text payload into `table`. `include_schema`
   /// controls whether the target name is schema-qualified in the COPY
   /// statement (the temp-table update path copies into an unqualified
   /// shadow table).
   async fn copy_in(&mut self, table: &dyn Table, text: &str, include_schema: bool)
   -> Result<()>;
}
