//! The bulk-flush protocol: fast path plus savepoint-and-bisect recovery
//! (spec §4.3).

use std::time::Instant;

use cache_db::{ColumnSchema, QueryBuilder, Row, Table, encode_copy_text};

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::metrics::{self, QueryMethod};
use crate::table_cache::BufferEntry;

const SAVEPOINT: &str = "cache_flush";

impl Cache {
   /// `flush(table_names?)` (spec §4.3). Persists every buffered write for
   /// `tables`, clears their buffers on success, and promotes rows into
   /// `rows`. Caller passes the handles for whichever tables it wants
   /// flushed; pass every table handle you hold to flush "all tables".
   ///
   /// Runs the fast, non-bisecting path unless the previous flush failed
   /// (`is_flush_retry`), in which case it runs the savepoint/bisect path
   /// and clears the flag only on full success.
   pub async fn flush(&mut self, tables: &[&dyn Table]) -> Result<()> {
      if self.is_flush_retry() {
         self.flush_retry(tables).await
      } else {
         self.flush_fast(tables).await
      }
   }

   /// Steady-state path: direct `INSERT`/`ON CONFLICT`, or COPY once a
   /// batch clears `low_batch_threshold`, with no savepoints. Tables run
   /// independently (`allSettled`); one table's failure does not stop the
   /// others (spec §4.3 "Fast vs retry modes").
   async fn flush_fast(&mut self, tables: &[&dyn Table]) -> Result<()> {
      let mut failed = Vec::new();
      for &table in tables {
         if self.flush_table_fast(table).await.is_err() {
            failed.push(table.name().to_string());
         }
      }

      if failed.is_empty() {
         self.set_is_flush_retry(false);
         Ok(())
      } else {
         self.set_is_flush_retry(true);
         Err(Error::Retryable { tables: failed })
      }
   }

   async fn flush_table_fast(&mut self, table: &dyn Table) -> Result<()> {
      let table_name = table.name().to_string();
      let threshold = self.config().low_batch_threshold;

      let insert_entries: Vec<(String, BufferEntry)> =
         self.table_entry(&table_name).insert_buffer.drain(..).collect();
      if !insert_entries.is_empty() {
         let rows: Vec<Row> = insert_entries.iter().map(|(_, e)| e.row.clone()).collect();
         let started = Instant::now();
         let qb = self.take_query_builder()?;
         let outcome = if rows.len() <= threshold {
            qb.insert_values(table, &rows).await
         } else {
            let text = encode_copy_text(table, &rows);
            // Let the runtime service other tasks between encoding a large
            // batch and staging it over the wire (spec §5 scheduling model).
            tokio::task::yield_now().await;
            qb.copy_in(table, &text, true).await
         };
         metrics::record_duration(&table_name, QueryMethod::Flush, started.elapsed());

         match outcome {
            Ok(()) => self.promote_rows(&table_name, insert_entries),
            Err(err) => {
               self.restore_buffer(&table_name, insert_entries, false);
               return Err(Error::from(err));
            }
         }
      }

      let update_entries: Vec<(String, BufferEntry)> =
         self.table_entry(&table_name).update_buffer.drain(..).collect();
      if !update_entries.is_empty() {
         let rows: Vec<Row> = update_entries.iter().map(|(_, e)| e.row.clone()).collect();
         let started = Instant::now();
         let qb = self.take_query_builder()?;
         let outcome = qb.insert_on_conflict_update(table, &rows).await;
         metrics::record_duration(&table_name, QueryMethod::Flush, started.elapsed());

         match outcome {
            Ok(()) => self.promote_rows(&table_name, update_entries),
            Err(err) => {
               self.restore_buffer(&table_name, update_entries, true);
               return Err(Error::from(err));
            }
         }
      }

      Ok(())
   }

   /// Precise path: each phase runs under a savepoint; a batch failure
   /// bisects to the single offending row (spec §4.3 "Delayed-failure
   /// recovery"). Stops at the first table that fails — unlike the fast
   /// path, there is no `allSettled` here.
   async fn flush_retry(&mut self, tables: &[&dyn Table]) -> Result<()> {
      for &table in tables {
         self.flush_table_retry(table).await?;
      }
      self.set_is_flush_retry(false);
      Ok(())
   }

   async fn flush_table_retry(&mut self, table: &dyn Table) -> Result<()> {
      let table_name = table.name().to_string();

      let insert_entries: Vec<(String, BufferEntry)> =
         self.table_entry(&table_name).insert_buffer.drain(..).collect();
      if !insert_entries.is_empty() {
         let qb = self.take_query_builder()?;
         qb.execute_raw(&format!("SAVEPOINT {SAVEPOINT}")).await.map_err(Error::from)?;

         let started = Instant::now();
         let outcome = recover_batch(qb, table, &table_name, insert_entries.clone(), true).await;
         metrics::record_duration(&table_name, QueryMethod::Flush, started.elapsed());

         match outcome {
            Ok(()) => {
               let qb = self.take_query_builder()?;
               qb.execute_raw(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await.map_err(Error::from)?;
               self.promote_rows(&table_name, insert_entries);
            }
            Err(err) => {
               self.restore_buffer(&table_name, insert_entries, false);
               return Err(err);
            }
         }
      }

      let update_entries: Vec<(String, BufferEntry)> =
         self.table_entry(&table_name).update_buffer.drain(..).collect();
      if !update_entries.is_empty() {
         let shadow = ShadowTable::new(table);

         let qb = self.take_query_builder()?;
         qb.execute_raw(&format!(
            "CREATE TEMP TABLE IF NOT EXISTS {} AS SELECT * FROM {} WITH NO DATA",
            shadow.name(),
            table.name()
         ))
         .await
         .map_err(Error::from)?;
         qb.execute_raw(&format!("SAVEPOINT {SAVEPOINT}")).await.map_err(Error::from)?;

         let started = Instant::now();
         let outcome = recover_batch(qb, &shadow, &table_name, update_entries.clone(), false).await;
         metrics::record_duration(&table_name, QueryMethod::Flush, started.elapsed());

         match outcome {
            Ok(()) => {
               let qb = self.take_query_builder()?;
               qb.execute_raw(&build_update_from_shadow(table, &shadow)).await.map_err(Error::from)?;
               qb.execute_raw(&format!("TRUNCATE {}", shadow.name())).await.map_err(Error::from)?;
               qb.execute_raw(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await.map_err(Error::from)?;
               self.promote_rows(&table_name, update_entries);
            }
            Err(err) => {
               self.restore_buffer(&table_name, update_entries, true);
               return Err(err);
            }
         }
      }

      Ok(())
   }

   /// Promote a successfully-flushed batch into `rows`, bumping `bytes` for
   /// newly-seen keys only while complete (or always, under the debug
   /// override) per spec §4.3 step 3 / §9 Open Question (a).
   fn promote_rows(&mut self, table_name: &str, entries: Vec<(String, BufferEntry)>) {
      let track_always = self.config().track_bytes_always;
      let cache = self.table_entry(table_name);
      for (key, entry) in entries {
         if (cache.is_complete || track_always) && !cache.rows.contains_key(&key) {
            cache.bytes += crate::table_cache::estimate_row_bytes(&entry.row);
         }
         cache.rows.insert(key, Some(entry.row));
      }
   }

   /// A flush failure leaves buffers intact so the caller may retry (spec
   /// §5 "Cancellation and timeouts").
   fn restore_buffer(&mut self, table_name: &str, entries: Vec<(String, BufferEntry)>, is_update: bool) {
      let cache = self.table_entry(table_name);
      let buffer = if is_update { &mut cache.update_buffer } else { &mut cache.insert_buffer };
      for (key, entry) in entries {
         buffer.insert(key, entry);
      }
   }
}

/// Savepoint-and-bisect recovery (spec §4.3 `recover_batch_error`).
///
/// Attempts the whole batch first; on failure with more than one row,
/// splits in half and recurses left-before-right, short-circuiting on the
/// first row it can isolate. Always rolls back to and re-opens the
/// savepoint before each attempt, per the Open Question (b) resolution:
/// release happens only once, by the caller, on overall success.
async fn recover_batch(
   qb: &mut dyn QueryBuilder,
   table: &dyn Table,
   table_name: &str,
   entries: Vec<(String, BufferEntry)>,
   include_schema: bool,
) -> Result<()> {
   let mut stack = vec![entries];

   while let Some(batch) = stack.pop() {
      if batch.is_empty() {
         continue;
      }

      qb.execute_raw(&format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}")).await.map_err(Error::from)?;
      qb.execute_raw(&format!("SAVEPOINT {SAVEPOINT}")).await.map_err(Error::from)?;

      let rows: Vec<Row> = batch.iter().map(|(_, entry)| entry.row.clone()).collect();
      let text = encode_copy_text(table, &rows);
      tokio::task::yield_now().await;

      match qb.copy_in(table, &text, include_schema).await {
         Ok(()) => continue,
         // A transport failure (broken connection, protocol violation) is
         // not a per-row problem — halving the batch and retrying against a
         // dead connection can't isolate anything, so this surfaces
         // unchanged instead of continuing to bisect (spec §7).
         Err(err) if err.is_copy_transport() => {
            tracing::warn!(table = table_name, error = %err, "COPY transport failed during flush");
            return Err(Error::CopyFlush {
               table: table_name.to_string(),
               source: err,
            });
         }
         Err(err) if batch.len() == 1 => {
            let (key, entry) = batch.into_iter().next().expect("length checked above");
            tracing::warn!(table = table_name, key = %key, error = %err, "isolated failing row via bisection");
            return Err(Error::DelayedInsert {
               table: table_name.to_string(),
               key,
               row: Box::new(entry.row),
               event: entry.event.map(Box::new),
               source: err,
            });
         }
         Err(_) => {
            let mut batch = batch;
            let mid = batch.len() / 2;
            let right = batch.split_off(mid);
            stack.push(right);
            stack.push(batch);
         }
      }
   }

   Ok(())
}

/// A `Table` view over a table's temp-table update shadow: same columns
/// and primary key, but named `{bare_table_name}_shadow` so `copy_in`'s
/// `include_schema = false` path (no schema qualification) lands on it.
struct ShadowTable<'a> {
   inner: &'a dyn Table,
   shadow_name: String,
}

impl<'a> ShadowTable<'a> {
   fn new(inner: &'a dyn Table) -> Self {
      let bare = inner.name().rsplit('.').next().unwrap_or(inner.name());
      Self {
         inner,
         shadow_name: format!("{bare}_shadow"),
      }
   }
}

impl Table for ShadowTable<'_> {
   fn name(&self) -> &str {
      &self.shadow_name
   }

   fn primary_key_columns(&self) -> &[String] {
      self.inner.primary_key_columns()
   }

   fn columns(&self) -> &[ColumnSchema] {
      self.inner.columns()
   }
}

fn build_update_from_shadow(table: &dyn Table, shadow: &ShadowTable<'_>) -> String {
   let set_clause = table
      .columns()
      .iter()
      .filter(|c| !table.primary_key_columns().contains(&c.name))
      .map(|c| format!("{0} = source.{0}", c.name))
      .collect::<Vec<_>>()
      .join(", ");
   let pk_clause = table
      .primary_key_columns()
      .iter()
      .map(|pk| format!("target.{pk} = source.{pk}"))
      .collect::<Vec<_>>()
      .join(" AND ");

   format!(
      "UPDATE {} AS target SET {} FROM {} AS source WHERE {}",
      table.name(),
      set_clause,
      shadow.name(),
      pk_clause
   )
}
