use cache_db::{PrimaryKey, QueryBuilder, Row, Table, cache_key};
use cache_profiler::Profiler;
use indexmap::IndexMap;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::event::EventContext;
use crate::metrics::{self, QueryMethod, RequestKind};
use crate::table_cache::{BufferEntry, TableCache};

/// The write-back, predictive row cache (spec §4.1).
///
/// One `Cache` instance owns every table's working set, write buffers and
/// profile data. It holds no locks and assumes the caller's task model
/// serialises access (spec §5) — suspension points are exactly the awaited
/// query-builder calls.
///
/// This is the write-back variant only; a thin write-through store that
/// skips buffering during live tailing exists upstream but is out of scope
/// here (spec §1).
pub struct Cache {
   tables: IndexMap<String, TableCache>,
   qb: Option<Box<dyn QueryBuilder>>,
   event: Option<EventContext>,
   profiler: Profiler,
   config: CacheConfig,
   is_flush_retry: bool,
}

impl Cache {
   pub fn new(config: CacheConfig) -> Self {
      let profiler = Profiler::new(config.sampling_rate, config.prediction_threshold);
      Self {
         tables: IndexMap::new(),
         qb: None,
         event: None,
         profiler,
         config,
         is_flush_retry: false,
      }
   }

   pub fn config(&self) -> &CacheConfig {
      &self.config
   }

   pub fn is_flush_retry(&self) -> bool {
      self.is_flush_retry
   }

   /// Assigns the query-builder handle for the next DB-touching operations
   /// (spec §4.1 "Query-builder context"). Typically re-assigned between
   /// phases as a freshly begun transaction.
   pub fn set_query_builder(&mut self, qb: Box<dyn QueryBuilder>) {
      self.qb = Some(qb);
   }

   pub fn clear_query_builder(&mut self) {
      self.qb = None;
   }

   /// Sets the event tagged onto buffer entries and consulted for profile
   /// sampling (spec §4.1 "Current-event context"). An ergonomic setter
   /// form; every operation also takes an explicit event where it matters.
   pub fn set_event(&mut self, event: EventContext) {
      self.event = Some(event);
   }

   pub fn current_event(&self) -> Option<&EventContext> {
      self.event.as_ref()
   }

   pub(crate) fn profiler(&self) -> &Profiler {
      &self.profiler
   }

   pub(crate) fn profiler_mut(&mut self) -> &mut Profiler {
      &mut self.profiler
   }

   pub(crate) fn table_names(&self) -> Vec<String> {
      self.tables.keys().cloned().collect()
   }

   pub(crate) fn table_entry(&mut self, name: &str) -> &mut TableCache {
      self.tables.entry(name.to_string()).or_insert_with(TableCache::new)
   }

   pub(crate) fn table_entry_ref(&self, name: &str) -> Option<&TableCache> {
      self.tables.get(name)
   }

   pub(crate) fn tables(&self) -> &IndexMap<String, TableCache> {
      &self.tables
   }

   pub(crate) fn tables_mut(&mut self) -> &mut IndexMap<String, TableCache> {
      &mut self.tables
   }

   pub(crate) fn take_query_builder(&mut self) -> Result<&mut dyn QueryBuilder> {
      self.qb.as_deref_mut().ok_or(Error::NoQueryBuilder)
   }

   pub(crate) fn set_is_flush_retry(&mut self, retry: bool) {
      self.is_flush_retry = retry;
   }

   fn resolve_key(table: &dyn Table, pk: &PrimaryKey) -> Result<String> {
      cache_key(table.primary_key_columns(), pk).ok_or_else(|| Error::MissingPrimaryKey {
         table: table.name().to_string(),
      })
   }

   /// `has(table, key)` (spec §4.1). Never performs I/O.
   pub fn has(&self, table: &dyn Table, pk: &PrimaryKey) -> bool {
      let Ok(key) = Self::resolve_key(table, pk) else {
         return false;
      };
      match self.tables.get(table.name()) {
         Some(cache) if cache.is_complete => true,
         Some(cache) => cache.has_local(&key),
         // no table entry yet means it hasn't diverged from its startup
         // default of `is_complete = true` (spec §3 "Lifecycle").
         None => true,
      }
   }

   /// `get(table, key)` (spec §4.1). Serves from buffers/`rows` first,
   /// falls back to a DB point read on miss against an incomplete table,
   /// and samples the access into the profiler when due.
   pub async fn get(&mut self, table: &dyn Table, pk: &PrimaryKey) -> Result<Option<Row>> {
      let table_name = table.name().to_string();
      let key = Self::resolve_key(table, pk)?;

      if let Some(event) = self.event.clone() {
         if self.profiler.should_sample(event.event_count) {
            let walker = event.walker();
            self.profiler.record(&event.name, &table_name, table.primary_key_columns(), pk, &walker);
         }
      }

      let local_hit = {
         let cache = self.table_entry(&table_name);
         cache.get_local(&key).map(|found| {
            if !cache.is_complete && !cache.prefetched.contains(&key) {
               cache.spillover.insert(key.clone());
            }
            (found, cache.is_complete)
         })
      };

      if let Some((found, is_complete)) = local_hit {
         metrics::record_request(&table_name, if is_complete { RequestKind::Complete } else { RequestKind::Hit });
         return Ok(found);
      }

      let is_complete = self.table_entry(&table_name).is_complete;
      if is_complete {
         metrics::record_request(&table_name, RequestKind::Complete);
         return Ok(None);
      }

      {
         let cache = self.table_entry(&table_name);
         cache.spillover.insert(key.clone());
         cache.disk_reads += 1;
      }
      metrics::record_request(&table_name, RequestKind::Miss);

      let started = std::time::Instant::now();
      let qb = self.take_query_builder()?;
      let result = qb.select_by_pk(table, pk).await?;
      metrics::record_duration(&table_name, QueryMethod::Find, started.elapsed());

      self.table_entry(&table_name).rows.insert(key, result.clone());
      Ok(result)
   }

   /// `set(table, key, row, is_update)` (spec §4.1). Normalises the row,
   /// buffers it, and returns the stored clone.
   pub fn set(&mut self, table: &dyn Table, mut row: Row, is_update: bool) -> Result<Row> {
      let table_name = table.name().to_string();

      if !is_update {
         for column in table.columns() {
            if row.contains_key(&column.name) {
               continue;
            }
            if column.required {
               return Err(Error::MissingColumn {
                  table: table_name,
                  column: column.name.clone(),
               });
            }
            row.insert(column.name.clone(), cache_db::Value::Null);
         }
      }

      let pk: PrimaryKey = row.clone();
      let key = Self::resolve_key(table, &pk)?;
      let stored = row.clone();
      let entry = BufferEntry {
         row,
         event: self.event.clone(),
      };

      let cache = self.table_entry(&table_name);
      if is_update {
         cache.update_buffer.insert(key, entry);
      } else {
         cache.insert_buffer.insert(key, entry);
      }
      Ok(stored)
   }

   /// Bulk convenience over repeated `set` calls, preserving insertion
   /// order per cache key (scenario 6, spec §8).
   pub fn set_many(&mut self, table: &dyn Table, rows: Vec<(Row, bool)>) -> Result<Vec<Row>> {
      rows.into_iter().map(|(row, is_update)| self.set(table, row, is_update)).collect()
   }

   /// `delete(table, key)` (spec §4.1). Removes from every local location
   /// and issues a DB delete to learn whether a persisted row existed.
   pub async fn delete(&mut self, table: &dyn Table, pk: &PrimaryKey) -> Result<bool> {
      let table_name = table.name().to_string();
      let key = Self::resolve_key(table, pk)?;

      let removed_locally = self.table_entry(&table_name).remove_local(&key);

      let qb = self.take_query_builder()?;
      let db_row = qb.delete_returning(table, pk).await?;

      Ok(removed_locally || db_row.is_some())
   }

   /// `invalidate()` (spec §4.1). Every table's `is_complete` becomes
   /// false; subsequent misses fall back to DB reads again.
   pub fn invalidate(&mut self) {
      for cache in self.tables.values_mut() {
         cache.is_complete = false;
      }
   }

   /// `clear()` (spec §4.1). Empties `rows`, `spillover` and both buffers
   /// for every table; does not touch `is_complete`, `bytes` or
   /// `disk_reads`.
   pub fn clear(&mut self) {
      for cache in self.tables.values_mut() {
         cache.clear();
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use async_trait::async_trait;
   use cache_db::{ColumnSchema, DriverType, StaticTable, Value};

   fn pet_table() -> StaticTable {
      StaticTable {
         name: "pet".to_string(),
         primary_key_columns: vec!["id".to_string()],
         columns: vec![
            ColumnSchema::new("id", DriverType::Text),
            ColumnSchema::new("name", DriverType::Text),
            ColumnSchema::new("age", DriverType::Int4),
         ],
      }
   }

   fn row(pairs: &[(&str, Value)]) -> Row {
      pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
   }

   struct NullQueryBuilder;

   #[async_trait]
   impl QueryBuilder for NullQueryBuilder {
      async fn select_by_pk(&mut self, _table: &dyn Table, _key: &PrimaryKey) -> cache_db::Result<Option<Row>> {
         Ok(None)
      }
      async fn delete_returning(&mut self, _table: &dyn Table, _key: &PrimaryKey) -> cache_db::Result<Option<Row>> {
         Ok(None)
      }
      async fn select_by_pks_any(&mut self, _table: &dyn Table, _keys: &[PrimaryKey]) -> cache_db::Result<Vec<Row>> {
         Ok(Vec::new())
      }
      async fn insert_values(&mut self, _table: &dyn Table, _rows: &[Row]) -> cache_db::Result<()> {
         Ok(())
      }
      async fn insert_on_conflict_update(&mut self, _table: &dyn Table, _rows: &[Row]) -> cache_db::Result<()> {
         Ok(())
      }
      async fn execute_raw(&mut self, _sql: &str) -> cache_db::Result<()> {
         Ok(())
      }
      async fn copy_in(&mut self, _table: &dyn Table, _text: &str, _include_schema: bool) -> cache_db::Result<()> {
         Ok(())
      }
   }

   #[tokio::test]
   async fn set_then_get_returns_clone_without_io() {
      let mut cache = Cache::new(CacheConfig::default());
      let table = pet_table();
      let pk = row(&[("id", Value::Text("id1".to_string()))]);
      let full = row(&[
         ("id", Value::Text("id1".to_string())),
         ("name", Value::Text("Skip".to_string())),
         ("age", Value::Int(12)),
      ]);
      cache.set(&table, full.clone(), false).unwrap();
      let found = cache.get(&table, &pk).await.unwrap();
      assert_eq!(found, Some(full));
   }

   #[tokio::test]
   async fn update_shadows_insert_on_read() {
      let mut cache = Cache::new(CacheConfig::default());
      let table = pet_table();
      let pk = row(&[("id", Value::Text("id1".to_string()))]);
      let inserted = row(&[
         ("id", Value::Text("id1".to_string())),
         ("name", Value::Text("Skip".to_string())),
         ("age", Value::Int(12)),
      ]);
      cache.set(&table, inserted, false).unwrap();
      let update = row(&[
         ("id", Value::Text("id1".to_string())),
         ("name", Value::Text("Peanut Butter".to_string())),
      ]);
      cache.set(&table, update, true).unwrap();

      let found = cache.get(&table, &pk).await.unwrap().unwrap();
      assert_eq!(found.get("name"), Some(&Value::Text("Peanut Butter".to_string())));
   }

   #[tokio::test]
   async fn delete_is_immediately_visible() {
      let mut cache = Cache::new(CacheConfig::default());
      cache.set_query_builder(Box::new(NullQueryBuilder));
      let table = pet_table();
      let pk = row(&[("id", Value::Text("id1".to_string()))]);
      cache
         .set(&table, row(&[("id", Value::Text("id1".to_string()))]), false)
         .unwrap();

      assert!(cache.has(&table, &pk));
      let existed = cache.delete(&table, &pk).await.unwrap();
      assert!(existed);
      assert!(!cache.has_complete_aside(&table, &pk));
   }

   impl Cache {
      /// Test helper: `has` without the `is_complete` short-circuit, so a
      /// deleted-but-complete table still reports absence where expected.
      fn has_complete_aside(&self, table: &dyn Table, pk: &PrimaryKey) -> bool {
         let key = Self::resolve_key(table, pk).unwrap();
         self.table_entry_ref(table.name())
            .map(|c| c.has_local(&key))
            .unwrap_or(false)
      }
   }

   #[test]
   fn set_insert_missing_required_column_errors() {
      let mut cache = Cache::new(CacheConfig::default());
      let table = StaticTable {
         name: "pet".to_string(),
         primary_key_columns: vec!["id".to_string()],
         columns: vec![
            ColumnSchema::new("id", DriverType::Text),
            ColumnSchema::required("name", DriverType::Text),
         ],
      };
      let err = cache
         .set(&table, row(&[("id", Value::Text("id1".to_string()))]), false)
         .unwrap_err();
      assert!(matches!(err, Error::MissingColumn { ref column, .. } if column == "name"));
   }

   #[tokio::test]
   async fn get_without_query_builder_on_incomplete_miss_errors() {
      let mut cache = Cache::new(CacheConfig::default());
      let table = pet_table();
      cache
         .set(&table, row(&[("id", Value::Text("id1".to_string()))]), false)
         .unwrap();
      cache.invalidate();

      let pk = row(&[("id", Value::Text("missing".to_string()))]);
      let err = cache.get(&table, &pk).await.unwrap_err();
      assert!(matches!(err, Error::NoQueryBuilder));
   }
}
