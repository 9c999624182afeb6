//! Eviction and profile-driven prefetch (spec §4.5).

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use cache_db::{PrimaryKey, Row, Table, cache_key};
use indexmap::IndexMap;

use crate::cache::Cache;
use crate::error::Result;
use crate::event::EventContext;
use crate::metrics::{self, QueryMethod, RequestKind};

impl Cache {
   /// `prefetch` (spec §4.5). Evicts tables to stay under the byte budget,
   /// predicts the primary keys `upcoming_events` will need from the
   /// profiler, carries over entries still worth keeping, and issues one
   /// batched load per table with non-empty predictions.
   ///
   /// `tables` must include a handle for every table a prediction might
   /// name — predictions for tables without a handle here are silently
   /// dropped, since there is no `Table` to build a query against.
   pub async fn prefetch(&mut self, tables: &[&dyn Table], upcoming_events: &[EventContext]) -> Result<()> {
      self.evict_if_over_budget();

      if self.tables().values().all(|c| c.is_complete) {
         return Ok(());
      }

      let table_by_name: HashMap<&str, &dyn Table> = tables.iter().map(|&t| (t.name(), t)).collect();

      let mut predictions: HashMap<String, IndexMap<String, PrimaryKey>> = HashMap::new();
      for event in upcoming_events {
         let walker = event.walker();
         for (table_name, pk_row) in self.profiler().predict(&event.name, event.event_count, &walker) {
            let Some(&table) = table_by_name.get(table_name.as_str()) else {
               continue;
            };
            if let Some(key) = cache_key(table.primary_key_columns(), &pk_row) {
               predictions.entry(table_name).or_default().insert(key, pk_row);
            }
         }
      }

      // Carry-over and purge: every incomplete table's `rows` are walked,
      // not just ones this round predicted something for, so a table with
      // no hits this round still has its stale entries dropped instead of
      // growing unbounded. Keep spillover or predicted entries, drop the
      // rest; predicted keys already resident are removed from the load set.
      let table_names: Vec<String> = self.tables().keys().cloned().collect();
      for table_name in table_names {
         let cache = self.table_entry(&table_name);
         if cache.is_complete {
            continue;
         }
         let keep: HashSet<String> = cache.spillover.iter().cloned().collect();
         match predictions.get_mut(&table_name) {
            Some(table_predictions) => {
               cache.rows.retain(|key, _| keep.contains(key) || table_predictions.shift_remove(key).is_some());
            }
            None => {
               cache.rows.retain(|key, _| keep.contains(key));
            }
         }
      }
      for cache in self.tables_mut().values_mut() {
         cache.spillover.clear();
         cache.prefetched.clear();
      }

      for (table_name, table_predictions) in predictions {
         if table_predictions.is_empty() {
            continue;
         }
         let Some(&table) = table_by_name.get(table_name.as_str()) else {
            continue;
         };

         let keys: Vec<String> = table_predictions.keys().cloned().collect();
         let pks: Vec<PrimaryKey> = table_predictions.into_values().collect();

         let started = Instant::now();
         let qb = self.take_query_builder()?;
         let loaded = qb.select_by_pks_any(table, &pks).await?;
         metrics::record_duration(&table_name, QueryMethod::Load, started.elapsed());

         let mut by_key: HashMap<String, Row> = HashMap::new();
         for row in loaded {
            if let Some(key) = cache_key(table.primary_key_columns(), &row) {
               by_key.insert(key, row);
            }
         }

         let cache = self.table_entry(&table_name);
         for key in keys {
            let found = by_key.remove(&key);
            cache.rows.insert(key.clone(), found);
            cache.prefetched.insert(key);
         }
         metrics::record_request(&table_name, RequestKind::Prefetch);
      }

      Ok(())
   }

   /// Eviction policy: while total bytes across complete-cached tables
   /// exceeds the configured budget, evict the complete table with the
   /// fewest `disk_reads` (cheapest to rebuild), repeating until the budget
   /// is satisfied or no complete tables remain.
   fn evict_if_over_budget(&mut self) {
      let max_bytes = self.config().indexing_cache_max_bytes;
      let mut total: u64 = self.tables().values().filter(|c| c.is_complete).map(|c| c.bytes).sum();
      if total <= max_bytes {
         return;
      }

      let mut candidates: Vec<(String, u64)> = self
         .tables()
         .iter()
         .filter(|(_, c)| c.is_complete)
         .map(|(name, c)| (name.clone(), c.disk_reads))
         .collect();
      candidates.sort_by_key(|(_, disk_reads)| *disk_reads);

      for (name, _) in candidates {
         if total <= max_bytes {
            break;
         }
         if let Some(cache) = self.tables_mut().get_mut(&name) {
            total = total.saturating_sub(cache.bytes);
            cache.bytes = 0;
            cache.rows.clear();
            cache.is_complete = false;
            tracing::debug!(table = %name, "evicted table to satisfy byte budget");
         }
      }
   }
}
