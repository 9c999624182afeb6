use std::collections::{HashMap, HashSet};

use cache_db::{Row, Value};
use indexmap::IndexMap;

use crate::event::EventContext;

/// A buffered write, tagged with the event that produced it so a later
/// flush failure can be attributed back to its origin (spec §3).
#[derive(Debug, Clone)]
pub struct BufferEntry {
   pub row: Row,
   pub event: Option<EventContext>,
}

/// Per-table cache state (spec §3 "Per-table cache entry").
///
/// `rows` maps cache-key to `Some(row)` or `None` (a tombstone: "known
/// absent in the DB"). Buffers are `IndexMap` so iteration order — the
/// order flush drives writes in — matches insertion order, which scenario 6
/// (`createMany` preserving order) depends on.
#[derive(Debug)]
pub struct TableCache {
   pub rows: HashMap<String, Option<Row>>,
   pub insert_buffer: IndexMap<String, BufferEntry>,
   pub update_buffer: IndexMap<String, BufferEntry>,
   pub prefetched: HashSet<String>,
   pub spillover: HashSet<String>,
   pub is_complete: bool,
   pub bytes: u64,
   pub disk_reads: u64,
}

impl TableCache {
   /// A table's cache is created at startup, complete by default (spec §3
   /// "Lifecycle"): no crash-recovery checkpoint concept exists in this
   /// port, so the "iff no checkpoint present" condition is always true.
   pub fn new() -> Self {
      Self {
         rows: HashMap::new(),
         insert_buffer: IndexMap::new(),
         update_buffer: IndexMap::new(),
         prefetched: HashSet::new(),
         spillover: HashSet::new(),
         is_complete: true,
         bytes: 0,
         disk_reads: 0,
      }
   }

   /// Union test across buffers and `rows`, with update-over-insert
   /// precedence (spec §4.1 `has`). Does not consult `is_complete` — the
   /// caller (`Cache::has`) handles the complete short-circuit.
   pub fn has_local(&self, key: &str) -> bool {
      self.update_buffer.contains_key(key)
         || self.insert_buffer.contains_key(key)
         || self.rows.get(key).map(|r| r.is_some()).unwrap_or(false)
   }

   /// Buffer/rows lookup in precedence order: update, insert, rows. `None`
   /// means "not found locally" (as opposed to `Some(None)`, a tombstone).
   pub fn get_local(&self, key: &str) -> Option<Option<Row>> {
      if let Some(entry) = self.update_buffer.get(key) {
         return Some(Some(entry.row.clone()));
      }
      if let Some(entry) = self.insert_buffer.get(key) {
         return Some(Some(entry.row.clone()));
      }
      self.rows.get(key).cloned()
   }

   /// Remove `key` from every local location. Returns true if it was
   /// present in any of them.
   pub fn remove_local(&mut self, key: &str) -> bool {
      let in_insert = self.insert_buffer.shift_remove(key).is_some();
      let in_update = self.update_buffer.shift_remove(key).is_some();
      let in_rows = self.rows.remove(key).map(|r| r.is_some()).unwrap_or(false);
      in_insert || in_update || in_rows
   }

   pub fn clear(&mut self) {
      self.rows.clear();
      self.insert_buffer.clear();
      self.update_buffer.clear();
      self.spillover.clear();
      self.prefetched.clear();
   }
}

impl Default for TableCache {
   fn default() -> Self {
      Self::new()
   }
}

/// Rough in-memory footprint of a row, for the `bytes` budget (spec §3,
/// §4.5). Not required to be exact — only to order tables consistently and
/// trip the eviction threshold at roughly the configured byte count.
pub fn estimate_row_bytes(row: &Row) -> u64 {
   let mut total = 0u64;
   for (column, value) in row {
      total += column.len() as u64 + value_bytes(value);
   }
   total
}

fn value_bytes(value: &Value) -> u64 {
   match value {
      Value::Null => 0,
      Value::Int(_) => 4,
      Value::BigInt(_) => 8,
      Value::Float(_) => 8,
      Value::Bool(_) => 1,
      Value::Text(s) => s.len() as u64,
      Value::Bytes(b) => b.len() as u64,
      Value::Json(v) => v.to_string().len() as u64,
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn row(pairs: &[(&str, Value)]) -> Row {
      pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
   }

   #[test]
   fn update_over_insert_precedence() {
      let mut table = TableCache::new();
      table.insert_buffer.insert(
         "k1".to_string(),
         BufferEntry {
            row: row(&[("name", Value::Text("Skip".to_string()))]),
            event: None,
         },
      );
      table.update_buffer.insert(
         "k1".to_string(),
         BufferEntry {
            row: row(&[("name", Value::Text("Peanut Butter".to_string()))]),
            event: None,
         },
      );
      let found = table.get_local("k1").unwrap().unwrap();
      assert_eq!(found.get("name"), Some(&Value::Text("Peanut Butter".to_string())));
   }

   #[test]
   fn remove_local_clears_all_locations() {
      let mut table = TableCache::new();
      table.rows.insert("k1".to_string(), Some(row(&[])));
      assert!(table.remove_local("k1"));
      assert!(!table.has_local("k1"));
   }
}
