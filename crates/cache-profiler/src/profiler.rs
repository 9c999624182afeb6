use std::collections::HashMap;

use cache_db::Row;
use tracing::trace;

use crate::event_walk::EventWalk;
use crate::pattern::ProfilePattern;

#[derive(Debug, Clone, Default)]
struct PatternStats {
   count: u64,
}

/// Learns, from observed reads, the mapping from events to the primary-key
/// rows those events cause to be read (spec §4.4).
///
/// State shape matches §3 exactly: a three-level map event-name -> table ->
/// pattern -> `{pattern, count}`. The per-event-name counter §3 also names
/// is not duplicated here — the cache's caller already owns one copy of it
/// (tagged onto each event), so it is threaded through to
/// `should_sample`/`predict` as a parameter rather than tracked a second
/// time inside the profiler.
pub struct Profiler {
   sampling_rate: u64,
   prediction_threshold: f64,
   profiles: HashMap<String, HashMap<String, HashMap<ProfilePattern, PatternStats>>>,
}

impl Profiler {
   pub fn new(sampling_rate: u64, prediction_threshold: f64) -> Self {
      assert!(sampling_rate > 0, "sampling_rate must be positive");
      Self {
         sampling_rate,
         prediction_threshold,
         profiles: HashMap::new(),
      }
   }

   /// True on every `sampling_rate`th occurrence (the 1st, 11th, 21st... for
   /// a rate of 10), matching "1 in N events" sampled (spec §4.4, §6).
   pub fn should_sample(&self, event_count: u64) -> bool {
      event_count % self.sampling_rate == 1
   }

   /// Attempt to learn a pattern mapping `event_name` reads of `table` to
   /// `target`'s primary key, and bump its hit count. No-op if no pattern
   /// can be derived (the key isn't reconstructable from this event shape).
   pub fn record(
      &mut self,
      event_name: &str,
      table: &str,
      pk_columns: &[String],
      target: &Row,
      walker: &dyn EventWalk,
   ) {
      let Some(pattern) = ProfilePattern::derive(pk_columns, target, walker) else {
         return;
      };

      let entry = self
         .profiles
         .entry(event_name.to_string())
         .or_default()
         .entry(table.to_string())
         .or_default()
         .entry(pattern)
         .or_default();
      entry.count += 1;

      trace!(event = event_name, table, count = entry.count, "recorded profile pattern");
   }

   /// Count of distinct patterns recorded for `(event_name, table)`. Exposed
   /// for tests asserting on profile shape (spec §8 scenario 4).
   pub fn pattern_count(&self, event_name: &str, table: &str) -> u64 {
      self
         .profiles
         .get(event_name)
         .and_then(|tables| tables.get(table))
         .map(|patterns| patterns.len() as u64)
         .unwrap_or(0)
   }

   /// Hit count of the sole pattern recorded for `(event_name, table)`,
   /// if there is exactly one. Convenience for tests.
   pub fn sole_pattern_count(&self, event_name: &str, table: &str) -> Option<u64> {
      let patterns = self.profiles.get(event_name)?.get(table)?;
      if patterns.len() != 1 {
         return None;
      }
      patterns.values().next().map(|s| s.count)
   }

   /// Predict the primary-key rows `event_name`'s next occurrence will
   /// cause to be read, across all tables with recorded profiles, filtering
   /// by the expected-value threshold (spec §4.5).
   ///
   /// `event_count` is the observed-occurrences-so-far count for this event
   /// name, the same value `should_sample` was driven from when the
   /// profile's patterns were recorded — it is the denominator of the
   /// expected-value estimate.
   ///
   /// Returns `(table_name, primary_key_row)` pairs; candidates are not
   /// deduplicated by cache key here — that's the prefetch policy's job,
   /// since it also needs to cross-reference `spillover`.
   pub fn predict(&self, event_name: &str, event_count: u64, walker: &dyn EventWalk) -> Vec<(String, Row)> {
      let Some(tables) = self.profiles.get(event_name) else {
         return Vec::new();
      };
      let event_count = event_count.max(1);

      let mut out = Vec::new();
      for (table, patterns) in tables {
         for (pattern, stats) in patterns {
            let expected =
               stats.count as f64 * self.sampling_rate as f64 / event_count as f64;
            if expected <= self.prediction_threshold {
               continue;
            }
            if let Some(row) = pattern.recover(walker) {
               out.push((table.clone(), row));
            }
         }
      }
      out
   }
}
