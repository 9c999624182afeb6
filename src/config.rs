/// Tunable cache behavior (spec §6 "Configuration").
///
/// Plain struct with a `Default`, matching `SqliteDatabaseConfig` /
/// `ObserverConfig`'s shape rather than a layered config-file loader — there
/// is nothing here that benefits from one.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
   /// One in N events has its `get` calls sampled into the profiler.
   pub sampling_rate: u64,

   /// Expected-value cutoff (`count * sampling_rate / event_count`) below
   /// which a recorded pattern is not used for prefetch prediction.
   pub prediction_threshold: f64,

   /// Below this batch size, the fast flush path uses row-wise
   /// `INSERT`/`ON CONFLICT`; at or above it, COPY.
   pub low_batch_threshold: usize,

   /// Byte budget across all complete-cached tables. Exceeding it triggers
   /// eviction before the next prefetch.
   pub indexing_cache_max_bytes: u64,

   /// When `false` (default), `bytes` is only maintained while a table is
   /// `is_complete`; when `true`, it is tracked unconditionally. Debug-only
   /// escape hatch — see `SPEC_FULL.md` §5(a).
   pub track_bytes_always: bool,
}

impl Default for CacheConfig {
   fn default() -> Self {
      Self {
         sampling_rate: 10,
         prediction_threshold: 0.25,
         low_batch_threshold: 20,
         indexing_cache_max_bytes: u64::MAX,
         track_bytes_always: false,
      }
   }
}

impl CacheConfig {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_sampling_rate(mut self, rate: u64) -> Self {
      self.sampling_rate = rate;
      self
   }

   pub fn with_prediction_threshold(mut self, threshold: f64) -> Self {
      self.prediction_threshold = threshold;
      self
   }

   pub fn with_low_batch_threshold(mut self, threshold: usize) -> Self {
      self.low_batch_threshold = threshold;
      self
   }

   pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
      self.indexing_cache_max_bytes = max_bytes;
      self
   }

   pub fn with_track_bytes_always(mut self, always: bool) -> Self {
      self.track_bytes_always = always;
      self
   }
}
