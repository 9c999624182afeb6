//! Fire-and-forget metrics emission (spec §6).
//!
//! One small function per observable event, grounded on vector's
//! `internal_events.rs` convention: call a function, emit a counter or
//! histogram through the `metrics` facade, never block on the result.

use std::time::Duration;

use metrics::{counter, histogram};

/// Outcome of a cache read against `table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
   Hit,
   Miss,
   Complete,
   Prefetch,
}

impl RequestKind {
   fn as_str(self) -> &'static str {
      match self {
         RequestKind::Hit => "hit",
         RequestKind::Miss => "miss",
         RequestKind::Complete => "complete",
         RequestKind::Prefetch => "prefetch",
      }
   }
}

/// Query methods timed by `record_duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMethod {
   Find,
   Flush,
   Load,
}

impl QueryMethod {
   fn as_str(self) -> &'static str {
      match self {
         QueryMethod::Find => "find",
         QueryMethod::Flush => "flush",
         QueryMethod::Load => "load",
      }
   }
}

pub fn record_request(table: &str, kind: RequestKind) {
   counter!("cache_requests_total", "table" => table.to_string(), "type" => kind.as_str()).increment(1);
}

pub fn record_duration(table: &str, method: QueryMethod, elapsed: Duration) {
   histogram!("cache_query_duration_seconds", "table" => table.to_string(), "method" => method.as_str())
      .record(elapsed.as_secs_f64());
}
