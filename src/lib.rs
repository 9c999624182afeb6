//! A write-back, predictive, per-table row cache sitting between
//! blockchain event-indexer handlers and a relational store reached
//! through a [`cache_db::QueryBuilder`].
//!
//! Handlers read and write through [`Cache`] without awaiting the
//! database on the common path; [`Cache::flush`] persists buffered writes
//! in bulk, and [`Cache::prefetch`] uses a learned access profile to warm
//! the cache ahead of the events likely to need it.

mod cache;
mod config;
mod error;
mod event;
mod flush;
mod metrics;
mod prefetch;
mod table_cache;

pub use cache::Cache;
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use event::EventContext;
pub use metrics::{QueryMethod, RequestKind};
pub use table_cache::{BufferEntry, TableCache, estimate_row_bytes};

pub use cache_db::{ColumnSchema, DriverType, PrimaryKey, QueryBuilder, Row, StaticTable, Table, Value, cache_key};
pub use cache_profiler::{ColumnPattern, EventWalk, JsonEventWalk, ProfilePattern, Profiler, Transform};
