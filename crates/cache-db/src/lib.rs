//! Row, table and query-builder interfaces for the indexing row cache.
//!
//! This crate defines the boundary between the cache and the things it
//! treats as external collaborators (spec §6): a table's schema-qualified
//! name and column metadata, and the abstract `QueryBuilder` operations the
//! cache drives. The cache itself lives in the `indexing-cache` crate.
//!
//! A reference `Postgres`-backed `QueryBuilder` (behind the `postgres`
//! feature) is included for integration tests and as a worked example of
//! how a dialect adapter fulfills the trait.

pub mod copy_codec;
pub mod error;
#[cfg(feature = "postgres")]
pub mod pg;
pub mod query_builder;
pub mod table;
pub mod value;

pub use copy_codec::encode_copy_text;
pub use error::{Error, Result};
#[cfg(feature = "postgres")]
pub use pg::PgQueryBuilder;
pub use query_builder::{PrimaryKey, QueryBuilder};
pub use table::{ColumnSchema, DriverType, StaticTable, Table};
pub use value::{Row, Value, cache_key, canonical_string};
