/// Driver-level wire type a column encodes to in a COPY payload.
///
/// This is the "column metadata for driver-value mapping" the cache is
/// allowed to know about a table (spec §3): enough to encode a `Value`
/// correctly, nothing about how the table got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverType {
   Int4,
   Int8,
   Float8,
   Bool,
   Text,
   Bytea,
   /// Composite values are encoded as JSON text (`json`/`jsonb` columns).
   Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
   pub name: String,
   pub driver_type: DriverType,
   /// True if the column has no default and an insert missing it is a user
   /// error (spec §7 "missing required column at insert"), rather than one
   /// `set`'s normalisation step can fill in.
   pub required: bool,
}

impl ColumnSchema {
   pub fn new(name: impl Into<String>, driver_type: DriverType) -> Self {
      Self {
         name: name.into(),
         driver_type,
         required: false,
      }
   }

   pub fn required(name: impl Into<String>, driver_type: DriverType) -> Self {
      Self {
         name: name.into(),
         driver_type,
         required: true,
      }
   }
}

/// An external table handle, treated opaquely by the cache except for its
/// primary-key column list and its column metadata (spec §3, §4.2).
///
/// Implementations are out of scope for this crate (schema/table
/// definitions live with the indexer's codegen); this trait is the seam the
/// cache calls through.
pub trait Table: Send + Sync {
   /// Schema-qualified table name, e.g. `"public.transfers"`.
   fn name(&self) -> &str;

   /// Primary-key column names, in declared order. Composite keys are
   /// ordered exactly as declared — the cache key is derived in this order.
   fn primary_key_columns(&self) -> &[String];

   /// All columns, in declared order. COPY encoding walks this order.
   fn columns(&self) -> &[ColumnSchema];

   fn column(&self, name: &str) -> Option<&ColumnSchema> {
      self.columns().iter().find(|c| c.name == name)
   }
}

/// A plain, data-only `Table` implementation for tests and for callers that
/// don't need a richer handle (e.g. one backed by generated schema code).
#[derive(Debug, Clone)]
pub struct StaticTable {
   pub name: String,
   pub primary_key_columns: Vec<String>,
   pub columns: Vec<ColumnSchema>,
}

impl Table for StaticTable {
   fn name(&self) -> &str {
      &self.name
   }

   fn primary_key_columns(&self) -> &[String] {
      &self.primary_key_columns
   }

   fn columns(&self) -> &[ColumnSchema] {
      &self.columns
   }
}
