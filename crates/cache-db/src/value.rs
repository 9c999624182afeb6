use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single column value.
///
/// Mirrors the dynamic typing a relational driver hands back: integers come
/// in two widths because most chain-indexer schemas distinguish `int4`
/// counters from `int8`/`numeric` chain amounts, and `Json` carries whatever
/// composite payload a column's driver-value mapping decided belongs there
/// (structs, arrays, nested objects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
   Null,
   Int(i32),
   BigInt(i64),
   Float(f64),
   Bool(bool),
   Text(String),
   Bytes(Vec<u8>),
   Json(serde_json::Value),
}

impl Value {
   pub fn is_null(&self) -> bool {
      matches!(self, Value::Null)
   }
}

impl From<i32> for Value {
   fn from(v: i32) -> Self {
      Value::Int(v)
   }
}

impl From<i64> for Value {
   fn from(v: i64) -> Self {
      Value::BigInt(v)
   }
}

impl From<f64> for Value {
   fn from(v: f64) -> Self {
      Value::Float(v)
   }
}

impl From<bool> for Value {
   fn from(v: bool) -> Self {
      Value::Bool(v)
   }
}

impl From<String> for Value {
   fn from(v: String) -> Self {
      Value::Text(v)
   }
}

impl From<&str> for Value {
   fn from(v: &str) -> Self {
      Value::Text(v.to_string())
   }
}

/// A row is a column-name -> value mapping. `IndexMap` keeps columns in
/// insertion order, which is what the COPY codec needs when a row's values
/// were built to match the table's declared column order.
pub type Row = IndexMap<String, Value>;

/// Canonical cache key: the row's primary-key values, in PK-column order,
/// joined into a single string. Hex-looking components (`0x`-prefixed) are
/// lower-cased so two rows differing only in hex-digit case collide, per
/// the cache-key invariant in the data model.
pub fn cache_key(pk_columns: &[String], row: &Row) -> Option<String> {
   let mut parts = Vec::with_capacity(pk_columns.len());
   for col in pk_columns {
      let value = row.get(col)?;
      parts.push(canonical_string(value));
   }
   Some(parts.join("\u{1f}"))
}

/// Canonical string form of a value: stable under case-normalization for
/// hex-addressable components, used both for cache-key derivation and for
/// the profiler's event-graph value search.
pub fn canonical_string(value: &Value) -> String {
   let raw = match value {
      Value::Null => "\u{0}".to_string(),
      Value::Int(v) => v.to_string(),
      Value::BigInt(v) => v.to_string(),
      Value::Float(v) => v.to_string(),
      Value::Bool(v) => v.to_string(),
      Value::Text(v) => v.clone(),
      Value::Bytes(v) => format!("0x{}", hex::encode(v)),
      Value::Json(v) => v.to_string(),
   };
   if raw.starts_with("0x") || raw.starts_with("0X") {
      raw.to_ascii_lowercase()
   } else {
      raw
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn row(pairs: &[(&str, Value)]) -> Row {
      pairs
         .iter()
         .cloned()
         .map(|(k, v)| (k.to_string(), v))
         .collect()
   }

   #[test]
   fn cache_key_orders_by_pk_columns() {
      let r = row(&[
         ("b", Value::Int(2)),
         ("a", Value::Int(1)),
      ]);
      let key = cache_key(&["a".to_string(), "b".to_string()], &r).unwrap();
      assert_eq!(key, "1\u{1f}2");
   }

   #[test]
   fn cache_key_missing_pk_column_is_none() {
      let r = row(&[("a", Value::Int(1))]);
      assert!(cache_key(&["a".to_string(), "b".to_string()], &r).is_none());
   }

   #[test]
   fn cache_key_hex_case_normalizes() {
      let upper = row(&[("addr", Value::Bytes(vec![0xAB, 0xCD]))]);
      let key_upper = cache_key(&["addr".to_string()], &upper).unwrap();
      assert_eq!(key_upper, "0xabcd");
   }

   #[test]
   fn cache_key_text_hex_case_normalizes() {
      let a = row(&[("addr", Value::Text("0xABCDEF".to_string()))]);
      let b = row(&[("addr", Value::Text("0xabcdef".to_string()))]);
      let ka = cache_key(&["addr".to_string()], &a).unwrap();
      let kb = cache_key(&["addr".to_string()], &b).unwrap();
      assert_eq!(ka, kb);
   }
}
