use cache_db::{Row, Value, canonical_string};

use crate::event_walk::EventWalk;

/// A value-transform hint applied between an event leaf value and the
/// primary-key value it is suspected to reconstruct (spec §4.4: "including
/// any value-transform hints registered out of band").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
   Identity,
   LowerHex,
}

impl Transform {
   /// Transforms registered for derivation search, tried in this order.
   pub const CANDIDATES: &'static [Transform] = &[Transform::Identity, Transform::LowerHex];

   fn apply(self, value: &Value) -> Value {
      match (self, value) {
         (Transform::LowerHex, Value::Text(s)) => Value::Text(s.to_ascii_lowercase()),
         _ => value.clone(),
      }
   }
}

/// Delimiters tried when searching for a delimited (multi-field composite)
/// pattern. A small, fixed set keeps the search deterministic and bounded.
const DELIMITER_CANDIDATES: &[&str] = &["-", ":", "_", ""];

/// The recipe for reconstructing a single primary-key column's value from
/// an event object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnPattern {
   /// A single field path, with an optional value transform.
   Derived {
      path: Vec<String>,
      transform: Transform,
   },
   /// Multiple field paths whose values, joined by `delimiter`, reconstruct
   /// the column (composite keys formed from multiple event fields).
   Delimited {
      paths: Vec<Vec<String>>,
      delimiter: String,
   },
}

impl ColumnPattern {
   fn recover(&self, walker: &dyn EventWalk) -> Option<Value> {
      match self {
         ColumnPattern::Derived { path, transform } => {
            let raw = walker.get(path)?;
            Some(transform.apply(&raw))
         }
         ColumnPattern::Delimited { paths, delimiter } => {
            let mut parts = Vec::with_capacity(paths.len());
            for path in paths {
               let v = walker.get(path)?;
               parts.push(canonical_string(&v));
            }
            Some(Value::Text(parts.join(delimiter)))
         }
      }
   }
}

/// A recipe for reconstructing a row's full primary-key from an event
/// object: one `ColumnPattern` per PK column, sorted by column name so
/// equal patterns hash and compare equal regardless of discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfilePattern {
   columns: Vec<(String, ColumnPattern)>,
}

impl ProfilePattern {
   /// Search `walker` for field paths that reconstruct every PK column of
   /// `target`. Returns `None` if any column cannot be reconstructed — a
   /// pattern must fully reconstruct the key or it is discarded (spec §4.4).
   pub fn derive(pk_columns: &[String], target: &Row, walker: &dyn EventWalk) -> Option<Self> {
      let leaves = walker.leaves();
      let mut columns = Vec::with_capacity(pk_columns.len());

      for pk_column in pk_columns {
         let target_value = target.get(pk_column)?;
         let target_str = canonical_string(target_value);
         let column_pattern =
            derive_single(&leaves, &target_str).or_else(|| derive_delimited(&leaves, &target_str))?;
         columns.push((pk_column.clone(), column_pattern));
      }

      columns.sort_by(|a, b| a.0.cmp(&b.0));
      Some(Self { columns })
   }

   /// Reconstruct the primary-key row by applying this pattern to a fresh
   /// event. Returns `None` if any column's recipe fails against this
   /// particular event (e.g. the field is absent).
   pub fn recover(&self, walker: &dyn EventWalk) -> Option<Row> {
      let mut row = Row::new();
      for (column, pattern) in &self.columns {
         row.insert(column.clone(), pattern.recover(walker)?);
      }
      Some(row)
   }
}

fn derive_single(leaves: &[(Vec<String>, Value)], target_str: &str) -> Option<ColumnPattern> {
   for (path, leaf_value) in leaves {
      for &transform in Transform::CANDIDATES {
         if canonical_string(&transform.apply(leaf_value)) == target_str {
            return Some(ColumnPattern::Derived {
               path: path.clone(),
               transform,
            });
         }
      }
   }
   None
}

fn derive_delimited(leaves: &[(Vec<String>, Value)], target_str: &str) -> Option<ColumnPattern> {
   for (i, (path_a, value_a)) in leaves.iter().enumerate() {
      for (path_b, value_b) in leaves.iter().skip(i + 1) {
         let str_a = canonical_string(value_a);
         let str_b = canonical_string(value_b);
         for delimiter in DELIMITER_CANDIDATES {
            if format!("{str_a}{delimiter}{str_b}") == target_str {
               return Some(ColumnPattern::Delimited {
                  paths: vec![path_a.clone(), path_b.clone()],
                  delimiter: delimiter.to_string(),
               });
            }
            if format!("{str_b}{delimiter}{str_a}") == target_str {
               return Some(ColumnPattern::Delimited {
                  paths: vec![path_b.clone(), path_a.clone()],
                  delimiter: delimiter.to_string(),
               });
            }
         }
      }
   }
   None
}
