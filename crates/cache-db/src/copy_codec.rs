use crate::table::{DriverType, Table};
use crate::value::{Row, Value};

/// Encode a batch of rows into a single COPY-format text blob.
///
/// Pure and stateless: it consults only the table's declared column order
/// and driver-type metadata, never the cache. Rows are newline-separated,
/// columns tab-separated, with no trailing newline. A column absent from a
/// row (or holding `Value::Null`) encodes as `\N`.
pub fn encode_copy_text(table: &dyn Table, rows: &[Row]) -> String {
   let columns = table.columns();
   let mut out = String::new();

   for (i, row) in rows.iter().enumerate() {
      if i > 0 {
         out.push('\n');
      }
      for (j, col) in columns.iter().enumerate() {
         if j > 0 {
            out.push('\t');
         }
         match row.get(&col.name) {
            None | Some(Value::Null) => out.push_str("\\N"),
            Some(value) => out.push_str(&escape_field(&driver_text(value, col.driver_type))),
         }
      }
   }

   out
}

/// Render a `Value` the way the column's driver type would render it for a
/// textual COPY stream (e.g. big integers as plain decimal, composite
/// values as JSON text).
fn driver_text(value: &Value, driver_type: DriverType) -> String {
   match (value, driver_type) {
      (Value::Null, _) => String::new(),
      (Value::Int(v), _) => v.to_string(),
      (Value::BigInt(v), _) => v.to_string(),
      (Value::Float(v), _) => v.to_string(),
      (Value::Bool(v), _) => {
         if *v { "t".to_string() } else { "f".to_string() }
      }
      (Value::Text(v), _) => v.clone(),
      // Postgres's bytea hex external representation is one backslash + `x`
      // + hex digits; `escape_field` below is what doubles that backslash
      // for the COPY stream, so this must emit it singly.
      (Value::Bytes(v), _) => format!("\\x{}", hex_digits(v)),
      (Value::Json(v), _) => v.to_string(),
   }
}

fn hex_digits(bytes: &[u8]) -> String {
   let mut out = String::with_capacity(bytes.len() * 2);
   for b in bytes {
      out.push_str(&format!("{:02x}", b));
   }
   out
}

/// Backslash-escape the characters COPY text format requires escaped:
/// backslash itself, backspace, form-feed, newline, carriage-return, tab,
/// and vertical-tab.
fn escape_field(s: &str) -> String {
   let mut out = String::with_capacity(s.len());
   for c in s.chars() {
      match c {
         '\\' => out.push_str("\\\\"),
         '\u{8}' => out.push_str("\\b"),
         '\u{c}' => out.push_str("\\f"),
         '\n' => out.push_str("\\n"),
         '\r' => out.push_str("\\r"),
         '\t' => out.push_str("\\t"),
         '\u{b}' => out.push_str("\\v"),
         other => out.push(other),
      }
   }
   out
}
