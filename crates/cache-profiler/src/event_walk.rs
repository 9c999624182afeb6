use cache_db::Value;

/// A uniform capability for walking an event object graph: visit named
/// fields, read a leaf value at a path.
///
/// This stands in for the reflective traversal a dynamically-typed source
/// would use to search an event payload for a primary-key value (spec §9).
/// `JsonEventWalk` is the one implementation this crate ships; indexed
/// chain events decode to JSON payloads in practice.
pub trait EventWalk {
   /// All leaf (non-object, non-array) values in the graph, each paired
   /// with the field-path that reaches it, in a fixed deterministic order.
   /// Pattern derivation relies on this order to break ties.
   fn leaves(&self) -> Vec<(Vec<String>, Value)>;

   /// Read the value at an explicit field path, if present and a leaf.
   fn get(&self, path: &[String]) -> Option<Value>;
}

/// `EventWalk` over a `serde_json::Value` payload.
pub struct JsonEventWalk<'a> {
   root: &'a serde_json::Value,
}

impl<'a> JsonEventWalk<'a> {
   pub fn new(root: &'a serde_json::Value) -> Self {
      Self { root }
   }
}

fn json_to_value(v: &serde_json::Value) -> Option<Value> {
   match v {
      serde_json::Value::Null => Some(Value::Null),
      serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
      serde_json::Value::String(s) => Some(Value::Text(s.clone())),
      serde_json::Value::Number(n) => {
         if let Some(i) = n.as_i64() {
            Some(Value::BigInt(i))
         } else {
            n.as_f64().map(Value::Float)
         }
      }
      serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
   }
}

fn walk_leaves(v: &serde_json::Value, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, Value)>) {
   match v {
      serde_json::Value::Object(map) => {
         for (k, child) in map {
            prefix.push(k.clone());
            walk_leaves(child, prefix, out);
            prefix.pop();
         }
      }
      serde_json::Value::Array(items) => {
         for (i, child) in items.iter().enumerate() {
            prefix.push(i.to_string());
            walk_leaves(child, prefix, out);
            prefix.pop();
         }
      }
      leaf => {
         if let Some(value) = json_to_value(leaf) {
            out.push((prefix.clone(), value));
         }
      }
   }
}

impl EventWalk for JsonEventWalk<'_> {
   fn leaves(&self) -> Vec<(Vec<String>, Value)> {
      let mut out = Vec::new();
      let mut prefix = Vec::new();
      walk_leaves(self.root, &mut prefix, &mut out);
      out
   }

   fn get(&self, path: &[String]) -> Option<Value> {
      let mut cursor = self.root;
      for segment in path {
         cursor = match cursor {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
         };
      }
      json_to_value(cursor)
   }
}
