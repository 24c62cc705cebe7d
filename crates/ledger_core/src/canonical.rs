use serde_json::{Map, Value};

/// Canonical JSON bytes: object keys sorted, compact separators, UTF-8 with
/// Unicode preserved. Two structurally equal values always encode to the
/// same bytes, so digest comparison of encodings is content comparison.
///
/// Floats are passed through as serde_json renders them; float
/// canonicalization (NaN, -0.0) is domain policy pinned upstream, not here.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    let normalized = normalize(value);
    // Serialization of a tree we just rebuilt cannot fail.
    serde_json::to_vec(&normalized).expect("canonical value serializes")
}

/// Rebuild the value with every object's keys in sorted order. The default
/// `serde_json::Map` iterates sorted, but callers may hand us values built
/// by crates compiled with `preserve_order`; re-inserting key-by-key makes
/// the ordering explicit rather than a feature-flag accident.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), normalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}
