//! Storage key encoding.
//!
//! A key is the JSON encoding of `[tag, ...values]` without the surrounding
//! brackets and with a trailing comma, e.g. `"pKeySet",1,"a",`. The trailing
//! comma makes every encoded prefix end on a value boundary, so the prefix
//! for `[1]` never matches keys that start with `[10]`.

use alloc::string::String;
use trellis_core::Value;

/// Encodes a tag followed by values.
pub fn encode(tag: &str, values: &[Value]) -> String {
    let mut key = String::new();
    push_json(&mut key, &serde_json::Value::String(String::from(tag)));
    for value in values {
        push_json(&mut key, &value.to_json());
    }
    key
}

fn push_json(key: &mut String, value: &serde_json::Value) {
    use core::fmt::Write;
    // Writing into a String cannot fail.
    let _ = write!(key, "{},", value);
}
