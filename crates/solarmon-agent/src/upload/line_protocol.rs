//! InfluxDB line protocol encoding.

use std::fmt::Write;

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escapes a measurement name.
pub fn escape_measurement(name: &str) -> String {
    escape(name, &[',', ' '])
}

/// Escapes a tag key, tag value or field key.
pub fn escape_key(key: &str) -> String {
    escape(key, &[',', '=', ' '])
}

/// Encodes one point.
///
/// Non-finite field values cannot be represented and are dropped; a point
/// left without fields encodes to `None`.
pub fn point(
    measurement: &str,
    tags: &[(&str, &str)],
    fields: &[(&str, f64)],
    timestamp_ns: i64,
) -> Option<String> {
    let fields: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.is_finite())
        .map(|(key, value)| format!("{}={:?}", escape_key(key), value))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = escape_measurement(measurement);
    for (key, value) in tags {
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }
    let _ = write!(line, " {} {}", fields.join(","), timestamp_ns);
    Some(line)
}
