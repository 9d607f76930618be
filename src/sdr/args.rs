//! Key-value parameter-string glue.
//!
//! The host graph hands us a flat `key=value,key=value` string. The only key
//! this backend cares about is `args`, whose value is the inner device
//! connection string wrapped in brackets, e.g. `args=[dev0=/dev/sdr0]`.

use std::collections::HashMap;

/// Split `key=value,key=value` into a dictionary. Entries without `=` and
/// empty entries are skipped.
pub fn params_to_dict(params: &str) -> HashMap<String, String> {
    let mut dict = HashMap::new();

    for pair in params.split(',') {
        let mut kv = pair.splitn(2, '=');
        let key = match kv.next() {
            Some(k) if !k.trim().is_empty() => k.trim(),
            _ => continue,
        };
        if let Some(value) = kv.next() {
            dict.insert(key.to_string(), value.trim().to_string());
        }
    }

    dict
}

/// Extract the device connection string from the dictionary, stripping the
/// brackets of an `args=[...]` value.
pub fn device_args(dict: &HashMap<String, String>) -> String {
    match dict.get("args") {
        Some(v) if !v.is_empty() => {
            let v = v.strip_prefix('[').unwrap_or(v);
            match v.rfind(']') {
                Some(idx) => v[..idx].to_string(),
                None => v.to_string(),
            }
        }
        _ => String::new(),
    }
}
