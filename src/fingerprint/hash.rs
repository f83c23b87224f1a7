// src/fingerprint/hash.rs

use std::collections::BTreeMap;

use blake3::Hasher;

use crate::dag::TaskName;

/// Fingerprint of a task's own definition: its source text and parameters.
///
/// Parameters are hashed in key order, so declaration order of params does
/// not matter.
pub fn definition_fingerprint(source: &str, params: &BTreeMap<String, String>) -> String {
    let mut hasher = Hasher::new();
    update_field(&mut hasher, b"definition");
    update_field(&mut hasher, source.as_bytes());
    for (key, value) in params {
        update_field(&mut hasher, key.as_bytes());
        update_field(&mut hasher, value.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Fingerprint of a task including its ancestry.
///
/// `upstream` maps each direct upstream task to its own (already
/// transitive) fingerprint, so any change anywhere above a task changes
/// this value. The map is ordered by name, which keeps the result
/// independent of the order upstreams were declared in.
pub fn task_fingerprint(definition: &str, upstream: &BTreeMap<TaskName, String>) -> String {
    let mut hasher = Hasher::new();
    update_field(&mut hasher, b"task");
    update_field(&mut hasher, definition.as_bytes());
    for (name, fingerprint) in upstream {
        update_field(&mut hasher, name.as_bytes());
        update_field(&mut hasher, fingerprint.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Length-prefixed update so that field boundaries cannot be shifted
/// (`"ab" + "c"` and `"a" + "bc"` hash differently).
fn update_field(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Short file-system-safe key for a task name.
pub(crate) fn name_key(name: &str) -> String {
    let hash = blake3::hash(name.as_bytes()).to_hex();
    hash[..32].to_string()
}
