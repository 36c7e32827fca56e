use chrono::Utc;

use crate::store::{Node, NodeId};

/// Current UTC date as `YYYY-MM-DD`.
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Trim, then collapse whitespace runs into a single `-`.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join("-")
}

/// `base` if free, else the first free `base-1`, `base-2`, ...
///
/// The node whose id equals `ignore_id` does not count as a collision.
pub fn unique_name(base: &str, nodes: &[Node], ignore_id: Option<&NodeId>) -> String {
    let taken = |candidate: &str| {
        nodes
            .iter()
            .any(|n| n.name == candidate && Some(&n.id) != ignore_id)
    };

    if !taken(base) {
        return base.to_string();
    }
    let mut suffix = 1u64;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Resolve an optional user-supplied name into its normalized base form.
pub fn base_name(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => normalize_name(name),
        None => today(),
    }
}
