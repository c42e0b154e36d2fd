//! Opaque, typed-prefix identifiers (`task-…`, `run-…`, `inst-…`, …).

/// Generate a new id with the given short prefix, e.g. `new_id("run")` -> `run-3fe1...`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Accounts and proxies use an underscore separator in the spec (`auth_…`, `proxy_…`).
pub fn new_id_underscore(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
