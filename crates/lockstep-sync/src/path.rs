//! Deterministic mapping from (prefix, id) to coordination-store key paths.
//!
//! Lock and election paths live in disjoint namespaces under the configured
//! prefix. Ids are escaped injectively, so distinct ids never collide and an
//! id containing `/` cannot nest below another id's path.

/// Escape an id for use as a single path segment.
///
/// `%` becomes `%25` and `/` becomes `%2F`. Escaping `%` first keeps the
/// mapping injective: no two distinct ids produce the same segment.
fn escape_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            c => out.push(c),
        }
    }
    out
}

/// Path of the mutex backing a named lock.
pub fn lock_path(prefix: &str, id: &str) -> String {
    format!("{}/locks/{}", prefix.trim_end_matches('/'), escape_id(id))
}

/// Path of the election backing a named leadership group.
pub fn election_path(prefix: &str, id: &str) -> String {
    format!("{}/elections/{}", prefix.trim_end_matches('/'), escape_id(id))
}
