/// Canonical form used for exact mapping lookups: ASCII-uppercased with
/// everything except letters and digits removed, so "ab-100", "AB 100"
/// and "AB.100" all address the same learned mapping.
pub fn normalize_sku(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
