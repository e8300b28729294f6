//! Patient-name normalization for session search.
//!
//! Reception staff type names with whatever spacing the patient used on
//! intake — half-width space, full-width space (U+3000), or none — so name
//! search compares both the raw text and a normalized form.

/// Normalize a name for comparison: drop all Unicode whitespace (including
/// the full-width space) and fold full-width ASCII letters and digits to
/// their half-width equivalents.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(fold_width)
        .collect()
}

/// A candidate name matches when either the raw text or the normalized form
/// contains the (correspondingly treated) query.
pub fn name_matches(candidate: &str, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    candidate.contains(query) || normalize_name(candidate).contains(&normalize_name(query))
}

/// Map the full-width ASCII block (U+FF01..=U+FF5E) onto plain ASCII.
fn fold_width(c: char) -> char {
    match c {
        '\u{FF01}'..='\u{FF5E}' => {
            char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
        }
        _ => c,
    }
}
