use std::sync::OnceLock;

use regex::Regex;

/// Characters a plate may contain.
pub const PLATE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";

/// Unformatted plate length that gets a separator (`LLLNNN` → `LLL-NNN`).
const UNFORMATTED_LEN: usize = 6;
const SEPARATOR_AT: usize = 3;

fn outside_alphabet() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Z0-9-]").expect("static regex"))
}

/// Uppercase, strip characters outside the plate alphabet, and insert the
/// regional separator.
///
/// Returns `None` when fewer than `min_len` characters survive.
pub fn clean_plate_text(raw: &str, min_len: usize) -> Option<String> {
    let upper = raw.to_uppercase();
    let cleaned = outside_alphabet().replace_all(&upper, "").into_owned();
    if cleaned.len() < min_len {
        return None;
    }
    if !cleaned.contains('-') && cleaned.len() == UNFORMATTED_LEN {
        return Some(format!(
            "{}-{}",
            &cleaned[..SEPARATOR_AT],
            &cleaned[SEPARATOR_AT..]
        ));
    }
    Some(cleaned)
}
