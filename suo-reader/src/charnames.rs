//! Named character literals (spec §6: `#\space`, `#\nl`, or any single
//! character).
//!
//! Spec §9 flags a bug in the original `boot_read_char_symbol`: it compared
//! the scanned name against one table while indexing a different one. The
//! intended behaviour, reproduced here, is a straight linear scan of the
//! name table that stops at a terminating sentinel — not index arithmetic
//! between two differently-sized tables.

const NAMED_CHARS: &[(&str, char)] = &[("space", ' '), ("nl", '\n')];

/// Resolve a scanned character-literal name to its character, or `None` if
/// it names nothing recognised.
pub fn resolve(name: &str) -> Option<char> {
    let mut chars = name.chars();
    if let (Some(only), None) = (chars.next(), chars.next()) {
        return Some(only);
    }
    for &(candidate, ch) in NAMED_CHARS {
        if candidate == name {
            return Some(ch);
        }
    }
    None
}
