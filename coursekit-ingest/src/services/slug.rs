//! Slug derivation
//!
//! A slug is lower-case ASCII alphanumerics separated by single hyphens, with
//! no leading or trailing hyphen.

use std::collections::HashSet;

/// Derive a slug from `text`, returning `fallback` when nothing survives
///
/// Every maximal run of characters outside `[a-z0-9]` (after lower-casing)
/// becomes one hyphen.
pub fn slugify(text: &str, fallback: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// `base` for attempt 0, `base-N` for attempt N
pub fn with_suffix(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, attempt)
    }
}

/// Tracks slugs already used among siblings under one parent
#[derive(Debug, Default)]
pub struct SiblingSlugs {
    taken: HashSet<String>,
}

impl SiblingSlugs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `base`, or the first free `base-N`
    pub fn claim(&mut self, base: &str) -> String {
        let mut attempt = 0;
        loop {
            let candidate = with_suffix(base, attempt);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            attempt += 1;
        }
    }
}
