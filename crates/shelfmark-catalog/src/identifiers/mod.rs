pub mod isbn;

use once_cell::sync::Lazy;
use regex::Regex;

static ISBN_LIKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9Xx\-]+$").unwrap());

/// Digits, `X` and hyphens only.
pub fn looks_like_isbn(token: &str) -> bool {
    ISBN_LIKE_RE.is_match(token)
}

/// Vendor ids carry a `B` (ASIN-style `B0…`).
pub fn looks_like_vendor_id(token: &str) -> bool {
    token.contains('B')
}
