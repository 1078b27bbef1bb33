// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

//! The minimum PII detector set shared by the abstraction layer's `pii`
//! predicate (§4.4) and the contract monitor's `data_leak` family (§4.5).

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b").expect("valid phone regex")
});

/// Whether `text` contains an email address or a phone number.
pub fn contains_pii(text: &str) -> bool {
    EMAIL_RE.is_match(text) || PHONE_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_email() {
        assert!(contains_pii("contact jane.doe@example.com for details"));
    }

    #[test]
    fn detects_phone() {
        assert!(contains_pii("call 555-123-4567"));
    }

    #[test]
    fn plain_text_has_no_pii() {
        assert!(!contains_pii("the quick brown fox"));
    }
}
