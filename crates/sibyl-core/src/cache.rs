//! Answer-cache key derivation.
//!
//! The key is a stable 64-bit content hash of the normalized question.
//! Two distinct questions with identical normalized text share an entry by
//! design; hash collisions across different text are an accepted tradeoff.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Trim and case-fold a question for hashing and rule matching.
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

#[must_use]
fn hash64<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Cache key for a question's memoized answer.
pub fn cache_key(question: &str) -> String {
    format!("q:{:016x}", hash64(&normalize_question(question)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_folds_case_and_whitespace() {
        assert_eq!(normalize_question("  How MANY Orders?  "), "how many orders?");
    }

    #[test]
    fn test_key_is_stable_for_equivalent_questions() {
        assert_eq!(cache_key("how many orders"), cache_key("  HOW MANY ORDERS  "));
    }

    #[test]
    fn test_key_differs_for_different_questions() {
        assert_ne!(cache_key("how many orders"), cache_key("list customers"));
    }

    #[test]
    fn test_key_format() {
        let key = cache_key("x");
        assert!(key.starts_with("q:"));
        assert_eq!(key.len(), 2 + 16);
    }
}
