//! Property tests for subject pattern matching

use proptest::prelude::*;
use types::subject::{matches, validate_pattern, validate_subject};

fn element() -> impl Strategy<Value = String> {
    "[A-Z0-9_-]{1,8}"
}

fn subject() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(element(), 1..8)
}

proptest! {
    #[test]
    fn subject_matches_itself(elements in subject()) {
        let subject = elements.join(".");
        prop_assert!(validate_subject(&subject).is_ok());
        prop_assert!(matches(&subject, &subject));
    }

    #[test]
    fn star_matches_any_single_element(elements in subject(), index in any::<prop::sample::Index>()) {
        let subject = elements.join(".");
        let mut pattern = elements.clone();
        pattern[index.index(elements.len())] = "*".to_string();
        let pattern = pattern.join(".");

        prop_assert!(validate_pattern(&pattern).is_ok());
        prop_assert!(matches(&subject, &pattern));
    }

    #[test]
    fn trailing_wildcards_match_prefixes(elements in subject(), keep in 0usize..8) {
        let subject = elements.join(".");
        let keep = keep.min(elements.len());
        let prefix = &elements[..keep];

        let plus = prefix.iter().cloned().chain(["+".to_string()]).collect::<Vec<_>>().join(".");
        prop_assert!(matches(&subject, &plus));

        let gt = prefix.iter().cloned().chain([">".to_string()]).collect::<Vec<_>>().join(".");
        prop_assert_eq!(matches(&subject, &gt), elements.len() > keep);
    }

    #[test]
    fn longer_pattern_never_matches(elements in subject(), extra in element()) {
        let subject = elements.join(".");
        let pattern = format!("{subject}.{extra}");
        prop_assert!(!matches(&subject, &pattern));
    }
}
