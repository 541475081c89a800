//! Topic-exchange binding semantics.
//!
//! Routing keys are dot-separated words (`order.created`). A binding pattern
//! matches a routing key word by word, where:
//!
//! - `*` matches exactly one word
//! - `#` matches zero or more words
//! - any other word matches itself
//!
//! Every [`EventBus`](crate::EventBus) implementation routes with these rules,
//! whether it evaluates them directly (in-memory bus) or translates them into
//! broker-native subscriptions (regex topic subscriptions on Kafka).

/// Whether `routing_key` is delivered to a queue bound with `pattern`.
#[must_use]
pub fn binding_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| words_match(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && words_match(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && words_match(rest, &key[1..]),
    }
}

/// Whether the pattern contains a wildcard word.
#[must_use]
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.split('.').any(|word| word == "*" || word == "#")
}

/// Translate a binding pattern under `prefix` into an anchored regex over
/// `{prefix}.{routing_key}` names.
///
/// ```
/// use fulfillment_core::routing::binding_regex;
///
/// assert_eq!(binding_regex("events", "order.*"), r"^events\.order\.[^.]+$");
/// assert_eq!(binding_regex("events", "#"), r"^events(\.[^.]+)*$");
/// ```
#[must_use]
pub fn binding_regex(prefix: &str, pattern: &str) -> String {
    let mut regex = String::from("^");
    regex.push_str(&escape(prefix));
    for word in pattern.split('.') {
        match word {
            "#" => regex.push_str(r"(\.[^.]+)*"),
            "*" => regex.push_str(r"\.[^.]+"),
            literal => {
                regex.push_str(r"\.");
                regex.push_str(&escape(literal));
            }
        }
    }
    regex.push('$');
    regex
}

fn escape(word: &str) -> String {
    word.replace('.', r"\.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exact_key_matches_only_itself() {
        assert!(binding_matches("order.created", "order.created"));
        assert!(!binding_matches("order.created", "order.created.v2"));
        assert!(!binding_matches("order.created", "delivery.updated"));
    }

    #[test]
    fn star_matches_exactly_one_word() {
        assert!(binding_matches("order.*", "order.created"));
        assert!(!binding_matches("order.*", "order"));
        assert!(!binding_matches("order.*", "order.created.v2"));
    }

    #[test]
    fn hash_matches_zero_or_more_words() {
        assert!(binding_matches("#", "delivery.updated"));
        assert!(binding_matches("order.#", "order"));
        assert!(binding_matches("order.#", "order.created.v2"));
        assert!(binding_matches("#.updated", "delivery.updated"));
        assert!(!binding_matches("#.updated", "order.created"));
    }

    #[test]
    fn wildcard_detection() {
        assert!(is_wildcard("order.*"));
        assert!(is_wildcard("#"));
        assert!(!is_wildcard("order.created"));
    }

    #[test]
    fn literal_binding_regex_escapes_dots() {
        assert_eq!(
            binding_regex("events", "delivery.updated"),
            r"^events\.delivery\.updated$"
        );
    }

    proptest! {
        #[test]
        fn hash_binding_matches_every_key(words in proptest::collection::vec("[a-z]{1,8}", 1..5)) {
            let key = words.join(".");
            prop_assert!(binding_matches("#", &key));
            prop_assert!(binding_matches(&key, &key));
        }
    }
}
