//! Event-type pattern matching for subscription fan-out.
//!
//! Subscriptions carry a set of event-type strings; the literal `"*"`
//! subscribes to every event. All wildcard semantics live here so the rule
//! is testable in isolation.

/// Pattern that matches every event type.
pub const WILDCARD: &str = "*";

/// True when a subscription's patterns cover the given event type.
///
/// A pattern matches on exact string equality or when it is the wildcard.
pub fn matches(patterns: &[String], event_type: &str) -> bool {
    patterns.iter().any(|p| p == WILDCARD || p == event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        assert!(matches(&patterns(&["invoice.paid"]), "invoice.paid"));
    }

    #[test]
    fn test_no_match() {
        assert!(!matches(&patterns(&["invoice.paid"]), "member.created"));
    }

    #[test]
    fn test_wildcard_matches_everything() {
        assert!(matches(&patterns(&["*"]), "invoice.paid"));
        assert!(matches(&patterns(&["*"]), "member.created"));
        assert!(matches(&patterns(&["*"]), "anything.at.all"));
    }

    #[test]
    fn test_wildcard_among_other_patterns() {
        assert!(matches(
            &patterns(&["invoice.paid", "*"]),
            "ticket.opened"
        ));
    }

    #[test]
    fn test_empty_patterns_match_nothing() {
        assert!(!matches(&[], "invoice.paid"));
    }

    #[test]
    fn test_no_prefix_matching() {
        // Patterns are literal strings, not globs.
        assert!(!matches(&patterns(&["invoice.*"]), "invoice.paid"));
        assert!(!matches(&patterns(&["invoice"]), "invoice.paid"));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert!(!matches(&patterns(&["Invoice.Paid"]), "invoice.paid"));
    }
}
