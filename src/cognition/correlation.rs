//! Action correlation
//!
//! Lessons, goals and plan steps are tied to executed actions by a soft
//! textual match, not by reference. Every comparison goes through here.

/// Case-insensitive substring match in either direction
///
/// An empty side never correlates.
pub fn actions_correlate(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// True if `action` correlates with any of `candidates`
pub fn correlates_with_any<S: AsRef<str>>(action: &str, candidates: &[S]) -> bool {
    candidates.iter().any(|c| actions_correlate(action, c.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_case_insensitive() {
        assert!(actions_correlate("Eat Food", "eat food"));
    }

    #[test]
    fn test_substring_either_direction() {
        assert!(actions_correlate("eat food at the restaurant", "eat food"));
        assert!(actions_correlate("eat", "eat food"));
    }

    #[test]
    fn test_unrelated() {
        assert!(!actions_correlate("wait", "walk to store"));
    }

    #[test]
    fn test_empty_never_matches() {
        assert!(!actions_correlate("", "eat"));
        assert!(!actions_correlate("eat", "   "));
    }

    #[test]
    fn test_any() {
        let recs = vec!["go to restaurant".to_string(), "find food".to_string()];
        assert!(correlates_with_any("find food", &recs));
        assert!(!correlates_with_any("sleep", &recs));
        assert!(!correlates_with_any::<String>("sleep", &[]));
    }
}
