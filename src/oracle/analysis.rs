//! Deterministic interpretation of free-text oracle answers.
//!
//! The keyword lists and the score arithmetic are the observable contract of
//! the vision oracle; changing any of them silently moves pass/fail lines.

use super::types::{AnalysisResult, Severity};

/// Keywords marking a sentence as an issue
pub const ISSUE_KEYWORDS: [&str; 10] = [
    "missing",
    "broken",
    "error",
    "not visible",
    "overlapping",
    "misaligned",
    "not loading",
    "fail",
    "problem",
    "issue",
];

/// Keywords marking a sentence as a visual difference
pub const DIFFERENCE_KEYWORDS: [&str; 6] = ["different", "changed", "missing", "added", "moved", "shifted"];

/// Keywords that make an analysis invalid
pub const INVALID_KEYWORDS: [&str; 4] = ["error", "missing", "broken", "fail"];

/// Keywords in an issue that always fail a test
pub const CRITICAL_ISSUE_KEYWORDS: [&str; 4] = ["critical", "broken", "not loading", "major"];

/// Score deductions applied once per keyword present anywhere in the text
const PENALTIES: [(&str, i32); 4] = [("major", 20), ("critical", 30), ("broken", 25), ("not loading", 30)];

/// Score bonuses applied once per keyword present anywhere in the text
const BONUSES: [(&str, i32); 3] = [("excellent", 10), ("good", 5), ("professional", 5)];

/// Deduction per extracted issue
const ISSUE_PENALTY: i32 = 10;

/// Split text into trimmed sentences on `.`, `!` and `?`
pub fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Sentences containing any keyword (case-insensitive), deduplicated, in text order
pub fn extract_matching(text: &str, keywords: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for sentence in sentences(text) {
        let lower = sentence.to_lowercase();
        if keywords.iter().any(|k| lower.contains(k)) && !found.iter().any(|f| f == sentence) {
            found.push(sentence.to_string());
        }
    }
    found
}

pub fn extract_issues(text: &str) -> Vec<String> {
    extract_matching(text, &ISSUE_KEYWORDS)
}

pub fn extract_visual_differences(text: &str) -> Vec<String> {
    extract_matching(text, &DIFFERENCE_KEYWORDS)
}

/// 100, minus 10 per issue, minus keyword penalties, plus keyword bonuses, clamped to 0..=100
pub fn calculate_score(text: &str, issue_count: usize) -> u8 {
    let lower = text.to_lowercase();
    let mut score: i32 = 100;

    score -= ISSUE_PENALTY.saturating_mul(i32::try_from(issue_count).unwrap_or(i32::MAX));

    for (keyword, penalty) in PENALTIES {
        if lower.contains(keyword) {
            score -= penalty;
        }
    }
    for (keyword, bonus) in BONUSES {
        if lower.contains(keyword) {
            score += bonus;
        }
    }

    score.clamp(0, 100) as u8
}

pub fn is_valid(text: &str) -> bool {
    let lower = text.to_lowercase();
    !INVALID_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// First matching tier wins: critical, high, medium, low
pub fn severity(text: &str) -> Severity {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["critical", "broken"]) {
        Severity::Critical
    } else if has(&["high", "significant"]) {
        Severity::High
    } else if has(&["medium", "noticeable"]) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Whether any issue mentions a keyword that fails a test outright
pub fn has_critical_issue(issues: &[String]) -> bool {
    issues.iter().any(|issue| {
        let lower = issue.to_lowercase();
        CRITICAL_ISSUE_KEYWORDS.iter().any(|k| lower.contains(k))
    })
}

/// Full single-image interpretation of an oracle answer
pub fn analyze_text(text: &str) -> AnalysisResult {
    let issues = extract_issues(text);
    let score = calculate_score(text, issues.len());
    AnalysisResult {
        is_valid: is_valid(text),
        analysis_text: text.to_string(),
        issues,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concrete_scenario() {
        let text = "The navigation bar is missing. Layout looks broken in the footer.";
        let result = analyze_text(text);
        assert_eq!(
            result.issues,
            vec!["The navigation bar is missing", "Layout looks broken in the footer"]
        );
        assert_eq!(result.score, 55);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_issue_extraction_dedups_and_trims() {
        let text = "  There is a problem here!  There is a problem here? All good.";
        assert_eq!(extract_issues(text), vec!["There is a problem here"]);
    }

    #[test]
    fn test_issue_extraction_is_case_insensitive() {
        assert_eq!(extract_issues("NOT LOADING at all."), vec!["NOT LOADING at all"]);
        assert!(extract_issues("Everything renders.").is_empty());
    }

    #[test]
    fn test_sentence_matching_multiple_keywords_counts_once() {
        // "error" and "issue" in one sentence
        let issues = extract_issues("An error issue occurred. Fine otherwise.");
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_visual_differences() {
        let text = "The logo moved left. Colors are the same. A banner was added!";
        assert_eq!(
            extract_visual_differences(text),
            vec!["The logo moved left", "A banner was added"]
        );
    }

    #[test]
    fn test_score_bonuses_and_clamp() {
        assert_eq!(calculate_score("Excellent, good and professional.", 0), 100);
        assert_eq!(calculate_score("good", 1), 95);
        assert_eq!(
            calculate_score("critical major broken not loading", 4),
            0
        );
    }

    #[test]
    fn test_score_is_monotonic_in_issues() {
        let base = "The hero image renders well.";
        let more = "The hero image renders well. The footer has a problem.";
        let a = analyze_text(base);
        let b = analyze_text(more);
        assert!(b.issues.len() > a.issues.len());
        assert!(b.score <= a.score);
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid("Everything looks excellent."));
        assert!(!is_valid("Test FAILED."));
        assert!(!is_valid("an Error was shown"));
    }

    #[test]
    fn test_severity_first_match_wins() {
        assert_eq!(severity("noticeable shift, critical failure"), Severity::Critical);
        assert_eq!(severity("a significant change"), Severity::High);
        assert_eq!(severity("noticeable but minor"), Severity::Medium);
        assert_eq!(severity("identical"), Severity::Low);
        assert_eq!(severity("the menu is broken"), Severity::Critical);
    }

    #[test]
    fn test_has_critical_issue() {
        assert!(has_critical_issue(&["Major layout shift".to_string()]));
        assert!(!has_critical_issue(&["Minor problem".to_string()]));
        assert!(!has_critical_issue(&[]));
    }
}
