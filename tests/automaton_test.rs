use std::collections::HashSet;

use chatpipe::moderation::{BannedWordAutomaton, BannedWordChecker};

fn automaton(words: &[&str]) -> BannedWordAutomaton {
    let set: HashSet<String> = words.iter().map(|w| w.to_string()).collect();
    BannedWordAutomaton::build(&set).unwrap()
}

#[test]
fn test_contains_iff_substring() {
    let words = ["spam", "scam", "rug pull"];
    let a = automaton(&words);

    let texts = [
        "perfectly fine message",
        "SPAM at the start",
        "ends with scam",
        "a rug pull mid-sentence",
        "sc am with a space is not a match",
        "spa m almost",
        "scampi contains scam as a substring",
    ];

    for text in texts {
        let expected = words
            .iter()
            .any(|w| text.to_lowercase().contains(&w.to_lowercase()));
        assert_eq!(
            a.contains(text),
            expected,
            "mismatch for text: {:?}",
            text
        );
    }
}

#[test]
fn test_match_across_concatenated_input() {
    let a = automaton(&["spam", "scam"]);
    let text = format!("{}{}", "this is not spa", "m here");
    assert!(a.contains(&text));
}

#[test]
fn test_empty_pattern_set_rejected() {
    assert!(BannedWordAutomaton::build(&HashSet::new()).is_err());
}

#[test]
fn test_case_normalization_of_patterns_and_text() {
    let a = automaton(&["BadWord"]);
    assert!(a.contains("that badword again"));
    assert!(a.contains("that BADWORD again"));
}

#[test]
fn test_find_matches_reports_positions() {
    let a = automaton(&["he", "she"]);
    let matches = a.find_matches("she said");

    // "she" ends at char 3, and "he" (its suffix) is reported there too
    let mut pairs: Vec<(String, usize)> = matches
        .into_iter()
        .map(|m| (m.pattern, m.end))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![("he".to_string(), 3), ("she".to_string(), 3)]
    );
}

#[test]
fn test_unicode_patterns() {
    let a = automaton(&["금칙어"]);
    assert!(a.contains("이 메시지에는 금칙어가 있다"));
    assert!(!a.contains("이 메시지는 깨끗하다"));
}

#[test]
fn test_checker_normalizes_and_filters() {
    let checker = BannedWordChecker::new(vec![
        "Spam".to_string(),
        "spam".to_string(),
        "   ".to_string(),
    ])
    .unwrap();

    // Duplicates collapse after lowercasing; blanks are dropped
    assert_eq!(checker.word_count(), 1);
    assert!(checker.contains_banned_word("sPaM"));
    assert!(!checker.contains_banned_word(""));
    assert!(!checker.contains_banned_word("   \t"));
}

#[test]
fn test_checker_debug_matches() {
    let checker =
        BannedWordChecker::new(vec!["spam".to_string(), "scam".to_string()]).unwrap();
    let matched = checker.matched_words("spam then scam");
    let names: Vec<&str> = matched.iter().map(|m| m.pattern.as_str()).collect();
    assert_eq!(names, ["spam", "scam"]);
}
