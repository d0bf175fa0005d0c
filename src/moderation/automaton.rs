//! Multi-pattern matching automaton for banned-word screening
//!
//! Lookup cost is linear in the scanned text and independent of the size of
//! the word list, which is what makes this viable on the message hot path
//! with word lists of hundreds of entries.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{ChatPipeError, Result};

const ROOT: usize = 0;

/// A single trie node, addressed by index into the automaton's arena.
struct Node {
    children: HashMap<char, usize>,
    /// Longest proper suffix of this node's path that is also a trie path.
    /// The root's failure link is the root itself.
    fail: usize,
    /// Indices of every pattern ending at this node, own plus those
    /// inherited from the failure node.
    outputs: Vec<usize>,
}

impl Node {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            fail: ROOT,
            outputs: Vec::new(),
        }
    }
}

/// A pattern matched during a debug scan, with the character position
/// (exclusive end offset) at which it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub pattern: String,
    pub end: usize,
}

/// Immutable multi-pattern matcher built once from a banned-word set.
///
/// Nodes live in an index arena rather than behind owning pointers; the
/// failure links would otherwise form reference cycles. Read-only after
/// construction and safe to share across any number of concurrent lookups.
pub struct BannedWordAutomaton {
    nodes: Vec<Node>,
    patterns: Vec<String>,
}

impl BannedWordAutomaton {
    /// Build the automaton from a set of patterns.
    ///
    /// Patterns are lowercased before insertion. Fails with `ConfigError`
    /// on an empty set; this is the only failure in the automaton's life,
    /// scanning itself never fails.
    pub fn build(patterns: &HashSet<String>) -> Result<Self> {
        if patterns.is_empty() {
            return Err(ChatPipeError::ConfigError(
                "banned word pattern set must not be empty".to_string(),
            ));
        }

        let mut automaton = Self {
            nodes: vec![Node::new()],
            patterns: Vec::with_capacity(patterns.len()),
        };

        for pattern in patterns {
            automaton.insert(&pattern.to_lowercase());
        }

        automaton.build_failure_links();
        Ok(automaton)
    }

    /// Trie insertion; records the pattern index at its terminal node.
    fn insert(&mut self, pattern: &str) {
        let mut node = ROOT;
        for c in pattern.chars() {
            node = match self.nodes[node].children.get(&c).copied() {
                Some(next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::new());
                    self.nodes[node].children.insert(c, next);
                    next
                }
            };
        }
        let index = self.patterns.len();
        self.patterns.push(pattern.to_string());
        self.nodes[node].outputs.push(index);
    }

    /// Failure-link construction: an explicit queue-driven breadth-first
    /// pass over node indices, starting from the root's direct children.
    fn build_failure_links(&mut self) {
        let mut queue = VecDeque::new();

        for (_, &child) in self.nodes[ROOT].children.iter() {
            queue.push_back(child);
        }

        while let Some(current) = queue.pop_front() {
            let transitions: Vec<(char, usize)> = self.nodes[current]
                .children
                .iter()
                .map(|(&c, &child)| (c, child))
                .collect();

            for (c, child) in transitions {
                // Walk the failure chain until a node with a `c` transition
                // exists or the root is reached.
                let mut candidate = self.nodes[current].fail;
                while candidate != ROOT && !self.nodes[candidate].children.contains_key(&c) {
                    candidate = self.nodes[candidate].fail;
                }

                let fail = match self.nodes[candidate].children.get(&c) {
                    Some(&target) => target,
                    None => ROOT,
                };

                self.nodes[child].fail = fail;

                // Inherit the failure node's outputs so a match at any
                // suffix surfaces without chasing links during the scan.
                let inherited = self.nodes[fail].outputs.clone();
                self.nodes[child].outputs.extend(inherited);

                queue.push_back(child);
            }
        }
    }

    /// Advance the scan cursor by one character.
    fn step(&self, state: usize, c: char) -> usize {
        let mut state = state;
        while state != ROOT && !self.nodes[state].children.contains_key(&c) {
            state = self.nodes[state].fail;
        }
        match self.nodes[state].children.get(&c) {
            Some(&next) => next,
            None => ROOT,
        }
    }

    /// Whether any pattern occurs as a contiguous substring of `text`.
    ///
    /// Case-normalizes the input, then scans once left to right and
    /// short-circuits on the first hit; the identity of the match is not
    /// resolved for this boolean form.
    pub fn contains(&self, text: &str) -> bool {
        let mut state = ROOT;
        for c in text.to_lowercase().chars() {
            state = self.step(state, c);
            if !self.nodes[state].outputs.is_empty() {
                return true;
            }
        }
        false
    }

    /// Debug variant of [`contains`](Self::contains): reports every matched
    /// pattern with its end position instead of short-circuiting.
    pub fn find_matches(&self, text: &str) -> Vec<PatternMatch> {
        let mut matches = Vec::new();
        let mut state = ROOT;
        for (i, c) in text.to_lowercase().chars().enumerate() {
            state = self.step(state, c);
            for &pattern in &self.nodes[state].outputs {
                matches.push(PatternMatch {
                    pattern: self.patterns[pattern].clone(),
                    end: i + 1,
                });
            }
        }
        matches
    }

    /// Number of patterns the automaton was built from.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn automaton(words: &[&str]) -> BannedWordAutomaton {
        let set: HashSet<String> = words.iter().map(|w| w.to_string()).collect();
        BannedWordAutomaton::build(&set).unwrap()
    }

    #[test]
    fn test_empty_pattern_set_is_config_error() {
        let result = BannedWordAutomaton::build(&HashSet::new());
        assert!(matches!(result, Err(ChatPipeError::ConfigError(_))));
    }

    #[test]
    fn test_contains_basic_substrings() {
        let a = automaton(&["spam", "scam"]);
        assert!(a.contains("this is spam"));
        assert!(a.contains("SCAM alert"));
        assert!(!a.contains("wholesome message"));
        assert!(!a.contains(""));
    }

    #[test]
    fn test_match_spanning_failure_links() {
        // "sca" fails into nothing, but "scam" inside "sscam" must still hit
        let a = automaton(&["spam", "scam"]);
        let text = format!("{}{}", "this is not spa", "m here");
        assert!(a.contains(&text));
        assert!(a.contains("sscam"));
    }

    #[test]
    fn test_overlapping_patterns_all_reported() {
        let a = automaton(&["he", "she", "hers"]);
        let matches = a.find_matches("shers");
        let found: Vec<&str> = matches.iter().map(|m| m.pattern.as_str()).collect();
        assert!(found.contains(&"she"));
        assert!(found.contains(&"he"));
        assert!(found.contains(&"hers"));
    }

    #[test]
    fn test_match_positions() {
        let a = automaton(&["ab"]);
        let matches = a.find_matches("xxabyyab");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].end, 4);
        assert_eq!(matches[1].end, 8);
    }

    #[test]
    fn test_output_sets_superset_of_failure_outputs() {
        // Every node's output set must contain its failure node's outputs.
        let a = automaton(&["he", "she", "his", "hers", "spam", "scam"]);
        for node in &a.nodes {
            let outputs: HashSet<usize> = node.outputs.iter().copied().collect();
            let inherited: HashSet<usize> =
                a.nodes[node.fail].outputs.iter().copied().collect();
            assert!(outputs.is_superset(&inherited));
        }
    }

    #[test]
    fn test_failure_links_acyclic_except_root() {
        // Following failure links from any node must reach the root without
        // revisiting a node.
        let a = automaton(&["he", "she", "his", "hers"]);
        for start in 0..a.nodes.len() {
            let mut seen = HashSet::new();
            let mut state = start;
            while state != ROOT {
                assert!(seen.insert(state));
                state = a.nodes[state].fail;
            }
        }
    }
}
