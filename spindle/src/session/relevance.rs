//! Relevance scoring for context items.
//!
//! Hybrid score per item: 0.7 × lexical overlap with the query (Jaccard on
//! lowercased word sets) + 0.3 × recency (linear decay to zero over 24
//! hours). Scores are written back and the batch is returned sorted in
//! non-increasing order.

use std::collections::HashSet;

use crate::mcp::epoch_seconds;

use super::ContextItem;

const LEXICAL_WEIGHT: f64 = 0.7;
const RECENCY_WEIGHT: f64 = 0.3;
const RECENCY_HORIZON_HOURS: f64 = 24.0;

/// Scores items against the query, in place, and sorts descending.
pub fn score_batch(items: &mut Vec<ContextItem>, query: &str) {
    let now = epoch_seconds();
    let query_words = word_set(query);

    for item in items.iter_mut() {
        let lexical = jaccard(&query_words, &word_set(&item.content_text()));
        let age_hours = (now - item.timestamp).max(0.0) / 3600.0;
        let recency = (1.0 - age_hours / RECENCY_HORIZON_HOURS).max(0.0);
        item.relevance_score = LEXICAL_WEIGHT * lexical + RECENCY_WEIGHT * recency;
    }

    items.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ContextKind;
    use serde_json::json;

    fn item(content: &str, age_secs: f64) -> ContextItem {
        let mut i = ContextItem::new(json!(content), ContextKind::ToolResult);
        i.timestamp = epoch_seconds() - age_secs;
        i
    }

    /// **Scenario**: Items come back sorted in non-increasing score order.
    #[test]
    fn sorted_non_increasing() {
        let mut items = vec![
            item("completely unrelated words here", 100_000.0),
            item("list the current directory", 1.0),
            item("directory listing output", 10.0),
        ];
        score_batch(&mut items, "list the current directory");
        for pair in items.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
        assert!(items[0].content_text().contains("list the current directory"));
    }

    /// **Scenario**: A fresh exact match scores near 1.0; stale unrelated
    /// content scores near 0.0.
    #[test]
    fn score_extremes() {
        let mut items = vec![item("find python files", 0.0)];
        score_batch(&mut items, "find python files");
        assert!(items[0].relevance_score > 0.95, "{}", items[0].relevance_score);

        let mut items = vec![item("zzz qqq", 48.0 * 3600.0)];
        score_batch(&mut items, "find python files");
        assert!(items[0].relevance_score < 0.05, "{}", items[0].relevance_score);
    }

    /// **Scenario**: Recency alone gives a stale exact match a lower score
    /// than a fresh one.
    #[test]
    fn recency_breaks_lexical_ties() {
        let mut items = vec![item("same words", 20.0 * 3600.0), item("same words", 0.0)];
        score_batch(&mut items, "same words");
        assert!(items[0].timestamp > items[1].timestamp);
    }

    /// **Scenario**: Empty query and empty content stay at zero lexical
    /// score without dividing by zero.
    #[test]
    fn empty_inputs_are_safe() {
        let mut items = vec![item("", 0.0)];
        score_batch(&mut items, "");
        assert!(items[0].relevance_score <= RECENCY_WEIGHT + f64::EPSILON);
    }
}
