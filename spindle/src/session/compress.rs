//! Context compression: scored items → one bounded text block.
//!
//! High-relevance items (score > 0.7) appear verbatim (top five), medium
//! items (0.3–0.7) as one-liners (top three), low items are dropped. The
//! `max_tokens` budget is advisory: rendering stops early when the rough
//! token estimate is exceeded, but no mid-item truncation happens.

use super::ContextItem;

const HIGH_THRESHOLD: f64 = 0.7;
const MEDIUM_THRESHOLD: f64 = 0.3;
const HIGH_LIMIT: usize = 5;
const MEDIUM_LIMIT: usize = 3;

/// Renders scored items into a compressed context block.
///
/// Items must already carry relevance scores (see
/// [`score_batch`](super::relevance::score_batch)).
pub fn compress(items: &[ContextItem], max_tokens: usize) -> String {
    let budget_chars = max_tokens.saturating_mul(4);
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    let high: Vec<&ContextItem> = items
        .iter()
        .filter(|i| i.relevance_score > HIGH_THRESHOLD)
        .take(HIGH_LIMIT)
        .collect();
    if !high.is_empty() {
        parts.push("=== HIGH RELEVANCE CONTEXT ===".to_string());
        for item in high {
            let line = format!("{}: {}", item.kind.as_str(), item.content_text());
            used += line.len();
            parts.push(line);
            if used > budget_chars {
                break;
            }
        }
    }

    let medium: Vec<&ContextItem> = items
        .iter()
        .filter(|i| (MEDIUM_THRESHOLD..=HIGH_THRESHOLD).contains(&i.relevance_score))
        .take(MEDIUM_LIMIT)
        .collect();
    if !medium.is_empty() && used <= budget_chars {
        parts.push("\n=== RELATED CONTEXT ===".to_string());
        for item in medium {
            parts.push(format!("- {}", item.kind.as_str()));
        }
    }

    parts.join("\n")
}
