//! Session checkpoint round-trip and relevance invariants through the
//! public API.

mod init_logging;

use serde_json::json;
use spindle::{ContextKind, SessionManager, Settings};
use tempfile::TempDir;

fn manager(dir: &TempDir, keep_top_n: usize) -> SessionManager {
    let mut settings = Settings::default();
    settings.checkpoint_dir = dir.path().join("checkpoints");
    settings.keep_top_n = keep_top_n;
    SessionManager::new("s6", settings)
}

/// **Scenario**: Add N items with distinct ids, checkpoint, clear,
/// restore: the item list matches by id set and preserved timestamps, and
/// a subsequent prune keeps at most keep_top_n items.
#[test]
fn checkpoint_round_trip_then_prune() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager(&dir, 4);

    for i in 0..8 {
        manager.add_context(json!(format!("observation number {}", i)), ContextKind::Observation);
    }
    let ids_before: Vec<String> = manager.items().iter().map(|i| i.id.clone()).collect();
    let stamps_before: Vec<f64> = manager.items().iter().map(|i| i.timestamp).collect();
    assert_eq!(
        ids_before.len(),
        ids_before.iter().collect::<std::collections::HashSet<_>>().len(),
        "ids are distinct"
    );

    manager.save_checkpoint("t1").unwrap();
    manager.clear();
    assert!(manager.is_empty());

    assert_eq!(manager.restore_checkpoint("t1").unwrap(), 8);
    let ids_after: Vec<String> = manager.items().iter().map(|i| i.id.clone()).collect();
    let stamps_after: Vec<f64> = manager.items().iter().map(|i| i.timestamp).collect();
    assert_eq!(ids_before, ids_after);
    assert_eq!(stamps_before, stamps_after);

    manager.prune_by_relevance("observation number 3");
    assert!(manager.len() <= 4);
}

/// **Scenario**: score ordering is non-increasing and compression keeps the
/// most relevant content.
#[test]
fn score_sorted_and_compressed() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager(&dir, 20);
    manager.add_context(json!("the disk usage report"), ContextKind::ToolResult);
    manager.add_context(json!("unrelated chatter about weather"), ContextKind::ToolResult);
    manager.add_context(json!("disk usage is at 80 percent"), ContextKind::ToolResult);

    let scored = manager.score("disk usage");
    for pair in scored.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }

    let compressed = manager.compressed_context("disk usage");
    if !compressed.is_empty() {
        assert!(compressed.contains("disk"), "{}", compressed);
    }
}

/// **Scenario**: Forked sessions checkpoint under their own session id.
#[test]
fn fork_checkpoints_independently() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager(&dir, 20);
    manager.add_context(json!("base item"), ContextKind::UserQuery);

    let mut forked = manager.fork("branch");
    forked.add_context(json!("branch item"), ContextKind::ToolResult);
    let path = forked.save_checkpoint("exp").unwrap();
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("branch_"));

    manager.save_checkpoint("exp").unwrap();
    let mut fresh = SessionManager::new("s6", {
        let mut s = Settings::default();
        s.checkpoint_dir = dir.path().join("checkpoints");
        s
    });
    fresh.restore_checkpoint("exp").unwrap();
    assert_eq!(fresh.len(), 1, "restored the parent session's checkpoint");
}
