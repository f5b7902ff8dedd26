/*!
 * Tests for deduplication, prioritisation and chunking
 */

use lingoflow::app_config::{ChunkLimits, PriorityWeights};
use lingoflow::translation::dedup::{chunk, deduplicate, prioritize, priority_score};

use crate::common;

#[test]
fn test_deduplicate_withSharedTexts_shouldCoverEveryKeyOnce() {
    let entries = common::entries(&[
        ("menu.save", "Save"),
        ("dialog.save", "Save"),
        ("menu.open", "Open"),
        ("toolbar.save", "Save"),
        ("menu.quit", "Quit"),
    ]);

    let units = deduplicate(&entries);
    assert_eq!(units.len(), 3);

    let mut keys: Vec<_> = units.iter().flat_map(|u| u.keys.iter().cloned()).collect();
    keys.sort();
    let mut expected: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
    expected.sort();
    assert_eq!(keys, expected);

    assert_eq!(units[0].usage_count(), 3);
}

#[test]
fn test_deduplicate_withEmptyText_shouldStillProduceUnit() {
    let units = deduplicate(&common::entries(&[("blank", ""), ("also.blank", "")]));
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].keys, vec!["blank", "also.blank"]);
}

#[test]
fn test_priority_score_withCustomWeights_shouldUseThem() {
    let weights = PriorityWeights {
        usage_weight: 1,
        short_bonus: 100,
        medium_bonus: 50,
    };
    assert_eq!(priority_score("Hi", 3, &weights), 3 + 100);
    assert_eq!(priority_score(&"m".repeat(60), 1, &weights), 1 + 50);
}

#[test]
fn test_prioritize_withEqualScores_shouldKeepInputOrder() {
    let units = deduplicate(&common::entries(&[("a", "One"), ("b", "Two"), ("c", "Six")]));
    let ordered = prioritize(units, &PriorityWeights::default());
    let texts: Vec<_> = ordered.iter().map(|u| u.text.as_str()).collect();
    assert_eq!(texts, vec!["One", "Two", "Six"]);
}

#[test]
fn test_chunk_shouldNeverExceedItemCapOrDropUnits() {
    let pairs: Vec<(String, String)> = (0..37).map(|i| (format!("k{i}"), format!("text {i}"))).collect();
    let borrowed: Vec<(&str, &str)> = pairs.iter().map(|(k, t)| (k.as_str(), t.as_str())).collect();
    let units = deduplicate(&common::entries(&borrowed));

    let batches = chunk(units, 3, &ChunkLimits::default());
    assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 6));
    assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 37);
}

#[test]
fn test_chunk_withSmallItemsOverBudget_shouldKeepThemTogether() {
    let limits = ChunkLimits {
        max_batch_chars: 10,
        large_item_chars: 500,
    };
    let units = deduplicate(&common::entries(&[("a", "twelve chars"), ("b", "another twelve")]));

    // Only large items start a new batch when the budget is exceeded
    let batches = chunk(units, 4, &limits);
    assert_eq!(batches.len(), 1);
}
