/*!
 * Deduplication, prioritisation and chunking of batch entries.
 *
 * Keys sharing the same source text are collapsed into one `TextUnit` so the
 * text is translated once and the result fanned out. Units are scored so short,
 * frequently reused texts go first, then split into dispatch batches.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::app_config::{ChunkLimits, PriorityWeights};

/// Characters that usually belong to format placeholders
const SPECIAL_CHARS: [char; 4] = ['%', '{', '}', '\\'];

/// One caller-supplied entry: a unique key and the text to translate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub key: String,
    pub text: String,
}

impl BatchEntry {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// A unique source text and every key that shares it
#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    /// Source text
    pub text: String,
    /// Keys receiving the outcome, in input order
    pub keys: Vec<String>,
    /// Dispatch priority, higher goes first
    pub priority: i64,
}

impl TextUnit {
    /// Number of keys sharing this text
    pub fn usage_count(&self) -> usize {
        self.keys.len()
    }

    /// Length of the text in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Collapse entries with identical text into units
///
/// Units keep first-seen order. When a key appears more than once, its last
/// entry wins and earlier ones are ignored.
pub fn deduplicate(entries: &[BatchEntry]) -> Vec<TextUnit> {
    let mut last_index: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        last_index.insert(entry.key.as_str(), index);
    }

    let mut units: Vec<TextUnit> = Vec::new();
    let mut unit_by_text: HashMap<&str, usize> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        if last_index.get(entry.key.as_str()) != Some(&index) {
            continue;
        }

        match unit_by_text.get(entry.text.as_str()) {
            Some(&unit_index) => units[unit_index].keys.push(entry.key.clone()),
            None => {
                unit_by_text.insert(entry.text.as_str(), units.len());
                units.push(TextUnit {
                    text: entry.text.clone(),
                    keys: vec![entry.key.clone()],
                    priority: 0,
                });
            }
        }
    }

    units
}

/// Compute the dispatch priority of a text
///
/// `usage_count * usage_weight + short_text_bonus - special_char_penalty - length / 100`
pub fn priority_score(text: &str, usage_count: usize, weights: &PriorityWeights) -> i64 {
    let length = text.chars().count();

    let short_text_bonus = if length < 50 {
        weights.short_bonus
    } else if length < 200 {
        weights.medium_bonus
    } else {
        0
    };

    let special_char_penalty = text.chars().filter(|c| SPECIAL_CHARS.contains(c)).count() as i64;

    usage_count as i64 * weights.usage_weight + short_text_bonus
        - special_char_penalty
        - (length / 100) as i64
}

/// Score units and order them highest priority first
///
/// The sort is stable, so equal scores keep their input order.
pub fn prioritize(mut units: Vec<TextUnit>, weights: &PriorityWeights) -> Vec<TextUnit> {
    for unit in &mut units {
        unit.priority = priority_score(&unit.text, unit.usage_count(), weights);
    }
    units.sort_by(|a, b| b.priority.cmp(&a.priority));
    units
}

/// Split ordered units into dispatch batches
///
/// A new batch starts when the item count would exceed `2 * max_concurrent`,
/// or when adding a large item would push the batch over the character
/// budget, so large items do not cluster together.
pub fn chunk(units: Vec<TextUnit>, max_concurrent: usize, limits: &ChunkLimits) -> Vec<Vec<TextUnit>> {
    let max_items = (2 * max_concurrent).max(1);
    let mut batches = Vec::new();
    let mut current: Vec<TextUnit> = Vec::new();
    let mut current_chars = 0;

    for unit in units {
        let length = unit.char_len();
        let too_many = current.len() + 1 > max_items;
        let too_large =
            current_chars + length > limits.max_batch_chars && length >= limits.large_item_chars;

        if !current.is_empty() && (too_many || too_large) {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        current_chars += length;
        current.push(unit);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
