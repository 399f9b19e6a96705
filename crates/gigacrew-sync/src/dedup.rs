use gigacrew_types::ChainEvent;
use std::collections::HashSet;

/// Keeps the most recent event per entity.
///
/// Recency is the event's chain position, not its place in `events`, so
/// logs returned out of order are handled. Survivors come back oldest first.
pub fn dedup_latest(mut events: Vec<ChainEvent>) -> Vec<ChainEvent> {
	events.sort_by(|a, b| b.position.cmp(&a.position));

	let mut seen = HashSet::new();
	events.retain(|e| seen.insert(e.event.entity_key()));
	events.reverse();
	events
}
