use crate::{
    events::{
        Event,
        EventKind,
    },
    snapshot::Snapshot,
};
use std::sync::{
    Arc,
    Mutex,
};


/// Cross-player statistics shown at a match or game boundary. Content is
/// fixed at creation from the snapshot that accompanied the triggering merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub seq: u64,
    pub title: String,
    pub details: Vec<String>,
}

/// Scan a merge's newly appended events, oldest first, and build a summary
/// for the first match or game boundary found. Later boundary events in the
/// same batch stay in the log but do not spawn their own summary.
pub fn derive_summary(snapshot: &Snapshot, new_events: &[Event]) -> Option<Summary> {
    let trigger = new_events
        .iter()
        .find(|event| event.kind.is_summary_boundary())?;
    let title = match &trigger.kind {
        EventKind::GameEnd(_) => "Final Summary".to_string(),
        _ => format!("Match {} Summary", snapshot.match_number),
    };
    let name_at = |index: Option<usize>| {
        index
            .and_then(|index| snapshot.players.get(index))
            .map(|player| player.name.clone())
            .unwrap_or_else(|| "-".to_string())
    };
    let mut details = vec!["Scores:".to_string()];
    details.extend(
        snapshot
            .players
            .iter()
            .map(|player| format!("{}: {}", player.name, player.total_score)),
    );
    details.push(format!(
        "Greediest (avg bank): {}",
        name_at(max_index_by(snapshot, |stats| stats.avg_voluntary_bank)),
    ));
    details.push(format!(
        "Greediest (patience): {}",
        name_at(max_index_by(snapshot, |stats| {
            stats.avg_rolls_elapsed_before_bank
        })),
    ));
    details.push(format!(
        "Most ones rolled: {}",
        name_at(max_index_by(snapshot, |stats| f64::from(stats.ones_rolled))),
    ));
    details.push(format!(
        "Most points missed: {}",
        name_at(max_index_by(snapshot, |stats| stats.missed_points as f64)),
    ));
    Some(Summary {
        seq: trigger.seq,
        title,
        details,
    })
}

// Ties break toward the earliest player in snapshot order.
fn max_index_by<F>(snapshot: &Snapshot, key: F) -> Option<usize>
where
    F: Fn(&crate::snapshot::PlayerStats) -> f64,
{
    let mut best: Option<(usize, f64)> = None;
    for (index, stats) in snapshot.stats.iter().enumerate() {
        let value = key(stats);
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Holds at most one summary awaiting acknowledgment. Publishing over a
/// pending summary hands the displaced one back so it is never lost silently.
#[derive(Clone, Default)]
pub struct SummarySlot {
    inner: Arc<Mutex<Option<Summary>>>,
}

impl SummarySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, summary: Summary) -> Option<Summary> {
        let mut guard = self.inner.lock().unwrap();
        let displaced = guard.replace(summary);
        if let Some(previous) = &displaced {
            tracing::warn!(
                displaced_seq = previous.seq,
                "summary replaced before it was dismissed"
            );
        }
        displaced
    }

    pub fn pending(&self) -> Option<Summary> {
        self.inner.lock().unwrap().clone()
    }

    /// Acknowledge the summary keyed by `seq`. A stale acknowledgment leaves
    /// a newer pending summary in place.
    pub fn dismiss(&self, seq: u64) -> bool {
        let mut guard = self.inner.lock().unwrap();
        match &*guard {
            Some(pending) if pending.seq == seq => {
                *guard = None;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap() = None;
    }
}
