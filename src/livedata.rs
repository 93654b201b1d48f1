use crate::{
    sync::recover,
    types::HashMap,
    value::{ComputationTargetType, ValueRequirement, ValueSpecification},
};
use std::sync::Mutex;

/// Source of point-in-time market data.
///
/// A provider is asked to `snapshot` a timestamp once per cycle, is then
/// queried for every distinct live data requirement at that timestamp, and is
/// told to release the snapshot when the cycle is torn down. `snapshot` and
/// `query_snapshot` may block.
pub trait SnapshotProvider<V>: Send + Sync {
    fn snapshot(&self, timestamp_millis: i64);
    fn query_snapshot(&self, timestamp_millis: i64, requirement: &ValueRequirement) -> Option<V>;
    fn release_snapshot(&self, timestamp_millis: i64);
}

/// Snapshot provider backed by an in-memory market.
///
/// `snapshot` freezes the market as it is at call time, so the market may keep
/// ticking (`set_value`/`remove_value`) while a cycle reads its snapshot.
#[derive(Debug)]
pub struct InMemorySnapshotProvider<V> {
    market: Mutex<HashMap<ValueRequirement, V>>,
    snapshots: Mutex<HashMap<i64, HashMap<ValueRequirement, V>>>,
}

impl<V> Default for InMemorySnapshotProvider<V> {
    fn default() -> Self {
        Self {
            market: Mutex::default(),
            snapshots: Mutex::default(),
        }
    }
}

impl<V: Clone> InMemorySnapshotProvider<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&self, requirement: ValueRequirement, value: V) {
        recover(self.market.lock()).insert(requirement, value);
    }

    pub fn remove_value(&self, requirement: &ValueRequirement) -> Option<V> {
        recover(self.market.lock()).remove(requirement)
    }

    /// Timestamps currently held as snapshots.
    pub fn snapshot_timestamps(&self) -> Vec<i64> {
        let mut timestamps: Vec<_> = recover(self.snapshots.lock()).keys().copied().collect();
        timestamps.sort_unstable();
        timestamps
    }
}

impl<V: Clone + Send + Sync> SnapshotProvider<V> for InMemorySnapshotProvider<V> {
    fn snapshot(&self, timestamp_millis: i64) {
        let frozen = recover(self.market.lock()).clone();
        recover(self.snapshots.lock()).insert(timestamp_millis, frozen);
    }

    fn query_snapshot(&self, timestamp_millis: i64, requirement: &ValueRequirement) -> Option<V> {
        recover(self.snapshots.lock())
            .get(&timestamp_millis)
            .and_then(|snapshot| snapshot.get(requirement))
            .cloned()
    }

    fn release_snapshot(&self, timestamp_millis: i64) {
        recover(self.snapshots.lock()).remove(&timestamp_millis);
    }
}

/// Formats specifications whose live data could not be loaded.
///
/// Each entry reads `[<value name> on <target type>:<identifier value>]`;
/// primitive targets also carry the identifier scheme after the type.
pub fn format_missing_live_data<'a>(
    missing: impl IntoIterator<Item = &'a ValueSpecification>,
) -> String {
    let mut out = String::new();
    for spec in missing {
        let target = spec.target();
        out.push_str(&format!("[{} on {}", spec.value_name(), target.target_type()));
        if target.target_type() == ComputationTargetType::Primitive {
            out.push('-');
            out.push_str(target.identifier().scheme());
        }
        out.push(':');
        out.push_str(target.identifier().value());
        out.push_str("] ");
    }
    out
}
