//! Ordering of instances and threads for display.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::beans::ThreadingBean;
use crate::connection::AttributeSource;
use crate::error::ConnectionError;
use crate::metrics::{InstanceRow, MetricsSnapshot, TrackedVm};

/// Anything that carries a metrics snapshot can be ranked.
pub trait HasMetrics {
    fn snapshot(&self) -> &MetricsSnapshot;
}

impl HasMetrics for MetricsSnapshot {
    fn snapshot(&self) -> &MetricsSnapshot {
        self
    }
}

impl HasMetrics for InstanceRow {
    fn snapshot(&self) -> &MetricsSnapshot {
        &self.metrics
    }
}

impl HasMetrics for TrackedVm {
    fn snapshot(&self) -> &MetricsSnapshot {
        self.metrics()
    }
}

/// Ascending by heap used. Stable.
pub fn sort_by_heap_used<T: HasMetrics>(items: &mut [T]) {
    items.sort_by_key(|item| item.snapshot().heap.used);
}

/// Descending by CPU load. Stable.
pub fn sort_by_cpu_load<T: HasMetrics>(items: &mut [T]) {
    items.sort_by(|a, b| b.snapshot().cpu_load.total_cmp(&a.snapshot().cpu_load));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "cpu_load")]
    Cpu,
    #[serde(alias = "heap_used")]
    Heap,
}

impl SortOrder {
    pub fn sort<T: HasMetrics>(self, items: &mut [T]) {
        match self {
            SortOrder::Cpu => sort_by_cpu_load(items),
            SortOrder::Heap => sort_by_heap_used(items),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Cpu => write!(f, "cpu"),
            SortOrder::Heap => write!(f, "heap"),
        }
    }
}

/// Thread id to cumulative CPU time in nanoseconds.
pub type ThreadCpuTimes = BTreeMap<i64, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadRanking {
    /// (thread id, CPU time delta), highest delta first.
    pub entries: Vec<(i64, i64)>,
    /// Set when a limit is active and the cycle saw at least that many threads.
    pub truncated: bool,
}

/// Ranks threads by CPU time spent since the previous cycle.
///
/// Threads not present in `previous` are skipped; they get ranked from the
/// next cycle on.
pub fn rank_threads(
    previous: &ThreadCpuTimes,
    current: &ThreadCpuTimes,
    limit: Option<usize>,
) -> ThreadRanking {
    let mut entries: Vec<(i64, i64)> = current
        .iter()
        .filter_map(|(tid, now)| previous.get(tid).map(|before| (*tid, now - before)))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let mut truncated = false;
    if let Some(limit) = limit {
        entries.truncate(limit);
        truncated = current.len() >= limit;
    }
    ThreadRanking { entries, truncated }
}

/// One line of the thread table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadRow {
    pub tid: i64,
    pub name: String,
    pub state: String,
    /// Share of the last cycle spent on CPU, in percent.
    pub cpu_percent: f64,
    /// Share of the process CPU time used by this thread, in percent.
    pub total_cpu_percent: f64,
    pub blocked_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ThreadReport {
    pub rows: Vec<ThreadRow>,
    pub truncated: bool,
    /// False if the runtime cannot measure per-thread CPU time.
    pub cpu_time_supported: bool,
}

pub fn cycle_cpu_percent(delta_thread_ns: i64, delta_uptime_ms: i64) -> f64 {
    if delta_uptime_ms == 0 {
        return 0.0;
    }
    delta_thread_ns as f64 / 1_000_000.0 / delta_uptime_ms as f64 * 100.0
}

pub fn lifetime_cpu_percent(thread_ns: i64, process_ns: i64) -> f64 {
    if process_ns == 0 {
        return 0.0;
    }
    thread_ns as f64 / process_ns as f64 * 100.0
}

/// Keeps the per-thread CPU times of the previous cycle.
#[derive(Debug, Default)]
pub struct ThreadTracker {
    retained: ThreadCpuTimes,
}

impl ThreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ranks `current` against the retained map, then retains `current`.
    pub fn rank(&mut self, current: ThreadCpuTimes, limit: Option<usize>) -> ThreadRanking {
        let ranking = rank_threads(&self.retained, &current, limit);
        self.retained = current;
        ranking
    }

    /// Reads all thread CPU times from `source` and builds the thread table.
    pub fn sample<S: AttributeSource + ?Sized>(
        &mut self,
        source: &mut S,
        limit: Option<usize>,
        delta_uptime_ms: i64,
        process_cpu_ns: i64,
    ) -> Result<ThreadReport, ConnectionError> {
        if !source.is_thread_cpu_time_supported()? {
            return Ok(ThreadReport::default());
        }

        let mut current = ThreadCpuTimes::new();
        for tid in source.all_thread_ids()? {
            current.insert(tid, source.thread_cpu_time(tid)?);
        }
        let totals = current.clone();
        let ranking = self.rank(current, limit);

        let mut rows = Vec::with_capacity(ranking.entries.len());
        for (tid, delta) in ranking.entries {
            let Some(info) = source.thread_info(tid)? else {
                continue;
            };
            let total = totals.get(&tid).copied().unwrap_or_default();
            rows.push(ThreadRow {
                tid,
                name: info.thread_name,
                state: info.thread_state,
                cpu_percent: cycle_cpu_percent(delta, delta_uptime_ms),
                total_cpu_percent: lifetime_cpu_percent(total, process_cpu_ns),
                blocked_by: (info.lock_owner_id >= 0).then_some(info.lock_owner_id),
            });
        }

        Ok(ThreadReport {
            rows,
            truncated: ranking.truncated,
            cpu_time_supported: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(pairs: &[(i64, i64)]) -> ThreadCpuTimes {
        pairs.iter().copied().collect()
    }

    fn snapshot(heap_used: i64, cpu_load: f64) -> MetricsSnapshot {
        let mut m = MetricsSnapshot::default();
        m.heap.used = heap_used;
        m.cpu_load = cpu_load;
        m
    }

    // -------------------------------------------------------------------------
    // Tests for instance ordering
    // -------------------------------------------------------------------------

    #[test]
    fn test_sort_by_heap_used_ascending() {
        let mut items = vec![snapshot(30, 0.0), snapshot(10, 0.0), snapshot(20, 0.0)];
        sort_by_heap_used(&mut items);
        let heaps: Vec<i64> = items.iter().map(|m| m.heap.used).collect();
        assert_eq!(heaps, vec![10, 20, 30]);
    }

    #[test]
    fn test_sort_by_cpu_load_descending_and_stable() {
        let mut items = vec![
            snapshot(1, 0.1),
            snapshot(2, 0.5),
            snapshot(3, 0.1),
            snapshot(4, 0.9),
        ];
        SortOrder::Cpu.sort(&mut items);
        let order: Vec<i64> = items.iter().map(|m| m.heap.used).collect();
        assert_eq!(order, vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_sort_order_from_config_text() {
        let order: SortOrder = serde_yaml::from_str("heap").unwrap();
        assert_eq!(order, SortOrder::Heap);
        let order: SortOrder = serde_yaml::from_str("cpu_load").unwrap();
        assert_eq!(order, SortOrder::Cpu);
    }

    // -------------------------------------------------------------------------
    // Tests for thread ranking
    // -------------------------------------------------------------------------

    #[test]
    fn test_rank_threads_skips_first_seen() {
        let previous = times(&[(1, 100), (2, 200)]);
        let current = times(&[(1, 150), (2, 205), (3, 10)]);

        let ranking = rank_threads(&previous, &current, None);
        assert_eq!(ranking.entries, vec![(1, 50), (2, 5)]);
        assert!(!ranking.truncated);
    }

    #[test]
    fn test_rank_threads_with_limit() {
        let previous = times(&[(1, 100), (2, 200)]);
        let current = times(&[(1, 150), (2, 205), (3, 10)]);

        let ranking = rank_threads(&previous, &current, Some(1));
        assert_eq!(ranking.entries, vec![(1, 50)]);
        assert!(ranking.truncated);
    }

    #[test]
    fn test_limit_not_reached() {
        let previous = times(&[(1, 100)]);
        let current = times(&[(1, 110)]);
        let ranking = rank_threads(&previous, &current, Some(5));
        assert_eq!(ranking.entries.len(), 1);
        assert!(!ranking.truncated);
    }

    #[test]
    fn test_tracker_retains_full_current_map() {
        let mut tracker = ThreadTracker::new();
        assert!(tracker.rank(times(&[(1, 100), (2, 200)]), None).entries.is_empty());
        tracker.rank(times(&[(1, 150), (2, 205), (3, 10)]), None);

        // Thread 3 was first seen last cycle and is ranked now.
        let ranking = tracker.rank(times(&[(1, 150), (2, 305), (3, 40)]), None);
        assert_eq!(ranking.entries, vec![(2, 100), (3, 30), (1, 0)]);
    }

    #[test]
    fn test_cpu_percentages() {
        // 500ms of thread CPU during a 1000ms cycle.
        assert_eq!(cycle_cpu_percent(500_000_000, 1000), 50.0);
        assert_eq!(cycle_cpu_percent(500_000_000, 0), 0.0);
        assert_eq!(lifetime_cpu_percent(25, 100), 25.0);
        assert_eq!(lifetime_cpu_percent(25, 0), 0.0);
    }
}
