/*!
 * Statistics Module for spicytodo
 *
 * Aggregate counters over the whole catalog, computed in one pass under the
 * store's shared lock:
 * - completion counts and rate
 * - priority breakdown
 * - overdue / due today / upcoming buckets (open tasks only)
 */

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::store::TaskStore;
use crate::task_manager::{Priority, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl PriorityBreakdown {
    fn record(&mut self, priority: Priority) {
        match priority {
            Priority::High => self.high += 1,
            Priority::Medium => self.medium += 1,
            Priority::Low => self.low += 1,
        }
    }
}

/// Snapshot of the catalog at `generated_at`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatistics {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub completion_rate: f64,
    pub priority_breakdown: PriorityBreakdown,
    pub overdue_count: usize,
    pub due_today_count: usize,
    pub upcoming_count: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StatisticsConfig {
    /// Days after today counted as "upcoming".
    pub upcoming_window_days: u64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            upcoming_window_days: 7,
        }
    }
}

#[derive(Debug, Default)]
struct StatisticsPerformance {
    total_calculations: u64,
    avg_calculation_time_ms: f64,
}

pub struct StatisticsManager {
    store: Arc<TaskStore>,
    performance_stats: RwLock<StatisticsPerformance>,
    config: StatisticsConfig,
}

impl StatisticsManager {
    pub fn new(store: Arc<TaskStore>, config: Option<StatisticsConfig>) -> Self {
        Self {
            store,
            performance_stats: RwLock::new(StatisticsPerformance::default()),
            config: config.unwrap_or_default(),
        }
    }

    pub fn stats(&self) -> TaskStatistics {
        let start_time = std::time::Instant::now();
        let generated_at = self.store.now();
        let today = generated_at.date_naive();
        let horizon = today
            .checked_add_days(Days::new(self.config.upcoming_window_days))
            .unwrap_or(NaiveDate::MAX);

        let mut stats = TaskStatistics {
            total: 0,
            active: 0,
            completed: 0,
            completion_rate: 0.0,
            priority_breakdown: PriorityBreakdown::default(),
            overdue_count: 0,
            due_today_count: 0,
            upcoming_count: 0,
            generated_at,
        };

        self.store.for_each(|task| tally(&mut stats, task, today, horizon));

        if stats.total > 0 {
            let rate = stats.completed as f64 / stats.total as f64 * 100.0;
            stats.completion_rate = (rate * 100.0).round() / 100.0;
        }

        let elapsed = start_time.elapsed();
        self.record_calculation(elapsed.as_secs_f64() * 1000.0);
        debug!(total = stats.total, "Statistics calculated in {:?}", elapsed);
        stats
    }

    pub fn get_performance_metrics(&self) -> serde_json::Value {
        let (total, avg) = self
            .performance_stats
            .read()
            .map(|p| (p.total_calculations, p.avg_calculation_time_ms))
            .unwrap_or_default();
        serde_json::json!({
            "total_calculations": total,
            "avg_calculation_time_ms": avg,
            "upcoming_window_days": self.config.upcoming_window_days,
        })
    }

    fn record_calculation(&self, elapsed_ms: f64) {
        if let Ok(mut perf) = self.performance_stats.write() {
            let n = perf.total_calculations as f64;
            perf.avg_calculation_time_ms = (perf.avg_calculation_time_ms * n + elapsed_ms) / (n + 1.0);
            perf.total_calculations += 1;
        }
    }
}

fn tally(stats: &mut TaskStatistics, task: &Task, today: NaiveDate, horizon: NaiveDate) {
    stats.total += 1;
    stats.priority_breakdown.record(task.priority);

    if task.completed {
        stats.completed += 1;
        return;
    }
    stats.active += 1;

    if let Some(due) = task.due_date {
        if due < today {
            stats.overdue_count += 1;
        } else if due == today {
            stats.due_today_count += 1;
        } else if due <= horizon {
            stats.upcoming_count += 1;
        }
    }
}
