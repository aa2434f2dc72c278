/*!
 * Search Engine Module for spicytodo
 *
 * Filtered views over the task store:
 * - status / free-text / priority / tag / category filters (conjunctive)
 * - default-listing snooze exclusion
 * - tag and category catalogs
 * - reminders due within the next 24 hours
 */

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{TaskStore, sort_tasks};
use crate::task_manager::{Priority, Task};

/// Completion filter. Unknown values fall back to `All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("active") => StatusFilter::Active,
            Some("completed") => StatusFilter::Completed,
            _ => StatusFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Active => "active",
            StatusFilter::Completed => "completed",
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        }
    }
}

/// Listing criteria as received from callers. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub priority: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Parsed form of a `TaskQuery`, built once per call.
struct CompiledQuery {
    status: StatusFilter,
    search: Option<String>,
    priority: Option<Result<Priority, String>>,
    tag: Option<String>,
    category: Option<String>,
}

impl CompiledQuery {
    fn compile(query: &TaskQuery) -> Self {
        Self {
            status: StatusFilter::parse_lenient(query.status.as_deref()),
            search: non_empty(query.search.as_deref()).map(str::to_lowercase),
            priority: non_empty(query.priority.as_deref()).map(str::parse::<Priority>),
            tag: trimmed(query.tag.as_deref()).map(String::from),
            category: trimmed(query.category.as_deref()).map(String::from),
        }
    }

    fn matches(&self, task: &Task) -> bool {
        if !self.status.matches(task) {
            return false;
        }
        if let Some(needle) = &self.search {
            if !task.text.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        match &self.priority {
            Some(Ok(priority)) if task.priority != *priority => return false,
            Some(Err(_)) => return false,
            _ => {}
        }
        if let Some(tag) = &self.tag {
            if !task.has_tag(tag) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if task.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Tags and categories are stored trimmed, so filters on them are too.
fn trimmed(value: Option<&str>) -> Option<&str> {
    non_empty(value.map(str::trim))
}

#[derive(Debug, Default)]
struct PerformanceStats {
    total_queries: u64,
    total_query_time_us: u64,
}

pub struct SearchEngine {
    store: Arc<TaskStore>,
    performance_stats: RwLock<PerformanceStats>,
}

impl SearchEngine {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            store,
            performance_stats: RwLock::new(PerformanceStats::default()),
        }
    }

    /// Default listing: matching tasks that are not currently snoozed.
    pub fn query(&self, query: &TaskQuery) -> Vec<Task> {
        let start_time = Instant::now();
        let compiled = CompiledQuery::compile(query);
        let now = self.store.now();

        let mut results: Vec<Task> = self.store.read(|tasks| {
            tasks
                .values()
                .filter(|task| !task.is_snoozed_at(now))
                .filter(|task| compiled.matches(task))
                .cloned()
                .collect()
        });
        sort_tasks(&mut results);

        let elapsed = start_time.elapsed();
        if let Ok(mut stats) = self.performance_stats.write() {
            stats.total_queries += 1;
            stats.total_query_time_us += elapsed.as_micros() as u64;
        }
        debug!(
            status = compiled.status.as_str(),
            matched = results.len(),
            "Query completed in {:?}",
            elapsed
        );
        results
    }

    /// Status-only view over the full catalog, snoozed tasks included.
    pub fn by_status(&self, status: StatusFilter) -> Vec<Task> {
        let mut results: Vec<Task> = self.store.read(|tasks| {
            tasks
                .values()
                .filter(|task| status.matches(task))
                .cloned()
                .collect()
        });
        sort_tasks(&mut results);
        results
    }

    pub fn all_tags(&self) -> Vec<String> {
        let tags: BTreeSet<String> = self.store.read(|tasks| {
            tasks
                .values()
                .flat_map(|task| task.tags.iter().cloned())
                .collect()
        });
        tags.into_iter().collect()
    }

    pub fn all_categories(&self) -> Vec<String> {
        let categories: BTreeSet<String> = self.store.read(|tasks| {
            tasks
                .values()
                .filter_map(|task| task.category.clone())
                .collect()
        });
        categories.into_iter().collect()
    }

    /// Open tasks whose reminder fires within the next 24 hours.
    pub fn upcoming_reminders(&self) -> Vec<Task> {
        let now = self.store.now();
        let horizon = now + Duration::hours(24);
        let mut results: Vec<Task> = self.store.read(|tasks| {
            tasks
                .values()
                .filter(|task| !task.completed)
                .filter(|task| match (task.due_date, task.reminder_time) {
                    (Some(due), Some(time)) => {
                        let fires_at = due.and_time(time).and_utc();
                        fires_at > now && fires_at < horizon
                    }
                    _ => false,
                })
                .cloned()
                .collect()
        });
        sort_tasks(&mut results);
        results
    }

    pub fn get_performance_stats(&self) -> serde_json::Value {
        let (total_queries, total_us) = self
            .performance_stats
            .read()
            .map(|stats| (stats.total_queries, stats.total_query_time_us))
            .unwrap_or_default();
        let avg_query_time_us = if total_queries > 0 {
            total_us as f64 / total_queries as f64
        } else {
            0.0
        };
        serde_json::json!({
            "total_queries": total_queries,
            "avg_query_time_us": avg_query_time_us,
            "indexed_tasks": self.store.len(),
            "reported_at": Utc::now().to_rfc3339(),
        })
    }
}
