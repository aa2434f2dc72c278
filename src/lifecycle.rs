/*!
 * Lifecycle Module for spicytodo
 *
 * State transitions that go beyond a plain field update:
 * - completion toggling with recurrence regeneration
 * - snoozing and unsnoozing
 * - bulk operations over a list of ids
 * - clearing completed tasks
 *
 * Every operation here runs as a single store transaction.
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TodoError, TodoResult};
use crate::store::{StoreTxn, TaskStore};
use crate::task_manager::{Priority, Task};
use crate::validation::{TaskFields, ValidationError, ValidationErrors, parse_priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperation {
    Delete,
    Complete,
    Uncomplete,
    UpdatePriority,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Delete => "delete",
            BulkOperation::Complete => "complete",
            BulkOperation::Uncomplete => "uncomplete",
            BulkOperation::UpdatePriority => "updatePriority",
        }
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkOperation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(BulkOperation::Delete),
            "complete" => Ok(BulkOperation::Complete),
            "uncomplete" => Ok(BulkOperation::Uncomplete),
            "updatePriority" | "update_priority" => Ok(BulkOperation::UpdatePriority),
            other => Err(ValidationError::new(
                "invalid_operation",
                "operation",
                format!(
                    "Invalid operation '{}'. Must be one of: delete, complete, uncomplete, updatePriority",
                    other
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkData {
    pub priority: Option<String>,
}

/// Bulk descriptor as received from callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub ids: Vec<String>,
    pub operation: String,
    #[serde(default)]
    pub data: Option<BulkData>,
}

impl BulkRequest {
    pub fn new<I, S>(ids: I, operation: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            operation: operation.into(),
            data: None,
        }
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.data = Some(BulkData {
            priority: Some(priority.into()),
        });
        self
    }

    /// Checks the operation name and its payload without touching the store.
    fn plan(&self) -> Result<(BulkOperation, Option<Priority>), ValidationErrors> {
        let operation = self
            .operation
            .parse::<BulkOperation>()
            .map_err(ValidationErrors::single)?;
        if operation != BulkOperation::UpdatePriority {
            return Ok((operation, None));
        }
        let raw = self.data.as_ref().and_then(|d| d.priority.as_deref());
        match raw {
            Some(raw) => parse_priority(raw)
                .map(|priority| (operation, Some(priority)))
                .map_err(ValidationErrors::single),
            None => Err(ValidationErrors::single(ValidationError::new(
                "priority_required",
                "data.priority",
                "updatePriority requires data.priority",
            ))),
        }
    }
}

pub struct LifecycleEngine {
    store: Arc<TaskStore>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    /// Flips completion. Completing a recurring task with a due date also
    /// creates its next occurrence in the same transaction.
    pub fn toggle(&self, id: &str) -> TodoResult<Task> {
        let (task, next) = self.store.mutate(|txn| {
            let now = txn.now;
            let task = txn.get_mut(id).ok_or_else(|| TodoError::not_found(id))?;
            task.completed = !task.completed;
            task.touch(now);
            let toggled = task.clone();
            let next = if toggled.completed {
                spawn_next_occurrence(txn, &toggled)
            } else {
                None
            };
            Ok::<_, TodoError>((toggled, next))
        })?;

        debug!(task_id = %id, completed = task.completed, "Task toggled");
        if let Some(next) = next {
            info!(
                task_id = %id,
                next_id = %next.id,
                recurrence = %next.recurrence_rule,
                "Created next occurrence of recurring task"
            );
        }
        Ok(task)
    }

    pub fn snooze(&self, id: &str, until: DateTime<Utc>) -> TodoResult<Task> {
        let task = self.set_snooze(id, Some(until))?;
        debug!(task_id = %id, until = %until, "Task snoozed");
        Ok(task)
    }

    pub fn unsnooze(&self, id: &str) -> TodoResult<Task> {
        let task = self.set_snooze(id, None)?;
        debug!(task_id = %id, "Task unsnoozed");
        Ok(task)
    }

    /// Applies one operation to every listed id that exists and returns how
    /// many tasks it touched. Unknown ids are skipped.
    pub fn bulk(&self, request: &BulkRequest) -> TodoResult<usize> {
        let (operation, priority) = request.plan()?;

        let affected = self.store.mutate(|txn| {
            let now = txn.now;
            let mut affected = 0;
            for id in &request.ids {
                if operation == BulkOperation::Delete {
                    if txn.remove(id).is_some() {
                        affected += 1;
                    }
                    continue;
                }

                let Some(task) = txn.get_mut(id) else {
                    continue;
                };
                let was_completed = task.completed;
                match operation {
                    BulkOperation::Complete => task.completed = true,
                    BulkOperation::Uncomplete => task.completed = false,
                    BulkOperation::UpdatePriority => {
                        if let Some(priority) = priority {
                            task.priority = priority;
                        }
                    }
                    BulkOperation::Delete => {}
                }
                task.touch(now);
                affected += 1;

                if operation == BulkOperation::Complete && !was_completed {
                    let completed = task.clone();
                    spawn_next_occurrence(txn, &completed);
                }
            }
            affected
        });

        info!(
            operation = %operation,
            requested = request.ids.len(),
            affected,
            "Bulk operation applied"
        );
        Ok(affected)
    }

    pub fn clear_completed(&self) -> usize {
        let removed = self.store.mutate(|txn| txn.remove_where(|task| task.completed));
        info!(removed, "Cleared completed tasks");
        removed
    }

    fn set_snooze(&self, id: &str, until: Option<DateTime<Utc>>) -> TodoResult<Task> {
        self.store.mutate(|txn| {
            let now = txn.now;
            let task = txn.get_mut(id).ok_or_else(|| TodoError::not_found(id))?;
            task.snoozed_until = until;
            task.touch(now);
            Ok(task.clone())
        })
    }
}

/// Inserts the follow-up instance of a completed recurring task.
fn spawn_next_occurrence(txn: &mut StoreTxn<'_>, completed: &Task) -> Option<Task> {
    let due = completed.next_occurrence_due()?;
    Some(txn.insert_new(TaskFields {
        text: completed.text.clone(),
        priority: completed.priority,
        completed: false,
        due_date: Some(due),
        reminder_time: completed.reminder_time,
        recurrence_rule: completed.recurrence_rule,
        tags: completed.tags.clone(),
        category: completed.category.clone(),
        snoozed_until: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!("updatePriority".parse::<BulkOperation>().unwrap(), BulkOperation::UpdatePriority);
        assert_eq!("update_priority".parse::<BulkOperation>().unwrap(), BulkOperation::UpdatePriority);
        let err = "archive".parse::<BulkOperation>().unwrap_err();
        assert_eq!(err.error_type, "invalid_operation");
    }

    #[test]
    fn test_plan_rejects_update_priority_without_priority() {
        let errors = BulkRequest::new(["a"], "updatePriority").plan().unwrap_err();
        assert!(errors.has("priority_required"));

        let errors = BulkRequest::new(["a"], "updatePriority")
            .with_priority("urgent")
            .plan()
            .unwrap_err();
        assert!(errors.has("invalid_priority"));
    }
}
