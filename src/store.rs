/*!
 * Task Store Module for spicytodo
 *
 * The single owner of every task record:
 * - identifier allocation
 * - validated create / update, hard delete
 * - shared-lock snapshots for readers, exclusive-lock transactions for writers
 *
 * Callers only ever receive clones; nothing outside this module holds a
 * reference into the map once a call returns.
 */

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{TodoError, TodoResult};
use crate::task_manager::{Task, TaskDraft, TaskPatch};
use crate::validation::{DueDateRule, TaskFields, ValidationConfig, ValidationEngine};

pub type TaskMap = HashMap<String, Task>;

pub struct TaskStore {
    tasks: RwLock<TaskMap>,
    clock: Arc<dyn Clock>,
    validation: ValidationEngine,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, ValidationConfig::default())
    }

    pub fn with_config(clock: Arc<dyn Clock>, validation: ValidationConfig) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            clock,
            validation: ValidationEngine::new(Some(validation)),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    pub fn create(&self, draft: TaskDraft) -> TodoResult<Task> {
        let rule = self.validation.creation_rule();
        self.create_with_rule(draft, rule)
    }

    pub(crate) fn create_with_rule(&self, draft: TaskDraft, rule: DueDateRule) -> TodoResult<Task> {
        let fields = self.validation.validate_draft(&draft, self.today(), rule)?;
        let task = self.mutate(|txn| txn.insert_new(fields));
        debug!(task_id = %task.id, priority = %task.priority, "Task created");
        Ok(task)
    }

    pub fn get(&self, id: &str) -> TodoResult<Task> {
        self.read(|tasks| tasks.get(id).cloned())
            .ok_or_else(|| TodoError::not_found(id))
    }

    /// Applies the fields present in `patch`; the task is untouched when the
    /// merged result is invalid.
    pub fn update(&self, id: &str, patch: TaskPatch) -> TodoResult<Task> {
        let today = self.today();
        let updated = self.mutate(|txn| {
            let now = txn.now;
            let task = txn.get_mut(id).ok_or_else(|| TodoError::not_found(id))?;
            let fields = self.validation.validate_patch(task, &patch, today)?;
            apply_fields(task, fields);
            task.touch(now);
            Ok::<_, TodoError>(task.clone())
        })?;
        debug!(task_id = %id, "Task updated");
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.mutate(|txn| txn.remove(id).is_some());
        if removed {
            debug!(task_id = %id, "Task deleted");
        }
        removed
    }

    /// Runs `f` over the map under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&TaskMap) -> R) -> R {
        let guard = self.read_guard();
        f(&guard)
    }

    pub fn for_each(&self, mut f: impl FnMut(&Task)) {
        self.read(|tasks| tasks.values().for_each(&mut f));
    }

    /// Every task, ordered by creation time then id.
    pub fn snapshot(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.read(|tasks| tasks.values().cloned().collect());
        sort_tasks(&mut tasks);
        tasks
    }

    pub fn len(&self) -> usize {
        self.read(|tasks| tasks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> usize {
        self.mutate(|txn| txn.clear())
    }

    /// Replaces the contents with already-materialized tasks, keeping their
    /// ids and timestamps. Used when loading a persisted snapshot.
    pub fn restore(&self, tasks: Vec<Task>) -> usize {
        let mut guard = self.write_guard();
        guard.clear();
        for task in tasks {
            guard.insert(task.id.clone(), task);
        }
        guard.len()
    }

    /// Runs `f` as one atomic step under the exclusive lock.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut StoreTxn<'_>) -> R) -> R {
        let now = self.clock.now();
        let mut guard = self.write_guard();
        let mut txn = StoreTxn {
            tasks: &mut *guard,
            now,
        };
        f(&mut txn)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, TaskMap> {
        self.tasks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, TaskMap> {
        self.tasks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive view of the map for the duration of one mutation.
pub(crate) struct StoreTxn<'a> {
    tasks: &'a mut TaskMap,
    pub(crate) now: DateTime<Utc>,
}

impl StoreTxn<'_> {
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Task> {
        self.tasks.remove(id)
    }

    pub(crate) fn insert_new(&mut self, fields: TaskFields) -> Task {
        let id = self.allocate_id();
        let task = Task {
            id: id.clone(),
            text: fields.text,
            priority: fields.priority,
            completed: fields.completed,
            due_date: fields.due_date,
            reminder_time: fields.reminder_time,
            recurrence_rule: fields.recurrence_rule,
            tags: fields.tags,
            category: fields.category,
            snoozed_until: fields.snoozed_until,
            created_at: self.now,
            updated_at: self.now,
        };
        self.tasks.insert(id, task.clone());
        task
    }

    /// Removes every task matching `predicate`, returning how many went.
    pub(crate) fn remove_where(&mut self, mut predicate: impl FnMut(&Task) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !predicate(task));
        before - self.tasks.len()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.tasks.len();
        self.tasks.clear();
        removed
    }

    fn allocate_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.tasks.contains_key(&id) {
                return id;
            }
        }
    }
}

fn apply_fields(task: &mut Task, fields: TaskFields) {
    task.text = fields.text;
    task.priority = fields.priority;
    task.completed = fields.completed;
    task.due_date = fields.due_date;
    task.reminder_time = fields.reminder_time;
    task.recurrence_rule = fields.recurrence_rule;
    task.tags = fields.tags;
    task.category = fields.category;
    task.snoozed_until = fields.snoozed_until;
}

pub(crate) fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
