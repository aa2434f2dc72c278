/*!
 * Validation Engine Module for spicytodo
 *
 * Turns raw drafts and patches into typed task fields, collecting every
 * violated rule instead of stopping at the first one:
 * - text presence and length
 * - priority / recurrence vocabulary
 * - date (`YYYY-MM-DD`) and time (`HH:MM`) formats
 * - reminder requires a due date
 * - due dates in the past (creation and explicit due-date updates only)
 */

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::task_manager::{
    DATE_FORMAT, Patch, Priority, RecurrenceRule, TIME_FORMAT, Task, TaskDraft, TaskPatch,
};

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern compiles"));
static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("time pattern compiles"));

/// A single violated rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub error_type: String,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(error_type: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Every rule a payload violated, in field order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn single(error: ValidationError) -> Self {
        Self(vec![error])
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn has(&self, error_type: &str) -> bool {
        self.0.iter().any(|e| e.error_type == error_type)
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(|e| e.message.clone()).collect()
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Whether a due date before today is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueDateRule {
    RejectPast,
    AllowPast,
}

/// Typed, validated task attributes (everything but identity and timestamps).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
    pub text: String,
    pub priority: Priority,
    pub completed: bool,
    pub due_date: Option<NaiveDate>,
    pub reminder_time: Option<NaiveTime>,
    pub recurrence_rule: RecurrenceRule,
    pub tags: BTreeSet<String>,
    pub category: Option<String>,
    pub snoozed_until: Option<DateTime<Utc>>,
}

impl TaskFields {
    fn of(task: &Task) -> Self {
        Self {
            text: task.text.clone(),
            priority: task.priority,
            completed: task.completed,
            due_date: task.due_date,
            reminder_time: task.reminder_time,
            recurrence_rule: task.recurrence_rule,
            tags: task.tags.clone(),
            category: task.category.clone(),
            snoozed_until: task.snoozed_until,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_text_length: usize,
    pub reject_past_due_dates: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_text_length: 500,
            reject_past_due_dates: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(config: Option<ValidationConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
        }
    }

    /// Rule used by interactive creation and updates.
    pub fn creation_rule(&self) -> DueDateRule {
        if self.config.reject_past_due_dates {
            DueDateRule::RejectPast
        } else {
            DueDateRule::AllowPast
        }
    }

    pub fn validate_draft(
        &self,
        draft: &TaskDraft,
        today: NaiveDate,
        rule: DueDateRule,
    ) -> Result<TaskFields, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        self.check_text(&draft.text, &mut errors);
        let priority = match draft.priority.as_deref() {
            Some(raw) => parse_priority(raw).unwrap_or_else(|e| {
                errors.push(e);
                Priority::default()
            }),
            None => Priority::default(),
        };
        let due_date = draft
            .due_date
            .as_deref()
            .and_then(|raw| parse_due_date(raw, today, rule, &mut errors));
        let reminder_time = draft
            .reminder_time
            .as_deref()
            .and_then(|raw| parse_reminder_time(raw, &mut errors));
        if draft.reminder_time.is_some() && draft.due_date.is_none() {
            errors.push(reminder_without_due_date());
        }
        let recurrence_rule = match draft.recurrence_rule.as_deref() {
            Some(raw) => parse_recurrence(raw).unwrap_or_else(|e| {
                errors.push(e);
                RecurrenceRule::default()
            }),
            None => RecurrenceRule::default(),
        };

        errors.into_result(TaskFields {
            text: draft.text.clone(),
            priority,
            completed: draft.completed.unwrap_or(false),
            due_date,
            reminder_time,
            recurrence_rule,
            tags: normalize_tags(draft.tags.as_deref().unwrap_or_default()),
            category: normalize_category(draft.category.as_deref()),
            snoozed_until: draft.snoozed_until,
        })
    }

    /// Merges `patch` over `current` and validates the result.
    pub fn validate_patch(
        &self,
        current: &Task,
        patch: &TaskPatch,
        today: NaiveDate,
    ) -> Result<TaskFields, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let mut fields = TaskFields::of(current);

        if let Some(text) = &patch.text {
            self.check_text(text, &mut errors);
            fields.text = text.clone();
        }
        if let Some(raw) = &patch.priority {
            match parse_priority(raw) {
                Ok(priority) => fields.priority = priority,
                Err(e) => errors.push(e),
            }
        }
        if let Some(completed) = patch.completed {
            fields.completed = completed;
        }
        match patch.due_date.as_ref() {
            Patch::Absent => {}
            Patch::Null => fields.due_date = None,
            Patch::Value(raw) => {
                if let Some(due) = parse_due_date(raw, today, self.creation_rule(), &mut errors) {
                    fields.due_date = Some(due);
                }
            }
        }
        match patch.reminder_time.as_ref() {
            Patch::Absent => {}
            Patch::Null => fields.reminder_time = None,
            Patch::Value(raw) => {
                if let Some(time) = parse_reminder_time(raw, &mut errors) {
                    fields.reminder_time = Some(time);
                }
            }
        }
        if let Some(raw) = &patch.recurrence_rule {
            match parse_recurrence(raw) {
                Ok(rule) => fields.recurrence_rule = rule,
                Err(e) => errors.push(e),
            }
        }
        if let Some(tags) = &patch.tags {
            fields.tags = normalize_tags(tags);
        }
        match patch.category.as_ref() {
            Patch::Absent => {}
            Patch::Null => fields.category = None,
            Patch::Value(raw) => fields.category = normalize_category(Some(raw)),
        }

        if fields.reminder_time.is_some()
            && fields.due_date.is_none()
            && !errors.has("invalid_due_date")
        {
            errors.push(reminder_without_due_date());
        }

        errors.into_result(fields)
    }

    fn check_text(&self, text: &str, errors: &mut ValidationErrors) {
        if text.trim().is_empty() {
            errors.push(ValidationError::new("text_required", "text", "text is required"));
            return;
        }
        let length = text.chars().count();
        if length > self.config.max_text_length {
            errors.push(ValidationError::new(
                "text_too_long",
                "text",
                format!(
                    "text must be at most {} characters (got {})",
                    self.config.max_text_length, length
                ),
            ));
        }
    }
}

pub fn parse_priority(raw: &str) -> Result<Priority, ValidationError> {
    raw.parse::<Priority>()
        .map_err(|message| ValidationError::new("invalid_priority", "priority", message))
}

pub fn parse_recurrence(raw: &str) -> Result<RecurrenceRule, ValidationError> {
    raw.parse::<RecurrenceRule>()
        .map_err(|message| ValidationError::new("invalid_recurrence_rule", "recurrenceRule", message))
}

fn parse_due_date(
    raw: &str,
    today: NaiveDate,
    rule: DueDateRule,
    errors: &mut ValidationErrors,
) -> Option<NaiveDate> {
    let parsed = DATE_PATTERN
        .is_match(raw)
        .then(|| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok())
        .flatten();
    let Some(due) = parsed else {
        errors.push(ValidationError::new(
            "invalid_due_date",
            "dueDate",
            format!("dueDate '{}' must be a valid date in YYYY-MM-DD format", raw),
        ));
        return None;
    };
    if rule == DueDateRule::RejectPast && due < today {
        errors.push(ValidationError::new(
            "due_date_in_past",
            "dueDate",
            format!("dueDate {} is in the past (today is {})", due, today),
        ));
    }
    Some(due)
}

fn parse_reminder_time(raw: &str, errors: &mut ValidationErrors) -> Option<NaiveTime> {
    let parsed = TIME_PATTERN
        .is_match(raw)
        .then(|| NaiveTime::parse_from_str(raw, TIME_FORMAT).ok())
        .flatten();
    if parsed.is_none() {
        errors.push(ValidationError::new(
            "invalid_reminder_time",
            "reminderTime",
            format!("reminderTime '{}' must be a 24-hour time in HH:MM format", raw),
        ));
    }
    parsed
}

fn reminder_without_due_date() -> ValidationError {
    ValidationError::new(
        "reminder_requires_due_date",
        "reminderTime",
        "reminderTime can only be set when dueDate is set",
    )
}

fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
}
