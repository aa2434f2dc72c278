use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, DateTime, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(format!("invalid priority '{}': expected low, medium or high", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceRule {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceRule::None => "none",
            RecurrenceRule::Daily => "daily",
            RecurrenceRule::Weekly => "weekly",
            RecurrenceRule::Monthly => "monthly",
        }
    }

    pub fn is_recurring(&self) -> bool {
        *self != RecurrenceRule::None
    }

    /// Due date of the occurrence following `due`.
    ///
    /// Monthly steps keep the day of month and roll excess days into the
    /// following month (Jan 31 -> Mar 2 in a leap year).
    pub fn next_due(&self, due: NaiveDate) -> Option<NaiveDate> {
        match self {
            RecurrenceRule::None => None,
            RecurrenceRule::Daily => due.checked_add_days(Days::new(1)),
            RecurrenceRule::Weekly => due.checked_add_days(Days::new(7)),
            RecurrenceRule::Monthly => due
                .with_day(1)?
                .checked_add_months(Months::new(1))?
                .checked_add_days(Days::new(u64::from(due.day0()))),
        }
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(RecurrenceRule::None),
            "daily" => Ok(RecurrenceRule::Daily),
            "weekly" => Ok(RecurrenceRule::Weekly),
            "monthly" => Ok(RecurrenceRule::Monthly),
            _ => Err(format!(
                "invalid recurrence rule '{}': expected none, daily, weekly or monthly",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub priority: Priority,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hhmm")]
    pub reminder_time: Option<NaiveTime>,
    #[serde(default)]
    pub recurrence_rule: RecurrenceRule,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// True while `snoozed_until` lies strictly after `now`.
    pub fn is_snoozed_at(&self, now: DateTime<Utc>) -> bool {
        self.snoozed_until.is_some_and(|until| until > now)
    }

    /// Due date for the occurrence that replaces this task once completed.
    pub fn next_occurrence_due(&self) -> Option<NaiveDate> {
        self.due_date
            .and_then(|due| self.recurrence_rule.next_due(due))
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Creation payload. Enumerations and dates stay raw so validation can
/// report every malformed value at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority.as_str().to_string());
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due.format(DATE_FORMAT).to_string());
        self
    }

    pub fn with_reminder_time(mut self, time: NaiveTime) -> Self {
        self.reminder_time = Some(time.format(TIME_FORMAT).to_string());
        self
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence_rule = Some(rule.as_str().to_string());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        Self {
            text: task.text.clone(),
            priority: Some(task.priority.as_str().to_string()),
            completed: Some(task.completed),
            due_date: task.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
            reminder_time: task.reminder_time.map(|t| t.format(TIME_FORMAT).to_string()),
            recurrence_rule: Some(task.recurrence_rule.as_str().to_string()),
            tags: Some(task.tags.iter().cloned().collect()),
            category: task.category.clone(),
            snoozed_until: task.snoozed_until,
        }
    }
}

/// Presence-aware field for clearable attributes.
///
/// A missing JSON key deserializes to `Absent`, an explicit `null` to `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Patch::Absent => Patch::Absent,
            Patch::Null => Patch::Null,
            Patch::Value(v) => Patch::Value(v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Value(value) => serializer.serialize_some(value),
            Patch::Absent | Patch::Null => serializer.serialize_none(),
        }
    }
}

/// Partial update. `Option` fields are no-ops when `None`; `Patch` fields
/// can additionally be cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub due_date: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub reminder_time: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub category: Patch<String>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority.as_str().to_string());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Patch::Value(due.format(DATE_FORMAT).to_string());
        self
    }

    pub fn clear_due_date(mut self) -> Self {
        self.due_date = Patch::Null;
        self
    }

    pub fn reminder_time(mut self, time: NaiveTime) -> Self {
        self.reminder_time = Patch::Value(time.format(TIME_FORMAT).to_string());
        self
    }

    pub fn clear_reminder_time(mut self) -> Self {
        self.reminder_time = Patch::Null;
        self
    }

    pub fn recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence_rule = Some(rule.as_str().to_string());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Patch::Value(category.into());
        self
    }

    pub fn clear_category(mut self) -> Self {
        self.category = Patch::Null;
        self
    }
}

mod hhmm {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&time.format(TIME_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| {
            NaiveTime::parse_from_str(&s, TIME_FORMAT)
                .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(Priority::default(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_recurrence_steps() {
        let due = date(2024, 1, 31);
        assert_eq!(RecurrenceRule::Daily.next_due(due), Some(date(2024, 2, 1)));
        assert_eq!(RecurrenceRule::Weekly.next_due(due), Some(date(2024, 2, 7)));
        assert_eq!(RecurrenceRule::Monthly.next_due(due), Some(date(2024, 3, 2)));
        assert_eq!(RecurrenceRule::Monthly.next_due(date(2023, 1, 30)), Some(date(2023, 3, 2)));
        assert_eq!(RecurrenceRule::Monthly.next_due(date(2024, 3, 31)), Some(date(2024, 5, 1)));
        assert_eq!(RecurrenceRule::Monthly.next_due(date(2024, 12, 15)), Some(date(2025, 1, 15)));
        assert_eq!(RecurrenceRule::None.next_due(due), None);
    }

    #[test]
    fn test_task_serialization_uses_wire_formats() {
        let now = Utc::now();
        let task = Task {
            id: "task-1".to_string(),
            text: "Buy milk".to_string(),
            priority: Priority::High,
            completed: false,
            due_date: Some(date(2030, 5, 1)),
            reminder_time: NaiveTime::from_hms_opt(9, 30, 0),
            recurrence_rule: RecurrenceRule::Weekly,
            tags: ["home".to_string()].into_iter().collect(),
            category: None,
            snoozed_until: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["dueDate"], "2030-05-01");
        assert_eq!(json["reminderTime"], "09:30");
        assert_eq!(json["recurrenceRule"], "weekly");
        assert!(json.get("category").is_none());

        let parsed: Task = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn test_patch_distinguishes_missing_from_null() {
        let patch: TaskPatch = serde_json::from_str(r#"{"dueDate": null, "text": "x"}"#).unwrap();
        assert_eq!(patch.due_date, Patch::Null);
        assert_eq!(patch.category, Patch::Absent);
        assert_eq!(patch.text.as_deref(), Some("x"));
        assert!(patch.priority.is_none());
    }
}
