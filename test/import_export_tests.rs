use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use spicytodo::{
    Clock, FixedClock, ImportMode, LifecycleEngine, Priority, RecurrenceRule, StatusFilter, Task,
    TaskDraft, TaskStore, TaskTransfer,
};

fn fixed_store() -> (Arc<FixedClock>, Arc<TaskStore>) {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap()));
    let store = Arc::new(TaskStore::with_clock(clock.clone()));
    (clock, store)
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, d).unwrap()
}

/// Field values that survive a round trip (everything but identity and timestamps).
fn content(task: &Task) -> (String, Priority, bool, Option<NaiveDate>, Option<NaiveTime>, RecurrenceRule, Vec<String>, Option<String>) {
    (
        task.text.clone(),
        task.priority,
        task.completed,
        task.due_date,
        task.reminder_time,
        task.recurrence_rule,
        task.tags.iter().cloned().collect(),
        task.category.clone(),
    )
}

#[test]
fn test_export_then_replace_import_round_trips() {
    let (clock, store) = fixed_store();
    store
        .create(
            TaskDraft::new("Quarterly taxes")
                .with_priority(Priority::High)
                .with_due_date(date(20))
                .with_reminder_time(NaiveTime::from_hms_opt(10, 30, 0).unwrap())
                .with_recurrence(RecurrenceRule::Monthly)
                .with_tags(["finance", "home"])
                .with_category("Admin"),
        )
        .unwrap();
    clock.advance(Duration::seconds(1));
    store.create(TaskDraft::new("Done thing").with_completed(true)).unwrap();
    clock.advance(Duration::seconds(1));
    store.create(TaskDraft::new("Bare")).unwrap();

    let transfer = TaskTransfer::new(Arc::clone(&store));
    let exported = transfer.export_all(None);
    assert_eq!(exported.count, 3);

    // Time passes: the first task is now overdue but must still import.
    clock.advance(Duration::days(30));
    let drafts: Vec<TaskDraft> = exported.data.iter().map(TaskDraft::from).collect();
    let result = transfer.import_many(drafts, ImportMode::Replace);
    assert_eq!(result.imported, 3);
    assert_eq!(result.skipped, 0);
    assert!(result.errors.is_empty());

    let mut before: Vec<_> = exported.data.iter().map(content).collect();
    let mut after: Vec<_> = store.snapshot().iter().map(content).collect();
    before.sort_by(|a, b| a.0.cmp(&b.0));
    after.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(before, after);
}

#[test]
fn test_round_trip_through_json() {
    let (_clock, store) = fixed_store();
    store
        .create(TaskDraft::new("Serialized").with_due_date(date(16)).with_tags(["a"]))
        .unwrap();
    let transfer = TaskTransfer::new(Arc::clone(&store));

    let json = serde_json::to_string(&transfer.export_all(Some("all"))).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let drafts: Vec<TaskDraft> = serde_json::from_value(value["data"].clone()).unwrap();

    let result = transfer.import_many(drafts, ImportMode::Append);
    assert_eq!(result.imported, 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_append_keeps_existing_and_reports_bad_rows() {
    let (_clock, store) = fixed_store();
    store.create(TaskDraft::new("Existing")).unwrap();
    let transfer = TaskTransfer::new(Arc::clone(&store));

    let drafts = vec![
        TaskDraft::new("Good one"),
        TaskDraft {
            text: String::new(),
            priority: Some("urgent".to_string()),
            ..Default::default()
        },
        TaskDraft::new("Good two"),
        TaskDraft {
            text: "Reminder only".to_string(),
            reminder_time: Some("08:00".to_string()),
            ..Default::default()
        },
    ];
    let result = transfer.import_many(drafts, ImportMode::Append);

    assert_eq!(result.imported, 2);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].starts_with("Row 2: "));
    assert!(result.errors[0].contains("text is required"));
    assert!(result.errors[0].contains("priority"));
    assert!(result.errors[1].starts_with("Row 4: "));
    assert_eq!(store.len(), 3);
}

#[test]
fn test_replace_clears_existing_tasks() {
    let (_clock, store) = fixed_store();
    let old = store.create(TaskDraft::new("Old")).unwrap();
    let transfer = TaskTransfer::new(Arc::clone(&store));

    let result = transfer.import_many(vec![TaskDraft::new("New")], ImportMode::Replace);
    assert_eq!(result.imported, 1);
    assert!(store.get(&old.id).is_err());
    assert_eq!(store.snapshot()[0].text, "New");
}

#[test]
fn test_unknown_import_mode_is_rejected() {
    let (_clock, store) = fixed_store();
    store.create(TaskDraft::new("Survivor")).unwrap();
    let transfer = TaskTransfer::new(Arc::clone(&store));

    let err = transfer
        .import_raw(vec![TaskDraft::new("x")], Some("merge"))
        .unwrap_err();
    assert!(err.validation_errors().unwrap().has("invalid_import_mode"));
    assert_eq!(store.len(), 1);

    let ok = transfer.import_raw(vec![TaskDraft::new("y")], None).unwrap();
    assert_eq!(ok.imported, 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_imported_at_uses_store_clock() {
    let (clock, store) = fixed_store();
    let transfer = TaskTransfer::new(store);
    let result = transfer.import_many(vec![], ImportMode::Append);
    assert_eq!(result.imported_at, clock.now());
    assert_eq!(result.message, "Imported 0 tasks");
}

#[test]
fn test_export_filters_by_status_and_includes_snoozed() {
    let (clock, store) = fixed_store();
    let lifecycle = LifecycleEngine::new(Arc::clone(&store));
    let snoozed = store.create(TaskDraft::new("Snoozed")).unwrap();
    lifecycle.snooze(&snoozed.id, clock.now() + Duration::days(2)).unwrap();
    store.create(TaskDraft::new("Done").with_completed(true)).unwrap();

    let transfer = TaskTransfer::new(Arc::clone(&store));

    let all = transfer.export_all(None);
    assert_eq!(all.count, 2);
    assert_eq!(all.filter, StatusFilter::All);

    let active = transfer.export_all(Some("active"));
    assert_eq!(active.count, 1);
    assert_eq!(active.data[0].text, "Snoozed");

    let completed = transfer.export_all(Some("completed"));
    assert_eq!(completed.count, 1);
    let json = serde_json::to_value(&completed).unwrap();
    assert_eq!(json["filter"], "completed");
    assert!(json.get("exportedAt").is_some());

    assert_eq!(transfer.export_all(Some("bogus")).count, 2);
}
