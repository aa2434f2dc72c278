use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde_json::json;
use spicytodo::{
    BulkRequest, Clock, FixedClock, JsonRpcRequest, JsonRpcServer, Patch, SnapshotRepository,
    StorageManager, TaskDraft, TaskQuery, TaskStore, TodoHandler, UpdateTaskParams,
};
use tempfile::TempDir;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 6, 15, 8, 0, 0).unwrap()))
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, d).unwrap()
}

#[tokio::test]
async fn test_full_workflow_with_persistence() {
    // Временный каталог данных
    let temp_dir = TempDir::new().unwrap();
    let clock = clock();
    let store = Arc::new(TaskStore::with_clock(clock.clone()));
    let storage = Arc::new(StorageManager::new(temp_dir.path()));
    let handler = TodoHandler::new(Arc::clone(&store)).with_repository(storage.clone());

    // Создать задачи
    let daily = handler
        .create_task(
            TaskDraft::new("Water plants")
                .with_due_date(date(15))
                .with_recurrence(spicytodo::RecurrenceRule::Daily)
                .with_tags(["home"]),
        )
        .await
        .unwrap();
    let report = handler
        .create_task(TaskDraft::new("Send report").with_due_date(date(17)).with_category("Work"))
        .await
        .unwrap();
    handler.create_task(TaskDraft::new("Old note")).await.unwrap();

    // Выполнить ежедневную задачу: появляется следующая
    handler.toggle_task(&daily.id).await.unwrap();
    assert_eq!(store.len(), 4);

    // Отредактировать и массово завершить
    let patch = serde_json::from_value(json!({ "id": report.id, "updates": { "priority": "high" } }))
        .unwrap();
    let updated = handler.update_task(patch).await.unwrap();
    assert_eq!(updated.priority, spicytodo::Priority::High);

    let affected = handler
        .bulk_operation(BulkRequest::new([report.id.as_str(), "missing"], "complete"))
        .await
        .unwrap();
    assert_eq!(affected.affected, 1);

    let stats = handler.get_statistics().await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.due_today_count, 0);
    assert_eq!(stats.upcoming_count, 1);

    // Снимок на диске отражает последнее изменение
    let restored = Arc::new(TaskStore::with_clock(clock.clone()));
    assert_eq!(storage.hydrate(&restored).await.unwrap(), 4);
    assert_eq!(restored.snapshot(), store.snapshot());

    // Очистка выполненных
    let cleared = handler.clear_completed().await.unwrap();
    assert_eq!(cleared.affected, 2);
    let remaining = handler.list_tasks(TaskQuery::new()).await.unwrap();
    let mut texts: Vec<&str> = remaining.iter().map(|t| t.text.as_str()).collect();
    texts.sort();
    assert_eq!(texts, vec!["Old note", "Water plants"]);
}

#[tokio::test]
async fn test_overdue_after_days_pass() {
    let clock = clock();
    let store = Arc::new(TaskStore::with_clock(clock.clone()));
    let handler = TodoHandler::new(Arc::clone(&store));

    handler
        .create_task(TaskDraft::new("Due today").with_due_date(date(15)))
        .await
        .unwrap();
    let done = handler
        .create_task(TaskDraft::new("Done early").with_due_date(date(15)))
        .await
        .unwrap();
    handler.toggle_task(&done.id).await.unwrap();

    assert_eq!(handler.get_statistics().await.unwrap().due_today_count, 1);

    clock.advance(Duration::days(2));
    let stats = handler.get_statistics().await.unwrap();
    assert_eq!(stats.overdue_count, 1);
    assert_eq!(stats.due_today_count, 0);
}

#[tokio::test]
async fn test_snooze_cycle_through_handler() {
    let clock = clock();
    let store = Arc::new(TaskStore::with_clock(clock.clone()));
    let handler = TodoHandler::new(Arc::clone(&store));
    let task = handler.create_task(TaskDraft::new("Nap")).await.unwrap();

    let params = serde_json::from_value(json!({
        "id": task.id,
        "snoozedUntil": (clock.now() + Duration::hours(1)).to_rfc3339(),
    }))
    .unwrap();
    handler.snooze_task(params).await.unwrap();
    assert!(handler.list_tasks(TaskQuery::new()).await.unwrap().is_empty());

    clock.advance(Duration::minutes(61));
    assert_eq!(handler.list_tasks(TaskQuery::new()).await.unwrap().len(), 1);

    let first = handler.unsnooze_task(&task.id).await.unwrap();
    let second = handler.unsnooze_task(&task.id).await.unwrap();
    assert_eq!(first.snoozed_until, second.snoozed_until);
}

#[tokio::test]
async fn test_server_session_over_byte_streams() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageManager::new(temp_dir.path()));
    let store = Arc::new(TaskStore::with_clock(clock()));
    let handler = TodoHandler::new(Arc::clone(&store)).with_repository(storage.clone());
    let server = JsonRpcServer::new(Box::new(handler));

    let requests = [
        JsonRpcRequest::new(
            "create_task",
            Some(json!({ "text": "Pay rent", "dueDate": "2030-06-30", "reminderTime": "09:00" })),
            Some(json!(1)),
        ),
        JsonRpcRequest::new("create_task", Some(json!({ "text": "Groceries", "tags": ["errands"] })), Some(json!(2))),
        JsonRpcRequest::new("get_tags", None, Some(json!(3))),
        JsonRpcRequest::new("export_tasks", None, Some(json!(4))),
    ];
    let input: String = requests
        .iter()
        .map(|r| serde_json::to_string(r).unwrap() + "\n")
        .collect();

    let mut output = Vec::new();
    server.run(input.as_bytes(), &mut output).await.unwrap();
    let lines: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["result"]["reminderTime"], "09:00");
    assert_eq!(lines[2]["result"], json!(["errands"]));
    assert_eq!(lines[3]["result"]["count"], 2);

    // A fresh process would pick up both tasks from disk.
    let reloaded = TaskStore::new();
    assert_eq!(storage.hydrate(&reloaded).await.unwrap(), 2);
}

#[test]
fn test_update_params_accept_partial_payload() {
    let params: UpdateTaskParams = serde_json::from_value(json!({ "id": "abc" })).unwrap();
    assert_eq!(params.id, "abc");
    assert!(params.updates.text.is_none());
    assert_eq!(params.updates.due_date, Patch::Absent);
    assert_eq!(params.updates.category, Patch::Absent);
}
