/*!
 * Todo Handler Module
 *
 * Composition root for the request surface: owns the shared store and the
 * engines built over it, and dispatches JSON-RPC methods to them.
 */

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::communication::{
    AffectedResponse, BasicResponse, ExportTasksParams, ImportTasksParams, JsonRpcError,
    JsonRpcHandler, JsonRpcRequest, JsonRpcResponse, JsonRpcServer, SnoozeTaskParams,
    TaskIdParams, UpdateTaskParams,
};
use crate::error::TodoError;
use crate::import_export::{ExportResult, ImportResult, TaskTransfer};
use crate::lifecycle::{BulkRequest, LifecycleEngine};
use crate::search_engine::{SearchEngine, TaskQuery};
use crate::statistics::{StatisticsManager, TaskStatistics};
use crate::storage::SnapshotRepository;
use crate::store::TaskStore;
use crate::task_manager::{Task, TaskDraft};
use crate::{handle_optional_method, handle_parameterized_method, handle_simple_method};

pub struct TodoHandler {
    store: Arc<TaskStore>,
    search_engine: SearchEngine,
    statistics_manager: StatisticsManager,
    lifecycle: LifecycleEngine,
    transfer: TaskTransfer,
    repository: Option<Arc<dyn SnapshotRepository>>,
}

impl TodoHandler {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            search_engine: SearchEngine::new(Arc::clone(&store)),
            statistics_manager: StatisticsManager::new(Arc::clone(&store), None),
            lifecycle: LifecycleEngine::new(Arc::clone(&store)),
            transfer: TaskTransfer::new(Arc::clone(&store)),
            repository: None,
            store,
        }
    }

    /// Saves a snapshot to `repository` after every successful mutation.
    pub fn with_repository(mut self, repository: Arc<dyn SnapshotRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub async fn create_task(&self, draft: TaskDraft) -> anyhow::Result<Task> {
        let task = self.store.create(draft)?;
        self.persist().await?;
        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> anyhow::Result<Task> {
        Ok(self.store.get(id)?)
    }

    pub async fn update_task(&self, params: UpdateTaskParams) -> anyhow::Result<Task> {
        let task = self.store.update(&params.id, params.updates)?;
        self.persist().await?;
        Ok(task)
    }

    pub async fn delete_task(&self, id: &str) -> anyhow::Result<BasicResponse> {
        if !self.store.delete(id) {
            return Err(TodoError::not_found(id).into());
        }
        self.persist().await?;
        Ok(BasicResponse {
            success: true,
            message: "Task deleted".to_string(),
        })
    }

    pub async fn toggle_task(&self, id: &str) -> anyhow::Result<Task> {
        let task = self.lifecycle.toggle(id)?;
        self.persist().await?;
        Ok(task)
    }

    pub async fn list_tasks(&self, query: TaskQuery) -> anyhow::Result<Vec<Task>> {
        Ok(self.search_engine.query(&query))
    }

    pub async fn get_statistics(&self) -> anyhow::Result<TaskStatistics> {
        Ok(self.statistics_manager.stats())
    }

    pub async fn snooze_task(&self, params: SnoozeTaskParams) -> anyhow::Result<Task> {
        let task = self.lifecycle.snooze(&params.id, params.until)?;
        self.persist().await?;
        Ok(task)
    }

    pub async fn unsnooze_task(&self, id: &str) -> anyhow::Result<Task> {
        let task = self.lifecycle.unsnooze(id)?;
        self.persist().await?;
        Ok(task)
    }

    pub async fn bulk_operation(&self, request: BulkRequest) -> anyhow::Result<AffectedResponse> {
        let affected = self.lifecycle.bulk(&request)?;
        self.persist().await?;
        Ok(AffectedResponse {
            message: format!("Bulk {} applied to {} tasks", request.operation, affected),
            affected,
        })
    }

    pub async fn clear_completed(&self) -> anyhow::Result<AffectedResponse> {
        let removed = self.lifecycle.clear_completed();
        self.persist().await?;
        Ok(AffectedResponse {
            message: format!("Cleared {} completed tasks", removed),
            affected: removed,
        })
    }

    pub async fn import_tasks(&self, params: ImportTasksParams) -> anyhow::Result<ImportResult> {
        let result = self.transfer.import_raw(params.tasks, params.mode.as_deref())?;
        self.persist().await?;
        Ok(result)
    }

    pub async fn export_tasks(&self, params: ExportTasksParams) -> anyhow::Result<ExportResult> {
        Ok(self.transfer.export_all(params.status.as_deref()))
    }

    pub async fn get_tags(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.search_engine.all_tags())
    }

    pub async fn get_categories(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.search_engine.all_categories())
    }

    pub async fn get_upcoming_reminders(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self.search_engine.upcoming_reminders())
    }

    pub async fn health(&self) -> anyhow::Result<serde_json::Value> {
        Ok(json!({
            "status": "ok",
            "version": crate::VERSION,
            "tasks": self.store.len(),
            "persistence": self.repository.is_some(),
            "search": self.search_engine.get_performance_stats(),
            "statistics": self.statistics_manager.get_performance_metrics(),
        }))
    }

    async fn persist(&self) -> anyhow::Result<()> {
        if let Some(repository) = &self.repository {
            repository.persist(&self.store).await?;
        }
        Ok(())
    }
}

impl JsonRpcHandler for TodoHandler {
    fn handle_request(
        &self,
        request: JsonRpcRequest,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = JsonRpcResponse> + Send + '_>> {
        Box::pin(async move {
            match request.method.as_str() {
                "create_task" => handle_parameterized_method!(
                    request,
                    TaskDraft,
                    "create_task",
                    "Create task",
                    |params| self.create_task(params)
                ),
                "get_task" => handle_parameterized_method!(
                    request,
                    TaskIdParams,
                    "get_task",
                    "Get task",
                    |params| async move { self.get_task(&params.id).await }
                ),
                "update_task" => handle_parameterized_method!(
                    request,
                    UpdateTaskParams,
                    "update_task",
                    "Update task",
                    |params| self.update_task(params)
                ),
                "delete_task" => handle_parameterized_method!(
                    request,
                    TaskIdParams,
                    "delete_task",
                    "Delete task",
                    |params| async move { self.delete_task(&params.id).await }
                ),
                "toggle_task" => handle_parameterized_method!(
                    request,
                    TaskIdParams,
                    "toggle_task",
                    "Toggle task completion",
                    |params| async move { self.toggle_task(&params.id).await }
                ),
                "list_tasks" => handle_optional_method!(
                    request,
                    TaskQuery,
                    "list_tasks",
                    "List tasks",
                    |params| self.list_tasks(params)
                ),
                "get_statistics" => handle_simple_method!(
                    request.id,
                    "get_statistics",
                    "Get task statistics",
                    self.get_statistics()
                ),
                "snooze_task" => handle_parameterized_method!(
                    request,
                    SnoozeTaskParams,
                    "snooze_task",
                    "Snooze task",
                    |params| self.snooze_task(params)
                ),
                "unsnooze_task" => handle_parameterized_method!(
                    request,
                    TaskIdParams,
                    "unsnooze_task",
                    "Unsnooze task",
                    |params| async move { self.unsnooze_task(&params.id).await }
                ),
                "bulk_operation" => handle_parameterized_method!(
                    request,
                    BulkRequest,
                    "bulk_operation",
                    "Bulk operation",
                    |params| self.bulk_operation(params)
                ),
                "clear_completed" => handle_simple_method!(
                    request.id,
                    "clear_completed",
                    "Clear completed tasks",
                    self.clear_completed()
                ),
                "import_tasks" => handle_parameterized_method!(
                    request,
                    ImportTasksParams,
                    "import_tasks",
                    "Import tasks",
                    |params| self.import_tasks(params)
                ),
                "export_tasks" => handle_optional_method!(
                    request,
                    ExportTasksParams,
                    "export_tasks",
                    "Export tasks",
                    |params| self.export_tasks(params)
                ),
                "get_tags" => handle_simple_method!(request.id, "get_tags", "List tags", self.get_tags()),
                "get_categories" => handle_simple_method!(
                    request.id,
                    "get_categories",
                    "List categories",
                    self.get_categories()
                ),
                "get_upcoming_reminders" => handle_simple_method!(
                    request.id,
                    "get_upcoming_reminders",
                    "List upcoming reminders",
                    self.get_upcoming_reminders()
                ),
                "health" => handle_simple_method!(request.id, "health", "Health check", self.health()),
                _ => {
                    warn!(method = %request.method, "Unknown method");
                    JsonRpcServer::error_response(request.id, JsonRpcError::method_not_found())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySnapshotRepository;

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let repository = Arc::new(MemorySnapshotRepository::new());
        let handler = TodoHandler::new(Arc::new(TaskStore::new())).with_repository(repository.clone());
        handler.create_task(TaskDraft::new("Persist me")).await.unwrap();
        assert_eq!(repository.latest().unwrap().tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_task_is_not_found() {
        let handler = TodoHandler::new(Arc::new(TaskStore::new()));
        let err = handler.delete_task("nope").await.unwrap_err();
        assert!(err.downcast_ref::<TodoError>().is_some_and(TodoError::is_not_found));
    }
}
