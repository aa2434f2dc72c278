pub mod clock;
pub mod communication;
pub mod error;
pub mod error_macros;
pub mod handler;
pub mod import_export;
pub mod lifecycle;
pub mod logging;
pub mod search_engine;
pub mod statistics;
pub mod storage;
pub mod store;
pub mod task_manager;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};

pub use error::{TodoError, TodoResult};

pub use task_manager::{Patch, Priority, RecurrenceRule, Task, TaskDraft, TaskPatch};

pub use store::{TaskMap, TaskStore};

pub use storage::{
    MemorySnapshotRepository, Snapshot, SnapshotRepository, StorageInfo, StorageManager,
};

pub use communication::{
    AffectedResponse, BasicResponse, ExportTasksParams, ImportTasksParams, JsonRpcError,
    JsonRpcHandler, JsonRpcRequest, JsonRpcResponse, JsonRpcServer, SnoozeTaskParams,
    TaskIdParams, UpdateTaskParams,
};

pub use search_engine::{SearchEngine, StatusFilter, TaskQuery};

pub use statistics::{PriorityBreakdown, StatisticsConfig, StatisticsManager, TaskStatistics};

pub use lifecycle::{BulkData, BulkOperation, BulkRequest, LifecycleEngine};

pub use import_export::{ExportResult, ImportMode, ImportResult, TaskTransfer};

pub use validation::{
    DueDateRule, ValidationConfig, ValidationEngine, ValidationError, ValidationErrors,
};

pub use handler::TodoHandler;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

pub fn version_info() -> String {
    format!("{} v{}", NAME, VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        let info = version_info();
        assert!(info.contains("spicytodo"));
        assert!(info.contains("0.1.0"));
    }

    #[test]
    fn test_constants() {
        assert_eq!(NAME, "spicytodo");
        assert_eq!(VERSION, "0.1.0");
        assert!(!DESCRIPTION.is_empty());
    }
}
