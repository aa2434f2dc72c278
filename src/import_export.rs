/*!
 * Import / Export Module for spicytodo
 *
 * Bulk load and dump of the catalog, independent of any wire format:
 * - `append` or `replace` imports with per-row validation
 * - status-filtered exports of the full catalog
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::TodoResult;
use crate::search_engine::{SearchEngine, StatusFilter};
use crate::store::TaskStore;
use crate::task_manager::{Task, TaskDraft};
use crate::validation::{DueDateRule, TaskFields, ValidationError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Append,
    Replace,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Append => f.write_str("append"),
            ImportMode::Replace => f.write_str("replace"),
        }
    }
}

impl FromStr for ImportMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(ImportMode::Append),
            "replace" => Ok(ImportMode::Replace),
            other => Err(ValidationError::new(
                "invalid_import_mode",
                "mode",
                format!("Invalid import mode '{}'. Must be 'append' or 'replace'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub message: String,
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub data: Vec<Task>,
    pub count: usize,
    pub filter: StatusFilter,
    pub exported_at: DateTime<Utc>,
}

pub struct TaskTransfer {
    store: Arc<TaskStore>,
    search: SearchEngine,
}

impl TaskTransfer {
    pub fn new(store: Arc<TaskStore>) -> Self {
        let search = SearchEngine::new(Arc::clone(&store));
        Self { store, search }
    }

    /// `import_many` with the mode given as a caller-supplied string.
    pub fn import_raw(&self, drafts: Vec<TaskDraft>, mode: Option<&str>) -> TodoResult<ImportResult> {
        let mode = match mode {
            Some(raw) => raw.parse::<ImportMode>().map_err(ValidationErrors::single)?,
            None => ImportMode::default(),
        };
        Ok(self.import_many(drafts, mode))
    }

    /// Validates each row on its own; bad rows are skipped and reported as
    /// `Row N: ...` (1-based). Past due dates are accepted so exported
    /// overdue tasks can be loaded back.
    pub fn import_many(&self, drafts: Vec<TaskDraft>, mode: ImportMode) -> ImportResult {
        let today = self.store.today();
        let validation = self.store.validation();

        let mut accepted: Vec<TaskFields> = Vec::with_capacity(drafts.len());
        let mut errors = Vec::new();
        for (index, draft) in drafts.iter().enumerate() {
            match validation.validate_draft(draft, today, DueDateRule::AllowPast) {
                Ok(fields) => accepted.push(fields),
                Err(violations) => errors.push(format!("Row {}: {}", index + 1, violations)),
            }
        }

        let (replaced, imported_at) = self.store.mutate(|txn| {
            let replaced = if mode == ImportMode::Replace { txn.clear() } else { 0 };
            for fields in accepted.drain(..) {
                txn.insert_new(fields);
            }
            (replaced, txn.now)
        });

        let imported = drafts.len() - errors.len();
        let skipped = errors.len();
        if skipped > 0 {
            warn!(skipped, "Import skipped invalid rows");
        }
        info!(mode = %mode, imported, replaced, "Import finished");

        ImportResult {
            message: format!("Imported {} tasks", imported),
            imported,
            skipped,
            errors,
            imported_at,
        }
    }

    /// Every task matching `status` (absent or unknown means all), snoozed
    /// ones included.
    pub fn export_all(&self, status: Option<&str>) -> ExportResult {
        let filter = StatusFilter::parse_lenient(status);
        let data = self.search.by_status(filter);
        info!(filter = filter.as_str(), count = data.len(), "Export prepared");
        ExportResult {
            count: data.len(),
            data,
            filter,
            exported_at: self.store.now(),
        }
    }
}
