use std::path::PathBuf;
use std::sync::Arc;

use chrono::Days;
use clap::{Arg, ArgAction, Command};
use tracing::info;

use spicytodo::logging::{DEFAULT_LOG_LEVEL, init_logging};
use spicytodo::{
    JsonRpcServer, Priority, RecurrenceRule, SnapshotRepository, StorageManager, TaskDraft,
    TaskStore, TodoHandler,
};

fn sample_tasks(store: &TaskStore) -> Vec<TaskDraft> {
    let today = store.today();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    vec![
        TaskDraft::new("Review pull requests")
            .with_priority(Priority::High)
            .with_due_date(today)
            .with_tags(["work"])
            .with_category("Work"),
        TaskDraft::new("Water the plants")
            .with_priority(Priority::Low)
            .with_due_date(tomorrow)
            .with_recurrence(RecurrenceRule::Weekly)
            .with_category("Home"),
        TaskDraft::new("Plan weekend trip").with_tags(["personal", "travel"]),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("spicytodo")
        .version(spicytodo::VERSION)
        .about("Todo task store with a JSON-RPC interface over stdio")
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("PATH")
                .help("Directory for the tasks.json snapshot; omit to keep tasks in memory only"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Execution mode: server, stats, export")
                .value_parser(["server", "stats", "export"])
                .default_value("server"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter used when RUST_LOG is not set")
                .default_value(DEFAULT_LOG_LEVEL),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Load sample tasks when the store starts empty")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or(DEFAULT_LOG_LEVEL);
    init_logging(log_level);

    let mode = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("server");
    let data_dir = matches.get_one::<String>("data-dir").map(PathBuf::from);
    info!(version = spicytodo::VERSION, mode, data_dir = ?data_dir, "Starting spicytodo");

    let store = Arc::new(TaskStore::new());
    let mut handler = TodoHandler::new(Arc::clone(&store));

    if let Some(data_dir) = &data_dir {
        let storage = Arc::new(StorageManager::new(data_dir));
        storage.initialize().await?;
        let loaded = storage.hydrate(&store).await?;
        info!(tasks = loaded, path = ?storage.tasks_file(), "Loaded snapshot");
        handler = handler.with_repository(storage);
    }

    if matches.get_flag("seed") && store.is_empty() {
        for draft in sample_tasks(&store) {
            handler.create_task(draft).await?;
        }
        info!(tasks = store.len(), "Seeded sample tasks");
    }

    match mode {
        "server" => {
            let server = JsonRpcServer::new(Box::new(handler));
            server.run_stdio().await?;
        }
        "stats" => {
            let stats = handler.get_statistics().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "export" => {
            let export = handler.export_tasks(Default::default()).await?;
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
        other => anyhow::bail!("Unknown mode: {}. Use 'server', 'stats' or 'export'", other),
    }
    Ok(())
}
