//! Application state: config, storage, collaborators, and the engine.

use std::path::PathBuf;
use std::sync::Arc;

use profisync_core::collaborator::{IdentityDirectory, ProfileStore};
use profisync_core::engine::Engine;
use profisync_core::event::bus::EventBus;
use profisync_core::registry::WorkflowRegistry;
use profisync_infra::backend::{DirectoryBackend, ProfileStoreBackend};
use profisync_infra::functions::FunctionRegistry;
use profisync_infra::memory::MemoryIdentityDirectory;
use profisync_infra::sqlite::{
    DatabasePool, SqliteProfileStore, SqliteRunRepository, default_database_url,
};
use profisync_types::config::GlobalConfig;
use profisync_types::profile::{LAST_ID_FIELD, META_KEY};

/// Shared application state for the CLI and the HTTP front door.
#[derive(Clone)]
pub struct AppState {
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
    pub registry: Arc<WorkflowRegistry>,
    pub engine: Arc<Engine<SqliteRunRepository>>,
    pub repo: Arc<SqliteRunRepository>,
    pub store: Arc<SqliteProfileStore>,
    pub directory: Arc<MemoryIdentityDirectory>,
}

impl AppState {
    /// Initialize config, database, collaborators, and the engine.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let database_url = config
            .database_url
            .clone()
            .unwrap_or_else(default_database_url);

        let pool = DatabasePool::new(&database_url).await?;
        let store = Arc::new(SqliteProfileStore::new(pool.clone()));
        let directory = Arc::new(MemoryIdentityDirectory::new());
        let repo = Arc::new(SqliteRunRepository::new(pool));

        // The allocation protocol needs the counter item to exist.
        if store.get(META_KEY).await.ok().flatten().is_none() {
            store
                .put(META_KEY, serde_json::json!({ LAST_ID_FIELD: 0 }))
                .await
                .map_err(|e| anyhow::anyhow!("failed to seed the counter item: {e}"))?;
            tracing::info!("seeded the profile-meta counter item");
        }

        let functions = Arc::new(FunctionRegistry::builtin(
            Arc::clone(&store) as Arc<dyn ProfileStore>
        ));
        let event_bus = EventBus::new(config.event_capacity);
        let engine = Engine::new(Arc::clone(&repo), functions, event_bus)
            .with_backend(
                "profile-store",
                Arc::new(ProfileStoreBackend::new(
                    Arc::clone(&store) as Arc<dyn ProfileStore>
                )),
            )
            .with_backend(
                "identity-directory",
                Arc::new(DirectoryBackend::new(
                    Arc::clone(&directory) as Arc<dyn IdentityDirectory>
                )),
            );

        // Built-in workflows, plus any YAML definitions dropped into
        // <data_dir>/workflows.
        let mut registry = WorkflowRegistry::with_builtin();
        let workflows_dir = data_dir.join("workflows");
        if workflows_dir.exists() {
            match registry.load_dir(&workflows_dir) {
                Ok(count) if count > 0 => {
                    tracing::info!(count, "loaded extra workflow definitions")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to load extra workflows"),
            }
        }

        Ok(Self {
            config,
            data_dir,
            registry: Arc::new(registry),
            engine: Arc::new(engine),
            repo,
            store,
            directory,
        })
    }
}

/// Data directory: `PROFISYNC_DATA_DIR` or `~/.profisync`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PROFISYNC_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".profisync")
}

async fn load_config(data_dir: &std::path::Path) -> GlobalConfig {
    let path = data_dir.join("config.toml");
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(?path, error = %e, "invalid config.toml, using defaults");
                GlobalConfig::default()
            }
        },
        Err(_) => GlobalConfig::default(),
    }
}
