//! routed - Skill Routing Daemon
//!
//! Library components for the daemon process.

pub mod catalog;
pub mod embeddings;
pub mod logger;
pub mod metrics;
pub mod server;
pub mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::WrapErr;
use route_core::Config;
use server::AppState;
use storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Project-local config file, relative to the workspace root.
pub const PROJECT_CONFIG_PATH: &str = ".router/config";

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
    /// HTTP server port (default: 7700).
    pub port: u16,
    /// Auth token for the HTTP API (optional).
    pub auth_token: Option<String>,
    /// Explicit config file; overrides `.router/config`.
    pub config_path: Option<PathBuf>,
    /// Root for `.router/config` and relative catalog paths.
    pub workspace_root: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            port: 7700,
            auth_token: std::env::var("ROUTED_AUTH_TOKEN").ok(),
            config_path: None,
            workspace_root: PathBuf::from("."),
        }
    }
}

/// Get the default database path (~/.local/share/routed/routed.db).
fn default_db_path() -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local/share")
        });
    data_dir.join("routed").join("routed.db")
}

/// Load router config: defaults, then `.router/config`, then the explicit file.
pub fn load_config(workspace_root: &Path, explicit: Option<&Path>) -> eyre::Result<Config> {
    let mut config = Config::default();

    let project_config = workspace_root.join(PROJECT_CONFIG_PATH);
    if project_config.is_file() {
        config
            .load_file(&project_config)
            .wrap_err_with(|| format!("failed to load {}", project_config.display()))?;
    }
    if let Some(path) = explicit {
        config
            .load_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?;
    }

    config.resolve_paths(workspace_root);
    Ok(config)
}

/// Daemon state.
pub struct Daemon {
    config: DaemonConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
}

impl Daemon {
    /// Create a new daemon with the given configuration.
    pub async fn new(config: DaemonConfig) -> eyre::Result<Self> {
        let router_config = load_config(&config.workspace_root, config.config_path.as_deref())?;

        let storage = Storage::new(&config.db_path)
            .await
            .wrap_err("failed to open database")?
            .with_categories(&router_config.sequence_category, &router_config.hitl_category);
        storage
            .migrate_embedded()
            .await
            .wrap_err("failed to run migrations")?;

        let state = Arc::new(AppState::new(
            Arc::new(storage),
            router_config,
            config.auth_token.clone(),
        ));

        Ok(Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Shared handler state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(&self) -> eyre::Result<()> {
        let router_config = &self.state.config;
        info!("routed starting on port {}", self.config.port);
        info!("database: {}", self.config.db_path.display());
        info!(
            sequence_threshold = router_config.sequence_threshold,
            individual_threshold = router_config.individual_threshold,
            semantic_enabled = router_config.semantic_enabled,
            "routing config"
        );
        if self.config.auth_token.is_some() {
            info!("auth token: enabled");
        }

        if router_config.catalog_import_on_start {
            let summary = catalog::import_catalog(
                &self.state.storage,
                &self.state.embedder,
                &router_config.catalog_dir,
                &router_config.sequence_category,
            )
            .await;
            if summary.failed > 0 {
                warn!("{} catalog definition(s) failed to import", summary.failed);
            }
        }

        let http_state = Arc::clone(&self.state);
        let http_port = self.config.port;
        let http_shutdown = self.shutdown.clone();
        let http_handle = tokio::spawn(async move {
            if let Err(e) = server::start_server(http_state, http_port, http_shutdown).await {
                error!("HTTP server error: {}", e);
            }
        });

        self.shutdown.cancelled().await;
        info!("shutdown signal received, exiting");
        if let Err(e) = http_handle.await {
            warn!("HTTP server task ended abnormally: {}", e);
        }

        Ok(())
    }

    /// Signal the daemon to shut down.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_config_layers_project_and_explicit_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join(".router")).unwrap();
        std::fs::write(
            tmp.path().join(PROJECT_CONFIG_PATH),
            "max_candidates=3\nsemantic_enabled=true\n",
        )
        .unwrap();
        let explicit = tmp.path().join("override.conf");
        std::fs::write(&explicit, "max_candidates=4\n").unwrap();

        let config = load_config(tmp.path(), Some(&explicit)).unwrap();
        assert_eq!(config.max_candidates, 4);
        assert!(config.semantic_enabled);
        assert_eq!(config.catalog_dir, tmp.path().join("skills"));
    }

    #[test]
    fn load_config_without_files_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path(), None).unwrap();
        assert_eq!(config.max_candidates, 5);
    }

    #[test]
    fn load_config_rejects_candidate_cap_above_five() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("override.conf");
        std::fs::write(&explicit, "max_candidates=7\n").unwrap();
        assert!(load_config(tmp.path(), Some(&explicit)).is_err());
    }

    #[test]
    fn load_config_reports_missing_explicit_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_config(tmp.path(), Some(&tmp.path().join("missing"))).is_err());
    }

    #[tokio::test]
    async fn daemon_imports_catalog_before_serving() {
        let tmp = TempDir::new().unwrap();
        let skills = tmp.path().join("skills");
        std::fs::create_dir_all(&skills).unwrap();
        std::fs::write(
            skills.join("email.yaml"),
            "key: draft-email\ncategory: email\ntriggers:\n  - pattern: draft an email\n",
        )
        .unwrap();

        let daemon = Daemon::new(DaemonConfig {
            db_path: tmp.path().join("routed.db"),
            port: 0,
            auth_token: None,
            config_path: None,
            workspace_root: tmp.path().to_path_buf(),
        })
        .await
        .unwrap();

        daemon.shutdown();
        daemon.run().await.unwrap();

        let skill = daemon.state().storage.get_skill("draft-email").await.unwrap();
        assert_eq!(skill.category, "email");
    }
}
