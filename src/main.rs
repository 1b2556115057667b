use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use planwright_core::generation::GenerationGateway;
use planwright_engine::{AssetLibrary, ContextAssembler, PackagingConfig, PackagingEngine, SessionService};
use planwright_llm::{BoundedGateway, GeminiConfig, GeminiGateway, MockGateway};
use planwright_server::{AppState, ServerConfig};
use planwright_settings::{PlanwrightSettings, SessionBackend};
use planwright_store::{Database, DocumentStore, FileSessionRepo, PackageRepo, SessionRepository, SqliteSessionRepo};
use planwright_telemetry::TelemetryConfig;

const MOCK_REPLY: &str = "Generation is running in mock mode. Configure GEMINI_API_KEY for real output.";

/// Planwright planning-workflow server.
#[derive(Parser, Debug)]
#[command(name = "planwright", version, about)]
struct Cli {
    /// Settings file. Defaults to `{dataDir}/settings.json`.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Root for the database, artifacts and packages.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory holding personas/, templates/ and checklists/.
    #[arg(long)]
    assets_dir: Option<PathBuf>,

    /// Answer every generation request with canned text instead of calling Gemini.
    #[arg(long)]
    mock_generation: bool,
}

impl Cli {
    fn apply(&self, settings: &mut PlanwrightSettings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.data_dir {
            settings.storage.data_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(dir) = &self.assets_dir {
            settings.assets.root = dir.to_string_lossy().into_owned();
        }
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<PlanwrightSettings> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => cli
            .data_dir
            .clone()
            .unwrap_or_else(planwright_settings::default_data_dir)
            .join("settings.json"),
    };
    let mut settings = planwright_settings::load_settings_from_path(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

fn build_gateway(
    settings: &PlanwrightSettings,
    mock: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<Arc<dyn GenerationGateway>> {
    let inner: Arc<dyn GenerationGateway> = if mock {
        tracing::warn!("mock generation enabled");
        Arc::new(MockGateway::always(MOCK_REPLY))
    } else {
        let api_key = std::env::var("GEMINI_API_KEY").ok().map(SecretString::from);
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; generation endpoints will answer 503");
        }
        let gen = &settings.generation;
        let config = GeminiConfig {
            base_url: gen.base_url.clone(),
            model: gen.model.clone(),
            max_output_tokens: gen.max_output_tokens,
            temperature: gen.temperature,
        };
        Arc::new(GeminiGateway::new(api_key, config).context("building Gemini client")?)
    };
    Ok(Arc::new(BoundedGateway::new(
        inner,
        Duration::from_secs(settings.generation.timeout_secs),
        shutdown,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let logging = &settings.logging;
    let telemetry = TelemetryConfig::from_levels(
        &logging.level,
        logging.modules.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        logging.json,
    )?;
    planwright_telemetry::init_telemetry(&telemetry)?;

    tracing::info!("Starting Planwright server");

    let storage = &settings.storage;
    let data_dir = storage.data_dir();
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating {}", data_dir.display()))?;
    let packages_dir = storage.packages_dir();
    std::fs::create_dir_all(&packages_dir)
        .with_context(|| format!("creating {}", packages_dir.display()))?;

    let db_path = storage.database_path();
    let db = Database::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "Database opened");

    let repo: Arc<dyn SessionRepository> = match storage.session_backend {
        SessionBackend::Sqlite => Arc::new(SqliteSessionRepo::new(db.clone())),
        SessionBackend::Files => Arc::new(FileSessionRepo::new(storage.sessions_dir())),
    };

    let shutdown = CancellationToken::new();
    let documents = DocumentStore::new(storage.artifacts_dir());
    let library = AssetLibrary::new(PathBuf::from(&settings.assets.root));
    if !library.root().is_dir() {
        tracing::warn!(path = %library.root().display(), "assets directory not found");
    }

    let sessions = Arc::new(SessionService::new(repo, documents.clone(), library.clone()));
    let gateway = build_gateway(&settings, cli.mock_generation, shutdown.clone())?;
    let assembler = Arc::new(ContextAssembler::new(
        gateway,
        library.clone(),
        documents.clone(),
        Arc::clone(&sessions),
    ));

    let pkg = &settings.packaging;
    let packaging = Arc::new(PackagingEngine::new(
        Arc::clone(&sessions),
        documents.clone(),
        PackageRepo::new(db),
        PackagingConfig {
            output_dir: packages_dir,
            download_retention: chrono_secs(pkg.download_retention_secs),
            unclaimed_ttl: chrono_secs(pkg.unclaimed_ttl_secs),
        },
    ));
    let sweeper = Arc::clone(&packaging).spawn_sweeper(
        Duration::from_secs(pkg.sweep_interval_secs),
        shutdown.clone(),
    );

    let server = &settings.server;
    let config = ServerConfig {
        host: server.host.clone(),
        port: server.port,
        request_timeout: Duration::from_secs(server.request_timeout_secs),
        body_limit_bytes: server.body_limit_bytes,
        cors_origins: server.cors_origins.clone(),
    };
    let state = AppState {
        sessions,
        assembler,
        packaging,
        library,
        documents,
        started_at: Instant::now(),
    };
    let handle = planwright_server::start(config, state, shutdown.clone())
        .await
        .context("starting HTTP server")?;
    tracing::info!(port = handle.port(), backend = ?storage.session_backend, "Planwright server ready");

    tokio::signal::ctrl_c().await.context("listening for ctrl+c")?;
    tracing::info!("Shutting down");
    shutdown.cancel();
    handle.wait().await;
    let _ = sweeper.await;
    Ok(())
}

/// Retention settings are capped at ten years.
fn chrono_secs(secs: u64) -> chrono::Duration {
    const MAX_SECS: u64 = 10 * 365 * 24 * 60 * 60;
    chrono::Duration::seconds(secs.min(MAX_SECS) as i64)
}
