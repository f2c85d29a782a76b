use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;

use sibyl_agents::{EmbeddingTableSelector, LlmClient, LlmInsightAgent, LlmSqlAuthor, PgExecutor};
use sibyl_core::catalog::Catalog;
use sibyl_core::resolver::{QueryResolver, ResolverOptions};
use sibyl_core::store::MemoryStore;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::metrics::Metrics;

pub struct Server {
    pub state: Arc<ServerState>,
}

pub struct ServerState {
    pub config: ServerConfig,
    pub catalog: Arc<Catalog>,
    pub store: Arc<MemoryStore>,
    /// `None` when the LLM credentials or database URL are missing; `/ask`
    /// then reports `agent_not_configured` instead of failing at startup.
    pub resolver: Option<Arc<QueryResolver>>,
    pub metrics: Metrics,
}

impl Server {
    /// Load the catalog, wire the collaborators, and assemble the state.
    ///
    /// Async because the table selector embeds every catalog description
    /// up front and the executor opens its database connection here.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::load(&config.catalog_path)?);
        let store = Arc::new(MemoryStore::new());
        let metrics = Metrics::new()?;

        let resolver = if config.llm.is_configured() && !config.database_url.is_empty() {
            Some(Arc::new(
                build_resolver(&config, catalog.clone(), store.clone()).await?,
            ))
        } else {
            tracing::warn!(
                "LLM credentials or database_url missing; /ask will report agent_not_configured"
            );
            None
        };

        Ok(Self {
            state: Arc::new(ServerState {
                config,
                catalog,
                store,
                resolver,
                metrics,
            }),
        })
    }

    pub async fn run(self) -> Result<()> {
        if self.state.config.tracing_enabled {
            init_tracing();
        }

        let (shutdown_tx, _) = broadcast::channel(2);
        let http_state = self.state.clone();
        let admin_state = self.state.clone();
        let sweep_state = self.state.clone();
        let http_shutdown = shutdown_tx.subscribe();
        let admin_shutdown = shutdown_tx.subscribe();
        let sweep_shutdown = shutdown_tx.subscribe();

        let http_task = tokio::spawn(run_http(http_state, http_shutdown));
        let admin_task = tokio::spawn(run_admin(admin_state, admin_shutdown));
        let sweep_task = tokio::spawn(run_sweep(sweep_state, sweep_shutdown));

        wait_for_shutdown(shutdown_tx.clone()).await;
        let _ = shutdown_tx.send(());

        http_task
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))??;
        admin_task
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))??;
        sweep_task
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))??;
        Ok(())
    }
}

async fn build_resolver(
    config: &ServerConfig,
    catalog: Arc<Catalog>,
    store: Arc<MemoryStore>,
) -> Result<QueryResolver> {
    let client = Arc::new(LlmClient::new(config.llm.to_client_config())?);
    let selector = Arc::new(EmbeddingTableSelector::build(client.clone(), &catalog).await?);
    let author = Arc::new(LlmSqlAuthor::new(client.clone()));
    let executor = Arc::new(PgExecutor::connect(&config.database_url).await?);
    let insight = Arc::new(LlmInsightAgent::new(client));

    let options = ResolverOptions {
        top_k: config.top_k,
        max_iterations: config.max_iterations,
        cache_ttl: config.cache_ttl,
        conversation_ttl: config.conversation_ttl,
        max_rows: config.max_rows,
    };

    Ok(
        QueryResolver::new(catalog, selector, author, executor, store)
            .with_insight(insight)
            .with_options(options),
    )
}

async fn run_http(state: Arc<ServerState>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let app = crate::http::router(state.clone());
    let addr = state.config.http_bind;
    let shutdown_signal = async move {
        let _ = shutdown.recv().await;
    };
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|err| ServerError::Internal(err.to_string()))?;
    Ok(())
}

async fn run_admin(state: Arc<ServerState>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let app = crate::http::admin_router(state.clone());
    let addr = state.config.admin_bind;
    let shutdown_signal = async move {
        let _ = shutdown.recv().await;
    };
    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|err| ServerError::Internal(err.to_string()))?;
    Ok(())
}

/// Periodically evict expired cache and conversation entries.
async fn run_sweep(state: Arc<ServerState>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let mut interval = tokio::time::interval(state.config.sweep_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                state.store.sweep_expired();
            }
            _ = shutdown.recv() => break,
        }
    }
    Ok(())
}

async fn wait_for_shutdown(signal: broadcast::Sender<()>) {
    #[cfg(unix)]
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            let _ = signal.send(());
            return;
        }
    };

    #[cfg(unix)]
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    let _ = signal.send(());
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
