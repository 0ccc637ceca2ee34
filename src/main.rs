use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use rca_system::api;
use rca_system::config::Config;
use rca_system::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    if config.llm.is_configured() {
        tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    } else {
        tracing::warn!("LLM_API_KEY not set; AI endpoints will use fallback responses");
    }

    let state = AppState::new(config.clone())?;

    // Permissive CORS: the React frontend runs on its own dev origin.
    let app = Router::new()
        // Record CRUD
        .route("/api/rca", post(api::records::create))
        .route("/api/rca", get(api::records::list))
        .route("/api/rca/search", get(api::records::search))
        .route("/api/rca/stats", get(api::records::stats))
        .route("/api/rca/{id}", get(api::records::get_by_id))
        .route("/api/rca/{id}", put(api::records::update))
        .route("/api/rca/{id}", delete(api::records::delete))
        // AI assist
        .route("/api/ai/similarity", post(api::assist::similarity))
        .route("/api/ai/assist", post(api::assist::assist))
        .route("/api/ai/validate-rootcause", post(api::assist::validate_root_cause))
        .route("/api/ai/summarize", post(api::assist::summarize))
        // Problem solver
        .route("/api/solver/search", post(api::solver::search_solutions))
        .route("/api/solver/guide", post(api::solver::guide))
        .route("/api/solver/chat", post(api::solver::chat))
        .route("/api/solver/feedback", post(api::solver::feedback))
        .route("/api/solver/suggest", get(api::solver::suggest))
        // Health
        .route("/api/health", get(api::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
