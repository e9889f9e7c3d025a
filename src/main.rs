mod api;
mod attachments_api;
mod auth;
mod config;
mod error;
mod models;
mod notes_api;
mod rate_limit;
mod store;
mod sweeper;
mod token;
mod upload_store;
mod weather;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::header,
    routing::{delete, get, post},
    Router,
};
use config::Config;
use rate_limit::RateLimiter;
use store::Db;
use token::TokenSigner;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};
use weather::WeatherClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub tokens: TokenSigner,
    pub weather: WeatherClient,
    pub login_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: Db) -> Result<Self> {
        let tokens = TokenSigner::new(&config.jwt_secret, config.token_ttl_seconds);
        let weather = WeatherClient::new(
            config.weather_api_key.clone(),
            config.weather_api_base.clone(),
        )?;
        let login_limiter = Arc::new(RateLimiter::new(
            config.login_rate_limit_per_minute,
            config.login_rate_limit_burst,
        ));
        Ok(Self {
            config,
            db,
            tokens,
            weather,
            login_limiter,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/healthz", get(api::healthz))
        .route("/api", get(api::welcome))
        .route("/api/auth/register", post(api::register))
        .route("/api/auth/login", post(api::login))
        .route("/api/auth/signup-status", get(api::signup_status))
        .route("/api/auth/toggle-signup", post(api::toggle_signup))
        .route(
            "/api/user/profile",
            get(api::get_profile)
                .put(api::update_profile)
                .delete(api::delete_account),
        )
        .route("/api/dashboard", get(api::dashboard))
        .route(
            "/api/notebooks",
            get(notes_api::list_notebooks).post(notes_api::create_notebook),
        )
        .route(
            "/api/notebooks/{id}",
            axum::routing::put(notes_api::rename_notebook).delete(notes_api::delete_notebook),
        )
        .route(
            "/api/notes",
            get(notes_api::list_notes).post(notes_api::create_note),
        )
        .route(
            "/api/notes/notebook/{notebook_id}",
            get(notes_api::list_notebook_notes),
        )
        .route("/api/notes/tag/{name}", get(notes_api::list_tagged_notes))
        .route(
            "/api/notes/{id}",
            get(notes_api::get_note)
                .put(notes_api::update_note)
                .delete(notes_api::delete_note),
        )
        .route("/api/notes/{id}/tags", post(notes_api::add_tag))
        .route(
            "/api/notes/{id}/tags/{tag_id}",
            delete(notes_api::remove_tag),
        )
        .route("/api/tags", get(notes_api::list_tags))
        .route("/api/search", get(notes_api::search))
        .route(
            "/api/attachments/note/{note_id}",
            post(attachments_api::upload_attachment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/attachments/{id}",
            get(attachments_api::download_attachment)
                .delete(attachments_api::delete_attachment),
        )
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notes_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret_is_fallback {
        warn!("Using a generated JWT secret; issued tokens will not survive a restart");
    }
    upload_store::ensure_upload_root(&config.upload_dir).await?;

    let db_path = config.db_source.clone();
    let db = tokio::task::spawn_blocking(move || Db::open(&db_path))
        .await
        .context("Database open task failed")?
        .with_context(|| format!("Failed to open database {}", config.db_source.display()))?;
    if !db.fts_enabled() {
        warn!("Full-text search unavailable; search falls back to LIKE matching");
    }

    let state = AppState::new(config.clone(), db)?;
    if state.weather.is_configured() {
        info!("Dashboard weather enabled via {}", config.weather_api_base);
    } else {
        info!("WEATHER_API_KEY not set; dashboard weather disabled");
    }

    if let Some(every) = config.upload_sweep_interval {
        sweeper::spawn_upload_sweeper(state.clone(), every);
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("notes-api listening on {}", config.bind_addr);
    info!("Health check available at http://{}/api", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };

    use crate::testing::TestApp;

    #[tokio::test]
    async fn preflight_allows_bearer_authorization() {
        let app = TestApp::new();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/notes")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "GET")
            .header("access-control-request-headers", "authorization,content-type")
            .body(Body::empty())
            .unwrap();

        let (status, headers, _) = app.dispatch(request).await;
        assert_eq!(status, StatusCode::OK);
        let allowed = headers["access-control-allow-headers"]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(allowed.contains("authorization"), "{allowed}");
        assert!(allowed.contains("content-type"), "{allowed}");
        assert_ne!(allowed, "*");
    }
}
