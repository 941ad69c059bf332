use axum::{routing::{get, post}, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod db;
mod state;

use knowhub_backend::config;
use knowhub_backend::search::{DbIndex, SearchEngine};
use knowhub_backend::source::SqliteCatalog;
use state::AppState;

/// Build the HTTP router / 路由
fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(api::server::health_check))
        .route("/api/search", get(api::search::search))
        .route("/api/search/fts", get(api::search::search_fts))
        .route("/api/search/suggestions", get(api::search::suggestions))
        .route("/api/search/popular-tags", get(api::search::popular_tags))
        .route("/api/search/tags/autocomplete", get(api::search::autocomplete_tags))
        // 搜索管理API
        .route("/api/admin/search/status", get(api::search::get_index_status))
        .route("/api/admin/search/index/rebuild", post(api::search::rebuild_index))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "knowhub_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration / 加载配置
    let app_config = config::load_config()?;
    tracing::info!("Server will listen on {}", app_config.get_bind_address());

    // Create data directory if not exists / 创建数据目录
    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let options = SqliteConnectOptions::from_str(&app_config.get_database_url())?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    db::run_migrations(&pool).await?;

    let catalog = SqliteCatalog::new(pool.clone());
    catalog.init().await?;

    // 搜索引擎：启动时构建一次，通过 AppState 共享
    let search = Arc::new(SearchEngine::new(
        DbIndex::new(pool.clone()),
        Arc::new(catalog),
        app_config.search.clone(),
    ));
    search.ensure_schema().await?;

    let bind_addr = app_config.get_bind_address();
    let state = Arc::new(AppState::new(pool, search, app_config));

    let app = routes(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    state.search.index().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use knowhub_backend::config::AppConfig;
    use knowhub_backend::search::ContentType;
    use knowhub_backend::source::SourceCatalog;
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        let catalog = SqliteCatalog::new(pool.clone());
        catalog.init().await.unwrap();

        sqlx::query("INSERT INTO users (id, username, is_admin, enabled, created_at, updated_at) VALUES ('u1', 'alice', 1, 1, datetime('now'), datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES ('s1', 'u1', datetime('now', '+1 day'), datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO notes (id, owner_id, title, content, created_at, updated_at) VALUES ('n1', 'u1', 'Python Guide', 'basics', ?, ?)")
            .bind(Utc::now())
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        assert!(catalog.get_record(ContentType::Note, "n1").await.unwrap().is_some());

        let config = AppConfig::default();
        let search = Arc::new(SearchEngine::new(DbIndex::new(pool.clone()), Arc::new(catalog), config.search.clone()));
        search.ensure_schema().await.unwrap();
        search.rebuild(None).await.unwrap();
        Arc::new(AppState::new(pool, search, config))
    }

    async fn get_json(app: Router, uri: &str, session: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(session) = session {
            request = request.header(header::COOKIE, format!("{}={}", auth::SESSION_COOKIE_NAME, session));
        }
        let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(routes(test_state().await), "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_search_requires_session() {
        let (status, _) = get_json(routes(test_state().await), "/api/search?q=python", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let app = routes(test_state().await);
        let (status, body) = get_json(app.clone(), "/api/search?q=python&content_types=notes", Some("s1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["search_type"], "fts");
        assert_eq!(body["results"][0]["type"], "note");
        assert_eq!(body["results"][0]["relevance_level"], "high");

        let (status, body) = get_json(app.clone(), "/api/search?q=python&sort_by=size", Some("s1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "search failed");

        let (status, body) = get_json(app.clone(), "/api/search/suggestions?q=py", Some("s1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["suggestions"][0], "Python Guide");

        let (status, body) = get_json(app, "/api/admin/search/status", Some("s1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_documents"], 1);
    }

    #[tokio::test]
    async fn test_rebuild_releases_slot() {
        let state = test_state().await;
        for _ in 0..2 {
            let request = Request::builder()
                .method("POST")
                .uri("/api/admin/search/index/rebuild")
                .header(header::COOKIE, format!("{}=s1", auth::SESSION_COOKIE_NAME))
                .body(Body::empty())
                .unwrap();
            let response = routes(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["code"], 200);
            assert_eq!(body["data"]["indexed"]["note"], 1);
        }
        assert!(!state.rebuild.is_running());
    }
}
