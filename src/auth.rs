use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_cookies::Cookies;

/// Session cookie set by the login service / 会话Cookie名称
pub const SESSION_COOKIE_NAME: &str = "session_id";

pub type AuthError = (StatusCode, Json<Value>);

/// Authenticated caller / 当前用户
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub is_admin: bool,
}

/// Resolve the session cookie to a user; 401 when absent or expired
pub async fn current_user(db: &SqlitePool, cookies: &Cookies) -> Result<CurrentUser, AuthError> {
    let session_id = cookies
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, Json(json!({"error": "not logged in"}))))?;
    user_for_session(db, &session_id).await
}

/// Look up the live, enabled user behind a session id
pub async fn user_for_session(db: &SqlitePool, session_id: &str) -> Result<CurrentUser, AuthError> {
    let user: Option<(String, bool)> = sqlx::query_as(
        "SELECT u.id, u.is_admin FROM users u
         JOIN sessions s ON u.id = s.user_id
         WHERE s.id = ? AND s.expires_at > datetime('now') AND u.enabled = 1",
    )
    .bind(session_id)
    .fetch_optional(db)
    .await
    .map_err(|e| {
        tracing::error!("Session lookup failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "server error"})))
    })?;

    match user {
        Some((id, is_admin)) => Ok(CurrentUser { id, is_admin }),
        None => Err((StatusCode::UNAUTHORIZED, Json(json!({"error": "session expired"})))),
    }
}

/// 验证管理员权限
pub async fn require_admin(db: &SqlitePool, cookies: &Cookies) -> Result<CurrentUser, AuthError> {
    let user = current_user(db, cookies).await?;
    if !user.is_admin {
        return Err((StatusCode::FORBIDDEN, Json(json!({"error": "admin required"}))));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        sqlx::query("INSERT INTO users (id, username, is_admin, enabled, created_at, updated_at) VALUES ('u1', 'alice', 0, 1, datetime('now'), datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES ('live', 'u1', datetime('now', '+1 day'), datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES ('old', 'u1', datetime('now', '-1 day'), datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_session_resolution() {
        let pool = pool().await;

        let user = user_for_session(&pool, "live").await.unwrap();
        assert_eq!(user.id, "u1");
        assert!(!user.is_admin);

        let err = user_for_session(&pool, "old").await.unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
        let err = user_for_session(&pool, "missing").await.unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }
}
