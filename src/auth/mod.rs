//! Login sessions
//!
//! Credential storage is a JSON file next to the binary; login sessions
//! are in-memory tokens carried in an HttpOnly cookie. Process-lifetime
//! only: a restart logs everyone out.

use std::collections::HashSet;
use std::path::Path;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::state::AppState;

/// Session cookie name
pub const SESSION_COOKIE: &str = "spacecam_session";

#[derive(Debug, Clone, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

/// Credential check + in-memory session tokens
pub struct AuthService {
    credentials: Credentials,
    sessions: RwLock<HashSet<String>>,
}

impl AuthService {
    /// Load credentials from `path`; falls back to the default
    /// admin/admin pair (with a warning) when the file is absent.
    pub async fn load(path: &Path) -> Result<Self> {
        let credentials = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Credentials file missing, using default admin/admin"
                );
                Credentials::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            credentials,
            sessions: RwLock::new(HashSet::new()),
        })
    }

    /// Verify a login attempt; on success returns a fresh session token
    pub async fn login(&self, username: &str, password: &str) -> Option<String> {
        if username != self.credentials.username || password != self.credentials.password {
            tracing::warn!(username = %username, "Failed login attempt");
            return None;
        }
        let token = Uuid::new_v4().to_string();
        self.sessions.write().await.insert(token.clone());
        tracing::info!(username = %username, "Login successful");
        Some(token)
    }

    pub async fn logout(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    pub async fn is_valid(&self, token: &str) -> bool {
        self.sessions.read().await.contains(token)
    }
}

/// Router middleware: every protected route requires a valid session cookie
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, Error> {
    let token = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_token);

    match token {
        Some(token) if state.auth.is_valid(&token).await => Ok(next.run(request).await),
        _ => Err(Error::Unauthorized("login required".to_string())),
    }
}

/// Pull the session token out of a Cookie header value
pub fn session_token(header_value: &str) -> Option<String> {
    header_value.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Build the Set-Cookie value establishing a session
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax")
}

/// Build the Set-Cookie value clearing the session
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn service() -> AuthService {
        let tmp = TempDir::new().unwrap();
        AuthService::load(&tmp.path().join("credentials.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn default_credentials_when_file_missing() {
        let auth = service().await;
        assert!(auth.login("admin", "admin").await.is_some());
        assert!(auth.login("admin", "wrong").await.is_none());
        assert!(auth.login("root", "admin").await.is_none());
    }

    #[tokio::test]
    async fn credentials_file_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, r#"{"username":"op","password":"s3cret"}"#).unwrap();
        let auth = AuthService::load(&path).await.unwrap();
        assert!(auth.login("admin", "admin").await.is_none());
        assert!(auth.login("op", "s3cret").await.is_some());
    }

    #[tokio::test]
    async fn tokens_validate_until_logout() {
        let auth = service().await;
        let token = auth.login("admin", "admin").await.unwrap();
        assert!(auth.is_valid(&token).await);
        auth.logout(&token).await;
        assert!(!auth.is_valid(&token).await);
        assert!(!auth.is_valid("made-up").await);
    }

    #[test]
    fn cookie_header_parsing() {
        let header = format!("theme=dark; {SESSION_COOKIE}=abc123; lang=en");
        assert_eq!(session_token(&header), Some("abc123".to_string()));
        assert_eq!(session_token("theme=dark"), None);
    }
}
