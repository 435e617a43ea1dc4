//! Bearer-token authentication for every façade route except `/health`,
//! grounded on the teacher's `gateway::auth`: a token file written on first
//! run at a fixed path, checked with an `axum::middleware::from_fn` guard.
//! Ambient transport security, carried even though `spec.md` does not name
//! it as a feature.

use std::fs;
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Path to the daemon's bearer token file: `~/.orakle/daemon.token`.
pub fn token_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join(".orakle").join("daemon.token")
}

/// Load the existing token from disk, or generate and persist a new one.
/// On Unix the file is created with `0600` permissions so other local
/// users cannot read it.
pub fn load_or_create_token() -> Result<String, String> {
    let path = token_path();

    if path.exists() {
        return fs::read_to_string(&path).map(|s| s.trim().to_owned()).map_err(|e| format!("failed to read token file: {e}"));
    }

    let token = Uuid::new_v4().to_string().replace('-', "");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create .orakle dir: {e}"))?;
    }
    fs::write(&path, &token).map_err(|e| format!("failed to write token: {e}"))?;

    #[cfg(unix)]
    {
        let mut perms = fs::metadata(&path).map_err(|e| format!("failed to read token metadata: {e}"))?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&path, perms).map_err(|e| format!("failed to set token permissions: {e}"))?;
    }

    tracing::info!(path = %path.display(), "wrote new daemon bearer token");
    Ok(token)
}

/// Middleware guarding every route mounted under it: validates
/// `Authorization: Bearer <token>` against the on-disk token.
pub async fn auth_middleware(headers: HeaderMap, request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let expected = load_or_create_token().map_err(|e| {
        tracing::error!(error = %e, "auth middleware could not load token");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let provided = headers.get("Authorization").and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer ")).map(str::to_owned);

    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_path_lives_under_dot_orakle() {
        let path = token_path();
        assert!(path.ends_with("daemon.token"));
    }
}
