use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{LoginRequest, Session, User};

const SESSION_COOKIE: &str = "session";

/// Logged-in user and their session, from a bearer token or the session cookie
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub session: Session,
    pub token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| session_cookie(&parts.headers))
            .ok_or_else(|| AppError::Unauthorized("Login required".to_string()))?;

        let (user, session) = state.auth.authenticate(&token).await?;
        Ok(Self { user, session, token })
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.login(&payload).await?;
    let cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        response.token,
        state.config.auth.session_hours * 3600
    );
    Ok(([(header::SET_COOKIE, cookie)], Json(response)))
}

pub async fn logout(State(state): State<AppState>, auth: AuthSession) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&auth.session.id).await?;
    tracing::info!("User {} logged out", auth.user.username);

    let cookie = format!("{}=; HttpOnly; Path=/; Max-Age=0", SESSION_COOKIE);
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "logged_out": true }))))
}
