//! Identity and sessions.
//!
//! The identity provider is a narrow seam: it builds the redirect for a
//! login, turns a callback code into a [`UserProfile`], and knows where to
//! send the browser after logout. Everything the dashboard needs from it is
//! the [`CurrentUser`] extractor, which resolves a session token (cookie or
//! bearer header) to an owner id or rejects the request with 401.

use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Query, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::api::{ApiError, SharedState};

/// Cookie holding the CSRF state between login and callback.
const STATE_COOKIE: &str = "jobboard_auth_state";
const STATE_COOKIE_MAX_AGE_SECS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

impl UserProfile {
    /// Profile issued by [`LocalIdentityProvider`].
    pub fn local(name: &str) -> Self {
        Self {
            id: format!("local:{}", name),
            email: Some(format!("{}@localhost", name)),
            given_name: Some(name.to_string()),
            family_name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthIntent {
    Login,
    Register,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to authenticate. `hint` carries the login
    /// query parameters untouched.
    fn authorization_url(
        &self,
        intent: AuthIntent,
        state: &str,
        hint: &HashMap<String, String>,
    ) -> Result<String>;

    /// Exchange a callback code for the caller's profile.
    async fn exchange_code(&self, code: &str) -> Result<UserProfile>;

    fn logout_url(&self) -> String;
}

/// Development provider with no external IdP: `/auth/login?user=alice`
/// signs in as `local:alice`.
pub struct LocalIdentityProvider {
    callback_path: String,
    logout_redirect: String,
}

impl LocalIdentityProvider {
    pub fn new(callback_path: impl Into<String>, logout_redirect: impl Into<String>) -> Self {
        Self {
            callback_path: callback_path.into(),
            logout_redirect: logout_redirect.into(),
        }
    }
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new("/auth/callback", "/")
    }
}

fn valid_local_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn authorization_url(
        &self,
        _intent: AuthIntent,
        state: &str,
        hint: &HashMap<String, String>,
    ) -> Result<String> {
        let Some(user) = hint.get("user") else {
            bail!("Local login requires a 'user' query parameter");
        };
        if !valid_local_name(user) {
            bail!("Invalid user name '{}'", user);
        }
        Ok(format!(
            "{}?code={}&state={}",
            self.callback_path, user, state
        ))
    }

    async fn exchange_code(&self, code: &str) -> Result<UserProfile> {
        if !valid_local_name(code) {
            bail!("Invalid authorization code");
        }
        Ok(UserProfile::local(code))
    }

    fn logout_url(&self) -> String {
        self.logout_redirect.clone()
    }
}

// ── Session resolution ────────────────────────────────────────────────

/// Authenticated caller of a dashboard operation.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserProfile);

impl CurrentUser {
    pub fn owner(&self) -> &str {
        &self.0.id
    }
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &state.auth.cookie_name)
            .ok_or(ApiError::Unauthorized)?;
        let session = state
            .db
            .call(move |db| db.find_session(&token))
            .await
            .map_err(ApiError::store)?;
        match session {
            Some(session) => Ok(CurrentUser(session.user)),
            None => {
                tracing::debug!("rejected request with unknown or expired session");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        let bearer = bearer.trim();
        if !bearer.is_empty() {
            return Some(bearer.to_string());
        }
    }
    cookie_value(headers, cookie_name)
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value. A `max_age` of zero clears the cookie.
pub fn build_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age_secs.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn with_cookies(mut response: Response, cookies: &[String]) -> Result<Response, ApiError> {
    for cookie in cookies {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ApiError::store(anyhow::anyhow!("Invalid cookie header: {}", e)))?;
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

// ── Routes ────────────────────────────────────────────────────────────

pub fn auth_router() -> Router<SharedState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/register", get(register))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", get(logout))
        .route("/auth/me", get(me))
}

async fn login(
    State(state): State<SharedState>,
    Query(hint): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    begin_auth(&state, AuthIntent::Login, &hint)
}

async fn register(
    State(state): State<SharedState>,
    Query(hint): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    begin_auth(&state, AuthIntent::Register, &hint)
}

fn begin_auth(
    state: &SharedState,
    intent: AuthIntent,
    hint: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let auth_state = uuid::Uuid::new_v4().simple().to_string();
    let url = state
        .identity
        .authorization_url(intent, &auth_state, hint)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let cookie = build_cookie(
        STATE_COOKIE,
        &auth_state,
        STATE_COOKIE_MAX_AGE_SECS,
        state.auth.secure_cookies,
    );
    with_cookies(Redirect::to(&url).into_response(), &[cookie])
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

async fn callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let expected = cookie_value(&headers, STATE_COOKIE);
    if expected.is_none() || expected != query.state {
        tracing::warn!("auth callback with missing or mismatched state");
        return Err(ApiError::Unauthorized);
    }
    let code = query.code.ok_or(ApiError::Unauthorized)?;

    let user = state.identity.exchange_code(&code).await.map_err(|e| {
        tracing::warn!(error = %e, "code exchange failed");
        ApiError::Unauthorized
    })?;

    let ttl = Duration::hours(state.auth.session_ttl_hours);
    let session_user = user.clone();
    let session = state
        .db
        .call(move |db| {
            db.upsert_user(&session_user)?;
            db.purge_expired_sessions()?;
            db.create_session(&session_user, ttl)
        })
        .await
        .map_err(ApiError::store)?;
    tracing::info!(owner = %user.id, "signed in");

    let auth = &state.auth;
    let cookies = [
        build_cookie(
            &auth.cookie_name,
            &session.token,
            ttl.num_seconds(),
            auth.secure_cookies,
        ),
        build_cookie(STATE_COOKIE, "", 0, auth.secure_cookies),
    ];
    with_cookies(
        Redirect::to(&auth.post_login_redirect).into_response(),
        &cookies,
    )
}

async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers, &state.auth.cookie_name) {
        state
            .db
            .call(move |db| db.delete_session(&token))
            .await
            .map_err(ApiError::store)?;
    }
    let cookie = build_cookie(&state.auth.cookie_name, "", 0, state.auth.secure_cookies);
    with_cookies(
        Redirect::to(&state.identity.logout_url()).into_response(),
        &[cookie],
    )
}

async fn me(user: CurrentUser) -> impl IntoResponse {
    Json(serde_json::json!({ "user": user.0 }))
}
