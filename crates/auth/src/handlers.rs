//! HTTP handlers for auth routes.

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::Cookie;
use axum_extra::extract::CookieJar;
use authgate_core::auth::{SessionId, UserProfile};

use crate::error::AuthError;
use crate::extractors::AuthRequest;
use crate::AuthState;

/// Creates the auth router with all authentication routes.
///
/// Routes:
/// - `GET /auth/{provider}` - Begin authentication with a provider
/// - `GET /auth?provider=..` - Same, with the provider in the query
/// - `GET|POST /auth/{provider}/callback` - Complete authentication
/// - `GET|POST /auth/callback?provider=..` - Same, with the provider in the query
/// - `POST /auth/logout` - Drop every pending auth attempt of the browser session
pub fn auth_routes<S>() -> Router<S>
where
    AuthState: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/auth", get(begin))
        .route("/auth/logout", post(logout))
        .route("/auth/callback", get(callback).post(callback))
        .route("/auth/{provider}", get(begin))
        .route("/auth/{provider}/callback", get(callback).post(callback))
}

async fn begin(
    State(state): State<AuthState>,
    jar: CookieJar,
    request: AuthRequest,
) -> Result<(CookieJar, Redirect), AuthError> {
    let begin = state.flow.begin_auth(&request).await?;

    // Re-issued on every begin so the cookie lives as long as the stored attempt.
    let jar = jar.add(session_cookie(&state, &begin.session_id));

    Ok((jar, Redirect::temporary(&begin.auth_url)))
}

async fn callback(
    State(state): State<AuthState>,
    jar: CookieJar,
    request: AuthRequest,
) -> Result<(CookieJar, Json<UserProfile>), AuthError> {
    let user = state.flow.complete_auth(&request).await?;

    tracing::info!(provider = %user.provider, user_id = %user.user_id, "User authenticated");

    Ok((jar.remove(removal_cookie(&state)), Json(user)))
}

async fn logout(State(state): State<AuthState>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(&state.config.cookie_name) {
        let session_id = SessionId::new(cookie.value().to_string());
        state.flow.logout(&session_id).await;
    }

    (jar.remove(removal_cookie(&state)), StatusCode::NO_CONTENT)
}

fn session_cookie(state: &AuthState, session_id: &SessionId) -> Cookie<'static> {
    Cookie::build((state.config.cookie_name.clone(), session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(state.config.cookie_same_site)
        .max_age(time::Duration::seconds(state.config.session_ttl_secs()))
        .build()
}

fn removal_cookie(state: &AuthState) -> Cookie<'static> {
    Cookie::build(state.config.cookie_name.clone())
        .path("/")
        .build()
}
