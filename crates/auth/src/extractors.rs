//! Axum extractor for authentication requests.

use axum::{
    body::Bytes,
    extract::{FromRef, FromRequest, FromRequestParts, RawPathParams, Request},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, Method},
};
use axum_extra::extract::CookieJar;
use authgate_core::auth::{CallbackParams, SessionId};

use crate::error::AuthError;
use crate::AuthState;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Everything the auth flow needs to know about one inbound request.
///
/// Built by the axum extractor, or by hand for non-axum callers and tests.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    method: Method,
    path_params: Vec<(String, String)>,
    query: CallbackParams,
    form: CallbackParams,
    headers: HeaderMap,
    session_id: Option<SessionId>,
}

impl AuthRequest {
    /// Creates a request from a method and a raw query string (without `?`).
    pub fn new(method: Method, query: &str) -> Self {
        Self {
            method,
            query: CallbackParams::parse(query),
            ..Self::default()
        }
    }

    pub fn get(query: &str) -> Self {
        Self::new(Method::GET, query)
    }

    pub fn post(query: &str) -> Self {
        Self::new(Method::POST, query)
    }

    pub fn with_path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((key.into(), value.into()));
        self
    }

    /// Sets the form-encoded body.
    pub fn with_form(mut self, body: &str) -> Self {
        self.form = CallbackParams::parse(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Value of a route parameter, e.g. `provider` in `/auth/{provider}`.
    pub fn path_param(&self, key: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn query(&self) -> &CallbackParams {
        &self.query
    }

    pub fn form(&self) -> &CallbackParams {
        &self.form
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Parameters delivered by a provider callback.
    ///
    /// Redirect callbacks carry them in the query string; form-post callbacks
    /// send an empty query string and a POST body instead.
    pub fn callback_params(&self) -> &CallbackParams {
        if self.query.is_empty() && self.method == Method::POST {
            &self.form
        } else {
            &self.query
        }
    }
}

impl<S> FromRequest<S> for AuthRequest
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let (mut parts, body) = req.into_parts();

        // Routes without parameters simply have none.
        let path_params = RawPathParams::from_request_parts(&mut parts, state)
            .await
            .map(|params| {
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let query = CallbackParams::parse(parts.uri.query().unwrap_or_default());

        let session_id = CookieJar::from_headers(&parts.headers)
            .get(&auth_state.config.cookie_name)
            .map(|cookie| SessionId::new(cookie.value().to_string()))
            .filter(|id| !id.as_str().is_empty());

        let is_form = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(FORM_CONTENT_TYPE));

        let method = parts.method.clone();
        let headers = parts.headers.clone();

        let form = if method == Method::POST && is_form {
            let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
                .await
                .map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
            let body = std::str::from_utf8(&bytes)
                .map_err(|_| AuthError::InvalidRequest("form body is not UTF-8".to_string()))?;
            CallbackParams::parse(body)
        } else {
            CallbackParams::default()
        };

        Ok(Self {
            method,
            path_params,
            query,
            form,
            headers,
            session_id,
        })
    }
}
