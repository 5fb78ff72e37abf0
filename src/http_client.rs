use anyhow::{Context, Result as AnyResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::{token_preview, Session};
use crate::config::{AuthPaths, Config};
use crate::error::{transport_error_kind, ApiError, Result};
use crate::models::TokenResponse;

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters; `None` and empty values are left out
    pub params: Vec<(String, Option<String>)>,

    /// JSON body, ignored for GET and HEAD
    pub body: Option<Value>,

    /// Extra headers; an `Authorization` entry is replaced by the session bearer
    /// unless `skip_auth` is set
    pub headers: HeaderMap,

    /// Send without the bearer credential and never attempt a refresh
    pub skip_auth: bool,

    /// Cooperative cancellation
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), Some(value.to_string())));
        self
    }

    pub fn param_opt<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.params
            .push((key.into(), value.map(|v| v.to_string())));
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = (String, Option<String>)>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }
}

/// Authenticated HTTP client for the property-search API
///
/// Every call goes through [`ApiClient::request`], which attaches the session
/// credential, and on a 401 joins the session's single in-flight refresh and
/// replays the request once. Clone is cheap: the reqwest client and the
/// session are both reference counted.
#[derive(Clone)]
pub struct ApiClient {
    /// Shared HTTP client with connection pooling and a cookie store
    client: Client,

    /// Base URL joined with the API prefix
    api_root: String,

    auth_paths: AuthPaths,

    session: Arc<Session>,
}

impl ApiClient {
    /// Create a new client bound to `session`
    pub fn new(config: &Config, session: Arc<Session>) -> AnyResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_root: config.api_root(),
            auth_paths: config.auth_paths.clone(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn auth_paths(&self) -> &AuthPaths {
        &self.auth_paths
    }

    /// Perform one API call, transparently handling authentication
    ///
    /// Returns the parsed JSON body, or an empty object for 204 and empty bodies.
    pub async fn request(&self, method: Method, path: &str, options: RequestOptions) -> Result<Value> {
        if self.session.is_closed() {
            return Err(ApiError::SessionClosed);
        }

        let signal = options.signal.clone();
        if signal.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(ApiError::Aborted);
        }

        let url = self.build_url(path, &options.params)?;
        let sent = if options.skip_auth {
            None
        } else {
            self.session.credential()
        };

        let response = self.send(&method, &url, &options, sent.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || options.skip_auth {
            return read_response(response, signal.as_ref()).await;
        }

        tracing::debug!(url = %url, "Received 401, recovering credential");
        drop(response);

        let token = match self.recover_credential(sent.as_deref(), signal.as_ref()).await? {
            Some(token) => token,
            None => {
                tracing::warn!(url = %url, "No credential after refresh, giving up");
                return Err(ApiError::session_expired());
            }
        };

        tracing::debug!(
            method = %method,
            url = %url,
            token = %token_preview(&token),
            "Replaying request with refreshed credential"
        );
        let response = self.send(&method, &url, &options, Some(&token)).await?;
        read_response(response, signal.as_ref()).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        decode(self.request(Method::GET, path, options).await?)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = options.body(encode(body)?);
        decode(self.request(Method::POST, path, options).await?)
    }

    pub async fn put<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = options.body(encode(body)?);
        decode(self.request(Method::PUT, path, options).await?)
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = options.body(encode(body)?);
        decode(self.request(Method::PATCH, path, options).await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        decode(self.request(Method::DELETE, path, options).await?)
    }

    /// Full URL for `path` with the defined, non-empty `params` appended
    pub fn build_url(&self, path: &str, params: &[(String, Option<String>)]) -> Result<Url> {
        let separator = if path.is_empty() || path.starts_with('/') { "" } else { "/" };
        let raw = format!("{}{}{}", self.api_root, separator, path);
        let mut url = Url::parse(&raw)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid URL {}: {}", raw, e)))?;

        let defined: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(k, v)| {
                v.as_deref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (k.as_str(), v))
            })
            .collect();

        if !defined.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in defined {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Credential to replay a 401'd request with, if one can be obtained
    async fn recover_credential(
        &self,
        sent: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<Option<String>> {
        // Another caller already completed a refresh after this request went out
        if let Some(current) = self.session.credential() {
            if Some(current.as_str()) != sent && !self.session.refresh_coordinator().is_refreshing() {
                tracing::debug!("Credential changed since request was sent, reusing it");
                return Ok(Some(current));
            }
        }

        let refresh = self.session.refresh(|| self.refresh_call());
        cancellable(signal, refresh).await
    }

    /// The refresh network call, detached from `self` so it can run in its own task
    fn refresh_call(&self) -> impl Future<Output = Result<String>> + Send + 'static {
        let client = self.client.clone();
        let url = self.build_url(&self.auth_paths.refresh, &[]);

        async move {
            let url = url?;
            tracing::debug!(url = %url, "Requesting new access token");

            // No bearer header: the refresh token rides in the HTTP-only cookie
            let response = client.post(url).send().await.map_err(|e| {
                tracing::warn!(error_kind = transport_error_kind(&e), error = %e, "Refresh request error");
                ApiError::from(e)
            })?;

            let status = response.status();
            let body = response.bytes().await?;
            if !status.is_success() {
                return Err(ApiError::from_response(status, &body));
            }

            let data: TokenResponse = serde_json::from_slice(&body)
                .map_err(|e| ApiError::InvalidResponse(format!("refresh response: {}", e)))?;

            data.access_token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::InvalidResponse("refresh response has no access token".to_string()))
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        let mut headers = options.headers.clone();
        if token.is_some() {
            // The session credential wins over a caller-supplied one
            headers.remove(AUTHORIZATION);
        }

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers);

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = &options.body {
            if *method != Method::GET && *method != Method::HEAD {
                builder = builder.json(body);
            }
        }

        tracing::debug!(
            method = %method,
            url = %url,
            authenticated = token.is_some(),
            "Sending HTTP request"
        );

        let response = cancellable(options.signal.as_ref(), builder.send())
            .await?
            .map_err(|e| {
                tracing::warn!(
                    error_kind = transport_error_kind(&e),
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );
                ApiError::from(e)
            })?;

        tracing::debug!(status = %response.status(), "Received HTTP response");
        Ok(response)
    }
}

/// Turn a final response into the JSON result or a mapped error
async fn read_response(response: Response, signal: Option<&CancellationToken>) -> Result<Value> {
    let status = response.status();

    if status == StatusCode::NO_CONTENT {
        return Ok(empty_object());
    }

    let body = cancellable(signal, response.bytes()).await??;

    if !status.is_success() {
        let err = ApiError::from_response(status, &body);
        tracing::warn!(status = status.as_u16(), error = %err, "Request failed");
        return Err(err);
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(empty_object());
    }

    serde_json::from_slice(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Run `fut` unless `signal` fires first
async fn cancellable<F: Future>(signal: Option<&CancellationToken>, fut: F) -> Result<F::Output> {
    match signal {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(ApiError::Aborted),
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(format!("body: {}", e)))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}
