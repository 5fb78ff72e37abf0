use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, Result};
use crate::http_client::{ApiClient, RequestOptions};
use crate::models::{LoginRequest, RegisterRequest, TokenResponse, UserProfile};

/// Login, registration and logout flows
///
/// These are the only places that notify the session of a new credential
/// outside of a refresh.
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Sign in and store the returned access token
    ///
    /// The backend also sets the refresh cookie, kept by the client's cookie store.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        signal: Option<CancellationToken>,
    ) -> Result<TokenResponse> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response: TokenResponse = self
            .client
            .post(
                &self.client.auth_paths().login,
                &request,
                with_signal(RequestOptions::new().skip_auth(), signal),
            )
            .await?;

        let token = response
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("login response has no access token".to_string()))?;

        self.client.session().set_credential(Some(token));
        tracing::info!(email, "Signed in");
        Ok(response)
    }

    /// Create an account; signs in directly when the backend returns a token
    pub async fn register(&self, request: &RegisterRequest) -> Result<TokenResponse> {
        let response: TokenResponse = self
            .client
            .post(
                &self.client.auth_paths().register,
                request,
                RequestOptions::new().skip_auth(),
            )
            .await?;

        if let Some(token) = response.access_token.clone().filter(|t| !t.is_empty()) {
            self.client.session().set_credential(Some(token));
            tracing::info!(email = %request.email, "Registered and signed in");
        } else {
            tracing::info!(email = %request.email, "Registered");
        }

        Ok(response)
    }

    /// Sign out; the local credential is cleared whatever the backend answers
    pub async fn logout(&self) -> Result<()> {
        let result = self
            .client
            .post::<_, serde_json::Value>(
                &self.client.auth_paths().logout,
                &serde_json::json!({}),
                RequestOptions::new(),
            )
            .await;

        self.client.session().set_credential(None);

        match result {
            Ok(_) => {
                tracing::info!("Signed out");
                Ok(())
            }
            // Nothing left to invalidate server-side
            Err(e) if e.is_unauthorized() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Profile of the signed-in user
    pub async fn me(&self, signal: Option<CancellationToken>) -> Result<UserProfile> {
        self.client
            .get(
                &self.client.auth_paths().me,
                with_signal(RequestOptions::new(), signal),
            )
            .await
    }
}

fn with_signal(options: RequestOptions, signal: Option<CancellationToken>) -> RequestOptions {
    match signal {
        Some(token) => options.signal(token),
        None => options,
    }
}
