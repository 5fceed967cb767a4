//! Authentication module for OCI registry access
//!
//! A push starts with [`RegistryProbe`] hitting `GET /v2/` without credentials
//! to learn which scheme the registry wants, then [`CredentialProvider`] turns
//! that challenge into [`Credentials`] that are attached to every later request.

use crate::config::{AuthConfig, RegistryConfig};
use crate::error::handlers::NetworkErrorHandler;
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::challenge::{AuthChallenge, AuthScheme};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Client, Request, StatusCode};
use serde::Deserialize;
use url::Url;

const PROBE_STEP: &str = "probing registry";
const TOKEN_STEP: &str = "requesting bearer token";

/// Credentials for one push operation
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            return Err(RegistryError::Configuration(
                "Basic authentication requires a non-empty username and password".to_string(),
            ));
        }
        Ok(Credentials::Basic { username, password })
    }

    pub fn bearer(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(RegistryError::Authentication(
                "token endpoint returned an empty token".to_string(),
            ));
        }
        Ok(Credentials::Bearer { token })
    }

    pub fn scheme(&self) -> AuthScheme {
        match self {
            Credentials::Basic { .. } => AuthScheme::Basic,
            Credentials::Bearer { .. } => AuthScheme::Bearer,
        }
    }

    fn header_value(&self) -> Result<HeaderValue> {
        let raw = match self {
            Credentials::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
            }
            Credentials::Bearer { token } => format!("Bearer {}", token),
        };

        let mut value = HeaderValue::from_str(&raw).map_err(|_| {
            RegistryError::Configuration(format!(
                "{} credentials contain characters not allowed in an HTTP header",
                self.scheme()
            ))
        })?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Set the request's `Authorization` header, replacing any existing one
    pub fn apply_to(&self, request: &mut Request) -> Result<()> {
        request.headers_mut().insert(AUTHORIZATION, self.header_value()?);
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer { token } => f
                .debug_struct("Bearer")
                .field("token", &format!("<{} chars>", token.len()))
                .finish(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Turns a parsed challenge into credentials
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    client: Client,
    auth: AuthConfig,
    repository: Option<String>,
    output: Logger,
}

impl CredentialProvider {
    pub fn new(client: Client, auth: AuthConfig, output: Logger) -> Self {
        Self {
            client,
            auth,
            repository: None,
            output,
        }
    }

    /// Repository used to request push scope when the challenge names none
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub async fn provide(&self, challenge: &AuthChallenge) -> Result<Credentials> {
        match challenge.scheme {
            AuthScheme::Basic => {
                self.output.detail("Registry requested Basic authentication");
                Credentials::basic(
                    self.auth.username.clone().unwrap_or_default(),
                    self.auth.password.clone().unwrap_or_default(),
                )
            }
            AuthScheme::Bearer => self.fetch_bearer_token(challenge).await,
        }
    }

    /// Token URL: the realm plus every other challenge parameter as a query pair
    pub fn token_url(&self, challenge: &AuthChallenge) -> Result<Url> {
        let realm = challenge
            .realm()
            .ok_or_else(|| RegistryError::Challenge("Bearer challenge has no realm".to_string()))?;
        let mut url = Url::parse(realm)
            .map_err(|e| RegistryError::Challenge(format!("invalid realm {:?}: {}", realm, e)))?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in challenge.params.iter().filter(|(key, _)| key.as_str() != "realm") {
                query.append_pair(key, value);
            }
            if challenge.param("scope").is_none() {
                if let Some(repository) = &self.repository {
                    query.append_pair("scope", &format!("repository:{}:pull,push", repository));
                }
            }
        }

        Ok(url)
    }

    async fn fetch_bearer_token(&self, challenge: &AuthChallenge) -> Result<Credentials> {
        let url = self.token_url(challenge)?;
        self.output.detail(&format!("Requesting token from: {}", url));

        let mut request = self.client.get(url.clone());
        if self.auth.has_auth() {
            if let (Some(username), Some(password)) = (&self.auth.username, &self.auth.password) {
                request = request.basic_auth(username, Some(password));
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, TOKEN_STEP))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, TOKEN_STEP))?;

        if status != StatusCode::OK {
            return Err(RegistryError::Authentication(format!(
                "token request to {} failed with status {}: {}",
                url,
                status.as_u16(),
                body.trim()
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| RegistryError::Authentication(format!("malformed token response: {}", e)))?;

        if let Some(expires_in) = token_response.expires_in {
            tracing::debug!(expires_in, "bearer token issued");
        }

        let token = token_response
            .token
            .filter(|t| !t.is_empty())
            .or(token_response.access_token)
            .unwrap_or_default();

        let credentials = Credentials::bearer(token)?;
        self.output.detail("Bearer token obtained");
        Ok(credentials)
    }
}

/// Issues the unauthenticated `GET /v2/` that elicits the challenge
#[derive(Debug, Clone)]
pub struct RegistryProbe {
    client: Client,
    registry: RegistryConfig,
    output: Logger,
}

impl RegistryProbe {
    pub fn new(client: Client, registry: RegistryConfig, output: Logger) -> Self {
        Self {
            client,
            registry,
            output,
        }
    }

    pub async fn challenge(&self) -> Result<AuthChallenge> {
        let url = self.registry.api_root()?;
        self.output.detail(&format!("Probing {}", url));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, PROBE_STEP))?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "registry probe answered");

        let header = match response.headers().get(WWW_AUTHENTICATE) {
            Some(value) if status == StatusCode::UNAUTHORIZED => value.to_str().map_err(|_| {
                RegistryError::Challenge("WWW-Authenticate header is not valid text".to_string())
            })?,
            _ => {
                return Err(RegistryError::Challenge(format!(
                    "registry did not present an authentication challenge (status {})",
                    status.as_u16()
                )));
            }
        };

        AuthChallenge::parse(header)
    }

    /// Probe the registry and exchange its challenge for credentials
    pub async fn probe(&self, provider: &CredentialProvider) -> Result<Credentials> {
        let challenge = self.challenge().await?;
        self.output.detail(&format!("Registry requested {} authentication", challenge.scheme));
        provider.provide(&challenge).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(auth: AuthConfig) -> CredentialProvider {
        CredentialProvider::new(Client::new(), auth, Logger::new_quiet())
    }

    #[test]
    fn test_basic_requires_both_fields() {
        assert!(Credentials::basic("", "p").is_err());
        assert!(Credentials::basic("u", "").is_err());
        assert!(Credentials::basic("u", "p").is_ok());
        assert!(Credentials::bearer("").is_err());
    }

    #[test]
    fn test_apply_basic_header() {
        let credentials = Credentials::basic("user", "pass").unwrap();
        let mut request = Client::new().get("https://registry.example/v2/").build().unwrap();
        credentials.apply_to(&mut request).unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_apply_replaces_existing_header() {
        let credentials = Credentials::bearer("abc").unwrap();
        let mut request = Client::new()
            .get("https://registry.example/v2/")
            .header(AUTHORIZATION, "Bearer stale")
            .build()
            .unwrap();
        credentials.apply_to(&mut request).unwrap();
        assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let basic = format!("{:?}", Credentials::basic("user", "s3cret").unwrap());
        assert!(!basic.contains("s3cret"));
        let bearer = format!("{:?}", Credentials::bearer("tok3n").unwrap());
        assert!(!bearer.contains("tok3n"));
    }

    #[tokio::test]
    async fn test_basic_challenge_without_credentials_fails() {
        let challenge = AuthChallenge::parse(r#"Basic realm="registry""#).unwrap();
        let err = provider(AuthConfig::default()).provide(&challenge).await.unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)), "{err:?}");
    }

    #[test]
    fn test_token_url_carries_params_except_realm() {
        let challenge = AuthChallenge::parse(
            r#"Bearer realm="https://auth.example/token",service="svc",scope="repository:x:pull,push""#,
        )
        .unwrap();
        let url = provider(AuthConfig::default()).token_url(&challenge).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/token");
        assert_eq!(
            pairs,
            vec![
                ("scope".to_string(), "repository:x:pull,push".to_string()),
                ("service".to_string(), "svc".to_string()),
            ]
        );
    }

    #[test]
    fn test_token_url_adds_push_scope_when_missing() {
        let challenge = AuthChallenge::parse(r#"Bearer realm="https://auth.example/token",service="svc""#).unwrap();
        let url = provider(AuthConfig::default())
            .with_repository("acme/app")
            .token_url(&challenge)
            .unwrap();
        assert!(
            url.query_pairs()
                .any(|(k, v)| k == "scope" && v == "repository:acme/app:pull,push")
        );
    }

    #[test]
    fn test_token_url_requires_realm() {
        let challenge = AuthChallenge::parse(r#"Bearer service="svc""#).unwrap();
        assert!(provider(AuthConfig::default()).token_url(&challenge).is_err());
    }
}
