//! Authenticated HTTP transport for registry requests
//!
//! Every request built for the registry passes through [`AuthenticatedTransport::send`],
//! which stamps it with the push's credentials before handing it to `reqwest`.

use crate::error::Result;
use crate::error::handlers::NetworkErrorHandler;
use crate::registry::auth::Credentials;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

/// Build the shared HTTP client used for probing, token exchange and uploads
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(concat!("oci-pusher/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| NetworkErrorHandler::handle_network_error(e, "building HTTP client"))
}

#[derive(Debug, Clone)]
pub struct AuthenticatedTransport {
    client: Client,
    credentials: Credentials,
}

impl AuthenticatedTransport {
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self { client, credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Start a request; send it with [`Self::send`]
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Apply credentials and execute, tagging transport failures with `step`
    pub async fn send(&self, builder: RequestBuilder, step: &'static str) -> Result<Response> {
        let mut request = builder
            .build()
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, step))?;
        self.credentials.apply_to(&mut request)?;

        tracing::debug!(step, method = %request.method(), url = %request.url(), "registry request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(e, step))?;

        tracing::trace!(step, status = response.status().as_u16(), "registry response");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_transport_keeps_credentials() {
        let transport = AuthenticatedTransport::new(Client::new(), Credentials::bearer("abc").unwrap());
        assert_eq!(transport.credentials(), &Credentials::Bearer { token: "abc".to_string() });
    }
}
