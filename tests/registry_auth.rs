//! Probe and credential negotiation against a mock registry

mod common;

use common::{UPLOADS_PATH, header, registry, requests_with_method};
use oci_pusher::registry::AuthScheme;
use oci_pusher::{AuthConfig, Credentials, Logger, RegistryClient, RegistryError, UploadConfig};
use serde_json::json;
use std::io::Cursor;
use wiremock::matchers::{header as header_is, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn auth(username: Option<&str>, password: Option<&str>) -> AuthConfig {
    AuthConfig {
        username: username.map(str::to_string),
        password: password.map(str::to_string),
    }
}

async fn mount_challenge(server: &MockServer, challenge: &str) {
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge))
        .mount(server)
        .await;
}

async fn connect(server: &MockServer, auth: AuthConfig) -> oci_pusher::Result<RegistryClient> {
    RegistryClient::connect(registry(server), auth, UploadConfig::default(), Logger::new_quiet()).await
}

#[tokio::test]
async fn test_bearer_challenge_exchanges_token() {
    let server = MockServer::start().await;
    let challenge = format!(
        r#"Bearer realm="{}/token",service="registry.test",scope="repository:acme/app:pull,push""#,
        server.uri()
    );
    mount_challenge(&server, &challenge).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("service", "registry.test"))
        .and(query_param("scope", "repository:acme/app:pull,push"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "issued-token",
            "expires_in": 300
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(UPLOADS_PATH))
        .and(header_is("authorization", "Bearer issued-token"))
        .respond_with(
            ResponseTemplate::new(202).insert_header("Location", "/v2/acme/app/blobs/uploads/s"),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v2/acme/app/blobs/uploads/s"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v2/acme/app/blobs/uploads/s"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let client = connect(&server, auth(None, None)).await.unwrap();
    assert_eq!(
        client.credentials(),
        &Credentials::Bearer {
            token: "issued-token".to_string()
        }
    );

    client.upload_layer(Cursor::new(b"hello".to_vec())).await.unwrap();

    let probes = requests_with_method(&server, "GET").await;
    let probe = probes.iter().find(|request| request.url.path() == "/v2/").unwrap();
    assert!(header(probe, "authorization").is_none());

    let token_request = probes.iter().find(|request| request.url.path() == "/token").unwrap();
    assert!(header(token_request, "authorization").is_none());
}

#[tokio::test]
async fn test_token_request_carries_basic_credentials_and_default_scope() {
    let server = MockServer::start().await;
    let challenge = format!(r#"Bearer realm="{}/token",service="registry.test""#, server.uri());
    mount_challenge(&server, &challenge).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("scope", "repository:acme/app:pull,push"))
        .and(header_is("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "from-access" })))
        .mount(&server)
        .await;

    let client = connect(&server, auth(Some("user"), Some("pass"))).await.unwrap();
    assert_eq!(
        client.credentials(),
        &Credentials::Bearer {
            token: "from-access".to_string()
        }
    );
}

#[tokio::test]
async fn test_basic_challenge_uses_configured_credentials() {
    let server = MockServer::start().await;
    mount_challenge(&server, r#"Basic realm="registry""#).await;

    Mock::given(method("POST"))
        .and(path(UPLOADS_PATH))
        .and(header_is("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = connect(&server, auth(Some("user"), Some("pass"))).await.unwrap();
    assert_eq!(client.credentials().scheme(), AuthScheme::Basic);

    // The mock only answers when the Basic header is attached.
    let err = client.upload_layer(Cursor::new(Vec::new())).await.unwrap_err();
    assert!(matches!(err, RegistryError::Protocol { status: 500, .. }));
}

#[tokio::test]
async fn test_basic_challenge_without_credentials_fails_early() {
    let server = MockServer::start().await;
    mount_challenge(&server, r#"Basic realm="registry""#).await;

    let err = connect(&server, auth(Some("user"), None)).await.err().unwrap();
    assert!(matches!(err, RegistryError::Configuration(_)));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1, "only the probe should have been sent");
}

#[tokio::test]
async fn test_open_registry_is_a_challenge_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = connect(&server, auth(None, None)).await.err().unwrap();
    assert!(matches!(err, RegistryError::Challenge(_)));
    assert!(err.to_string().contains("200"));
}

#[tokio::test]
async fn test_unsupported_scheme_is_rejected() {
    let server = MockServer::start().await;
    mount_challenge(&server, r#"Digest realm="registry",nonce="abc""#).await;

    let err = connect(&server, auth(None, None)).await.err().unwrap();
    assert!(matches!(err, RegistryError::Challenge(_)));
    assert!(err.to_string().contains("Digest"));
}

#[tokio::test]
async fn test_token_endpoint_rejection() {
    let server = MockServer::start().await;
    let challenge = format!(r#"Bearer realm="{}/token""#, server.uri());
    mount_challenge(&server, &challenge).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&server)
        .await;

    let err = connect(&server, auth(None, None)).await.err().unwrap();
    assert!(matches!(err, RegistryError::Authentication(_)));
    assert!(err.to_string().contains("403"));
}

#[tokio::test]
async fn test_empty_token_is_an_authentication_error() {
    let server = MockServer::start().await;
    let challenge = format!(r#"Bearer realm="{}/token""#, server.uri());
    mount_challenge(&server, &challenge).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "" })))
        .mount(&server)
        .await;

    let err = connect(&server, auth(None, None)).await.err().unwrap();
    assert!(matches!(err, RegistryError::Authentication(_)));
}

#[tokio::test]
async fn test_unauthorized_without_challenge_header_is_a_challenge_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = connect(&server, auth(None, None)).await.err().unwrap();
    assert!(matches!(err, RegistryError::Challenge(_)));
    assert!(
        err.to_string()
            .contains("registry did not present an authentication challenge"),
        "{err}"
    );
}

#[tokio::test]
async fn test_non_json_token_response_is_an_authentication_error() {
    let server = MockServer::start().await;
    let challenge = format!(r#"Bearer realm="{}/token""#, server.uri());
    mount_challenge(&server, &challenge).await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = connect(&server, auth(None, None)).await.err().unwrap();
    assert!(matches!(err, RegistryError::Authentication(_)));
    assert!(err.to_string().contains("malformed token response"), "{err}");
}
