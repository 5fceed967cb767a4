#![allow(dead_code)]

use oci_pusher::{Credentials, RegistryClient, RegistryConfig, UploadConfig};
use wiremock::{MockServer, Request};

pub const REPOSITORY: &str = "acme/app";
pub const UPLOADS_PATH: &str = "/v2/acme/app/blobs/uploads/";

pub fn registry(server: &MockServer) -> RegistryConfig {
    RegistryConfig::parse(&server.uri(), REPOSITORY, true).unwrap()
}

pub fn client(server: &MockServer, upload: UploadConfig) -> RegistryClient {
    RegistryClient::builder(registry(server))
        .with_credentials(Credentials::bearer("test-token").unwrap())
        .with_upload_config(upload)
        .build()
        .unwrap()
}

/// Deterministic, poorly compressible bytes
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}

pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn requests_with_method(server: &MockServer, method: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == method)
        .collect()
}

/// Parse `start-end` into an inclusive pair
pub fn parse_range(range: &str) -> (u64, u64) {
    let (start, end) = range.split_once('-').unwrap();
    (start.parse().unwrap(), end.parse().unwrap())
}
