//! Chunked blob upload following the OCI distribution resumable upload flow
//!
//! `POST` opens a session, each compressed chunk goes out as a `PATCH` with a
//! `Content-Range`, and a final `PUT ?digest=` commits the blob. The registry may
//! move the session after every response, so the upload URL is always taken
//! from the latest `Location`.

use crate::config::{MAX_CHUNK_SIZE, RegistryConfig, UploadConfig};
use crate::digest::{Digest, DigestHasher};
use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, Result};
use crate::image::layer::LayerDescriptor;
use crate::logging::Logger;
use crate::registry::transport::AuthenticatedTransport;
use crate::upload::pipeline::{CompressionPipeline, ProducerOutcome};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION};
use reqwest::{Method, Response, StatusCode};
use std::io::Read;
use url::Url;

/// Registry hint for the smallest chunk it accepts
pub const CHUNK_MIN_LENGTH_HEADER: &str = "OCI-Chunk-Min-Length";

const OPEN_STEP: &str = "initiating layer upload";
const CHUNK_STEP: &str = "uploading layer chunk";
const CLOSE_STEP: &str = "closing layer upload session";

/// Derives where the next request of an upload session goes
pub trait UploadUrlResolver {
    /// `current` is `None` for the response that opens the session
    fn next_upload_url(&self, response: &Response, current: Option<&Url>) -> Result<Url>;
}

/// Relative `Location` values resolve against the registry base URL
impl UploadUrlResolver for RegistryConfig {
    fn next_upload_url(&self, response: &Response, current: Option<&Url>) -> Result<Url> {
        let step = if current.is_some() { CHUNK_STEP } else { OPEN_STEP };
        match response.headers().get(LOCATION) {
            Some(location) => {
                let location = location.to_str().map_err(|_| {
                    HttpErrorHandler::protocol_error(step, response.status(), "Location header is not valid text")
                })?;
                self.url(location)
            }
            // Some registries omit Location on PATCH responses; keep using the current URL.
            None => current.cloned().ok_or_else(|| {
                HttpErrorHandler::protocol_error(step, response.status(), "missing Location header")
            }),
        }
    }
}

/// Mutable state of one in-flight blob upload
#[derive(Debug, Clone)]
pub struct UploadSession {
    upload_url: Url,
    bytes_sent: u64,
    chunk_size: usize,
}

impl UploadSession {
    pub fn new(upload_url: Url, chunk_size: usize) -> Self {
        Self {
            upload_url,
            bytes_sent: 0,
            chunk_size,
        }
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk size only ever grows
    pub fn raise_chunk_size(&mut self, minimum: usize) {
        self.chunk_size = self.chunk_size.max(minimum);
    }

    /// Inclusive byte range for the next chunk of `len` bytes
    pub fn content_range(&self, len: usize) -> String {
        let start = self.bytes_sent;
        let end = start + len as u64 - 1;
        format!("{}-{}", start, end)
    }

    pub fn record_chunk(&mut self, len: usize, next_url: Url) {
        self.bytes_sent += len as u64;
        self.upload_url = next_url;
    }

    /// Upload URL with `digest=` appended, preserving registry state params
    pub fn close_url(&self, digest: &Digest) -> Url {
        let mut url = self.upload_url.clone();
        url.query_pairs_mut().append_pair("digest", digest.as_str());
        url
    }
}

fn chunk_min_length(response: &Response) -> Result<Option<usize>> {
    let Some(value) = response.headers().get(CHUNK_MIN_LENGTH_HEADER) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|minimum| *minimum <= MAX_CHUNK_SIZE)
        .map(Some)
        .ok_or_else(|| {
            HttpErrorHandler::protocol_error(
                OPEN_STEP,
                response.status(),
                &format!(
                    "invalid {} header {:?} (must be a byte count up to {})",
                    CHUNK_MIN_LENGTH_HEADER, value, MAX_CHUNK_SIZE
                ),
            )
        })
}

/// Uploads one layer as a gzip blob, computing both digests on the way
#[derive(Debug, Clone)]
pub struct ChunkedBlobUploader {
    transport: AuthenticatedTransport,
    registry: RegistryConfig,
    config: UploadConfig,
    output: Logger,
}

impl ChunkedBlobUploader {
    pub fn new(
        transport: AuthenticatedTransport,
        registry: RegistryConfig,
        config: UploadConfig,
        output: Logger,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            registry,
            config,
            output,
        })
    }

    pub async fn upload<R>(&self, source: R) -> Result<LayerDescriptor>
    where
        R: Read + Send + 'static,
    {
        let mut session = self.open_session().await?;
        self.output.detail(&format!(
            "Upload session opened (chunk size {})",
            self.output.format_size(session.chunk_size() as u64)
        ));

        let mut pipeline = CompressionPipeline::spawn(source, &self.config);
        let mut compressed = DigestHasher::new();
        // Grows with the data; a registry-advertised chunk size is not reserved up front.
        let mut pending = Vec::new();

        let streamed = self
            .stream_full_chunks(&mut session, &mut pipeline, &mut compressed, &mut pending)
            .await;

        // Producer failures win over whatever the uploading side ran into.
        let uncompressed = match (pipeline.finish().await?, streamed) {
            (_, Err(err)) => return Err(err),
            (ProducerOutcome::Completed(summary), Ok(())) => summary,
            (ProducerOutcome::Abandoned, Ok(())) => {
                return Err(RegistryError::Compression(
                    "compression pipeline stopped before the layer was complete".to_string(),
                ));
            }
        };

        if !pending.is_empty() {
            self.send_chunk(&mut session, std::mem::take(&mut pending)).await?;
        }

        debug_assert_eq!(compressed.bytes(), session.bytes_sent());
        let digest = compressed.finalize();
        self.close_session(&session, &digest).await?;

        self.output.detail(&format!(
            "Layer {} uploaded: {} compressed from {}",
            digest.short(),
            self.output.format_size(session.bytes_sent()),
            self.output.format_size(uncompressed.bytes)
        ));

        Ok(LayerDescriptor::new(digest, uncompressed.diff_id, session.bytes_sent()))
    }

    async fn open_session(&self) -> Result<UploadSession> {
        let url = self.registry.blob_uploads_url()?;
        let request = self
            .transport
            .request(Method::POST, url)
            .header(CONTENT_LENGTH, 0)
            .body(Vec::new());

        let response = self.transport.send(request, OPEN_STEP).await?;
        let response = HttpErrorHandler::expect_status(response, &[StatusCode::ACCEPTED], OPEN_STEP).await?;

        let upload_url = self.registry.next_upload_url(&response, None)?;
        let mut session = UploadSession::new(upload_url, self.config.chunk_size);

        if let Some(minimum) = chunk_min_length(&response)? {
            tracing::debug!(minimum, "registry advertised minimum chunk length");
            session.raise_chunk_size(minimum);
        }

        Ok(session)
    }

    /// Pull compressed segments and PATCH every full chunk. Whatever is left
    /// when the pipe closes stays in `pending` until the producer is joined.
    async fn stream_full_chunks(
        &self,
        session: &mut UploadSession,
        pipeline: &mut CompressionPipeline,
        compressed: &mut DigestHasher,
        pending: &mut Vec<u8>,
    ) -> Result<()> {
        while let Some(segment) = pipeline.next_segment().await {
            compressed.update(&segment);
            pending.extend_from_slice(&segment);

            while pending.len() >= session.chunk_size() {
                let rest = pending.split_off(session.chunk_size());
                let chunk = std::mem::replace(pending, rest);
                self.send_chunk(session, chunk).await?;
            }
        }
        Ok(())
    }

    async fn send_chunk(&self, session: &mut UploadSession, chunk: Vec<u8>) -> Result<()> {
        let len = chunk.len();
        let range = session.content_range(len);
        tracing::debug!(range = %range, url = %session.upload_url(), "sending chunk");

        let request = self
            .transport
            .request(Method::PATCH, session.upload_url().clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_RANGE, range)
            .header(CONTENT_LENGTH, len)
            .body(chunk);

        let response = self.transport.send(request, CHUNK_STEP).await?;
        let response =
            HttpErrorHandler::expect_status(response, &[StatusCode::ACCEPTED, StatusCode::CREATED], CHUNK_STEP)
                .await?;

        let next_url = self.registry.next_upload_url(&response, Some(session.upload_url()))?;
        session.record_chunk(len, next_url);
        Ok(())
    }

    async fn close_session(&self, session: &UploadSession, digest: &Digest) -> Result<()> {
        let request = self
            .transport
            .request(Method::PUT, session.close_url(digest))
            .header(CONTENT_LENGTH, 0)
            .body(Vec::new());

        let response = self.transport.send(request, CLOSE_STEP).await?;
        HttpErrorHandler::expect_status(response, &[StatusCode::CREATED], CLOSE_STEP).await?;
        Ok(())
    }
}
