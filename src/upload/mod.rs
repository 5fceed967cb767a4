//! Upload module for chunked, compressed blob uploads

pub mod chunked;
pub mod pipeline;

pub use chunked::{CHUNK_MIN_LENGTH_HEADER, ChunkedBlobUploader, UploadSession, UploadUrlResolver};
pub use pipeline::{CompressionPipeline, ProducerOutcome, UncompressedSummary};
