//! Streaming gzip pipeline feeding the chunked uploader
//!
//! The producer runs on a blocking thread: it reads the raw layer through a
//! SHA256 accumulator (the diff-id), gzips it, and pushes compressed segments
//! into a bounded channel. A full channel blocks the producer until the
//! uploader catches up.

use crate::config::UploadConfig;
use crate::digest::{Digest, HashingReader};
use crate::error::{RegistryError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{self, Read, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Size of the segments handed across the channel
const SEGMENT_SIZE: usize = 64 * 1024;

/// Marker for "the receiving side went away"
#[derive(Debug)]
struct ConsumerGone;

impl std::fmt::Display for ConsumerGone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("upload side of the compression pipe closed")
    }
}

impl std::error::Error for ConsumerGone {}

fn is_consumer_gone(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<ConsumerGone>())
}

/// `Write` end of the pipe: batches bytes into segments and blocks on a full channel
struct ChannelWriter {
    sender: mpsc::Sender<Vec<u8>>,
    buffer: Vec<u8>,
}

impl ChannelWriter {
    fn new(sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            sender,
            buffer: Vec::with_capacity(SEGMENT_SIZE),
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        let segment = std::mem::replace(&mut self.buffer, Vec::with_capacity(SEGMENT_SIZE));
        self.sender
            .blocking_send(segment)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, ConsumerGone))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= SEGMENT_SIZE {
            self.send_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.send_buffer()?;
        }
        Ok(())
    }
}

/// Uncompressed side of a finished layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncompressedSummary {
    pub diff_id: Digest,
    pub bytes: u64,
}

/// How the producer ended when it did not fail on its own
#[derive(Debug)]
pub enum ProducerOutcome {
    Completed(UncompressedSummary),
    /// The consumer hung up first; its own error is the one that matters
    Abandoned,
}

fn compress<R: Read>(source: R, writer: ChannelWriter, level: Compression) -> io::Result<UncompressedSummary> {
    let mut reader = HashingReader::new(source);
    let mut encoder = GzEncoder::new(writer, level);
    io::copy(&mut reader, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;

    let (diff_id, bytes) = reader.finalize();
    Ok(UncompressedSummary { diff_id, bytes })
}

/// Running producer plus the receiving end of its pipe
pub struct CompressionPipeline {
    receiver: mpsc::Receiver<Vec<u8>>,
    producer: JoinHandle<io::Result<UncompressedSummary>>,
}

impl CompressionPipeline {
    /// Start compressing `source` on a blocking thread
    pub fn spawn<R>(source: R, config: &UploadConfig) -> Self
    where
        R: Read + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(config.pipe_depth);
        let level = Compression::new(config.compression_level);
        let producer = tokio::task::spawn_blocking(move || compress(source, ChannelWriter::new(sender), level));

        Self { receiver, producer }
    }

    /// Next compressed segment, or `None` once the producer closed the pipe
    pub async fn next_segment(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }

    /// Close the read end and wait for the producer.
    ///
    /// `Err` is a genuine producer failure and takes priority over anything the
    /// consumer saw.
    pub async fn finish(self) -> Result<ProducerOutcome> {
        let CompressionPipeline { receiver, producer } = self;
        drop(receiver);

        match producer.await {
            Ok(Ok(summary)) => Ok(ProducerOutcome::Completed(summary)),
            Ok(Err(err)) if is_consumer_gone(&err) => Ok(ProducerOutcome::Abandoned),
            Ok(Err(err)) => Err(RegistryError::Compression(format!(
                "reading or compressing layer failed: {}",
                err
            ))),
            Err(join_err) => Err(RegistryError::Compression(format!(
                "compression task did not complete: {}",
                join_err
            ))),
        }
    }
}
