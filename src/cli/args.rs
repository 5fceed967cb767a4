//! Command-line argument parsing

use crate::config::DEFAULT_CHUNK_SIZE;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oci-pusher")]
#[command(about = "Push build artifacts to OCI registries as gzip layers and image manifests")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Registry username (falls back to REGISTRY_USERNAME)
    #[arg(long = "username", short = 'u', global = true)]
    pub username: Option<String>,

    /// Registry password (falls back to REGISTRY_PASSWORD)
    #[arg(long = "password", short = 'p', global = true)]
    pub password: Option<String>,

    /// Keep plain http:// registry URLs instead of upgrading to https
    #[arg(long = "insecure", global = true)]
    pub insecure: bool,

    /// Starting chunk size in bytes; the registry may raise it
    #[arg(long = "chunk-size", short = 'c', default_value_t = DEFAULT_CHUNK_SIZE, global = true)]
    pub chunk_size: usize,

    /// gzip compression level (0-9)
    #[arg(long = "compression-level", default_value_t = 6, global = true)]
    pub compression_level: u32,

    /// Timeout for each registry request in seconds
    #[arg(long = "timeout", short = 't', default_value_t = 300, global = true)]
    pub timeout: u64,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// Only print results and errors
    #[arg(long = "quiet", short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Registry and repository to push to
#[derive(clap::Args, Debug, Clone)]
pub struct Target {
    /// Registry host or URL, e.g. ghcr.io
    #[arg(long = "registry", short = 'r')]
    pub registry: String,

    /// Repository path inside the registry, e.g. acme/app
    #[arg(long = "repository")]
    pub repository: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload layer files and print one `<diff-id>|<digest>|<size>` line per layer
    PushLayer {
        #[command(flatten)]
        target: Target,

        /// Uncompressed layer files (usually tar archives)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Commit a manifest for layers uploaded earlier with push-layer
    Commit {
        #[command(flatten)]
        target: Target,

        /// Tag to push the manifest under (repeatable)
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,

        /// Layer descriptor `<diff-id>|<digest>|<size>` (repeatable, in order)
        #[arg(long = "layer", value_name = "DESCRIPTOR")]
        layers: Vec<String>,

        /// JSON file with architecture, os, entrypoint, command, workingDir and env
        #[arg(long = "metadata")]
        metadata: PathBuf,
    },

    /// Upload layer files and commit a manifest for them
    Push {
        #[command(flatten)]
        target: Target,

        /// Tag to push the manifest under (repeatable)
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,

        /// JSON file with architecture, os, entrypoint, command, workingDir and env
        #[arg(long = "metadata")]
        metadata: PathBuf,

        /// Uncompressed layer files, in layer order
        files: Vec<PathBuf>,
    },
}

impl Command {
    pub fn target(&self) -> &Target {
        match self {
            Command::PushLayer { target, .. } | Command::Commit { target, .. } | Command::Push { target, .. } => {
                target
            }
        }
    }
}
