//! Logging and output control
//!
//! [`Logger`] owns all user-visible output and its verbosity. Wire-level
//! diagnostics go through `tracing` instead and are switched on with `RUST_LOG`.

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Instant,
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Instant::now(),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Instant::now(),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        if !self.quiet {
            eprintln!("\n=== {} ===", title);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            eprintln!("ℹ️  {}", message);
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            eprintln!("✅ {}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            eprintln!("⚠️  WARNING: {}", message);
        }
    }

    /// Errors are printed even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("❌ ERROR: {}", message);
    }

    pub fn step(&self, message: &str) {
        if !self.quiet {
            eprintln!("▶️  {}", message);
        }
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose && !self.quiet {
            eprintln!("   {}", message);
        }
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        if !self.quiet {
            eprintln!("\n--- {} ---", title);
            for (key, value) in items {
                eprintln!("  {}: {}", key, value);
            }
        }
    }

    /// Machine-readable result line; goes to stdout and survives `--quiet`
    pub fn result(&self, line: &str) {
        println!("{}", line);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Format file size in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{}.{:01}s", secs, duration.subsec_millis() / 100)
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

/// Install the `tracing` subscriber used for wire diagnostics.
///
/// Defaults to `warn`, or `debug` for this crate when `verbose` is set;
/// `RUST_LOG` always wins.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,oci_pusher=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
