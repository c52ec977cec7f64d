use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str =
    concat!("partstream-engine/", env!("CARGO_PKG_VERSION"));

/// How the downloaded parts are laid down on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Every part writes directly into a single sparse scratch file at its
    /// own offset; the scratch file is renamed into place at the end.
    #[default]
    InPlace,
    /// Every part gets its own file; the files are merged into the scratch
    /// file in part order at the end. Useful on filesystems where concurrent
    /// positioned writes to one file perform poorly.
    SeparateParts,
}

/// Tuning for the partitioning algorithm.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Preferred size of a single part. Must be at least 1; lower values are
    /// clamped. Files smaller than `min_part_size + min_part_size_floor`
    /// are transferred as a single part.
    pub min_part_size: u64,

    /// Smallest residual that is allowed to become a part of its own.
    /// A trailing residual below this bound is folded into the preceding
    /// part instead.
    pub min_part_size_floor: u64,

    /// Upper bound on concurrently transferred parts. `1` disables
    /// partitioning entirely.
    pub max_parts: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            min_part_size: 8 * 1024 * 1024,
            min_part_size_floor: 1024 * 1024,
            max_parts: 5,
        }
    }
}

/// Configuration for one transfer, bundled into a
/// [`TransferContext`](crate::TransferContext).
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub split: SplitConfig,

    /// Reconstruction mode used by [`download`](crate::download).
    pub write_mode: WriteMode,

    /// Buffer size for the merge copy loop. Network chunks are written as
    /// they arrive and are not affected by this value.
    pub io_buffer_size: usize,

    /// Retry policy for the final rename of the scratch file, absorbing
    /// transient filesystem contention.
    pub rename_retry: RetryPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            split: SplitConfig::default(),
            write_mode: WriteMode::default(),
            io_buffer_size: 64 * 1024,
            rename_retry: RetryPolicy::default(),
        }
    }
}

/// Options for the built-in reqwest transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between received body chunks).
    pub read_timeout: Duration,

    /// Whether to follow redirects.
    pub follow_redirects: bool,

    /// User agent string.
    pub user_agent: String,

    /// Custom HTTP headers sent with every ranged request.
    pub headers: HeaderMap,

    /// Maximum idle connections kept per host. Parallel ranged requests to a
    /// single host reuse pooled connections heavily, so this should be at
    /// least the configured part concurrency.
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing.
    pub pool_idle_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::get_default_headers(),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/octet-stream, */*"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers
    }
}
