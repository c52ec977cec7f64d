use reqwest::StatusCode;

use crate::part::FilePart;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer cancelled")]
    Cancelled,

    #[error("invalid file size {size}: a transfer needs a positive length")]
    InvalidFileSize { size: i64 },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("preparation failed: {source}")]
    Preparation {
        #[source]
        source: Box<TransferError>,
    },

    #[error("download failed in part {part}: {source}")]
    PartTransfer {
        part: FilePart,
        #[source]
        source: Box<TransferError>,
    },

    #[error("post-processing failed: {source}")]
    PostProcessing {
        #[source]
        source: Box<TransferError>,
    },

    #[error("merged byte count mismatch: expected {expected} bytes, copied {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("failed to start part downloads: {reason}")]
    TaskFailure { reason: String },
}

impl TransferError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn preparation(source: TransferError) -> Self {
        Self::Preparation {
            source: Box::new(source),
        }
    }

    pub fn part_transfer(part: FilePart, source: TransferError) -> Self {
        Self::PartTransfer {
            part,
            source: Box::new(source),
        }
    }

    pub fn post_processing(source: TransferError) -> Self {
        Self::PostProcessing {
            source: Box::new(source),
        }
    }

    /// Whether retrying the whole `download()` call can reasonably succeed.
    ///
    /// Cancellation is retryable by contract: an interrupted transfer leaves
    /// no partial state behind, so the caller may simply run it again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::InvalidFileSize { .. } | Self::InvalidUrl { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Preparation { source }
            | Self::PartTransfer { source, .. }
            | Self::PostProcessing { source } => source.is_retryable(),
            Self::Network { .. }
            | Self::Io { .. }
            | Self::SizeMismatch { .. }
            | Self::TaskFailure { .. } => true,
        }
    }
}
