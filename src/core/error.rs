// src/core/error.rs

use std::time::Duration;
use thiserror::Error;

/// Failure of a single probe request. Expected absence (no DNS answer, no
/// certificates) is never reported through this type.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("request cancelled")]
    Cancelled,
}

/// A scanner's `run` rejected. Scanners convert upstream failures into
/// outcomes themselves, so this only carries unexpected conditions.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Programming and configuration errors, raised synchronously to the caller.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("timeout must be a finite, positive duration (got {0})")]
    InvalidTimeout(String),

    #[error("unknown scanner id: {0}")]
    UnknownScanner(String),

    #[error("duplicate scanner id: {0}")]
    DuplicateScanner(String),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("rate limit reached, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
