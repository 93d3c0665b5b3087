//! Discriminated error taxonomy shared across every public boundary.
//!
//! Internal helpers are free to use `anyhow::Result`; anything crossing
//! a module boundary that the CLI or MCP surface can observe converts
//! into a [`MinervaError`] variant so callers can match on a stable
//! error *kind* rather than parsing a message.

use thiserror::Error;

/// A single error taxonomy for the indexing, discovery, search, and
/// credential-resolution paths described in the component design.
#[derive(Debug, Error)]
pub enum MinervaError {
    #[error("config error at {path}: {message}")]
    Config { path: String, message: String },

    #[error("credential missing: {variable} is not set in the environment or keychain (try `export {variable}=...` or `minerva keychain set {variable}`)")]
    CredentialMissing { variable: String },

    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("provider {provider} call failed: {message}")]
    ProviderError { provider: String, message: String },

    #[error("rate limit exhausted for provider {provider}")]
    RateLimited { provider: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("collection {collection} is incompatible: {field} differs from the existing collection (pass force_recreate: true to rebuild it)")]
    IncompatibleCollection { collection: String, field: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("validation error at {field}: {message}")]
    Validation { field: String, message: String },

    #[error("collection not found: {collection}")]
    CollectionNotFound { collection: String },

    #[error("collection unavailable: {collection} ({reason})")]
    CollectionUnavailable { collection: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MinervaError {
    /// Maps an error kind to the exit code contract in the CLI surface:
    /// `0` success, `1` user/config/availability error, `2` unexpected
    /// internal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MinervaError::Config { .. }
            | MinervaError::CredentialMissing { .. }
            | MinervaError::ProviderUnavailable { .. }
            | MinervaError::RateLimited { .. }
            | MinervaError::IncompatibleCollection { .. }
            | MinervaError::Validation { .. }
            | MinervaError::CollectionNotFound { .. }
            | MinervaError::CollectionUnavailable { .. } => 1,
            MinervaError::ProviderError { .. }
            | MinervaError::DimensionMismatch { .. }
            | MinervaError::Storage { .. }
            | MinervaError::Other(_) => 2,
        }
    }

    /// A short machine-readable code, used in MCP error payloads
    /// (`{error: code, message, suggestion?}`) and JSON CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            MinervaError::Config { .. } => "CONFIG_ERROR",
            MinervaError::CredentialMissing { .. } => "CREDENTIAL_MISSING",
            MinervaError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            MinervaError::ProviderError { .. } => "PROVIDER_ERROR",
            MinervaError::RateLimited { .. } => "RATE_LIMITED",
            MinervaError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            MinervaError::IncompatibleCollection { .. } => "INCOMPATIBLE_COLLECTION",
            MinervaError::Storage { .. } => "STORAGE_ERROR",
            MinervaError::Validation { .. } => "VALIDATION_ERROR",
            MinervaError::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            MinervaError::CollectionUnavailable { .. } => "COLLECTION_UNAVAILABLE",
            MinervaError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, MinervaError>;
