use thiserror::Error;

use crate::{config::LoadError, domain::error::FetchError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("lookup failed: {0}")]
    Lookup(#[from] FetchError),
}

impl AppError {
    /// Process exit status for the binary, loosely following `sysexits.h`.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Lookup(FetchError::NonExistent) => 1,
            AppError::Lookup(FetchError::MalformedInput { .. }) => 65,
            AppError::Lookup(FetchError::Transport { .. }) => 69,
            AppError::Lookup(FetchError::Storage { .. }) => 74,
            AppError::Infra(InfraError::Io(_) | InfraError::Cache { .. }) => 74,
            AppError::Infra(InfraError::Serialization { .. }) => 70,
            AppError::Infra(InfraError::Telemetry(_)) => 70,
            AppError::Config(_) => 78,
        }
    }
}
