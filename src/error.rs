//! Typed errors for the judge engine.
//!
//! Every failure the coordinator can surface to a caller belongs to one of
//! these families. Each family carries a stable numeric code so API
//! consumers can dispatch without string matching; the code space mirrors
//! the layering of the engine (1xxx system, 2xxx validation, 3xxx compile,
//! 4xxx sandbox, 5xxx storage).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("judging exceeded the maximum allowed time")]
    JudgeTimeout,

    #[error("judge queue is full, try again later")]
    QueueFull,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("compiler not available: {0}")]
    CompilerUnavailable(String),

    #[error("compilation exceeded the {0} second limit")]
    CompileTimeout(u64),

    #[error("fatal infrastructure error: {0}")]
    FatalInfrastructure(String),

    #[error("sandbox internal error: {0}")]
    SandboxInternal(String),

    #[error("backing store error: {0}")]
    BackingStore(String),

    #[error("cache integrity error: expected hash {expected}, content hashed to {actual}")]
    CacheIntegrity { expected: String, actual: String },

    #[error("cache disk quota exhausted: need {needed} bytes, quota {quota} bytes")]
    DiskFull { needed: u64, quota: u64 },
}

impl Error {
    /// Stable numeric code for API consumers.
    pub fn code(&self) -> u32 {
        match self {
            Error::Io(_) => 1001,
            Error::JudgeTimeout => 1002,
            Error::QueueFull => 1003,
            Error::InvalidArgument(_) => 2000,
            Error::InvalidConfig(_) => 2001,
            Error::CompilerUnavailable(_) => 3001,
            Error::CompileTimeout(_) => 3002,
            Error::FatalInfrastructure(_) => 4001,
            Error::SandboxInternal(_) => 4002,
            Error::BackingStore(_) => 5002,
            Error::CacheIntegrity { .. } => 5003,
            Error::DiskFull { .. } => 5004,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
