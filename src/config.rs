//! Engine configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then environment variables with the `JUDGE` prefix
//! (`JUDGE__JUDGE__MAX_CONCURRENT=4` overrides `judge.max_concurrent`).
//! Later sources win, giving the precedence env var > config file >
//! built-in default.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

const MIN_CONCURRENT: usize = 1;
const MAX_CONCURRENT: usize = 16;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub judge: JudgeConfig,
    pub cache: CacheConfig,
    pub sandbox: SandboxConfig,
    pub compilers: CompilerPaths,
    pub snowflake: SnowflakeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JudgeConfig {
    /// Maximum number of submissions judged concurrently (1-16).
    pub max_concurrent: usize,
    /// Overall per-submission deadline in seconds.
    pub max_timeout: u64,
    /// How long a submission may wait for an admission slot, in seconds.
    pub queue_wait_timeout: u64,
    /// Compile wall-clock cap in seconds.
    pub max_compile_timeout: u64,
    /// Parent directory for per-submission scratch directories.
    pub temp_dir: String,
    /// Upper bound on captured program output, in bytes.
    pub max_output_size: usize,
    /// Upper bound on error strings kept in results, in bytes.
    pub max_error_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub dir: String,
    /// Test artifact time-to-live in seconds.
    pub test_case_ttl: u64,
    /// Background reaper period in seconds.
    pub clean_frequency: u64,
    /// Disk footprint quota in bytes.
    pub max_disk_usage: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    pub isolate_path: String,
    pub box_pool_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompilerPaths {
    pub cc: String,
    pub cxx: String,
    pub javac: String,
    pub python: String,
    pub go: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeConfig {
    pub machine_id: u16,
    /// ID epoch as unix seconds.
    pub epoch_secs: u64,
}

impl JudgeConfig {
    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout)
    }

    pub fn queue_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_wait_timeout)
    }

    pub fn max_compile_timeout(&self) -> Duration {
        Duration::from_secs(self.max_compile_timeout)
    }

    pub fn temp_dir(&self) -> &Path {
        Path::new(&self.temp_dir)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.test_case_ttl)
    }

    pub fn clean_frequency(&self) -> Duration {
        Duration::from_secs(self.clean_frequency)
    }

    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }
}

impl SnowflakeConfig {
    pub fn epoch(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.epoch_secs)
    }
}

impl AppConfig {
    /// Load configuration, layering defaults, an optional TOML file, and
    /// `JUDGE`-prefixed environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.port", 53333i64)
            .and_then(|b| b.set_default("judge.max_concurrent", 10i64))
            .and_then(|b| b.set_default("judge.max_timeout", 300i64))
            .and_then(|b| b.set_default("judge.queue_wait_timeout", 30i64))
            .and_then(|b| b.set_default("judge.max_compile_timeout", 30i64))
            .and_then(|b| {
                b.set_default(
                    "judge.temp_dir",
                    std::env::temp_dir().to_string_lossy().to_string(),
                )
            })
            .and_then(|b| b.set_default("judge.max_output_size", 10i64 * 1024 * 1024))
            .and_then(|b| b.set_default("judge.max_error_size", 1024i64))
            .and_then(|b| {
                b.set_default(
                    "cache.dir",
                    std::env::temp_dir()
                        .join("judged-cache")
                        .to_string_lossy()
                        .to_string(),
                )
            })
            .and_then(|b| b.set_default("cache.test_case_ttl", 1800i64))
            .and_then(|b| b.set_default("cache.clean_frequency", 600i64))
            .and_then(|b| b.set_default("cache.max_disk_usage", 2i64 * 1024 * 1024 * 1024))
            .and_then(|b| b.set_default("sandbox.isolate_path", "isolate"))
            .and_then(|b| b.set_default("sandbox.box_pool_size", 500i64))
            .and_then(|b| b.set_default("compilers.cc", "cc"))
            .and_then(|b| b.set_default("compilers.cxx", "c++"))
            .and_then(|b| b.set_default("compilers.javac", "javac"))
            .and_then(|b| b.set_default("compilers.python", "python3"))
            .and_then(|b| b.set_default("compilers.go", "go"))
            .and_then(|b| b.set_default("snowflake.machine_id", 0i64))
            // 2024-01-01T00:00:00Z
            .and_then(|b| b.set_default("snowflake.epoch_secs", 1_704_067_200i64))
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        if let Some(path) = file {
            builder = builder
                .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(true));
        }

        let settings = builder
            .add_source(Environment::with_prefix("JUDGE").separator("__"))
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(MIN_CONCURRENT..=MAX_CONCURRENT).contains(&self.judge.max_concurrent) {
            return Err(Error::InvalidConfig(format!(
                "judge.max_concurrent must be within {}-{}, got {}",
                MIN_CONCURRENT, MAX_CONCURRENT, self.judge.max_concurrent
            )));
        }
        if self.judge.max_timeout == 0 || self.judge.queue_wait_timeout == 0 {
            return Err(Error::InvalidConfig(
                "judge timeouts must be positive".into(),
            ));
        }
        if self.cache.max_disk_usage == 0 {
            return Err(Error::InvalidConfig(
                "cache.max_disk_usage must be positive".into(),
            ));
        }
        if self.sandbox.box_pool_size == 0 {
            return Err(Error::InvalidConfig(
                "sandbox.box_pool_size must be positive".into(),
            ));
        }
        if self.snowflake.machine_id >= 1024 {
            return Err(Error::InvalidConfig(format!(
                "snowflake.machine_id must fit in 10 bits, got {}",
                self.snowflake.machine_id
            )));
        }
        Ok(())
    }
}
