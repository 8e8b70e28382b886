//! Single-node online judge execution engine.
//!
//! Given a submission (source code, resource limits, test cases addressed
//! by content hash in a remote object store), the engine compiles the
//! code, runs it against each test case inside an OS-level sandbox with
//! CPU-time and memory caps, compares observed output with the expected
//! output, and returns per-case and aggregate verdicts.
//!
//! Services are explicit and lifetime-scoped: the binary (or an embedding
//! server) constructs an [`ArtifactCache`], [`AdmissionGate`],
//! [`SandboxRunner`], [`IdGenerator`], and [`JudgeMetrics`] from an
//! [`AppConfig`] and wires them into a [`JudgeService`]; tests supply
//! in-memory fakes.

pub mod cache;
pub mod comparator;
pub mod compiler;
pub mod config;
pub mod error;
pub mod gate;
pub mod judge;
pub mod languages;
pub mod metrics;
pub mod sandbox;
pub mod snowflake;
pub mod storage;
pub mod submission;
pub mod verdict;

pub use cache::ArtifactCache;
pub use config::AppConfig;
pub use error::{Error, Result};
pub use gate::AdmissionGate;
pub use judge::JudgeService;
pub use languages::Language;
pub use metrics::JudgeMetrics;
pub use sandbox::{BoxPool, CaseRunner, SandboxRunner};
pub use snowflake::IdGenerator;
pub use storage::{ArtifactStore, MemoryStore, S3ArtifactStore};
pub use submission::{JudgeMode, JudgeResult, SubmissionRequest};
pub use verdict::Status;
