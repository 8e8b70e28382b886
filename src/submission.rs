//! Submission request/response shapes and aggregation rules.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::languages::Language;
use crate::verdict::{fold, Status};

const MIN_TIME_LIMIT_MS: u64 = 100;
const MAX_TIME_LIMIT_MS: u64 = 60_000;
const MIN_MEMORY_LIMIT_MB: u64 = 16;
const MAX_MEMORY_LIMIT_MB: u64 = 1024;

/// How the verdict of a case is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeMode {
    /// Compare program output against the expected output.
    Normal,
    /// A checker program inspects (input, output, expected) after the run.
    Special,
    /// The program talks to a judge program over a bidirectional pipe.
    Interactive,
}

/// Wire shape of a judge request, validated at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// CPU time limit in milliseconds.
    pub cpu_limit: u64,
    /// Memory limit in bytes.
    pub mem_limit: u64,
    #[serde(default)]
    pub stack_limit: Option<u64>,
    #[serde(default)]
    pub proc_limit: Option<u64>,
    /// Source text.
    pub code_file: String,
    pub code_language: String,
    #[serde(default)]
    pub is_special: bool,
    /// Overrides `is_special` when present; required for interactive.
    #[serde(default)]
    pub judge_mode: Option<JudgeMode>,
    #[serde(default)]
    pub special_code_file: Option<String>,
    /// The special program's language is inferred from this name's
    /// extension.
    #[serde(default)]
    pub special_code_file_name: Option<String>,
    pub bucket: String,
    pub check_points: Vec<CheckPoint>,
}

/// A test case addressed by the content hashes of its artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckPoint {
    /// Hash of the input artifact.
    pub input: String,
    /// Hash of the expected-output artifact.
    pub output: String,
}

/// A validated submission, ready for the coordinator.
#[derive(Debug, Clone)]
pub struct Submission {
    pub language: Language,
    pub time_limit: Duration,
    pub memory_limit_mb: u64,
    pub source: String,
    pub bucket: String,
    pub mode: JudgeMode,
    pub special_source: Option<String>,
    pub special_language: Option<Language>,
    pub test_cases: Vec<CheckPoint>,
    /// Epoch seconds at validation time.
    pub created_at: i64,
}

impl SubmissionRequest {
    /// Enforce the request bounds and produce a `Submission`.
    pub fn validate(&self) -> Result<Submission> {
        if self.code_file.is_empty() {
            return Err(Error::InvalidArgument("source code is empty".into()));
        }
        if self.check_points.is_empty() {
            return Err(Error::InvalidArgument("no test cases supplied".into()));
        }
        if !(MIN_TIME_LIMIT_MS..=MAX_TIME_LIMIT_MS).contains(&self.cpu_limit) {
            return Err(Error::InvalidArgument(format!(
                "cpu limit {} ms outside {}-{} ms",
                self.cpu_limit, MIN_TIME_LIMIT_MS, MAX_TIME_LIMIT_MS
            )));
        }
        let memory_limit_mb = self.mem_limit / (1024 * 1024);
        if !(MIN_MEMORY_LIMIT_MB..=MAX_MEMORY_LIMIT_MB).contains(&memory_limit_mb) {
            return Err(Error::InvalidArgument(format!(
                "memory limit {} bytes outside {}-{} MB",
                self.mem_limit, MIN_MEMORY_LIMIT_MB, MAX_MEMORY_LIMIT_MB
            )));
        }
        if self.bucket.is_empty() {
            return Err(Error::InvalidArgument("bucket is empty".into()));
        }

        let language = Language::parse(&self.code_language)?;

        let mode = match self.judge_mode {
            Some(mode) => mode,
            None if self.is_special => JudgeMode::Special,
            None => JudgeMode::Normal,
        };

        let (special_source, special_language) = match mode {
            JudgeMode::Normal => {
                if self.special_code_file.is_some() {
                    return Err(Error::InvalidArgument(
                        "special program supplied for a normal submission".into(),
                    ));
                }
                (None, None)
            }
            JudgeMode::Special | JudgeMode::Interactive => {
                let source = self
                    .special_code_file
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidArgument(
                            "special judge mode requires a special program".into(),
                        )
                    })?;
                let name = self.special_code_file_name.as_deref().ok_or_else(|| {
                    Error::InvalidArgument(
                        "special program file name is required to infer its language".into(),
                    )
                })?;
                (Some(source), Some(Language::from_extension(name)?))
            }
        };

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Submission {
            language,
            time_limit: Duration::from_millis(self.cpu_limit),
            memory_limit_mb,
            source: self.code_file.clone(),
            bucket: self.bucket.clone(),
            mode,
            special_source,
            special_language,
            test_cases: self.check_points.clone(),
            created_at,
        })
    }
}

/// Result of one test case, immutable once the runner returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub index: usize,
    pub status: Status,
    #[serde(with = "duration_ns")]
    pub time_used: Duration,
    /// Peak memory in bytes.
    pub mem_used: u64,
    /// Normalized, truncated program output.
    pub stdout: String,
    /// Normalized, truncated expected output.
    pub expected: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl TestCaseResult {
    pub fn system_error(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            status: Status::Se,
            time_used: Duration::ZERO,
            mem_used: 0,
            stdout: String::new(),
            expected: String::new(),
            error_msg: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileSummary {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate judge response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    pub id: i64,
    pub final_status: Status,
    /// 0-100.
    pub score: u32,
    #[serde(with = "duration_ns")]
    pub total_time_used: Duration,
    /// Peak memory across cases, in bytes.
    pub peak_mem_used: u64,
    pub compile: CompileSummary,
    pub cases: Vec<TestCaseResult>,
    /// Epoch seconds.
    pub submit_time: i64,
    /// Epoch seconds.
    pub judge_time: i64,
}

impl JudgeResult {
    /// Result for a submission that failed to compile.
    pub fn compile_error(id: i64, diagnostics: String, submit_time: i64) -> Self {
        Self {
            id,
            final_status: Status::Ce,
            score: 0,
            total_time_used: Duration::ZERO,
            peak_mem_used: 0,
            compile: CompileSummary {
                success: false,
                message: Some(diagnostics),
            },
            cases: Vec::new(),
            submit_time,
            judge_time: epoch_secs(),
        }
    }
}

pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Fold per-case statuses into the submission verdict.
pub fn final_status(cases: &[TestCaseResult]) -> Status {
    cases.iter().fold(Status::Ac, |acc, c| fold(acc, c.status))
}

/// Score as the rounded percentage of accepted cases; empty is 0.
pub fn score(cases: &[TestCaseResult]) -> u32 {
    if cases.is_empty() {
        return 0;
    }
    let accepted = cases.iter().filter(|c| c.status == Status::Ac).count();
    ((accepted as f64 / cases.len() as f64) * 100.0).round() as u32
}

/// Durations cross the wire as integer nanoseconds.
mod duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
