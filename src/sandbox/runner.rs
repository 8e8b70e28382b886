//! Sandboxed execution of one compiled artifact against one test case.
//!
//! The runner drives the external `isolate` binary: it initializes a box,
//! stages the artifact, the input file, and a small driver script that
//! wires stdin/stdout, runs under CPU/wall/memory caps, then interprets
//! the emitted meta file into a judge verdict. Whatever happens, the box
//! is cleaned up and its id returned to the pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::comparator::{normalize, truncate};
use crate::error::{Error, Result};
use crate::languages::Artifact;
use crate::submission::{JudgeMode, TestCaseResult};
use crate::verdict::Status;

use super::meta::{ExecMeta, MetaStatus};
use super::pool::BoxPool;

const INPUT_FILE: &str = "input.txt";
const OUTPUT_FILE: &str = "user.out";
const ANSWER_FILE: &str = "answer.txt";
const DRIVER_FILE: &str = "run.sh";

/// Cap on error strings attached to case results.
const MAX_ERROR_BYTES: usize = 1024;

/// Everything needed to evaluate one test case. Owned so the evaluation
/// can run on its own task.
#[derive(Debug, Clone)]
pub struct CaseSpec {
    pub index: usize,
    pub artifact: Artifact,
    pub input_path: PathBuf,
    pub time_limit: Duration,
    pub memory_limit_mb: u64,
    pub mode: JudgeMode,
    /// Judge program for interactive mode.
    pub special: Option<Artifact>,
    /// Normalized expected output, staged as the judge program's answer
    /// file in interactive mode.
    pub expected_text: String,
}

/// Evaluates one test case. Implemented by the isolate-backed runner;
/// tests supply fakes.
#[async_trait]
pub trait CaseRunner: Send + Sync {
    async fn run_case(&self, spec: CaseSpec) -> TestCaseResult;
}

pub struct SandboxRunner {
    isolate_path: String,
    pool: BoxPool,
    max_output_size: usize,
}

#[async_trait]
impl CaseRunner for SandboxRunner {
    /// Evaluate one case. Failures of any kind degrade to an SE result;
    /// the box id is released unconditionally.
    async fn run_case(&self, spec: CaseSpec) -> TestCaseResult {
        let index = spec.index;
        let lease = match self.pool.acquire() {
            Ok(lease) => lease,
            Err(e) => return TestCaseResult::system_error(index, e.to_string()),
        };
        let box_id = lease.id();

        let outcome = self.evaluate(box_id, &spec).await;
        self.cleanup_box(box_id).await;

        match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(case = index, box_id, error = %e, "case evaluation failed");
                TestCaseResult::system_error(index, truncate(&e.to_string(), MAX_ERROR_BYTES))
            }
        }
    }
}

impl SandboxRunner {
    pub fn new(isolate_path: impl Into<String>, pool: BoxPool, max_output_size: usize) -> Self {
        Self {
            isolate_path: isolate_path.into(),
            pool,
            max_output_size,
        }
    }

    /// Fail fast when the sandbox binary is not installed.
    pub async fn check_available(&self) -> Result<()> {
        match Command::new(&self.isolate_path).arg("--version").output().await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::FatalInfrastructure(
                format!("sandbox binary not found: {}", self.isolate_path),
            )),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn evaluate(&self, box_id: u32, spec: &CaseSpec) -> Result<TestCaseResult> {
        let box_root = self.init_box(box_id).await?;
        let work_dir = box_root.join("box");

        self.stage(&work_dir, spec).await?;

        let meta_path = std::env::temp_dir().join(format!("judged-meta-{}.txt", box_id));
        let _ = tokio::fs::remove_file(&meta_path).await;

        let time_secs = spec.time_limit.as_secs_f64();
        let wall_factor = match spec.mode {
            JudgeMode::Interactive => 6.0,
            _ => 2.0,
        };

        let mut command = Command::new(&self.isolate_path);
        command
            .arg("--run")
            .arg("--cg")
            .arg(format!("--box-id={}", box_id))
            .arg("--processes")
            .arg("-e")
            .arg(format!("--time={:.3}", time_secs))
            .arg(format!("--wall-time={:.3}", time_secs * wall_factor))
            .arg(format!("--mem={}", spec.memory_limit_mb * 1024))
            .arg(format!("--meta={}", meta_path.display()))
            .arg("--")
            .arg("/bin/bash")
            .arg(DRIVER_FILE)
            .current_dir(&work_dir)
            .kill_on_drop(true);

        debug!(box_id, case = spec.index, "running sandbox");
        // The run's exit status is not consulted; the meta file is the
        // authoritative record of what happened inside.
        let run = command.output().await?;
        if !run.status.success() {
            debug!(
                box_id,
                status = %run.status,
                stderr = %String::from_utf8_lossy(&run.stderr),
                "sandbox exited non-zero"
            );
        }

        let meta_content = tokio::fs::read_to_string(&meta_path).await.unwrap_or_default();
        let _ = tokio::fs::remove_file(&meta_path).await;
        let meta = ExecMeta::parse(&meta_content);

        let stdout_raw = tokio::fs::read_to_string(work_dir.join(OUTPUT_FILE))
            .await
            .unwrap_or_default();
        let stdout = truncate(&normalize(&stdout_raw), self.max_output_size);

        let mem_used = if meta.oom_killed && meta.memory_kb == 0 {
            // The sandbox sometimes reports no cg-mem after an OOM kill.
            spec.memory_limit_mb * 2 * 1024 * 1024
        } else {
            meta.memory_kb * 1024
        };

        let (status, error_msg) = classify(
            &meta,
            spec.mode,
            spec.time_limit,
            spec.memory_limit_mb,
            mem_used,
        );

        Ok(TestCaseResult {
            index: spec.index,
            status,
            time_used: meta.cpu_time,
            mem_used,
            stdout,
            expected: String::new(),
            error_msg,
        })
    }

    /// Copy the artifact, the input, and the driver script into the box.
    async fn stage(&self, work_dir: &Path, spec: &CaseSpec) -> Result<()> {
        for file in &spec.artifact.stage {
            copy_into(file, work_dir).await?;
        }
        tokio::fs::copy(&spec.input_path, work_dir.join(INPUT_FILE)).await?;

        let script = match spec.mode {
            JudgeMode::Interactive => {
                let judge = spec.special.as_ref().ok_or_else(|| {
                    Error::SandboxInternal("interactive case without a judge program".into())
                })?;
                for file in &judge.stage {
                    copy_into(file, work_dir).await?;
                }
                tokio::fs::write(work_dir.join(ANSWER_FILE), &spec.expected_text).await?;
                interactive_driver(&spec.artifact.command, &judge.command)
            }
            JudgeMode::Normal | JudgeMode::Special => normal_driver(&spec.artifact.command),
        };

        let driver_path = work_dir.join(DRIVER_FILE);
        tokio::fs::write(&driver_path, script).await?;
        let mut perms = tokio::fs::metadata(&driver_path).await?.permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        tokio::fs::set_permissions(&driver_path, perms).await?;
        Ok(())
    }

    async fn init_box(&self, box_id: u32) -> Result<PathBuf> {
        // A stale box from a cancelled run may still exist; clear it first.
        self.cleanup_box(box_id).await;

        let output = Command::new(&self.isolate_path)
            .arg("--init")
            .arg("--cg")
            .arg(format!("--box-id={}", box_id))
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::SandboxInternal(format!(
                "sandbox init failed for box {}: {}",
                box_id,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(PathBuf::from(root))
    }

    async fn cleanup_box(&self, box_id: u32) {
        let result = Command::new(&self.isolate_path)
            .arg("--cleanup")
            .arg("--cg")
            .arg(format!("--box-id={}", box_id))
            .output()
            .await;
        if let Err(e) = result {
            warn!(box_id, error = %e, "sandbox cleanup failed");
        }
    }
}

async fn copy_into(file: &Path, work_dir: &Path) -> Result<()> {
    let name = file
        .file_name()
        .ok_or_else(|| Error::SandboxInternal(format!("unnamed stage file: {}", file.display())))?;
    tokio::fs::copy(file, work_dir.join(name)).await?;
    Ok(())
}

fn normal_driver(command: &[String]) -> String {
    format!(
        "#!/bin/bash\nexec {} < {} > {}\n",
        command.join(" "),
        INPUT_FILE,
        OUTPUT_FILE
    )
}

/// Connect the contestant program and the judge program with a FIFO pair;
/// the driver exits with the judge program's status (0 means accepted).
fn interactive_driver(user_command: &[String], judge_command: &[String]) -> String {
    format!(
        concat!(
            "#!/bin/bash\n",
            "mkfifo judge_in judge_out\n",
            "{user} < judge_out > judge_in &\n",
            "user_pid=$!\n",
            "{judge} {input} {answer} < judge_in > judge_out\n",
            "judge_status=$?\n",
            "wait \"$user_pid\"\n",
            "exit \"$judge_status\"\n",
        ),
        user = user_command.join(" "),
        judge = judge_command.join(" "),
        input = INPUT_FILE,
        answer = ANSWER_FILE,
    )
}

/// Interpret the meta record into a verdict.
///
/// The raw table is consulted first; a clean exit is then re-checked
/// against the numeric fields, so a run that slipped past the sandbox's
/// own enforcement still gets TLE/MLE.
fn classify(
    meta: &ExecMeta,
    mode: JudgeMode,
    time_limit: Duration,
    memory_limit_mb: u64,
    mem_used: u64,
) -> (Status, Option<String>) {
    if meta.status == Some(MetaStatus::Timeout) || (meta.killed && !meta.oom_killed) {
        return (Status::Tle, Some("time limit exceeded".into()));
    }
    if meta.oom_killed {
        return (Status::Mle, Some("memory limit exceeded".into()));
    }
    if meta.status == Some(MetaStatus::Signalled) || meta.exit_sig.unwrap_or(0) > 0 {
        let msg = match meta.exit_sig {
            Some(sig) if sig > 0 => format!("terminated by signal {}", sig),
            _ => "terminated by signal".into(),
        };
        return (Status::Re, Some(msg));
    }
    if meta.status == Some(MetaStatus::Internal) {
        return (Status::Se, Some("sandbox internal error".into()));
    }
    if meta.status == Some(MetaStatus::RuntimeError) || meta.exit_code != 0 {
        // In interactive mode the driver exits with the judge program's
        // status, so a non-zero exit means the judge rejected the run.
        return match mode {
            JudgeMode::Interactive => (
                Status::Wa,
                Some(format!(
                    "judge program exited with code {}",
                    meta.exit_code
                )),
            ),
            _ => (
                Status::Re,
                Some(format!("runtime error: exit code {}", meta.exit_code)),
            ),
        };
    }

    if meta.cpu_time > time_limit {
        return (
            Status::Tle,
            Some(format!(
                "cpu time {:?} over the {:?} limit",
                meta.cpu_time, time_limit
            )),
        );
    }
    if mem_used > memory_limit_mb * 1024 * 1024 {
        return (
            Status::Mle,
            Some(format!(
                "{} bytes over the {} MB limit",
                mem_used, memory_limit_mb
            )),
        );
    }

    (Status::Ac, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> (Duration, u64) {
        (Duration::from_millis(1000), 64)
    }

    fn classify_normal(meta: &ExecMeta) -> (Status, Option<String>) {
        let (time_limit, mem_mb) = limits();
        classify(meta, JudgeMode::Normal, time_limit, mem_mb, meta.memory_kb * 1024)
    }

    #[test]
    fn test_clean_run_is_ac() {
        let meta = ExecMeta::parse("time:0.020\ncg-mem:2048\nexitcode:0\n");
        let (status, msg) = classify_normal(&meta);
        assert_eq!(status, Status::Ac);
        assert!(msg.is_none());
    }

    #[test]
    fn test_status_to_is_tle() {
        let meta = ExecMeta::parse("status:TO\ntime:2.100\n");
        assert_eq!(classify_normal(&meta).0, Status::Tle);
    }

    #[test]
    fn test_killed_without_oom_is_tle() {
        let meta = ExecMeta::parse("killed:1\ntime:0.500\n");
        assert_eq!(classify_normal(&meta).0, Status::Tle);
    }

    #[test]
    fn test_oom_killed_is_mle() {
        let meta = ExecMeta::parse("killed:1\ncg-oom-killed:1\ncg-mem:70000\n");
        assert_eq!(classify_normal(&meta).0, Status::Mle);
    }

    #[test]
    fn test_signal_is_re_with_signal_number() {
        let meta = ExecMeta::parse("status:SG\nexitsig:11\n");
        let (status, msg) = classify_normal(&meta);
        assert_eq!(status, Status::Re);
        assert!(msg.unwrap().contains("11"));
    }

    #[test]
    fn test_internal_error_is_se() {
        let meta = ExecMeta::parse("status:XX\n");
        assert_eq!(classify_normal(&meta).0, Status::Se);
    }

    #[test]
    fn test_nonzero_exit_is_re() {
        let meta = ExecMeta::parse("exitcode:1\ntime:0.003\n");
        let (status, msg) = classify_normal(&meta);
        assert_eq!(status, Status::Re);
        assert!(msg.unwrap().contains("exit code 1"));
    }

    #[test]
    fn test_post_check_overrides_clean_exit_to_tle() {
        // Clean exit, but the measured cpu time is past the limit.
        let meta = ExecMeta::parse("time:1.500\nexitcode:0\ncg-mem:1000\n");
        let (status, _) = classify_normal(&meta);
        assert_eq!(status, Status::Tle);
    }

    #[test]
    fn test_post_check_overrides_clean_exit_to_mle() {
        // 80 MB against a 64 MB cap.
        let meta = ExecMeta::parse("time:0.100\nexitcode:0\ncg-mem:81920\n");
        let (status, _) = classify_normal(&meta);
        assert_eq!(status, Status::Mle);
    }

    #[test]
    fn test_interactive_nonzero_exit_is_wa() {
        let meta = ExecMeta::parse("exitcode:1\ntime:0.010\n");
        let (time_limit, mem_mb) = limits();
        let (status, _) = classify(&meta, JudgeMode::Interactive, time_limit, mem_mb, 0);
        assert_eq!(status, Status::Wa);
    }

    #[test]
    fn test_interactive_tle_still_wins() {
        let meta = ExecMeta::parse("status:TO\nexitcode:1\n");
        let (time_limit, mem_mb) = limits();
        let (status, _) = classify(&meta, JudgeMode::Interactive, time_limit, mem_mb, 0);
        assert_eq!(status, Status::Tle);
    }

    #[test]
    fn test_normal_driver_shape() {
        let script = normal_driver(&["./main".into()]);
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("exec ./main < input.txt > user.out"));
    }

    #[test]
    fn test_interactive_driver_exits_with_judge_status() {
        let script = interactive_driver(
            &["./main".into()],
            &["./spj".into()],
        );
        assert!(script.contains("mkfifo"));
        assert!(script.contains("./spj input.txt answer.txt"));
        assert!(script.contains("exit \"$judge_status\""));
    }
}
