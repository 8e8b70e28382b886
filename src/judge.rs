//! Judge coordinator: the lifecycle of one submission.
//!
//! Validate, mint an id, take an admission slot, compile, materialize
//! test artifacts, run every case in the sandbox, compare, aggregate.
//! The whole pipeline runs under an outer deadline; admission slots and
//! the scratch directory are released on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::cache::ArtifactCache;
use crate::comparator::{normalize, truncate, Comparator};
use crate::compiler::{self, CompileOutcome};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::languages::{Artifact, Language};
use crate::metrics::JudgeMetrics;
use crate::sandbox::{CaseRunner, CaseSpec};
use crate::snowflake::IdGenerator;
use crate::submission::{
    epoch_secs, final_status, score, CompileSummary, JudgeMode, JudgeResult, Submission,
    SubmissionRequest, TestCaseResult,
};
use crate::verdict::Status;

const USER_EXE: &str = "main";
const SPECIAL_EXE: &str = "spj";
const SPECIAL_DIR: &str = "spj";

/// Host-side cap for checker runs in special judge mode.
const CHECKER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct JudgeService {
    config: Arc<AppConfig>,
    metrics: Arc<JudgeMetrics>,
    gate: AdmissionGate,
    cache: Arc<ArtifactCache>,
    ids: IdGenerator,
    runner: Arc<dyn CaseRunner>,
}

struct PreparedCase {
    input_path: PathBuf,
    expected_text: String,
}

impl JudgeService {
    pub fn new(
        config: Arc<AppConfig>,
        metrics: Arc<JudgeMetrics>,
        gate: AdmissionGate,
        cache: Arc<ArtifactCache>,
        ids: IdGenerator,
        runner: Arc<dyn CaseRunner>,
    ) -> Self {
        Self {
            config,
            metrics,
            gate,
            cache,
            ids,
            runner,
        }
    }

    pub fn metrics(&self) -> &JudgeMetrics {
        &self.metrics
    }

    /// Judge one submission end to end.
    pub async fn judge(&self, request: SubmissionRequest) -> Result<JudgeResult> {
        let submission = request.validate()?;
        let id = self.ids.next_id()?;

        let _permit = self
            .gate
            .admit(self.config.judge.queue_wait_timeout())
            .await?;
        self.metrics.record_submission();

        info!(
            id,
            language = submission.language.as_str(),
            cases = submission.test_cases.len(),
            mode = ?submission.mode,
            "judging submission"
        );

        let started = Instant::now();
        let pipeline = self.run_pipeline(id, &submission);

        match tokio::time::timeout(self.config.judge.max_timeout(), pipeline).await {
            Ok(Ok(result)) => {
                self.metrics
                    .record_success(started.elapsed(), result.final_status);
                info!(
                    id,
                    status = %result.final_status,
                    score = result.score,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "submission judged"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                self.metrics.record_failure();
                error!(id, error = %e, "submission failed");
                Err(e)
            }
            Err(_) => {
                // Dropping the pipeline future kills any in-flight
                // subprocess via kill_on_drop and aborts the case task.
                self.metrics.record_failure();
                error!(
                    id,
                    deadline_secs = self.config.judge.max_timeout,
                    "submission exceeded the judge deadline"
                );
                Err(Error::JudgeTimeout)
            }
        }
    }

    async fn run_pipeline(&self, id: i64, submission: &Submission) -> Result<JudgeResult> {
        let scratch = ScratchDir::create(self.config.judge.temp_dir())?;
        debug!(id, dir = %scratch.path().display(), "allocated scratch dir");

        // Write and compile the submitted source.
        let source_path = scratch.path().join(submission.language.source_file_name());
        tokio::fs::write(&source_path, &submission.source).await?;

        match self
            .compile_program(submission.language, &source_path, scratch.path(), USER_EXE)
            .await?
        {
            CompileOutcome::Success => {}
            CompileOutcome::Failure { diagnostics } => {
                warn!(id, "compilation failed");
                return Ok(JudgeResult::compile_error(
                    id,
                    diagnostics,
                    submission.created_at,
                ));
            }
        }
        let artifact = submission.language.artifact(scratch.path(), USER_EXE)?;

        // The special judge program (checker or interactive judge) is part
        // of the problem, not the submission; its compile failure aborts.
        let special_artifact = self
            .build_special_program(submission, scratch.path())
            .await?;

        let prepared = self.fetch_cases(submission, scratch.path()).await?;

        // All cases run, in order; the early-stop policy stays reserved.
        let comparator = Comparator::new(false);
        let mut cases = Vec::with_capacity(prepared.len());
        for (i, prep) in prepared.iter().enumerate() {
            let spec = CaseSpec {
                index: i,
                artifact: artifact.clone(),
                input_path: prep.input_path.clone(),
                time_limit: submission.time_limit,
                memory_limit_mb: submission.memory_limit_mb,
                mode: submission.mode,
                special: special_artifact.clone(),
                expected_text: prep.expected_text.clone(),
            };

            let mut result = self.run_case_confined(i, spec).await;

            if result.status == Status::Ac {
                match submission.mode {
                    JudgeMode::Normal => {
                        if !comparator.compare(&result.stdout, &prep.expected_text) {
                            result.status = Status::Wa;
                            result.error_msg = Some("output mismatch".into());
                        }
                    }
                    JudgeMode::Special => {
                        self.apply_checker(
                            &mut result,
                            special_artifact.as_ref(),
                            scratch.path(),
                            i,
                            prep,
                        )
                        .await;
                    }
                    // The interactive judge already decided via its exit
                    // code.
                    JudgeMode::Interactive => {}
                }
            }

            result.expected = truncate(&prep.expected_text, self.config.judge.max_output_size);
            cases.push(result);
        }

        let total_time_used: Duration = cases.iter().map(|c| c.time_used).sum();
        let peak_mem_used = cases.iter().map(|c| c.mem_used).max().unwrap_or(0);

        Ok(JudgeResult {
            id,
            final_status: final_status(&cases),
            score: score(&cases),
            total_time_used,
            peak_mem_used,
            compile: CompileSummary {
                success: true,
                message: None,
            },
            cases,
            submit_time: submission.created_at,
            judge_time: epoch_secs(),
        })
    }

    /// Run one case on its own task so a panic inside the evaluation
    /// becomes an SE result instead of taking down the coordinator. The
    /// guard aborts the task if the pipeline itself is cancelled.
    async fn run_case_confined(&self, index: usize, spec: CaseSpec) -> TestCaseResult {
        let runner = Arc::clone(&self.runner);
        let mut task = CaseTask(tokio::spawn(async move { runner.run_case(spec).await }));
        match (&mut task.0).await {
            Ok(result) => result,
            Err(join_err) => {
                error!(case = index, error = %join_err, "case evaluation died");
                TestCaseResult::system_error(index, format!("case evaluation died: {}", join_err))
            }
        }
    }

    async fn compile_program(
        &self,
        language: Language,
        source_path: &Path,
        scratch: &Path,
        exe_name: &str,
    ) -> Result<CompileOutcome> {
        let output_path = match language {
            // javac takes the class output directory.
            Language::Java => scratch.to_path_buf(),
            _ => scratch.join(exe_name),
        };
        let outcome = compiler::compile(
            language,
            source_path,
            &output_path,
            &self.config.compilers,
            self.config.judge.max_compile_timeout(),
        )
        .await;

        match outcome {
            // A compiler stuck past its cap is the submitter's problem,
            // reported the same way as a failing compile.
            Err(Error::CompileTimeout(secs)) => Ok(CompileOutcome::Failure {
                diagnostics: format!("compilation timed out after {} seconds", secs),
            }),
            other => other,
        }
    }

    async fn build_special_program(
        &self,
        submission: &Submission,
        scratch: &Path,
    ) -> Result<Option<Artifact>> {
        if submission.mode == JudgeMode::Normal {
            return Ok(None);
        }
        let language = submission
            .special_language
            .ok_or_else(|| Error::InvalidArgument("special program language missing".into()))?;
        let source = submission
            .special_source
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("special program source missing".into()))?;

        let spj_dir = scratch.join(SPECIAL_DIR);
        tokio::fs::create_dir_all(&spj_dir).await?;
        let source_path = spj_dir.join(language.source_file_name());
        tokio::fs::write(&source_path, source).await?;

        match self
            .compile_program(language, &source_path, &spj_dir, SPECIAL_EXE)
            .await?
        {
            CompileOutcome::Success => {}
            CompileOutcome::Failure { diagnostics } => {
                return Err(Error::SandboxInternal(format!(
                    "special judge program failed to compile: {}",
                    truncate(&diagnostics, self.config.judge.max_error_size)
                )));
            }
        }
        Ok(Some(language.artifact(&spj_dir, SPECIAL_EXE)?))
    }

    /// Materialize each case's artifacts into the scratch directory as
    /// `input_i.txt` / `output_i.txt` and load the normalized expected
    /// text.
    async fn fetch_cases(
        &self,
        submission: &Submission,
        scratch: &Path,
    ) -> Result<Vec<PreparedCase>> {
        let mut prepared = Vec::with_capacity(submission.test_cases.len());
        for (i, case) in submission.test_cases.iter().enumerate() {
            let input_src = self
                .cache
                .resolve_path(&submission.bucket, &case.input)
                .await?;
            let expected_src = self
                .cache
                .resolve_path(&submission.bucket, &case.output)
                .await?;

            let input_path = scratch.join(format!("input_{}.txt", i));
            let expected_path = scratch.join(format!("output_{}.txt", i));
            tokio::fs::copy(&input_src, &input_path).await?;
            tokio::fs::copy(&expected_src, &expected_path).await?;

            let expected_text = normalize(&tokio::fs::read_to_string(&expected_path).await?);
            prepared.push(PreparedCase {
                input_path,
                expected_text,
            });
        }
        Ok(prepared)
    }

    /// Run the checker over (input, output, expected); exit 0 accepts.
    async fn apply_checker(
        &self,
        result: &mut TestCaseResult,
        checker: Option<&Artifact>,
        scratch: &Path,
        index: usize,
        prep: &PreparedCase,
    ) {
        let Some(checker) = checker else {
            result.status = Status::Se;
            result.error_msg = Some("special judge mode without a checker".into());
            return;
        };

        let output_path = scratch.join(format!("user_{}.out", index));
        if let Err(e) = tokio::fs::write(&output_path, &result.stdout).await {
            result.status = Status::Se;
            result.error_msg = Some(format!("failed to stage checker input: {}", e));
            return;
        }

        let expected_path = scratch.join(format!("output_{}.txt", index));
        match self
            .run_checker(checker, scratch, &prep.input_path, &output_path, &expected_path)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                result.status = Status::Wa;
                result.error_msg = Some("checker rejected the output".into());
            }
            Err(e) => {
                warn!(case = index, error = %e, "checker failed");
                result.status = Status::Se;
                result.error_msg = Some(truncate(
                    &e.to_string(),
                    self.config.judge.max_error_size,
                ));
            }
        }
    }

    async fn run_checker(
        &self,
        checker: &Artifact,
        scratch: &Path,
        input: &Path,
        output: &Path,
        expected: &Path,
    ) -> Result<bool> {
        let program = checker
            .command
            .first()
            .ok_or_else(|| Error::SandboxInternal("checker command is empty".into()))?;

        let mut command = Command::new(program);
        command
            .args(&checker.command[1..])
            .arg(input)
            .arg(output)
            .arg(expected)
            .current_dir(scratch.join(SPECIAL_DIR))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn()?;
        let output = tokio::time::timeout(CHECKER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::SandboxInternal("checker timed out".into()))??;
        Ok(output.status.success())
    }
}

/// Per-submission scratch directory, removed on drop.
///
/// Mode 0777: the sandbox drops to an unprivileged uid that must write
/// intermediates here. The parent directory itself stays non-world-
/// writable.
struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    fn create(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix("judged-")
            .tempdir_in(parent)?;
        let mut perms = std::fs::metadata(dir.path())?.permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o777);
        std::fs::set_permissions(dir.path(), perms)?;
        Ok(Self { dir })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Aborts the spawned case evaluation if the pipeline is cancelled.
struct CaseTask(tokio::task::JoinHandle<TestCaseResult>);

impl Drop for CaseTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::cache::ArtifactCache;
    use crate::storage::MemoryStore;
    use crate::submission::CheckPoint;

    /// Scripted stand-in for the sandbox: answers with a canned stdout
    /// keyed by the case's input content.
    #[derive(Default)]
    struct FakeRunner {
        outputs: HashMap<String, String>,
        panic_on: Option<usize>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl CaseRunner for FakeRunner {
        async fn run_case(&self, spec: CaseSpec) -> TestCaseResult {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.panic_on == Some(spec.index) {
                panic!("synthetic runner failure");
            }
            let input = std::fs::read_to_string(&spec.input_path).unwrap_or_default();
            let stdout = self
                .outputs
                .get(input.trim())
                .cloned()
                .unwrap_or_default();
            TestCaseResult {
                index: spec.index,
                status: Status::Ac,
                time_used: Duration::from_millis(10),
                mem_used: (spec.index as u64 + 1) * 1024 * 1024,
                stdout,
                expected: String::new(),
                error_msg: None,
            }
        }
    }

    /// A compiler stand-in: swallows the usual flags, then writes a tiny
    /// shell program exiting with `exit_code` at the `-o` target.
    fn fake_cc(dir: &Path, exit_code: i32) -> String {
        let path = dir.join(format!("fake-cc-{}.sh", exit_code));
        let script = format!(
            "#!/bin/sh\nwhile [ \"$1\" != \"-o\" ]; do shift; done\nprintf '#!/bin/sh\\nexit {}\\n' > \"$2\"\nchmod +x \"$2\"\n",
            exit_code
        );
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().to_string()
    }

    fn service_with(
        store: Arc<MemoryStore>,
        scratch_parent: &Path,
        runner: Arc<dyn CaseRunner>,
        cc: &str,
        max_timeout: u64,
    ) -> JudgeService {
        let mut config = AppConfig::load(None).unwrap();
        config.judge.temp_dir = scratch_parent.to_string_lossy().to_string();
        config.judge.max_timeout = max_timeout;
        config.compilers.cc = cc.into();
        let config = Arc::new(config);

        let metrics = Arc::new(JudgeMetrics::new());
        let gate = AdmissionGate::new(config.judge.max_concurrent, Arc::clone(&metrics));
        let cache = Arc::new(
            ArtifactCache::new(
                scratch_parent.join("cache"),
                config.cache.ttl(),
                config.cache.clean_frequency(),
                config.cache.max_disk_usage,
                store,
                Arc::clone(&metrics),
            )
            .unwrap(),
        );
        let ids =
            IdGenerator::new(config.snowflake.machine_id, config.snowflake.epoch()).unwrap();

        JudgeService::new(Arc::clone(&config), metrics, gate, cache, ids, runner)
    }

    fn request_with_cases(cases: Vec<CheckPoint>) -> SubmissionRequest {
        SubmissionRequest {
            cpu_limit: 1000,
            mem_limit: 64 * 1024 * 1024,
            stack_limit: None,
            proc_limit: None,
            code_file: "int main(){return 0;}".into(),
            code_language: "c".into(),
            is_special: false,
            judge_mode: None,
            special_code_file: None,
            special_code_file_name: None,
            bucket: "problems".into(),
            check_points: cases,
        }
    }

    fn c_request() -> SubmissionRequest {
        request_with_cases(vec![CheckPoint {
            input: "in0".into(),
            output: "out0".into(),
        }])
    }

    fn seed_case(store: &MemoryStore, input: &str, expected: &str) -> CheckPoint {
        CheckPoint {
            input: store.put_hashed("problems", input.as_bytes()),
            output: store.put_hashed("problems", expected.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_admission() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(
            Arc::new(MemoryStore::new()),
            dir.path(),
            Arc::new(FakeRunner::default()),
            "false",
            300,
        );

        let mut request = c_request();
        request.cpu_limit = 0;
        let err = service.judge(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        // Rejected submissions never occupy a slot or count as admitted.
        assert_eq!(service.metrics().snapshot().total_submissions, 0);
    }

    #[tokio::test]
    async fn test_compile_failure_is_ce_result_not_error() {
        let dir = tempfile::tempdir().unwrap();
        // `false` exits 1: every compile fails.
        let service = service_with(
            Arc::new(MemoryStore::new()),
            dir.path(),
            Arc::new(FakeRunner::default()),
            "false",
            300,
        );

        let result = service.judge(c_request()).await.unwrap();
        assert_eq!(result.final_status, Status::Ce);
        assert_eq!(result.score, 0);
        assert!(result.cases.is_empty());
        assert!(!result.compile.success);
        assert!(result.id > 0);

        let snap = service.metrics().snapshot();
        assert_eq!(snap.total_submissions, 1);
        assert_eq!(snap.success_submissions, 1);
        assert_eq!(snap.ce_count, 1);
        assert_eq!(snap.current_active, 0);
    }

    #[tokio::test]
    async fn test_pipeline_aggregates_mixed_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cases = vec![
            seed_case(&store, "0", "ok0"),
            seed_case(&store, "1", "ok1"),
            seed_case(&store, "2", "ok2"),
        ];
        let runner = FakeRunner {
            outputs: HashMap::from([
                ("0".into(), "ok0".into()),
                ("1".into(), "ok1".into()),
                ("2".into(), "nope".into()),
            ]),
            ..Default::default()
        };
        let cc = fake_cc(dir.path(), 0);
        let service = service_with(store, dir.path(), Arc::new(runner), &cc, 300);

        let result = service.judge(request_with_cases(cases)).await.unwrap();
        assert_eq!(result.final_status, Status::Wa);
        assert_eq!(result.score, 67);
        assert_eq!(result.cases.len(), 3);
        assert_eq!(result.cases[0].status, Status::Ac);
        assert_eq!(result.cases[1].status, Status::Ac);
        assert_eq!(result.cases[2].status, Status::Wa);
        assert_eq!(
            result.cases[2].error_msg.as_deref(),
            Some("output mismatch")
        );
        // Per-case results keep the supplied order and feed the totals.
        assert_eq!(result.total_time_used, Duration::from_millis(30));
        assert_eq!(result.peak_mem_used, 3 * 1024 * 1024);
        assert!(result.compile.success);
    }

    #[tokio::test]
    async fn test_case_panic_becomes_se_and_other_cases_still_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cases = vec![seed_case(&store, "0", "ok0"), seed_case(&store, "1", "ok1")];
        let runner = FakeRunner {
            outputs: HashMap::from([
                ("0".into(), "ok0".into()),
                ("1".into(), "ok1".into()),
            ]),
            panic_on: Some(0),
            ..Default::default()
        };
        let cc = fake_cc(dir.path(), 0);
        let service = service_with(store, dir.path(), Arc::new(runner), &cc, 300);

        let result = service.judge(request_with_cases(cases)).await.unwrap();
        assert_eq!(result.cases[0].status, Status::Se);
        assert_eq!(result.cases[1].status, Status::Ac);
        assert_eq!(result.final_status, Status::Se);
        assert_eq!(result.score, 50);
    }

    #[tokio::test]
    async fn test_cache_hit_on_second_submission() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cases = vec![seed_case(&store, "0", "ok0")];
        let runner = FakeRunner {
            outputs: HashMap::from([("0".into(), "ok0".into())]),
            ..Default::default()
        };
        let cc = fake_cc(dir.path(), 0);
        let service = service_with(store, dir.path(), Arc::new(runner), &cc, 300);

        let request = request_with_cases(cases);
        service.judge(request.clone()).await.unwrap();
        let misses = service.metrics().snapshot().cache_misses;
        assert_eq!(misses, 2);

        service.judge(request).await.unwrap();
        let snap = service.metrics().snapshot();
        assert_eq!(snap.cache_misses, misses);
        assert_eq!(snap.cache_hits, 2);
    }

    #[tokio::test]
    async fn test_interactive_skips_comparator() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cases = vec![seed_case(&store, "0", "expected text")];
        // The fake runner reports AC with unrelated stdout; in interactive
        // mode the judge program's verdict stands as-is.
        let runner = FakeRunner {
            outputs: HashMap::from([("0".into(), "something else".into())]),
            ..Default::default()
        };
        let cc = fake_cc(dir.path(), 0);
        let service = service_with(store, dir.path(), Arc::new(runner), &cc, 300);

        let mut request = request_with_cases(cases);
        request.judge_mode = Some(JudgeMode::Interactive);
        request.special_code_file = Some("int main(){return 0;}".into());
        request.special_code_file_name = Some("judge.c".into());

        let result = service.judge(request).await.unwrap();
        assert_eq!(result.final_status, Status::Ac);
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn test_special_mode_checker_accepts_and_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let runner_outputs = HashMap::from([("0".into(), "anything".into())]);

        // fake_cc(0) builds programs that exit 0; the checker accepts.
        let cc_ok = fake_cc(dir.path(), 0);
        let service = service_with(
            Arc::clone(&store),
            dir.path(),
            Arc::new(FakeRunner {
                outputs: runner_outputs.clone(),
                ..Default::default()
            }),
            &cc_ok,
            300,
        );
        let mut request = request_with_cases(vec![seed_case(&store, "0", "ref")]);
        request.is_special = true;
        request.special_code_file = Some("...checker...".into());
        request.special_code_file_name = Some("checker.c".into());
        let result = service.judge(request.clone()).await.unwrap();
        assert_eq!(result.final_status, Status::Ac);

        // fake_cc(1) builds programs that exit 1; the checker rejects.
        let cc_bad = fake_cc(dir.path(), 1);
        let service = service_with(
            store,
            dir.path(),
            Arc::new(FakeRunner {
                outputs: runner_outputs,
                ..Default::default()
            }),
            &cc_bad,
            300,
        );
        let result = service.judge(request).await.unwrap();
        assert_eq!(result.final_status, Status::Wa);
        assert_eq!(
            result.cases[0].error_msg.as_deref(),
            Some("checker rejected the output")
        );
    }

    #[tokio::test]
    async fn test_outer_deadline_yields_judge_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cases = vec![seed_case(&store, "0", "ok0")];
        let runner = FakeRunner {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let cc = fake_cc(dir.path(), 0);
        // One second overall deadline.
        let service = service_with(store, dir.path(), Arc::new(runner), &cc, 1);

        let err = service
            .judge(request_with_cases(cases))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::JudgeTimeout));

        let snap = service.metrics().snapshot();
        assert_eq!(snap.failed_submissions, 1);
        assert_eq!(snap.current_active, 0);
    }

    #[tokio::test]
    async fn test_scratch_dirs_are_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(
            Arc::new(MemoryStore::new()),
            dir.path(),
            Arc::new(FakeRunner::default()),
            "false",
            300,
        );

        service.judge(c_request()).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("judged-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_ids_are_distinct_across_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(
            Arc::new(MemoryStore::new()),
            dir.path(),
            Arc::new(FakeRunner::default()),
            "false",
            300,
        );

        let a = service.judge(c_request()).await.unwrap();
        let b = service.judge(c_request()).await.unwrap();
        assert!(b.id > a.id);
    }
}
