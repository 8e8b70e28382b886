//! Per-language source-to-artifact compilation with a bounded wall clock.
//!
//! Compilation runs on the host (the sandbox only sees finished
//! artifacts). A compiler that exits non-zero is a user-facing diagnostic,
//! not an engine error; a missing compiler binary or a blown time cap is.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::comparator::truncate;
use crate::config::CompilerPaths;
use crate::error::{Error, Result};
use crate::languages::Language;

/// Upper bound on diagnostics carried back to the submitter.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub enum CompileOutcome {
    /// A runnable artifact exists at the requested output path (or the
    /// syntax check passed for interpreted languages).
    Success,
    /// The compiler exited non-zero; diagnostics are data for the caller.
    Failure { diagnostics: String },
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileOutcome::Success)
    }
}

/// Compile `source_path` for `language`, producing `output_path` for
/// compiled languages. `output_path` names the executable for C/C++/Go
/// and the class output directory for Java; Python only gets a syntax
/// check.
pub async fn compile(
    language: Language,
    source_path: &Path,
    output_path: &Path,
    paths: &CompilerPaths,
    timeout: Duration,
) -> Result<CompileOutcome> {
    let source = source_path.to_string_lossy().to_string();
    let output = output_path.to_string_lossy().to_string();

    let (program, args): (&str, Vec<String>) = match language {
        Language::C => (
            &paths.cc,
            vec![
                "-O2".into(),
                "-Wall".into(),
                "-static".into(),
                "-std=c11".into(),
                "-o".into(),
                output,
                source,
            ],
        ),
        Language::Cpp => (
            &paths.cxx,
            vec![
                "-O2".into(),
                "-Wall".into(),
                "-std=c++17".into(),
                "-o".into(),
                output,
                source,
            ],
        ),
        Language::Java => (&paths.javac, vec!["-d".into(), output, source]),
        Language::Python => (&paths.python, vec!["-m".into(), "py_compile".into(), source]),
        Language::Go => (
            &paths.go,
            vec!["build".into(), "-o".into(), output, source],
        ),
    };

    debug!(language = language.as_str(), program, "compiling source");

    let mut command = Command::new(program);
    command
        .args(&args)
        .current_dir(source_path.parent().unwrap_or_else(|| Path::new(".")))
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CompilerUnavailable(program.to_string())
        } else {
            Error::Io(e)
        }
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            // kill_on_drop reaps the compiler when the timed-out future is
            // dropped.
            warn!(
                language = language.as_str(),
                timeout_secs = timeout.as_secs(),
                "compiler exceeded wall clock cap"
            );
            return Err(Error::CompileTimeout(timeout.as_secs()));
        }
    };

    if output.status.success() {
        return Ok(CompileOutcome::Success);
    }

    let mut diagnostics = String::from_utf8_lossy(&output.stderr).to_string();
    if diagnostics.trim().is_empty() {
        diagnostics = String::from_utf8_lossy(&output.stdout).to_string();
    }
    if diagnostics.trim().is_empty() {
        diagnostics = format!(
            "compiler exited with status {}",
            output.status.code().unwrap_or(-1)
        );
    }

    Ok(CompileOutcome::Failure {
        diagnostics: truncate(&diagnostics, MAX_DIAGNOSTIC_BYTES),
    })
}
