//! Parser for the sandbox meta file.
//!
//! The sandbox reports resource usage and exit condition as one
//! `key:value` pair per line. Recognized keys: `time` (CPU seconds as a
//! decimal), `cg-mem` (peak memory in KB), `exitcode`, `exitsig`,
//! `killed`, `cg-oom-killed`, and `status` with values `TO`, `SG`, `XX`,
//! `RE`. Unknown keys are ignored.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaStatus {
    /// `TO`: wall or CPU time ran out.
    Timeout,
    /// `SG`: the program died on a signal.
    Signalled,
    /// `RE`: non-zero exit.
    RuntimeError,
    /// `XX`: the sandbox itself failed.
    Internal,
}

#[derive(Debug, Clone, Default)]
pub struct ExecMeta {
    pub cpu_time: Duration,
    pub memory_kb: u64,
    pub exit_code: i32,
    pub exit_sig: Option<i32>,
    pub killed: bool,
    pub oom_killed: bool,
    pub status: Option<MetaStatus>,
}

impl ExecMeta {
    pub fn parse(content: &str) -> Self {
        let mut meta = ExecMeta::default();

        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "time" => {
                    if let Ok(secs) = value.parse::<f64>() {
                        meta.cpu_time = Duration::from_secs_f64(secs.max(0.0));
                    }
                }
                "cg-mem" => {
                    if let Ok(kb) = value.parse::<u64>() {
                        meta.memory_kb = kb;
                    }
                }
                "exitcode" => {
                    meta.exit_code = value.parse().unwrap_or(0);
                }
                "exitsig" => {
                    if let Ok(sig) = value.parse::<i32>() {
                        meta.exit_sig = Some(sig);
                    }
                }
                "killed" => {
                    meta.killed = true;
                }
                "cg-oom-killed" => {
                    meta.oom_killed = true;
                }
                "status" => {
                    meta.status = match value {
                        "TO" => Some(MetaStatus::Timeout),
                        "SG" => Some(MetaStatus::Signalled),
                        "RE" => Some(MetaStatus::RuntimeError),
                        "XX" => Some(MetaStatus::Internal),
                        _ => None,
                    };
                }
                _ => {}
            }
        }

        meta
    }
}
