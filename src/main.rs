//! Engine entry point.
//!
//! Wires the services from configuration and judges each submission
//! request file given on the command line, printing one `JudgeResult`
//! JSON document per line. The HTTP boundary, when deployed, hands
//! validated requests to the same `JudgeService`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info};

use judged::cache::ArtifactCache;
use judged::config::AppConfig;
use judged::gate::AdmissionGate;
use judged::judge::JudgeService;
use judged::metrics::JudgeMetrics;
use judged::sandbox::{BoxPool, SandboxRunner};
use judged::snowflake::IdGenerator;
use judged::storage::S3ArtifactStore;
use judged::submission::SubmissionRequest;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("judged=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let (config_path, request_files) = parse_args()?;
    let config_path = config_path.or_else(|| std::env::var("JUDGE_CONFIG").ok().map(PathBuf::from));
    let config = Arc::new(AppConfig::load(config_path.as_deref())?);
    info!(
        max_concurrent = config.judge.max_concurrent,
        temp_dir = %config.judge.temp_dir,
        "configuration loaded"
    );

    let metrics = Arc::new(JudgeMetrics::new());
    let gate = AdmissionGate::new(config.judge.max_concurrent, Arc::clone(&metrics));

    let store = Arc::new(S3ArtifactStore::from_env().await?);
    let cache = Arc::new(ArtifactCache::new(
        config.cache.dir(),
        config.cache.ttl(),
        config.cache.clean_frequency(),
        config.cache.max_disk_usage,
        store,
        Arc::clone(&metrics),
    )?);
    let reaper = cache.spawn_reaper();

    let runner = Arc::new(SandboxRunner::new(
        config.sandbox.isolate_path.clone(),
        BoxPool::new(config.sandbox.box_pool_size),
        config.judge.max_output_size,
    ));
    runner.check_available().await?;
    info!(isolate = %config.sandbox.isolate_path, "sandbox available");

    let ids = IdGenerator::new(config.snowflake.machine_id, config.snowflake.epoch())?;

    let service = JudgeService::new(
        Arc::clone(&config),
        Arc::clone(&metrics),
        gate,
        cache,
        ids,
        runner,
    );

    if request_files.is_empty() {
        bail!("usage: judged [--config FILE] REQUEST.json [REQUEST.json ...]");
    }

    let mut failed = false;
    for file in &request_files {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("reading request file {}", file.display()))?;
        let request: SubmissionRequest = serde_json::from_str(&text)
            .with_context(|| format!("parsing request file {}", file.display()))?;

        match service.judge(request).await {
            Ok(result) => {
                println!("{}", serde_json::to_string(&result)?);
            }
            Err(e) => {
                error!(file = %file.display(), code = e.code(), error = %e, "judging failed");
                failed = true;
            }
        }
    }

    info!(
        snapshot = %serde_json::to_string(&metrics.snapshot())?,
        "engine metrics"
    );
    reaper.abort();

    if failed {
        bail!("one or more submissions failed");
    }
    Ok(())
}

fn parse_args() -> Result<(Option<PathBuf>, Vec<PathBuf>)> {
    let mut config = None;
    let mut files = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config requires a path")?;
                config = Some(PathBuf::from(value));
            }
            _ => files.push(PathBuf::from(arg)),
        }
    }
    Ok((config, files))
}
