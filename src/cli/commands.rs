//! CLI command implementations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::flush::{FlushResult, LogVerifier, LogWriter};
use crate::observability::{LogSeverity, Logger};
use crate::sync::SyncMetricsSnapshot;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Stress driver configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    /// Data directory for the commit log
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Number of committer threads
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Commits issued by each thread
    #[serde(default = "default_commits_per_thread")]
    pub commits_per_thread: usize,

    /// Smallest payload size in bytes
    #[serde(default = "default_payload_min")]
    pub payload_min_bytes: usize,

    /// Largest payload size in bytes
    #[serde(default = "default_payload_max")]
    pub payload_max_bytes: usize,

    /// Percentage of commits using the asynchronous callback path
    #[serde(default = "default_async_ratio")]
    pub async_ratio_percent: u32,
}

fn default_data_dir() -> String {
    "./aerosync-data".to_string()
}
fn default_threads() -> usize {
    8
}
fn default_commits_per_thread() -> usize {
    1000
}
fn default_payload_min() -> usize {
    64
}
fn default_payload_max() -> usize {
    512
}
fn default_async_ratio() -> u32 {
    25
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            threads: default_threads(),
            commits_per_thread: default_commits_per_thread(),
            payload_min_bytes: default_payload_min(),
            payload_max_bytes: default_payload_max(),
            async_ratio_percent: default_async_ratio(),
        }
    }
}

impl StressConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("Failed to read config: {}", e)))?;
        let config: StressConfig = serde_json::from_str(&content)
            .map_err(|e| CliError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> CliResult<()> {
        if self.threads == 0 {
            return Err(CliError::Config("threads must be at least 1".to_string()));
        }
        if self.commits_per_thread == 0 {
            return Err(CliError::Config(
                "commits_per_thread must be at least 1".to_string(),
            ));
        }
        if self.payload_min_bytes > self.payload_max_bytes {
            return Err(CliError::Config(format!(
                "payload_min_bytes ({}) exceeds payload_max_bytes ({})",
                self.payload_min_bytes, self.payload_max_bytes
            )));
        }
        if self.async_ratio_percent > 100 {
            return Err(CliError::Config(format!(
                "async_ratio_percent ({}) must be 0..=100",
                self.async_ratio_percent
            )));
        }
        Ok(())
    }
}

/// Final stress report.
#[derive(Debug, Serialize)]
pub struct StressReport {
    pub threads: usize,
    pub commits: u64,
    pub async_commits: u64,
    pub async_acks: u64,
    pub records_on_disk: u64,
    pub bytes_on_disk: u64,
    pub elapsed_ms: u64,
    /// Physical fsync passes; the gap to `commits` is the grouping win
    pub flush_passes: u64,
    pub lock: SyncMetricsSnapshot,
}

/// Parses arguments and dispatches. Entry point called from main.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Dispatches a parsed command.
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Stress {
            config,
            json,
            verbose,
        } => {
            if verbose {
                Logger::set_min_severity(LogSeverity::Trace);
            }
            let config = match config {
                Some(path) => StressConfig::load(&path)?,
                None => StressConfig::default(),
            };
            stress(&config, json)
        }
        Command::Verify { data_dir } => verify(&data_dir),
    }
}

/// Runs concurrent committers against one log writer and reports how the
/// lock grouped their flushes.
pub fn stress(config: &StressConfig, json: bool) -> CliResult<()> {
    config.validate()?;

    Logger::info(
        "STRESS_START",
        &[
            ("commits_per_thread", &config.commits_per_thread.to_string()),
            ("data_dir", &config.data_dir),
            ("threads", &config.threads.to_string()),
        ],
    );

    let writer = Arc::new(LogWriter::open(&PathBuf::from(&config.data_dir))?);
    let async_commits = Arc::new(AtomicU64::new(0));
    let async_acks = Arc::new(AtomicU64::new(0));

    let start = Instant::now();
    let mut workers = Vec::with_capacity(config.threads);
    for _ in 0..config.threads {
        let writer = Arc::clone(&writer);
        let async_commits = Arc::clone(&async_commits);
        let async_acks = Arc::clone(&async_acks);
        let config = config.clone();

        workers.push(thread::spawn(move || -> FlushResult<()> {
            let mut rng = rand::thread_rng();
            for _ in 0..config.commits_per_thread {
                let size = rng.gen_range(config.payload_min_bytes..=config.payload_max_bytes);
                let mut payload = vec![0u8; size];
                rng.fill(payload.as_mut_slice());

                let lsn = writer.reserve(&payload);
                if rng.gen_ratio(config.async_ratio_percent, 100) {
                    async_commits.fetch_add(1, Ordering::Relaxed);
                    let acks = Arc::clone(&async_acks);
                    writer.commit_async(
                        lsn,
                        Box::new(move || {
                            acks.fetch_add(1, Ordering::Relaxed);
                        }),
                    )?;
                } else {
                    writer.sync_to(lsn)?;
                }
            }
            Ok(())
        }));
    }

    for worker in workers {
        worker.join().map_err(|_| CliError::WorkerPanicked)??;
    }

    // Drain: everything reserved becomes durable, firing any callbacks that
    // were still queued when their registering thread finished.
    writer.sync_to(writer.reserved_lsn())?;
    let elapsed = start.elapsed();

    let scan = LogVerifier::scan(writer.path())?;
    let snapshot = writer.commit_lock().metrics().snapshot();
    let report = StressReport {
        threads: config.threads,
        commits: (config.threads * config.commits_per_thread) as u64,
        async_commits: async_commits.load(Ordering::Relaxed),
        async_acks: async_acks.load(Ordering::Relaxed),
        records_on_disk: scan.records,
        bytes_on_disk: scan.bytes,
        elapsed_ms: elapsed.as_millis() as u64,
        flush_passes: snapshot.releases,
        lock: snapshot,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|e| CliError::Config(format!("Failed to serialize report: {}", e)))?
        );
    } else {
        Logger::info(
            "STRESS_COMPLETE",
            &[
                ("async_acks", &report.async_acks.to_string()),
                ("commits", &report.commits.to_string()),
                ("elapsed_ms", &report.elapsed_ms.to_string()),
                ("flush_passes", &report.flush_passes.to_string()),
                ("records_on_disk", &report.records_on_disk.to_string()),
            ],
        );
    }
    Ok(())
}

/// Verifies the commit log under `data_dir`.
pub fn verify(data_dir: &Path) -> CliResult<()> {
    let log_path = data_dir.join("log").join("commit.log");
    let scan = LogVerifier::scan(&log_path)?;
    Logger::info(
        "VERIFY_COMPLETE",
        &[
            ("bytes", &scan.bytes.to_string()),
            ("path", &log_path.display().to_string()),
            ("records", &scan.records.to_string()),
        ],
    );
    Ok(())
}
