//! Common utilities and the move engine shared by the `rmv` tool
//!
//! # Core Modules
//!
//! - [`mv`] - Recursive directory move with a bounded number of concurrent file moves
//! - [`preserve`] - Copying permission bits and timestamps onto moved entries
//! - [`progress`] - Progress counters and the progress printer
//! - [`config`] - Runtime, throttling, output and progress configuration
//!
//! # Move Semantics
//!
//! [`mv_dir`] moves `src` to `dst_parent/<name of src>`:
//!
//! - regular files are copied (content, permission bits, timestamps) and then removed from `src`
//! - symlinks are recreated with the same target and then removed from `src`
//! - directories are created at the destination (or merged into, if they already exist) and
//!   removed from `src` only after everything inside them moved
//!
//! The move is best-effort: an entry that fails is left where it was, its siblings keep moving and
//! the directories containing it are kept. The returned [`mv::Error`] names the directory that
//! could not be fully moved and carries a summary of everything that did move.
//!
//! # Concurrency
//!
//! File moves are spawned as tokio tasks gated by a shared [`throttle::Limiter`]. Directory
//! recursion happens inline on the calling task, and each directory is read in batches whose file
//! moves are all awaited before the next batch is read.
//!
//! # Logging
//!
//! [`run`] configures `tracing` from the verbosity level: ERROR by default, `-v` INFO, `-vv` DEBUG
//! and `-vvv` TRACE. Per-entry failures are logged at ERROR as they happen, successful moves at
//! INFO. Logs go to stdout, progress goes to stderr.

pub mod config;
pub mod mv;
pub mod preserve;
pub mod progress;
mod testutils;

pub use config::{OutputConfig, ProgressSettings, ProgressType, RuntimeConfig, ThrottleConfig};
pub use mv::{
    Error as MoveError, ErrorKind as MoveErrorKind, Settings as MoveSettings,
    Summary as MoveSummary,
};

static PROGRESS: std::sync::LazyLock<progress::Progress> =
    std::sync::LazyLock::new(progress::Progress::new);

/// Moves `src` into `dst_parent` using the process-wide progress counters.
pub async fn mv_dir(
    limiter: &std::sync::Arc<throttle::Limiter>,
    src: &std::path::Path,
    dst_parent: &std::path::Path,
    settings: &mv::Settings,
) -> Result<mv::Summary, mv::Error> {
    mv::mv_dir(&PROGRESS, limiter, src, dst_parent, settings).await
}

fn log_level(output: &OutputConfig) -> &'static str {
    if output.quiet {
        return "off";
    }
    match output.verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::new(log_level(output));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .finish();
    // a subscriber installed by the embedding process wins, logging is best-effort
    let _ = tracing::subscriber::set_global_default(subscriber);
}

struct ProgressTracker {
    done: std::sync::Arc<(std::sync::Mutex<bool>, std::sync::Condvar)>,
    handle: std::thread::JoinHandle<()>,
}

impl ProgressTracker {
    fn start(
        progress: &'static progress::Progress,
        settings: &ProgressSettings,
    ) -> anyhow::Result<Self> {
        let delay = settings.delay()?;
        let progress_type = settings.resolved_type();
        let done = std::sync::Arc::new((std::sync::Mutex::new(false), std::sync::Condvar::new()));
        let handle = {
            let done = done.clone();
            std::thread::spawn(move || {
                let mut printer = progress::ProgressPrinter::new(progress);
                let pbar = if progress_type == ProgressType::ProgressBar {
                    Some(indicatif::ProgressBar::new_spinner())
                } else {
                    None
                };
                let (lock, cvar) = &*done;
                let mut is_done = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                while !*is_done {
                    match &pbar {
                        Some(pbar) => {
                            pbar.set_message(printer.print());
                            pbar.tick();
                        }
                        None => eprintln!("{}", printer.print()),
                    }
                    is_done = cvar
                        .wait_timeout(is_done, delay)
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .0;
                }
                if let Some(pbar) = pbar {
                    pbar.finish_and_clear();
                }
            })
        };
        Ok(Self { done, handle })
    }

    fn stop(self) {
        let (lock, cvar) = &*self.done;
        *lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = true;
        cvar.notify_one();
        if self.handle.join().is_err() {
            tracing::warn!("progress printer thread panicked");
        }
    }
}

/// Runs `func` on a freshly built tokio runtime with logging and optional progress reporting.
///
/// Returns the summary on success. On failure the error is logged and `None` is returned, the
/// caller maps that to a non-zero exit code.
pub fn run<Fut, Summary, Error>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    init_tracing(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            tracing::error!("failed to create the tokio runtime: {:#}", &error);
            return None;
        }
    };
    let tracker = match progress {
        Some(settings) => match ProgressTracker::start(&PROGRESS, &settings) {
            Ok(tracker) => Some(tracker),
            Err(error) => {
                tracing::error!("{:#}", &error);
                return None;
            }
        },
        None => None,
    };
    let res = tokio_runtime.block_on(func());
    if let Some(tracker) = tracker {
        tracker.stop();
    }
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", &error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        let output = |quiet, verbose| OutputConfig {
            quiet,
            verbose,
            print_summary: false,
        };
        assert_eq!(log_level(&output(false, 0)), "error");
        assert_eq!(log_level(&output(false, 1)), "info");
        assert_eq!(log_level(&output(false, 2)), "debug");
        assert_eq!(log_level(&output(false, 7)), "trace");
        assert_eq!(log_level(&output(true, 3)), "off");
    }
}
