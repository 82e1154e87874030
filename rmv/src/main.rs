use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use tracing::instrument;

/// Bad arguments, or a source/destination that cannot be moved from/to
const USAGE_ERROR: i32 = 1;
/// The move ran but some entries could not be moved
const MOVE_ERROR: i32 = 2;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rmv",
    version,
    about = "Move a directory tree into another directory",
    long_about = "`rmv` moves a directory tree into a destination parent directory, copying files with a bounded
number of concurrent copies and removing each source directory once everything in it has moved.

The move is best-effort: entries that cannot be moved are reported and left in place, together
with the directories containing them.

EXIT CODES:
    0 - Everything was moved
    1 - Invalid arguments, or the source/destination cannot be used
    2 - Some entries could not be moved

EXAMPLE:
    # Move /data/incoming/batch-42 to /archive/batch-42
    rmv --from /data/incoming/batch-42 --to /archive --progress --summary"
)]
struct Args {
    /// The source directory to move
    ///
    /// A symlink to a directory is followed: the directory it points to is moved, keeping its own
    /// name, and the symlink is left in place.
    #[arg(short = 'f', long, value_name = "SRC")]
    from: std::path::PathBuf,

    /// The destination parent directory for the directory being moved
    ///
    /// Created (with the permission bits of the source directory) if it does not exist.
    #[arg(short = 't', long, value_name = "DEST_PARENT")]
    to: std::path::PathBuf,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Toggles the type of progress to show
    ///
    /// If specified, --progress flag is implied.
    ///
    /// Options are: `ProgressBar` (animated progress bar), `TextUpdates` (appropriate for logging), Auto (default, will
    /// choose between `ProgressBar` or `TextUpdates` depending on the type of terminal attached to stderr)
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=ProgressBar), the default is 200ms.
    /// - For the non-interactive (--progress-type=TextUpdates), the default is 10s.
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Maximum number of file moves running at the same time across the whole tree
    #[arg(
        long,
        default_value_t = throttle::DEFAULT_CAPACITY,
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    max_concurrent_moves: usize,

    /// Number of directory entries read and dispatched at a time
    ///
    /// All file moves of a batch complete before the next batch of the same directory is read.
    #[arg(
        long,
        default_value_t = common::mv::DEFAULT_BATCH_SIZE,
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    batch_size: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

/// Nearest ancestor of `path`, `path` included, that exists.
fn existing_ancestor(path: &std::path::Path) -> Option<&std::path::Path> {
    path.ancestors()
        .map(|ancestor| {
            if ancestor.as_os_str().is_empty() {
                std::path::Path::new(".")
            } else {
                ancestor
            }
        })
        .find(|ancestor| std::fs::symlink_metadata(ancestor).is_ok())
}

fn check_not_nested(args: &Args, src: &std::path::Path, dst: &std::path::Path) -> Result<()> {
    let dst =
        std::fs::canonicalize(dst).with_context(|| format!("failed resolving {:?}", dst))?;
    if dst.starts_with(src) {
        return Err(anyhow!(
            "cannot move {:?} into itself ({:?})",
            &args.from,
            &args.to
        ));
    }
    Ok(())
}

/// Checks the source and prepares the destination parent before anything is moved.
///
/// Returns the directory to move: `--from` itself, or the directory it points to when it is a
/// symlink.
fn preflight(args: &Args) -> Result<std::path::PathBuf> {
    if args.from.file_name().is_none() {
        return Err(anyhow!(
            "source {:?} does not have a base name, please use an absolute path instead",
            &args.from
        ));
    }
    let src_metadata = std::fs::metadata(&args.from).with_context(|| {
        format!(
            "couldn't get info on the source directory to move: {:?}",
            &args.from
        )
    })?;
    if !src_metadata.is_dir() {
        return Err(anyhow!("source is not a directory: {:?}", &args.from));
    }
    let resolved_src = std::fs::canonicalize(&args.from)
        .with_context(|| format!("failed resolving {:?}", &args.from))?;
    let src = if std::fs::symlink_metadata(&args.from)
        .with_context(|| format!("failed reading metadata from {:?}", &args.from))?
        .is_symlink()
    {
        resolved_src.clone()
    } else {
        args.from.clone()
    };
    // checked before creating anything, a missing destination must not appear inside the source
    if let Some(ancestor) = existing_ancestor(&args.to) {
        check_not_nested(args, &resolved_src, ancestor)?;
    }
    match std::fs::metadata(&args.to) {
        Ok(dst_metadata) => {
            if !dst_metadata.is_dir() {
                return Err(anyhow!("destination is not a directory: {:?}", &args.to));
            }
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(src_metadata.permissions().mode() & common::preserve::PERMISSION_BITS)
                .create(&args.to)
                .with_context(|| {
                    format!(
                        "couldn't create the destination parent directory to move to: {:?}",
                        &args.to
                    )
                })?;
        }
        Err(error) => {
            return Err(anyhow::Error::new(error).context(format!(
                "couldn't get info on the destination parent directory to move to: {:?}",
                &args.to
            )));
        }
    }
    check_not_nested(args, &resolved_src, &args.to)?;
    Ok(src)
}

#[instrument]
async fn async_main(args: Args) -> Result<common::MoveSummary> {
    let limiter = std::sync::Arc::new(throttle::Limiter::new(args.max_concurrent_moves));
    let settings = common::MoveSettings {
        batch_size: args.batch_size,
    };
    let res = common::mv_dir(&limiter, &args.from, &args.to, &settings).await;
    tracing::debug!(
        "peak concurrent moves: {} (limit: {})",
        limiter.peak(),
        limiter.capacity()
    );
    match res {
        Ok(summary) => Ok(summary),
        Err(error) => {
            if args.summary {
                return Err(anyhow!(
                    "there were errors moving {:?} to {:?}: {}\n\n{}",
                    &args.from,
                    &args.to,
                    &error,
                    &error.summary
                ));
            }
            Err(anyhow!(
                "there were errors moving {:?} to {:?}: {}",
                &args.from,
                &args.to,
                &error
            ))
        }
    }
}

fn main() -> Result<()> {
    let mut args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            let _ = error.print();
            std::process::exit(if error.use_stderr() { USAGE_ERROR } else { 0 });
        }
    };
    let throttle = common::ThrottleConfig {
        max_concurrent_moves: args.max_concurrent_moves,
        batch_size: args.batch_size,
    };
    if let Err(error) = throttle.validate() {
        eprintln!("rmv: {error}");
        std::process::exit(USAGE_ERROR);
    }
    match preflight(&args) {
        Ok(src) => args.from = src,
        Err(error) => {
            eprintln!("rmv: {error:#}");
            std::process::exit(USAGE_ERROR);
        }
    }
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(
        if args.progress || args.progress_type.is_some() || args.progress_delay.is_some() {
            Some(common::ProgressSettings {
                progress_type: args.progress_type.unwrap_or_default(),
                progress_delay: args.progress_delay,
            })
        } else {
            None
        },
        output,
        runtime,
        func,
    );
    if res.is_none() {
        std::process::exit(MOVE_ERROR);
    }
    Ok(())
}
