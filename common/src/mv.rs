use std::os::unix::fs::MetadataExt;

use anyhow::{Context, anyhow};
use async_recursion::async_recursion;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::preserve;
use crate::progress;

/// Number of directory entries read and dispatched at a time.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Mode used when creating a destination directory; the source's bits are applied once the walk
/// over its children ends, whether or not all of them moved.
const NEW_DIR_MODE: u32 = 0o700;

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("{path:?} does not exist")]
    NotFound { path: std::path::PathBuf },
    #[error("{path:?} is not a directory")]
    NotADirectory { path: std::path::PathBuf },
    #[error("cannot move {src:?} to {dst:?}: destination exists and has an incompatible type")]
    Conflict {
        src: std::path::PathBuf,
        dst: std::path::PathBuf,
    },
    #[error("cannot move {path:?}: unsupported file type {file_type:?}")]
    UnsupportedType {
        path: std::path::PathBuf,
        file_type: std::fs::FileType,
    },
    #[error("{source:#}")]
    Io {
        #[source]
        source: anyhow::Error,
    },
    /// Some children of `dir` could not be moved; their causes were logged as they happened.
    #[error("failed moving {failed} entries of {dir:?}")]
    Aggregate {
        dir: std::path::PathBuf,
        failed: usize,
    },
}

/// Error type for move operations that preserves the summary of what did move before failing.
///
/// # Logging Convention
/// The Display implementation shows the full error chain:
/// ```ignore
/// tracing::error!("move failed: {}", &error);   // ✅ Shows full chain
/// tracing::error!("move failed: {:#}", &error); // ✅ Shows full chain
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    #[source]
    pub kind: ErrorKind,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, summary: Summary) -> Self {
        Error { kind, summary }
    }

    #[must_use]
    pub fn io(source: anyhow::Error, summary: Summary) -> Self {
        Error::new(ErrorKind::Io { source }, summary)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Settings {
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_moved: u64,
    pub files_moved: usize,
    pub symlinks_moved: usize,
    pub files_unchanged: usize,
    pub directories_created: usize,
    pub directories_unchanged: usize,
    pub directories_removed: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            bytes_moved: self.bytes_moved + other.bytes_moved,
            files_moved: self.files_moved + other.files_moved,
            symlinks_moved: self.symlinks_moved + other.symlinks_moved,
            files_unchanged: self.files_unchanged + other.files_unchanged,
            directories_created: self.directories_created + other.directories_created,
            directories_unchanged: self.directories_unchanged + other.directories_unchanged,
            directories_removed: self.directories_removed + other.directories_removed,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes moved: {}\n\
            files moved: {}\n\
            symlinks moved: {}\n\
            files unchanged: {}\n\
            directories created: {}\n\
            directories unchanged: {}\n\
            directories removed: {}",
            bytesize::ByteSize(self.bytes_moved),
            self.files_moved,
            self.symlinks_moved,
            self.files_unchanged,
            self.directories_created,
            self.directories_unchanged,
            self.directories_removed,
        )
    }
}

/// A file handed to a worker. The worker fills in the outcome and hands the task back through its
/// join handle.
#[derive(Debug)]
struct MoveTask {
    src: std::path::PathBuf,
    dst_dir: std::path::PathBuf,
    summary: Summary,
    error: Option<Error>,
}

impl MoveTask {
    fn new(src: std::path::PathBuf, dst_dir: std::path::PathBuf) -> Self {
        Self {
            src,
            dst_dir,
            summary: Summary::default(),
            error: None,
        }
    }

    async fn run(
        mut self,
        prog_track: &'static progress::Progress,
        permit: throttle::Permit,
    ) -> Self {
        let result = mv_file(prog_track, &self.src, &self.dst_dir).await;
        permit.release();
        match result {
            Ok(summary) => self.summary = summary,
            Err(error) => {
                tracing::error!(
                    "move: {:?} -> {:?} failed with: {:#}",
                    &self.src,
                    &self.dst_dir,
                    &error
                );
                prog_track.failures.inc();
                self.error = Some(error);
            }
        }
        self
    }
}

fn is_same_file(md1: &std::fs::Metadata, md2: &std::fs::Metadata) -> bool {
    md1.dev() == md2.dev() && md1.ino() == md2.ino()
}

fn entry_name(path: &std::path::Path) -> Result<&std::ffi::OsStr, Error> {
    path.file_name().ok_or_else(|| {
        Error::io(
            anyhow!("{:?} does not have a base name", path),
            Default::default(),
        )
    })
}

/// Reads metadata of `path`, following symlinks only when `follow` is set, and requires a
/// directory.
async fn dir_metadata(path: &std::path::Path, follow: bool) -> Result<std::fs::Metadata, Error> {
    let result = if follow {
        tokio::fs::metadata(path).await
    } else {
        tokio::fs::symlink_metadata(path).await
    };
    let metadata = match result {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::new(
                ErrorKind::NotFound {
                    path: path.to_owned(),
                },
                Default::default(),
            ));
        }
        Err(error) => {
            return Err(Error::io(
                anyhow::Error::new(error)
                    .context(format!("failed reading metadata from {:?}", &path)),
                Default::default(),
            ));
        }
    };
    if !metadata.is_dir() {
        return Err(Error::new(
            ErrorKind::NotADirectory {
                path: path.to_owned(),
            },
            Default::default(),
        ));
    }
    Ok(metadata)
}

async fn read_batch(
    entries: &mut tokio::fs::ReadDir,
    batch_size: usize,
) -> std::io::Result<Vec<tokio::fs::DirEntry>> {
    let mut batch = Vec::with_capacity(batch_size);
    while batch.len() < batch_size {
        match entries.next_entry().await? {
            Some(entry) => batch.push(entry),
            None => break,
        }
    }
    Ok(batch)
}

#[instrument(skip(prog_track))]
async fn mv_symlink(
    prog_track: &'static progress::Progress,
    src: &std::path::Path,
    dst: &std::path::Path,
) -> Result<Summary, Error> {
    let link = tokio::fs::read_link(src)
        .await
        .with_context(|| format!("failed reading symlink {:?}", &src))
        .map_err(|err| Error::io(err, Default::default()))?;
    tokio::fs::symlink(&link, dst)
        .await
        .with_context(|| format!("failed creating symlink {:?} -> {:?}", &dst, &link))
        .map_err(|err| Error::io(err, Default::default()))?;
    tokio::fs::remove_file(src)
        .await
        .with_context(|| format!("failed removing symlink {:?}", &src))
        .map_err(|err| Error::io(err, Default::default()))?;
    prog_track.symlinks_moved.inc();
    Ok(Summary {
        symlinks_moved: 1,
        ..Default::default()
    })
}

async fn copy_contents(
    reader: &mut tokio::fs::File,
    writer: &mut tokio::fs::File,
    src: &std::path::Path,
    dst: &std::path::Path,
    src_metadata: &std::fs::Metadata,
) -> anyhow::Result<u64> {
    let bytes = tokio::io::copy(reader, writer)
        .await
        .with_context(|| format!("failed copying {:?} to {:?}", &src, &dst))?;
    writer
        .flush()
        .await
        .with_context(|| format!("failed writing {:?}", &dst))?;
    preserve::set_file_metadata(writer, dst, src_metadata).await?;
    Ok(bytes)
}

#[instrument(skip(prog_track, src_metadata))]
async fn mv_regular_file(
    prog_track: &'static progress::Progress,
    src: &std::path::Path,
    dst: &std::path::Path,
    src_metadata: &std::fs::Metadata,
) -> Result<Summary, Error> {
    tracing::debug!("opening 'src' for reading and 'dst' for writing");
    let mut reader = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("cannot open {:?} for reading", &src))
        .map_err(|err| Error::io(err, Default::default()))?;
    let mut writer = tokio::fs::File::create(dst)
        .await
        .with_context(|| format!("cannot open {:?} for writing", &dst))
        .map_err(|err| Error::io(err, Default::default()))?;
    let bytes = match copy_contents(&mut reader, &mut writer, src, dst, src_metadata).await {
        Ok(bytes) => bytes,
        Err(error) => {
            // the first error is the one reported, a failed close is only logged
            if let Err(close_error) = writer.shutdown().await {
                tracing::warn!("failed closing {:?}: {:#}", &dst, &close_error);
            }
            return Err(Error::io(error, Default::default()));
        }
    };
    writer
        .shutdown()
        .await
        .with_context(|| format!("failed closing {:?}", &dst))
        .map_err(|err| Error::io(err, Default::default()))?;
    drop(writer);
    drop(reader);
    // the copy stays in place if this fails, a duplicate is better than a lost file
    tokio::fs::remove_file(src)
        .await
        .with_context(|| format!("failed removing {:?} after copying it to {:?}", &src, &dst))
        .map_err(|err| Error::io(err, Default::default()))?;
    prog_track.files_moved.inc();
    prog_track.bytes_moved.add(bytes);
    Ok(Summary {
        bytes_moved: bytes,
        files_moved: 1,
        ..Default::default()
    })
}

/// Moves a regular file or a symlink into `dst_dir`, keeping its name.
///
/// Moving a file onto itself (same device and inode, e.g. a hard link already in place) succeeds
/// without touching either path. An existing regular file at the destination is overwritten, an
/// existing symlink is replaced only by a symlink.
#[instrument(skip(prog_track))]
pub async fn mv_file(
    prog_track: &'static progress::Progress,
    src: &std::path::Path,
    dst_dir: &std::path::Path,
) -> Result<Summary, Error> {
    let _ops_guard = prog_track.ops.guard();
    tracing::debug!("reading source metadata");
    let src_metadata = match tokio::fs::symlink_metadata(src).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::new(
                ErrorKind::NotFound {
                    path: src.to_owned(),
                },
                Default::default(),
            ));
        }
        Err(error) => {
            return Err(Error::io(
                anyhow::Error::new(error)
                    .context(format!("failed reading metadata from {:?}", &src)),
                Default::default(),
            ));
        }
    };
    let file_type = src_metadata.file_type();
    if !file_type.is_file() && !file_type.is_symlink() {
        return Err(Error::new(
            ErrorKind::UnsupportedType {
                path: src.to_owned(),
                file_type,
            },
            Default::default(),
        ));
    }
    let dst = dst_dir.join(entry_name(src)?);
    match tokio::fs::symlink_metadata(&dst).await {
        Ok(dst_metadata) => {
            if is_same_file(&src_metadata, &dst_metadata) {
                tracing::debug!("'src' and 'dst' are the same file, nothing to do");
                prog_track.files_unchanged.inc();
                return Ok(Summary {
                    files_unchanged: 1,
                    ..Default::default()
                });
            }
            if !dst_metadata.is_file() && !file_type.is_symlink() {
                return Err(Error::new(
                    ErrorKind::Conflict {
                        src: src.to_owned(),
                        dst,
                    },
                    Default::default(),
                ));
            }
            if file_type.is_symlink() && dst_metadata.is_symlink() {
                tracing::debug!("'dst' is a symlink, replacing it");
                tokio::fs::remove_file(&dst)
                    .await
                    .with_context(|| format!("failed removing existing symlink {:?}", &dst))
                    .map_err(|err| Error::io(err, Default::default()))?;
            }
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(Error::io(
                anyhow::Error::new(error)
                    .context(format!("failed reading metadata from {:?}", &dst)),
                Default::default(),
            ));
        }
    }
    let summary = if file_type.is_symlink() {
        mv_symlink(prog_track, src, &dst).await?
    } else {
        mv_regular_file(prog_track, src, &dst, &src_metadata).await?
    };
    tracing::info!("moved {:?} -> {:?}", src, &dst);
    Ok(summary)
}

/// Moves `src_dir` into `dst_parent`, i.e. to `dst_parent/<name of src_dir>`.
///
/// Entries are read `settings.batch_size` at a time. Subdirectories are moved by recursing inline;
/// files and symlinks are spawned as tasks once `limiter` admits them, and every task of a batch
/// is awaited before the next batch is read. Failures of individual entries are logged and
/// counted without stopping their siblings. `src_dir` is removed only when every entry moved.
#[instrument(skip(prog_track, limiter))]
#[async_recursion]
pub async fn mv_dir(
    prog_track: &'static progress::Progress,
    limiter: &std::sync::Arc<throttle::Limiter>,
    src_dir: &std::path::Path,
    dst_parent: &std::path::Path,
    settings: &Settings,
) -> Result<Summary, Error> {
    let _ops_guard = prog_track.ops.guard();
    tracing::debug!("checking 'src' and 'dst' directories");
    let src_metadata = dir_metadata(src_dir, false).await?;
    dir_metadata(dst_parent, true).await?;
    let dst_dir = dst_parent.join(entry_name(src_dir)?);
    let (mut summary, is_fresh) = match tokio::fs::metadata(&dst_dir).await {
        Ok(dst_metadata) => {
            if !dst_metadata.is_dir() {
                return Err(Error::new(
                    ErrorKind::Conflict {
                        src: src_dir.to_owned(),
                        dst: dst_dir,
                    },
                    Default::default(),
                ));
            }
            prog_track.directories_unchanged.inc();
            let summary = Summary {
                directories_unchanged: 1,
                ..Default::default()
            };
            if is_same_file(&src_metadata, &dst_metadata) {
                tracing::debug!("'src' and 'dst' are the same directory, nothing to do");
                return Ok(summary);
            }
            tracing::debug!("'dst' is an existing directory, moving into it");
            (summary, false)
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::DirBuilder::new()
                .mode(NEW_DIR_MODE)
                .create(&dst_dir)
                .await
                .with_context(|| format!("cannot create directory {:?}", &dst_dir))
                .map_err(|err| Error::io(err, Default::default()))?;
            dir_metadata(&dst_dir, true).await?;
            prog_track.directories_created.inc();
            (
                Summary {
                    directories_created: 1,
                    ..Default::default()
                },
                true,
            )
        }
        Err(error) => {
            return Err(Error::io(
                anyhow::Error::new(error)
                    .context(format!("failed reading metadata from {:?}", &dst_dir)),
                Default::default(),
            ));
        }
    };
    let mut entries = tokio::fs::read_dir(src_dir)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", &src_dir))
        .map_err(|err| Error::io(err, summary))?;
    let mut failed = 0;
    loop {
        // the previous batch is fully drained here, so bailing out leaves no task behind
        let batch = read_batch(&mut entries, settings.batch_size)
            .await
            .with_context(|| format!("failed traversing directory {:?}", &src_dir))
            .map_err(|err| Error::io(err, summary))?;
        if batch.is_empty() {
            break;
        }
        tracing::debug!("processing batch of {} entries", batch.len());
        let mut join_set = tokio::task::JoinSet::new();
        for entry in batch {
            let entry_path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(error) => {
                    tracing::error!(
                        "move: failed reading file type of {:?}: {:#}",
                        &entry_path,
                        &error
                    );
                    prog_track.failures.inc();
                    failed += 1;
                    continue;
                }
            };
            if file_type.is_dir() {
                match mv_dir(prog_track, limiter, &entry_path, &dst_dir, settings).await {
                    Ok(dir_summary) => summary = summary + dir_summary,
                    Err(error) => {
                        tracing::error!(
                            "move: {:?} -> {:?} failed with: {:#}",
                            &entry_path,
                            &dst_dir,
                            &error
                        );
                        summary = summary + error.summary;
                        failed += 1;
                    }
                }
                continue;
            }
            // waiting here backpressures the walk instead of queuing unbounded moves
            let permit = limiter.acquire().await;
            let task = MoveTask::new(entry_path, dst_dir.clone());
            join_set.spawn(task.run(prog_track, permit));
        }
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(task) => match task.error {
                    None => summary = summary + task.summary,
                    Some(error) => {
                        summary = summary + error.summary;
                        failed += 1;
                    }
                },
                Err(error) => {
                    tracing::error!("move: task in {:?} did not complete: {}", &src_dir, &error);
                    prog_track.failures.inc();
                    failed += 1;
                }
            }
        }
    }
    drop(entries);
    if is_fresh {
        tracing::debug!("set 'dst' directory metadata");
        let metadata_res = preserve::set_dir_metadata(&dst_dir, &src_metadata).await;
        if failed == 0 {
            metadata_res.map_err(|err| Error::io(err, summary))?;
        } else if let Err(error) = metadata_res {
            // the failed children are the error reported for this directory
            tracing::warn!("failed setting metadata on {:?}: {:#}", &dst_dir, &error);
        }
    }
    if failed > 0 {
        return Err(Error::new(
            ErrorKind::Aggregate {
                dir: src_dir.to_owned(),
                failed,
            },
            summary,
        ));
    }
    tokio::fs::remove_dir(src_dir)
        .await
        .with_context(|| format!("failed removing directory {:?}", &src_dir))
        .map_err(|err| Error::io(err, summary))?;
    prog_track.directories_removed.inc();
    summary.directories_removed += 1;
    tracing::info!("moved directory {:?} -> {:?}", src_dir, &dst_dir);
    Ok(summary)
}
