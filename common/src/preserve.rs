use anyhow::{Context, Result};
use std::os::unix::prelude::PermissionsExt;
use tracing::instrument;

/// Only the rwx bits are carried over; setuid, setgid and sticky are dropped like `mv` across
/// filesystems does.
pub const PERMISSION_BITS: u32 = 0o777;

fn permissions_of(metadata: &std::fs::Metadata) -> std::fs::Permissions {
    std::fs::Permissions::from_mode(metadata.permissions().mode() & PERMISSION_BITS)
}

/// Copies access and modification times from `metadata` onto `path` without following symlinks.
#[instrument(skip(metadata))]
pub async fn set_times(path: &std::path::Path, metadata: &std::fs::Metadata) -> Result<()> {
    let dst = path.to_owned();
    let atime = filetime::FileTime::from_last_access_time(metadata);
    let mtime = filetime::FileTime::from_last_modification_time(metadata);
    tokio::task::spawn_blocking(move || -> Result<()> {
        filetime::set_symlink_file_times(&dst, atime, mtime)
            .with_context(|| format!("failed setting timestamps for {:?}", &dst))
    })
    .await?
}

/// Sets permission bits through the already open `file`, then the timestamps of `path`.
pub async fn set_file_metadata(
    file: &tokio::fs::File,
    path: &std::path::Path,
    metadata: &std::fs::Metadata,
) -> Result<()> {
    let permissions = permissions_of(metadata);
    file.set_permissions(permissions.clone())
        .await
        .with_context(|| format!("cannot set {:?} permissions to {:?}", &path, &permissions))?;
    set_times(path, metadata).await
}

pub async fn set_dir_metadata(path: &std::path::Path, metadata: &std::fs::Metadata) -> Result<()> {
    let permissions = permissions_of(metadata);
    tokio::fs::set_permissions(path, permissions.clone())
        .await
        .with_context(|| format!("cannot set {:?} permissions to {:?}", &path, &permissions))?;
    set_times(path, metadata).await
}
