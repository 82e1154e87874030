#[cfg(test)]
async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("rmv_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

#[cfg(test)]
pub async fn setup_empty_dir() -> anyhow::Result<std::path::PathBuf> {
    create_temp_dir().await
}

#[cfg(test)]
pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    // create a temporary directory
    let tmp_dir = create_temp_dir().await?;
    // foo
    // |- 0.txt
    // |- bar
    //    |- 1.txt
    //    |- 2.txt
    //    |- 3.txt
    // |- baz
    //    |- 4.txt
    //    |- 5.txt -> ../bar/2.txt
    //    |- 6.txt -> (absolute path) .../foo/bar/3.txt
    // dst
    let foo_path = tmp_dir.join("foo");
    tokio::fs::create_dir(&foo_path).await.unwrap();
    tokio::fs::write(foo_path.join("0.txt"), "0").await.unwrap();
    let bar_path = foo_path.join("bar");
    tokio::fs::create_dir(&bar_path).await.unwrap();
    tokio::fs::write(bar_path.join("1.txt"), "1").await.unwrap();
    tokio::fs::write(bar_path.join("2.txt"), "2").await.unwrap();
    tokio::fs::write(bar_path.join("3.txt"), "3").await.unwrap();
    let baz_path = foo_path.join("baz");
    tokio::fs::create_dir(&baz_path).await.unwrap();
    tokio::fs::write(baz_path.join("4.txt"), "4").await.unwrap();
    tokio::fs::symlink("../bar/2.txt", baz_path.join("5.txt"))
        .await
        .unwrap();
    tokio::fs::symlink(bar_path.join("3.txt"), baz_path.join("6.txt"))
        .await
        .unwrap();
    tokio::fs::create_dir(tmp_dir.join("dst")).await.unwrap();
    Ok(tmp_dir)
}

/// What a tree entry looks like, as far as a move is expected to preserve it.
#[cfg(test)]
#[derive(Debug, PartialEq, Eq)]
pub enum Entry {
    File {
        contents: Vec<u8>,
        mode: u32,
        mtime: filetime::FileTime,
    },
    Symlink {
        target: std::path::PathBuf,
    },
    Dir {
        mode: u32,
    },
}

/// Records every entry below `root`, keyed by its path relative to `root`.
#[cfg(test)]
pub fn snapshot_tree(
    root: &std::path::Path,
) -> anyhow::Result<std::collections::BTreeMap<std::path::PathBuf, Entry>> {
    use std::os::unix::fs::PermissionsExt;
    fn walk(
        root: &std::path::Path,
        dir: &std::path::Path,
        out: &mut std::collections::BTreeMap<std::path::PathBuf, Entry>,
    ) -> anyhow::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let metadata = std::fs::symlink_metadata(&path)?;
            let relative = path.strip_prefix(root)?.to_owned();
            if metadata.is_symlink() {
                let target = std::fs::read_link(&path)?;
                out.insert(relative, Entry::Symlink { target });
            } else if metadata.is_dir() {
                let mode = metadata.permissions().mode() & 0o7777;
                out.insert(relative, Entry::Dir { mode });
                walk(root, &path, out)?;
            } else {
                out.insert(
                    relative,
                    Entry::File {
                        contents: std::fs::read(&path)?,
                        mode: metadata.permissions().mode() & 0o7777,
                        mtime: filetime::FileTime::from_last_modification_time(&metadata),
                    },
                );
            }
        }
        Ok(())
    }
    let mut out = std::collections::BTreeMap::new();
    walk(root, root, &mut out)?;
    Ok(out)
}
