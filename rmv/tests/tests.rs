use std::os::unix::fs::PermissionsExt;

fn rmv() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("rmv").unwrap()
}

fn create_test_file(path: &std::path::Path, content: &str, mode: u32) {
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
}

fn get_file_mode(path: &std::path::Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

/// Creates `<root>/data` with a couple of files, a symlink and a nested directory.
fn setup_source(root: &std::path::Path) -> std::path::PathBuf {
    let src = root.join("data");
    std::fs::create_dir(&src).unwrap();
    create_test_file(&src.join("a.txt"), "alpha", 0o640);
    std::fs::create_dir(src.join("nested")).unwrap();
    create_test_file(&src.join("nested").join("b.txt"), "beta", 0o600);
    std::os::unix::fs::symlink("a.txt", src.join("link")).unwrap();
    src
}

#[test]
fn check_rmv_help() {
    rmv()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("--max-concurrent-moves"));
}

#[test]
fn check_rmv_version() {
    rmv()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("rmv"));
}

#[test]
fn test_basic_move() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    rmv()
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .success();
    assert!(!src.exists());
    let dst = dst_root.path().join("data");
    assert_eq!(std::fs::read_to_string(dst.join("a.txt")).unwrap(), "alpha");
    assert_eq!(
        std::fs::read_to_string(dst.join("nested").join("b.txt")).unwrap(),
        "beta"
    );
    assert_eq!(get_file_mode(&dst.join("a.txt")), 0o640);
    assert_eq!(get_file_mode(&dst.join("nested").join("b.txt")), 0o600);
    assert_eq!(
        std::fs::read_link(dst.join("link")).unwrap(),
        std::path::PathBuf::from("a.txt")
    );
}

#[test]
fn test_summary_is_printed() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    rmv()
        .args(["--summary", "--max-concurrent-moves", "1", "--batch-size", "1"])
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("files moved: 2"))
        .stdout(predicates::str::contains("symlinks moved: 1"))
        .stdout(predicates::str::contains("directories removed: 2"));
}

#[test]
fn test_missing_destination_parent_is_created() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o750)).unwrap();
    let dst_parent = dst_root.path().join("x").join("y");
    rmv()
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(&dst_parent)
        .assert()
        .success();
    assert_eq!(get_file_mode(&dst_parent), 0o750);
    assert_eq!(get_file_mode(&dst_parent.join("data")), 0o750);
    assert!(dst_parent.join("data").join("a.txt").is_file());
    assert!(!src.exists());
}

#[test]
fn test_missing_source_is_a_usage_error() {
    let root = tempfile::tempdir().unwrap();
    rmv()
        .arg("--from")
        .arg(root.path().join("nope"))
        .arg("--to")
        .arg(root.path())
        .assert()
        .code(1)
        .stderr(predicates::str::contains("couldn't get info on the source"));
}

#[test]
fn test_source_file_is_a_usage_error() {
    let root = tempfile::tempdir().unwrap();
    let file = root.path().join("file.txt");
    create_test_file(&file, "content", 0o644);
    let dst = root.path().join("dst");
    rmv()
        .arg("--from")
        .arg(&file)
        .arg("--to")
        .arg(&dst)
        .assert()
        .code(1)
        .stderr(predicates::str::contains("not a directory"));
    assert!(file.exists());
    assert!(!dst.exists());
}

#[test]
fn test_destination_file_is_a_usage_error() {
    let src_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    let dst = src_root.path().join("occupied");
    create_test_file(&dst, "content", 0o644);
    rmv()
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(&dst)
        .assert()
        .code(1);
    assert!(src.join("a.txt").exists());
}

#[test]
fn test_move_into_itself_is_a_usage_error() {
    let src_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    rmv()
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(src.join("nested"))
        .assert()
        .code(1)
        .stderr(predicates::str::contains("into itself"));
    assert!(src.join("nested").join("b.txt").exists());
}

#[test]
fn test_missing_destination_inside_source_is_not_created() {
    let src_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    rmv()
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(src.join("x").join("y"))
        .assert()
        .code(1)
        .stderr(predicates::str::contains("into itself"));
    assert!(!src.join("x").exists());
    assert!(src.join("a.txt").exists());
}

#[test]
fn test_symlinked_source_moves_target_directory() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    let alias = src_root.path().join("alias");
    std::os::unix::fs::symlink(&src, &alias).unwrap();
    rmv()
        .arg("--from")
        .arg(&alias)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .success();
    let dst = dst_root.path().join("data");
    assert_eq!(std::fs::read_to_string(dst.join("a.txt")).unwrap(), "alpha");
    assert!(dst.join("nested").join("b.txt").is_file());
    assert!(!src.exists());
    // the symlink itself stays, now dangling
    assert!(std::fs::symlink_metadata(&alias).unwrap().is_symlink());
}

#[test]
fn test_missing_arguments_are_a_usage_error() {
    rmv().assert().code(1);
    rmv().args(["--from", "/tmp"]).assert().code(1);
}

#[test]
fn test_zero_concurrency_is_a_usage_error() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    rmv()
        .args(["--max-concurrent-moves", "0"])
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .code(1)
        .stderr(predicates::str::contains("max_concurrent_moves"));
    assert!(src.join("a.txt").exists());
}

#[test]
fn test_partial_failure_exits_with_move_error() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    let _listener = std::os::unix::net::UnixListener::bind(src.join("socket")).unwrap();
    rmv()
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .code(2)
        .stdout(predicates::str::contains("there were errors moving"));
    let dst = dst_root.path().join("data");
    // everything else moved, the socket and its directory stayed
    assert!(dst.join("a.txt").is_file());
    assert!(dst.join("nested").join("b.txt").is_file());
    assert!(!src.join("a.txt").exists());
    assert!(!src.join("nested").exists());
    assert!(src.join("socket").exists());
}

#[test]
fn test_conflict_keeps_source_entry() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    std::fs::create_dir_all(dst_root.path().join("data").join("a.txt")).unwrap();
    rmv()
        .arg("--summary")
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .code(2)
        .stdout(predicates::str::contains("files moved: 1"));
    assert_eq!(std::fs::read_to_string(src.join("a.txt")).unwrap(), "alpha");
    assert!(dst_root.path().join("data").join("a.txt").is_dir());
}

#[test]
fn test_quiet_suppresses_errors() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    let _listener = std::os::unix::net::UnixListener::bind(src.join("socket")).unwrap();
    rmv()
        .arg("-q")
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .code(2)
        .stdout(predicates::str::is_empty());
}

#[test]
fn test_text_progress_goes_to_stderr() {
    let src_root = tempfile::tempdir().unwrap();
    let dst_root = tempfile::tempdir().unwrap();
    let src = setup_source(src_root.path());
    rmv()
        .args(["--progress-type", "text-updates", "--progress-delay", "10ms"])
        .arg("--from")
        .arg(&src)
        .arg("--to")
        .arg(dst_root.path())
        .assert()
        .success()
        .stderr(predicates::str::contains("MOVED"));
}
