/*!
 * Containment Tests
 * Paths that try to leave the sandbox root through public operations
 */

use sandbox_fs::{FsError, FsErrorKind, SandboxFs};
use tempfile::TempDir;

/// A sandbox nested one level below a directory holding a decoy file
fn setup() -> (TempDir, SandboxFs) {
    let outer = TempDir::new().unwrap();
    std::fs::write(outer.path().join("secret.txt"), b"outside").unwrap();
    std::fs::create_dir(outer.path().join("root")).unwrap();
    let fs = SandboxFs::new(outer.path().join("root")).unwrap();
    (outer, fs)
}

const ATTACKS: &[&str] = &[
    "../secret.txt",
    "/../secret.txt",
    "/a/../../secret.txt",
    "/a/b/../../../secret.txt",
    "/./../secret.txt",
];

fn assert_illegal(err: FsError, attack: &str) {
    assert_eq!(err.kind(), FsErrorKind::IllegalPath, "{attack}");
    assert!(err.is_security_violation());
}

#[tokio::test]
async fn test_reads_cannot_escape() {
    let (_outer, fs) = setup();

    for attack in ATTACKS {
        assert_illegal(fs.read_file(attack).await.unwrap_err(), attack);
        assert_illegal(fs.path_exists(attack, None).await.unwrap_err(), attack);
        assert_illegal(fs.stat(attack).await.unwrap_err(), attack);
    }
    assert_illegal(fs.read_directory("/..").await.unwrap_err(), "/..");
}

#[tokio::test]
async fn test_mutations_cannot_escape() {
    let (outer, fs) = setup();

    for attack in ATTACKS {
        assert_illegal(fs.create_file(attack, "pwned").await.unwrap_err(), attack);
        assert_illegal(fs.update_file(attack, "pwned").await.unwrap_err(), attack);
        assert_illegal(fs.remove(attack).await.unwrap_err(), attack);
    }
    assert_illegal(
        fs.create_directory("/../evil").await.unwrap_err(),
        "/../evil",
    );

    fs.create_file("/inside.txt", "in").await.unwrap();
    assert_illegal(
        fs.move_path("/inside.txt", "/../stolen.txt").await.unwrap_err(),
        "/../stolen.txt",
    );
    assert_illegal(
        fs.move_path("/../secret.txt", "/copied.txt").await.unwrap_err(),
        "/../secret.txt",
    );

    assert_eq!(
        std::fs::read(outer.path().join("secret.txt")).unwrap(),
        b"outside"
    );
    assert!(!outer.path().join("evil").exists());
    assert!(!outer.path().join("stolen.txt").exists());
}

#[tokio::test]
async fn test_dotdot_inside_root_is_allowed() {
    let (outer, fs) = setup();

    fs.create_file("/a/b/../c.txt", "c").await.unwrap();
    assert!(outer.path().join("root/a/c.txt").is_file());
    assert_eq!(fs.read_file("/a/./c.txt").await.unwrap(), b"c");
}

#[tokio::test]
async fn test_root_itself_cannot_be_mutated() {
    let (outer, fs) = setup();

    for target in ["/", "/a/.."] {
        assert_illegal(fs.remove(target).await.unwrap_err(), target);
        assert_illegal(fs.create_directory(target).await.unwrap_err(), target);
    }
    assert!(outer.path().join("root").is_dir());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_out_of_root_is_illegal() {
    let (outer, fs) = setup();
    std::os::unix::fs::symlink(outer.path(), outer.path().join("root/link")).unwrap();

    assert_illegal(
        fs.read_file("/link/secret.txt").await.unwrap_err(),
        "/link/secret.txt",
    );
    assert_illegal(
        fs.create_file("/link/planted.txt", "x").await.unwrap_err(),
        "/link/planted.txt",
    );
    assert!(!outer.path().join("planted.txt").exists());
}
