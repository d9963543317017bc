//! End-to-end facade tests: mount routing, cross-backend operations,
//! read-only enforcement, and descriptor-driven construction.

use std::sync::Arc;

use async_trait::async_trait;
use polyfs_config::WorkspaceConfig;
use polyfs_kernel::{
    Backend, BackendError, BackendResult, Entry, LocalBackend, MemoryBackend, Mount, Vfs,
    VfsError,
};

fn two_mount_vfs() -> Vfs {
    Vfs::new(
        "agent-workspace",
        vec![
            Mount::new("/workspace", Arc::new(MemoryBackend::new())),
            Mount::new("/tmp", Arc::new(MemoryBackend::new())),
        ],
    )
}

#[tokio::test]
async fn mounts_are_isolated() {
    let vfs = two_mount_vfs();
    vfs.write("/workspace/a.txt", b"workspace").await.unwrap();
    vfs.write("/tmp/a.txt", b"tmp").await.unwrap();

    assert_eq!(vfs.read("/workspace/a.txt").await.unwrap(), b"workspace");
    assert_eq!(vfs.read("/tmp/a.txt").await.unwrap(), b"tmp");

    vfs.delete("/tmp/a.txt").await.unwrap();
    assert!(vfs.exists("/workspace/a.txt").await);
    assert!(!vfs.exists("/tmp/a.txt").await);
}

#[tokio::test]
async fn nested_mounts_resolve_longest_prefix() {
    let outer = Arc::new(MemoryBackend::new());
    let inner = Arc::new(MemoryBackend::new());
    let vfs = Vfs::new(
        "nested",
        vec![
            Mount::new("/workspace", outer.clone()),
            Mount::new("/workspace/cache", inner.clone()),
        ],
    );

    vfs.write("/workspace/cache/x.bin", b"cached").await.unwrap();
    vfs.write("/workspace/notes.txt", b"notes").await.unwrap();

    // The inner mount owns its subtree; the outer backend never saw it.
    assert!(inner.exists("x.bin").await.unwrap());
    assert!(!outer.exists("cache/x.bin").await.unwrap());
    assert!(outer.exists("notes.txt").await.unwrap());
}

#[tokio::test]
async fn mount_points_behave_as_directories() {
    let vfs = two_mount_vfs();
    vfs.write("/workspace/a.txt", b"x").await.unwrap();

    // Byte I/O aimed at a mount point targets the backend root.
    let err = vfs.write("/workspace", b"phantom").await.unwrap_err();
    assert!(matches!(err, VfsError::IsADirectory(_)), "got: {err:?}");
    let err = vfs.read("/workspace").await.unwrap_err();
    assert!(matches!(err, VfsError::IsADirectory(_)), "got: {err:?}");
    let err = vfs.append("/workspace", b"phantom").await.unwrap_err();
    assert!(matches!(err, VfsError::IsADirectory(_)), "got: {err:?}");

    assert!(vfs.stat("/workspace").await.unwrap().is_dir);
    let entries = vfs.list("/workspace").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "/workspace/a.txt");
}

#[tokio::test]
async fn unmounted_paths_are_no_mount() {
    let vfs = two_mount_vfs();
    let err = vfs.read("/elsewhere/f.txt").await.unwrap_err();
    assert!(matches!(err, VfsError::NoMount(_)));
    // exists never fails, even with no mount.
    assert!(!vfs.exists("/elsewhere/f.txt").await);
}

#[tokio::test]
async fn read_only_mounts_reject_mutation() {
    let backend = Arc::new(MemoryBackend::new());
    backend.write("kept.txt", b"kept").await.unwrap();
    let vfs = Vfs::new(
        "ro",
        vec![
            Mount::new("/kb", backend).read_only(true),
            Mount::new("/scratch", Arc::new(MemoryBackend::new())),
        ],
    );

    assert_eq!(vfs.read("/kb/kept.txt").await.unwrap(), b"kept");

    assert!(matches!(
        vfs.write("/kb/new.txt", b"x").await.unwrap_err(),
        VfsError::ReadOnly(_)
    ));
    assert!(matches!(
        vfs.append("/kb/kept.txt", b"x").await.unwrap_err(),
        VfsError::ReadOnly(_)
    ));
    assert!(matches!(
        vfs.delete("/kb/kept.txt").await.unwrap_err(),
        VfsError::ReadOnly(_)
    ));
    // Renaming off a read-only mount would delete the source.
    assert!(matches!(
        vfs.rename("/kb/kept.txt", "/scratch/kept.txt").await.unwrap_err(),
        VfsError::ReadOnly(_)
    ));
    // Copying off a read-only mount is fine; copying onto one is not.
    let n = vfs.copy("/kb/kept.txt", "/scratch/kept.txt").await.unwrap();
    assert_eq!(n, 4);
    assert!(matches!(
        vfs.copy("/scratch/kept.txt", "/kb/copy.txt").await.unwrap_err(),
        VfsError::ReadOnly(_)
    ));
}

#[tokio::test]
async fn cross_backend_copy_and_rename() {
    let vfs = two_mount_vfs();
    vfs.write("/workspace/move-me.txt", b"payload").await.unwrap();

    let n = vfs
        .copy("/workspace/move-me.txt", "/tmp/copied.txt")
        .await
        .unwrap();
    assert_eq!(n, 7);
    assert!(vfs.exists("/workspace/move-me.txt").await);
    assert_eq!(vfs.read("/tmp/copied.txt").await.unwrap(), b"payload");

    vfs.rename("/workspace/move-me.txt", "/tmp/moved.txt")
        .await
        .unwrap();
    assert!(!vfs.exists("/workspace/move-me.txt").await);
    assert_eq!(vfs.read("/tmp/moved.txt").await.unwrap(), b"payload");
}

#[tokio::test]
async fn same_backend_rename_through_different_mounts() {
    let shared = Arc::new(MemoryBackend::new());
    let vfs = Vfs::new(
        "aliased",
        vec![
            Mount::new("/a", shared.clone()),
            Mount::new("/b", shared.clone()),
        ],
    );
    vfs.write("/a/f.txt", b"x").await.unwrap();
    // Same backend instance behind both mounts: native rename path.
    vfs.rename("/a/f.txt", "/b/g.txt").await.unwrap();
    assert!(!vfs.exists("/a/f.txt").await);
    assert_eq!(vfs.read("/b/g.txt").await.unwrap(), b"x");
}

/// Delegates everything to an inner memory backend but refuses deletes.
/// Stands in for a backend that loses connectivity mid-operation.
struct NoDeleteBackend {
    inner: MemoryBackend,
}

#[async_trait]
impl Backend for NoDeleteBackend {
    async fn read(&self, path: &str) -> BackendResult<Vec<u8>> {
        self.inner.read(path).await
    }
    async fn write(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        self.inner.write(path, data).await
    }
    async fn append(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        self.inner.append(path, data).await
    }
    async fn delete(&self, path: &str) -> BackendResult<()> {
        Err(BackendError::Other(format!("delete refused: {path}")))
    }
    async fn list(&self, path: &str) -> BackendResult<Vec<Entry>> {
        self.inner.list(path).await
    }
    async fn exists(&self, path: &str) -> BackendResult<bool> {
        self.inner.exists(path).await
    }
    async fn stat(&self, path: &str) -> BackendResult<Entry> {
        self.inner.stat(path).await
    }
}

#[tokio::test]
async fn failed_source_delete_is_a_partial_rename() {
    let flaky = NoDeleteBackend {
        inner: MemoryBackend::new(),
    };
    flaky.write("f.txt", b"data").await.unwrap();
    let vfs = Vfs::new(
        "partial",
        vec![
            Mount::new("/flaky", Arc::new(flaky)),
            Mount::new("/tmp", Arc::new(MemoryBackend::new())),
        ],
    );

    let err = vfs.rename("/flaky/f.txt", "/tmp/f.txt").await.unwrap_err();
    match err {
        VfsError::PartialRename { from, to, .. } => {
            assert_eq!(from, "/flaky/f.txt");
            assert_eq!(to, "/tmp/f.txt");
        }
        other => panic!("expected PartialRename, got {other}"),
    }
    // The copy landed; both paths hold the content.
    assert!(vfs.exists("/flaky/f.txt").await);
    assert_eq!(vfs.read("/tmp/f.txt").await.unwrap(), b"data");
}

#[tokio::test]
async fn entries_come_back_with_virtual_paths() {
    let vfs = two_mount_vfs();
    vfs.write("/workspace/docs/a.txt", b"1").await.unwrap();
    vfs.write("/workspace/docs/sub/b.txt", b"2").await.unwrap();

    let entries = vfs.list("/workspace/docs").await.unwrap();
    let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/workspace/docs/sub", "/workspace/docs/a.txt"]);

    let stat = vfs.stat("/workspace/docs/a.txt").await.unwrap();
    assert_eq!(stat.path, "/workspace/docs/a.txt");
    assert_eq!(stat.size, Some(1));
}

#[tokio::test]
async fn backend_root_anchors_a_mount() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = Arc::new(LocalBackend::new(dir.path()).unwrap());
    backend.write("shared/docs/guide.md", b"# guide").await.unwrap();
    backend.write("private/secret.txt", b"no").await.unwrap();

    let vfs = Vfs::new(
        "anchored",
        vec![Mount::new("/docs", backend).with_root("shared/docs")],
    );

    assert_eq!(vfs.read("/docs/guide.md").await.unwrap(), b"# guide");
    let entries = vfs.list("/docs").await.unwrap();
    assert_eq!(entries[0].path, "/docs/guide.md");
    assert!(!vfs.exists("/docs/private/secret.txt").await);
}

#[tokio::test]
async fn text_helpers_roundtrip_unicode() {
    let vfs = two_mount_vfs();
    vfs.write_text("/workspace/uni.txt", "héllo wörld 🌍")
        .await
        .unwrap();
    vfs.append_text("/workspace/uni.txt", " ...и ещё").await.unwrap();
    assert_eq!(
        vfs.read_text("/workspace/uni.txt").await.unwrap(),
        "héllo wörld 🌍 ...и ещё"
    );
}

#[tokio::test]
async fn read_text_rejects_binary() {
    let vfs = two_mount_vfs();
    vfs.write("/workspace/blob.bin", &[0u8, 159, 146, 150])
        .await
        .unwrap();
    let err = vfs.read_text("/workspace/blob.bin").await.unwrap_err();
    assert!(matches!(err, VfsError::NotUtf8(ref p) if p == "/workspace/blob.bin"));
}

#[tokio::test]
async fn deep_writes_create_ancestors() {
    let vfs = two_mount_vfs();
    vfs.write("/workspace/a/b/c/d/e.txt", b"deep").await.unwrap();
    let stat = vfs.stat("/workspace/a/b/c").await.unwrap();
    assert!(stat.is_dir);
}

#[tokio::test]
async fn unnormalized_paths_reach_the_same_file() {
    let vfs = two_mount_vfs();
    vfs.write("/workspace//double//slash.txt", b"ok").await.unwrap();
    assert_eq!(
        vfs.read("/workspace/double/slash.txt").await.unwrap(),
        b"ok"
    );
    assert_eq!(
        vfs.read("/workspace/double/slash.txt/").await.unwrap(),
        b"ok"
    );
}

#[tokio::test]
async fn builds_from_descriptor() {
    let dir = tempfile::TempDir::new().unwrap();
    let toml = format!(
        r#"
            name = "configured"

            [backends.disk]
            type = "fs"
            root = "{}"

            [backends.scratch]
            type = "memory"

            [[mounts]]
            path = "/data"
            backend = "disk"

            [[mounts]]
            path = "/tmp"
            backend = "scratch"
            read_only = true
        "#,
        dir.path().display()
    );
    let config = WorkspaceConfig::from_toml(&toml).unwrap();
    let vfs = Vfs::from_config(config).await.unwrap();

    assert_eq!(vfs.name(), "configured");
    assert_eq!(vfs.mounts(), vec!["/data", "/tmp"]);
    assert_eq!(format!("{vfs}"), r#"Vfs(name='configured', mounts=["/data", "/tmp"])"#);

    vfs.write("/data/f.txt", b"on disk").await.unwrap();
    assert!(dir.path().join("f.txt").exists());

    assert!(matches!(
        vfs.write("/tmp/f.txt", b"x").await.unwrap_err(),
        VfsError::ReadOnly(_)
    ));

    // No chroma mount: manifest has no semantic search, but grep is there.
    let manifest = vfs.tools("mcp").unwrap();
    assert!(manifest.contains("vfs_grep"));
    assert!(!manifest.contains("vfs_search"));
}

#[tokio::test]
async fn invalid_descriptor_fails_before_any_io() {
    let config = WorkspaceConfig::from_toml(
        r#"
            name = "broken"
            [[mounts]]
            path = "/data"
            backend = "ghost"
        "#,
    )
    .unwrap();
    let err = Vfs::from_config(config).await.unwrap_err();
    assert!(matches!(err, VfsError::InvalidConfig(_)));
}

#[tokio::test]
async fn grep_spans_mounts_through_the_facade() {
    let vfs = two_mount_vfs();
    vfs.write_text("/workspace/a.txt", "hello world\nfoo bar\nhello again\n")
        .await
        .unwrap();
    let matches = vfs.grep("hello", "/workspace/a.txt", false).await.unwrap();
    assert_eq!(
        matches.iter().map(|m| m.line_number).collect::<Vec<_>>(),
        vec![1, 3]
    );
}
