//! Verifies what actually lands on disk: ciphertext, never plaintext, and
//! only readable with the key that wrote it.

use cryptdav_core::{CancellationToken, EncryptedStorage, MasterKey, OpenOptions, StorageFile};
use cryptdav_store_local::LocalEncryptedFs;
use std::io;

const SECRET: &[u8] = b"the quick brown fox keeps its secrets";

async fn write_file(engine: &LocalEncryptedFs, path: &std::path::Path, data: &[u8]) {
    let ctx = CancellationToken::new();
    let opts = OpenOptions::new().write(true).create(true).truncate(true);
    let mut file = engine.open_file(&ctx, path, opts, 0o600).await.unwrap();
    file.write_all(data).await.unwrap();
    file.close().await.unwrap();
}

#[tokio::test]
async fn file_bodies_are_encrypted_on_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("note.txt");
    let engine = LocalEncryptedFs::new(MasterKey::from_bytes([1u8; 32]));

    write_file(&engine, &path, SECRET).await;

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[..4], b"CDV1");
    assert!(
        !raw.windows(SECRET.len()).any(|w| w == SECRET),
        "plaintext must not appear on disk"
    );

    // No temp file left behind after the atomic replace
    let names: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("note.txt")]);
}

#[tokio::test]
async fn wrong_key_cannot_open() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("note.txt");
    let writer = LocalEncryptedFs::new(MasterKey::from_bytes([1u8; 32]));
    write_file(&writer, &path, SECRET).await;

    let reader = LocalEncryptedFs::new(MasterKey::zeroed());
    let ctx = CancellationToken::new();
    let err = reader
        .open_file(&ctx, &path, OpenOptions::new().read(true), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    // Stat does not need the key
    let meta = reader.stat(&ctx, &path).await.unwrap();
    assert_eq!(meta.size, SECRET.len() as u64);
}

#[cfg(unix)]
#[tokio::test]
async fn modes_are_applied_and_kept_across_rewrites() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempfile::tempdir().unwrap();
    let engine = LocalEncryptedFs::new(MasterKey::zeroed());
    let ctx = CancellationToken::new();

    let dir = temp_dir.path().join("private");
    engine.mkdir(&ctx, &dir, 0o700).await.unwrap();
    let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode & 0o077, 0, "group/other bits must not be granted");

    let path = dir.join("key.txt");
    write_file(&engine, &path, b"v1").await;
    write_file(&engine, &path, b"v2").await;
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode & 0o077, 0);
}

#[tokio::test]
async fn cancelled_requests_do_not_touch_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = LocalEncryptedFs::new(MasterKey::zeroed());
    let ctx = CancellationToken::new();
    ctx.cancel();

    let dir = temp_dir.path().join("never");
    let err = engine.mkdir(&ctx, &dir, 0o755).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    assert!(!dir.exists());
}

#[tokio::test]
async fn rewrites_leave_lookalike_names_alone() {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = LocalEncryptedFs::new(MasterKey::from_bytes([4u8; 32]));
    let ctx = CancellationToken::new();

    let neighbours = [".foo.cryptdav-tmp", ".cryptdav-foo", "foo.tmp"];
    for name in neighbours {
        write_file(&engine, &temp_dir.path().join(name), name.as_bytes()).await;
    }
    let foo = temp_dir.path().join("foo");
    write_file(&engine, &foo, b"first").await;
    write_file(&engine, &foo, b"second").await;

    for name in neighbours {
        let path = temp_dir.path().join(name);
        let mut file = engine
            .open_file(&ctx, &path, OpenOptions::new().read(true), 0)
            .await
            .unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, name.as_bytes(), "{name} was clobbered");
    }

    let mut root = engine
        .open_file(&ctx, temp_dir.path(), OpenOptions::new().read(true), 0)
        .await
        .unwrap();
    let names: Vec<_> = root
        .read_dir()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(
        names,
        vec![".cryptdav-foo", ".foo.cryptdav-tmp", "foo", "foo.tmp"]
    );
}
