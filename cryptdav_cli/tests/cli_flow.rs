use cryptdav_cli::cmd;
use cryptdav_cli::config::{CryptdavConfig, StoreConfig};

#[tokio::test]
async fn init_then_file_commands() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_file = temp_dir.path().join("config").join("work.toml");
    let serve_root = temp_dir.path().join("served");
    std::fs::create_dir(&serve_root).unwrap();

    let config = cmd::run_init(&config_file, &serve_root, StoreConfig::Local).unwrap();
    assert_eq!(CryptdavConfig::load(&config_file).unwrap(), config);
    let key_file = temp_dir.path().join("config").join("work.masterkey");
    assert!(key_file.exists());

    // Second init refuses to clobber the profile
    assert!(cmd::run_init(&config_file, &serve_root, StoreConfig::Local).is_err());

    let keys = cmd::key_provider(&config, &config_file, None);
    assert!(!keys.is_debug());

    let mut out = Vec::new();
    cmd::run_check(&config, &keys, None, &mut out).await.unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("(key file)"));

    let fs = cmd::open_fs(&config, &keys, None).await.unwrap();
    let fs = fs.as_ref();

    let local_src = temp_dir.path().join("hello.txt");
    std::fs::write(&local_src, b"hello, encrypted world").unwrap();

    cmd::run_mkdir(fs, "/docs/2024", true, 0o755).await.unwrap();
    cmd::run_mkdir(fs, "/docs", true, 0o755).await.unwrap();
    assert!(cmd::run_mkdir(fs, "/docs", false, 0o755).await.is_err());

    let written = cmd::run_put(fs, &local_src, "/docs/hello.txt").await.unwrap();
    assert_eq!(written, 22);
    let on_disk = std::fs::read(serve_root.join("docs").join("hello.txt")).unwrap();
    assert_ne!(on_disk, b"hello, encrypted world");

    let mut out = Vec::new();
    cmd::run_cat(fs, "/docs/hello.txt", &mut out).await.unwrap();
    assert_eq!(out, b"hello, encrypted world");

    let mut out = Vec::new();
    cmd::run_ls(fs, "/docs", &mut out).await.unwrap();
    let listing = String::from_utf8(out).unwrap();
    let lines: Vec<_> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with('d') && lines[0].ends_with(" 2024"));
    assert!(lines[1].starts_with('-') && lines[1].ends_with(" 22 hello.txt"));

    cmd::run_mv(fs, "/docs/hello.txt", "/hello.txt").await.unwrap();
    let local_dst = temp_dir.path().join("back.txt");
    cmd::run_get(fs, "/hello.txt", &local_dst).await.unwrap();
    assert_eq!(std::fs::read(&local_dst).unwrap(), b"hello, encrypted world");

    // Root is protected, traversal stays inside
    assert!(cmd::run_rm(fs, "/").await.is_err());
    assert!(cmd::run_mv(fs, "/hello.txt", "/..").await.is_err());
    let mut out = Vec::new();
    assert!(cmd::run_stat(fs, "/../config/work.toml", &mut out).await.is_err());

    cmd::run_rm(fs, "/docs").await.unwrap();
    assert!(!serve_root.join("docs").exists());
    assert!(serve_root.exists());
}

#[tokio::test]
async fn memory_store_gets_its_root() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_file = temp_dir.path().join("mem.toml");
    let serve_root = std::path::Path::new("/srv/dav");
    let config = cmd::run_init(&config_file, serve_root, StoreConfig::Memory).unwrap();

    let keys = cmd::key_provider(&config, &config_file, Some("on"));
    assert!(keys.is_debug());

    let mut out = Vec::new();
    cmd::run_check(&config, &keys, None, &mut out).await.unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("(debug)"));
    assert!(report.contains("/srv/dav"));
}

#[tokio::test]
async fn missing_key_file_is_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_file = temp_dir.path().join("p.toml");
    let serve_root = temp_dir.path().join("served");
    std::fs::create_dir(&serve_root).unwrap();
    let config = cmd::run_init(&config_file, &serve_root, StoreConfig::Local).unwrap();
    std::fs::remove_file(temp_dir.path().join("p.masterkey")).unwrap();

    let keys = cmd::key_provider(&config, &config_file, Some("off"));
    assert!(cmd::open_fs(&config, &keys, None).await.is_err());
    let mut out = Vec::new();
    assert!(cmd::run_check(&config, &keys, None, &mut out).await.is_err());
}
