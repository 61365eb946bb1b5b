use anyhow::{Context, Result};
use cryptdav_bridge::{FileSystem, FsError, slash_clean};
use cryptdav_core::{CancellationToken, FileMetadata, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// One `ls`-style line: kind and permission bits, plaintext size, name.
pub fn format_entry(meta: &FileMetadata) -> String {
    let kind = if meta.is_dir() { 'd' } else { '-' };
    format!(
        "{kind}{:04o} {:>12} {}",
        meta.mode & 0o7777,
        meta.size,
        meta.name
    )
}

pub async fn run_ls(fs: &dyn FileSystem, path: &str, out: &mut impl Write) -> Result<()> {
    let ctx = CancellationToken::new();
    let mut handle = fs
        .open_file(&ctx, path, OpenOptions::new().read(true), 0)
        .await
        .with_context(|| format!("cannot open {path}"))?;
    let meta = handle.stat().await?;
    if meta.is_dir() {
        for entry in handle.read_dir().await? {
            writeln!(out, "{}", format_entry(&entry))?;
        }
    } else {
        writeln!(out, "{}", format_entry(&meta))?;
    }
    handle.close().await?;
    Ok(())
}

pub async fn run_stat(fs: &dyn FileSystem, path: &str, out: &mut impl Write) -> Result<()> {
    let meta = fs
        .stat(&CancellationToken::new(), path)
        .await
        .with_context(|| format!("cannot stat {path}"))?;
    writeln!(out, "{}", format_entry(&meta))?;
    Ok(())
}

/// With `parents`, creates missing ancestors and accepts an existing
/// directory, like `mkdir -p`.
pub async fn run_mkdir(fs: &dyn FileSystem, path: &str, parents: bool, mode: u32) -> Result<()> {
    let ctx = CancellationToken::new();
    if !parents {
        fs.mkdir(&ctx, path, mode)
            .await
            .with_context(|| format!("cannot create directory {path}"))?;
        return Ok(());
    }

    let cleaned = slash_clean(path);
    let mut prefix = String::new();
    for segment in cleaned.split('/').filter(|s| !s.is_empty()) {
        prefix.push('/');
        prefix.push_str(segment);
        match fs.mkdir(&ctx, &prefix, mode).await {
            Ok(()) => {}
            Err(FsError::Storage(err)) if err.kind() == io::ErrorKind::AlreadyExists => {
                let meta = fs.stat(&ctx, &prefix).await?;
                if !meta.is_dir() {
                    anyhow::bail!("{prefix} exists and is not a directory");
                }
            }
            Err(err) => {
                return Err(err).with_context(|| format!("cannot create directory {prefix}"));
            }
        }
    }
    Ok(())
}

pub async fn run_put(fs: &dyn FileSystem, local: &Path, remote: &str) -> Result<u64> {
    let data = tokio::fs::read(local)
        .await
        .with_context(|| format!("failed to read {}", local.display()))?;
    let ctx = CancellationToken::new();
    let opts = OpenOptions::new().write(true).create(true).truncate(true);
    let mut file = fs
        .open_file(&ctx, remote, opts, 0o644)
        .await
        .with_context(|| format!("cannot open {remote} for writing"))?;
    file.write_all(&data).await?;
    file.close().await?;
    info!(remote, bytes = data.len(), "stored");
    Ok(data.len() as u64)
}

pub async fn run_get(fs: &dyn FileSystem, remote: &str, local: &Path) -> Result<u64> {
    let data = read_remote(fs, remote).await?;
    tokio::fs::write(local, &data)
        .await
        .with_context(|| format!("failed to write {}", local.display()))?;
    info!(remote, bytes = data.len(), "fetched");
    Ok(data.len() as u64)
}

pub async fn run_cat(fs: &dyn FileSystem, remote: &str, out: &mut impl Write) -> Result<()> {
    let data = read_remote(fs, remote).await?;
    out.write_all(&data)?;
    out.flush()?;
    Ok(())
}

pub async fn run_rm(fs: &dyn FileSystem, path: &str) -> Result<()> {
    fs.remove_all(&CancellationToken::new(), path)
        .await
        .with_context(|| format!("cannot remove {path}"))?;
    Ok(())
}

pub async fn run_mv(fs: &dyn FileSystem, from: &str, to: &str) -> Result<()> {
    fs.rename(&CancellationToken::new(), from, to)
        .await
        .with_context(|| format!("cannot move {from} to {to}"))?;
    Ok(())
}

async fn read_remote(fs: &dyn FileSystem, remote: &str) -> Result<Vec<u8>> {
    let ctx = CancellationToken::new();
    let mut file = fs
        .open_file(&ctx, remote, OpenOptions::new().read(true), 0)
        .await
        .with_context(|| format!("cannot open {remote}"))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).await?;
    file.close().await?;
    Ok(data)
}
