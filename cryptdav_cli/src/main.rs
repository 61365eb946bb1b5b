use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use cryptdav_cli::cmd;
use cryptdav_cli::config::{CryptdavConfig, StoreConfig};
use cryptdav_keys::DEBUG_KEY_ENV;
use directories::ProjectDirs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which cryptdav profile this command should use
    #[arg(short, long, value_name = "NAME", default_value = "local")]
    profile: String,

    /// Use this config file instead of the profile's
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the serving root from the config
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the profile config and generate its master key
    Init {
        /// Directory to serve (defaults to --root)
        #[arg(value_name = "ROOT")]
        serve_root: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "local")]
        store: StoreConfig,
    },
    /// Load the master key and check that the serving root is usable
    Check,
    #[command(flatten)]
    File(FileCmd),
}

/// Commands that go through the encrypted filesystem.
#[derive(Subcommand)]
enum FileCmd {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show metadata for a path
    Stat { path: String },
    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parents, accept existing directories
        #[arg(short, long, action = ArgAction::SetTrue)]
        parents: bool,
    },
    /// Encrypt a local file into the store
    Put { local: PathBuf, remote: String },
    /// Decrypt a stored file to a local path
    Get { remote: String, local: PathBuf },
    /// Decrypt a stored file to stdout
    Cat { remote: String },
    /// Remove a file or directory tree
    Rm { path: String },
    /// Rename a file or directory
    Mv { from: String, to: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    // Profiles live under ~/.config/cryptdav/<profile>.toml
    let config_file = match cli.config {
        Some(path) => path,
        None => {
            let dirs = ProjectDirs::from("", "", "cryptdav")
                .context("failed to determine config directory path")?;
            dirs.config_dir().join(&cli.profile).with_extension("toml")
        }
    };

    let file_cmd = match cli.cmd {
        Commands::Init { serve_root, store } => {
            let root = serve_root
                .or(cli.root)
                .context("no serving root given, pass ROOT or --root")?;
            cmd::run_init(&config_file, &root, store)?;
            return Ok(());
        }
        Commands::Check => None,
        Commands::File(file_cmd) => Some(file_cmd),
    };

    let config = CryptdavConfig::load(&config_file)?;
    let debug_flag = std::env::var(DEBUG_KEY_ENV).ok();
    let keys = cmd::key_provider(&config, &config_file, debug_flag.as_deref());
    let root = cli.root.as_deref();
    let mut stdout = std::io::stdout().lock();

    let Some(file_cmd) = file_cmd else {
        return cmd::run_check(&config, &keys, root, &mut stdout).await;
    };

    let fs = cmd::open_fs(&config, &keys, root).await?;
    let fs = fs.as_ref();
    match file_cmd {
        FileCmd::Ls { path } => cmd::run_ls(fs, &path, &mut stdout).await,
        FileCmd::Stat { path } => cmd::run_stat(fs, &path, &mut stdout).await,
        FileCmd::Mkdir { path, parents } => cmd::run_mkdir(fs, &path, parents, 0o755).await,
        FileCmd::Put { local, remote } => cmd::run_put(fs, &local, &remote).await.map(|_| ()),
        FileCmd::Get { remote, local } => cmd::run_get(fs, &remote, &local).await.map(|_| ()),
        FileCmd::Cat { remote } => cmd::run_cat(fs, &remote, &mut stdout).await,
        FileCmd::Rm { path } => cmd::run_rm(fs, &path).await,
        FileCmd::Mv { from, to } => cmd::run_mv(fs, &from, &to).await,
    }
}
