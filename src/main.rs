// src/main.rs

use anyhow::{bail, Context, Result};
use clap::Parser;
use fuser::{mount2, MountOption};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tagfs::config::Config;
use tagfs::extract::SymphoniaExtractor;
use tagfs::hollow_drive::HollowDrive;
use tagfs::librarian::Librarian;
use tagfs::virtual_fs::VirtualFs;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tagfs")]
#[command(about = "Read-only FUSE view of a music library, grouped by artist, genre and year")]
struct Args {
    /// Directory holding the audio files
    source_dir: PathBuf,

    /// Where to mount the tag view
    mount_point: PathBuf,

    /// JSON config file (defaults to the per-user config if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Audio extension to index; repeat to list several. Replaces the configured set.
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Let other users see the mount
    #[arg(long)]
    allow_other: bool,
}

fn mount_options(config: &Config) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::RO,
        MountOption::FSName("tagfs".to_string()),
        MountOption::AutoUnmount,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    options
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if !args.source_dir.is_dir() {
        eprintln!("tagfs: source directory {} is not a valid directory", args.source_dir.display());
        std::process::exit(1);
    }

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    if !args.extensions.is_empty() {
        config.extensions = args.extensions;
    }
    if args.allow_other {
        config.allow_other = true;
    }
    config.validate()?;

    // ========== SAFETY CHECKS (Anti-Feedback Switch) ==========
    let abs_source = std::fs::canonicalize(&args.source_dir)
        .with_context(|| format!("resolving {}", args.source_dir.display()))?;
    let abs_mount = std::fs::canonicalize(&args.mount_point).unwrap_or_else(|_| args.mount_point.clone());
    tracing::debug!("Safety Check: Mount={:?}, Source={:?}", abs_mount, abs_source);

    if abs_mount.starts_with(&abs_source) {
        tracing::error!("FATAL: Feedback Loop Detected!");
        bail!(
            "mount point {} is inside the source directory {}",
            abs_mount.display(),
            abs_source.display()
        );
    }

    tracing::info!("TagFS starting up");
    tracing::info!("Source directory: {}", abs_source.display());
    tracing::info!("Mountpoint: {}", args.mount_point.display());

    // ========== INITIAL SCAN ==========
    let scan_config = config.clone();
    let scan_root = abs_source.clone();
    let catalog = tokio::task::spawn_blocking(move || {
        let extractor = SymphoniaExtractor;
        Librarian::new(&scan_config, &extractor).scan(&scan_root)
    })
    .await
    .context("scan task panicked")?
    .context("initial scan failed")?;

    let stats = catalog.stats();
    tracing::info!("✓ Catalog ready: {} files indexed, {} skipped", stats.indexed, stats.skipped);

    // ========== HOLLOW DRIVE (FUSE Loop) ==========
    let fs = VirtualFs::new(Arc::new(catalog), &config);
    let hollow_drive = HollowDrive::new(
        fs,
        tokio::runtime::Handle::current(),
        Duration::from_secs(config.attr_ttl_secs),
    );
    let options = mount_options(&config);
    let mount_point = args.mount_point;

    tracing::info!("Mounting FUSE...");
    tokio::task::spawn_blocking(move || mount2(hollow_drive, &mount_point, &options))
        .await
        .context("FUSE task panicked")?
        .context("FUSE mount failed")?;

    tracing::info!("TagFS shutting down...");
    Ok(())
}
