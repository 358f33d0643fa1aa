use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use uvfs::{GuardStrategy, MountPoint, VolumeParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GuardArg {
    /// One dispatch at a time.
    Coarse,
    /// Shared for queries, exclusive for namespace changes.
    Fine,
}

impl GuardArg {
    pub fn strategy(self) -> GuardStrategy {
        match self {
            GuardArg::Coarse => GuardStrategy::Coarse,
            GuardArg::Fine => GuardStrategy::fine(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "uvfs-memfs")]
#[command(about = "In-memory uvfs volume", long_about = None)]
pub struct Cli {
    /// Volume parameters (TOML or JSON).
    #[arg(short, long, env = "UVFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Drive letter (`X:`) or directory.
    #[arg(short, long, default_value = "X:")]
    pub mountpoint: String,

    /// Dispatcher threads; 0 picks one per CPU.
    #[arg(short, long, default_value = "0")]
    pub threads: usize,

    #[arg(short, long, default_value = "memfs")]
    pub label: String,

    #[arg(long)]
    pub read_only: bool,

    #[arg(short, long, value_enum, default_value = "fine")]
    pub guard: GuardArg,

    /// Host files copied into the volume root before mounting.
    #[arg(long = "import")]
    pub imports: Vec<PathBuf>,
}

impl Cli {
    /// Parameters from the config file, with command-line overrides.
    pub fn volume_params(&self) -> Result<VolumeParams> {
        let mut params = match &self.config {
            Some(path) => VolumeParams::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => VolumeParams::default(),
        };
        if self.read_only {
            params.read_only_volume = true;
        }
        Ok(params)
    }

    pub fn mount_point(&self) -> Result<MountPoint> {
        self.mountpoint
            .parse()
            .with_context(|| format!("invalid mount point {:?}", self.mountpoint))
    }
}
