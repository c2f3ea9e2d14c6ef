use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stowage_core::bucket::{self, BucketDescriptor};
use stowage_core::config::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(
    name = "stowage",
    about = "Inspect and edit stowage buckets",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file. Defaults apply when it does not exist.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Environment tag, overriding the configured one
    #[arg(long = "env", global = true)]
    pub environment: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum BucketArg {
    Root,
    Workflows,
    Packages,
    Templates,
    Cursors,
    DownloadedAt,
}

impl BucketArg {
    pub fn descriptor(self) -> &'static BucketDescriptor {
        match self {
            Self::Root => &bucket::ROOT,
            Self::Workflows => &bucket::WORKFLOWS,
            Self::Packages => &bucket::PACKAGES,
            Self::Templates => &bucket::TEMPLATES,
            Self::Cursors => &bucket::CURSORS,
            Self::DownloadedAt => &bucket::DOWNLOADED_AT,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// List buckets and the bindings they use
    Buckets,
    /// Store a file (or stdin) under a key
    Put(PutArgs),
    /// Print or save the object under a key
    Get(GetArgs),
    /// Delete the object under a key
    Rm(KeyArgs),
    /// List keys in a bucket
    Ls(LsArgs),
}

#[derive(Args)]
pub struct KeyArgs {
    #[arg(value_enum)]
    pub bucket: BucketArg,
    pub key: String,
}

#[derive(Args)]
pub struct PutArgs {
    #[command(flatten)]
    pub target: KeyArgs,
    /// Source file, or `-` for stdin
    pub source: String,
    #[arg(long)]
    pub content_type: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub target: KeyArgs,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(value_enum)]
    pub bucket: BucketArg,
}
