//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch a batch of tracks concurrently and package them into one archive.
///
/// Reads a JSON request (`{"tracks": [...]}` or a bare array) from a file or
/// stdin, fetches every track with an external downloader, and prints a JSON
/// response with the archive download URL and a per-track manifest.
///
/// Values given here override the config file, which overrides built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "trackbatch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Request file (`-` or omitted reads stdin)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/trackbatch/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory that receives finished archives
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Parent directory for per-batch workspaces (default: system temp)
    #[arg(long, value_name = "DIR")]
    pub workspace_root: Option<PathBuf>,

    /// Maximum concurrent fetches (1-32)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Maximum tracks per batch (1-1000)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub max_items: Option<u16>,

    /// Per-track fetch deadline in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub item_timeout_secs: Option<u64>,

    /// Whole-batch deadline in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub batch_timeout_secs: Option<u64>,

    /// Download URL lifetime in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=604_800))]
    pub presign_ttl_secs: Option<u64>,

    /// Archive file name
    #[arg(long, value_name = "NAME")]
    pub archive_name: Option<String>,

    /// Attempts per metadata API call when rate limited (1-20)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// External fetch program (default: scdl)
    #[arg(long, value_name = "PROGRAM")]
    pub fetcher: Option<String>,

    /// Fetch program argument; repeatable. Placeholders: {url} {dir} {name} {id}
    #[arg(long = "fetcher-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub fetcher_args: Vec<String>,

    /// Look up missing titles/artists/URLs from the track API before fetching
    #[arg(long)]
    pub resolve_metadata: bool,

    /// Track API base URL used by --resolve-metadata
    #[arg(long, value_name = "URL", requires = "resolve_metadata")]
    pub api_base: Option<String>,
}
