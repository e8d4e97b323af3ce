use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::archive::DatasetSize;
use crate::formats::MediaType;
use crate::tier::Tier;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enumerate article URLs from the alphabetical index into `urls.json`.
    Urls(UrlsArgs),
    /// Download every enumerated article not yet on disk.
    Download(DownloadArgs),
    /// Download articles linked through `adjacent_ids` but never saved.
    DownloadMissing(DownloadMissingArgs),
    /// Build (or load) `metadata.json` and report its size.
    Metadata(DataArgs),
    /// List aligned (kids, students, scholars) id triples.
    Triples(TriplesArgs),
    /// Copy a set of articles into a new corpus directory.
    Subset(SubsetArgs),
    /// Compute (or load) corpus statistics.
    Stats(DataArgs),
    /// Re-extract stored articles from their saved HTML.
    Reparse(ReparseArgs),
    /// Download image and audio files of stored articles.
    Media(MediaArgs),
    /// Download a prebuilt corpus archive.
    Fetch(FetchArgs),
    /// Print a summary of one stored article.
    Show(ShowArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DataArgs {
    /// Corpus directory (holds `articles/`, `metadata.json`, ...).
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct SiteArgs {
    /// Site root.
    #[arg(long, default_value = crate::site::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Delay before each request (politeness).
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,

    /// Account name; logs in before fetching when set with a password.
    #[arg(long, env = "KBDS_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "KBDS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct DownloaderArgs {
    /// Maximum chunks downloaded concurrently.
    #[arg(long, default_value_t = 2)]
    pub pool_size: usize,

    /// URLs per chunk.
    #[arg(long, default_value_t = 1000)]
    pub chunk_size: usize,

    /// Extra rounds over failed URLs.
    #[arg(long, default_value_t = 1)]
    pub max_retries: u32,

    /// Keep raw page HTML in each article file (enables `reparse`).
    #[arg(long)]
    pub save_html: bool,
}

#[derive(Debug, Args)]
pub struct UrlsArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub site: SiteArgs,

    /// Tiers to enumerate (default: all).
    #[arg(long = "tier", value_delimiter = ',')]
    pub tiers: Vec<Tier>,

    /// Stop after this many URLs per tier.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Re-enumerate even if `urls.json` exists.
    #[arg(long)]
    pub refresh: bool,
}

impl UrlsArgs {
    pub fn selected_tiers(&self) -> Vec<Tier> {
        if self.tiers.is_empty() {
            Tier::ALL.to_vec()
        } else {
            self.tiers.clone()
        }
    }
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub urls: UrlsArgs,

    #[command(flatten)]
    pub downloader: DownloaderArgs,
}

#[derive(Debug, Args)]
pub struct DownloadMissingArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub site: SiteArgs,

    #[command(flatten)]
    pub downloader: DownloaderArgs,
}

#[derive(Debug, Args)]
pub struct TriplesArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Write the triples as JSON instead of printing them.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SubsetArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Output corpus directory.
    #[arg(long)]
    pub out: PathBuf,

    /// Article ids to copy.
    #[arg(long = "id", value_delimiter = ',', required_unless_present = "aligned")]
    pub ids: Vec<String>,

    /// Copy every member of every aligned triple.
    #[arg(long, conflicts_with = "ids")]
    pub aligned: bool,
}

#[derive(Debug, Args)]
pub struct ReparseArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Site root used to resolve relative links in saved HTML.
    #[arg(long, default_value = crate::site::DEFAULT_BASE_URL)]
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MediaFileType {
    Image,
    Audio,
}

impl From<MediaFileType> for MediaType {
    fn from(value: MediaFileType) -> Self {
        match value {
            MediaFileType::Image => MediaType::Image,
            MediaFileType::Audio => MediaType::Audio,
        }
    }
}

#[derive(Debug, Args)]
pub struct MediaArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Media types to download (default: image and audio).
    #[arg(long = "type", value_enum, value_delimiter = ',')]
    pub types: Vec<MediaFileType>,

    /// Delay before each request (politeness).
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Which snapshot to download.
    #[arg(long, value_enum, default_value_t = DatasetSize::Small)]
    pub size: DatasetSize,

    /// Directory the snapshot folder is created in.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Replace an existing snapshot folder.
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Article id.
    #[arg(long)]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn download_defaults() {
        let cli = Cli::try_parse_from(["kbds", "download", "--tier", "kids,scholars"]).unwrap();
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.urls.tiers, vec![Tier::Kids, Tier::Scholars]);
        assert_eq!(args.urls.data.data_dir, PathBuf::from("data"));
        assert_eq!(args.downloader.pool_size, 2);
        assert_eq!(args.downloader.chunk_size, 1000);
        assert_eq!(args.downloader.max_retries, 1);
        assert!(!args.downloader.save_html);
        assert_eq!(args.urls.site.delay_ms, 1000);
    }

    #[test]
    fn subset_needs_ids_or_aligned() {
        assert!(Cli::try_parse_from(["kbds", "subset", "--out", "x"]).is_err());
        assert!(Cli::try_parse_from(["kbds", "subset", "--out", "x", "--aligned"]).is_ok());
        assert!(Cli::try_parse_from(["kbds", "subset", "--out", "x", "--id", "1,2"]).is_ok());
    }
}
