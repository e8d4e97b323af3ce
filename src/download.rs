use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::cli::{DownloadArgs, DownloadMissingArgs, DownloaderArgs};
use crate::dataset::Dataset;
use crate::enumerate;
use crate::extract;
use crate::pool::WorkerPool;
use crate::session::{self, Fetcher};
use crate::site::{self, Site};
use crate::store;

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub pool_size: usize,
    pub chunk_size: usize,
    /// Extra rounds over the failed URLs after the first attempt.
    pub max_retries: u32,
    /// Keep the raw page HTML in each article's `htmls` field.
    pub save_html: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            chunk_size: 1000,
            max_retries: 1,
            save_html: false,
        }
    }
}

impl From<&DownloaderArgs> for DownloaderConfig {
    fn from(args: &DownloaderArgs) -> Self {
        Self {
            pool_size: args.pool_size,
            chunk_size: args.chunk_size,
            max_retries: args.max_retries,
            save_html: args.save_html,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub requested: usize,
    pub saved: usize,
    pub retry_rounds: u32,
    /// URLs still failing once the retry budget ran out. Nothing was written
    /// for them; a later run picks them up again.
    pub unresolved: Vec<String>,
}

struct Shared {
    data_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    site: Site,
    save_html: bool,
}

#[derive(Debug, Default)]
struct ChunkOutcome {
    saved: usize,
    failed: Vec<String>,
}

pub struct ArticleDownloader {
    shared: Arc<Shared>,
    config: DownloaderConfig,
}

impl ArticleDownloader {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        site: Site,
        config: DownloaderConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                data_dir: data_dir.into(),
                fetcher,
                site,
                save_html: config.save_html,
            }),
            config,
        }
    }

    /// Scrapes and stores every URL. Failed URLs are re-run as a fresh batch
    /// up to `max_retries` times; whatever still fails is reported, not
    /// raised.
    pub async fn download(&self, urls: &[String]) -> anyhow::Result<DownloadReport> {
        tracing::info!(articles = urls.len(), "downloading articles");
        let mut report = DownloadReport {
            requested: urls.len(),
            ..DownloadReport::default()
        };

        let outcome = self.run_batch(urls).await?;
        report.saved += outcome.saved;
        let mut failed = outcome.failed;

        while !failed.is_empty() && report.retry_rounds < self.config.max_retries {
            report.retry_rounds += 1;
            tracing::info!(
                failed = failed.len(),
                round = report.retry_rounds,
                "retrying failed articles"
            );
            let outcome = self.run_batch(&failed).await?;
            report.saved += outcome.saved;
            failed = outcome.failed;
        }

        if !failed.is_empty() {
            tracing::warn!(
                unresolved = failed.len(),
                "articles left undownloaded; run download again to retry them"
            );
        }
        report.unresolved = failed;

        tracing::info!(
            saved = report.saved,
            retry_rounds = report.retry_rounds,
            unresolved = report.unresolved.len(),
            "download finished"
        );
        Ok(report)
    }

    async fn run_batch(&self, urls: &[String]) -> anyhow::Result<ChunkOutcome> {
        let mut pool = WorkerPool::new(self.config.pool_size);
        for (index, chunk) in urls.chunks(self.config.chunk_size.max(1)).enumerate() {
            let shared = Arc::clone(&self.shared);
            let chunk = chunk.to_vec();
            pool.spawn(async move { shared.process_chunk(index, chunk).await });
        }

        let mut total = ChunkOutcome::default();
        for outcome in pool.join_all().await? {
            total.saved += outcome.saved;
            total.failed.extend(outcome.failed);
        }
        Ok(total)
    }
}

impl Shared {
    /// Runs a chunk to completion; a failing URL is recorded and the next one
    /// is attempted.
    async fn process_chunk(&self, index: usize, urls: Vec<String>) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        let mut seen = HashSet::new();

        for url in urls {
            if !seen.insert(url.clone()) {
                continue;
            }
            match self.download_one(&url).await {
                Ok(path) => {
                    tracing::debug!(chunk = index, %url, path = %path.display(), "article downloaded");
                    outcome.saved += 1;
                }
                Err(err) => {
                    tracing::warn!(chunk = index, %url, err = %format!("{err:#}"), "article download failed");
                    outcome.failed.push(url);
                }
            }
        }
        outcome
    }

    async fn download_one(&self, url: &str) -> anyhow::Result<PathBuf> {
        let (mut article, bundle) =
            extract::scrape_article(self.fetcher.as_ref(), &self.site, url).await?;
        if self.save_html {
            article.htmls = Some(bundle);
        }

        let path = store::article_path(&self.data_dir, article.tier, &article.id, &article.title);
        store::write_json_atomic_async(&path, &article).await?;
        Ok(path)
    }
}

/// `urls` minus those whose id already has a file under `articles/`.
pub fn pending_urls(data_dir: &Path, urls: &[String]) -> anyhow::Result<Vec<String>> {
    let saved = store::saved_ids(data_dir)?;
    let pending = urls
        .iter()
        .filter(|url| match site::id_from_url(url) {
            Ok(id) => !saved.contains(&id),
            Err(_) => true,
        })
        .cloned()
        .collect();
    Ok(pending)
}

/// Drops `metadata.json` and `stats.json` so the next read rebuilds them
/// over the new articles.
fn invalidate_derived(data_dir: &Path) -> anyhow::Result<()> {
    for path in [store::metadata_path(data_dir), store::stats_path(data_dir)] {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "removed stale derived file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove: {}", path.display()));
            }
        }
    }
    Ok(())
}

async fn download_pending(
    data_dir: &Path,
    session: session::Session,
    downloader: &DownloaderArgs,
    urls: &[String],
) -> anyhow::Result<DownloadReport> {
    store::make_directories(data_dir)?;
    let pending = pending_urls(data_dir, urls)?;
    tracing::info!(
        total = urls.len(),
        pending = pending.len(),
        "skipping articles already on disk"
    );

    let site = session.site().clone();
    let fetcher: Arc<dyn Fetcher> = Arc::new(session);
    let report = ArticleDownloader::new(data_dir, fetcher, site, downloader.into())
        .download(&pending)
        .await?;
    if report.saved > 0 {
        invalidate_derived(data_dir)?;
    }
    Ok(report)
}

fn print_report(report: &DownloadReport) {
    println!(
        "saved {} of {} article(s) after {} retry round(s); {} unresolved",
        report.saved,
        report.requested,
        report.retry_rounds,
        report.unresolved.len()
    );
}

pub async fn run(args: DownloadArgs) -> anyhow::Result<()> {
    let data_dir = &args.urls.data.data_dir;
    let session = session::connect(&args.urls.site).await?;
    let urls = enumerate::load_or_enumerate(
        &session,
        session.site(),
        data_dir,
        &args.urls.selected_tiers(),
        args.urls.limit,
        args.urls.refresh,
    )
    .await?;

    let report = download_pending(data_dir, session, &args.downloader, &urls).await?;
    print_report(&report);
    Ok(())
}

/// Downloads articles that stored articles link to through `adjacent_ids`
/// but that were never saved.
pub async fn run_missing(args: DownloadMissingArgs) -> anyhow::Result<()> {
    let data_dir = &args.data.data_dir;
    let missing = Dataset::open(data_dir)?.missing_aligned_ids()?;
    tracing::info!(missing = missing.len(), "found linked articles not on disk");

    let session = session::connect(&args.site).await?;
    let urls = missing
        .iter()
        .map(|(tier, id)| Ok(session.site().article_url(*tier, id)?.to_string()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let report = download_pending(data_dir, session, &args.downloader, &urls).await?;
    print_report(&report);
    Ok(())
}
