use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::USER_AGENT;

use crate::cli::MediaArgs;
use crate::dataset::{self, Dataset};
use crate::formats::{Article, Media, MediaType};
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaReport {
    pub downloaded: usize,
    /// Already on disk.
    pub existing: usize,
    pub failed: usize,
}

/// `media/{tier}/{article stem}/{media id}.{file type}`.
pub fn media_file_path(data_dir: &Path, article: &Article, media: &Media) -> PathBuf {
    let file_name = match media.kind.file_type() {
        "" => media.id.clone(),
        file_type => format!("{}.{file_type}", media.id),
    };
    store::media_dir(data_dir)
        .join(article.tier.as_str())
        .join(store::article_stem(&article.id, &article.title))
        .join(file_name)
}

pub struct MediaDownloader {
    client: reqwest::Client,
    delay: Duration,
}

impl MediaDownloader {
    pub fn new(delay: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("build http client")?;
        Ok(Self { client, delay })
    }

    /// Downloads the image and audio files of every stored article whose type
    /// is in `types`. Video is streamed from HLS manifests and is never
    /// fetched. A failed file is logged and the run continues.
    pub async fn download(&self, dataset: &Dataset, types: &[MediaType]) -> anyhow::Result<MediaReport> {
        let mut report = MediaReport::default();

        for path in dataset.all_article_paths() {
            let article = match dataset::load_article(path) {
                Ok(article) => article,
                Err(err) => {
                    tracing::warn!(path = %path.display(), ?err, "skipping unreadable article");
                    continue;
                }
            };

            for media in &article.media {
                if !types.contains(&media.media_type()) {
                    continue;
                }
                let Some(src) = media.kind.src() else {
                    tracing::debug!(id = %media.id, "video media is not downloadable");
                    continue;
                };

                let target = media_file_path(dataset.data_dir(), &article, media);
                if target.exists() {
                    report.existing += 1;
                    continue;
                }

                match self.fetch_to(src, &target).await {
                    Ok(bytes) => {
                        tracing::debug!(src, bytes, path = %target.display(), "media saved");
                        report.downloaded += 1;
                    }
                    Err(err) => {
                        tracing::warn!(src, err = %format!("{err:#}"), "media download failed");
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            downloaded = report.downloaded,
            existing = report.existing,
            failed = report.failed,
            "media download finished"
        );
        Ok(report)
    }

    async fn fetch_to(&self, src: &str, target: &Path) -> anyhow::Result<usize> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .client
            .get(src)
            .header(USER_AGENT, format!("kbds/{}", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .with_context(|| format!("GET {src}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {src} failed ({status})");
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body: {src}"))?;

        let parent = target
            .parent()
            .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", target.display()))?;
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create media dir: {}", parent.display()))?;
        let tmp_path = target.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, target)
            .await
            .with_context(|| format!("rename tmp to final: {}", target.display()))?;
        Ok(bytes.len())
    }
}

pub async fn run(args: MediaArgs) -> anyhow::Result<()> {
    let dataset = Dataset::open(&args.data.data_dir)?;
    let types: Vec<MediaType> = if args.types.is_empty() {
        vec![MediaType::Image, MediaType::Audio]
    } else {
        args.types.iter().map(|t| MediaType::from(*t)).collect()
    };

    let report = MediaDownloader::new(Duration::from_millis(args.delay_ms))?
        .download(&dataset, &types)
        .await?;
    println!(
        "downloaded {} file(s); {} already present; {} failed",
        report.downloaded, report.existing, report.failed
    );
    Ok(())
}
