use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::io::AsyncWriteExt as _;

use crate::cli::FetchArgs;

/// Prebuilt corpus snapshots published as zip archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DatasetSize {
    /// A few articles per tier, for trying things out.
    Small,
    /// Only articles that belong to an aligned triple.
    Aligned,
    Full,
}

impl DatasetSize {
    pub fn dir_name(self) -> &'static str {
        match self {
            DatasetSize::Small => "kbds_small",
            DatasetSize::Aligned => "kbds_aligned",
            DatasetSize::Full => "kbds",
        }
    }

    /// Guesses the snapshot a directory holds from its name; anything
    /// unrecognized is treated as the full corpus.
    pub fn from_dir_name(name: &str) -> Self {
        match name {
            "kbds_small" => DatasetSize::Small,
            "kbds_aligned" => DatasetSize::Aligned,
            _ => DatasetSize::Full,
        }
    }

    fn drive_id(self) -> &'static str {
        match self {
            DatasetSize::Small => "1y90AXopy9yx3wHg2zuoyEGSrbCrRp-Kv",
            DatasetSize::Aligned => "1G3zTflSwHMBW-uj17MOkbG2s_MhE5NiE",
            DatasetSize::Full => "1lPZr1d6Hj2tcSrfZpaUHX-sEK9og-g70",
        }
    }

    pub fn archive_url(self) -> String {
        format!(
            "https://drive.usercontent.google.com/download?id={}&export=download&confirm=t",
            self.drive_id()
        )
    }
}

/// Downloads and unpacks the `size` snapshot under `root`, returning the
/// corpus directory. An existing directory is reused unless `overwrite`.
pub async fn fetch_archive(size: DatasetSize, root: &Path, overwrite: bool) -> anyhow::Result<PathBuf> {
    fetch_archive_from(&size.archive_url(), &root.join(size.dir_name()), overwrite).await
}

pub async fn fetch_archive_from(url: &str, dataset_dir: &Path, overwrite: bool) -> anyhow::Result<PathBuf> {
    if dataset_dir.exists() {
        if !overwrite {
            tracing::info!(dir = %dataset_dir.display(), "dataset already present");
            return Ok(dataset_dir.to_path_buf());
        }
        tokio::fs::remove_dir_all(dataset_dir)
            .await
            .with_context(|| format!("remove old dataset: {}", dataset_dir.display()))?;
    }
    tokio::fs::create_dir_all(dataset_dir)
        .await
        .with_context(|| format!("create dataset dir: {}", dataset_dir.display()))?;

    let archive_path = dataset_dir.join("archive.zip");
    download_file(url, &archive_path).await?;

    let out_dir = dataset_dir.to_path_buf();
    let zip_path = archive_path.clone();
    tokio::task::spawn_blocking(move || unpack(&zip_path, &out_dir))
        .await
        .context("join unpack task")??;

    tokio::fs::remove_file(&archive_path)
        .await
        .with_context(|| format!("remove archive: {}", archive_path.display()))?;
    tracing::info!(dir = %dataset_dir.display(), "dataset ready");
    Ok(dataset_dir.to_path_buf())
}

async fn download_file(url: &str, path: &Path) -> anyhow::Result<()> {
    tracing::info!(%url, "downloading archive");
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {url} failed ({status})");
    }

    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("create: {}", path.display()))?;
    let mut written = 0_u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("read body: {url}"))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("write: {}", path.display()))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .with_context(|| format!("flush: {}", path.display()))?;
    tracing::info!(bytes = written, "archive downloaded");
    Ok(())
}

/// Extracts `archive_path` into `out_dir`. Snapshots wrap their content in
/// a single top-level folder; it is lifted so `articles/` lands directly in
/// `out_dir`.
pub fn unpack(archive_path: &Path, out_dir: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(archive_path)
        .with_context(|| format!("open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("read archive: {}", archive_path.display()))?;
    archive
        .extract(out_dir)
        .with_context(|| format!("extract archive into {}", out_dir.display()))?;
    lift_wrapper_dir(out_dir)
}

fn lift_wrapper_dir(out_dir: &Path) -> anyhow::Result<()> {
    if out_dir.join("articles").is_dir() {
        return Ok(());
    }

    let mut wrappers = Vec::new();
    for entry in std::fs::read_dir(out_dir)
        .with_context(|| format!("read dir: {}", out_dir.display()))?
    {
        let path = entry
            .with_context(|| format!("read dir: {}", out_dir.display()))?
            .path();
        if path.join("articles").is_dir() {
            wrappers.push(path);
        }
    }
    let [wrapper] = wrappers.as_slice() else {
        anyhow::bail!("archive has no articles directory");
    };

    for entry in std::fs::read_dir(wrapper)
        .with_context(|| format!("read dir: {}", wrapper.display()))?
    {
        let from = entry
            .with_context(|| format!("read dir: {}", wrapper.display()))?
            .path();
        let Some(name) = from.file_name() else {
            continue;
        };
        let to = out_dir.join(name);
        std::fs::rename(&from, &to)
            .with_context(|| format!("move {} to {}", from.display(), to.display()))?;
    }
    std::fs::remove_dir(wrapper)
        .with_context(|| format!("remove dir: {}", wrapper.display()))?;
    Ok(())
}

pub async fn run(args: FetchArgs) -> anyhow::Result<()> {
    let dir = fetch_archive(args.size, &args.root, args.overwrite).await?;
    println!("{}", dir.display());
    Ok(())
}
