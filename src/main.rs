use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    kbds::logging::init().context("init logging")?;

    let cli = kbds::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        kbds::cli::Command::Urls(args) => {
            kbds::enumerate::run(args).await.context("urls")?;
        }
        kbds::cli::Command::Download(args) => {
            kbds::download::run(args).await.context("download")?;
        }
        kbds::cli::Command::DownloadMissing(args) => {
            kbds::download::run_missing(args)
                .await
                .context("download missing")?;
        }
        kbds::cli::Command::Metadata(args) => {
            kbds::corpus::metadata(args).context("metadata")?;
        }
        kbds::cli::Command::Triples(args) => {
            kbds::corpus::triples(args).context("triples")?;
        }
        kbds::cli::Command::Subset(args) => {
            kbds::corpus::subset(args).context("subset")?;
        }
        kbds::cli::Command::Stats(args) => {
            kbds::stats::run(args).context("stats")?;
        }
        kbds::cli::Command::Reparse(args) => {
            kbds::repair::run(args).context("reparse")?;
        }
        kbds::cli::Command::Media(args) => {
            kbds::media::run(args).await.context("media")?;
        }
        kbds::cli::Command::Fetch(args) => {
            kbds::archive::run(args).await.context("fetch")?;
        }
        kbds::cli::Command::Show(args) => {
            kbds::corpus::show(args).context("show")?;
        }
    }

    Ok(())
}
