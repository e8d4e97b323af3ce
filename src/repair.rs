use std::path::Path;

use crate::cli::ReparseArgs;
use crate::dataset::{self, Dataset};
use crate::extract;
use crate::formats::Article;
use crate::site::Site;
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub reparsed: usize,
    /// Articles saved without raw HTML.
    pub skipped: usize,
    pub failed: usize,
}

/// Re-runs extraction over the HTML saved with `article`. Returns `None`
/// when the article carries no HTML.
pub fn reparse(article: &Article, site: &Site) -> anyhow::Result<Option<Article>> {
    let Some(bundle) = &article.htmls else {
        return Ok(None);
    };
    let mut reparsed = extract::parse_article(&article.url, bundle, site)?;
    reparsed.htmls = Some(bundle.clone());
    Ok(Some(reparsed))
}

fn reparse_file(path: &Path, site: &Site) -> anyhow::Result<bool> {
    let article = dataset::load_article(path)?;
    let Some(reparsed) = reparse(&article, site)? else {
        return Ok(false);
    };
    if reparsed != article {
        store::write_json_atomic(path, &reparsed)?;
    }
    Ok(true)
}

/// Rewrites every stored article that has saved HTML, in place. Derived
/// `metadata.json` and `stats.json` are left alone; delete them to rebuild.
pub fn reparse_corpus(dataset: &Dataset, site: &Site) -> anyhow::Result<RepairReport> {
    let mut report = RepairReport::default();
    for path in dataset.all_article_paths() {
        match reparse_file(path, site) {
            Ok(true) => report.reparsed += 1,
            Ok(false) => report.skipped += 1,
            Err(err) => {
                tracing::warn!(path = %path.display(), err = %format!("{err:#}"), "reparse failed");
                report.failed += 1;
            }
        }
    }
    tracing::info!(
        reparsed = report.reparsed,
        skipped = report.skipped,
        failed = report.failed,
        "reparse finished"
    );
    Ok(report)
}

pub fn run(args: ReparseArgs) -> anyhow::Result<()> {
    let site = Site::new(&args.base_url)?;
    let dataset = Dataset::open(&args.data.data_dir)?;
    let report = reparse_corpus(&dataset, &site)?;
    println!(
        "reparsed {} article(s); {} without saved html; {} failed",
        report.reparsed, report.skipped, report.failed
    );
    Ok(())
}
