use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context as _;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::cli::UrlsArgs;
use crate::session::{self, Fetcher};
use crate::site::{self, Site};
use crate::store;
use crate::tier::Tier;

static INDEX_ITEMS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("body div.content ul.seo-items").expect("valid css selector")
});
static INDEX_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li").expect("valid css selector"));
static INDEX_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("dd a").expect("valid css selector"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub urls: Vec<String>,
    /// Letters whose index could not be read to the end. Their articles are
    /// missing from `urls`.
    pub failed: Vec<(Tier, char)>,
}

/// Article URLs listed on one alphabetical index page. A page without the
/// index list is an error; an empty list is not.
pub fn parse_index_page(html: &str, site: &Site) -> anyhow::Result<Vec<String>> {
    let document = Html::parse_document(html);
    let list = document
        .select(&INDEX_ITEMS)
        .next()
        .ok_or_else(|| anyhow::anyhow!("index page has no item list"))?;

    let mut urls = Vec::new();
    for item in list.select(&INDEX_ITEM) {
        let Some(href) = item
            .select(&INDEX_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        urls.push(site.resolve(href)?.to_string());
    }
    Ok(urls)
}

/// Reads pages 1, 2, ... of one letter's index until a page lists nothing.
pub async fn enumerate_letter(
    fetcher: &dyn Fetcher,
    site: &Site,
    tier: Tier,
    letter: char,
    limit: Option<usize>,
) -> anyhow::Result<Vec<String>> {
    let mut urls = Vec::new();
    let mut page = 1_u32;
    loop {
        let page_url = site.index_page_url(tier, letter, page)?;
        let html = fetcher.fetch(page_url.as_str()).await?;
        let page_urls = parse_index_page(&html, site)
            .with_context(|| format!("parse index page: {page_url}"))?;
        if page_urls.is_empty() {
            break;
        }
        urls.extend(page_urls);
        if limit.is_some_and(|limit| urls.len() >= limit) {
            break;
        }
        page += 1;
    }

    if let Some(limit) = limit {
        urls.truncate(limit);
    }
    Ok(urls)
}

/// Every article URL of `tier`, letter `a` through `z`. A letter that fails
/// is logged and recorded in [`Enumeration::failed`]; the remaining letters
/// are still read.
pub async fn enumerate_tier(
    fetcher: &dyn Fetcher,
    site: &Site,
    tier: Tier,
    limit: Option<usize>,
) -> Enumeration {
    let mut enumeration = Enumeration::default();

    for letter in 'a'..='z' {
        let remaining = limit.map(|limit| limit.saturating_sub(enumeration.urls.len()));
        match enumerate_letter(fetcher, site, tier, letter, remaining).await {
            Ok(urls) => enumeration.urls.extend(urls),
            Err(err) => {
                tracing::warn!(%tier, %letter, err = %format!("{err:#}"), "index enumeration aborted for letter");
                enumeration.failed.push((tier, letter));
            }
        }
        if limit.is_some_and(|limit| enumeration.urls.len() >= limit) {
            break;
        }
    }

    tracing::info!(
        %tier,
        urls = enumeration.urls.len(),
        failed_letters = enumeration.failed.len(),
        "enumerated tier"
    );
    enumeration
}

/// Enumerates each tier in turn; `limit` applies per tier.
pub async fn enumerate_all(
    fetcher: &dyn Fetcher,
    site: &Site,
    tiers: &[Tier],
    limit: Option<usize>,
) -> Enumeration {
    let mut all = Enumeration::default();
    for &tier in tiers {
        let enumeration = enumerate_tier(fetcher, site, tier, limit).await;
        all.urls.extend(enumeration.urls);
        all.failed.extend(enumeration.failed);
    }
    all
}

/// URLs of `tiers` from `urls.json`, enumerating any tier the file does not
/// cover yet. The file is only rewritten by an unlimited run in which every
/// letter was read in full, so a truncated listing is never cached. `limit`
/// caps each tier.
pub async fn load_or_enumerate(
    fetcher: &dyn Fetcher,
    site: &Site,
    data_dir: &Path,
    tiers: &[Tier],
    limit: Option<usize>,
    refresh: bool,
) -> anyhow::Result<Vec<String>> {
    let path = store::urls_path(data_dir);
    let mut urls: Vec<String> = if refresh {
        Vec::new()
    } else {
        store::read_json(&path)?.unwrap_or_default()
    };

    let cached: BTreeSet<Tier> = urls
        .iter()
        .filter_map(|url| site::tier_from_url(url).ok())
        .collect();
    let todo: Vec<Tier> = tiers
        .iter()
        .copied()
        .filter(|tier| !cached.contains(tier))
        .collect();

    if todo.is_empty() {
        tracing::info!(path = %path.display(), "loaded urls from file");
    } else {
        let enumeration = enumerate_all(fetcher, site, &todo, limit).await;
        urls.extend(enumeration.urls);
        if limit.is_some() {
            tracing::info!(?limit, "limited listing; urls.json left unchanged");
        } else if enumeration.failed.is_empty() {
            store::write_json_atomic(&path, &urls)?;
            tracing::info!(path = %path.display(), urls = urls.len(), "wrote urls");
        } else {
            tracing::warn!(
                failed = ?enumeration.failed,
                "some letters could not be enumerated; urls.json left unchanged"
            );
        }
    }

    let mut per_tier = BTreeMap::<Tier, usize>::new();
    Ok(urls
        .into_iter()
        .filter(|url| {
            let Ok(tier) = site::tier_from_url(url) else {
                return false;
            };
            if !tiers.contains(&tier) {
                return false;
            }
            let taken = per_tier.entry(tier).or_default();
            *taken += 1;
            limit.is_none_or(|limit| *taken <= limit)
        })
        .collect())
}

pub async fn run(args: UrlsArgs) -> anyhow::Result<()> {
    let session = session::connect(&args.site).await?;
    let urls = load_or_enumerate(
        &session,
        session.site(),
        &args.data.data_dir,
        &args.selected_tiers(),
        args.limit,
        args.refresh,
    )
    .await?;
    println!("{} article url(s)", urls.len());
    Ok(())
}
