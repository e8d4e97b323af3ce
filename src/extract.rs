use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::formats::{Article, HtmlBundle, Media, MediaKind, MediaType, Section};
use crate::session::Fetcher;
use crate::site::{self, Site};
use crate::tier::Tier;

const VIDEO_MANIFEST_BASE: &str = "https://content.jwplatform.com/manifests";

// Runaway guard for related-article pagination; real listings stop far earlier.
const MAX_RELATED_PAGES: u32 = 500;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid css selector")
}

static HEADLINE: Lazy<Selector> = Lazy::new(|| selector("body header h1"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static PANEL: Lazy<Selector> = Lazy::new(|| selector("div.panel"));
static SECTION: Lazy<Selector> = Lazy::new(|| selector("section"));
static HEADING: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3, h4, h5, h6"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));
static MEDIA_LIST: Lazy<Selector> = Lazy::new(|| selector("div#article-media-content ul"));
static LIST_ITEM: Lazy<Selector> = Lazy::new(|| selector("li"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static RELATED_RESULTS: Lazy<Selector> = Lazy::new(|| selector("ul.results"));
static RELATED_WEBSITES: Lazy<Selector> = Lazy::new(|| selector("ul.results-resources"));
static READING_LEVELS: Lazy<Selector> = Lazy::new(|| selector("ul.bk-reading-levels"));

/// Collapses every run of whitespace to a single space and trims the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text content of an HTML fragment (attribute values such as captions may
/// carry markup).
fn clean_html(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    clean_text(&parsed.root_element().text().collect::<String>())
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Headline and body sections of an article's main page. A page without a
/// headline or an `<article>` body is an error.
pub fn parse_text(html: &str) -> anyhow::Result<(String, Vec<Section>)> {
    let document = Html::parse_document(html);

    let title = document
        .select(&HEADLINE)
        .next()
        .map(element_text)
        .ok_or_else(|| anyhow::anyhow!("article page has no headline"))?;

    let body = document
        .select(&ARTICLE)
        .next()
        .ok_or_else(|| anyhow::anyhow!("article page has no <article> body"))?;

    let mut blocks: Vec<ElementRef<'_>> = body.select(&PANEL).collect();
    if blocks.is_empty() {
        blocks = body.select(&SECTION).collect();
    }

    let sections = blocks
        .into_iter()
        .map(|block| {
            let title = block
                .select(&HEADING)
                .next()
                .map(element_text)
                .unwrap_or_default();
            let paragraphs = block
                .select(&PARAGRAPH)
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect();
            Section { title, paragraphs }
        })
        .collect();

    Ok((title, sections))
}

/// Media entries listed on an article's media page. A page without the
/// media list yields no media.
pub fn parse_media(html: &str) -> Vec<Media> {
    let document = Html::parse_document(html);
    let Some(list) = document.select(&MEDIA_LIST).next() else {
        return Vec::new();
    };

    list.select(&LIST_ITEM)
        .filter_map(|item| item.select(&ANCHOR).next())
        .filter_map(media_from_anchor)
        .collect()
}

fn media_from_anchor(anchor: ElementRef<'_>) -> Option<Media> {
    let attr = |name: &str| anchor.value().attr(name);
    let media_type = MediaType::parse(attr("data-media-type")?)?;
    let title = attr("data-title").map(clean_html).unwrap_or_default();
    let caption = attr("data-caption").map(clean_html).unwrap_or_default();

    let (id, kind) = match media_type {
        MediaType::Video => {
            let video_id = attr("data-jwplayer-id")?.trim().to_owned();
            let manifest_url = format!("{VIDEO_MANIFEST_BASE}/{video_id}.m3u8");
            let (id, _) = file_stem_and_type(&manifest_url)?;
            let kind = MediaKind::Video {
                transcript: attr("data-transcript").unwrap_or_default().to_owned(),
                video_id,
                manifest_url,
                file_type: "mp4".to_owned(),
            };
            (id, kind)
        }
        MediaType::Image | MediaType::Audio => {
            let src = attr("data-full-path")?.trim().to_owned();
            let Some((id, file_type)) = file_stem_and_type(&src) else {
                tracing::debug!(%src, "media source has no file name; skipping");
                return None;
            };
            let kind = if media_type == MediaType::Image {
                MediaKind::Image { src, file_type }
            } else {
                MediaKind::Audio { src, file_type }
            };
            (id, kind)
        }
    };

    Some(Media {
        title,
        caption,
        id,
        kind,
    })
}

/// `("123", "jpg")` for `https://cdn.example.com/full/123.JPG?w=400`.
fn file_stem_and_type(src: &str) -> Option<(String, String)> {
    let path = match url::Url::parse(src) {
        Ok(url) => url.path().to_owned(),
        Err(_) => src.split(['?', '#']).next().unwrap_or_default().to_owned(),
    };
    let path = Path::new(&path);
    let stem = path.file_stem()?.to_str()?.to_owned();
    if stem.is_empty() {
        return None;
    }
    let file_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    Some((stem, file_type))
}

/// Article URLs on one related-articles page, or `None` when the page has
/// no result list.
pub fn parse_related_articles_page(html: &str, site: &Site) -> Option<Vec<String>> {
    let document = Html::parse_document(html);
    let list = document.select(&RELATED_RESULTS).next()?;

    let urls = list
        .select(&LIST_ITEM)
        .filter_map(|item| item.select(&ANCHOR).next())
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| match site.resolve(href) {
            Ok(url) => Some(url.to_string()),
            Err(err) => {
                tracing::debug!(href, ?err, "skipping unresolvable related article link");
                None
            }
        })
        .collect();
    Some(urls)
}

pub fn parse_related_websites(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Some(list) = document.select(&RELATED_WEBSITES).next() else {
        return Vec::new();
    };

    list.select(&LIST_ITEM)
        .filter_map(|item| item.select(&ANCHOR).next())
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::to_owned)
        .collect()
}

/// Tier -> id for every non-active entry of the reading-levels widget.
pub fn parse_adjacent_ids(html: &str, site: &Site) -> BTreeMap<Tier, String> {
    let document = Html::parse_document(html);
    let Some(widget) = document.select(&READING_LEVELS).next() else {
        return BTreeMap::new();
    };

    let mut adjacent = BTreeMap::new();
    for anchor in widget
        .select(&LIST_ITEM)
        .filter_map(|item| item.select(&ANCHOR).next())
    {
        if anchor.value().classes().any(|class| class == "active") {
            continue;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let resolved = site.resolve(href).and_then(|url| {
            let url = url.to_string();
            Ok((site::tier_from_url(&url)?, site::id_from_url(&url)?))
        });
        match resolved {
            Ok((tier, id)) => {
                adjacent.insert(tier, id);
            }
            Err(err) => tracing::debug!(href, ?err, "skipping reading-level link"),
        }
    }
    adjacent
}

/// Builds an article record from already captured HTML, without network I/O.
pub fn parse_article(article_url: &str, bundle: &HtmlBundle, site: &Site) -> anyhow::Result<Article> {
    let tier = site::tier_from_url(article_url)?;
    let id = site::id_from_url(article_url)?;

    let (title, text) =
        parse_text(&bundle.text).with_context(|| format!("parse article text: {article_url}"))?;
    let mut adjacent_ids = parse_adjacent_ids(&bundle.text, site);
    adjacent_ids.remove(&tier);

    let related_articles = bundle
        .related_articles
        .iter()
        .filter_map(|page| parse_related_articles_page(page, site))
        .flatten()
        .collect();

    Ok(Article {
        url: article_url.to_owned(),
        id,
        tier,
        title,
        text,
        media: parse_media(&bundle.media),
        adjacent_ids,
        related_articles,
        related_websites: parse_related_websites(&bundle.related_websites),
        htmls: None,
    })
}

/// Fetches the article page and its media, related-articles and
/// related-websites sub-pages.
pub async fn fetch_bundle(
    fetcher: &dyn Fetcher,
    site: &Site,
    article_url: &str,
) -> anyhow::Result<HtmlBundle> {
    let text = fetcher.fetch(article_url).await?;
    // Fail before spending requests on sub-pages of an unusable article.
    parse_text(&text).with_context(|| format!("parse article text: {article_url}"))?;

    let media = fetcher.fetch(&site::media_url(article_url)).await?;
    let related_articles = fetch_related_article_pages(fetcher, site, article_url).await;
    let websites_url = site::related_websites_url(article_url);
    let related_websites = match fetcher.fetch(&websites_url).await {
        Ok(html) => html,
        Err(err) => {
            tracing::debug!(url = %websites_url, ?err, "related websites unavailable");
            String::new()
        }
    };

    Ok(HtmlBundle {
        text,
        media,
        related_articles,
        related_websites,
    })
}

/// Pages `related/main?page=1,2,...` until a request fails or a page has no
/// results.
async fn fetch_related_article_pages(
    fetcher: &dyn Fetcher,
    site: &Site,
    article_url: &str,
) -> Vec<String> {
    let mut pages = Vec::new();

    for page in 1..=MAX_RELATED_PAGES {
        let url = site::related_articles_page_url(article_url, page);
        let html = match fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(err) => {
                tracing::debug!(%url, ?err, "related articles pagination stopped");
                break;
            }
        };
        let has_results = parse_related_articles_page(&html, site)
            .is_some_and(|urls| !urls.is_empty());
        if !has_results {
            break;
        }
        pages.push(html);
    }
    pages
}

pub async fn scrape_article(
    fetcher: &dyn Fetcher,
    site: &Site,
    article_url: &str,
) -> anyhow::Result<(Article, HtmlBundle)> {
    let bundle = fetch_bundle(fetcher, site, article_url).await?;
    let article = parse_article(article_url, &bundle, site)?;
    Ok((article, bundle))
}
