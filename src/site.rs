use anyhow::Context as _;
use url::Url;

use crate::tier::Tier;

pub const DEFAULT_BASE_URL: &str = "https://kids.britannica.com";

/// URL layout of the encyclopedia, rooted at `base`.
#[derive(Debug, Clone)]
pub struct Site {
    base: Url,
}

impl Site {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("parse base url: {base_url}"))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            anyhow::bail!("base url must be http/https: {base}");
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn login_url(&self) -> anyhow::Result<Url> {
        self.resolve("/login")
    }

    pub fn index_page_url(&self, tier: Tier, letter: char, page: u32) -> anyhow::Result<Url> {
        self.resolve(&format!("/{tier}/browse/alpha/{letter}/{page}"))
    }

    pub fn article_url(&self, tier: Tier, id: &str) -> anyhow::Result<Url> {
        self.resolve(&format!("/{tier}/article/{id}"))
    }

    /// Joins a site-relative href (`/kids/article/cat/352902`) onto the base.
    pub fn resolve(&self, href: &str) -> anyhow::Result<Url> {
        self.base
            .join(href)
            .with_context(|| format!("resolve href against {}: {href}", self.base))
    }
}

impl Default for Site {
    fn default() -> Self {
        Self {
            base: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
        }
    }
}

pub fn media_url(article_url: &str) -> String {
    format!("{}/media", article_url.trim_end_matches('/'))
}

pub fn related_articles_page_url(article_url: &str, page: u32) -> String {
    format!(
        "{}/related/main?page={page}",
        article_url.trim_end_matches('/')
    )
}

pub fn related_websites_url(article_url: &str) -> String {
    format!("{}/related/websites", article_url.trim_end_matches('/'))
}

pub fn tier_from_url(article_url: &str) -> anyhow::Result<Tier> {
    let url = Url::parse(article_url).with_context(|| format!("parse article url: {article_url}"))?;
    let first = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .ok_or_else(|| anyhow::anyhow!("article url has no tier segment: {article_url}"))?;
    first
        .parse()
        .with_context(|| format!("derive tier from url: {article_url}"))
}

/// Numeric id taken from the last path segment, e.g. `352902` from
/// `/kids/article/cat/352902`.
pub fn id_from_url(article_url: &str) -> anyhow::Result<String> {
    let url = Url::parse(article_url).with_context(|| format!("parse article url: {article_url}"))?;
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default();
    let id: String = last.chars().filter(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        anyhow::bail!("article url has no numeric id: {article_url}");
    }
    Ok(id)
}
