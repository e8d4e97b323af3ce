use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};

use crate::cli::SiteArgs;
use crate::site::Site;

/// Source of page HTML. Implemented by [`Session`] for the live site and by
/// in-memory stubs in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct Session {
    client: reqwest::Client,
    site: Site,
    delay: Duration,
}

impl Session {
    pub fn new(site: Site, delay: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            site,
            delay,
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Posts credentials to the site's login form; the session cookie is
    /// kept in the client's cookie store for every later request.
    pub async fn login(&self, username: &str, password: &str) -> anyhow::Result<()> {
        let url = self.site.login_url()?;
        let response = self
            .client
            .post(url.clone())
            .header(USER_AGENT, user_agent())
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("login failed ({})", response.status());
        }
        tracing::info!(username, "logged in");
        Ok(())
    }
}

#[async_trait]
impl Fetcher for Session {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} failed ({status})");
        }
        response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))
    }
}

/// Builds a session from CLI flags, logging in when both credentials are
/// present.
pub async fn connect(args: &SiteArgs) -> anyhow::Result<Session> {
    let site = Site::new(&args.base_url)?;
    let session = Session::new(site, Duration::from_millis(args.delay_ms))?;
    match (&args.username, &args.password) {
        (Some(username), Some(password)) => session.login(username, password).await?,
        (None, None) => {}
        _ => tracing::warn!("KBDS_USERNAME and KBDS_PASSWORD must both be set to log in; continuing anonymously"),
    }
    Ok(session)
}

fn user_agent() -> String {
    format!("kbds/{}", env!("CARGO_PKG_VERSION"))
}
