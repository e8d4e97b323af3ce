#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use kbds::session::Fetcher;
use kbds::tier::Tier;

/// Pages of a miniature encyclopedia keyed by `path?query`. Unregistered
/// alphabetical index pages answer with an empty list.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: &str, html: String) {
        self.pages.insert(path.to_owned(), html);
    }

    pub fn add_file(&mut self, path: &str, bytes: &[u8]) {
        self.files.insert(path.to_owned(), bytes.to_vec());
    }

    /// Registers an article and its sub-pages under both the slugged path
    /// (returned) and the short `/{tier}/article/{id}` form.
    pub fn add_article(&mut self, tier: Tier, id: &str, title: &str, adjacent: &[(Tier, &str)]) -> String {
        let canonical = article_path(tier, id, title);
        for path in [canonical.clone(), format!("/{tier}/article/{id}")] {
            self.set(&path, article_html(tier, id, title, adjacent));
            self.set(&format!("{path}/media"), media_html(id));
            self.set(
                &format!("{path}/related/main?page=1"),
                related_html(&[&format!("/{tier}/article/related-topic/9{id}")]),
            );
            self.set(&format!("{path}/related/websites"), websites_html(id));
        }
        canonical
    }

    /// Index of one letter: each inner list is one page of article paths.
    pub fn add_index(&mut self, tier: Tier, letter: char, pages: &[Vec<String>]) {
        for (page, hrefs) in pages.iter().enumerate() {
            let refs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
            self.set(
                &format!("/{tier}/browse/alpha/{letter}/{}", page + 1),
                index_html(&refs),
            );
        }
    }

    pub fn lookup(&self, path_and_query: &str) -> Option<String> {
        if let Some(html) = self.pages.get(path_and_query) {
            return Some(html.clone());
        }
        if path_and_query.contains("/browse/alpha/") {
            return Some(index_html(&[]));
        }
        None
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }
}

pub fn article_path(tier: Tier, id: &str, title: &str) -> String {
    format!("/{tier}/article/{}/{id}", title.to_lowercase().replace(' ', "-"))
}

pub fn index_html(hrefs: &[&str]) -> String {
    let items: String = hrefs
        .iter()
        .map(|href| format!(r#"<li><dl><dt>entry</dt><dd><a href="{href}">entry</a></dd></dl></li>"#))
        .collect();
    format!(
        r#"<!doctype html><html><body><div class="content"><ul class="seo-items">{items}</ul></div></body></html>"#
    )
}

pub fn article_html(tier: Tier, id: &str, title: &str, adjacent: &[(Tier, &str)]) -> String {
    let mut levels = format!(
        r#"<li><a class="active" href="{}">{tier}</a></li>"#,
        article_path(tier, id, title)
    );
    for (other, other_id) in adjacent {
        levels.push_str(&format!(
            r#"<li><a href="{}">{other}</a></li>"#,
            article_path(*other, other_id, title)
        ));
    }
    format!(
        r#"<!doctype html>
<html>
  <body>
    <header><h1>{title}</h1></header>
    <ul class="bk-reading-levels">{levels}</ul>
    <article>
      <div class="panel">
        <h2>Overview</h2>
        <p>{title} is a topic.   It has
           facts.</p>
        <p>Readers at the {tier} level learn about {title}.</p>
      </div>
    </article>
  </body>
</html>"#
    )
}

pub fn media_html(id: &str) -> String {
    format!(
        r#"<html><body><div id="article-media-content"><ul>
  <li><a data-media-type="IMAGE" data-title="Picture" data-caption="A picture"
         data-full-path="https://cdn.example.com/img/{id}.jpg"></a></li>
</ul></div></body></html>"#
    )
}

pub fn related_html(hrefs: &[&str]) -> String {
    let items: String = hrefs
        .iter()
        .map(|href| format!(r#"<li><a href="{href}">related</a></li>"#))
        .collect();
    format!(r#"<html><body><ul class="results">{items}</ul></body></html>"#)
}

pub fn websites_html(id: &str) -> String {
    format!(
        r#"<html><body><ul class="results-resources"><li><a href="https://web.example.org/{id}">site</a></li></ul></body></html>"#
    )
}

fn path_and_query(url: &str) -> anyhow::Result<String> {
    let url = url::Url::parse(url)?;
    Ok(match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    })
}

/// In-memory [`Fetcher`] over a [`FakeSite`] that counts requests and can be
/// told to fail particular paths.
pub struct MapFetcher {
    site: FakeSite,
    /// path -> remaining failures (`None` fails forever).
    failures: Mutex<HashMap<String, Option<usize>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MapFetcher {
    pub fn new(site: FakeSite) -> Arc<Self> {
        Arc::new(Self {
            site,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn fail_always(&self, path: &str) {
        self.failures.lock().unwrap().insert(path.to_owned(), None);
    }

    pub fn fail_times(&self, path: &str, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_owned(), Some(times));
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let key = path_and_query(url)?;
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;

        {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&key) {
                Some(None) => anyhow::bail!("injected failure: {key}"),
                Some(Some(0)) | None => {}
                Some(Some(remaining)) => {
                    *remaining -= 1;
                    anyhow::bail!("injected failure: {key}");
                }
            }
        }

        self.site
            .lookup(&key)
            .ok_or_else(|| anyhow::anyhow!("GET {url} failed (404 Not Found)"))
    }
}

/// Serves a [`FakeSite`] over HTTP on an ephemeral port.
pub struct FakeServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeServer {
    pub fn spawn(site: FakeSite) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                if let Some(bytes) = site.file(&url) {
                    let _ = request.respond(tiny_http::Response::from_data(bytes.to_vec()));
                    continue;
                }

                let response = match site.lookup(&url) {
                    Some(html) => {
                        let header = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/html; charset=utf-8"[..],
                        )
                        .expect("build header");
                        tiny_http::Response::from_string(html).with_header(header)
                    }
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
